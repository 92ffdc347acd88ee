//! Self-service operations for end users

use uuid::Uuid;

use crate::error::{AccessError, AccessResult};
use crate::models::{
    AccessCode, Actor, CodeQuery, CodeSpec, Page, PaymentQuery, PaymentRequest,
    PaymentStatusView, PaymentSubmission, Redemption,
};
use crate::services::{AccessCodeService, PaymentFulfillmentService};

/// Operations restricted to the caller's own codes and payments
#[derive(Clone)]
pub struct ClientOperations {
    codes: AccessCodeService,
    payments: PaymentFulfillmentService,
}

fn require_owner(actor: &Actor, owner_id: Option<Uuid>, what: &str) -> AccessResult<()> {
    if actor.is_admin() || owner_id == Some(actor.id) {
        Ok(())
    } else {
        Err(AccessError::Unauthorized(format!(
            "{} belongs to another user",
            what
        )))
    }
}

impl ClientOperations {
    pub fn new(payments: PaymentFulfillmentService) -> Self {
        Self {
            codes: payments.codes().clone(),
            payments,
        }
    }

    /// Create an inactive code owned by the caller, to be paid for
    pub async fn create_code(&self, actor: &Actor, max_uses: Option<i32>) -> AccessResult<AccessCode> {
        let spec = CodeSpec {
            max_uses,
            ..Default::default()
        };
        self.codes.create_code(spec, false, Some(actor.id)).await
    }

    /// Consume one use. Anyone holding the code string may redeem it.
    pub async fn redeem(&self, _actor: &Actor, code: &str) -> AccessResult<Redemption> {
        self.codes.redeem(code).await
    }

    pub async fn my_codes(&self, actor: &Actor, mut query: CodeQuery) -> AccessResult<Page<AccessCode>> {
        query.owner_id = Some(actor.id);
        self.codes.list(&query).await
    }

    /// A code that is not the caller's reads as missing, so code strings
    /// cannot be tested for existence
    pub async fn get_code(&self, actor: &Actor, code: &str) -> AccessResult<AccessCode> {
        let found = self.codes.get(code).await?;
        if require_owner(actor, found.owner_id, "access code").is_err() {
            return Err(AccessError::code_not_found(code));
        }
        Ok(found)
    }

    pub async fn submit_payment(
        &self,
        actor: &Actor,
        submission: PaymentSubmission,
    ) -> AccessResult<PaymentRequest> {
        self.payments.submit(actor.id, submission).await
    }

    /// Cancel a pending request the caller owns
    pub async fn cancel_payment(
        &self,
        actor: &Actor,
        id: i64,
        reason: Option<String>,
    ) -> AccessResult<PaymentRequest> {
        self.payments.cancel(id, actor, reason).await
    }

    pub async fn my_payments(
        &self,
        actor: &Actor,
        mut query: PaymentQuery,
    ) -> AccessResult<Page<PaymentRequest>> {
        query.owner_id = Some(actor.id);
        self.payments.list(&query).await
    }

    pub async fn get_payment(&self, actor: &Actor, id: i64) -> AccessResult<PaymentRequest> {
        let found = self.payments.get(id).await?;
        require_owner(actor, Some(found.owner_id), "payment request")?;
        Ok(found)
    }

    /// Poll a request by its payment reference, without authentication
    pub async fn payment_status(&self, code_pay: &str) -> AccessResult<PaymentStatusView> {
        let request = self.payments.find_by_reference(code_pay).await?;
        Ok(request.into())
    }
}
