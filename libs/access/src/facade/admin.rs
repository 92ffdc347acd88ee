//! Administrator operations

use crate::error::{AccessError, AccessResult};
use crate::models::{
    AccessCode, Actor, Approval, CodeQuery, CodeSpec, Page, PaymentQuery, PaymentRequest,
    PaymentStats, QuotaUpdate, StatsRange,
};
use crate::services::{AccessCodeService, PaymentFulfillmentService};

/// Full operation set, reachable only by administrators
#[derive(Clone)]
pub struct AdminOperations {
    codes: AccessCodeService,
    payments: PaymentFulfillmentService,
}

fn require_admin(actor: &Actor) -> AccessResult<()> {
    if actor.is_admin() {
        Ok(())
    } else {
        Err(AccessError::Unauthorized(
            "administrator role required".to_string(),
        ))
    }
}

impl AdminOperations {
    pub fn new(payments: PaymentFulfillmentService) -> Self {
        Self {
            codes: payments.codes().clone(),
            payments,
        }
    }

    /// Issue a code that is redeemable right away
    pub async fn issue_code(&self, actor: &Actor, spec: CodeSpec) -> AccessResult<AccessCode> {
        require_admin(actor)?;
        self.codes.create_code(spec, true, None).await
    }

    pub async fn list_codes(&self, actor: &Actor, query: CodeQuery) -> AccessResult<Page<AccessCode>> {
        require_admin(actor)?;
        self.codes.list(&query).await
    }

    pub async fn get_code(&self, actor: &Actor, code: &str) -> AccessResult<AccessCode> {
        require_admin(actor)?;
        self.codes.get(code).await
    }

    pub async fn update_quota(
        &self,
        actor: &Actor,
        code: &str,
        update: QuotaUpdate,
    ) -> AccessResult<AccessCode> {
        require_admin(actor)?;
        self.codes.update_quota(code, &update).await
    }

    pub async fn activate_code(&self, actor: &Actor, code: &str) -> AccessResult<AccessCode> {
        require_admin(actor)?;
        self.codes.activate(code).await
    }

    pub async fn revoke_code(&self, actor: &Actor, code: &str) -> AccessResult<AccessCode> {
        require_admin(actor)?;
        self.codes.revoke(code).await
    }

    pub async fn delete_code(&self, actor: &Actor, code: &str) -> AccessResult<()> {
        require_admin(actor)?;
        self.codes.delete(code).await
    }

    pub async fn sweep_expired(&self, actor: &Actor) -> AccessResult<u64> {
        require_admin(actor)?;
        self.codes.sweep_expired().await
    }

    pub async fn list_payments(
        &self,
        actor: &Actor,
        query: PaymentQuery,
    ) -> AccessResult<Page<PaymentRequest>> {
        require_admin(actor)?;
        self.payments.list(&query).await
    }

    pub async fn get_payment(&self, actor: &Actor, id: i64) -> AccessResult<PaymentRequest> {
        require_admin(actor)?;
        self.payments.get(id).await
    }

    pub async fn approve_payment(
        &self,
        actor: &Actor,
        id: i64,
        note: Option<String>,
    ) -> AccessResult<Approval> {
        require_admin(actor)?;
        self.payments.approve(id, note).await
    }

    pub async fn reject_payment(
        &self,
        actor: &Actor,
        id: i64,
        reason: Option<String>,
    ) -> AccessResult<PaymentRequest> {
        require_admin(actor)?;
        self.payments.reject(id, reason).await
    }

    pub async fn cancel_payment(
        &self,
        actor: &Actor,
        id: i64,
        reason: Option<String>,
    ) -> AccessResult<PaymentRequest> {
        require_admin(actor)?;
        self.payments.cancel(id, actor, reason).await
    }

    pub async fn delete_payment(&self, actor: &Actor, id: i64) -> AccessResult<()> {
        require_admin(actor)?;
        self.payments.delete(id).await
    }

    pub async fn payment_stats(&self, actor: &Actor, range: StatsRange) -> AccessResult<PaymentStats> {
        require_admin(actor)?;
        self.payments.stats(range).await
    }
}
