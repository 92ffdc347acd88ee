//! Payment request lifecycle and code provisioning

use chrono::{DateTime, NaiveTime, Utc};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{AccessError, AccessResult, StoreError};
use crate::generator::{GenerationPolicy, TokenSource, insert_unique};
use crate::locks::RecordLocks;
use crate::models::{
    AccessCode, Actor, Approval, CodeSpec, CodeStatus, Page, PaymentQuery, PaymentRequest,
    PaymentStats, PaymentSubmission, StatsRange,
};
use crate::services::AccessCodeService;
use crate::store::PaymentRequestStore;

/// How an approval obtained its code, so a failed approval can be undone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Provisioning {
    /// A pre-reserved inactive code was activated
    Activated,
    /// A new active code was created
    Created,
}

/// Sole writer of payment requests and the only caller that provisions a
/// code from a payment
#[derive(Clone)]
pub struct PaymentFulfillmentService {
    store: Arc<dyn PaymentRequestStore>,
    codes: AccessCodeService,
    references: Arc<dyn TokenSource>,
    locks: RecordLocks<i64>,
    policy: GenerationPolicy,
}

impl PaymentFulfillmentService {
    pub fn new(
        store: Arc<dyn PaymentRequestStore>,
        codes: AccessCodeService,
        references: Arc<dyn TokenSource>,
        policy: GenerationPolicy,
    ) -> Self {
        Self {
            store,
            codes,
            references,
            locks: RecordLocks::new(),
            policy,
        }
    }

    pub fn codes(&self) -> &AccessCodeService {
        &self.codes
    }

    /// Record a purchase intent as `pending` under a fresh payment reference
    pub async fn submit(
        &self,
        owner_id: Uuid,
        submission: PaymentSubmission,
    ) -> AccessResult<PaymentRequest> {
        let template = submission.into_new(String::new(), owner_id)?;
        if let Some(reserved) = template.access_code.as_deref() {
            self.check_reservation(reserved, owner_id).await?;
        }

        let store = &self.store;
        let request = insert_unique(
            self.references.as_ref(),
            self.policy,
            "payment reference",
            |token| {
                let mut new = template.clone();
                new.code_pay = token;
                async move { store.insert(new).await }
            },
        )
        .await?;

        info!(
            "Payment request {} ({}) submitted by {} for {}",
            request.id, request.code_pay, request.owner_id, request.amount
        );
        Ok(request)
    }

    /// pending -> completed, provisioning exactly one code
    ///
    /// The reserved code is activated, or a new active code is created for
    /// the owner. If the request can no longer be completed afterwards the
    /// provisioning is undone and the request is left untouched.
    pub async fn approve(&self, id: i64, note: Option<String>) -> AccessResult<Approval> {
        let note = PaymentRequest::validate_note(note)?;
        let _guard = self.locks.lock(id).await;
        let request = self.find(id).await?;
        request.check_pending()?;

        let (code, provisioning) = self.provision(&request).await?;

        let mut completed = request.clone();
        let stored = match completed.complete(code.id, note, Utc::now()) {
            Ok(()) => self.persist(&completed).await,
            Err(e) => Err(e),
        };

        match stored {
            Ok(payment) => {
                info!(
                    "Payment request {} ({}) approved, access code {} provisioned",
                    payment.id, payment.code_pay, code.code
                );
                Ok(Approval {
                    payment,
                    access_code: code.observed(Utc::now()),
                })
            }
            Err(e) => {
                self.undo_provisioning(&request, &code, provisioning).await;
                Err(e)
            }
        }
    }

    /// pending -> rejected; no code is touched
    pub async fn reject(&self, id: i64, reason: Option<String>) -> AccessResult<PaymentRequest> {
        let rejected = self
            .settle(id, None, |request, now| request.reject(reason, now))
            .await?;
        info!(
            "Payment request {} ({}) rejected",
            rejected.id, rejected.code_pay
        );
        Ok(rejected)
    }

    /// pending -> cancelled, by the owner or an administrator
    pub async fn cancel(
        &self,
        id: i64,
        actor: &Actor,
        reason: Option<String>,
    ) -> AccessResult<PaymentRequest> {
        let cancelled = self
            .settle(id, Some(actor), |request, now| request.cancel(reason, now))
            .await?;
        info!(
            "Payment request {} ({}) cancelled by {}",
            cancelled.id, cancelled.code_pay, actor.id
        );
        Ok(cancelled)
    }

    /// Remove the audit record. A code it provisioned stays valid.
    pub async fn delete(&self, id: i64) -> AccessResult<()> {
        let _guard = self.locks.lock(id).await;
        let request = self.find(id).await?;
        if !self.store.delete(id).await? {
            return Err(AccessError::payment_not_found(id));
        }

        match request.access_code_id {
            Some(code_id) => warn!(
                "Deleted payment request {} ({}); access code id {} it provisioned remains valid",
                request.id, request.code_pay, code_id
            ),
            None => info!("Deleted payment request {} ({})", request.id, request.code_pay),
        }
        Ok(())
    }

    pub async fn get(&self, id: i64) -> AccessResult<PaymentRequest> {
        self.find(id).await
    }

    /// Look a request up by its payment reference
    pub async fn find_by_reference(&self, code_pay: &str) -> AccessResult<PaymentRequest> {
        self.store
            .find_by_code_pay(code_pay)
            .await?
            .ok_or_else(|| AccessError::NotFound {
                entity: "payment request",
                key: code_pay.to_string(),
            })
    }

    pub async fn list(&self, query: &PaymentQuery) -> AccessResult<Page<PaymentRequest>> {
        Ok(self.store.list(query).await?)
    }

    pub async fn stats(&self, range: StatsRange) -> AccessResult<PaymentStats> {
        if let (Some(start), Some(end)) = (range.start_date, range.end_date) {
            if start > end {
                return Err(AccessError::InvalidValue(
                    "startDate must not be after endDate".to_string(),
                ));
            }
        }
        Ok(self.store.stats(range, start_of_day(Utc::now())).await?)
    }

    async fn find(&self, id: i64) -> AccessResult<PaymentRequest> {
        self.store
            .find_by_id(id)
            .await?
            .ok_or_else(|| AccessError::payment_not_found(id))
    }

    async fn check_reservation(&self, reserved: &str, owner_id: Uuid) -> AccessResult<()> {
        let code = self.codes.get(reserved).await?;
        if code.status != CodeStatus::Inactive {
            return Err(AccessError::InvalidValue(format!(
                "access code {} is {}, only inactive codes can be paid for",
                code.code, code.status
            )));
        }
        if code.owner_id.is_some() && !code.is_owned_by(owner_id) {
            return Err(AccessError::Unauthorized(format!(
                "access code {} belongs to another user",
                code.code
            )));
        }
        Ok(())
    }

    async fn provision(
        &self,
        request: &PaymentRequest,
    ) -> AccessResult<(AccessCode, Provisioning)> {
        match request.access_code.as_deref() {
            Some(reserved) => {
                let code = self.codes.activate(reserved).await?;
                Ok((code, Provisioning::Activated))
            }
            None => {
                let spec = CodeSpec {
                    max_uses: Some(request.requested_uses),
                    ..Default::default()
                };
                let code = self
                    .codes
                    .create_code(spec, true, Some(request.owner_id))
                    .await?;
                Ok((code, Provisioning::Created))
            }
        }
    }

    async fn undo_provisioning(
        &self,
        request: &PaymentRequest,
        code: &AccessCode,
        provisioning: Provisioning,
    ) {
        warn!(
            "Approval of payment request {} failed after provisioning access code {}, undoing",
            request.id, code.code
        );
        let undone = match provisioning {
            Provisioning::Activated => self.codes.release(&code.code).await.map(|_| ()),
            Provisioning::Created => self.codes.discard(&code.code).await.map(|_| ()),
        };
        if let Err(e) = undone {
            error!(
                "Failed to undo provisioning of access code {} for payment request {}: {}",
                code.code, request.id, e
            );
        }
    }

    /// Apply a terminal transition under the request lock
    async fn settle<F>(&self, id: i64, actor: Option<&Actor>, apply: F) -> AccessResult<PaymentRequest>
    where
        F: FnOnce(&mut PaymentRequest, DateTime<Utc>) -> AccessResult<()>,
    {
        let _guard = self.locks.lock(id).await;
        let mut request = self.find(id).await?;
        if let Some(actor) = actor {
            if !actor.is_admin() && !request.is_owned_by(actor.id) {
                return Err(AccessError::Unauthorized(format!(
                    "payment request {} belongs to another user",
                    id
                )));
            }
        }

        apply(&mut request, Utc::now())?;
        self.persist(&request).await
    }

    /// Compare-and-swap a transition out of `pending`. Losing the swap means
    /// another process already moved the request.
    async fn persist(&self, request: &PaymentRequest) -> AccessResult<PaymentRequest> {
        match self.store.update(request).await {
            Ok(stored) => Ok(stored),
            Err(StoreError::VersionMismatch) => match self.store.find_by_id(request.id).await? {
                Some(current) if current.check_pending().is_err() => {
                    Err(AccessError::NotPending {
                        status: current.status,
                    })
                }
                Some(_) => Err(StoreError::VersionMismatch.into()),
                None => Err(AccessError::payment_not_found(request.id)),
            },
            Err(e) => Err(e.into()),
        }
    }
}

/// 00:00 UTC of the day containing `now`
fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive().and_time(NaiveTime::MIN).and_utc()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::RandomTokens;
    use crate::models::PaymentStatus;
    use crate::store::{MemoryCodeStore, MemoryPaymentRequestStore};
    use chrono::TimeZone;

    fn services() -> (PaymentFulfillmentService, MemoryCodeStore) {
        let code_store = MemoryCodeStore::new();
        let codes = AccessCodeService::new(
            Arc::new(code_store.clone()),
            Arc::new(RandomTokens::access_codes(8)),
            GenerationPolicy::default(),
        );
        let payments = PaymentFulfillmentService::new(
            Arc::new(MemoryPaymentRequestStore::new()),
            codes,
            Arc::new(RandomTokens::payment_references(8)),
            GenerationPolicy::default(),
        );
        (payments, code_store)
    }

    fn purchase(amount: i64) -> PaymentSubmission {
        PaymentSubmission {
            amount,
            ..Default::default()
        }
    }

    #[test]
    fn test_start_of_day_truncates_to_midnight_utc() {
        let now = Utc.with_ymd_and_hms(2025, 3, 14, 15, 9, 26).unwrap();
        assert_eq!(
            start_of_day(now),
            Utc.with_ymd_and_hms(2025, 3, 14, 0, 0, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn test_submit_assigns_reference() {
        let (payments, _) = services();
        let request = payments
            .submit(Uuid::new_v4(), purchase(100_000))
            .await
            .unwrap();
        assert_eq!(request.status, PaymentStatus::Pending);
        assert!(request.code_pay.starts_with("PAY"));

        let found = payments.find_by_reference(&request.code_pay).await.unwrap();
        assert_eq!(found.id, request.id);
    }

    #[tokio::test]
    async fn test_submit_rejects_reserved_code_of_someone_else() {
        let (payments, _) = services();
        let code = payments
            .codes()
            .create_code(CodeSpec::default(), false, Some(Uuid::new_v4()))
            .await
            .unwrap();

        let submission = PaymentSubmission {
            amount: 10,
            access_code: Some(code.code),
            ..Default::default()
        };
        let err = payments
            .submit(Uuid::new_v4(), submission)
            .await
            .unwrap_err();
        assert!(matches!(err, AccessError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_submit_rejects_active_reserved_code() {
        let (payments, _) = services();
        let owner = Uuid::new_v4();
        let code = payments
            .codes()
            .create_code(CodeSpec::default(), true, Some(owner))
            .await
            .unwrap();

        let submission = PaymentSubmission {
            amount: 10,
            access_code: Some(code.code),
            ..Default::default()
        };
        let err = payments.submit(owner, submission).await.unwrap_err();
        assert!(matches!(err, AccessError::InvalidValue(_)));
    }

    #[tokio::test]
    async fn test_failed_activation_leaves_request_pending() {
        let (payments, _) = services();
        let owner = Uuid::new_v4();
        let code = payments
            .codes()
            .create_code(CodeSpec::default(), false, Some(owner))
            .await
            .unwrap();
        let request = payments
            .submit(
                owner,
                PaymentSubmission {
                    amount: 10,
                    access_code: Some(code.code.clone()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        payments.codes().revoke(&code.code).await.unwrap();

        let err = payments.approve(request.id, None).await.unwrap_err();
        assert!(matches!(err, AccessError::InvalidTransition { .. }));
        let unchanged = payments.get(request.id).await.unwrap();
        assert_eq!(unchanged.status, PaymentStatus::Pending);
        assert_eq!(unchanged.access_code_id, None);
    }

    #[tokio::test]
    async fn test_invalid_note_is_refused_before_provisioning() {
        let (payments, code_store) = services();
        let request = payments.submit(Uuid::new_v4(), purchase(10)).await.unwrap();

        let err = payments
            .approve(request.id, Some("x".repeat(501)))
            .await
            .unwrap_err();
        assert!(matches!(err, AccessError::InvalidValue(_)));
        assert!(code_store.is_empty().await);
        assert_eq!(
            payments.get(request.id).await.unwrap().status,
            PaymentStatus::Pending
        );

        // No code was created and discarded, so ids were not consumed
        let approval = payments.approve(request.id, None).await.unwrap();
        assert_eq!(approval.access_code.id, 1);
    }

    #[tokio::test]
    async fn test_stats_rejects_inverted_range() {
        let (payments, _) = services();
        let now = Utc::now();
        let range = StatsRange {
            start_date: Some(now),
            end_date: Some(now - chrono::Duration::days(1)),
        };
        assert!(matches!(
            payments.stats(range).await,
            Err(AccessError::InvalidValue(_))
        ));
    }
}
