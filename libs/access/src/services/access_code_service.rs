//! Access code lifecycle

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{AccessError, AccessResult, StoreError};
use crate::generator::{GenerationPolicy, TokenSource, insert_unique};
use crate::locks::RecordLocks;
use crate::models::{
    AccessCode, CodeQuery, CodeSpec, CodeStatus, Page, QuotaUpdate, Redemption,
};
use crate::store::CodeStore;

/// Sole writer of access codes
///
/// Every mutation runs under the per-code lock and persists through the
/// store's compare-and-swap. A lost swap means another process changed the
/// record; the rule is re-evaluated against the fresh copy, up to
/// `policy.max_attempts` times.
#[derive(Clone)]
pub struct AccessCodeService {
    store: Arc<dyn CodeStore>,
    tokens: Arc<dyn TokenSource>,
    locks: RecordLocks<String>,
    policy: GenerationPolicy,
}

impl AccessCodeService {
    pub fn new(
        store: Arc<dyn CodeStore>,
        tokens: Arc<dyn TokenSource>,
        policy: GenerationPolicy,
    ) -> Self {
        Self {
            store,
            tokens,
            locks: RecordLocks::new(),
            policy,
        }
    }

    /// Create a code with a freshly generated, collision-free string
    pub async fn create_code(
        &self,
        spec: CodeSpec,
        issued_active: bool,
        owner_id: Option<Uuid>,
    ) -> AccessResult<AccessCode> {
        let status = if issued_active {
            CodeStatus::Active
        } else {
            CodeStatus::Inactive
        };
        let template = spec.into_new(String::new(), status, owner_id, Utc::now())?;

        let store = &self.store;
        let code = insert_unique(self.tokens.as_ref(), self.policy, "access code", |token| {
            let mut new = template.clone();
            new.code = token;
            async move { store.insert(new).await }
        })
        .await?;

        info!(
            "Created access code {} (id {}, status {}, max uses {})",
            code.code, code.id, code.status, code.max_uses
        );
        Ok(code)
    }

    /// Consume one use of `code`
    pub async fn redeem(&self, code: &str) -> AccessResult<Redemption> {
        let redeemed = self.mutate(code, |record, now| record.redeem(now)).await?;
        info!(
            "Redeemed access code {} ({}/{} uses, status {})",
            redeemed.code, redeemed.usage_count, redeemed.max_uses, redeemed.status
        );

        Ok(Redemption {
            remaining_uses: redeemed.remaining_uses(),
            access_code: redeemed.observed(Utc::now()),
        })
    }

    /// inactive -> active
    pub async fn activate(&self, code: &str) -> AccessResult<AccessCode> {
        let activated = self.mutate(code, |record, now| record.activate(now)).await?;
        info!("Activated access code {}", activated.code);
        Ok(activated)
    }

    /// Administrative edit of quota, expiry or forced status
    pub async fn update_quota(&self, code: &str, update: &QuotaUpdate) -> AccessResult<AccessCode> {
        let updated = self
            .mutate(code, |record, now| record.apply_quota(update, now))
            .await?;
        info!(
            "Updated access code {} (status {}, max uses {}, expires at {:?})",
            updated.code, updated.status, updated.max_uses, updated.expires_at
        );
        Ok(updated.observed(Utc::now()))
    }

    /// Force `revoked` on a code that is not yet terminal
    pub async fn revoke(&self, code: &str) -> AccessResult<AccessCode> {
        let update = QuotaUpdate {
            status: Some(CodeStatus::Revoked),
            ..Default::default()
        };
        self.update_quota(code, &update).await
    }

    /// Remove the record entirely
    pub async fn delete(&self, code: &str) -> AccessResult<()> {
        let _guard = self.locks.lock(code.to_string()).await;
        if !self.store.delete(code).await? {
            return Err(AccessError::code_not_found(code));
        }
        info!("Deleted access code {}", code);
        Ok(())
    }

    /// Fetch a code with its effective status
    pub async fn get(&self, code: &str) -> AccessResult<AccessCode> {
        Ok(self.find(code).await?.observed(Utc::now()))
    }

    pub async fn effective_status(&self, code: &str) -> AccessResult<CodeStatus> {
        Ok(self.find(code).await?.effective_status(Utc::now()))
    }

    pub async fn list(&self, query: &CodeQuery) -> AccessResult<Page<AccessCode>> {
        let now = Utc::now();
        let page = self.store.list(query, now).await?;
        Ok(page.map(|code| code.observed(now)))
    }

    /// Persist `expired` on every code whose expiry has passed
    pub async fn sweep_expired(&self) -> AccessResult<u64> {
        let expired = self.store.expire_elapsed(Utc::now()).await?;
        if expired > 0 {
            info!("Expired {} access codes", expired);
        }
        Ok(expired)
    }

    /// Return an unused code to inactive, undoing a payment activation
    pub(crate) async fn release(&self, code: &str) -> AccessResult<AccessCode> {
        let released = self.mutate(code, |record, now| record.release(now)).await?;
        info!("Released access code {} back to inactive", released.code);
        Ok(released)
    }

    /// Remove a code created moments ago by a payment approval
    pub(crate) async fn discard(&self, code: &str) -> AccessResult<bool> {
        let _guard = self.locks.lock(code.to_string()).await;
        Ok(self.store.delete(code).await?)
    }

    async fn find(&self, code: &str) -> AccessResult<AccessCode> {
        self.store
            .find_by_code(code)
            .await?
            .ok_or_else(|| AccessError::code_not_found(code))
    }

    async fn mutate<F>(&self, code: &str, mut apply: F) -> AccessResult<AccessCode>
    where
        F: FnMut(&mut AccessCode, DateTime<Utc>) -> AccessResult<()>,
    {
        let _guard = self.locks.lock(code.to_string()).await;
        let attempts = self.policy.max_attempts.max(1);

        for attempt in 1..=attempts {
            let mut record = self.find(code).await?;
            apply(&mut record, Utc::now())?;

            match self.store.update(&record).await {
                Ok(stored) => return Ok(stored),
                Err(StoreError::VersionMismatch) => {
                    debug!(
                        "Access code {} changed underneath us, re-evaluating (attempt {}/{})",
                        code, attempt, attempts
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(StoreError::VersionMismatch.into())
    }
}
