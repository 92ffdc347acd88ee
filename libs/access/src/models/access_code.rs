//! Access code model and its transition rules
//!
//! The methods on [`AccessCode`] are pure: they validate and apply a single
//! transition to an in-memory copy. Persisting the result (and making it
//! atomic) is the job of [`crate::services::AccessCodeService`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{AccessError, AccessResult};

/// Lifecycle status of an access code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodeStatus {
    /// Created, waiting for payment
    Inactive,
    /// Redeemable
    Active,
    /// Every use consumed
    Used,
    /// `expires_at` has passed
    Expired,
    /// Withdrawn by an administrator
    Revoked,
}

impl CodeStatus {
    pub const ALL: [CodeStatus; 5] = [
        CodeStatus::Inactive,
        CodeStatus::Active,
        CodeStatus::Used,
        CodeStatus::Expired,
        CodeStatus::Revoked,
    ];

    /// Get the status as its stored string
    pub fn as_str(&self) -> &'static str {
        match self {
            CodeStatus::Inactive => "inactive",
            CodeStatus::Active => "active",
            CodeStatus::Used => "used",
            CodeStatus::Expired => "expired",
            CodeStatus::Revoked => "revoked",
        }
    }

    /// No transition leaves a terminal status
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CodeStatus::Used | CodeStatus::Expired | CodeStatus::Revoked
        )
    }
}

impl fmt::Display for CodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CodeStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CodeStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown access code status '{}'", s))
    }
}

/// Access code entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessCode {
    pub id: i64,
    pub code: String,
    pub status: CodeStatus,
    pub max_uses: i32,
    pub usage_count: i32,
    /// `None` never expires
    pub expires_at: Option<DateTime<Utc>>,
    pub match_id: Option<String>,
    pub type_match: Option<String>,
    pub owner_id: Option<Uuid>,
    /// Compare-and-swap token, bumped by every store update
    #[serde(skip)]
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Parameters for a new code
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeSpec {
    /// Defaults to 1
    pub max_uses: Option<i32>,
    pub expires_at: Option<DateTime<Utc>>,
    pub match_id: Option<String>,
    pub type_match: Option<String>,
}

/// Insert payload handed to a [`crate::store::CodeStore`]
#[derive(Debug, Clone)]
pub struct NewAccessCode {
    pub code: String,
    pub status: CodeStatus,
    pub max_uses: i32,
    pub expires_at: Option<DateTime<Utc>>,
    pub match_id: Option<String>,
    pub type_match: Option<String>,
    pub owner_id: Option<Uuid>,
}

/// Administrative quota/status edit
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaUpdate {
    pub status: Option<CodeStatus>,
    pub max_uses: Option<i32>,
    /// Absent leaves the expiry alone, `null` clears it
    #[serde(default, deserialize_with = "double_option")]
    pub expires_at: Option<Option<DateTime<Utc>>>,
}

/// Outcome of a successful redemption
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Redemption {
    pub access_code: AccessCode,
    pub remaining_uses: i32,
}

fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Deserialize::deserialize(deserializer).map(Some)
}

/// Reject a non-positive use quota
pub fn validate_max_uses(max_uses: i32) -> AccessResult<()> {
    if max_uses < 1 {
        return Err(AccessError::InvalidValue(format!(
            "maxUses must be at least 1, got {}",
            max_uses
        )));
    }
    Ok(())
}

/// Reject an expiry that is already in the past
pub fn validate_expiry(expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> AccessResult<()> {
    match expires_at {
        Some(at) if at <= now => Err(AccessError::InvalidValue(format!(
            "expiresAt {} is not in the future",
            at.to_rfc3339()
        ))),
        _ => Ok(()),
    }
}

impl CodeSpec {
    /// Validate the spec and resolve defaults into an insert payload
    pub fn into_new(
        self,
        code: String,
        status: CodeStatus,
        owner_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> AccessResult<NewAccessCode> {
        let max_uses = self.max_uses.unwrap_or(1);
        validate_max_uses(max_uses)?;
        validate_expiry(self.expires_at, now)?;

        Ok(NewAccessCode {
            code,
            status,
            max_uses,
            expires_at: self.expires_at,
            match_id: self.match_id,
            type_match: self.type_match,
            owner_id,
        })
    }
}

impl AccessCode {
    /// Status as callers must see it: an elapsed `expires_at` wins over any
    /// non-terminal stored status.
    pub fn effective_status(&self, now: DateTime<Utc>) -> CodeStatus {
        match self.status {
            CodeStatus::Inactive | CodeStatus::Active
                if self.expires_at.is_some_and(|at| at <= now) =>
            {
                CodeStatus::Expired
            }
            status => status,
        }
    }

    /// Stored status still reads non-terminal although the code has expired
    pub fn is_lazily_expired(&self, now: DateTime<Utc>) -> bool {
        self.status != CodeStatus::Expired && self.effective_status(now) == CodeStatus::Expired
    }

    /// Replace the stored status with the effective one
    pub fn observed(mut self, now: DateTime<Utc>) -> Self {
        self.status = self.effective_status(now);
        self
    }

    pub fn remaining_uses(&self) -> i32 {
        self.max_uses - self.usage_count
    }

    pub fn is_owned_by(&self, user_id: Uuid) -> bool {
        self.owner_id == Some(user_id)
    }

    /// Consume one use
    pub fn redeem(&mut self, now: DateTime<Utc>) -> AccessResult<()> {
        let status = self.effective_status(now);
        if status.is_terminal() {
            return Err(AccessError::Terminal { status });
        }
        if status == CodeStatus::Inactive {
            return Err(AccessError::NotActivated);
        }
        if self.usage_count >= self.max_uses {
            return Err(AccessError::Terminal {
                status: CodeStatus::Used,
            });
        }

        self.usage_count += 1;
        if self.usage_count == self.max_uses {
            self.status = CodeStatus::Used;
        }
        Ok(())
    }

    /// inactive -> active
    pub fn activate(&mut self, now: DateTime<Utc>) -> AccessResult<()> {
        let status = self.effective_status(now);
        if status != CodeStatus::Inactive {
            return Err(AccessError::InvalidTransition {
                from: status,
                to: CodeStatus::Active,
            });
        }
        self.status = CodeStatus::Active;
        Ok(())
    }

    /// Undo an activation that was never used: active -> inactive
    pub(crate) fn release(&mut self, now: DateTime<Utc>) -> AccessResult<()> {
        let status = self.effective_status(now);
        if status != CodeStatus::Active || self.usage_count > 0 {
            return Err(AccessError::InvalidTransition {
                from: status,
                to: CodeStatus::Inactive,
            });
        }
        self.status = CodeStatus::Inactive;
        Ok(())
    }

    /// Apply an administrative edit. Every field is validated before any is
    /// applied.
    pub fn apply_quota(&mut self, update: &QuotaUpdate, now: DateTime<Utc>) -> AccessResult<()> {
        let current = self.effective_status(now);
        if current.is_terminal() {
            return Err(AccessError::Terminal { status: current });
        }

        let max_uses = update.max_uses.unwrap_or(self.max_uses);
        validate_max_uses(max_uses)?;
        if max_uses < self.usage_count {
            return Err(AccessError::InvalidValue(format!(
                "maxUses {} is below the current usage count {}",
                max_uses, self.usage_count
            )));
        }

        if let Some(expires_at) = update.expires_at {
            validate_expiry(expires_at, now)?;
        }

        let target = match update.status {
            None => current,
            Some(status @ (CodeStatus::Active | CodeStatus::Revoked)) => status,
            Some(other) => {
                return Err(AccessError::InvalidValue(format!(
                    "status can only be forced to active or revoked, not {}",
                    other
                )));
            }
        };

        self.max_uses = max_uses;
        if let Some(expires_at) = update.expires_at {
            self.expires_at = expires_at;
        }
        self.status = target;
        if self.status == CodeStatus::Active && self.usage_count >= self.max_uses {
            self.status = CodeStatus::Used;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn code(status: CodeStatus, max_uses: i32, usage_count: i32) -> AccessCode {
        let now = Utc::now();
        AccessCode {
            id: 1,
            code: "ABCD2345".to_string(),
            status,
            max_uses,
            usage_count,
            expires_at: None,
            match_id: None,
            type_match: None,
            owner_id: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_status_round_trips_through_its_string_form() {
        for status in CodeStatus::ALL {
            assert_eq!(status.as_str().parse::<CodeStatus>(), Ok(status));
        }
        assert!("paid".parse::<CodeStatus>().is_err());
    }

    #[test]
    fn test_elapsed_expiry_overrides_stored_status() {
        let now = Utc::now();
        let mut active = code(CodeStatus::Active, 3, 0);
        active.expires_at = Some(now - Duration::minutes(1));
        assert_eq!(active.effective_status(now), CodeStatus::Expired);
        assert!(active.is_lazily_expired(now));

        let mut inactive = code(CodeStatus::Inactive, 1, 0);
        inactive.expires_at = Some(now);
        assert_eq!(inactive.effective_status(now), CodeStatus::Expired);
    }

    #[test]
    fn test_expiry_does_not_rewrite_other_terminal_statuses() {
        let now = Utc::now();
        let mut revoked = code(CodeStatus::Revoked, 1, 0);
        revoked.expires_at = Some(now - Duration::days(1));
        assert_eq!(revoked.effective_status(now), CodeStatus::Revoked);

        let mut used = code(CodeStatus::Used, 1, 1);
        used.expires_at = Some(now - Duration::days(1));
        assert_eq!(used.effective_status(now), CodeStatus::Used);
    }

    #[test]
    fn test_future_expiry_keeps_status() {
        let now = Utc::now();
        let mut active = code(CodeStatus::Active, 1, 0);
        active.expires_at = Some(now + Duration::hours(1));
        assert_eq!(active.effective_status(now), CodeStatus::Active);
        assert!(!active.is_lazily_expired(now));
    }

    #[test]
    fn test_redeem_moves_to_used_on_last_use() {
        let now = Utc::now();
        let mut c = code(CodeStatus::Active, 2, 0);

        c.redeem(now).unwrap();
        assert_eq!(c.status, CodeStatus::Active);
        assert_eq!(c.usage_count, 1);

        c.redeem(now).unwrap();
        assert_eq!(c.status, CodeStatus::Used);
        assert_eq!(c.usage_count, 2);

        let err = c.redeem(now).unwrap_err();
        assert!(matches!(
            err,
            AccessError::Terminal {
                status: CodeStatus::Used
            }
        ));
        assert_eq!(c.usage_count, 2);
    }

    #[test]
    fn test_redeem_rejects_inactive_and_expired() {
        let now = Utc::now();
        let mut inactive = code(CodeStatus::Inactive, 1, 0);
        assert!(matches!(
            inactive.redeem(now),
            Err(AccessError::NotActivated)
        ));

        let mut expired = code(CodeStatus::Active, 1, 0);
        expired.expires_at = Some(now - Duration::seconds(1));
        assert!(matches!(
            expired.redeem(now),
            Err(AccessError::Terminal {
                status: CodeStatus::Expired
            })
        ));
        assert_eq!(expired.usage_count, 0);
    }

    #[test]
    fn test_activate_only_from_inactive() {
        let now = Utc::now();
        let mut c = code(CodeStatus::Inactive, 1, 0);
        c.activate(now).unwrap();
        assert_eq!(c.status, CodeStatus::Active);

        let err = c.activate(now).unwrap_err();
        assert!(matches!(
            err,
            AccessError::InvalidTransition {
                from: CodeStatus::Active,
                to: CodeStatus::Active
            }
        ));
    }

    #[test]
    fn test_release_requires_unused_active_code() {
        let now = Utc::now();
        let mut c = code(CodeStatus::Active, 2, 0);
        c.release(now).unwrap();
        assert_eq!(c.status, CodeStatus::Inactive);

        let mut used_once = code(CodeStatus::Active, 2, 1);
        assert!(used_once.release(now).is_err());
    }

    #[test]
    fn test_quota_cannot_drop_below_usage() {
        let now = Utc::now();
        let mut c = code(CodeStatus::Active, 5, 3);
        let update = QuotaUpdate {
            max_uses: Some(2),
            ..Default::default()
        };
        assert!(matches!(
            c.apply_quota(&update, now),
            Err(AccessError::InvalidValue(_))
        ));
        assert_eq!(c.max_uses, 5);
    }

    #[test]
    fn test_quota_narrowed_to_usage_marks_used() {
        let now = Utc::now();
        let mut c = code(CodeStatus::Active, 5, 3);
        let update = QuotaUpdate {
            max_uses: Some(3),
            ..Default::default()
        };
        c.apply_quota(&update, now).unwrap();
        assert_eq!(c.status, CodeStatus::Used);
    }

    #[test]
    fn test_quota_rejects_unforceable_status_without_side_effects() {
        let now = Utc::now();
        let mut c = code(CodeStatus::Active, 5, 0);
        let update = QuotaUpdate {
            status: Some(CodeStatus::Used),
            max_uses: Some(9),
            expires_at: None,
        };
        assert!(matches!(
            c.apply_quota(&update, now),
            Err(AccessError::InvalidValue(_))
        ));
        assert_eq!(c.max_uses, 5);
        assert_eq!(c.status, CodeStatus::Active);
    }

    #[test]
    fn test_quota_on_terminal_code_is_refused() {
        let now = Utc::now();
        let mut c = code(CodeStatus::Revoked, 1, 0);
        let update = QuotaUpdate {
            status: Some(CodeStatus::Active),
            ..Default::default()
        };
        assert!(matches!(
            c.apply_quota(&update, now),
            Err(AccessError::Terminal {
                status: CodeStatus::Revoked
            })
        ));
    }

    #[test]
    fn test_quota_update_expiry_can_be_cleared() {
        let update: QuotaUpdate = serde_json::from_str(r#"{"expiresAt": null}"#).unwrap();
        assert_eq!(update.expires_at, Some(None));

        let untouched: QuotaUpdate = serde_json::from_str(r#"{"maxUses": 4}"#).unwrap();
        assert_eq!(untouched.expires_at, None);

        let now = Utc::now();
        let mut c = code(CodeStatus::Active, 1, 0);
        c.expires_at = Some(now + Duration::hours(2));
        c.apply_quota(&update, now).unwrap();
        assert_eq!(c.expires_at, None);
    }

    #[test]
    fn test_spec_defaults_to_single_use() {
        let now = Utc::now();
        let new = CodeSpec::default()
            .into_new("XYZ".to_string(), CodeStatus::Inactive, None, now)
            .unwrap();
        assert_eq!(new.max_uses, 1);

        let past = CodeSpec {
            expires_at: Some(now - Duration::hours(1)),
            ..Default::default()
        };
        assert!(
            past.into_new("XYZ".to_string(), CodeStatus::Active, None, now)
                .is_err()
        );
    }
}
