//! Payment request model and its transition rules

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{AccessError, AccessResult};
use crate::models::AccessCode;

/// Purchase category used when the client does not name one
pub const DEFAULT_PAYMENT_TYPE: &str = "access_code";

const MAX_TEXT_LEN: usize = 500;

/// Lifecycle status of a payment request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Rejected,
    Cancelled,
}

impl PaymentStatus {
    pub const ALL: [PaymentStatus; 4] = [
        PaymentStatus::Pending,
        PaymentStatus::Completed,
        PaymentStatus::Rejected,
        PaymentStatus::Cancelled,
    ];

    /// Get the status as its stored string
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Rejected => "rejected",
            PaymentStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PaymentStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown payment status '{}'", s))
    }
}

/// Payment request entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    pub id: i64,
    /// Bank-transfer memo; immutable and unique
    pub code_pay: String,
    pub owner_id: Uuid,
    pub amount: i64,
    #[serde(rename = "type")]
    pub payment_type: String,
    pub description: Option<String>,
    pub status: PaymentStatus,
    pub note: Option<String>,
    pub rejection_reason: Option<String>,
    /// Pre-reserved inactive code to activate on approval
    pub access_code: Option<String>,
    /// Code provisioned by the approval
    pub access_code_id: Option<i64>,
    /// Quota of the code created on approval when none was reserved
    pub requested_uses: i32,
    #[serde(skip)]
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// What an unauthenticated poll by payment reference may see. Leaves out
/// the owner and the reserved or provisioned code.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentStatusView {
    pub code_pay: String,
    pub status: PaymentStatus,
    pub amount: i64,
    #[serde(rename = "type")]
    pub payment_type: String,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl From<PaymentRequest> for PaymentStatusView {
    fn from(request: PaymentRequest) -> Self {
        Self {
            code_pay: request.code_pay,
            status: request.status,
            amount: request.amount,
            payment_type: request.payment_type,
            created_at: request.created_at,
            processed_at: request.processed_at,
        }
    }
}

/// Client purchase request payload
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSubmission {
    pub amount: i64,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub payment_type: Option<String>,
    pub access_code: Option<String>,
    pub requested_uses: Option<i32>,
}

/// Insert payload handed to a [`crate::store::PaymentRequestStore`]
#[derive(Debug, Clone)]
pub struct NewPaymentRequest {
    pub code_pay: String,
    pub owner_id: Uuid,
    pub amount: i64,
    pub payment_type: String,
    pub description: Option<String>,
    pub access_code: Option<String>,
    pub requested_uses: i32,
}

/// Result of an approval: the completed request and the code it provisioned
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Approval {
    pub payment: PaymentRequest,
    pub access_code: AccessCode,
}

/// Creation-date window for [`PaymentStats`]; either bound may be open
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsRange {
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

impl StatsRange {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start_date.is_none_or(|start| at >= start) && self.end_date.is_none_or(|end| at < end)
    }
}

/// Aggregate payment counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentStats {
    pub total_requests: i64,
    /// Sum over completed requests
    pub total_amount: i64,
    pub pending_count: i64,
    pub completed_today: i64,
    pub rejected_today: i64,
}

fn clean_text(field: &str, value: Option<String>) -> AccessResult<Option<String>> {
    let Some(value) = value else {
        return Ok(None);
    };
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    if trimmed.chars().count() > MAX_TEXT_LEN {
        return Err(AccessError::InvalidValue(format!(
            "{} must be at most {} characters",
            field, MAX_TEXT_LEN
        )));
    }
    Ok(Some(trimmed.to_string()))
}

impl PaymentSubmission {
    /// Validate the submission and resolve defaults into an insert payload
    pub fn into_new(self, code_pay: String, owner_id: Uuid) -> AccessResult<NewPaymentRequest> {
        if self.amount <= 0 {
            return Err(AccessError::InvalidValue(format!(
                "amount must be positive, got {}",
                self.amount
            )));
        }

        let requested_uses = self.requested_uses.unwrap_or(1);
        crate::models::validate_max_uses(requested_uses)?;

        let payment_type = clean_text("type", self.payment_type)?
            .unwrap_or_else(|| DEFAULT_PAYMENT_TYPE.to_string());

        Ok(NewPaymentRequest {
            code_pay,
            owner_id,
            amount: self.amount,
            payment_type,
            description: clean_text("description", self.description)?,
            access_code: clean_text("accessCode", self.access_code)?,
            requested_uses,
        })
    }
}

impl PaymentRequest {
    pub fn is_owned_by(&self, user_id: Uuid) -> bool {
        self.owner_id == user_id
    }

    fn ensure_pending(&self) -> AccessResult<()> {
        if self.status != PaymentStatus::Pending {
            return Err(AccessError::NotPending {
                status: self.status,
            });
        }
        Ok(())
    }

    /// Trim and bound an approval note without touching the request
    pub fn validate_note(note: Option<String>) -> AccessResult<Option<String>> {
        clean_text("note", note)
    }

    /// pending -> completed, linking the provisioned code
    pub fn complete(
        &mut self,
        access_code_id: i64,
        note: Option<String>,
        now: DateTime<Utc>,
    ) -> AccessResult<()> {
        self.ensure_pending()?;
        self.note = clean_text("note", note)?;
        self.status = PaymentStatus::Completed;
        self.access_code_id = Some(access_code_id);
        self.processed_at = Some(now);
        Ok(())
    }

    /// pending -> rejected
    pub fn reject(&mut self, reason: Option<String>, now: DateTime<Utc>) -> AccessResult<()> {
        self.ensure_pending()?;
        self.rejection_reason = clean_text("reason", reason)?;
        self.status = PaymentStatus::Rejected;
        self.processed_at = Some(now);
        Ok(())
    }

    /// pending -> cancelled
    pub fn cancel(&mut self, reason: Option<String>, now: DateTime<Utc>) -> AccessResult<()> {
        self.ensure_pending()?;
        self.rejection_reason = clean_text("reason", reason)?;
        self.status = PaymentStatus::Cancelled;
        self.processed_at = Some(now);
        Ok(())
    }

    /// Fails with `NotPending` unless the request can still be processed
    pub fn check_pending(&self) -> AccessResult<()> {
        self.ensure_pending()
    }
}
