//! Access-code core models

pub mod access_code;
pub mod actor;
pub mod payment_request;
pub mod query;

// Re-export for convenience
pub use access_code::{
    AccessCode, CodeSpec, CodeStatus, NewAccessCode, QuotaUpdate, Redemption, validate_expiry,
    validate_max_uses,
};
pub use actor::{ADMIN_ROLE, Actor, Role};
pub use payment_request::{
    Approval, DEFAULT_PAYMENT_TYPE, NewPaymentRequest, PaymentRequest, PaymentStats,
    PaymentStatus, PaymentStatusView, PaymentSubmission, StatsRange,
};
pub use query::{CodeQuery, DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT, Page, PaymentQuery};
