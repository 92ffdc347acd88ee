//! Services owning every state transition of access codes and payment
//! requests

pub mod access_code_service;
pub mod payment_service;

pub use access_code_service::AccessCodeService;
pub use payment_service::PaymentFulfillmentService;
