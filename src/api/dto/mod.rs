//! Data Transfer Objects for REST request/response serialization.
//!
//! All monetary amounts are serialized as JSON strings to prevent
//! precision loss.

pub mod donation_dto;
pub mod payment_dto;

pub use donation_dto::*;
pub use payment_dto::*;
