//! HTTP middleware and request-scoped extractors

pub mod request_id;
pub mod user_id;

pub use request_id::{REQUEST_ID_HEADER, RequestId, request_id_middleware};
pub use user_id::{USER_ID_HEADER, UserId};
