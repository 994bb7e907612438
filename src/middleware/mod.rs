pub mod auth;
pub mod request_logger;

pub use auth::{internal_auth, CallerId, INTERNAL_SECRET_HEADER, USER_ID_HEADER};
pub use request_logger::request_logger_middleware;
