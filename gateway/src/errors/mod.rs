//! Error taxonomy for the gateway.
//!
//! Every failure surfaced over HTTP is rendered as
//! `{"error": <code>, "message": <human readable>}`.

pub mod app_error;
pub mod auth_error;

pub use app_error::{AppError, AppResult, ErrorBody, NotFoundError, ValidationError};
pub use auth_error::{AuthError, AuthResult};
