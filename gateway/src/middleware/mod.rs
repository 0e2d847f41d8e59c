pub mod auth;

// Re-export middleware functions
pub use auth::{admin_middleware, auth_middleware, extract_credential};
