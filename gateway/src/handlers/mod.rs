//! HTTP request handlers
//!
//! - `api` - Health check and the unknown-route fallback
//! - `admin` - Credential issuance and activation
//! - `tts` - Speech synthesis
//! - `usage` - Per-identity usage statistics
//! - `voices` - Voice listing and creation

pub mod admin;
pub mod api;
pub mod tts;
pub mod usage;
pub mod voices;
