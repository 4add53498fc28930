//! # Portcullis - login-abuse challenge guard
//!
//! Sits in front of an OAuth2 token endpoint, counts failed logins per
//! caller, and demands a human-verification token once a caller reaches the
//! configured failure threshold.
//!
//! ## Architecture
//! ```text
//! Client → Portcullis (/connect/token) → Token endpoint
//!              ↓              ↓
//!        Failure ledger   Verifier
//!       (memory/Redis)   (recaptcha)
//! ```

pub mod config;
pub mod events;
pub mod guard;
pub mod ledger;
pub mod pipeline;
pub mod protocol;
pub mod routes;
pub mod state;
pub mod verifier;

#[cfg(test)]
mod testing;
