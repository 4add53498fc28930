//! # Portcullis Common
//!
//! Shared types, errors, and constants used across Portcullis components.
//!
//! ## Modules
//! - `types` - Core data structures (VerificationVerdict, ChallengeOutcome, etc.)
//! - `error` - Common error types
//! - `constants` - Shared configuration constants

pub mod constants;
pub mod error;
pub mod types;

pub use error::PortcullisError;
pub use types::*;
