//! # NoCaptcha Common
//!
//! Shared types and utilities used across NoCaptcha components.
//!
//! ## Modules
//! - `id` - Monotonic, time-ordered identifiers
//! - `error` - Error taxonomy and the error code registry
//! - `types` - Result envelope and wire types
//! - `constants` - Shared configuration constants

pub mod constants;
pub mod error;
pub mod id;
pub mod types;

pub use error::{ErrorCode, ErrorKind, NoCaptchaError};
pub use id::{IdGenerator, Identifier};
pub use types::*;
