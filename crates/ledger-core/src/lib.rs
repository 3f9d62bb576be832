//! ledger-core — wire codec, cryptographic primitives, error records, and
//! configuration. All other ledger crates depend on this one.

pub mod codec;
pub mod config;
pub mod crypto;
pub mod error;

pub use codec::Payload;
pub use error::{ErrorCode, ErrorRecord};
