//! Common types and utilities shared across the static agent stack.
//!
//! This crate provides:
//! - Base58 encoding/decoding of verification keys ([`base58`])
//! - Ed25519 → X25519 key conversion and symmetric helpers ([`crypto`])
//! - Authcrypt/anoncrypt wire envelopes ([`envelope`])
//! - Key type definitions and protocol constants ([`types`])

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod base58;
pub mod crypto;
pub mod envelope;
pub mod types;

pub use crypto::CryptoError;
pub use envelope::{Envelope, Unpacked};
pub use types::PublicKey;
