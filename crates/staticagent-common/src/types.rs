//! Core type definitions and protocol constants.

/// A 32-byte Ed25519 verification key identifying an agent.
pub type PublicKey = [u8; 32];

/// Length in bytes of a verification key.
pub const KEY_LEN: usize = 32;

/// Number of leading verkey bytes that make up a key-derived DID.
pub const DID_KEY_PREFIX_LEN: usize = 16;

/// Content type for packed agent messages sent over HTTP.
pub const WIRE_CONTENT_TYPE: &str = "application/ssi-agent-wire";

/// `typ` value carried in every protected envelope header.
pub const ENVELOPE_TYP: &str = "JWM/1.0";

/// Envelope `alg` values.
pub mod alg {
    /// Sender authenticated to each recipient.
    pub const AUTHCRYPT: &str = "Authcrypt";
    /// Sender not revealed.
    pub const ANONCRYPT: &str = "Anoncrypt";
}

/// Content encryption scheme named in the protected header.
pub const CONTENT_ENC: &str = "chacha20poly1305_ietf";
