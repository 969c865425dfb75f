//! Base58 text form of keys.
//!
//! Verkeys travel as base58 strings in envelope `kid` and `sender`
//! fields, in forward `to` fields and in configuration. Decoding always
//! checks the byte length the caller expects, so a truncated or padded
//! key is rejected here rather than deep inside the crypto.

use crate::types::{PublicKey, DID_KEY_PREFIX_LEN, KEY_LEN};
use thiserror::Error;
use zeroize::Zeroizing;

pub use bs58::decode::Error as DecodeError;

/// A key string that does not hold a key of the expected size.
#[derive(Debug, Error)]
pub enum KeyDecodeError {
    /// Not base58 at all.
    #[error("invalid base58: {0}")]
    Base58(#[from] DecodeError),
    /// Valid base58 of the wrong size.
    #[error("expected a {expected}-byte key, got {actual} bytes")]
    Length {
        /// Size the caller asked for.
        expected: usize,
        /// Size actually decoded.
        actual: usize,
    },
}

/// Base58 (bitcoin alphabet) of `bytes`.
#[must_use]
pub fn encode(bytes: &[u8]) -> String {
    bs58::encode(bytes).into_string()
}

/// Raw bytes of a base58 string, of any length.
///
/// # Errors
///
/// Returns `DecodeError` on characters outside the alphabet.
pub fn decode(s: &str) -> Result<Vec<u8>, DecodeError> {
    bs58::decode(s).into_vec()
}

/// Decode a base58 string holding exactly `N` bytes.
///
/// # Errors
///
/// [`KeyDecodeError::Base58`] for bad input, [`KeyDecodeError::Length`]
/// when it decodes to any other size.
pub fn decode_exact<const N: usize>(s: &str) -> Result<[u8; N], KeyDecodeError> {
    let bytes = decode(s)?;
    <[u8; N]>::try_from(bytes.as_slice()).map_err(|_| KeyDecodeError::Length {
        expected: N,
        actual: bytes.len(),
    })
}

/// Decode a verkey.
///
/// ```
/// use staticagent_common::base58;
/// let vk = base58::decode_key("11111111111111111111111111111111").unwrap();
/// assert_eq!(vk, [0u8; 32]);
/// assert!(base58::decode_key("1111").is_err());
/// ```
///
/// # Errors
///
/// See [`decode_exact`].
pub fn decode_key(s: &str) -> Result<PublicKey, KeyDecodeError> {
    decode_exact::<KEY_LEN>(s)
}

/// Decode secret key material. The buffer is wiped when dropped; its
/// length is left for the caller to check.
///
/// # Errors
///
/// Returns `DecodeError` on characters outside the alphabet.
pub fn decode_secret(s: &str) -> Result<Zeroizing<Vec<u8>>, DecodeError> {
    decode(s).map(Zeroizing::new)
}

/// Short DID of a verkey: base58 of its first 16 bytes.
#[must_use]
pub fn did_from_verkey(verkey: &PublicKey) -> String {
    encode(&verkey[..DID_KEY_PREFIX_LEN])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bitcoin_alphabet_vectors() {
        assert_eq!(encode(b"hello world"), "StV1DL6CwTryKyV");
        assert_eq!(encode(&[0, 0, 1]), "112");
        assert_eq!(decode("StV1DL6CwTryKyV").unwrap(), b"hello world");
    }

    #[test]
    fn key_length_is_enforced_both_ways() {
        let short = encode(&[5u8; 16]);
        assert!(matches!(
            decode_key(&short),
            Err(KeyDecodeError::Length {
                expected: 32,
                actual: 16
            })
        ));
        let long = encode(&[5u8; 33]);
        assert!(matches!(
            decode_key(&long),
            Err(KeyDecodeError::Length { actual: 33, .. })
        ));
        assert!(matches!(
            decode_key(""),
            Err(KeyDecodeError::Length { actual: 0, .. })
        ));
    }

    #[test]
    fn ambiguous_characters_are_not_base58() {
        // '0', 'O', 'I' and 'l' are left out of the alphabet.
        for bad in ["0", "O", "I", "l"] {
            assert!(matches!(decode_key(bad), Err(KeyDecodeError::Base58(_))));
        }
    }

    #[test]
    fn decode_exact_handles_other_sizes() {
        let sig = [3u8; 64];
        assert_eq!(decode_exact::<64>(&encode(&sig)).unwrap(), sig);
        assert!(decode_exact::<64>(&encode(&[3u8; 32])).is_err());
    }

    #[test]
    fn secrets_decode_at_any_length() {
        let secret = decode_secret(&encode(&[9u8; 64])).unwrap();
        assert_eq!(secret.len(), 64);
        assert!(decode_secret("0").is_err());
    }

    #[test]
    fn did_is_the_verkey_prefix() {
        let mut vk = [0u8; 32];
        vk[..16].fill(7);
        vk[16..].fill(9);
        let did = did_from_verkey(&vk);
        assert_eq!(decode(&did).unwrap(), [7u8; 16]);
        assert_ne!(did, did_from_verkey(&[9u8; 32]));
    }
}
