//! Cryptographic primitives behind the envelope layer.
//!
//! Agent identities are Ed25519 keypairs. For encryption they are converted
//! to X25519 and used with HPKE (RFC 9180) to wrap a per-message content key;
//! the payload itself is sealed once with ChaCha20Poly1305 under that key.
//!
//! Ciphersuite: X25519-HKDF-SHA256 / HKDF-SHA256 / ChaCha20Poly1305

use crate::types::PublicKey;
use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use ed25519_dalek::{SigningKey, VerifyingKey};
use hpke::aead::ChaCha20Poly1305 as HpkeChaCha20Poly1305;
use hpke::kdf::HkdfSha256;
use hpke::kem::X25519HkdfSha256;
use hpke::{Deserializable, Kem as KemTrait, OpModeR, OpModeS, Serializable};
use rand::RngCore;
use rand_core::TryRngCore;
use thiserror::Error;
use zeroize::Zeroizing;

type Kem = X25519HkdfSha256;
type HpkePrivateKey = <Kem as KemTrait>::PrivateKey;
type HpkePublicKey = <Kem as KemTrait>::PublicKey;

/// Size of a content encryption key.
pub const CONTENT_KEY_SIZE: usize = 32;
/// Size of a payload nonce.
pub const NONCE_SIZE: usize = 12;
/// Size of a Poly1305 authentication tag.
pub const TAG_SIZE: usize = 16;
/// Size of the encapsulated key for X25519.
pub const ENCAPPED_KEY_LEN: usize = 32;

/// Errors from envelope packing and unpacking.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Packing was requested with an empty recipient list.
    #[error("no recipients to pack for")]
    NoRecipients,
    /// An Ed25519 public key is not a valid curve point.
    #[error("invalid ed25519 key: {0}")]
    InvalidKey(#[from] ed25519_dalek::SignatureError),
    /// HPKE operation failed while sealing.
    #[error("hpke: {0}")]
    Hpke(#[from] hpke::HpkeError),
    /// The envelope is structurally invalid.
    #[error("malformed envelope: {0}")]
    Malformed(String),
    /// None of the recipient entries is addressed to the local key.
    #[error("envelope is not addressed to this key")]
    NotForMe,
    /// Key unwrapping or payload authentication failed.
    #[error("decryption failed")]
    Decryption,
}

/// Convert an Ed25519 `SigningKey` into an HPKE X25519 keypair.
fn to_hpke_keypair(sk: &SigningKey) -> Result<(HpkePrivateKey, HpkePublicKey), CryptoError> {
    let x_priv_bytes = Zeroizing::new(sk.to_scalar_bytes());
    let x_pub_bytes = sk.verifying_key().to_montgomery().to_bytes();
    let priv_key = HpkePrivateKey::from_bytes(x_priv_bytes.as_ref())?;
    let pub_key = HpkePublicKey::from_bytes(&x_pub_bytes)?;
    Ok((priv_key, pub_key))
}

/// Convert an Ed25519 verification key into an HPKE X25519 public key.
fn to_hpke_public(verkey: &PublicKey) -> Result<HpkePublicKey, CryptoError> {
    let vk = VerifyingKey::from_bytes(verkey)?;
    let x_pub = vk.to_montgomery().to_bytes();
    Ok(HpkePublicKey::from_bytes(&x_pub)?)
}

/// Output of an HPKE single-shot seal: `(encapped_key, ciphertext)`.
pub type Sealed = (Vec<u8>, Vec<u8>);

/// Seal `plaintext` to `recipient`.
///
/// With `sender` the seal runs in HPKE Auth mode so that opening it proves
/// possession of the sender's key; without it Base mode is used and nothing
/// about the sender is bound.
///
/// # Errors
///
/// Returns [`CryptoError`] if key conversion or encryption fails.
pub fn seal_to(
    recipient: &PublicKey,
    sender: Option<&SigningKey>,
    info: &[u8],
    plaintext: &[u8],
) -> Result<Sealed, CryptoError> {
    let recipient_pk = to_hpke_public(recipient)?;
    let mode = match sender {
        Some(sk) => OpModeS::Auth(to_hpke_keypair(sk)?),
        None => OpModeS::Base,
    };
    let (encapped_key, ciphertext) =
        hpke::single_shot_seal::<HpkeChaCha20Poly1305, HkdfSha256, Kem, _>(
            &mode,
            &recipient_pk,
            info,
            plaintext,
            b"",
            &mut rand_core::OsRng.unwrap_err(),
        )?;
    Ok((encapped_key.to_bytes().to_vec(), ciphertext))
}

/// Open a value sealed with [`seal_to`].
///
/// `sender` must be the verkey used for an Auth-mode seal, or `None` for Base.
/// Every failure is reported as [`CryptoError::Decryption`].
///
/// # Errors
///
/// Returns [`CryptoError::Decryption`] if the key is wrong or the data was
/// tampered with.
pub fn open_from(
    recipient: &SigningKey,
    sender: Option<&PublicKey>,
    info: &[u8],
    encapped_key: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let encapped = <Kem as KemTrait>::EncappedKey::from_bytes(encapped_key)
        .map_err(|_| CryptoError::Decryption)?;
    let (recipient_priv, _) = to_hpke_keypair(recipient).map_err(|_| CryptoError::Decryption)?;
    let mode = match sender {
        Some(verkey) => {
            OpModeR::Auth(to_hpke_public(verkey).map_err(|_| CryptoError::Decryption)?)
        }
        None => OpModeR::Base,
    };
    hpke::single_shot_open::<HpkeChaCha20Poly1305, HkdfSha256, Kem>(
        &mode,
        &recipient_priv,
        &encapped,
        info,
        ciphertext,
        b"",
    )
    .map_err(|_| CryptoError::Decryption)
}

/// Generate a fresh random content encryption key.
#[must_use]
pub fn generate_content_key() -> Zeroizing<[u8; CONTENT_KEY_SIZE]> {
    let mut key = Zeroizing::new([0u8; CONTENT_KEY_SIZE]);
    rand::rngs::OsRng.fill_bytes(key.as_mut());
    key
}

/// Encrypt `plaintext` under `content_key` with a fresh random nonce.
///
/// Returns `(nonce, ciphertext, tag)`.
///
/// # Errors
///
/// Returns [`CryptoError::Malformed`] if the key has the wrong length.
pub fn encrypt_payload(
    content_key: &[u8],
    plaintext: &[u8],
    aad: &[u8],
) -> Result<([u8; NONCE_SIZE], Vec<u8>, Vec<u8>), CryptoError> {
    if content_key.len() != CONTENT_KEY_SIZE {
        return Err(CryptoError::Malformed("content key must be 32 bytes".into()));
    }
    let mut nonce = [0u8; NONCE_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut nonce);

    let aead = ChaCha20Poly1305::new(Key::from_slice(content_key));
    let mut sealed = aead
        .encrypt(Nonce::from_slice(&nonce), Payload { msg: plaintext, aad })
        .map_err(|_| CryptoError::Malformed("payload encryption failed".into()))?;
    let tag = sealed.split_off(sealed.len() - TAG_SIZE);
    Ok((nonce, sealed, tag))
}

/// Decrypt and authenticate a payload produced by [`encrypt_payload`].
///
/// # Errors
///
/// Returns [`CryptoError::Decryption`] on any length mismatch or
/// authentication failure.
pub fn decrypt_payload(
    content_key: &[u8],
    nonce: &[u8],
    ciphertext: &[u8],
    tag: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    if content_key.len() != CONTENT_KEY_SIZE || nonce.len() != NONCE_SIZE || tag.len() != TAG_SIZE
    {
        return Err(CryptoError::Decryption);
    }
    let mut sealed = Vec::with_capacity(ciphertext.len() + TAG_SIZE);
    sealed.extend_from_slice(ciphertext);
    sealed.extend_from_slice(tag);

    let aead = ChaCha20Poly1305::new(Key::from_slice(content_key));
    aead.decrypt(Nonce::from_slice(nonce), Payload { msg: &sealed, aad })
        .map_err(|_| CryptoError::Decryption)
}
