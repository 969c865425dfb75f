//! Authcrypt and anoncrypt wire envelopes.
//!
//! A payload is encrypted once under a random content key; the content key
//! is then wrapped separately for every recipient. Authcrypt additionally
//! seals the sender's verkey to each recipient, so the outer structure never
//! reveals who sent the message.
//!
//! Wire shape (JSON):
//!
//! ```text
//! { "protected": b64u({ enc, typ, alg, recipients: [
//!       { encrypted_key, header: { kid, enc, sender? } } ] }),
//!   "iv": b64u, "ciphertext": b64u, "tag": b64u }
//! ```

use crate::base58;
use crate::crypto::{self, CryptoError, ENCAPPED_KEY_LEN};
use crate::types::{alg, PublicKey, CONTENT_ENC, ENVELOPE_TYP};
use base64::engine::general_purpose::URL_SAFE_NO_PAD as B64;
use base64::Engine;
use ed25519_dalek::SigningKey;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

/// HPKE info string for content key wrapping.
const KEY_WRAP_INFO: &[u8] = b"staticagent-cek-v1";
/// HPKE info string for the per-recipient sealed sender verkey.
const SENDER_INFO: &[u8] = b"staticagent-sender-v1";

/// Outer envelope as it travels on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Base64url protected header; also the payload AAD.
    pub protected: String,
    /// Base64url payload nonce.
    pub iv: String,
    /// Base64url payload ciphertext.
    pub ciphertext: String,
    /// Base64url payload authentication tag.
    pub tag: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct Protected {
    enc: String,
    typ: String,
    alg: String,
    recipients: Vec<Recipient>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Recipient {
    encrypted_key: String,
    header: RecipientHeader,
}

#[derive(Debug, Serialize, Deserialize)]
struct RecipientHeader {
    kid: String,
    enc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sender: Option<String>,
}

/// Result of successfully opening an envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unpacked {
    /// Decrypted payload bytes.
    pub plaintext: Vec<u8>,
    /// Sender verkey, present only for authcrypt.
    pub sender: Option<PublicKey>,
    /// Local verkey the envelope was opened with.
    pub recipient: PublicKey,
}

impl Envelope {
    /// Parses an envelope from JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Malformed`] if the bytes are not an envelope.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        serde_json::from_slice(bytes).map_err(|e| CryptoError::Malformed(e.to_string()))
    }

    /// Parses an envelope from an already decoded JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Malformed`] if the value is not an envelope.
    pub fn from_value(value: &serde_json::Value) -> Result<Self, CryptoError> {
        Self::deserialize(value).map_err(|e| CryptoError::Malformed(e.to_string()))
    }

    /// Serializes the envelope as JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Malformed`] if serialization fails.
    pub fn to_vec(&self) -> Result<Vec<u8>, CryptoError> {
        serde_json::to_vec(self).map_err(|e| CryptoError::Malformed(e.to_string()))
    }

    /// Converts the envelope into a JSON value for nesting in another message.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Malformed`] if serialization fails.
    pub fn to_value(&self) -> Result<serde_json::Value, CryptoError> {
        serde_json::to_value(self).map_err(|e| CryptoError::Malformed(e.to_string()))
    }

    /// Base58 kids of every recipient entry, in packing order.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Malformed`] if the protected header is invalid.
    pub fn recipient_kids(&self) -> Result<Vec<String>, CryptoError> {
        Ok(decode_protected(&self.protected)?
            .recipients
            .into_iter()
            .map(|r| r.header.kid)
            .collect())
    }
}

fn b64_decode(field: &str, value: &str) -> Result<Vec<u8>, CryptoError> {
    B64.decode(value)
        .map_err(|e| CryptoError::Malformed(format!("{field}: {e}")))
}

fn decode_protected(protected: &str) -> Result<Protected, CryptoError> {
    let raw = b64_decode("protected", protected)?;
    serde_json::from_slice(&raw).map_err(|e| CryptoError::Malformed(format!("protected: {e}")))
}

/// Pack `plaintext` for every key in `recipients`.
///
/// With `sender` the envelope is authcrypted: each recipient can recover and
/// authenticate the sender's verkey only after decrypting its own entry.
/// Without it the envelope is anoncrypted and carries no sender information.
///
/// # Errors
///
/// Returns [`CryptoError::NoRecipients`] for an empty recipient list, or
/// another [`CryptoError`] if a key is invalid or encryption fails.
///
/// # Examples
///
/// ```
/// use ed25519_dalek::SigningKey;
/// use staticagent_common::envelope;
///
/// let alice = SigningKey::from_bytes(&[1u8; 32]);
/// let bob = SigningKey::from_bytes(&[2u8; 32]);
/// let bob_vk = bob.verifying_key().to_bytes();
///
/// let packed = envelope::pack(b"hi", &[bob_vk], Some(&alice)).unwrap();
/// let opened = envelope::unpack(&packed, &bob).unwrap();
/// assert_eq!(opened.plaintext, b"hi");
/// assert_eq!(opened.sender, Some(alice.verifying_key().to_bytes()));
/// ```
pub fn pack(
    plaintext: &[u8],
    recipients: &[PublicKey],
    sender: Option<&SigningKey>,
) -> Result<Envelope, CryptoError> {
    if recipients.is_empty() {
        return Err(CryptoError::NoRecipients);
    }

    let content_key = crypto::generate_content_key();
    let sender_vk_b58 = sender.map(|sk| base58::encode(sk.verifying_key().as_bytes()));

    let mut entries = Vec::with_capacity(recipients.len());
    for recipient in recipients {
        let (enc, wrapped) =
            crypto::seal_to(recipient, sender, KEY_WRAP_INFO, content_key.as_ref())?;
        let sealed_sender = match &sender_vk_b58 {
            Some(vk) => {
                let (s_enc, s_ct) = crypto::seal_to(recipient, None, SENDER_INFO, vk.as_bytes())?;
                let mut blob = s_enc;
                blob.extend_from_slice(&s_ct);
                Some(B64.encode(blob))
            }
            None => None,
        };
        entries.push(Recipient {
            encrypted_key: B64.encode(wrapped),
            header: RecipientHeader {
                kid: base58::encode(recipient),
                enc: B64.encode(enc),
                sender: sealed_sender,
            },
        });
    }

    let protected = Protected {
        enc: CONTENT_ENC.to_string(),
        typ: ENVELOPE_TYP.to_string(),
        alg: if sender.is_some() {
            alg::AUTHCRYPT
        } else {
            alg::ANONCRYPT
        }
        .to_string(),
        recipients: entries,
    };
    let protected_json =
        serde_json::to_vec(&protected).map_err(|e| CryptoError::Malformed(e.to_string()))?;
    let protected_b64 = B64.encode(protected_json);

    let (nonce, ciphertext, tag) =
        crypto::encrypt_payload(content_key.as_ref(), plaintext, protected_b64.as_bytes())?;

    Ok(Envelope {
        protected: protected_b64,
        iv: B64.encode(nonce),
        ciphertext: B64.encode(ciphertext),
        tag: B64.encode(tag),
    })
}

/// Open an envelope with the local signing key.
///
/// # Errors
///
/// Returns [`CryptoError::Malformed`] for structural problems,
/// [`CryptoError::NotForMe`] if no entry is addressed to `my_key`, and
/// [`CryptoError::Decryption`] for any failure after that point.
pub fn unpack(envelope: &Envelope, my_key: &SigningKey) -> Result<Unpacked, CryptoError> {
    let protected = decode_protected(&envelope.protected)?;
    let authcrypt = match protected.alg.as_str() {
        alg::AUTHCRYPT => true,
        alg::ANONCRYPT => false,
        other => return Err(CryptoError::Malformed(format!("unsupported alg {other}"))),
    };

    let my_vk = my_key.verifying_key().to_bytes();
    let my_kid = base58::encode(&my_vk);
    let entry = protected
        .recipients
        .iter()
        .find(|r| r.header.kid == my_kid)
        .ok_or(CryptoError::NotForMe)?;

    let enc = b64_decode("enc", &entry.header.enc)?;
    let wrapped = b64_decode("encrypted_key", &entry.encrypted_key)?;
    let iv = b64_decode("iv", &envelope.iv)?;
    let ciphertext = b64_decode("ciphertext", &envelope.ciphertext)?;
    let tag = b64_decode("tag", &envelope.tag)?;

    let sender = if authcrypt {
        let blob = entry
            .header
            .sender
            .as_deref()
            .ok_or_else(|| CryptoError::Malformed("authcrypt entry without sender".into()))?;
        let blob = b64_decode("sender", blob)?;
        if blob.len() <= ENCAPPED_KEY_LEN {
            return Err(CryptoError::Decryption);
        }
        let (s_enc, s_ct) = blob.split_at(ENCAPPED_KEY_LEN);
        let sender_b58 = crypto::open_from(my_key, None, SENDER_INFO, s_enc, s_ct)?;
        let sender_b58 = std::str::from_utf8(&sender_b58).map_err(|_| CryptoError::Decryption)?;
        Some(base58::decode_key(sender_b58).map_err(|_| CryptoError::Decryption)?)
    } else {
        None
    };

    let content_key = Zeroizing::new(crypto::open_from(
        my_key,
        sender.as_ref(),
        KEY_WRAP_INFO,
        &enc,
        &wrapped,
    )?);
    let plaintext = crypto::decrypt_payload(
        content_key.as_ref(),
        &iv,
        &ciphertext,
        &tag,
        envelope.protected.as_bytes(),
    )?;

    Ok(Unpacked {
        plaintext,
        sender,
        recipient: my_vk,
    })
}

/// Parse and open an envelope from JSON bytes.
///
/// # Errors
///
/// See [`Envelope::from_slice`] and [`unpack`].
pub fn unpack_slice(bytes: &[u8], my_key: &SigningKey) -> Result<Unpacked, CryptoError> {
    unpack(&Envelope::from_slice(bytes)?, my_key)
}
