use crate::error::{Error, Result};
use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;
use staticagent_common::{base58, PublicKey};
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::Path;

const KEY_FILE_PERMS: u32 = 0o600;

/// Length of the libsodium-style secret key: `seed ‖ verkey`.
pub const SIGKEY_LEN: usize = 64;

/// An agent's identity keypair.
#[derive(Clone)]
pub struct Keys {
    signing: SigningKey,
}

impl Keys {
    /// Generate a fresh keypair using OS randomness.
    #[must_use]
    pub fn generate() -> Self {
        Self {
            signing: SigningKey::generate(&mut OsRng),
        }
    }

    /// Derive a keypair deterministically from a 32-byte seed.
    #[must_use]
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing: SigningKey::from_bytes(seed),
        }
    }

    /// Load keys from their base58 forms.
    ///
    /// `sigkey` may be the 32-byte seed or the 64-byte `seed ‖ verkey`
    /// secret; either way the derived verkey must equal `verkey`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidKey`] if either key is malformed or they
    /// do not belong together.
    pub fn from_b58(verkey: &str, sigkey: &str) -> Result<Self> {
        let verkey = base58::decode_key(verkey)?;
        let secret = base58::decode_secret(sigkey)
            .map_err(|e| Error::InvalidKey(format!("sigkey: {e}")))?;
        Self::from_parts(&verkey, &secret)
    }

    /// Load keys from raw bytes. See [`Keys::from_b58`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidKey`] if the secret has the wrong length or
    /// does not match `verkey`.
    pub fn from_parts(verkey: &PublicKey, sigkey: &[u8]) -> Result<Self> {
        let seed: [u8; 32] = match sigkey.len() {
            32 | SIGKEY_LEN => sigkey[..32]
                .try_into()
                .map_err(|_| Error::InvalidKey("sigkey seed".to_string()))?,
            other => {
                return Err(Error::InvalidKey(format!(
                    "sigkey must be 32 or 64 bytes, got {other}"
                )))
            }
        };
        let keys = Self::from_seed(&seed);
        if keys.verkey() != *verkey {
            return Err(Error::InvalidKey(
                "sigkey does not correspond to verkey".to_string(),
            ));
        }
        if sigkey.len() == SIGKEY_LEN && sigkey[32..] != verkey[..] {
            return Err(Error::InvalidKey(
                "sigkey suffix does not match verkey".to_string(),
            ));
        }
        Ok(keys)
    }

    /// Raw verification key.
    #[must_use]
    pub fn verkey(&self) -> PublicKey {
        self.signing.verifying_key().to_bytes()
    }

    /// Base58 encoded verification key.
    #[must_use]
    pub fn verkey_b58(&self) -> String {
        base58::encode(&self.verkey())
    }

    /// 64-byte secret key (`seed ‖ verkey`).
    #[must_use]
    pub fn sigkey(&self) -> [u8; SIGKEY_LEN] {
        self.signing.to_keypair_bytes()
    }

    /// Base58 encoded 64-byte secret key.
    #[must_use]
    pub fn sigkey_b58(&self) -> String {
        base58::encode(&self.sigkey())
    }

    /// Key-derived DID: base58 of the first 16 verkey bytes.
    #[must_use]
    pub fn did(&self) -> String {
        base58::did_from_verkey(&self.verkey())
    }

    /// Underlying signing key, used for envelope operations.
    #[must_use]
    pub fn signing_key(&self) -> &SigningKey {
        &self.signing
    }
}

impl fmt::Debug for Keys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Keys({}, ...)", self.verkey_b58())
    }
}

/// Load a 32-byte seed from `path`, or generate one and write it with `0600`
/// permissions. A `.pub` file with the raw verkey is kept beside it.
///
/// # Errors
///
/// Returns an error if the key file has wrong permissions, wrong length,
/// or if file I/O fails.
pub fn load_or_generate_keypair(path: &Path) -> anyhow::Result<Keys> {
    if path.exists() {
        let metadata = fs::metadata(path)?;
        let permissions = metadata.permissions().mode();

        if permissions & 0o077 != 0 {
            anyhow::bail!(
                "key file {} has overly permissive permissions ({:o}), must be 0600",
                path.display(),
                permissions & 0o777
            );
        }

        let seed = fs::read(path)?;
        if seed.len() != 32 {
            anyhow::bail!("key file must contain exactly 32 bytes, got {}", seed.len());
        }

        let mut seed_array = [0u8; 32];
        seed_array.copy_from_slice(&seed);
        let keys = Keys::from_seed(&seed_array);

        let pub_path = path.with_extension("pub");
        if !pub_path.exists() {
            fs::write(&pub_path, keys.verkey())?;
        }

        Ok(keys)
    } else {
        let keys = Keys::generate();
        let seed = keys.signing.to_bytes();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(KEY_FILE_PERMS)
            .open(path)?;
        file.write_all(&seed)?;
        drop(file);

        fs::write(path.with_extension("pub"), keys.verkey())?;

        Ok(keys)
    }
}
