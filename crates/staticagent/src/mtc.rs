//! Message Trust Context.
//!
//! Records which security properties were established for a received
//! message. Two disjoint flag sets are kept: properties known to hold
//! (affirmed) and properties known not to hold (denied). Anything in
//! neither set is unknown.

use crate::error::{Error, Result};
use staticagent_common::{base58, PublicKey};
use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign, Not};

/// A set of trust properties.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Context(u16);

impl Context {
    /// Empty set.
    pub const NONE: Self = Self(0);
    /// Message size was within limits.
    pub const SIZE_OK: Self = Self(1 << 0);
    /// Message deserialized cleanly.
    pub const DESERIALIZE_OK: Self = Self(1 << 1);
    /// Expected keys were present.
    pub const KEYS_OK: Self = Self(1 << 2);
    /// Values passed validation.
    pub const VALUES_OK: Self = Self(1 << 3);
    /// Content was hidden from third parties.
    pub const CONFIDENTIALITY: Self = Self(1 << 4);
    /// Content was not modified in transit.
    pub const INTEGRITY: Self = Self(1 << 5);
    /// The sender is cryptographically known.
    pub const AUTHENTICATED_ORIGIN: Self = Self(1 << 6);
    /// The sender cannot deny having sent the message.
    pub const NONREPUDIATION: Self = Self(1 << 7);
    /// Perfect forward secrecy.
    pub const PFS: Self = Self(1 << 8);
    /// Message is not a replay.
    pub const UNIQUENESS: Self = Self(1 << 9);
    /// Message is bound to a limited scope.
    pub const LIMITED_SCOPE: Self = Self(1 << 10);

    const LABELS: [(Self, &'static str); 11] = [
        (Self::SIZE_OK, "size_ok"),
        (Self::DESERIALIZE_OK, "deserialize_ok"),
        (Self::KEYS_OK, "keys_ok"),
        (Self::VALUES_OK, "values_ok"),
        (Self::CONFIDENTIALITY, "confidentiality"),
        (Self::INTEGRITY, "integrity"),
        (Self::AUTHENTICATED_ORIGIN, "authenticated_origin"),
        (Self::NONREPUDIATION, "nonrepudiation"),
        (Self::PFS, "pfs"),
        (Self::UNIQUENESS, "uniqueness"),
        (Self::LIMITED_SCOPE, "limited_scope"),
    ];

    /// Raw bits.
    #[must_use]
    pub const fn bits(self) -> u16 {
        self.0
    }

    /// Union usable in constant expressions.
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// `true` if every property in `other` is in `self`.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// `true` if the two sets share any property.
    #[must_use]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// `true` for the empty set.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    fn labels(self) -> impl Iterator<Item = &'static str> {
        Self::LABELS
            .into_iter()
            .filter(move |(flag, _)| self.contains(*flag))
            .map(|(_, label)| label)
    }
}

impl BitOr for Context {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl BitOrAssign for Context {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for Context {
    type Output = Self;
    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl Not for Context {
    type Output = Self;
    fn not(self) -> Self {
        Self(!self.0)
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.labels()).finish()
    }
}

/// Affirmed by authcrypt.
pub const AUTHCRYPT_AFFIRMED: Context = Context::CONFIDENTIALITY
    .union(Context::INTEGRITY)
    .union(Context::DESERIALIZE_OK)
    .union(Context::AUTHENTICATED_ORIGIN);
/// Denied by authcrypt.
pub const AUTHCRYPT_DENIED: Context = Context::NONREPUDIATION;

/// Affirmed by anoncrypt.
pub const ANONCRYPT_AFFIRMED: Context = Context::CONFIDENTIALITY
    .union(Context::INTEGRITY)
    .union(Context::DESERIALIZE_OK);
/// Denied by anoncrypt.
pub const ANONCRYPT_DENIED: Context = Context::NONREPUDIATION.union(Context::AUTHENTICATED_ORIGIN);

/// Affirmed for plaintext.
pub const PLAINTEXT_AFFIRMED: Context = Context::DESERIALIZE_OK;
/// Denied for plaintext.
pub const PLAINTEXT_DENIED: Context = Context::CONFIDENTIALITY
    .union(Context::INTEGRITY)
    .union(Context::AUTHENTICATED_ORIGIN);

/// Evidence about how a message reached us.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct MessageTrustContext {
    affirmed: Context,
    denied: Context,
    sender: Option<PublicKey>,
    recipient: Option<PublicKey>,
}

impl MessageTrustContext {
    /// Create a context with the given affirmed and denied sets.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConflictingTrustContext`] if the sets overlap.
    pub fn new(affirmed: Context, denied: Context) -> Result<Self> {
        if affirmed.intersects(denied) {
            return Err(Error::ConflictingTrustContext);
        }
        Ok(Self {
            affirmed,
            denied,
            sender: None,
            recipient: None,
        })
    }

    /// Affirmed properties.
    #[must_use]
    pub fn affirmed(&self) -> Context {
        self.affirmed
    }

    /// Denied properties.
    #[must_use]
    pub fn denied(&self) -> Context {
        self.denied
    }

    /// Sender verkey recovered from an authcrypted envelope.
    #[must_use]
    pub fn sender(&self) -> Option<&PublicKey> {
        self.sender.as_ref()
    }

    /// Local verkey the message was decrypted with.
    #[must_use]
    pub fn recipient(&self) -> Option<&PublicKey> {
        self.recipient.as_ref()
    }

    /// `Some(true)` if every property in `context` is affirmed, `Some(false)`
    /// if every one is denied, `None` otherwise.
    #[must_use]
    pub fn query(&self, context: Context) -> Option<bool> {
        if self.affirmed.contains(context) {
            Some(true)
        } else if self.denied.contains(context) {
            Some(false)
        } else {
            None
        }
    }

    /// Mark `context` as holding, moving it out of the denied set.
    pub fn affirm(&mut self, context: Context) {
        self.affirmed |= context;
        self.denied = self.denied & !context;
    }

    /// Mark `context` as not holding, moving it out of the affirmed set.
    pub fn deny(&mut self, context: Context) {
        self.denied |= context;
        self.affirmed = self.affirmed & !context;
    }

    /// Forget anything known about `context`.
    pub fn clear(&mut self, context: Context) {
        self.affirmed = self.affirmed & !context;
        self.denied = self.denied & !context;
    }

    /// Match the outcome of an authcrypted envelope.
    pub fn set_authcrypted(&mut self, sender: PublicKey, recipient: PublicKey) {
        self.affirmed = AUTHCRYPT_AFFIRMED;
        self.denied = AUTHCRYPT_DENIED;
        self.sender = Some(sender);
        self.recipient = Some(recipient);
    }

    /// Match the outcome of an anoncrypted envelope.
    pub fn set_anoncrypted(&mut self, recipient: PublicKey) {
        self.affirmed = ANONCRYPT_AFFIRMED;
        self.denied = ANONCRYPT_DENIED;
        self.sender = None;
        self.recipient = Some(recipient);
    }

    /// Match a message received without encryption.
    pub fn set_plaintext(&mut self) {
        self.affirmed = PLAINTEXT_AFFIRMED;
        self.denied = PLAINTEXT_DENIED;
        self.sender = None;
        self.recipient = None;
    }

    /// Exactly the authcrypt pattern.
    #[must_use]
    pub fn is_authcrypted(&self) -> bool {
        self.query(AUTHCRYPT_AFFIRMED) == Some(true) && self.query(AUTHCRYPT_DENIED) == Some(false)
    }

    /// Exactly the anoncrypt pattern.
    #[must_use]
    pub fn is_anoncrypted(&self) -> bool {
        self.query(ANONCRYPT_AFFIRMED) == Some(true) && self.query(ANONCRYPT_DENIED) == Some(false)
    }

    /// Exactly the plaintext pattern.
    #[must_use]
    pub fn is_plaintext(&self) -> bool {
        self.query(PLAINTEXT_AFFIRMED) == Some(true) && self.query(PLAINTEXT_DENIED) == Some(false)
    }
}

impl fmt::Display for MessageTrustContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("mtc:")?;
        for label in self.affirmed.labels() {
            write!(f, " +{label}")?;
        }
        for label in self.denied.labels() {
            write!(f, " -{label}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for MessageTrustContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageTrustContext")
            .field("affirmed", &self.affirmed)
            .field("denied", &self.denied)
            .field("sender", &self.sender.as_ref().map(|k| base58::encode(k)))
            .field("recipient", &self.recipient.as_ref().map(|k| base58::encode(k)))
            .finish()
    }
}
