//! Addressing information for the other end of a connection.

use crate::error::{Error, Result};
use staticagent_common::{base58, PublicKey};

/// Where and to whom outbound messages are packed and sent.
///
/// Recipients and routing keys are independent lists: recipients are the
/// final readers of a message, routing keys are the ordered mediators it is
/// forwarded through.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Target {
    /// HTTP(S) or WS(S) endpoint of the next hop.
    pub endpoint: Option<String>,
    /// Final recipient verkeys.
    pub recipients: Vec<PublicKey>,
    /// Mediator verkeys, innermost first.
    pub routing_keys: Vec<PublicKey>,
}

/// Partial target information used by [`Target::build`] and [`Target::update`].
///
/// `their_vk` is shorthand for a single recipient and cannot be combined
/// with `recipients`.
#[derive(Debug, Clone, Default)]
pub struct TargetUpdate {
    /// New endpoint.
    pub endpoint: Option<String>,
    /// Single recipient verkey.
    pub their_vk: Option<PublicKey>,
    /// Recipient verkeys.
    pub recipients: Option<Vec<PublicKey>>,
    /// Mediator verkeys.
    pub routing_keys: Option<Vec<PublicKey>>,
}

impl TargetUpdate {
    /// Set the endpoint.
    #[must_use]
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Set a single recipient.
    #[must_use]
    pub fn their_vk(mut self, vk: PublicKey) -> Self {
        self.their_vk = Some(vk);
        self
    }

    /// Set a single recipient from base58.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidKey`] if the key does not decode.
    pub fn their_vk_b58(self, vk: &str) -> Result<Self> {
        Ok(self.their_vk(base58::decode_key(vk)?))
    }

    /// Set the recipient list.
    #[must_use]
    pub fn recipients(mut self, recipients: Vec<PublicKey>) -> Self {
        self.recipients = Some(recipients);
        self
    }

    /// Set the mediator list.
    #[must_use]
    pub fn routing_keys(mut self, routing_keys: Vec<PublicKey>) -> Self {
        self.routing_keys = Some(routing_keys);
        self
    }
}

impl Target {
    /// Build a target from its parts.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MutuallyExclusive`] if both `their_vk` and
    /// `recipients` are given.
    pub fn build(parts: TargetUpdate) -> Result<Self> {
        let mut target = Self::default();
        target.update(parts)?;
        Ok(target)
    }

    /// Shorthand for a single recipient at an endpoint.
    #[must_use]
    pub fn to(their_vk: PublicKey, endpoint: Option<String>) -> Self {
        Self {
            endpoint,
            recipients: vec![their_vk],
            routing_keys: Vec::new(),
        }
    }

    /// Apply the fields present in `parts`, leaving the rest untouched.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MutuallyExclusive`] if both `their_vk` and
    /// `recipients` are given; the target is not modified in that case.
    pub fn update(&mut self, parts: TargetUpdate) -> Result<()> {
        if parts.their_vk.is_some() && parts.recipients.is_some() {
            return Err(Error::MutuallyExclusive("their_vk and recipients"));
        }
        if let Some(endpoint) = parts.endpoint {
            self.endpoint = Some(endpoint);
        }
        if let Some(vk) = parts.their_vk {
            self.recipients = vec![vk];
        }
        if let Some(recipients) = parts.recipients {
            self.recipients = recipients;
        }
        if let Some(routing_keys) = parts.routing_keys {
            self.routing_keys = routing_keys;
        }
        Ok(())
    }
}
