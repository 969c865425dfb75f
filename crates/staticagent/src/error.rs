use staticagent_common::CryptoError;
use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors surfaced by connections, dispatchers and message handling.
#[derive(Error, Debug)]
pub enum Error {
    /// Packing or unpacking an envelope failed.
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),
    /// A message type or protocol identifier could not be parsed.
    #[error("invalid message type: {0}")]
    InvalidType(String),
    /// A message could not be deserialized or is missing required fields.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
    /// No handler compatible with the message type is registered.
    #[error("no suitable handler for message of type {0}")]
    NoRegisteredHandler(String),
    /// Attempted to remove a handler that was never registered.
    #[error("handler is not registered for {0}")]
    NotRegistered(String),
    /// The transport failed to deliver a packed message.
    #[error("message delivery failed: {message}")]
    MessageDelivery {
        /// HTTP status code, when the failure came from a response.
        status: Option<u16>,
        /// Description of the underlying transport failure.
        message: String,
    },
    /// The target has no recipient keys to pack for.
    #[error("no recipients for whom to pack this message")]
    NoRecipients,
    /// A transport could not be set up.
    #[error("transport setup failed: {0}")]
    Transport(#[from] crate::transport::TransportError),
    /// No endpoint is configured and no open session can return the message.
    #[error("cannot send message; no endpoint and no return route")]
    NoEndpoint,
    /// A response body arrived for a message that did not request one.
    #[error("response received when no response was expected")]
    UnexpectedResponse,
    /// Waiting for a message exceeded its deadline.
    #[error("timed out waiting for message")]
    Timeout,
    /// A trust context was constructed with a property both affirmed and denied.
    #[error("trust context affirms and denies the same property")]
    ConflictingTrustContext,
    /// A handler rejected a message whose trust context did not match.
    #[error("insufficient message trust: {0}")]
    InsufficientTrust(String),
    /// A handler's validator rejected a message.
    #[error("message failed to validate: {0}")]
    MessageValidation(String),
    /// Two options that cannot be combined were both given.
    #[error("{0} are mutually exclusive")]
    MutuallyExclusive(&'static str),
    /// A key was not valid base58 or had the wrong length.
    #[error("invalid key: {0}")]
    InvalidKey(String),
    /// A session was asked to send while not set to return route.
    #[error("session {0} is not set to return route")]
    NotReturning(String),
    /// A message handler failed.
    #[error("handler failed: {0}")]
    Handler(#[from] anyhow::Error),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidMessage(err.to_string())
    }
}

impl From<staticagent_common::base58::KeyDecodeError> for Error {
    fn from(err: staticagent_common::base58::KeyDecodeError) -> Self {
        Self::InvalidKey(err.to_string())
    }
}
