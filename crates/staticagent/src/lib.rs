//! Static agent messaging core.
//!
//! A [`Connection`] exchanges typed, versioned messages with one other
//! agent. Messages are packed into authcrypt or anoncrypt envelopes
//! (optionally forwarded through mediators), carry a
//! [`MessageTrustContext`] once received, and are routed to handlers by
//! semver-compatible [`MessageType`] matching. Replies can travel back
//! over an open inbound [`Session`] instead of a new request.
#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// CLI parsing and layered configuration.
pub mod config;
/// Packing, sending, receiving and awaiting messages.
pub mod connection;
/// Version-aware routing of messages to handlers.
pub mod dispatcher;
/// Library error type.
pub mod error;
/// Async handlers and wrappers that preprocess, validate or check trust.
pub mod handler;
/// Ed25519 identity keys and key files.
pub mod keys;
/// Messages and their decorators.
pub mod message;
/// Message type URIs and protocol identifiers.
pub mod message_type;
/// Per-protocol handler collections.
pub mod module;
/// Message trust context.
pub mod mtc;
/// Message predicates.
pub mod operators;
/// Predicate-selective wait queue.
pub mod queue;
/// Inbound sessions able to carry replies.
pub mod session;
/// Addressing of the other agent.
pub mod target;
/// HTTP and websocket delivery.
pub mod transport;

pub use config::AgentConfig;
pub use connection::{Connection, ConnectionBuilder, PackOptions, ScopedQueue, SendOptions, SessionGuard};
pub use dispatcher::Dispatcher;
pub use error::{Error, Result};
pub use handler::{handler, Handler};
pub use keys::Keys;
pub use message::{Message, ReturnRoute};
pub use message_type::{MessageType, ProtocolIdentifier, Version};
pub use module::ModuleRouter;
pub use mtc::{Context, MessageTrustContext};
pub use operators::Condition;
pub use queue::SelectiveWaitQueue;
pub use session::{session_send, Session, SessionSend, ThreadScope};
pub use target::{Target, TargetUpdate};
pub use transport::{Transport, TransportError};
