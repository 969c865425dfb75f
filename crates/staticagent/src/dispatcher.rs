//! Version-aware routing of messages to handlers.
//!
//! Handlers are registered for a concrete message type. Incoming messages
//! are matched on doc URI, protocol and name, then on version: the highest
//! registered version with the same major version wins, regardless of
//! minor or patch. A message is never routed to a handler for a different
//! major version.

use crate::error::{Error, Result};
use crate::handler::Handler;
use crate::message::Message;
use crate::message_type::{MessageType, Version};
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, warn};

type Family = (String, String, String);

fn family_of(msg_type: &MessageType) -> Family {
    let (doc_uri, protocol, name) = msg_type.family();
    (doc_uri.to_string(), protocol.to_string(), name.to_string())
}

fn normalized_for(family: &Family, version: Version) -> String {
    format!("{}{}/{}/{}", family.0, family.1, version, family.2)
}

struct Routes<C> {
    handlers: HashMap<String, Handler<C>>,
    versions: HashMap<Family, BTreeSet<Version>>,
}

/// Routing table from message types to handlers.
pub struct Dispatcher<C> {
    routes: RwLock<Routes<C>>,
}

impl<C> Default for Dispatcher<C> {
    fn default() -> Self {
        Self {
            routes: RwLock::new(Routes {
                handlers: HashMap::new(),
                versions: HashMap::new(),
            }),
        }
    }
}

impl<C> Dispatcher<C> {
    /// Empty dispatcher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `msg_type`, replacing any existing handler for
    /// the same normalized type.
    pub fn register(&self, msg_type: &MessageType, handler: Handler<C>) {
        let mut routes = self.routes.write();
        routes
            .handlers
            .insert(msg_type.normalized().to_string(), handler);
        routes
            .versions
            .entry(family_of(msg_type))
            .or_default()
            .insert(msg_type.version_info());
        debug!(msg_type = %msg_type, "registered handler");
    }

    /// Register every `(type, handler)` pair.
    pub fn extend<I>(&self, routes: I)
    where
        I: IntoIterator<Item = (MessageType, Handler<C>)>,
    {
        for (msg_type, handler) in routes {
            self.register(&msg_type, handler);
        }
    }

    /// Remove the handler registered for exactly `msg_type`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotRegistered`] if no handler is registered for it.
    pub fn unregister(&self, msg_type: &MessageType) -> Result<()> {
        let mut routes = self.routes.write();
        if routes.handlers.remove(msg_type.normalized()).is_none() {
            return Err(Error::NotRegistered(msg_type.to_string()));
        }
        let family = family_of(msg_type);
        if let Some(versions) = routes.versions.get_mut(&family) {
            versions.remove(&msg_type.version_info());
            if versions.is_empty() {
                routes.versions.remove(&family);
            }
        }
        Ok(())
    }

    /// Remove every handler.
    pub fn clear(&self) {
        let mut routes = self.routes.write();
        routes.handlers.clear();
        routes.versions.clear();
    }

    /// Number of registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.read().handlers.len()
    }

    /// `true` if no handler is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Closest compatible handler for `msg_type`.
    #[must_use]
    pub fn select(&self, msg_type: &MessageType) -> Option<Handler<C>> {
        let routes = self.routes.read();
        let family = family_of(msg_type);
        let wanted = msg_type.version_info();
        for version in routes.versions.get(&family)?.iter().rev() {
            if version.major == wanted.major {
                return routes
                    .handlers
                    .get(&normalized_for(&family, *version))
                    .cloned();
            }
            if wanted.major > version.major {
                break;
            }
        }
        None
    }

    /// Route `msg` to its handler and await it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoRegisteredHandler`] if nothing matches, otherwise
    /// whatever the handler returns.
    pub async fn dispatch(&self, msg: Message, ctx: C) -> Result<()> {
        let Some(handler) = self.select(msg.msg_type()) else {
            warn!(msg_type = %msg.msg_type(), msg_id = msg.id(), "no handler for message");
            return Err(Error::NoRegisteredHandler(msg.msg_type().to_string()));
        };
        debug!(msg_type = %msg.msg_type(), msg_id = msg.id(), "dispatching");
        handler(msg, ctx).await
    }
}
