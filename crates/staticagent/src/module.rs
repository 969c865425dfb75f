//! Grouping of handlers belonging to one protocol.

use crate::error::Result;
use crate::handler::Handler;
use crate::message_type::{MessageType, ProtocolIdentifier};
use std::collections::HashMap;

/// Collects the routes of one protocol before they are registered.
///
/// ```
/// use staticagent::{handler, Message, ModuleRouter};
///
/// let mut router: ModuleRouter<()> = ModuleRouter::new("https://didcomm.org/trust_ping/1.0").unwrap();
/// router
///     .route("ping", handler(|_msg: Message, ()| async { Ok(()) }))
///     .unwrap();
/// assert_eq!(router.len(), 1);
/// ```
pub struct ModuleRouter<C> {
    protocol: ProtocolIdentifier,
    routes: HashMap<MessageType, Handler<C>>,
}

impl<C> ModuleRouter<C> {
    /// Router for the protocol named by `protocol`, e.g. `doc/proto/1.0`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidType`](crate::Error::InvalidType) if the
    /// protocol identifier does not parse.
    pub fn new(protocol: &str) -> Result<Self> {
        Ok(Self::for_protocol(ProtocolIdentifier::parse(protocol)?))
    }

    /// Router for an already parsed protocol identifier.
    #[must_use]
    pub fn for_protocol(protocol: ProtocolIdentifier) -> Self {
        Self {
            protocol,
            routes: HashMap::new(),
        }
    }

    /// The protocol routes default to.
    #[must_use]
    pub fn protocol(&self) -> &ProtocolIdentifier {
        &self.protocol
    }

    /// Route message `name` of this protocol to `handler`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidType`](crate::Error::InvalidType) if `name`
    /// is not a valid message name.
    pub fn route(&mut self, name: &str, handler: Handler<C>) -> Result<&mut Self> {
        let msg_type = self.protocol.message_type(name)?;
        self.routes.insert(msg_type, handler);
        Ok(self)
    }

    /// Route an arbitrary message type, possibly outside this protocol.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidType`](crate::Error::InvalidType) if
    /// `msg_type` does not parse.
    pub fn route_type(&mut self, msg_type: &str, handler: Handler<C>) -> Result<&mut Self> {
        self.routes.insert(MessageType::parse(msg_type)?, handler);
        Ok(self)
    }

    /// Message type for `name` within this protocol.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidType`](crate::Error::InvalidType) if `name`
    /// is not a valid message name.
    pub fn message_type(&self, name: &str) -> Result<MessageType> {
        self.protocol.message_type(name)
    }

    /// Number of routes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// `true` if no routes were added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Route lookup by exact type.
    #[must_use]
    pub fn get(&self, msg_type: &MessageType) -> Option<&Handler<C>> {
        self.routes.get(msg_type)
    }

    /// Collected `(type, handler)` pairs, ready for
    /// [`Dispatcher::extend`](crate::Dispatcher::extend).
    #[must_use]
    pub fn routes(&self) -> Vec<(MessageType, Handler<C>)> {
        self.routes
            .iter()
            .map(|(t, h)| (t.clone(), h.clone()))
            .collect()
    }
}

impl<C> IntoIterator for ModuleRouter<C> {
    type Item = (MessageType, Handler<C>);
    type IntoIter = std::collections::hash_map::IntoIter<MessageType, Handler<C>>;

    fn into_iter(self) -> Self::IntoIter {
        self.routes.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::Dispatcher;
    use crate::handler::handler;
    use crate::message::Message;

    fn noop() -> Handler<()> {
        handler(|_msg: Message, ()| async { Ok(()) })
    }

    #[test]
    fn route_uses_protocol_defaults() {
        let mut router = ModuleRouter::new("doc/protocol/1.0").unwrap();
        router.route("test", noop()).unwrap();
        router
            .route_type("another-doc/some-protocol/2.0/name", noop())
            .unwrap();

        assert!(router.get(&MessageType::parse("doc/protocol/1.0/test").unwrap()).is_some());
        assert!(router
            .get(&MessageType::parse("another-doc/some-protocol/2.0/name").unwrap())
            .is_some());
        assert_eq!(router.len(), 2);
    }

    #[test]
    fn invalid_names_are_rejected() {
        let mut router: ModuleRouter<()> = ModuleRouter::new("doc/protocol/1.0").unwrap();
        assert!(router.route("Bad Name", noop()).is_err());
        assert!(router.is_empty());
        assert!(ModuleRouter::<()>::new("not a protocol").is_err());
    }

    #[test]
    fn routes_feed_dispatcher() {
        let mut router = ModuleRouter::new("doc/protocol/1.0").unwrap();
        router.route("a", noop()).unwrap().route("b", noop()).unwrap();

        let dispatcher = Dispatcher::new();
        dispatcher.extend(router.routes());
        assert_eq!(dispatcher.len(), 2);
        assert!(dispatcher
            .select(&router.message_type("a").unwrap())
            .is_some());
    }
}
