//! Predicates over messages, used to select messages from queues.

use crate::message::Message;
use crate::message_type::{MessageType, ProtocolIdentifier};
use regex::Regex;
use std::sync::Arc;

/// A shareable message predicate.
pub type Condition = Arc<dyn Fn(&Message) -> bool + Send + Sync>;

/// Wrap a closure as a [`Condition`].
pub fn condition<F>(f: F) -> Condition
where
    F: Fn(&Message) -> bool + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Matches every message.
#[must_use]
pub fn match_all() -> Condition {
    Arc::new(|_: &Message| true)
}

/// Message type equals `msg_type` (after version normalization).
#[must_use]
pub fn msg_type_is(msg_type: MessageType) -> Condition {
    Arc::new(move |msg: &Message| *msg.msg_type() == msg_type)
}

/// Message type string, as written, matches `pattern` from its first
/// character. The match need not reach the end of the string.
#[must_use]
pub fn msg_type_matches(pattern: Regex) -> Condition {
    Arc::new(move |msg: &Message| {
        pattern
            .find(msg.msg_type().as_str())
            .is_some_and(|m| m.start() == 0)
    })
}

/// Same doc URI, protocol and name as `msg_type`, with the same major version.
///
/// A bare major-version comparison would also accept unrelated types that
/// happen to share a major, so the family must match too.
#[must_use]
pub fn msg_type_is_compatible_with(msg_type: MessageType) -> Condition {
    Arc::new(move |msg: &Message| {
        msg.msg_type().family() == msg_type.family()
            && msg.msg_type().version_info().major == msg_type.version_info().major
    })
}

/// Message belongs to `protocol` at exactly its version.
#[must_use]
pub fn in_protocol(protocol: ProtocolIdentifier) -> Condition {
    Arc::new(move |msg: &Message| {
        let t = msg.msg_type();
        t.doc_uri() == protocol.doc_uri()
            && t.protocol() == protocol.protocol()
            && t.version_info() == protocol.version_info()
    })
}

/// Message's `~thread.thid` is the id of `original`.
#[must_use]
pub fn is_reply_to(original: &Message) -> Condition {
    let id = original.id().to_string();
    Arc::new(move |msg: &Message| msg.thread() == Some(id.as_str()))
}

/// Every condition holds. True for an empty list.
#[must_use]
pub fn all_of(conditions: Vec<Condition>) -> Condition {
    Arc::new(move |msg: &Message| conditions.iter().all(|c| c(msg)))
}

/// At least one condition holds. False for an empty list.
#[must_use]
pub fn any_of(conditions: Vec<Condition>) -> Condition {
    Arc::new(move |msg: &Message| conditions.iter().any(|c| c(msg)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(t: &str) -> Message {
        Message::typed(t).unwrap()
    }

    fn mt(t: &str) -> MessageType {
        MessageType::parse(t).unwrap()
    }

    #[test]
    fn type_equality_normalizes() {
        let c = msg_type_is(mt("doc/proto/1.0/name"));
        assert!(c(&msg("doc/proto/1.0.0/name")));
        assert!(!c(&msg("doc/proto/1.1/name")));
    }

    #[test]
    fn compatible_means_same_major() {
        let c = msg_type_is_compatible_with(mt("doc/proto/1.0/name"));
        assert!(c(&msg("doc/proto/1.7/name")));
        assert!(!c(&msg("doc/proto/2.0/name")));
        assert!(!c(&msg("doc/proto/1.0/other")));
        assert!(!c(&msg("doc/unrelated/1.0/name")));
        assert!(!c(&msg("elsewhere/proto/1.0/name")));
    }

    #[test]
    fn pattern_is_anchored_at_the_start() {
        let c = msg_type_matches(Regex::new(r"doc/proto/1\.\d+/").unwrap());
        assert!(c(&msg("doc/proto/1.0/a")));
        assert!(c(&msg("doc/proto/1.12/b")));
        assert!(!c(&msg("doc/proto/2.0/a")));
        assert!(!c(&msg("https://doc/proto/1.0/a")));

        let unanchored = msg_type_matches(Regex::new("trust_ping").unwrap());
        assert!(!unanchored(&msg("https://didcomm.org/trust_ping/1.0/ping")));
        let prefixed = msg_type_matches(Regex::new(".*trust_ping").unwrap());
        assert!(prefixed(&msg("https://didcomm.org/trust_ping/1.0/ping")));
    }

    #[test]
    fn protocol_membership() {
        let c = in_protocol(ProtocolIdentifier::parse("doc/proto/1.0").unwrap());
        assert!(c(&msg("doc/proto/1.0/a")));
        assert!(c(&msg("doc/proto/1.0.0/b")));
        assert!(!c(&msg("doc/proto/1.1/a")));
        assert!(!c(&msg("doc/protocol/1.0/a")));
    }

    #[test]
    fn reply_detection() {
        let original = msg("doc/proto/1.0/request");
        let reply = msg("doc/proto/1.0/response").with_thread(original.id());
        let c = is_reply_to(&original);
        assert!(c(&reply));
        assert!(!c(&original));
    }

    #[test]
    fn combinators() {
        let m = msg("doc/proto/1.0/a");
        let yes = match_all();
        let no = condition(|_| false);
        assert!(all_of(vec![yes.clone(), yes.clone()])(&m));
        assert!(!all_of(vec![yes.clone(), no.clone()])(&m));
        assert!(any_of(vec![no.clone(), yes])(&m));
        assert!(!any_of(vec![no])(&m));
        assert!(all_of(Vec::new())(&m));
        assert!(!any_of(Vec::new())(&m));
    }
}
