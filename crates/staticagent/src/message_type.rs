//! Message type URIs.
//!
//! A message type has the shape `<doc_uri><protocol>/<version>/<name>`, for
//! example `https://didcomm.org/basicmessage/1.0/message`. The doc URI may be
//! empty. Versions are `major.minor` or `major.minor.patch`; the short form
//! is normalized by appending `.0`.

use crate::error::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::OnceLock;

/// A `major.minor.patch` protocol version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    /// Incompatible revisions.
    pub major: u64,
    /// Backward compatible additions.
    pub minor: u64,
    /// Fixes.
    pub patch: u64,
}

impl Version {
    /// Construct from components.
    #[must_use]
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl FromStr for Version {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidType(format!("invalid version: {s}"));
        let caps = version_regex().captures(s).ok_or_else(invalid)?;
        let component = |i: usize| -> Result<u64> {
            caps.get(i)
                .map_or(Ok(0), |m| m.as_str().parse().map_err(|_| invalid()))
        };
        Ok(Self {
            major: component(1)?,
            minor: component(2)?,
            patch: component(3)?,
        })
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// `<doc_uri><protocol>/<version>/<name>`; the doc URI is the shortest
/// prefix that leaves a valid protocol segment.
fn type_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        match Regex::new(r"^(.*?)([a-z0-9._-]+)/(\d[^/]*)/([a-z0-9._-]+)$") {
            Ok(re) => re,
            Err(_) => unreachable!("static regex pattern is valid"),
        }
    })
}

/// Same grammar without the message name; a trailing `/` is allowed.
fn protocol_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        match Regex::new(r"^(.*?)([a-z0-9._-]+)/(\d[^/]*?)/?$") {
            Ok(re) => re,
            Err(_) => unreachable!("static regex pattern is valid"),
        }
    })
}

fn version_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        match Regex::new(r"^(0|[1-9]\d*)\.(0|[1-9]\d*)(?:\.(0|[1-9]\d*))?$") {
            Ok(re) => re,
            Err(_) => unreachable!("static regex pattern is valid"),
        }
    })
}

/// A parsed message type.
///
/// Equality and hashing use the normalized form, so `proto/1.0/x` and
/// `proto/1.0.0/x` are the same type. Ordering is only defined between
/// types sharing doc URI, protocol and name.
#[derive(Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MessageType {
    doc_uri: String,
    protocol: String,
    version: String,
    version_info: Version,
    name: String,
    original: String,
    normalized: String,
}

impl MessageType {
    /// Parse a message type string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidType`] if the string does not have the
    /// `<doc_uri><protocol>/<version>/<name>` shape or the version is invalid.
    pub fn parse(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidType(s.to_string());
        let caps = type_regex().captures(s).ok_or_else(invalid)?;
        let (doc_uri, protocol, version, name) = (&caps[1], &caps[2], &caps[3], &caps[4]);
        let version_info: Version = version.parse()?;

        Ok(Self {
            doc_uri: doc_uri.to_string(),
            protocol: protocol.to_string(),
            version: version.to_string(),
            version_info,
            name: name.to_string(),
            original: s.to_string(),
            normalized: format!("{doc_uri}{protocol}/{version_info}/{name}"),
        })
    }

    /// Build a message type from its parts.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidType`] if the joined string does not parse.
    pub fn from_parts(doc_uri: &str, protocol: &str, version: &str, name: &str) -> Result<Self> {
        Self::parse(&format!("{doc_uri}{protocol}/{version}/{name}"))
    }

    /// Namespace prefix, possibly empty.
    #[must_use]
    pub fn doc_uri(&self) -> &str {
        &self.doc_uri
    }

    /// Protocol name.
    #[must_use]
    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    /// Version as written.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Parsed version.
    #[must_use]
    pub fn version_info(&self) -> Version {
        self.version_info
    }

    /// Message name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Type string with a fully qualified version.
    #[must_use]
    pub fn normalized(&self) -> &str {
        &self.normalized
    }

    /// Type string as originally given.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.original
    }

    /// `(doc_uri, protocol, name)`; the version-independent identity.
    #[must_use]
    pub fn family(&self) -> (&str, &str, &str) {
        (&self.doc_uri, &self.protocol, &self.name)
    }

    /// Protocol this type belongs to.
    #[must_use]
    pub fn protocol_identifier(&self) -> ProtocolIdentifier {
        ProtocolIdentifier {
            doc_uri: self.doc_uri.clone(),
            protocol: self.protocol.clone(),
            version: self.version.clone(),
            version_info: self.version_info,
        }
    }
}

impl PartialEq for MessageType {
    fn eq(&self, other: &Self) -> bool {
        self.normalized == other.normalized
    }
}

impl Eq for MessageType {}

impl Hash for MessageType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.normalized.hash(state);
    }
}

impl PartialOrd for MessageType {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self.family() != other.family() {
            return None;
        }
        Some(self.version_info.cmp(&other.version_info))
    }
}

impl FromStr for MessageType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for MessageType {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl TryFrom<&str> for MessageType {
    type Error = Error;

    fn try_from(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl From<MessageType> for String {
    fn from(t: MessageType) -> Self {
        t.original
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.original)
    }
}

impl fmt::Debug for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MessageType({})", self.original)
    }
}

/// A protocol without a message name: `<doc_uri><protocol>/<version>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolIdentifier {
    doc_uri: String,
    protocol: String,
    version: String,
    version_info: Version,
}

impl ProtocolIdentifier {
    /// Parse a protocol identifier. A trailing `/` is accepted.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidType`] on malformed input.
    pub fn parse(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidType(s.to_string());
        let caps = protocol_regex().captures(s).ok_or_else(invalid)?;
        let (doc_uri, protocol, version) = (&caps[1], &caps[2], &caps[3]);
        Ok(Self {
            doc_uri: doc_uri.to_string(),
            protocol: protocol.to_string(),
            version: version.to_string(),
            version_info: version.parse()?,
        })
    }

    /// Namespace prefix.
    #[must_use]
    pub fn doc_uri(&self) -> &str {
        &self.doc_uri
    }

    /// Protocol name.
    #[must_use]
    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    /// Version as written.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Parsed version.
    #[must_use]
    pub fn version_info(&self) -> Version {
        self.version_info
    }

    /// Message type for `name` within this protocol.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidType`] if `name` is not a valid message name.
    pub fn message_type(&self, name: &str) -> Result<MessageType> {
        MessageType::from_parts(&self.doc_uri, &self.protocol, &self.version, name)
    }
}

impl FromStr for ProtocolIdentifier {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for ProtocolIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}/{}", self.doc_uri, self.protocol, self.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_uri() {
        let t = MessageType::parse("https://didcomm.org/basicmessage/1.0/message").unwrap();
        assert_eq!(t.doc_uri(), "https://didcomm.org/");
        assert_eq!(t.protocol(), "basicmessage");
        assert_eq!(t.version(), "1.0");
        assert_eq!(t.version_info(), Version::new(1, 0, 0));
        assert_eq!(t.name(), "message");
        assert_eq!(t.normalized(), "https://didcomm.org/basicmessage/1.0.0/message");
        assert_eq!(t.to_string(), "https://didcomm.org/basicmessage/1.0/message");
    }

    #[test]
    fn parses_legacy_did_prefix() {
        let t = MessageType::parse("did:sov:BzCbsNYhMrjHiqZDTUASHg;spec/trust_ping/1.0/ping")
            .unwrap();
        assert_eq!(t.doc_uri(), "did:sov:BzCbsNYhMrjHiqZDTUASHg;spec/");
        assert_eq!(t.protocol(), "trust_ping");
    }

    #[test]
    fn namespace_may_be_empty() {
        let t = MessageType::parse("proto/2.1.3/do-thing").unwrap();
        assert_eq!(t.doc_uri(), "");
        assert_eq!(t.protocol(), "proto");
        assert_eq!(t.version_info(), Version::new(2, 1, 3));
    }

    #[test]
    fn short_and_long_versions_are_equal() {
        let a = MessageType::parse("doc;proto/1.0/name").unwrap();
        let b = MessageType::parse("doc;proto/1.0.0/name").unwrap();
        assert_eq!(a, b);

        let mut set = std::collections::HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn ordering_only_within_family() {
        let a = MessageType::parse("doc/proto/1.0/name").unwrap();
        let b = MessageType::parse("doc/proto/1.4/name").unwrap();
        let c = MessageType::parse("doc/other/1.0/name").unwrap();
        assert!(a < b);
        assert_eq!(a.partial_cmp(&c), None);
    }

    #[test]
    fn rejects_malformed() {
        for bad in [
            "",
            "no-slashes",
            "proto/1.0",
            "proto/x.0/name",
            "proto/1/name",
            "proto/01.0/name",
            "proto/1.0.0.0/name",
            "proto/1.0/",
            "proto/1.0/Name",
            "/1.0/name",
        ] {
            assert!(
                matches!(MessageType::parse(bad), Err(Error::InvalidType(_))),
                "accepted {bad:?}"
            );
        }
    }

    #[test]
    fn protocol_is_longest_lowercase_run_before_version() {
        let t = MessageType::parse("Proto/1.0/name").unwrap();
        assert_eq!(t.doc_uri(), "P");
        assert_eq!(t.protocol(), "roto");

        let t = MessageType::parse("https://x.org/a/b.c-d_e/3.1/f").unwrap();
        assert_eq!(t.doc_uri(), "https://x.org/a/");
        assert_eq!(t.protocol(), "b.c-d_e");
        assert_eq!(t.version_info(), Version::new(3, 1, 0));
    }

    #[test]
    fn version_segment_must_be_plain_semver() {
        assert!(MessageType::parse("proto/1.0-beta/name").is_err());
        assert!(matches!(
            "1.2.x".parse::<Version>(),
            Err(Error::InvalidType(_))
        ));
        assert_eq!("0.10".parse::<Version>().unwrap(), Version::new(0, 10, 0));
    }

    #[test]
    fn serde_uses_original_string() {
        let t = MessageType::parse("doc;proto/1.0/name").unwrap();
        let json = serde_json::to_string(&t).unwrap();
        assert_eq!(json, "\"doc;proto/1.0/name\"");
        let back: MessageType = serde_json::from_str(&json).unwrap();
        assert_eq!(back, t);
        assert!(serde_json::from_str::<MessageType>("\"bogus\"").is_err());
    }

    #[test]
    fn protocol_identifier_builds_types() {
        let p = ProtocolIdentifier::parse("https://didcomm.org/trust_ping/1.0/").unwrap();
        assert_eq!(p.protocol(), "trust_ping");
        assert_eq!(p.to_string(), "https://didcomm.org/trust_ping/1.0");
        let t = p.message_type("ping").unwrap();
        assert_eq!(t.to_string(), "https://didcomm.org/trust_ping/1.0/ping");
        assert_eq!(t.protocol_identifier(), p);
        assert!(ProtocolIdentifier::parse("nope").is_err());
    }
}
