//! Messages and their decorators.
//!
//! A message is a JSON object with a typed `@type`, a string `@id` and an
//! open set of other fields. Decorators such as `~thread` and `~transport`
//! are ordinary fields with helpers for the parts this crate reads.

use crate::error::{Error, Result};
use crate::message_type::MessageType;
use crate::mtc::MessageTrustContext;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use staticagent_common::{base58, PublicKey};
use std::fmt;

/// Message type of a routing forward.
pub const FORWARD: &str = "https://didcomm.org/routing/1.0/forward";

const TYPE_KEY: &str = "@type";
const ID_KEY: &str = "@id";
const THREAD_DECORATOR: &str = "~thread";
const TRANSPORT_DECORATOR: &str = "~transport";

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Reply path requested through the `~transport` decorator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReturnRoute {
    /// Do not return messages over this exchange.
    None,
    /// Return any message for this connection.
    All,
    /// Return only messages in the given thread.
    Thread(String),
}

impl ReturnRoute {
    fn to_decorator(&self) -> Value {
        match self {
            Self::None => serde_json::json!({ "return_route": "none" }),
            Self::All => serde_json::json!({ "return_route": "all" }),
            Self::Thread(thid) => serde_json::json!({
                "return_route": "thread",
                "return_route_thread": thid,
            }),
        }
    }

    fn from_decorator(value: &Value) -> Option<Self> {
        match value.get("return_route")?.as_str()? {
            "none" => Some(Self::None),
            "all" => Some(Self::All),
            "thread" => value
                .get("return_route_thread")
                .and_then(Value::as_str)
                .map(|thid| Self::Thread(thid.to_string())),
            _ => None,
        }
    }
}

/// A typed message.
///
/// `@type` and `@id` are always present; every other field lives in an
/// open map. Received messages carry the trust context of the envelope
/// they arrived in.
#[derive(Clone, Serialize)]
pub struct Message {
    #[serde(rename = "@type")]
    msg_type: MessageType,
    #[serde(rename = "@id")]
    id: String,
    #[serde(flatten)]
    fields: Map<String, Value>,
    #[serde(skip)]
    mtc: MessageTrustContext,
}

impl Message {
    /// New message of `msg_type` with a random id.
    #[must_use]
    pub fn new(msg_type: MessageType) -> Self {
        Self {
            msg_type,
            id: new_id(),
            fields: Map::new(),
            mtc: MessageTrustContext::default(),
        }
    }

    /// New message parsing `msg_type` first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidType`] if the type does not parse.
    pub fn typed(msg_type: &str) -> Result<Self> {
        Ok(Self::new(MessageType::parse(msg_type)?))
    }

    /// Add or replace a field. `@type` and `@id` go to their dedicated slots.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidType`] if an `@type` value does not parse and
    /// [`Error::InvalidMessage`] if `@type` or `@id` is not a string.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Result<Self> {
        let key = key.into();
        let value = value.into();
        match key.as_str() {
            TYPE_KEY => {
                let s = value
                    .as_str()
                    .ok_or_else(|| Error::InvalidMessage("@type must be a string".into()))?;
                self.msg_type = MessageType::parse(s)?;
            }
            ID_KEY => {
                let id = value
                    .as_str()
                    .ok_or_else(|| Error::InvalidMessage("@id must be a string".into()))?;
                self.id = id.to_string();
            }
            _ => {
                self.fields.insert(key, value);
            }
        }
        Ok(self)
    }

    /// Replace the id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Build from a decoded JSON object.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidMessage`] if `value` is not an object or
    /// lacks `@type`, and [`Error::InvalidType`] if `@type` does not parse.
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(mut fields) = value else {
            return Err(Error::InvalidMessage("message must be a JSON object".into()));
        };
        let msg_type = match fields.remove(TYPE_KEY) {
            Some(Value::String(s)) => MessageType::parse(&s)?,
            Some(_) => return Err(Error::InvalidMessage("@type must be a string".into())),
            None => return Err(Error::InvalidMessage("missing @type".into())),
        };
        let id = match fields.remove(ID_KEY) {
            Some(Value::String(s)) => s,
            Some(_) => return Err(Error::InvalidMessage("@id must be a string".into())),
            None => new_id(),
        };
        Ok(Self {
            msg_type,
            id,
            fields,
            mtc: MessageTrustContext::default(),
        })
    }

    /// Parse JSON bytes.
    ///
    /// # Errors
    ///
    /// See [`Message::from_value`]; also fails on invalid JSON.
    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        Self::from_value(serde_json::from_slice(bytes)?)
    }

    /// Compact JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidMessage`] if serialization fails.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// JSON object form.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidMessage`] if serialization fails.
    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Indented JSON for display.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidMessage`] if serialization fails.
    pub fn pretty_print(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Message type.
    #[must_use]
    pub fn msg_type(&self) -> &MessageType {
        &self.msg_type
    }

    /// Message id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Field lookup. `@type` and `@id` are not in the map.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// String field lookup.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// All fields other than `@type` and `@id`.
    #[must_use]
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Trust context established when this message was received.
    #[must_use]
    pub fn mtc(&self) -> &MessageTrustContext {
        &self.mtc
    }

    /// Mutable trust context.
    pub fn mtc_mut(&mut self) -> &mut MessageTrustContext {
        &mut self.mtc
    }

    /// `~thread.thid`, if present.
    #[must_use]
    pub fn thread(&self) -> Option<&str> {
        self.get(THREAD_DECORATOR)?.get("thid")?.as_str()
    }

    /// Reply path requested in `~transport`, if any.
    #[must_use]
    pub fn return_route(&self) -> Option<ReturnRoute> {
        ReturnRoute::from_decorator(self.get(TRANSPORT_DECORATOR)?)
    }

    /// Copy of this message with `~thread.thid` set.
    #[must_use]
    pub fn with_thread(&self, thid: impl Into<String>) -> Self {
        let mut copy = self.clone();
        copy.fields.insert(
            THREAD_DECORATOR.to_string(),
            serde_json::json!({ "thid": thid.into() }),
        );
        copy
    }

    /// Copy of this message with a `~transport` return route.
    #[must_use]
    pub fn with_transport(&self, return_route: &ReturnRoute) -> Self {
        let mut copy = self.clone();
        copy.fields
            .insert(TRANSPORT_DECORATOR.to_string(), return_route.to_decorator());
        copy
    }
}

impl<'de> Deserialize<'de> for Message {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(value).map_err(serde::de::Error::custom)
    }
}

impl PartialEq for Message {
    fn eq(&self, other: &Self) -> bool {
        self.msg_type == other.msg_type && self.id == other.id && self.fields == other.fields
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("type", &self.msg_type.as_str())
            .field("id", &self.id)
            .field("fields", &self.fields)
            .field("mtc", &self.mtc)
            .finish()
    }
}

/// Forward message asking a mediator to deliver `msg` to `to`.
///
/// # Errors
///
/// Returns [`Error::InvalidType`] only if the forward type constant is
/// itself unparseable.
pub fn forward_message(to: &PublicKey, msg: Value) -> Result<Message> {
    Message::typed(FORWARD)?
        .with_field("to", base58::encode(to))?
        .with_field("msg", msg)
}
