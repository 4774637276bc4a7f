//! Core types for the Chatline client
//!
//! This module defines the fundamental values that flow through the client,
//! using newtype patterns so identifiers, authors and timestamps cannot be mixed up.

use core::fmt;
use core::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::errors::{ChatError, ChatResult};

// ----------------------------------------------------------------------------
// Message Identifier
// ----------------------------------------------------------------------------

/// Opaque identifier of a stored message
///
/// The remote store decides the shape of identifiers. Tables with identity
/// columns hand out integers, others hand out UUID strings, so both are
/// accepted on the wire and kept as text internally.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    /// Create a new MessageId from any string-like value
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the identifier text
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<i64> for MessageId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for MessageId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for MessageId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl FromStr for MessageId {
    type Err = ChatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(ChatError::malformed("message id is empty"));
        }
        Ok(Self(trimmed.to_string()))
    }
}

impl<'de> Deserialize<'de> for MessageId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Integer(i64),
            Text(String),
        }

        match RawId::deserialize(deserializer)? {
            RawId::Integer(id) => Ok(Self::from(id)),
            RawId::Text(id) if id.is_empty() => {
                Err(serde::de::Error::custom("message id must not be empty"))
            }
            RawId::Text(id) => Ok(Self(id)),
        }
    }
}

// ----------------------------------------------------------------------------
// Author Identifier
// ----------------------------------------------------------------------------

/// Identity of a message author (the email the author signed in with)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthorId(String);

impl AuthorId {
    pub fn new(identity: impl Into<String>) -> Self {
        Self(identity.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AuthorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AuthorId {
    fn from(identity: &str) -> Self {
        Self(identity.to_string())
    }
}

impl From<String> for AuthorId {
    fn from(identity: String) -> Self {
        Self(identity)
    }
}

// ----------------------------------------------------------------------------
// Timestamp
// ----------------------------------------------------------------------------

/// Creation time in microseconds since the Unix epoch
///
/// Microseconds match the precision of a Postgres `timestamptz`, so two rows
/// created in the same millisecond still order correctly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Create a timestamp from microseconds since the epoch
    pub const fn from_micros(micros: i64) -> Self {
        Self(micros)
    }

    /// Create a timestamp from milliseconds since the epoch
    pub const fn from_millis(millis: i64) -> Self {
        Self(millis.saturating_mul(1_000))
    }

    /// Current wall-clock time
    pub fn now() -> Self {
        Self(Utc::now().timestamp_micros())
    }

    /// Parse an RFC 3339 timestamp such as `2024-03-01T12:00:00.123456+00:00`
    pub fn parse_rfc3339(value: &str) -> ChatResult<Self> {
        let parsed = DateTime::parse_from_rfc3339(value)
            .map_err(|e| ChatError::malformed(format!("invalid timestamp '{}': {}", value, e)))?;
        Ok(Self(parsed.with_timezone(&Utc).timestamp_micros()))
    }

    pub fn as_micros(&self) -> i64 {
        self.0
    }

    pub fn as_millis(&self) -> i64 {
        self.0.div_euclid(1_000)
    }

    /// Convert to a UTC date-time for display
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_micros(self.0).single()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_datetime() {
            Some(dt) => write!(f, "{}", dt.to_rfc3339()),
            None => write!(f, "{}us", self.0),
        }
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawTimestamp {
            Micros(i64),
            Text(String),
        }

        match RawTimestamp::deserialize(deserializer)? {
            RawTimestamp::Micros(micros) => Ok(Self(micros)),
            RawTimestamp::Text(text) => {
                Self::parse_rfc3339(&text).map_err(serde::de::Error::custom)
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Message
// ----------------------------------------------------------------------------

/// An immutable chat message as stored by the remote store
///
/// Field names on the wire follow the `messages` table columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub content: String,
    #[serde(rename = "user_email")]
    pub author: AuthorId,
    pub created_at: Timestamp,
}

impl Message {
    pub fn new(
        id: impl Into<MessageId>,
        content: impl Into<String>,
        author: impl Into<AuthorId>,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            author: author.into(),
            created_at,
        }
    }

    /// Decode a message from a raw row, rejecting rows with missing fields
    pub fn from_record(record: &serde_json::Value) -> ChatResult<Self> {
        if !record.is_object() {
            return Err(ChatError::malformed("message record is not an object"));
        }
        Message::deserialize(record)
            .map_err(|e| ChatError::malformed(format!("message record: {}", e)))
    }

    /// Whether this message was written by the given identity
    pub fn is_authored_by(&self, identity: &AuthorId) -> bool {
        &self.author == identity
    }
}

// ----------------------------------------------------------------------------
// Session
// ----------------------------------------------------------------------------

/// Who the client is currently acting as
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Session {
    #[default]
    Anonymous,
    Authenticated { identity: AuthorId },
}

impl Session {
    pub fn authenticated(identity: impl Into<AuthorId>) -> Self {
        Self::Authenticated {
            identity: identity.into(),
        }
    }

    pub fn identity(&self) -> Option<&AuthorId> {
        match self {
            Self::Anonymous => None,
            Self::Authenticated { identity } => Some(identity),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated { .. })
    }
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anonymous => write!(f, "anonymous"),
            Self::Authenticated { identity } => write!(f, "{}", identity),
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_id_accepts_integer_and_text() {
        let from_int: MessageId = serde_json::from_value(json!(42)).unwrap();
        assert_eq!(from_int.as_str(), "42");

        let from_text: MessageId =
            serde_json::from_value(json!("5f0c7c1e-0000-4000-8000-000000000001")).unwrap();
        assert_eq!(from_text.as_str(), "5f0c7c1e-0000-4000-8000-000000000001");

        assert!(serde_json::from_value::<MessageId>(json!("")).is_err());
        assert!(serde_json::from_value::<MessageId>(json!(null)).is_err());
    }

    #[test]
    fn test_timestamp_parsing_keeps_microseconds() {
        let ts = Timestamp::parse_rfc3339("2024-03-01T12:00:00.123456+00:00").unwrap();
        let later = Timestamp::parse_rfc3339("2024-03-01T12:00:00.123457+00:00").unwrap();
        assert!(ts < later);
        assert_eq!(later.as_micros() - ts.as_micros(), 1);
        assert_eq!(ts.as_millis(), later.as_millis());

        assert!(Timestamp::parse_rfc3339("yesterday").is_err());
    }

    #[test]
    fn test_message_from_record() {
        let record = json!({
            "id": 7,
            "content": "hello",
            "user_email": "ada@example.com",
            "created_at": "2024-03-01T12:00:00+00:00"
        });
        let message = Message::from_record(&record).unwrap();
        assert_eq!(message.id, MessageId::from(7));
        assert_eq!(message.author, AuthorId::from("ada@example.com"));
        assert_eq!(message.content, "hello");

        let missing_author = json!({
            "id": 8,
            "content": "hello",
            "created_at": "2024-03-01T12:00:00+00:00"
        });
        assert!(matches!(
            Message::from_record(&missing_author),
            Err(ChatError::MalformedEvent { .. })
        ));
        assert!(Message::from_record(&json!([1, 2, 3])).is_err());
    }

    #[test]
    fn test_session_identity() {
        assert_eq!(Session::default(), Session::Anonymous);
        assert!(Session::Anonymous.identity().is_none());

        let session = Session::authenticated("ada@example.com");
        assert!(session.is_authenticated());
        assert_eq!(session.identity().map(AuthorId::as_str), Some("ada@example.com"));
        assert_eq!(session.to_string(), "ada@example.com");
    }
}
