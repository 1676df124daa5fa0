//! Document records and container addressing.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Error, Result};

/// Logical container a record lives in: an index and an optional sub-type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContainerRef {
    /// Index (collection) name.
    pub index: String,
    /// Optional sub-type name within the index.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
}

impl ContainerRef {
    /// Creates a container reference without a sub-type.
    pub fn new(index: impl Into<String>) -> Self {
        Self {
            index: index.into(),
            subtype: None,
        }
    }

    /// Sets the sub-type.
    pub fn with_subtype(mut self, subtype: impl Into<String>) -> Self {
        self.subtype = Some(subtype.into());
        self
    }

    /// Parses `index` or `index/subtype`, ignoring surrounding slashes.
    pub fn parse(path: &str) -> Result<Self> {
        let mut segments = path.split('/').filter(|s| !s.is_empty());

        let index = segments.next().ok_or_else(|| {
            Error::configuration_invalid().with_message(format!("empty container path '{path}'"))
        })?;
        let subtype = segments.next();

        if segments.next().is_some() {
            return Err(Error::configuration_invalid()
                .with_message(format!("container path '{path}' has more than two segments")));
        }

        Ok(Self {
            index: index.to_owned(),
            subtype: subtype.map(str::to_owned),
        })
    }

    /// Returns the URL path for this container, e.g. `index/subtype`.
    pub fn path(&self) -> String {
        match &self.subtype {
            Some(subtype) => format!("{}/{}", self.index, subtype),
            None => self.index.clone(),
        }
    }
}

impl FromStr for ContainerRef {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for ContainerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

/// One transferable document.
///
/// The identity is preserved verbatim on write, so re-running a transfer
/// overwrites instead of duplicating.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Envelope", into = "Envelope")]
pub struct Record {
    /// Stable identity shared by source and destination.
    pub identity: String,
    /// Container the record belongs to.
    pub container: ContainerRef,
    /// Schema-less document body.
    pub payload: Value,
}

impl Record {
    /// Creates a new record.
    pub fn new(identity: impl Into<String>, container: ContainerRef, payload: Value) -> Self {
        Self {
            identity: identity.into(),
            container,
            payload,
        }
    }

    /// Returns the reference used to address this record for deletion.
    pub fn reference(&self) -> RecordRef {
        RecordRef {
            container: self.container.clone(),
            identity: self.identity.clone(),
        }
    }

    /// Encodes the record as `{_index, _type?, _id, _source}`.
    pub fn to_envelope(&self) -> Value {
        let mut envelope = serde_json::Map::with_capacity(4);
        envelope.insert("_index".into(), Value::from(self.container.index.as_str()));
        if let Some(subtype) = &self.container.subtype {
            envelope.insert("_type".into(), Value::from(subtype.as_str()));
        }
        envelope.insert("_id".into(), Value::from(self.identity.as_str()));
        envelope.insert("_source".into(), self.payload.clone());
        Value::Object(envelope)
    }

    /// Decodes a record from its envelope form.
    ///
    /// Extra envelope fields such as `_score` are ignored.
    pub fn from_envelope(value: Value) -> Result<Self> {
        let envelope: Envelope = serde_json::from_value(value).map_err(|e| {
            Error::malformed_record()
                .with_message(format!("not a document envelope: {e}"))
                .with_source(e)
        })?;
        Ok(envelope.into())
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.container, self.identity)
    }
}

/// Address of a record: container plus identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordRef {
    /// Container the record belongs to.
    pub container: ContainerRef,
    /// Record identity.
    pub identity: String,
}

impl fmt::Display for RecordRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.container, self.identity)
    }
}

/// Serialized envelope of a [`Record`].
#[derive(Serialize, Deserialize)]
struct Envelope {
    #[serde(rename = "_index")]
    index: String,
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    subtype: Option<String>,
    #[serde(rename = "_id", deserialize_with = "identity_from_value")]
    id: String,
    #[serde(rename = "_source", default)]
    source: Value,
}

impl From<Envelope> for Record {
    fn from(envelope: Envelope) -> Self {
        Self {
            identity: envelope.id,
            container: ContainerRef {
                index: envelope.index,
                subtype: envelope.subtype,
            },
            payload: envelope.source,
        }
    }
}

impl From<Record> for Envelope {
    fn from(record: Record) -> Self {
        Self {
            index: record.container.index,
            subtype: record.container.subtype,
            id: record.identity,
            source: record.payload,
        }
    }
}

/// Accepts numeric identities written by older tools as well as strings.
fn identity_from_value<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "invalid _id: expected string or number, found {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::ErrorKind;

    #[test]
    fn test_container_parse() {
        let c = ContainerRef::parse("/source_index/seeds").unwrap();
        assert_eq!(c.index, "source_index");
        assert_eq!(c.subtype.as_deref(), Some("seeds"));
        assert_eq!(c.path(), "source_index/seeds");

        let c: ContainerRef = "destination_index".parse().unwrap();
        assert_eq!(c, ContainerRef::new("destination_index"));

        assert!(ContainerRef::parse("/").is_err());
        assert!(ContainerRef::parse("a/b/c").is_err());
    }

    #[test]
    fn test_envelope_encoding() {
        let record = Record::new(
            "42",
            ContainerRef::new("source_index").with_subtype("seeds"),
            json!({"key": "key42"}),
        );
        assert_eq!(
            record.to_envelope(),
            json!({
                "_index": "source_index",
                "_type": "seeds",
                "_id": "42",
                "_source": {"key": "key42"}
            })
        );
    }

    #[test]
    fn test_envelope_decoding_ignores_extra_fields() {
        let record = Record::from_envelope(json!({
            "_index": "source_index",
            "_id": 7,
            "_score": 1.0,
            "_source": {"key": "key7"}
        }))
        .unwrap();
        assert_eq!(record.identity, "7");
        assert_eq!(record.container, ContainerRef::new("source_index"));
        assert_eq!(record.payload["key"], "key7");
    }

    #[test]
    fn test_bare_payload_is_malformed() {
        let err = Record::from_envelope(json!({"key": "key1"})).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedRecord);
    }
}
