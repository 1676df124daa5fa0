//! Structural definitions attached to a container.

use serde_json::{Map, Value};

use super::TransferType;
use crate::{Error, Result};

/// One structural object: the mapping, analyzer settings, template or
/// alias set of a single container.
#[derive(Debug, Clone, PartialEq)]
pub struct Structure {
    /// Container (index or template) name.
    pub container: String,
    /// Which structural type this body describes.
    pub kind: TransferType,
    /// Body as returned by the source, keyed below the container name.
    pub body: Value,
}

impl Structure {
    /// Creates a new structure.
    pub fn new(container: impl Into<String>, kind: TransferType, body: Value) -> Self {
        Self {
            container: container.into(),
            kind,
            body,
        }
    }

    /// Encodes the structure as `{container: body}`.
    pub fn to_value(&self) -> Value {
        let mut map = Map::with_capacity(1);
        map.insert(self.container.clone(), self.body.clone());
        Value::Object(map)
    }

    /// Splits a `{container: body, ...}` object into one structure per key.
    pub fn from_value(kind: TransferType, value: Value) -> Result<Vec<Self>> {
        if !kind.is_structural() {
            return Err(Error::internal()
                .with_message(format!("'{kind}' is not a structural transfer type")));
        }

        let Value::Object(map) = value else {
            return Err(Error::malformed_record().with_message(format!(
                "expected an object keyed by container name for '{kind}'"
            )));
        };

        Ok(map
            .into_iter()
            .map(|(container, body)| Self::new(container, kind, body))
            .collect())
    }
}
