//! Data types that flow through a transfer.
//!
//! - [`Record`] is one document with its identity and container.
//! - [`Structure`] is one structural definition (mapping, analyzer settings,
//!   template or alias set) attached to a container.
//! - [`Unit`] is what transports fetch and write.

mod record;
mod structure;

#[cfg(feature = "config")]
use clap::ValueEnum;
pub use record::{ContainerRef, Record, RecordRef};
use serde::{Deserialize, Serialize};
use serde_json::Value;
pub use structure::Structure;
use strum::{AsRefStr, Display, EnumString, IntoStaticStr};

use crate::{Error, Result};

/// Declared type of a transfer.
///
/// Determines which transform is applied and whether pagination applies.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    AsRefStr,
    IntoStaticStr,
    Display,
    EnumString
)]
#[cfg_attr(feature = "config", derive(ValueEnum))]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TransferType {
    /// Paginated document records.
    #[default]
    #[serde(alias = "documents")]
    #[strum(to_string = "data", serialize = "documents")]
    #[cfg_attr(feature = "config", value(name = "data", alias = "documents"))]
    Data,
    /// Index mappings.
    Mapping,
    /// Analysis (analyzer) settings.
    #[serde(alias = "settings")]
    #[strum(to_string = "analyzer", serialize = "settings")]
    #[cfg_attr(feature = "config", value(alias = "settings"))]
    Analyzer,
    /// Index templates.
    Template,
    /// Index aliases.
    Alias,
}

impl TransferType {
    /// Returns whether this type transfers one structural object per
    /// container instead of a paginated document set.
    pub const fn is_structural(self) -> bool {
        !matches!(self, Self::Data)
    }
}

/// One unit moving through the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum Unit {
    /// A document serialized with its full envelope.
    Document(Record),
    /// A document serialized as its payload alone.
    ///
    /// The identity and container are still used to address writes.
    Source(Record),
    /// A structural definition.
    Structure(Structure),
}

impl Unit {
    /// Returns the record carried by this unit, if any.
    pub fn record(&self) -> Option<&Record> {
        match self {
            Self::Document(record) | Self::Source(record) => Some(record),
            Self::Structure(_) => None,
        }
    }

    /// Returns the structure carried by this unit, if any.
    pub fn structure(&self) -> Option<&Structure> {
        match self {
            Self::Structure(structure) => Some(structure),
            _ => None,
        }
    }

    /// Encodes this unit into its serialized JSON form.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Document(record) => record.to_envelope(),
            Self::Source(record) => record.payload.clone(),
            Self::Structure(structure) => structure.to_value(),
        }
    }

    /// Decodes one serialized JSON value into units of the declared type.
    ///
    /// Document values decode into exactly one unit; structural values
    /// decode into one unit per top-level container key.
    pub fn decode(kind: TransferType, value: Value) -> Result<Vec<Self>> {
        match kind {
            TransferType::Data => Ok(vec![Self::Document(Record::from_envelope(value)?)]),
            _ => Ok(Structure::from_value(kind, value)?
                .into_iter()
                .map(Self::Structure)
                .collect()),
        }
    }

    /// Returns a short label used in logs and failure reports.
    pub fn label(&self) -> String {
        match self {
            Self::Document(record) | Self::Source(record) => record.to_string(),
            Self::Structure(structure) => {
                format!("{}:{}", structure.kind, structure.container)
            }
        }
    }
}

impl TryFrom<Unit> for Record {
    type Error = Error;

    fn try_from(unit: Unit) -> Result<Self> {
        match unit {
            Unit::Document(record) | Unit::Source(record) => Ok(record),
            Unit::Structure(structure) => Err(Error::malformed_record().with_message(format!(
                "expected a document, found {} for '{}'",
                structure.kind, structure.container
            ))),
        }
    }
}
