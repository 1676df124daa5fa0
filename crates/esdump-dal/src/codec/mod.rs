//! JSON codec shared by the file and stream transports.
//!
//! Two encodings are supported: one JSON value per line, or a single JSON
//! array holding every value. Readers detect the encoding from the first
//! non-whitespace byte.

mod reader;
mod writer;

#[cfg(feature = "config")]
use clap::ValueEnum;
pub use reader::UnitReader;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};
pub use writer::UnitWriter;

/// Tracing target for codec operations.
pub const TRACING_TARGET: &str = "esdump_dal::codec";

/// Serialized layout of a file or stream.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    AsRefStr,
    Display
)]
#[cfg_attr(feature = "config", derive(ValueEnum))]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Format {
    /// One JSON value per line.
    #[default]
    Lines,
    /// One top-level JSON array.
    Array,
}

impl Format {
    /// Returns the format selected by a line-format flag.
    pub const fn from_line_format(line_format: bool) -> Self {
        if line_format { Self::Lines } else { Self::Array }
    }
}
