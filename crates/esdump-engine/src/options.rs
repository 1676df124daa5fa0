//! Transfer options.

use std::time::Duration;

use derive_builder::Builder;
use esdump_core::{Error, Result, TransferType};
use esdump_dal::core::DEFAULT_LEASE;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::RetryConfig;

/// Default number of records per batch.
pub const DEFAULT_LIMIT: usize = 100;

/// Immutable options of one transfer.
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[builder(
    name = "TransferOptionsBuilder",
    pattern = "owned",
    setter(into, prefix = "with"),
    build_fn(validate = "Self::validate_options")
)]
pub struct TransferOptions {
    /// Maximum number of records per batch.
    #[builder(default = "DEFAULT_LIMIT")]
    pub limit: usize,
    /// Number of records to skip before the first transferred one.
    #[builder(default)]
    pub offset: u64,
    /// Declared transfer type.
    #[builder(default)]
    pub kind: TransferType,
    /// Filter query (or full search body) for document reads.
    #[builder(default, setter(strip_option))]
    pub filter: Option<Value>,
    /// Write payloads without their envelope.
    #[builder(default)]
    pub source_only: bool,
    /// One JSON value per line rather than a single array.
    #[builder(default = "true")]
    pub line_format: bool,
    /// Delete transferred source records after the last write.
    #[builder(default)]
    pub delete_after_transfer: bool,
    /// How long a server-side cursor stays alive between fetches.
    #[builder(default = "DEFAULT_LEASE")]
    #[serde(with = "humantime_serde")]
    pub cursor_lease: Duration,
    /// Transfer every container discovered at the input.
    #[builder(default)]
    pub fan_out_all: bool,
    /// Containers skipped by fan-out.
    #[builder(default)]
    pub exclude: Vec<String>,
    /// Retry policy for transient transport failures.
    #[builder(default)]
    pub retry: RetryConfig,
    /// Sessions run at once by fan-out.
    #[builder(default = "1")]
    pub fan_out_concurrency: usize,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            offset: 0,
            kind: TransferType::Data,
            filter: None,
            source_only: false,
            line_format: true,
            delete_after_transfer: false,
            cursor_lease: DEFAULT_LEASE,
            fan_out_all: false,
            exclude: Vec::new(),
            retry: RetryConfig::default(),
            fan_out_concurrency: 1,
        }
    }
}

impl TransferOptions {
    /// Creates a builder.
    pub fn builder() -> TransferOptionsBuilder {
        TransferOptionsBuilder::default()
    }

    /// Checks option coherence.
    pub fn validate(&self) -> Result<()> {
        check(
            self.limit,
            self.fan_out_concurrency,
            self.kind,
            self.filter.is_some(),
            self.delete_after_transfer,
            self.cursor_lease,
        )
        .map_err(|message| Error::configuration_invalid().with_message(message))
    }
}

impl TransferOptionsBuilder {
    fn validate_options(&self) -> std::result::Result<(), String> {
        check(
            self.limit.unwrap_or(DEFAULT_LIMIT),
            self.fan_out_concurrency.unwrap_or(1),
            self.kind.unwrap_or_default(),
            self.filter.as_ref().is_some_and(Option::is_some),
            self.delete_after_transfer.unwrap_or_default(),
            self.cursor_lease.unwrap_or(DEFAULT_LEASE),
        )
    }
}

fn check(
    limit: usize,
    fan_out_concurrency: usize,
    kind: TransferType,
    has_filter: bool,
    delete_after_transfer: bool,
    cursor_lease: Duration,
) -> std::result::Result<(), String> {
    if limit == 0 {
        return Err("limit must be at least 1".into());
    }
    if fan_out_concurrency == 0 {
        return Err("fan-out concurrency must be at least 1".into());
    }
    if cursor_lease.is_zero() {
        return Err("cursor lease must be longer than zero".into());
    }
    if kind.is_structural() && has_filter {
        return Err(format!("a filter query cannot be used with type '{kind}'"));
    }
    if kind.is_structural() && delete_after_transfer {
        return Err(format!("delete after transfer cannot be used with type '{kind}'"));
    }
    Ok(())
}
