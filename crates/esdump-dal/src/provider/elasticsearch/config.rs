//! Elasticsearch transport configuration.

#[cfg(feature = "config")]
use clap::Args;
use serde::{Deserialize, Serialize};

use crate::core::DEFAULT_MAX_SOCKETS;

/// Default number of records per bulk request.
pub const DEFAULT_BULK_CHUNK_SIZE: usize = 500;

/// Configuration shared by every Elasticsearch transport of a process.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "config", derive(Args))]
pub struct ElasticsearchConfig {
    /// Maximum number of concurrent HTTP requests across all transports.
    #[cfg_attr(
        feature = "config",
        arg(long = "max-sockets", env = "ESDUMP_MAX_SOCKETS", default_value_t = DEFAULT_MAX_SOCKETS)
    )]
    #[serde(default = "default_max_sockets")]
    pub max_sockets: usize,

    /// Maximum number of records per bulk request; larger batches are split
    /// and sent concurrently.
    #[cfg_attr(
        feature = "config",
        arg(
            long = "bulk-chunk-size",
            env = "ESDUMP_BULK_CHUNK_SIZE",
            default_value_t = DEFAULT_BULK_CHUNK_SIZE
        )
    )]
    #[serde(default = "default_bulk_chunk_size")]
    pub bulk_chunk_size: usize,
}

fn default_max_sockets() -> usize {
    DEFAULT_MAX_SOCKETS
}

fn default_bulk_chunk_size() -> usize {
    DEFAULT_BULK_CHUNK_SIZE
}

impl Default for ElasticsearchConfig {
    fn default() -> Self {
        Self {
            max_sockets: default_max_sockets(),
            bulk_chunk_size: default_bulk_chunk_size(),
        }
    }
}

impl ElasticsearchConfig {
    /// Sets the connection ceiling.
    #[must_use]
    pub fn with_max_sockets(mut self, max_sockets: usize) -> Self {
        self.max_sockets = max_sockets;
        self
    }

    /// Sets the bulk chunk size.
    #[must_use]
    pub fn with_bulk_chunk_size(mut self, bulk_chunk_size: usize) -> Self {
        self.bulk_chunk_size = bulk_chunk_size;
        self
    }

    /// Returns the chunk size, treating zero as one.
    pub fn effective_bulk_chunk_size(&self) -> usize {
        self.bulk_chunk_size.max(1)
    }
}
