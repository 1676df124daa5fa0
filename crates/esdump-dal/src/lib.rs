#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

pub mod codec;
pub mod core;
pub mod provider;

mod endpoint;

pub use codec::Format;
pub use crate::core::{
    Capabilities, ConnectionLimiter, DeleteOutcome, Page, ReadContext, RecordFailure, Transport,
    WriteOutcome,
};

pub use endpoint::{Endpoint, EndpointOptions, Role};
#[cfg(any(test, feature = "test-utils"))]
pub use provider::MemoryTransport;
pub use provider::{ElasticsearchConfig, ElasticsearchTransport, FileTransport, StreamTransport};
