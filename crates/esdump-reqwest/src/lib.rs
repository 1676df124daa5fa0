//! Reqwest-based HTTP client for esdump transports.
//!
//! This crate provides the [`ReqwestClient`] used by the indexed-store
//! transport to issue JSON and bulk NDJSON requests.
//!
//! # Example
//!
//! ```rust,ignore
//! use esdump_reqwest::{ReqwestClient, ReqwestConfig};
//! use reqwest::Method;
//!
//! let client = ReqwestClient::new(ReqwestConfig::default())?;
//!
//! let url = "http://localhost:9200/_cat/indices?format=json".parse()?;
//! let response = client.send_json(Method::GET, url, None).await?;
//! assert!(response.is_success());
//! ```

#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod connect;
mod error;
mod request;

pub use reqwest::{Method, StatusCode, Url};

pub use crate::connect::{ReqwestClient, ReqwestConfig, TRACING_TARGET};
pub use crate::error::{Error, Result};
pub use crate::request::JsonResponse;
