//! Reqwest client module.
//!
//! This module provides the client handle and its configuration.

mod client;
mod config;

pub use client::{ReqwestClient, TRACING_TARGET};
pub use config::ReqwestConfig;
