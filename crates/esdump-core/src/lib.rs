#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

mod error;

pub mod datatype;
pub mod time;

pub use datatype::{ContainerRef, Record, RecordRef, Structure, TransferType, Unit};
pub use error::{BoxedError, Error, ErrorKind, Result};
pub use time::{format_duration, parse_duration};
