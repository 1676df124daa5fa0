#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

mod cursor;
mod fanout;
mod options;
mod retry;
mod session;
mod transform;

pub use cursor::{CursorManager, CursorState, OffsetStrategy};
pub use fanout::{DumpReport, FanOut, dump};
pub use options::{DEFAULT_LIMIT, TransferOptions, TransferOptionsBuilder, TransferOptionsBuilderError};
pub use retry::RetryConfig;
pub use session::{DumpSession, SessionState, TransferCounters, TransferReport};
pub use transform::transform;
