//! Transport implementations.
//!
//! Available providers:
//! - `elasticsearch`: indexed store over HTTP
//! - `file`: line- or array-encoded JSON files
//! - `stream`: the same codec over standard input/output
//! - `memory`: in-process store for tests (feature `test-utils`)

mod elasticsearch;
mod file;
#[cfg(any(test, feature = "test-utils"))]
mod memory;
mod stream;

use esdump_core::{TransferType, Unit};
use tokio::io::AsyncBufRead;

pub use self::elasticsearch::{ElasticsearchConfig, ElasticsearchTransport};
pub use self::file::FileTransport;
#[cfg(any(test, feature = "test-utils"))]
pub use self::memory::MemoryTransport;
pub use self::stream::StreamTransport;
use crate::codec::{self, UnitReader};
use crate::core::{Page, RecordFailure};

/// Reads up to `limit` values (every value for structural types) and
/// decodes them into units.
pub(crate) async fn read_page<R>(
    reader: &mut UnitReader<R>,
    kind: TransferType,
    limit: usize,
) -> esdump_core::Result<Page>
where
    R: AsyncBufRead + Unpin + Send,
{
    let mut units = Vec::new();
    let mut failures = Vec::new();
    let mut fetched = 0;

    while kind.is_structural() || fetched < limit {
        let Some(value) = reader.next_value().await? else {
            break;
        };
        fetched += 1;

        match value.and_then(|value| Unit::decode(kind, value)) {
            Ok(decoded) => units.extend(decoded),
            Err(err) => {
                tracing::warn!(
                    target: codec::TRACING_TARGET,
                    position = reader.position(),
                    error = %err,
                    "Skipping undecodable value"
                );
                failures.push(RecordFailure::new(
                    format!("value {}", reader.position()),
                    &err,
                ));
            }
        }
    }

    let exhausted = kind.is_structural() || reader.is_done();
    let cursor = (!exhausted).then(|| reader.position().to_string());
    Ok(Page {
        units,
        failures,
        cursor,
        exhausted,
    })
}
