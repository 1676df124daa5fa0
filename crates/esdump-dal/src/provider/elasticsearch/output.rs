//! Bulk writes and deletes.

use esdump_core::{ContainerRef, Error, Record, RecordRef, Result};
use futures::future::try_join_all;
use serde_json::{Map, Value, json};

use super::{ElasticsearchTransport, TRACING_TARGET};
use crate::core::{DeleteOutcome, RecordFailure, WriteOutcome};

/// Bulk action metadata line for one record.
fn action_line(action: &str, container: &ContainerRef, identity: &str) -> Result<String> {
    let mut meta = Map::with_capacity(3);
    meta.insert("_index".into(), Value::from(container.index.as_str()));
    if let Some(subtype) = &container.subtype {
        meta.insert("_type".into(), Value::from(subtype.as_str()));
    }
    meta.insert("_id".into(), Value::from(identity));

    let mut line = serde_json::to_string(&json!({ action: meta }))?;
    line.push('\n');
    Ok(line)
}

/// Describes the error of a failed bulk item.
fn item_error(item: &Value) -> String {
    match item.get("error") {
        Some(Value::Object(error)) => {
            let kind = error.get("type").and_then(Value::as_str).unwrap_or("error");
            match error.get("reason").and_then(Value::as_str) {
                Some(reason) => format!("{kind}: {reason}"),
                None => kind.to_owned(),
            }
        }
        Some(Value::String(reason)) => reason.clone(),
        _ => format!(
            "status {}",
            item.get("status").and_then(Value::as_u64).unwrap_or_default()
        ),
    }
}

/// Splits a bulk response into per-record results, in request order.
fn bulk_results<'a>(
    response: &'a Value,
    action: &str,
    expected: usize,
) -> Result<Vec<std::result::Result<(), String>>> {
    let Some(items) = response.get("items").and_then(Value::as_array) else {
        return Err(Error::source_unavailable().with_message("bulk response without items"));
    };
    if items.len() != expected {
        return Err(Error::internal().with_message(format!(
            "bulk response has {} items for {expected} actions",
            items.len()
        )));
    }

    Ok(items
        .iter()
        .map(|item| {
            let result: &'a Value = item
                .get(action)
                .or_else(|| item.as_object().and_then(|map| map.values().next()))
                .unwrap_or(item);
            let status = result.get("status").and_then(Value::as_u64).unwrap_or_default();
            if (200..300).contains(&status) {
                Ok(())
            } else {
                Err(item_error(result))
            }
        })
        .collect())
}

impl ElasticsearchTransport {
    /// Upserts records with `index` actions, one concurrent request per chunk.
    pub(super) async fn bulk_index(&self, records: Vec<Record>) -> Result<WriteOutcome> {
        if records.is_empty() {
            return Ok(WriteOutcome::default());
        }

        let chunks = records
            .chunks(self.bulk_chunk_size)
            .map(|chunk| self.bulk_index_chunk(chunk));
        let mut outcome = WriteOutcome::default();
        for chunk in try_join_all(chunks).await? {
            outcome.merge(chunk);
        }

        tracing::debug!(
            target: TRACING_TARGET,
            batch_size = records.len(),
            written = outcome.written,
            rejected = outcome.failures.len(),
            "Bulk indexed"
        );
        Ok(outcome)
    }

    async fn bulk_index_chunk(&self, chunk: &[Record]) -> Result<WriteOutcome> {
        let mut body = String::new();
        for record in chunk {
            let target = self.write_container(&record.container);
            body.push_str(&action_line("index", &target, &record.identity)?);
            body.push_str(&serde_json::to_string(&record.payload)?);
            body.push('\n');
        }

        let response = self.send_bulk(body).await?;
        let mut outcome = WriteOutcome::default();
        for (record, result) in chunk.iter().zip(bulk_results(&response, "index", chunk.len())?) {
            match result {
                Ok(()) => {
                    outcome.written += 1;
                    outcome.accepted.push(record.reference());
                }
                Err(reason) => {
                    tracing::warn!(
                        target: TRACING_TARGET,
                        record = %record,
                        reason = %reason,
                        "Destination rejected record"
                    );
                    outcome
                        .failures
                        .push(RecordFailure::rejected(record.to_string(), reason));
                }
            }
        }
        Ok(outcome)
    }

    /// Deletes records with `delete` actions, one concurrent request per chunk.
    pub(super) async fn bulk_delete(&self, refs: Vec<RecordRef>) -> Result<DeleteOutcome> {
        if refs.is_empty() {
            return Ok(DeleteOutcome::default());
        }

        let chunks = refs
            .chunks(self.bulk_chunk_size)
            .map(|chunk| self.bulk_delete_chunk(chunk));
        let mut outcome = DeleteOutcome::default();
        for chunk in try_join_all(chunks).await? {
            outcome.merge(chunk);
        }

        tracing::debug!(
            target: TRACING_TARGET,
            requested = refs.len(),
            deleted = outcome.deleted,
            "Bulk deleted"
        );
        Ok(outcome)
    }

    async fn bulk_delete_chunk(&self, chunk: &[RecordRef]) -> Result<DeleteOutcome> {
        let mut body = String::new();
        for reference in chunk {
            body.push_str(&action_line(
                "delete",
                &reference.container,
                &reference.identity,
            )?);
        }

        let response = self.send_bulk(body).await?;
        let mut outcome = DeleteOutcome::default();
        for (reference, result) in chunk
            .iter()
            .zip(bulk_results(&response, "delete", chunk.len())?)
        {
            match result {
                Ok(()) => outcome.deleted += 1,
                Err(reason) => outcome
                    .failures
                    .push(RecordFailure::rejected(reference.to_string(), reason)),
            }
        }
        Ok(outcome)
    }
}
