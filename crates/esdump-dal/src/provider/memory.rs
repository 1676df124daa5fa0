//! In-memory transport for tests.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use esdump_core::{ContainerRef, Error, Record, RecordRef, Result, Structure, TransferType, Unit};
use serde_json::{Value, json};

use crate::core::{
    Capabilities, DeleteOutcome, Page, ReadContext, RecordFailure, Transport, WriteOutcome,
};

/// Open cursor over a snapshot of matching records.
#[derive(Debug)]
struct Cursor {
    records: Vec<Record>,
    position: usize,
}

#[derive(Debug, Default)]
struct MemoryState {
    indices: BTreeMap<String, BTreeMap<String, Record>>,
    structures: BTreeMap<(TransferType, String), Value>,
    cursors: HashMap<String, Cursor>,
    next_cursor: u64,

    fail_fetches: usize,
    fail_from: Option<usize>,
    expire_at_fetch: Option<usize>,
    lose_response_at: Option<usize>,
    rejected: HashSet<String>,
    failing: HashSet<String>,

    fetches: usize,
    finishes: usize,
    refreshes: usize,
    cleared: Vec<String>,
}

/// Full-capability transport backed by in-process maps.
///
/// Fetches snapshot the matching records when a cursor is opened. Writes
/// are upserts keyed by identity. Failures can be injected to exercise
/// retry and resume paths.
#[derive(Debug)]
pub struct MemoryTransport {
    name: String,
    capabilities: Capabilities,
    container: Option<ContainerRef>,
    state: Mutex<MemoryState>,
}

impl MemoryTransport {
    /// Creates an empty transport with every capability.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            capabilities: Capabilities::all(),
            container: None,
            state: Mutex::new(MemoryState::default()),
        }
    }

    /// Overrides the declared capabilities.
    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Sets the default container, used for reads and to re-address writes.
    pub fn with_container(mut self, container: ContainerRef) -> Self {
        self.container = Some(container);
        self
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Inserts records `{key: "key{i}", _uuid: i}` with identities `0..count`.
    pub fn seed(&self, index: &str, count: u64) {
        for i in 0..count {
            self.insert(Record::new(
                i.to_string(),
                ContainerRef::new(index),
                json!({"key": format!("key{i}"), "_uuid": i}),
            ));
        }
    }

    /// Inserts or replaces a record.
    pub fn insert(&self, record: Record) {
        self.state()
            .indices
            .entry(record.container.index.clone())
            .or_default()
            .insert(record.identity.clone(), record);
    }

    /// Inserts or replaces a structural definition.
    pub fn insert_structure(&self, kind: TransferType, container: &str, body: Value) {
        self.state()
            .structures
            .insert((kind, container.to_owned()), body);
    }

    /// Makes the next `count` fetches fail with `SourceUnavailable`.
    pub fn fail_next_fetches(&self, count: usize) {
        self.state().fail_fetches = count;
    }

    /// Makes every fetch from fetch number `fetch` (1-based) on fail with
    /// `SourceUnavailable`.
    pub fn fail_from_fetch(&self, fetch: usize) {
        self.state().fail_from = Some(fetch);
    }

    /// Expires every open cursor when fetch number `fetch` (1-based)
    /// resubmits a cursor.
    pub fn expire_cursors_at_fetch(&self, fetch: usize) {
        self.state().expire_at_fetch = Some(fetch);
    }

    /// Makes fetch number `fetch` (1-based) advance its cursor and then fail
    /// with `SourceUnavailable`, as when a response is lost in transit.
    pub fn lose_response_at_fetch(&self, fetch: usize) {
        self.state().lose_response_at = Some(fetch);
    }

    /// Rejects every write of this identity.
    pub fn reject_identity(&self, identity: &str) {
        self.state().rejected.insert(identity.to_owned());
    }

    /// Fails every fetch from this index with a non-retryable error.
    pub fn fail_container(&self, index: &str) {
        self.state().failing.insert(index.to_owned());
    }

    /// Returns the number of records in an index.
    pub fn count(&self, index: &str) -> usize {
        self.state().indices.get(index).map_or(0, BTreeMap::len)
    }

    /// Returns the total number of records across indices.
    pub fn total(&self) -> usize {
        self.state().indices.values().map(BTreeMap::len).sum()
    }

    /// Returns the records of an index ordered by identity.
    pub fn records(&self, index: &str) -> Vec<Record> {
        self.state()
            .indices
            .get(index)
            .map(|records| records.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns a stored structural definition.
    pub fn structure(&self, kind: TransferType, container: &str) -> Option<Value> {
        self.state()
            .structures
            .get(&(kind, container.to_owned()))
            .cloned()
    }

    /// Returns how many fetch calls were made.
    pub fn fetch_count(&self) -> usize {
        self.state().fetches
    }

    /// Returns how many times `finish` was called.
    pub fn finish_count(&self) -> usize {
        self.state().finishes
    }

    /// Returns how many times `refresh` was called.
    pub fn refresh_count(&self) -> usize {
        self.state().refreshes
    }

    /// Returns the number of cursors still open.
    pub fn open_cursors(&self) -> usize {
        self.state().cursors.len()
    }

    /// Returns the cursors released through `clear_cursor`.
    pub fn cleared_cursors(&self) -> Vec<String> {
        self.state().cleared.clone()
    }

    fn read_container<'a>(&'a self, ctx: &'a ReadContext) -> Option<&'a ContainerRef> {
        ctx.container.as_ref().or(self.container.as_ref())
    }

    fn fetch_structures(&self, ctx: &ReadContext) -> Page {
        let container = self.read_container(ctx).map(|c| c.index.clone());
        let state = self.state();
        let units = state
            .structures
            .iter()
            .filter(|((kind, name), _)| {
                *kind == ctx.kind && container.as_ref().is_none_or(|c| c == name)
            })
            .map(|((kind, name), body)| Unit::Structure(Structure::new(name, *kind, body.clone())))
            .collect();
        Page::last(units)
    }
}

/// Evaluates the small query subset understood by the memory transport:
/// `match_all`, `term` and `range`. Anything else matches nothing.
fn matches(filter: &Value, payload: &Value) -> bool {
    let query = filter.get("query").unwrap_or(filter);
    let Some((operator, clause)) = query.as_object().and_then(|q| q.iter().next()) else {
        return true;
    };

    let Some((field, condition)) = clause.as_object().and_then(|c| c.iter().next()) else {
        return operator == "match_all";
    };
    let value = &payload[field.as_str()];

    match operator.as_str() {
        "match_all" => true,
        "term" => {
            let expected = condition.get("value").unwrap_or(condition);
            value == expected
        }
        "range" => {
            let Some(actual) = as_number(value) else {
                return false;
            };
            let bound = |name: &str| condition.get(name).and_then(as_number);
            bound("gte").is_none_or(|b| actual >= b)
                && bound("gt").is_none_or(|b| actual > b)
                && bound("lte").is_none_or(|b| actual <= b)
                && bound("lt").is_none_or(|b| actual < b)
        }
        _ => false,
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

#[async_trait::async_trait]
impl Transport for MemoryTransport {
    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn describe(&self) -> String {
        format!("memory '{}'", self.name)
    }

    async fn fetch(&self, ctx: &ReadContext) -> Result<Page> {
        let container = self.read_container(ctx).cloned();
        {
            let mut state = self.state();
            state.fetches += 1;

            if state.fail_from.is_some_and(|from| state.fetches >= from) {
                return Err(Error::source_unavailable().with_message("injected outage"));
            }
            if state.fail_fetches > 0 {
                state.fail_fetches -= 1;
                return Err(Error::source_unavailable().with_message("injected fetch failure"));
            }
            if let Some(container) = &container
                && state.failing.contains(&container.index)
            {
                return Err(Error::internal()
                    .with_message(format!("injected failure for '{}'", container.index)));
            }
        }

        if ctx.kind.is_structural() {
            return Ok(self.fetch_structures(ctx));
        }

        let mut state = self.state();
        let token = match ctx.cursor() {
            Some(token) => {
                if state.expire_at_fetch == Some(state.fetches) {
                    state.expire_at_fetch = None;
                    state.cursors.clear();
                }
                if !state.cursors.contains_key(token) {
                    return Err(Error::cursor_expired()
                        .with_message(format!("no search context found for '{token}'")));
                }
                token.to_owned()
            }
            None => {
                let records: Vec<Record> = state
                    .indices
                    .iter()
                    .filter(|(index, _)| container.as_ref().is_none_or(|c| &c.index == *index))
                    .flat_map(|(_, records)| records.values())
                    .filter(|record| {
                        container
                            .as_ref()
                            .and_then(|c| c.subtype.as_ref())
                            .is_none_or(|subtype| record.container.subtype.as_ref() == Some(subtype))
                    })
                    .filter(|record| {
                        ctx.filter
                            .as_ref()
                            .is_none_or(|filter| matches(filter, &record.payload))
                    })
                    .cloned()
                    .collect();

                let position = if self.capabilities.skip {
                    usize::try_from(ctx.skip).unwrap_or(usize::MAX).min(records.len())
                } else {
                    0
                };

                state.next_cursor += 1;
                let token = format!("{}-cursor-{}", self.name, state.next_cursor);
                state
                    .cursors
                    .insert(token.clone(), Cursor { records, position });
                token
            }
        };

        let Some(cursor) = state.cursors.get_mut(&token) else {
            return Err(Error::internal().with_message("cursor vanished"));
        };
        let end = (cursor.position + ctx.limit).min(cursor.records.len());
        let units: Vec<Unit> = cursor.records[cursor.position..end]
            .iter()
            .cloned()
            .map(Unit::Document)
            .collect();
        cursor.position = end;

        if state.lose_response_at == Some(state.fetches) {
            state.lose_response_at = None;
            return Err(Error::source_unavailable().with_message("injected lost response"));
        }

        let exhausted = units.len() < ctx.limit;
        Ok(Page {
            units,
            failures: Vec::new(),
            cursor: Some(token),
            exhausted,
        })
    }

    async fn write(&self, units: Vec<Unit>) -> Result<WriteOutcome> {
        let mut state = self.state();
        let mut outcome = WriteOutcome::default();

        for unit in units {
            match unit {
                Unit::Document(record) | Unit::Source(record) => {
                    if state.rejected.contains(&record.identity) {
                        outcome
                            .failures
                            .push(RecordFailure::rejected(record.to_string(), "injected rejection"));
                        continue;
                    }

                    let reference = record.reference();
                    let mut stored = record;
                    if let Some(target) = &self.container {
                        stored.container = ContainerRef {
                            index: target.index.clone(),
                            subtype: target.subtype.clone().or(stored.container.subtype),
                        };
                    }
                    state
                        .indices
                        .entry(stored.container.index.clone())
                        .or_default()
                        .insert(stored.identity.clone(), stored);

                    outcome.written += 1;
                    outcome.accepted.push(reference);
                }
                Unit::Structure(structure) => {
                    let container = self
                        .container
                        .as_ref()
                        .map_or(structure.container, |c| c.index.clone());
                    state
                        .structures
                        .insert((structure.kind, container), structure.body);
                    outcome.written += 1;
                }
            }
        }

        Ok(outcome)
    }

    async fn delete(&self, refs: Vec<RecordRef>) -> Result<DeleteOutcome> {
        let mut state = self.state();
        let mut outcome = DeleteOutcome::default();

        for reference in refs {
            let removed = state
                .indices
                .get_mut(&reference.container.index)
                .and_then(|records| records.remove(&reference.identity));
            match removed {
                Some(_) => outcome.deleted += 1,
                None => outcome.failures.push(RecordFailure::rejected(
                    reference.to_string(),
                    "not found",
                )),
            }
        }

        Ok(outcome)
    }

    async fn refresh(&self, _container: Option<&ContainerRef>) -> Result<()> {
        self.state().refreshes += 1;
        Ok(())
    }

    async fn clear_cursor(&self, cursor: &str) -> Result<()> {
        let mut state = self.state();
        state.cursors.remove(cursor);
        state.cleared.push(cursor.to_owned());
        Ok(())
    }

    async fn discover(&self) -> Result<Vec<String>> {
        Ok(self.state().indices.keys().cloned().collect())
    }

    async fn finish(&self) -> Result<()> {
        self.state().finishes += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pages_through_snapshot() {
        let transport = MemoryTransport::new("source");
        transport.seed("source_index", 5);

        let ctx = ReadContext::new(TransferType::Data, 2)
            .with_container(Some(ContainerRef::new("source_index")));
        let first = transport.fetch(&ctx).await.unwrap();
        assert_eq!(first.units.len(), 2);
        assert!(!first.exhausted);

        let ctx = ctx.with_cursor(first.cursor.unwrap());
        assert_eq!(transport.fetch(&ctx).await.unwrap().units.len(), 2);
        let last = transport.fetch(&ctx).await.unwrap();
        assert_eq!(last.units.len(), 1);
        assert!(last.exhausted);
    }

    #[tokio::test]
    async fn test_term_and_range_filters() {
        let transport = MemoryTransport::new("source");
        transport.seed("source_index", 500);

        let ctx = ReadContext::new(TransferType::Data, 1000)
            .with_filter(Some(json!({"query": {"term": {"key": "key1"}}})));
        assert_eq!(transport.fetch(&ctx).await.unwrap().units.len(), 1);

        let ctx = ReadContext::new(TransferType::Data, 1000)
            .with_filter(Some(json!({"query": {"range": {"_uuid": {"lte": "2"}}}})));
        assert_eq!(transport.fetch(&ctx).await.unwrap().units.len(), 3);
    }

    #[tokio::test]
    async fn test_expired_cursor() {
        let transport = MemoryTransport::new("source");
        transport.seed("source_index", 10);
        transport.expire_cursors_at_fetch(2);

        let ctx = ReadContext::new(TransferType::Data, 4);
        let first = transport.fetch(&ctx).await.unwrap();
        let err = transport
            .fetch(&ctx.with_cursor(first.cursor.unwrap()))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), esdump_core::ErrorKind::CursorExpired);
    }

    #[tokio::test]
    async fn test_lost_response_still_advances_cursor() {
        let transport = MemoryTransport::new("source");
        transport.seed("source_index", 10);
        transport.lose_response_at_fetch(2);

        let ctx = ReadContext::new(TransferType::Data, 4);
        let first = transport.fetch(&ctx).await.unwrap();
        let ctx = ctx.with_cursor(first.cursor.unwrap());

        let err = transport.fetch(&ctx).await.unwrap_err();
        assert_eq!(err.kind(), esdump_core::ErrorKind::SourceUnavailable);

        // The page behind the lost response is gone from this cursor.
        let last = transport.fetch(&ctx).await.unwrap();
        assert_eq!(last.units.len(), 2);
        assert!(last.exhausted);
    }

    #[tokio::test]
    async fn test_writes_are_re_addressed_to_default_container() {
        let transport =
            MemoryTransport::new("destination").with_container(ContainerRef::new("destination_index"));
        let record = Record::new("1", ContainerRef::new("source_index"), json!({"key": "key1"}));

        let outcome = transport
            .write(vec![Unit::Document(record.clone())])
            .await
            .unwrap();
        assert_eq!(outcome.accepted, vec![record.reference()]);
        assert_eq!(transport.count("destination_index"), 1);
        assert_eq!(transport.count("source_index"), 0);
    }
}
