//! Cursor manager: pagination and offset handling for one input transport.

use std::sync::Arc;
use std::time::{Duration, Instant};

use esdump_core::{ContainerRef, ErrorKind, Result, TransferType, format_duration};
use esdump_dal::{Page, ReadContext, Transport};
use serde::Serialize;
use serde_json::Value;
use strum::{AsRefStr, Display};

use crate::{RetryConfig, TransferOptions};

/// Tracing target for cursor operations.
const TRACING_TARGET: &str = "esdump_engine::cursor";

/// How many times one session may reopen an expired cursor.
const MAX_RESUMES: u32 = 5;

/// How the requested offset is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum OffsetStrategy {
    /// No offset: native pagination from the start.
    Native,
    /// The first fetch skips directly to the offset.
    Skip,
    /// Whole batches are fetched and dropped until the offset is reached.
    Discard,
}

impl OffsetStrategy {
    /// Selects the strategy for an offset and a transport.
    pub fn select(offset: u64, skip_supported: bool) -> Self {
        match (offset, skip_supported) {
            (0, _) => Self::Native,
            (_, true) => Self::Skip,
            (_, false) => Self::Discard,
        }
    }
}

/// Pagination state of one session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CursorState {
    /// Token to resubmit for the next batch.
    pub token: Option<String>,
    /// Records handed to the session so far.
    pub records_delivered: u64,
    /// No further fetch will be issued.
    pub exhausted: bool,
}

/// Presents `next_batch()` over any transport pagination model.
///
/// Transient failures of the fetch that opens a cursor are retried with
/// backoff. A continuation is never resubmitted: when it expires or fails
/// the token is dropped and pagination restarts at
/// `offset + records_delivered`.
pub struct CursorManager {
    input: Arc<dyn Transport>,
    kind: TransferType,
    container: Option<ContainerRef>,
    limit: usize,
    offset: u64,
    filter: Option<Value>,
    lease: Duration,
    retry: RetryConfig,
    skip_supported: bool,

    state: CursorState,
    /// Records still to drop before delivering.
    pending_discard: u64,
    resumes: u32,
    last_fetch: Option<Instant>,
    warnings: Vec<String>,
}

impl CursorManager {
    /// Creates a manager reading `container` (or the transport's own) from
    /// `input`.
    pub fn new(
        input: Arc<dyn Transport>,
        container: Option<ContainerRef>,
        options: &TransferOptions,
    ) -> Self {
        let skip_supported = input.capabilities().skip;
        // Structural types are one definition per container, never windowed.
        let offset = if options.kind.is_structural() {
            0
        } else {
            options.offset
        };
        let pending_discard = match OffsetStrategy::select(offset, skip_supported) {
            OffsetStrategy::Discard => offset,
            OffsetStrategy::Native | OffsetStrategy::Skip => 0,
        };

        Self {
            input,
            kind: options.kind,
            container,
            limit: options.limit.max(1),
            offset,
            filter: options.filter.clone(),
            lease: options.cursor_lease,
            retry: options.retry.clone(),
            skip_supported,
            state: CursorState::default(),
            pending_discard,
            resumes: 0,
            last_fetch: None,
            warnings: Vec::new(),
        }
    }

    /// Returns the strategy used to reach the offset.
    pub fn strategy(&self) -> OffsetStrategy {
        OffsetStrategy::select(self.offset, self.skip_supported)
    }

    /// Returns the pagination state.
    pub fn state(&self) -> &CursorState {
        &self.state
    }

    /// Returns whether no further batch will be fetched.
    pub fn is_exhausted(&self) -> bool {
        self.state.exhausted
    }

    /// Takes the warnings collected so far.
    pub fn take_warnings(&mut self) -> Vec<String> {
        std::mem::take(&mut self.warnings)
    }

    /// Fetches the next batch.
    ///
    /// Returns an empty, exhausted page once the source has no more
    /// records. Structural types are fetched once.
    pub async fn next_batch(&mut self) -> Result<Page> {
        if self.state.exhausted {
            return Ok(Page::last(Vec::new()));
        }

        loop {
            let mut page = self.fetch().await?;
            if page.cursor.is_some() {
                self.state.token = page.cursor.take();
            }
            let exhausted =
                self.kind.is_structural() || page.exhausted || page.fetched() == 0;

            if self.pending_discard > 0 {
                let fetched = page.fetched() as u64;
                if fetched <= self.pending_discard {
                    self.pending_discard -= fetched;
                    tracing::debug!(
                        target: TRACING_TARGET,
                        discarded = fetched,
                        remaining = self.pending_discard,
                        "Discarded batch before offset"
                    );
                    if exhausted {
                        self.state.exhausted = true;
                        return Ok(Page::last(Vec::new()));
                    }
                    continue;
                }

                let skip = usize::try_from(self.pending_discard).unwrap_or(usize::MAX);
                page.units.drain(..skip.min(page.units.len()));
                self.pending_discard = 0;
            }

            self.state.records_delivered += page.units.len() as u64;
            self.state.exhausted = exhausted;
            page.exhausted = exhausted;
            return Ok(page);
        }
    }

    /// Releases a still-open server-side cursor, best-effort.
    pub async fn close(&mut self) {
        let Some(token) = self.state.token.take() else {
            return;
        };
        if let Err(err) = self.input.clear_cursor(&token).await {
            tracing::warn!(
                target: TRACING_TARGET,
                input = %self.input.describe(),
                error = %err,
                "Failed to release cursor"
            );
            self.warnings.push(format!("failed to release cursor: {err}"));
        }
    }

    /// Builds the context of the next fetch.
    fn context(&self) -> ReadContext {
        let ctx = ReadContext::new(self.kind, self.limit)
            .with_container(self.container.clone())
            .with_filter(self.filter.clone())
            .with_lease(self.lease);

        match &self.state.token {
            Some(token) => ctx.with_cursor(token.clone()),
            None if self.skip_supported => {
                ctx.with_skip(self.offset + self.state.records_delivered)
            }
            None => ctx,
        }
    }

    /// Fetches with retry and cursor recovery.
    async fn fetch(&mut self) -> Result<Page> {
        loop {
            self.check_lease_gap();

            let ctx = self.context();
            let input = Arc::clone(&self.input);
            // A continuation advances the source even when its response is
            // lost, so only opening fetches are retried in place.
            let result = match ctx.cursor() {
                Some(_) => input.fetch(&ctx).await,
                None => self.retry.retry(|| input.fetch(&ctx)).await,
            };
            self.last_fetch = Some(Instant::now());

            match result {
                Ok(page) => return Ok(page),
                Err(err)
                    if matches!(err.kind(), ErrorKind::CursorExpired | ErrorKind::SourceUnavailable)
                        && self.state.token.is_some()
                        && self.resumes < MAX_RESUMES =>
                {
                    self.resume(&err).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Drops the current token and restarts at the first undelivered record.
    async fn resume(&mut self, err: &esdump_core::Error) {
        self.resumes += 1;
        let Some(token) = self.state.token.take() else {
            return;
        };

        let expired = err.kind() == ErrorKind::CursorExpired;
        if !expired && let Err(clear_err) = self.input.clear_cursor(&token).await {
            tracing::debug!(
                target: TRACING_TARGET,
                error = %clear_err,
                "Failed to release abandoned cursor"
            );
        }

        let position = self.offset + self.state.records_delivered;
        if !self.skip_supported {
            self.pending_discard = position;
        }

        let reason = if expired {
            "cursor expired"
        } else {
            "cursor continuation failed"
        };
        tracing::warn!(
            target: TRACING_TARGET,
            input = %self.input.describe(),
            position,
            resumes = self.resumes,
            error = %err,
            "Cursor abandoned, resuming"
        );
        self.warnings
            .push(format!("{reason}, resumed at record {position}"));
    }

    fn check_lease_gap(&mut self) {
        let Some(last) = self.last_fetch else {
            return;
        };
        if self.state.token.is_none() {
            return;
        }

        let gap = last.elapsed();
        if gap > self.lease {
            tracing::warn!(
                target: TRACING_TARGET,
                gap = %format_duration(gap),
                lease = %format_duration(self.lease),
                "Time between fetches exceeded the cursor lease"
            );
            self.warnings.push(format!(
                "{} between fetches exceeded the cursor lease of {}",
                format_duration(gap),
                format_duration(self.lease)
            ));
        }
    }
}

impl std::fmt::Debug for CursorManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CursorManager")
            .field("input", &self.input.describe())
            .field("kind", &self.kind)
            .field("strategy", &self.strategy())
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
