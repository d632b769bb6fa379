//! In-memory event store implementation.
//!
//! [`Store`] is a thread-safe, process-local implementation of
//! [`EventStore`](super::EventStore) suitable for tests, examples and
//! read-model rebuilds that tolerate losing the log on restart.
//!
//! Positions are 1-based: the first event of a stream has `position == 1` and
//! the first event of the log has `global_position == 1`, so `0` means "before
//! everything".
//!
//! # Example
//!
//! ```
//! use waypoint_core::store::inmemory;
//!
//! let store = inmemory::Store::new();
//! assert!(store.is_empty());
//! ```

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use chrono::Utc;
use nonempty::NonEmpty;

use crate::{
    cancel::Cancellation,
    concurrency::ExpectedVersion,
    event::{NewEvent, RecordedEvent},
    store::{AppendError, AppendOutcome, AppendResult, EventStore, EventStream},
    stream::{AddressError, CategoryFilter, StreamName},
};

/// Number of events copied out of the log per lock acquisition while reading.
const READ_PAGE_SIZE: usize = 256;

/// In-memory event log.
///
/// Clones share the same log.
#[derive(Clone, Default)]
pub struct Store {
    inner: Arc<RwLock<Inner>>,
}

#[derive(Default)]
struct Inner {
    /// Every event, in global order. `log[i].global_position == i + 1`.
    log: Vec<RecordedEvent>,
    /// Per-stream indices into `log`, in stream order.
    streams: HashMap<StreamName, Vec<usize>>,
}

/// Error type for the in-memory store.
#[derive(Debug, thiserror::Error)]
pub enum InMemoryError {
    #[error("invalid category expression: {0}")]
    Address(#[from] AddressError),
}

impl Store {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of events in the log.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().expect("in-memory store lock poisoned").log.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy up to one page of events starting at `cursor` (an index into the
    /// log), returning them with the cursor to resume from.
    fn category_page(
        &self,
        filter: &CategoryFilter,
        cursor: usize,
    ) -> (Vec<RecordedEvent>, usize) {
        let inner = self.inner.read().expect("in-memory store lock poisoned");
        let end = inner.log.len().min(cursor.saturating_add(READ_PAGE_SIZE));
        let page = inner
            .log
            .get(cursor..end)
            .unwrap_or_default()
            .iter()
            .filter(|event| filter.matches_stream(&event.stream_name))
            .cloned()
            .collect();
        (page, end.max(cursor))
    }

    fn stream_page(&self, stream: &StreamName, cursor: usize) -> (Vec<RecordedEvent>, usize) {
        let inner = self.inner.read().expect("in-memory store lock poisoned");
        let Some(indices) = inner.streams.get(stream) else {
            return (Vec::new(), cursor);
        };
        let end = indices.len().min(cursor.saturating_add(READ_PAGE_SIZE));
        let page = indices
            .get(cursor..end)
            .unwrap_or_default()
            .iter()
            .map(|&index| inner.log[index].clone())
            .collect();
        (page, end.max(cursor))
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

fn index_after(position: u64) -> usize {
    usize::try_from(position).unwrap_or(usize::MAX)
}

impl EventStore for Store {
    type Error = InMemoryError;

    #[tracing::instrument(skip(self, events), fields(event_count = events.len()))]
    fn append_events<'a>(
        &'a self,
        stream: &'a StreamName,
        events: NonEmpty<NewEvent>,
        expected: ExpectedVersion,
    ) -> impl Future<Output = AppendOutcome<Self::Error>> + Send + 'a {
        let result = (|| {
            let mut inner = self.inner.write().expect("in-memory store lock poisoned");
            let current = inner
                .streams
                .get(stream)
                .and_then(|indices| u64::try_from(indices.len()).ok())
                .filter(|&len| len > 0);

            if let Err(conflict) = expected.check(current) {
                tracing::debug!(%expected, ?current, "version mismatch, rejecting append");
                return Err(AppendError::Conflict(conflict));
            }

            let time = Utc::now();
            let mut position = current.unwrap_or(0);
            let mut global_position = 0;
            for event in events {
                position += 1;
                let index = inner.log.len();
                global_position = index as u64 + 1;
                inner.log.push(RecordedEvent {
                    id: event.id,
                    stream_name: stream.clone(),
                    kind: event.kind,
                    data: event.data,
                    position,
                    global_position,
                    time,
                });
                inner.streams.entry(stream.clone()).or_default().push(index);
            }
            drop(inner);

            tracing::debug!(position, global_position, "events appended to stream");
            Ok(AppendResult {
                position,
                global_position,
            })
        })();

        std::future::ready(result)
    }

    fn read_category<'a>(
        &'a self,
        category: &'a str,
        after_global_position: u64,
        cancel: Cancellation,
    ) -> EventStream<'a, Self::Error> {
        Box::pin(async_stream::stream! {
            let filter = match CategoryFilter::parse(category) {
                Ok(filter) => filter,
                Err(error) => {
                    yield Err(InMemoryError::from(error));
                    return;
                }
            };

            // Global position `p` lives at index `p - 1`, so the first event
            // strictly after `after_global_position` is at that same index.
            let mut cursor = index_after(after_global_position);
            loop {
                if cancel.is_cancelled() {
                    tracing::trace!(category, "category read cancelled");
                    return;
                }
                let (page, next) = self.category_page(&filter, cursor);
                if next == cursor {
                    return;
                }
                cursor = next;
                for event in page {
                    if cancel.is_cancelled() {
                        return;
                    }
                    yield Ok(event);
                }
            }
        })
    }

    fn read_stream<'a>(
        &'a self,
        stream: &'a StreamName,
        after_position: u64,
        cancel: Cancellation,
    ) -> EventStream<'a, Self::Error> {
        Box::pin(async_stream::stream! {
            let mut cursor = index_after(after_position);
            loop {
                if cancel.is_cancelled() {
                    return;
                }
                let (page, next) = self.stream_page(stream, cursor);
                if next == cursor {
                    return;
                }
                cursor = next;
                for event in page {
                    if cancel.is_cancelled() {
                        return;
                    }
                    yield Ok(event);
                }
            }
        })
    }

    #[tracing::instrument(skip(self))]
    fn last_event_from_stream<'a>(
        &'a self,
        stream: &'a StreamName,
    ) -> impl Future<Output = Result<Option<RecordedEvent>, Self::Error>> + Send + 'a {
        let last = {
            let inner = self.inner.read().expect("in-memory store lock poisoned");
            inner
                .streams
                .get(stream)
                .and_then(|indices| indices.last())
                .map(|&index| inner.log[index].clone())
        };
        tracing::trace!(found = last.is_some(), "last event lookup");
        std::future::ready(Ok(last))
    }
}
