//! The event store port.
//!
//! The engine never writes domain events and never owns the log; it consumes
//! an [`EventStore`] through the small contract below. Any backend that honours
//! it (a relational log, an in-memory vector, a remote service) can drive
//! subscriptions. [`inmemory::Store`] is the reference implementation.
use std::{future::Future, pin::Pin};

use futures_core::Stream;
pub use nonempty::NonEmpty;
use thiserror::Error;

use crate::{
    cancel::Cancellation,
    concurrency::{ConcurrencyConflict, ExpectedVersion},
    event::{NewEvent, RecordedEvent},
    stream::StreamName,
};

pub mod inmemory;

/// A lazy, ordered sequence of recorded events.
///
/// Streams returned by [`EventStore::read_category`] and
/// [`EventStore::read_stream`] are finite: they yield what is available when
/// polled and then end. Callers tail the log by reading again from the last
/// position they saw.
pub type EventStream<'a, E> = Pin<Box<dyn Stream<Item = Result<RecordedEvent, E>> + Send + 'a>>;

/// Error from append operations.
#[derive(Debug, Error)]
pub enum AppendError<StoreError>
where
    StoreError: std::error::Error,
{
    /// The stream did not match the expected version.
    #[error(transparent)]
    Conflict(#[from] ConcurrencyConflict),
    /// Underlying store error.
    #[error("store error: {0}")]
    Store(#[source] StoreError),
}

/// Where an appended batch landed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct AppendResult {
    /// Stream position of the last event written.
    pub position: u64,
    /// Global position of the last event written.
    pub global_position: u64,
}

/// Convenience alias for append outcomes returned by event stores.
pub type AppendOutcome<Err> = Result<AppendResult, AppendError<Err>>;

/// Abstraction over the append-only event log.
pub trait EventStore: Send + Sync {
    /// Store-specific error type.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Atomically append a batch of events to a stream.
    ///
    /// # Errors
    ///
    /// Returns [`AppendError::Conflict`] when `expected` does not hold, or
    /// [`AppendError::Store`] if persistence fails.
    fn append_events<'a>(
        &'a self,
        stream: &'a StreamName,
        events: NonEmpty<NewEvent>,
        expected: ExpectedVersion,
    ) -> impl Future<Output = AppendOutcome<Self::Error>> + Send + 'a;

    /// Read the events of every stream in a category, ordered by global
    /// position, starting strictly after `after_global_position`.
    ///
    /// `category` is a category expression: an exact category name or a
    /// wildcard prefix such as `Foo#*`. An invalid expression surfaces as the
    /// first item of the stream. The stream stops yielding once `cancel` fires.
    fn read_category<'a>(
        &'a self,
        category: &'a str,
        after_global_position: u64,
        cancel: Cancellation,
    ) -> EventStream<'a, Self::Error>;

    /// Read a single stream, ordered by stream position, starting strictly
    /// after `after_position`.
    fn read_stream<'a>(
        &'a self,
        stream: &'a StreamName,
        after_position: u64,
        cancel: Cancellation,
    ) -> EventStream<'a, Self::Error>;

    /// The most recent event of a stream, if the stream exists.
    ///
    /// # Errors
    ///
    /// Returns a store-specific error when the read fails.
    fn last_event_from_stream<'a>(
        &'a self,
        stream: &'a StreamName,
    ) -> impl Future<Output = Result<Option<RecordedEvent>, Self::Error>> + Send + 'a;

    /// The current version (last position) of a stream; `None` if it has no
    /// events.
    ///
    /// # Errors
    ///
    /// Returns a store-specific error when the read fails.
    fn stream_version<'a>(
        &'a self,
        stream: &'a StreamName,
    ) -> impl Future<Output = Result<Option<u64>, Self::Error>> + Send + 'a {
        async move {
            Ok(self
                .last_event_from_stream(stream)
                .await?
                .map(|event| event.position))
        }
    }
}
