//! Checkpoints kept in the event log itself.
//!
//! Each write appends a `Recorded` event to a dedicated stream; a read takes
//! the last event of that stream. Only the latest value is ever consulted, so
//! writes are unconditional appends. The stream is never compacted.

use serde::Deserialize;
use thiserror::Error as ThisError;

use crate::{
    checkpoint::CheckpointStore,
    concurrency::ExpectedVersion,
    event::NewEvent,
    store::{AppendError, EventStore, NonEmpty},
    stream::{Category, StreamName},
};

/// Category of the streams created by [`LogCheckpointStore::for_subscription`].
pub const CHECKPOINT_CATEGORY: &str = "Checkpoint";

/// Event type of a checkpoint write.
pub const RECORDED: &str = "Recorded";

#[derive(Debug, Deserialize)]
struct Recorded {
    #[serde(with = "crate::wire::decimal_option")]
    position: Option<u64>,
}

/// Error from a log-backed checkpoint store.
#[derive(Debug, ThisError)]
pub enum Error<E>
where
    E: std::error::Error + 'static,
{
    /// Reading the checkpoint stream failed.
    #[error("failed to read checkpoint stream: {0}")]
    Store(#[source] E),
    /// The last event of the checkpoint stream is not a valid checkpoint.
    #[error("malformed checkpoint in `{stream}`: {source}")]
    Decode {
        stream: StreamName,
        #[source]
        source: serde_json::Error,
    },
    /// The last event of the checkpoint stream was not written by a checkpoint
    /// store.
    #[error("unexpected `{kind}` event in checkpoint stream `{stream}`")]
    UnexpectedEvent { stream: StreamName, kind: String },
    /// Appending the new checkpoint failed.
    #[error("failed to append checkpoint: {0}")]
    Append(#[source] AppendError<E>),
}

/// A [`CheckpointStore`] that persists through an [`EventStore`].
///
/// Lets a consumer avoid any storage dependency beyond the event store. A
/// fresh instance pointed at the same stream observes the same checkpoint.
#[derive(Clone, Debug)]
pub struct LogCheckpointStore<S> {
    store: S,
    stream: StreamName,
}

impl<S> LogCheckpointStore<S> {
    /// Keep checkpoints in an explicit stream.
    #[must_use]
    pub const fn new(store: S, stream: StreamName) -> Self {
        Self { store, stream }
    }

    /// Keep checkpoints in `Checkpoint-<subscription>`.
    #[must_use]
    pub fn for_subscription(store: S, subscription: &str) -> Self {
        let stream = Category::new(CHECKPOINT_CATEGORY).stream(subscription);
        Self::new(store, stream)
    }

    #[must_use]
    pub const fn stream(&self) -> &StreamName {
        &self.stream
    }
}

impl<S: EventStore> CheckpointStore for LogCheckpointStore<S> {
    type Error = Error<S::Error>;

    #[tracing::instrument(skip(self), fields(stream = %self.stream))]
    async fn get_checkpoint(&self) -> Result<u64, Self::Error> {
        let Some(last) = self
            .store
            .last_event_from_stream(&self.stream)
            .await
            .map_err(Error::Store)?
        else {
            tracing::trace!("no checkpoint recorded");
            return Ok(0);
        };
        if last.kind != RECORDED {
            return Err(Error::UnexpectedEvent {
                stream: self.stream.clone(),
                kind: last.kind,
            });
        }

        let recorded: Recorded = last.decode().map_err(|source| Error::Decode {
            stream: self.stream.clone(),
            source,
        })?;
        let position = recorded.position.unwrap_or(0);
        tracing::trace!(position, "checkpoint loaded");
        Ok(position)
    }

    #[tracing::instrument(skip(self), fields(stream = %self.stream))]
    async fn store_checkpoint(&self, position: Option<u64>) -> Result<(), Self::Error> {
        let payload = serde_json::json!({ "position": position.map(|p| p.to_string()) });
        let event = NewEvent::new(RECORDED, payload);
        self.store
            .append_events(&self.stream, NonEmpty::new(event), ExpectedVersion::Any)
            .await
            .map_err(Error::Append)?;
        tracing::debug!(?position, "checkpoint recorded");
        Ok(())
    }
}
