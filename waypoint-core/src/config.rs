//! Per-subscription configuration.
//!
//! [`SubscriptionConfig`] is deserializable so it can live next to the rest of
//! an application's settings:
//!
//! ```json
//! { "name": "order-totals", "poll_interval": 250, "checkpoint_every": 10, "checkpoint_store": "log" }
//! ```
//!
//! Everything except `name` has a default.

use std::{convert::Infallible, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    checkpoint::{
        CheckpointStore, InMemory,
        log::{self, LogCheckpointStore},
    },
    policy::AfterMessages,
    store::EventStore,
    subscription::{DEFAULT_POLL_INTERVAL, SubscriptionEngine},
};

/// Where a configured subscription keeps its checkpoint.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointStoreKind {
    /// Process memory; replays from the start after a restart.
    #[default]
    Memory,
    /// A `Checkpoint-<name>` stream in the event store.
    Log,
}

/// Configuration for one subscription.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubscriptionConfig {
    /// Durable identity; also names the checkpoint stream.
    pub name: String,

    /// Idle delay between polls once caught up, in milliseconds.
    /// Default: 100
    #[serde(default = "default_poll_interval", with = "millis")]
    pub poll_interval: Duration,

    /// Persist the checkpoint every N handled events.
    /// Default: 1
    #[serde(default = "default_checkpoint_every")]
    pub checkpoint_every: u64,

    /// Persist outstanding progress when stopped cleanly.
    /// Default: true
    #[serde(default = "default_flush_on_stop")]
    pub flush_on_stop: bool,

    /// Default: memory
    #[serde(default)]
    pub checkpoint_store: CheckpointStoreKind,
}

fn default_poll_interval() -> Duration {
    DEFAULT_POLL_INTERVAL
}

const fn default_checkpoint_every() -> u64 {
    1
}

const fn default_flush_on_stop() -> bool {
    true
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("subscription name must not be empty")]
    EmptyName,
    #[error("checkpoint_every must be at least 1")]
    ZeroCheckpointInterval,
}

impl SubscriptionConfig {
    /// A configuration with every default applied.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            poll_interval: default_poll_interval(),
            checkpoint_every: default_checkpoint_every(),
            flush_on_stop: default_flush_on_stop(),
            checkpoint_store: CheckpointStoreKind::default(),
        }
    }

    /// # Errors
    ///
    /// Returns a [`ConfigError`] for an empty name or a zero checkpoint
    /// interval.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::EmptyName);
        }
        if self.checkpoint_every == 0 {
            return Err(ConfigError::ZeroCheckpointInterval);
        }
        Ok(())
    }

    /// Build an engine wired with the selected checkpoint store and an
    /// [`AfterMessages`] policy.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the configuration is invalid.
    pub fn build<S: EventStore>(
        &self,
        store: S,
    ) -> Result<SubscriptionEngine<ConfiguredCheckpointStore<S>>, ConfigError> {
        self.validate()?;
        let checkpoints = match self.checkpoint_store {
            CheckpointStoreKind::Memory => ConfiguredCheckpointStore::Memory(InMemory::new()),
            CheckpointStoreKind::Log => ConfiguredCheckpointStore::Log(
                LogCheckpointStore::for_subscription(store, &self.name),
            ),
        };
        tracing::debug!(
            subscription = %self.name,
            store = ?self.checkpoint_store,
            every = self.checkpoint_every,
            "subscription configured"
        );
        Ok(
            SubscriptionEngine::new(checkpoints, AfterMessages::new(self.checkpoint_every))
                .with_name(self.name.clone())
                .with_poll_interval(self.poll_interval)
                .with_flush_on_stop(self.flush_on_stop),
        )
    }
}

/// The checkpoint store chosen by a [`SubscriptionConfig`].
#[derive(Clone, Debug)]
pub enum ConfiguredCheckpointStore<S> {
    Memory(InMemory),
    Log(LogCheckpointStore<S>),
}

impl<S: EventStore> CheckpointStore for ConfiguredCheckpointStore<S> {
    type Error = log::Error<S::Error>;

    async fn get_checkpoint(&self) -> Result<u64, Self::Error> {
        match self {
            Self::Memory(store) => store.get_checkpoint().await.map_err(absurd),
            Self::Log(store) => store.get_checkpoint().await,
        }
    }

    async fn store_checkpoint(&self, position: Option<u64>) -> Result<(), Self::Error> {
        match self {
            Self::Memory(store) => store.store_checkpoint(position).await.map_err(absurd),
            Self::Log(store) => store.store_checkpoint(position).await,
        }
    }
}

fn absurd<E: std::error::Error>(never: Infallible) -> log::Error<E> {
    match never {}
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let millis = u64::try_from(value.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(millis)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
