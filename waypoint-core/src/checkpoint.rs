//! Checkpoint persistence.
//!
//! A checkpoint records how far a subscription has progressed through the log.
//! The engine reads it once when a subscription starts and writes it as events
//! are processed (see [`policy`](crate::policy) for *when*).
//!
//! This module provides:
//!
//! - [`CheckpointStore`] - the capability every variant implements
//! - [`InMemory`] - process-local storage, starts at `0`
//! - [`Caching`] - read-once, write-through decorator
//! - [`ReadOnly`] - observes another store without ever writing to it
//! - [`Callback`] - derives the position from a caller-supplied accessor
//! - [`log::LogCheckpointStore`] - durable storage in a dedicated event stream
//!
//! Positions are plain `u64`s where `0` means "nothing processed yet". Writing
//! `None` resets a checkpoint back to `0`.

use std::{
    convert::Infallible,
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use tokio::sync::Mutex;

pub mod log;

/// Storage for a single subscription's progress.
pub trait CheckpointStore: Send + Sync {
    /// Error type for checkpoint operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// The last persisted position, or `0` if none was ever stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage fails.
    fn get_checkpoint(&self) -> impl Future<Output = Result<u64, Self::Error>> + Send;

    /// Persist `position`. `None` resets the checkpoint to `0`.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage fails.
    fn store_checkpoint(
        &self,
        position: Option<u64>,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

impl<S: CheckpointStore> CheckpointStore for &S {
    type Error = S::Error;

    fn get_checkpoint(&self) -> impl Future<Output = Result<u64, Self::Error>> + Send {
        (**self).get_checkpoint()
    }

    fn store_checkpoint(
        &self,
        position: Option<u64>,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send {
        (**self).store_checkpoint(position)
    }
}

impl<S: CheckpointStore> CheckpointStore for Arc<S> {
    type Error = S::Error;

    fn get_checkpoint(&self) -> impl Future<Output = Result<u64, Self::Error>> + Send {
        (**self).get_checkpoint()
    }

    fn store_checkpoint(
        &self,
        position: Option<u64>,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send {
        (**self).store_checkpoint(position)
    }
}

/// Checkpoint held in process memory.
///
/// Lost on restart: use it where replay is acceptable (read-model rebuilds) or
/// where durability comes from an outer layer. Clones share the same value.
#[derive(Clone, Debug, Default)]
pub struct InMemory {
    position: Arc<AtomicU64>,
}

impl InMemory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a known position instead of `0`.
    #[must_use]
    pub fn starting_at(position: u64) -> Self {
        Self {
            position: Arc::new(AtomicU64::new(position)),
        }
    }
}

impl CheckpointStore for InMemory {
    type Error = Infallible;

    async fn get_checkpoint(&self) -> Result<u64, Self::Error> {
        Ok(self.position.load(Ordering::Acquire))
    }

    async fn store_checkpoint(&self, position: Option<u64>) -> Result<(), Self::Error> {
        self.position.store(position.unwrap_or(0), Ordering::Release);
        Ok(())
    }
}

/// Read-once, write-through cache in front of another store.
///
/// The first [`get_checkpoint`](CheckpointStore::get_checkpoint) delegates and
/// remembers the result; later reads are served from the cache. Every write
/// delegates and then updates the cache. Only correct while this instance is
/// the sole writer of the backing store.
#[derive(Debug)]
pub struct Caching<S> {
    inner: S,
    cached: Mutex<Option<u64>>,
}

impl<S> Caching<S> {
    #[must_use]
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            cached: Mutex::new(None),
        }
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: CheckpointStore> CheckpointStore for Caching<S> {
    type Error = S::Error;

    async fn get_checkpoint(&self) -> Result<u64, Self::Error> {
        // Held across the delegated read so concurrent first reads delegate once.
        let mut cached = self.cached.lock().await;
        if let Some(position) = *cached {
            return Ok(position);
        }
        let position = self.inner.get_checkpoint().await?;
        tracing::trace!(position, "checkpoint cache filled");
        *cached = Some(position);
        Ok(position)
    }

    async fn store_checkpoint(&self, position: Option<u64>) -> Result<(), Self::Error> {
        let mut cached = self.cached.lock().await;
        self.inner.store_checkpoint(position).await?;
        *cached = Some(position.unwrap_or(0));
        Ok(())
    }
}

/// Observe another store's checkpoint without owning it.
///
/// Writes, including resets, are accepted and discarded.
#[derive(Clone, Debug)]
pub struct ReadOnly<S> {
    inner: S,
}

impl<S> ReadOnly<S> {
    #[must_use]
    pub const fn new(inner: S) -> Self {
        Self { inner }
    }
}

impl<S: CheckpointStore> CheckpointStore for ReadOnly<S> {
    type Error = S::Error;

    fn get_checkpoint(&self) -> impl Future<Output = Result<u64, Self::Error>> + Send {
        self.inner.get_checkpoint()
    }

    async fn store_checkpoint(&self, position: Option<u64>) -> Result<(), Self::Error> {
        tracing::trace!(?position, "read-only checkpoint store ignored write");
        Ok(())
    }
}

/// A read-only checkpoint derived from an externally tracked cursor.
///
/// Every read calls the accessor; writes, including resets, are discarded.
#[derive(Clone)]
pub struct Callback<F> {
    accessor: F,
}

impl<F> Callback<F>
where
    F: Fn() -> u64 + Send + Sync,
{
    #[must_use]
    pub const fn new(accessor: F) -> Self {
        Self { accessor }
    }
}

impl<F> std::fmt::Debug for Callback<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Callback").finish_non_exhaustive()
    }
}

impl<F> CheckpointStore for Callback<F>
where
    F: Fn() -> u64 + Send + Sync,
{
    type Error = Infallible;

    async fn get_checkpoint(&self) -> Result<u64, Self::Error> {
        Ok((self.accessor)())
    }

    async fn store_checkpoint(&self, _position: Option<u64>) -> Result<(), Self::Error> {
        Ok(())
    }
}
