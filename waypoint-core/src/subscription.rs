//! Catch-up subscriptions.
//!
//! A [`SubscriptionEngine`] drives one poll/process/checkpoint loop:
//!
//! 1. Read the checkpoint from its [`CheckpointStore`]
//! 2. Ask the source for everything strictly after that position
//! 3. Hand each event to the handler, one at a time, in log order
//! 4. Ask the [`CheckpointPolicy`] whether to persist the event's position
//! 5. Once the source is exhausted, wait for the poll interval and repeat
//!
//! A handler error stops the loop and is returned to the caller. The failed
//! event is never checkpointed, so a restarted subscription sees it again:
//! delivery is at-least-once and handlers must tolerate repeats.
//!
//! Cancellation is cooperative. The read, the handler and the idle delay all
//! observe the shared [`Cancellation`]; once it fires the loop returns `Ok(())`.
//!
//! # Example
//!
//! ```ignore
//! let mut engine = SubscriptionEngine::new(checkpoints, AfterMessages::new(10))
//!     .with_name("order-totals");
//! let handle = spawn_subscription(move |cancel| async move {
//!     engine
//!         .subscribe_category(&store, "Order", handle_order_event, &cancel)
//!         .await
//! });
//!
//! // Later, shut down gracefully
//! handle.stop().await?;
//! ```

use std::{future::Future, pin::pin, time::Duration};

use futures_core::Stream;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt as _;

use crate::{
    cancel::Cancellation,
    checkpoint::CheckpointStore,
    event::RecordedEvent,
    policy::{AfterMessages, CheckpointPolicy},
    store::EventStore,
    stream::{AddressError, CategoryFilter, StreamName},
};

/// Type-erased error from a handler, a source or a checkpoint store.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Delay between polls once a subscription has caught up.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Errors that end a subscription.
#[derive(Debug, Error)]
pub enum SubscriptionError {
    /// The category expression or stream name was rejected.
    #[error(transparent)]
    Address(#[from] AddressError),
    /// Reading or writing the checkpoint failed.
    #[error("checkpoint store error: {0}")]
    Checkpoint(#[source] BoxError),
    /// The event source returned an error.
    #[error("event source error: {0}")]
    Source(#[source] BoxError),
    /// The handler failed; the event at `position` was not checkpointed.
    #[error("handler failed at position {position}: {source}")]
    Handler {
        position: u64,
        #[source]
        source: BoxError,
    },
    /// The subscription task panicked.
    #[error("subscription task panicked")]
    TaskPanicked,
}

/// Lifecycle of a [`SubscriptionEngine`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum SubscriptionState {
    /// Never started.
    #[default]
    Idle,
    /// A `subscribe` call is in progress.
    Running,
    /// The last run ended through cancellation.
    Stopped,
    /// The last run ended with an error.
    Failed,
}

/// Runs catch-up subscriptions against one checkpoint store and policy.
///
/// The engine owns its checkpoint identity. Independent subscriptions must use
/// independent engines with distinct checkpoint stores.
#[derive(Debug)]
pub struct SubscriptionEngine<C, P = AfterMessages> {
    name: String,
    checkpoints: C,
    policy: P,
    poll_interval: Duration,
    flush_on_stop: bool,
    state: SubscriptionState,
}

impl<C, P> SubscriptionEngine<C, P> {
    #[must_use]
    pub fn new(checkpoints: C, policy: P) -> Self {
        Self {
            name: "subscription".to_owned(),
            checkpoints,
            policy,
            poll_interval: DEFAULT_POLL_INTERVAL,
            flush_on_stop: true,
            state: SubscriptionState::Idle,
        }
    }

    /// Name used in log output.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    #[must_use]
    pub const fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Whether a clean stop persists progress the policy has not yet
    /// persisted. Enabled by default; never applies after a failure.
    #[must_use]
    pub const fn with_flush_on_stop(mut self, flush_on_stop: bool) -> Self {
        self.flush_on_stop = flush_on_stop;
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn state(&self) -> SubscriptionState {
        self.state
    }

    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    #[must_use]
    pub const fn checkpoints(&self) -> &C {
        &self.checkpoints
    }
}

impl<C, P> SubscriptionEngine<C, P>
where
    C: CheckpointStore,
    P: CheckpointPolicy,
{
    /// Run a subscription over an arbitrary source until cancelled or failed.
    ///
    /// `source(after, cancel)` must produce the events strictly after `after`
    /// that are available now, then end. `position_of` extracts the position
    /// the checkpoint tracks. Events at or below the current position are
    /// skipped, so a source may safely repeat itself.
    ///
    /// # Errors
    ///
    /// Returns the first checkpoint, source or handler error. Cancellation is
    /// not an error.
    #[tracing::instrument(skip_all, fields(subscription = %self.name))]
    pub async fn subscribe<T, Src, St, SE, Pos, H, Fut, HE>(
        &mut self,
        source: Src,
        position_of: Pos,
        handler: H,
        cancel: &Cancellation,
    ) -> Result<(), SubscriptionError>
    where
        Src: FnMut(u64, Cancellation) -> St,
        St: Stream<Item = Result<T, SE>>,
        SE: Into<BoxError>,
        Pos: FnMut(&T) -> u64,
        H: FnMut(T) -> Fut,
        Fut: Future<Output = Result<(), HE>>,
        HE: Into<BoxError>,
    {
        self.state = SubscriptionState::Running;
        let result = self.run(source, position_of, handler, cancel).await;
        self.state = match &result {
            Ok(()) => {
                tracing::debug!("subscription stopped");
                SubscriptionState::Stopped
            }
            Err(error) => {
                tracing::error!(%error, "subscription failed");
                SubscriptionState::Failed
            }
        };
        result
    }

    /// Subscribe to every stream in a category, tracking global positions.
    ///
    /// `category` is a category expression (`Order` or `Order#*`).
    ///
    /// # Errors
    ///
    /// Returns [`SubscriptionError::Address`] for an invalid expression,
    /// otherwise as [`subscribe`](Self::subscribe).
    pub async fn subscribe_category<S, H, Fut, HE>(
        &mut self,
        store: &S,
        category: &str,
        handler: H,
        cancel: &Cancellation,
    ) -> Result<(), SubscriptionError>
    where
        S: EventStore,
        H: FnMut(RecordedEvent) -> Fut,
        Fut: Future<Output = Result<(), HE>>,
        HE: Into<BoxError>,
    {
        CategoryFilter::parse(category)?;
        self.subscribe(
            move |after, cancel| store.read_category(category, after, cancel),
            |event: &RecordedEvent| event.global_position,
            handler,
            cancel,
        )
        .await
    }

    /// Subscribe to a single stream, tracking stream positions.
    ///
    /// # Errors
    ///
    /// As [`subscribe`](Self::subscribe).
    pub async fn subscribe_stream<S, H, Fut, HE>(
        &mut self,
        store: &S,
        stream: &StreamName,
        handler: H,
        cancel: &Cancellation,
    ) -> Result<(), SubscriptionError>
    where
        S: EventStore,
        H: FnMut(RecordedEvent) -> Fut,
        Fut: Future<Output = Result<(), HE>>,
        HE: Into<BoxError>,
    {
        self.subscribe(
            move |after, cancel| store.read_stream(stream, after, cancel),
            |event: &RecordedEvent| event.position,
            handler,
            cancel,
        )
        .await
    }

    async fn run<T, Src, St, SE, Pos, H, Fut, HE>(
        &mut self,
        mut source: Src,
        mut position_of: Pos,
        mut handler: H,
        cancel: &Cancellation,
    ) -> Result<(), SubscriptionError>
    where
        Src: FnMut(u64, Cancellation) -> St,
        St: Stream<Item = Result<T, SE>>,
        SE: Into<BoxError>,
        Pos: FnMut(&T) -> u64,
        H: FnMut(T) -> Fut,
        Fut: Future<Output = Result<(), HE>>,
        HE: Into<BoxError>,
    {
        let mut position = self
            .checkpoints
            .get_checkpoint()
            .await
            .map_err(|e| SubscriptionError::Checkpoint(e.into()))?;
        let mut persisted = position;
        tracing::debug!(position, "subscription started");

        'poll: while !cancel.is_cancelled() {
            let mut events = pin!(source(position, cancel.clone()));
            let mut delivered = false;

            loop {
                let next = tokio::select! {
                    biased;
                    () = cancel.cancelled() => break 'poll,
                    next = events.next() => next,
                };
                let Some(next) = next else { break };
                let event = next.map_err(|e| SubscriptionError::Source(e.into()))?;

                let event_position = position_of(&event);
                if event_position <= position {
                    tracing::trace!(position = event_position, "skipping already processed event");
                    continue;
                }

                // A handler that has already finished wins over a concurrent cancel.
                let handled = tokio::select! {
                    biased;
                    handled = handler(event) => handled,
                    () = cancel.cancelled() => break 'poll,
                };
                handled.map_err(|source| SubscriptionError::Handler {
                    position: event_position,
                    source: source.into(),
                })?;
                tracing::trace!(position = event_position, "event handled");
                position = event_position;
                delivered = true;

                if self.policy.should_checkpoint() {
                    self.persist(position).await?;
                    persisted = position;
                }

                // Sources and handlers may be always ready; let observers and
                // cancellation run between events.
                tokio::task::yield_now().await;
            }

            if !delivered && !cancel.sleep(self.poll_interval).await {
                break;
            }
        }

        if self.flush_on_stop && position != persisted {
            self.persist(position).await?;
            self.policy.reset();
        }
        Ok(())
    }

    async fn persist(&self, position: u64) -> Result<(), SubscriptionError> {
        self.checkpoints
            .store_checkpoint(Some(position))
            .await
            .map_err(|e| SubscriptionError::Checkpoint(e.into()))?;
        tracing::debug!(position, "checkpoint stored");
        Ok(())
    }
}

/// Handle to a subscription running on its own task.
///
/// Dropping the handle does **not** stop the subscription. Call [`stop()`] for
/// graceful shutdown.
///
/// [`stop()`]: SubscriptionHandle::stop
#[derive(Debug)]
pub struct SubscriptionHandle {
    cancel: Cancellation,
    task: JoinHandle<Result<(), SubscriptionError>>,
}

impl SubscriptionHandle {
    /// Stop the subscription gracefully and wait for it to finish.
    ///
    /// # Errors
    ///
    /// Returns the subscription's error if it failed before being stopped.
    pub async fn stop(self) -> Result<(), SubscriptionError> {
        self.cancel.cancel();
        self.join().await
    }

    /// Wait for the subscription to end on its own.
    ///
    /// # Errors
    ///
    /// Returns the subscription's error, or
    /// [`SubscriptionError::TaskPanicked`].
    pub async fn join(self) -> Result<(), SubscriptionError> {
        self.task
            .await
            .map_err(|_| SubscriptionError::TaskPanicked)?
    }

    /// The cancellation handle driving this subscription.
    #[must_use]
    pub const fn cancellation(&self) -> &Cancellation {
        &self.cancel
    }

    /// Check if the subscription task is still running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

/// Spawn a subscription onto the tokio runtime.
///
/// `run` receives the cancellation handle the returned
/// [`SubscriptionHandle`] controls.
pub fn spawn_subscription<F, Fut>(run: F) -> SubscriptionHandle
where
    F: FnOnce(Cancellation) -> Fut,
    Fut: Future<Output = Result<(), SubscriptionError>> + Send + 'static,
{
    let cancel = Cancellation::new();
    let task = tokio::spawn(run(cancel.clone()));
    SubscriptionHandle { cancel, task }
}

#[cfg(test)]
mod tests {
    use std::{
        convert::Infallible,
        error::Error as _,
        future::{Ready, ready},
        io,
        sync::{Arc, Mutex},
    };

    use tokio::sync::Notify;

    use super::*;
    use crate::{
        checkpoint::InMemory,
        policy::Never,
        store::inmemory,
        stream::Category,
        test::{EventStoreTestExt, RecordingCheckpointStore},
    };

    type Seen = Arc<Mutex<Vec<u64>>>;

    /// Records global positions and cancels once `stop_at` has been handled.
    fn recorder(
        cancel: &Cancellation,
        stop_at: u64,
    ) -> (Seen, impl FnMut(RecordedEvent) -> Ready<Result<(), Infallible>>) {
        let seen = Seen::default();
        let handler = {
            let seen = Arc::clone(&seen);
            let cancel = cancel.clone();
            move |event: RecordedEvent| {
                seen.lock().unwrap().push(event.global_position);
                if event.global_position >= stop_at {
                    cancel.cancel();
                }
                ready(Ok(()))
            }
        };
        (seen, handler)
    }

    fn engine(checkpoints: InMemory, every: u64) -> SubscriptionEngine<InMemory> {
        SubscriptionEngine::new(checkpoints, AfterMessages::new(every))
            .with_poll_interval(Duration::from_millis(10))
    }

    #[test]
    fn subscription_error_checkpoint_displays() {
        let err = SubscriptionError::Checkpoint(Box::new(io::Error::other("test")));
        assert!(err.to_string().contains("checkpoint store error"));
        assert!(err.source().is_some());
    }

    #[test]
    fn subscription_error_handler_names_position() {
        let err = SubscriptionError::Handler {
            position: 7,
            source: "boom".into(),
        };
        assert_eq!(err.to_string(), "handler failed at position 7: boom");
    }

    #[test]
    fn subscription_error_task_panicked_displays() {
        assert!(SubscriptionError::TaskPanicked.to_string().contains("panicked"));
    }

    #[tokio::test]
    async fn delivers_in_order_and_checkpoints_each_event() {
        let store = inmemory::Store::new();
        store.seed("Foo-1", ["Happened"; 1]).await.unwrap();
        store.seed("Foo-2", ["Happened"; 1]).await.unwrap();
        store.seed("Bar-1", ["Happened"; 1]).await.unwrap();

        let checkpoints = InMemory::new();
        let mut engine = engine(checkpoints.clone(), 1);
        let cancel = Cancellation::new();
        let (seen, handler) = recorder(&cancel, 2);

        engine
            .subscribe_category(&store, "Foo", handler, &cancel)
            .await
            .unwrap();

        assert_eq!(*seen.lock().unwrap(), [1, 2]);
        assert_eq!(checkpoints.get_checkpoint().await.unwrap(), 2);
        assert_eq!(engine.state(), SubscriptionState::Stopped);
    }

    #[tokio::test]
    async fn resumes_after_the_stored_checkpoint() {
        let store = inmemory::Store::new();
        store.seed("Foo-1", ["Happened"; 3]).await.unwrap();

        let cancel = Cancellation::new();
        let (seen, handler) = recorder(&cancel, 3);
        engine(InMemory::starting_at(1), 1)
            .subscribe_category(&store, "Foo", handler, &cancel)
            .await
            .unwrap();

        assert_eq!(*seen.lock().unwrap(), [2, 3]);
    }

    #[tokio::test]
    async fn handler_failure_leaves_checkpoint_before_the_failed_event() {
        let store = inmemory::Store::new();
        store.seed("Foo-1", ["Happened"; 3]).await.unwrap();

        let checkpoints = InMemory::new();
        let mut engine = engine(checkpoints.clone(), 1);
        let err = engine
            .subscribe_category(
                &store,
                "Foo",
                |event: RecordedEvent| {
                    ready(if event.global_position == 2 {
                        Err(io::Error::other("poisoned"))
                    } else {
                        Ok(())
                    })
                },
                &Cancellation::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, SubscriptionError::Handler { position: 2, .. }));
        assert_eq!(engine.state(), SubscriptionState::Failed);
        assert_eq!(checkpoints.get_checkpoint().await.unwrap(), 1);

        // A restart sees the failed event again.
        let cancel = Cancellation::new();
        let (seen, handler) = recorder(&cancel, 3);
        engine
            .subscribe_category(&store, "Foo", handler, &cancel)
            .await
            .unwrap();
        assert_eq!(*seen.lock().unwrap(), [2, 3]);
    }

    #[tokio::test]
    async fn failure_does_not_flush_pending_progress() {
        let store = inmemory::Store::new();
        store.seed("Foo-1", ["Happened"; 2]).await.unwrap();

        let checkpoints = InMemory::new();
        let result = SubscriptionEngine::new(checkpoints.clone(), Never)
            .subscribe_category(
                &store,
                "Foo",
                |event: RecordedEvent| {
                    ready(if event.global_position == 2 {
                        Err("boom")
                    } else {
                        Ok(())
                    })
                },
                &Cancellation::new(),
            )
            .await;

        assert!(result.is_err());
        assert_eq!(checkpoints.get_checkpoint().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn policy_controls_checkpoint_cadence() {
        let store = inmemory::Store::new();
        store.seed("Foo-1", ["Happened"; 5]).await.unwrap();

        let checkpoints = RecordingCheckpointStore::new(InMemory::new());
        let cancel = Cancellation::new();
        let (_, handler) = recorder(&cancel, 5);
        SubscriptionEngine::new(checkpoints.clone(), AfterMessages::new(2))
            .subscribe_category(&store, "Foo", handler, &cancel)
            .await
            .unwrap();

        // Every second event, then the flush on stop.
        assert_eq!(checkpoints.writes(), [Some(2), Some(4), Some(5)]);
    }

    #[tokio::test]
    async fn clean_stop_flushes_pending_progress() {
        let store = inmemory::Store::new();
        store.seed("Foo-1", ["Happened"; 2]).await.unwrap();

        let checkpoints = InMemory::new();
        let cancel = Cancellation::new();
        let (_, handler) = recorder(&cancel, 2);
        SubscriptionEngine::new(checkpoints.clone(), Never)
            .subscribe_category(&store, "Foo", handler, &cancel)
            .await
            .unwrap();

        assert_eq!(checkpoints.get_checkpoint().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn flush_can_be_disabled() {
        let store = inmemory::Store::new();
        store.seed("Foo-1", ["Happened"; 2]).await.unwrap();

        let checkpoints = InMemory::new();
        let cancel = Cancellation::new();
        let (_, handler) = recorder(&cancel, 2);
        SubscriptionEngine::new(checkpoints.clone(), Never)
            .with_flush_on_stop(false)
            .subscribe_category(&store, "Foo", handler, &cancel)
            .await
            .unwrap();

        assert_eq!(checkpoints.get_checkpoint().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn repeated_positions_are_skipped() {
        let cancel = Cancellation::new();
        let seen = Seen::default();
        let mut engine = SubscriptionEngine::new(InMemory::new(), AfterMessages::new(1));

        engine
            .subscribe(
                // Ignores `after` and replays everything on each poll.
                |_after, _cancel| tokio_stream::iter([1_u64, 1, 2, 2, 3].map(Ok::<_, Infallible>)),
                |position: &u64| *position,
                |position: u64| {
                    seen.lock().unwrap().push(position);
                    if position == 3 {
                        cancel.cancel();
                    }
                    ready(Ok::<(), Infallible>(()))
                },
                &cancel,
            )
            .await
            .unwrap();

        assert_eq!(*seen.lock().unwrap(), [1, 2, 3]);
    }

    #[tokio::test]
    async fn source_errors_fail_the_subscription() {
        let mut engine = SubscriptionEngine::new(InMemory::new(), AfterMessages::new(1));
        let err = engine
            .subscribe(
                |_after, _cancel| tokio_stream::iter([Err::<u64, _>(io::Error::other("down"))]),
                |position: &u64| *position,
                |_position: u64| ready(Ok::<(), Infallible>(())),
                &Cancellation::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, SubscriptionError::Source(_)));
        assert_eq!(engine.state(), SubscriptionState::Failed);
    }

    #[tokio::test]
    async fn invalid_category_expression_is_rejected() {
        let store = inmemory::Store::new();
        let err = engine(InMemory::new(), 1)
            .subscribe_category(
                &store,
                "Foo*",
                |_event: RecordedEvent| ready(Ok::<(), Infallible>(())),
                &Cancellation::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            SubscriptionError::Address(AddressError::InvalidWildcard(_))
        ));
    }

    #[tokio::test]
    async fn stream_subscription_tracks_stream_positions() {
        let store = inmemory::Store::new();
        store.seed("Bar-1", ["Happened"; 2]).await.unwrap();
        store.seed("Foo-1", ["Happened"; 2]).await.unwrap();

        let checkpoints = InMemory::new();
        let cancel = Cancellation::new();
        let seen = Seen::default();
        engine(checkpoints.clone(), 1)
            .subscribe_stream(
                &store,
                &Category::new("Foo").stream("1"),
                |event: RecordedEvent| {
                    seen.lock().unwrap().push(event.position);
                    if event.position == 2 {
                        cancel.cancel();
                    }
                    ready(Ok::<(), Infallible>(()))
                },
                &cancel,
            )
            .await
            .unwrap();

        assert_eq!(*seen.lock().unwrap(), [1, 2]);
        assert_eq!(checkpoints.get_checkpoint().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn picks_up_events_appended_while_running() {
        let store = inmemory::Store::new();
        store.seed("Foo-1", ["Happened"; 1]).await.unwrap();

        let checkpoints = InMemory::new();
        let handle = spawn_subscription({
            let store = store.clone();
            let mut engine = engine(checkpoints.clone(), 1);
            move |cancel| async move {
                engine
                    .subscribe_category(
                        &store,
                        "Foo",
                        |_event: RecordedEvent| ready(Ok::<(), Infallible>(())),
                        &cancel,
                    )
                    .await
            }
        });

        store.seed("Foo-2", ["Happened"; 1]).await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), async {
            while checkpoints.get_checkpoint().await.unwrap() < 2 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("second event handled");

        assert!(handle.is_running());
        handle.stop().await.unwrap();
    }

    #[tokio::test]
    async fn stop_interrupts_the_idle_delay() {
        let store = inmemory::Store::new();
        let handle = spawn_subscription(move |cancel| async move {
            SubscriptionEngine::new(InMemory::new(), AfterMessages::new(1))
                .with_poll_interval(Duration::from_secs(3600))
                .subscribe_category(
                    &store,
                    "Foo",
                    |_event: RecordedEvent| ready(Ok::<(), Infallible>(())),
                    &cancel,
                )
                .await
        });

        tokio::task::yield_now().await;
        tokio::time::timeout(Duration::from_secs(1), handle.stop())
            .await
            .expect("stopped promptly")
            .unwrap();
    }

    #[tokio::test]
    async fn cancellation_drops_an_in_flight_handler() {
        let store = inmemory::Store::new();
        store.seed("Foo-1", ["Happened"; 2]).await.unwrap();

        let checkpoints = InMemory::new();
        let cancel = Cancellation::new();
        let never = Arc::new(Notify::new());
        let handler = {
            let cancel = cancel.clone();
            move |event: RecordedEvent| {
                let cancel = cancel.clone();
                let never = Arc::clone(&never);
                async move {
                    if event.global_position == 2 {
                        cancel.cancel();
                        never.notified().await;
                    }
                    Ok::<(), Infallible>(())
                }
            }
        };

        // Only the flush on stop persists, and it must stop short of event 2.
        let mut engine = SubscriptionEngine::new(checkpoints.clone(), Never);
        tokio::time::timeout(
            Duration::from_secs(1),
            engine.subscribe_category(&store, "Foo", handler, &cancel),
        )
        .await
        .expect("stopped without waiting for the handler")
        .unwrap();

        assert_eq!(checkpoints.get_checkpoint().await.unwrap(), 1);
        assert_eq!(engine.state(), SubscriptionState::Stopped);
    }

    #[tokio::test]
    async fn stop_is_observed_while_catching_up() {
        const BACKLOG: usize = 20_000;
        let store = inmemory::Store::new();
        store
            .seed("Foo-1", std::iter::repeat_n("Happened", BACKLOG))
            .await
            .unwrap();

        let checkpoints = InMemory::new();
        let handle = spawn_subscription({
            let checkpoints = checkpoints.clone();
            move |cancel| async move {
                engine(checkpoints, 1)
                    .subscribe_category(
                        &store,
                        "Foo",
                        |_event: RecordedEvent| ready(Ok::<(), Infallible>(())),
                        &cancel,
                    )
                    .await
            }
        });

        // Current-thread runtime: the subscription only runs while this task
        // is suspended.
        tokio::task::yield_now().await;
        tokio::time::timeout(Duration::from_secs(1), handle.stop())
            .await
            .expect("stopped promptly")
            .unwrap();

        let handled = checkpoints.get_checkpoint().await.unwrap();
        assert!(handled < u64::try_from(BACKLOG).unwrap(), "drained {handled}");
    }

    #[tokio::test]
    async fn already_cancelled_subscription_returns_without_handling() {
        let store = inmemory::Store::new();
        store.seed("Foo-1", ["Happened"; 1]).await.unwrap();

        let cancel = Cancellation::new();
        cancel.cancel();
        let (seen, handler) = recorder(&cancel, u64::MAX);
        engine(InMemory::new(), 1)
            .subscribe_category(&store, "Foo", handler, &cancel)
            .await
            .unwrap();

        assert!(seen.lock().unwrap().is_empty());
    }

    async fn explode() -> Result<(), SubscriptionError> {
        panic!("boom")
    }

    #[tokio::test]
    async fn join_reports_panics() {
        let handle = spawn_subscription(|_cancel| explode());
        assert!(matches!(
            handle.join().await,
            Err(SubscriptionError::TaskPanicked)
        ));
    }
}
