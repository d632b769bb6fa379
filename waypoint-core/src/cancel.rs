//! Cooperative, level-triggered cancellation.
//!
//! A [`Cancellation`] is a cheap clonable handle around a shared flag. Once
//! [`cancel`](Cancellation::cancel) has been called the flag stays set: every
//! clone reports [`is_cancelled`](Cancellation::is_cancelled) and every pending
//! or future [`cancelled`](Cancellation::cancelled) future resolves.

use std::{future::Future, sync::Arc, time::Duration};

use tokio::sync::watch;

#[derive(Clone, Debug)]
pub struct Cancellation {
    tx: Arc<watch::Sender<bool>>,
}

impl Cancellation {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Signal cancellation. Idempotent.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once the handle is cancelled (immediately if it already is).
    pub fn cancelled(&self) -> impl Future<Output = ()> + Send + 'static {
        let tx = Arc::clone(&self.tx);
        async move {
            let mut rx = tx.subscribe();
            // `tx` is held here, so the channel cannot close under us.
            let _ = rx.wait_for(|cancelled| *cancelled).await;
        }
    }

    /// Sleep for `duration`, returning early if cancelled.
    ///
    /// Returns `true` if the full delay elapsed and `false` if it was cut short
    /// by cancellation.
    pub async fn sleep(&self, duration: Duration) -> bool {
        tokio::select! {
            biased;
            () = self.cancelled() => false,
            () = tokio::time::sleep(duration) => true,
        }
    }
}

impl Default for Cancellation {
    fn default() -> Self {
        Self::new()
    }
}
