//! Drive a subscription until a condition holds.
//!
//! [`subscribe_until`] is for "wait until the read model has caught up" flows
//! and for synchronising tests with a running subscription. The handler
//! reports what it has handled through an [`Observer`]; the condition is
//! evaluated on each observed value. The subscription is cancelled and awaited
//! on every exit path, so no poll loop outlives the call.

use std::{future::Future, pin::pin, time::Duration};

use thiserror::Error;
use tokio::sync::mpsc;

use crate::{cancel::Cancellation, subscription::SubscriptionError};

#[derive(Debug, Error)]
pub enum UntilError {
    /// The timeout elapsed before any observed value satisfied the condition.
    #[error("condition not reached within {timeout:?}")]
    ConditionNotReached { timeout: Duration },
    /// The subscription ended before the condition was reached.
    #[error("subscription ended before the condition was reached")]
    Ended,
    /// The subscription failed.
    #[error(transparent)]
    Subscription(#[from] SubscriptionError),
}

/// Reports handled values back to [`subscribe_until`].
///
/// Cheap to clone. Observations made after `subscribe_until` has returned are
/// discarded.
#[derive(Debug)]
pub struct Observer<T> {
    tx: mpsc::UnboundedSender<T>,
}

impl<T> Clone for Observer<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> Observer<T> {
    pub fn observe(&self, value: T) {
        // The receiver is gone once the condition was decided.
        let _ = self.tx.send(value);
    }
}

enum Outcome {
    Reached,
    TimedOut,
    Finished(Result<(), SubscriptionError>),
}

/// Run a subscription until `condition` accepts an observed value.
///
/// `run` receives the [`Observer`] its handler reports to and the
/// [`Cancellation`] the subscription must use. The subscription is driven on
/// the current task.
///
/// # Errors
///
/// Returns [`UntilError::ConditionNotReached`] once `timeout` elapses,
/// [`UntilError::Subscription`] if the subscription fails before the condition
/// holds (failures while stopping it afterwards are only logged), and
/// [`UntilError::Ended`] if it returns on its own before the condition holds.
#[tracing::instrument(skip(run, condition))]
pub async fn subscribe_until<T, F, Fut, C>(
    run: F,
    mut condition: C,
    timeout: Duration,
) -> Result<(), UntilError>
where
    F: FnOnce(Observer<T>, Cancellation) -> Fut,
    Fut: Future<Output = Result<(), SubscriptionError>>,
    C: FnMut(&T) -> bool,
{
    let cancel = Cancellation::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut subscription = pin!(run(Observer { tx }, cancel.clone()));
    let mut deadline = pin!(tokio::time::sleep(timeout));

    let outcome = loop {
        tokio::select! {
            biased;
            Some(value) = rx.recv() => {
                if condition(&value) {
                    break Outcome::Reached;
                }
            }
            result = &mut subscription => break Outcome::Finished(result),
            () = &mut deadline => break Outcome::TimedOut,
        }
    };

    match outcome {
        Outcome::Reached => {
            tracing::debug!("condition reached");
            cancel.cancel();
            if let Err(error) = subscription.await {
                tracing::warn!(%error, "subscription failed while stopping");
            }
            Ok(())
        }
        Outcome::TimedOut => {
            tracing::warn!("condition not reached before timeout");
            cancel.cancel();
            subscription.await?;
            Err(UntilError::ConditionNotReached { timeout })
        }
        Outcome::Finished(result) => {
            // Values observed just before the subscription returned still count.
            while let Ok(value) = rx.try_recv() {
                if condition(&value) {
                    return Ok(());
                }
            }
            result?;
            Err(UntilError::Ended)
        }
    }
}
