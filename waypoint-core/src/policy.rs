//! When to persist a checkpoint.
//!
//! The engine asks its policy once per processed event, always after the
//! handler has completed for that event. A checkpoint therefore never runs
//! ahead of work the handler has done.
//!
//! # Choosing a cadence
//!
//! - [`AfterMessages::new(1)`](AfterMessages::new) persists after every event.
//!   Strongest durability, one write per event.
//! - [`AfterMessages::new(n)`](AfterMessages::new) persists on every Nth
//!   event. Up to `n - 1` events may be handled again after a crash.
//! - [`Never`] leaves persistence to the flush performed when a subscription
//!   is stopped cleanly.

/// Decides whether the engine should persist its position now.
pub trait CheckpointPolicy: Send {
    /// Called once per handled event. Returning `true` makes the engine store
    /// the event's position.
    fn should_checkpoint(&mut self) -> bool;

    /// Called whenever the engine persisted a checkpoint outside the policy's
    /// own cadence, such as the flush on stop.
    fn reset(&mut self) {}
}

impl<P: CheckpointPolicy + ?Sized> CheckpointPolicy for Box<P> {
    fn should_checkpoint(&mut self) -> bool {
        (**self).should_checkpoint()
    }

    fn reset(&mut self) {
        (**self).reset();
    }
}

/// Persist on every Nth event, then start counting again.
#[derive(Clone, Debug)]
pub struct AfterMessages {
    every: u64,
    since_last: u64,
}

impl AfterMessages {
    /// `every` of `0` is treated as `1`.
    #[must_use]
    pub const fn new(every: u64) -> Self {
        Self {
            every: if every == 0 { 1 } else { every },
            since_last: 0,
        }
    }

    #[must_use]
    pub const fn every(&self) -> u64 {
        self.every
    }

    /// Events handled since the last checkpoint this policy asked for.
    #[must_use]
    pub const fn pending(&self) -> u64 {
        self.since_last
    }
}

impl Default for AfterMessages {
    fn default() -> Self {
        Self::new(1)
    }
}

impl CheckpointPolicy for AfterMessages {
    fn should_checkpoint(&mut self) -> bool {
        self.since_last += 1;
        if self.since_last >= self.every {
            self.since_last = 0;
            true
        } else {
            false
        }
    }

    fn reset(&mut self) {
        self.since_last = 0;
    }
}

/// Never persist while running.
#[derive(Clone, Copy, Debug, Default)]
pub struct Never;

impl CheckpointPolicy for Never {
    fn should_checkpoint(&mut self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decisions(policy: &mut impl CheckpointPolicy, events: usize) -> Vec<bool> {
        (0..events).map(|_| policy.should_checkpoint()).collect()
    }

    #[test]
    fn after_one_message_checkpoints_every_event() {
        assert_eq!(decisions(&mut AfterMessages::new(1), 3), [true, true, true]);
    }

    #[test]
    fn after_n_messages_checkpoints_on_the_nth_and_resets() {
        let mut policy = AfterMessages::new(3);
        assert_eq!(
            decisions(&mut policy, 7),
            [false, false, true, false, false, true, false]
        );
        assert_eq!(policy.pending(), 1);
    }

    #[test]
    fn zero_is_treated_as_one() {
        let mut policy = AfterMessages::new(0);
        assert_eq!(policy.every(), 1);
        assert!(policy.should_checkpoint());
    }

    #[test]
    fn reset_restarts_the_count() {
        let mut policy = AfterMessages::new(2);
        assert!(!policy.should_checkpoint());
        policy.reset();
        assert!(!policy.should_checkpoint());
        assert!(policy.should_checkpoint());
    }

    #[test]
    fn never_declines() {
        assert_eq!(decisions(&mut Never, 4), [false; 4]);
    }

    #[test]
    fn boxed_policies_delegate() {
        let mut policy: Box<dyn CheckpointPolicy> = Box::new(AfterMessages::new(2));
        assert_eq!(decisions(&mut policy, 2), [false, true]);
    }
}
