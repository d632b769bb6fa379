#![doc = include_str!("../README.md")]

#[cfg(feature = "test-util")]
pub use waypoint_core::test;
pub use waypoint_core::{
    cancel,
    cancel::Cancellation,
    config,
    config::{CheckpointStoreKind, SubscriptionConfig},
    event,
    event::{NewEvent, RecordedEvent},
    policy,
    policy::{AfterMessages, CheckpointPolicy},
    stream,
    stream::{Category, CategoryFilter, StreamName, category_from_stream, prefix_from_category},
    subscription,
    subscription::{
        SubscriptionEngine, SubscriptionError, SubscriptionHandle, SubscriptionState,
        spawn_subscription,
    },
    token,
    token::{Checkpoint, deserialize_checkpoint, serialize_checkpoint},
    until,
    until::{Observer, UntilError, subscribe_until},
    wire,
};

pub mod store {

    pub use waypoint_core::{
        concurrency::{ConcurrencyConflict, ExpectedVersion},
        store::{AppendError, AppendOutcome, AppendResult, EventStore, EventStream, NonEmpty},
    };

    pub use waypoint_core::store::inmemory;
}

pub mod checkpoint {

    pub use waypoint_core::checkpoint::{
        Caching, Callback, CheckpointStore, InMemory, ReadOnly,
        log::{self, LogCheckpointStore},
    };
}
