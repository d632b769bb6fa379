//! A minimal example: a log-backed subscription and a read-your-writes wait.
//!
//! Run with: `cargo run --example quickstart`

use std::{
    convert::Infallible,
    future::ready,
    sync::{
        Arc,
        atomic::{AtomicI64, Ordering},
    },
    time::Duration,
};

use serde_json::json;
use waypoint::{
    AfterMessages, Checkpoint, NewEvent, Observer, RecordedEvent, SubscriptionEngine,
    checkpoint::{CheckpointStore, LogCheckpointStore},
    deserialize_checkpoint, serialize_checkpoint,
    store::{EventStore, ExpectedVersion, NonEmpty, inmemory},
    stream::StreamName,
    subscribe_until,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let store = inmemory::Store::new();
    let account = StreamName::parse("Account-001")?;

    // Write side: append two deposits and hand the caller a token.
    let written = store
        .append_events(
            &account,
            NonEmpty::from((
                NewEvent::new("Deposited", json!({ "amount": 40 })),
                vec![NewEvent::new("Deposited", json!({ "amount": 60 }))],
            )),
            ExpectedVersion::NoStream,
        )
        .await?;
    let token = serialize_checkpoint(&Checkpoint::global(written.global_position));
    println!("token: {token}");

    // Read side: wait until the projection has seen the token's position.
    let total = Arc::new(AtomicI64::new(0));
    let target = deserialize_checkpoint(&token)?.position();
    let checkpoints = LogCheckpointStore::for_subscription(store.clone(), "deposit-totals");
    let mut engine = SubscriptionEngine::new(checkpoints, AfterMessages::new(10))
        .with_name("deposit-totals")
        .with_poll_interval(Duration::from_millis(10));

    subscribe_until(
        |observer: Observer<u64>, cancel| {
            let total = Arc::clone(&total);
            let store = &store;
            let engine = &mut engine;
            async move {
                engine
                    .subscribe_category(
                        store,
                        "Account",
                        |event: RecordedEvent| {
                            let amount = event.data["amount"].as_i64().unwrap_or(0);
                            total.fetch_add(amount, Ordering::SeqCst);
                            observer.observe(event.global_position);
                            ready(Ok::<(), Infallible>(()))
                        },
                        &cancel,
                    )
                    .await
            }
        },
        |position| *position >= target,
        Duration::from_secs(5),
    )
    .await?;

    println!("total deposits: {}", total.load(Ordering::SeqCst));
    assert_eq!(total.load(Ordering::SeqCst), 100);

    // Stopping flushed the progress, so a restart resumes after event 2.
    let resumed = LogCheckpointStore::for_subscription(store.clone(), "deposit-totals");
    assert_eq!(resumed.get_checkpoint().await?, 2);

    Ok(())
}
