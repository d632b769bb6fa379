//! Core types for the Waypoint subscription engine.
//!
//! This crate provides the building blocks for durable, resumable consumers of
//! an append-only event log:
//!
//! - [`stream`] - Stream names, categories and category expressions
//! - [`store`] - The event store port (`EventStore`) and an in-memory store
//! - [`checkpoint`] - Checkpoint persistence (`CheckpointStore`) and its variants
//! - [`policy`] - When to persist a checkpoint (`AfterMessages`, `Never`)
//! - [`subscription`] - The poll/process/checkpoint loop (`SubscriptionEngine`)
//! - [`until`] - Run a subscription until a condition holds
//! - [`token`] - Opaque consistency tokens for read-your-writes
//! - [`config`] - Deserializable per-subscription configuration
//! - [`cancel`] - Level-triggered cancellation shared by every suspension point
//!
//! # Example
//!
//! ```
//! use waypoint_core::{
//!     checkpoint::InMemory, policy::AfterMessages, store::inmemory,
//!     subscription::SubscriptionEngine,
//! };
//!
//! let store = inmemory::Store::new();
//! let engine = SubscriptionEngine::new(InMemory::new(), AfterMessages::new(1))
//!     .with_name("order-totals");
//! # let _ = (store, engine);
//! ```
//!
//! Most users should depend on the [`waypoint`](https://docs.rs/waypoint)
//! crate, which re-exports these types.

pub mod cancel;
pub mod checkpoint;
pub mod concurrency;
pub mod config;
pub mod event;
pub mod policy;
pub mod store;
pub mod stream;
pub mod subscription;
pub mod token;
pub mod until;
pub mod wire;
