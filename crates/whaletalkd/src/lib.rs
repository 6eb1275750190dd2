//! Whaletalk daemon - the container-to-IM bridge.
//!
//! This crate owns the concurrency at the heart of the bridge:
//! - `queue` - deferred calls that must run on the host (IM engine) thread
//! - `lines` - turning attach byte streams into discrete message lines
//! - `container` - per-container sessions and their attach workers
//! - `account` - per-account state, registries, and orchestration
//! - `events` - ingestion of the daemon's lifecycle event stream
//! - `registry` - the process-level reachable-account registry
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        whaletalkd bridge                         │
//! ├──────────────────────────────────────────────────────────────────┤
//! │                                                                  │
//! │  ┌──────────────┐  lifecycle   ┌─────────────────────────────┐  │
//! │  │ event worker │─────────────▶│       AccountSession        │  │
//! │  │ (per account)│              │  (buddy/container registry) │  │
//! │  └──────────────┘              └───────┬─────────────┬───────┘  │
//! │                                        │             │          │
//! │                  attach/detach         │             │ enqueue  │
//! │                                        ▼             ▼          │
//! │  ┌──────────────┐   lines   ┌──────────────┐  ┌──────────────┐  │
//! │  │  LineReader  │──────────▶│  Container   │  │ DeferredCall │  │
//! │  │ (out + err)  │           │   Session    │  │    Queue     │  │
//! │  └──────────────┘           └──────────────┘  └──────┬───────┘  │
//! │                                                      │ drain    │
//! │                                                      ▼          │
//! │                                          host thread (pump)     │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The one rule everything here serves: host-owned IM state is mutated
//! only while the host thread drains the deferred call queue. Workers
//! never touch the host directly.

pub mod account;
pub mod container;
pub mod events;
pub mod lines;
pub mod queue;
pub mod registry;
