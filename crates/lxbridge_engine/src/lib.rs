//! # lxbridge Engine
//!
//! State synchronization engine between a home-automation controller and a host
//! state store.
//!
//! This crate provides:
//! - Ordered event queue with a run gate
//! - Event dispatch with per-handler failure isolation
//! - Command acknowledgement tracking with delayed and superseded writes
//! - Connection supervision with fixed-delay reconnect
//! - Rate-limited aggregate counters
//! - Transport and host store abstractions with in-memory implementations
//!
//! ## Architecture
//!
//! The transport pushes controller events into the [`EventQueue`]; the bridge's
//! event loop drains it and hands each event to the [`EventDispatcher`]. Host
//! writes go through the [`AckTracker`], which forwards them to the controller
//! and waits for the echoed value change before forwarding the next one.
//!
//! 1. Connect: open session, load structure, rebuild bindings, enable updates
//! 2. Run: drain events in arrival order, confirm pending writes
//! 3. On close: stop the queue, discard its contents, reconnect after a delay
//!
//! ## Key Invariants
//!
//! - Events are handled one at a time, in arrival order
//! - At most one write per item awaits confirmation
//! - Writes are only forwarded while connected
//! - No error leaves the event loop or the supervisor

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod ack;
mod bridge;
mod command;
mod config;
mod connection;
mod counters;
mod dispatch;
mod error;
mod loader;
mod queue;
mod store;
mod timer;
mod transport;

pub use ack::{AckTracker, IntegerRange, WriteListener, WriteOptions, WriteOutcome};
pub use bridge::{Bridge, BridgeContext};
pub use command::{CommandChannel, CommandListener};
pub use config::{BridgeConfig, Credentials, Endpoint, ReconnectConfig};
pub use connection::{
    ConnectOutcome, ConnectionPhase, ConnectionState, ConnectionStats, ConnectionSupervisor,
    Synchronizer, CONNECTION_ITEM,
};
pub use counters::{CounterDetail, CounterId, CounterReporter};
pub use dispatch::{DispatchOutcome, EventDispatcher, EventHandler};
pub use error::{BridgeError, BridgeResult};
pub use loader::{
    item_prefix, ControlKind, ControlLoader, GenericControlLoader, LoadSummary, LoaderRegistry,
};
pub use queue::EventQueue;
pub use store::{MemoryStateStore, ObjectCommon, StateStore, StateWrite, StoredState};
pub use transport::{ControllerTransport, EventSink, MockTransport};
