//! The MWFD forwarding core: per-worker Interest/Data/Nack pipelines over
//! shared-nothing name-indexed tables, a strategy layer plugged in per
//! prefix, and a dispatch layer that shards traffic across workers by a
//! name-derived key.

pub mod config;
pub mod dispatch;
pub mod face;
pub mod fw;
pub mod tables;

pub use config::{CsConfig, DispatchConfig, ForwarderConfig, UnsolicitedDataPolicy};
pub use dispatch::{shard_of, DispatchSet, Dispatcher, WorkerMsg};
pub use face::internal::InternalTransportPair;
pub use face::{FaceHandle, FaceTable};
pub use fw::counters::{StatusCollector, StatusSnapshot, WorkerTelemetry};
pub use fw::forwarder::{Forwarder, StrategyOps};
pub use fw::strategy::{Strategy, StrategyRegistry};
pub use tables::fib::{FibAction, FibUpdate, NextHop};
