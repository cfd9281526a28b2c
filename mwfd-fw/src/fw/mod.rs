//! The forwarding plane of one worker: strategy registry and built-in
//! strategies, the Interest/Data/Nack pipelines, and the counters shared
//! with the status plane.

pub mod best_route;
pub mod counters;
pub mod forwarder;
pub mod multicast;
pub mod strategy;

pub use counters::{ForwarderCounters, StatusCollector, StatusSnapshot, TableGauges, WorkerTelemetry};
pub use forwarder::{Forwarder, StrategyOps};
pub use strategy::{Strategy, StrategyRegistry};
