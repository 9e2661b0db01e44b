//! # tlb-core
//!
//! Per-flow multipath load balancing for datacenter fabrics.
//!
//! The engine sits between a transport and the fabric. For every packet of a
//! flow it answers "which of the parallel paths toward the destination rack
//! should this go on", and it learns path health from the transport's own
//! feedback (ACKed bytes, ECN marks, RTT samples, retransmissions, timeouts)
//! plus optional probes.
//!
//! ## Crate structure
//!
//! - [`topology`]: Address → group → admissible path tables
//! - [`path`]: Path records, DRE rate estimation, classification, selection
//! - [`flow`]: Flow records and the reroute trigger/gate policy
//! - [`acklet`]: Reverse-direction path pinning
//! - [`aging`] / [`timer`]: Periodic DRE decay and health checks
//! - [`engine`]: [`TlbEngine`], the single-owner decision engine
//! - [`runtime`]: [`TlbRuntime`], a worker-thread wrapper with a real clock
//! - [`metrics`]: Prometheus/JSON export
//! - [`config`]: TOML configuration with validated defaults

pub mod acklet;
pub mod aging;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod flow;
pub mod metrics;
pub mod path;
pub mod runtime;
pub mod time;
pub mod timer;
pub mod topology;

pub use config::{RunMode, TlbConfig};
pub use engine::{EngineStats, PathStat, TlbEngine};
pub use error::TlbError;
pub use events::{PathChangedEvent, PathSelectedEvent};
pub use path::{PathSnapshot, PathTier};
pub use runtime::{HealthMark, TlbRuntime};
pub use time::SimTime;
pub use topology::{FlowId, GroupId, PathId};
