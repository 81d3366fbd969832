//! bosun-core — shared domain types for the bosun decision core.
//!
//! Holds the data model every other crate works with: cluster context
//! configuration, resolved members and topology snapshots, consensus
//! health views, and the client traits (`MachineApi`, `WorkloadApi`)
//! through which transport implementations reach the managed cluster.
//!
//! The core never talks to a cluster itself — callers inject trait
//! implementations, and tests inject scripted fakes.

pub mod api;
pub mod config;
pub mod telemetry;
pub mod types;

pub use api::{ApiError, EvictOutcome, MachineApi, OverridePrompt, ReadyState, WorkloadApi};
pub use config::{ContextConfig, DrainTunables, FleetConfig, ProbeTunables};
pub use types::*;

/// Seconds since the Unix epoch. Timestamp convention for snapshots
/// and audit records.
pub fn epoch_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
