//! bosun-precheck — workload safety checks run before a node is
//! drained.
//!
//! A pre-check never mutates the cluster. It inspects the pods on the
//! target node and the disruption budgets that cover them, and
//! produces a verdict the orchestrator gates on.

pub mod engine;
pub mod report;

pub use engine::{PreCheckEngine, PreCheckError};
pub use report::{Finding, PreCheckReport, Verdict};
