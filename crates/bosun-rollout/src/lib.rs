//! bosun-rollout — rolling drain and reboot plans, executed one node
//! at a time.
//!
//! A plan is built, confirmed, then run by the [`Orchestrator`]. Every
//! node passes a consensus health gate and a workload pre-check before
//! anything disruptive happens to it, and a node that fails mid-step
//! is uncordoned before the plan decides what to do next.

pub mod executor;
pub mod plan;

pub use executor::{Orchestrator, RolloutError};
pub use plan::{
    BlockedPolicy, FailurePolicy, NodeStep, OperationPlan, PlanState, ProgressEvent,
    RolloutPolicy, StepState,
};
