//! Client seams to the managed cluster.
//!
//! The decision core never opens a connection itself. Collaborators
//! hand it implementations of these traits; the per-call timeout and
//! fan-out discipline lives in the core, the transport lives outside.

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{BudgetView, ConsensusStatus, PodView, ProbeIdentity};

/// Errors a remote call can surface through the seams.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    #[error("unreachable: {0}")]
    Unreachable(String),

    #[error("timed out after {0}s")]
    Timeout(u64),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("api error: {0}")]
    Other(String),
}

/// Outcome of one eviction attempt, classified so the drain loop can
/// decide between retry, skip, and failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvictOutcome {
    /// Eviction accepted.
    Evicted,
    /// Pod was already gone.
    Gone,
    /// A disruption budget currently blocks the eviction.
    BudgetBlocked,
    /// Eviction failed for some other reason.
    Failed(String),
}

/// Node readiness as reported by the workload scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    Ready,
    NotReady,
    Unknown,
}

/// Access to the machine-management API of the managed cluster.
///
/// Every method targets a single address; identity resolution happens
/// above this seam.
#[async_trait]
pub trait MachineApi: Send + Sync {
    /// Ask whoever answers at `address` who they are.
    async fn probe(&self, address: &str) -> Result<ProbeIdentity, ApiError>;

    /// Query consensus-store status from the member at `address`.
    async fn consensus_status(&self, address: &str) -> Result<ConsensusStatus, ApiError>;

    /// Issue a reboot to the member at `address`.
    async fn reboot(&self, address: &str) -> Result<(), ApiError>;
}

/// Access to the workload scheduler of the managed cluster.
#[async_trait]
pub trait WorkloadApi: Send + Sync {
    /// Pods currently bound to the named node.
    async fn pods_on_node(&self, node: &str) -> Result<Vec<PodView>, ApiError>;

    /// All disruption budgets in the cluster.
    async fn disruption_budgets(&self) -> Result<Vec<BudgetView>, ApiError>;

    /// Mark the node unschedulable.
    async fn cordon(&self, node: &str) -> Result<(), ApiError>;

    /// Mark the node schedulable again.
    async fn uncordon(&self, node: &str) -> Result<(), ApiError>;

    /// Request eviction of one pod, with an optional grace period.
    async fn evict(
        &self,
        namespace: &str,
        name: &str,
        grace_period_secs: Option<i64>,
    ) -> Result<EvictOutcome, ApiError>;

    /// Current readiness of the named node.
    async fn node_ready(&self, node: &str) -> Result<ReadyState, ApiError>;
}

/// Operator confirmation seam for proceeding past a blocked pre-check.
///
/// The orchestrator calls this at most once per blocked node when the
/// plan was created with force-with-confirmation strictness.
#[async_trait]
pub trait OverridePrompt: Send + Sync {
    /// Present the blocking reasons; return true to proceed anyway.
    async fn confirm_override(&self, hostname: &str, reasons: &[String]) -> bool;
}
