//! Plan model: what to do, to which nodes, under which policies, and
//! where each node currently stands.

use std::fmt;

use serde::{Deserialize, Serialize};

use bosun_core::{MemberId, OperationKind};

/// What to do when a pre-check comes back blocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockedPolicy {
    /// Skip the node, record why, move on.
    StrictSkip,
    /// Ask the operator; proceed only on an explicit yes.
    ForceWithConfirmation,
}

/// What to do with the rest of the plan after a node fails mid-step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    AbortRemaining,
    ContinueNext,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolloutPolicy {
    pub on_blocked: BlockedPolicy,
    pub on_failure: FailurePolicy,
}

impl Default for RolloutPolicy {
    fn default() -> Self {
        Self {
            on_blocked: BlockedPolicy::StrictSkip,
            on_failure: FailurePolicy::AbortRemaining,
        }
    }
}

/// Lifecycle of a plan as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanState {
    Planned,
    Confirmed,
    Running,
    Completed,
    Failed,
    Aborted,
}

impl fmt::Display for PlanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Planned => "planned",
            Self::Confirmed => "confirmed",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Aborted => "aborted",
        };
        f.write_str(s)
    }
}

/// Where one node stands inside a running plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    Pending,
    Cordoning,
    Draining,
    Rebooting,
    WaitingReady,
    Uncordoning,
    Done,
    Skipped,
    Failed,
}

impl fmt::Display for StepState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Cordoning => "cordoning",
            Self::Draining => "draining",
            Self::Rebooting => "rebooting",
            Self::WaitingReady => "waiting-ready",
            Self::Uncordoning => "uncordoning",
            Self::Done => "done",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Per-node progress record kept inside a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStep {
    pub member: MemberId,
    pub state: StepState,
    /// Why the node was skipped or how it failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// A rolling operation over an ordered list of nodes.
///
/// Plans are inert until confirmed; the orchestrator refuses to run
/// an unconfirmed plan. Target order is preserved exactly as given.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationPlan {
    pub context: String,
    pub kind: OperationKind,
    pub policy: RolloutPolicy,
    pub state: PlanState,
    pub steps: Vec<NodeStep>,
    /// Why the plan ended in Failed or Aborted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl OperationPlan {
    pub fn new(
        context: impl Into<String>,
        kind: OperationKind,
        targets: Vec<MemberId>,
        policy: RolloutPolicy,
    ) -> Self {
        Self {
            context: context.into(),
            kind,
            policy,
            state: PlanState::Planned,
            steps: targets
                .into_iter()
                .map(|member| NodeStep {
                    member,
                    state: StepState::Pending,
                    detail: None,
                })
                .collect(),
            reason: None,
        }
    }

    /// Mark the plan ready to run. Only a freshly planned plan with at
    /// least one target can be confirmed; an empty plan has nothing to
    /// confirm and anything already past Planned is a stale handle.
    pub fn confirm(&mut self) -> bool {
        if self.state == PlanState::Planned && !self.steps.is_empty() {
            self.state = PlanState::Confirmed;
            true
        } else {
            false
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.state,
            PlanState::Completed | PlanState::Failed | PlanState::Aborted
        )
    }

    pub fn step(&self, member: &MemberId) -> Option<&NodeStep> {
        self.steps.iter().find(|s| &s.member == member)
    }
}

/// Streamed to observers while a plan runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressEvent {
    PlanStateChanged(PlanState),
    Step { member: MemberId, state: StepState },
}
