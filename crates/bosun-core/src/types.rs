//! Domain types shared across the bosun crates.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a real cluster member, as returned by a successful
/// probe. Never derived from a configured address string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemberId(pub String);

impl MemberId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MemberId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Role a machine plays in the managed cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MachineRole {
    ControlPlane,
    Worker,
}

/// Raw result of probing one address: the identity of whichever
/// member actually answered, which may differ from the address dialed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeIdentity {
    pub machine_id: MemberId,
    pub hostname: String,
    pub role: MachineRole,
    /// Addresses the member reports as its own.
    pub addresses: Vec<String>,
}

/// A resolved, individually addressable cluster participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: MemberId,
    pub hostname: String,
    pub role: MachineRole,
    /// Preferred address for reaching this member directly. Floating
    /// addresses are never stored here when a direct one is known.
    pub address: String,
    /// Every configured address that resolved to this identity.
    pub addresses: Vec<String>,
}

impl Member {
    pub fn is_control_plane(&self) -> bool {
        self.role == MachineRole::ControlPlane
    }
}

/// An address that failed to resolve, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeFailure {
    pub address: String,
    pub reason: String,
}

/// Two addresses resolved the same identity but disagreed about its
/// role. No tie-break exists; the member is excluded until an
/// operator sorts it out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleConflict {
    pub id: MemberId,
    pub hostname: String,
    /// (address, role reported via that address)
    pub reports: Vec<(String, MachineRole)>,
}

/// Canonical, deduplicated view of one cluster's membership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologySnapshot {
    /// Resolved members, sorted by hostname for stable display.
    pub members: Vec<Member>,
    /// Addresses that route to an already-known identity without
    /// being one of its own (floating/virtual addresses).
    pub floating: Vec<String>,
    /// Addresses whose probe failed outright.
    pub unresolved: Vec<ProbeFailure>,
    /// Identities excluded because addresses disagreed on their role.
    pub role_conflicts: Vec<RoleConflict>,
    /// Unix epoch seconds when resolution completed.
    pub resolved_at: u64,
}

impl TopologySnapshot {
    pub fn member(&self, id: &MemberId) -> Option<&Member> {
        self.members.iter().find(|m| &m.id == id)
    }

    pub fn contains(&self, id: &MemberId) -> bool {
        self.member(id).is_some()
    }

    pub fn control_plane_count(&self) -> usize {
        self.members.iter().filter(|m| m.is_control_plane()).count()
    }

    /// Degraded: some addresses failed or some identities conflicted.
    pub fn is_degraded(&self) -> bool {
        !self.unresolved.is_empty() || !self.role_conflicts.is_empty()
    }
}

/// One control-plane member's report of the consensus store: its own
/// health plus the set of members it sees in the active quorum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusStatus {
    pub reporter: MemberId,
    /// The reporter's self-report: it considers itself part of the
    /// active quorum.
    pub healthy: bool,
    /// Members this reporter sees participating in the quorum.
    pub quorum_members: Vec<MemberId>,
}

/// Whether the health aggregator could observe the control plane at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthState {
    /// At least one control-plane member answered.
    Known,
    /// The whole control-plane tier was unreachable.
    Unknown,
}

/// Merged health of one control-plane member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberHealth {
    pub id: MemberId,
    pub reachable: bool,
    /// Self-report and at least one independent peer agree the member
    /// is part of the active quorum.
    pub healthy: bool,
}

/// Cluster-wide quorum/health snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterHealthSnapshot {
    pub state: HealthState,
    pub total_control_plane: usize,
    pub healthy_control_plane: usize,
    pub members: Vec<MemberHealth>,
    /// Losing one more healthy control-plane member would still leave
    /// quorum intact.
    pub quorum_safe: bool,
}

impl ClusterHealthSnapshot {
    /// The quorum-safety rule: (healthy - 1) >= ceil(total / 2).
    pub fn quorum_safe_counts(total: usize, healthy: usize) -> bool {
        if healthy == 0 {
            return false;
        }
        healthy - 1 >= total.div_ceil(2)
    }

    /// Snapshot for a control plane nobody answered for.
    pub fn unknown(total_control_plane: usize) -> Self {
        Self {
            state: HealthState::Unknown,
            total_control_plane,
            healthy_control_plane: 0,
            members: Vec::new(),
            quorum_safe: false,
        }
    }
}

/// Which disruptive operation a plan performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Drain,
    Reboot,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Drain => f.write_str("drain"),
            Self::Reboot => f.write_str("reboot"),
        }
    }
}

/// Read-only view of one pod on a node, as reported by the workload API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodView {
    pub namespace: String,
    pub name: String,
    /// Pod phase (Running, Pending, ...).
    pub phase: String,
    /// Container waiting reason, if any (CrashLoopBackOff, ...).
    pub waiting_reason: Option<String>,
    pub restart_count: i32,
    /// Owned by a DaemonSet — pinned to the node, not evictable.
    pub daemonset: bool,
    /// Kubelet mirror pod — not managed by the API server.
    pub mirror: bool,
}

impl PodView {
    pub fn qualified_name(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}

/// Read-only view of a disruption budget and the pods it covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetView {
    pub namespace: String,
    pub name: String,
    /// How many more disruptions the budget currently allows.
    pub disruptions_allowed: i32,
    /// Total pods the budget's selector matches.
    pub expected_pods: i32,
    /// Qualified names (`ns/name`) of matched pods.
    pub matching_pods: Vec<String>,
}
