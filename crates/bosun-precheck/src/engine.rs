//! Pre-check evaluation against live workload state.

use std::sync::Arc;

use tracing::{debug, info};

use bosun_core::{ApiError, BudgetView, Member, PodView, WorkloadApi};

use crate::report::{Finding, PreCheckReport, Verdict};

#[derive(Debug, thiserror::Error)]
pub enum PreCheckError {
    /// The workload API itself could not be queried. Distinct from a
    /// Blocked verdict: we could not look, rather than saw a problem.
    #[error("workload query failed: {0}")]
    Query(#[from] ApiError),
}

/// Runs drain-safety checks for one node at a time.
pub struct PreCheckEngine {
    workloads: Arc<dyn WorkloadApi>,
}

impl PreCheckEngine {
    pub fn new(workloads: Arc<dyn WorkloadApi>) -> Self {
        Self { workloads }
    }

    /// Inspect the pods on `member`'s node and every disruption budget
    /// covering them. The verdict is the worst finding; all findings
    /// are reported, not just the first.
    pub async fn check(&self, member: &Member) -> Result<PreCheckReport, PreCheckError> {
        let node = member.hostname.as_str();
        let pods = self.workloads.pods_on_node(node).await?;
        let budgets = self.workloads.disruption_budgets().await?;

        let mut blockers = Vec::new();
        let mut warnings = Vec::new();

        for pod in &pods {
            triage_pod(pod, &mut blockers, &mut warnings);
        }
        for budget in &budgets {
            triage_budget(budget, &pods, &mut blockers);
        }

        let verdict = if !blockers.is_empty() {
            Verdict::Blocked
        } else if !warnings.is_empty() {
            Verdict::Warn
        } else {
            Verdict::Safe
        };

        info!(
            node,
            %verdict,
            blockers = blockers.len(),
            warnings = warnings.len(),
            "pre-check complete"
        );

        Ok(PreCheckReport {
            node: node.to_string(),
            verdict,
            blockers,
            warnings,
        })
    }
}

/// Classify one pod. Crash loops and stuck pods block: evicting them
/// loses state replicas that cannot reschedule cleanly. Image pull
/// failures only warn; eviction does not make them worse.
fn triage_pod(pod: &PodView, blockers: &mut Vec<Finding>, warnings: &mut Vec<Finding>) {
    let subject = pod.qualified_name();

    match pod.waiting_reason.as_deref() {
        Some("CrashLoopBackOff") => {
            blockers.push(Finding::new(
                subject,
                format!("crash-looping ({} restarts)", pod.restart_count),
            ));
            return;
        }
        Some(reason @ ("ImagePullBackOff" | "ErrImagePull")) => {
            warnings.push(Finding::new(subject, format!("image pull failing ({reason})")));
            return;
        }
        Some(reason) => {
            debug!(pod = %pod.qualified_name(), reason, "waiting pod");
        }
        None => {}
    }

    if pod.phase == "Pending" {
        blockers.push(Finding::new(subject, "stuck in Pending; will not reschedule"));
    }
}

/// A budget with no disruptions left blocks the drain when any of its
/// covered pods would be evicted from this node. DaemonSet and mirror
/// pods are not evicted, so budgets over them do not count.
fn triage_budget(budget: &BudgetView, pods: &[PodView], blockers: &mut Vec<Finding>) {
    if budget.disruptions_allowed > 0 {
        return;
    }
    let covers_evictable = pods.iter().any(|p| {
        !p.daemonset && !p.mirror && budget.matching_pods.contains(&p.qualified_name())
    });
    if covers_evictable {
        blockers.push(Finding::new(
            format!("{}/{}", budget.namespace, budget.name),
            format!(
                "budget allows no disruptions ({} of {} pods matched)",
                budget.matching_pods.len(),
                budget.expected_pods
            ),
        ));
    }
}
