//! Sequential plan execution: one node at a time, health-gated,
//! pre-checked, with cordon cleanup on every failure path.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{error, info, warn};

use bosun_audit::{AuditLog, AuditRecord};
use bosun_core::{
    ContextConfig, EvictOutcome, HealthState, MachineApi, Member, MemberId, OperationKind,
    OverridePrompt, PodView, ReadyState, TopologySnapshot, WorkloadApi,
};
use bosun_health::HealthAggregator;
use bosun_precheck::{PreCheckEngine, Verdict};

use crate::plan::{
    BlockedPolicy, FailurePolicy, OperationPlan, PlanState, ProgressEvent, StepState,
};

const EVICTION_RETRY_INTERVAL: Duration = Duration::from_secs(2);
const READY_POLL_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum RolloutError {
    #[error("plan has not been confirmed")]
    NotConfirmed,
    #[error("plan targets unknown member {0}")]
    UnknownMember(MemberId),
}

/// Runs confirmed plans. Strictly one node in flight; the next node
/// starts only after the previous one is uncordoned, skipped, or has
/// failed terminally.
pub struct Orchestrator {
    machines: Arc<dyn MachineApi>,
    workloads: Arc<dyn WorkloadApi>,
    health: HealthAggregator,
    prechecks: PreCheckEngine,
    prompt: Option<Arc<dyn OverridePrompt>>,
    audit: Arc<AuditLog>,
}

impl Orchestrator {
    pub fn new(
        machines: Arc<dyn MachineApi>,
        workloads: Arc<dyn WorkloadApi>,
        audit: Arc<AuditLog>,
    ) -> Self {
        Self {
            health: HealthAggregator::new(Arc::clone(&machines)),
            prechecks: PreCheckEngine::new(Arc::clone(&workloads)),
            machines,
            workloads,
            prompt: None,
            audit,
        }
    }

    /// Attach an operator prompt for blocked-node overrides. Without
    /// one, `ForceWithConfirmation` behaves like a strict skip.
    pub fn with_prompt(mut self, prompt: Arc<dyn OverridePrompt>) -> Self {
        self.prompt = Some(prompt);
        self
    }

    /// Execute a confirmed plan to its terminal state. The plan itself
    /// carries the outcome; `Err` is reserved for plans that were
    /// never runnable.
    ///
    /// Abort requests are honored at node boundaries: the node in
    /// flight always finishes (or fails) before the plan stops.
    pub async fn run(
        &self,
        plan: &mut OperationPlan,
        topology: &TopologySnapshot,
        ctx: &ContextConfig,
        abort: watch::Receiver<bool>,
        progress: Option<mpsc::UnboundedSender<ProgressEvent>>,
    ) -> Result<(), RolloutError> {
        if plan.state != PlanState::Confirmed {
            return Err(RolloutError::NotConfirmed);
        }
        for step in &plan.steps {
            if topology.member(&step.member).is_none() {
                return Err(RolloutError::UnknownMember(step.member.clone()));
            }
        }

        let progress = progress.as_ref();
        self.set_plan_state(plan, PlanState::Running, progress);
        self.record(AuditRecord::new(&plan.context, None, plan.kind, "plan", "started"));

        for idx in 0..plan.steps.len() {
            if *abort.borrow() {
                plan.reason = Some("aborted by operator".to_string());
                self.record(AuditRecord::new(&plan.context, None, plan.kind, "plan", "aborted"));
                self.set_plan_state(plan, PlanState::Aborted, progress);
                return Ok(());
            }

            let member_id = plan.steps[idx].member.clone();
            // Presence was validated above.
            let Some(member) = topology.member(&member_id).cloned() else {
                return Err(RolloutError::UnknownMember(member_id));
            };

            // Consensus gate: never take out a control-plane member
            // the tier cannot afford to lose. This fails the whole
            // plan, policy notwithstanding.
            if member.is_control_plane() {
                let health = self.health.aggregate(topology, &ctx.probe).await;
                let at_risk = health.state == HealthState::Unknown || !health.quorum_safe;
                if at_risk {
                    let reason = format!(
                        "disrupting {} would break consensus quorum ({} of {} healthy)",
                        member.hostname, health.healthy_control_plane, health.total_control_plane
                    );
                    warn!(node = %member.hostname, "{reason}");
                    self.record(
                        AuditRecord::new(
                            &plan.context,
                            Some(member_id),
                            plan.kind,
                            "health-gate",
                            "failed",
                        )
                        .with_reason(&reason),
                    );
                    plan.reason = Some(reason);
                    self.set_plan_state(plan, PlanState::Failed, progress);
                    self.record(AuditRecord::new(&plan.context, None, plan.kind, "plan", "failed"));
                    return Ok(());
                }
            }

            // Pre-check gate.
            match self.prechecks.check(&member).await {
                Ok(report) if report.verdict == Verdict::Blocked => {
                    let reasons = report.reasons();
                    if !self.override_blocked(plan, &member, &reasons).await {
                        self.skip_step(plan, idx, reasons.join("; "), progress);
                        continue;
                    }
                }
                Ok(report) => {
                    if report.verdict == Verdict::Warn {
                        self.record(
                            AuditRecord::new(
                                &plan.context,
                                Some(member_id.clone()),
                                plan.kind,
                                "precheck",
                                "warn",
                            )
                            .with_reason(report.reasons().join("; ")),
                        );
                    }
                }
                Err(e) => {
                    let detail = format!("pre-check failed: {e}");
                    if self.fail_step(plan, idx, detail, progress) {
                        return Ok(());
                    }
                    continue;
                }
            }

            // The disruptive part.
            match self.disrupt_node(plan, idx, &member, ctx, progress).await {
                Ok(()) => {
                    self.set_step(plan, idx, StepState::Done, progress);
                    info!(node = %member.hostname, "node finished");
                }
                Err(detail) => {
                    self.uncordon_best_effort(plan, &member).await;
                    if self.fail_step(plan, idx, detail, progress) {
                        return Ok(());
                    }
                }
            }
        }

        let failed = plan
            .steps
            .iter()
            .filter(|s| s.state == StepState::Failed)
            .count();
        if failed > 0 {
            plan.reason = Some(format!("{failed} of {} nodes failed", plan.steps.len()));
            self.set_plan_state(plan, PlanState::Failed, progress);
        } else {
            self.set_plan_state(plan, PlanState::Completed, progress);
        }
        self.record(AuditRecord::new(
            &plan.context,
            None,
            plan.kind,
            "plan",
            plan.state.to_string(),
        ));
        Ok(())
    }

    /// Cordon, drain, optionally reboot and wait, then uncordon.
    /// Any error leaves the node cordoned; the caller cleans up.
    async fn disrupt_node(
        &self,
        plan: &mut OperationPlan,
        idx: usize,
        member: &Member,
        ctx: &ContextConfig,
        progress: Option<&mpsc::UnboundedSender<ProgressEvent>>,
    ) -> Result<(), String> {
        let node = member.hostname.as_str();

        self.set_step(plan, idx, StepState::Cordoning, progress);
        self.workloads
            .cordon(node)
            .await
            .map_err(|e| format!("cordon failed: {e}"))?;

        self.set_step(plan, idx, StepState::Draining, progress);
        let pods = self
            .workloads
            .pods_on_node(node)
            .await
            .map_err(|e| format!("pod listing failed: {e}"))?;
        let mut evicted = 0usize;
        let mut failures = Vec::new();
        for pod in pods.iter().filter(|p| !p.daemonset && !p.mirror) {
            match self.evict_with_retry(pod, ctx).await {
                Ok(()) => evicted += 1,
                Err(reason) => failures.push(reason),
            }
        }
        info!(node, evicted, failed = failures.len(), "drain finished");
        if !failures.is_empty() {
            return Err(failures.join("; "));
        }

        if plan.kind == OperationKind::Reboot {
            self.set_step(plan, idx, StepState::Rebooting, progress);
            self.machines
                .reboot(&member.address)
                .await
                .map_err(|e| format!("reboot request failed: {e}"))?;

            self.set_step(plan, idx, StepState::WaitingReady, progress);
            self.wait_node_ready(node, ctx.drain.ready_timeout_secs)
                .await?;
        }

        self.set_step(plan, idx, StepState::Uncordoning, progress);
        self.workloads
            .uncordon(node)
            .await
            .map_err(|e| format!("uncordon failed: {e}"))?;
        Ok(())
    }

    /// Evict one pod, retrying while its disruption budget has no
    /// headroom, bounded by the configured eviction timeout.
    async fn evict_with_retry(&self, pod: &PodView, ctx: &ContextConfig) -> Result<(), String> {
        let deadline = Instant::now() + Duration::from_secs(ctx.drain.eviction_timeout_secs);
        loop {
            let outcome = self
                .workloads
                .evict(&pod.namespace, &pod.name, ctx.drain.grace_period_secs)
                .await
                .map_err(|e| format!("eviction of {} failed: {e}", pod.qualified_name()))?;
            match outcome {
                EvictOutcome::Evicted | EvictOutcome::Gone => return Ok(()),
                EvictOutcome::BudgetBlocked => {
                    if Instant::now() >= deadline {
                        return Err(format!(
                            "eviction of {} blocked by disruption budget",
                            pod.qualified_name()
                        ));
                    }
                    tokio::time::sleep(EVICTION_RETRY_INTERVAL).await;
                }
                EvictOutcome::Failed(msg) => {
                    return Err(format!("eviction of {} failed: {msg}", pod.qualified_name()));
                }
            }
        }
    }

    /// Wait for a rebooted node to come back. Two phases: first watch
    /// the node leave Ready, so a stale Ready report from before the
    /// reboot landed is not mistaken for recovery, then wait for Ready
    /// within the remaining budget.
    async fn wait_node_ready(&self, node: &str, timeout_secs: u64) -> Result<(), String> {
        let start = Instant::now();
        let deadline = start + Duration::from_secs(timeout_secs);
        let down_cap = start + Duration::from_secs((timeout_secs / 3).max(1));

        loop {
            match self.workloads.node_ready(node).await {
                Ok(ReadyState::Ready) if Instant::now() < down_cap => {}
                _ => break,
            }
            tokio::time::sleep(READY_POLL_INTERVAL).await;
        }

        loop {
            if let Ok(ReadyState::Ready) = self.workloads.node_ready(node).await {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err("reboot timeout: node did not report ready".to_string());
            }
            tokio::time::sleep(READY_POLL_INTERVAL).await;
        }
    }

    /// Ask the operator whether to proceed past a blocked pre-check.
    async fn override_blocked(
        &self,
        plan: &OperationPlan,
        member: &Member,
        reasons: &[String],
    ) -> bool {
        if plan.policy.on_blocked != BlockedPolicy::ForceWithConfirmation {
            return false;
        }
        let Some(prompt) = self.prompt.as_ref() else {
            warn!(node = %member.hostname, "no override prompt configured; treating as strict skip");
            return false;
        };
        let approved = prompt.confirm_override(&member.hostname, reasons).await;
        if approved {
            self.record(
                AuditRecord::new(
                    &plan.context,
                    Some(member.id.clone()),
                    plan.kind,
                    "precheck",
                    "overridden",
                )
                .with_reason(reasons.join("; ")),
            );
        }
        approved
    }

    fn skip_step(
        &self,
        plan: &mut OperationPlan,
        idx: usize,
        reason: String,
        progress: Option<&mpsc::UnboundedSender<ProgressEvent>>,
    ) {
        let member = plan.steps[idx].member.clone();
        info!(member = %member, %reason, "node skipped");
        self.record(
            AuditRecord::new(&plan.context, Some(member), plan.kind, "precheck", "skipped")
                .with_reason(&reason),
        );
        plan.steps[idx].detail = Some(reason);
        self.set_step(plan, idx, StepState::Skipped, progress);
    }

    /// Mark the step failed; returns true when the plan must stop now.
    fn fail_step(
        &self,
        plan: &mut OperationPlan,
        idx: usize,
        detail: String,
        progress: Option<&mpsc::UnboundedSender<ProgressEvent>>,
    ) -> bool {
        let member = plan.steps[idx].member.clone();
        warn!(member = %member, %detail, "node failed");
        self.record(
            AuditRecord::new(&plan.context, Some(member), plan.kind, "node", "failed")
                .with_reason(&detail),
        );
        plan.steps[idx].detail = Some(detail.clone());
        self.set_step(plan, idx, StepState::Failed, progress);

        match plan.policy.on_failure {
            FailurePolicy::AbortRemaining => {
                plan.reason = Some(detail);
                self.set_plan_state(plan, PlanState::Failed, progress);
                self.record(AuditRecord::new(&plan.context, None, plan.kind, "plan", "failed"));
                true
            }
            FailurePolicy::ContinueNext => false,
        }
    }

    /// A failed or aborted node must not stay unschedulable.
    async fn uncordon_best_effort(&self, plan: &OperationPlan, member: &Member) {
        let outcome = match self.workloads.uncordon(&member.hostname).await {
            Ok(()) => "best-effort",
            Err(e) => {
                warn!(node = %member.hostname, error = %e, "cleanup uncordon did not succeed");
                "best-effort-failed"
            }
        };
        self.record(AuditRecord::new(
            &plan.context,
            Some(member.id.clone()),
            plan.kind,
            "uncordon",
            outcome,
        ));
    }

    /// Every transition is both streamed and audited, so a finished
    /// plan names each member it touched even when nothing failed.
    /// Skips and failures carry their reason through `skip_step` /
    /// `fail_step` instead of a bare record here.
    fn set_step(
        &self,
        plan: &mut OperationPlan,
        idx: usize,
        state: StepState,
        progress: Option<&mpsc::UnboundedSender<ProgressEvent>>,
    ) {
        plan.steps[idx].state = state.clone();
        let member = plan.steps[idx].member.clone();
        let outcome = match state {
            StepState::Done => Some("ok"),
            StepState::Pending | StepState::Skipped | StepState::Failed => None,
            _ => Some("started"),
        };
        if let Some(outcome) = outcome {
            self.record(AuditRecord::new(
                &plan.context,
                Some(member.clone()),
                plan.kind,
                state.to_string(),
                outcome,
            ));
        }
        if let Some(tx) = progress {
            let _ = tx.send(ProgressEvent::Step { member, state });
        }
    }

    fn set_plan_state(
        &self,
        plan: &mut OperationPlan,
        state: PlanState,
        progress: Option<&mpsc::UnboundedSender<ProgressEvent>>,
    ) {
        plan.state = state.clone();
        if let Some(tx) = progress {
            let _ = tx.send(ProgressEvent::PlanStateChanged(state));
        }
    }

    /// Audit failures must not stop a half-finished disruption.
    fn record(&self, record: AuditRecord) {
        if let Err(e) = self.audit.append(record) {
            error!(error = %e, "audit append failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    use bosun_core::{ApiError, BudgetView, ConsensusStatus, MachineRole, ProbeIdentity};
    use bosun_core::config::{DrainTunables, ProbeTunables};
    use crate::plan::RolloutPolicy;

    /// Scriptable fake implementing both API seams, with an ordered
    /// call log so tests can assert sequencing.
    #[derive(Default)]
    struct FakeCluster {
        pods: HashMap<String, Vec<PodView>>,
        budgets: Vec<BudgetView>,
        consensus: HashMap<String, ConsensusStatus>,
        /// qualified pod name → eviction outcomes; the last entry
        /// repeats forever.
        evict_script: Mutex<HashMap<String, VecDeque<EvictOutcome>>>,
        /// node → readiness reports; the last entry repeats forever.
        /// Nodes without a script always report Ready.
        ready_script: Mutex<HashMap<String, VecDeque<ReadyState>>>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeCluster {
        fn log(&self, call: impl Into<String>) {
            self.calls.lock().unwrap().push(call.into());
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn pop_repeating<T: Clone>(map: &mut HashMap<String, VecDeque<T>>, key: &str) -> Option<T> {
            let deque = map.get_mut(key)?;
            if deque.len() > 1 {
                deque.pop_front()
            } else {
                deque.front().cloned()
            }
        }
    }

    #[async_trait]
    impl MachineApi for FakeCluster {
        async fn probe(&self, _address: &str) -> Result<ProbeIdentity, ApiError> {
            unimplemented!("not used by rollout tests")
        }

        async fn consensus_status(&self, address: &str) -> Result<ConsensusStatus, ApiError> {
            self.consensus
                .get(address)
                .cloned()
                .ok_or_else(|| ApiError::Unreachable(address.to_string()))
        }

        async fn reboot(&self, address: &str) -> Result<(), ApiError> {
            self.log(format!("reboot {address}"));
            Ok(())
        }
    }

    #[async_trait]
    impl WorkloadApi for FakeCluster {
        async fn pods_on_node(&self, node: &str) -> Result<Vec<PodView>, ApiError> {
            Ok(self.pods.get(node).cloned().unwrap_or_default())
        }

        async fn disruption_budgets(&self) -> Result<Vec<BudgetView>, ApiError> {
            Ok(self.budgets.clone())
        }

        async fn cordon(&self, node: &str) -> Result<(), ApiError> {
            self.log(format!("cordon {node}"));
            Ok(())
        }

        async fn uncordon(&self, node: &str) -> Result<(), ApiError> {
            self.log(format!("uncordon {node}"));
            Ok(())
        }

        async fn evict(
            &self,
            namespace: &str,
            name: &str,
            _grace_period_secs: Option<i64>,
        ) -> Result<EvictOutcome, ApiError> {
            let qualified = format!("{namespace}/{name}");
            self.log(format!("evict {qualified}"));
            let mut script = self.evict_script.lock().unwrap();
            Ok(Self::pop_repeating(&mut script, &qualified).unwrap_or(EvictOutcome::Evicted))
        }

        async fn node_ready(&self, node: &str) -> Result<ReadyState, ApiError> {
            let mut script = self.ready_script.lock().unwrap();
            Ok(Self::pop_repeating(&mut script, node).unwrap_or(ReadyState::Ready))
        }
    }

    struct FixedAnswer {
        yes: bool,
        asked: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl OverridePrompt for FixedAnswer {
        async fn confirm_override(&self, hostname: &str, _reasons: &[String]) -> bool {
            self.asked.lock().unwrap().push(hostname.to_string());
            self.yes
        }
    }

    fn worker(id: &str, hostname: &str, address: &str) -> Member {
        Member {
            id: id.into(),
            hostname: hostname.to_string(),
            role: MachineRole::Worker,
            address: address.to_string(),
            addresses: vec![address.to_string()],
        }
    }

    fn control_plane(id: &str, hostname: &str, address: &str) -> Member {
        Member {
            role: MachineRole::ControlPlane,
            ..worker(id, hostname, address)
        }
    }

    fn pod(ns: &str, name: &str) -> PodView {
        PodView {
            namespace: ns.to_string(),
            name: name.to_string(),
            phase: "Running".to_string(),
            waiting_reason: None,
            restart_count: 0,
            daemonset: false,
            mirror: false,
        }
    }

    fn topology(members: Vec<Member>) -> TopologySnapshot {
        TopologySnapshot {
            members,
            floating: vec![],
            unresolved: vec![],
            role_conflicts: vec![],
            resolved_at: 0,
        }
    }

    fn context() -> ContextConfig {
        ContextConfig {
            name: "prod".to_string(),
            endpoints: vec!["10.0.0.1".to_string()],
            node_hints: vec![],
            credentials: None,
            probe: ProbeTunables::default(),
            drain: DrainTunables {
                eviction_timeout_secs: 10,
                grace_period_secs: None,
                ready_timeout_secs: 60,
            },
        }
    }

    fn confirmed_plan(kind: OperationKind, targets: Vec<MemberId>, policy: RolloutPolicy) -> OperationPlan {
        let mut plan = OperationPlan::new("prod", kind, targets, policy);
        assert!(plan.confirm());
        plan
    }

    fn no_abort() -> watch::Receiver<bool> {
        // The receiver keeps the last value alive after the sender drops.
        watch::channel(false).1
    }

    fn orchestrator(fake: &Arc<FakeCluster>) -> (Orchestrator, Arc<AuditLog>) {
        let audit = Arc::new(AuditLog::ephemeral());
        let orch = Orchestrator::new(
            Arc::clone(fake) as Arc<dyn MachineApi>,
            Arc::clone(fake) as Arc<dyn WorkloadApi>,
            Arc::clone(&audit),
        );
        (orch, audit)
    }

    #[tokio::test(start_paused = true)]
    async fn drains_nodes_strictly_in_order() {
        let mut fake = FakeCluster::default();
        let mut ds = pod("kube-system", "proxy-1");
        ds.daemonset = true;
        fake.pods.insert("w1".to_string(), vec![pod("apps", "web-1"), ds]);
        fake.pods.insert("w2".to_string(), vec![pod("apps", "web-2")]);
        let fake = Arc::new(fake);
        let (orch, _) = orchestrator(&fake);

        let topo = topology(vec![
            worker("a", "w1", "10.0.0.10"),
            worker("b", "w2", "10.0.0.11"),
        ]);
        let mut plan = confirmed_plan(
            OperationKind::Drain,
            vec!["a".into(), "b".into()],
            RolloutPolicy::default(),
        );

        orch.run(&mut plan, &topo, &context(), no_abort(), None)
            .await
            .unwrap();

        assert_eq!(plan.state, PlanState::Completed);
        assert!(plan.steps.iter().all(|s| s.state == StepState::Done));
        // Second node starts only after the first is uncordoned, and
        // daemonset pods are never evicted.
        assert_eq!(
            fake.calls(),
            vec![
                "cordon w1",
                "evict apps/web-1",
                "uncordon w1",
                "cordon w2",
                "evict apps/web-2",
                "uncordon w2",
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn successful_node_leaves_an_attributable_audit_trail() {
        let mut fake = FakeCluster::default();
        fake.pods.insert("w1".to_string(), vec![pod("apps", "web-1")]);
        let fake = Arc::new(fake);
        let (orch, audit) = orchestrator(&fake);

        let topo = topology(vec![worker("a", "w1", "10.0.0.10")]);
        let mut plan = confirmed_plan(
            OperationKind::Drain,
            vec!["a".into()],
            RolloutPolicy::default(),
        );

        orch.run(&mut plan, &topo, &context(), no_abort(), None)
            .await
            .unwrap();
        assert_eq!(plan.state, PlanState::Completed);

        // A plan where nothing went wrong still records what was done
        // to whom, one record per step transition.
        let records = audit.records();
        let member_steps: Vec<_> = records
            .iter()
            .filter(|r| r.member == Some("a".into()))
            .map(|r| (r.step.as_str(), r.outcome.as_str()))
            .collect();
        assert_eq!(
            member_steps,
            vec![
                ("cordoning", "started"),
                ("draining", "started"),
                ("uncordoning", "started"),
                ("done", "ok"),
            ]
        );
    }

    #[tokio::test]
    async fn refuses_unconfirmed_plan() {
        let fake = Arc::new(FakeCluster::default());
        let (orch, _) = orchestrator(&fake);
        let topo = topology(vec![worker("a", "w1", "10.0.0.10")]);
        let mut plan = OperationPlan::new(
            "prod",
            OperationKind::Drain,
            vec!["a".into()],
            RolloutPolicy::default(),
        );

        let err = orch
            .run(&mut plan, &topo, &context(), no_abort(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, RolloutError::NotConfirmed));
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn rejects_targets_missing_from_topology() {
        let fake = Arc::new(FakeCluster::default());
        let (orch, _) = orchestrator(&fake);
        let topo = topology(vec![worker("a", "w1", "10.0.0.10")]);
        let mut plan = confirmed_plan(
            OperationKind::Drain,
            vec!["a".into(), "ghost".into()],
            RolloutPolicy::default(),
        );

        let err = orch
            .run(&mut plan, &topo, &context(), no_abort(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, RolloutError::UnknownMember(id) if id == "ghost".into()));
    }

    #[tokio::test(start_paused = true)]
    async fn quorum_risk_fails_plan_before_any_step() {
        // 3 control planes, one unreachable: taking out another would
        // break quorum, so the plan fails with nothing touched.
        let mut fake = FakeCluster::default();
        let quorum: Vec<MemberId> = vec!["a".into(), "b".into()];
        for (id, addr) in [("a", "10.0.0.1"), ("b", "10.0.0.2")] {
            fake.consensus.insert(
                addr.to_string(),
                ConsensusStatus {
                    reporter: id.into(),
                    healthy: true,
                    quorum_members: quorum.clone(),
                },
            );
        }
        let fake = Arc::new(fake);
        let (orch, audit) = orchestrator(&fake);

        let topo = topology(vec![
            control_plane("a", "cp1", "10.0.0.1"),
            control_plane("b", "cp2", "10.0.0.2"),
            control_plane("c", "cp3", "10.0.0.3"),
        ]);
        let mut plan = confirmed_plan(
            OperationKind::Reboot,
            vec!["a".into()],
            RolloutPolicy::default(),
        );

        orch.run(&mut plan, &topo, &context(), no_abort(), None)
            .await
            .unwrap();

        assert_eq!(plan.state, PlanState::Failed);
        assert!(plan.reason.as_deref().unwrap().contains("quorum"));
        assert_eq!(plan.steps[0].state, StepState::Pending, "no step was started");
        assert!(fake.calls().is_empty(), "nothing was cordoned or rebooted");
        assert!(audit
            .records()
            .iter()
            .any(|r| r.step == "health-gate" && r.outcome == "failed"));
    }

    #[tokio::test(start_paused = true)]
    async fn blocked_precheck_skips_under_strict_policy() {
        let mut fake = FakeCluster::default();
        fake.pods.insert("w1".to_string(), vec![pod("apps", "db-0")]);
        fake.pods.insert("w2".to_string(), vec![pod("apps", "web-1")]);
        fake.budgets = vec![BudgetView {
            namespace: "apps".to_string(),
            name: "db-pdb".to_string(),
            disruptions_allowed: 0,
            expected_pods: 2,
            matching_pods: vec!["apps/db-0".to_string()],
        }];
        let fake = Arc::new(fake);
        let (orch, audit) = orchestrator(&fake);

        let topo = topology(vec![
            worker("a", "w1", "10.0.0.10"),
            worker("b", "w2", "10.0.0.11"),
        ]);
        let mut plan = confirmed_plan(
            OperationKind::Drain,
            vec!["a".into(), "b".into()],
            RolloutPolicy::default(),
        );

        orch.run(&mut plan, &topo, &context(), no_abort(), None)
            .await
            .unwrap();

        assert_eq!(plan.steps[0].state, StepState::Skipped);
        assert!(plan.steps[0].detail.as_deref().unwrap().contains("db-pdb"));
        assert_eq!(plan.steps[1].state, StepState::Done);
        assert_eq!(plan.state, PlanState::Completed);
        // The skipped node was never cordoned.
        assert!(!fake.calls().iter().any(|c| c == "cordon w1"));
        assert!(audit
            .records()
            .iter()
            .any(|r| r.step == "precheck" && r.outcome == "skipped"));
    }

    #[tokio::test(start_paused = true)]
    async fn blocked_precheck_proceeds_on_confirmed_override() {
        let mut fake = FakeCluster::default();
        fake.pods.insert("w1".to_string(), vec![pod("apps", "db-0")]);
        fake.budgets = vec![BudgetView {
            namespace: "apps".to_string(),
            name: "db-pdb".to_string(),
            disruptions_allowed: 0,
            expected_pods: 2,
            matching_pods: vec!["apps/db-0".to_string()],
        }];
        // Budget frees up by the time eviction is attempted.
        fake.evict_script.lock().unwrap().insert(
            "apps/db-0".to_string(),
            VecDeque::from([EvictOutcome::BudgetBlocked, EvictOutcome::Evicted]),
        );
        let fake = Arc::new(fake);
        let (orch, audit) = orchestrator(&fake);
        let prompt = Arc::new(FixedAnswer {
            yes: true,
            asked: Mutex::new(vec![]),
        });
        let orch = orch.with_prompt(Arc::clone(&prompt) as Arc<dyn OverridePrompt>);

        let topo = topology(vec![worker("a", "w1", "10.0.0.10")]);
        let mut plan = confirmed_plan(
            OperationKind::Drain,
            vec!["a".into()],
            RolloutPolicy {
                on_blocked: BlockedPolicy::ForceWithConfirmation,
                on_failure: FailurePolicy::AbortRemaining,
            },
        );

        orch.run(&mut plan, &topo, &context(), no_abort(), None)
            .await
            .unwrap();

        assert_eq!(plan.state, PlanState::Completed);
        assert_eq!(prompt.asked.lock().unwrap().as_slice(), ["w1"]);
        assert!(audit
            .records()
            .iter()
            .any(|r| r.step == "precheck" && r.outcome == "overridden"));
    }

    #[tokio::test(start_paused = true)]
    async fn declined_override_skips_the_node() {
        let mut fake = FakeCluster::default();
        fake.pods.insert("w1".to_string(), vec![pod("apps", "db-0")]);
        fake.budgets = vec![BudgetView {
            namespace: "apps".to_string(),
            name: "db-pdb".to_string(),
            disruptions_allowed: 0,
            expected_pods: 2,
            matching_pods: vec!["apps/db-0".to_string()],
        }];
        let fake = Arc::new(fake);
        let (orch, _) = orchestrator(&fake);
        let prompt = Arc::new(FixedAnswer {
            yes: false,
            asked: Mutex::new(vec![]),
        });
        let orch = orch.with_prompt(prompt as Arc<dyn OverridePrompt>);

        let topo = topology(vec![worker("a", "w1", "10.0.0.10")]);
        let mut plan = confirmed_plan(
            OperationKind::Drain,
            vec!["a".into()],
            RolloutPolicy {
                on_blocked: BlockedPolicy::ForceWithConfirmation,
                on_failure: FailurePolicy::AbortRemaining,
            },
        );

        orch.run(&mut plan, &topo, &context(), no_abort(), None)
            .await
            .unwrap();

        assert_eq!(plan.steps[0].state, StepState::Skipped);
        assert!(!fake.calls().iter().any(|c| c == "cordon w1"));
    }

    #[tokio::test(start_paused = true)]
    async fn reboot_timeout_uncordons_and_continues() {
        let mut fake = FakeCluster::default();
        fake.pods.insert("w1".to_string(), vec![pod("apps", "web-1")]);
        fake.pods.insert("w2".to_string(), vec![pod("apps", "web-2")]);
        // w1 never comes back after the reboot.
        fake.ready_script.lock().unwrap().insert(
            "w1".to_string(),
            VecDeque::from([ReadyState::NotReady]),
        );
        let fake = Arc::new(fake);
        let (orch, _) = orchestrator(&fake);

        let topo = topology(vec![
            worker("a", "w1", "10.0.0.10"),
            worker("b", "w2", "10.0.0.11"),
        ]);
        let mut plan = confirmed_plan(
            OperationKind::Reboot,
            vec!["a".into(), "b".into()],
            RolloutPolicy {
                on_blocked: BlockedPolicy::StrictSkip,
                on_failure: FailurePolicy::ContinueNext,
            },
        );

        orch.run(&mut plan, &topo, &context(), no_abort(), None)
            .await
            .unwrap();

        assert_eq!(plan.steps[0].state, StepState::Failed);
        assert!(plan.steps[0]
            .detail
            .as_deref()
            .unwrap()
            .contains("reboot timeout"));
        // The failed node was uncordoned anyway, and the plan moved on.
        let calls = fake.calls();
        assert!(calls.iter().any(|c| c == "uncordon w1"));
        assert_eq!(plan.steps[1].state, StepState::Done);
        assert_eq!(plan.state, PlanState::Failed);
        assert_eq!(plan.reason.as_deref(), Some("1 of 2 nodes failed"));
    }

    #[tokio::test(start_paused = true)]
    async fn failure_aborts_remaining_under_strict_policy() {
        let mut fake = FakeCluster::default();
        fake.pods.insert("w1".to_string(), vec![pod("apps", "web-1")]);
        fake.pods.insert("w2".to_string(), vec![pod("apps", "web-2")]);
        fake.ready_script.lock().unwrap().insert(
            "w1".to_string(),
            VecDeque::from([ReadyState::NotReady]),
        );
        let fake = Arc::new(fake);
        let (orch, _) = orchestrator(&fake);

        let topo = topology(vec![
            worker("a", "w1", "10.0.0.10"),
            worker("b", "w2", "10.0.0.11"),
        ]);
        let mut plan = confirmed_plan(
            OperationKind::Reboot,
            vec!["a".into(), "b".into()],
            RolloutPolicy::default(),
        );

        orch.run(&mut plan, &topo, &context(), no_abort(), None)
            .await
            .unwrap();

        assert_eq!(plan.state, PlanState::Failed);
        assert_eq!(plan.steps[1].state, StepState::Pending, "second node untouched");
        assert!(!fake.calls().iter().any(|c| c == "cordon w2"));
    }

    #[tokio::test(start_paused = true)]
    async fn eviction_retries_through_budget_pressure() {
        let mut fake = FakeCluster::default();
        fake.pods.insert("w1".to_string(), vec![pod("apps", "db-0")]);
        fake.evict_script.lock().unwrap().insert(
            "apps/db-0".to_string(),
            VecDeque::from([
                EvictOutcome::BudgetBlocked,
                EvictOutcome::BudgetBlocked,
                EvictOutcome::Evicted,
            ]),
        );
        let fake = Arc::new(fake);
        let (orch, _) = orchestrator(&fake);

        let topo = topology(vec![worker("a", "w1", "10.0.0.10")]);
        let mut plan = confirmed_plan(
            OperationKind::Drain,
            vec!["a".into()],
            RolloutPolicy::default(),
        );

        orch.run(&mut plan, &topo, &context(), no_abort(), None)
            .await
            .unwrap();

        assert_eq!(plan.state, PlanState::Completed);
        let evictions = fake.calls().iter().filter(|c| c.starts_with("evict")).count();
        assert_eq!(evictions, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_budget_pressure_fails_the_node() {
        let mut fake = FakeCluster::default();
        fake.pods.insert("w1".to_string(), vec![pod("apps", "db-0")]);
        fake.evict_script.lock().unwrap().insert(
            "apps/db-0".to_string(),
            VecDeque::from([EvictOutcome::BudgetBlocked]),
        );
        let fake = Arc::new(fake);
        let (orch, _) = orchestrator(&fake);

        let topo = topology(vec![worker("a", "w1", "10.0.0.10")]);
        let mut plan = confirmed_plan(
            OperationKind::Drain,
            vec!["a".into()],
            RolloutPolicy::default(),
        );

        orch.run(&mut plan, &topo, &context(), no_abort(), None)
            .await
            .unwrap();

        assert_eq!(plan.state, PlanState::Failed);
        assert!(plan.steps[0]
            .detail
            .as_deref()
            .unwrap()
            .contains("disruption budget"));
        // Cordon was rolled back after the drain gave up.
        assert!(fake.calls().iter().any(|c| c == "uncordon w1"));
    }

    #[tokio::test]
    async fn abort_stops_before_the_next_node() {
        let mut fake = FakeCluster::default();
        fake.pods.insert("w1".to_string(), vec![]);
        let fake = Arc::new(fake);
        let (orch, audit) = orchestrator(&fake);

        let topo = topology(vec![worker("a", "w1", "10.0.0.10")]);
        let mut plan = confirmed_plan(
            OperationKind::Drain,
            vec!["a".into()],
            RolloutPolicy::default(),
        );

        let (tx, rx) = watch::channel(true);
        orch.run(&mut plan, &topo, &context(), rx, None).await.unwrap();
        drop(tx);

        assert_eq!(plan.state, PlanState::Aborted);
        assert_eq!(plan.steps[0].state, StepState::Pending);
        assert!(fake.calls().is_empty());
        assert!(audit
            .records()
            .iter()
            .any(|r| r.step == "plan" && r.outcome == "aborted"));
    }

    #[tokio::test(start_paused = true)]
    async fn progress_events_track_step_transitions() {
        let mut fake = FakeCluster::default();
        fake.pods.insert("w1".to_string(), vec![]);
        let fake = Arc::new(fake);
        let (orch, _) = orchestrator(&fake);

        let topo = topology(vec![worker("a", "w1", "10.0.0.10")]);
        let mut plan = confirmed_plan(
            OperationKind::Drain,
            vec!["a".into()],
            RolloutPolicy::default(),
        );

        let (tx, mut rx) = mpsc::unbounded_channel();
        orch.run(&mut plan, &topo, &context(), no_abort(), Some(tx))
            .await
            .unwrap();

        let mut states = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let ProgressEvent::Step { state, .. } = event {
                states.push(state);
            }
        }
        assert_eq!(
            states,
            vec![
                StepState::Cordoning,
                StepState::Draining,
                StepState::Uncordoning,
                StepState::Done,
            ]
        );
    }
}
