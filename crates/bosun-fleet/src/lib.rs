//! bosun-fleet — one handle over every managed cluster context.
//!
//! Each context gets its own resolver, snapshot cache, health
//! aggregator, and orchestrator, all driven through the transports
//! registered for it. The fleet merges per-context topologies into a
//! stable cross-cluster member view and routes plans to the right
//! context, refusing a second plan while one is already running there.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{mpsc, watch};
use tracing::info;

use bosun_audit::AuditLog;
use bosun_core::{
    ClusterHealthSnapshot, ContextConfig, MachineApi, Member, MemberId, OperationKind,
    OverridePrompt, TopologySnapshot, WorkloadApi,
};
use bosun_health::HealthAggregator;
use bosun_precheck::{PreCheckEngine, PreCheckError, PreCheckReport};
use bosun_rollout::{OperationPlan, Orchestrator, ProgressEvent, RolloutError, RolloutPolicy};
use bosun_topology::{ResolveError, TopologyCache, TopologyResolver};

#[derive(Debug, thiserror::Error)]
pub enum FleetError {
    #[error("unknown context {0}")]
    UnknownContext(String),
    #[error("context {0} already has a plan running")]
    PlanActive(String),
    #[error("context {0} has no resolved topology yet")]
    NoTopology(String),
    #[error("plan has no targets")]
    EmptyPlan,
    #[error("context {context} has no member {member}")]
    UnknownMember { context: String, member: MemberId },
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Rollout(#[from] RolloutError),
    #[error(transparent)]
    PreCheck(#[from] PreCheckError),
}

/// A member together with the context it was resolved from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FleetMember {
    pub context: String,
    pub member: Member,
}

struct ContextHandle {
    config: ContextConfig,
    resolver: TopologyResolver,
    cache: TopologyCache,
    health: HealthAggregator,
    prechecks: PreCheckEngine,
    orchestrator: Orchestrator,
    /// Set while a plan is running against this context.
    busy: AtomicBool,
}

/// Releases the context's run slot when the run ends, however it ends.
struct RunSlot<'a>(&'a AtomicBool);

impl Drop for RunSlot<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl ContextHandle {
    fn acquire(&self) -> Option<RunSlot<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| RunSlot(&self.busy))
    }

    fn topology(&self) -> Result<Arc<TopologySnapshot>, FleetError> {
        self.cache
            .latest()
            .ok_or_else(|| FleetError::NoTopology(self.config.name.clone()))
    }
}

/// The multi-cluster entry point.
pub struct Fleet {
    handles: HashMap<String, ContextHandle>,
    /// Registration order, for stable iteration.
    order: Vec<String>,
    audit: Arc<AuditLog>,
    prompt: Option<Arc<dyn OverridePrompt>>,
}

impl Fleet {
    pub fn new(audit: Arc<AuditLog>) -> Self {
        Self {
            handles: HashMap::new(),
            order: Vec::new(),
            audit,
            prompt: None,
        }
    }

    /// Operator prompt handed to every context's orchestrator.
    /// Must be set before contexts are added.
    pub fn with_prompt(mut self, prompt: Arc<dyn OverridePrompt>) -> Self {
        self.prompt = Some(prompt);
        self
    }

    /// Register a context with the transports that reach it.
    /// Credentials stay inside the transport implementations.
    pub fn add_context(
        &mut self,
        config: ContextConfig,
        machines: Arc<dyn MachineApi>,
        workloads: Arc<dyn WorkloadApi>,
    ) {
        let mut orchestrator = Orchestrator::new(
            Arc::clone(&machines),
            Arc::clone(&workloads),
            Arc::clone(&self.audit),
        );
        if let Some(prompt) = &self.prompt {
            orchestrator = orchestrator.with_prompt(Arc::clone(prompt));
        }
        let name = config.name.clone();
        info!(context = %name, "context registered");
        self.handles.insert(
            name.clone(),
            ContextHandle {
                resolver: TopologyResolver::new(Arc::clone(&machines)),
                cache: TopologyCache::new(),
                health: HealthAggregator::new(machines),
                prechecks: PreCheckEngine::new(workloads),
                orchestrator,
                config,
                busy: AtomicBool::new(false),
            },
        );
        self.order.push(name);
    }

    fn handle(&self, context: &str) -> Result<&ContextHandle, FleetError> {
        self.handles
            .get(context)
            .ok_or_else(|| FleetError::UnknownContext(context.to_string()))
    }

    /// Re-resolve one context's topology.
    pub async fn refresh(&self, context: &str) -> Result<Arc<TopologySnapshot>, FleetError> {
        let handle = self.handle(context)?;
        Ok(handle.cache.refresh(&handle.resolver, &handle.config).await?)
    }

    /// Re-resolve every context. A context that fails to resolve keeps
    /// its previous snapshot; the error is reported per context.
    pub async fn refresh_all(&self) -> Vec<(String, Result<Arc<TopologySnapshot>, FleetError>)> {
        let mut results = Vec::with_capacity(self.order.len());
        for name in &self.order {
            results.push((name.clone(), self.refresh(name).await));
        }
        results
    }

    /// Latest cached snapshot for one context.
    pub fn topology(&self, context: &str) -> Result<Arc<TopologySnapshot>, FleetError> {
        self.handle(context)?.topology()
    }

    /// All members across all resolved contexts, ordered by context
    /// registration order and member order within each snapshot. The
    /// ordering is stable across calls as long as the snapshots are.
    pub fn members(&self) -> Vec<FleetMember> {
        let mut view = Vec::new();
        for name in &self.order {
            let Some(handle) = self.handles.get(name) else {
                continue;
            };
            let Some(snapshot) = handle.cache.latest() else {
                continue;
            };
            view.extend(snapshot.members.iter().map(|member| FleetMember {
                context: name.clone(),
                member: member.clone(),
            }));
        }
        view
    }

    /// Aggregate consensus health for one context's control plane.
    pub async fn health(&self, context: &str) -> Result<ClusterHealthSnapshot, FleetError> {
        let handle = self.handle(context)?;
        let topology = handle.topology()?;
        Ok(handle.health.aggregate(&topology, &handle.config.probe).await)
    }

    /// Run the workload pre-check for one member without mutating anything.
    pub async fn precheck(
        &self,
        context: &str,
        member: &MemberId,
    ) -> Result<PreCheckReport, FleetError> {
        let handle = self.handle(context)?;
        let topology = handle.topology()?;
        let target = topology
            .member(member)
            .ok_or_else(|| FleetError::UnknownMember {
                context: context.to_string(),
                member: member.clone(),
            })?;
        Ok(handle.prechecks.check(target).await?)
    }

    /// Build a plan against the context's current topology. Targets
    /// must exist in the cached snapshot; order is preserved.
    pub fn plan(
        &self,
        context: &str,
        kind: OperationKind,
        targets: Vec<MemberId>,
        policy: RolloutPolicy,
    ) -> Result<OperationPlan, FleetError> {
        let handle = self.handle(context)?;
        let topology = handle.topology()?;
        if targets.is_empty() {
            return Err(FleetError::EmptyPlan);
        }
        for target in &targets {
            if !topology.contains(target) {
                return Err(FleetError::UnknownMember {
                    context: context.to_string(),
                    member: target.clone(),
                });
            }
        }
        Ok(OperationPlan::new(context, kind, targets, policy))
    }

    /// Run a confirmed plan against its context. At most one plan runs
    /// per context at a time; a second run is rejected, not queued.
    pub async fn run(
        &self,
        plan: &mut OperationPlan,
        abort: watch::Receiver<bool>,
        progress: Option<mpsc::UnboundedSender<ProgressEvent>>,
    ) -> Result<(), FleetError> {
        let handle = self.handle(&plan.context)?;
        let topology = handle.topology()?;
        let Some(_slot) = handle.acquire() else {
            return Err(FleetError::PlanActive(plan.context.clone()));
        };
        handle
            .orchestrator
            .run(plan, &topology, &handle.config, abort, progress)
            .await?;
        Ok(())
    }
}
