//! Health aggregation — query every control-plane member, merge
//! conservatively.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use bosun_core::{
    ClusterHealthSnapshot, ConsensusStatus, HealthState, MachineApi, Member, MemberHealth,
    MemberId, ProbeTunables, TopologySnapshot,
};

/// Aggregates consensus-store health across the control plane.
pub struct HealthAggregator {
    api: Arc<dyn MachineApi>,
}

impl HealthAggregator {
    pub fn new(api: Arc<dyn MachineApi>) -> Self {
        Self { api }
    }

    /// Query consensus status from every control-plane member in the
    /// snapshot, in parallel, and merge the views.
    ///
    /// Merge rule: a member counts as healthy only when its own
    /// report says it is in the active quorum AND at least one other
    /// reachable member lists it in its quorum view. Disagreement
    /// resolves toward unhealthy. A lone control-plane member has no
    /// independent peer, so its self-report stands alone.
    pub async fn aggregate(
        &self,
        topology: &TopologySnapshot,
        probe: &ProbeTunables,
    ) -> ClusterHealthSnapshot {
        let control_plane: Vec<&Member> = topology
            .members
            .iter()
            .filter(|m| m.is_control_plane())
            .collect();
        let total = control_plane.len();

        if total == 0 {
            warn!("no control-plane members in topology; health unknown");
            return ClusterHealthSnapshot::unknown(0);
        }

        let reports = self.query_all(&control_plane, probe).await;

        if reports.values().all(Option::is_none) {
            warn!(total, "entire control-plane tier unreachable; health unknown");
            return ClusterHealthSnapshot::unknown(total);
        }

        let mut members = Vec::with_capacity(total);
        let mut healthy_count = 0;

        for member in &control_plane {
            let own = reports.get(&member.id).and_then(Option::as_ref);
            let self_healthy = own.is_some_and(|r| r.healthy);

            let peer_confirmed = reports.iter().any(|(reporter, report)| {
                *reporter != member.id
                    && report
                        .as_ref()
                        .is_some_and(|r| r.quorum_members.contains(&member.id))
            });

            // With a single control-plane member there is no peer to
            // confirm anything; the self-report is all there is.
            let healthy = self_healthy && (peer_confirmed || total == 1);
            if healthy {
                healthy_count += 1;
            } else {
                debug!(
                    member = %member.id,
                    self_healthy,
                    peer_confirmed,
                    "control-plane member not counted healthy"
                );
            }

            members.push(MemberHealth {
                id: member.id.clone(),
                reachable: own.is_some(),
                healthy,
            });
        }

        let quorum_safe = ClusterHealthSnapshot::quorum_safe_counts(total, healthy_count);
        info!(total, healthy = healthy_count, quorum_safe, "health aggregated");

        ClusterHealthSnapshot {
            state: HealthState::Known,
            total_control_plane: total,
            healthy_control_plane: healthy_count,
            members,
            quorum_safe,
        }
    }

    /// Bounded parallel fan-out, one query per control-plane member.
    /// Unreachable members map to None.
    async fn query_all(
        &self,
        members: &[&Member],
        probe: &ProbeTunables,
    ) -> HashMap<MemberId, Option<ConsensusStatus>> {
        let semaphore = Arc::new(Semaphore::new(probe.concurrency.max(1)));
        let timeout = Duration::from_secs(probe.timeout_secs);
        let mut set = JoinSet::new();

        for member in members {
            let api = Arc::clone(&self.api);
            let semaphore = Arc::clone(&semaphore);
            let id = member.id.clone();
            let address = member.address.clone();
            set.spawn(async move {
                let _permit = semaphore.acquire().await;
                let report = match tokio::time::timeout(timeout, api.consensus_status(&address))
                    .await
                {
                    Ok(Ok(status)) => Some(status),
                    Ok(Err(e)) => {
                        debug!(member = %id, error = %e, "consensus query failed");
                        None
                    }
                    Err(_) => {
                        debug!(member = %id, "consensus query timed out");
                        None
                    }
                };
                (id, report)
            });
        }

        let mut reports = HashMap::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((id, report)) => {
                    reports.insert(id, report);
                }
                Err(e) => warn!(error = %e, "consensus query task panicked"),
            }
        }
        reports
    }
}
