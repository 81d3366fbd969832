//! Topology resolution — probe, merge, deduplicate.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use bosun_core::{
    ApiError, ContextConfig, MachineApi, MachineRole, Member, MemberId, ProbeFailure,
    ProbeIdentity, RoleConflict, TopologySnapshot, epoch_secs,
};

/// Resolution failed for the whole context.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// Not a single configured address answered. Fatal for the
    /// context; partial failure is a degraded snapshot instead.
    #[error("cluster unreachable: none of {} configured addresses answered", failures.len())]
    ClusterUnreachable { failures: Vec<ProbeFailure> },
}

/// Resolves a context's configured addresses into a canonical member set.
pub struct TopologyResolver {
    api: Arc<dyn MachineApi>,
}

/// What one probe attempt produced, keyed by the address dialed.
enum ProbeOutcome {
    Identity(ProbeIdentity),
    Failed(String),
}

/// Accumulator for one resolved identity across all addresses that
/// reached it.
struct IdentityEntry {
    hostname: String,
    /// Addresses dialed that resolved to this identity, in dial order.
    dialed: Vec<String>,
    /// Self-reported addresses from the first probe.
    own_addresses: Vec<String>,
    /// (dialed address, role reported via it).
    roles: Vec<(String, MachineRole)>,
}

impl TopologyResolver {
    pub fn new(api: Arc<dyn MachineApi>) -> Self {
        Self { api }
    }

    /// Probe every endpoint and extra node hint, then merge the
    /// identity responses into a deduplicated snapshot.
    ///
    /// Returns `Err` only when zero probes succeed; any partial
    /// failure is reported inside the snapshot.
    pub async fn resolve(&self, ctx: &ContextConfig) -> Result<TopologySnapshot, ResolveError> {
        let mut addresses: Vec<String> = ctx.endpoints.clone();
        for hint in ctx.extra_hints() {
            addresses.push(hint.to_string());
        }

        let outcomes = self.probe_all(&addresses, ctx).await;
        let snapshot = merge(&addresses, outcomes);

        if snapshot.members.is_empty() && snapshot.role_conflicts.is_empty() {
            warn!(context = %ctx.name, "no probe succeeded; cluster unreachable");
            return Err(ResolveError::ClusterUnreachable {
                failures: snapshot.unresolved,
            });
        }

        info!(
            context = %ctx.name,
            members = snapshot.members.len(),
            floating = snapshot.floating.len(),
            failed = snapshot.unresolved.len(),
            "topology resolved"
        );
        Ok(snapshot)
    }

    /// Fan out probes with bounded concurrency and a per-probe timeout.
    /// All outstanding probes complete (or time out) before merging.
    async fn probe_all(
        &self,
        addresses: &[String],
        ctx: &ContextConfig,
    ) -> HashMap<String, ProbeOutcome> {
        let semaphore = Arc::new(Semaphore::new(ctx.probe.concurrency.max(1)));
        let timeout = Duration::from_secs(ctx.probe.timeout_secs);
        let mut set = JoinSet::new();

        for address in addresses {
            let api = Arc::clone(&self.api);
            let semaphore = Arc::clone(&semaphore);
            let address = address.clone();
            set.spawn(async move {
                let _permit = semaphore.acquire().await;
                let outcome = match tokio::time::timeout(timeout, api.probe(&address)).await {
                    Ok(Ok(identity)) => ProbeOutcome::Identity(identity),
                    Ok(Err(e)) => ProbeOutcome::Failed(e.to_string()),
                    Err(_) => {
                        ProbeOutcome::Failed(ApiError::Timeout(timeout.as_secs()).to_string())
                    }
                };
                (address, outcome)
            });
        }

        let mut outcomes = HashMap::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((address, outcome)) => {
                    if let ProbeOutcome::Failed(reason) = &outcome {
                        debug!(%address, %reason, "probe failed");
                    }
                    outcomes.insert(address, outcome);
                }
                Err(e) => warn!(error = %e, "probe task panicked"),
            }
        }
        outcomes
    }
}

/// Merge probe outcomes into a snapshot. Pure so the dedup rules are
/// testable without a runtime.
fn merge(dial_order: &[String], mut outcomes: HashMap<String, ProbeOutcome>) -> TopologySnapshot {
    let mut entries: Vec<(MemberId, IdentityEntry)> = Vec::new();
    let mut unresolved = Vec::new();

    for address in dial_order {
        let Some(outcome) = outcomes.remove(address) else {
            continue;
        };
        match outcome {
            ProbeOutcome::Identity(identity) => {
                match entries.iter().position(|(id, _)| id == &identity.machine_id) {
                    Some(pos) => {
                        let entry = &mut entries[pos].1;
                        entry.dialed.push(address.clone());
                        entry.roles.push((address.clone(), identity.role));
                    }
                    None => entries.push((
                        identity.machine_id,
                        IdentityEntry {
                            hostname: identity.hostname,
                            dialed: vec![address.clone()],
                            own_addresses: identity.addresses,
                            roles: vec![(address.clone(), identity.role)],
                        },
                    )),
                }
            }
            ProbeOutcome::Failed(reason) => unresolved.push(ProbeFailure {
                address: address.clone(),
                reason,
            }),
        }
    }

    let mut members = Vec::new();
    let mut floating = Vec::new();
    let mut role_conflicts = Vec::new();

    for (id, entry) in entries {
        // A dialed address the member does not claim as its own is a
        // floating address riding on this identity — but only when the
        // member was also reached on one of its own addresses. A member
        // reachable solely through a forwarded address keeps that
        // address as its own reach, not as floating.
        let has_direct = entry
            .dialed
            .iter()
            .any(|d| entry.own_addresses.iter().any(|a| a == d));
        if has_direct {
            for dialed in &entry.dialed {
                if !entry.own_addresses.iter().any(|a| a == dialed) {
                    floating.push(dialed.clone());
                }
            }
        }

        let first_role = entry.roles[0].1;
        if entry.roles.iter().any(|(_, r)| *r != first_role) {
            warn!(member = %id, hostname = %entry.hostname, "role disagreement; excluding member");
            role_conflicts.push(RoleConflict {
                id,
                hostname: entry.hostname,
                reports: entry.roles,
            });
            continue;
        }

        // Prefer an address the member claims as its own over the
        // floating address that happened to be dialed first.
        let address = entry
            .dialed
            .iter()
            .find(|d| entry.own_addresses.iter().any(|a| &a == d))
            .unwrap_or(&entry.dialed[0])
            .clone();

        members.push(Member {
            id,
            hostname: entry.hostname,
            role: first_role,
            address,
            addresses: entry.dialed,
        });
    }

    members.sort_by(|a, b| a.hostname.cmp(&b.hostname));

    TopologySnapshot {
        members,
        floating,
        unresolved,
        role_conflicts,
        resolved_at: epoch_secs(),
    }
}
