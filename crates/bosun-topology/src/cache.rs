//! Topology snapshot cache — single writer, many readers.
//!
//! A refresh resolves into a fresh snapshot before touching the cell,
//! so readers of the previous snapshot never wait on the network.

use std::sync::{Arc, RwLock};

use bosun_core::{ContextConfig, TopologySnapshot};

use crate::resolver::{ResolveError, TopologyResolver};

/// Holds the latest completed snapshot for one context.
#[derive(Default)]
pub struct TopologyCache {
    current: RwLock<Option<Arc<TopologySnapshot>>>,
}

impl TopologyCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The last completed snapshot, if any resolution has finished.
    pub fn latest(&self) -> Option<Arc<TopologySnapshot>> {
        self.current.read().expect("cache lock poisoned").clone()
    }

    /// Resolve and swap in the new snapshot. The write lock is held
    /// only for the pointer swap, never across the probe round.
    pub async fn refresh(
        &self,
        resolver: &TopologyResolver,
        ctx: &ContextConfig,
    ) -> Result<Arc<TopologySnapshot>, ResolveError> {
        let snapshot = Arc::new(resolver.resolve(ctx).await?);
        *self.current.write().expect("cache lock poisoned") = Some(Arc::clone(&snapshot));
        Ok(snapshot)
    }

    /// Install a snapshot directly (used by tests and by callers that
    /// resolve out-of-band).
    pub fn store(&self, snapshot: TopologySnapshot) -> Arc<TopologySnapshot> {
        let snapshot = Arc::new(snapshot);
        *self.current.write().expect("cache lock poisoned") = Some(Arc::clone(&snapshot));
        snapshot
    }
}
