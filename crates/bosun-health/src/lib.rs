//! bosun-health — merges per-member consensus reports into one
//! cluster-wide quorum snapshot.
//!
//! Read-only: a member that cannot be queried degrades the snapshot,
//! it never fails the aggregation. A fully unreachable control plane
//! yields an explicit unknown state, never a silent zero.

pub mod aggregator;
pub mod wire;

pub use aggregator::HealthAggregator;
