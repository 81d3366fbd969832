//! bosun-topology — resolves configured addresses into real members.
//!
//! The resolver probes every configured endpoint and node hint,
//! builds the member set from the identities that answered (never
//! from the address strings), and deduplicates purely by identity.
//! A floating address that routes to an already-known member
//! contributes no member of its own and causes no error.

pub mod cache;
pub mod resolver;
pub mod wire;

pub use cache::TopologyCache;
pub use resolver::{ResolveError, TopologyResolver};
