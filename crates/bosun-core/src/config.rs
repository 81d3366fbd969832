//! Fleet configuration parser.
//!
//! One `[[context]]` table per managed cluster. Consumed read-only;
//! credentials are opaque to the core and passed through to the
//! transport implementations untouched.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Top-level configuration: every managed cluster context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetConfig {
    #[serde(rename = "context")]
    pub contexts: Vec<ContextConfig>,
}

/// One managed cluster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    pub name: String,
    /// Addresses of the cluster's control API. May include floating
    /// addresses that are not members themselves.
    pub endpoints: Vec<String>,
    /// Operator hints for addresses of individual nodes. Only a
    /// successful identity probe turns a hint into a member.
    #[serde(default)]
    pub node_hints: Vec<String>,
    /// Opaque credential material, handed to the transport as-is.
    #[serde(default)]
    pub credentials: Option<String>,
    #[serde(default)]
    pub probe: ProbeTunables,
    #[serde(default)]
    pub drain: DrainTunables,
}

/// Probe fan-out limits for the resolver and health aggregator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeTunables {
    /// Per-probe timeout in seconds.
    pub timeout_secs: u64,
    /// Maximum concurrent probes per round.
    pub concurrency: usize,
}

impl Default for ProbeTunables {
    fn default() -> Self {
        Self {
            timeout_secs: 5,
            concurrency: 8,
        }
    }
}

/// Tunables for drain and reboot steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrainTunables {
    /// Bounded wait per pod while a disruption budget blocks eviction.
    pub eviction_timeout_secs: u64,
    /// Grace period passed to evictions; None uses each pod's own.
    pub grace_period_secs: Option<i64>,
    /// How long to wait for a node to report ready after a reboot.
    pub ready_timeout_secs: u64,
}

impl Default for DrainTunables {
    fn default() -> Self {
        Self {
            eviction_timeout_secs: 30,
            grace_period_secs: None,
            ready_timeout_secs: 300,
        }
    }
}

impl FleetConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let config: FleetConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the resolver cannot work with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.contexts.is_empty() {
            anyhow::bail!("no contexts configured");
        }
        let mut names = HashSet::new();
        for ctx in &self.contexts {
            if ctx.name.is_empty() {
                anyhow::bail!("context with empty name");
            }
            if !names.insert(ctx.name.as_str()) {
                anyhow::bail!("duplicate context name: {}", ctx.name);
            }
            if ctx.endpoints.is_empty() {
                anyhow::bail!("context {} has no endpoints", ctx.name);
            }
        }
        Ok(())
    }

    pub fn context(&self, name: &str) -> Option<&ContextConfig> {
        self.contexts.iter().find(|c| c.name == name)
    }
}

impl ContextConfig {
    /// Hint addresses not already configured as endpoints. These are
    /// probed in addition to the endpoint set.
    pub fn extra_hints(&self) -> Vec<&str> {
        self.node_hints
            .iter()
            .map(String::as_str)
            .filter(|h| !self.endpoints.iter().any(|e| e == h))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[[context]]
name = "prod"
endpoints = ["192.168.9.10", "192.168.9.11"]
node_hints = ["192.168.9.11", "192.168.9.12"]
credentials = "base64:abcd"

[context.probe]
timeout_secs = 3
concurrency = 4

[[context]]
name = "staging"
endpoints = ["10.5.0.2"]
"#;

    #[test]
    fn parses_contexts() {
        let cfg = FleetConfig::from_toml(SAMPLE).unwrap();
        assert_eq!(cfg.contexts.len(), 2);

        let prod = cfg.context("prod").unwrap();
        assert_eq!(prod.endpoints.len(), 2);
        assert_eq!(prod.probe.timeout_secs, 3);
        assert_eq!(prod.probe.concurrency, 4);
        assert_eq!(prod.credentials.as_deref(), Some("base64:abcd"));

        let staging = cfg.context("staging").unwrap();
        assert!(staging.node_hints.is_empty());
        // Defaults apply when the tables are omitted.
        assert_eq!(staging.probe.timeout_secs, 5);
        assert_eq!(staging.drain.ready_timeout_secs, 300);
    }

    #[test]
    fn extra_hints_excludes_endpoint_overlap() {
        let cfg = FleetConfig::from_toml(SAMPLE).unwrap();
        let prod = cfg.context("prod").unwrap();
        // 192.168.9.11 is both an endpoint and a hint; only .12 is extra.
        assert_eq!(prod.extra_hints(), vec!["192.168.9.12"]);
    }

    #[test]
    fn rejects_empty_endpoints() {
        let toml = r#"
[[context]]
name = "bad"
endpoints = []
"#;
        assert!(FleetConfig::from_toml(toml).is_err());
    }

    #[test]
    fn rejects_duplicate_names() {
        let toml = r#"
[[context]]
name = "a"
endpoints = ["1.2.3.4"]

[[context]]
name = "a"
endpoints = ["1.2.3.5"]
"#;
        assert!(FleetConfig::from_toml(toml).is_err());
    }

    #[test]
    fn rejects_no_contexts() {
        assert!(FleetConfig::from_toml("").is_err());
    }
}
