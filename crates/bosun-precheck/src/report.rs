//! Pre-check verdicts and the findings behind them.

use std::fmt;

/// Overall outcome of a pre-check. Ordered by severity so two
/// verdicts combine with `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Verdict {
    /// Nothing stands in the way of a drain.
    Safe,
    /// Conditions worth an operator's attention, not drain-stopping.
    Warn,
    /// Draining now would strand workloads or violate a budget.
    Blocked,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Safe => write!(f, "safe"),
            Verdict::Warn => write!(f, "warn"),
            Verdict::Blocked => write!(f, "blocked"),
        }
    }
}

/// One observed condition, with the object it was observed on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    /// `namespace/name` of the pod or budget.
    pub subject: String,
    pub detail: String,
}

impl Finding {
    pub fn new(subject: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            detail: detail.into(),
        }
    }
}

/// Result of checking one node. Every blocker and warning is listed,
/// not just the first one found.
#[derive(Debug, Clone)]
pub struct PreCheckReport {
    pub node: String,
    pub verdict: Verdict,
    pub blockers: Vec<Finding>,
    pub warnings: Vec<Finding>,
}

impl PreCheckReport {
    /// One-per-line summary of everything that is not Safe, used for
    /// audit records and override prompts.
    pub fn reasons(&self) -> Vec<String> {
        self.blockers
            .iter()
            .map(|f| format!("{}: {}", f.subject, f.detail))
            .chain(
                self.warnings
                    .iter()
                    .map(|f| format!("warning {}: {}", f.subject, f.detail)),
            )
            .collect()
    }
}
