//! Consensus-store status parsing.
//!
//! Machines report consensus membership as a multi-document YAML
//! stream, one document per member the reporter can see. Documents
//! that fail to parse or carry no id are skipped; the report is only
//! as complete as the reporter's own view.

use bosun_core::{ApiError, ConsensusStatus, MemberId};

/// Parse one member's consensus report.
///
/// The reporter counts as healthy only when its own id appears in the
/// membership it reports; a member that answers but does not list
/// itself has left (or never joined) the voting set. Learner entries
/// are visible in the stream but carry no vote, so they are excluded
/// from the quorum view.
pub fn parse_consensus_status(
    reporter: &MemberId,
    yaml: &str,
) -> Result<ConsensusStatus, ApiError> {
    let mut quorum_members = Vec::new();

    for doc in yaml.split("\n---") {
        let doc = doc.trim();
        if doc.is_empty() {
            continue;
        }
        let Ok(value) = serde_yaml::from_str::<serde_yaml::Value>(doc) else {
            continue;
        };

        let Some(id) = value
            .get("metadata")
            .and_then(|m| m.get("id"))
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
        else {
            continue;
        };

        let learner = value
            .get("spec")
            .and_then(|s| s.get("isLearner"))
            .and_then(serde_yaml::Value::as_bool)
            .unwrap_or(false);
        if learner {
            continue;
        }

        let id = MemberId::from(id);
        if !quorum_members.contains(&id) {
            quorum_members.push(id);
        }
    }

    if quorum_members.is_empty() {
        return Err(ApiError::Malformed(
            "consensus report contains no voting members".to_string(),
        ));
    }

    let healthy = quorum_members.contains(reporter);
    Ok(ConsensusStatus {
        reporter: reporter.clone(),
        healthy,
        quorum_members,
    })
}
