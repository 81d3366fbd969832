//! Parsing of identity responses from the machine API.
//!
//! The managed cluster's status API answers with a stream of YAML
//! documents, one per resource. Transport adapters call into here to
//! turn the raw text into [`ProbeIdentity`] values. Unparseable
//! documents and documents without an id are skipped, not fatal.

use bosun_core::{ApiError, MachineRole, MemberId, ProbeIdentity};

/// Parse the first identity document in a probe response.
///
/// A probe answers with exactly one identity; trailing documents are
/// ignored.
pub fn parse_identity(yaml: &str) -> Result<ProbeIdentity, ApiError> {
    parse_members(yaml)
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::Malformed("no identity document in response".to_string()))
}

/// Parse a multi-document member listing.
///
/// Each document carries `metadata.id` plus a `spec` with hostname,
/// machine type, and addresses. Documents that fail to parse or lack
/// an id are skipped so one corrupt entry never hides the rest.
pub fn parse_members(yaml: &str) -> Vec<ProbeIdentity> {
    let mut members = Vec::new();

    for doc_str in yaml.split("\n---") {
        let doc_str = doc_str.trim();
        if doc_str.is_empty() {
            continue;
        }

        let doc: serde_yaml::Value = match serde_yaml::from_str(doc_str) {
            Ok(v) => v,
            Err(_) => continue,
        };

        let id = doc
            .get("metadata")
            .and_then(|m| m.get("id"))
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();
        if id.is_empty() {
            continue;
        }

        let spec = doc.get("spec");

        let hostname = spec
            .and_then(|s| s.get("hostname"))
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();

        let role = match spec
            .and_then(|s| s.get("machineType"))
            .and_then(|v| v.as_str())
        {
            Some("controlplane") => MachineRole::ControlPlane,
            _ => MachineRole::Worker,
        };

        let addresses = spec
            .and_then(|s| s.get("addresses"))
            .and_then(|v| v.as_sequence())
            .map(|seq| {
                seq.iter()
                    .filter_map(|v| v.as_str().map(|s| s.to_string()))
                    .collect()
            })
            .unwrap_or_default();

        members.push(ProbeIdentity {
            machine_id: MemberId(id),
            hostname,
            role,
            addresses,
        });
    }

    members
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_MEMBERS: &str = r#"
node: 192.168.9.11
metadata:
    namespace: cluster
    id: 3xKYjp
    version: 1
spec:
    nodeId: 3xKYjp
    addresses:
        - 192.168.9.11
    hostname: cp-1
    machineType: controlplane
    operatingSystem: Linux (6.6.0)
---
node: 192.168.9.11
metadata:
    namespace: cluster
    id: 4yLZkq
    version: 1
spec:
    nodeId: 4yLZkq
    addresses:
        - 192.168.9.21
        - 10.244.0.1
    hostname: worker-1
    machineType: worker
"#;

    #[test]
    fn parses_two_members() {
        let members = parse_members(TWO_MEMBERS);
        assert_eq!(members.len(), 2);

        assert_eq!(members[0].machine_id, "3xKYjp".into());
        assert_eq!(members[0].hostname, "cp-1");
        assert_eq!(members[0].role, MachineRole::ControlPlane);
        assert_eq!(members[0].addresses, vec!["192.168.9.11"]);

        assert_eq!(members[1].role, MachineRole::Worker);
        assert_eq!(members[1].addresses.len(), 2);
    }

    #[test]
    fn first_document_wins_for_identity() {
        let identity = parse_identity(TWO_MEMBERS).unwrap();
        assert_eq!(identity.machine_id, "3xKYjp".into());
    }

    #[test]
    fn empty_input_is_malformed_identity() {
        assert!(matches!(parse_identity(""), Err(ApiError::Malformed(_))));
        assert!(parse_members("").is_empty());
    }

    #[test]
    fn invalid_documents_are_skipped() {
        let yaml = r#"
not valid yaml: [
---
metadata:
    id: good
spec:
    hostname: survivor
    machineType: controlplane
"#;
        let members = parse_members(yaml);
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].hostname, "survivor");
    }

    #[test]
    fn document_without_id_is_skipped() {
        let yaml = r#"
metadata:
    namespace: cluster
spec:
    hostname: nameless
"#;
        assert!(parse_members(yaml).is_empty());
    }

    #[test]
    fn unknown_machine_type_defaults_to_worker() {
        let yaml = r#"
metadata:
    id: m1
spec:
    hostname: mystery
    machineType: init
"#;
        let members = parse_members(yaml);
        assert_eq!(members[0].role, MachineRole::Worker);
    }
}
