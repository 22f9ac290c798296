//! Cluster status document returned by `GET {endpoint}/cluster`.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Roles that identify the member accepting writes.
pub const PRIMARY_ROLES: [&str; 2] = ["leader", "master"];

/// Whole-cluster view as reported by one member.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct ClusterStatus {
    #[serde(default)]
    pub scope: String,
    #[serde(default)]
    pub members: Vec<NodeStatus>,
}

impl ClusterStatus {
    /// First member reporting a primary role.
    ///
    /// More than one leader is not checked for here; the first one wins.
    pub fn leader(&self) -> Option<&NodeStatus> {
        self.members.iter().find(|m| m.is_leader())
    }
}

/// One cluster member.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct NodeStatus {
    pub name: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: u16,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub timeline: Option<i64>,
    // Replicas may report "unknown" instead of a byte count.
    #[serde(default, deserialize_with = "lenient_i64")]
    pub lag: Option<i64>,
}

impl NodeStatus {
    pub fn is_leader(&self) -> bool {
        PRIMARY_ROLES.contains(&self.role.as_str())
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state.as_str(), "running" | "streaming")
    }
}

fn lenient_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cluster_document() {
        let status: ClusterStatus = serde_json::from_str(
            r#"{
                "scope": "pg-cluster",
                "members": [
                    {"name": "pg-1", "role": "replica", "state": "streaming", "host": "10.0.0.1", "port": 5432, "timeline": 7, "lag": "unknown"},
                    {"name": "pg-2", "role": "leader", "state": "running", "host": "10.0.0.2", "port": 5432, "timeline": 7}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(status.members[0].lag, None);
        assert!(status.members[0].is_running());
        assert_eq!(status.leader().map(|m| m.name.as_str()), Some("pg-2"));
    }

    #[test]
    fn test_legacy_master_role() {
        let status: ClusterStatus =
            serde_json::from_str(r#"{"members":[{"name":"pg-1","role":"master"}]}"#).unwrap();
        assert_eq!(status.leader().unwrap().name, "pg-1");
        assert_eq!(status.scope, "");
    }

    #[test]
    fn test_no_leader() {
        let status: ClusterStatus =
            serde_json::from_str(r#"{"members":[{"name":"pg-1","role":"replica"}]}"#).unwrap();
        assert!(status.leader().is_none());
    }
}
