// Written by Paul Clevett
// (C)Copyright Wolf Software Systems Ltd
// https://wolf.uk.com

//! HA / cluster-status endpoints
//!
//! Field names follow what `ha-manager`, `pvesh` and `pvecm` report through
//! the backend. Anything the panel does not model is kept in `extra`.

use serde::{Deserialize, Serialize};

use super::{null_as_default, string_or_number};
use crate::error::GatewayError;
use crate::gateway::Gateway;

type Extra = serde_json::Map<String, serde_json::Value>;

/// A guest under HA management, e.g. `vm:100`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HaResource {
    pub sid: String,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub node: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HaGroup {
    pub group: String,
    /// Comma separated `node[:priority]` list
    #[serde(default)]
    pub nodes: Option<String>,
    #[serde(default)]
    pub restricted: Option<u8>,
    #[serde(default)]
    pub nofailback: Option<u8>,
    #[serde(flatten)]
    pub extra: Extra,
}

/// VM or container that can be placed under HA
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Guest {
    #[serde(deserialize_with = "string_or_number")]
    pub vmid: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub node: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

/// One line of `pvecm nodes`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterNode {
    #[serde(deserialize_with = "string_or_number")]
    pub node_id: String,
    pub name: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub is_local: bool,
    #[serde(flatten)]
    pub extra: Extra,
}

impl ClusterNode {
    pub fn is_online(&self) -> bool {
        self.status.as_deref() == Some("online")
    }
}

/// Parsed `pvecm status`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ClusterStatus {
    #[serde(default)]
    pub cluster_name: String,
    #[serde(default)]
    pub quorum: bool,
    #[serde(default)]
    pub nodes: u32,
    #[serde(default)]
    pub expected_votes: u32,
    #[serde(default)]
    pub total_votes: u32,
    #[serde(flatten)]
    pub extra: Extra,
}

/// Everything the HA view needs in one response
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct CompleteData {
    #[serde(default, deserialize_with = "null_as_default")]
    pub ha_resources: Vec<HaResource>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub ha_groups: Vec<HaGroup>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub guests: Vec<Guest>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub cluster_nodes: Vec<ClusterNode>,
    #[serde(default)]
    pub cluster_status: Option<ClusterStatus>,
}

/// GET /ha/node/{id}/complete-data
pub async fn complete_data(gateway: &Gateway, node_id: u64) -> Result<CompleteData, GatewayError> {
    gateway.get(&format!("/ha/node/{}/complete-data", node_id)).await
}
