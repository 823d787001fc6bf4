// Written by Paul Clevett
// (C)Copyright Wolf Software Systems Ltd
// https://wolf.uk.com

//! Node inventory

use serde::{Deserialize, Serialize};

use crate::error::GatewayError;
use crate::gateway::Gateway;

/// A managed host: a Proxmox VE node or a Proxmox Backup Server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub is_online: bool,
    #[serde(default)]
    pub node_type: Option<String>,      // "pve" or "pbs"
    #[serde(default)]
    pub storage_type: Option<String>,   // "zfs" or "btrfs"
    #[serde(default)]
    pub vm_count: Option<u32>,
    #[serde(default)]
    pub running_vm_count: Option<u32>,
    #[serde(default)]
    pub proxmox_version: Option<String>,
}

impl Node {
    pub fn is_backup_server(&self) -> bool {
        self.node_type.as_deref() == Some("pbs")
    }
}

/// GET /nodes/
pub async fn list_nodes(gateway: &Gateway) -> Result<Vec<Node>, GatewayError> {
    gateway.get("/nodes/").await
}
