// Written by Paul Clevett
// (C)Copyright Wolf Software Systems Ltd
// https://wolf.uk.com

//! Load-balancer endpoints
//!
//! Analysis and execution results are produced by the balancing engine on
//! the backend and are passed through as JSON objects; only the envelope
//! is checked here.

use serde::{Deserialize, Serialize};

use crate::error::GatewayError;
use crate::gateway::{Gateway, RequestOptions};

type Object = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BalancerConfig {
    /// What the operator saved
    #[serde(default)]
    pub saved: Object,
    /// Saved values merged over the engine defaults
    #[serde(default)]
    pub effective: Object,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ConfigUpdate {
    pub status: String,
    #[serde(default)]
    pub config: Object,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationRecord {
    pub id: u64,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub vmid: Option<u64>,
    #[serde(default)]
    pub source_node: Option<String>,
    #[serde(default)]
    pub target_node: Option<String>,
    #[serde(flatten)]
    pub extra: Object,
}

#[derive(Serialize)]
struct ExecuteRequest<'a> {
    dry_run: bool,
    config: Option<&'a Object>,
}

fn cluster_scope(cluster_id: Option<u64>) -> RequestOptions {
    match cluster_id {
        Some(id) => RequestOptions::default().with_query("cluster_id", id),
        None => RequestOptions::default(),
    }
}

/// GET /load-balancer/analyze
pub async fn analyze(gateway: &Gateway, cluster_id: Option<u64>) -> Result<Object, GatewayError> {
    gateway.get_with("/load-balancer/analyze", cluster_scope(cluster_id)).await
}

/// POST /load-balancer/execute
pub async fn execute(
    gateway: &Gateway,
    dry_run: bool,
    config: Option<&Object>,
    cluster_id: Option<u64>,
) -> Result<Object, GatewayError> {
    gateway
        .post_with("/load-balancer/execute", &ExecuteRequest { dry_run, config }, cluster_scope(cluster_id))
        .await
}

/// GET /load-balancer/config
pub async fn config(gateway: &Gateway) -> Result<BalancerConfig, GatewayError> {
    gateway.get("/load-balancer/config").await
}

/// POST /load-balancer/config
pub async fn update_config(gateway: &Gateway, config: &Object) -> Result<ConfigUpdate, GatewayError> {
    gateway.post("/load-balancer/config", config).await
}

/// GET /load-balancer/migrations?limit=&status=
pub async fn migrations(gateway: &Gateway, limit: u32, status: Option<&str>) -> Result<Vec<MigrationRecord>, GatewayError> {
    let mut options = RequestOptions::default().with_query("limit", limit);
    if let Some(status) = status {
        options = options.with_query("status", status);
    }
    gateway.get_with("/load-balancer/migrations", options).await
}

/// GET /load-balancer/migrations/{id}
pub async fn migration(gateway: &Gateway, id: u64) -> Result<MigrationRecord, GatewayError> {
    gateway.get(&format!("/load-balancer/migrations/{}", id)).await
}
