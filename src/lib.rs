// Written by Paul Clevett
// (C)Copyright Wolf Software Systems Ltd
// https://wolf.uk.com

//! DAPX Panel — client core for the Proxmox datacenter management API
//!
//! - Request gateway: bearer credential, JSON content type, 401 handling
//! - Session store: login, profile, realms, logout over durable storage
//! - Cluster state cache: HA snapshot with staleness window and background refresh
//! - Typed wrappers for the auth, node, HA and load-balancer endpoints

pub mod api;
pub mod cluster;
pub mod config;
pub mod error;
pub mod gateway;
pub mod session;
pub mod storage;

pub use cluster::{CacheOptions, ClusterCache, ClusterSnapshot, FetchOutcome};
pub use config::PanelConfig;
pub use error::{GatewayError, SessionError};
pub use gateway::{Gateway, Navigator};
pub use session::{SessionState, SessionStore};
