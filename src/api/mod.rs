// Written by Paul Clevett
// (C)Copyright Wolf Software Systems Ltd
// https://wolf.uk.com

//! Typed wrappers over the management API
//!
//! Each wrapper is one request through the [`Gateway`](crate::gateway::Gateway).
//! Payloads are parsed into explicit shapes here, at the boundary; a
//! response that does not fit is a `GatewayError::Malformed`.

pub mod auth;
pub mod ha;
pub mod load_balancer;
pub mod nodes;

use serde::{Deserialize, Deserializer};

/// The backend is loose about ids: `"100"` and `100` both occur
pub(crate) fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Int(i64),
        Float(f64),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Text(s) => s,
        Id::Int(n) => n.to_string(),
        Id::Float(f) => f.to_string(),
    })
}

/// `null` and missing both become the type's default
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
