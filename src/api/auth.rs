// Written by Paul Clevett
// (C)Copyright Wolf Software Systems Ltd
// https://wolf.uk.com

//! Authentication service endpoints

use serde::{Deserialize, Serialize};

use crate::error::GatewayError;
use crate::gateway::{Gateway, RequestOptions};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role.as_deref() == Some("admin")
    }
}

/// Authentication realm offered on the login screen (`pam`, `pve`, ...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RealmWire")]
pub struct Realm {
    pub realm: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// Some backends list realms as bare names
#[derive(Deserialize)]
#[serde(untagged)]
enum RealmWire {
    Name(String),
    Full {
        realm: String,
        #[serde(rename = "type", default)]
        kind: Option<String>,
        #[serde(default)]
        comment: Option<String>,
    },
}

impl From<RealmWire> for Realm {
    fn from(wire: RealmWire) -> Self {
        match wire {
            RealmWire::Name(realm) => Realm { realm, kind: None, comment: None },
            RealmWire::Full { realm, kind, comment } => Realm { realm, kind, comment },
        }
    }
}

#[derive(Clone, Serialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub realm: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"********")
            .field("realm", &self.realm)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default)]
    pub user: Option<User>,
}

fn default_token_type() -> String { "bearer".to_string() }

#[derive(Serialize)]
struct PasswordChange<'a> {
    current_password: &'a str,
    new_password: &'a str,
}

/// POST /auth/login. Sent without a credential, so a 401 here means bad credentials
pub async fn login(gateway: &Gateway, credentials: &Credentials) -> Result<LoginResponse, GatewayError> {
    let resp: LoginResponse = gateway
        .post_with("/auth/login", credentials, RequestOptions::public())
        .await
        .map_err(|e| match e {
            GatewayError::AuthExpired => GatewayError::Client { status: 401, message: "invalid credentials".into() },
            other => other,
        })?;
    if resp.access_token.is_empty() {
        return Err(GatewayError::Malformed("login response carries an empty access_token".into()));
    }
    Ok(resp)
}

/// GET /auth/me
pub async fn me(gateway: &Gateway) -> Result<User, GatewayError> {
    gateway.get("/auth/me").await
}

/// GET /auth/realms
pub async fn realms(gateway: &Gateway) -> Result<Vec<Realm>, GatewayError> {
    gateway.get("/auth/realms").await
}

/// PUT /auth/me/password
pub async fn change_password(gateway: &Gateway, current: &str, new: &str) -> Result<(), GatewayError> {
    let _: serde_json::Value = gateway
        .put("/auth/me/password", &PasswordChange { current_password: current, new_password: new })
        .await?;
    Ok(())
}
