// Written by Paul Clevett
// (C)Copyright Wolf Software Systems Ltd
// https://wolf.uk.com

//! Session Store — authentication lifecycle for the panel
//!
//! - Logs in against the authentication service and persists the credential
//! - Fetches and caches the current user's profile
//! - Lists the realms offered on the login screen
//! - Logs out, clearing memory and durable storage
//!
//! Navigation is left to the caller. The only automatic redirect happens in
//! the gateway when a request comes back 401.

use std::sync::Arc;
use tracing::{info, warn};

use crate::api::auth::{self, Credentials, Realm, User};
use crate::error::{GatewayError, SessionError};
use crate::gateway::Gateway;

mod state;

pub use state::{Session, SessionState};

pub struct SessionStore {
    state: Arc<SessionState>,
    gateway: Arc<Gateway>,
}

impl SessionStore {
    pub fn new(state: Arc<SessionState>, gateway: Arc<Gateway>) -> Self {
        Self { state, gateway }
    }

    pub fn state(&self) -> &Arc<SessionState> {
        &self.state
    }

    pub fn session(&self) -> Session {
        self.state.snapshot()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.is_authenticated()
    }

    pub fn user(&self) -> Option<User> {
        self.state.user()
    }

    pub fn realms(&self) -> Vec<Realm> {
        self.state.realms()
    }

    /// Authenticate and load the user profile.
    ///
    /// A refused or failed login leaves the existing session untouched. Once
    /// the credential is stored, a profile fetch that fails for any reason
    /// other than a rejected credential falls back to the user embedded in
    /// the login response, if there was one.
    pub async fn login(&self, credentials: &Credentials) -> Result<Session, SessionError> {
        let resp = auth::login(&self.gateway, credentials).await.map_err(|e| {
            warn!("Login failed for user '{}': {}", credentials.username, e);
            SessionError::Login(e)
        })?;

        self.state.store_credential(&resp.access_token)?;
        info!("Logged in as '{}' ({})", credentials.username, credentials.realm);

        match self.fetch_user().await {
            Ok(_) => {}
            Err(SessionError::Profile(e)) => match &resp.user {
                Some(user) => {
                    warn!("Profile fetch failed ({}), using the user from the login response", e);
                    self.state.store_user(user)?;
                }
                None => warn!("Logged in but the profile is not available yet: {}", e),
            },
            Err(e) => return Err(e),
        }
        Ok(self.state.snapshot())
    }

    /// Load the current user's profile.
    ///
    /// Only a 401 ends the session; any other failure is returned as
    /// [`SessionError::Profile`] and can be retried.
    pub async fn fetch_user(&self) -> Result<User, SessionError> {
        match auth::me(&self.gateway).await {
            Ok(user) => {
                self.state.store_user(&user)?;
                Ok(user)
            }
            Err(GatewayError::AuthExpired) => {
                if let Err(e) = self.logout() {
                    warn!("Logout after rejected credential failed: {}", e);
                }
                Err(SessionError::CredentialRejected)
            }
            Err(e) => {
                warn!("Failed to fetch user profile: {}", e);
                Err(SessionError::Profile(e))
            }
        }
    }

    /// Best effort: on failure the previous realm list stays
    pub async fn fetch_realms(&self) -> Vec<Realm> {
        match auth::realms(&self.gateway).await {
            Ok(realms) => {
                self.state.set_realms(realms.clone());
                realms
            }
            Err(e) => {
                warn!("Failed to fetch realms: {}", e);
                self.state.realms()
            }
        }
    }

    pub async fn change_password(&self, current: &str, new: &str) -> Result<(), SessionError> {
        auth::change_password(&self.gateway, current, new).await?;
        info!("Password changed");
        Ok(())
    }

    /// Fails only when durable storage cannot be updated; the session then
    /// still holds whatever is still on disk.
    pub fn logout(&self) -> Result<(), SessionError> {
        if let Some(user) = self.state.user() {
            info!("Logging out '{}'", user.username);
        }
        self.state.clear()?;
        Ok(())
    }
}
