// Written by Paul Clevett
// (C)Copyright Wolf Software Systems Ltd
// https://wolf.uk.com

use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::api::auth::{Realm, User};
use crate::error::StorageError;
use crate::storage::{ACCESS_TOKEN_KEY, KeyValueStore, USER_KEY};

/// Point-in-time view of the session
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    pub credential: Option<String>,
    pub user: Option<User>,
    pub is_authenticated: bool,
    pub realms: Vec<Realm>,
}

/// In-memory mirror of the durable session keys.
///
/// This is the only writer of `access_token` and `user`. The gateway reads
/// the credential from here and clears it on a 401; the session store
/// writes it on login. `is_authenticated` always equals
/// `credential.is_some()`, and memory is only updated after the durable
/// write succeeded.
pub struct SessionState {
    inner: RwLock<Session>,
    store: Arc<dyn KeyValueStore>,
}

impl SessionState {
    /// Build the state from durable storage. Call once at startup,
    /// before anything issues requests.
    pub fn rehydrate(store: Arc<dyn KeyValueStore>) -> Self {
        let credential = store.get(ACCESS_TOKEN_KEY).filter(|t| !t.is_empty());
        let user = store.get(USER_KEY).and_then(|raw| match serde_json::from_str::<User>(&raw) {
            Ok(user) => Some(user),
            Err(e) => {
                warn!("Ignoring unreadable stored user profile: {}", e);
                None
            }
        });
        debug!(
            "Session rehydrated (authenticated: {}, user: {})",
            credential.is_some(),
            user.as_ref().map(|u| u.username.as_str()).unwrap_or("-")
        );

        Self {
            inner: RwLock::new(Session {
                is_authenticated: credential.is_some(),
                credential,
                user,
                realms: Vec::new(),
            }),
            store,
        }
    }

    pub fn token(&self) -> Option<String> {
        self.inner.read().credential.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.read().is_authenticated
    }

    pub fn user(&self) -> Option<User> {
        self.inner.read().user.clone()
    }

    pub fn realms(&self) -> Vec<Realm> {
        self.inner.read().realms.clone()
    }

    pub fn snapshot(&self) -> Session {
        self.inner.read().clone()
    }

    /// Install a new credential. The previous user's profile belongs to the
    /// previous credential and is dropped first.
    pub(crate) fn store_credential(&self, token: &str) -> Result<(), StorageError> {
        let mut session = self.inner.write();
        self.store.remove(USER_KEY)?;
        session.user = None;
        self.store.set(ACCESS_TOKEN_KEY, token)?;
        session.credential = Some(token.to_string());
        session.is_authenticated = true;
        Ok(())
    }

    pub(crate) fn store_user(&self, user: &User) -> Result<(), StorageError> {
        let json = serde_json::to_string(user)?;
        let mut session = self.inner.write();
        self.store.set(USER_KEY, &json)?;
        session.user = Some(user.clone());
        Ok(())
    }

    pub(crate) fn set_realms(&self, realms: Vec<Realm>) {
        self.inner.write().realms = realms;
    }

    /// Drop credential and user from memory and from durable storage.
    /// Realms are not session-bound and survive.
    ///
    /// Each key leaves memory only once it is gone from storage. On error
    /// whatever could not be removed is still held, on disk and here.
    pub fn clear(&self) -> Result<(), StorageError> {
        let mut session = self.inner.write();
        if let Err(e) = self.store.remove(ACCESS_TOKEN_KEY) {
            error!("Failed to remove '{}' from session storage: {}", ACCESS_TOKEN_KEY, e);
            return Err(e);
        }
        session.credential = None;
        session.is_authenticated = false;

        if let Err(e) = self.store.remove(USER_KEY) {
            error!("Failed to remove '{}' from session storage: {}", USER_KEY, e);
            return Err(e);
        }
        session.user = None;
        Ok(())
    }
}
