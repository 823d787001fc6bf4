// Written by Paul Clevett
// (C)Copyright Wolf Software Systems Ltd
// https://wolf.uk.com

//! Interceptor stages run by the gateway around every dispatch

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderValue};
use std::sync::Arc;
use tracing::warn;

use super::navigation::Navigator;
use super::transport::RawResponse;
use super::ApiRequest;
use crate::session::SessionState;

/// Runs before dispatch and may rewrite the outgoing request
pub trait RequestStage: Send + Sync {
    fn name(&self) -> &'static str;
    fn apply(&self, request: &mut ApiRequest);
}

/// Runs after a response arrives, before it is classified.
/// Transport failures never reach response stages.
pub trait ResponseStage: Send + Sync {
    fn name(&self) -> &'static str;
    fn inspect(&self, request: &mut ApiRequest, response: &RawResponse);
}

pub struct JsonContentType;

impl RequestStage for JsonContentType {
    fn name(&self) -> &'static str { "json-content-type" }

    fn apply(&self, request: &mut ApiRequest) {
        request.headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    }
}

/// Attaches `Authorization: Bearer <token>` whenever the session holds a credential
pub struct BearerAuth {
    session: Arc<SessionState>,
}

impl BearerAuth {
    pub fn new(session: Arc<SessionState>) -> Self {
        Self { session }
    }
}

impl RequestStage for BearerAuth {
    fn name(&self) -> &'static str { "bearer-auth" }

    fn apply(&self, request: &mut ApiRequest) {
        if request.options.public {
            return;
        }
        let Some(token) = self.session.token() else { return };
        match HeaderValue::from_str(&format!("Bearer {}", token)) {
            Ok(mut value) => {
                value.set_sensitive(true);
                request.headers.insert(AUTHORIZATION, value);
            }
            Err(_) => warn!("Stored credential is not a valid header value; sending {} unauthenticated", request.path),
        }
    }
}

/// Turns a 401 into a global logout and a redirect to the login view.
///
/// The request is marked retried first, so the same request replayed on an
/// already-expired credential cannot trigger a second logout.
pub struct SessionExpiry {
    session: Arc<SessionState>,
    navigator: Arc<Navigator>,
    login_route: String,
}

impl SessionExpiry {
    pub fn new(session: Arc<SessionState>, navigator: Arc<Navigator>, login_route: &str) -> Self {
        Self { session, navigator, login_route: login_route.to_string() }
    }
}

impl ResponseStage for SessionExpiry {
    fn name(&self) -> &'static str { "session-expiry" }

    fn inspect(&self, request: &mut ApiRequest, response: &RawResponse) {
        if response.status != 401 || request.options.retried || request.options.public {
            return;
        }
        request.options.retried = true;
        warn!("{} {} answered 401, clearing session", request.method, request.path);
        if let Err(e) = self.session.clear() {
            warn!("Session only partly cleared, credential may still be on disk: {}", e);
        }
        self.navigator.navigate(&self.login_route);
    }
}
