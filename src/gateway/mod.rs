// Written by Paul Clevett
// (C)Copyright Wolf Software Systems Ltd
// https://wolf.uk.com

//! Request Gateway — every call to the management API goes through here
//!
//! A request passes an ordered list of request stages (content type,
//! credential), is dispatched by a [`Transport`], then passes an ordered
//! list of response stages (session expiry) before being classified into
//! success or a [`GatewayError`]. Status codes are never interpreted beyond
//! that classification; callers decide what a 404 or a 500 means to them.

use reqwest::header::HeaderMap;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::GatewayError;
use crate::session::SessionState;

pub mod navigation;
pub mod stages;
pub mod transport;

#[cfg(test)]
pub(crate) mod mock;

pub use navigation::{Navigation, Navigator};
pub use stages::{BearerAuth, JsonContentType, RequestStage, ResponseStage, SessionExpiry};
pub use transport::{HttpTransport, RawResponse, Transport, TransportError};

/// Per-request flags
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestOptions {
    /// Already went through 401 handling once
    pub retried: bool,
    /// Sent without a credential and exempt from 401 handling (login)
    pub public: bool,
    pub query: Vec<(String, String)>,
}

impl RequestOptions {
    pub fn public() -> Self {
        Self { public: true, ..Self::default() }
    }

    pub fn with_query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }
}

#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub id: Uuid,
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub body: Option<serde_json::Value>,
    pub options: RequestOptions,
}

impl ApiRequest {
    pub fn new(method: Method, path: &str, body: Option<serde_json::Value>, options: RequestOptions) -> Self {
        Self {
            id: Uuid::new_v4(),
            method,
            path: path.to_string(),
            headers: HeaderMap::new(),
            body,
            options,
        }
    }
}

/// A 2xx response
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl ApiResponse {
    /// Parse the body into `T`. An empty body parses as JSON `null`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, GatewayError> {
        let value: serde_json::Value = if self.body.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&self.body)
                .map_err(|e| GatewayError::Malformed(format!("body is not JSON: {}", e)))?
        };
        serde_json::from_value(value)
            .map_err(|e| GatewayError::Malformed(format!("unexpected shape: {}", e)))
    }
}

pub struct Gateway {
    transport: Arc<dyn Transport>,
    request_stages: Vec<Arc<dyn RequestStage>>,
    response_stages: Vec<Arc<dyn ResponseStage>>,
}

impl Gateway {
    /// Bare gateway with no stages
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            request_stages: Vec::new(),
            response_stages: Vec::new(),
        }
    }

    /// Gateway with the standard pipeline: JSON content type, bearer credential, 401 handling
    pub fn standard(
        transport: Arc<dyn Transport>,
        session: Arc<SessionState>,
        navigator: Arc<Navigator>,
        login_route: &str,
    ) -> Self {
        Self::new(transport)
            .with_request_stage(Arc::new(JsonContentType))
            .with_request_stage(Arc::new(BearerAuth::new(session.clone())))
            .with_response_stage(Arc::new(SessionExpiry::new(session, navigator, login_route)))
    }

    pub fn with_request_stage(mut self, stage: Arc<dyn RequestStage>) -> Self {
        self.request_stages.push(stage);
        self
    }

    pub fn with_response_stage(mut self, stage: Arc<dyn ResponseStage>) -> Self {
        self.response_stages.push(stage);
        self
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.request_stages.iter().map(|s| s.name())
            .chain(self.response_stages.iter().map(|s| s.name()))
            .collect()
    }

    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
        options: RequestOptions,
    ) -> Result<ApiResponse, GatewayError> {
        let mut request = ApiRequest::new(method, path, body, options);
        self.send(&mut request).await
    }

    /// Dispatch an existing request. Flags set by stages (the retried
    /// marker) stay on `request`, so sending it again is a replay.
    pub async fn send(&self, request: &mut ApiRequest) -> Result<ApiResponse, GatewayError> {
        for stage in &self.request_stages {
            stage.apply(request);
        }

        debug!("Dispatch {} {} [{}]", request.method, request.path, request.id);
        let raw = match self.transport.send(request).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("{} {} failed without a response: {}", request.method, request.path, e);
                return Err(GatewayError::Transport(e.0));
            }
        };

        for stage in &self.response_stages {
            stage.inspect(request, &raw);
        }

        classify(raw)
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, GatewayError> {
        self.get_with(path, RequestOptions::default()).await
    }

    pub async fn get_with<T: DeserializeOwned>(&self, path: &str, options: RequestOptions) -> Result<T, GatewayError> {
        self.request(Method::GET, path, None, options).await?.json()
    }

    pub async fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T, GatewayError> {
        self.post_with(path, body, RequestOptions::default()).await
    }

    pub async fn post_with<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        options: RequestOptions,
    ) -> Result<T, GatewayError> {
        let body = encode(body)?;
        self.request(Method::POST, path, Some(body), options).await?.json()
    }

    pub async fn put<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T, GatewayError> {
        let body = encode(body)?;
        self.request(Method::PUT, path, Some(body), RequestOptions::default()).await?.json()
    }

    pub async fn delete(&self, path: &str) -> Result<ApiResponse, GatewayError> {
        self.request(Method::DELETE, path, None, RequestOptions::default()).await
    }
}

fn encode<B: Serialize>(body: &B) -> Result<serde_json::Value, GatewayError> {
    serde_json::to_value(body)
        .map_err(|e| GatewayError::Malformed(format!("cannot encode request body: {}", e)))
}

fn classify(raw: RawResponse) -> Result<ApiResponse, GatewayError> {
    let status = raw.status;
    if raw.is_success() {
        return Ok(ApiResponse { status, body: raw.body });
    }
    if status == 401 {
        return Err(GatewayError::AuthExpired);
    }
    let message = error_message(&raw);
    if (500..600).contains(&status) {
        Err(GatewayError::Server { status, message })
    } else {
        Err(GatewayError::Client { status, message })
    }
}

/// Backend errors come as `{"detail": ...}`; fall back to `{"error": ...}`, then the reason phrase
fn error_message(raw: &RawResponse) -> String {
    if let Ok(json) = serde_json::from_slice::<serde_json::Value>(&raw.body) {
        for key in ["detail", "error", "message"] {
            match json.get(key) {
                Some(serde_json::Value::String(s)) => return s.clone(),
                Some(other) if !other.is_null() => return other.to_string(),
                _ => {}
            }
        }
    }
    reqwest::StatusCode::from_u16(raw.status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("unknown status")
        .to_string()
}
