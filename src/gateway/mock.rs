// Written by Paul Clevett
// (C)Copyright Wolf Software Systems Ltd
// https://wolf.uk.com

//! Scripted transport for tests
//!
//! Replies are queued per `(method, path)`. The last queued reply for a
//! route is sticky and answers every further request; an unscripted route
//! answers 404.

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Method;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use super::transport::{RawResponse, Transport, TransportError};
use super::ApiRequest;

#[derive(Debug, Clone)]
pub(crate) enum MockReply {
    Respond(RawResponse),
    Fail(String),
    Delayed(Duration, Box<MockReply>),
}

impl MockReply {
    pub(crate) fn json(status: u16, value: serde_json::Value) -> Self {
        MockReply::Respond(RawResponse::json(status, &value))
    }

    pub(crate) fn status(status: u16) -> Self {
        MockReply::Respond(RawResponse::new(status, ""))
    }

    pub(crate) fn raw(status: u16, body: &str) -> Self {
        MockReply::Respond(RawResponse::new(status, body))
    }

    pub(crate) fn fail(message: &str) -> Self {
        MockReply::Fail(message.to_string())
    }

    pub(crate) fn after(self, delay: Duration) -> Self {
        MockReply::Delayed(delay, Box::new(self))
    }
}

#[derive(Default)]
pub(crate) struct MockTransport {
    routes: Mutex<HashMap<(Method, String), VecDeque<MockReply>>>,
    log: Mutex<Vec<ApiRequest>>,
}

impl MockTransport {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn on(&self, method: Method, path: &str, reply: MockReply) {
        self.routes.lock()
            .entry((method, path.to_string()))
            .or_default()
            .push_back(reply);
    }

    /// Drop every queued reply for a route and script a new one
    pub(crate) fn replace(&self, method: Method, path: &str, reply: MockReply) {
        let mut routes = self.routes.lock();
        let queue = routes.entry((method, path.to_string())).or_default();
        queue.clear();
        queue.push_back(reply);
    }

    pub(crate) fn requests(&self) -> Vec<ApiRequest> {
        self.log.lock().clone()
    }

    pub(crate) fn count(&self, method: Method, path: &str) -> usize {
        self.log.lock().iter().filter(|r| r.method == method && r.path == path).count()
    }

    pub(crate) fn total(&self) -> usize {
        self.log.lock().len()
    }

    fn next_reply(&self, request: &ApiRequest) -> MockReply {
        let mut routes = self.routes.lock();
        match routes.get_mut(&(request.method.clone(), request.path.clone())) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or_else(|| MockReply::status(404)),
            Some(queue) => queue.front().cloned().unwrap_or_else(|| MockReply::status(404)),
            None => MockReply::json(404, serde_json::json!({"detail": "Not Found"})),
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: &ApiRequest) -> Result<RawResponse, TransportError> {
        self.log.lock().push(request.clone());
        let mut reply = self.next_reply(request);
        loop {
            match reply {
                MockReply::Respond(raw) => return Ok(raw),
                MockReply::Fail(msg) => return Err(TransportError(msg)),
                MockReply::Delayed(delay, inner) => {
                    tokio::time::sleep(delay).await;
                    reply = *inner;
                }
            }
        }
    }
}
