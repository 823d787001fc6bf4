// Written by Paul Clevett
// (C)Copyright Wolf Software Systems Ltd
// https://wolf.uk.com

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::info;

/// A request to move the front end to another view
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Navigation {
    pub route: String,
}

/// Global navigation bus. Front ends subscribe and follow the routes
/// published here; the gateway publishes the login route on expiry.
pub struct Navigator {
    tx: broadcast::Sender<Navigation>,
    history: Mutex<Vec<Navigation>>,
}

impl Navigator {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(16);
        Self { tx, history: Mutex::new(Vec::new()) }
    }

    pub fn navigate(&self, route: &str) {
        info!("Navigating to {}", route);
        let nav = Navigation { route: route.to_string() };
        self.history.lock().push(nav.clone());
        // Nobody listening is fine, history still records it
        let _ = self.tx.send(nav);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Navigation> {
        self.tx.subscribe()
    }

    pub fn history(&self) -> Vec<Navigation> {
        self.history.lock().clone()
    }

    /// How many times `route` has been requested
    pub fn count(&self, route: &str) -> usize {
        self.history.lock().iter().filter(|n| n.route == route).count()
    }
}

impl Default for Navigator {
    fn default() -> Self {
        Self::new()
    }
}
