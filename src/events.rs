//! # Client Events
//!
//! Broadcast channel system for observing request, throttling and session activity.
//! The session-expired notification is delivered here: the UI subscribes once and forces a
//! logout when it sees [`ClientEvent::SessionExpired`].

use crate::types::Provider;
use chrono::{DateTime, Utc};
use http_types::Url;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};

/// Request information for client events
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestInfo {
    /// The HTTP method (GET, POST, etc.)
    pub method: String,
    /// Path without query parameters
    pub path: String,
    /// Query parameters as key-value pairs
    pub query_params: Vec<(String, String)>,
}

impl RequestInfo {
    pub fn from_url_and_method(url: &Url, method: &str) -> Self {
        Self {
            method: method.to_string(),
            path: url.path().to_string(),
            query_params: url
                .query_pairs()
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect(),
        }
    }

    /// Get a short description of the request for logging
    pub fn short_description(&self) -> String {
        let mut desc = format!("{} {}", self.method, self.path);
        if !self.query_params.is_empty() {
            let params: Vec<String> = self
                .query_params
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect();
            if params.len() <= 2 {
                desc.push_str(&format!("?{}", params.join("&")));
            } else {
                desc.push_str(&format!("?{}...", params[0]));
            }
        }
        desc
    }
}

/// Event type to describe client activity
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ClientEvent {
    /// Request handed to the transport
    RequestStarted {
        /// Request details
        request: RequestInfo,
    },
    /// Transport returned a response (any status)
    RequestCompleted {
        /// Request details
        request: RequestInfo,
        /// HTTP status code
        status_code: u16,
        /// Duration of the request in milliseconds
        duration_ms: u64,
    },
    /// A provider queue paused after a throttling signal
    RateLimited {
        /// Queue owner
        provider: Provider,
        /// Pause length in milliseconds
        delay_ms: u64,
        /// When the pause started
        timestamp: DateTime<Utc>,
    },
    /// Queued calls were cancelled by a flush
    QueueFlushed {
        provider: Provider,
        /// Number of cancelled calls
        cancelled: usize,
    },
    /// A credential refresh started after a 401
    RefreshStarted {
        timestamp: DateTime<Utc>,
    },
    /// Credential refresh failed; the user has to log in again
    SessionExpired {
        /// Why the refresh failed
        reason: String,
        timestamp: DateTime<Utc>,
    },
}

/// Type alias for the broadcast receiver
pub type ClientEventReceiver = broadcast::Receiver<ClientEvent>;

/// Type alias for the watch receiver
pub type ClientEventWatcher = watch::Receiver<Option<ClientEvent>>;

/// Shared event broadcasting state handed to every component of one client
#[derive(Clone)]
pub struct SharedEventBroadcaster {
    event_tx: broadcast::Sender<ClientEvent>,
    last_event_tx: watch::Sender<Option<ClientEvent>>,
}

impl SharedEventBroadcaster {
    /// Create a new shared event broadcaster
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(100);
        let (last_event_tx, _) = watch::channel(None);

        Self {
            event_tx,
            last_event_tx,
        }
    }

    /// Broadcast an event to all subscribers
    pub fn broadcast_event(&self, event: ClientEvent) {
        let _ = self.event_tx.send(event.clone());
        // Stores the value even when nobody is watching.
        self.last_event_tx.send_replace(Some(event));
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> ClientEventReceiver {
        self.event_tx.subscribe()
    }

    /// Watch only the most recent event
    pub fn watch(&self) -> ClientEventWatcher {
        self.last_event_tx.subscribe()
    }

    /// Get the latest event
    pub fn latest_event(&self) -> Option<ClientEvent> {
        self.last_event_tx.borrow().clone()
    }
}

impl Default for SharedEventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SharedEventBroadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedEventBroadcaster")
            .field("subscribers", &self.event_tx.receiver_count())
            .finish()
    }
}
