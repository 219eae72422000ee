use crate::events::{ClientEvent, RequestInfo, SharedEventBroadcaster};
use crate::{AtlasError, Result};
use http_client::{HttpClient, Request};
use http_types::{Method, Url};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A request that can be sent any number of times.
///
/// Queued provider calls and retried authenticated calls rebuild the underlying
/// [`http_types::Request`] from this on every attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub url: Url,
    /// JSON body, for POST requests
    pub body: Option<String>,
}

impl ApiRequest {
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::Get,
            url,
            body: None,
        }
    }

    pub fn post(url: Url, body: Option<String>) -> Self {
        Self {
            method: Method::Post,
            url,
            body,
        }
    }

    pub fn path(&self) -> &str {
        self.url.path()
    }
}

/// A fully read response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    /// Parsed `Retry-After` header (delta-seconds form only)
    pub retry_after: Option<Duration>,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Thin wrapper over the host supplied [`HttpClient`].
///
/// Resolves paths against the application origin, attaches JSON headers and an optional
/// bearer token, reads the whole body and reports each exchange on the event broadcaster.
/// Status codes are not interpreted here.
#[derive(Clone)]
pub struct Transport {
    client: Arc<dyn HttpClient + Send + Sync>,
    origin: Url,
    broadcaster: Arc<SharedEventBroadcaster>,
}

impl Transport {
    pub fn new(
        client: Arc<dyn HttpClient + Send + Sync>,
        origin: &str,
        broadcaster: Arc<SharedEventBroadcaster>,
    ) -> Result<Self> {
        let origin = Url::parse(origin)
            .map_err(|e| AtlasError::Config(format!("invalid origin {origin:?}: {e}")))?;
        Ok(Self {
            client,
            origin,
            broadcaster,
        })
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    pub fn broadcaster(&self) -> &Arc<SharedEventBroadcaster> {
        &self.broadcaster
    }

    /// Resolve `path` against the origin and append `params` as an encoded query string.
    pub fn url(&self, path: &str, params: &[(&str, String)]) -> Result<Url> {
        let mut url = self
            .origin
            .join(path)
            .map_err(|e| AtlasError::Config(format!("invalid path {path:?}: {e}")))?;
        if !params.is_empty() {
            let mut query = url.query_pairs_mut();
            for (key, value) in params {
                query.append_pair(key, value);
            }
        }
        Ok(url)
    }

    /// Send `request` once.
    ///
    /// Fails only when no response was received or its body could not be read.
    pub async fn execute(&self, request: &ApiRequest, bearer: Option<&str>) -> Result<HttpResponse> {
        let request_info =
            RequestInfo::from_url_and_method(&request.url, &request.method.to_string());
        let request_start = Instant::now();

        self.broadcaster.broadcast_event(ClientEvent::RequestStarted {
            request: request_info.clone(),
        });
        log::debug!("{}", request_info.short_description());

        let mut http_request = Request::new(request.method, request.url.clone());
        http_request.insert_header("Accept", "application/json");
        if let Some(token) = bearer {
            http_request.insert_header("Authorization", format!("Bearer {token}"));
        }
        if let Some(body) = &request.body {
            http_request.insert_header("Content-Type", "application/json");
            http_request.set_body(body.as_str());
        }

        let mut response = self
            .client
            .send(http_request)
            .await
            .map_err(|e| AtlasError::transport(e.to_string()))?;

        let status: u16 = response.status().into();
        self.broadcaster.broadcast_event(ClientEvent::RequestCompleted {
            request: request_info,
            status_code: status,
            duration_ms: request_start.elapsed().as_millis() as u64,
        });

        let retry_after = response
            .header("retry-after")
            .and_then(|h| h.get(0))
            .and_then(|v| v.as_str().trim().parse::<u64>().ok())
            .map(Duration::from_secs);

        let body = response.body_string().await.map_err(|e| AtlasError::Transport {
            status: Some(status),
            message: format!("failed to read body: {e}"),
        })?;

        Ok(HttpResponse {
            status,
            retry_after,
            body,
        })
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("origin", &self.origin.as_str())
            .finish()
    }
}
