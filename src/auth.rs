use crate::config::{AuthConfig, AuthMode};
use crate::refresh::{RefreshGate, RefreshOutcome};
use crate::token_store::TokenStore;
use crate::transport::{ApiRequest, HttpResponse, Transport};
use crate::{AtlasError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

/// Client for the application's own authenticated JSON endpoints.
///
/// A 401 on any call outside the auth endpoints goes through the shared [`RefreshGate`]; once
/// the refresh succeeds the call is retried exactly once. When the refresh fails the call
/// returns [`AtlasError::SessionExpired`] and the gate has already broadcast
/// [`ClientEvent::SessionExpired`](crate::ClientEvent::SessionExpired).
#[derive(Clone)]
pub struct AuthenticatedClient {
    transport: Transport,
    config: AuthConfig,
    store: Arc<dyn TokenStore>,
    gate: RefreshGate,
}

impl AuthenticatedClient {
    pub fn new(
        transport: Transport,
        config: AuthConfig,
        store: Arc<dyn TokenStore>,
        gate: RefreshGate,
    ) -> Self {
        Self {
            transport,
            config,
            store,
            gate,
        }
    }

    pub fn gate(&self) -> &RefreshGate {
        &self.gate
    }

    /// Send `request`, recovering from one expired session.
    pub async fn send(&self, request: &ApiRequest) -> Result<HttpResponse> {
        let response = self.attempt(request).await?;
        if response.status != 401 {
            return Ok(response);
        }

        if self.is_auth_endpoint(request) {
            return Err(AtlasError::Unauthorized(format!(
                "{} rejected credentials",
                request.path()
            )));
        }

        log::debug!("401 from {}, refreshing credentials", request.path());
        match self.gate.refresh().await {
            RefreshOutcome::Refreshed => {}
            RefreshOutcome::Failed(reason) => return Err(AtlasError::SessionExpired(reason)),
        }

        let retried = self.attempt(request).await?;
        if retried.status == 401 {
            return Err(AtlasError::Unauthorized(format!(
                "{} still unauthorized after refresh",
                request.path()
            )));
        }
        Ok(retried)
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.transport.url(path, &[])?;
        let response = self.send(&ApiRequest::get(url)).await?;
        decode(response)
    }

    pub async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let url = self.transport.url(path, &[])?;
        let body = serde_json::to_string(body)?;
        let response = self.send(&ApiRequest::post(url, Some(body))).await?;
        decode(response)
    }

    async fn attempt(&self, request: &ApiRequest) -> Result<HttpResponse> {
        let bearer = match self.config.mode {
            AuthMode::Cookie => None,
            AuthMode::Token => self.store.load()?.map(|tokens| tokens.access_token),
        };
        self.transport.execute(request, bearer.as_deref()).await
    }

    fn is_auth_endpoint(&self, request: &ApiRequest) -> bool {
        request.path().starts_with(&self.config.auth_path_prefix)
    }
}

fn decode<T: DeserializeOwned>(response: HttpResponse) -> Result<T> {
    if !response.is_success() {
        return Err(AtlasError::Transport {
            status: Some(response.status),
            message: excerpt(&response.body),
        });
    }
    Ok(serde_json::from_str(&response.body)?)
}

fn excerpt(body: &str) -> String {
    body.chars().take(200).collect()
}
