//! Single-flight credential refresh.
//!
//! Any number of callers may hit a 401 at the same moment; the [`RefreshGate`] turns all of
//! them into one call to the refresh endpoint and hands every caller the same outcome.

use crate::config::{AuthConfig, AuthMode};
use crate::events::{ClientEvent, SharedEventBroadcaster};
use crate::token_store::{AuthTokens, TokenStore};
use crate::transport::{ApiRequest, Transport};
use crate::{AtlasError, Result};
use async_trait::async_trait;
use chrono::Utc;
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Performs one credential refresh against the backend.
#[cfg_attr(feature = "mock", mockall::automock)]
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    /// Obtain fresh credentials, storing them wherever the authenticated calls read them.
    async fn refresh(&self) -> Result<()>;
}

/// Settled result of one refresh, shared by every waiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    Refreshed,
    Failed(String),
}

impl RefreshOutcome {
    pub fn is_refreshed(&self) -> bool {
        matches!(self, RefreshOutcome::Refreshed)
    }
}

type SharedRefresh = Shared<BoxFuture<'static, RefreshOutcome>>;

enum GateState {
    Idle,
    Authenticating(SharedRefresh),
}

struct GateInner {
    refresher: Arc<dyn TokenRefresher>,
    state: Mutex<GateState>,
    broadcaster: Arc<SharedEventBroadcaster>,
}

/// Coordinates credential refreshes so that at most one is in flight.
///
/// The refresh itself runs on a spawned task; callers only hold a handle to its result, so a
/// caller that gives up early cannot leave the gate stuck in the authenticating state.
#[derive(Clone)]
pub struct RefreshGate {
    inner: Arc<GateInner>,
}

impl RefreshGate {
    pub fn new(refresher: Arc<dyn TokenRefresher>, broadcaster: Arc<SharedEventBroadcaster>) -> Self {
        Self {
            inner: Arc::new(GateInner {
                refresher,
                state: Mutex::new(GateState::Idle),
                broadcaster,
            }),
        }
    }

    /// Join the refresh in flight, or start one if there is none.
    pub async fn refresh(&self) -> RefreshOutcome {
        let pending = {
            let mut state = self.inner.state();
            match &*state {
                GateState::Authenticating(pending) => {
                    log::debug!("Refresh already in flight, waiting for it");
                    pending.clone()
                }
                GateState::Idle => {
                    let inner = Arc::clone(&self.inner);
                    let task = tokio::spawn(async move { inner.run().await });
                    let pending = async move {
                        task.await.unwrap_or_else(|e| {
                            RefreshOutcome::Failed(format!("refresh task aborted: {e}"))
                        })
                    }
                    .boxed()
                    .shared();
                    *state = GateState::Authenticating(pending.clone());
                    pending
                }
            }
        };
        pending.await
    }

    pub fn is_authenticating(&self) -> bool {
        matches!(*self.inner.state(), GateState::Authenticating(_))
    }
}

impl GateInner {
    fn state(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn run(&self) -> RefreshOutcome {
        log::info!("Refreshing credentials");
        self.broadcaster.broadcast_event(ClientEvent::RefreshStarted {
            timestamp: Utc::now(),
        });

        let outcome = match self.refresher.refresh().await {
            Ok(()) => RefreshOutcome::Refreshed,
            Err(e) => RefreshOutcome::Failed(e.to_string()),
        };

        // Cleared before any waiter resumes, so a 401 seen after this point starts a new refresh.
        *self.state() = GateState::Idle;

        if let RefreshOutcome::Failed(reason) = &outcome {
            log::warn!("Credential refresh failed: {reason}");
            self.broadcaster.broadcast_event(ClientEvent::SessionExpired {
                reason: reason.clone(),
                timestamp: Utc::now(),
            });
        }
        outcome
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshBody<'a> {
    refresh_token: &'a str,
}

/// Refreshes against `POST {refresh_path}`.
///
/// In cookie mode the transport carries the refresh cookie and the response body is ignored.
/// In token mode the stored refresh token is posted and the returned pair replaces it.
pub struct HttpRefresher {
    transport: Transport,
    config: AuthConfig,
    store: Arc<dyn TokenStore>,
}

impl HttpRefresher {
    pub fn new(transport: Transport, config: AuthConfig, store: Arc<dyn TokenStore>) -> Self {
        Self {
            transport,
            config,
            store,
        }
    }
}

#[async_trait]
impl TokenRefresher for HttpRefresher {
    async fn refresh(&self) -> Result<()> {
        let url = self.transport.url(&self.config.refresh_path, &[])?;

        let body = match self.config.mode {
            AuthMode::Cookie => None,
            AuthMode::Token => {
                let tokens = self.store.load()?.ok_or_else(|| {
                    AtlasError::SessionExpired("no refresh token stored".to_string())
                })?;
                Some(serde_json::to_string(&RefreshBody {
                    refresh_token: &tokens.refresh_token,
                })?)
            }
        };

        let response = self
            .transport
            .execute(&ApiRequest::post(url, body), None)
            .await?;

        if response.status == 401 || response.status == 403 {
            return Err(AtlasError::Unauthorized(format!(
                "refresh rejected with status {}",
                response.status
            )));
        }
        if !response.is_success() {
            return Err(AtlasError::Transport {
                status: Some(response.status),
                message: "refresh failed".to_string(),
            });
        }

        if self.config.mode == AuthMode::Token {
            let tokens: AuthTokens = serde_json::from_str(&response.body)?;
            self.store.save(&tokens)?;
        }
        log::debug!("Credentials refreshed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct CountingRefresher {
        calls: AtomicUsize,
        succeed: bool,
    }

    impl CountingRefresher {
        fn new(succeed: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                succeed,
            })
        }
    }

    #[async_trait]
    impl TokenRefresher for CountingRefresher {
        async fn refresh(&self) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            if self.succeed {
                Ok(())
            } else {
                Err(AtlasError::Unauthorized("refresh token revoked".to_string()))
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_share_one_refresh() {
        let refresher = CountingRefresher::new(true);
        let gate = RefreshGate::new(refresher.clone(), Arc::new(SharedEventBroadcaster::new()));

        let outcomes = futures::future::join_all((0..5).map(|_| gate.refresh())).await;

        assert!(outcomes.iter().all(RefreshOutcome::is_refreshed));
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
        assert!(!gate.is_authenticating());
    }

    #[tokio::test(start_paused = true)]
    async fn test_gate_resets_after_settling() {
        let refresher = CountingRefresher::new(true);
        let gate = RefreshGate::new(refresher.clone(), Arc::new(SharedEventBroadcaster::new()));

        assert!(gate.refresh().await.is_refreshed());
        assert!(gate.refresh().await.is_refreshed());
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_emits_one_session_expired_event() {
        let refresher = CountingRefresher::new(false);
        let broadcaster = Arc::new(SharedEventBroadcaster::new());
        let mut events = broadcaster.subscribe();
        let gate = RefreshGate::new(refresher.clone(), broadcaster);

        let outcomes = futures::future::join_all((0..3).map(|_| gate.refresh())).await;
        for outcome in &outcomes {
            assert!(matches!(outcome, RefreshOutcome::Failed(reason) if reason.contains("revoked")));
        }
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);

        let mut expired = 0;
        while let Ok(event) = events.try_recv() {
            if matches!(event, ClientEvent::SessionExpired { .. }) {
                expired += 1;
            }
        }
        assert_eq!(expired, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_waiter_does_not_strand_gate() {
        let refresher = CountingRefresher::new(true);
        let gate = RefreshGate::new(refresher.clone(), Arc::new(SharedEventBroadcaster::new()));

        let abandoned = tokio::time::timeout(Duration::from_millis(10), gate.refresh()).await;
        assert!(abandoned.is_err());
        assert!(gate.is_authenticating());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!gate.is_authenticating());
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
    }
}
