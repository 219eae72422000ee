//! Per-provider request scheduling with adaptive backoff.
//!
//! A [`RequestQueue`] admits calls in FIFO order, keeps at most `max_concurrent` of them in
//! flight, waits a courtesy delay after each settled call, and reacts to a rate-limit signal by
//! pausing the whole queue and putting the throttled call back at the front.

use crate::config::{QueueConfig, MAX_RETRY_AFTER};
use crate::events::{ClientEvent, SharedEventBroadcaster};
use crate::transport::HttpResponse;
use crate::types::Provider;
use crate::{AtlasError, Result};
use chrono::Utc;
use futures::future::{BoxFuture, FutureExt};
use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;

type Work<T> = Arc<dyn Fn() -> BoxFuture<'static, Result<T>> + Send + Sync>;

/// A unit of work owned by the queue until it settles.
///
/// `work` is called again every time the provider throttles it, so it must build its request
/// from scratch on each call.
struct Task<T> {
    seq: u64,
    work: Work<T>,
    completion: oneshot::Sender<Result<T>>,
}

struct QueueState<T> {
    queued: VecDeque<Task<T>>,
    active: usize,
    paused_until: Option<Instant>,
    next_seq: u64,
}

/// Point-in-time view of a queue, for diagnostics and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueSnapshot {
    /// Calls waiting for a slot
    pub queued: usize,
    /// Calls currently running
    pub active: usize,
    /// Whether dispatch is suspended by a rate limit
    pub paused: bool,
}

struct QueueInner<T> {
    provider: Provider,
    config: QueueConfig,
    state: Mutex<QueueState<T>>,
    broadcaster: Arc<SharedEventBroadcaster>,
}

/// Concurrency-bounded FIFO scheduler for one provider.
///
/// Cloning is cheap and shares the same queue.
///
/// # Examples
///
/// ```rust,no_run
/// use artist_atlas::{HttpResponse, Provider, QueueConfig, RequestQueue};
/// use std::time::Duration;
///
/// # async fn example() -> artist_atlas::Result<()> {
/// let queue: RequestQueue<HttpResponse> =
///     RequestQueue::new(Provider::Deezer, QueueConfig::new(2, Duration::from_millis(100)));
///
/// let response = queue
///     .enqueue(|| async {
///         Ok(HttpResponse { status: 200, retry_after: None, body: "{}".to_string() })
///     })
///     .await?;
/// assert_eq!(response.status, 200);
/// # Ok(())
/// # }
/// ```
pub struct RequestQueue<T = HttpResponse> {
    inner: Arc<QueueInner<T>>,
}

impl<T> Clone for RequestQueue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send + 'static> RequestQueue<T> {
    pub fn new(provider: Provider, config: QueueConfig) -> Self {
        Self::with_broadcaster(provider, config, Arc::new(SharedEventBroadcaster::new()))
    }

    pub fn with_broadcaster(
        provider: Provider,
        mut config: QueueConfig,
        broadcaster: Arc<SharedEventBroadcaster>,
    ) -> Self {
        config.max_concurrent = config.max_concurrent.max(1);
        Self {
            inner: Arc::new(QueueInner {
                provider,
                config,
                state: Mutex::new(QueueState {
                    queued: VecDeque::new(),
                    active: 0,
                    paused_until: None,
                    next_seq: 0,
                }),
                broadcaster,
            }),
        }
    }

    /// Queue `work` and return a handle to its outcome.
    ///
    /// The call takes its place in line immediately, whether or not the returned future is
    /// polled. A rate-limited outcome never comes back from here: the call is re-run after the
    /// pause, as many times as the provider keeps throttling it. Resolves to
    /// [`AtlasError::Cancelled`] if the call is flushed before it starts.
    pub fn enqueue<F, Fut>(&self, work: F) -> impl Future<Output = Result<T>> + Send + 'static
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let work: Work<T> = Arc::new(move || work().boxed());
        let (completion, outcome) = oneshot::channel();
        {
            let mut state = self.inner.state();
            let seq = state.next_seq;
            state.next_seq += 1;
            state.queued.push_back(Task {
                seq,
                work,
                completion,
            });
        }
        self.inner.dispatch();

        async move { outcome.await.unwrap_or(Err(AtlasError::Cancelled)) }
    }

    /// Cancel every call that has not been dispatched yet.
    ///
    /// Running calls are left alone. Returns how many calls were cancelled.
    pub fn flush(&self) -> usize {
        let cancelled: Vec<Task<T>> = self.inner.state().queued.drain(..).collect();
        let count = cancelled.len();
        for task in cancelled {
            let _ = task.completion.send(Err(AtlasError::Cancelled));
        }
        if count > 0 {
            log::info!("{} queue flushed, {count} queued calls cancelled", self.inner.provider);
            self.inner.broadcaster.broadcast_event(ClientEvent::QueueFlushed {
                provider: self.inner.provider,
                cancelled: count,
            });
        }
        count
    }

    /// Queued plus in-flight calls.
    pub fn pending(&self) -> usize {
        let state = self.inner.state();
        state.queued.len() + state.active
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        let state = self.inner.state();
        QueueSnapshot {
            queued: state.queued.len(),
            active: state.active,
            paused: state.paused_until.is_some(),
        }
    }

    /// Suspend dispatch for `delay`, exactly as a rate-limit signal would.
    pub fn pause_for(&self, delay: Duration) {
        self.inner.pause(delay);
    }

    pub fn provider(&self) -> Provider {
        self.inner.provider
    }

    pub fn config(&self) -> &QueueConfig {
        &self.inner.config
    }
}

impl<T: Send + 'static> QueueInner<T> {
    fn state(&self) -> MutexGuard<'_, QueueState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start as many queued calls as the limits allow.
    fn dispatch(self: &Arc<Self>) {
        let mut state = self.state();
        while state.paused_until.is_none() && state.active < self.config.max_concurrent {
            let Some(task) = state.queued.pop_front() else {
                break;
            };
            state.active += 1;
            let inner = Arc::clone(self);
            tokio::spawn(async move { inner.run(task).await });
        }
    }

    async fn run(self: Arc<Self>, task: Task<T>) {
        let outcome = (task.work)().await;

        match outcome {
            Err(AtlasError::RateLimited { retry_after }) => {
                let delay = retry_after
                    .unwrap_or(self.config.default_retry_after)
                    .min(MAX_RETRY_AFTER);
                let until = Instant::now() + delay;
                let extended = {
                    // Slot release, requeue and pause happen under one lock so no other
                    // dispatch can slip in between them.
                    let mut state = self.state();
                    state.active -= 1;
                    let position = state
                        .queued
                        .iter()
                        .position(|queued| queued.seq > task.seq)
                        .unwrap_or(state.queued.len());
                    state.queued.insert(position, task);
                    Self::extend_pause(&mut state, until)
                };
                log::warn!(
                    "{} rate limited, pausing queue for {}ms",
                    self.provider,
                    delay.as_millis()
                );
                if extended {
                    self.schedule_resume(delay, until);
                }
            }
            outcome => {
                self.state().active -= 1;
                let _ = task.completion.send(outcome);
                tokio::time::sleep(self.config.inter_dispatch_delay).await;
                self.dispatch();
            }
        }
    }

    fn pause(self: &Arc<Self>, delay: Duration) {
        let delay = delay.min(MAX_RETRY_AFTER);
        let until = Instant::now() + delay;
        if Self::extend_pause(&mut self.state(), until) {
            self.schedule_resume(delay, until);
        }
    }

    /// Move the pause deadline out to `until`. A shorter pause never cuts a longer one short.
    fn extend_pause(state: &mut QueueState<T>, until: Instant) -> bool {
        if state.paused_until.is_some_and(|current| current >= until) {
            return false;
        }
        state.paused_until = Some(until);
        true
    }

    fn schedule_resume(self: &Arc<Self>, delay: Duration, until: Instant) {
        self.broadcaster.broadcast_event(ClientEvent::RateLimited {
            provider: self.provider,
            delay_ms: delay.as_millis() as u64,
            timestamp: Utc::now(),
        });

        let inner = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep_until(until).await;
            inner.resume(until);
        });
    }

    fn resume(self: &Arc<Self>, deadline: Instant) {
        {
            let mut state = self.state();
            // A later rate limit extended the pause; its own timer will resume.
            if state.paused_until != Some(deadline) {
                return;
            }
            state.paused_until = None;
        }
        log::debug!("{} queue resumed", self.provider);
        self.dispatch();
    }
}
