//! Client configuration.
//!
//! Every struct has a `Default` tuned for the public proxies and `with_*` builder methods
//! for overrides. [`AtlasConfig::from_env`] layers environment overrides on top of the
//! defaults for the CLI.

use crate::match_cache::MatchPolicy;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Pause applied after a 429 that carried no `Retry-After`.
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(2);

/// Longest pause a queue will honor, whatever the provider asks for.
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(60 * 60);

/// Dispatch limits for one provider's [`RequestQueue`](crate::RequestQueue).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    /// Maximum calls in flight at once (at least 1)
    pub max_concurrent: usize,
    /// Courtesy delay before the next dispatch after a call settles
    pub inter_dispatch_delay: Duration,
    /// Pause used when a rate limit signal has no retry-after
    pub default_retry_after: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 4,
            inter_dispatch_delay: Duration::from_millis(100),
            default_retry_after: DEFAULT_RETRY_AFTER,
        }
    }
}

impl QueueConfig {
    pub fn new(max_concurrent: usize, inter_dispatch_delay: Duration) -> Self {
        Self {
            max_concurrent: max_concurrent.max(1),
            inter_dispatch_delay,
            ..Default::default()
        }
    }

    /// Last.fm asks for no more than five requests per second per client.
    pub fn lastfm() -> Self {
        Self::new(2, Duration::from_millis(200))
    }

    /// Deezer allows 50 requests per 5 seconds.
    pub fn deezer() -> Self {
        Self::new(5, Duration::from_millis(100))
    }

    pub fn with_default_retry_after(mut self, delay: Duration) -> Self {
        self.default_retry_after = delay;
        self
    }
}

/// Where a provider proxy lives and how hard to drive it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    /// Path prefix of the proxy on the application origin, e.g. `/api/deezer`
    pub base_path: String,
    pub queue: QueueConfig,
}

impl ProviderConfig {
    pub fn lastfm() -> Self {
        Self {
            base_path: "/api/lastfm".to_string(),
            queue: QueueConfig::lastfm(),
        }
    }

    pub fn deezer() -> Self {
        Self {
            base_path: "/api/deezer".to_string(),
            queue: QueueConfig::deezer(),
        }
    }

    pub fn with_base_path(mut self, base_path: impl Into<String>) -> Self {
        self.base_path = base_path.into();
        self
    }

    pub fn with_queue(mut self, queue: QueueConfig) -> Self {
        self.queue = queue;
        self
    }
}

/// How authenticated calls carry credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// Same-origin cookies handled by the transport
    Cookie,
    /// Bearer access token plus a stored refresh token
    Token,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthConfig {
    pub mode: AuthMode,
    /// Refresh endpoint path
    pub refresh_path: String,
    /// Calls under this prefix never trigger a refresh
    pub auth_path_prefix: String,
    /// Where [`FileTokenStore`](crate::FileTokenStore) keeps tokens; `None` uses the XDG data dir
    pub token_file: Option<PathBuf>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            mode: AuthMode::Cookie,
            refresh_path: "/api/auth/refresh".to_string(),
            auth_path_prefix: "/api/auth/".to_string(),
            token_file: None,
        }
    }
}

impl AuthConfig {
    pub fn token() -> Self {
        Self {
            mode: AuthMode::Token,
            ..Default::default()
        }
    }

    pub fn with_token_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.token_file = Some(path.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichmentConfig {
    /// Lookups in flight per batch
    pub batch_size: usize,
    /// Candidates requested per name lookup
    pub search_limit: u32,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            search_limit: 5,
        }
    }
}

impl EnrichmentConfig {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_search_limit(mut self, search_limit: u32) -> Self {
        self.search_limit = search_limit.max(1);
        self
    }
}

/// Unified configuration for an [`AtlasClient`](crate::AtlasClient).
#[derive(Debug, Clone, PartialEq)]
pub struct AtlasConfig {
    /// Scheme and host the proxies are served from, e.g. `http://localhost:3000`
    pub origin: String,
    pub lastfm: ProviderConfig,
    pub deezer: ProviderConfig,
    pub auth: AuthConfig,
    pub enrichment: EnrichmentConfig,
    pub matching: MatchPolicy,
}

impl Default for AtlasConfig {
    fn default() -> Self {
        Self {
            origin: "http://localhost:3000".to_string(),
            lastfm: ProviderConfig::lastfm(),
            deezer: ProviderConfig::deezer(),
            auth: AuthConfig::default(),
            enrichment: EnrichmentConfig::default(),
            matching: MatchPolicy::default(),
        }
    }
}

impl AtlasConfig {
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            ..Default::default()
        }
    }

    /// Defaults overridden by `ATLAS_*` environment variables.
    ///
    /// Recognized: `ATLAS_BASE_URL`, `ATLAS_LASTFM_BASE`, `ATLAS_DEEZER_BASE`,
    /// `ATLAS_AUTH_MODE` (`cookie` or `token`), `ATLAS_TOKEN_FILE`, `ATLAS_BATCH_SIZE`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(origin) = env::var("ATLAS_BASE_URL") {
            config.origin = origin;
        }
        if let Ok(base) = env::var("ATLAS_LASTFM_BASE") {
            config.lastfm.base_path = base;
        }
        if let Ok(base) = env::var("ATLAS_DEEZER_BASE") {
            config.deezer.base_path = base;
        }
        if env::var("ATLAS_AUTH_MODE").is_ok_and(|mode| mode.eq_ignore_ascii_case("token")) {
            config.auth.mode = AuthMode::Token;
        }
        if let Ok(path) = env::var("ATLAS_TOKEN_FILE") {
            config.auth.token_file = Some(PathBuf::from(path));
        }
        if let Some(batch_size) = env::var("ATLAS_BATCH_SIZE")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
        {
            config.enrichment = config.enrichment.with_batch_size(batch_size);
        }
        config
    }

    pub fn with_lastfm(mut self, lastfm: ProviderConfig) -> Self {
        self.lastfm = lastfm;
        self
    }

    pub fn with_deezer(mut self, deezer: ProviderConfig) -> Self {
        self.deezer = deezer;
        self
    }

    pub fn with_auth(mut self, auth: AuthConfig) -> Self {
        self.auth = auth;
        self
    }

    pub fn with_enrichment(mut self, enrichment: EnrichmentConfig) -> Self {
        self.enrichment = enrichment;
        self
    }

    pub fn with_match_policy(mut self, matching: MatchPolicy) -> Self {
        self.matching = matching;
        self
    }
}
