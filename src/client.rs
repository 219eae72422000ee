use crate::auth::AuthenticatedClient;
use crate::config::{AtlasConfig, AuthMode};
use crate::events::{ClientEvent, ClientEventReceiver, ClientEventWatcher, SharedEventBroadcaster};
use crate::providers::deezer::DeezerClient;
use crate::providers::lastfm::LastFmClient;
use crate::refresh::{HttpRefresher, RefreshGate, TokenRefresher};
use crate::token_store::{FileTokenStore, MemoryTokenStore, TokenStore};
use crate::transport::Transport;
use crate::Result;
use http_client::HttpClient;
use std::sync::Arc;

/// Entry point bundling both provider clients and the authenticated app client.
///
/// All parts share one transport and one event broadcaster, so a single subscription sees
/// requests, rate-limit pauses and session expiry from every component.
///
/// # Examples
///
/// ```rust,no_run
/// use artist_atlas::{AtlasClient, AtlasConfig, Result};
///
/// #[tokio::main]
/// async fn main() -> Result<()> {
///     let http_client = http_client::native::NativeClient::new();
///     let client = AtlasClient::new(Box::new(http_client), AtlasConfig::from_env())?;
///
///     for similar in client.lastfm().get_similar_artists("Boris", 10).await {
///         if let Some(artist) = client.deezer().find_artist_by_name(&similar.artist.name).await {
///             println!("{} -> {}", similar.artist.name, artist.external_url);
///         }
///     }
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct AtlasClient {
    config: AtlasConfig,
    broadcaster: Arc<SharedEventBroadcaster>,
    token_store: Arc<dyn TokenStore>,
    lastfm: LastFmClient,
    deezer: DeezerClient,
    auth: AuthenticatedClient,
}

impl AtlasClient {
    /// Create a client whose token store follows `config.auth`.
    ///
    /// Token mode keeps tokens in `config.auth.token_file`, or the XDG data directory when
    /// unset. Cookie mode needs no store and gets an empty in-memory one.
    pub fn new(client: Box<dyn HttpClient + Send + Sync>, config: AtlasConfig) -> Result<Self> {
        let token_store: Arc<dyn TokenStore> = match (config.auth.mode, &config.auth.token_file) {
            (AuthMode::Cookie, _) => Arc::new(MemoryTokenStore::new()),
            (AuthMode::Token, Some(path)) => Arc::new(FileTokenStore::new(path)),
            (AuthMode::Token, None) => Arc::new(FileTokenStore::in_data_dir()?),
        };
        Self::with_token_store(client, config, token_store)
    }

    pub fn with_token_store(
        client: Box<dyn HttpClient + Send + Sync>,
        config: AtlasConfig,
        token_store: Arc<dyn TokenStore>,
    ) -> Result<Self> {
        let broadcaster = Arc::new(SharedEventBroadcaster::new());
        let transport = Transport::new(Arc::from(client), &config.origin, broadcaster.clone())?;
        let refresher = Arc::new(HttpRefresher::new(
            transport.clone(),
            config.auth.clone(),
            token_store.clone(),
        ));
        Ok(Self::assemble(
            config,
            broadcaster,
            transport,
            token_store,
            refresher,
        ))
    }

    /// Like [`with_token_store`](Self::with_token_store) with a custom refresh procedure.
    pub fn with_refresher(
        client: Box<dyn HttpClient + Send + Sync>,
        config: AtlasConfig,
        token_store: Arc<dyn TokenStore>,
        refresher: Arc<dyn TokenRefresher>,
    ) -> Result<Self> {
        let broadcaster = Arc::new(SharedEventBroadcaster::new());
        let transport = Transport::new(Arc::from(client), &config.origin, broadcaster.clone())?;
        Ok(Self::assemble(
            config,
            broadcaster,
            transport,
            token_store,
            refresher,
        ))
    }

    fn assemble(
        config: AtlasConfig,
        broadcaster: Arc<SharedEventBroadcaster>,
        transport: Transport,
        token_store: Arc<dyn TokenStore>,
        refresher: Arc<dyn TokenRefresher>,
    ) -> Self {
        let lastfm = LastFmClient::new(&config.lastfm, transport.clone(), broadcaster.clone());
        let deezer = DeezerClient::with_matching(
            &config.deezer,
            &config.enrichment,
            config.matching.clone(),
            transport.clone(),
            broadcaster.clone(),
        );
        let gate = RefreshGate::new(refresher, broadcaster.clone());
        let auth = AuthenticatedClient::new(
            transport,
            config.auth.clone(),
            token_store.clone(),
            gate,
        );

        Self {
            config,
            broadcaster,
            token_store,
            lastfm,
            deezer,
            auth,
        }
    }

    pub fn lastfm(&self) -> &LastFmClient {
        &self.lastfm
    }

    pub fn deezer(&self) -> &DeezerClient {
        &self.deezer
    }

    pub fn auth(&self) -> &AuthenticatedClient {
        &self.auth
    }

    pub fn config(&self) -> &AtlasConfig {
        &self.config
    }

    pub fn token_store(&self) -> &Arc<dyn TokenStore> {
        &self.token_store
    }

    /// Cancel every provider call that has not been dispatched yet.
    pub fn flush_queues(&self) -> usize {
        self.lastfm.channel().queue().flush() + self.deezer.channel().queue().flush()
    }

    pub fn subscribe(&self) -> ClientEventReceiver {
        self.broadcaster.subscribe()
    }

    pub fn watch(&self) -> ClientEventWatcher {
        self.broadcaster.watch()
    }

    pub fn latest_event(&self) -> Option<ClientEvent> {
        self.broadcaster.latest_event()
    }
}
