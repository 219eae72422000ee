pub mod auth;
pub mod catalog;
pub mod client;
pub mod config;
pub mod enrich;
pub mod error;
pub mod events;
pub mod match_cache;
pub mod normalize;
pub mod providers;
pub mod queue;
pub mod refresh;
pub mod token_store;
pub mod transport;
pub mod types;

pub use auth::AuthenticatedClient;
pub use catalog::CatalogSearch;
pub use client::AtlasClient;
pub use config::{
    AtlasConfig, AuthConfig, AuthMode, EnrichmentConfig, ProviderConfig, QueueConfig,
    DEFAULT_RETRY_AFTER, MAX_RETRY_AFTER,
};
pub use enrich::{EnrichedArtists, EnrichmentCoordinator};
pub use error::{AtlasError, ErrorKind};
pub use events::{
    ClientEvent, ClientEventReceiver, ClientEventWatcher, RequestInfo, SharedEventBroadcaster,
};
pub use match_cache::{ArtistMatcher, MatchCache, MatchEntry, MatchKind, MatchPolicy};
pub use normalize::normalize_name;
pub use providers::deezer::DeezerClient;
pub use providers::lastfm::LastFmClient;
pub use queue::{QueueSnapshot, RequestQueue};
pub use refresh::{HttpRefresher, RefreshGate, RefreshOutcome, TokenRefresher};
pub use token_store::{AuthTokens, FileTokenStore, MemoryTokenStore, TokenStore};
pub use transport::{ApiRequest, HttpResponse, Transport};
pub use types::{ArtistRecord, Provider, SimilarArtist, Tag, TrackRecord};

#[cfg(feature = "mock")]
pub use catalog::MockCatalogSearch;
#[cfg(feature = "mock")]
pub use refresh::MockTokenRefresher;

pub type Result<T> = std::result::Result<T, AtlasError>;
