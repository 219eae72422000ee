use super::{
    clamp_limit, entries, field, lenient_string, lenient_u64, non_blank, non_empty,
    ProviderChannel, MAX_LIMIT,
};
use crate::catalog::CatalogSearch;
use crate::config::{EnrichmentConfig, ProviderConfig};
use crate::enrich::{EnrichedArtists, EnrichmentCoordinator};
use crate::events::SharedEventBroadcaster;
use crate::match_cache::{ArtistMatcher, MatchPolicy};
use crate::transport::Transport;
use crate::types::{ArtistRecord, Provider, TrackRecord};
use crate::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
struct DeezerArtist {
    #[serde(deserialize_with = "lenient_string")]
    id: String,
    name: String,
    #[serde(default)]
    picture_medium: Option<String>,
    #[serde(default)]
    picture_xl: Option<String>,
    #[serde(default, deserialize_with = "lenient_u64")]
    nb_fan: Option<u64>,
    #[serde(default)]
    link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DeezerAlbum {
    #[serde(default)]
    title: String,
    #[serde(default)]
    cover_medium: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DeezerTrackArtist {
    #[serde(default, deserialize_with = "lenient_string")]
    id: String,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct DeezerTrack {
    #[serde(deserialize_with = "lenient_string")]
    id: String,
    title: String,
    #[serde(default)]
    preview: Option<String>,
    /// Seconds
    #[serde(default, deserialize_with = "lenient_u64")]
    duration: Option<u64>,
    #[serde(default)]
    link: Option<String>,
    #[serde(default)]
    album: Option<DeezerAlbum>,
    #[serde(default)]
    artist: Option<DeezerTrackArtist>,
}

impl DeezerArtist {
    fn into_record(self) -> ArtistRecord {
        let external_url = non_blank(self.link)
            .unwrap_or_else(|| format!("https://www.deezer.com/artist/{}", self.id));
        ArtistRecord {
            id: self.id,
            name: self.name,
            image_url: non_blank(self.picture_medium),
            image_large_url: non_blank(self.picture_xl),
            fan_count: self.nb_fan,
            external_url,
            provider: Provider::Deezer,
        }
    }
}

impl DeezerTrack {
    fn into_record(self, seed_artist_id: &str) -> TrackRecord {
        let (album_name, album_image_url) = match self.album {
            Some(album) => (album.title, non_blank(album.cover_medium)),
            None => (String::new(), None),
        };
        let (artist_name, artist_id) = match self.artist {
            Some(artist) if !artist.id.is_empty() => (artist.name, artist.id),
            Some(artist) => (artist.name, seed_artist_id.to_string()),
            None => (String::new(), seed_artist_id.to_string()),
        };
        let external_url = non_blank(self.link)
            .unwrap_or_else(|| format!("https://www.deezer.com/track/{}", self.id));
        TrackRecord {
            id: self.id,
            name: self.title,
            preview_url: non_blank(self.preview),
            duration_ms: self.duration.unwrap_or(0).saturating_mul(1000),
            album_name,
            album_image_url,
            artist_name,
            artist_id,
            external_url,
        }
    }
}

/// Client for the catalog/media provider proxy.
///
/// Besides the plain catalog calls it owns the name matcher used to reconcile artists named by
/// the similarity provider, and the coordinator that resolves whole lists of such names.
/// Clones share the queue and the match cache.
#[derive(Clone)]
pub struct DeezerClient {
    channel: ProviderChannel,
    matcher: Arc<ArtistMatcher>,
    coordinator: EnrichmentCoordinator,
}

impl DeezerClient {
    pub fn new(
        config: &ProviderConfig,
        transport: Transport,
        broadcaster: Arc<SharedEventBroadcaster>,
    ) -> Self {
        Self::with_matching(
            config,
            &EnrichmentConfig::default(),
            MatchPolicy::default(),
            transport,
            broadcaster,
        )
    }

    pub fn with_matching(
        config: &ProviderConfig,
        enrichment: &EnrichmentConfig,
        policy: MatchPolicy,
        transport: Transport,
        broadcaster: Arc<SharedEventBroadcaster>,
    ) -> Self {
        Self {
            channel: ProviderChannel::new(Provider::Deezer, config, transport, broadcaster),
            matcher: Arc::new(ArtistMatcher::new(policy, enrichment.search_limit)),
            coordinator: EnrichmentCoordinator::new(enrichment.batch_size),
        }
    }

    pub fn channel(&self) -> &ProviderChannel {
        &self.channel
    }

    pub fn matcher(&self) -> &ArtistMatcher {
        &self.matcher
    }

    pub async fn search_artists(&self, query: &str, limit: u32) -> Vec<ArtistRecord> {
        let Some(query) = non_empty(query) else {
            return Vec::new();
        };
        let params = [
            ("q", query.to_string()),
            ("limit", clamp_limit(limit, MAX_LIMIT).to_string()),
        ];

        let result: Result<Vec<DeezerArtist>> = async {
            let mut body = self.channel.fetch("search", &params).await?;
            entries(&mut body, "matches")
        }
        .await;

        match result {
            Ok(artists) => artists.into_iter().map(DeezerArtist::into_record).collect(),
            Err(e) => {
                log::warn!("Deezer artist search for {query:?} failed: {e}");
                Vec::new()
            }
        }
    }

    pub async fn get_artist(&self, id: &str) -> Option<ArtistRecord> {
        let id = non_empty(id)?;
        let params = [("id", id.to_string())];

        let result: Result<Option<DeezerArtist>> = async {
            let mut body = self.channel.fetch("artist", &params).await?;
            field(&mut body, "artist")
        }
        .await;

        match result {
            Ok(artist) => artist.map(DeezerArtist::into_record),
            Err(e) => {
                log::warn!("Deezer artist {id} lookup failed: {e}");
                None
            }
        }
    }

    pub async fn get_related_artists(&self, id: &str) -> Vec<ArtistRecord> {
        let Some(id) = non_empty(id) else {
            return Vec::new();
        };
        let params = [("id", id.to_string())];

        let result: Result<Vec<DeezerArtist>> = async {
            let mut body = self.channel.fetch("related", &params).await?;
            entries(&mut body, "related")
        }
        .await;

        match result {
            Ok(artists) => artists.into_iter().map(DeezerArtist::into_record).collect(),
            Err(e) => {
                log::warn!("Deezer related artists for {id} failed: {e}");
                Vec::new()
            }
        }
    }

    pub async fn get_artist_top_tracks(&self, id: &str, limit: u32) -> Vec<TrackRecord> {
        let Some(id) = non_empty(id) else {
            return Vec::new();
        };
        let params = [
            ("id", id.to_string()),
            ("limit", clamp_limit(limit, MAX_LIMIT).to_string()),
        ];

        let result: Result<Vec<DeezerTrack>> = async {
            let mut body = self.channel.fetch("top", &params).await?;
            entries(&mut body, "top")
        }
        .await;

        match result {
            Ok(tracks) => tracks
                .into_iter()
                .map(|track| track.into_record(id))
                .collect(),
            Err(e) => {
                log::warn!("Deezer top tracks for {id} failed: {e}");
                Vec::new()
            }
        }
    }

    /// The catalog artist that `name` most plausibly refers to, or `None`.
    ///
    /// Searches at most once per normalized name until [`clear_cache`](Self::clear_cache).
    pub async fn find_artist_by_name(&self, name: &str) -> Option<ArtistRecord> {
        self.matcher.find(self, name).await
    }

    /// Resolve many names at once; see [`EnrichmentCoordinator::enrich`].
    pub async fn enrich_artists<I>(&self, names: I) -> EnrichedArtists
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        self.coordinator.enrich(&self.matcher, self, names).await
    }

    /// Forget every cached name match, found or absent.
    pub fn clear_cache(&self) {
        log::debug!("Clearing {} cached artist matches", self.matcher.cache().len());
        self.matcher.cache().clear();
    }
}

#[async_trait]
impl CatalogSearch for DeezerClient {
    async fn search_artists(&self, query: &str, limit: u32) -> Vec<ArtistRecord> {
        DeezerClient::search_artists(self, query, limit).await
    }
}
