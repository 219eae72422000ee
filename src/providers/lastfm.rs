use super::{
    clamp_limit, entries, field, filter_tags, lenient_f64, lenient_i64, lenient_string,
    lenient_u64, non_blank, non_empty, ProviderChannel, MAX_LIMIT, MAX_TAG_LIMIT,
};
use crate::config::ProviderConfig;
use crate::events::SharedEventBroadcaster;
use crate::transport::Transport;
use crate::types::{ArtistRecord, Provider, SimilarArtist, Tag, TrackRecord};
use crate::Result;
use serde::Deserialize;
use std::sync::Arc;

/// Last.fm serves this star image when it has no picture for an artist.
const PLACEHOLDER_IMAGE: &str = "2a96cbd8b46e442fc41c2b86b821562f";

#[derive(Debug, Deserialize)]
struct LastFmImage {
    #[serde(rename = "#text", default)]
    url: String,
    #[serde(default)]
    size: String,
}

#[derive(Debug, Default, Deserialize)]
struct LastFmStats {
    #[serde(default, deserialize_with = "lenient_u64")]
    listeners: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct LastFmArtist {
    name: String,
    #[serde(default)]
    mbid: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    image: Vec<LastFmImage>,
    #[serde(default, deserialize_with = "lenient_u64")]
    listeners: Option<u64>,
    #[serde(default)]
    stats: Option<LastFmStats>,
    /// Similarity score, only present in similar-artist listings
    #[serde(default, rename = "match", deserialize_with = "lenient_f64")]
    similarity: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct LastFmTrackArtist {
    name: String,
    #[serde(default)]
    mbid: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LastFmTrack {
    name: String,
    #[serde(default)]
    mbid: Option<String>,
    #[serde(default)]
    url: Option<String>,
    /// Seconds
    #[serde(default, deserialize_with = "lenient_u64")]
    duration: Option<u64>,
    #[serde(default)]
    image: Vec<LastFmImage>,
    artist: Option<LastFmTrackArtist>,
}

#[derive(Debug, Deserialize)]
struct LastFmTag {
    #[serde(deserialize_with = "lenient_string")]
    name: String,
    #[serde(default, deserialize_with = "lenient_i64")]
    count: Option<i64>,
}

fn pick_image(images: &[LastFmImage], sizes: &[&str]) -> Option<String> {
    sizes.iter().find_map(|size| {
        images
            .iter()
            .find(|image| image.size == *size)
            .map(|image| image.url.clone())
            .filter(|url| !url.trim().is_empty() && !url.contains(PLACEHOLDER_IMAGE))
    })
}

fn mbid_or(mbid: Option<String>, fallback: &str) -> String {
    non_blank(mbid).unwrap_or_else(|| fallback.to_string())
}

impl LastFmArtist {
    fn into_record(self) -> ArtistRecord {
        ArtistRecord {
            id: mbid_or(self.mbid, &self.name),
            image_url: pick_image(&self.image, &["large", "medium", "extralarge"]),
            image_large_url: pick_image(&self.image, &["mega", "extralarge", "large"]),
            fan_count: self
                .listeners
                .or_else(|| self.stats.and_then(|stats| stats.listeners)),
            external_url: non_blank(self.url).unwrap_or_default(),
            name: self.name,
            provider: Provider::LastFm,
        }
    }
}

impl LastFmTrack {
    fn into_record(self, seed_artist: &str) -> TrackRecord {
        let (artist_name, artist_id) = match self.artist {
            Some(artist) => {
                let id = mbid_or(artist.mbid, &artist.name);
                (artist.name, id)
            }
            None => (seed_artist.to_string(), seed_artist.to_string()),
        };
        TrackRecord {
            id: mbid_or(self.mbid, &format!("{artist_name} - {}", self.name)),
            preview_url: None,
            duration_ms: self.duration.unwrap_or(0).saturating_mul(1000),
            album_name: String::new(),
            album_image_url: pick_image(&self.image, &["large", "medium", "extralarge"]),
            artist_name,
            artist_id,
            external_url: non_blank(self.url).unwrap_or_default(),
            name: self.name,
        }
    }
}

/// Client for the similarity/tag provider proxy.
///
/// Every operation makes at most one queued request and never fails: errors are logged at
/// warn level and come back as an empty list or `None`.
#[derive(Clone)]
pub struct LastFmClient {
    channel: ProviderChannel,
}

impl LastFmClient {
    pub fn new(
        config: &ProviderConfig,
        transport: Transport,
        broadcaster: Arc<SharedEventBroadcaster>,
    ) -> Self {
        Self {
            channel: ProviderChannel::new(Provider::LastFm, config, transport, broadcaster),
        }
    }

    pub fn channel(&self) -> &ProviderChannel {
        &self.channel
    }

    pub async fn search_artists(&self, query: &str, limit: u32) -> Vec<ArtistRecord> {
        let Some(query) = non_empty(query) else {
            return Vec::new();
        };
        let params = [
            ("q", query.to_string()),
            ("limit", clamp_limit(limit, MAX_LIMIT).to_string()),
        ];

        let result: Result<Vec<LastFmArtist>> = async {
            let mut body = self.channel.fetch("search", &params).await?;
            entries(&mut body, "matches")
        }
        .await;

        match result {
            Ok(artists) => artists.into_iter().map(LastFmArtist::into_record).collect(),
            Err(e) => {
                log::warn!("Last.fm artist search for {query:?} failed: {e}");
                Vec::new()
            }
        }
    }

    pub async fn get_artist(&self, name: &str) -> Option<ArtistRecord> {
        let name = non_empty(name)?;
        let params = [("name", name.to_string())];

        let result: Result<Option<LastFmArtist>> = async {
            let mut body = self.channel.fetch("artist", &params).await?;
            field(&mut body, "artist")
        }
        .await;

        match result {
            Ok(artist) => artist.map(LastFmArtist::into_record),
            Err(e) => {
                log::warn!("Last.fm artist lookup for {name:?} failed: {e}");
                None
            }
        }
    }

    pub async fn get_similar_artists(&self, name: &str, limit: u32) -> Vec<SimilarArtist> {
        let Some(name) = non_empty(name) else {
            return Vec::new();
        };
        let params = [
            ("name", name.to_string()),
            ("limit", clamp_limit(limit, MAX_LIMIT).to_string()),
        ];

        let result: Result<Vec<LastFmArtist>> = async {
            let mut body = self.channel.fetch("similar", &params).await?;
            entries(&mut body, "related")
        }
        .await;

        match result {
            Ok(artists) => artists
                .into_iter()
                .map(|artist| {
                    let similarity = artist.similarity.unwrap_or(0.0).clamp(0.0, 1.0);
                    SimilarArtist {
                        artist: artist.into_record(),
                        similarity,
                    }
                })
                .collect(),
            Err(e) => {
                log::warn!("Last.fm similar artists for {name:?} failed: {e}");
                Vec::new()
            }
        }
    }

    pub async fn get_top_tracks(&self, name: &str, limit: u32) -> Vec<TrackRecord> {
        let Some(name) = non_empty(name) else {
            return Vec::new();
        };
        let params = [
            ("name", name.to_string()),
            ("limit", clamp_limit(limit, MAX_LIMIT).to_string()),
        ];

        let result: Result<Vec<LastFmTrack>> = async {
            let mut body = self.channel.fetch("top-tracks", &params).await?;
            entries(&mut body, "top")
        }
        .await;

        match result {
            Ok(tracks) => tracks
                .into_iter()
                .map(|track| track.into_record(name))
                .collect(),
            Err(e) => {
                log::warn!("Last.fm top tracks for {name:?} failed: {e}");
                Vec::new()
            }
        }
    }

    /// Genre-like tags for an artist, noise terms removed.
    pub async fn get_tags(&self, name: &str, limit: u32) -> Vec<Tag> {
        let Some(name) = non_empty(name) else {
            return Vec::new();
        };
        let limit = clamp_limit(limit, MAX_TAG_LIMIT);
        let params = [("name", name.to_string()), ("limit", limit.to_string())];

        let result: Result<Vec<LastFmTag>> = async {
            let mut body = self.channel.fetch("tags", &params).await?;
            entries(&mut body, "tags")
        }
        .await;

        match result {
            Ok(tags) => filter_tags(tags.into_iter().map(|tag| (tag.name, tag.count)), limit),
            Err(e) => {
                log::warn!("Last.fm tags for {name:?} failed: {e}");
                Vec::new()
            }
        }
    }
}
