//! Domain records shared by both providers.
//!
//! Every record is built once from a provider response and never mutated afterwards;
//! callers clone them freely.

use serde::{Deserialize, Serialize};
use std::fmt;

// ================================================================================================
// PROVIDERS
// ================================================================================================

/// The upstream catalog a record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// The similarity/tag provider.
    LastFm,
    /// The catalog/media provider.
    Deezer,
}

impl Provider {
    /// Body error codes this provider uses to signal throttling.
    ///
    /// Last.fm answers code 29 ("Rate limit exceeded"), Deezer code 4 ("Quota limit exceeded").
    pub fn is_throttling_code(self, code: i64) -> bool {
        match self {
            Provider::LastFm => code == 29,
            Provider::Deezer => code == 4,
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::LastFm => write!(f, "lastfm"),
            Provider::Deezer => write!(f, "deezer"),
        }
    }
}

// ================================================================================================
// ARTISTS AND TRACKS
// ================================================================================================

/// An artist as reported by one provider.
///
/// # Examples
///
/// ```rust
/// use artist_atlas::{ArtistRecord, Provider};
///
/// let artist = ArtistRecord {
///     id: "1".to_string(),
///     name: "Boris".to_string(),
///     image_url: None,
///     image_large_url: None,
///     fan_count: Some(120_000),
///     external_url: "https://www.deezer.com/artist/1".to_string(),
///     provider: Provider::Deezer,
/// };
/// assert_eq!(artist.provider, Provider::Deezer);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtistRecord {
    /// Provider specific identifier (Deezer numeric id, Last.fm MBID or name)
    pub id: String,
    /// Display name as the provider spells it
    pub name: String,
    /// Medium sized picture
    pub image_url: Option<String>,
    /// Largest picture the provider offers
    pub image_large_url: Option<String>,
    /// Fans (Deezer) or listeners (Last.fm), when reported
    pub fan_count: Option<u64>,
    /// Public page for the artist
    pub external_url: String,
    /// Which catalog this record came from
    pub provider: Provider,
}

/// A track, usually from an artist's top-tracks listing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackRecord {
    pub id: String,
    pub name: String,
    /// 30 second preview clip (Deezer only)
    pub preview_url: Option<String>,
    /// Zero when the provider does not report a duration
    pub duration_ms: u64,
    /// Empty when the provider does not report an album
    pub album_name: String,
    pub album_image_url: Option<String>,
    pub artist_name: String,
    pub artist_id: String,
    pub external_url: String,
}

/// An artist related to a seed artist by the similarity provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimilarArtist {
    pub artist: ArtistRecord,
    /// Similarity score in `0.0..=1.0`
    pub similarity: f64,
}

/// A folksonomy tag that survived genre filtering.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tag {
    /// Lowercased, trimmed tag text
    pub name: String,
    /// Usage count, when the provider reports one
    pub count: Option<u64>,
}
