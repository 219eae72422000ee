//! Batch resolution of many artist names against the catalog.

use crate::catalog::CatalogSearch;
use crate::match_cache::{ArtistMatcher, MatchEntry};
use crate::normalize::normalize_name;
use crate::types::ArtistRecord;
use futures::stream::{FuturesUnordered, StreamExt};
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::{HashMap, HashSet};

/// Normalized name to catalog record, in insertion order.
///
/// Serializes as a JSON object whose keys keep that order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnrichedArtists {
    entries: Vec<(String, ArtistRecord)>,
    index: HashMap<String, usize>,
}

impl EnrichedArtists {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry. The first record stored under a key wins; returns whether it was added.
    pub fn insert(&mut self, key: impl Into<String>, artist: ArtistRecord) -> bool {
        let key = key.into();
        if self.index.contains_key(&key) {
            return false;
        }
        self.index.insert(key.clone(), self.entries.len());
        self.entries.push((key, artist));
        true
    }

    /// Look up by any spelling of the name.
    pub fn get(&self, name: &str) -> Option<&ArtistRecord> {
        let position = self
            .index
            .get(name)
            .or_else(|| self.index.get(&normalize_name(name)))?;
        self.entries.get(*position).map(|(_, artist)| artist)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ArtistRecord)> {
        self.entries.iter().map(|(key, artist)| (key.as_str(), artist))
    }
}

impl IntoIterator for EnrichedArtists {
    type Item = (String, ArtistRecord);
    type IntoIter = std::vec::IntoIter<(String, ArtistRecord)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl Serialize for EnrichedArtists {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, artist) in &self.entries {
            map.serialize_entry(key, artist)?;
        }
        map.end()
    }
}

/// Fans a list of names out to an [`ArtistMatcher`] in bounded batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnrichmentCoordinator {
    batch_size: usize,
}

impl Default for EnrichmentCoordinator {
    fn default() -> Self {
        Self::new(10)
    }
}

impl EnrichmentCoordinator {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Resolve `names`, skipping blanks and duplicates (after normalization).
    ///
    /// Cached names are answered first, in input order, without touching the catalog. The rest
    /// are looked up `batch_size` at a time; each batch finishes before the next starts and its
    /// results are added in completion order. Names without an acceptable match are left out.
    pub async fn enrich<S, I>(&self, matcher: &ArtistMatcher, search: &S, names: I) -> EnrichedArtists
    where
        S: CatalogSearch + ?Sized,
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let mut enriched = EnrichedArtists::new();
        let mut seen = HashSet::new();
        let mut uncached: Vec<(String, String)> = Vec::new();

        for name in names {
            let name = name.as_ref().trim();
            let key = normalize_name(name);
            if key.is_empty() || !seen.insert(key.clone()) {
                continue;
            }
            match matcher.cache().get(&key) {
                Some(MatchEntry::Found(artist)) => {
                    enriched.insert(key, artist);
                }
                Some(MatchEntry::Absent) => {}
                None => uncached.push((key, name.to_string())),
            }
        }

        log::info!(
            "Enriching {} names: {} cached, {} to look up",
            seen.len(),
            enriched.len(),
            uncached.len()
        );

        for batch in uncached.chunks(self.batch_size) {
            let mut lookups: FuturesUnordered<_> = batch
                .iter()
                .map(|(key, name)| async move { (key, matcher.find(search, name).await) })
                .collect();

            while let Some((key, found)) = lookups.next().await {
                if let Some(artist) = found {
                    enriched.insert(key.clone(), artist);
                }
            }
        }

        enriched
    }
}
