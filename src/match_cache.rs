//! Cross-provider identity matching.
//!
//! A name coming from one provider is resolved to a catalog record by searching the catalog and
//! accepting a candidate only when its normalized name is equal to, or reasonably contains (or is
//! contained in), the normalized query. Every outcome is memoized, including "no acceptable
//! candidate".

use crate::catalog::CatalogSearch;
use crate::normalize::normalize_name;
use crate::types::ArtistRecord;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A memoized lookup outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchEntry {
    Found(ArtistRecord),
    /// Looked up, nothing acceptable. Not the same as "never looked up".
    Absent,
}

impl MatchEntry {
    pub fn artist(&self) -> Option<&ArtistRecord> {
        match self {
            MatchEntry::Found(artist) => Some(artist),
            MatchEntry::Absent => None,
        }
    }

    pub fn into_artist(self) -> Option<ArtistRecord> {
        match self {
            MatchEntry::Found(artist) => Some(artist),
            MatchEntry::Absent => None,
        }
    }
}

/// Normalized name to lookup outcome. Entries live until [`MatchCache::clear`].
#[derive(Debug, Default)]
pub struct MatchCache {
    entries: Mutex<HashMap<String, MatchEntry>>,
}

impl MatchCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, MatchEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, key: &str) -> Option<MatchEntry> {
        self.entries().get(key).cloned()
    }

    pub fn insert(&self, key: impl Into<String>, entry: MatchEntry) {
        self.entries().insert(key.into(), entry);
    }

    pub fn clear(&self) {
        self.entries().clear();
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

/// Why a candidate was accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Exact,
    Containment,
}

/// Acceptance rules for catalog candidates.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchPolicy {
    /// Minimum `shorter / longer` length ratio (in chars, normalized forms) for a containment
    /// match. `0.0` accepts any containment.
    pub min_containment_ratio: f64,
}

impl Default for MatchPolicy {
    fn default() -> Self {
        Self {
            min_containment_ratio: 0.5,
        }
    }
}

impl MatchPolicy {
    pub fn new(min_containment_ratio: f64) -> Self {
        Self {
            min_containment_ratio: min_containment_ratio.clamp(0.0, 1.0),
        }
    }

    /// Compare two already normalized names.
    pub fn classify(&self, query: &str, candidate: &str) -> Option<MatchKind> {
        if query.is_empty() || candidate.is_empty() {
            return None;
        }
        if query == candidate {
            return Some(MatchKind::Exact);
        }

        let (shorter, longer) = if query.len() <= candidate.len() {
            (query, candidate)
        } else {
            (candidate, query)
        };
        if !longer.contains(shorter) {
            return None;
        }

        let ratio = shorter.chars().count() as f64 / longer.chars().count() as f64;
        if ratio >= self.min_containment_ratio {
            Some(MatchKind::Containment)
        } else {
            log::debug!("Rejected containment match {query:?} / {candidate:?} (ratio {ratio:.2})");
            None
        }
    }

    /// Pick the best candidate for `query`: the first exact match, else the first acceptable
    /// containment match. Never falls back to an unchecked candidate.
    pub fn select<'a>(
        &self,
        query: &str,
        candidates: &'a [ArtistRecord],
    ) -> Option<(&'a ArtistRecord, MatchKind)> {
        let query = normalize_name(query);
        let classified: Vec<(&ArtistRecord, Option<MatchKind>)> = candidates
            .iter()
            .map(|candidate| (candidate, self.classify(&query, &normalize_name(&candidate.name))))
            .collect();

        classified
            .iter()
            .find(|(_, kind)| *kind == Some(MatchKind::Exact))
            .or_else(|| {
                classified
                    .iter()
                    .find(|(_, kind)| *kind == Some(MatchKind::Containment))
            })
            .and_then(|(candidate, kind)| kind.map(|kind| (*candidate, kind)))
    }
}

/// Name-to-catalog resolver backed by a [`MatchCache`].
#[derive(Debug)]
pub struct ArtistMatcher {
    cache: MatchCache,
    policy: MatchPolicy,
    search_limit: u32,
    /// One lock per normalized name with a search in flight
    lookups: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl ArtistMatcher {
    pub fn new(policy: MatchPolicy, search_limit: u32) -> Self {
        Self {
            cache: MatchCache::new(),
            policy,
            search_limit: search_limit.max(1),
            lookups: Mutex::new(HashMap::new()),
        }
    }

    pub fn cache(&self) -> &MatchCache {
        &self.cache
    }

    pub fn policy(&self) -> &MatchPolicy {
        &self.policy
    }

    /// Cached outcome for `name`, without searching.
    pub fn cached(&self, name: &str) -> Option<MatchEntry> {
        self.cache.get(&normalize_name(name))
    }

    /// Resolve `name` to a catalog record.
    ///
    /// Searches at most once per normalized name for the life of the cache; a name that yields
    /// no acceptable candidate is remembered as [`MatchEntry::Absent`]. Concurrent calls for the
    /// same name wait for the first one's search instead of issuing their own.
    pub async fn find<S: CatalogSearch + ?Sized>(
        &self,
        search: &S,
        name: &str,
    ) -> Option<ArtistRecord> {
        let key = normalize_name(name);
        if key.is_empty() {
            return None;
        }
        if let Some(entry) = self.cache.get(&key) {
            log::debug!("Match cache hit for {key:?}");
            return entry.into_artist();
        }

        let lookup = self.lookup_lock(&key);
        let _lookup = lookup.lock().await;
        if let Some(entry) = self.cache.get(&key) {
            log::debug!("Match for {key:?} resolved by a concurrent lookup");
            return entry.into_artist();
        }

        let candidates = search.search_artists(name.trim(), self.search_limit).await;
        let entry = match self.policy.select(name, &candidates) {
            Some((artist, kind)) => {
                log::debug!("Matched {name:?} to {:?} ({kind:?})", artist.name);
                MatchEntry::Found(artist.clone())
            }
            None => {
                log::warn!(
                    "No acceptable catalog match for {name:?} among {} candidates",
                    candidates.len()
                );
                MatchEntry::Absent
            }
        };

        self.cache.insert(key.clone(), entry.clone());
        self.lookups().remove(&key);
        entry.into_artist()
    }

    fn lookups(&self) -> MutexGuard<'_, HashMap<String, Arc<tokio::sync::Mutex<()>>>> {
        self.lookups.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lookup_lock(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        Arc::clone(self.lookups().entry(key.to_string()).or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Provider;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn artist(id: &str, name: &str) -> ArtistRecord {
        ArtistRecord {
            id: id.to_string(),
            name: name.to_string(),
            image_url: None,
            image_large_url: None,
            fan_count: None,
            external_url: format!("https://www.deezer.com/artist/{id}"),
            provider: Provider::Deezer,
        }
    }

    struct FixedSearch {
        results: Vec<ArtistRecord>,
        calls: AtomicUsize,
    }

    impl FixedSearch {
        fn new(results: Vec<ArtistRecord>) -> Self {
            Self {
                results,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl CatalogSearch for FixedSearch {
        async fn search_artists(&self, _query: &str, limit: u32) -> Vec<ArtistRecord> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            self.results.iter().take(limit as usize).cloned().collect()
        }
    }

    #[test]
    fn test_exact_beats_earlier_containment() {
        let policy = MatchPolicy::new(0.0);
        let candidates = vec![artist("2", "Boris the Spider"), artist("1", "Boris")];
        let (found, kind) = policy.select("Boris", &candidates).unwrap();
        assert_eq!(found.id, "1");
        assert_eq!(kind, MatchKind::Exact);
    }

    #[test]
    fn test_punctuation_differences_match_exactly() {
        let policy = MatchPolicy::default();
        let candidates = vec![artist("7", "godspeed you black emperor")];
        let (found, kind) = policy
            .select("Godspeed You! Black Emperor", &candidates)
            .unwrap();
        assert_eq!(found.id, "7");
        assert_eq!(kind, MatchKind::Exact);
    }

    #[test]
    fn test_containment_ratio_guard() {
        let policy = MatchPolicy::default();
        assert_eq!(
            policy.classify("boris", "boris band"),
            Some(MatchKind::Containment)
        );
        assert_eq!(policy.classify("eagles", "eagles tribute band"), None);
        assert!(policy
            .select("Eagles", &[artist("9", "The Eagles Tribute Band")])
            .is_none());

        let unbounded = MatchPolicy::new(0.0);
        assert_eq!(
            unbounded.classify("eagles", "eagles tribute band"),
            Some(MatchKind::Containment)
        );
    }

    #[test]
    fn test_containment_works_both_ways() {
        let policy = MatchPolicy::default();
        assert_eq!(
            policy.classify("boris", "boris band"),
            policy.classify("boris band", "boris")
        );
        assert_eq!(
            policy.classify("boris band", "boris"),
            Some(MatchKind::Containment)
        );
    }

    #[test]
    fn test_unrelated_candidates_never_fall_back() {
        let policy = MatchPolicy::default();
        let candidates = vec![artist("1", "Metallica"), artist("2", "Megadeth")];
        assert!(policy.select("Slayer", &candidates).is_none());
        assert!(policy.select("Slayer", &[]).is_none());
    }

    #[tokio::test]
    async fn test_article_variants_share_one_lookup() {
        let matcher = ArtistMatcher::new(MatchPolicy::default(), 5);
        let search = FixedSearch::new(vec![artist("1", "The Beatles")]);

        let first = matcher.find(&search, "The Beatles").await.unwrap();
        let second = matcher.find(&search, "beatles").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(search.calls.load(Ordering::SeqCst), 1);
        assert_eq!(matcher.cache().len(), 1);
    }

    #[tokio::test]
    async fn test_absent_is_cached() {
        let matcher = ArtistMatcher::new(MatchPolicy::default(), 5);
        let search = FixedSearch::new(vec![artist("9", "The Eagles Tribute Band")]);

        assert!(matcher.find(&search, "Eagles").await.is_none());
        assert!(matcher.find(&search, "eagles").await.is_none());

        assert_eq!(search.calls.load(Ordering::SeqCst), 1);
        assert_eq!(matcher.cached("Eagles"), Some(MatchEntry::Absent));
    }

    #[tokio::test]
    async fn test_blank_names_skip_the_catalog() {
        let matcher = ArtistMatcher::new(MatchPolicy::default(), 5);
        let search = FixedSearch::new(vec![artist("1", "Boris")]);

        assert!(matcher.find(&search, "   ").await.is_none());
        assert!(matcher.find(&search, "?!").await.is_none());
        assert_eq!(search.calls.load(Ordering::SeqCst), 0);
        assert!(matcher.cache().is_empty());
    }

    #[tokio::test]
    async fn test_clear_forces_new_lookup() {
        let matcher = ArtistMatcher::new(MatchPolicy::default(), 5);
        let search = FixedSearch::new(vec![artist("1", "Boris")]);

        matcher.find(&search, "Boris").await;
        matcher.cache().clear();
        matcher.find(&search, "Boris").await;
        assert_eq!(search.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_concurrent_finds_share_one_search() {
        let search = FixedSearch::new(vec![artist("1", "Boris")]);
        let matcher = ArtistMatcher::new(MatchPolicy::default(), 5);

        let (first, second, third) = tokio::join!(
            matcher.find(&search, "Boris"),
            matcher.find(&search, "boris"),
            matcher.find(&search, "BORIS "),
        );

        assert_eq!(first.unwrap().id, "1");
        assert_eq!(second.unwrap().id, "1");
        assert_eq!(third.unwrap().id, "1");
        assert_eq!(search.calls.load(Ordering::SeqCst), 1);
        assert!(matcher.lookups().is_empty());
    }
}
