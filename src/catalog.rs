use crate::types::ArtistRecord;
use async_trait::async_trait;

/// Free-text artist search against a catalog.
///
/// This is the only thing name matching and enrichment need from a provider, which keeps
/// both testable without HTTP.
///
/// # Mocking Support
///
/// When the `mock` feature is enabled, this crate provides `MockCatalogSearch`.
#[cfg_attr(feature = "mock", mockall::automock)]
#[async_trait]
pub trait CatalogSearch: Send + Sync {
    /// Up to `limit` candidates in provider relevance order. Failures degrade to an empty list.
    async fn search_artists(&self, query: &str, limit: u32) -> Vec<ArtistRecord>;
}
