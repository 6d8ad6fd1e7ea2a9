//! Collaborator seams for the external search index.
//!
//! The portal's search index answers filtered queries with ordered entity
//! ids and a total count. This crate never interprets filters; it forwards
//! them and consumes the hits. The in-memory implementation backs tests and
//! standalone deployments where no index is wired up.

use std::collections::{BTreeMap, HashMap};

use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;

use crate::common::Filters;
use crate::domains::entityset::models::{EntityType, SortOrder};

/// Result of a search: ordered ids plus the total hit count (which may
/// exceed `ids.len()` when the query was limited).
#[derive(Debug, Clone)]
pub struct SearchHits {
    pub ids: Vec<String>,
    pub total: u64,
}

/// The external search index.
#[async_trait]
pub trait SearchService: Send + Sync {
    async fn search(
        &self,
        filters: &Filters,
        entity_type: EntityType,
        sort_by: &str,
        sort_order: SortOrder,
        limit: usize,
    ) -> Result<SearchHits>;
}

/// Resolves display fields for export enrichment.
#[async_trait]
pub trait DisplayResolver: Send + Sync {
    /// Display symbols keyed by entity id (e.g. gene symbols). Ids without a
    /// symbol are exported bare.
    async fn display_symbols(
        &self,
        entity_type: EntityType,
        ids: &[String],
    ) -> Result<HashMap<String, String>>;

    /// Group ids by their source repository, for manifest sections.
    async fn repositories(&self, ids: &[String]) -> Result<BTreeMap<String, Vec<String>>>;
}

// ============================================================================
// In-memory implementations
// ============================================================================

/// A search service over a fixed per-type corpus, in insertion order.
///
/// Filters are ignored; this exists for tests and for running the service
/// without an index attached.
#[derive(Debug, Default)]
pub struct InMemorySearchService {
    corpus: DashMap<EntityType, Vec<String>>,
}

impl InMemorySearchService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_corpus(entity_type: EntityType, ids: Vec<String>) -> Self {
        let service = Self::new();
        service.corpus.insert(entity_type, ids);
        service
    }

    pub fn insert(&self, entity_type: EntityType, ids: Vec<String>) {
        self.corpus.insert(entity_type, ids);
    }
}

#[async_trait]
impl SearchService for InMemorySearchService {
    async fn search(
        &self,
        _filters: &Filters,
        entity_type: EntityType,
        _sort_by: &str,
        sort_order: SortOrder,
        limit: usize,
    ) -> Result<SearchHits> {
        let mut ids = self
            .corpus
            .get(&entity_type)
            .map(|entry| entry.clone())
            .unwrap_or_default();
        if sort_order == SortOrder::Descending {
            ids.reverse();
        }
        let total = ids.len() as u64;
        ids.truncate(limit);
        Ok(SearchHits { ids, total })
    }
}

/// A resolver with nothing to resolve: no symbols, one `unknown` repository.
#[derive(Debug, Default)]
pub struct NullResolver;

#[async_trait]
impl DisplayResolver for NullResolver {
    async fn display_symbols(
        &self,
        _entity_type: EntityType,
        _ids: &[String],
    ) -> Result<HashMap<String, String>> {
        Ok(HashMap::new())
    }

    async fn repositories(&self, ids: &[String]) -> Result<BTreeMap<String, Vec<String>>> {
        let mut groups = BTreeMap::new();
        groups.insert("unknown".to_string(), ids.to_vec());
        Ok(groups)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_search_respects_limit_and_order() {
        let service = InMemorySearchService::with_corpus(
            EntityType::Donor,
            vec!["D1".into(), "D2".into(), "D3".into()],
        );

        let hits = service
            .search(&Filters::None, EntityType::Donor, "id", SortOrder::Ascending, 2)
            .await
            .unwrap();
        assert_eq!(hits.ids, ["D1", "D2"]);
        assert_eq!(hits.total, 3);

        let hits = service
            .search(&Filters::None, EntityType::Donor, "id", SortOrder::Descending, 10)
            .await
            .unwrap();
        assert_eq!(hits.ids, ["D3", "D2", "D1"]);
    }

    #[test]
    fn test_unknown_type_is_empty() {
        let service = InMemorySearchService::new();
        let hits = tokio_test::block_on(service.search(
            &Filters::None,
            EntityType::Gene,
            "id",
            SortOrder::Ascending,
            5,
        ))
        .unwrap();
        assert!(hits.ids.is_empty());
        assert_eq!(hits.total, 0);
    }
}
