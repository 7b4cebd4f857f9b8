//! Search index abstraction.
//!
//! The engine projects documents into whatever backend implements
//! [`SearchIndex`]; the in-memory implementation in [`super::memory`] backs
//! tests and single-node deployments.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::content::Uid;
use crate::search::document::{DocType, SearchDocument};
use crate::search::query::SearchQuery;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("search backend failure")]
    Backend(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

/// Overrides score ordering with a field sort. Ties still break on id so
/// pagination stays stable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: String,
    #[serde(default)]
    pub direction: SortDirection,
}

impl SortSpec {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }
}

/// One matching document, carrying its stored source verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: Uid,
    pub score: f64,
    pub source: Value,
}

/// A page of hits plus the total match count before pagination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResults {
    pub hits: Vec<SearchHit>,
    pub total: usize,
}

impl SearchResults {
    pub fn empty() -> Self {
        Self {
            hits: Vec::new(),
            total: 0,
        }
    }

    pub fn ids(&self) -> Vec<Uid> {
        self.hits.iter().map(|hit| hit.id.clone()).collect()
    }
}

#[async_trait]
pub trait SearchIndex: Send + Sync {
    async fn upsert(&self, document: &SearchDocument) -> Result<(), SearchError>;

    async fn get(&self, id: &Uid) -> Result<Option<SearchDocument>, SearchError>;

    /// Returns whether a document was actually removed.
    async fn delete(&self, id: &Uid) -> Result<bool, SearchError>;

    /// Ranked hits for the query, paginated by `from` and `size`.
    async fn search(
        &self,
        query: &SearchQuery,
        from: usize,
        size: usize,
        sort: Option<&SortSpec>,
    ) -> Result<SearchResults, SearchError>;

    /// Ids of every stored document of one type.
    async fn ids(&self, doc_type: DocType) -> Result<Vec<Uid>, SearchError>;
}
