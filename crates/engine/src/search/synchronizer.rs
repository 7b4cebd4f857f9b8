//! Keeps the search index aligned with store state.
//!
//! All projection goes through here: single-page refreshes after a publish,
//! tag upserts, and the full chunked reindex. Queries from callers also
//! enter here so field validation and result hydration live in one place.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::content::Uid;
use crate::error::EngineResult;
use crate::graph::ContentGraphWalker;
use crate::page::{Page, PageState, Tag};
use crate::search::document::{
    DocType, PAGE_DOC_FIELDS, PageDocument, SearchDocument, TagDocument,
};
use crate::search::extract::extract_page;
use crate::search::index::{SearchIndex, SearchResults, SortSpec};
use crate::search::query::SearchQuery;
use crate::store::ContentStore;

/// Pages reprojected per batch during a full reindex.
pub const DEFAULT_REINDEX_CHUNK: usize = 50;

/// Observer for long-running reindex passes.
pub trait ProgressSink: Send + Sync {
    fn advance(&self, done: usize, total: usize);
}

/// Counts from a full reindex pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReindexReport {
    /// Pages processed; deleted pages count here too, their documents are
    /// dropped rather than refreshed.
    pub indexed: usize,
    /// Stale documents removed by hard cleanup.
    pub purged: usize,
}

#[derive(Clone)]
pub struct SearchIndexSynchronizer {
    store: Arc<dyn ContentStore>,
    index: Arc<dyn SearchIndex>,
    walker: ContentGraphWalker,
    chunk: usize,
}

impl SearchIndexSynchronizer {
    pub fn new(store: Arc<dyn ContentStore>, index: Arc<dyn SearchIndex>) -> Self {
        Self::with_chunk(store, index, DEFAULT_REINDEX_CHUNK)
    }

    pub fn with_chunk(
        store: Arc<dyn ContentStore>,
        index: Arc<dyn SearchIndex>,
        chunk: usize,
    ) -> Self {
        let walker = ContentGraphWalker::new(Arc::clone(&store));
        Self {
            store,
            index,
            walker,
            chunk: chunk.max(1),
        }
    }

    /// Reprojects one page from committed state. Deleted pages have their
    /// document dropped instead; a document that was never there is fine.
    pub async fn index_page(&self, page: &Page) -> EngineResult<()> {
        if page.state == PageState::Deleted {
            if self.index.delete(&page.uid).await? {
                debug!(page = %page.uid, "dropped document for deleted page");
            }
            return Ok(());
        }
        let document = self.project_page(page).await?;
        self.index.upsert(&SearchDocument::Page(document)).await?;
        debug!(page = %page.uid, "page document refreshed");
        Ok(())
    }

    async fn project_page(&self, page: &Page) -> EngineResult<PageDocument> {
        let uids = self.walker.page_uids(page, None).await?;
        let nodes = self.store.get_nodes(&uids).await?;
        let extract = extract_page(&nodes);

        // Draft flag scope: the page's own nodes plus the shared singletons
        // rendered on every page.
        let mut scope = uids;
        let mut seen: HashSet<Uid> = scope.iter().cloned().collect();
        for shared in self.store.shared_uids().await? {
            if seen.insert(shared.clone()) {
                scope.push(shared);
            }
        }
        let has_draft = !self.store.revisions_for(&scope).await?.is_empty();

        // Tag names project lowercased so filters are case-insensitive.
        let tags = self
            .store
            .get_tags(&page.tags)
            .await?
            .into_iter()
            .map(|tag| tag.name.to_lowercase())
            .collect();

        Ok(PageDocument {
            uid: page.uid.clone(),
            title: page.title.clone(),
            first_heading: extract.first_heading,
            summary: extract.summary,
            plain_text: extract.plain_text,
            tags,
            is_online: page.is_online(),
            has_draft,
            category: page.category.clone(),
            created: page.created,
            modified: page.modified,
            published: page.published,
            media: extract.media,
        })
    }

    pub async fn index_tag(&self, tag: &Tag) -> EngineResult<()> {
        let document = SearchDocument::Tag(TagDocument {
            uid: tag.uid.clone(),
            name: tag.name.to_lowercase(),
        });
        self.index.upsert(&document).await?;
        Ok(())
    }

    /// Removes a page document; returns whether one existed.
    pub async fn delete_page(&self, uid: &Uid) -> EngineResult<bool> {
        Ok(self.index.delete(uid).await?)
    }

    pub async fn delete_tag(&self, uid: &Uid) -> EngineResult<bool> {
        Ok(self.index.delete(uid).await?)
    }

    /// Reprojects every page in chunks, yielding between batches.
    ///
    /// With `hard_cleanup`, page documents whose uid no longer maps to a
    /// live page are purged afterwards.
    pub async fn index_all_pages(
        &self,
        hard_cleanup: bool,
        progress: Option<&dyn ProgressSink>,
    ) -> EngineResult<ReindexReport> {
        let pages = self.store.list_pages().await?;
        let total = pages.len();
        let mut live: HashSet<Uid> = HashSet::with_capacity(total);
        let mut indexed = 0usize;

        for chunk in pages.chunks(self.chunk) {
            for page in chunk {
                if page.state != PageState::Deleted {
                    live.insert(page.uid.clone());
                }
                self.index_page(page).await?;
                indexed += 1;
                if let Some(sink) = progress {
                    sink.advance(indexed, total);
                }
            }
            tokio::task::yield_now().await;
        }

        let mut purged = 0usize;
        if hard_cleanup {
            for id in self.index.ids(DocType::Page).await? {
                if !live.contains(&id) && self.index.delete(&id).await? {
                    warn!(document = %id, "purged stale search document");
                    purged += 1;
                }
            }
        }

        info!(indexed, purged, hard_cleanup, "page reindex complete");
        Ok(ReindexReport { indexed, purged })
    }

    /// Runs a caller-supplied query against page documents.
    ///
    /// Fields are validated before the backend is touched, so a typo fails
    /// loudly. Backend failures degrade the read to an empty result set; a
    /// down index must not take page rendering with it.
    pub async fn custom_search_page(
        &self,
        query: &SearchQuery,
        from: usize,
        size: usize,
        sort: Option<&SortSpec>,
    ) -> EngineResult<SearchResults> {
        query.validate(PAGE_DOC_FIELDS)?;
        let scoped = SearchQuery::Bool {
            must: vec![
                SearchQuery::term("doc_type", DocType::Page.as_str()),
                query.clone(),
            ],
            should: Vec::new(),
            must_not: Vec::new(),
        };
        match self.index.search(&scoped, from, size, sort).await {
            Ok(results) => Ok(results),
            Err(error) => {
                warn!(%error, "search backend unavailable, returning no hits");
                Ok(SearchResults::empty())
            }
        }
    }

    /// Like [`Self::custom_search_page`] but hydrates hits into pages,
    /// keeping the index's rank order.
    pub async fn custom_search_page_hydrated(
        &self,
        query: &SearchQuery,
        from: usize,
        size: usize,
        sort: Option<&SortSpec>,
    ) -> EngineResult<(Vec<Page>, usize)> {
        let results = self.custom_search_page(query, from, size, sort).await?;
        let rank: HashMap<Uid, usize> = results
            .hits
            .iter()
            .enumerate()
            .map(|(position, hit)| (hit.id.clone(), position))
            .collect();
        let uids = results.ids();
        let mut pages = self.store.get_pages(&uids).await?;
        // The store gives no ordering; restore the index's ranking.
        pages.sort_by_key(|page| rank.get(&page.uid).copied().unwrap_or(usize::MAX));
        Ok((pages, results.total))
    }
}

impl fmt::Debug for SearchIndexSynchronizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchIndexSynchronizer")
            .field("chunk", &self.chunk)
            .finish_non_exhaustive()
    }
}
