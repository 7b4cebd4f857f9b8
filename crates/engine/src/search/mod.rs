//! Search projection and query surface.
//!
//! Pages and tags are denormalized into flat documents ([`document`]),
//! stored behind the [`SearchIndex`] trait, and kept current by the
//! [`SearchIndexSynchronizer`]. Callers never talk to an index backend
//! directly.

pub mod document;
mod extract;
pub mod index;
pub mod memory;
pub mod query;
pub mod synchronizer;

pub use document::{
    DocType, MediaRef, PAGE_DOC_FIELDS, PageDocument, SearchDocument, TagDocument,
};
pub use index::{
    SearchError, SearchHit, SearchIndex, SearchResults, SortDirection, SortSpec,
};
pub use memory::MemoryIndex;
pub use query::{DEFAULT_MAX_EDITS, SearchQuery};
pub use synchronizer::{
    DEFAULT_REINDEX_CHUNK, ProgressSink, ReindexReport, SearchIndexSynchronizer,
};
