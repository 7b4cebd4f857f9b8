//! Repository abstraction over the relational store.
//!
//! Coordinators read through [`ContentStore`] (committed view) and write
//! through a [`StoreTx`] so every publish, reset, and duplication is a single
//! transaction regardless of backend.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use thiserror::Error;

use crate::content::{ContentNode, NodeState, Uid};
use crate::page::{Page, Tag};
use crate::revision::Revision;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database failure")]
    Database(#[from] sqlx::Error),

    #[error("storage backend failure")]
    Backend(#[from] anyhow::Error),
}

#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn get_node(&self, uid: &Uid) -> Result<Option<ContentNode>, StoreError>;

    /// Nodes in the order of the requested uids; missing uids are skipped.
    async fn get_nodes(&self, uids: &[Uid]) -> Result<Vec<ContentNode>, StoreError>;

    async fn get_page(&self, uid: &Uid) -> Result<Option<Page>, StoreError>;

    /// Every page, deleted ones included. No ordering guarantee.
    async fn list_pages(&self) -> Result<Vec<Page>, StoreError>;

    /// Pages for the given uids. No ordering guarantee; callers needing rank
    /// order must re-sort.
    async fn get_pages(&self, uids: &[Uid]) -> Result<Vec<Page>, StoreError>;

    async fn get_tags(&self, uids: &[Uid]) -> Result<Vec<Tag>, StoreError>;

    async fn get_revision(&self, target: &Uid) -> Result<Option<Revision>, StoreError>;

    /// Live revisions targeting any of the given uids.
    async fn revisions_for(&self, targets: &[Uid]) -> Result<Vec<Revision>, StoreError>;

    async fn all_revisions(&self) -> Result<Vec<Revision>, StoreError>;

    async fn is_shared(&self, uid: &Uid) -> Result<bool, StoreError>;

    /// Uids registered as shared singletons.
    async fn shared_uids(&self) -> Result<Vec<Uid>, StoreError>;

    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError>;
}

/// One open transaction. Dropped without [`StoreTx::commit`], nothing is
/// applied.
#[async_trait]
pub trait StoreTx: Send {
    async fn upsert_node(&mut self, node: &ContentNode) -> Result<(), StoreError>;

    async fn delete_node(&mut self, uid: &Uid) -> Result<(), StoreError>;

    /// Removes the uid from every container's child list; returns how many
    /// containers were touched.
    async fn detach_child(&mut self, uid: &Uid) -> Result<u64, StoreError>;

    /// Single-statement state update over a uid set; returns rows changed.
    async fn bulk_set_state(&mut self, uids: &[Uid], state: NodeState)
    -> Result<u64, StoreError>;

    async fn upsert_revision(&mut self, revision: &Revision) -> Result<(), StoreError>;

    async fn delete_revision(&mut self, target: &Uid) -> Result<(), StoreError>;

    async fn upsert_page(&mut self, page: &Page) -> Result<(), StoreError>;

    async fn upsert_tag(&mut self, tag: &Tag) -> Result<(), StoreError>;

    /// Registers a node as a shared singleton.
    async fn mark_shared(&mut self, uid: &Uid) -> Result<(), StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}
