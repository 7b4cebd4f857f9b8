//! In-memory store backend for tests and embedded deployments.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::content::{ContentNode, NodeState, Uid};
use crate::page::{Page, Tag};
use crate::revision::Revision;
use crate::store::{ContentStore, StoreError, StoreTx};

#[derive(Debug, Default, Clone)]
struct MemoryState {
    nodes: HashMap<Uid, ContentNode>,
    pages: HashMap<Uid, Page>,
    tags: HashMap<Uid, Tag>,
    revisions: HashMap<Uid, Revision>,
    shared: HashSet<Uid>,
}

/// Whole-state snapshot store. A transaction clones the state, mutates the
/// clone, and swaps it back on commit; concurrent transactions are
/// last-commit-wins.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn get_node(&self, uid: &Uid) -> Result<Option<ContentNode>, StoreError> {
        Ok(self.state.read().nodes.get(uid).cloned())
    }

    async fn get_nodes(&self, uids: &[Uid]) -> Result<Vec<ContentNode>, StoreError> {
        let state = self.state.read();
        Ok(uids
            .iter()
            .filter_map(|uid| state.nodes.get(uid).cloned())
            .collect())
    }

    async fn get_page(&self, uid: &Uid) -> Result<Option<Page>, StoreError> {
        Ok(self.state.read().pages.get(uid).cloned())
    }

    async fn list_pages(&self) -> Result<Vec<Page>, StoreError> {
        let mut pages: Vec<Page> = self.state.read().pages.values().cloned().collect();
        pages.sort_by(|a, b| a.uid.cmp(&b.uid));
        Ok(pages)
    }

    async fn get_pages(&self, uids: &[Uid]) -> Result<Vec<Page>, StoreError> {
        let state = self.state.read();
        let mut pages: Vec<Page> = uids
            .iter()
            .filter_map(|uid| state.pages.get(uid).cloned())
            .collect();
        // Uid order, deliberately unrelated to the caller's request order.
        pages.sort_by(|a, b| a.uid.cmp(&b.uid));
        Ok(pages)
    }

    async fn get_tags(&self, uids: &[Uid]) -> Result<Vec<Tag>, StoreError> {
        let state = self.state.read();
        Ok(uids
            .iter()
            .filter_map(|uid| state.tags.get(uid).cloned())
            .collect())
    }

    async fn get_revision(&self, target: &Uid) -> Result<Option<Revision>, StoreError> {
        Ok(self.state.read().revisions.get(target).cloned())
    }

    async fn revisions_for(&self, targets: &[Uid]) -> Result<Vec<Revision>, StoreError> {
        let state = self.state.read();
        Ok(targets
            .iter()
            .filter_map(|uid| state.revisions.get(uid).cloned())
            .collect())
    }

    async fn all_revisions(&self) -> Result<Vec<Revision>, StoreError> {
        let mut revisions: Vec<Revision> =
            self.state.read().revisions.values().cloned().collect();
        revisions.sort_by(|a, b| a.target.cmp(&b.target));
        Ok(revisions)
    }

    async fn is_shared(&self, uid: &Uid) -> Result<bool, StoreError> {
        Ok(self.state.read().shared.contains(uid))
    }

    async fn shared_uids(&self) -> Result<Vec<Uid>, StoreError> {
        let mut uids: Vec<Uid> = self.state.read().shared.iter().cloned().collect();
        uids.sort();
        Ok(uids)
    }

    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError> {
        Ok(Box::new(MemoryTx {
            state: Arc::clone(&self.state),
            working: self.state.read().clone(),
        }))
    }
}

struct MemoryTx {
    state: Arc<RwLock<MemoryState>>,
    working: MemoryState,
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn upsert_node(&mut self, node: &ContentNode) -> Result<(), StoreError> {
        self.working.nodes.insert(node.uid.clone(), node.clone());
        Ok(())
    }

    async fn delete_node(&mut self, uid: &Uid) -> Result<(), StoreError> {
        self.working.nodes.remove(uid);
        Ok(())
    }

    async fn detach_child(&mut self, uid: &Uid) -> Result<u64, StoreError> {
        let mut touched = 0;
        for node in self.working.nodes.values_mut() {
            if node.remove_child(uid) {
                touched += 1;
            }
        }
        Ok(touched)
    }

    async fn bulk_set_state(
        &mut self,
        uids: &[Uid],
        state: NodeState,
    ) -> Result<u64, StoreError> {
        let mut changed = 0;
        for uid in uids {
            if let Some(node) = self.working.nodes.get_mut(uid) {
                node.state = state;
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn upsert_revision(&mut self, revision: &Revision) -> Result<(), StoreError> {
        self.working
            .revisions
            .insert(revision.target.clone(), revision.clone());
        Ok(())
    }

    async fn delete_revision(&mut self, target: &Uid) -> Result<(), StoreError> {
        self.working.revisions.remove(target);
        Ok(())
    }

    async fn upsert_page(&mut self, page: &Page) -> Result<(), StoreError> {
        self.working.pages.insert(page.uid.clone(), page.clone());
        Ok(())
    }

    async fn upsert_tag(&mut self, tag: &Tag) -> Result<(), StoreError> {
        self.working.tags.insert(tag.uid.clone(), tag.clone());
        Ok(())
    }

    async fn mark_shared(&mut self, uid: &Uid) -> Result<(), StoreError> {
        self.working.shared.insert(uid.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        *self.state.write() = self.working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}
