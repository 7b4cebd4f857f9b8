//! Transactional publish of a page's drafted changes.

pub mod rollback;

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::content::NodeState;
use crate::error::EngineResult;
use crate::graph::{ContentGraphWalker, OverlayResolver};
use crate::page::{Page, PageState};
use crate::revision::{DraftState, EditorToken, Revision, RevisionStore, StructuralDiff};
use crate::store::ContentStore;

pub use rollback::{DEFAULT_RESET_GRACE_SECS, RollbackCoordinator};

/// Promotes a page's drafts into the published state.
///
/// Marking the page itself online and reindexing are the caller's concern;
/// this coordinator only moves content.
#[derive(Clone)]
pub struct PublishCoordinator {
    store: Arc<dyn ContentStore>,
    revisions: RevisionStore,
    walker: ContentGraphWalker,
}

impl PublishCoordinator {
    pub fn new(store: Arc<dyn ContentStore>) -> Self {
        let revisions = RevisionStore::new(Arc::clone(&store));
        let walker = ContentGraphWalker::new(Arc::clone(&store));
        Self {
            store,
            revisions,
            walker,
        }
    }

    /// Publishes every draft scoped to the page, in one transaction:
    /// deletions first, then per-node diff commits, then a single-statement
    /// state normalization over the page's uid set.
    ///
    /// Per-node commit failures are caught and logged; the failed node keeps
    /// its draft for a later attempt and the surrounding transaction still
    /// commits. Returns the number of drafts processed.
    pub async fn publish_by_page(
        &self,
        page: &Page,
        token: &EditorToken,
    ) -> EngineResult<usize> {
        // Drafts are scoped against the current, non-overlaid uid set.
        let uids = self
            .walker
            .gather_uids(&page.root, &OverlayResolver::none())
            .await?;
        let drafts = self.revisions.drafts_for(&uids).await?;

        let (deletions, commits): (Vec<Revision>, Vec<Revision>) = drafts
            .into_iter()
            .partition(|draft| draft.state == DraftState::ToDelete);

        let mut tx = self.store.begin().await?;
        let mut processed = 0usize;

        for draft in &deletions {
            match self.store.get_node(&draft.target).await? {
                Some(node) => {
                    tx.detach_child(&node.uid).await?;
                    tx.delete_node(&node.uid).await?;
                    debug!(node = %node.uid, kind = %node.kind, "drafted node deleted");
                }
                None => {
                    debug!(node = %draft.target, "deletion draft targets a missing node");
                }
            }
            tx.delete_revision(&draft.target).await?;
            processed += 1;
        }

        for draft in &commits {
            let Some(mut node) = self.store.get_node(&draft.target).await? else {
                warn!(node = %draft.target, "draft targets a missing node, discarding");
                tx.delete_revision(&draft.target).await?;
                processed += 1;
                continue;
            };
            let diff = StructuralDiff::compute(&node, draft);
            if diff.is_empty() {
                tx.delete_revision(&draft.target).await?;
                processed += 1;
                continue;
            }
            match diff.apply_to(&mut node) {
                Ok(()) => {
                    node.modified = Utc::now().timestamp();
                    tx.upsert_node(&node).await?;
                    tx.delete_revision(&draft.target).await?;
                    processed += 1;
                    debug!(node = %node.uid, kind = %node.kind, "draft committed");
                }
                Err(error) => {
                    // Best-effort batch: the draft stays for a later attempt
                    // while everything else in the transaction commits.
                    warn!(node = %draft.target, %error, "draft commit failed, continuing batch");
                }
            }
        }

        let deleted = deletions.len();
        let normalized = tx.bulk_set_state(&uids, NodeState::Normal).await?;
        tx.commit().await?;

        info!(
            page = %page.uid,
            token = %token,
            deletions = deleted,
            committed = processed - deleted,
            normalized,
            "page publish completed"
        );
        Ok(processed)
    }

    /// Publishes every non-deleted page that has scoped drafts; returns the
    /// total number of drafts processed.
    pub async fn publish_all(&self) -> EngineResult<usize> {
        let token = EditorToken::system();
        let pages = self.store.list_pages().await?;

        let mut total = 0usize;
        let mut touched = 0usize;
        for page in &pages {
            if page.state == PageState::Deleted {
                continue;
            }
            let uids = self
                .walker
                .gather_uids(&page.root, &OverlayResolver::none())
                .await?;
            if self.revisions.drafts_for(&uids).await?.is_empty() {
                continue;
            }
            total += self.publish_by_page(page, &token).await?;
            touched += 1;
        }

        info!(pages = touched, drafts = total, "bulk publish completed");
        Ok(total)
    }
}

impl fmt::Debug for PublishCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublishCoordinator").finish_non_exhaustive()
    }
}
