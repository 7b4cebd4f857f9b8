//! Cancelling a page's drafts.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};

use crate::content::NodeState;
use crate::error::EngineResult;
use crate::graph::{ContentGraphWalker, OverlayResolver};
use crate::page::{Page, PageState};
use crate::revision::{EditorToken, RevisionStore};
use crate::store::ContentStore;

/// Window after page creation in which a node still counts as scaffolding.
pub const DEFAULT_RESET_GRACE_SECS: i64 = 3;

/// Discards a page's drafts, reverting content to its last published state.
#[derive(Clone)]
pub struct RollbackCoordinator {
    store: Arc<dyn ContentStore>,
    revisions: RevisionStore,
    walker: ContentGraphWalker,
    grace_secs: i64,
}

impl RollbackCoordinator {
    pub fn new(store: Arc<dyn ContentStore>) -> Self {
        Self::with_grace(store, DEFAULT_RESET_GRACE_SECS)
    }

    pub fn with_grace(store: Arc<dyn ContentStore>, grace_secs: i64) -> Self {
        let revisions = RevisionStore::new(Arc::clone(&store));
        let walker = ContentGraphWalker::new(Arc::clone(&store));
        Self {
            store,
            revisions,
            walker,
            grace_secs,
        }
    }

    /// Cancels every draft scoped to the page, in one transaction.
    ///
    /// Nodes created within the grace window of an offline page's own
    /// creation keep their row (the page is still mid-scaffold); other
    /// never-published nodes are physically removed; published nodes just
    /// lose their draft. Returns the number of cancelled drafts.
    pub async fn reset_by_page(
        &self,
        page: &Page,
        token: &EditorToken,
    ) -> EngineResult<usize> {
        let uids = self
            .walker
            .gather_uids(&page.root, &OverlayResolver::none())
            .await?;
        let drafts = self.revisions.drafts_for(&uids).await?;

        let mut tx = self.store.begin().await?;
        let mut cancelled = 0usize;
        for draft in &drafts {
            if let Some(node) = self.store.get_node(&draft.target).await? {
                let mid_scaffold = page.state == PageState::Offline
                    && node.created.saturating_sub(page.created) <= self.grace_secs;
                if !mid_scaffold && node.state == NodeState::New {
                    tx.detach_child(&node.uid).await?;
                    tx.delete_node(&node.uid).await?;
                    debug!(node = %node.uid, kind = %node.kind, "never-published node removed on reset");
                }
            }
            tx.delete_revision(&draft.target).await?;
            cancelled += 1;
        }
        tx.commit().await?;

        info!(page = %page.uid, token = %token, cancelled, "page drafts reset");
        Ok(cancelled)
    }
}

impl fmt::Debug for RollbackCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RollbackCoordinator")
            .field("grace_secs", &self.grace_secs)
            .finish_non_exhaustive()
    }
}
