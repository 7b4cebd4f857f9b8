//! Hook dispatch for content mutations and page lifecycle events.
//!
//! Subscribers run in registration order. A failing subscriber is logged
//! and skipped so one faulty hook cannot wedge a save or a reindex.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, error};

use crate::content::ContentNode;
use crate::error::EngineResult;
use crate::page::Page;
use crate::search::SearchIndexSynchronizer;

/// Adjusts a freshly built clone before it is persisted.
///
/// Hooks see the source node read-only and may rewrite any part of the
/// clone: elements, parameters, or its child list.
#[async_trait]
pub trait PreSaveHook: Send + Sync {
    async fn pre_save(&self, source: &ContentNode, clone: &mut ContentNode)
    -> anyhow::Result<()>;
}

/// Registry of subscribers fired around content writes.
#[derive(Default)]
pub struct HookDispatcher {
    pre_save: RwLock<Vec<Arc<dyn PreSaveHook>>>,
}

impl HookDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_pre_save(&self, hook: Arc<dyn PreSaveHook>) {
        self.pre_save.write().push(hook);
    }

    /// Fires every pre-save subscriber against the clone. Errors are
    /// logged per subscriber and do not stop the chain.
    pub async fn dispatch_pre_save(&self, source: &ContentNode, clone: &mut ContentNode) {
        let hooks: Vec<Arc<dyn PreSaveHook>> = self.pre_save.read().clone();
        for hook in hooks {
            if let Err(error) = hook.pre_save(source, clone).await {
                error!(node = %clone.uid, %error, "pre-save hook failed, skipping");
            }
        }
    }
}

impl fmt::Debug for HookDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookDispatcher")
            .field("pre_save", &self.pre_save.read().len())
            .finish()
    }
}

/// Page lifecycle triggers that keep the search projection current.
///
/// Call sites invoke these after the corresponding store write has
/// committed; each trigger re-projects the page from committed state.
#[derive(Clone, Debug)]
pub struct PageLifecycleHooks {
    synchronizer: SearchIndexSynchronizer,
}

impl PageLifecycleHooks {
    pub fn new(synchronizer: SearchIndexSynchronizer) -> Self {
        Self { synchronizer }
    }

    /// A page's drafts were just published.
    pub async fn on_content_flush(&self, page: &Page) -> EngineResult<()> {
        debug!(page = %page.uid, "content flushed, refreshing search document");
        self.synchronizer.index_page(page).await
    }

    /// A page was soft-deleted or removed outright.
    pub async fn on_page_delete(&self, page: &Page) -> EngineResult<()> {
        debug!(page = %page.uid, "page deleted, dropping search document");
        self.synchronizer.index_page(page).await
    }

    /// A node belonging to the page changed outside a publish batch.
    pub async fn on_post_content_update(&self, page: &Page) -> EngineResult<()> {
        debug!(page = %page.uid, "content updated, refreshing search document");
        self.synchronizer.index_page(page).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::content::NodeKind;

    struct Retitler;

    #[async_trait]
    impl PreSaveHook for Retitler {
        async fn pre_save(
            &self,
            _source: &ContentNode,
            clone: &mut ContentNode,
        ) -> anyhow::Result<()> {
            clone.set_element("value", crate::content::ElementValue::text("copy"))?;
            Ok(())
        }
    }

    struct AlwaysFails;

    #[async_trait]
    impl PreSaveHook for AlwaysFails {
        async fn pre_save(
            &self,
            _source: &ContentNode,
            _clone: &mut ContentNode,
        ) -> anyhow::Result<()> {
            anyhow::bail!("broken subscriber")
        }
    }

    #[tokio::test]
    async fn a_failing_hook_does_not_stop_later_hooks() {
        let dispatcher = HookDispatcher::new();
        dispatcher.register_pre_save(Arc::new(AlwaysFails));
        dispatcher.register_pre_save(Arc::new(Retitler));

        let source = ContentNode::new(NodeKind::Title);
        let mut clone = ContentNode::new(NodeKind::Title);
        dispatcher.dispatch_pre_save(&source, &mut clone).await;

        assert_eq!(clone.text("value"), Some("copy"));
    }
}
