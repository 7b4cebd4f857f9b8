//! Draft-overlay traversal over the content graph.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::warn;

use crate::content::{ContentNode, NodePayload, Uid};
use crate::error::EngineResult;
use crate::page::Page;
use crate::revision::{DraftState, EditorToken, Revision};
use crate::store::ContentStore;

/// Decides, per node, whether a draft payload substitutes for the current
/// one during a read.
///
/// The resolver is a prefetched value; resolving never mutates stored state,
/// so a traversal can run concurrently with published reads.
#[derive(Debug, Default, Clone)]
pub struct OverlayResolver {
    drafts: HashMap<Uid, Revision>,
}

impl OverlayResolver {
    /// Published-only view: no draft applies anywhere.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn from_drafts(drafts: Vec<Revision>) -> Self {
        let drafts = drafts
            .into_iter()
            .map(|draft| (draft.target.clone(), draft))
            .collect();
        Self { drafts }
    }

    /// Prefetches every live draft visible to the token.
    pub async fn for_token(
        store: &dyn ContentStore,
        token: &EditorToken,
    ) -> EngineResult<Self> {
        // All tokens resolve to the shared owner, so this is every draft.
        let _ = token;
        Ok(Self::from_drafts(store.all_revisions().await?))
    }

    pub fn is_empty(&self) -> bool {
        self.drafts.is_empty()
    }

    pub fn draft_for(&self, uid: &Uid) -> Option<&Revision> {
        self.drafts.get(uid)
    }

    /// The payload a read should see for this node. TO_DELETE drafts do not
    /// substitute; the node disappears only at publish.
    pub fn payload_for<'a>(&'a self, node: &'a ContentNode) -> &'a NodePayload {
        match self.drafts.get(&node.uid) {
            Some(draft) if draft.state != DraftState::ToDelete => &draft.payload,
            _ => &node.payload,
        }
    }

    pub fn parameters_for<'a>(
        &'a self,
        node: &'a ContentNode,
    ) -> &'a IndexMap<String, serde_json::Value> {
        match self.drafts.get(&node.uid) {
            Some(draft) if draft.state != DraftState::ToDelete => &draft.parameters,
            _ => &node.parameters,
        }
    }
}

/// All node references held by a payload, in document order.
fn referenced_uids(payload: &NodePayload) -> Vec<Uid> {
    match payload {
        NodePayload::Children(list) => list.clone(),
        NodePayload::Elements(map) => {
            let mut refs = Vec::new();
            for value in map.values() {
                value.collect_refs(&mut refs);
            }
            refs
        }
    }
}

/// Recursive uid enumeration over a content tree.
#[derive(Clone)]
pub struct ContentGraphWalker {
    store: Arc<dyn ContentStore>,
}

impl ContentGraphWalker {
    pub fn new(store: Arc<dyn ContentStore>) -> Self {
        Self { store }
    }

    /// Ordered, de-duplicated uids reachable from `root`, the root's own uid
    /// included, in preorder document order. References into element values
    /// and nested collections are followed; dangling references are logged
    /// and skipped.
    pub async fn gather_uids(
        &self,
        root: &Uid,
        overlay: &OverlayResolver,
    ) -> EngineResult<Vec<Uid>> {
        let mut order: Vec<Uid> = Vec::new();
        let mut seen: HashSet<Uid> = HashSet::new();
        let mut stack: Vec<Uid> = vec![root.clone()];

        while let Some(uid) = stack.pop() {
            if !seen.insert(uid.clone()) {
                continue;
            }
            let Some(node) = self.store.get_node(&uid).await? else {
                if uid == *root {
                    // The root uid is part of the result even when its row
                    // is gone; scoping by page must still cover it.
                    warn!(uid = %uid, "traversal root is missing");
                    order.push(uid);
                } else {
                    warn!(uid = %uid, "dangling content reference skipped");
                }
                continue;
            };
            order.push(uid);

            let refs = referenced_uids(overlay.payload_for(&node));
            for child in refs.into_iter().rev() {
                if !seen.contains(&child) {
                    stack.push(child);
                }
            }
        }

        Ok(order)
    }

    /// Uid set of a page's tree: the published view, or the token's drafted
    /// view when a token is given.
    pub async fn page_uids(
        &self,
        page: &Page,
        token: Option<&EditorToken>,
    ) -> EngineResult<Vec<Uid>> {
        let overlay = match token {
            Some(token) => OverlayResolver::for_token(self.store.as_ref(), token).await?,
            None => OverlayResolver::none(),
        };
        self.gather_uids(&page.root, &overlay).await
    }
}

impl fmt::Debug for ContentGraphWalker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentGraphWalker").finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::content::{ContentNode, ElementValue, NodeKind};
    use crate::store::MemoryStore;

    async fn seed(store: &MemoryStore, nodes: &[&ContentNode]) {
        let mut tx = store.begin().await.unwrap();
        for node in nodes {
            tx.upsert_node(node).await.unwrap();
        }
        tx.commit().await.unwrap();
    }

    fn walker(store: &Arc<MemoryStore>) -> ContentGraphWalker {
        ContentGraphWalker::new(Arc::clone(store) as Arc<dyn ContentStore>)
    }

    #[tokio::test]
    async fn traversal_is_preorder_and_deduplicated() {
        let store = Arc::new(MemoryStore::new());

        let title = ContentNode::new(NodeKind::Title);
        let para = ContentNode::new(NodeKind::Paragraph);
        let mut inner = ContentNode::new(NodeKind::ContentSet);
        inner.push_child(para.uid.clone()).unwrap();
        // The paragraph appears twice; it must be reported once.
        let mut root = ContentNode::new(NodeKind::Section);
        root.push_child(title.uid.clone()).unwrap();
        root.push_child(inner.uid.clone()).unwrap();
        root.push_child(para.uid.clone()).unwrap();

        seed(&store, &[&root, &title, &inner, &para]).await;

        let uids = walker(&store)
            .gather_uids(&root.uid, &OverlayResolver::none())
            .await
            .unwrap();
        assert_eq!(
            uids,
            vec![
                root.uid.clone(),
                title.uid.clone(),
                inner.uid.clone(),
                para.uid.clone()
            ]
        );
    }

    #[tokio::test]
    async fn element_references_are_followed_through_collections() {
        let store = Arc::new(MemoryStore::new());

        let thumb = ContentNode::new(NodeKind::Image);
        let extra = ContentNode::new(NodeKind::Image);
        let mut video = ContentNode::new(NodeKind::Video);
        video
            .set_element("thumbnail", ElementValue::Ref(thumb.uid.clone()))
            .unwrap();
        video
            .set_element(
                "src",
                ElementValue::Many(vec![
                    ElementValue::Text("https://example.test/v.mp4".into()),
                    ElementValue::Ref(extra.uid.clone()),
                ]),
            )
            .unwrap();
        let mut root = ContentNode::new(NodeKind::Section);
        root.push_child(video.uid.clone()).unwrap();

        seed(&store, &[&root, &video, &thumb, &extra]).await;

        let uids = walker(&store)
            .gather_uids(&root.uid, &OverlayResolver::none())
            .await
            .unwrap();
        assert!(uids.contains(&thumb.uid));
        assert!(uids.contains(&extra.uid));
    }

    #[tokio::test]
    async fn dangling_references_are_skipped() {
        let store = Arc::new(MemoryStore::new());

        let mut root = ContentNode::new(NodeKind::Section);
        root.push_child(Uid::generate()).unwrap();
        seed(&store, &[&root]).await;

        let uids = walker(&store)
            .gather_uids(&root.uid, &OverlayResolver::none())
            .await
            .unwrap();
        assert_eq!(uids, vec![root.uid.clone()]);
    }

    #[tokio::test]
    async fn overlay_reveals_drafted_children() {
        let store = Arc::new(MemoryStore::new());

        let published = ContentNode::new(NodeKind::Paragraph);
        let drafted_in = ContentNode::new(NodeKind::Paragraph);
        let mut root = ContentNode::new(NodeKind::Section);
        root.push_child(published.uid.clone()).unwrap();

        let mut draft = Revision::draft_of(&root);
        draft
            .set_children(vec![drafted_in.uid.clone()])
            .unwrap();

        seed(&store, &[&root, &published, &drafted_in]).await;

        let w = walker(&store);
        let without = w
            .gather_uids(&root.uid, &OverlayResolver::none())
            .await
            .unwrap();
        assert!(without.contains(&published.uid));
        assert!(!without.contains(&drafted_in.uid));

        let overlaid = w
            .gather_uids(&root.uid, &OverlayResolver::from_drafts(vec![draft]))
            .await
            .unwrap();
        assert!(overlaid.contains(&drafted_in.uid));
        assert!(!overlaid.contains(&published.uid));
    }

    #[tokio::test]
    async fn to_delete_drafts_do_not_substitute() {
        let store = Arc::new(MemoryStore::new());

        let child = ContentNode::new(NodeKind::Paragraph);
        let mut root = ContentNode::new(NodeKind::Section);
        root.push_child(child.uid.clone()).unwrap();

        let mut draft = Revision::draft_of(&root);
        draft.state = DraftState::ToDelete;
        draft.set_children(Vec::new()).unwrap();

        seed(&store, &[&root, &child]).await;

        let uids = walker(&store)
            .gather_uids(&root.uid, &OverlayResolver::from_drafts(vec![draft]))
            .await
            .unwrap();
        assert!(uids.contains(&child.uid), "current children remain visible");
    }
}
