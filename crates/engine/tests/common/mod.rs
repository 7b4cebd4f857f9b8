#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Common test utilities for integration tests.
//!
//! Everything runs over the in-memory store and index, wired through the
//! same coordinators production uses, so tests exercise real engine code
//! end to end without external services.

#![allow(dead_code)]

use std::sync::Arc;

use bozza_engine::content::{ContentNode, ElementValue, NodeKind, NodeState, Uid};
use bozza_engine::duplicate::ContentDuplicator;
use bozza_engine::graph::ContentGraphWalker;
use bozza_engine::hook::HookDispatcher;
use bozza_engine::page::{Page, Tag};
use bozza_engine::publish::{PublishCoordinator, RollbackCoordinator};
use bozza_engine::revision::{EditorToken, Revision, RevisionStore};
use bozza_engine::search::{MemoryIndex, SearchIndex, SearchIndexSynchronizer};
use bozza_engine::store::{ContentStore, MemoryStore};

/// The engine wired over in-memory backends.
pub struct TestEngine {
    pub store: Arc<MemoryStore>,
    pub index: Arc<MemoryIndex>,
    pub revisions: RevisionStore,
    pub walker: ContentGraphWalker,
    pub publisher: PublishCoordinator,
    pub rollback: RollbackCoordinator,
    pub duplicator: ContentDuplicator,
    pub hooks: Arc<HookDispatcher>,
    pub synchronizer: SearchIndexSynchronizer,
}

impl TestEngine {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let index = Arc::new(MemoryIndex::new());
        let dyn_store: Arc<dyn ContentStore> = Arc::clone(&store) as Arc<dyn ContentStore>;
        let dyn_index: Arc<dyn SearchIndex> = Arc::clone(&index) as Arc<dyn SearchIndex>;
        let hooks = Arc::new(HookDispatcher::new());

        Self {
            revisions: RevisionStore::new(Arc::clone(&dyn_store)),
            walker: ContentGraphWalker::new(Arc::clone(&dyn_store)),
            publisher: PublishCoordinator::new(Arc::clone(&dyn_store)),
            rollback: RollbackCoordinator::new(Arc::clone(&dyn_store)),
            duplicator: ContentDuplicator::new(Arc::clone(&dyn_store), Arc::clone(&hooks)),
            synchronizer: SearchIndexSynchronizer::new(Arc::clone(&dyn_store), dyn_index),
            hooks,
            store,
            index,
        }
    }

    /// Persists nodes as committed content.
    pub async fn seed_nodes(&self, nodes: &[ContentNode]) {
        let mut tx = self.store.begin().await.expect("begin");
        for node in nodes {
            tx.upsert_node(node).await.expect("upsert node");
        }
        tx.commit().await.expect("commit");
    }

    pub async fn seed_page(&self, page: &Page) {
        let mut tx = self.store.begin().await.expect("begin");
        tx.upsert_page(page).await.expect("upsert page");
        tx.commit().await.expect("commit");
    }

    pub async fn seed_tag(&self, tag: &Tag) {
        let mut tx = self.store.begin().await.expect("begin");
        tx.upsert_tag(tag).await.expect("upsert tag");
        tx.commit().await.expect("commit");
    }

    pub async fn mark_shared(&self, uid: &Uid) {
        let mut tx = self.store.begin().await.expect("begin");
        tx.mark_shared(uid).await.expect("mark shared");
        tx.commit().await.expect("commit");
    }

    /// Committed node, panicking when absent.
    pub async fn node(&self, uid: &Uid) -> ContentNode {
        self.store
            .get_node(uid)
            .await
            .expect("get node")
            .expect("node exists")
    }

    pub async fn node_exists(&self, uid: &Uid) -> bool {
        self.store.get_node(uid).await.expect("get node").is_some()
    }

    pub async fn draft_count(&self) -> usize {
        self.store.all_revisions().await.expect("all revisions").len()
    }

    /// The live draft targeting a node, if any.
    pub async fn draft(&self, uid: &Uid) -> Option<Revision> {
        self.store.get_revision(uid).await.expect("get revision")
    }
}

impl Default for TestEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Marks a node as already published.
pub fn published(mut node: ContentNode) -> ContentNode {
    node.state = NodeState::Normal;
    node
}

pub fn title(text: &str) -> ContentNode {
    textual(NodeKind::Title, text)
}

pub fn heading(text: &str) -> ContentNode {
    textual(NodeKind::Heading, text)
}

pub fn paragraph(text: &str) -> ContentNode {
    textual(NodeKind::Paragraph, text)
}

pub fn abstract_node(text: &str) -> ContentNode {
    textual(NodeKind::Abstract, text)
}

pub fn textual(kind: NodeKind, text: &str) -> ContentNode {
    let mut node = ContentNode::new(kind);
    node.set_element("value", ElementValue::text(text))
        .expect("textual slot");
    node
}

pub fn image(src: &str) -> ContentNode {
    let mut node = ContentNode::new(NodeKind::Image);
    node.set_element("src", ElementValue::text(src))
        .expect("image src slot");
    node
}

/// A section already holding the given children, in order.
pub fn section(children: &[&ContentNode]) -> ContentNode {
    container(NodeKind::Section, children)
}

pub fn content_set(children: &[&ContentNode]) -> ContentNode {
    container(NodeKind::ContentSet, children)
}

pub fn container(kind: NodeKind, children: &[&ContentNode]) -> ContentNode {
    let mut node = ContentNode::new(kind);
    for child in children {
        node.push_child(child.uid.clone()).expect("container child");
    }
    node
}

pub fn token(name: &str) -> EditorToken {
    EditorToken::new(name)
}

/// A seeded page whose tree is `section -> [title, paragraph]`, all nodes
/// already published.
pub struct SeededPage {
    pub page: Page,
    pub root: ContentNode,
    pub title: ContentNode,
    pub body: ContentNode,
}

pub async fn seed_basic_page(engine: &TestEngine, page_title: &str) -> SeededPage {
    let title_node = published(title(page_title));
    let body = published(paragraph("Committed body text."));
    let root = published(section(&[&title_node, &body]));
    engine
        .seed_nodes(&[root.clone(), title_node.clone(), body.clone()])
        .await;

    let page = Page::new(page_title, root.uid.clone());
    engine.seed_page(&page).await;

    SeededPage {
        page,
        root,
        title: title_node,
        body,
    }
}
