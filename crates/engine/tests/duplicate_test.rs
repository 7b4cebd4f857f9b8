#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Integration tests for ContentDuplicator.
//!
//! Covers uid minting, reference remapping, draft-overlay reads, parameter
//! carry-over, pre-save hooks, and container limits.

mod common;
use common::{content_set, heading, image, paragraph, published, section, title, token, TestEngine};

use async_trait::async_trait;
use serde_json::json;

use bozza_engine::content::{
    ContentNode, ElementValue, NodeKind, NodePayload, NodeState, Uid,
};
use bozza_engine::hook::PreSaveHook;
use bozza_engine::revision::DraftState;

/// Test that duplication mints fresh uids for every node in the tree and
/// leaves the source rows untouched.
#[tokio::test]
async fn clones_get_fresh_uids_across_the_whole_tree() {
    let engine = TestEngine::new();

    let first = published(paragraph("First entry."));
    let second = published(paragraph("Second entry."));
    let set = published(content_set(&[&first, &second]));
    let root = published(section(&[&set]));
    engine
        .seed_nodes(&[root.clone(), set.clone(), first.clone(), second.clone()])
        .await;

    let root_clone = engine
        .duplicator
        .duplicate(&root.uid, None, None, false)
        .await
        .expect("duplicate");

    assert_ne!(root_clone.uid, root.uid);
    assert_eq!(root_clone.kind, NodeKind::Section);
    assert_eq!(root_clone.state, NodeState::New);

    let set_clone_uid = root_clone.children().expect("container")[0].clone();
    assert_ne!(set_clone_uid, set.uid);
    let set_clone = engine.node(&set_clone_uid).await;
    let entry_uids = set_clone.children().expect("container").to_vec();
    assert_eq!(entry_uids.len(), 2);
    for (entry_uid, source) in entry_uids.iter().zip([&first, &second]) {
        assert_ne!(entry_uid, &source.uid);
        assert_eq!(
            engine.node(entry_uid).await.text("value"),
            source.text("value")
        );
    }

    assert_eq!(engine.node(&root.uid).await, root);
    assert_eq!(engine.node(&set.uid).await, set);
}

/// Test that element references in a clone point at the cloned nodes, not
/// back into the source tree.
#[tokio::test]
async fn element_references_point_into_the_cloned_tree() {
    let engine = TestEngine::new();

    let cover = published(image("cover.jpg"));
    let mut video = ContentNode::new(NodeKind::Video);
    video
        .set_element("src", ElementValue::text("movie.mp4"))
        .expect("src slot");
    video
        .set_element("thumbnail", ElementValue::Ref(cover.uid.clone()))
        .expect("thumbnail slot");
    let video = published(video);
    let root = published(section(&[&video]));
    engine
        .seed_nodes(&[root.clone(), video.clone(), cover.clone()])
        .await;

    let root_clone = engine
        .duplicator
        .duplicate(&root.uid, None, None, false)
        .await
        .expect("duplicate");

    let video_clone_uid = root_clone.children().expect("container")[0].clone();
    let video_clone = engine.node(&video_clone_uid).await;
    let thumbnail = video_clone
        .element("thumbnail")
        .and_then(ElementValue::as_node_ref)
        .expect("remapped thumbnail")
        .clone();

    assert_ne!(thumbnail, cover.uid);
    let cover_clone = engine.node(&thumbnail).await;
    assert_eq!(cover_clone.kind, NodeKind::Image);
    assert_eq!(cover_clone.text("src"), Some("cover.jpg"));
}

/// Test that a caller-supplied uid pins the root clone, and that source
/// parameter values override the kind defaults while undeclared ones drop.
#[tokio::test]
async fn pinned_uids_and_source_parameters_carry_over() {
    let engine = TestEngine::new();

    let mut chapter = heading("Chapter One");
    chapter.parameters.insert("level".to_owned(), json!(5));
    chapter.parameters.insert("custom".to_owned(), json!(true));
    let chapter = published(chapter);
    engine.seed_nodes(&[chapter.clone()]).await;

    let pinned = Uid::generate();
    let clone = engine
        .duplicator
        .duplicate(&chapter.uid, None, Some(pinned.clone()), false)
        .await
        .expect("duplicate");

    assert_eq!(clone.uid, pinned);
    assert_eq!(clone.text("value"), Some("Chapter One"));
    assert_eq!(clone.parameters.get("level"), Some(&json!(5)));
    assert!(clone.parameters.get("custom").is_none());
}

/// Test that duplicating through an editor token reads the draft overlay
/// and gives every clone its own draft row.
#[tokio::test]
async fn token_duplication_carries_the_edit_session_to_the_copy() {
    let engine = TestEngine::new();

    let body = published(paragraph("Committed."));
    let root = published(section(&[&body]));
    engine.seed_nodes(&[root.clone(), body.clone()]).await;

    let editor = token("alice");
    let mut draft = engine
        .revisions
        .checkout(&body, &editor)
        .await
        .expect("checkout");
    draft
        .set_element("value", ElementValue::text("Drafted text."))
        .expect("slot");
    engine.revisions.update_draft(&mut draft).await.expect("update");

    let root_clone = engine
        .duplicator
        .duplicate(&root.uid, Some(&editor), None, false)
        .await
        .expect("duplicate");

    let body_clone_uid = root_clone.children().expect("container")[0].clone();
    assert_eq!(
        engine.node(&body_clone_uid).await.text("value"),
        Some("Drafted text.")
    );

    let carried = engine.draft(&body_clone_uid).await.expect("clone draft");
    assert_eq!(carried.state, DraftState::Added);
    assert_eq!(
        carried.elements().expect("elements").get("value"),
        Some(&ElementValue::text("Drafted text."))
    );
    assert!(engine.draft(&root_clone.uid).await.is_some());
    // Source draft plus one draft per clone.
    assert_eq!(engine.draft_count().await, 3);
    assert!(engine.draft(&body.uid).await.is_some());
}

/// Test that put_online clones land in normal state with no draft rows.
#[tokio::test]
async fn put_online_clones_land_published() {
    let engine = TestEngine::new();

    let body = published(paragraph("Live copy."));
    let root = published(section(&[&body]));
    engine.seed_nodes(&[root.clone(), body.clone()]).await;

    let root_clone = engine
        .duplicator
        .duplicate(&root.uid, None, None, true)
        .await
        .expect("duplicate");

    assert_eq!(root_clone.state, NodeState::Normal);
    let body_clone_uid = root_clone.children().expect("container")[0].clone();
    assert_eq!(engine.node(&body_clone_uid).await.state, NodeState::Normal);
    assert_eq!(engine.draft_count().await, 0);
}

struct CopyStamp;

#[async_trait]
impl PreSaveHook for CopyStamp {
    async fn pre_save(
        &self,
        source: &ContentNode,
        clone: &mut ContentNode,
    ) -> anyhow::Result<()> {
        if source.kind == NodeKind::Title {
            if let Some(text) = clone.text("value").map(str::to_owned) {
                clone.set_element("value", ElementValue::text(format!("{text} (copy)")))?;
            }
        }
        Ok(())
    }
}

/// Test that registered pre-save hooks rewrite clones before they persist.
#[tokio::test]
async fn pre_save_hooks_customize_each_clone() {
    let engine = TestEngine::new();
    engine.hooks.register_pre_save(std::sync::Arc::new(CopyStamp));

    let headline = published(title("Landing"));
    let root = published(section(&[&headline]));
    engine.seed_nodes(&[root.clone(), headline.clone()]).await;

    let root_clone = engine
        .duplicator
        .duplicate(&root.uid, None, None, false)
        .await
        .expect("duplicate");

    let title_clone_uid = root_clone.children().expect("container")[0].clone();
    assert_eq!(
        engine.node(&title_clone_uid).await.text("value"),
        Some("Landing (copy)")
    );
    // The source keeps its original text.
    assert_eq!(engine.node(&headline.uid).await.text("value"), Some("Landing"));
}

/// Test that cloning a set holding more children than its kind allows keeps
/// the first max entries and drops the surplus.
#[tokio::test]
async fn container_limits_hold_when_cloning_oversized_sets() {
    let engine = TestEngine::new();

    let max = NodeKind::ContentSet
        .definition()
        .max_children
        .expect("bounded container");
    let entries: Vec<ContentNode> = (0..max + 1)
        .map(|i| published(paragraph(&format!("Entry {i}"))))
        .collect();

    // Bypass push_child to seed an over-limit row, as legacy data might hold.
    let mut set = ContentNode::new(NodeKind::ContentSet);
    set.payload = NodePayload::Children(entries.iter().map(|entry| entry.uid.clone()).collect());
    let set = published(set);

    let mut nodes = entries.clone();
    nodes.push(set.clone());
    engine.seed_nodes(&nodes).await;

    let clone = engine
        .duplicator
        .duplicate(&set.uid, None, None, false)
        .await
        .expect("duplicate");
    assert_eq!(clone.children().expect("container").len(), max);
}

/// Test that references to missing nodes are dropped from clones, both in
/// child lists and in element slots.
#[tokio::test]
async fn dangling_references_are_dropped_from_clones() {
    let engine = TestEngine::new();

    let body = published(paragraph("Sound."));
    let mut video = ContentNode::new(NodeKind::Video);
    video
        .set_element("src", ElementValue::text("movie.mp4"))
        .expect("src slot");
    video
        .set_element("thumbnail", ElementValue::Ref(Uid::generate()))
        .expect("thumbnail slot");
    let video = published(video);

    let mut root = section(&[&body, &video]);
    root.push_child(Uid::generate()).expect("child");
    let root = published(root);
    engine
        .seed_nodes(&[root.clone(), body.clone(), video.clone()])
        .await;

    let root_clone = engine
        .duplicator
        .duplicate(&root.uid, None, None, false)
        .await
        .expect("duplicate");

    let children = root_clone.children().expect("container");
    assert_eq!(children.len(), 2, "the missing child is dropped");

    let video_clone_uid = children[1].clone();
    let video_clone = engine.node(&video_clone_uid).await;
    assert_eq!(video_clone.text("src"), Some("movie.mp4"));
    assert!(
        video_clone.element("thumbnail").is_none(),
        "a reference to a missing node does not survive cloning"
    );
}
