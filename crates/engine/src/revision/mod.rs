//! Draft revisions: the uncommitted alternate version of a content node.

pub mod diff;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::content::{ContentNode, ElementValue, NodeKind, NodePayload, NodeState, Uid};
use crate::error::{EngineResult, ValidationError};
use crate::store::ContentStore;

pub use diff::{CommitError, StructuralDiff};

/// Fixed owner identity every editor token resolves to.
///
/// Draft rows are keyed by content uid alone, so all editors observe and
/// overwrite one draft per node.
pub const SHARED_OWNER_HEX: &str = "00000000000000000000000000000000";

pub fn shared_owner() -> Uid {
    Uid::from_trusted(SHARED_OWNER_HEX.to_owned())
}

/// Maps an editor token to the owner identity drafts are stored under.
///
/// Per-editor draft isolation, if ever wanted, changes only this mapping.
pub fn resolve_owner(_token: &EditorToken) -> Uid {
    shared_owner()
}

/// Opaque identity of the current editor. Its absence on read paths means
/// "published-only" view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditorToken(String);

impl EditorToken {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Token used by unattended jobs.
    pub fn system() -> Self {
        Self("system".to_owned())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EditorToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DraftState {
    /// Drafts a node that has never been published.
    Added,
    /// Drafts changes to a published node.
    Modified,
    /// Schedules the node for physical deletion.
    ToDelete,
}

impl DraftState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Modified => "modified",
            Self::ToDelete => "to_delete",
        }
    }
}

impl FromStr for DraftState {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "added" => Ok(Self::Added),
            "modified" => Ok(Self::Modified),
            "to_delete" => Ok(Self::ToDelete),
            other => Err(ValidationError::UnknownState(other.to_owned())),
        }
    }
}

impl fmt::Display for DraftState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A live draft for one content node. At most one exists per node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Revision {
    pub target: Uid,
    pub owner: Uid,
    pub kind: NodeKind,
    pub state: DraftState,
    pub payload: NodePayload,
    pub parameters: IndexMap<String, serde_json::Value>,
    pub created: i64,
    pub modified: i64,
}

impl Revision {
    /// Snapshots a node's current data as its draft starting point.
    pub fn draft_of(node: &ContentNode) -> Self {
        let now = Utc::now().timestamp();
        let state = if node.state == NodeState::New {
            DraftState::Added
        } else {
            DraftState::Modified
        };
        Self {
            target: node.uid.clone(),
            owner: shared_owner(),
            kind: node.kind,
            state,
            payload: node.payload.clone(),
            parameters: node.parameters.clone(),
            created: now,
            modified: now,
        }
    }

    pub fn elements(&self) -> Option<&IndexMap<String, ElementValue>> {
        self.payload.elements()
    }

    pub fn children(&self) -> Option<&[Uid]> {
        self.payload.children()
    }

    /// Drafts a new value for one of the kind's declared slots.
    pub fn set_element(
        &mut self,
        slot: &str,
        value: ElementValue,
    ) -> Result<(), ValidationError> {
        let def = self.kind.definition();
        if def.container {
            return Err(ValidationError::NotElementBearing(self.kind.as_str()));
        }
        if !def.element_slots.contains(&slot) {
            return Err(ValidationError::UnknownSlot {
                kind: self.kind.as_str(),
                slot: slot.to_owned(),
            });
        }
        match &mut self.payload {
            NodePayload::Elements(map) => {
                map.insert(slot.to_owned(), value);
                Ok(())
            }
            NodePayload::Children(_) => {
                Err(ValidationError::NotElementBearing(self.kind.as_str()))
            }
        }
    }

    /// Drafts a replacement child list for a container node.
    pub fn set_children(&mut self, children: Vec<Uid>) -> Result<(), ValidationError> {
        if !self.kind.is_container() {
            return Err(ValidationError::NotAContainer(self.kind.as_str()));
        }
        self.payload = NodePayload::Children(children);
        Ok(())
    }
}

/// Draft CRUD over the content store. Every operation is its own small
/// transaction; the publish and rollback coordinators bypass this service
/// and manage drafts inside their own transaction instead.
#[derive(Clone)]
pub struct RevisionStore {
    store: Arc<dyn ContentStore>,
}

impl RevisionStore {
    pub fn new(store: Arc<dyn ContentStore>) -> Self {
        Self { store }
    }

    /// Returns the node's draft, creating it from the current data when none
    /// exists yet.
    pub async fn checkout(
        &self,
        node: &ContentNode,
        token: &EditorToken,
    ) -> EngineResult<Revision> {
        if let Some(existing) = self.store.get_revision(&node.uid).await? {
            return Ok(existing);
        }
        let revision = Revision::draft_of(node);
        let mut tx = self.store.begin().await?;
        tx.upsert_revision(&revision).await?;
        tx.commit().await?;
        debug!(target = %node.uid, token = %token, state = %revision.state, "draft checked out");
        Ok(revision)
    }

    pub async fn get_draft(
        &self,
        node: &ContentNode,
        token: &EditorToken,
        checkout_on_missing: bool,
    ) -> EngineResult<Option<Revision>> {
        if let Some(existing) = self.store.get_revision(&node.uid).await? {
            return Ok(Some(existing));
        }
        if checkout_on_missing {
            return Ok(Some(self.checkout(node, token).await?));
        }
        Ok(None)
    }

    /// Persists edited draft data and stamps the modification time.
    pub async fn update_draft(&self, revision: &mut Revision) -> EngineResult<()> {
        revision.modified = Utc::now().timestamp();
        let mut tx = self.store.begin().await?;
        tx.upsert_revision(revision).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Flags a node for deletion on the next publish, creating the draft
    /// first when absent.
    pub async fn mark_to_delete(
        &self,
        node: &ContentNode,
        token: &EditorToken,
    ) -> EngineResult<Revision> {
        let mut revision = self.checkout(node, token).await?;
        revision.state = DraftState::ToDelete;
        revision.modified = Utc::now().timestamp();
        let mut tx = self.store.begin().await?;
        tx.upsert_revision(&revision).await?;
        tx.commit().await?;
        debug!(target = %node.uid, token = %token, "draft marked for deletion");
        Ok(revision)
    }

    /// Every live draft visible to the token. All tokens share one owner, so
    /// this is every live draft, period.
    pub async fn all_drafts(&self, token: &EditorToken) -> EngineResult<Vec<Revision>> {
        let _ = token;
        Ok(self.store.all_revisions().await?)
    }

    /// Live drafts targeting any of the given uids.
    pub async fn drafts_for(&self, uids: &[Uid]) -> EngineResult<Vec<Revision>> {
        Ok(self.store.revisions_for(uids).await?)
    }

    pub async fn discard(&self, target: &Uid) -> EngineResult<()> {
        let mut tx = self.store.begin().await?;
        tx.delete_revision(target).await?;
        tx.commit().await?;
        debug!(target = %target, "draft discarded");
        Ok(())
    }
}

impl fmt::Debug for RevisionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RevisionStore").finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::content::NodeKind;
    use crate::store::MemoryStore;

    fn service() -> (Arc<MemoryStore>, RevisionStore) {
        let store = Arc::new(MemoryStore::new());
        let revisions = RevisionStore::new(Arc::clone(&store) as Arc<dyn ContentStore>);
        (store, revisions)
    }

    async fn seed(store: &MemoryStore, node: &ContentNode) {
        let mut tx = store.begin().await.unwrap();
        tx.upsert_node(node).await.unwrap();
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn checkout_snapshots_current_data() {
        let (store, revisions) = service();
        let mut node = ContentNode::new(NodeKind::Paragraph);
        node.set_element("value", ElementValue::Text("published".into()))
            .unwrap();
        node.state = NodeState::Normal;
        seed(&store, &node).await;

        let draft = revisions
            .checkout(&node, &EditorToken::new("alice"))
            .await
            .unwrap();
        assert_eq!(draft.state, DraftState::Modified);
        assert_eq!(
            draft.elements().unwrap().get("value"),
            Some(&ElementValue::Text("published".into()))
        );
    }

    #[tokio::test]
    async fn new_nodes_check_out_as_added() {
        let (store, revisions) = service();
        let node = ContentNode::new(NodeKind::Title);
        seed(&store, &node).await;

        let draft = revisions
            .checkout(&node, &EditorToken::new("alice"))
            .await
            .unwrap();
        assert_eq!(draft.state, DraftState::Added);
    }

    #[tokio::test]
    async fn every_token_sees_the_same_draft() {
        let (store, revisions) = service();
        let node = ContentNode::new(NodeKind::Paragraph);
        seed(&store, &node).await;

        let alice = EditorToken::new("alice");
        let bob = EditorToken::new("bob");

        let mut draft = revisions.checkout(&node, &alice).await.unwrap();
        draft
            .set_element("value", ElementValue::Text("from alice".into()))
            .unwrap();
        revisions.update_draft(&mut draft).await.unwrap();

        let seen_by_bob = revisions
            .get_draft(&node, &bob, false)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(seen_by_bob.owner, shared_owner());
        assert_eq!(
            seen_by_bob.elements().unwrap().get("value"),
            Some(&ElementValue::Text("from alice".into()))
        );
    }

    #[tokio::test]
    async fn get_draft_can_create_on_miss() {
        let (store, revisions) = service();
        let node = ContentNode::new(NodeKind::Paragraph);
        seed(&store, &node).await;
        let token = EditorToken::new("alice");

        assert!(revisions
            .get_draft(&node, &token, false)
            .await
            .unwrap()
            .is_none());
        assert!(revisions
            .get_draft(&node, &token, true)
            .await
            .unwrap()
            .is_some());
        assert!(revisions
            .get_draft(&node, &token, false)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn mark_to_delete_flips_existing_drafts() {
        let (store, revisions) = service();
        let mut node = ContentNode::new(NodeKind::Paragraph);
        node.state = NodeState::Normal;
        seed(&store, &node).await;
        let token = EditorToken::new("alice");

        revisions.checkout(&node, &token).await.unwrap();
        let draft = revisions.mark_to_delete(&node, &token).await.unwrap();
        assert_eq!(draft.state, DraftState::ToDelete);

        let stored = store.get_revision(&node.uid).await.unwrap().unwrap();
        assert_eq!(stored.state, DraftState::ToDelete);
    }

    #[tokio::test]
    async fn discard_removes_the_draft() {
        let (store, revisions) = service();
        let node = ContentNode::new(NodeKind::Paragraph);
        seed(&store, &node).await;
        let token = EditorToken::new("alice");

        revisions.checkout(&node, &token).await.unwrap();
        revisions.discard(&node.uid).await.unwrap();
        assert!(store.get_revision(&node.uid).await.unwrap().is_none());
    }
}
