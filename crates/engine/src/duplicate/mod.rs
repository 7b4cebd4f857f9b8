//! Deep duplication of content trees.
//!
//! Cloning reads the source tree through the caller's draft overlay, mints a
//! fresh uid per reachable node, and rewrites every internal reference so the
//! copy stands alone. Source nodes are never touched.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::{info, warn};

use crate::content::{ContentNode, ElementValue, NodePayload, NodeState, Uid};
use crate::error::{EngineError, EngineResult};
use crate::graph::{ContentGraphWalker, OverlayResolver};
use crate::hook::HookDispatcher;
use crate::revision::{EditorToken, Revision};
use crate::store::ContentStore;

/// Clones whole content trees, uid-fresh and reference-remapped.
#[derive(Clone)]
pub struct ContentDuplicator {
    store: Arc<dyn ContentStore>,
    walker: ContentGraphWalker,
    hooks: Arc<HookDispatcher>,
}

impl ContentDuplicator {
    pub fn new(store: Arc<dyn ContentStore>, hooks: Arc<HookDispatcher>) -> Self {
        let walker = ContentGraphWalker::new(Arc::clone(&store));
        Self {
            store,
            walker,
            hooks,
        }
    }

    /// Duplicates the tree rooted at `source` and returns the root clone.
    ///
    /// When `token` is given the tree is read through that editor's draft
    /// overlay and every clone also receives a draft row, so an in-progress
    /// edit session carries over to the copy. `new_uid` pins the root clone's
    /// uid; descendants always get minted uids. With `put_online` the clones
    /// land in `Normal` state, otherwise they stay `New` until published.
    ///
    /// The clones are persisted here, in one transaction. Attaching the root
    /// clone somewhere (a page, a parent container) is the caller's job.
    pub async fn duplicate(
        &self,
        source: &Uid,
        token: Option<&EditorToken>,
        new_uid: Option<Uid>,
        put_online: bool,
    ) -> EngineResult<ContentNode> {
        let overlay = match token {
            Some(token) => OverlayResolver::for_token(self.store.as_ref(), token).await?,
            None => OverlayResolver::none(),
        };

        let reachable = self.walker.gather_uids(source, &overlay).await?;
        let nodes = self.store.get_nodes(&reachable).await?;
        if nodes.first().map(|node| &node.uid) != Some(source) {
            return Err(EngineError::MissingContent(source.clone()));
        }

        let root_uid = new_uid.unwrap_or_else(Uid::generate);
        let mapping: HashMap<Uid, Uid> = nodes
            .iter()
            .map(|node| {
                let fresh = if node.uid == *source {
                    root_uid.clone()
                } else {
                    Uid::generate()
                };
                (node.uid.clone(), fresh)
            })
            .collect();

        let mut clones = Vec::with_capacity(nodes.len());
        for node in &nodes {
            let Some(fresh) = mapping.get(&node.uid) else {
                continue; // mapping is built from this same list
            };
            let mut clone = ContentNode::new(node.kind);
            clone.uid = fresh.clone();
            clone.state = if put_online {
                NodeState::Normal
            } else {
                NodeState::New
            };

            match overlay.payload_for(node) {
                NodePayload::Children(children) => {
                    for child in children {
                        let Some(mapped) = mapping.get(child) else {
                            warn!(
                                node = %node.uid,
                                child = %child,
                                "dangling child reference dropped from clone"
                            );
                            continue;
                        };
                        if let Err(error) = clone.push_child(mapped.clone()) {
                            warn!(node = %clone.uid, %error, "child skipped while cloning");
                        }
                    }
                }
                NodePayload::Elements(elements) => {
                    for (slot, value) in elements {
                        let Some(value) = remap(value, &mapping) else {
                            warn!(
                                node = %node.uid,
                                slot = %slot,
                                "dangling element reference dropped from clone"
                            );
                            continue;
                        };
                        if clone.is_container() {
                            // A draft can leave elements on a container kind.
                            // Referenced nodes survive as appended children.
                            if let Some(child) = value.as_node_ref() {
                                if let Err(error) = clone.push_child(child.clone()) {
                                    warn!(
                                        node = %clone.uid,
                                        %error,
                                        "child skipped while cloning"
                                    );
                                }
                            }
                        } else if let Err(error) = clone.set_element(slot, value) {
                            warn!(
                                node = %clone.uid,
                                slot = %slot,
                                %error,
                                "element skipped while cloning"
                            );
                        }
                    }
                }
            }

            // The clone keeps its kind defaults unless the source carries a
            // value under the same parameter name.
            let source_parameters = overlay.parameters_for(node);
            let defaults: Vec<String> = clone.parameters.keys().cloned().collect();
            for name in defaults {
                if let Some(value) = source_parameters.get(&name) {
                    clone.parameters.insert(name, value.clone());
                }
            }

            self.hooks.dispatch_pre_save(node, &mut clone).await;
            clones.push(clone);
        }

        let mut tx = self.store.begin().await?;
        for clone in &clones {
            tx.upsert_node(clone).await?;
        }
        if token.is_some() {
            for clone in &clones {
                tx.upsert_revision(&Revision::draft_of(clone)).await?;
            }
        }
        tx.commit().await?;

        let total = clones.len();
        let root = clones
            .into_iter()
            .next()
            .ok_or_else(|| EngineError::MissingContent(source.clone()))?;
        info!(source = %source, clone = %root.uid, nodes = total, "content tree duplicated");
        Ok(root)
    }
}

impl fmt::Debug for ContentDuplicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentDuplicator").finish_non_exhaustive()
    }
}

/// Rewrites node references through the uid mapping. Returns `None` when a
/// lone reference points outside the cloned tree; unmapped entries inside
/// collections are dropped individually.
fn remap(value: &ElementValue, mapping: &HashMap<Uid, Uid>) -> Option<ElementValue> {
    match value {
        ElementValue::Ref(uid) => mapping.get(uid).cloned().map(ElementValue::Ref),
        ElementValue::Many(values) => Some(ElementValue::Many(
            values
                .iter()
                .filter_map(|value| remap(value, mapping))
                .collect(),
        )),
        other => Some(other.clone()),
    }
}
