//! Structural diffing between a node's current data and its draft.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::content::{ContentNode, ElementValue, NodePayload, Uid};
use crate::revision::Revision;

/// Why a node's domain commit refused a diff. Publish catches these per node
/// and keeps going.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommitError {
    #[error("kind `{kind}` has no element slot `{slot}`")]
    UnknownSlot { kind: &'static str, slot: String },

    #[error("child list exceeds the container limit ({got} of {max})")]
    TooManyChildren { max: usize, got: usize },

    #[error("diff shape does not fit kind `{0}`")]
    ShapeMismatch(&'static str),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementChange {
    pub slot: String,
    pub from: Option<ElementValue>,
    pub to: Option<ElementValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterChange {
    pub name: String,
    pub from: Option<serde_json::Value>,
    pub to: Option<serde_json::Value>,
}

/// Child lists are compared and replaced as one unit; reordering alone is a
/// change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChildListChange {
    pub from: Vec<Uid>,
    pub to: Vec<Uid>,
}

/// Per-slot and per-parameter description of what a draft changes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructuralDiff {
    pub elements: Vec<ElementChange>,
    pub parameters: Vec<ParameterChange>,
    pub children: Option<ChildListChange>,
}

impl StructuralDiff {
    /// Compares a node's current data against its draft.
    pub fn compute(current: &ContentNode, draft: &Revision) -> Self {
        let mut diff = Self::default();

        for name in current.parameters.keys() {
            let from = current.parameters.get(name);
            let to = draft.parameters.get(name);
            if from != to {
                diff.parameters.push(ParameterChange {
                    name: name.clone(),
                    from: from.cloned(),
                    to: to.cloned(),
                });
            }
        }
        for (name, value) in &draft.parameters {
            if !current.parameters.contains_key(name) {
                diff.parameters.push(ParameterChange {
                    name: name.clone(),
                    from: None,
                    to: Some(value.clone()),
                });
            }
        }

        match (&current.payload, &draft.payload) {
            (NodePayload::Elements(cur), NodePayload::Elements(drafted)) => {
                for slot in cur.keys() {
                    let from = cur.get(slot);
                    let to = drafted.get(slot);
                    if from != to {
                        diff.elements.push(ElementChange {
                            slot: slot.clone(),
                            from: from.cloned(),
                            to: to.cloned(),
                        });
                    }
                }
                for (slot, value) in drafted {
                    if !cur.contains_key(slot) {
                        diff.elements.push(ElementChange {
                            slot: slot.clone(),
                            from: None,
                            to: Some(value.clone()),
                        });
                    }
                }
            }
            (NodePayload::Children(cur), NodePayload::Children(drafted)) => {
                if cur != drafted {
                    diff.children = Some(ChildListChange {
                        from: cur.clone(),
                        to: drafted.clone(),
                    });
                }
            }
            // Shape confusion between node and draft: take the draft side
            // wholesale so commit validation can reject it.
            (_, NodePayload::Children(drafted)) => {
                diff.children = Some(ChildListChange {
                    from: current.children().unwrap_or_default().to_vec(),
                    to: drafted.clone(),
                });
            }
            (_, NodePayload::Elements(drafted)) => {
                for (slot, value) in drafted {
                    diff.elements.push(ElementChange {
                        slot: slot.clone(),
                        from: None,
                        to: Some(value.clone()),
                    });
                }
            }
        }

        diff
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty() && self.parameters.is_empty() && self.children.is_none()
    }

    /// The node's domain commit: applies the diff to the current data,
    /// validating against the kind's definition.
    pub fn apply_to(&self, node: &mut ContentNode) -> Result<(), CommitError> {
        let def = node.kind.definition();

        if let Some(change) = &self.children {
            if !def.container {
                return Err(CommitError::ShapeMismatch(node.kind.as_str()));
            }
            if let Some(max) = def.max_children {
                if change.to.len() > max {
                    return Err(CommitError::TooManyChildren {
                        max,
                        got: change.to.len(),
                    });
                }
            }
        }
        if !self.elements.is_empty() && def.container {
            return Err(CommitError::ShapeMismatch(node.kind.as_str()));
        }
        for change in &self.elements {
            if change.to.is_some() && !def.element_slots.contains(&change.slot.as_str()) {
                return Err(CommitError::UnknownSlot {
                    kind: node.kind.as_str(),
                    slot: change.slot.clone(),
                });
            }
        }

        if let Some(change) = &self.children {
            node.payload = NodePayload::Children(change.to.clone());
        }
        if let NodePayload::Elements(map) = &mut node.payload {
            for change in &self.elements {
                match &change.to {
                    Some(value) => {
                        map.insert(change.slot.clone(), value.clone());
                    }
                    None => {
                        map.shift_remove(&change.slot);
                    }
                }
            }
        }
        for change in &self.parameters {
            match &change.to {
                Some(value) => {
                    node.parameters.insert(change.name.clone(), value.clone());
                }
                None => {
                    node.parameters.shift_remove(&change.name);
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::content::{NodeKind, NodeState, Uid};
    use serde_json::json;

    fn paragraph(text: &str) -> ContentNode {
        let mut node = ContentNode::new(NodeKind::Paragraph);
        node.set_element("value", ElementValue::Text(text.into()))
            .unwrap();
        node.state = NodeState::Normal;
        node
    }

    #[test]
    fn untouched_drafts_produce_an_empty_diff() {
        let node = paragraph("same");
        let draft = Revision::draft_of(&node);
        assert!(StructuralDiff::compute(&node, &draft).is_empty());
    }

    #[test]
    fn element_edits_are_reported_per_slot() {
        let node = paragraph("before");
        let mut draft = Revision::draft_of(&node);
        draft
            .set_element("value", ElementValue::Text("after".into()))
            .unwrap();

        let diff = StructuralDiff::compute(&node, &draft);
        assert_eq!(diff.elements.len(), 1);
        assert_eq!(diff.elements[0].slot, "value");
        assert_eq!(
            diff.elements[0].to,
            Some(ElementValue::Text("after".into()))
        );
        assert!(diff.children.is_none());
    }

    #[test]
    fn child_lists_diff_as_one_unit() {
        let a = Uid::generate();
        let b = Uid::generate();
        let mut node = ContentNode::new(NodeKind::Section);
        node.push_child(a.clone()).unwrap();
        node.push_child(b.clone()).unwrap();

        // Reordering alone counts as a change.
        let mut draft = Revision::draft_of(&node);
        draft.set_children(vec![b.clone(), a.clone()]).unwrap();

        let diff = StructuralDiff::compute(&node, &draft);
        let change = diff.children.unwrap();
        assert_eq!(change.from, vec![a.clone(), b.clone()]);
        assert_eq!(change.to, vec![b, a]);
    }

    #[test]
    fn parameter_edits_and_removals_are_tracked() {
        let mut node = paragraph("text");
        node.parameters.insert("indent".into(), json!(1));

        let mut draft = Revision::draft_of(&node);
        draft.parameters.shift_remove("indent");
        draft.parameters.insert("align".into(), json!("left"));

        let diff = StructuralDiff::compute(&node, &draft);
        assert_eq!(diff.parameters.len(), 2);
        assert!(diff
            .parameters
            .iter()
            .any(|c| c.name == "indent" && c.to.is_none()));
        assert!(diff
            .parameters
            .iter()
            .any(|c| c.name == "align" && c.from.is_none()));
    }

    #[test]
    fn apply_updates_the_node_in_place() {
        let mut node = paragraph("before");
        let mut draft = Revision::draft_of(&node);
        draft
            .set_element("value", ElementValue::Text("after".into()))
            .unwrap();
        draft.parameters.insert("align".into(), json!("left"));

        let diff = StructuralDiff::compute(&node, &draft);
        diff.apply_to(&mut node).unwrap();

        assert_eq!(node.text("value"), Some("after"));
        assert_eq!(node.parameters.get("align"), Some(&json!("left")));
    }

    #[test]
    fn apply_refuses_oversized_child_lists() {
        let mut node = ContentNode::new(NodeKind::ContentSet);
        let max = NodeKind::ContentSet.definition().max_children.unwrap();

        let mut draft = Revision::draft_of(&node);
        let oversized: Vec<Uid> = (0..max + 1).map(|_| Uid::generate()).collect();
        draft.set_children(oversized).unwrap();

        let diff = StructuralDiff::compute(&node, &draft);
        let err = diff.apply_to(&mut node).unwrap_err();
        assert_eq!(err, CommitError::TooManyChildren { max, got: max + 1 });
        // The node keeps its previous list when the commit is refused.
        assert!(node.children().unwrap().is_empty());
    }

    #[test]
    fn apply_refuses_undeclared_slots() {
        let mut node = paragraph("text");
        let diff = StructuralDiff {
            elements: vec![ElementChange {
                slot: "sidebar".into(),
                from: None,
                to: Some(ElementValue::Text("x".into())),
            }],
            ..StructuralDiff::default()
        };
        let err = diff.apply_to(&mut node).unwrap_err();
        assert!(matches!(err, CommitError::UnknownSlot { .. }));
    }
}
