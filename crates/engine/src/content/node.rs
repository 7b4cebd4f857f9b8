use std::fmt;
use std::str::FromStr;

use chrono::Utc;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::content::registry::NodeKind;
use crate::error::ValidationError;

/// Length of a content identifier: 32 lowercase hex characters.
pub const UID_LEN: usize = 32;

/// Stable content identifier, minted once per node and never reused.
///
/// Derived by hashing a UUIDv7 so identifiers stay opaque while remaining
/// roughly time-ordered at generation time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Uid(String);

impl Uid {
    /// Mints a fresh identifier.
    pub fn generate() -> Self {
        let seed = Uuid::now_v7();
        let digest = Sha256::digest(seed.as_bytes());
        let mut hex = hex::encode(digest);
        hex.truncate(UID_LEN);
        Self(hex)
    }

    /// Validates and wraps an identifier received from outside the engine.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let valid = raw.len() == UID_LEN
            && raw
                .bytes()
                .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'));
        if valid {
            Ok(Self(raw.to_owned()))
        } else {
            Err(ValidationError::InvalidUid(raw.to_owned()))
        }
    }

    /// Wraps a value already known to be well-formed (storage rows, fixed
    /// identities).
    pub(crate) fn from_trusted(raw: String) -> Self {
        debug_assert!(raw.len() == UID_LEN);
        Self(raw)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle state of a content node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    /// Created but never published.
    New,
    /// Published at least once.
    Normal,
    /// Scheduled for physical deletion on the next publish.
    ToDelete,
}

impl NodeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Normal => "normal",
            Self::ToDelete => "to_delete",
        }
    }
}

impl FromStr for NodeState {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(Self::New),
            "normal" => Ok(Self::Normal),
            "to_delete" => Ok(Self::ToDelete),
            other => Err(ValidationError::UnknownState(other.to_owned())),
        }
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single scalar element value.
///
/// The representation is tagged so a node reference is never confused with
/// plain text carrying the same characters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ElementValue {
    Text(String),
    Integer(i64),
    Boolean(bool),
    /// Reference to another content node.
    Ref(Uid),
    /// Generic collection; entries may nest further references.
    Many(Vec<ElementValue>),
}

impl ElementValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_node_ref(&self) -> Option<&Uid> {
        match self {
            Self::Ref(uid) => Some(uid),
            _ => None,
        }
    }

    /// Appends every node reference held by this value, in order, including
    /// references nested inside collections.
    pub fn collect_refs(&self, out: &mut Vec<Uid>) {
        match self {
            Self::Ref(uid) => out.push(uid.clone()),
            Self::Many(values) => {
                for value in values {
                    value.collect_refs(out);
                }
            }
            Self::Text(_) | Self::Integer(_) | Self::Boolean(_) => {}
        }
    }
}

/// The data a node carries: scalar elements for leaf kinds, an ordered child
/// list for containers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum NodePayload {
    Elements(IndexMap<String, ElementValue>),
    Children(Vec<Uid>),
}

impl NodePayload {
    pub fn elements(&self) -> Option<&IndexMap<String, ElementValue>> {
        match self {
            Self::Elements(map) => Some(map),
            Self::Children(_) => None,
        }
    }

    pub fn children(&self) -> Option<&[Uid]> {
        match self {
            Self::Children(list) => Some(list),
            Self::Elements(_) => None,
        }
    }
}

/// A uniquely identified unit of page content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentNode {
    pub uid: Uid,
    pub kind: NodeKind,
    pub state: NodeState,
    pub parameters: IndexMap<String, serde_json::Value>,
    pub payload: NodePayload,
    pub created: i64,
    pub modified: i64,
}

impl ContentNode {
    /// Builds a fresh node of the given kind with its type defaults and a
    /// newly minted uid.
    pub fn new(kind: NodeKind) -> Self {
        let now = Utc::now().timestamp();
        let payload = if kind.is_container() {
            NodePayload::Children(Vec::new())
        } else {
            NodePayload::Elements(IndexMap::new())
        };
        Self {
            uid: Uid::generate(),
            kind,
            state: NodeState::New,
            parameters: kind.default_parameters(),
            payload,
            created: now,
            modified: now,
        }
    }

    pub fn is_container(&self) -> bool {
        self.kind.is_container()
    }

    pub fn children(&self) -> Option<&[Uid]> {
        self.payload.children()
    }

    pub fn elements(&self) -> Option<&IndexMap<String, ElementValue>> {
        self.payload.elements()
    }

    pub fn element(&self, slot: &str) -> Option<&ElementValue> {
        self.payload.elements().and_then(|map| map.get(slot))
    }

    /// Text value of a slot, when present and textual.
    pub fn text(&self, slot: &str) -> Option<&str> {
        self.element(slot).and_then(ElementValue::as_text)
    }

    /// Sets a scalar element on one of the kind's declared slots.
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
                self.modified = Utc::now().timestamp();
                Ok(())
            }
            NodePayload::Children(_) => {
                Err(ValidationError::NotElementBearing(self.kind.as_str()))
            }
        }
    }

    /// Appends a child reference, enforcing the kind's size constraint.
    pub fn push_child(&mut self, uid: Uid) -> Result<(), ValidationError> {
        let def = self.kind.definition();
        match &mut self.payload {
            NodePayload::Children(list) => {
                if let Some(max) = def.max_children {
                    if list.len() >= max {
                        return Err(ValidationError::ContainerFull { max });
                    }
                }
                list.push(uid);
                self.modified = Utc::now().timestamp();
                Ok(())
            }
            NodePayload::Elements(_) => {
                Err(ValidationError::NotAContainer(self.kind.as_str()))
            }
        }
    }

    /// Removes a child reference; returns whether anything was removed.
    pub fn remove_child(&mut self, uid: &Uid) -> bool {
        match &mut self.payload {
            NodePayload::Children(list) => {
                let before = list.len();
                list.retain(|child| child != uid);
                let removed = list.len() != before;
                if removed {
                    self.modified = Utc::now().timestamp();
                }
                removed
            }
            NodePayload::Elements(_) => false,
        }
    }
}
