use std::fmt;
use std::str::FromStr;

use dashmap::DashMap;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::ValidationError;

/// The closed set of content kinds the engine understands.
///
/// Every stored discriminator resolves to one of these variants before any
/// traversal or publish logic runs, so downstream code never meets an
/// unresolvable type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Section,
    ContentSet,
    Title,
    Heading,
    Paragraph,
    Abstract,
    Image,
    Video,
}

/// Static definition of a kind: shape, constraints, and declared slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeDef {
    pub container: bool,
    pub max_children: Option<usize>,
    pub element_slots: &'static [&'static str],
}

const SECTION_DEF: TypeDef = TypeDef {
    container: true,
    max_children: None,
    element_slots: &[],
};

const CONTENT_SET_DEF: TypeDef = TypeDef {
    container: true,
    max_children: Some(16),
    element_slots: &[],
};

const TEXTUAL_DEF: TypeDef = TypeDef {
    container: false,
    max_children: None,
    element_slots: &["value"],
};

const IMAGE_DEF: TypeDef = TypeDef {
    container: false,
    max_children: None,
    element_slots: &["src", "alt"],
};

const VIDEO_DEF: TypeDef = TypeDef {
    container: false,
    max_children: None,
    element_slots: &["src", "thumbnail"],
};

impl NodeKind {
    pub const ALL: [NodeKind; 8] = [
        NodeKind::Section,
        NodeKind::ContentSet,
        NodeKind::Title,
        NodeKind::Heading,
        NodeKind::Paragraph,
        NodeKind::Abstract,
        NodeKind::Image,
        NodeKind::Video,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Section => "section",
            Self::ContentSet => "content_set",
            Self::Title => "title",
            Self::Heading => "heading",
            Self::Paragraph => "paragraph",
            Self::Abstract => "abstract",
            Self::Image => "image",
            Self::Video => "video",
        }
    }

    pub fn definition(&self) -> &'static TypeDef {
        match self {
            Self::Section => &SECTION_DEF,
            Self::ContentSet => &CONTENT_SET_DEF,
            Self::Title | Self::Heading | Self::Paragraph | Self::Abstract => &TEXTUAL_DEF,
            Self::Image => &IMAGE_DEF,
            Self::Video => &VIDEO_DEF,
        }
    }

    pub fn is_container(&self) -> bool {
        self.definition().container
    }

    /// Kinds whose `value` slot feeds plain-text extraction.
    pub fn is_textual(&self) -> bool {
        matches!(self, Self::Title | Self::Heading | Self::Paragraph | Self::Abstract)
    }

    /// Kinds eligible as a page's representative media.
    pub fn is_media(&self) -> bool {
        matches!(self, Self::Image | Self::Video)
    }

    /// Kinds counted as headings for first-heading extraction.
    pub fn is_heading_like(&self) -> bool {
        matches!(self, Self::Title | Self::Heading)
    }

    /// Parameter defaults applied to every fresh node of this kind.
    pub fn default_parameters(&self) -> IndexMap<String, serde_json::Value> {
        let mut params = IndexMap::new();
        match self {
            Self::Section => {
                params.insert("layout".to_owned(), json!("default"));
            }
            Self::Heading => {
                params.insert("level".to_owned(), json!(2));
            }
            Self::Image => {
                params.insert("decorative".to_owned(), json!(false));
            }
            Self::Video => {
                params.insert("autoplay".to_owned(), json!(false));
            }
            Self::ContentSet | Self::Title | Self::Paragraph | Self::Abstract => {}
        }
        params
    }
}

impl FromStr for NodeKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|kind| kind.as_str() == s)
            .copied()
            .ok_or_else(|| ValidationError::UnknownKind(s.to_owned()))
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maps stored discriminator strings to kinds.
///
/// Canonical names are seeded at construction; deployments with legacy data
/// register aliases once at startup so old rows keep resolving.
pub struct TypeRegistry {
    kinds: DashMap<String, NodeKind>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        let kinds = DashMap::new();
        for kind in NodeKind::ALL {
            kinds.insert(kind.as_str().to_owned(), kind);
        }
        Self { kinds }
    }

    /// Registers an additional discriminator for a kind.
    pub fn register_alias(&self, alias: impl Into<String>, kind: NodeKind) {
        self.kinds.insert(alias.into(), kind);
    }

    /// Resolves a discriminator to its kind.
    pub fn resolve(&self, discriminator: &str) -> Result<NodeKind, ValidationError> {
        self.kinds
            .get(discriminator)
            .map(|entry| *entry.value())
            .ok_or_else(|| ValidationError::UnknownKind(discriminator.to_owned()))
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("kinds", &self.kinds.len())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn canonical_names_round_trip() {
        for kind in NodeKind::ALL {
            assert_eq!(kind.as_str().parse::<NodeKind>().unwrap(), kind);
        }
    }

    #[test]
    fn registry_resolves_aliases() {
        let registry = TypeRegistry::new();
        assert_eq!(registry.resolve("paragraph").unwrap(), NodeKind::Paragraph);

        registry.register_alias("textblock", NodeKind::Paragraph);
        assert_eq!(registry.resolve("textblock").unwrap(), NodeKind::Paragraph);
    }

    #[test]
    fn unknown_discriminators_fail_loudly() {
        let registry = TypeRegistry::new();
        let err = registry.resolve("widget").unwrap_err();
        assert_eq!(err, ValidationError::UnknownKind("widget".into()));
    }

    #[test]
    fn containers_carry_no_element_slots() {
        assert!(NodeKind::Section.is_container());
        assert!(NodeKind::Section.definition().element_slots.is_empty());
        assert!(!NodeKind::Paragraph.is_container());
        assert_eq!(NodeKind::Paragraph.definition().element_slots, &["value"]);
    }
}
