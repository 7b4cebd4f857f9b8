//! Documents projected into the search index.

use serde::{Deserialize, Serialize};

use crate::content::Uid;

/// Fields callers may filter on when querying page documents.
pub const PAGE_DOC_FIELDS: &[&str] = &[
    "uid",
    "doc_type",
    "title",
    "first_heading",
    "abstract",
    "plain_text",
    "tags",
    "is_online",
    "has_draft",
    "category",
    "created",
    "modified",
    "published",
    "media.kind",
    "media.source",
];

/// Discriminates the document families stored side by side in one index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocType {
    Page,
    Tag,
}

impl DocType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Page => "page",
            Self::Tag => "tag",
        }
    }
}

/// Media highlight attached to a page document, when the page carries one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRef {
    pub kind: String,
    pub source: String,
}

/// Searchable projection of one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageDocument {
    pub uid: Uid,
    pub title: String,
    pub first_heading: Option<String>,
    #[serde(rename = "abstract")]
    pub summary: Option<String>,
    pub plain_text: String,
    /// Tag names, not uids; queries filter on what editors typed.
    pub tags: Vec<String>,
    pub is_online: bool,
    pub has_draft: bool,
    pub category: Option<String>,
    pub created: i64,
    pub modified: i64,
    pub published: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media: Option<MediaRef>,
}

/// Searchable projection of one tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagDocument {
    pub uid: Uid,
    pub name: String,
}

/// Envelope stored in the index. The `doc_type` tag keeps page and tag
/// documents distinguishable inside one flat namespace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "doc_type", rename_all = "snake_case")]
pub enum SearchDocument {
    Page(PageDocument),
    Tag(TagDocument),
}

impl SearchDocument {
    pub fn id(&self) -> &Uid {
        match self {
            Self::Page(page) => &page.uid,
            Self::Tag(tag) => &tag.uid,
        }
    }

    pub fn doc_type(&self) -> DocType {
        match self {
            Self::Page(_) => DocType::Page,
            Self::Tag(_) => DocType::Tag,
        }
    }
}
