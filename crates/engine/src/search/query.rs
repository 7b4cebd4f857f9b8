//! Query tree accepted by the search surface.
//!
//! The shape mirrors the JSON callers submit: an externally tagged tree of
//! clauses that the active index backend interprets. Validation happens
//! before any backend is touched so an unknown field never degrades into an
//! empty result set silently.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ValidationError;

/// Edit budget applied to fuzzy clauses that do not set their own.
pub const DEFAULT_MAX_EDITS: u8 = 2;

fn default_max_edits() -> u8 {
    DEFAULT_MAX_EDITS
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SearchQuery {
    /// Matches every document.
    MatchAll,
    /// Exact comparison against the stored value. Array fields match when
    /// any entry equals the value.
    Term { field: String, value: Value },
    /// Tokenized containment; every query token must appear in the field.
    Match { field: String, value: String },
    /// Case-insensitive prefix over the field's text.
    Prefix { field: String, value: String },
    /// Bounded edit-distance comparison against the field's tokens.
    Fuzzy {
        field: String,
        value: String,
        #[serde(default = "default_max_edits")]
        max_edits: u8,
    },
    /// Boolean combination. `must` clauses all apply, `must_not` clauses
    /// exclude, `should` clauses raise the score and, absent any `must`,
    /// at least one has to hold.
    Bool {
        #[serde(default)]
        must: Vec<SearchQuery>,
        #[serde(default)]
        should: Vec<SearchQuery>,
        #[serde(default)]
        must_not: Vec<SearchQuery>,
    },
}

impl SearchQuery {
    pub fn term(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Term {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn matching(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Match {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn prefix(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Prefix {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn fuzzy(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Fuzzy {
            field: field.into(),
            value: value.into(),
            max_edits: DEFAULT_MAX_EDITS,
        }
    }

    pub fn all_of(clauses: Vec<SearchQuery>) -> Self {
        Self::Bool {
            must: clauses,
            should: Vec::new(),
            must_not: Vec::new(),
        }
    }

    /// Every field name referenced anywhere in the tree.
    pub fn fields(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_fields(&mut out);
        out
    }

    fn collect_fields<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::MatchAll => {}
            Self::Term { field, .. }
            | Self::Match { field, .. }
            | Self::Prefix { field, .. }
            | Self::Fuzzy { field, .. } => out.push(field),
            Self::Bool {
                must,
                should,
                must_not,
            } => {
                for clause in must.iter().chain(should).chain(must_not) {
                    clause.collect_fields(out);
                }
            }
        }
    }

    /// Rejects any referenced field outside the allow-list.
    pub fn validate(&self, allowed: &[&str]) -> Result<(), ValidationError> {
        for field in self.fields() {
            if !allowed.contains(&field) {
                return Err(ValidationError::NonFilterableField(field.to_owned()));
            }
        }
        Ok(())
    }
}
