//! In-memory search index.
//!
//! Documents are held as their JSON projections and scored with a small
//! relevance model: exact terms outrank prefixes, prefixes outrank analyzed
//! matches, and fuzzy hits decay with edit distance. Suitable for tests and
//! single-node deployments; a server-backed index slots in behind the same
//! trait.

use std::cmp::Ordering;
use std::fmt;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use crate::content::Uid;
use crate::search::document::{DocType, SearchDocument};
use crate::search::index::{
    SearchError, SearchHit, SearchIndex, SearchResults, SortDirection, SortSpec,
};
use crate::search::query::SearchQuery;

const TERM_WEIGHT: f64 = 3.0;
const PREFIX_WEIGHT: f64 = 2.0;

#[derive(Default)]
pub struct MemoryIndex {
    documents: DashMap<Uid, Value>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

impl fmt::Debug for MemoryIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryIndex")
            .field("documents", &self.documents.len())
            .finish()
    }
}

#[async_trait]
impl SearchIndex for MemoryIndex {
    async fn upsert(&self, document: &SearchDocument) -> Result<(), SearchError> {
        let value = serde_json::to_value(document).map_err(anyhow::Error::from)?;
        self.documents.insert(document.id().clone(), value);
        Ok(())
    }

    async fn get(&self, id: &Uid) -> Result<Option<SearchDocument>, SearchError> {
        match self.documents.get(id) {
            Some(entry) => {
                let document =
                    serde_json::from_value(entry.value().clone()).map_err(anyhow::Error::from)?;
                Ok(Some(document))
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, id: &Uid) -> Result<bool, SearchError> {
        Ok(self.documents.remove(id).is_some())
    }

    async fn search(
        &self,
        query: &SearchQuery,
        from: usize,
        size: usize,
        sort: Option<&SortSpec>,
    ) -> Result<SearchResults, SearchError> {
        let mut hits: Vec<SearchHit> = self
            .documents
            .iter()
            .filter_map(|entry| {
                score(query, entry.value()).map(|score| SearchHit {
                    id: entry.key().clone(),
                    score,
                    source: entry.value().clone(),
                })
            })
            .collect();

        match sort {
            Some(spec) => hits.sort_by(|a, b| {
                let ordering =
                    compare_values(lookup(&a.source, &spec.field), lookup(&b.source, &spec.field));
                let ordering = match spec.direction {
                    SortDirection::Asc => ordering,
                    SortDirection::Desc => ordering.reverse(),
                };
                ordering.then_with(|| a.id.cmp(&b.id))
            }),
            None => {
                hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
            }
        }

        let total = hits.len();
        let hits = hits.into_iter().skip(from).take(size).collect();
        Ok(SearchResults { hits, total })
    }

    async fn ids(&self, doc_type: DocType) -> Result<Vec<Uid>, SearchError> {
        let mut ids: Vec<Uid> = self
            .documents
            .iter()
            .filter(|entry| {
                entry.value().get("doc_type").and_then(Value::as_str) == Some(doc_type.as_str())
            })
            .map(|entry| entry.key().clone())
            .collect();
        ids.sort();
        Ok(ids)
    }
}

/// Scores one document against the query. `None` means no match.
fn score(query: &SearchQuery, doc: &Value) -> Option<f64> {
    match query {
        SearchQuery::MatchAll => Some(1.0),
        SearchQuery::Term { field, value } => {
            let matched = match lookup(doc, field)? {
                Value::Array(entries) => entries.contains(value),
                other => other == value,
            };
            matched.then_some(TERM_WEIGHT)
        }
        SearchQuery::Match { field, value } => {
            let haystack = field_tokens(doc, field);
            if haystack.is_empty() {
                return None;
            }
            let needles = tokenize(value);
            if needles.is_empty() {
                return None;
            }
            needles
                .iter()
                .all(|needle| haystack.iter().any(|token| token == needle))
                .then_some(needles.len() as f64)
        }
        SearchQuery::Prefix { field, value } => {
            let prefix = value.to_lowercase();
            if prefix.is_empty() {
                return None;
            }
            strings_at(doc, field)
                .iter()
                .any(|text| text.to_lowercase().starts_with(&prefix))
                .then_some(PREFIX_WEIGHT)
        }
        SearchQuery::Fuzzy {
            field,
            value,
            max_edits,
        } => {
            let needle = value.to_lowercase();
            if needle.is_empty() {
                return None;
            }
            let best = field_tokens(doc, field)
                .iter()
                .map(|token| edit_distance(token, &needle))
                .min()?;
            (best <= usize::from(*max_edits)).then(|| 1.0 / (1.0 + best as f64))
        }
        SearchQuery::Bool {
            must,
            should,
            must_not,
        } => {
            if must_not.iter().any(|clause| score(clause, doc).is_some()) {
                return None;
            }
            let mut total = 0.0;
            for clause in must {
                total += score(clause, doc)?;
            }
            let mut any_should = false;
            for clause in should {
                if let Some(boost) = score(clause, doc) {
                    any_should = true;
                    total += boost;
                }
            }
            if must.is_empty() && !should.is_empty() && !any_should {
                return None;
            }
            if must.is_empty() && should.is_empty() {
                // Pure exclusion filter.
                return Some(1.0);
            }
            Some(total)
        }
    }
}

/// Resolves a dotted path such as `media.kind` inside the stored document.
fn lookup<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = doc;
    for segment in path.split('.') {
        current = current.get(segment)?;
    }
    Some(current)
}

/// Text under a field: the string itself or the string entries of an array.
fn strings_at<'a>(doc: &'a Value, field: &str) -> Vec<&'a str> {
    match lookup(doc, field) {
        Some(Value::String(text)) => vec![text.as_str()],
        Some(Value::Array(entries)) => entries.iter().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace().map(str::to_lowercase).collect()
}

fn field_tokens(doc: &Value, field: &str) -> Vec<String> {
    strings_at(doc, field).into_iter().flat_map(tokenize).collect()
}

/// Total order over optional JSON values for field sorts. Missing fields
/// sort first; mixed types rank null < bool < number < string < composite.
fn compare_values(left: Option<&Value>, right: Option<&Value>) -> Ordering {
    fn rank(value: &Value) -> u8 {
        match value {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }

    match (left, right) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => match (a, b) {
            (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
            (Value::Number(x), Value::Number(y)) => {
                let x = x.as_f64().unwrap_or(f64::NAN);
                let y = y.as_f64().unwrap_or(f64::NAN);
                x.total_cmp(&y)
            }
            (Value::String(x), Value::String(y)) => x.cmp(y),
            _ => rank(a)
                .cmp(&rank(b))
                .then_with(|| a.to_string().cmp(&b.to_string())),
        },
    }
}

/// Levenshtein distance, two-row formulation.
fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != cb);
            curr[j + 1] = substitution.min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}
