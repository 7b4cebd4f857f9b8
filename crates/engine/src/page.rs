//! Page aggregate: one top-level container node plus publication metadata.

use std::fmt;
use std::str::FromStr;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::content::Uid;
use crate::error::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageState {
    Offline,
    Online,
    Deleted,
}

impl PageState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Offline => "offline",
            Self::Online => "online",
            Self::Deleted => "deleted",
        }
    }
}

impl FromStr for PageState {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "offline" => Ok(Self::Offline),
            "online" => Ok(Self::Online),
            "deleted" => Ok(Self::Deleted),
            other => Err(ValidationError::UnknownState(other.to_owned())),
        }
    }
}

impl fmt::Display for PageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub uid: Uid,
    pub title: String,
    /// Uid of the page's single top-level container node.
    pub root: Uid,
    pub state: PageState,
    pub category: Option<String>,
    pub tags: Vec<Uid>,
    pub created: i64,
    pub modified: i64,
    pub published: Option<i64>,
}

impl Page {
    /// New offline page over an existing root container.
    pub fn new(title: impl Into<String>, root: Uid) -> Self {
        let now = Utc::now().timestamp();
        Self {
            uid: Uid::generate(),
            title: title.into(),
            root,
            state: PageState::Offline,
            category: None,
            tags: Vec::new(),
            created: now,
            modified: now,
            published: None,
        }
    }

    pub fn is_online(&self) -> bool {
        self.state == PageState::Online
    }

    /// Flips the page online and stamps the publication time.
    pub fn put_online(&mut self) {
        let now = Utc::now().timestamp();
        self.state = PageState::Online;
        self.published = Some(now);
        self.modified = now;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub uid: Uid,
    pub name: String,
}

impl Tag {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            uid: Uid::generate(),
            name: name.into(),
        }
    }
}
