//! Engine-wide error taxonomy.
//!
//! Component-local error types (`StoreError`, `SearchError`) live beside
//! their components and convert into [`EngineError`] at the service
//! boundary. Lease errors stay local to the lease module since no engine
//! operation takes a lease itself.

use thiserror::Error;

use crate::content::Uid;
use crate::search::index::SearchError;
use crate::store::StoreError;

/// Errors surfaced by the engine's public operations.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("content `{0}` does not exist")]
    MissingContent(Uid),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Search(#[from] SearchError),

    #[error("internal engine failure")]
    Internal(#[from] anyhow::Error),
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Synchronous validation failures, reported to the caller before any
/// storage or index work happens.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("malformed uid `{0}`")]
    InvalidUid(String),

    #[error("unknown content kind `{0}`")]
    UnknownKind(String),

    #[error("unknown state `{0}`")]
    UnknownState(String),

    #[error("kind `{kind}` has no element slot `{slot}`")]
    UnknownSlot { kind: &'static str, slot: String },

    #[error("kind `{0}` does not hold scalar elements")]
    NotElementBearing(&'static str),

    #[error("kind `{0}` is not a container")]
    NotAContainer(&'static str),

    #[error("container is full ({max} children)")]
    ContainerFull { max: usize },

    #[error("field `{0}` is not filterable")]
    NonFilterableField(String),
}
