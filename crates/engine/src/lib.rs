//! Bozza CMS Engine
//!
//! Draft revisions over a shared content graph, transactional publish and
//! reset, deep tree duplication, and a search projection kept in step with
//! published state. Storage and search backends sit behind traits; the
//! in-memory implementations back the test suites.

pub mod config;
pub mod content;
pub mod duplicate;
pub mod error;
pub mod graph;
pub mod hook;
pub mod lease;
pub mod page;
pub mod publish;
pub mod revision;
pub mod search;
pub mod store;

pub use error::{EngineError, EngineResult};
