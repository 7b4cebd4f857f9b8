//! Content node model: identifiers, states, element values, and the closed
//! kind registry.

pub mod node;
pub mod registry;

pub use node::{ContentNode, ElementValue, NodePayload, NodeState, Uid};
pub use registry::{NodeKind, TypeDef, TypeRegistry};
