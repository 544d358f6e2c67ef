//! Error types for graph lookups

use crate::id::{EntityId, EntityKind};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    /// Lookup for an ID that is absent from the whole layer chain.
    ///
    /// Callers that expect absence should use `Graph::has_entity` instead.
    #[error("Entity not found: {0}")]
    EntityNotFound(EntityId),

    #[error("Invalid entity id: {0:?}")]
    InvalidId(String),

    #[error("Entity {id} is not a {expected}")]
    WrongKind { id: EntityId, expected: EntityKind },

    #[error("Index {index} out of range 0..={max}")]
    IndexOutOfRange { index: usize, max: usize },
}

pub type GraphResult<T> = Result<T, GraphError>;
