use crate::types::SymbolId;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("Vertex not found: {0}")]
    VertexNotFound(SymbolId),

    #[error("Edge already exists from {source_id} to {target_id}")]
    DuplicateEdge {
        source_id: SymbolId,
        target_id: SymbolId,
    },
}

pub type GraphResult<T> = Result<T, GraphError>;
