pub mod case_map;
pub mod error;
pub mod graph;
pub mod memory;

pub use case_map::CaseInsensitiveMap;
pub use error::{GraphError, GraphResult};
pub use graph::{GraphEdge, GraphStats, SymbolGraph, SymbolVertex};
pub use memory::SymbolStore;
