pub mod types;
pub mod symbol;
pub mod relationship;
pub mod storage;
pub mod scheduler;
pub mod resolution;
pub mod manager;
pub mod enrichment;
pub mod validation;
pub mod queue;
pub mod context;
pub mod config;
pub mod logging;
pub mod error;

pub use types::*;
pub use symbol::{Symbol, SymbolTable, SymbolReference, ReferenceContext, TypeReference};
pub use relationship::{ReferenceType, ReferenceEdge, CallSiteContext};
pub use storage::{SymbolGraph, SymbolStore, CaseInsensitiveMap};
pub use scheduler::{Priority, Scheduler, yield_now};
pub use resolution::{DeferredReferenceProcessor, ResolutionOutcome};
pub use manager::{SymbolManager, ResolutionContext};
pub use enrichment::{DetailLevel, LayeredEnrichmentService};
pub use validation::{ValidationTier, ValidationResult, Validator, ValidatorRegistry};
pub use queue::{RequestType, RequestQueueManager, WorkspaceLoadCoordinator};
pub use context::ServerContext;
pub use config::Settings;
pub use error::{StratumError, Result};
