//! Crate-level error type.
//!
//! Each component keeps its own error enum; [`StratumError`] is what an
//! embedding server sees when it drives several components from one place.

use crate::config::ConfigError;
use crate::enrichment::EnrichmentError;
use crate::queue::QueueError;
use crate::storage::GraphError;
use crate::validation::ArtifactError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StratumError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Enrichment(#[from] EnrichmentError),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type Result<T> = std::result::Result<T, StratumError>;
