use thiserror::Error;

use crate::{
    graph::errors::GraphError, pipeline::errors::PipelineError,
    provenance::errors::ProvenanceError,
};

#[derive(Debug, Error)]
pub enum PlannerError {
    #[error("PipelineError: {0}")]
    Pipeline(#[from] PipelineError),
    #[error("GraphError: {0}")]
    Graph(#[from] GraphError),
    #[error("ProvenanceError: {0}")]
    Provenance(#[from] ProvenanceError),
}
