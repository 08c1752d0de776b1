use thiserror::Error;

use crate::graph::{errors::GraphError, name_gen::Symbol};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProvenanceError {
    #[error("No provenance recorded for symbol `{symbol}`")]
    MissingProvenance { symbol: Symbol },

    #[error("No grouping key recorded for symbol `{symbol}` index {index}")]
    MissingGroupKey { symbol: Symbol, index: usize },

    #[error("Identity of `{symbol}` was never materialized")]
    UnreifiedIdentity { symbol: Symbol },

    #[error("GraphError: {0}")]
    Graph(#[from] GraphError),
}
