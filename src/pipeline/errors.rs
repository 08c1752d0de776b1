use std::fmt::Display;

use thiserror::Error;

use crate::graph::{errors::GraphError, name_gen::Symbol};
use crate::provenance::errors::ProvenanceError;

#[derive(Debug, Clone, Copy, Error, PartialEq)]
pub enum Pass {
    ReadLp,
    RewriteGroupByArrays,
    EliminateUnary,
    RecognizeDistinct,
    ExtractFreeMap,
    ApplyProvenance,
    ReifyBuckets,
    MinimizeAutoJoins,
    ReifyAutoJoins,
    ExpandShifts,
    ResolveOwnIdentities,
    ReifyIdentities,
    Graduate,
}

impl Display for Pass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Pass::ReadLp => write!(f, "ReadLp"),
            Pass::RewriteGroupByArrays => write!(f, "RewriteGroupByArrays"),
            Pass::EliminateUnary => write!(f, "EliminateUnary"),
            Pass::RecognizeDistinct => write!(f, "RecognizeDistinct"),
            Pass::ExtractFreeMap => write!(f, "ExtractFreeMap"),
            Pass::ApplyProvenance => write!(f, "ApplyProvenance"),
            Pass::ReifyBuckets => write!(f, "ReifyBuckets"),
            Pass::MinimizeAutoJoins => write!(f, "MinimizeAutoJoins"),
            Pass::ReifyAutoJoins => write!(f, "ReifyAutoJoins"),
            Pass::ExpandShifts => write!(f, "ExpandShifts"),
            Pass::ResolveOwnIdentities => write!(f, "ResolveOwnIdentities"),
            Pass::ReifyIdentities => write!(f, "ReifyIdentities"),
            Pass::Graduate => write!(f, "Graduate"),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum PipelineError {
    #[error("{pass}: malformed input - {detail}")]
    MalformedInput { pass: Pass, detail: String },

    #[error("Unbound variable `{name}`")]
    UnboundVariable { name: String },

    #[error(
        "{pass}: unexpected {construct} at `{symbol}`; an earlier pass should have eliminated it"
    )]
    UnexpectedConstruct {
        pass: Pass,
        symbol: Symbol,
        construct: &'static str,
    },

    #[error("{pass}: not representable in an expression at `{symbol}` - {detail}")]
    NonRepresentableInExpr {
        pass: Pass,
        symbol: Symbol,
        detail: String,
    },

    #[error("No file path found beneath `{symbol}`")]
    NoFilePathFound { symbol: Symbol },

    #[error("GraphError: {pass}: {source}")]
    Graph {
        pass: Pass,
        #[source]
        source: GraphError,
    },

    #[error("ProvenanceError: {pass}: {source}")]
    Provenance {
        pass: Pass,
        #[source]
        source: ProvenanceError,
    },

    #[error("{pass}: internal error - {detail}")]
    Internal { pass: Pass, detail: String },
}
