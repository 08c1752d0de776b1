use crate::graph::qsu_graph::QsuGraph;
use crate::pipeline::AuthenticatedQsu;
use crate::pipeline::errors::{Pass, PipelineError};
use crate::pipeline::pass::PassResult;
use crate::pipeline::plan_ctx::PlanCtx;
use crate::provenance::provenance::{self as qprov, QAuth};

/// Computes the initial provenance assignment for every reachable symbol,
/// turning a bare graph into an authenticated one.
pub struct ApplyProvenance;

impl ApplyProvenance {
    pub fn new() -> Self {
        ApplyProvenance
    }

    pub fn apply(&self, graph: QsuGraph, _ctx: &mut PlanCtx) -> PassResult<AuthenticatedQsu> {
        let mut auth = QAuth::new();
        qprov::compute(&graph, &mut auth).map_err(|source| PipelineError::Provenance {
            pass: Pass::ApplyProvenance,
            source,
        })?;
        auth.verify_covers(&graph)
            .map_err(|source| PipelineError::Provenance {
                pass: Pass::ApplyProvenance,
                source,
            })?;
        Ok(AuthenticatedQsu { graph, auth })
    }
}
