use crate::graph::qsu_graph::QsuGraph;
use crate::pipeline::AuthenticatedQsu;
use crate::pipeline::errors::{Pass, PipelineError};
use crate::pipeline::plan_ctx::PlanCtx;
use crate::transformed::Transformed;

pub type PassResult<T> = Result<T, PipelineError>;

/// One graph-to-graph pipeline stage. Passes before provenance implement
/// `rewrite`; provenance-aware passes implement `rewrite_authenticated`.
pub trait RewritePass {
    fn pass(&self) -> Pass;

    fn rewrite(&self, graph: QsuGraph, _ctx: &mut PlanCtx) -> PassResult<Transformed<QsuGraph>> {
        Ok(Transformed::No(graph))
    }

    fn rewrite_authenticated(
        &self,
        qsu: AuthenticatedQsu,
        _ctx: &mut PlanCtx,
    ) -> PassResult<Transformed<AuthenticatedQsu>> {
        Ok(Transformed::No(qsu))
    }
}
