use crate::pipeline::AuthenticatedQsu;
use crate::pipeline::errors::{Pass, PipelineError};
use crate::pipeline::pass::{PassResult, RewritePass};
use crate::pipeline::plan_ctx::PlanCtx;
use crate::provenance::provenance::GroupKey;
use crate::qscript::qscript::QScript;
use crate::transformed::Transformed;

/// Makes grouping explicit: every bucket expression of every Reduce is
/// recorded under a stable key in the authentication map, where group-aware
/// consumers (sorts over grouped data, bucket provenance) can address it.
pub struct ReifyBuckets;

impl RewritePass for ReifyBuckets {
    fn pass(&self) -> Pass {
        Pass::ReifyBuckets
    }

    fn rewrite_authenticated(
        &self,
        mut qsu: AuthenticatedQsu,
        _ctx: &mut PlanCtx,
    ) -> PassResult<Transformed<AuthenticatedQsu>> {
        let order = qsu
            .graph
            .topological_order()
            .map_err(|source| PipelineError::Graph {
                pass: Pass::ReifyBuckets,
                source,
            })?;
        for symbol in order {
            let Ok(QScript::Reduce(reduce)) = qsu.graph.pattern(symbol) else {
                continue;
            };
            let buckets: Vec<_> = reduce.buckets.clone();
            for (index, bucket) in buckets.into_iter().enumerate() {
                qsu.auth.record_key(GroupKey { symbol, index }, bucket);
            }
        }
        // the graph itself is unchanged; only the authentication map grows
        Ok(Transformed::No(qsu))
    }
}

impl ReifyBuckets {
    pub fn new() -> Self {
        ReifyBuckets
    }
}
