use crate::graph::errors::GraphError;
use crate::graph::qsu_graph::QsuGraph;
use crate::pipeline::errors::{Pass, PipelineError};
use crate::pipeline::pass::{PassResult, RewritePass};
use crate::pipeline::plan_ctx::PlanCtx;
use crate::qscript::dsl;
use crate::qscript::mapfunc::MapFunc;
use crate::qscript::qscript::QScript;
use crate::qscript::types::{Access, ReduceIndex, Reducer};
use crate::transformed::Transformed;

/// Recognizes the whole-row group-and-keep-one idiom as a Distinct node so
/// the later passes treat it as row-preserving.
pub struct RecognizeDistinct;

impl RewritePass for RecognizeDistinct {
    fn pass(&self) -> Pass {
        Pass::RecognizeDistinct
    }

    fn rewrite(&self, mut graph: QsuGraph, _ctx: &mut PlanCtx) -> PassResult<Transformed<QsuGraph>> {
        let changed = graph
            .rewrite(&mut |_, pattern| {
                let QScript::Reduce(reduce) = pattern else {
                    return Ok(None);
                };
                let row = MapFunc::Free(Access::Value);
                let is_distinct_idiom = reduce.buckets == vec![row.clone()]
                    && reduce.reducers.len() == 1
                    && reduce.reducers[0].reducer == Reducer::Arbitrary
                    && reduce.reducers[0].arg == row
                    && reduce.repair == MapFunc::Free(ReduceIndex(0));
                if is_distinct_idiom {
                    Ok(Some(dsl::distinct(reduce.src)))
                } else {
                    Ok(None)
                }
            })
            .map_err(|source: GraphError| PipelineError::Graph {
                pass: Pass::RecognizeDistinct,
                source,
            })?;
        Ok(if changed {
            Transformed::Yes(graph)
        } else {
            Transformed::No(graph)
        })
    }
}

impl RecognizeDistinct {
    pub fn new() -> Self {
        RecognizeDistinct
    }
}
