use crate::graph::errors::GraphError;
use crate::graph::qsu_graph::QsuGraph;
use crate::pipeline::errors::{Pass, PipelineError};
use crate::pipeline::pass::{PassResult, RewritePass};
use crate::pipeline::plan_ctx::PlanCtx;
use crate::qscript::mapfunc::{FreeMapA, MapFunc};
use crate::qscript::qscript::QScript;
use crate::transformed::Transformed;

/// Normalizes group-by buckets: a bucket written as one array of
/// expressions becomes the flat bucket list the later passes expect.
pub struct RewriteGroupByArrays;

impl RewritePass for RewriteGroupByArrays {
    fn pass(&self) -> Pass {
        Pass::RewriteGroupByArrays
    }

    fn rewrite(&self, mut graph: QsuGraph, _ctx: &mut PlanCtx) -> PassResult<Transformed<QsuGraph>> {
        let changed = graph
            .rewrite(&mut |_, pattern| {
                let QScript::Reduce(reduce) = pattern else {
                    return Ok(None);
                };
                let mut rewritten = Vec::new();
                let mut any_split = false;
                for bucket in &reduce.buckets {
                    match as_array_elements(bucket) {
                        Some(elements) => {
                            any_split = true;
                            rewritten.extend(elements);
                        }
                        None => rewritten.push(bucket.clone()),
                    }
                }
                if !any_split {
                    return Ok(None);
                }
                let mut reduce = reduce.clone();
                reduce.buckets = rewritten;
                Ok(Some(QScript::Reduce(reduce)))
            })
            .map_err(|source: GraphError| PipelineError::Graph {
                pass: Pass::RewriteGroupByArrays,
                source,
            })?;
        Ok(if changed {
            Transformed::Yes(graph)
        } else {
            Transformed::No(graph)
        })
    }
}

impl RewriteGroupByArrays {
    pub fn new() -> Self {
        RewriteGroupByArrays
    }
}

/// Splits an expression that is exactly an array construction chain into
/// its elements.
fn as_array_elements(expr: &FreeMapA) -> Option<Vec<FreeMapA>> {
    match expr {
        MapFunc::MakeArray(element) => Some(vec![(**element).clone()]),
        MapFunc::ConcatArrays(left, right) => {
            let mut elements = as_array_elements(left)?;
            elements.extend(as_array_elements(right)?);
            Some(elements)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::name_gen::NameGenerator;
    use crate::qscript::dsl;
    use crate::qscript::types::{Access, IdStatus, ReadPath, ReduceIndex, Reducer};

    #[test]
    fn test_array_bucket_is_split() {
        let mut names = NameGenerator::new();
        let mut graph = QsuGraph::with_name(
            &mut names,
            dsl::shifted_read(ReadPath::from_segments(&["db", "zips"]), IdStatus::ExcludeId),
        );
        let src = graph.root();
        let reduced = names.fresh();
        let state = dsl::project_key_s(MapFunc::Free(Access::Value), "state");
        let city = dsl::project_key_s(MapFunc::Free(Access::Value), "city");
        graph.insert(
            reduced,
            dsl::reduce(
                src,
                vec![dsl::concat_arrays(
                    dsl::make_array(state.clone()),
                    dsl::make_array(city.clone()),
                )],
                vec![(Reducer::Count, MapFunc::Free(Access::Value))],
                MapFunc::Free(ReduceIndex(0)),
            ),
        );
        let graph = QsuGraph::from_parts(reduced, graph.vertices().clone()).unwrap();

        let mut ctx = PlanCtx::new();
        let result = RewriteGroupByArrays::new().rewrite(graph, &mut ctx).unwrap();
        assert!(result.is_yes());
        let graph = result.get_plan();
        match graph.pattern(reduced).unwrap() {
            QScript::Reduce(reduce) => assert_eq!(reduce.buckets, vec![state, city]),
            other => panic!("Expected Reduce, got {:?}", other),
        }
    }

    #[test]
    fn test_plain_buckets_are_untouched() {
        let mut names = NameGenerator::new();
        let mut graph = QsuGraph::with_name(
            &mut names,
            dsl::shifted_read(ReadPath::from_segments(&["db", "zips"]), IdStatus::ExcludeId),
        );
        let src = graph.root();
        let reduced = names.fresh();
        graph.insert(
            reduced,
            dsl::reduce(
                src,
                vec![dsl::project_key_s(MapFunc::Free(Access::Value), "state")],
                vec![(Reducer::Count, MapFunc::Free(Access::Value))],
                MapFunc::Free(ReduceIndex(0)),
            ),
        );
        let graph = QsuGraph::from_parts(reduced, graph.vertices().clone()).unwrap();

        let mut ctx = PlanCtx::new();
        let result = RewriteGroupByArrays::new().rewrite(graph, &mut ctx).unwrap();
        assert!(!result.is_yes());
    }
}
