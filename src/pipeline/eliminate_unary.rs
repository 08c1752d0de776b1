use crate::graph::qsu_graph::QsuGraph;
use crate::pipeline::errors::{Pass, PipelineError};
use crate::pipeline::pass::{PassResult, RewritePass};
use crate::pipeline::plan_ctx::PlanCtx;
use crate::qscript::mapfunc::{Literal, MapFunc};
use crate::qscript::qscript::QScript;
use crate::qscript::types::Access;
use crate::transformed::Transformed;

/// Folds trivial unary nodes: identity maps and constant-true filters are
/// removed and their consumers re-pointed at the source.
pub struct EliminateUnary;

impl RewritePass for EliminateUnary {
    fn pass(&self) -> Pass {
        Pass::EliminateUnary
    }

    fn rewrite(&self, mut graph: QsuGraph, _ctx: &mut PlanCtx) -> PassResult<Transformed<QsuGraph>> {
        let mut changed = false;
        loop {
            let order = graph
                .topological_order()
                .map_err(|source| PipelineError::Graph {
                    pass: Pass::EliminateUnary,
                    source,
                })?;
            let mut eliminated = None;
            for symbol in order {
                match graph.pattern(symbol).map_err(|source| PipelineError::Graph {
                    pass: Pass::EliminateUnary,
                    source,
                })? {
                    QScript::Map(map) if map.func == MapFunc::Free(Access::Value) => {
                        eliminated = Some((symbol, map.src));
                        break;
                    }
                    QScript::Filter(filter)
                        if filter.predicate == MapFunc::Constant(Literal::Boolean(true)) =>
                    {
                        eliminated = Some((symbol, filter.src));
                        break;
                    }
                    _ => {}
                }
            }
            match eliminated {
                Some((symbol, src)) => {
                    graph.replace_references(symbol, src);
                    changed = true;
                }
                None => break,
            }
        }
        Ok(if changed {
            Transformed::Yes(graph)
        } else {
            Transformed::No(graph)
        })
    }
}

impl EliminateUnary {
    pub fn new() -> Self {
        EliminateUnary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::name_gen::NameGenerator;
    use crate::qscript::dsl;
    use crate::qscript::types::{IdStatus, ReadPath};

    fn read_graph(names: &mut NameGenerator) -> QsuGraph {
        QsuGraph::with_name(
            names,
            dsl::shifted_read(ReadPath::from_segments(&["db", "zips"]), IdStatus::ExcludeId),
        )
    }

    #[test]
    fn test_identity_map_chain_collapses() {
        let mut names = NameGenerator::new();
        let mut graph = read_graph(&mut names);
        let src = graph.root();
        let first = names.fresh();
        let second = names.fresh();
        let top = names.fresh();
        graph.insert(first, dsl::map(src, MapFunc::Free(Access::Value)));
        graph.insert(second, dsl::map(first, MapFunc::Free(Access::Value)));
        graph.insert(
            top,
            dsl::filter(
                second,
                dsl::eq(MapFunc::Free(Access::Value), dsl::int_lit(1)),
            ),
        );
        let graph = QsuGraph::from_parts(top, graph.vertices().clone()).unwrap();

        let mut ctx = PlanCtx::new();
        let result = EliminateUnary::new().rewrite(graph, &mut ctx).unwrap();
        assert!(result.is_yes());
        let mut graph = result.get_plan();
        graph.prune_unreachable().unwrap();

        assert_eq!(graph.vertices().len(), 2);
        match graph.pattern(top).unwrap() {
            QScript::Filter(filter) => assert_eq!(filter.src, src),
            other => panic!("Expected Filter, got {:?}", other),
        }
    }

    #[test]
    fn test_true_filter_at_root_is_removed() {
        let mut names = NameGenerator::new();
        let mut graph = read_graph(&mut names);
        let src = graph.root();
        let trivial = names.fresh();
        graph.insert(trivial, dsl::filter(src, dsl::bool_lit(true)));
        let graph = QsuGraph::from_parts(trivial, graph.vertices().clone()).unwrap();

        let mut ctx = PlanCtx::new();
        let result = EliminateUnary::new().rewrite(graph, &mut ctx).unwrap();
        assert!(result.is_yes());
        let graph = result.get_plan();
        // the root moved down to the source
        assert_eq!(graph.root(), src);
    }

    #[test]
    fn test_meaningful_nodes_survive() {
        let mut names = NameGenerator::new();
        let mut graph = read_graph(&mut names);
        let src = graph.root();
        let projected = names.fresh();
        graph.insert(
            projected,
            dsl::map(src, dsl::project_key_s(MapFunc::Free(Access::Value), "city")),
        );
        let graph = QsuGraph::from_parts(projected, graph.vertices().clone()).unwrap();

        let mut ctx = PlanCtx::new();
        let result = EliminateUnary::new().rewrite(graph, &mut ctx).unwrap();
        assert!(!result.is_yes());
    }
}
