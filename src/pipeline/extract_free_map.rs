use crate::graph::name_gen::Symbol;
use crate::graph::qsu_graph::QsuGraph;
use crate::pipeline::errors::{Pass, PipelineError};
use crate::pipeline::pass::{PassResult, RewritePass};
use crate::pipeline::plan_ctx::PlanCtx;
use crate::qscript::dsl;
use crate::qscript::mapfunc::{FreeMapA, MapFunc};
use crate::qscript::qscript::{LeftShift, QScript};
use crate::qscript::types::{Access, JoinTarget};
use crate::transformed::Transformed;

/// Hoists inline map functions out of relational nodes: stacked maps are
/// fused into one, and a shift whose structure is itself a computation gets
/// that computation lifted into a preceding Map (legal only while the
/// repair never looks back at the pre-shift row).
pub struct ExtractFreeMap;

enum Extraction {
    Fuse {
        symbol: Symbol,
        new_src: Symbol,
        func: FreeMapA,
    },
    Hoist {
        symbol: Symbol,
        shift: LeftShift<Symbol>,
    },
}

impl RewritePass for ExtractFreeMap {
    fn pass(&self) -> Pass {
        Pass::ExtractFreeMap
    }

    fn rewrite(&self, mut graph: QsuGraph, ctx: &mut PlanCtx) -> PassResult<Transformed<QsuGraph>> {
        let mut changed = false;
        loop {
            let action = self.find_extraction(&graph)?;
            match action {
                Some(Extraction::Fuse {
                    symbol,
                    new_src,
                    func,
                }) => {
                    graph
                        .overwrite(symbol, dsl::map(new_src, func))
                        .map_err(|source| PipelineError::Graph {
                            pass: Pass::ExtractFreeMap,
                            source,
                        })?;
                    changed = true;
                }
                Some(Extraction::Hoist { symbol, shift }) => {
                    let hoisted =
                        QsuGraph::with_name(ctx.names_mut(), dsl::map(shift.src, shift.structure));
                    let map_symbol = hoisted.root();
                    graph.merge(hoisted).map_err(|source| PipelineError::Graph {
                        pass: Pass::ExtractFreeMap,
                        source,
                    })?;
                    graph
                        .overwrite(
                            symbol,
                            dsl::left_shift(
                                map_symbol,
                                MapFunc::Free(Access::Value),
                                shift.id_status,
                                shift.rotation,
                                shift.repair,
                            ),
                        )
                        .map_err(|source| PipelineError::Graph {
                            pass: Pass::ExtractFreeMap,
                            source,
                        })?;
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

impl ExtractFreeMap {
    pub fn new() -> Self {
        ExtractFreeMap
    }

    fn find_extraction(&self, graph: &QsuGraph) -> PassResult<Option<Extraction>> {
        let order = graph
            .topological_order()
            .map_err(|source| PipelineError::Graph {
                pass: Pass::ExtractFreeMap,
                source,
            })?;
        for symbol in order {
            let pattern = graph.pattern(symbol).map_err(|source| PipelineError::Graph {
                pass: Pass::ExtractFreeMap,
                source,
            })?;
            match pattern {
                QScript::Map(outer) => {
                    if let QScript::Map(inner) = graph.pattern(outer.src).map_err(|source| {
                        PipelineError::Graph {
                            pass: Pass::ExtractFreeMap,
                            source,
                        }
                    })? {
                        let inner_func = inner.func.clone();
                        let fused = outer.func.clone().map_free(&mut |access| match access {
                            Access::Value => inner_func.clone(),
                            identity => MapFunc::Free(identity),
                        });
                        return Ok(Some(Extraction::Fuse {
                            symbol,
                            new_src: inner.src,
                            func: fused,
                        }));
                    }
                }
                QScript::LeftShift(shift) => {
                    let trivial = shift.structure == MapFunc::Free(Access::Value);
                    let repair_reads_left = shift.repair.contains_free(|target| {
                        matches!(
                            target,
                            JoinTarget::LeftTarget | JoinTarget::AccessLeftTarget(_)
                        )
                    });
                    if !trivial && !repair_reads_left {
                        return Ok(Some(Extraction::Hoist {
                            symbol,
                            shift: shift.clone(),
                        }));
                    }
                }
                _ => {}
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qscript::types::{IdStatus, ReadPath, Rotation};

    fn read_graph(ctx: &mut PlanCtx) -> QsuGraph {
        QsuGraph::with_name(
            ctx.names_mut(),
            dsl::shifted_read(ReadPath::from_segments(&["db", "zips"]), IdStatus::ExcludeId),
        )
    }

    #[test]
    fn test_stacked_maps_fuse() {
        let mut ctx = PlanCtx::new();
        let mut graph = read_graph(&mut ctx);
        let src = graph.root();
        let inner = ctx.fresh_symbol();
        let outer = ctx.fresh_symbol();
        graph.insert(
            inner,
            dsl::map(src, dsl::project_key_s(MapFunc::Free(Access::Value), "loc")),
        );
        graph.insert(
            outer,
            dsl::map(inner, dsl::project_index_i(MapFunc::Free(Access::Value), 0)),
        );
        let graph = QsuGraph::from_parts(outer, graph.vertices().clone()).unwrap();

        let result = ExtractFreeMap::new().rewrite(graph, &mut ctx).unwrap();
        assert!(result.is_yes());
        let graph = result.get_plan();
        match graph.pattern(outer).unwrap() {
            QScript::Map(map) => {
                assert_eq!(map.src, src);
                assert_eq!(
                    map.func,
                    dsl::project_index_i(
                        dsl::project_key_s(MapFunc::Free(Access::Value), "loc"),
                        0
                    )
                );
            }
            other => panic!("Expected fused Map, got {:?}", other),
        }
    }

    #[test]
    fn test_shift_structure_is_hoisted_when_repair_ignores_left() {
        let mut ctx = PlanCtx::new();
        let mut graph = read_graph(&mut ctx);
        let src = graph.root();
        let shift = ctx.fresh_symbol();
        graph.insert(
            shift,
            dsl::left_shift(
                src,
                dsl::project_key_s(MapFunc::Free(Access::Value), "loc"),
                IdStatus::ExcludeId,
                Rotation::ShiftArray,
                MapFunc::Free(JoinTarget::RightTarget),
            ),
        );
        let graph = QsuGraph::from_parts(shift, graph.vertices().clone()).unwrap();

        let result = ExtractFreeMap::new().rewrite(graph, &mut ctx).unwrap();
        assert!(result.is_yes());
        let graph = result.get_plan();
        match graph.pattern(shift).unwrap() {
            QScript::LeftShift(shift) => {
                assert_eq!(shift.structure, MapFunc::Free(Access::Value));
                match graph.pattern(shift.src).unwrap() {
                    QScript::Map(map) => {
                        assert_eq!(map.src, src);
                        assert_eq!(
                            map.func,
                            dsl::project_key_s(MapFunc::Free(Access::Value), "loc")
                        );
                    }
                    other => panic!("Expected hoisted Map, got {:?}", other),
                }
            }
            other => panic!("Expected LeftShift, got {:?}", other),
        }
    }

    #[test]
    fn test_shift_keeps_structure_when_repair_reads_left() {
        let mut ctx = PlanCtx::new();
        let mut graph = read_graph(&mut ctx);
        let src = graph.root();
        let shift = ctx.fresh_symbol();
        graph.insert(
            shift,
            dsl::left_shift(
                src,
                dsl::project_key_s(MapFunc::Free(Access::Value), "loc"),
                IdStatus::ExcludeId,
                Rotation::ShiftArray,
                dsl::concat_maps(
                    dsl::make_map_s(
                        "row",
                        MapFunc::Free(JoinTarget::AccessLeftTarget(Access::Value)),
                    ),
                    dsl::make_map_s("item", MapFunc::Free(JoinTarget::RightTarget)),
                ),
            ),
        );
        let graph = QsuGraph::from_parts(shift, graph.vertices().clone()).unwrap();

        let result = ExtractFreeMap::new().rewrite(graph, &mut ctx).unwrap();
        assert!(!result.is_yes());
    }
}
