use std::collections::BTreeMap;

use crate::graph::name_gen::Symbol;
use crate::graph::qsu_graph::QsuGraph;
use crate::logical_plan::logical_plan::{JoinCondition, LogicalPlan};
use crate::pipeline::errors::{Pass, PipelineError};
use crate::pipeline::pass::PassResult;
use crate::pipeline::plan_ctx::PlanCtx;
use crate::qscript::dsl;
use crate::qscript::mapfunc::{FreeMap, FreeMapA, JoinFuncA, MapFunc};
use crate::qscript::qscript::QScript;
use crate::qscript::types::{Access, IdStatus, JoinSide, JoinTarget};

/// Translates the incoming logical plan into the initial graph.
///
/// Reads become shifted reads, constants ride on the sentinel empty source,
/// let-bindings share one node per bound plan, and scalar combinations of
/// two sub-plans become auto joins for the later passes to settle.
pub struct ReadLp;

struct GraphBuilder {
    vertices: BTreeMap<Symbol, QScript<Symbol>>,
    unreferenced: Option<Symbol>,
}

impl GraphBuilder {
    fn add(&mut self, ctx: &mut PlanCtx, pattern: QScript<Symbol>) -> Symbol {
        let symbol = ctx.fresh_symbol();
        self.vertices.insert(symbol, pattern);
        symbol
    }

    /// The sentinel empty source, shared by every constant in the plan.
    fn unreferenced(&mut self, ctx: &mut PlanCtx) -> Symbol {
        match self.unreferenced {
            Some(symbol) => symbol,
            None => {
                let symbol = self.add(ctx, QScript::Unreferenced);
                self.unreferenced = Some(symbol);
                symbol
            }
        }
    }
}

impl ReadLp {
    pub fn new() -> Self {
        ReadLp
    }

    pub fn build_graph(&self, lp: &LogicalPlan, ctx: &mut PlanCtx) -> PassResult<QsuGraph> {
        let mut builder = GraphBuilder {
            vertices: BTreeMap::new(),
            unreferenced: None,
        };
        let mut env: Vec<(String, Symbol)> = vec![];
        let root = self.translate(lp, &mut builder, &mut env, ctx)?;
        QsuGraph::from_parts(root, builder.vertices).map_err(|source| PipelineError::Graph {
            pass: Pass::ReadLp,
            source,
        })
    }

    fn translate(
        &self,
        lp: &LogicalPlan,
        builder: &mut GraphBuilder,
        env: &mut Vec<(String, Symbol)>,
        ctx: &mut PlanCtx,
    ) -> PassResult<Symbol> {
        let symbol = match lp {
            LogicalPlan::Read(path) => {
                if path.is_root() {
                    builder.add(ctx, QScript::Root)
                } else {
                    builder.add(
                        ctx,
                        dsl::shifted_read(path.clone(), IdStatus::ExcludeId),
                    )
                }
            }
            LogicalPlan::Constant(lit) => {
                let unreferenced = builder.unreferenced(ctx);
                builder.add(ctx, dsl::map(unreferenced, MapFunc::Constant(lit.clone())))
            }
            LogicalPlan::Free(name) => env
                .iter()
                .rev()
                .find(|(bound, _)| bound == name)
                .map(|(_, symbol)| *symbol)
                .ok_or(PipelineError::UnboundVariable { name: name.clone() })?,
            LogicalPlan::Let(binding) => {
                let form = self.translate(&binding.form, builder, env, ctx)?;
                env.push((binding.name.clone(), form));
                let body = self.translate(&binding.body, builder, env, ctx)?;
                env.pop();
                body
            }
            LogicalPlan::Map(map) => {
                let src = self.translate(&map.src, builder, env, ctx)?;
                builder.add(ctx, dsl::map(src, lift_hole(map.func.clone())))
            }
            LogicalPlan::Shift(shift) => {
                let src = self.translate(&shift.src, builder, env, ctx)?;
                builder.add(
                    ctx,
                    dsl::left_shift(
                        src,
                        lift_hole(shift.structure.clone()),
                        shift.id_status,
                        shift.rotation,
                        MapFunc::Free(JoinTarget::RightTarget),
                    ),
                )
            }
            LogicalPlan::Filter(filter) => {
                let src = self.translate(&filter.src, builder, env, ctx)?;
                builder.add(ctx, dsl::filter(src, lift_hole(filter.predicate.clone())))
            }
            LogicalPlan::Sort(sort) => {
                if sort.order.is_empty() {
                    return Err(PipelineError::MalformedInput {
                        pass: Pass::ReadLp,
                        detail: "sort requires at least one ordering key".to_string(),
                    });
                }
                let src = self.translate(&sort.src, builder, env, ctx)?;
                let order = sort
                    .order
                    .iter()
                    .map(|(expr, dir)| (lift_hole(expr.clone()), *dir))
                    .collect();
                builder.add(ctx, dsl::sort(src, vec![], order))
            }
            LogicalPlan::GroupBy(group_by) => {
                let src = self.translate(&group_by.src, builder, env, ctx)?;
                let buckets = group_by
                    .buckets
                    .iter()
                    .map(|bucket| lift_hole(bucket.clone()))
                    .collect();
                let reducers = group_by
                    .reducers
                    .iter()
                    .map(|(reducer, arg)| (*reducer, lift_hole(arg.clone())))
                    .collect();
                builder.add(
                    ctx,
                    dsl::reduce(src, buckets, reducers, group_by.repair.clone()),
                )
            }
            LogicalPlan::Subset(subset) => {
                if subset.count < 0 {
                    return Err(PipelineError::MalformedInput {
                        pass: Pass::ReadLp,
                        detail: format!("negative subset count {}", subset.count),
                    });
                }
                let src = self.translate(&subset.src, builder, env, ctx)?;
                let unreferenced = builder.unreferenced(ctx);
                let count = builder.add(
                    ctx,
                    dsl::map(unreferenced, dsl::int_lit(subset.count)),
                );
                builder.add(ctx, dsl::subset(src, subset.op, count))
            }
            LogicalPlan::Union(union) => {
                let left = self.translate(&union.left, builder, env, ctx)?;
                let right = self.translate(&union.right, builder, env, ctx)?;
                builder.add(ctx, dsl::union(left, right))
            }
            LogicalPlan::Join(join) => {
                let left = self.translate(&join.left, builder, env, ctx)?;
                let right = self.translate(&join.right, builder, env, ctx)?;
                builder.add(
                    ctx,
                    dsl::theta_join(
                        left,
                        right,
                        lift_sides(join.on.clone()),
                        join.join_type,
                        lift_sides(join.combine.clone()),
                    ),
                )
            }
            LogicalPlan::Combine(combine) => {
                let left = self.translate(&combine.left, builder, env, ctx)?;
                let right = self.translate(&combine.right, builder, env, ctx)?;
                builder.add(ctx, dsl::auto_join(left, right, lift_sides(combine.func.clone())))
            }
        };
        Ok(symbol)
    }
}

fn lift_hole(func: FreeMap) -> FreeMapA {
    func.map_free(&mut |_| MapFunc::Free(Access::Value))
}

fn lift_sides(func: JoinCondition) -> JoinFuncA {
    func.map_free(&mut |side| match side {
        JoinSide::LeftSide => MapFunc::Free(JoinTarget::LeftTarget),
        JoinSide::RightSide => MapFunc::Free(JoinTarget::RightTarget),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logical_plan::plan_builder;
    use crate::qscript::mapfunc::Literal;
    use crate::qscript::types::Hole;

    #[test]
    fn test_read_becomes_shifted_read_with_map_on_top() {
        let lp = plan_builder::map(
            plan_builder::read(&["db", "zips"]),
            dsl::project_key_s(MapFunc::Free(Hole), "city"),
        );
        let mut ctx = PlanCtx::new();
        let graph = ReadLp::new().build_graph(&lp, &mut ctx).unwrap();

        graph.validate().unwrap();
        match graph.pattern(graph.root()).unwrap() {
            QScript::Map(map) => match graph.pattern(map.src).unwrap() {
                QScript::ShiftedRead(read) => {
                    assert_eq!(read.id_status, IdStatus::ExcludeId);
                    assert_eq!(format!("{}", read.path), "/db/zips");
                }
                other => panic!("Expected ShiftedRead, got {:?}", other),
            },
            other => panic!("Expected Map at the root, got {:?}", other),
        }
    }

    #[test]
    fn test_let_bound_references_share_one_node() {
        // LET x = read; combine(x, x)
        let lp = plan_builder::let_bound(
            "x",
            plan_builder::read(&["db", "zips"]),
            plan_builder::combine(
                plan_builder::free("x"),
                plan_builder::free("x"),
                dsl::eq(
                    MapFunc::Free(JoinSide::LeftSide),
                    MapFunc::Free(JoinSide::RightSide),
                ),
            ),
        );
        let mut ctx = PlanCtx::new();
        let graph = ReadLp::new().build_graph(&lp, &mut ctx).unwrap();

        match graph.pattern(graph.root()).unwrap() {
            QScript::AutoJoin(join) => assert_eq!(join.left, join.right),
            other => panic!("Expected AutoJoin, got {:?}", other),
        }
    }

    #[test]
    fn test_unbound_variable_is_rejected() {
        let lp = plan_builder::free("ghost");
        let mut ctx = PlanCtx::new();
        match ReadLp::new().build_graph(&lp, &mut ctx) {
            Err(PipelineError::UnboundVariable { name }) => assert_eq!(name, "ghost"),
            other => panic!("Expected UnboundVariable, got {:?}", other),
        }
    }

    #[test]
    fn test_constant_rides_on_the_empty_source() {
        let lp = plan_builder::constant(Literal::Integer(42));
        let mut ctx = PlanCtx::new();
        let graph = ReadLp::new().build_graph(&lp, &mut ctx).unwrap();

        match graph.pattern(graph.root()).unwrap() {
            QScript::Map(map) => {
                assert_eq!(map.func, MapFunc::Constant(Literal::Integer(42)));
                assert_eq!(
                    graph.pattern(map.src).unwrap(),
                    &QScript::Unreferenced
                );
            }
            other => panic!("Expected Map, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_sort_order_is_malformed() {
        let lp = plan_builder::sort(plan_builder::read(&["db", "zips"]), vec![]);
        let mut ctx = PlanCtx::new();
        match ReadLp::new().build_graph(&lp, &mut ctx) {
            Err(PipelineError::MalformedInput { detail, .. }) => {
                assert!(detail.contains("ordering key"))
            }
            other => panic!("Expected MalformedInput, got {:?}", other),
        }
    }

    #[test]
    fn test_root_read_becomes_dead_end() {
        let lp = plan_builder::read(&[]);
        let mut ctx = PlanCtx::new();
        let graph = ReadLp::new().build_graph(&lp, &mut ctx).unwrap();
        assert_eq!(graph.pattern(graph.root()).unwrap(), &QScript::Root);
    }
}
