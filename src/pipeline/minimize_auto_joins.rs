use crate::graph::name_gen::Symbol;
use crate::graph::qsu_graph::QsuGraph;
use crate::pipeline::AuthenticatedQsu;
use crate::pipeline::errors::{Pass, PipelineError};
use crate::pipeline::pass::{PassResult, RewritePass};
use crate::pipeline::plan_ctx::PlanCtx;
use crate::qscript::dsl;
use crate::qscript::mapfunc::{FreeMapA, JoinFuncA, MapFunc, MultiShiftFunc};
use crate::qscript::qscript::{AutoJoin, LeftShift, QScript, ShiftSpec};
use crate::qscript::types::{Access, JoinTarget, MultiShiftTarget};
use crate::transformed::Transformed;

/// Collapses auto joins that need no real join at all: joins of a plan with
/// itself (or with a mapping of itself) become a single Map, and joins of
/// two shifts of the same source coalesce into one MultiLeftShift for the
/// expansion pass to lower.
pub struct MinimizeAutoJoins;

impl RewritePass for MinimizeAutoJoins {
    fn pass(&self) -> Pass {
        Pass::MinimizeAutoJoins
    }

    fn rewrite_authenticated(
        &self,
        mut qsu: AuthenticatedQsu,
        _ctx: &mut PlanCtx,
    ) -> PassResult<Transformed<AuthenticatedQsu>> {
        let mut changed = false;
        loop {
            let order =
                qsu.graph
                    .topological_order()
                    .map_err(|source| PipelineError::Graph {
                        pass: Pass::MinimizeAutoJoins,
                        source,
                    })?;
            let mut action = None;
            for symbol in order {
                let QScript::AutoJoin(join) =
                    qsu.graph
                        .pattern(symbol)
                        .map_err(|source| PipelineError::Graph {
                            pass: Pass::MinimizeAutoJoins,
                            source,
                        })?
                else {
                    continue;
                };
                if let Some(pattern) = self.minimize(&qsu.graph, join)? {
                    action = Some((symbol, pattern));
                    break;
                }
            }
            match action {
                Some((symbol, pattern)) => {
                    qsu.graph
                        .overwrite(symbol, pattern)
                        .map_err(|source| PipelineError::Graph {
                            pass: Pass::MinimizeAutoJoins,
                            source,
                        })?;
                    changed = true;
                }
                None => break,
            }
        }
        Ok(if changed {
            Transformed::Yes(qsu)
        } else {
            Transformed::No(qsu)
        })
    }
}

impl MinimizeAutoJoins {
    pub fn new() -> Self {
        MinimizeAutoJoins
    }

    fn minimize(
        &self,
        graph: &QsuGraph,
        join: &AutoJoin<Symbol>,
    ) -> PassResult<Option<QScript<Symbol>>> {
        let row = MapFunc::Free(Access::Value);

        // both sides are literally the same node
        if join.left == join.right {
            let func = combine_over(&join.combine, &row, &row);
            return Ok(Some(dsl::map(join.left, func)));
        }

        let left_pattern = graph
            .pattern(join.left)
            .map_err(|source| PipelineError::Graph {
                pass: Pass::MinimizeAutoJoins,
                source,
            })?;
        let right_pattern = graph
            .pattern(join.right)
            .map_err(|source| PipelineError::Graph {
                pass: Pass::MinimizeAutoJoins,
                source,
            })?;

        // one side is a mapping of the other (or both map the same node)
        if let QScript::Map(left_map) = left_pattern {
            if left_map.src == join.right {
                let func = combine_over(&join.combine, &left_map.func, &row);
                return Ok(Some(dsl::map(left_map.src, func)));
            }
            if let QScript::Map(right_map) = right_pattern {
                if left_map.src == right_map.src {
                    let func = combine_over(&join.combine, &left_map.func, &right_map.func);
                    return Ok(Some(dsl::map(left_map.src, func)));
                }
            }
        }
        if let QScript::Map(right_map) = right_pattern {
            if right_map.src == join.left {
                let func = combine_over(&join.combine, &row, &right_map.func);
                return Ok(Some(dsl::map(right_map.src, func)));
            }
        }

        // two shifts of the same underlying source coalesce into a multi
        // shift; a structure previously hoisted into a Map is folded back in
        let value_repair = MapFunc::Free(JoinTarget::RightTarget);
        match (left_pattern, right_pattern) {
            (QScript::LeftShift(left_shift), QScript::LeftShift(right_shift))
                if left_shift.repair == value_repair && right_shift.repair == value_repair =>
            {
                let (left_base, left_structure) = shift_base(graph, left_shift)?;
                let (right_base, right_structure) = shift_base(graph, right_shift)?;
                if left_base != right_base {
                    return Ok(None);
                }
                let Some(repair) =
                    combine_to_multi(&join.combine, &MapFunc::Free(MultiShiftTarget::Shifted(0)), 1)
                else {
                    return Ok(None);
                };
                Ok(Some(dsl::multi_left_shift(
                    left_base,
                    vec![
                        ShiftSpec {
                            structure: left_structure,
                            id_status: left_shift.id_status,
                            rotation: left_shift.rotation,
                        },
                        ShiftSpec {
                            structure: right_structure,
                            id_status: right_shift.id_status,
                            rotation: right_shift.rotation,
                        },
                    ],
                    repair,
                )))
            }
            (QScript::MultiLeftShift(multi), QScript::LeftShift(right_shift))
                if right_shift.repair == value_repair =>
            {
                let (right_base, right_structure) = shift_base(graph, right_shift)?;
                if multi.src != right_base {
                    return Ok(None);
                }
                let Some(repair) =
                    combine_to_multi(&join.combine, &multi.repair, multi.shifts.len())
                else {
                    return Ok(None);
                };
                let mut shifts = multi.shifts.clone();
                shifts.push(ShiftSpec {
                    structure: right_structure,
                    id_status: right_shift.id_status,
                    rotation: right_shift.rotation,
                });
                Ok(Some(dsl::multi_left_shift(multi.src, shifts, repair)))
            }
            _ => Ok(None),
        }
    }
}

/// The source a shift effectively reads, with any hoisted Map composed back
/// into its structure.
fn shift_base(
    graph: &QsuGraph,
    shift: &LeftShift<Symbol>,
) -> PassResult<(Symbol, FreeMapA)> {
    match graph.pattern(shift.src).map_err(|source| PipelineError::Graph {
        pass: Pass::MinimizeAutoJoins,
        source,
    })? {
        QScript::Map(map) => {
            let inner = map.func.clone();
            let composed = shift.structure.clone().map_free(&mut |access| match access {
                Access::Value => inner.clone(),
                identity => MapFunc::Free(identity),
            });
            Ok((map.src, composed))
        }
        _ => Ok((shift.src, shift.structure.clone())),
    }
}

/// Resolves a combiner's join targets against concrete row expressions.
fn combine_over(combine: &JoinFuncA, left: &FreeMapA, right: &FreeMapA) -> FreeMapA {
    combine.clone().map_free(&mut |target| match target {
        JoinTarget::LeftTarget | JoinTarget::AccessLeftTarget(Access::Value) => left.clone(),
        JoinTarget::RightTarget | JoinTarget::AccessRightTarget(Access::Value) => right.clone(),
        JoinTarget::AccessLeftTarget(Access::Identity(symbol))
        | JoinTarget::AccessRightTarget(Access::Identity(symbol)) => {
            MapFunc::Free(Access::Identity(symbol))
        }
    })
}

/// Re-targets a combiner onto multi-shift slots: the left side becomes the
/// given repair (the already-coalesced output), the right side the next
/// shifted slot. Identity accesses cannot cross into a multi-shift repair;
/// such combiners stay un-coalesced.
fn combine_to_multi(
    combine: &JoinFuncA,
    left: &MultiShiftFunc,
    right_slot: usize,
) -> Option<MultiShiftFunc> {
    combine
        .clone()
        .try_map_free(&mut |target| match target {
            JoinTarget::LeftTarget | JoinTarget::AccessLeftTarget(Access::Value) => {
                Ok(left.clone())
            }
            JoinTarget::RightTarget | JoinTarget::AccessRightTarget(Access::Value) => {
                Ok(MapFunc::Free(MultiShiftTarget::Shifted(right_slot)))
            }
            JoinTarget::AccessLeftTarget(Access::Identity(_))
            | JoinTarget::AccessRightTarget(Access::Identity(_)) => Err(()),
        })
        .ok()
}
