use crate::graph::name_gen::Symbol;
use crate::pipeline::AuthenticatedQsu;
use crate::pipeline::errors::{Pass, PipelineError};
use crate::pipeline::pass::{PassResult, RewritePass};
use crate::pipeline::plan_ctx::PlanCtx;
use crate::qscript::dsl;
use crate::qscript::mapfunc::MapFunc;
use crate::qscript::qscript::{LeftShift, QScript};
use crate::qscript::types::{Access, IdStatus, JoinTarget};
use crate::transformed::Transformed;

/// Settles repairs that access the identity of their own shift. That
/// identity is produced by the shift itself, so it can never come from the
/// pre-shift row; the shift is promoted to carry its identity alongside the
/// value and the access becomes an index projection on the shifted output.
pub struct ResolveOwnIdentities;

impl RewritePass for ResolveOwnIdentities {
    fn pass(&self) -> Pass {
        Pass::ResolveOwnIdentities
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
                pass: Pass::ResolveOwnIdentities,
                source,
            })?;
        let mut rewrites: Vec<(Symbol, LeftShift<Symbol>)> = vec![];
        for symbol in order {
            let QScript::LeftShift(shift) =
                qsu.graph
                    .pattern(symbol)
                    .map_err(|source| PipelineError::Graph {
                        pass: Pass::ResolveOwnIdentities,
                        source,
                    })?
            else {
                continue;
            };
            let accesses_own = shift.repair.contains_free(|target| is_own(target, symbol));
            if !accesses_own {
                continue;
            }
            let mut shift = shift.clone();
            match shift.id_status {
                IdStatus::IdOnly => {
                    // the shifted output already is the identity
                    shift.repair = shift.repair.map_free(&mut |target| {
                        if is_own(&target, symbol) {
                            MapFunc::Free(JoinTarget::RightTarget)
                        } else {
                            MapFunc::Free(target)
                        }
                    });
                }
                IdStatus::IncludeId => {
                    shift.repair = shift.repair.map_free(&mut |target| {
                        if is_own(&target, symbol) {
                            dsl::project_index_i(MapFunc::Free(JoinTarget::RightTarget), 0)
                        } else {
                            MapFunc::Free(target)
                        }
                    });
                }
                IdStatus::ExcludeId => {
                    // promote: the output becomes an [id, value] pair
                    shift.id_status = IdStatus::IncludeId;
                    shift.repair = shift.repair.map_free(&mut |target| {
                        if is_own(&target, symbol) {
                            dsl::project_index_i(MapFunc::Free(JoinTarget::RightTarget), 0)
                        } else if target == JoinTarget::RightTarget {
                            dsl::project_index_i(MapFunc::Free(JoinTarget::RightTarget), 1)
                        } else {
                            MapFunc::Free(target)
                        }
                    });
                }
            }
            rewrites.push((symbol, shift));
        }
        let changed = !rewrites.is_empty();
        for (symbol, shift) in rewrites {
            qsu.graph
                .overwrite(symbol, QScript::LeftShift(shift))
                .map_err(|source| PipelineError::Graph {
                    pass: Pass::ResolveOwnIdentities,
                    source,
                })?;
        }
        Ok(if changed {
            Transformed::Yes(qsu)
        } else {
            Transformed::No(qsu)
        })
    }
}

impl ResolveOwnIdentities {
    pub fn new() -> Self {
        ResolveOwnIdentities
    }
}

fn is_own(target: &JoinTarget, symbol: Symbol) -> bool {
    matches!(
        target,
        JoinTarget::AccessLeftTarget(Access::Identity(s))
        | JoinTarget::AccessRightTarget(Access::Identity(s)) if *s == symbol
    )
}
