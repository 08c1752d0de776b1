use crate::graph::name_gen::Symbol;
use crate::pipeline::AuthenticatedQsu;
use crate::pipeline::errors::{Pass, PipelineError};
use crate::pipeline::pass::{PassResult, RewritePass};
use crate::pipeline::plan_ctx::PlanCtx;
use crate::qscript::dsl;
use crate::qscript::mapfunc::MapFunc;
use crate::qscript::qscript::QScript;
use crate::qscript::types::{Access, JoinType};
use crate::transformed::Transformed;

/// Converts every remaining auto join into an explicit join. Sides that
/// share shift-introduced identity axes join on equality of those
/// identities; unrelated sides degrade to a cross product.
pub struct ReifyAutoJoins;

impl RewritePass for ReifyAutoJoins {
    fn pass(&self) -> Pass {
        Pass::ReifyAutoJoins
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
                pass: Pass::ReifyAutoJoins,
                source,
            })?;
        let mut rewrites: Vec<(Symbol, QScript<Symbol>)> = vec![];
        for symbol in order {
            let QScript::AutoJoin(join) =
                qsu.graph
                    .pattern(symbol)
                    .map_err(|source| PipelineError::Graph {
                        pass: Pass::ReifyAutoJoins,
                        source,
                    })?
            else {
                continue;
            };
            let left_identities = qsu
                .auth
                .lookup_dims(join.left)
                .map_err(|source| PipelineError::Provenance {
                    pass: Pass::ReifyAutoJoins,
                    source,
                })?
                .identities();
            let right_identities = qsu
                .auth
                .lookup_dims(join.right)
                .map_err(|source| PipelineError::Provenance {
                    pass: Pass::ReifyAutoJoins,
                    source,
                })?
                .identities();
            let shared: Vec<Symbol> = left_identities
                .intersection(&right_identities)
                .copied()
                .collect();

            let pattern = if shared.is_empty() {
                dsl::theta_join(
                    join.left,
                    join.right,
                    dsl::bool_lit(true),
                    JoinType::Inner,
                    join.combine.clone(),
                )
            } else {
                let keys = shared
                    .into_iter()
                    .map(|identity| {
                        (
                            MapFunc::Free(Access::Identity(identity)),
                            MapFunc::Free(Access::Identity(identity)),
                        )
                    })
                    .collect();
                dsl::equi_join(
                    join.left,
                    join.right,
                    keys,
                    JoinType::Inner,
                    join.combine.clone(),
                )
            };
            rewrites.push((symbol, pattern));
        }
        let changed = !rewrites.is_empty();
        for (symbol, pattern) in rewrites {
            qsu.graph
                .overwrite(symbol, pattern)
                .map_err(|source| PipelineError::Graph {
                    pass: Pass::ReifyAutoJoins,
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

impl ReifyAutoJoins {
    pub fn new() -> Self {
        ReifyAutoJoins
    }
}
