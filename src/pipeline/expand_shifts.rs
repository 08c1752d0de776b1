use crate::graph::name_gen::Symbol;
use crate::pipeline::AuthenticatedQsu;
use crate::pipeline::errors::{Pass, PipelineError};
use crate::pipeline::pass::{PassResult, RewritePass};
use crate::pipeline::plan_ctx::PlanCtx;
use crate::provenance::provenance as qprov;
use crate::qscript::dsl;
use crate::qscript::mapfunc::{FreeMapA, JoinFuncA, MapFunc};
use crate::qscript::qscript::{MultiLeftShift, QScript};
use crate::qscript::types::{Access, JoinTarget, MultiShiftTarget, Rotation};
use crate::transformed::Transformed;

/// Lowers every n-ary shift into a chain of single left shifts.
///
/// The shifts are stably sorted by rotation so shifts over the same axis
/// kind sit next to each other; each link of the chain carries the original
/// row and the already-shifted values forward under a record scaffold, and
/// adjacent compatible rotations get an identity guard so two shifts of the
/// same axis do not multiply rows. A final Map projects the scaffold away.
pub struct ExpandShifts;

const ORIGINAL_KEY: &str = "original";

impl RewritePass for ExpandShifts {
    fn pass(&self) -> Pass {
        Pass::ExpandShifts
    }

    fn rewrite_authenticated(
        &self,
        mut qsu: AuthenticatedQsu,
        ctx: &mut PlanCtx,
    ) -> PassResult<Transformed<AuthenticatedQsu>> {
        let order = qsu
            .graph
            .topological_order()
            .map_err(|source| PipelineError::Graph {
                pass: Pass::ExpandShifts,
                source,
            })?;
        let mut multis: Vec<(Symbol, MultiLeftShift<Symbol>)> = vec![];
        for symbol in order {
            if let QScript::MultiLeftShift(multi) =
                qsu.graph
                    .pattern(symbol)
                    .map_err(|source| PipelineError::Graph {
                        pass: Pass::ExpandShifts,
                        source,
                    })?
            {
                multis.push((symbol, multi.clone()));
            }
        }
        let changed = !multis.is_empty();
        for (symbol, multi) in multis {
            self.expand(symbol, multi, &mut qsu, ctx)?;
        }
        Ok(if changed {
            Transformed::Yes(qsu)
        } else {
            Transformed::No(qsu)
        })
    }
}

impl ExpandShifts {
    pub fn new() -> Self {
        ExpandShifts
    }

    fn expand(
        &self,
        symbol: Symbol,
        multi: MultiLeftShift<Symbol>,
        qsu: &mut AuthenticatedQsu,
        ctx: &mut PlanCtx,
    ) -> PassResult<()> {
        let MultiLeftShift {
            src,
            shifts,
            repair,
        } = multi;
        let count = shifts.len();

        if count == 0 {
            // nothing to unnest; the repair can only mention the source row
            let mapper = repair.try_map_free(&mut |target| match target {
                MultiShiftTarget::Original => Ok(MapFunc::Free(Access::Value)),
                MultiShiftTarget::Shifted(index) => Err(PipelineError::Internal {
                    pass: Pass::ExpandShifts,
                    detail: format!("shifted reference {index} in an empty multi shift"),
                }),
            })?;
            return self.install(symbol, src, mapper, qsu);
        }

        // stable sort by rotation; remember where each user index landed
        let mut order: Vec<usize> = (0..count).collect();
        order.sort_by_key(|&index| shifts[index].rotation);
        let mut position_of = vec![0usize; count];
        for (sorted_position, &original_index) in order.iter().enumerate() {
            position_of[original_index] = sorted_position;
        }

        let mut upstream = src;
        let mut previous: Option<(Symbol, Rotation)> = None;
        for (link, &original_index) in order.iter().enumerate() {
            let spec = &shifts[original_index];
            let this_symbol = ctx.fresh_symbol();

            let mut link_repair = self.link_repair(link);
            if let Some((previous_symbol, previous_rotation)) = previous {
                if previous_rotation.compatible_with(spec.rotation) {
                    link_repair = dsl::cond(
                        dsl::eq(
                            MapFunc::Free(JoinTarget::AccessLeftTarget(Access::Identity(
                                previous_symbol,
                            ))),
                            MapFunc::Free(JoinTarget::AccessLeftTarget(Access::Identity(
                                this_symbol,
                            ))),
                        ),
                        link_repair,
                        MapFunc::Undefined,
                    );
                }
            }

            let structure = if link == 0 {
                spec.structure.clone()
            } else {
                // the chained row is a scaffold record; the shift must keep
                // addressing the preserved original row
                spec.structure.clone().map_free(&mut |access| match access {
                    Access::Value => {
                        dsl::project_key_s(MapFunc::Free(Access::Value), ORIGINAL_KEY)
                    }
                    identity => MapFunc::Free(identity),
                })
            };

            let pattern = dsl::left_shift(
                upstream,
                structure,
                spec.id_status,
                spec.rotation,
                link_repair,
            );
            let provenance = qprov::of_pattern(&pattern, this_symbol, &qsu.auth).map_err(
                |source| PipelineError::Provenance {
                    pass: Pass::ExpandShifts,
                    source,
                },
            )?;
            qsu.graph.insert(this_symbol, pattern);
            qsu.auth.record_dims(this_symbol, provenance);

            upstream = this_symbol;
            previous = Some((this_symbol, spec.rotation));
        }

        let mapper = repair.try_map_free(&mut |target| match target {
            MultiShiftTarget::Original => Ok(dsl::project_key_s(
                MapFunc::Free(Access::Value),
                ORIGINAL_KEY,
            )),
            MultiShiftTarget::Shifted(index) if index < count => Ok(dsl::project_key_s(
                MapFunc::Free(Access::Value),
                &position_of[index].to_string(),
            )),
            MultiShiftTarget::Shifted(index) => Err(PipelineError::Internal {
                pass: Pass::ExpandShifts,
                detail: format!("shifted reference {index} out of range for {count} shifts"),
            }),
        })?;
        self.install(symbol, upstream, mapper, qsu)
    }

    /// The repair of the `link`-th chain shift: the original row and every
    /// already-shifted value carried forward, plus this link's shifted value
    /// under its own slot.
    fn link_repair(&self, link: usize) -> JoinFuncA {
        let left_row = || MapFunc::Free(JoinTarget::AccessLeftTarget(Access::Value));
        if link == 0 {
            dsl::concat_maps(
                dsl::make_map_s(ORIGINAL_KEY, left_row()),
                dsl::make_map_s("0", MapFunc::Free(JoinTarget::RightTarget)),
            )
        } else {
            let mut static_above = dsl::make_map_s(
                ORIGINAL_KEY,
                dsl::project_key_s(left_row(), ORIGINAL_KEY),
            );
            for slot in 0..link {
                static_above = dsl::concat_maps(
                    static_above,
                    dsl::make_map_s(
                        &slot.to_string(),
                        dsl::project_key_s(left_row(), &slot.to_string()),
                    ),
                );
            }
            dsl::concat_maps(
                static_above,
                dsl::make_map_s(&link.to_string(), MapFunc::Free(JoinTarget::RightTarget)),
            )
        }
    }

    /// Replaces the multi shift's own node with the final projection so all
    /// downstream references stay valid.
    fn install(
        &self,
        symbol: Symbol,
        upstream: Symbol,
        mapper: FreeMapA,
        qsu: &mut AuthenticatedQsu,
    ) -> PassResult<()> {
        let pattern = dsl::map(upstream, mapper);
        let provenance = qprov::of_pattern(&pattern, symbol, &qsu.auth).map_err(|source| {
            PipelineError::Provenance {
                pass: Pass::ExpandShifts,
                source,
            }
        })?;
        qsu.graph
            .overwrite(symbol, pattern)
            .map_err(|source| PipelineError::Graph {
                pass: Pass::ExpandShifts,
                source,
            })?;
        qsu.auth.record_dims(symbol, provenance);
        Ok(())
    }
}
