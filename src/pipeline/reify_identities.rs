use std::collections::{BTreeMap, BTreeSet};

use crate::graph::errors::GraphError;
use crate::graph::name_gen::Symbol;
use crate::pipeline::errors::{Pass, PipelineError};
use crate::pipeline::pass::PassResult;
use crate::pipeline::plan_ctx::PlanCtx;
use crate::pipeline::{AuthenticatedQsu, ResearchedQsu};
use crate::qscript::dsl;
use crate::qscript::mapfunc::{FreeMapA, JoinFuncA, MapFunc};
use crate::qscript::qscript::QScript;
use crate::qscript::types::{Access, IdStatus, JoinTarget};

/// Materializes every demanded upstream identity as a first-class row
/// column.
///
/// A shift whose identity is consumed downstream is promoted to emit that
/// identity under a reserved key. Shifts that already produce record rows
/// get the key appended; shifts that produce bare values are re-wrapped in
/// a `{"_value": ..., key: ...}` envelope, and every node between producer
/// and consumer is taught to keep the key flowing. All identity accesses
/// then become plain key projections, so graduation sees no identities at
/// all.
pub struct ReifyIdentities;

const VALUE_KEY: &str = "_value";

#[derive(Debug, Clone, Copy, PartialEq)]
enum Mode {
    /// The producer's rows are records; the identity key is appended.
    Record,
    /// The producer's rows are bare values; they get enveloped.
    Envelope,
}

#[derive(Debug, Clone, Copy)]
struct Demand {
    consumer: Symbol,
    start: Symbol,
    producer: Symbol,
}

impl ReifyIdentities {
    pub fn new() -> Self {
        ReifyIdentities
    }

    pub fn reify(
        &self,
        mut qsu: AuthenticatedQsu,
        _ctx: &mut PlanCtx,
    ) -> PassResult<ResearchedQsu> {
        let order = qsu.graph.topological_order().map_err(graph_err)?;

        let demands = self.collect_demands(&qsu, &order)?;
        if demands.is_empty() {
            return Ok(ResearchedQsu {
                graph: qsu.graph,
                auth: qsu.auth,
            });
        }

        // classify each demanded producer by the shape of its rows
        let mut modes: BTreeMap<Symbol, Mode> = BTreeMap::new();
        for demand in &demands {
            if modes.contains_key(&demand.producer) {
                continue;
            }
            let QScript::LeftShift(shift) =
                qsu.graph.pattern(demand.producer).map_err(graph_err)?
            else {
                return Err(PipelineError::NonRepresentableInExpr {
                    pass: Pass::ReifyIdentities,
                    symbol: demand.producer,
                    detail: "identity demanded from a node that introduces none".to_string(),
                });
            };
            let mode = if is_record(&shift.repair) {
                Mode::Record
            } else {
                Mode::Envelope
            };
            modes.insert(demand.producer, mode);
        }
        let keys: BTreeMap<Symbol, String> = modes
            .keys()
            .map(|producer| (*producer, format!("_id_{producer}")))
            .collect();

        // walk each demand down to its producer, recording which nodes must
        // forward the key and which must be enveloped
        let mut forward_keys: BTreeMap<Symbol, BTreeSet<Symbol>> = BTreeMap::new();
        let mut enveloped: BTreeSet<Symbol> = BTreeSet::new();
        for demand in &demands {
            let mode = modes[&demand.producer];
            if mode == Mode::Envelope {
                enveloped.insert(demand.producer);
            }
            let mut cursor = demand.start;
            while cursor != demand.producer {
                let pattern = qsu.graph.pattern(cursor).map_err(graph_err)?;
                let next = match pattern {
                    QScript::Filter(filter) => filter.src,
                    QScript::Sort(sort) => sort.src,
                    QScript::Subset(subset) => subset.src,
                    QScript::Map(map) => {
                        forward_keys
                            .entry(cursor)
                            .or_default()
                            .insert(demand.producer);
                        map.src
                    }
                    QScript::LeftShift(shift) => {
                        forward_keys
                            .entry(cursor)
                            .or_default()
                            .insert(demand.producer);
                        shift.src
                    }
                    _ => {
                        return Err(PipelineError::NonRepresentableInExpr {
                            pass: Pass::ReifyIdentities,
                            symbol: demand.consumer,
                            detail: format!(
                                "identity of `{}` cannot flow through a {}",
                                demand.producer,
                                pattern.variant_name()
                            ),
                        });
                    }
                };
                if mode == Mode::Envelope {
                    enveloped.insert(cursor);
                }
                cursor = next;
            }
        }

        // rows stay enveloped through row-preserving nodes above the spine
        self.close_envelope(&qsu, &order, &mut enveloped)?;
        if enveloped.contains(&qsu.graph.root()) {
            return Err(PipelineError::NonRepresentableInExpr {
                pass: Pass::ReifyIdentities,
                symbol: qsu.graph.root(),
                detail: "identity envelope would leak into the plan output".to_string(),
            });
        }

        // rewrite every node: compensate enveloped inputs, project identity
        // accesses onto their keys, promote producers, forward keys
        for &symbol in &order {
            let pattern = qsu.graph.pattern(symbol).map_err(graph_err)?.clone();
            let rewritten = self.rewrite_node(
                symbol,
                pattern,
                &modes,
                &keys,
                &enveloped,
                forward_keys.get(&symbol),
            )?;
            qsu.graph.overwrite(symbol, rewritten).map_err(graph_err)?;
        }

        self.verify_no_identities(&qsu)?;
        Ok(ResearchedQsu {
            graph: qsu.graph,
            auth: qsu.auth,
        })
    }

    fn collect_demands(
        &self,
        qsu: &AuthenticatedQsu,
        order: &[Symbol],
    ) -> PassResult<Vec<Demand>> {
        let mut demands: Vec<Demand> = vec![];
        let mut seen = BTreeSet::new();
        for &consumer in order {
            let pattern = qsu.graph.pattern(consumer).map_err(graph_err)?;
            let mut found: Vec<(Symbol, Symbol)> = vec![];
            match pattern {
                QScript::Map(map) => scan_free(&map.func, map.src, &mut found),
                QScript::Filter(filter) => scan_free(&filter.predicate, filter.src, &mut found),
                QScript::Sort(sort) => {
                    for bucket in &sort.buckets {
                        scan_free(bucket, sort.src, &mut found);
                    }
                    for key in &sort.order {
                        scan_free(&key.expr, sort.src, &mut found);
                    }
                }
                QScript::Reduce(reduce) => {
                    for bucket in &reduce.buckets {
                        scan_free(bucket, reduce.src, &mut found);
                    }
                    for reducer in &reduce.reducers {
                        scan_free(&reducer.arg, reduce.src, &mut found);
                    }
                }
                QScript::LeftShift(shift) => {
                    scan_free(&shift.structure, shift.src, &mut found);
                    scan_join(&shift.repair, shift.src, shift.src, &mut found);
                }
                QScript::MultiLeftShift(multi) => {
                    for spec in &multi.shifts {
                        scan_free(&spec.structure, multi.src, &mut found);
                    }
                }
                QScript::ThetaJoin(join) => {
                    scan_join(&join.on, join.left, join.right, &mut found);
                    scan_join(&join.combine, join.left, join.right, &mut found);
                }
                QScript::EquiJoin(join) => {
                    for key in &join.keys {
                        scan_free(&key.left, join.left, &mut found);
                        scan_free(&key.right, join.right, &mut found);
                    }
                    scan_join(&join.combine, join.left, join.right, &mut found);
                }
                QScript::AutoJoin(join) => {
                    scan_join(&join.combine, join.left, join.right, &mut found);
                }
                QScript::Union(_)
                | QScript::Subset(_)
                | QScript::Distinct(_)
                | QScript::Read(_)
                | QScript::ShiftedRead(_)
                | QScript::Root
                | QScript::Unreferenced => {}
            }
            for (producer, start) in found {
                if seen.insert((consumer, start, producer)) {
                    demands.push(Demand {
                        consumer,
                        start,
                        producer,
                    });
                }
            }
        }
        Ok(demands)
    }

    fn close_envelope(
        &self,
        qsu: &AuthenticatedQsu,
        order: &[Symbol],
        enveloped: &mut BTreeSet<Symbol>,
    ) -> PassResult<()> {
        loop {
            let mut grew = false;
            for &symbol in order {
                if enveloped.contains(&symbol) {
                    continue;
                }
                let pattern = qsu.graph.pattern(symbol).map_err(graph_err)?;
                match pattern {
                    QScript::Filter(filter) if enveloped.contains(&filter.src) => {
                        enveloped.insert(symbol);
                        grew = true;
                    }
                    QScript::Sort(sort) if enveloped.contains(&sort.src) => {
                        enveloped.insert(symbol);
                        grew = true;
                    }
                    QScript::Subset(subset) if enveloped.contains(&subset.src) => {
                        enveloped.insert(symbol);
                        grew = true;
                    }
                    QScript::Distinct(distinct) if enveloped.contains(&distinct.src) => {
                        return Err(PipelineError::NonRepresentableInExpr {
                            pass: Pass::ReifyIdentities,
                            symbol,
                            detail: "distinct over identity-carrying rows".to_string(),
                        });
                    }
                    QScript::Union(union)
                        if enveloped.contains(&union.left)
                            || enveloped.contains(&union.right) =>
                    {
                        return Err(PipelineError::NonRepresentableInExpr {
                            pass: Pass::ReifyIdentities,
                            symbol,
                            detail: "identity envelope reaches a union branch".to_string(),
                        });
                    }
                    _ => {}
                }
            }
            if !grew {
                return Ok(());
            }
        }
    }

    fn rewrite_node(
        &self,
        symbol: Symbol,
        pattern: QScript<Symbol>,
        modes: &BTreeMap<Symbol, Mode>,
        keys: &BTreeMap<Symbol, String>,
        enveloped: &BTreeSet<Symbol>,
        forwards: Option<&BTreeSet<Symbol>>,
    ) -> PassResult<QScript<Symbol>> {
        let env = |operand: Symbol| enveloped.contains(&operand);
        let in_envelope = enveloped.contains(&symbol);

        let rewritten = match pattern {
            QScript::Map(mut map) => {
                map.func = rewrite_free(map.func, env(map.src), keys);
                if in_envelope {
                    let mut wrapped = dsl::make_map_s(VALUE_KEY, map.func);
                    for producer in forwards.into_iter().flatten() {
                        wrapped = dsl::concat_maps(wrapped, forward_free(&keys[producer]));
                    }
                    map.func = wrapped;
                } else if let Some(forwards) = forwards {
                    for producer in forwards {
                        map.func =
                            append_record(map.func, forward_free(&keys[producer]), symbol)?;
                    }
                }
                QScript::Map(map)
            }
            QScript::LeftShift(mut shift) => {
                shift.structure = rewrite_free(shift.structure, env(shift.src), keys);
                shift.repair = rewrite_join(shift.repair, env(shift.src), false, keys);

                if let Some(mode) = modes.get(&symbol) {
                    // promotion: emit the identity alongside the value
                    let (value_repair, id_expr) = match shift.id_status {
                        IdStatus::ExcludeId => {
                            shift.id_status = IdStatus::IncludeId;
                            let value = shift.repair.clone().map_free(&mut |target| {
                                if target == JoinTarget::RightTarget {
                                    dsl::project_index_i(
                                        MapFunc::Free(JoinTarget::RightTarget),
                                        1,
                                    )
                                } else {
                                    MapFunc::Free(target)
                                }
                            });
                            (
                                value,
                                dsl::project_index_i(MapFunc::Free(JoinTarget::RightTarget), 0),
                            )
                        }
                        IdStatus::IncludeId => (
                            shift.repair.clone(),
                            dsl::project_index_i(MapFunc::Free(JoinTarget::RightTarget), 0),
                        ),
                        IdStatus::IdOnly => (
                            shift.repair.clone(),
                            MapFunc::Free(JoinTarget::RightTarget),
                        ),
                    };
                    let own_entry = dsl::make_map_s(&keys[&symbol], id_expr);
                    shift.repair = match mode {
                        Mode::Record => append_record(value_repair, own_entry, symbol)?,
                        Mode::Envelope => dsl::concat_maps(
                            dsl::make_map_s(VALUE_KEY, value_repair),
                            own_entry,
                        ),
                    };
                    for producer in forwards.into_iter().flatten() {
                        if *producer == symbol {
                            continue;
                        }
                        shift.repair = append_record(
                            shift.repair,
                            forward_join(&keys[producer]),
                            symbol,
                        )?;
                    }
                } else if in_envelope {
                    let mut wrapped = dsl::make_map_s(VALUE_KEY, shift.repair);
                    for producer in forwards.into_iter().flatten() {
                        wrapped = dsl::concat_maps(wrapped, forward_join(&keys[producer]));
                    }
                    shift.repair = wrapped;
                } else if let Some(forwards) = forwards {
                    for producer in forwards {
                        shift.repair = append_record(
                            shift.repair,
                            forward_join(&keys[producer]),
                            symbol,
                        )?;
                    }
                }
                QScript::LeftShift(shift)
            }
            QScript::Filter(mut filter) => {
                filter.predicate = rewrite_free(filter.predicate, env(filter.src), keys);
                QScript::Filter(filter)
            }
            QScript::Sort(mut sort) => {
                let src_enveloped = env(sort.src);
                sort.buckets = sort
                    .buckets
                    .into_iter()
                    .map(|bucket| rewrite_free(bucket, src_enveloped, keys))
                    .collect();
                sort.order = sort
                    .order
                    .into_iter()
                    .map(|mut key| {
                        key.expr = rewrite_free(key.expr, src_enveloped, keys);
                        key
                    })
                    .collect();
                QScript::Sort(sort)
            }
            QScript::Reduce(mut reduce) => {
                let src_enveloped = env(reduce.src);
                reduce.buckets = reduce
                    .buckets
                    .into_iter()
                    .map(|bucket| rewrite_free(bucket, src_enveloped, keys))
                    .collect();
                reduce.reducers = reduce
                    .reducers
                    .into_iter()
                    .map(|mut reducer| {
                        reducer.arg = rewrite_free(reducer.arg, src_enveloped, keys);
                        reducer
                    })
                    .collect();
                QScript::Reduce(reduce)
            }
            QScript::ThetaJoin(mut join) => {
                join.on = rewrite_join(join.on, env(join.left), env(join.right), keys);
                join.combine = rewrite_join(join.combine, env(join.left), env(join.right), keys);
                QScript::ThetaJoin(join)
            }
            QScript::EquiJoin(mut join) => {
                let left_enveloped = env(join.left);
                let right_enveloped = env(join.right);
                join.keys = join
                    .keys
                    .into_iter()
                    .map(|mut key| {
                        key.left = rewrite_free(key.left, left_enveloped, keys);
                        key.right = rewrite_free(key.right, right_enveloped, keys);
                        key
                    })
                    .collect();
                join.combine = rewrite_join(join.combine, left_enveloped, right_enveloped, keys);
                QScript::EquiJoin(join)
            }
            other => other,
        };
        Ok(rewritten)
    }

    fn verify_no_identities(&self, qsu: &AuthenticatedQsu) -> PassResult<()> {
        for pattern in qsu.graph.vertices().values() {
            let leftover = match pattern {
                QScript::Map(map) => find_identity_free(&map.func),
                QScript::Filter(filter) => find_identity_free(&filter.predicate),
                QScript::Sort(sort) => sort
                    .buckets
                    .iter()
                    .find_map(find_identity_free)
                    .or_else(|| sort.order.iter().find_map(|key| find_identity_free(&key.expr))),
                QScript::Reduce(reduce) => reduce
                    .buckets
                    .iter()
                    .find_map(find_identity_free)
                    .or_else(|| {
                        reduce
                            .reducers
                            .iter()
                            .find_map(|reducer| find_identity_free(&reducer.arg))
                    }),
                QScript::LeftShift(shift) => find_identity_free(&shift.structure)
                    .or_else(|| find_identity_join(&shift.repair)),
                QScript::MultiLeftShift(multi) => multi
                    .shifts
                    .iter()
                    .find_map(|spec| find_identity_free(&spec.structure)),
                QScript::ThetaJoin(join) => {
                    find_identity_join(&join.on).or_else(|| find_identity_join(&join.combine))
                }
                QScript::EquiJoin(join) => join
                    .keys
                    .iter()
                    .find_map(|key| {
                        find_identity_free(&key.left).or_else(|| find_identity_free(&key.right))
                    })
                    .or_else(|| find_identity_join(&join.combine)),
                QScript::AutoJoin(join) => find_identity_join(&join.combine),
                _ => None,
            };
            if let Some(producer) = leftover {
                return Err(PipelineError::Provenance {
                    pass: Pass::ReifyIdentities,
                    source: crate::provenance::errors::ProvenanceError::UnreifiedIdentity {
                        symbol: producer,
                    },
                });
            }
        }
        Ok(())
    }
}

fn graph_err(source: GraphError) -> PipelineError {
    PipelineError::Graph {
        pass: Pass::ReifyIdentities,
        source,
    }
}

fn scan_free(expr: &FreeMapA, start: Symbol, found: &mut Vec<(Symbol, Symbol)>) {
    expr.for_each_free(&mut |access| {
        if let Access::Identity(producer) = access {
            found.push((*producer, start));
        }
    });
}

fn scan_join(expr: &JoinFuncA, left: Symbol, right: Symbol, found: &mut Vec<(Symbol, Symbol)>) {
    expr.for_each_free(&mut |target| match target {
        JoinTarget::AccessLeftTarget(Access::Identity(producer)) => {
            found.push((*producer, left));
        }
        JoinTarget::AccessRightTarget(Access::Identity(producer)) => {
            found.push((*producer, right));
        }
        _ => {}
    });
}

fn find_identity_free(expr: &FreeMapA) -> Option<Symbol> {
    let mut found = None;
    expr.for_each_free(&mut |access| {
        if let Access::Identity(producer) = access {
            found = Some(*producer);
        }
    });
    found
}

fn find_identity_join(expr: &JoinFuncA) -> Option<Symbol> {
    let mut found = None;
    expr.for_each_free(&mut |target| {
        if let JoinTarget::AccessLeftTarget(Access::Identity(producer))
        | JoinTarget::AccessRightTarget(Access::Identity(producer)) = target
        {
            found = Some(*producer);
        }
    });
    found
}

/// Is this expression guaranteed to evaluate to a record row?
fn is_record<A: PartialEq>(expr: &MapFunc<A>) -> bool {
    match expr {
        MapFunc::ConcatMaps(_, _) | MapFunc::MakeMap(_, _) => true,
        MapFunc::Cond(_, then, otherwise) if **otherwise == MapFunc::Undefined => is_record(then),
        _ => false,
    }
}

/// Appends one key-value entry to a record-producing expression, recursing
/// through undefined-guarded conditionals.
fn append_record<A: PartialEq + Clone>(
    expr: MapFunc<A>,
    entry: MapFunc<A>,
    at: Symbol,
) -> PassResult<MapFunc<A>> {
    match expr {
        MapFunc::Cond(predicate, then, otherwise) if *otherwise == MapFunc::Undefined => {
            Ok(MapFunc::Cond(
                predicate,
                Box::new(append_record(*then, entry, at)?),
                otherwise,
            ))
        }
        MapFunc::ConcatMaps(_, _) | MapFunc::MakeMap(_, _) => Ok(dsl::concat_maps(expr, entry)),
        _ => Err(PipelineError::NonRepresentableInExpr {
            pass: Pass::ReifyIdentities,
            symbol: at,
            detail: "row is not a record; cannot carry an identity column".to_string(),
        }),
    }
}

/// `{key: input.key}` entry forwarding an identity through a Map.
fn forward_free(key: &str) -> FreeMapA {
    dsl::make_map_s(key, dsl::project_key_s(MapFunc::Free(Access::Value), key))
}

/// `{key: leftRow.key}` entry forwarding an identity through a shift.
fn forward_join(key: &str) -> JoinFuncA {
    dsl::make_map_s(
        key,
        dsl::project_key_s(
            MapFunc::Free(JoinTarget::AccessLeftTarget(Access::Value)),
            key,
        ),
    )
}

/// Rewrites row accesses: identity accesses become key projections, and
/// value accesses of enveloped inputs go through the value slot.
fn rewrite_free(expr: FreeMapA, src_enveloped: bool, keys: &BTreeMap<Symbol, String>) -> FreeMapA {
    expr.map_free(&mut |access| match access {
        Access::Value => {
            if src_enveloped {
                dsl::project_key_s(MapFunc::Free(Access::Value), VALUE_KEY)
            } else {
                MapFunc::Free(Access::Value)
            }
        }
        Access::Identity(producer) => match keys.get(&producer) {
            Some(key) => dsl::project_key_s(MapFunc::Free(Access::Value), key),
            None => MapFunc::Free(Access::Identity(producer)),
        },
    })
}

fn rewrite_join(
    expr: JoinFuncA,
    left_enveloped: bool,
    right_enveloped: bool,
    keys: &BTreeMap<Symbol, String>,
) -> JoinFuncA {
    expr.map_free(&mut |target| match target {
        JoinTarget::LeftTarget | JoinTarget::AccessLeftTarget(Access::Value) => {
            if left_enveloped {
                dsl::project_key_s(MapFunc::Free(target), VALUE_KEY)
            } else {
                MapFunc::Free(target)
            }
        }
        JoinTarget::RightTarget | JoinTarget::AccessRightTarget(Access::Value) => {
            if right_enveloped {
                dsl::project_key_s(MapFunc::Free(target), VALUE_KEY)
            } else {
                MapFunc::Free(target)
            }
        }
        JoinTarget::AccessLeftTarget(Access::Identity(producer)) => {
            match keys.get(&producer) {
                Some(key) => dsl::project_key_s(
                    MapFunc::Free(JoinTarget::AccessLeftTarget(Access::Value)),
                    key,
                ),
                None => MapFunc::Free(target),
            }
        }
        JoinTarget::AccessRightTarget(Access::Identity(producer)) => {
            match keys.get(&producer) {
                Some(key) => dsl::project_key_s(
                    MapFunc::Free(JoinTarget::AccessRightTarget(Access::Value)),
                    key,
                ),
                None => MapFunc::Free(target),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::name_gen::NameGenerator;
    use crate::graph::qsu_graph::QsuGraph;
    use crate::pipeline::apply_provenance::ApplyProvenance;
    use crate::qscript::types::{JoinType, ReadPath, ReduceIndex, Reducer, Rotation};

    fn zips_read(names: &mut NameGenerator) -> QsuGraph {
        QsuGraph::with_name(
            names,
            dsl::shifted_read(ReadPath::from_segments(&["db", "zips"]), IdStatus::ExcludeId),
        )
    }

    fn reify(graph: QsuGraph) -> PassResult<ResearchedQsu> {
        let mut ctx = PlanCtx::new();
        let authed = ApplyProvenance::new().apply(graph, &mut ctx).unwrap();
        ReifyIdentities::new().reify(authed, &mut ctx)
    }

    #[test]
    fn test_guard_chain_uses_record_fast_path() {
        // the shape ExpandShifts leaves behind: a record-repair shift whose
        // successor guards on its identity
        let mut names = NameGenerator::new();
        let mut graph = zips_read(&mut names);
        let src = graph.root();
        let first = names.fresh();
        let second = names.fresh();
        let scaffold = dsl::concat_maps(
            dsl::make_map_s(
                "original",
                MapFunc::Free(JoinTarget::AccessLeftTarget(Access::Value)),
            ),
            dsl::make_map_s("0", MapFunc::Free(JoinTarget::RightTarget)),
        );
        graph.insert(
            first,
            dsl::left_shift(
                src,
                MapFunc::Free(Access::Value),
                IdStatus::ExcludeId,
                Rotation::ShiftArray,
                scaffold.clone(),
            ),
        );
        // the successor's own identity is already resolved; only the
        // upstream identity access remains
        let guarded = dsl::cond(
            dsl::eq(
                MapFunc::Free(JoinTarget::AccessLeftTarget(Access::Identity(first))),
                dsl::project_index_i(MapFunc::Free(JoinTarget::RightTarget), 0),
            ),
            dsl::make_map_s(
                "1",
                dsl::project_index_i(MapFunc::Free(JoinTarget::RightTarget), 1),
            ),
            MapFunc::Undefined,
        );
        graph.insert(
            second,
            dsl::left_shift(
                first,
                dsl::project_key_s(MapFunc::Free(Access::Value), "original"),
                IdStatus::IncludeId,
                Rotation::ShiftArray,
                guarded,
            ),
        );
        let graph = QsuGraph::from_parts(second, graph.vertices().clone()).unwrap();

        let researched = reify(graph).unwrap();
        let key = format!("_id_{first}");

        match researched.graph.pattern(first).unwrap() {
            QScript::LeftShift(shift) => {
                // promoted to carry its identity
                assert_eq!(shift.id_status, IdStatus::IncludeId);
                match &shift.repair {
                    MapFunc::ConcatMaps(_, entry) => {
                        assert_eq!(
                            **entry,
                            dsl::make_map_s(
                                &key,
                                dsl::project_index_i(
                                    MapFunc::Free(JoinTarget::RightTarget),
                                    0
                                ),
                            )
                        );
                    }
                    other => panic!("Expected appended identity entry, got {:?}", other),
                }
            }
            other => panic!("Expected LeftShift, got {:?}", other),
        }

        match researched.graph.pattern(second).unwrap() {
            QScript::LeftShift(shift) => match &shift.repair {
                MapFunc::Cond(predicate, _, _) => {
                    assert_eq!(
                        **predicate,
                        dsl::eq(
                            dsl::project_key_s(
                                MapFunc::Free(JoinTarget::AccessLeftTarget(Access::Value)),
                                &key,
                            ),
                            dsl::project_index_i(MapFunc::Free(JoinTarget::RightTarget), 0),
                        )
                    );
                }
                other => panic!("Expected guarded repair, got {:?}", other),
            },
            other => panic!("Expected LeftShift, got {:?}", other),
        }
    }

    #[test]
    fn test_plain_shift_identity_is_enveloped_through_the_spine() {
        // equi join on the identity of a bare-value shift, reached through a
        // Map on one side and a Filter on the other
        let mut names = NameGenerator::new();
        let mut graph = zips_read(&mut names);
        let src = graph.root();
        let shift = names.fresh();
        let left = names.fresh();
        let right = names.fresh();
        let joined = names.fresh();
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
        graph.insert(
            left,
            dsl::map(shift, dsl::project_key_s(MapFunc::Free(Access::Value), "lat")),
        );
        graph.insert(
            right,
            dsl::filter(
                shift,
                dsl::eq(MapFunc::Free(Access::Value), dsl::int_lit(0)),
            ),
        );
        graph.insert(
            joined,
            dsl::equi_join(
                left,
                right,
                vec![(
                    MapFunc::Free(Access::Identity(shift)),
                    MapFunc::Free(Access::Identity(shift)),
                )],
                JoinType::Inner,
                MapFunc::Free(JoinTarget::LeftTarget),
            ),
        );
        let graph = QsuGraph::from_parts(joined, graph.vertices().clone()).unwrap();

        let researched = reify(graph).unwrap();
        let key = format!("_id_{shift}");

        // producer is enveloped: {_value: ..., _id: ...}
        match researched.graph.pattern(shift).unwrap() {
            QScript::LeftShift(promoted) => {
                assert_eq!(promoted.id_status, IdStatus::IncludeId);
                assert_eq!(
                    promoted.repair,
                    dsl::concat_maps(
                        dsl::make_map_s(
                            VALUE_KEY,
                            dsl::project_index_i(MapFunc::Free(JoinTarget::RightTarget), 1),
                        ),
                        dsl::make_map_s(
                            &key,
                            dsl::project_index_i(MapFunc::Free(JoinTarget::RightTarget), 0),
                        ),
                    )
                );
            }
            other => panic!("Expected promoted LeftShift, got {:?}", other),
        }

        // the Map on the spine computes through the value slot and forwards
        // the identity key
        match researched.graph.pattern(left).unwrap() {
            QScript::Map(map) => {
                assert_eq!(
                    map.func,
                    dsl::concat_maps(
                        dsl::make_map_s(
                            VALUE_KEY,
                            dsl::project_key_s(
                                dsl::project_key_s(MapFunc::Free(Access::Value), VALUE_KEY),
                                "lat",
                            ),
                        ),
                        forward_free(&key),
                    )
                );
            }
            other => panic!("Expected enveloped Map, got {:?}", other),
        }

        // the filter compensates its predicate but passes rows through
        match researched.graph.pattern(right).unwrap() {
            QScript::Filter(filter) => {
                assert_eq!(
                    filter.predicate,
                    dsl::eq(
                        dsl::project_key_s(MapFunc::Free(Access::Value), VALUE_KEY),
                        dsl::int_lit(0),
                    )
                );
            }
            other => panic!("Expected Filter, got {:?}", other),
        }

        // the join keys project the materialized identity; the combine
        // reads values through the envelope
        match researched.graph.pattern(joined).unwrap() {
            QScript::EquiJoin(join) => {
                assert_eq!(
                    join.keys[0].left,
                    dsl::project_key_s(MapFunc::Free(Access::Value), &key)
                );
                assert_eq!(
                    join.keys[0].right,
                    dsl::project_key_s(MapFunc::Free(Access::Value), &key)
                );
                assert_eq!(
                    join.combine,
                    dsl::project_key_s(MapFunc::Free(JoinTarget::LeftTarget), VALUE_KEY)
                );
            }
            other => panic!("Expected EquiJoin, got {:?}", other),
        }
    }

    #[test]
    fn test_identity_cannot_flow_through_a_reduce() {
        let mut names = NameGenerator::new();
        let mut graph = zips_read(&mut names);
        let src = graph.root();
        let shift = names.fresh();
        let reduced = names.fresh();
        let consumer = names.fresh();
        graph.insert(
            shift,
            dsl::left_shift(
                src,
                MapFunc::Free(Access::Value),
                IdStatus::ExcludeId,
                Rotation::ShiftArray,
                MapFunc::Free(JoinTarget::RightTarget),
            ),
        );
        graph.insert(
            reduced,
            dsl::reduce(
                shift,
                vec![MapFunc::Free(Access::Value)],
                vec![(Reducer::Count, MapFunc::Free(Access::Value))],
                MapFunc::Free(ReduceIndex(0)),
            ),
        );
        graph.insert(
            consumer,
            dsl::map(
                reduced,
                dsl::eq(
                    MapFunc::Free(Access::Identity(shift)),
                    MapFunc::Free(Access::Value),
                ),
            ),
        );
        let graph = QsuGraph::from_parts(consumer, graph.vertices().clone()).unwrap();

        match reify(graph) {
            Err(PipelineError::NonRepresentableInExpr { .. }) => {}
            other => panic!("Expected NonRepresentableInExpr, got {:?}", other),
        }
    }

    #[test]
    fn test_no_demands_is_a_no_op() {
        let mut names = NameGenerator::new();
        let mut graph = zips_read(&mut names);
        let src = graph.root();
        let top = names.fresh();
        graph.insert(
            top,
            dsl::map(src, dsl::project_key_s(MapFunc::Free(Access::Value), "city")),
        );
        let graph = QsuGraph::from_parts(top, graph.vertices().clone()).unwrap();
        let before = graph.clone();

        let researched = reify(graph).unwrap();
        assert_eq!(researched.graph, before);
    }
}
