use crate::graph::name_gen::Symbol;
use crate::graph::qsu_graph::QsuGraph;
use crate::pipeline::ResearchedQsu;
use crate::pipeline::errors::{Pass, PipelineError};
use crate::pipeline::pass::PassResult;
use crate::qscript::educated::{
    Educated, EquiKey, FreeEducated, Filter, LeftShift, Map, QScriptEducated, Reduce,
    ReducerApply, Sort, SortKey, Subset, ThetaJoin, Union, EquiJoin,
};
use crate::qscript::mapfunc::{FreeMap, FreeMapA, JoinFunc, JoinFuncA, MapFunc};
use crate::qscript::qscript::QScript;
use crate::qscript::types::{Access, Hole, JoinSide, JoinTarget, ReduceIndex, Reducer};

/// Projects the rewritten graph onto the published algebra.
///
/// Everything internal must be gone by now: a multi shift, an auto join, or
/// a lingering identity access here is a bug in an earlier pass, not a
/// recoverable condition. Join, union, and subset operands become free
/// sub-plans rooted at the deepest common ancestor of their spines.
pub struct Graduate;

impl Graduate {
    pub fn new() -> Self {
        Graduate
    }

    pub fn graduate(&self, researched: &ResearchedQsu) -> PassResult<QScriptEducated> {
        self.educate_tree(&researched.graph, researched.graph.root())
    }

    fn educate_tree(&self, graph: &QsuGraph, symbol: Symbol) -> PassResult<QScriptEducated> {
        let pattern = graph.pattern(symbol).map_err(graph_err)?;
        let educated = match pattern {
            QScript::Map(map) => Educated::Map(Map {
                src: Box::new(self.educate_tree(graph, map.src)?),
                func: lower_free(map.func.clone(), symbol)?,
            }),
            QScript::LeftShift(shift) => Educated::LeftShift(LeftShift {
                src: Box::new(self.educate_tree(graph, shift.src)?),
                structure: lower_free(shift.structure.clone(), symbol)?,
                id_status: shift.id_status,
                shift_type: shift.rotation.shift_type(),
                repair: lower_join(shift.repair.clone(), symbol)?,
            }),
            QScript::Reduce(reduce) => Educated::Reduce(Reduce {
                src: Box::new(self.educate_tree(graph, reduce.src)?),
                buckets: lower_buckets(&reduce.buckets, symbol)?,
                reducers: lower_reducers(&reduce.reducers, symbol)?,
                repair: reduce.repair.clone(),
            }),
            QScript::Sort(sort) => Educated::Sort(Sort {
                src: Box::new(self.educate_tree(graph, sort.src)?),
                buckets: lower_buckets(&sort.buckets, symbol)?,
                order: sort
                    .order
                    .iter()
                    .map(|key| {
                        Ok(SortKey {
                            expr: lower_free(key.expr.clone(), symbol)?,
                            dir: key.dir,
                        })
                    })
                    .collect::<PassResult<Vec<_>>>()?,
            }),
            QScript::Filter(filter) => Educated::Filter(Filter {
                src: Box::new(self.educate_tree(graph, filter.src)?),
                predicate: lower_free(filter.predicate.clone(), symbol)?,
            }),
            QScript::Union(union) => {
                let stop = graph.deepest_common_ancestor(union.left, union.right);
                Educated::Union(Union {
                    src: self.branch_src(graph, stop)?,
                    l_branch: self.educate_branch(graph, union.left, stop)?,
                    r_branch: self.educate_branch(graph, union.right, stop)?,
                })
            }
            QScript::Subset(subset) => {
                let stop = graph.deepest_common_ancestor(subset.src, subset.count);
                Educated::Subset(Subset {
                    src: self.branch_src(graph, stop)?,
                    from: self.educate_branch(graph, subset.src, stop)?,
                    op: subset.op,
                    count: self.educate_branch(graph, subset.count, stop)?,
                })
            }
            QScript::ThetaJoin(join) => {
                let stop = graph.deepest_common_ancestor(join.left, join.right);
                Educated::ThetaJoin(ThetaJoin {
                    src: self.branch_src(graph, stop)?,
                    l_branch: self.educate_branch(graph, join.left, stop)?,
                    r_branch: self.educate_branch(graph, join.right, stop)?,
                    on: lower_join(join.on.clone(), symbol)?,
                    join_type: join.join_type,
                    combine: lower_join(join.combine.clone(), symbol)?,
                })
            }
            QScript::EquiJoin(join) => {
                let stop = graph.deepest_common_ancestor(join.left, join.right);
                Educated::EquiJoin(EquiJoin {
                    src: self.branch_src(graph, stop)?,
                    l_branch: self.educate_branch(graph, join.left, stop)?,
                    r_branch: self.educate_branch(graph, join.right, stop)?,
                    keys: lower_keys(&join.keys, symbol)?,
                    join_type: join.join_type,
                    combine: lower_join(join.combine.clone(), symbol)?,
                })
            }
            QScript::Distinct(distinct) => {
                Educated::Reduce(distinct_as_reduce(Box::new(
                    self.educate_tree(graph, distinct.src)?,
                )))
            }
            QScript::Read(read) => Educated::Read(read.clone()),
            QScript::ShiftedRead(read) => Educated::ShiftedRead(read.clone()),
            QScript::Unreferenced => Educated::Unreferenced,
            QScript::Root => return Err(PipelineError::NoFilePathFound { symbol }),
            QScript::MultiLeftShift(_) => {
                return Err(unexpected(symbol, "MultiLeftShift"));
            }
            QScript::AutoJoin(_) => {
                return Err(unexpected(symbol, "AutoJoin"));
            }
        };
        Ok(QScriptEducated(educated))
    }

    fn branch_src(
        &self,
        graph: &QsuGraph,
        stop: Option<Symbol>,
    ) -> PassResult<Box<QScriptEducated>> {
        match stop {
            Some(symbol) => Ok(Box::new(self.educate_tree(graph, symbol)?)),
            None => Ok(Box::new(QScriptEducated(Educated::Unreferenced))),
        }
    }

    fn educate_branch(
        &self,
        graph: &QsuGraph,
        symbol: Symbol,
        stop: Option<Symbol>,
    ) -> PassResult<FreeEducated> {
        if stop == Some(symbol) {
            return Ok(FreeEducated::Hole);
        }
        let pattern = graph.pattern(symbol).map_err(graph_err)?;
        let educated = match pattern {
            QScript::Map(map) => Educated::Map(Map {
                src: self.educate_branch(graph, map.src, stop)?,
                func: lower_free(map.func.clone(), symbol)?,
            }),
            QScript::LeftShift(shift) => Educated::LeftShift(LeftShift {
                src: self.educate_branch(graph, shift.src, stop)?,
                structure: lower_free(shift.structure.clone(), symbol)?,
                id_status: shift.id_status,
                shift_type: shift.rotation.shift_type(),
                repair: lower_join(shift.repair.clone(), symbol)?,
            }),
            QScript::Reduce(reduce) => Educated::Reduce(Reduce {
                src: self.educate_branch(graph, reduce.src, stop)?,
                buckets: lower_buckets(&reduce.buckets, symbol)?,
                reducers: lower_reducers(&reduce.reducers, symbol)?,
                repair: reduce.repair.clone(),
            }),
            QScript::Sort(sort) => Educated::Sort(Sort {
                src: self.educate_branch(graph, sort.src, stop)?,
                buckets: lower_buckets(&sort.buckets, symbol)?,
                order: sort
                    .order
                    .iter()
                    .map(|key| {
                        Ok(SortKey {
                            expr: lower_free(key.expr.clone(), symbol)?,
                            dir: key.dir,
                        })
                    })
                    .collect::<PassResult<Vec<_>>>()?,
            }),
            QScript::Filter(filter) => Educated::Filter(Filter {
                src: self.educate_branch(graph, filter.src, stop)?,
                predicate: lower_free(filter.predicate.clone(), symbol)?,
            }),
            QScript::Union(union) => {
                let inner = graph.deepest_common_ancestor(union.left, union.right);
                Educated::Union(Union {
                    src: self.nested_branch_src(graph, inner, stop)?,
                    l_branch: self.educate_branch(graph, union.left, inner)?,
                    r_branch: self.educate_branch(graph, union.right, inner)?,
                })
            }
            QScript::Subset(subset) => {
                let inner = graph.deepest_common_ancestor(subset.src, subset.count);
                Educated::Subset(Subset {
                    src: self.nested_branch_src(graph, inner, stop)?,
                    from: self.educate_branch(graph, subset.src, inner)?,
                    op: subset.op,
                    count: self.educate_branch(graph, subset.count, inner)?,
                })
            }
            QScript::ThetaJoin(join) => {
                let inner = graph.deepest_common_ancestor(join.left, join.right);
                Educated::ThetaJoin(ThetaJoin {
                    src: self.nested_branch_src(graph, inner, stop)?,
                    l_branch: self.educate_branch(graph, join.left, inner)?,
                    r_branch: self.educate_branch(graph, join.right, inner)?,
                    on: lower_join(join.on.clone(), symbol)?,
                    join_type: join.join_type,
                    combine: lower_join(join.combine.clone(), symbol)?,
                })
            }
            QScript::EquiJoin(join) => {
                let inner = graph.deepest_common_ancestor(join.left, join.right);
                Educated::EquiJoin(EquiJoin {
                    src: self.nested_branch_src(graph, inner, stop)?,
                    l_branch: self.educate_branch(graph, join.left, inner)?,
                    r_branch: self.educate_branch(graph, join.right, inner)?,
                    keys: lower_keys(&join.keys, symbol)?,
                    join_type: join.join_type,
                    combine: lower_join(join.combine.clone(), symbol)?,
                })
            }
            QScript::Distinct(distinct) => Educated::Reduce(distinct_as_reduce(
                self.educate_branch(graph, distinct.src, stop)?,
            )),
            QScript::Read(read) => Educated::Read(read.clone()),
            QScript::ShiftedRead(read) => Educated::ShiftedRead(read.clone()),
            QScript::Unreferenced => Educated::Unreferenced,
            QScript::Root => return Err(PipelineError::NoFilePathFound { symbol }),
            QScript::MultiLeftShift(_) => {
                return Err(unexpected(symbol, "MultiLeftShift"));
            }
            QScript::AutoJoin(_) => {
                return Err(unexpected(symbol, "AutoJoin"));
            }
        };
        Ok(FreeEducated::Op(Box::new(educated)))
    }

    fn nested_branch_src(
        &self,
        graph: &QsuGraph,
        inner: Option<Symbol>,
        stop: Option<Symbol>,
    ) -> PassResult<FreeEducated> {
        match inner {
            Some(symbol) => self.educate_branch(graph, symbol, stop),
            None => Ok(FreeEducated::Op(Box::new(Educated::Unreferenced))),
        }
    }
}

fn graph_err(source: crate::graph::errors::GraphError) -> PipelineError {
    PipelineError::Graph {
        pass: Pass::Graduate,
        source,
    }
}

fn unexpected(symbol: Symbol, construct: &'static str) -> PipelineError {
    PipelineError::UnexpectedConstruct {
        pass: Pass::Graduate,
        symbol,
        construct,
    }
}

/// The canonical lowering of Distinct: group on the whole row, keep one.
fn distinct_as_reduce<T>(src: T) -> Reduce<T> {
    Reduce {
        src,
        buckets: vec![MapFunc::Free(Hole)],
        reducers: vec![ReducerApply {
            reducer: Reducer::Arbitrary,
            arg: MapFunc::Free(Hole),
        }],
        repair: MapFunc::Free(ReduceIndex(0)),
    }
}

fn lower_free(expr: FreeMapA, symbol: Symbol) -> PassResult<FreeMap> {
    expr.try_map_free(&mut |access| match access {
        Access::Value => Ok(MapFunc::Free(Hole)),
        Access::Identity(_) => Err(unexpected(symbol, "identity access")),
    })
}

fn lower_join(expr: JoinFuncA, symbol: Symbol) -> PassResult<JoinFunc> {
    expr.try_map_free(&mut |target| match target {
        JoinTarget::LeftTarget | JoinTarget::AccessLeftTarget(Access::Value) => {
            Ok(MapFunc::Free(JoinSide::LeftSide))
        }
        JoinTarget::RightTarget | JoinTarget::AccessRightTarget(Access::Value) => {
            Ok(MapFunc::Free(JoinSide::RightSide))
        }
        JoinTarget::AccessLeftTarget(Access::Identity(_))
        | JoinTarget::AccessRightTarget(Access::Identity(_)) => {
            Err(unexpected(symbol, "identity access"))
        }
    })
}

fn lower_buckets(buckets: &[FreeMapA], symbol: Symbol) -> PassResult<Vec<FreeMap>> {
    buckets
        .iter()
        .map(|bucket| lower_free(bucket.clone(), symbol))
        .collect()
}

fn lower_reducers(
    reducers: &[crate::qscript::qscript::ReducerApply],
    symbol: Symbol,
) -> PassResult<Vec<ReducerApply>> {
    reducers
        .iter()
        .map(|reducer| {
            Ok(ReducerApply {
                reducer: reducer.reducer,
                arg: lower_free(reducer.arg.clone(), symbol)?,
            })
        })
        .collect()
}

fn lower_keys(
    keys: &[crate::qscript::qscript::EquiKey],
    symbol: Symbol,
) -> PassResult<Vec<EquiKey>> {
    keys.iter()
        .map(|key| {
            Ok(EquiKey {
                left: lower_free(key.left.clone(), symbol)?,
                right: lower_free(key.right.clone(), symbol)?,
            })
        })
        .collect()
}
