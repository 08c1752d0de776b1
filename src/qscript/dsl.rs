//! Construction helpers for scalar and relational trees.
//!
//! Everything here is pure: no helper allocates a symbol, and equality of
//! constructed trees is structural. The scalar helpers are generic over the
//! leaf type so the same sugar serves free maps, repairs, and combiners;
//! the relational helpers are generic over the child carrier.

use crate::qscript::mapfunc::{
    BinaryOp, FreeMapA, JoinFuncA, Literal, MapFunc, MultiShiftFunc, ReduceFunc,
};
use crate::qscript::qscript::{
    AutoJoin, Distinct, EquiJoin, EquiKey, Filter, LeftShift, Map, MultiLeftShift, QScript, Read,
    Reduce, ReducerApply, ShiftSpec, ShiftedRead, Sort, SortKey, Subset, ThetaJoin, Union,
};
use crate::qscript::types::{
    IdStatus, JoinType, ReadPath, Reducer, Rotation, SortDir, SubsetOp,
};

// --- scalar sugar ---

pub fn constant<A>(lit: Literal) -> MapFunc<A> {
    MapFunc::Constant(lit)
}

pub fn str_lit<A>(s: &str) -> MapFunc<A> {
    MapFunc::Constant(Literal::String(s.to_string()))
}

pub fn int_lit<A>(i: i64) -> MapFunc<A> {
    MapFunc::Constant(Literal::Integer(i))
}

pub fn bool_lit<A>(b: bool) -> MapFunc<A> {
    MapFunc::Constant(Literal::Boolean(b))
}

pub fn make_array<A>(elem: MapFunc<A>) -> MapFunc<A> {
    MapFunc::MakeArray(Box::new(elem))
}

pub fn make_map<A>(key: MapFunc<A>, value: MapFunc<A>) -> MapFunc<A> {
    MapFunc::MakeMap(Box::new(key), Box::new(value))
}

/// `MakeMap` with a string-constant key.
pub fn make_map_s<A>(key: &str, value: MapFunc<A>) -> MapFunc<A> {
    make_map(str_lit(key), value)
}

pub fn concat_arrays<A>(left: MapFunc<A>, right: MapFunc<A>) -> MapFunc<A> {
    MapFunc::ConcatArrays(Box::new(left), Box::new(right))
}

pub fn concat_maps<A>(left: MapFunc<A>, right: MapFunc<A>) -> MapFunc<A> {
    MapFunc::ConcatMaps(Box::new(left), Box::new(right))
}

pub fn project_key<A>(src: MapFunc<A>, key: MapFunc<A>) -> MapFunc<A> {
    MapFunc::ProjectKey(Box::new(src), Box::new(key))
}

/// `ProjectKey` with a string-constant key.
pub fn project_key_s<A>(src: MapFunc<A>, key: &str) -> MapFunc<A> {
    project_key(src, str_lit(key))
}

/// `ProjectIndex` with an integer-constant index.
pub fn project_index_i<A>(src: MapFunc<A>, index: i64) -> MapFunc<A> {
    MapFunc::ProjectIndex(Box::new(src), Box::new(int_lit(index)))
}

/// `DeleteKey` with a string-constant key.
pub fn delete_key_s<A>(src: MapFunc<A>, key: &str) -> MapFunc<A> {
    MapFunc::DeleteKey(Box::new(src), Box::new(str_lit(key)))
}

pub fn eq<A>(left: MapFunc<A>, right: MapFunc<A>) -> MapFunc<A> {
    MapFunc::Binary(BinaryOp::Eq, Box::new(left), Box::new(right))
}

pub fn and<A>(left: MapFunc<A>, right: MapFunc<A>) -> MapFunc<A> {
    MapFunc::Binary(BinaryOp::And, Box::new(left), Box::new(right))
}

pub fn cond<A>(pred: MapFunc<A>, then: MapFunc<A>, otherwise: MapFunc<A>) -> MapFunc<A> {
    MapFunc::Cond(Box::new(pred), Box::new(then), Box::new(otherwise))
}

pub fn if_undefined<A>(value: MapFunc<A>, fallback: MapFunc<A>) -> MapFunc<A> {
    MapFunc::IfUndefined(Box::new(value), Box::new(fallback))
}

// --- relational patterns, generic over the child carrier ---

pub fn map<T>(src: T, func: FreeMapA) -> QScript<T> {
    QScript::Map(Map { src, func })
}

pub fn left_shift<T>(
    src: T,
    structure: FreeMapA,
    id_status: IdStatus,
    rotation: Rotation,
    repair: JoinFuncA,
) -> QScript<T> {
    QScript::LeftShift(LeftShift {
        src,
        structure,
        id_status,
        rotation,
        repair,
    })
}

pub fn multi_left_shift<T>(src: T, shifts: Vec<ShiftSpec>, repair: MultiShiftFunc) -> QScript<T> {
    QScript::MultiLeftShift(MultiLeftShift { src, shifts, repair })
}

pub fn reduce<T>(
    src: T,
    buckets: Vec<FreeMapA>,
    reducers: Vec<(Reducer, FreeMapA)>,
    repair: ReduceFunc,
) -> QScript<T> {
    QScript::Reduce(Reduce {
        src,
        buckets,
        reducers: reducers
            .into_iter()
            .map(|(reducer, arg)| ReducerApply { reducer, arg })
            .collect(),
        repair,
    })
}

pub fn sort<T>(src: T, buckets: Vec<FreeMapA>, order: Vec<(FreeMapA, SortDir)>) -> QScript<T> {
    QScript::Sort(Sort {
        src,
        buckets,
        order: order
            .into_iter()
            .map(|(expr, dir)| SortKey { expr, dir })
            .collect(),
    })
}

pub fn filter<T>(src: T, predicate: FreeMapA) -> QScript<T> {
    QScript::Filter(Filter { src, predicate })
}

pub fn union<T>(left: T, right: T) -> QScript<T> {
    QScript::Union(Union { left, right })
}

pub fn subset<T>(src: T, op: SubsetOp, count: T) -> QScript<T> {
    QScript::Subset(Subset { src, op, count })
}

pub fn theta_join<T>(
    left: T,
    right: T,
    on: JoinFuncA,
    join_type: JoinType,
    combine: JoinFuncA,
) -> QScript<T> {
    QScript::ThetaJoin(ThetaJoin {
        left,
        right,
        on,
        join_type,
        combine,
    })
}

pub fn equi_join<T>(
    left: T,
    right: T,
    keys: Vec<(FreeMapA, FreeMapA)>,
    join_type: JoinType,
    combine: JoinFuncA,
) -> QScript<T> {
    QScript::EquiJoin(EquiJoin {
        left,
        right,
        keys: keys
            .into_iter()
            .map(|(left, right)| EquiKey { left, right })
            .collect(),
        join_type,
        combine,
    })
}

pub fn auto_join<T>(left: T, right: T, combine: JoinFuncA) -> QScript<T> {
    QScript::AutoJoin(AutoJoin {
        left,
        right,
        combine,
    })
}

pub fn distinct<T>(src: T) -> QScript<T> {
    QScript::Distinct(Distinct { src })
}

pub fn read<T>(path: ReadPath) -> QScript<T> {
    QScript::Read(Read { path })
}

pub fn shifted_read<T>(path: ReadPath, id_status: IdStatus) -> QScript<T> {
    QScript::ShiftedRead(ShiftedRead { path, id_status })
}
