use std::fmt;

use serde::Serialize;

use crate::graph::name_gen::Symbol;
use crate::qscript::mapfunc::{FreeMapA, JoinFuncA, MultiShiftFunc, ReduceFunc};
use crate::qscript::types::{
    IdStatus, JoinType, ReadPath, Reducer, Rotation, SortDir, SubsetOp,
};

/// The uniform relational algebra, generic over the child carrier `T`.
///
/// Inside a graph `T` is a [`Symbol`]; every operand of every operator is a
/// reference to another graph node. The published algebra after graduation
/// is a separate, restricted enum ([`crate::qscript::educated`]).
#[derive(Debug, PartialEq, Clone, Serialize)]
pub enum QScript<T> {
    /// Apply a scalar function to each row.
    Map(Map<T>),

    /// Unnest the value produced by `structure` from each row.
    LeftShift(LeftShift<T>),

    /// An n-ary shift over one source; lowered to a LeftShift chain before
    /// graduation.
    MultiLeftShift(MultiLeftShift<T>),

    /// Group rows by bucket expressions and fold each group.
    Reduce(Reduce<T>),

    Sort(Sort<T>),

    Filter(Filter<T>),

    Union(Union<T>),

    Subset(Subset<T>),

    ThetaJoin(ThetaJoin<T>),

    EquiJoin(EquiJoin<T>),

    /// Implicit join of two plans over their shared origin; reified into an
    /// explicit join (or merged away) before graduation.
    AutoJoin(AutoJoin<T>),

    /// Recognized deduplication idiom.
    Distinct(Distinct<T>),

    Read(Read),

    ShiftedRead(ShiftedRead),

    /// Dead end: a read that can never resolve to a dataset.
    Root,

    /// Sentinel empty source.
    Unreferenced,
}

#[derive(Debug, PartialEq, Clone, Serialize)]
pub struct Map<T> {
    pub src: T,
    pub func: FreeMapA,
}

#[derive(Debug, PartialEq, Clone, Serialize)]
pub struct LeftShift<T> {
    pub src: T,
    pub structure: FreeMapA,
    pub id_status: IdStatus,
    pub rotation: Rotation,
    pub repair: JoinFuncA,
}

#[derive(Debug, PartialEq, Clone, Serialize)]
pub struct ShiftSpec {
    pub structure: FreeMapA,
    pub id_status: IdStatus,
    pub rotation: Rotation,
}

#[derive(Debug, PartialEq, Clone, Serialize)]
pub struct MultiLeftShift<T> {
    pub src: T,
    pub shifts: Vec<ShiftSpec>,
    pub repair: MultiShiftFunc,
}

#[derive(Debug, PartialEq, Clone, Serialize)]
pub struct Reduce<T> {
    pub src: T,
    pub buckets: Vec<FreeMapA>,
    pub reducers: Vec<ReducerApply>,
    pub repair: ReduceFunc,
}

#[derive(Debug, PartialEq, Clone, Serialize)]
pub struct ReducerApply {
    pub reducer: Reducer,
    pub arg: FreeMapA,
}

#[derive(Debug, PartialEq, Clone, Serialize)]
pub struct Sort<T> {
    pub src: T,
    pub buckets: Vec<FreeMapA>,
    pub order: Vec<SortKey>,
}

#[derive(Debug, PartialEq, Clone, Serialize)]
pub struct SortKey {
    pub expr: FreeMapA,
    pub dir: SortDir,
}

#[derive(Debug, PartialEq, Clone, Serialize)]
pub struct Filter<T> {
    pub src: T,
    pub predicate: FreeMapA,
}

#[derive(Debug, PartialEq, Clone, Serialize)]
pub struct Union<T> {
    pub left: T,
    pub right: T,
}

#[derive(Debug, PartialEq, Clone, Serialize)]
pub struct Subset<T> {
    pub src: T,
    pub op: SubsetOp,
    pub count: T,
}

#[derive(Debug, PartialEq, Clone, Serialize)]
pub struct ThetaJoin<T> {
    pub left: T,
    pub right: T,
    pub on: JoinFuncA,
    pub join_type: JoinType,
    pub combine: JoinFuncA,
}

#[derive(Debug, PartialEq, Clone, Serialize)]
pub struct EquiJoin<T> {
    pub left: T,
    pub right: T,
    pub keys: Vec<EquiKey>,
    pub join_type: JoinType,
    pub combine: JoinFuncA,
}

#[derive(Debug, PartialEq, Clone, Serialize)]
pub struct EquiKey {
    pub left: FreeMapA,
    pub right: FreeMapA,
}

#[derive(Debug, PartialEq, Clone, Serialize)]
pub struct AutoJoin<T> {
    pub left: T,
    pub right: T,
    pub combine: JoinFuncA,
}

#[derive(Debug, PartialEq, Clone, Serialize)]
pub struct Distinct<T> {
    pub src: T,
}

#[derive(Debug, PartialEq, Clone, Serialize)]
pub struct Read {
    pub path: ReadPath,
}

#[derive(Debug, PartialEq, Clone, Serialize)]
pub struct ShiftedRead {
    pub path: ReadPath,
    pub id_status: IdStatus,
}

impl<T> QScript<T> {
    pub fn variant_name(&self) -> &'static str {
        match self {
            QScript::Map(_) => "Map",
            QScript::LeftShift(_) => "LeftShift",
            QScript::MultiLeftShift(_) => "MultiLeftShift",
            QScript::Reduce(_) => "Reduce",
            QScript::Sort(_) => "Sort",
            QScript::Filter(_) => "Filter",
            QScript::Union(_) => "Union",
            QScript::Subset(_) => "Subset",
            QScript::ThetaJoin(_) => "ThetaJoin",
            QScript::EquiJoin(_) => "EquiJoin",
            QScript::AutoJoin(_) => "AutoJoin",
            QScript::Distinct(_) => "Distinct",
            QScript::Read(_) => "Read",
            QScript::ShiftedRead(_) => "ShiftedRead",
            QScript::Root => "Root",
            QScript::Unreferenced => "Unreferenced",
        }
    }

    /// The primary source operand, for operators that have exactly one.
    pub fn src(&self) -> Option<&T> {
        match self {
            QScript::Map(map) => Some(&map.src),
            QScript::LeftShift(shift) => Some(&shift.src),
            QScript::MultiLeftShift(shift) => Some(&shift.src),
            QScript::Reduce(reduce) => Some(&reduce.src),
            QScript::Sort(sort) => Some(&sort.src),
            QScript::Filter(filter) => Some(&filter.src),
            QScript::Subset(subset) => Some(&subset.src),
            QScript::Distinct(distinct) => Some(&distinct.src),
            QScript::Union(_)
            | QScript::ThetaJoin(_)
            | QScript::EquiJoin(_)
            | QScript::AutoJoin(_)
            | QScript::Read(_)
            | QScript::ShiftedRead(_)
            | QScript::Root
            | QScript::Unreferenced => None,
        }
    }

    /// All operand references, in a fixed order.
    pub fn children(&self) -> Vec<&T> {
        match self {
            QScript::Map(map) => vec![&map.src],
            QScript::LeftShift(shift) => vec![&shift.src],
            QScript::MultiLeftShift(shift) => vec![&shift.src],
            QScript::Reduce(reduce) => vec![&reduce.src],
            QScript::Sort(sort) => vec![&sort.src],
            QScript::Filter(filter) => vec![&filter.src],
            QScript::Union(union) => vec![&union.left, &union.right],
            QScript::Subset(subset) => vec![&subset.src, &subset.count],
            QScript::ThetaJoin(join) => vec![&join.left, &join.right],
            QScript::EquiJoin(join) => vec![&join.left, &join.right],
            QScript::AutoJoin(join) => vec![&join.left, &join.right],
            QScript::Distinct(distinct) => vec![&distinct.src],
            QScript::Read(_)
            | QScript::ShiftedRead(_)
            | QScript::Root
            | QScript::Unreferenced => vec![],
        }
    }

    pub fn children_mut(&mut self) -> Vec<&mut T> {
        match self {
            QScript::Map(map) => vec![&mut map.src],
            QScript::LeftShift(shift) => vec![&mut shift.src],
            QScript::MultiLeftShift(shift) => vec![&mut shift.src],
            QScript::Reduce(reduce) => vec![&mut reduce.src],
            QScript::Sort(sort) => vec![&mut sort.src],
            QScript::Filter(filter) => vec![&mut filter.src],
            QScript::Union(union) => vec![&mut union.left, &mut union.right],
            QScript::Subset(subset) => vec![&mut subset.src, &mut subset.count],
            QScript::ThetaJoin(join) => vec![&mut join.left, &mut join.right],
            QScript::EquiJoin(join) => vec![&mut join.left, &mut join.right],
            QScript::AutoJoin(join) => vec![&mut join.left, &mut join.right],
            QScript::Distinct(distinct) => vec![&mut distinct.src],
            QScript::Read(_)
            | QScript::ShiftedRead(_)
            | QScript::Root
            | QScript::Unreferenced => vec![],
        }
    }

    pub fn map_children<U, F>(self, f: &mut F) -> QScript<U>
    where
        F: FnMut(T) -> U,
    {
        match self {
            QScript::Map(map) => QScript::Map(Map {
                src: f(map.src),
                func: map.func,
            }),
            QScript::LeftShift(shift) => QScript::LeftShift(LeftShift {
                src: f(shift.src),
                structure: shift.structure,
                id_status: shift.id_status,
                rotation: shift.rotation,
                repair: shift.repair,
            }),
            QScript::MultiLeftShift(shift) => QScript::MultiLeftShift(MultiLeftShift {
                src: f(shift.src),
                shifts: shift.shifts,
                repair: shift.repair,
            }),
            QScript::Reduce(reduce) => QScript::Reduce(Reduce {
                src: f(reduce.src),
                buckets: reduce.buckets,
                reducers: reduce.reducers,
                repair: reduce.repair,
            }),
            QScript::Sort(sort) => QScript::Sort(Sort {
                src: f(sort.src),
                buckets: sort.buckets,
                order: sort.order,
            }),
            QScript::Filter(filter) => QScript::Filter(Filter {
                src: f(filter.src),
                predicate: filter.predicate,
            }),
            QScript::Union(union) => QScript::Union(Union {
                left: f(union.left),
                right: f(union.right),
            }),
            QScript::Subset(subset) => QScript::Subset(Subset {
                src: f(subset.src),
                op: subset.op,
                count: f(subset.count),
            }),
            QScript::ThetaJoin(join) => QScript::ThetaJoin(ThetaJoin {
                left: f(join.left),
                right: f(join.right),
                on: join.on,
                join_type: join.join_type,
                combine: join.combine,
            }),
            QScript::EquiJoin(join) => QScript::EquiJoin(EquiJoin {
                left: f(join.left),
                right: f(join.right),
                keys: join.keys,
                join_type: join.join_type,
                combine: join.combine,
            }),
            QScript::AutoJoin(join) => QScript::AutoJoin(AutoJoin {
                left: f(join.left),
                right: f(join.right),
                combine: join.combine,
            }),
            QScript::Distinct(distinct) => QScript::Distinct(Distinct {
                src: f(distinct.src),
            }),
            QScript::Read(read) => QScript::Read(read),
            QScript::ShiftedRead(read) => QScript::ShiftedRead(read),
            QScript::Root => QScript::Root,
            QScript::Unreferenced => QScript::Unreferenced,
        }
    }
}

impl fmt::Display for QScript<Symbol> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QScript::Map(map) => write!(f, "Map({})", map.src),
            QScript::LeftShift(shift) => write!(
                f,
                "LeftShift({}, {}, {:?})",
                shift.src, shift.rotation, shift.id_status
            ),
            QScript::MultiLeftShift(shift) => {
                write!(f, "MultiLeftShift({}, {} shifts)", shift.src, shift.shifts.len())
            }
            QScript::Reduce(reduce) => write!(
                f,
                "Reduce({}, {} buckets, {} reducers)",
                reduce.src,
                reduce.buckets.len(),
                reduce.reducers.len()
            ),
            QScript::Sort(sort) => write!(f, "Sort({}, {} keys)", sort.src, sort.order.len()),
            QScript::Filter(filter) => write!(f, "Filter({})", filter.src),
            QScript::Union(union) => write!(f, "Union({}, {})", union.left, union.right),
            QScript::Subset(subset) => {
                write!(f, "Subset({}, {:?}, {})", subset.src, subset.op, subset.count)
            }
            QScript::ThetaJoin(join) => write!(
                f,
                "ThetaJoin({}, {}, {:?})",
                join.left, join.right, join.join_type
            ),
            QScript::EquiJoin(join) => write!(
                f,
                "EquiJoin({}, {}, {:?})",
                join.left, join.right, join.join_type
            ),
            QScript::AutoJoin(join) => write!(f, "AutoJoin({}, {})", join.left, join.right),
            QScript::Distinct(distinct) => write!(f, "Distinct({})", distinct.src),
            QScript::Read(read) => write!(f, "Read({})", read.path),
            QScript::ShiftedRead(read) => {
                write!(f, "ShiftedRead({}, {:?})", read.path, read.id_status)
            }
            QScript::Root => f.write_str("Root"),
            QScript::Unreferenced => f.write_str("Unreferenced"),
        }
    }
}
