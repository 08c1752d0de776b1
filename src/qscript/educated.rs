//! The published output algebra accepted by backend planners.
//!
//! Graduation converts the uniform graph algebra into this restricted
//! coproduct: no multi shifts, no auto joins, no identity accesses, and the
//! internal four-way rotation coarsened to the public [`ShiftType`]. Join,
//! union, and subset operands are free sub-plans rooted at a hole.

use serde::Serialize;

use crate::qscript::mapfunc::{FreeMap, JoinFunc, ReduceFunc};
use crate::qscript::qscript::{Read, ShiftedRead};
use crate::qscript::types::{
    IdStatus, JoinType, Reducer, ShiftType, SortDir, SubsetOp,
};

#[derive(Debug, PartialEq, Clone, Serialize)]
pub enum Educated<T> {
    Map(Map<T>),
    LeftShift(LeftShift<T>),
    Reduce(Reduce<T>),
    Sort(Sort<T>),
    Filter(Filter<T>),
    Union(Union<T>),
    Subset(Subset<T>),
    ThetaJoin(ThetaJoin<T>),
    EquiJoin(EquiJoin<T>),
    Read(Read),
    ShiftedRead(ShiftedRead),
    Unreferenced,
}

/// The published plan: a tree of educated operators.
#[derive(Debug, PartialEq, Clone, Serialize)]
pub struct QScriptEducated(pub Educated<Box<QScriptEducated>>);

/// A sub-plan operand rooted at a hole (the row flowing in from `src`).
#[derive(Debug, PartialEq, Clone, Serialize)]
pub enum FreeEducated {
    Hole,
    Op(Box<Educated<FreeEducated>>),
}

#[derive(Debug, PartialEq, Clone, Serialize)]
pub struct Map<T> {
    pub src: T,
    pub func: FreeMap,
}

#[derive(Debug, PartialEq, Clone, Serialize)]
pub struct LeftShift<T> {
    pub src: T,
    pub structure: FreeMap,
    pub id_status: IdStatus,
    pub shift_type: ShiftType,
    pub repair: JoinFunc,
}

#[derive(Debug, PartialEq, Clone, Serialize)]
pub struct Reduce<T> {
    pub src: T,
    pub buckets: Vec<FreeMap>,
    pub reducers: Vec<ReducerApply>,
    pub repair: ReduceFunc,
}

#[derive(Debug, PartialEq, Clone, Serialize)]
pub struct ReducerApply {
    pub reducer: Reducer,
    pub arg: FreeMap,
}

#[derive(Debug, PartialEq, Clone, Serialize)]
pub struct Sort<T> {
    pub src: T,
    pub buckets: Vec<FreeMap>,
    pub order: Vec<SortKey>,
}

#[derive(Debug, PartialEq, Clone, Serialize)]
pub struct SortKey {
    pub expr: FreeMap,
    pub dir: SortDir,
}

#[derive(Debug, PartialEq, Clone, Serialize)]
pub struct Filter<T> {
    pub src: T,
    pub predicate: FreeMap,
}

#[derive(Debug, PartialEq, Clone, Serialize)]
pub struct Union<T> {
    pub src: T,
    pub l_branch: FreeEducated,
    pub r_branch: FreeEducated,
}

#[derive(Debug, PartialEq, Clone, Serialize)]
pub struct Subset<T> {
    pub src: T,
    pub from: FreeEducated,
    pub op: SubsetOp,
    pub count: FreeEducated,
}

#[derive(Debug, PartialEq, Clone, Serialize)]
pub struct ThetaJoin<T> {
    pub src: T,
    pub l_branch: FreeEducated,
    pub r_branch: FreeEducated,
    pub on: JoinFunc,
    pub join_type: JoinType,
    pub combine: JoinFunc,
}

#[derive(Debug, PartialEq, Clone, Serialize)]
pub struct EquiJoin<T> {
    pub src: T,
    pub l_branch: FreeEducated,
    pub r_branch: FreeEducated,
    pub keys: Vec<EquiKey>,
    pub join_type: JoinType,
    pub combine: JoinFunc,
}

#[derive(Debug, PartialEq, Clone, Serialize)]
pub struct EquiKey {
    pub left: FreeMap,
    pub right: FreeMap,
}

impl<T> Educated<T> {
    pub fn variant_name(&self) -> &'static str {
        match self {
            Educated::Map(_) => "Map",
            Educated::LeftShift(_) => "LeftShift",
            Educated::Reduce(_) => "Reduce",
            Educated::Sort(_) => "Sort",
            Educated::Filter(_) => "Filter",
            Educated::Union(_) => "Union",
            Educated::Subset(_) => "Subset",
            Educated::ThetaJoin(_) => "ThetaJoin",
            Educated::EquiJoin(_) => "EquiJoin",
            Educated::Read(_) => "Read",
            Educated::ShiftedRead(_) => "ShiftedRead",
            Educated::Unreferenced => "Unreferenced",
        }
    }

    /// Tree children and branch operands, for walkers.
    pub fn parts(&self) -> (Vec<&T>, Vec<&FreeEducated>) {
        match self {
            Educated::Map(map) => (vec![&map.src], vec![]),
            Educated::LeftShift(shift) => (vec![&shift.src], vec![]),
            Educated::Reduce(reduce) => (vec![&reduce.src], vec![]),
            Educated::Sort(sort) => (vec![&sort.src], vec![]),
            Educated::Filter(filter) => (vec![&filter.src], vec![]),
            Educated::Union(union) => (vec![&union.src], vec![&union.l_branch, &union.r_branch]),
            Educated::Subset(subset) => (vec![&subset.src], vec![&subset.from, &subset.count]),
            Educated::ThetaJoin(join) => {
                (vec![&join.src], vec![&join.l_branch, &join.r_branch])
            }
            Educated::EquiJoin(join) => (vec![&join.src], vec![&join.l_branch, &join.r_branch]),
            Educated::Read(_) | Educated::ShiftedRead(_) | Educated::Unreferenced => {
                (vec![], vec![])
            }
        }
    }
}

impl QScriptEducated {
    pub fn variant_name(&self) -> &'static str {
        self.0.variant_name()
    }

    /// Counts nodes of the named variant across the tree and all branch
    /// sub-plans.
    pub fn count_variant(&self, name: &str) -> usize {
        let mut count = if self.0.variant_name() == name { 1 } else { 0 };
        let (children, branches) = self.0.parts();
        for child in children {
            count += child.count_variant(name);
        }
        for branch in branches {
            count += branch.count_variant(name);
        }
        count
    }
}

impl FreeEducated {
    pub fn count_variant(&self, name: &str) -> usize {
        match self {
            FreeEducated::Hole => 0,
            FreeEducated::Op(op) => {
                let mut count = if op.variant_name() == name { 1 } else { 0 };
                let (children, branches) = op.parts();
                for child in children {
                    count += child.count_variant(name);
                }
                for branch in branches {
                    count += branch.count_variant(name);
                }
                count
            }
        }
    }
}
