//! Convenience constructors for logical plans, used by hosts and tests.

use std::sync::Arc;

use crate::logical_plan::logical_plan::{
    Combine, Filter, GroupBy, Join, JoinCondition, Let, LogicalPlan, Map, Shift, Sort, Subset,
    Union,
};
use crate::qscript::mapfunc::{FreeMap, Literal, ReduceFunc};
use crate::qscript::types::{
    IdStatus, JoinType, ReadPath, Reducer, Rotation, SortDir, SubsetOp,
};

pub fn read(segments: &[&str]) -> Arc<LogicalPlan> {
    Arc::new(LogicalPlan::Read(ReadPath::from_segments(segments)))
}

pub fn constant(lit: Literal) -> Arc<LogicalPlan> {
    Arc::new(LogicalPlan::Constant(lit))
}

pub fn free(name: &str) -> Arc<LogicalPlan> {
    Arc::new(LogicalPlan::Free(name.to_string()))
}

pub fn let_bound(
    name: &str,
    form: Arc<LogicalPlan>,
    body: Arc<LogicalPlan>,
) -> Arc<LogicalPlan> {
    Arc::new(LogicalPlan::Let(Let {
        name: name.to_string(),
        form,
        body,
    }))
}

pub fn map(src: Arc<LogicalPlan>, func: FreeMap) -> Arc<LogicalPlan> {
    Arc::new(LogicalPlan::Map(Map { src, func }))
}

pub fn shift(
    src: Arc<LogicalPlan>,
    structure: FreeMap,
    id_status: IdStatus,
    rotation: Rotation,
) -> Arc<LogicalPlan> {
    Arc::new(LogicalPlan::Shift(Shift {
        src,
        structure,
        id_status,
        rotation,
    }))
}

pub fn filter(src: Arc<LogicalPlan>, predicate: FreeMap) -> Arc<LogicalPlan> {
    Arc::new(LogicalPlan::Filter(Filter { src, predicate }))
}

pub fn sort(src: Arc<LogicalPlan>, order: Vec<(FreeMap, SortDir)>) -> Arc<LogicalPlan> {
    Arc::new(LogicalPlan::Sort(Sort { src, order }))
}

pub fn group_by(
    src: Arc<LogicalPlan>,
    buckets: Vec<FreeMap>,
    reducers: Vec<(Reducer, FreeMap)>,
    repair: ReduceFunc,
) -> Arc<LogicalPlan> {
    Arc::new(LogicalPlan::GroupBy(GroupBy {
        src,
        buckets,
        reducers,
        repair,
    }))
}

pub fn subset(src: Arc<LogicalPlan>, op: SubsetOp, count: i64) -> Arc<LogicalPlan> {
    Arc::new(LogicalPlan::Subset(Subset { src, op, count }))
}

pub fn union(left: Arc<LogicalPlan>, right: Arc<LogicalPlan>) -> Arc<LogicalPlan> {
    Arc::new(LogicalPlan::Union(Union { left, right }))
}

pub fn join(
    left: Arc<LogicalPlan>,
    right: Arc<LogicalPlan>,
    join_type: JoinType,
    on: JoinCondition,
    combine: JoinCondition,
) -> Arc<LogicalPlan> {
    Arc::new(LogicalPlan::Join(Join {
        left,
        right,
        join_type,
        on,
        combine,
    }))
}

pub fn combine(
    left: Arc<LogicalPlan>,
    right: Arc<LogicalPlan>,
    func: JoinCondition,
) -> Arc<LogicalPlan> {
    Arc::new(LogicalPlan::Combine(Combine { left, right, func }))
}
