use std::{fmt, sync::Arc};

use crate::qscript::mapfunc::{FreeMap, Literal, MapFunc, ReduceFunc};
use crate::qscript::types::{
    IdStatus, JoinSide, JoinType, ReadPath, Reducer, Rotation, SortDir, SubsetOp,
};

/// Scalar condition over the two operands of a logical join or combine.
pub type JoinCondition = MapFunc<JoinSide>;

/// The input tree produced by the front end. The compilation core consumes
/// it through the ReadLP pass only; scalar expressions arrive already
/// lowered into the shared MapFunc algebra.
#[derive(Debug, PartialEq, Clone)]
pub enum LogicalPlan {
    /// Read of a dataset.
    Read(ReadPath),

    Constant(Literal),

    /// Reference to a let-bound name.
    Free(String),

    Let(Let),

    Map(Map),

    /// Unnest the value produced by `structure` from each row.
    Shift(Shift),

    Filter(Filter),

    Sort(Sort),

    GroupBy(GroupBy),

    Subset(Subset),

    Union(Union),

    Join(Join),

    /// Scalar combination of two sub-plans over their shared origin.
    Combine(Combine),
}

#[derive(Debug, PartialEq, Clone)]
pub struct Let {
    pub name: String,
    pub form: Arc<LogicalPlan>,
    pub body: Arc<LogicalPlan>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct Map {
    pub src: Arc<LogicalPlan>,
    pub func: FreeMap,
}

#[derive(Debug, PartialEq, Clone)]
pub struct Shift {
    pub src: Arc<LogicalPlan>,
    pub structure: FreeMap,
    pub id_status: IdStatus,
    pub rotation: Rotation,
}

#[derive(Debug, PartialEq, Clone)]
pub struct Filter {
    pub src: Arc<LogicalPlan>,
    pub predicate: FreeMap,
}

#[derive(Debug, PartialEq, Clone)]
pub struct Sort {
    pub src: Arc<LogicalPlan>,
    pub order: Vec<(FreeMap, SortDir)>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct GroupBy {
    pub src: Arc<LogicalPlan>,
    pub buckets: Vec<FreeMap>,
    pub reducers: Vec<(Reducer, FreeMap)>,
    pub repair: ReduceFunc,
}

#[derive(Debug, PartialEq, Clone)]
pub struct Subset {
    pub src: Arc<LogicalPlan>,
    pub op: SubsetOp,
    pub count: i64,
}

#[derive(Debug, PartialEq, Clone)]
pub struct Union {
    pub left: Arc<LogicalPlan>,
    pub right: Arc<LogicalPlan>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct Join {
    pub left: Arc<LogicalPlan>,
    pub right: Arc<LogicalPlan>,
    pub join_type: JoinType,
    pub on: JoinCondition,
    pub combine: JoinCondition,
}

#[derive(Debug, PartialEq, Clone)]
pub struct Combine {
    pub left: Arc<LogicalPlan>,
    pub right: Arc<LogicalPlan>,
    pub func: JoinCondition,
}

impl LogicalPlan {
    pub fn variant_name(&self) -> &'static str {
        match self {
            LogicalPlan::Read(_) => "Read",
            LogicalPlan::Constant(_) => "Constant",
            LogicalPlan::Free(_) => "Free",
            LogicalPlan::Let(_) => "Let",
            LogicalPlan::Map(_) => "Map",
            LogicalPlan::Shift(_) => "Shift",
            LogicalPlan::Filter(_) => "Filter",
            LogicalPlan::Sort(_) => "Sort",
            LogicalPlan::GroupBy(_) => "GroupBy",
            LogicalPlan::Subset(_) => "Subset",
            LogicalPlan::Union(_) => "Union",
            LogicalPlan::Join(_) => "Join",
            LogicalPlan::Combine(_) => "Combine",
        }
    }

    fn children(&self) -> Vec<&LogicalPlan> {
        match self {
            LogicalPlan::Read(_) | LogicalPlan::Constant(_) | LogicalPlan::Free(_) => vec![],
            LogicalPlan::Let(binding) => vec![&*binding.form, &*binding.body],
            LogicalPlan::Map(map) => vec![&*map.src],
            LogicalPlan::Shift(shift) => vec![&*shift.src],
            LogicalPlan::Filter(filter) => vec![&*filter.src],
            LogicalPlan::Sort(sort) => vec![&*sort.src],
            LogicalPlan::GroupBy(group_by) => vec![&*group_by.src],
            LogicalPlan::Subset(subset) => vec![&*subset.src],
            LogicalPlan::Union(union) => vec![&*union.left, &*union.right],
            LogicalPlan::Join(join) => vec![&*join.left, &*join.right],
            LogicalPlan::Combine(combine) => vec![&*combine.left, &*combine.right],
        }
    }

    fn fmt_with_tree(
        &self,
        f: &mut fmt::Formatter<'_>,
        prefix: &str,
        is_last: bool,
        is_root: bool,
    ) -> fmt::Result {
        let (branch, next_prefix) = if is_last {
            ("└── ", "    ")
        } else {
            ("├── ", "│   ")
        };

        if is_root {
            writeln!(f, "\n{}", self.variant_name())?;
        } else {
            writeln!(f, "{}{}{}", prefix, branch, self.variant_name())?;
        }

        let children = self.children();
        let child_prefix = if is_root {
            String::new()
        } else {
            format!("{}{}", prefix, next_prefix)
        };
        let count = children.len();
        for (index, child) in children.into_iter().enumerate() {
            child.fmt_with_tree(f, &child_prefix, index + 1 == count, false)?;
        }
        Ok(())
    }
}

impl fmt::Display for LogicalPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_with_tree(f, "", true, true)
    }
}
