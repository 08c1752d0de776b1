use std::fmt;

use serde::Serialize;

use crate::graph::name_gen::Symbol;

/// Dataset location consumed by `Read`/`ShiftedRead`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ReadPath(pub Vec<String>);

impl ReadPath {
    pub fn from_segments(segments: &[&str]) -> Self {
        ReadPath(segments.iter().map(|s| s.to_string()).collect())
    }

    /// The filesystem root: a read of it can never resolve to a dataset.
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ReadPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("/");
        }
        for segment in &self.0 {
            write!(f, "/{segment}")?;
        }
        Ok(())
    }
}

/// Whether a read or shift yields the row value, its identity, or both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum IdStatus {
    IdOnly,
    IncludeId,
    ExcludeId,
}

/// Public coarsening of [`Rotation`], carried by the published LeftShift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ShiftType {
    Array,
    Map,
}

/// Internal four-way shift mode. The declaration order is the total order
/// used when sorting multi-shifts; it keeps each compatibility class
/// contiguous.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Rotation {
    FlattenArray,
    ShiftArray,
    FlattenMap,
    ShiftMap,
}

impl Rotation {
    pub fn shift_type(self) -> ShiftType {
        match self {
            Rotation::FlattenArray | Rotation::ShiftArray => ShiftType::Array,
            Rotation::FlattenMap | Rotation::ShiftMap => ShiftType::Map,
        }
    }

    /// Two rotations are compatible when they unnest the same axis kind.
    /// Compatible adjacent shifts would multiply rows spuriously unless
    /// guarded by an identity condition.
    pub fn compatible_with(self, other: Rotation) -> bool {
        self.shift_type() == other.shift_type()
    }
}

impl fmt::Display for Rotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rotation::FlattenArray => f.write_str("FlattenArray"),
            Rotation::ShiftArray => f.write_str("ShiftArray"),
            Rotation::FlattenMap => f.write_str("FlattenMap"),
            Rotation::ShiftMap => f.write_str("ShiftMap"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SortDir {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SubsetOp {
    Take,
    Drop,
    Sample,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JoinType {
    Inner,
    LeftOuter,
    RightOuter,
    FullOuter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Reducer {
    Count,
    Sum,
    Min,
    Max,
    Avg,
    Arbitrary,
    First,
    Last,
}

/// Access to a row flowing through the graph: either its value or the
/// identity introduced at the named node. Identity accesses only exist in
/// the uniform algebra; reification rewrites them away before graduation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Access {
    Value,
    Identity(Symbol),
}

/// Leaf of a repair, join condition, or combiner in the uniform algebra.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JoinTarget {
    LeftTarget,
    RightTarget,
    AccessLeftTarget(Access),
    AccessRightTarget(Access),
}

/// Leaf of a MultiLeftShift repair: the original row or the i-th shifted
/// value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MultiShiftTarget {
    Original,
    Shifted(usize),
}

/// Leaf of a Reduce repair: the i-th reducer output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReduceIndex(pub usize);

/// Leaf of a published scalar expression: the row flowing into the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Hole;

/// Leaf of a published repair or combiner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JoinSide {
    LeftSide,
    RightSide,
}
