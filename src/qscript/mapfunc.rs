use std::fmt;

use serde::Serialize;

use crate::qscript::types::{
    Access, Hole, JoinSide, JoinTarget, MultiShiftTarget, ReduceIndex,
};

/// A literal, such as a number, string, boolean, or null.
#[derive(Debug, PartialEq, Clone, Serialize)]
pub enum Literal {
    Integer(i64),
    Float(f64),
    Boolean(bool),
    String(String),
    Null,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize)]
pub enum UnaryOp {
    Negate,
    Not,
    Abs,
    Ceil,
    Floor,
    Trunc,
    Round,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Power,
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    And,
    Or,
    Range,
    Within,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize)]
pub enum Conversion {
    Bool,
    Integer,
    Decimal,
    Null,
    ToString,
    ToId,
    ToTimestamp,
}

/// Temporal parts addressable by extraction and truncation.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize)]
pub enum TemporalPart {
    Century,
    Day,
    Decade,
    Dow,
    Doy,
    Epoch,
    Hour,
    IsoDow,
    IsoYear,
    Microseconds,
    Millennium,
    Milliseconds,
    Minute,
    Month,
    Quarter,
    Second,
    Timezone,
    TimezoneHour,
    TimezoneMinute,
    Week,
    Year,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize)]
pub enum TemporalFunc {
    Date,
    Time,
    Timestamp,
    Interval,
    StartOfDay,
    TimeOfDay,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize)]
pub enum RoundingOp {
    Floor,
    Ceil,
    Round,
}

/// Type shapes checkable by `Guard`.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize)]
pub enum TypePattern {
    Any,
    Bool,
    Numeric,
    Str,
    Temporal,
    Arr,
    Map,
}

/// Scalar expression tree over a leaf variable type `A`.
///
/// The same constructors serve every expression slot in the system; the
/// leaf type says what a variable may refer to (the row, a row access, a
/// join side, a reducer output, ...).
#[derive(Debug, PartialEq, Clone, Serialize)]
pub enum MapFunc<A> {
    /// Leaf variable.
    Free(A),
    Constant(Literal),
    Undefined,
    Now,
    JoinSideName(String),

    Unary(UnaryOp, Box<MapFunc<A>>),
    Binary(BinaryOp, Box<MapFunc<A>>, Box<MapFunc<A>>),

    MakeArray(Box<MapFunc<A>>),
    MakeMap(Box<MapFunc<A>>, Box<MapFunc<A>>),
    ConcatArrays(Box<MapFunc<A>>, Box<MapFunc<A>>),
    ConcatMaps(Box<MapFunc<A>>, Box<MapFunc<A>>),
    ProjectKey(Box<MapFunc<A>>, Box<MapFunc<A>>),
    ProjectIndex(Box<MapFunc<A>>, Box<MapFunc<A>>),
    DeleteKey(Box<MapFunc<A>>, Box<MapFunc<A>>),

    Convert(Conversion, Box<MapFunc<A>>),
    TypeOf(Box<MapFunc<A>>),
    Meta(Box<MapFunc<A>>),

    ExtractPart(TemporalPart, Box<MapFunc<A>>),
    Temporal(TemporalFunc, Box<MapFunc<A>>),
    TemporalTrunc(TemporalPart, Box<MapFunc<A>>),

    Length(Box<MapFunc<A>>),
    Lower(Box<MapFunc<A>>),
    Upper(Box<MapFunc<A>>),
    Substring(Box<MapFunc<A>>, Box<MapFunc<A>>, Box<MapFunc<A>>),
    Split(Box<MapFunc<A>>, Box<MapFunc<A>>),
    Search(Box<MapFunc<A>>, Box<MapFunc<A>>, Box<MapFunc<A>>),

    IfUndefined(Box<MapFunc<A>>, Box<MapFunc<A>>),
    Cond(Box<MapFunc<A>>, Box<MapFunc<A>>, Box<MapFunc<A>>),
    Between(Box<MapFunc<A>>, Box<MapFunc<A>>, Box<MapFunc<A>>),
    Guard(Box<MapFunc<A>>, TypePattern, Box<MapFunc<A>>, Box<MapFunc<A>>),

    RoundScale(RoundingOp, Box<MapFunc<A>>, Box<MapFunc<A>>),
}

/// Published scalar expression: leaves are the row itself.
pub type FreeMap = MapFunc<Hole>;
/// Graph-internal scalar expression: leaves are row accesses.
pub type FreeMapA = MapFunc<Access>;
/// Published repair/combiner: leaves are the two join sides.
pub type JoinFunc = MapFunc<JoinSide>;
/// Graph-internal repair/combiner: leaves are join targets with accesses.
pub type JoinFuncA = MapFunc<JoinTarget>;
/// MultiLeftShift repair: leaves are the original row or a shifted value.
pub type MultiShiftFunc = MapFunc<MultiShiftTarget>;
/// Reduce repair: leaves are reducer outputs by index.
pub type ReduceFunc = MapFunc<ReduceIndex>;

impl<A> MapFunc<A> {
    /// Substitutes every leaf with the expression `f` returns for it,
    /// rebuilding the tree bottom-up. This is the substitution primitive
    /// every pass uses to re-target expressions.
    pub fn try_map_free<B, E, F>(self, f: &mut F) -> Result<MapFunc<B>, E>
    where
        F: FnMut(A) -> Result<MapFunc<B>, E>,
    {
        fn go<A, B, E, F>(boxed: Box<MapFunc<A>>, f: &mut F) -> Result<Box<MapFunc<B>>, E>
        where
            F: FnMut(A) -> Result<MapFunc<B>, E>,
        {
            Ok(Box::new((*boxed).try_map_free(f)?))
        }

        let mapped = match self {
            MapFunc::Free(a) => f(a)?,
            MapFunc::Constant(lit) => MapFunc::Constant(lit),
            MapFunc::Undefined => MapFunc::Undefined,
            MapFunc::Now => MapFunc::Now,
            MapFunc::JoinSideName(name) => MapFunc::JoinSideName(name),
            MapFunc::Unary(op, a) => MapFunc::Unary(op, go(a, f)?),
            MapFunc::Binary(op, a, b) => MapFunc::Binary(op, go(a, f)?, go(b, f)?),
            MapFunc::MakeArray(a) => MapFunc::MakeArray(go(a, f)?),
            MapFunc::MakeMap(k, v) => MapFunc::MakeMap(go(k, f)?, go(v, f)?),
            MapFunc::ConcatArrays(a, b) => MapFunc::ConcatArrays(go(a, f)?, go(b, f)?),
            MapFunc::ConcatMaps(a, b) => MapFunc::ConcatMaps(go(a, f)?, go(b, f)?),
            MapFunc::ProjectKey(src, k) => MapFunc::ProjectKey(go(src, f)?, go(k, f)?),
            MapFunc::ProjectIndex(src, i) => MapFunc::ProjectIndex(go(src, f)?, go(i, f)?),
            MapFunc::DeleteKey(src, k) => MapFunc::DeleteKey(go(src, f)?, go(k, f)?),
            MapFunc::Convert(conv, a) => MapFunc::Convert(conv, go(a, f)?),
            MapFunc::TypeOf(a) => MapFunc::TypeOf(go(a, f)?),
            MapFunc::Meta(a) => MapFunc::Meta(go(a, f)?),
            MapFunc::ExtractPart(part, a) => MapFunc::ExtractPart(part, go(a, f)?),
            MapFunc::Temporal(func, a) => MapFunc::Temporal(func, go(a, f)?),
            MapFunc::TemporalTrunc(part, a) => MapFunc::TemporalTrunc(part, go(a, f)?),
            MapFunc::Length(a) => MapFunc::Length(go(a, f)?),
            MapFunc::Lower(a) => MapFunc::Lower(go(a, f)?),
            MapFunc::Upper(a) => MapFunc::Upper(go(a, f)?),
            MapFunc::Substring(s, from, count) => {
                MapFunc::Substring(go(s, f)?, go(from, f)?, go(count, f)?)
            }
            MapFunc::Split(s, delim) => MapFunc::Split(go(s, f)?, go(delim, f)?),
            MapFunc::Search(s, pattern, insensitive) => {
                MapFunc::Search(go(s, f)?, go(pattern, f)?, go(insensitive, f)?)
            }
            MapFunc::IfUndefined(a, b) => MapFunc::IfUndefined(go(a, f)?, go(b, f)?),
            MapFunc::Cond(p, t, e) => MapFunc::Cond(go(p, f)?, go(t, f)?, go(e, f)?),
            MapFunc::Between(v, lo, hi) => MapFunc::Between(go(v, f)?, go(lo, f)?, go(hi, f)?),
            MapFunc::Guard(v, pattern, cont, fallback) => {
                MapFunc::Guard(go(v, f)?, pattern, go(cont, f)?, go(fallback, f)?)
            }
            MapFunc::RoundScale(op, v, scale) => MapFunc::RoundScale(op, go(v, f)?, go(scale, f)?),
        };
        Ok(mapped)
    }

    /// Infallible leaf substitution.
    pub fn map_free<B, F>(self, f: &mut F) -> MapFunc<B>
    where
        F: FnMut(A) -> MapFunc<B>,
    {
        let result: Result<MapFunc<B>, std::convert::Infallible> =
            self.try_map_free(&mut |a| Ok(f(a)));
        match result {
            Ok(mapped) => mapped,
            Err(never) => match never {},
        }
    }

    pub fn for_each_free<F>(&self, f: &mut F)
    where
        F: FnMut(&A),
    {
        match self {
            MapFunc::Free(a) => f(a),
            MapFunc::Constant(_)
            | MapFunc::Undefined
            | MapFunc::Now
            | MapFunc::JoinSideName(_) => {}
            MapFunc::Unary(_, a)
            | MapFunc::MakeArray(a)
            | MapFunc::Convert(_, a)
            | MapFunc::TypeOf(a)
            | MapFunc::Meta(a)
            | MapFunc::ExtractPart(_, a)
            | MapFunc::Temporal(_, a)
            | MapFunc::TemporalTrunc(_, a)
            | MapFunc::Length(a)
            | MapFunc::Lower(a)
            | MapFunc::Upper(a) => a.for_each_free(f),
            MapFunc::Binary(_, a, b)
            | MapFunc::MakeMap(a, b)
            | MapFunc::ConcatArrays(a, b)
            | MapFunc::ConcatMaps(a, b)
            | MapFunc::ProjectKey(a, b)
            | MapFunc::ProjectIndex(a, b)
            | MapFunc::DeleteKey(a, b)
            | MapFunc::Split(a, b)
            | MapFunc::IfUndefined(a, b)
            | MapFunc::RoundScale(_, a, b) => {
                a.for_each_free(f);
                b.for_each_free(f);
            }
            MapFunc::Substring(a, b, c)
            | MapFunc::Search(a, b, c)
            | MapFunc::Cond(a, b, c)
            | MapFunc::Between(a, b, c) => {
                a.for_each_free(f);
                b.for_each_free(f);
                c.for_each_free(f);
            }
            MapFunc::Guard(a, _, b, c) => {
                a.for_each_free(f);
                b.for_each_free(f);
                c.for_each_free(f);
            }
        }
    }

    pub fn contains_free<F>(&self, pred: F) -> bool
    where
        F: Fn(&A) -> bool,
    {
        let mut found = false;
        self.for_each_free(&mut |a| {
            if pred(a) {
                found = true;
            }
        });
        found
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Integer(i) => write!(f, "{}", i),
            Literal::Float(fl) => write!(f, "{}", fl),
            Literal::Boolean(b) => write!(f, "{}", b),
            Literal::String(s) => write!(f, "{}", s),
            Literal::Null => write!(f, "null"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qscript::dsl;

    #[test]
    fn test_map_free_substitutes_leaves() {
        // project the "city" key out of whatever replaces the hole
        let expr: FreeMap = dsl::project_key_s(MapFunc::Free(Hole), "city");
        let substituted: FreeMapA =
            expr.map_free(&mut |Hole| MapFunc::Free(Access::Value));

        match substituted {
            MapFunc::ProjectKey(src, key) => {
                assert_eq!(*src, MapFunc::Free(Access::Value));
                assert_eq!(*key, MapFunc::Constant(Literal::String("city".to_string())));
            }
            other => panic!("Expected ProjectKey, got {:?}", other),
        }
    }

    #[test]
    fn test_try_map_free_propagates_errors() {
        let expr: FreeMap = dsl::concat_maps(
            dsl::make_map_s("a", MapFunc::Free(Hole)),
            dsl::make_map_s("b", MapFunc::Constant(Literal::Integer(1))),
        );
        let result: Result<FreeMap, &str> = expr.try_map_free(&mut |Hole| Err("no holes allowed"));
        assert_eq!(result, Err("no holes allowed"));
    }

    #[test]
    fn test_contains_free() {
        let expr: FreeMapA = dsl::eq(
            MapFunc::Free(Access::Value),
            MapFunc::Constant(Literal::Integer(3)),
        );
        assert!(expr.contains_free(|a| *a == Access::Value));
        assert!(!expr.contains_free(|a| matches!(a, Access::Identity(_))));
    }

    #[test]
    fn test_literal_display() {
        assert_eq!(format!("{}", Literal::Integer(12345)), "12345");
        assert_eq!(format!("{}", Literal::Float(99.99)), "99.99");
        assert_eq!(format!("{}", Literal::Boolean(true)), "true");
        assert_eq!(
            format!("{}", Literal::String("Hello World".to_string())),
            "Hello World"
        );
        assert_eq!(format!("{}", Literal::Null), "null");
    }
}
