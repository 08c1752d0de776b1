use std::collections::{BTreeMap, BTreeSet};

use crate::graph::name_gen::Symbol;
use crate::graph::qsu_graph::QsuGraph;
use crate::provenance::errors::ProvenanceError;
use crate::qscript::mapfunc::FreeMapA;
use crate::qscript::qscript::QScript;
use crate::qscript::types::{ReadPath, Rotation};

/// Origin coordinates of the rows at a node: a polynomial over base
/// identities, shift-introduced identity axes, and reduction buckets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provenance {
    /// Rows with no identity at all (sentinels, constants).
    Nada,
    /// Base identity of a dataset read.
    Prim(ReadPath),
    /// Identity axis introduced by the shift at the named node.
    Inflate(Symbol, Rotation),
    /// Bucket coordinate of the reduction at the named node.
    Bucket(Symbol, usize),
    /// Both coordinates contribute (joins, shifts over their source).
    Both(Box<Provenance>, Box<Provenance>),
    /// Either coordinate contributes (unions).
    OneOf(Box<Provenance>, Box<Provenance>),
}

impl Provenance {
    pub fn both(left: Provenance, right: Provenance) -> Provenance {
        match (left, right) {
            (Provenance::Nada, other) | (other, Provenance::Nada) => other,
            (left, right) => Provenance::Both(Box::new(left), Box::new(right)),
        }
    }

    pub fn one_of(left: Provenance, right: Provenance) -> Provenance {
        if left == Provenance::Nada && right == Provenance::Nada {
            Provenance::Nada
        } else {
            Provenance::OneOf(Box::new(left), Box::new(right))
        }
    }

    /// The shift-introduced identity axes mentioned anywhere in the
    /// polynomial.
    pub fn identities(&self) -> BTreeSet<Symbol> {
        let mut out = BTreeSet::new();
        self.collect_identities(&mut out);
        out
    }

    fn collect_identities(&self, out: &mut BTreeSet<Symbol>) {
        match self {
            Provenance::Nada | Provenance::Prim(_) | Provenance::Bucket(_, _) => {}
            Provenance::Inflate(symbol, _) => {
                out.insert(*symbol);
            }
            Provenance::Both(left, right) | Provenance::OneOf(left, right) => {
                left.collect_identities(out);
                right.collect_identities(out);
            }
        }
    }
}

/// Names one bucket expression of one Reduce node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct GroupKey {
    pub symbol: Symbol,
    pub index: usize,
}

/// The authentication map threaded through the provenance-aware passes:
/// per-symbol provenance plus the reified grouping keys.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QAuth {
    dims: BTreeMap<Symbol, Provenance>,
    keys: BTreeMap<GroupKey, FreeMapA>,
}

impl QAuth {
    pub fn new() -> Self {
        QAuth::default()
    }

    pub fn record_dims(&mut self, symbol: Symbol, provenance: Provenance) {
        self.dims.insert(symbol, provenance);
    }

    pub fn lookup_dims(&self, symbol: Symbol) -> Result<&Provenance, ProvenanceError> {
        self.dims
            .get(&symbol)
            .ok_or(ProvenanceError::MissingProvenance { symbol })
    }

    pub fn record_key(&mut self, key: GroupKey, expr: FreeMapA) {
        self.keys.insert(key, expr);
    }

    pub fn lookup_key(&self, key: GroupKey) -> Result<&FreeMapA, ProvenanceError> {
        self.keys.get(&key).ok_or(ProvenanceError::MissingGroupKey {
            symbol: key.symbol,
            index: key.index,
        })
    }

    /// All grouping keys recorded for one Reduce node, in index order.
    pub fn keys_for(&self, symbol: Symbol) -> Vec<(GroupKey, &FreeMapA)> {
        self.keys
            .iter()
            .filter(|(key, _)| key.symbol == symbol)
            .map(|(key, expr)| (*key, expr))
            .collect()
    }

    /// Invariant check after a pass declared provenance complete: every
    /// reachable symbol has an entry.
    pub fn verify_covers(&self, graph: &QsuGraph) -> Result<(), ProvenanceError> {
        for symbol in graph.reachable()? {
            if !self.dims.contains_key(&symbol) {
                return Err(ProvenanceError::MissingProvenance { symbol });
            }
        }
        Ok(())
    }
}

/// Computes provenance for every reachable symbol, bottom-up.
pub fn compute(graph: &QsuGraph, auth: &mut QAuth) -> Result<(), ProvenanceError> {
    for symbol in graph.topological_order()? {
        let provenance = of_pattern(graph.pattern(symbol)?, symbol, auth)?;
        auth.record_dims(symbol, provenance);
    }
    Ok(())
}

/// Provenance of one pattern, given that its operands are already recorded.
pub fn of_pattern(
    pattern: &QScript<Symbol>,
    symbol: Symbol,
    auth: &QAuth,
) -> Result<Provenance, ProvenanceError> {
    let provenance = match pattern {
        QScript::Map(map) => auth.lookup_dims(map.src)?.clone(),
        QScript::Filter(filter) => auth.lookup_dims(filter.src)?.clone(),
        QScript::Sort(sort) => auth.lookup_dims(sort.src)?.clone(),
        QScript::Subset(subset) => auth.lookup_dims(subset.src)?.clone(),
        QScript::Distinct(distinct) => auth.lookup_dims(distinct.src)?.clone(),
        QScript::Reduce(reduce) => {
            let mut provenance = Provenance::Nada;
            for index in 0..reduce.buckets.len() {
                provenance = Provenance::both(provenance, Provenance::Bucket(symbol, index));
            }
            provenance
        }
        QScript::LeftShift(shift) => Provenance::both(
            auth.lookup_dims(shift.src)?.clone(),
            Provenance::Inflate(symbol, shift.rotation),
        ),
        QScript::MultiLeftShift(shift) => {
            let mut provenance = auth.lookup_dims(shift.src)?.clone();
            for spec in &shift.shifts {
                provenance =
                    Provenance::both(provenance, Provenance::Inflate(symbol, spec.rotation));
            }
            provenance
        }
        QScript::Union(union) => Provenance::one_of(
            auth.lookup_dims(union.left)?.clone(),
            auth.lookup_dims(union.right)?.clone(),
        ),
        QScript::ThetaJoin(join) => Provenance::both(
            auth.lookup_dims(join.left)?.clone(),
            auth.lookup_dims(join.right)?.clone(),
        ),
        QScript::EquiJoin(join) => Provenance::both(
            auth.lookup_dims(join.left)?.clone(),
            auth.lookup_dims(join.right)?.clone(),
        ),
        QScript::AutoJoin(join) => Provenance::both(
            auth.lookup_dims(join.left)?.clone(),
            auth.lookup_dims(join.right)?.clone(),
        ),
        QScript::Read(read) => Provenance::Prim(read.path.clone()),
        QScript::ShiftedRead(read) => Provenance::Prim(read.path.clone()),
        QScript::Root | QScript::Unreferenced => Provenance::Nada,
    };
    Ok(provenance)
}
