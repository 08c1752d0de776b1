use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::graph::errors::GraphError;
use crate::graph::name_gen::{NameGenerator, Symbol};
use crate::qscript::qscript::QScript;

/// A plan under rewriting: a symbol-indexed DAG of operator patterns with a
/// designated root.
///
/// Invariants between passes: every symbol referenced by any pattern is
/// present, the graph is acyclic, and the root reaches every symbol. A graph
/// may be temporarily open (dangling references) while nodes are being
/// assembled; [`QsuGraph::validate`] checks the full invariant.
#[derive(Debug, Clone, PartialEq)]
pub struct QsuGraph {
    root: Symbol,
    vertices: BTreeMap<Symbol, QScript<Symbol>>,
}

impl QsuGraph {
    /// Installs `pattern` under a fresh symbol and returns the graph rooted
    /// there. The result is open until merged with the graphs providing the
    /// pattern's operands.
    pub fn with_name(names: &mut NameGenerator, pattern: QScript<Symbol>) -> QsuGraph {
        let root = names.fresh();
        let mut vertices = BTreeMap::new();
        vertices.insert(root, pattern);
        QsuGraph { root, vertices }
    }

    /// Assembles a graph from already-built vertices. Vertices the root
    /// does not reach (an unused binding, say) are dropped; the remainder
    /// must satisfy the full invariant.
    pub fn from_parts(
        root: Symbol,
        vertices: BTreeMap<Symbol, QScript<Symbol>>,
    ) -> Result<QsuGraph, GraphError> {
        let mut graph = QsuGraph { root, vertices };
        graph.prune_unreachable()?;
        graph.validate()?;
        Ok(graph)
    }

    pub fn root(&self) -> Symbol {
        self.root
    }

    pub fn vertices(&self) -> &BTreeMap<Symbol, QScript<Symbol>> {
        &self.vertices
    }

    pub fn pattern(&self, symbol: Symbol) -> Result<&QScript<Symbol>, GraphError> {
        self.vertices
            .get(&symbol)
            .ok_or(GraphError::UnresolvedReference { symbol })
    }

    pub fn pattern_mut(&mut self, symbol: Symbol) -> Result<&mut QScript<Symbol>, GraphError> {
        self.vertices
            .get_mut(&symbol)
            .ok_or(GraphError::UnresolvedReference { symbol })
    }

    /// Installs a pattern under a symbol minted by the caller's name
    /// generator. Passes never reuse symbols, so a plain insert suffices.
    pub fn insert(&mut self, symbol: Symbol, pattern: QScript<Symbol>) {
        self.vertices.insert(symbol, pattern);
    }

    /// Replaces the pattern of an existing node; its symbol and every
    /// reference to it are unchanged.
    pub fn overwrite(
        &mut self,
        symbol: Symbol,
        pattern: QScript<Symbol>,
    ) -> Result<(), GraphError> {
        let slot = self
            .vertices
            .get_mut(&symbol)
            .ok_or(GraphError::UnresolvedReference { symbol })?;
        *slot = pattern;
        Ok(())
    }

    pub fn overwrite_at_root(&mut self, pattern: QScript<Symbol>) {
        self.vertices.insert(self.root, pattern);
    }

    /// Disjoint-symbol union. Coincident symbols must carry identical
    /// patterns; the root stays on `self`.
    pub fn merge(&mut self, other: QsuGraph) -> Result<(), GraphError> {
        for (symbol, pattern) in other.vertices {
            match self.vertices.get(&symbol) {
                Some(existing) if *existing != pattern => {
                    return Err(GraphError::SymbolCollision { symbol });
                }
                Some(_) => {}
                None => {
                    self.vertices.insert(symbol, pattern);
                }
            }
        }
        Ok(())
    }

    /// Re-points every reference to `from` (including the root) at `to`.
    /// The `from` vertex itself is left in place; pruning removes it once
    /// unreachable.
    pub fn replace_references(&mut self, from: Symbol, to: Symbol) {
        for pattern in self.vertices.values_mut() {
            for child in pattern.children_mut() {
                if *child == from {
                    *child = to;
                }
            }
        }
        if self.root == from {
            self.root = to;
        }
    }

    /// Reverse adjacency: for each symbol, the symbols whose patterns
    /// reference it.
    pub fn reverse_index(&self) -> BTreeMap<Symbol, BTreeSet<Symbol>> {
        let mut index: BTreeMap<Symbol, BTreeSet<Symbol>> = BTreeMap::new();
        for (symbol, pattern) in &self.vertices {
            for child in pattern.children() {
                index.entry(*child).or_default().insert(*symbol);
            }
        }
        index
    }

    /// Symbols reachable from the root.
    pub fn reachable(&self) -> Result<BTreeSet<Symbol>, GraphError> {
        let mut seen = BTreeSet::new();
        let mut stack = vec![self.root];
        while let Some(symbol) = stack.pop() {
            if !seen.insert(symbol) {
                continue;
            }
            let pattern = self.pattern(symbol)?;
            for child in pattern.children() {
                stack.push(*child);
            }
        }
        Ok(seen)
    }

    /// Reachable symbols in dependency order: every operand appears before
    /// the node referencing it. Fails on a cycle or a dangling reference.
    pub fn topological_order(&self) -> Result<Vec<Symbol>, GraphError> {
        enum Frame {
            Enter(Symbol),
            Exit(Symbol),
        }
        #[derive(PartialEq, Clone, Copy)]
        enum Mark {
            InProgress,
            Done,
        }

        let mut order = Vec::new();
        let mut marks: BTreeMap<Symbol, Mark> = BTreeMap::new();
        let mut stack = vec![Frame::Enter(self.root)];
        while let Some(frame) = stack.pop() {
            match frame {
                Frame::Enter(symbol) => match marks.get(&symbol) {
                    Some(Mark::Done) => {}
                    Some(Mark::InProgress) => {
                        return Err(GraphError::CycleDetected { symbol });
                    }
                    None => {
                        marks.insert(symbol, Mark::InProgress);
                        stack.push(Frame::Exit(symbol));
                        for child in self.pattern(symbol)?.children() {
                            stack.push(Frame::Enter(*child));
                        }
                    }
                },
                Frame::Exit(symbol) => {
                    marks.insert(symbol, Mark::Done);
                    order.push(symbol);
                }
            }
        }
        Ok(order)
    }

    /// Bottom-up fallible rewrite: visits every reachable vertex in
    /// dependency order and replaces its pattern wherever the callback
    /// produces one. Returns whether anything changed.
    pub fn rewrite<E, F>(&mut self, f: &mut F) -> Result<bool, E>
    where
        E: From<GraphError>,
        F: FnMut(Symbol, &QScript<Symbol>) -> Result<Option<QScript<Symbol>>, E>,
    {
        let mut changed = false;
        let order = self.topological_order().map_err(E::from)?;
        for symbol in order {
            let pattern = self.pattern(symbol).map_err(E::from)?;
            if let Some(replacement) = f(symbol, pattern)? {
                self.vertices.insert(symbol, replacement);
                changed = true;
            }
        }
        Ok(changed)
    }

    /// Drops vertices the root no longer reaches, restoring the
    /// root-reaches-all invariant after a rewrite. Returns how many were
    /// removed.
    pub fn prune_unreachable(&mut self) -> Result<usize, GraphError> {
        let live = self.reachable()?;
        let before = self.vertices.len();
        self.vertices.retain(|symbol, _| live.contains(symbol));
        Ok(before - self.vertices.len())
    }

    /// Full invariant check: closed references, acyclic, root reaches every
    /// vertex.
    pub fn validate(&self) -> Result<(), GraphError> {
        for pattern in self.vertices.values() {
            for child in pattern.children() {
                if !self.vertices.contains_key(child) {
                    return Err(GraphError::UnresolvedReference { symbol: *child });
                }
            }
        }
        let live = {
            self.topological_order()?;
            self.reachable()?
        };
        for symbol in self.vertices.keys() {
            if !live.contains(symbol) {
                return Err(GraphError::UnresolvedReference { symbol: *symbol });
            }
        }
        Ok(())
    }

    /// Deepest symbol on both source spines, if any. Operand spines follow
    /// each node's primary source only.
    pub fn deepest_common_ancestor(&self, a: Symbol, b: Symbol) -> Option<Symbol> {
        let mut spine_a = BTreeSet::new();
        let mut cursor = Some(a);
        while let Some(symbol) = cursor {
            spine_a.insert(symbol);
            cursor = self
                .vertices
                .get(&symbol)
                .and_then(|pattern| pattern.src().copied());
        }
        let mut cursor = Some(b);
        while let Some(symbol) = cursor {
            if spine_a.contains(&symbol) {
                return Some(symbol);
            }
            cursor = self
                .vertices
                .get(&symbol)
                .and_then(|pattern| pattern.src().copied());
        }
        None
    }
}

impl fmt::Display for QsuGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.topological_order() {
            Ok(order) => {
                for symbol in order {
                    let marker = if symbol == self.root { "*" } else { " " };
                    match self.vertices.get(&symbol) {
                        Some(pattern) => writeln!(f, "{marker}{symbol} := {pattern}")?,
                        None => writeln!(f, "{marker}{symbol} := <dangling>")?,
                    }
                }
                Ok(())
            }
            Err(_) => {
                for (symbol, pattern) in &self.vertices {
                    let marker = if *symbol == self.root { "*" } else { " " };
                    writeln!(f, "{marker}{symbol} := {pattern}")?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qscript::dsl;
    use crate::qscript::mapfunc::MapFunc;
    use crate::qscript::types::{Access, IdStatus, ReadPath};

    fn hole_expr() -> MapFunc<Access> {
        MapFunc::Free(Access::Value)
    }

    fn read_graph(names: &mut NameGenerator) -> QsuGraph {
        QsuGraph::with_name(
            names,
            dsl::shifted_read(
                ReadPath::from_segments(&["db", "zips"]),
                IdStatus::ExcludeId,
            ),
        )
    }

    #[test]
    fn test_with_name_and_merge() {
        let mut names = NameGenerator::new();
        let base = read_graph(&mut names);
        let src = base.root();

        let layered = QsuGraph::with_name(&mut names, dsl::map(src, hole_expr()));
        let top = layered.root();
        let mut merged = layered;
        merged.merge(base.clone()).unwrap();

        assert_eq!(merged.root(), top);
        assert!(merged.validate().is_ok());
        // merging the same base again is a no-op
        merged.merge(base).unwrap();
        assert_eq!(merged.vertices().len(), 2);
    }

    #[test]
    fn test_merge_rejects_conflicting_patterns() {
        let mut names = NameGenerator::new();
        let base = read_graph(&mut names);
        let symbol = base.root();

        // force the same symbol onto a different pattern
        let mut clashing = QsuGraph {
            root: symbol,
            vertices: BTreeMap::from([(symbol, QScript::Root)]),
        };
        assert_eq!(
            clashing.merge(base),
            Err(GraphError::SymbolCollision { symbol })
        );
    }

    #[test]
    fn test_topological_order_diamond() {
        let mut names = NameGenerator::new();
        let mut graph = read_graph(&mut names);
        let src = graph.root();
        let left = names.fresh();
        let right = names.fresh();
        let top = names.fresh();
        graph.insert(left, dsl::map(src, hole_expr()));
        graph.insert(right, dsl::filter(src, dsl::bool_lit(true)));
        graph.insert(top, dsl::union(left, right));
        let graph = QsuGraph {
            root: top,
            vertices: graph.vertices,
        };
        graph.validate().unwrap();

        let order = graph.topological_order().unwrap();
        let position = |sym: Symbol| order.iter().position(|s| *s == sym).unwrap();
        assert!(position(src) < position(left));
        assert!(position(src) < position(right));
        assert!(position(left) < position(top));
        assert!(position(right) < position(top));
    }

    #[test]
    fn test_cycle_detection() {
        let mut names = NameGenerator::new();
        let a = names.fresh();
        let b = names.fresh();
        let graph = QsuGraph {
            root: a,
            vertices: BTreeMap::from([
                (a, dsl::map(b, hole_expr())),
                (b, dsl::filter(a, dsl::bool_lit(true))),
            ]),
        };
        match graph.topological_order() {
            Err(GraphError::CycleDetected { .. }) => {}
            other => panic!("Expected cycle detection, got {:?}", other),
        }
    }

    #[test]
    fn test_replace_references_and_prune() {
        let mut names = NameGenerator::new();
        let mut graph = read_graph(&mut names);
        let src = graph.root();
        let identity = names.fresh();
        let top = names.fresh();
        graph.insert(identity, dsl::map(src, hole_expr()));
        graph.insert(top, dsl::filter(identity, dsl::bool_lit(true)));
        graph = QsuGraph {
            root: top,
            vertices: graph.vertices,
        };

        // eliminate the identity map
        graph.replace_references(identity, src);
        let removed = graph.prune_unreachable().unwrap();
        assert_eq!(removed, 1);
        assert!(graph.validate().is_ok());
        match graph.pattern(top).unwrap() {
            QScript::Filter(filter) => assert_eq!(filter.src, src),
            other => panic!("Expected Filter, got {:?}", other),
        }
    }

    #[test]
    fn test_overwrite_at_root() {
        let mut names = NameGenerator::new();
        let mut graph = read_graph(&mut names);
        graph.overwrite_at_root(QScript::Unreferenced);
        assert_eq!(graph.pattern(graph.root()).unwrap(), &QScript::Unreferenced);
    }

    #[test]
    fn test_reverse_index_lists_referrers() {
        let mut names = NameGenerator::new();
        let mut graph = read_graph(&mut names);
        let src = graph.root();
        let left = names.fresh();
        let right = names.fresh();
        graph.insert(left, dsl::map(src, hole_expr()));
        graph.insert(right, dsl::filter(src, dsl::bool_lit(true)));

        let index = graph.reverse_index();
        assert_eq!(index.get(&src), Some(&BTreeSet::from([left, right])));
        assert_eq!(index.get(&left), None);
    }

    #[test]
    fn test_deepest_common_ancestor() {
        let mut names = NameGenerator::new();
        let mut graph = read_graph(&mut names);
        let src = graph.root();
        let left = names.fresh();
        let right = names.fresh();
        graph.insert(left, dsl::map(src, hole_expr()));
        graph.insert(right, dsl::filter(src, dsl::bool_lit(true)));

        assert_eq!(graph.deepest_common_ancestor(left, right), Some(src));
        assert_eq!(graph.deepest_common_ancestor(left, src), Some(src));

        let stranger = names.fresh();
        graph.insert(stranger, QScript::Unreferenced);
        assert_eq!(graph.deepest_common_ancestor(left, stranger), None);
    }
}
