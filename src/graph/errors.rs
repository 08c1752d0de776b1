use thiserror::Error;

use crate::graph::name_gen::Symbol;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum GraphError {
    #[error("Symbol `{symbol}` is referenced but not present in the graph")]
    UnresolvedReference { symbol: Symbol },

    #[error("Cycle detected through symbol `{symbol}`")]
    CycleDetected { symbol: Symbol },

    #[error("Symbol `{symbol}` is already bound to a different pattern")]
    SymbolCollision { symbol: Symbol },
}
