use crate::graph::name_gen::{NameGenerator, Symbol};

/// Mutable state threaded through the passes: the single symbol-minting
/// authority for one pipeline run.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PlanCtx {
    names: NameGenerator,
}

impl PlanCtx {
    pub fn new() -> Self {
        PlanCtx::default()
    }

    pub fn fresh_symbol(&mut self) -> Symbol {
        self.names.fresh()
    }

    pub fn names_mut(&mut self) -> &mut NameGenerator {
        &mut self.names
    }
}
