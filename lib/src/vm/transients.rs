use super::ObjRef;
use crate::jvm::class_graph::{ClassId, MethodId};
use std::collections::HashMap;

/// Per call site caches
///
/// None of this is part of the program state: caches are dropped whenever the search restores a
/// state, since the heap they point into may be a different one.
#[derive(Debug, Default)]
pub struct Transients<'g> {
    /// Last receiver class and selected method of each virtual or interface call site
    pub dispatch: HashMap<(MethodId<'g>, usize), (ClassId<'g>, MethodId<'g>)>,

    /// Function object last produced by each `invokedynamic` call site
    pub functions: HashMap<(MethodId<'g>, usize), ObjRef>,
}

impl<'g> Transients<'g> {
    pub fn clear(&mut self) {
        self.dispatch.clear();
        self.functions.clear();
    }
}
