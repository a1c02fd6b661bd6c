use std::collections::HashMap;

use crate::{Atom, FourCC};

/// Builds an unpopulated atom of a registered layout. The type code is passed
/// in so that one constructor can serve several codes.
pub type AtomConstructor = fn(FourCC) -> Atom;

/// Maps type codes, optionally qualified by the parent's type code, to atom
/// constructors.
///
/// Built once and passed by reference to every parse and to structural
/// helpers such as [`Atom::add_descendant_atoms`]. Lookup order for a code
/// under a parent is:
///
/// 1. a constructor registered for exactly that code under that parent,
/// 2. a constructor registered for the code under any parent,
/// 3. the parent's default for children of any code,
/// 4. [`Atom::opaque`].
#[derive(Debug, Clone, Default)]
pub struct Registry {
    scoped: HashMap<(FourCC, FourCC), AtomConstructor>,
    global: HashMap<FourCC, AtomConstructor>,
    children_of: HashMap<FourCC, AtomConstructor>,
}

impl Registry {
    /// A registry that knows no atom: everything parses as opaque bytes.
    pub fn empty() -> Self {
        Self::default()
    }

    /// All the atoms this crate describes.
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        crate::mp4box::register_standard(&mut registry);
        registry
    }

    /// Registers `constructor` for `kind` under any parent. A later
    /// registration for the same code replaces the earlier one.
    pub fn register(&mut self, kind: FourCC, constructor: AtomConstructor) -> &mut Self {
        self.global.insert(kind, constructor);
        self
    }

    /// Registers `constructor` for `kind` only where its parent is `parent`.
    pub fn register_in(
        &mut self,
        parent: FourCC,
        kind: FourCC,
        constructor: AtomConstructor,
    ) -> &mut Self {
        self.scoped.insert((parent, kind), constructor);
        self
    }

    /// Default for children of `parent` whose code has no registration of
    /// its own, such as the items of an iTunes metadata list.
    pub fn register_children_of(
        &mut self,
        parent: FourCC,
        constructor: AtomConstructor,
    ) -> &mut Self {
        self.children_of.insert(parent, constructor);
        self
    }

    pub fn is_registered(&self, kind: FourCC, parent: Option<FourCC>) -> bool {
        self.lookup(kind, parent).is_some()
    }

    fn lookup(&self, kind: FourCC, parent: Option<FourCC>) -> Option<AtomConstructor> {
        let scoped = parent.and_then(|p| self.scoped.get(&(p, kind)));
        let by_parent = || parent.and_then(|p| self.children_of.get(&p));
        scoped
            .or_else(|| self.global.get(&kind))
            .or_else(by_parent)
            .copied()
    }

    /// Never fails: unknown codes produce an opaque atom that keeps its body
    /// verbatim.
    pub fn create(&self, kind: FourCC, parent: Option<FourCC>) -> Atom {
        match self.lookup(kind, parent) {
            Some(constructor) => constructor(kind),
            None => {
                log::debug!("unknown atom type {kind:?}, keeping it opaque");
                Atom::opaque(kind)
            }
        }
    }
}
