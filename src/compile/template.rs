use crate::{
    compile::tree::Parameter,
    render::{Emit, Undefined},
};
use std::{
    collections::HashMap,
    fmt::{Debug, Formatter},
};

/// A compiled macro.
pub(crate) struct CompiledMacro {
    pub parameters: Vec<Parameter>,
    pub body: Box<Emit>,
}

/// A compiled [`Template`] that can be rendered with a `Store`.
///
/// Blocks, parent blocks and macros are compiled into separate bodies that can
/// be invoked on their own. A `Template` holds no mutable state, so it can be
/// shared between threads and rendered concurrently.
pub struct Template {
    /// The name of the [`Template`].
    pub(crate) name: String,
    /// Top-level body.
    pub(crate) main: Box<Emit>,
    /// Every block, by name.
    pub(crate) blocks: HashMap<String, Box<Emit>>,
    /// Parent versions of overridden blocks, rendered by `super()`.
    pub(crate) supers: HashMap<String, Box<Emit>>,
    /// Every macro, by name or `namespace.name`.
    pub(crate) macros: HashMap<String, CompiledMacro>,
    /// The policy the [`Template`] was compiled with.
    pub(crate) undefined: Undefined,
}

impl Template {
    /// Return the name of the [`Template`].
    pub fn get_name(&self) -> &str {
        &self.name
    }

    /// Return the [`Undefined`] policy the [`Template`] was compiled with.
    pub fn get_undefined(&self) -> Undefined {
        self.undefined
    }

    /// Return true if the [`Template`] has a block with the given name.
    pub fn has_block(&self, name: &str) -> bool {
        self.blocks.contains_key(name)
    }

    /// Return true if the [`Template`] has a macro with the given name.
    pub fn has_macro(&self, name: &str) -> bool {
        self.macros.contains_key(name)
    }
}

impl Debug for Template {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut blocks: Vec<&String> = self.blocks.keys().collect();
        blocks.sort();
        let mut macros: Vec<&String> = self.macros.keys().collect();
        macros.sort();

        f.debug_struct("Template")
            .field("name", &self.name)
            .field("blocks", &blocks)
            .field("macros", &macros)
            .field("undefined", &self.undefined)
            .finish()
    }
}
