//! Registry of pass constructors, looked up by name.

use std::collections::HashMap;
use std::sync::Arc;

use crate::text::{BlankPass, LineChunkPass};
use crate::traits::{Pass, PassError, PassResult};

/// Constructor for one pass kind, taking the optional argument from the
/// group definition.
pub type PassConstructor = fn(Option<&str>) -> PassResult<Arc<dyn Pass>>;

/// Lookup table from pass name to constructor.
///
/// The engine only ever sees `Arc<dyn Pass>`; which concrete pass a name
/// maps to is decided here, once, at startup.
#[derive(Default)]
pub struct PassRegistry {
    constructors: HashMap<String, PassConstructor>,
}

impl PassRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with all bundled passes registered.
    pub fn with_builtin_passes() -> Self {
        let mut registry = Self::new();
        registry.register("lines", LineChunkPass::construct);
        registry.register("blank", BlankPass::construct);
        registry
    }

    /// Register a constructor under a name. A later registration under the
    /// same name replaces the earlier one.
    pub fn register(&mut self, name: impl Into<String>, constructor: PassConstructor) {
        self.constructors.insert(name.into(), constructor);
    }

    /// Construct the pass registered under `name` with the given argument.
    pub fn build(&self, name: &str, arg: Option<&str>) -> PassResult<Arc<dyn Pass>> {
        let constructor = self
            .constructors
            .get(name)
            .ok_or_else(|| PassError::Unknown(name.to_string()))?;
        constructor(arg)
    }

    /// Registered pass names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.constructors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
