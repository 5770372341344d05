//! The per-module checking context.

use crate::config::Config;
use crate::registry::TypeRegistry;

/// Everything the engines need besides their direct inputs: the module
/// currently being checked (records are module-local), the shared
/// declarations registry, and the mode flags.
///
/// One context is instantiated per checked module; parallel workers each
/// hold their own context over the same registry.
#[derive(Debug, Clone, Copy)]
pub struct TypeckContext<'a> {
    pub module: &'a str,
    pub registry: &'a TypeRegistry,
    pub config: &'a Config,
}

impl<'a> TypeckContext<'a> {
    pub fn new(module: &'a str, registry: &'a TypeRegistry, config: &'a Config) -> Self {
        Self {
            module,
            registry,
            config,
        }
    }
}
