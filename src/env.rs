//! Typing environments.
//!
//! An `Env` maps variable names to types. Environments are immutable:
//! `bind` returns a new environment, so each clause of a branching
//! construct can fork the incoming environment without disturbing it.

use std::collections::HashMap;

use crate::types::Type;

/// Immutable variable-to-type environment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Env {
    vars: HashMap<String, Type>,
}

impl Env {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Type> {
        self.vars.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    /// Functional update: returns a new environment with `name` bound.
    pub fn bind(&self, name: impl Into<String>, ty: Type) -> Env {
        let mut vars = self.vars.clone();
        vars.insert(name.into(), ty);
        Env { vars }
    }

    /// Functional removal: returns a new environment without `name`.
    pub fn unbind(&self, name: &str) -> Env {
        let mut vars = self.vars.clone();
        vars.remove(name);
        Env { vars }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.vars.keys().map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

impl FromIterator<(String, Type)> for Env {
    fn from_iter<I: IntoIterator<Item = (String, Type)>>(iter: I) -> Self {
        Env {
            vars: iter.into_iter().collect(),
        }
    }
}

impl<'a> FromIterator<(&'a str, Type)> for Env {
    fn from_iter<I: IntoIterator<Item = (&'a str, Type)>>(iter: I) -> Self {
        Env {
            vars: iter
                .into_iter()
                .map(|(name, ty)| (name.to_string(), ty))
                .collect(),
        }
    }
}
