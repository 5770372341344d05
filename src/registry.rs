//! The declarations registry.
//!
//! A read-only view over everything the loader extracted from compiled
//! modules: record declarations and named type aliases. The registry is
//! shared by every checker worker, so its tables are concurrent maps that
//! can be populated in parallel during loading and read without locking
//! afterwards.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::types::{RemoteId, Type};

/// One declared record field, in declaration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordField {
    pub name: String,
    pub ty: Type,
    #[serde(default)]
    pub has_default: bool,
}

/// A record declaration: name plus ordered fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordDecl {
    pub module: String,
    pub name: String,
    pub fields: Vec<RecordField>,
}

impl RecordDecl {
    pub fn field(&self, name: &str) -> Option<&RecordField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Record arity as a tuple: the name tag plus one slot per field.
    pub fn tuple_arity(&self) -> usize {
        self.fields.len() + 1
    }
}

/// A named type alias declaration with formal parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeDecl {
    pub id: RemoteId,
    pub params: Vec<u32>,
    pub body: Type,
}

/// Registry of record and alias declarations keyed by name.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    records: DashMap<(String, String), Arc<RecordDecl>>,
    type_decls: DashMap<RemoteId, Arc<TypeDecl>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_record(&self, decl: RecordDecl) {
        self.records
            .insert((decl.module.clone(), decl.name.clone()), Arc::new(decl));
    }

    pub fn add_type_decl(&self, decl: TypeDecl) {
        self.type_decls.insert(decl.id.clone(), Arc::new(decl));
    }

    /// Look up a record declaration. `None` for unknown records; callers
    /// treat that as "no information", never as an error.
    pub fn record(&self, module: &str, name: &str) -> Option<Arc<RecordDecl>> {
        self.records
            .get(&(module.to_string(), name.to_string()))
            .map(|entry| Arc::clone(entry.value()))
    }

    /// The body of a named alias with `args` substituted for its formal
    /// parameters. `None` for unknown aliases or arity mismatches.
    pub fn type_decl_body(&self, id: &RemoteId, args: &[Type]) -> Option<Type> {
        let decl = self.type_decls.get(id).map(|e| Arc::clone(e.value()))?;
        if decl.params.len() != args.len() {
            tracing::debug!(
                "alias {}:{}/{} applied to {} arguments",
                id.module,
                id.name,
                id.arity,
                args.len()
            );
            return None;
        }
        let map: HashMap<u32, Type> = decl
            .params
            .iter()
            .copied()
            .zip(args.iter().cloned())
            .collect();
        Some(decl.body.subst(&map))
    }
}
