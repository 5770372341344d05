//! Subtyping and occurrence-typing core for a gradual type checker.
//!
//! This crate is the pure decision core an elaborator drives while checking
//! a dynamically-typed functional language with pattern matching, guards,
//! records, tuples, and maps. It has two tightly-coupled engines:
//!
//! - [`subtype::Subtyping`] decides inclusion over the type algebra,
//!   including unions, record refinements, and the gradual `Dynamic` type,
//!   and derives `join`, `eqv`, and the emptiness predicates from it.
//! - [`occurrence::OccurrenceTyper`] computes one narrowed environment per
//!   clause of `if`/`case`/function-head constructs, by extracting
//!   propositions from patterns and guards, reducing them to DNF, and
//!   refining types along field paths.
//!
//! Everything is synchronous and side-effect free: the engines read the
//! immutable [`registry::TypeRegistry`] and the [`config::Config`] flags
//! through an explicit [`context::TypeckContext`]. The AST loader, the
//! elaborator, and all diagnostics surfaces live outside this crate.

pub mod ast;
pub mod config;
pub mod context;
pub mod env;
pub mod occurrence;
pub mod registry;
pub mod subtype;
pub mod types;

#[cfg(test)]
mod testutil;

pub use ast::{CaseExpr, Clause, Expr, Guard, IfExpr, Pat, Test, TestOp};
pub use config::{Config, ConfigError};
pub use context::TypeckContext;
pub use env::Env;
pub use occurrence::{Obj, OccurrenceTyper, PathField, Prop};
pub use registry::{RecordDecl, RecordField, TypeDecl, TypeRegistry};
pub use subtype::Subtyping;
pub use types::{FunType, RecordRef, RefinedRecord, RemoteId, ShapeProp, Type};
