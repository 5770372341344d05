//! The type algebra.
//!
//! This module defines the closed variant of types the checker reasons
//! about: primitives, tuples with a gradual `AnyTuple` top, nominal records
//! and their refinements, shape/dict maps, functions, named aliases, and a
//! `Dynamic` type that is both top and bottom.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity of a named type: defining module, name, and arity.
///
/// Used both for remote aliases (body fetched from the registry) and for
/// opaque types (body intentionally hidden).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RemoteId {
    pub module: String,
    pub name: String,
    pub arity: usize,
}

impl RemoteId {
    pub fn new(module: impl Into<String>, name: impl Into<String>, arity: usize) -> Self {
        Self {
            module: module.into(),
            name: name.into(),
            arity,
        }
    }
}

/// Reference to a nominal record declared in a module.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordRef {
    pub module: String,
    pub name: String,
}

impl RecordRef {
    pub fn new(module: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            name: name.into(),
        }
    }
}

/// A record with a subset of its fields narrowed below their declared types.
///
/// `fields` keys are a subset of the base record's field names; an ordered
/// map keeps structural equality order-insensitive and the type hashable.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RefinedRecord {
    pub rec: RecordRef,
    pub fields: BTreeMap<String, Type>,
}

/// Function type with an arity-fixed argument list.
///
/// `forall` lists the bound type variable ids; they are distinct, and
/// renaming them does not change the type's meaning.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FunType {
    pub forall: Vec<u32>,
    pub args: Vec<Type>,
    pub res: Box<Type>,
}

/// One association of a shape map: an atom key, its value type, and whether
/// the key is required.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ShapeProp {
    pub key: String,
    pub ty: Type,
    pub required: bool,
}

/// Core type representation.
///
/// Unions are canonical sets: construct them through [`Type::union`], never
/// through the raw variant, so that derived equality is order-insensitive.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Type {
    /// Top.
    Any,
    /// Bottom. Also the canonical empty union.
    None,
    /// Gradual type: both top and bottom simultaneously.
    Dynamic,
    /// Any atom literal.
    Atom,
    /// A specific atom literal.
    AtomLit(String),
    Number,
    Float,
    Pid,
    Port,
    Reference,
    Binary,
    /// Any tuple, regardless of arity.
    AnyTuple,
    /// Fixed-arity tuple.
    Tuple(Vec<Type>),
    /// The empty list.
    Nil,
    /// List with the given element type; always includes the empty list.
    List(Box<Type>),
    /// Any function, regardless of arity.
    AnyFun,
    Fun(FunType),
    Record(RecordRef),
    RefinedRecord(RefinedRecord),
    /// Map with uniform key and value types.
    DictMap { key: Box<Type>, value: Box<Type> },
    /// Map with required and optional atom-keyed associations.
    ShapeMap(Vec<ShapeProp>),
    /// Set union of the member types; canonical and flattened.
    Union(Vec<Type>),
    /// Nominal abstract type; its body is hidden from subtyping.
    Opaque(RemoteId, Vec<Type>),
    /// Named alias; its body is fetched from the registry on demand.
    Remote(RemoteId, Vec<Type>),
    /// Bound type variable.
    Var(u32),
}

impl Type {
    pub fn atom_lit(name: impl Into<String>) -> Self {
        Type::AtomLit(name.into())
    }

    pub fn tuple(tys: Vec<Type>) -> Self {
        Type::Tuple(tys)
    }

    pub fn list(elem: Type) -> Self {
        Type::List(Box::new(elem))
    }

    pub fn fun(args: Vec<Type>, res: Type) -> Self {
        Type::Fun(FunType {
            forall: Vec::new(),
            args,
            res: Box::new(res),
        })
    }

    pub fn dict_map(key: Type, value: Type) -> Self {
        Type::DictMap {
            key: Box::new(key),
            value: Box::new(value),
        }
    }

    pub fn record(module: impl Into<String>, name: impl Into<String>) -> Self {
        Type::Record(RecordRef::new(module, name))
    }

    /// The `'false' | 'true'` union.
    pub fn boolean() -> Self {
        Type::union(vec![Type::atom_lit("false"), Type::atom_lit("true")])
    }

    /// Build a canonical union: flatten nested unions, drop `None` members,
    /// sort, and collapse duplicates. Zero members yield `None`, a single
    /// member yields that member.
    pub fn union(tys: impl IntoIterator<Item = Type>) -> Self {
        fn flatten(ty: Type, out: &mut Vec<Type>) {
            match ty {
                Type::Union(ts) => {
                    for t in ts {
                        flatten(t, out);
                    }
                }
                Type::None => {}
                other => out.push(other),
            }
        }

        let mut flat = Vec::new();
        for ty in tys {
            flatten(ty, &mut flat);
        }
        flat.sort();
        flat.dedup();
        match flat.len() {
            0 => Type::None,
            1 => flat.pop().unwrap(),
            _ => Type::Union(flat),
        }
    }

    /// True iff `Dynamic` appears at the top level or as a member of a
    /// top-level union.
    pub fn has_dynamic(&self) -> bool {
        match self {
            Type::Dynamic => true,
            Type::Union(ts) => ts.iter().any(|t| matches!(t, Type::Dynamic)),
            _ => false,
        }
    }

    /// Strip `Dynamic` from the top level, returning `None` if nothing
    /// remains.
    pub fn static_part(&self) -> Type {
        match self {
            Type::Dynamic => Type::None,
            Type::Union(ts) => {
                Type::union(ts.iter().filter(|t| !matches!(t, Type::Dynamic)).cloned())
            }
            other => other.clone(),
        }
    }

    /// Substitute types for bound variable ids, skipping ids shadowed by an
    /// inner function's `forall` list.
    pub fn subst(&self, map: &HashMap<u32, Type>) -> Type {
        if map.is_empty() {
            return self.clone();
        }
        match self {
            Type::Var(id) => map.get(id).cloned().unwrap_or_else(|| self.clone()),
            Type::Tuple(ts) => Type::Tuple(ts.iter().map(|t| t.subst(map)).collect()),
            Type::List(t) => Type::List(Box::new(t.subst(map))),
            Type::Fun(f) => {
                let inner: HashMap<u32, Type> = map
                    .iter()
                    .filter(|(id, _)| !f.forall.contains(id))
                    .map(|(id, t)| (*id, t.clone()))
                    .collect();
                Type::Fun(FunType {
                    forall: f.forall.clone(),
                    args: f.args.iter().map(|a| a.subst(&inner)).collect(),
                    res: Box::new(f.res.subst(&inner)),
                })
            }
            Type::RefinedRecord(rr) => Type::RefinedRecord(RefinedRecord {
                rec: rr.rec.clone(),
                fields: rr
                    .fields
                    .iter()
                    .map(|(name, t)| (name.clone(), t.subst(map)))
                    .collect(),
            }),
            Type::DictMap { key, value } => Type::DictMap {
                key: Box::new(key.subst(map)),
                value: Box::new(value.subst(map)),
            },
            Type::ShapeMap(props) => Type::ShapeMap(
                props
                    .iter()
                    .map(|p| ShapeProp {
                        key: p.key.clone(),
                        ty: p.ty.subst(map),
                        required: p.required,
                    })
                    .collect(),
            ),
            // Substitution can reorder members, so re-canonicalize.
            Type::Union(ts) => Type::union(ts.iter().map(|t| t.subst(map))),
            Type::Opaque(id, args) => {
                Type::Opaque(id.clone(), args.iter().map(|a| a.subst(map)).collect())
            }
            Type::Remote(id, args) => {
                Type::Remote(id.clone(), args.iter().map(|a| a.subst(map)).collect())
            }
            _ => self.clone(),
        }
    }

    /// Largest variable id mentioned anywhere in the type, bound or free.
    pub(crate) fn max_var_id(&self) -> Option<u32> {
        fn fold(ty: &Type, acc: &mut Option<u32>) {
            match ty {
                Type::Var(id) => *acc = Some(acc.map_or(*id, |m| m.max(*id))),
                Type::Tuple(ts) | Type::Union(ts) => {
                    for t in ts {
                        fold(t, acc);
                    }
                }
                Type::List(t) => fold(t, acc),
                Type::Fun(f) => {
                    for id in &f.forall {
                        *acc = Some(acc.map_or(*id, |m| m.max(*id)));
                    }
                    for a in &f.args {
                        fold(a, acc);
                    }
                    fold(&f.res, acc);
                }
                Type::RefinedRecord(rr) => {
                    for t in rr.fields.values() {
                        fold(t, acc);
                    }
                }
                Type::DictMap { key, value } => {
                    fold(key, acc);
                    fold(value, acc);
                }
                Type::ShapeMap(props) => {
                    for p in props {
                        fold(&p.ty, acc);
                    }
                }
                Type::Opaque(_, args) | Type::Remote(_, args) => {
                    for a in args {
                        fold(a, acc);
                    }
                }
                _ => {}
            }
        }
        let mut acc = None;
        fold(self, &mut acc);
        acc
    }
}

fn write_args(f: &mut fmt::Formatter<'_>, args: &[Type]) -> fmt::Result {
    for (i, a) in args.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", a)?;
    }
    Ok(())
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Any => write!(f, "term()"),
            Type::None => write!(f, "none()"),
            Type::Dynamic => write!(f, "dynamic()"),
            Type::Atom => write!(f, "atom()"),
            Type::AtomLit(s) => write!(f, "'{}'", s),
            Type::Number => write!(f, "number()"),
            Type::Float => write!(f, "float()"),
            Type::Pid => write!(f, "pid()"),
            Type::Port => write!(f, "port()"),
            Type::Reference => write!(f, "reference()"),
            Type::Binary => write!(f, "binary()"),
            Type::AnyTuple => write!(f, "tuple()"),
            Type::Tuple(ts) => {
                write!(f, "{{")?;
                write_args(f, ts)?;
                write!(f, "}}")
            }
            Type::Nil => write!(f, "[]"),
            Type::List(t) => write!(f, "[{}]", t),
            Type::AnyFun => write!(f, "fun()"),
            Type::Fun(ft) => {
                write!(f, "fun((")?;
                write_args(f, &ft.args)?;
                write!(f, ") -> {})", ft.res)
            }
            Type::Record(r) => write!(f, "#{}{{}}", r.name),
            Type::RefinedRecord(rr) => {
                write!(f, "#{}{{", rr.rec.name)?;
                for (i, (name, ty)) in rr.fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{} :: {}", name, ty)?;
                }
                write!(f, "}}")
            }
            Type::DictMap { key, value } => write!(f, "#{{{} => {}}}", key, value),
            Type::ShapeMap(props) => {
                write!(f, "#{{")?;
                for (i, p) in props.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    let arrow = if p.required { ":=" } else { "=>" };
                    write!(f, "{} {} {}", p.key, arrow, p.ty)?;
                }
                write!(f, "}}")
            }
            Type::Union(ts) => {
                for (i, t) in ts.iter().enumerate() {
                    if i > 0 {
                        write!(f, " | ")?;
                    }
                    write!(f, "{}", t)?;
                }
                Ok(())
            }
            Type::Opaque(id, args) | Type::Remote(id, args) => {
                write!(f, "{}:{}(", id.module, id.name)?;
                write_args(f, args)?;
                write!(f, ")")
            }
            Type::Var(id) => write!(f, "T{}", id),
        }
    }
}
