//! Environment narrowing along object paths.
//!
//! `batch_select` is the single entry point: it flattens a proposition list
//! to DNF, refines the environment once per cube, and joins the per-cube
//! types back together. The refinement itself is `update`, which descends a
//! field path and restricts (positive literal) or removes (negative
//! literal) at the leaf. Restriction is backed by the three-valued
//! `overlap`, which may only answer "disjoint" when it is provable; an
//! unknown answer always falls back to leaving the type as it is.

use std::collections::{BTreeMap, HashSet};

use crate::context::TypeckContext;
use crate::env::Env;
use crate::subtype::Subtyping;
use crate::types::{RefinedRecord, Type};

use super::props::{dnf_all, AliasMap, Obj, PathField, PosNeg, Prop};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Polarity {
    Pos,
    Neg,
}

pub(crate) struct Narrower<'a> {
    ctx: TypeckContext<'a>,
    sub: Subtyping<'a>,
}

impl<'a> Narrower<'a> {
    pub(crate) fn new(ctx: TypeckContext<'a>) -> Self {
        Self {
            ctx,
            sub: Subtyping::new(ctx),
        }
    }

    /// Refine `env` under a proposition list. Every name of `env` and every
    /// pattern alias gets one type per DNF cube, joined into its final
    /// type. Aliased names read their type by projecting the refined root
    /// along the alias path.
    pub(crate) fn batch_select(&self, env: &Env, props: &[Prop], amap: &AliasMap) -> Env {
        let cubes = dnf_all(props);
        debug_assert!(!cubes.is_empty(), "a DNF never has zero cubes");
        let refined: Vec<Env> = cubes.iter().map(|cube| self.apply_cube(env, cube)).collect();

        let mut bindings: Vec<(String, Type)> = Vec::with_capacity(env.len() + amap.len());
        for name in env.names() {
            let ty = self
                .sub
                .join_all(refined.iter().filter_map(|e| e.get(name).cloned()));
            bindings.push((name.to_string(), ty));
        }
        for (name, obj) in amap {
            let ty = self.sub.join_all(refined.iter().map(|e| match e.get(obj.root()) {
                Some(root_ty) => self.type_path_ref(root_ty, &obj.path()),
                None => Type::Any,
            }));
            bindings.push((name.clone(), ty));
        }
        bindings.into_iter().collect()
    }

    fn apply_cube(&self, env: &Env, cube: &PosNeg) -> Env {
        let mut env = env.clone();
        for (obj, ty) in &cube.pos {
            env = self.apply_literal(&env, obj, ty, Polarity::Pos);
        }
        for (obj, ty) in &cube.neg {
            env = self.apply_literal(&env, obj, ty, Polarity::Neg);
        }
        env
    }

    fn apply_literal(&self, env: &Env, obj: &Obj, ty: &Type, polarity: Polarity) -> Env {
        let root = obj.root();
        match env.get(root) {
            Some(old) => {
                let new = self.update(old, &obj.path(), polarity, ty);
                env.bind(root, new)
            }
            None => env.clone(),
        }
    }

    /// Update `t` along `path`: restrict or remove at the end of the path,
    /// rebuilding the structure on the way out. A type that does not match
    /// the path's shape is returned unchanged.
    pub(crate) fn update(&self, t: &Type, path: &[&PathField], polarity: Polarity, s: &Type) -> Type {
        let Some((head, rest)) = path.split_first() else {
            return match polarity {
                Polarity::Pos => self.restrict(t, s),
                Polarity::Neg => self.remove(t, s),
            };
        };
        match (t, head) {
            (Type::Union(ts), _) => {
                Type::union(ts.iter().map(|alt| self.update(alt, path, polarity, s)))
            }
            (Type::Remote(id, args), _) => match self.ctx.registry.type_decl_body(id, args) {
                Some(body) => self.update(&body, path, polarity, s),
                None => t.clone(),
            },
            (Type::Tuple(ts), PathField::Tuple { index, arity })
                if ts.len() == *arity && *index < ts.len() =>
            {
                let mut elems = ts.clone();
                elems[*index] = self.update(&ts[*index], rest, polarity, s);
                // An uninhabited element makes the whole tuple uninhabited.
                if elems.iter().any(|e| self.sub.is_none_type(e)) {
                    Type::None
                } else {
                    Type::Tuple(elems)
                }
            }
            (Type::Record(r), PathField::Record { field, record }) if r.name == *record => {
                let Some(decl) = self.ctx.registry.record(&r.module, &r.name) else {
                    return t.clone();
                };
                let Some(decl_field) = decl.field(field) else {
                    return t.clone();
                };
                let updated = self.update(&decl_field.ty, rest, polarity, s);
                Type::RefinedRecord(RefinedRecord {
                    rec: r.clone(),
                    fields: BTreeMap::from([(field.clone(), updated)]),
                })
            }
            (Type::RefinedRecord(rr), PathField::Record { field, record })
                if rr.rec.name == *record =>
            {
                let start = match rr.fields.get(field) {
                    Some(override_ty) => override_ty.clone(),
                    None => {
                        let declared = self
                            .ctx
                            .registry
                            .record(&rr.rec.module, &rr.rec.name)
                            .and_then(|decl| decl.field(field).map(|f| f.ty.clone()));
                        match declared {
                            Some(ty) => ty,
                            None => return t.clone(),
                        }
                    }
                };
                let mut fields = rr.fields.clone();
                fields.insert(field.clone(), self.update(&start, rest, polarity, s));
                Type::RefinedRecord(RefinedRecord {
                    rec: rr.rec.clone(),
                    fields,
                })
            }
            _ => t.clone(),
        }
    }

    /// Narrow `t` to its part inside `s`. Stays sound by only producing
    /// `None` when disjointness is provable and otherwise keeping `t`.
    pub(crate) fn restrict(&self, t: &Type, s: &Type) -> Type {
        if self.overlap(t, s) == Some(false) {
            return Type::None;
        }
        if self.sub.sub_type(t, s) {
            return t.clone();
        }
        if self.sub.sub_type(s, t) {
            return s.clone();
        }
        match t {
            Type::Union(ts) => Type::union(ts.iter().map(|alt| self.restrict(alt, s))),
            Type::Remote(id, args) => match self.ctx.registry.type_decl_body(id, args) {
                Some(body) => self.restrict(&body, s),
                None => t.clone(),
            },
            // Opaque bodies cannot be inspected.
            _ => t.clone(),
        }
    }

    /// Narrow `t` to its part outside `s`. Subtraction happens at the
    /// leaves only: a member provably inside `s` drops to `None`, anything
    /// not provable stays.
    pub(crate) fn remove(&self, t: &Type, s: &Type) -> Type {
        if self.sub.sub_type(t, s) {
            return Type::None;
        }
        match t {
            Type::Union(ts) => Type::union(ts.iter().map(|alt| self.remove(alt, s))),
            Type::Remote(id, args) => match self.ctx.registry.type_decl_body(id, args) {
                Some(body) => self.remove(&body, s),
                None => t.clone(),
            },
            _ => t.clone(),
        }
    }

    /// Three-valued overlap: `Some(true)` definitely overlapping,
    /// `Some(false)` definitely disjoint, `None` unknown. The right-hand
    /// side always comes from a proposition and is alias-free.
    pub(crate) fn overlap(&self, t: &Type, s: &Type) -> Option<bool> {
        assert!(
            !matches!(s, Type::Opaque(..) | Type::Remote(..) | Type::RefinedRecord(_)),
            "proposition type is not alias-free: {}",
            s
        );
        self.overlap_rec(t, s, &mut HashSet::new())
    }

    fn overlap_rec(&self, t: &Type, s: &Type, visited: &mut HashSet<Type>) -> Option<bool> {
        match (t, s) {
            (Type::None, _) | (_, Type::None) => Some(false),
            (Type::Any, _) | (_, Type::Any) => Some(true),
            (Type::Dynamic, _) | (_, Type::Dynamic) => Some(true),
            (Type::Var(_), _) | (_, Type::Var(_)) => Some(true),
            _ if t == s => Some(true),
            (Type::Union(ts), _) => {
                three_valued_exists(ts.iter().map(|alt| self.overlap_rec(alt, s, visited)))
            }
            (_, Type::Union(ss)) => {
                three_valued_exists(ss.iter().map(|alt| self.overlap_rec(t, alt, visited)))
            }
            (Type::Remote(id, args), _) => {
                if !visited.insert(t.clone()) {
                    return None;
                }
                match self.ctx.registry.type_decl_body(id, args) {
                    Some(body) => self.overlap_rec(&body, s, visited),
                    None => None,
                }
            }
            (Type::Opaque(..), _) => None,
            (Type::Atom | Type::AtomLit(_), Type::Atom | Type::AtomLit(_)) => match (t, s) {
                (Type::AtomLit(a), Type::AtomLit(b)) => Some(a == b),
                _ => Some(true),
            },
            // The algebra keeps float() apart from number(); no provable
            // disjointness between the numeric kinds.
            (Type::Number | Type::Float, Type::Number | Type::Float) => None,
            (
                Type::AnyTuple | Type::Tuple(_) | Type::Record(_) | Type::RefinedRecord(_),
                Type::AnyTuple | Type::Tuple(_) | Type::Record(_),
            ) => self.overlap_tuples(t, s, visited),
            (Type::Nil | Type::List(_), Type::Nil | Type::List(_)) => Some(true),
            (Type::AnyFun | Type::Fun(_), Type::AnyFun | Type::Fun(_)) => match (t, s) {
                (Type::Fun(f1), Type::Fun(f2)) => {
                    if f1.args.len() != f2.args.len() {
                        Some(false)
                    } else {
                        None
                    }
                }
                _ => Some(true),
            },
            (
                Type::DictMap { .. } | Type::ShapeMap(_),
                Type::DictMap { .. } | Type::ShapeMap(_),
            ) => Some(true),
            // Distinct value kinds never share a value.
            _ => Some(false),
        }
    }

    fn overlap_tuples(&self, t: &Type, s: &Type, visited: &mut HashSet<Type>) -> Option<bool> {
        match (t, s) {
            (Type::AnyTuple, _) | (_, Type::AnyTuple) => Some(true),
            (Type::Tuple(a), Type::Tuple(b)) => {
                if a.len() != b.len() {
                    return Some(false);
                }
                if a.is_empty() {
                    return Some(true);
                }
                // Only the first element discriminates: it is the tag under
                // the record encoding.
                self.overlap_rec(&a[0], &b[0], visited)
            }
            (
                Type::Record(r) | Type::RefinedRecord(RefinedRecord { rec: r, .. }),
                Type::Tuple(b),
            ) => {
                let Some(decl) = self.ctx.registry.record(&r.module, &r.name) else {
                    return None;
                };
                if decl.tuple_arity() != b.len() {
                    return Some(false);
                }
                self.overlap_rec(&Type::atom_lit(decl.name.clone()), &b[0], visited)
            }
            (Type::Tuple(a), Type::Record(r)) => {
                let Some(decl) = self.ctx.registry.record(&r.module, &r.name) else {
                    return None;
                };
                if a.len() != decl.tuple_arity() {
                    return Some(false);
                }
                self.overlap_rec(&a[0], &Type::atom_lit(decl.name.clone()), visited)
            }
            (
                Type::Record(r1) | Type::RefinedRecord(RefinedRecord { rec: r1, .. }),
                Type::Record(r2),
            ) => Some(r1 == r2),
            _ => None,
        }
    }

    /// Read the type at the end of a path. `None` stays `None`; a head
    /// whose structure does not match the path defaults to `Any`.
    pub(crate) fn type_path_ref(&self, t: &Type, path: &[&PathField]) -> Type {
        let Some((head, rest)) = path.split_first() else {
            return t.clone();
        };
        match (t, head) {
            (Type::None, _) => Type::None,
            (Type::Union(ts), _) => Type::union(ts.iter().map(|alt| self.type_path_ref(alt, path))),
            (Type::Remote(id, args), _) => match self.ctx.registry.type_decl_body(id, args) {
                Some(body) => self.type_path_ref(&body, path),
                None => Type::Any,
            },
            (Type::Tuple(ts), PathField::Tuple { index, arity })
                if ts.len() == *arity && *index < ts.len() =>
            {
                self.type_path_ref(&ts[*index], rest)
            }
            (Type::Record(r), PathField::Record { field, record }) if r.name == *record => {
                let declared = self
                    .ctx
                    .registry
                    .record(&r.module, &r.name)
                    .and_then(|decl| decl.field(field).map(|f| f.ty.clone()));
                match declared {
                    Some(ty) => self.type_path_ref(&ty, rest),
                    None => Type::Any,
                }
            }
            (Type::RefinedRecord(rr), PathField::Record { field, record })
                if rr.rec.name == *record =>
            {
                let ty = rr.fields.get(field).cloned().or_else(|| {
                    self.ctx
                        .registry
                        .record(&rr.rec.module, &rr.rec.name)
                        .and_then(|decl| decl.field(field).map(|f| f.ty.clone()))
                });
                match ty {
                    Some(ty) => self.type_path_ref(&ty, rest),
                    None => Type::Any,
                }
            }
            _ => Type::Any,
        }
    }
}

fn three_valued_exists(results: impl Iterator<Item = Option<bool>>) -> Option<bool> {
    let mut all_false = true;
    for result in results {
        match result {
            Some(true) => return Some(true),
            Some(false) => {}
            None => all_false = false,
        }
    }
    if all_false {
        Some(false)
    } else {
        None
    }
}
