//! The subtyping engine.
//!
//! Decides `t1 <: t2` over the full algebra, including unions, nominal
//! records and their tuple encodings, shape/dict maps, and the gradual
//! `Dynamic` type. Termination on recursive aliases comes from a per-query
//! set of pairs currently being proved: a pair met again while expanding an
//! alias is assumed to hold (co-inductive closure), so alias cycles bottom
//! out instead of looping.

use std::collections::{HashMap, HashSet};

use crate::context::TypeckContext;
use crate::types::{FunType, RecordRef, RefinedRecord, RemoteId, Type};

/// Pairs assumed true for the duration of one query.
type Seen = HashSet<(Type, Type)>;

/// Subtype decision procedure plus the derived predicates built on it.
pub struct Subtyping<'a> {
    ctx: TypeckContext<'a>,
}

impl<'a> Subtyping<'a> {
    pub fn new(ctx: TypeckContext<'a>) -> Self {
        Self { ctx }
    }

    /// Whether `t1` is a subtype of `t2`. Total and terminating.
    pub fn sub_type(&self, t1: &Type, t2: &Type) -> bool {
        self.sub_type_seen(t1, t2, &Seen::new())
    }

    /// Mutual inclusion.
    pub fn eqv(&self, t1: &Type, t2: &Type) -> bool {
        self.sub_type(t1, t2) && self.sub_type(t2, t1)
    }

    /// `Dynamic` is the only type below `None` and above `Any` at once.
    pub fn is_dynamic_type(&self, t: &Type) -> bool {
        self.sub_type(t, &Type::None) && self.sub_type(&Type::Any, t)
    }

    /// Whether `t` is uninhabited, looking through unions and aliases.
    pub fn is_none_type(&self, t: &Type) -> bool {
        self.is_none_rec(t, &mut HashSet::new())
    }

    fn is_none_rec(&self, t: &Type, visited: &mut HashSet<Type>) -> bool {
        match t {
            Type::None => true,
            Type::Union(ts) => ts.iter().all(|t| self.is_none_rec(t, visited)),
            Type::Remote(id, args) => {
                if !visited.insert(t.clone()) {
                    // A non-productive alias cycle has no values.
                    return true;
                }
                match self.ctx.registry.type_decl_body(id, args) {
                    Some(body) => self.is_none_rec(&body, visited),
                    None => false,
                }
            }
            _ => false,
        }
    }

    /// Whether `t` is the top type, looking through unions and aliases.
    pub fn is_any_type(&self, t: &Type) -> bool {
        self.is_any_rec(t, &mut HashSet::new())
    }

    fn is_any_rec(&self, t: &Type, visited: &mut HashSet<Type>) -> bool {
        match t {
            Type::Any => true,
            Type::Union(ts) => ts.iter().any(|t| self.is_any_rec(t, visited)),
            Type::Remote(id, args) => {
                if !visited.insert(t.clone()) {
                    return false;
                }
                match self.ctx.registry.type_decl_body(id, args) {
                    Some(body) => self.is_any_rec(&body, visited),
                    None => false,
                }
            }
            _ => false,
        }
    }

    /// Least upper bound on the static fragment; any dynamic part on either
    /// side is carried into the result.
    pub fn join(&self, t1: &Type, t2: &Type) -> Type {
        let dynamic = t1.has_dynamic() || t2.has_dynamic();
        let s1 = t1.static_part();
        let s2 = t2.static_part();
        let joined = if self.sub_type(&s1, &s2) {
            s2
        } else if self.sub_type(&s2, &s1) {
            s1
        } else {
            Type::union(vec![s1, s2])
        };
        if dynamic {
            if joined == Type::None {
                Type::Dynamic
            } else {
                Type::union(vec![Type::Dynamic, joined])
            }
        } else {
            joined
        }
    }

    /// Fold [`Subtyping::join`] over a sequence, seeded with `None`.
    pub fn join_all(&self, tys: impl IntoIterator<Item = Type>) -> Type {
        tys.into_iter()
            .fold(Type::None, |acc, ty| self.join(&acc, &ty))
    }

    fn sub_type_seen(&self, t1: &Type, t2: &Type, seen: &Seen) -> bool {
        if t1 == t2 {
            return true;
        }
        match (t1, t2) {
            (_, Type::Any) => true,
            (Type::None, _) => true,
            (Type::Dynamic, _) | (_, Type::Dynamic) => true,
            (Type::Remote(id, args), _) => {
                let pair = (t1.clone(), t2.clone());
                if seen.contains(&pair) {
                    return true;
                }
                tracing::debug!("expanding alias {}:{}/{} on the left", id.module, id.name, id.arity);
                match self.ctx.registry.type_decl_body(id, args) {
                    Some(body) => {
                        let mut assumed = seen.clone();
                        assumed.insert(pair);
                        self.sub_type_seen(&body, t2, &assumed)
                    }
                    None => false,
                }
            }
            (_, Type::Remote(id, args)) => {
                let pair = (t1.clone(), t2.clone());
                if seen.contains(&pair) {
                    return true;
                }
                tracing::debug!("expanding alias {}:{}/{} on the right", id.module, id.name, id.arity);
                match self.ctx.registry.type_decl_body(id, args) {
                    Some(body) => {
                        let mut assumed = seen.clone();
                        assumed.insert(pair);
                        self.sub_type_seen(t1, &body, &assumed)
                    }
                    None => false,
                }
            }
            // Opaque bodies are hidden: same identity, invariant arguments.
            (Type::Opaque(id1, args1), Type::Opaque(id2, args2)) => {
                id1 == id2
                    && args1.len() == args2.len()
                    && args1.iter().zip(args2).all(|(a1, a2)| {
                        self.sub_type_seen(a1, a2, seen) && self.sub_type_seen(a2, a1, seen)
                    })
            }
            (Type::Union(ts1), _) => ts1.iter().all(|t| self.sub_type_seen(t, t2, seen)),
            (Type::Tuple(ts), Type::Union(alts)) if !ts.is_empty() => {
                (0..ts.len()).any(|i| {
                    self.distributes(&ts[i], &mut HashSet::new())
                        && self.sub_type_tuple(&ts[i], t2, i, ts, seen, &mut HashSet::new())
                }) || alts.iter().any(|t| self.sub_type_seen(t1, t, seen))
            }
            (_, Type::Union(alts)) => alts.iter().any(|t| self.sub_type_seen(t1, t, seen)),
            (Type::AtomLit(_), Type::Atom) => true,
            (Type::Tuple(_) | Type::Record(_) | Type::RefinedRecord(_), Type::AnyTuple) => true,
            (Type::Nil, Type::List(_)) => true,
            (Type::List(elem), Type::Nil) => self.sub_type_seen(elem, &Type::None, seen),
            (Type::List(e1), Type::List(e2)) => self.sub_type_seen(e1, e2, seen),
            // A record is its tagged-tuple encoding.
            (Type::Record(r), Type::Tuple(_)) => match self.record_as_tuple(r) {
                Some(encoded) => self.sub_type_seen(&encoded, t2, seen),
                None => false,
            },
            (Type::Tuple(_), Type::Record(r)) => match self.record_as_tuple(r) {
                Some(encoded) => self.sub_type_seen(t1, &encoded, seen),
                None => false,
            },
            (Type::RefinedRecord(rr), Type::Tuple(_)) => match self.refined_as_tuple(rr) {
                Some(encoded) => self.sub_type_seen(&encoded, t2, seen),
                None => false,
            },
            (Type::Tuple(_), Type::RefinedRecord(rr)) => match self.refined_as_tuple(rr) {
                Some(encoded) => self.sub_type_seen(t1, &encoded, seen),
                None => false,
            },
            (Type::RefinedRecord(rr), Type::Record(r)) => rr.rec == *r,
            (Type::Record(r), Type::RefinedRecord(rr)) => {
                *r == rr.rec
                    && match self.ctx.registry.record(&r.module, &r.name) {
                        Some(decl) => rr.fields.iter().all(|(name, refined)| {
                            decl.field(name)
                                .is_some_and(|f| self.sub_type_seen(&f.ty, refined, seen))
                        }),
                        None => false,
                    }
            }
            (Type::RefinedRecord(rr1), Type::RefinedRecord(rr2)) => {
                rr1.rec == rr2.rec
                    && match self.ctx.registry.record(&rr1.rec.module, &rr1.rec.name) {
                        Some(decl) => rr2.fields.iter().all(|(name, want)| {
                            let have = rr1
                                .fields
                                .get(name)
                                .cloned()
                                .or_else(|| decl.field(name).map(|f| f.ty.clone()));
                            have.is_some_and(|h| self.sub_type_seen(&h, want, seen))
                        }),
                        None => false,
                    }
            }
            (Type::AnyTuple, Type::Tuple(_) | Type::Record(_) | Type::RefinedRecord(_))
                if self.ctx.config.gradual_typing =>
            {
                tracing::debug!("gradual: tuple() admitted into {}", t2);
                true
            }
            (Type::AnyFun, Type::Fun(_)) if self.ctx.config.gradual_typing => {
                tracing::debug!("gradual: fun() admitted into {}", t2);
                true
            }
            (Type::Fun(_), Type::AnyFun) if self.ctx.config.gradual_typing => {
                tracing::debug!("gradual: {} admitted into fun()", t1);
                true
            }
            (Type::Fun(f), Type::AnyFun) => f
                .args
                .iter()
                .all(|arg| self.sub_type_seen(&Type::Any, arg, seen)),
            (Type::Tuple(ts1), Type::Tuple(ts2)) => {
                ts1.len() == ts2.len()
                    && ts1
                        .iter()
                        .zip(ts2)
                        .all(|(a, b)| self.sub_type_seen(a, b, seen))
            }
            (Type::Fun(f1), Type::Fun(f2)) => self.sub_type_fun(f1, f2, seen),
            (
                Type::DictMap { key: k1, value: v1 },
                Type::DictMap { key: k2, value: v2 },
            ) => self.sub_type_seen(k1, k2, seen) && self.sub_type_seen(v1, v2, seen),
            (Type::ShapeMap(props), Type::DictMap { key, value }) => {
                let keys = self.join_all(props.iter().map(|p| Type::atom_lit(p.key.clone())));
                let values = self.join_all(props.iter().map(|p| p.ty.clone()));
                self.sub_type_seen(&keys, key, seen) && self.sub_type_seen(&values, value, seen)
            }
            (Type::ShapeMap(props1), Type::ShapeMap(props2)) => {
                props1.iter().all(|p| {
                    props2
                        .iter()
                        .find(|q| q.key == p.key)
                        .is_some_and(|q| self.sub_type_seen(&p.ty, &q.ty, seen))
                }) && props2
                    .iter()
                    .filter(|q| q.required)
                    .all(|q| props1.iter().any(|p| p.key == q.key && p.required))
            }
            (Type::DictMap { key, value }, Type::ShapeMap(_)) => {
                key.has_dynamic() && value.has_dynamic()
            }
            _ => false,
        }
    }

    /// Whether a tuple element position can be distributed over, i.e. the
    /// element is a union, possibly behind alias indirections.
    fn distributes(&self, ty: &Type, visiting: &mut HashSet<RemoteId>) -> bool {
        match ty {
            Type::Union(_) => true,
            Type::Remote(id, args) => {
                if !visiting.insert(id.clone()) {
                    return false;
                }
                match self.ctx.registry.type_decl_body(id, args) {
                    Some(body) => self.distributes(&body, visiting),
                    None => false,
                }
            }
            _ => false,
        }
    }

    /// Distribute a union in element position `i` outward, so that
    /// `{A | B, C} <: T` reduces to `{A, C} <: T` and `{B, C} <: T`. Each
    /// alternative rebuilds the original tuple with the refined element and
    /// re-enters the main decision.
    fn sub_type_tuple(
        &self,
        elem: &Type,
        t2: &Type,
        i: usize,
        elems: &[Type],
        seen: &Seen,
        visiting: &mut HashSet<RemoteId>,
    ) -> bool {
        match elem {
            Type::Union(alts) => alts
                .iter()
                .all(|alt| self.sub_type_tuple(alt, t2, i, elems, seen, visiting)),
            Type::Remote(id, args) => {
                if !visiting.insert(id.clone()) {
                    return false;
                }
                match self.ctx.registry.type_decl_body(id, args) {
                    Some(body) => self.sub_type_tuple(&body, t2, i, elems, seen, visiting),
                    None => false,
                }
            }
            _ => {
                let mut rebuilt = elems.to_vec();
                rebuilt[i] = elem.clone();
                self.sub_type_seen(&Type::Tuple(rebuilt), t2, seen)
            }
        }
    }

    fn sub_type_fun(&self, f1: &FunType, f2: &FunType, seen: &Seen) -> bool {
        if f1.args.len() != f2.args.len() || f1.forall.len() != f2.forall.len() {
            return false;
        }
        let (g1, g2) = conform_foralls(f1, f2);
        self.sub_type_seen(&g1.res, &g2.res, seen)
            && g1
                .args
                .iter()
                .zip(&g2.args)
                .all(|(a1, a2)| self.sub_type_seen(a2, a1, seen))
    }

    /// The tagged-tuple encoding of a record: the name atom followed by the
    /// declared field types in declaration order.
    fn record_as_tuple(&self, r: &RecordRef) -> Option<Type> {
        let decl = self.ctx.registry.record(&r.module, &r.name)?;
        let mut tys = Vec::with_capacity(decl.tuple_arity());
        tys.push(Type::atom_lit(decl.name.clone()));
        tys.extend(decl.fields.iter().map(|f| f.ty.clone()));
        Some(Type::Tuple(tys))
    }

    /// Same encoding with the refinement overrides applied.
    fn refined_as_tuple(&self, rr: &RefinedRecord) -> Option<Type> {
        let decl = self.ctx.registry.record(&rr.rec.module, &rr.rec.name)?;
        let mut tys = Vec::with_capacity(decl.tuple_arity());
        tys.push(Type::atom_lit(decl.name.clone()));
        for f in &decl.fields {
            tys.push(rr.fields.get(&f.name).cloned().unwrap_or_else(|| f.ty.clone()));
        }
        Some(Type::Tuple(tys))
    }
}

/// Rename both functions' bound variables onto a common fresh range so the
/// bodies can be compared directly. Bound-variable names are not part of a
/// function type's identity.
fn conform_foralls(f1: &FunType, f2: &FunType) -> (FunType, FunType) {
    if f1.forall.is_empty() && f2.forall.is_empty() {
        return (f1.clone(), f2.clone());
    }
    let base = Type::Fun(f1.clone())
        .max_var_id()
        .into_iter()
        .chain(Type::Fun(f2.clone()).max_var_id())
        .max()
        .map_or(0, |m| m + 1);
    (rename_foralls(f1, base), rename_foralls(f2, base))
}

fn rename_foralls(f: &FunType, base: u32) -> FunType {
    let map: HashMap<u32, Type> = f
        .forall
        .iter()
        .enumerate()
        .map(|(i, id)| (*id, Type::Var(base + i as u32)))
        .collect();
    FunType {
        forall: (0..f.forall.len() as u32).map(|i| base + i).collect(),
        args: f.args.iter().map(|a| a.subst(&map)).collect(),
        res: Box::new(f.res.subst(&map)),
    }
}
