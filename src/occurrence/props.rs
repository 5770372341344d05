//! Propositions extracted from patterns and guards.
//!
//! A proposition asserts something about the type of an *object*: a path
//! into a compound value starting from a root variable. Patterns and guard
//! tests each yield a positive proposition (what holds when the clause is
//! selected) and a negative one (what holds when it is skipped). Before a
//! proposition list touches the environment it is flattened to disjunctive
//! normal form, a list of cubes of positive and negative literals.

use std::collections::HashMap;

use crate::ast::{Guard, Pat, Test, TestOp};
use crate::context::TypeckContext;
use crate::env::Env;
use crate::types::{RecordRef, Type};

/// One step into a compound value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathField {
    /// The `index`-th element of a tuple of the given arity.
    Tuple { index: usize, arity: usize },
    /// A named field of the given record.
    Record { field: String, record: String },
}

/// A symbolic reference to a value reachable from a root variable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Obj {
    Var(String),
    Field { field: PathField, base: Box<Obj> },
}

impl Obj {
    pub fn var(name: impl Into<String>) -> Obj {
        Obj::Var(name.into())
    }

    pub fn field(self, field: PathField) -> Obj {
        Obj::Field {
            field,
            base: Box::new(self),
        }
    }

    /// The root variable this object descends from.
    pub fn root(&self) -> &str {
        match self {
            Obj::Var(name) => name,
            Obj::Field { base, .. } => base.root(),
        }
    }

    /// The field path from the root outward.
    pub fn path(&self) -> Vec<&PathField> {
        let mut path = Vec::new();
        let mut cursor = self;
        while let Obj::Field { field, base } = cursor {
            path.push(field);
            cursor = base;
        }
        path.reverse();
        path
    }
}

/// A boolean assertion about object types.
#[derive(Debug, Clone, PartialEq)]
pub enum Prop {
    /// No information. Contributes nothing to refinement.
    Unknown,
    /// The object inhabits the type.
    Pos(Obj, Type),
    /// The object does not inhabit the type.
    Neg(Obj, Type),
    And(Vec<Prop>),
    Or(Vec<Prop>),
}

impl Prop {
    /// Conjunction. `Unknown` conjuncts carry no information and are
    /// dropped; an empty conjunction is `Unknown`.
    pub fn and(mut props: Vec<Prop>) -> Prop {
        props.retain(|p| !matches!(p, Prop::Unknown));
        match props.len() {
            0 => Prop::Unknown,
            1 => props.pop().unwrap(),
            _ => Prop::And(props),
        }
    }

    /// Disjunction. An `Unknown` disjunct makes the whole disjunction
    /// unknowable, so it collapses to `Unknown`.
    pub fn or(mut props: Vec<Prop>) -> Prop {
        if props.iter().any(|p| matches!(p, Prop::Unknown)) {
            return Prop::Unknown;
        }
        match props.len() {
            0 => Prop::Unknown,
            1 => props.pop().unwrap(),
            _ => Prop::Or(props),
        }
    }
}

/// Pattern aliases: variables bound by a pattern, mapped to the object path
/// they were bound at.
pub type AliasMap = HashMap<String, Obj>;

/// One cube of a disjunctive normal form: a conjunction of positive and
/// negative literals.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PosNeg {
    pub pos: Vec<(Obj, Type)>,
    pub neg: Vec<(Obj, Type)>,
}

/// Flatten a proposition into DNF cubes. `Unknown` is the empty cube: it
/// constrains nothing, so the environment passes through it unchanged.
pub fn dnf(prop: &Prop) -> Vec<PosNeg> {
    match prop {
        Prop::Unknown => vec![PosNeg::default()],
        Prop::Pos(obj, ty) => vec![PosNeg {
            pos: vec![(obj.clone(), ty.clone())],
            neg: Vec::new(),
        }],
        Prop::Neg(obj, ty) => vec![PosNeg {
            pos: Vec::new(),
            neg: vec![(obj.clone(), ty.clone())],
        }],
        Prop::And(props) => props.iter().fold(vec![PosNeg::default()], |acc, p| {
            let cubes = dnf(p);
            let mut out = Vec::with_capacity(acc.len() * cubes.len());
            for left in &acc {
                for right in &cubes {
                    let mut cube = left.clone();
                    cube.pos.extend(right.pos.iter().cloned());
                    cube.neg.extend(right.neg.iter().cloned());
                    out.push(cube);
                }
            }
            out
        }),
        Prop::Or(props) => props.iter().flat_map(dnf).collect(),
    }
}

/// DNF of the conjunction of a proposition list.
pub fn dnf_all(props: &[Prop]) -> Vec<PosNeg> {
    dnf(&Prop::And(props.to_vec()))
}

/// Extracts propositions from patterns and guard tests.
pub(crate) struct PropExtractor<'a> {
    ctx: TypeckContext<'a>,
}

impl<'a> PropExtractor<'a> {
    pub(crate) fn new(ctx: TypeckContext<'a>) -> Self {
        Self { ctx }
    }

    /// Positive and negative propositions of a pattern matched against
    /// `obj`. Returns `None` for irrefutable patterns that assert nothing;
    /// fresh pattern variables are recorded in `amap` instead.
    pub(crate) fn pat_props(
        &self,
        pat: &Pat,
        obj: &Obj,
        env: &Env,
        amap: &mut AliasMap,
    ) -> Option<(Prop, Prop)> {
        match pat {
            Pat::Wild => None,
            Pat::Var(v) => {
                if env.contains(v) {
                    // Rebinding an in-scope variable is an equality check we
                    // cannot express as a type proposition.
                    Some((Prop::Unknown, Prop::Unknown))
                } else {
                    amap.insert(v.clone(), obj.clone());
                    None
                }
            }
            Pat::Atom(name) => {
                let lit = Type::atom_lit(name.clone());
                Some((
                    Prop::Pos(obj.clone(), lit.clone()),
                    Prop::Neg(obj.clone(), lit),
                ))
            }
            Pat::Int(_) => Some((Prop::Pos(obj.clone(), Type::Number), Prop::Unknown)),
            Pat::Float(_) => Some((Prop::Pos(obj.clone(), Type::Float), Prop::Unknown)),
            Pat::Tuple(pats) => {
                let skeleton = Type::Tuple(vec![Type::Any; pats.len()]);
                let mut child_pos = Vec::new();
                let mut child_neg = Vec::new();
                for (index, child) in pats.iter().enumerate() {
                    let child_obj = obj.clone().field(PathField::Tuple {
                        index,
                        arity: pats.len(),
                    });
                    self.child_props(child, &child_obj, env, amap, &mut child_pos, &mut child_neg);
                }
                Some(composite_props(obj, skeleton, child_pos, child_neg))
            }
            Pat::Record {
                name,
                fields,
                default,
            } => {
                let skeleton = Type::Record(RecordRef::new(self.ctx.module, name.clone()));
                let mut child_pos = Vec::new();
                let mut child_neg = Vec::new();
                for (field, child) in fields {
                    let child_obj = obj.clone().field(PathField::Record {
                        field: field.clone(),
                        record: name.clone(),
                    });
                    self.child_props(child, &child_obj, env, amap, &mut child_pos, &mut child_neg);
                }
                if let Some(default_pat) = default {
                    // The generic sub-pattern applies to every declared
                    // field the pattern does not name explicitly.
                    if let Some(decl) = self.ctx.registry.record(self.ctx.module, name) {
                        for decl_field in &decl.fields {
                            if fields.iter().any(|(f, _)| f == &decl_field.name) {
                                continue;
                            }
                            let child_obj = obj.clone().field(PathField::Record {
                                field: decl_field.name.clone(),
                                record: name.clone(),
                            });
                            self.child_props(
                                default_pat,
                                &child_obj,
                                env,
                                amap,
                                &mut child_pos,
                                &mut child_neg,
                            );
                        }
                    }
                }
                Some(composite_props(obj, skeleton, child_pos, child_neg))
            }
            Pat::Match(left, right) => match (&**left, &**right) {
                (Pat::Var(v), inner) | (inner, Pat::Var(v)) => {
                    if env.contains(v) {
                        Some((Prop::Unknown, Prop::Unknown))
                    } else {
                        amap.insert(v.clone(), obj.clone());
                        self.pat_props(inner, obj, env, amap)
                    }
                }
                _ => Some((Prop::Unknown, Prop::Unknown)),
            },
            _ => Some((Prop::Unknown, Prop::Unknown)),
        }
    }

    fn child_props(
        &self,
        child: &Pat,
        child_obj: &Obj,
        env: &Env,
        amap: &mut AliasMap,
        child_pos: &mut Vec<Prop>,
        child_neg: &mut Vec<Prop>,
    ) {
        if let Some((pos, neg)) = self.pat_props(child, child_obj, env, amap) {
            if !matches!(pos, Prop::Unknown) {
                child_pos.push(pos);
            }
            if !matches!(neg, Prop::Unknown) {
                child_neg.push(neg);
            }
        }
    }

    /// Positive and negative propositions of a single guard test.
    pub(crate) fn test_props(&self, test: &Test, env: &Env, amap: &AliasMap) -> (Prop, Prop) {
        match test {
            Test::Call { name, args } => self.call_props(name, args, env, amap),
            Test::Not(inner) => {
                let (pos, neg) = self.test_props(inner, env, amap);
                (neg, pos)
            }
            Test::BinOp {
                op: TestOp::And | TestOp::AndAlso,
                left,
                right,
            } => {
                let (pos_l, neg_l) = self.test_props(left, env, amap);
                let (pos_r, neg_r) = self.test_props(right, env, amap);
                (Prop::and(vec![pos_l, pos_r]), Prop::or(vec![neg_l, neg_r]))
            }
            Test::BinOp {
                op: TestOp::Or | TestOp::OrElse,
                left,
                right,
            } => {
                let (pos_l, neg_l) = self.test_props(left, env, amap);
                let (pos_r, neg_r) = self.test_props(right, env, amap);
                (Prop::or(vec![pos_l, pos_r]), Prop::and(vec![neg_l, neg_r]))
            }
            Test::BinOp {
                op: TestOp::Eq | TestOp::StrictEq,
                left,
                right,
            } => self.equality_props(left, right, env, amap, false),
            Test::BinOp {
                op: TestOp::NotEq | TestOp::StrictNotEq,
                left,
                right,
            } => self.equality_props(left, right, env, amap, true),
            _ => (Prop::Unknown, Prop::Unknown),
        }
    }

    /// Combined propositions of a clause's guard sequence. Tests inside a
    /// guard are AND-connected, the guards themselves OR-connected; the
    /// negation side dualizes both.
    pub(crate) fn guards_props(
        &self,
        guards: &[Guard],
        env: &Env,
        amap: &AliasMap,
    ) -> (Prop, Prop) {
        if guards.is_empty() {
            return (Prop::Unknown, Prop::Unknown);
        }
        let mut pos_alts = Vec::with_capacity(guards.len());
        let mut neg_terms = Vec::with_capacity(guards.len());
        for guard in guards {
            let (pos, neg): (Vec<_>, Vec<_>) = guard
                .tests
                .iter()
                .map(|test| self.test_props(test, env, amap))
                .unzip();
            pos_alts.push(Prop::and(pos));
            neg_terms.push(Prop::or(neg));
        }
        (Prop::or(pos_alts), Prop::and(neg_terms))
    }

    fn equality_props(
        &self,
        left: &Test,
        right: &Test,
        env: &Env,
        amap: &AliasMap,
        negated: bool,
    ) -> (Prop, Prop) {
        let resolved = match (left, right) {
            (Test::Var(v), Test::Atom(a)) | (Test::Atom(a), Test::Var(v)) => self
                .test_obj(v, env, amap)
                .map(|obj| (obj, Type::atom_lit(a.clone()))),
            _ => None,
        };
        match resolved {
            Some((obj, lit)) => {
                let pos = Prop::Pos(obj.clone(), lit.clone());
                let neg = Prop::Neg(obj, lit);
                if negated {
                    (neg, pos)
                } else {
                    (pos, neg)
                }
            }
            None => (Prop::Unknown, Prop::Unknown),
        }
    }

    fn call_props(&self, name: &str, args: &[Test], env: &Env, amap: &AliasMap) -> (Prop, Prop) {
        let unknown = (Prop::Unknown, Prop::Unknown);
        let Some(Test::Var(v)) = args.first() else {
            return unknown;
        };
        let Some(obj) = self.test_obj(v, env, amap) else {
            return unknown;
        };
        let ty = match (name, args.len()) {
            ("is_atom", 1) => Type::Atom,
            ("is_binary", 1) | ("is_bitstring", 1) => Type::Binary,
            ("is_boolean", 1) => Type::boolean(),
            ("is_float", 1) => Type::Float,
            ("is_function", 1) => Type::AnyFun,
            ("is_function", 2) => match args[1] {
                Test::Int(arity) if arity >= 0 => {
                    Type::fun(vec![Type::Any; arity as usize], Type::Any)
                }
                _ => return unknown,
            },
            ("is_integer", 1) | ("is_number", 1) => Type::Number,
            ("is_list", 1) => Type::list(Type::Any),
            ("is_map", 1) => Type::dict_map(Type::Any, Type::Any),
            ("is_pid", 1) => Type::Pid,
            ("is_port", 1) => Type::Port,
            ("is_reference", 1) => Type::Reference,
            ("is_tuple", 1) => Type::AnyTuple,
            ("is_record", 2 | 3) => match &args[1] {
                Test::Atom(record) => Type::record(self.ctx.module, record.clone()),
                _ => return unknown,
            },
            _ => return unknown,
        };
        (Prop::Pos(obj.clone(), ty.clone()), Prop::Neg(obj, ty))
    }

    /// Resolve a guard variable to the object it refines: a pattern alias
    /// first, an in-scope variable second.
    fn test_obj(&self, name: &str, env: &Env, amap: &AliasMap) -> Option<Obj> {
        if let Some(obj) = amap.get(name) {
            return Some(obj.clone());
        }
        if env.contains(name) {
            return Some(Obj::var(name));
        }
        None
    }
}

/// The negative proposition of a composite pattern: either the shape
/// mismatches outright, or the shape matches but some field fails.
fn composite_props(
    obj: &Obj,
    skeleton: Type,
    child_pos: Vec<Prop>,
    child_neg: Vec<Prop>,
) -> (Prop, Prop) {
    let mut pos = vec![Prop::Pos(obj.clone(), skeleton.clone())];
    pos.extend(child_pos);
    let neg = if child_neg.is_empty() {
        Prop::Neg(obj.clone(), skeleton)
    } else {
        Prop::Or(vec![
            Prop::Neg(obj.clone(), skeleton.clone()),
            Prop::And(vec![Prop::Pos(obj.clone(), skeleton), Prop::or(child_neg)]),
        ])
    };
    (Prop::and(pos), neg)
}
