//! Occurrence typing: one narrowed environment per clause.
//!
//! Given a branching construct and its incoming environment, this engine
//! extracts propositions from each clause's patterns and guards, applies
//! the positive ones to produce that clause's environment, and accumulates
//! the negative ones so later clauses see what earlier clauses ruled out.
//!
//! Clause environments are produced in textual order; the k-th clause sees
//! the negations of clauses 0..k-1. Synthetic scrutinee variables are
//! minted `$1`, `$2`, ... and stripped from the returned environments.

mod narrow;
mod props;

pub use props::{dnf, dnf_all, AliasMap, Obj, PathField, PosNeg, Prop};

use std::collections::HashSet;

use crate::ast::{CaseExpr, Clause, Expr, IfExpr, Pat};
use crate::context::TypeckContext;
use crate::env::Env;
use crate::types::Type;

use narrow::Narrower;
use props::PropExtractor;

/// Refinement is skipped for constructs with this many clauses or more,
/// unless `unlimited_refinement` is set.
const MAX_REFINABLE_CLAUSES: usize = 7;

/// The occurrence typing engine. One instance per checked function is
/// enough; the only state is the synthetic-name counter.
pub struct OccurrenceTyper<'a> {
    ctx: TypeckContext<'a>,
    extractor: PropExtractor<'a>,
    narrower: Narrower<'a>,
    counter: u32,
}

impl<'a> OccurrenceTyper<'a> {
    pub fn new(ctx: TypeckContext<'a>) -> Self {
        Self {
            ctx,
            extractor: PropExtractor::new(ctx),
            narrower: Narrower::new(ctx),
            counter: 0,
        }
    }

    /// Reset the synthetic-name counter. Test harnesses call this between
    /// cases; fresh names only need to be distinct within one construct.
    pub fn reset_fresh_names(&mut self) {
        self.counter = 0;
    }

    fn fresh_var(&mut self) -> String {
        self.counter += 1;
        format!("${}", self.counter)
    }

    /// Whether occurrence refinement is active for these clauses: the
    /// engine must be switched on, the construct either pattern-free or
    /// small enough, and every clause's pattern variables linear.
    pub fn eqwater(&self, clauses: &[Clause]) -> bool {
        if !self.ctx.config.occurrence_typing {
            return false;
        }
        let pattern_free = clauses.iter().all(|c| c.pats.is_empty());
        if pattern_free {
            return true;
        }
        if !self.ctx.config.unlimited_refinement && clauses.len() >= MAX_REFINABLE_CLAUSES {
            tracing::debug!("skipping refinement: {} clauses", clauses.len());
            return false;
        }
        clauses.iter().all(clause_has_linear_vars)
    }

    /// Environments for the clauses of an `if`: guards only. Each clause
    /// narrows the accumulator positively; its negation feeds the clauses
    /// below it.
    pub fn if_envs(&self, if_expr: &IfExpr, env: &Env) -> Vec<Env> {
        let no_aliases = AliasMap::new();
        let mut acc = env.clone();
        let mut envs = Vec::with_capacity(if_expr.clauses.len());
        for clause in &if_expr.clauses {
            let (pos, neg) = self.extractor.guards_props(&clause.guards, &acc, &no_aliases);
            envs.push(self.narrower.batch_select(&acc, &[pos], &no_aliases));
            acc = self.narrower.batch_select(&acc, &[neg], &no_aliases);
        }
        envs
    }

    /// Environments for the clauses of a `case`. A variable scrutinee (or
    /// a `V = expr` scrutinee) is refined in place; anything else gets a
    /// synthetic variable bound to the scrutinee type.
    pub fn case_envs(&mut self, case: &CaseExpr, sel_ty: &Type, env: &Env) -> Vec<Env> {
        let (subject, synthetic) = match &case.subject {
            Expr::Var(name) => (name.clone(), false),
            Expr::Match(pat, _) => match &**pat {
                Pat::Var(name) => (name.clone(), false),
                _ => (self.fresh_var(), true),
            },
            _ => (self.fresh_var(), true),
        };
        tracing::debug!(
            "case_envs: {} clauses on {}",
            case.clauses.len(),
            subject
        );
        let mut base = env.clone();
        if !base.contains(&subject) {
            base = base.bind(subject.clone(), sel_ty.clone());
        }
        let strip: Vec<String> = if synthetic { vec![subject.clone()] } else { Vec::new() };
        let subjects = [subject];
        self.refine_clauses(&case.clauses, &subjects, &base, &strip)
    }

    /// Environments for multi-clause function heads: one synthetic subject
    /// per argument, then the same accumulation as `case`, with all
    /// patterns of a clause contributing in parallel.
    pub fn clauses_envs(&mut self, clauses: &[Clause], arg_tys: &[Type], env: &Env) -> Vec<Env> {
        let subjects: Vec<String> = arg_tys.iter().map(|_| self.fresh_var()).collect();
        let mut base = env.clone();
        for (subject, ty) in subjects.iter().zip(arg_tys) {
            base = base.bind(subject.clone(), ty.clone());
        }
        self.refine_clauses(clauses, &subjects, &base, &subjects)
    }

    /// Refine `env` under a proposition list; see
    /// [`props::Prop`] for how propositions arise.
    pub fn batch_select(&self, env: &Env, props: &[Prop], amap: &AliasMap) -> Env {
        self.narrower.batch_select(env, props, amap)
    }

    fn refine_clauses(
        &self,
        clauses: &[Clause],
        subjects: &[String],
        base: &Env,
        strip: &[String],
    ) -> Vec<Env> {
        let mut acc = base.clone();
        let mut envs = Vec::with_capacity(clauses.len());
        for clause in clauses {
            debug_assert_eq!(clause.pats.len(), subjects.len());
            let mut amap = AliasMap::new();
            let mut pos_props = Vec::new();
            let mut neg_props = Vec::new();
            for (pat, subject) in clause.pats.iter().zip(subjects) {
                let obj = Obj::var(subject.clone());
                if let Some((pos, neg)) = self.extractor.pat_props(pat, &obj, &acc, &mut amap) {
                    if !matches!(pos, Prop::Unknown) {
                        pos_props.push(pos);
                    }
                    // An unknowable pattern negation poisons the whole
                    // fall-through disjunction, which is what Prop::or does.
                    neg_props.push(neg);
                }
            }
            let (guard_pos, guard_neg) =
                self.extractor.guards_props(&clause.guards, &acc, &amap);
            pos_props.push(guard_pos);
            if !clause.guards.is_empty() {
                neg_props.push(guard_neg);
            }

            let clause_env = self.narrower.batch_select(&acc, &pos_props, &amap);
            envs.push(strip_names(&clause_env, strip));

            // Guard propositions are already path-resolved, so the
            // accumulator update needs no alias map.
            let fall_through = Prop::or(neg_props);
            acc = self.narrower.batch_select(&acc, &[fall_through], &AliasMap::new());
        }
        envs
    }
}

fn strip_names(env: &Env, names: &[String]) -> Env {
    let mut out = env.clone();
    for name in names {
        out = out.unbind(name);
    }
    out
}

fn clause_has_linear_vars(clause: &Clause) -> bool {
    let mut seen = HashSet::new();
    clause.pats.iter().all(|pat| pat_vars_linear(pat, &mut seen))
}

fn pat_vars_linear(pat: &Pat, seen: &mut HashSet<String>) -> bool {
    match pat {
        Pat::Var(name) => seen.insert(name.clone()),
        Pat::Tuple(pats) => pats.iter().all(|p| pat_vars_linear(p, seen)),
        Pat::Record { fields, default, .. } => {
            fields.iter().all(|(_, p)| pat_vars_linear(p, seen))
                && default.as_deref().map_or(true, |p| pat_vars_linear(p, seen))
        }
        Pat::Match(left, right) => pat_vars_linear(left, seen) && pat_vars_linear(right, seen),
        Pat::Cons(head, tail) => pat_vars_linear(head, seen) && pat_vars_linear(tail, seen),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::ast::{Guard, Test, TestOp};
    use crate::config::Config;
    use crate::registry::{RecordDecl, RecordField, TypeRegistry};
    use crate::types::RefinedRecord;

    fn clause(pats: Vec<Pat>, guards: Vec<Guard>) -> Clause {
        Clause { pats, guards }
    }

    fn guard(tests: Vec<Test>) -> Guard {
        Guard::new(tests)
    }

    fn is_call(pred: &str, var: &str) -> Test {
        Test::Call {
            name: pred.to_string(),
            args: vec![Test::Var(var.to_string())],
        }
    }

    fn fixture_registry() -> TypeRegistry {
        let registry = TypeRegistry::new();
        registry.add_record(RecordDecl {
            module: "app".to_string(),
            name: "r".to_string(),
            fields: vec![RecordField {
                name: "f".to_string(),
                ty: Type::union(vec![Type::Number, Type::Atom]),
                has_default: false,
            }],
        });
        registry
    }

    fn with_typer(config: &Config, run: impl FnOnce(&mut OccurrenceTyper)) {
        let registry = fixture_registry();
        let ctx = TypeckContext::new("app", &registry, config);
        run(&mut OccurrenceTyper::new(ctx));
    }

    #[test]
    fn test_atom_discrimination() {
        // Case on 'a' | 'b' with one clause per literal.
        with_typer(&Config::default(), |typer| {
            let ab = Type::union(vec![Type::atom_lit("a"), Type::atom_lit("b")]);
            let env = Env::new().bind("X", ab.clone());
            let case = CaseExpr {
                subject: Expr::Var("X".to_string()),
                clauses: vec![
                    clause(vec![Pat::Atom("a".to_string())], vec![]),
                    clause(vec![Pat::Atom("b".to_string())], vec![]),
                ],
            };
            let envs = typer.case_envs(&case, &ab, &env);
            assert_eq!(envs.len(), 2);
            assert_eq!(envs[0].get("X"), Some(&Type::atom_lit("a")));
            assert_eq!(envs[1].get("X"), Some(&Type::atom_lit("b")));
        });
    }

    #[test]
    fn test_tuple_field_refinement_via_alias() {
        // {ok, V} picks the ok-tagged alternative and V its payload.
        with_typer(&Config::default(), |typer| {
            let sel = Type::union(vec![
                Type::tuple(vec![Type::atom_lit("ok"), Type::Number]),
                Type::tuple(vec![Type::atom_lit("e"), Type::Atom]),
            ]);
            let env = Env::new().bind("T", sel.clone());
            let case = CaseExpr {
                subject: Expr::Var("T".to_string()),
                clauses: vec![
                    clause(
                        vec![Pat::Tuple(vec![
                            Pat::Atom("ok".to_string()),
                            Pat::Var("V".to_string()),
                        ])],
                        vec![],
                    ),
                    clause(
                        vec![Pat::Tuple(vec![
                            Pat::Atom("e".to_string()),
                            Pat::Var("V".to_string()),
                        ])],
                        vec![],
                    ),
                ],
            };
            let envs = typer.case_envs(&case, &sel, &env);
            assert_eq!(envs[0].get("V"), Some(&Type::Number));
            assert_eq!(
                envs[0].get("T"),
                Some(&Type::tuple(vec![Type::atom_lit("ok"), Type::Number]))
            );
            assert_eq!(envs[1].get("V"), Some(&Type::Atom));
        });
    }

    #[test]
    fn test_guarded_predicate_narrowing() {
        // is_atom(X) orelse is_integer(X), with a catch-all below it.
        with_typer(&Config::default(), |typer| {
            let env = Env::new().bind("X", Type::Any);
            let orelse = Test::BinOp {
                op: TestOp::OrElse,
                left: Box::new(is_call("is_atom", "X")),
                right: Box::new(is_call("is_integer", "X")),
            };
            let if_expr = IfExpr {
                clauses: vec![
                    clause(vec![], vec![guard(vec![orelse])]),
                    clause(vec![], vec![guard(vec![Test::Atom("true".to_string())])]),
                ],
            };
            let envs = typer.if_envs(&if_expr, &env);
            assert_eq!(
                envs[0].get("X"),
                Some(&Type::union(vec![Type::Atom, Type::Number]))
            );
            // No representable complement of term() minus the two kinds.
            assert_eq!(envs[1].get("X"), Some(&Type::Any));
        });
    }

    #[test]
    fn test_record_refinement() {
        // #r{f = V} when is_atom(V) narrows both the record and the alias.
        with_typer(&Config::default(), |typer| {
            let env = Env::new().bind("R", Type::record("app", "r"));
            let case = CaseExpr {
                subject: Expr::Var("R".to_string()),
                clauses: vec![clause(
                    vec![Pat::Record {
                        name: "r".to_string(),
                        fields: vec![("f".to_string(), Pat::Var("V".to_string()))],
                        default: None,
                    }],
                    vec![guard(vec![is_call("is_atom", "V")])],
                )],
            };
            let envs = typer.case_envs(&case, &Type::record("app", "r"), &env);
            let expected = Type::RefinedRecord(RefinedRecord {
                rec: crate::types::RecordRef::new("app", "r"),
                fields: [("f".to_string(), Type::Atom)].into_iter().collect(),
            });
            assert_eq!(envs[0].get("R"), Some(&expected));
            assert_eq!(envs[0].get("V"), Some(&Type::Atom));
        });
    }

    #[test]
    fn test_fall_through_negation_accumulates() {
        // is_atom(X); is_integer(X); true.
        with_typer(&Config::default(), |typer| {
            let env = Env::new().bind("X", Type::Any);
            let if_expr = IfExpr {
                clauses: vec![
                    clause(vec![], vec![guard(vec![is_call("is_atom", "X")])]),
                    clause(vec![], vec![guard(vec![is_call("is_integer", "X")])]),
                    clause(vec![], vec![guard(vec![Test::Atom("true".to_string())])]),
                ],
            };
            let envs = typer.if_envs(&if_expr, &env);
            assert_eq!(envs[0].get("X"), Some(&Type::Atom));
            assert_eq!(envs[1].get("X"), Some(&Type::Number));
            assert_eq!(envs[2].get("X"), Some(&Type::Any));
        });
    }

    #[test]
    fn test_fall_through_removes_matched_alternatives() {
        with_typer(&Config::default(), |typer| {
            let ab = Type::union(vec![Type::atom_lit("a"), Type::atom_lit("b")]);
            let env = Env::new().bind("X", ab.clone());
            let case = CaseExpr {
                subject: Expr::Var("X".to_string()),
                clauses: vec![
                    clause(vec![Pat::Atom("a".to_string())], vec![]),
                    clause(vec![Pat::Var("Y".to_string())], vec![]),
                ],
            };
            let envs = typer.case_envs(&case, &ab, &env);
            // After 'a' is ruled out, the catch-all binds Y to what's left.
            assert_eq!(envs[1].get("Y"), Some(&Type::atom_lit("b")));
            assert_eq!(envs[1].get("X"), Some(&Type::atom_lit("b")));
        });
    }

    #[test]
    fn test_synthetic_subject_is_stripped() {
        with_typer(&Config::default(), |typer| {
            let ab = Type::union(vec![Type::atom_lit("a"), Type::atom_lit("b")]);
            let env = Env::new();
            let case = CaseExpr {
                subject: Expr::Call {
                    name: "f".to_string(),
                    args: vec![],
                },
                clauses: vec![clause(vec![Pat::Var("V".to_string())], vec![])],
            };
            let envs = typer.case_envs(&case, &ab, &env);
            assert_eq!(envs[0].get("V"), Some(&ab));
            assert!(envs[0].names().all(|name| !name.starts_with('$')));
        });
    }

    #[test]
    fn test_match_scrutinee_binds_its_variable() {
        with_typer(&Config::default(), |typer| {
            let ab = Type::union(vec![Type::atom_lit("a"), Type::atom_lit("b")]);
            let case = CaseExpr {
                subject: Expr::Match(
                    Box::new(Pat::Var("Y".to_string())),
                    Box::new(Expr::Call {
                        name: "f".to_string(),
                        args: vec![],
                    }),
                ),
                clauses: vec![clause(vec![Pat::Atom("a".to_string())], vec![])],
            };
            let envs = typer.case_envs(&case, &ab, &Env::new());
            assert_eq!(envs[0].get("Y"), Some(&Type::atom_lit("a")));
        });
    }

    #[test]
    fn test_clauses_envs_refines_all_arguments() {
        with_typer(&Config::default(), |typer| {
            let tag = Type::union(vec![Type::atom_lit("a"), Type::atom_lit("b")]);
            let clauses = vec![
                clause(
                    vec![Pat::Atom("a".to_string()), Pat::Var("V".to_string())],
                    vec![],
                ),
                clause(
                    vec![Pat::Var("X".to_string()), Pat::Wild],
                    vec![],
                ),
            ];
            let envs = typer.clauses_envs(&clauses, &[tag, Type::Number], &Env::new());
            assert_eq!(envs[0].get("V"), Some(&Type::Number));
            // The first head ruled 'a' out of the first argument.
            assert_eq!(envs[1].get("X"), Some(&Type::atom_lit("b")));
            for env in &envs {
                assert!(env.names().all(|name| !name.starts_with('$')));
            }
        });
    }

    #[test]
    fn test_case_refinement_is_idempotent() {
        with_typer(&Config::default(), |typer| {
            let ab = Type::union(vec![Type::atom_lit("a"), Type::atom_lit("b")]);
            let case = CaseExpr {
                subject: Expr::Var("X".to_string()),
                clauses: vec![clause(vec![Pat::Atom("a".to_string())], vec![])],
            };
            let env = Env::new().bind("X", ab.clone());
            let once = typer.case_envs(&case, &ab, &env);
            let twice = typer.case_envs(&case, &ab, &once[0]);
            assert_eq!(once[0], twice[0]);
        });
    }

    #[test]
    fn test_eqwater_gating() {
        let pattern_clause = |name: &str| clause(vec![Pat::Var(name.to_string())], vec![]);

        with_typer(&Config::default(), |typer| {
            // Pattern-free clauses are always refinable.
            assert!(typer.eqwater(&[clause(vec![], vec![]), clause(vec![], vec![])]));
            // Few clauses with linear variables.
            assert!(typer.eqwater(&[pattern_clause("A"), pattern_clause("B")]));
            // Non-linear pattern variables opt out.
            let non_linear = clause(
                vec![
                    Pat::Var("A".to_string()),
                    Pat::Tuple(vec![Pat::Var("A".to_string())]),
                ],
                vec![],
            );
            assert!(!typer.eqwater(&[non_linear]));
            // Too many clauses opt out.
            let many: Vec<Clause> = (0..7).map(|_| pattern_clause("A")).collect();
            assert!(!typer.eqwater(&many));
        });

        let unlimited = Config {
            unlimited_refinement: true,
            ..Config::default()
        };
        with_typer(&unlimited, |typer| {
            let many: Vec<Clause> = (0..7).map(|_| pattern_clause("A")).collect();
            assert!(typer.eqwater(&many));
        });

        let disabled = Config {
            occurrence_typing: false,
            ..Config::default()
        };
        with_typer(&disabled, |typer| {
            assert!(!typer.eqwater(&[clause(vec![], vec![])]));
        });
    }

    #[test]
    fn test_fresh_names_reset() {
        with_typer(&Config::default(), |typer| {
            assert_eq!(typer.fresh_var(), "$1");
            assert_eq!(typer.fresh_var(), "$2");
            typer.reset_fresh_names();
            assert_eq!(typer.fresh_var(), "$1");
        });
    }
}

#[cfg(test)]
mod property_tests {
    use quickcheck::{Arbitrary, Gen, TestResult};
    use quickcheck_macros::quickcheck;

    use super::*;
    use crate::config::Config;
    use crate::registry::TypeRegistry;
    use crate::subtype::Subtyping;
    use crate::testutil::TyGen;

    /// Single-clause case patterns whose refinements the engine can apply:
    /// literals, a tagged pair with a payload binder, and the irrefutable
    /// shapes.
    #[derive(Debug, Clone)]
    struct PatGen(Pat);

    impl Arbitrary for PatGen {
        fn arbitrary(g: &mut Gen) -> Self {
            let pat = match *g.choose(&[0u8, 1, 2, 3, 4, 5]).unwrap() {
                0 => Pat::Atom("a".to_string()),
                1 => Pat::Atom("b".to_string()),
                2 => Pat::Int(1),
                3 => Pat::Float(1.5),
                4 => Pat::Tuple(vec![
                    Pat::Atom("a".to_string()),
                    Pat::Var("V".to_string()),
                ]),
                _ => Pat::Wild,
            };
            PatGen(pat)
        }
    }

    fn with_engines<T>(run: impl FnOnce(&OccurrenceTyper, &Subtyping) -> T) -> T {
        let registry = TypeRegistry::new();
        let config = Config::default();
        let ctx = TypeckContext::new("app", &registry, &config);
        run(&OccurrenceTyper::new(ctx), &Subtyping::new(ctx))
    }

    #[quickcheck]
    fn prop_case_refinement_is_idempotent(t: TyGen, pat: PatGen) -> bool {
        let registry = TypeRegistry::new();
        let config = Config::default();
        let ctx = TypeckContext::new("app", &registry, &config);
        let mut typer = OccurrenceTyper::new(ctx);

        let case = CaseExpr {
            subject: Expr::Var("X".to_string()),
            clauses: vec![Clause {
                pats: vec![pat.0],
                guards: vec![],
            }],
        };
        let env = Env::new().bind("X", t.0.clone());
        let once = typer.case_envs(&case, &t.0, &env);
        let twice = typer.case_envs(&case, &t.0, &once[0]);
        once[0] == twice[0]
    }

    #[quickcheck]
    fn prop_batch_select_only_narrows(t: TyGen, s: TyGen) -> TestResult {
        with_engines(|typer, sub| {
            let env = Env::new().bind("X", t.0.clone());
            for prop in [
                Prop::Pos(Obj::var("X"), s.0.clone()),
                Prop::Neg(Obj::var("X"), s.0.clone()),
                Prop::Or(vec![
                    Prop::Pos(Obj::var("X"), s.0.clone()),
                    Prop::Neg(Obj::var("X"), s.0.clone()),
                ]),
            ] {
                let out = typer.batch_select(&env, &[prop], &AliasMap::new());
                let narrowed = out.get("X").unwrap();
                if !sub.sub_type(narrowed, &t.0) {
                    return TestResult::failed();
                }
            }
            TestResult::passed()
        })
    }
}
