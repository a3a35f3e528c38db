//! End-to-end scenarios from `spec.md` §8: build a small theory, insert
//! ground terms, saturate, and check the resulting equivalence classes.

use eqsat::{parse_rule, Arity, EGraph, Runner, SaturationOutcome, Theory, TheoryResult};

fn add_rule(theory: &mut Theory, name: &str, lhs: &str, rhs: &str) {
    let (lhs, rhs) = parse_rule(theory, lhs, rhs).unwrap();
    theory.add_rewrite_rule(name, lhs, rhs).unwrap();
}

#[test]
fn multiplicative_identity_non_ac() {
    let mut theory = Theory::new();
    theory.add_operator("one", Arity::Fixed(0));
    theory.add_operator("var", Arity::Fixed(0));
    let mul = theory.add_operator("mul", Arity::Fixed(2));
    add_rule(&mut theory, "mul_one", "(mul ?x (one))", "?x");

    let mut runner = Runner::new(&theory);
    let var_sym = theory.symbols().lookup("var").unwrap();
    let one_sym = theory.symbols().lookup("one").unwrap();
    let a = runner.egraph.add_enode(var_sym, vec![]);
    let o = runner.egraph.add_enode(one_sym, vec![]);
    let m = runner.egraph.add_enode(mul, vec![a, o]);
    assert!(!runner.egraph.is_equiv(a, m));

    let runner = runner.run();
    assert!(matches!(runner.outcome(), SaturationOutcome::Saturated));
    assert!(runner.egraph.is_equiv(a, m));

    // The reversed argument order is a distinct, non-equivalent e-node: the
    // rule is directional and `mul` is not AC here.
    let reversed = runner.egraph.lookup(mul, vec![o, a]);
    assert!(reversed.is_none());
}

#[test]
fn ac_multiplicative_identity() {
    let mut theory = Theory::new();
    theory.add_operator("one", Arity::Fixed(0));
    theory.add_operator("var", Arity::Fixed(0));
    let mul = theory.add_operator("mul", Arity::Ac);
    add_rule(&mut theory, "mul_one", "(mul ?x (one))", "?x");

    let mut runner = Runner::new(&theory);
    let var_sym = theory.symbols().lookup("var").unwrap();
    let one_sym = theory.symbols().lookup("one").unwrap();
    let a = runner.egraph.add_enode(var_sym, vec![]);
    let o = runner.egraph.add_enode(one_sym, vec![]);
    let m = runner.egraph.add_enode(mul, vec![o, a]);

    let runner = runner.run();
    assert!(runner.egraph.is_equiv(a, m));
}

#[test]
fn congruence_after_unify() {
    let mut theory = Theory::new();
    let a = theory.add_operator("a", Arity::Fixed(0));
    let b = theory.add_operator("b", Arity::Fixed(0));
    let f = theory.add_operator("f", Arity::Fixed(1));
    // No rewrite rules at all; this scenario exercises congruence + rebuild only.

    let mut egraph = EGraph::new(&theory);
    let ca = egraph.add_enode(a, vec![]);
    let cb = egraph.add_enode(b, vec![]);
    let fa = egraph.add_enode(f, vec![ca]);
    let fb = egraph.add_enode(f, vec![cb]);
    assert!(!egraph.is_equiv(fa, fb));

    egraph.unify(ca, cb);
    egraph.rebuild();
    assert!(egraph.is_equiv(fa, fb));
}

#[test]
fn inverse_in_abelian_group_via_ephemeral_ac_matching() {
    let mut theory = Theory::new();
    theory.add_operator("one", Arity::Fixed(0));
    theory.add_operator("var", Arity::Fixed(0));
    theory.add_operator("inv", Arity::Fixed(1));
    let mul = theory.add_operator("mul", Arity::Ac);
    add_rule(&mut theory, "mul_one", "(mul ?x (one))", "?x");
    add_rule(&mut theory, "mul_inv", "(mul ?x (inv ?x))", "(one)");

    let mut runner = Runner::new(&theory).with_iter_limit(10);
    let var_sym = theory.symbols().lookup("var").unwrap();
    let inv_sym = theory.symbols().lookup("inv").unwrap();
    let v = runner.egraph.add_enode(var_sym, vec![]);
    let inv_v = runner.egraph.add_enode(inv_sym, vec![v]);
    let m = runner.egraph.add_enode(mul, vec![v, v, inv_v]);

    let runner = runner.run();
    assert!(matches!(runner.outcome(), SaturationOutcome::Saturated));
    assert!(runner.egraph.is_equiv(v, m));
}

#[test]
fn ac_permutation_closure_holds_before_any_saturation() {
    let mut theory = Theory::new();
    let a = theory.add_operator("a", Arity::Fixed(0));
    let b = theory.add_operator("b", Arity::Fixed(0));
    let c = theory.add_operator("c", Arity::Fixed(0));
    let mul = theory.add_operator("mul", Arity::Ac);

    let mut egraph = EGraph::new(&theory);
    let ca = egraph.add_enode(a, vec![]);
    let cb = egraph.add_enode(b, vec![]);
    let cc = egraph.add_enode(c, vec![]);
    let t1 = egraph.add_enode(mul, vec![ca, cb, cc]);
    let t2 = egraph.add_enode(mul, vec![cc, ca, cb]);
    assert_eq!(t1, t2);
    assert!(egraph.is_equiv(t1, t2));
}

#[test]
fn idempotent_boolean_and_via_ac_without_idempotence_rule() {
    let mut theory = Theory::new();
    theory.add_operator("a", Arity::Fixed(0));
    theory.add_operator("true", Arity::Fixed(0));
    let and_op = theory.add_operator("and", Arity::Ac);
    add_rule(&mut theory, "and_true", "(and ?x (true))", "?x");

    let mut runner = Runner::new(&theory).with_iter_limit(5);
    let a_sym = theory.symbols().lookup("a").unwrap();
    let true_sym = theory.symbols().lookup("true").unwrap();
    let a = runner.egraph.add_enode(a_sym, vec![]);
    let t = runner.egraph.add_enode(true_sym, vec![]);
    let big = runner.egraph.add_enode(and_op, vec![a, a, a, t]);
    let small = runner.egraph.add_enode(and_op, vec![a, a, a]);

    let runner = runner.run();
    assert!(runner.egraph.is_equiv(big, small));
    assert!(!runner.egraph.is_equiv(big, a));
    assert!(!runner.egraph.is_equiv(small, a));
}

#[test]
fn non_linear_lhs_is_rejected_at_rule_creation() {
    let mut theory = Theory::new();
    theory.add_operator("mul", Arity::Fixed(2));
    assert!(add_rule_checked(&mut theory, "bad", "(mul ?x ?x)", "?x").is_err());
}

fn add_rule_checked(theory: &mut Theory, name: &str, lhs: &str, rhs: &str) -> TheoryResult<()> {
    let (lhs, rhs) = parse_rule(theory, lhs, rhs)?;
    theory.add_rewrite_rule(name, lhs, rhs)
}

#[test]
fn empty_and_singleton_ac_applications_are_valid() {
    let mut theory = Theory::new();
    let x = theory.add_operator("x", Arity::Fixed(0));
    let mul = theory.add_operator("mul", Arity::Ac);

    let mut egraph = EGraph::new(&theory);
    let empty = egraph.add_enode(mul, vec![]);
    let cx = egraph.add_enode(x, vec![]);
    let single = egraph.add_enode(mul, vec![cx]);
    assert!(egraph.is_equiv(empty, empty));
    assert!(egraph.is_equiv(single, single));
    assert!(!egraph.is_equiv(empty, single));
}

#[test]
fn duplicate_ac_arguments_preserve_multiplicity() {
    let mut theory = Theory::new();
    let x = theory.add_operator("x", Arity::Fixed(0));
    let mul = theory.add_operator("mul", Arity::Ac);

    let mut egraph = EGraph::new(&theory);
    let cx = egraph.add_enode(x, vec![]);
    let double = egraph.add_enode(mul, vec![cx, cx]);
    let single = egraph.add_enode(mul, vec![cx]);
    assert!(!egraph.is_equiv(double, single));
}

#[test]
fn saturate_zero_iterations_is_a_no_op() {
    let mut theory = Theory::new();
    theory.add_operator("one", Arity::Fixed(0));
    theory.add_operator("var", Arity::Fixed(0));
    let mul = theory.add_operator("mul", Arity::Fixed(2));
    add_rule(&mut theory, "mul_one", "(mul ?x (one))", "?x");

    let mut runner = Runner::new(&theory).with_iter_limit(0);
    let var_sym = theory.symbols().lookup("var").unwrap();
    let one_sym = theory.symbols().lookup("one").unwrap();
    let a = runner.egraph.add_enode(var_sym, vec![]);
    let o = runner.egraph.add_enode(one_sym, vec![]);
    let m = runner.egraph.add_enode(mul, vec![a, o]);

    let runner = runner.run();
    assert!(!runner.egraph.is_equiv(a, m));
}
