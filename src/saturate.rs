//! L4 saturation driver: compiles a theory's rules once, then repeatedly
//! searches, applies, and rebuilds until nothing new is learned or a limit
//! is hit, per `spec.md` §4.8.
//!
//! Grounded on the teacher's `egraph/run.rs` `Runner`/`BackoffScheduler`/
//! `Report`/`Extractor` (kept in shape: builder-style limits, the
//! saturation-vs-limit `StopReason`, per-iteration timing) generalized to
//! drive [`crate::query_engine::Engine`] instead of `egg`'s bytecode VM.
//! `original_source/src/rewriter.{h,cpp}`'s match→instantiate→unify→rebuild
//! loop supplies the per-iteration body; the ephemeral-id resolution step
//! before instantiation (`spec.md` §4.7/§4.9) has no teacher counterpart
//! (the teacher's e-graph has no ephemeral ids at all) and is this port's
//! own addition, required by the AC partial-match design.
//!
//! The teacher's `Runner` is generic over an `Analysis` that attaches
//! mergeable per-eclass data; this e-graph has no such hook (`egraph.rs`
//! never grows eclass payloads), so it is not reproduced here — see
//! DESIGN.md for that scoping note.

use crate::compiler::{Compiler, Subst};
use crate::egraph::EGraph;
use crate::id::ClassId;
use crate::language::{AstNode, ENode, RecExpr};
use crate::query_engine::Engine;
use crate::symbol::Theory;
use crate::utils::log_macros::*;
use crate::utils::{HashMap, Instant};
use indexmap::IndexMap;
use std::cmp::Ordering;
use std::fmt::{self, Debug, Display, Formatter};
use std::time::Duration;

struct CompiledRule {
    name: String,
    query: crate::compiler::Query,
    subst: Subst,
}

/// Why a [`Runner`] stopped.
#[derive(Debug, Clone)]
pub enum StopReason {
    /// No rule's search this iteration produced a genuinely new
    /// unification — the e-graph is saturated.
    Saturated,
    IterationLimit(usize),
    NodeLimit(usize),
    TimeLimit(f64),
}

/// Per-iteration timing and match counts, mirroring the teacher's
/// `Iteration<IterData>` (without the generic `IterData` hook, unused here).
#[derive(Debug, Clone)]
pub struct Iteration {
    pub egraph_nodes: usize,
    pub egraph_classes: usize,
    pub applied: IndexMap<String, usize>,
    pub search_time: f64,
    pub apply_time: f64,
    pub rebuild_time: f64,
    pub total_time: f64,
    pub stop_reason: Option<StopReason>,
}

/// Summary across an entire run, summed from its [`Iteration`]s.
#[derive(Debug, Clone)]
pub struct Report {
    pub iterations: usize,
    pub stop_reason: StopReason,
    pub egraph_nodes: usize,
    pub egraph_classes: usize,
    pub total_time: f64,
    pub search_time: f64,
    pub apply_time: f64,
    pub rebuild_time: f64,
}

impl Display for Report {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "Runner report")?;
        writeln!(f, "=============")?;
        writeln!(f, "  Stop reason: {:?}", self.stop_reason)?;
        writeln!(f, "  Iterations: {}", self.iterations)?;
        writeln!(f, "  Egraph size: {} nodes, {} classes", self.egraph_nodes, self.egraph_classes)?;
        writeln!(f, "  Total time: {:.6}s", self.total_time)?;
        writeln!(f, "    Search:  {:.6}s", self.search_time)?;
        writeln!(f, "    Apply:   {:.6}s", self.apply_time)?;
        writeln!(f, "    Rebuild: {:.6}s", self.rebuild_time)?;
        Ok(())
    }
}

/// Customizes which rules are searched each iteration, per `spec.md` §5's
/// "resource model" — kept from the teacher's `RewriteScheduler` trait.
pub trait RewriteScheduler {
    fn can_stop(&mut self, iteration: usize) -> bool {
        true
    }
    fn should_search(&mut self, iteration: usize, rule_name: &str) -> bool {
        let _ = (iteration, rule_name);
        true
    }
    fn record_matches(&mut self, iteration: usize, rule_name: &str, n_matches: usize) {
        let _ = (iteration, rule_name, n_matches);
    }
}

/// Runs every rule, every iteration. Turns off scheduling entirely.
#[derive(Debug, Default)]
pub struct SimpleScheduler;
impl RewriteScheduler for SimpleScheduler {}

#[derive(Debug)]
struct RuleStats {
    banned_until: usize,
    times_banned: u32,
    match_limit: usize,
    ban_length: usize,
}

/// Exponential backoff scheduler: a rule producing more than `match_limit`
/// matches in one iteration is banned for `ban_length` iterations, doubling
/// both thresholds each time it is re-banned. Ported from the teacher's
/// `BackoffScheduler` — explosive rules over AC operators (associativity-
/// shaped rewrites) are exactly what this guards against.
#[derive(Debug)]
pub struct BackoffScheduler {
    default_match_limit: usize,
    default_ban_length: usize,
    stats: HashMap<String, RuleStats>,
}

impl Default for BackoffScheduler {
    fn default() -> Self {
        BackoffScheduler { default_match_limit: 1_000, default_ban_length: 5, stats: HashMap::default() }
    }
}

impl BackoffScheduler {
    pub fn with_initial_match_limit(mut self, limit: usize) -> Self {
        self.default_match_limit = limit;
        self
    }

    pub fn with_ban_length(mut self, ban_length: usize) -> Self {
        self.default_ban_length = ban_length;
        self
    }

    fn stats_for(&mut self, name: &str) -> &mut RuleStats {
        self.stats.entry(name.to_owned()).or_insert_with(|| RuleStats {
            banned_until: 0,
            times_banned: 0,
            match_limit: self.default_match_limit,
            ban_length: self.default_ban_length,
        })
    }
}

impl RewriteScheduler for BackoffScheduler {
    fn can_stop(&mut self, iteration: usize) -> bool {
        !self.stats.values().any(|s| s.banned_until > iteration)
    }

    fn should_search(&mut self, iteration: usize, rule_name: &str) -> bool {
        let stats = self.stats_for(rule_name);
        if iteration < stats.banned_until {
            debug!("skipping {rule_name} (banned until {})", stats.banned_until);
            return false;
        }
        true
    }

    fn record_matches(&mut self, iteration: usize, rule_name: &str, n_matches: usize) {
        let stats = self.stats_for(rule_name);
        let threshold = stats.match_limit << stats.times_banned;
        if n_matches > threshold {
            let ban_length = stats.ban_length << stats.times_banned;
            stats.times_banned += 1;
            stats.banned_until = iteration + ban_length;
            info!("banning {rule_name} for {ban_length} iterations: {n_matches} > {threshold}");
        }
    }
}

/// Either the e-graph reached a fixpoint, or a resource limit was hit first.
#[derive(Debug, Clone)]
pub enum SaturationOutcome {
    Saturated,
    IterLimit,
}

/// Drives equality saturation over an [`EGraph`]: compiles `theory`'s rules
/// once, then repeatedly searches/applies/rebuilds until saturated or a
/// limit fires.
pub struct Runner {
    pub egraph: EGraph,
    rules: Vec<CompiledRule>,
    pub iterations: Vec<Iteration>,
    pub stop_reason: Option<StopReason>,
    iter_limit: usize,
    node_limit: usize,
    time_limit: Duration,
    start_time: Option<Instant>,
    scheduler: Box<dyn RewriteScheduler>,
}

impl Runner {
    /// Builds a runner over a fresh e-graph for `theory`, compiling every
    /// rule the theory currently holds. Rules added to `theory` after this
    /// call are not picked up (`spec.md` §7's "incremental rule addition
    /// after saturation has begun" Non-goal).
    pub fn new(theory: &Theory) -> Self {
        let egraph = EGraph::new(theory);
        let mut compiler = Compiler::new(theory);
        let rules = theory
            .rules()
            .iter()
            .map(|r| {
                let (query, subst) = compiler
                    .compile(r)
                    .unwrap_or_else(|e| panic!("rule {:?} failed to compile: {e}", r.name));
                CompiledRule { name: r.name.clone(), query, subst }
            })
            .collect();
        Runner {
            egraph,
            rules,
            iterations: Vec::new(),
            stop_reason: None,
            iter_limit: 30,
            node_limit: 10_000,
            time_limit: Duration::from_secs(5),
            start_time: None,
            scheduler: Box::<BackoffScheduler>::default(),
        }
    }

    pub fn with_iter_limit(mut self, iter_limit: usize) -> Self {
        self.iter_limit = iter_limit;
        self
    }

    pub fn with_node_limit(mut self, node_limit: usize) -> Self {
        self.node_limit = node_limit;
        self
    }

    pub fn with_time_limit(mut self, time_limit: Duration) -> Self {
        self.time_limit = time_limit;
        self
    }

    pub fn with_scheduler(mut self, scheduler: impl RewriteScheduler + 'static) -> Self {
        self.scheduler = Box::new(scheduler);
        self
    }

    /// Runs iterations until a [`StopReason`] is produced. Limits are
    /// checked *before* each iteration, so `with_iter_limit(0)` never runs a
    /// single search/apply/rebuild pass — `saturate(0)` is a true no-op.
    pub fn run(mut self) -> Self {
        self.egraph.rebuild();
        self.try_start();
        loop {
            if let Err(reason) = self.check_limits() {
                info!("stopping: {reason:?}");
                self.stop_reason = Some(reason);
                break;
            }
            let iter = self.run_one();
            let stop = iter.stop_reason.clone();
            self.iterations.push(iter);
            if let Some(reason) = stop {
                info!("stopping: {reason:?}");
                self.stop_reason = Some(reason);
                break;
            }
        }
        self
    }

    pub fn outcome(&self) -> SaturationOutcome {
        match self.stop_reason {
            Some(StopReason::Saturated) => SaturationOutcome::Saturated,
            _ => SaturationOutcome::IterLimit,
        }
    }

    pub fn report(&self) -> Report {
        Report {
            stop_reason: self.stop_reason.clone().expect("report() called before run() finished"),
            iterations: self.iterations.len(),
            egraph_nodes: self.egraph.node_count(),
            egraph_classes: self.egraph.class_count(),
            search_time: self.iterations.iter().map(|i| i.search_time).sum(),
            apply_time: self.iterations.iter().map(|i| i.apply_time).sum(),
            rebuild_time: self.iterations.iter().map(|i| i.rebuild_time).sum(),
            total_time: self.iterations.iter().map(|i| i.total_time).sum(),
        }
    }

    fn try_start(&mut self) {
        self.start_time.get_or_insert_with(Instant::now);
    }

    fn check_limits(&self) -> Result<(), StopReason> {
        let elapsed = self.start_time.expect("try_start always runs before check_limits").elapsed();
        if elapsed > self.time_limit {
            return Err(StopReason::TimeLimit(elapsed.as_secs_f64()));
        }
        let nodes = self.egraph.node_count();
        if nodes > self.node_limit {
            return Err(StopReason::NodeLimit(nodes));
        }
        if self.iterations.len() >= self.iter_limit {
            return Err(StopReason::IterationLimit(self.iterations.len()));
        }
        Ok(())
    }

    fn run_one(&mut self) -> Iteration {
        assert!(self.stop_reason.is_none());
        self.try_start();
        let i = self.iterations.len();
        trace!("iteration {i}\n{}", self.egraph.dump());

        let egraph_nodes = self.egraph.node_count();
        let egraph_classes = self.egraph.class_count();

        let total_start = Instant::now();
        let search_start = Instant::now();
        let mut per_rule: Vec<(usize, Vec<Vec<ClassId>>)> = Vec::new();
        for (r, rule) in self.rules.iter().enumerate() {
            if !self.scheduler.should_search(i, &rule.name) {
                continue;
            }
            let mut engine = Engine::prepare(&rule.query, &self.egraph);
            let matches = engine.run(&mut self.egraph);
            self.scheduler.record_matches(i, &rule.name, matches.len());
            per_rule.push((r, matches));
        }
        let search_time = search_start.elapsed().as_secs_f64();

        let apply_start = Instant::now();
        let mut applied: IndexMap<String, usize> = IndexMap::default();
        let mut any_unified = false;
        for (r, matches) in per_rule {
            let rule = &self.rules[r];
            let root_pos = rule.subst.root_position();
            let mut count = 0usize;
            for m in matches {
                let resolved: Vec<ClassId> =
                    m.iter().map(|&id| self.egraph.resolve_ephemeral(id)).collect();
                let old_root = resolved[root_pos];
                let new_root = rule.subst.instantiate(&resolved, &mut |op, children| {
                    self.egraph.add_enode(op, children)
                });
                if self.egraph.canonicalize(old_root) != self.egraph.canonicalize(new_root) {
                    self.egraph.unify(old_root, new_root);
                    any_unified = true;
                }
                count += 1;
            }
            if count > 0 {
                applied.insert(rule.name.clone(), count);
            }
        }
        self.egraph.clear_ephemeral();
        let apply_time = apply_start.elapsed().as_secs_f64();

        let rebuild_start = Instant::now();
        let rebuild_changed = self.egraph.rebuild();
        let rebuild_time = rebuild_start.elapsed().as_secs_f64();

        let made_progress = any_unified || rebuild_changed;
        let mut result = Ok(());
        if !made_progress && self.scheduler.can_stop(i) {
            result = Err(StopReason::Saturated);
        }

        Iteration {
            egraph_nodes,
            egraph_classes,
            applied,
            search_time,
            apply_time,
            rebuild_time,
            total_time: total_start.elapsed().as_secs_f64(),
            stop_reason: result.err(),
        }
    }
}

/// A cost function usable by [`Extractor`]: computes a node's cost from its
/// children's already-known costs. Mirrors the teacher's `CostFunction`.
pub trait CostFunction {
    type Cost: PartialOrd + Debug + Clone;

    fn cost<C>(&mut self, enode: &ENode, costs: C) -> Self::Cost
    where
        C: FnMut(ClassId) -> Self::Cost;
}

/// Total AST node count.
#[derive(Debug, Default)]
pub struct AstSize;
impl CostFunction for AstSize {
    type Cost = usize;
    fn cost<C>(&mut self, enode: &ENode, mut costs: C) -> Self::Cost
    where
        C: FnMut(ClassId) -> Self::Cost,
    {
        enode.children.iter().fold(1, |sum, &id| sum.saturating_add(costs(id)))
    }
}

/// Maximum AST depth.
#[derive(Debug, Default)]
pub struct AstDepth;
impl CostFunction for AstDepth {
    type Cost = usize;
    fn cost<C>(&mut self, enode: &ENode, mut costs: C) -> Self::Cost
    where
        C: FnMut(ClassId) -> Self::Cost,
    {
        1 + enode.children.iter().map(|&id| costs(id)).max().unwrap_or(0)
    }
}

fn cmp<T: PartialOrd>(a: &T, b: &T) -> Ordering {
    a.partial_cmp(b).expect("CostFunction::Cost must be totally ordered for the values produced")
}

/// Picks, for every e-class reachable from the memo, the cheapest e-node
/// according to a [`CostFunction`], and can rebuild a [`RecExpr`] from that
/// choice. A Non-goal *of saturation itself* (`spec.md` §7); this is a
/// read-only pass run after the fact, kept from the teacher's `run.rs`.
pub struct Extractor<'a, CF: CostFunction> {
    egraph: &'a EGraph,
    cost_function: CF,
    costs: HashMap<ClassId, (CF::Cost, ENode)>,
}

impl<'a, CF: CostFunction> Extractor<'a, CF> {
    pub fn new(egraph: &'a EGraph, cost_function: CF) -> Self {
        let mut extractor = Extractor { egraph, cost_function, costs: HashMap::default() };
        extractor.find_costs();
        extractor
    }

    fn enodes_by_class(&self) -> HashMap<ClassId, Vec<ENode>> {
        let mut by_class: HashMap<ClassId, Vec<ENode>> = HashMap::default();
        for (enode, &class) in self.egraph.memo().iter() {
            by_class.entry(class).or_default().push(enode.clone());
        }
        by_class
    }

    fn find_costs(&mut self) {
        let by_class = self.enodes_by_class();
        let mut changed = true;
        while changed {
            changed = false;
            for (&class, enodes) in &by_class {
                if let Some(best) = self.cheapest(enodes) {
                    let better = match self.costs.get(&class) {
                        None => true,
                        Some((old, _)) => cmp(&best.0, old) == Ordering::Less,
                    };
                    if better {
                        self.costs.insert(class, best);
                        changed = true;
                    }
                }
            }
        }
        for class in by_class.keys() {
            if !self.costs.contains_key(class) {
                warn!("could not compute an extraction cost for {class:?}");
            }
        }
    }

    fn cheapest(&mut self, enodes: &[ENode]) -> Option<(CF::Cost, ENode)> {
        enodes
            .iter()
            .filter_map(|n| self.node_cost(n).map(|c| (c, n.clone())))
            .min_by(|a, b| cmp(&a.0, &b.0))
    }

    fn node_cost(&mut self, enode: &ENode) -> Option<CF::Cost> {
        if enode.children.iter().all(|id| self.costs.contains_key(id)) {
            let costs = &self.costs;
            Some(self.cost_function.cost(enode, |id| costs[&id].0.clone()))
        } else {
            None
        }
    }

    pub fn find_best_cost(&self, class: ClassId) -> CF::Cost {
        self.costs[&class].0.clone()
    }

    /// Builds the cheapest [`RecExpr`] rooted at `class`.
    pub fn find_best(&self, class: ClassId) -> (CF::Cost, RecExpr) {
        let mut expr = RecExpr::new();
        let mut memo = HashMap::default();
        let cost = self.costs[&class].0.clone();
        self.build_rec(class, &mut expr, &mut memo);
        (cost, expr)
    }

    fn build_rec(
        &self,
        class: ClassId,
        expr: &mut RecExpr,
        memo: &mut HashMap<ClassId, crate::language::RecId>,
    ) -> crate::language::RecId {
        if let Some(&id) = memo.get(&class) {
            return id;
        }
        let (_, node) = &self.costs[&class];
        let children: Vec<_> = node.children.iter().map(|&c| self.build_rec(c, expr, memo)).collect();
        let id = expr.add(AstNode::new(node.op, children));
        memo.insert(class, id);
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::Arity;

    /// `x` is a pattern variable symbol (never inserted as a ground node);
    /// `var_op` is a real 0-ary operator standing in for "some variable
    /// term", the ground witness used to instantiate `x` in tests.
    fn mul_one_theory()
    -> (Theory, crate::id::Symbol, crate::id::Symbol, crate::id::Symbol, crate::id::Symbol) {
        use crate::language::Expr;
        let mut t = Theory::new();
        let x = t.add_opaque_operator(Arity::Fixed(0));
        let one = t.add_operator("one", Arity::Fixed(0));
        let var_op = t.add_operator("var", Arity::Fixed(0));
        let mul = t.add_operator("mul", Arity::Fixed(2));
        let lhs = Expr::op(mul, vec![Expr::var(x), Expr::leaf(one)]);
        t.add_rewrite_rule("mul_one", lhs, Expr::var(x)).unwrap();
        (t, x, one, var_op, mul)
    }

    #[test]
    fn saturates_a_single_application_of_mul_one() {
        let (theory, _x, one, var_op, mul) = mul_one_theory();
        let mut runner = Runner::new(&theory);
        let a = runner.egraph.add_enode(var_op, vec![]);
        let o = runner.egraph.add_enode(one, vec![]);
        let m = runner.egraph.add_enode(mul, vec![a, o]);
        let runner = runner.run();
        assert!(matches!(runner.outcome(), SaturationOutcome::Saturated));
        assert!(runner.egraph.is_equiv(m, a));
    }

    #[test]
    fn iteration_limit_stops_a_runaway_rule() {
        // `f(?x) -> f(f(?x))` always matches its own output with a fresh
        // class, so the egraph never saturates; the iteration cap must stop it.
        use crate::language::Expr;
        let mut theory = Theory::new();
        let x = theory.add_opaque_operator(Arity::Fixed(0));
        let leaf = theory.add_operator("leaf", Arity::Fixed(0));
        let f = theory.add_operator("f", Arity::Fixed(1));
        theory
            .add_rewrite_rule(
                "grow",
                Expr::op(f, vec![Expr::var(x)]),
                Expr::op(f, vec![Expr::op(f, vec![Expr::var(x)])]),
            )
            .unwrap();
        let mut runner = Runner::new(&theory).with_iter_limit(3);
        let l = runner.egraph.add_enode(leaf, vec![]);
        runner.egraph.add_enode(f, vec![l]);
        let runner = runner.run();
        assert_eq!(runner.iterations.len(), 3);
        assert!(matches!(runner.stop_reason, Some(StopReason::IterationLimit(3))));
    }

    #[test]
    fn extractor_prefers_the_smaller_representative() {
        use crate::language::Expr;
        let mut theory = Theory::new();
        let a = theory.add_operator("a", Arity::Fixed(0));
        let f = theory.add_operator("f", Arity::Fixed(1));
        theory.add_rewrite_rule("noop", Expr::leaf(a), Expr::leaf(a)).unwrap();
        let mut egraph = EGraph::new(&theory);
        let ca = egraph.add_enode(a, vec![]);
        let cf = egraph.add_enode(f, vec![ca]);
        egraph.unify(ca, cf);
        egraph.rebuild();
        let extractor = Extractor::new(&egraph, AstSize);
        let (cost, _expr) = extractor.find_best(egraph.canonicalize(ca));
        assert_eq!(cost, 1); // picks the leaf `a`, not `f(a)`
    }
}
