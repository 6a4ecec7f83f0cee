//! Feature scoring: the capability interface the engine consumes, and the
//! combined per-edge result it produces.
//!
//! Feature functions score rule applications. Stateless features contribute
//! only a cost; stateful features additionally yield an opaque `DpState`
//! that becomes part of node identity (nodes with different states never
//! merge). The engine itself never inspects a state's contents.
//!
//! Scores are log-domain, higher is better.

use crate::grammar::{Rule, TgtSym};
use crate::hypergraph::{HGNode, NodeArena, NodeId};
use crate::lattice::SourcePath;
use crate::sentence::Sentence;
use crate::vocab::SymId;

/// Opaque dynamic-programming state produced by a stateful feature
/// (e.g. language-model boundary words).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DpState(Box<[SymId]>);

impl DpState {
    pub fn new(ids: Vec<SymId>) -> Self {
        DpState(ids.into_boxed_slice())
    }

    pub fn empty() -> Self {
        DpState(Box::new([]))
    }

    pub fn ids(&self) -> &[SymId] {
        &self.0
    }
}

/// A feature function scoring rule applications.
///
/// Stateful implementations must return `Some` state from every call to
/// `transition`, so that the state tuple layout is identical across nodes.
pub trait FeatureFunction {
    fn name(&self) -> &str;

    /// Context-free estimate of a rule's score, used for sorting rules.
    fn estimate(&self, rule: &Rule) -> f64;

    /// Score one application of `rule` over `span` with the given antecedent
    /// nodes; stateful features also produce the resulting state.
    fn transition(
        &self,
        rule: &Rule,
        tails: &[&HGNode],
        span: (usize, usize),
        path: SourcePath,
        sentence: &Sentence,
    ) -> (f64, Option<DpState>);

    /// Outside estimate for a state, added to the pruning score only.
    fn future_cost(&self, _state: &DpState) -> f64 {
        0.0
    }

    /// Cost of the final transition from a goal-lhs node into the goal.
    fn final_transition(&self, _node: &HGNode, _sentence: &Sentence) -> f64 {
        0.0
    }

    fn is_stateful(&self) -> bool {
        false
    }

    /// Position of this feature's state within each node's state tuple.
    fn state_index(&self) -> Option<usize> {
        None
    }

    /// Called once per feature at chart construction, in registration order.
    fn assign_state_index(&mut self, _index: usize) {}

    /// Per-sentence hook, invoked once at chart construction.
    fn set_source(&mut self, _sentence: &Sentence) {}
}

/// Combined scoring result of one candidate hyperedge.
#[derive(Clone, Debug)]
pub struct NodeResult {
    /// Cost contributed by this edge alone.
    pub transition_cost: f64,
    /// `transition_cost` plus the tails' Viterbi scores.
    pub viterbi_cost: f64,
    /// Outside estimate; enters the pruning score, never the Viterbi score.
    pub future_cost: f64,
    /// States of the stateful features, in state-index order.
    pub states: Vec<DpState>,
}

impl NodeResult {
    /// Score the cube-pruning heap orders by.
    pub fn pruning_score(&self) -> f64 {
        self.viterbi_cost + self.future_cost
    }

    /// Result of a rule-less goal transition.
    pub fn goal(transition_cost: f64, viterbi_cost: f64) -> Self {
        NodeResult {
            transition_cost,
            viterbi_cost,
            future_cost: 0.0,
            states: Vec::new(),
        }
    }
}

/// Score a rule application: run every feature, sum costs, collect states.
pub fn compute_node_result(
    ffs: &[Box<dyn FeatureFunction>],
    rule: &Rule,
    tails: &[NodeId],
    arena: &NodeArena,
    i: usize,
    j: usize,
    path: SourcePath,
    sentence: &Sentence,
) -> NodeResult {
    let tail_refs: Vec<&HGNode> = tails.iter().map(|&t| arena.get(t)).collect();

    let mut transition_cost = 0.0;
    let mut future_cost = 0.0;
    let mut states = Vec::new();
    for ff in ffs {
        let (cost, state) = ff.transition(rule, &tail_refs, (i, j), path, sentence);
        transition_cost += cost;
        if let Some(state) = state {
            future_cost += ff.future_cost(&state);
            states.push(state);
        }
    }

    let tail_scores: f64 = tail_refs.iter().map(|t| t.score).sum();
    NodeResult {
        transition_cost,
        viterbi_cost: transition_cost + tail_scores,
        future_cost,
        states,
    }
}

/// Sum of the features' final-transition costs for a goal candidate.
pub fn compute_final_cost(
    ffs: &[Box<dyn FeatureFunction>],
    node: &HGNode,
    sentence: &Sentence,
) -> f64 {
    ffs.iter().map(|ff| ff.final_transition(node, sentence)).sum()
}

/// Weighted dot product of the rule's precomputed feature vector.
#[derive(Clone, Debug)]
pub struct RuleScore {
    weights: Vec<f64>,
}

impl RuleScore {
    pub fn new(weights: Vec<f64>) -> Self {
        RuleScore { weights }
    }

    fn score(&self, rule: &Rule) -> f64 {
        self.weights
            .iter()
            .zip(&rule.feature_scores)
            .map(|(w, s)| w * s)
            .sum()
    }
}

impl FeatureFunction for RuleScore {
    fn name(&self) -> &str {
        "RuleScore"
    }

    fn estimate(&self, rule: &Rule) -> f64 {
        self.score(rule)
    }

    fn transition(
        &self,
        rule: &Rule,
        _tails: &[&HGNode],
        _span: (usize, usize),
        _path: SourcePath,
        _sentence: &Sentence,
    ) -> (f64, Option<DpState>) {
        (self.score(rule), None)
    }
}

/// Per-target-word penalty.
#[derive(Clone, Debug)]
pub struct WordPenalty {
    weight: f64,
}

impl WordPenalty {
    pub fn new(weight: f64) -> Self {
        WordPenalty { weight }
    }

    fn count(rule: &Rule) -> usize {
        rule.target
            .iter()
            .filter(|t| matches!(t, TgtSym::Terminal(_)))
            .count()
    }
}

impl FeatureFunction for WordPenalty {
    fn name(&self) -> &str {
        "WordPenalty"
    }

    fn estimate(&self, rule: &Rule) -> f64 {
        self.weight * Self::count(rule) as f64
    }

    fn transition(
        &self,
        rule: &Rule,
        _tails: &[&HGNode],
        _span: (usize, usize),
        _path: SourcePath,
        _sentence: &Sentence,
    ) -> (f64, Option<DpState>) {
        (self.weight * Self::count(rule) as f64, None)
    }
}

/// Weight on the accumulated lattice arc costs of the source path.
#[derive(Clone, Debug)]
pub struct SourcePathScore {
    weight: f64,
}

impl SourcePathScore {
    pub fn new(weight: f64) -> Self {
        SourcePathScore { weight }
    }
}

impl FeatureFunction for SourcePathScore {
    fn name(&self) -> &str {
        "SourcePath"
    }

    fn estimate(&self, _rule: &Rule) -> f64 {
        0.0
    }

    fn transition(
        &self,
        _rule: &Rule,
        _tails: &[&HGNode],
        _span: (usize, usize),
        path: SourcePath,
        _sentence: &Sentence,
    ) -> (f64, Option<DpState>) {
        (self.weight * path.cost(), None)
    }
}

/// Stateful feature tracking the boundary words of each node's target yield.
///
/// The state is the (first, last) target terminal of the node's 1-best-shaped
/// yield, composed from the rule's target side and the tails' states. Nodes
/// with different boundary words stay distinct in their cell, which is what
/// gives cube pruning something to rank and constrained decoding something
/// to check.
#[derive(Clone, Debug, Default)]
pub struct BoundaryContext {
    index: usize,
}

impl BoundaryContext {
    pub fn new() -> Self {
        BoundaryContext::default()
    }

    fn tail_state<'a>(&self, tail: &'a HGNode) -> Option<&'a DpState> {
        tail.states.get(self.index)
    }
}

impl FeatureFunction for BoundaryContext {
    fn name(&self) -> &str {
        "BoundaryContext"
    }

    fn estimate(&self, _rule: &Rule) -> f64 {
        0.0
    }

    fn transition(
        &self,
        rule: &Rule,
        tails: &[&HGNode],
        _span: (usize, usize),
        _path: SourcePath,
        _sentence: &Sentence,
    ) -> (f64, Option<DpState>) {
        let mut first = None;
        let mut last = None;
        for sym in &rule.target {
            match *sym {
                TgtSym::Terminal(w) => {
                    first.get_or_insert(w);
                    last = Some(w);
                }
                TgtSym::Nonterminal(k) => {
                    if let Some(state) = tails.get(k - 1).and_then(|t| self.tail_state(t)) {
                        if let (Some(&head), Some(&tail)) =
                            (state.ids().first(), state.ids().last())
                        {
                            first.get_or_insert(head);
                            last = Some(tail);
                        }
                    }
                }
            }
        }
        let state = match (first, last) {
            (Some(f), Some(l)) => DpState::new(vec![f, l]),
            _ => DpState::empty(),
        };
        (0.0, Some(state))
    }

    fn is_stateful(&self) -> bool {
        true
    }

    fn state_index(&self) -> Option<usize> {
        Some(self.index)
    }

    fn assign_state_index(&mut self, index: usize) {
        self.index = index;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::SrcSym;
    use crate::hypergraph::HyperEdge;
    use crate::vocab::Vocabulary;
    use std::rc::Rc;

    fn leaf_with_state(
        arena: &mut NodeArena,
        lhs: SymId,
        i: usize,
        j: usize,
        score: f64,
        state: DpState,
    ) -> NodeId {
        let edge = HyperEdge {
            rule: None,
            tails: Vec::new(),
            source_path: SourcePath::new(),
            transition_cost: score,
        };
        arena.push(HGNode::new(i, j, lhs, Rc::from(vec![state]), edge, score))
    }

    #[test]
    fn test_rule_score_dot_product() {
        let vocab = Vocabulary::new();
        let rule = Rule::new(
            vocab.id("X"),
            vec![SrcSym::Terminal(vocab.id("a"))],
            vec![TgtSym::Terminal(vocab.id("b"))],
            vec![2.0, -1.0],
        );
        let ff = RuleScore::new(vec![0.5, 3.0]);

        assert!((ff.estimate(&rule) - (-2.0)).abs() < 1e-12);
    }

    #[test]
    fn test_word_penalty_counts_target_terminals() {
        let vocab = Vocabulary::new();
        let rule = Rule::new(
            vocab.id("X"),
            vec![SrcSym::Nonterminal(vocab.id("X"))],
            vec![
                TgtSym::Terminal(vocab.id("the")),
                TgtSym::Nonterminal(1),
                TgtSym::Terminal(vocab.id("house")),
            ],
            vec![],
        );
        let ff = WordPenalty::new(-1.0);

        assert!((ff.estimate(&rule) - (-2.0)).abs() < 1e-12);
    }

    #[test]
    fn test_compute_node_result_sums_tails() {
        let vocab = Vocabulary::new();
        let sentence = Sentence::from_words(&vocab, 0, "a b");
        let mut arena = NodeArena::new();
        let x = vocab.id("X");
        let t1 = leaf_with_state(&mut arena, x, 0, 1, -1.0, DpState::empty());
        let t2 = leaf_with_state(&mut arena, x, 1, 2, -2.0, DpState::empty());

        let rule = Rule::new(
            vocab.id("S"),
            vec![SrcSym::Nonterminal(x), SrcSym::Nonterminal(x)],
            vec![TgtSym::Nonterminal(1), TgtSym::Nonterminal(2)],
            vec![-0.5],
        );
        let ffs: Vec<Box<dyn FeatureFunction>> = vec![Box::new(RuleScore::new(vec![1.0]))];

        let result = compute_node_result(
            &ffs,
            &rule,
            &[t1, t2],
            &arena,
            0,
            2,
            SourcePath::new(),
            &sentence,
        );
        assert!((result.transition_cost - (-0.5)).abs() < 1e-12);
        assert!((result.viterbi_cost - (-3.5)).abs() < 1e-12);
        assert!(result.states.is_empty());
    }

    #[test]
    fn test_boundary_context_composes_yield() {
        let vocab = Vocabulary::new();
        let sentence = Sentence::from_words(&vocab, 0, "a b");
        let (the, cat, sat) = (vocab.id("the"), vocab.id("cat"), vocab.id("sat"));

        let mut arena = NodeArena::new();
        let x = vocab.id("X");
        let tail = leaf_with_state(
            &mut arena,
            x,
            0,
            1,
            0.0,
            DpState::new(vec![the, cat]),
        );

        // S -> [X,1] sat: yield boundary is (the, sat).
        let rule = Rule::new(
            vocab.id("S"),
            vec![SrcSym::Nonterminal(x), SrcSym::Terminal(vocab.id("s"))],
            vec![TgtSym::Nonterminal(1), TgtSym::Terminal(sat)],
            vec![],
        );
        let ff = BoundaryContext::new();
        let (cost, state) = ff.transition(
            &rule,
            &[&arena[tail]],
            (0, 2),
            SourcePath::new(),
            &sentence,
        );

        assert_eq!(cost, 0.0);
        assert_eq!(state.unwrap().ids(), &[the, sat]);
    }

    #[test]
    fn test_boundary_context_empty_yield() {
        let vocab = Vocabulary::new();
        let sentence = Sentence::from_words(&vocab, 0, "a");
        let rule = Rule::new(
            vocab.id("X"),
            vec![SrcSym::Terminal(vocab.id("a"))],
            vec![],
            vec![],
        );
        let ff = BoundaryContext::new();
        let (_, state) = ff.transition(&rule, &[], (0, 1), SourcePath::new(), &sentence);

        assert!(state.unwrap().ids().is_empty());
    }
}
