//! Synchronous grammar: rules, rule collections, and the source-side trie.
//!
//! A grammar indexes its rules by their source right-hand side in a trie.
//! Each trie node optionally carries the collection of rules whose source
//! side ends there, plus labeled edges for terminals and nonterminals.
//! Grammars are built up front, then read-only during decoding; rule sorting
//! is lazy per collection and cached.

use crate::feature::FeatureFunction;
use crate::vocab::SymId;
use ordered_float::OrderedFloat;
use rustc_hash::FxHashMap;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// One symbol of a rule's source right-hand side.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SrcSym {
    Terminal(SymId),
    Nonterminal(SymId),
}

/// One symbol of a rule's target right-hand side. Nonterminal references are
/// 1-based indices into the source-side nonterminals.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TgtSym {
    Terminal(SymId),
    Nonterminal(usize),
}

/// An immutable synchronous rule.
#[derive(Debug)]
pub struct Rule {
    pub lhs: SymId,
    pub source: Vec<SrcSym>,
    pub target: Vec<TgtSym>,
    pub feature_scores: Vec<f64>,
    /// Number of nonterminals in the source side.
    pub arity: usize,
    estimate: Cell<Option<f64>>,
}

impl Rule {
    pub fn new(lhs: SymId, source: Vec<SrcSym>, target: Vec<TgtSym>, feature_scores: Vec<f64>) -> Self {
        let arity = source
            .iter()
            .filter(|s| matches!(s, SrcSym::Nonterminal(_)))
            .count();
        Rule {
            lhs,
            source,
            target,
            feature_scores,
            arity,
            estimate: Cell::new(None),
        }
    }

    /// Stable estimated score used for sorting within a collection.
    ///
    /// Cached after the first call; the feature set is fixed for the lifetime
    /// of a decoder, so the cache never goes stale.
    pub fn estimate(&self, ffs: &[Box<dyn FeatureFunction>]) -> f64 {
        if let Some(e) = self.estimate.get() {
            return e;
        }
        let e = ffs.iter().map(|ff| ff.estimate(self)).sum();
        self.estimate.set(Some(e));
        e
    }
}

/// All rules sharing one source right-hand side pattern.
#[derive(Debug, Default)]
pub struct RuleCollection {
    rules: Vec<Rc<Rule>>,
    arity: usize,
    sorted: RefCell<Option<Rc<Vec<Rc<Rule>>>>>,
}

impl RuleCollection {
    fn new(arity: usize) -> Self {
        RuleCollection {
            rules: Vec::new(),
            arity,
            sorted: RefCell::new(None),
        }
    }

    fn push(&mut self, rule: Rc<Rule>) {
        self.rules.push(rule);
        *self.sorted.borrow_mut() = None;
    }

    pub fn arity(&self) -> usize {
        self.arity
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rules sorted by estimated score descending, ties broken by insertion
    /// order. The sorted view is shared so cube-pruning states can hold it
    /// without copying.
    pub fn sorted_rules(&self, ffs: &[Box<dyn FeatureFunction>]) -> Rc<Vec<Rc<Rule>>> {
        if let Some(sorted) = self.sorted.borrow().as_ref() {
            return Rc::clone(sorted);
        }
        let mut rules = self.rules.clone();
        // Vec::sort_by is stable, which gives the insertion-order tie-break.
        rules.sort_by(|a, b| {
            OrderedFloat(b.estimate(ffs)).cmp(&OrderedFloat(a.estimate(ffs)))
        });
        let rc = Rc::new(rules);
        *self.sorted.borrow_mut() = Some(Rc::clone(&rc));
        rc
    }
}

/// Index of a trie node within its grammar.
pub type TrieId = usize;

/// One node of the source-side trie.
#[derive(Debug, Default)]
pub struct TrieNode {
    term_edges: FxHashMap<SymId, TrieId>,
    nt_edges: FxHashMap<SymId, TrieId>,
    rules: Option<RuleCollection>,
}

impl TrieNode {
    pub fn match_terminal(&self, sym: SymId) -> Option<TrieId> {
        self.term_edges.get(&sym).copied()
    }

    /// Exact-id nonterminal lookup; regexp grammars go through the matcher.
    pub fn match_nonterminal(&self, sym: SymId) -> Option<TrieId> {
        self.nt_edges.get(&sym).copied()
    }

    pub fn nonterminal_edges(&self) -> impl Iterator<Item = (SymId, TrieId)> + '_ {
        self.nt_edges.iter().map(|(&sym, &id)| (sym, id))
    }

    pub fn has_extensions(&self) -> bool {
        !self.term_edges.is_empty() || !self.nt_edges.is_empty()
    }

    pub fn has_nonterminal_extensions(&self) -> bool {
        !self.nt_edges.is_empty()
    }

    pub fn rules(&self) -> Option<&RuleCollection> {
        self.rules.as_ref()
    }

    /// Whether this node ends at least one rule's source side.
    pub fn has_rules(&self) -> bool {
        self.rules.as_ref().map_or(false, |rc| !rc.is_empty())
    }
}

/// Capability interface the chart consumes.
pub trait Grammar {
    fn root(&self) -> TrieId;

    fn node(&self, id: TrieId) -> &TrieNode;

    /// Whether nonterminal edge labels are regular expressions.
    fn is_regexp(&self) -> bool;

    /// Whether this grammar can produce rules over a span with the given
    /// lattice path length.
    fn has_rule_for_span(&self, i: usize, j: usize, path_length: f64) -> bool;

    fn num_rules(&self) -> usize;
}

/// Trie-indexed in-memory grammar.
#[derive(Debug)]
pub struct MemoryGrammar {
    nodes: Vec<TrieNode>,
    span_limit: Option<usize>,
    regexp: bool,
    num_rules: usize,
}

impl Default for MemoryGrammar {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryGrammar {
    pub fn new() -> Self {
        MemoryGrammar {
            nodes: vec![TrieNode::default()],
            span_limit: None,
            regexp: false,
            num_rules: 0,
        }
    }

    /// Limit rule application to spans whose lattice path length does not
    /// exceed `limit`. Glue grammars typically leave this unset.
    pub fn with_span_limit(mut self, limit: usize) -> Self {
        self.span_limit = Some(limit);
        self
    }

    /// Mark nonterminal edge labels as regular expressions.
    pub fn with_regexp(mut self) -> Self {
        self.regexp = true;
        self
    }

    /// Insert a rule, extending the trie along its source side.
    pub fn add_rule(&mut self, rule: Rule) -> Rc<Rule> {
        let mut at = 0;
        for sym in &rule.source {
            at = match *sym {
                SrcSym::Terminal(t) => self.child(at, t, false),
                SrcSym::Nonterminal(nt) => self.child(at, nt, true),
            };
        }
        let arity = rule.arity;
        let rc = Rc::new(rule);
        self.nodes[at]
            .rules
            .get_or_insert_with(|| RuleCollection::new(arity))
            .push(Rc::clone(&rc));
        self.num_rules += 1;
        rc
    }

    pub fn add_rules(&mut self, rules: impl IntoIterator<Item = Rule>) {
        for rule in rules {
            self.add_rule(rule);
        }
    }

    fn child(&mut self, at: TrieId, sym: SymId, nonterminal: bool) -> TrieId {
        let next = self.nodes.len();
        let edges = if nonterminal {
            &mut self.nodes[at].nt_edges
        } else {
            &mut self.nodes[at].term_edges
        };
        match edges.get(&sym) {
            Some(&id) => id,
            None => {
                edges.insert(sym, next);
                self.nodes.push(TrieNode::default());
                next
            }
        }
    }
}

impl Grammar for MemoryGrammar {
    fn root(&self) -> TrieId {
        0
    }

    fn node(&self, id: TrieId) -> &TrieNode {
        &self.nodes[id]
    }

    fn is_regexp(&self) -> bool {
        self.regexp
    }

    fn has_rule_for_span(&self, _i: usize, _j: usize, path_length: f64) -> bool {
        match self.span_limit {
            None => true,
            Some(limit) => path_length <= limit as f64,
        }
    }

    fn num_rules(&self) -> usize {
        self.num_rules
    }
}
