//! Dot chart: per-grammar incremental recognition of rule source sides.
//!
//! A `DotNode` records that some prefix of a trie path has been matched over
//! a span, together with the supernodes consumed for its nonterminals. The
//! dot chart is seeded with a root item on every diagonal cell and grows by
//! extending items across terminal arcs and completed supernodes.

use crate::cell::Cell;
use crate::chart::ChartSpan;
use crate::grammar::{Grammar, TrieId};
use crate::hypergraph::NodeArena;
use crate::lattice::{Lattice, SourcePath};
use crate::matcher::NonterminalMatcher;
use crate::vocab::SymId;
use rustc_hash::FxHashSet;
use std::rc::Rc;

/// Non-owning reference to a supernode: the cell span plus the lhs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SuperNodeRef {
    pub i: usize,
    pub j: usize,
    pub lhs: SymId,
}

/// A partial rule match: trie position reached over `(i,j)` plus the
/// antecedent supernodes consumed so far, one per nonterminal edge walked.
/// The antecedents' spans tile `(i,j)` left to right.
#[derive(Clone, Debug)]
pub struct DotNode {
    pub i: usize,
    pub j: usize,
    pub trie: TrieId,
    pub antecedents: Vec<SuperNodeRef>,
    pub path: SourcePath,
}

impl DotNode {
    /// Fresh item at a grammar's trie root, nothing consumed yet.
    pub fn root(i: usize, trie: TrieId) -> Self {
        DotNode {
            i,
            j: i,
            trie,
            antecedents: Vec::new(),
            path: SourcePath::new(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.i == self.j && self.antecedents.is_empty()
    }
}

/// Dot items over one span, deduplicated by `(trie node, antecedents)`.
#[derive(Debug, Default)]
pub struct DotCell {
    nodes: Vec<DotNode>,
    seen: FxHashSet<(TrieId, Vec<SuperNodeRef>)>,
}

impl DotCell {
    pub fn dot_nodes(&self) -> &[DotNode] {
        &self.nodes
    }

    fn insert(&mut self, node: DotNode) -> bool {
        if self.seen.insert((node.trie, node.antecedents.clone())) {
            self.nodes.push(node);
            true
        } else {
            false
        }
    }
}

/// Per-grammar partial-match accumulator.
pub struct DotChart {
    grammar: Rc<dyn Grammar>,
    matcher: Rc<NonterminalMatcher>,
    cells: ChartSpan<DotCell>,
    n_dotitems: usize,
}

impl DotChart {
    /// Create the dot chart and seed a root item on every diagonal.
    pub fn new(grammar: Rc<dyn Grammar>, matcher: Rc<NonterminalMatcher>, n: usize) -> Self {
        let mut chart = DotChart {
            grammar,
            matcher,
            cells: ChartSpan::new(n),
            n_dotitems: 0,
        };
        for i in 0..n {
            let root = DotNode::root(i, chart.grammar.root());
            chart.add_dot_item(root);
        }
        chart
    }

    pub fn dot_cell(&self, i: usize, j: usize) -> Option<&DotCell> {
        self.cells.get(i, j)
    }

    pub fn n_dotitems(&self) -> usize {
        self.n_dotitems
    }

    /// Extend every item ending at some `k < j` into `(i,j)`, across either
    /// a terminal arc `(k,j)` or a supernode of `Cell(k,j)`.
    pub fn expand_dot_cell(
        &mut self,
        i: usize,
        j: usize,
        lattice: &Lattice,
        cells: &mut ChartSpan<Cell>,
        arena: &NodeArena,
    ) {
        let mut extensions = Vec::new();

        for k in i..j {
            if self.cells.get(i, k).map_or(true, |dc| dc.nodes.is_empty()) {
                continue;
            }

            // Terminal arcs (k, j) of distance 1.
            if lattice.distance(k, j) == 1.0 {
                let source = self.cells.get(i, k).unwrap();
                for arc in &lattice.node(k).outgoing {
                    if arc.head != j {
                        continue;
                    }
                    for dn in &source.nodes {
                        if let Some(child) = self.grammar.node(dn.trie).match_terminal(arc.label) {
                            extensions.push(DotNode {
                                i,
                                j,
                                trie: child,
                                antecedents: dn.antecedents.clone(),
                                path: dn.path.extend(arc),
                            });
                        }
                    }
                }
            }

            // Supernodes of Cell(k, j), in lhs order for determinism.
            if let Some(cell) = cells.get_mut(k, j) {
                let supers = cell.super_nodes(arena);
                let mut lhss: Vec<SymId> = supers.keys().copied().collect();
                lhss.sort_unstable();
                let source = self.cells.get(i, k).unwrap();
                for lhs in lhss {
                    for dn in &source.nodes {
                        let node = self.grammar.node(dn.trie);
                        for child in self.matcher.matching_children(node, lhs) {
                            let mut antecedents = dn.antecedents.clone();
                            antecedents.push(SuperNodeRef { i: k, j, lhs });
                            extensions.push(DotNode {
                                i,
                                j,
                                trie: child,
                                antecedents,
                                path: dn.path.extend_nonterminal(),
                            });
                        }
                    }
                }
            }
        }

        for dn in extensions {
            self.add_dot_item(dn);
        }
    }

    /// Register items whose first symbol is a nonterminal spanning `(i,j)`,
    /// consuming the now-complete supernodes of that cell from the root.
    pub fn start_dot_items(
        &mut self,
        i: usize,
        j: usize,
        cells: &mut ChartSpan<Cell>,
        arena: &NodeArena,
    ) {
        let Some(cell) = cells.get_mut(i, j) else {
            return;
        };
        let supers = cell.super_nodes(arena);
        let mut lhss: Vec<SymId> = supers.keys().copied().collect();
        lhss.sort_unstable();

        let root = self.grammar.root();
        let mut extensions = Vec::new();
        for lhs in lhss {
            for child in self
                .matcher
                .matching_children(self.grammar.node(root), lhs)
            {
                extensions.push(DotNode {
                    i,
                    j,
                    trie: child,
                    antecedents: vec![SuperNodeRef { i, j, lhs }],
                    path: SourcePath::new(),
                });
            }
        }
        for dn in extensions {
            self.add_dot_item(dn);
        }
    }

    fn add_dot_item(&mut self, node: DotNode) {
        let (i, j) = (node.i, node.j);
        let cell = self.cells.get_or_insert_with(i, j, DotCell::default);
        if cell.insert(node) {
            self.n_dotitems += 1;
            log::trace!("dot item added over ({}, {})", i, j);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::ChartStats;
    use crate::feature::NodeResult;
    use crate::grammar::{MemoryGrammar, Rule, SrcSym, TgtSym};
    use crate::vocab::Vocabulary;

    fn grammar_with(vocab: &Vocabulary, lines: &[&str]) -> Rc<dyn Grammar> {
        let mut grammar = MemoryGrammar::new();
        for line in lines {
            grammar.add_rule(crate::parse::parse_rule(vocab, line).unwrap());
        }
        Rc::new(grammar)
    }

    fn put_node(
        cells: &mut ChartSpan<Cell>,
        arena: &mut NodeArena,
        vocab: &Vocabulary,
        lhs: &str,
        i: usize,
        j: usize,
        score: f64,
    ) {
        let rule = Rc::new(Rule::new(
            vocab.id(lhs),
            vec![SrcSym::Terminal(vocab.id("w"))],
            vec![TgtSym::Terminal(vocab.id("w"))],
            vec![score],
        ));
        let result = NodeResult {
            transition_cost: score,
            viterbi_cost: score,
            future_cost: 0.0,
            states: Vec::new(),
        };
        let mut stats = ChartStats::default();
        cells
            .get_or_insert_with(i, j, || Cell::new(i, j, vocab.id("GOAL")))
            .add_hyper_edge(
                arena,
                result,
                Some(rule),
                vec![],
                SourcePath::new(),
                false,
                None,
                &mut stats,
            );
    }

    #[test]
    fn test_seeded_roots() {
        let vocab = Rc::new(Vocabulary::new());
        let grammar = grammar_with(&vocab, &["[X] ||| a ||| a ||| 0"]);
        let chart = DotChart::new(
            grammar,
            Rc::new(NonterminalMatcher::for_grammar(false, Rc::clone(&vocab))),
            3,
        );

        for i in 0..3 {
            let cell = chart.dot_cell(i, i).unwrap();
            assert_eq!(cell.dot_nodes().len(), 1);
            assert!(cell.dot_nodes()[0].is_root());
        }
        assert_eq!(chart.n_dotitems(), 3);
    }

    #[test]
    fn test_terminal_extension() {
        let vocab = Rc::new(Vocabulary::new());
        let grammar = grammar_with(&vocab, &["[X] ||| a b ||| a b ||| 0"]);
        let lattice = Lattice::linear(&vocab.ids("a b"));
        let mut cells: ChartSpan<Cell> = ChartSpan::new(2);
        let arena = NodeArena::new();

        let mut dots = DotChart::new(
            grammar,
            Rc::new(NonterminalMatcher::for_grammar(false, Rc::clone(&vocab))),
            2,
        );
        dots.expand_dot_cell(0, 1, &lattice, &mut cells, &arena);
        dots.expand_dot_cell(1, 2, &lattice, &mut cells, &arena);
        dots.expand_dot_cell(0, 2, &lattice, &mut cells, &arena);

        // "a" matched over (0,1), then "a b" over (0,2).
        assert_eq!(dots.dot_cell(0, 1).unwrap().dot_nodes().len(), 1);
        let full = dots.dot_cell(0, 2).unwrap();
        assert_eq!(full.dot_nodes().len(), 1);
        assert!(full.dot_nodes()[0].antecedents.is_empty());

        // Expanding again is a no-op thanks to dedup.
        let before = dots.n_dotitems();
        dots.expand_dot_cell(0, 2, &lattice, &mut cells, &arena);
        assert_eq!(dots.n_dotitems(), before);
    }

    #[test]
    fn test_start_dot_items_consume_supernodes() {
        let vocab = Rc::new(Vocabulary::new());
        let grammar = grammar_with(&vocab, &["[S] ||| [X,1] [X,2] ||| [X,1] [X,2] ||| 0"]);
        let mut cells: ChartSpan<Cell> = ChartSpan::new(2);
        let mut arena = NodeArena::new();
        let lattice = Lattice::linear(&vocab.ids("a b"));

        put_node(&mut cells, &mut arena, &vocab, "X", 0, 1, -1.0);
        put_node(&mut cells, &mut arena, &vocab, "X", 1, 2, -2.0);

        let mut dots = DotChart::new(
            grammar,
            Rc::new(NonterminalMatcher::for_grammar(false, Rc::clone(&vocab))),
            2,
        );

        // First symbol [X] over (0,1).
        dots.start_dot_items(0, 1, &mut cells, &arena);
        let started = dots.dot_cell(0, 1).unwrap();
        assert_eq!(started.dot_nodes().len(), 1);
        assert_eq!(
            started.dot_nodes()[0].antecedents,
            vec![SuperNodeRef { i: 0, j: 1, lhs: vocab.id("X") }]
        );

        // Second symbol [X] over (1,2) completes the rule at (0,2).
        dots.expand_dot_cell(0, 2, &lattice, &mut cells, &arena);
        let full = dots.dot_cell(0, 2).unwrap();
        assert_eq!(full.dot_nodes().len(), 1);
        assert_eq!(full.dot_nodes()[0].antecedents.len(), 2);
    }
}
