//! The chart parser: CKY and CKY+ decoding drivers.
//!
//! Spans are processed width-first (CKY with dot charts) or right-to-left
//! with in-place trie matching (CKY+, after Sennrich 2014). Within one span
//! the sub-steps run in a fixed order, cube-pruning pop order is stable,
//! and all node allocations go through the chart-owned arena, so decoding
//! is fully deterministic for identical inputs and configuration.

use crate::cell::Cell;
use crate::config::DecoderConfig;
use crate::constraint::StateConstraint;
use crate::cube::{CubePruneState, CubePruner};
use crate::dotchart::{DotChart, DotNode, SuperNodeRef};
use crate::feature::{compute_node_result, FeatureFunction};
use crate::grammar::{Grammar, Rule};
use crate::hypergraph::{HyperGraph, NodeArena, NodeId};
use crate::lattice::SourcePath;
use crate::matcher::NonterminalMatcher;
use crate::sentence::Sentence;
use crate::vocab::{SymId, Vocabulary};
use rustc_hash::FxHashSet;
use std::collections::VecDeque;
use std::rc::Rc;

/// Dense triangular store holding at most one `T` per span `(i, j)`,
/// `0 <= i <= j <= n`. The diagonal is used by the dot charts only.
#[derive(Debug)]
pub struct ChartSpan<T> {
    entries: Vec<Option<T>>,
    n: usize,
}

impl<T> ChartSpan<T> {
    pub fn new(n: usize) -> Self {
        ChartSpan {
            entries: (0..(n + 1) * (n + 1)).map(|_| None).collect(),
            n,
        }
    }

    fn idx(&self, i: usize, j: usize) -> usize {
        debug_assert!(i <= j && j <= self.n, "span ({}, {}) out of range", i, j);
        i * (self.n + 1) + j
    }

    pub fn get(&self, i: usize, j: usize) -> Option<&T> {
        let idx = self.idx(i, j);
        self.entries[idx].as_ref()
    }

    pub fn get_mut(&mut self, i: usize, j: usize) -> Option<&mut T> {
        let idx = self.idx(i, j);
        self.entries[idx].as_mut()
    }

    pub fn get_or_insert_with(&mut self, i: usize, j: usize, f: impl FnOnce() -> T) -> &mut T {
        let idx = self.idx(i, j);
        self.entries[idx].get_or_insert_with(f)
    }
}

/// Counters reported after decoding.
#[derive(Clone, Copy, Debug, Default)]
pub struct ChartStats {
    /// Nodes newly added to cells.
    pub n_added: usize,
    /// Edges merged into existing nodes, plus beam-dropped candidates.
    pub n_merged: usize,
    /// Dot items registered across all dot charts.
    pub n_dotitems: usize,
}

/// The chart parser for one sentence.
pub struct Chart {
    sentence: Sentence,
    ffs: Vec<Box<dyn FeatureFunction>>,
    grammars: Vec<Rc<dyn Grammar>>,
    matchers: Vec<Rc<NonterminalMatcher>>,
    dotcharts: Vec<DotChart>,
    cells: ChartSpan<Cell>,
    arena: NodeArena,
    goal_bin: Cell,
    goal_sym: SymId,
    constraint: Option<StateConstraint>,
    config: DecoderConfig,
    stats: ChartStats,
    n: usize,
}

impl Chart {
    /// Build the chart and seed the per-grammar dot charts.
    ///
    /// Stateful features receive their state index and every feature gets its
    /// `set_source` hook here, before any scoring happens. A forced target on
    /// the sentence switches on constrained decoding.
    pub fn new(
        sentence: Sentence,
        mut ffs: Vec<Box<dyn FeatureFunction>>,
        grammars: Vec<Rc<dyn Grammar>>,
        goal_symbol: &str,
        vocab: Rc<Vocabulary>,
        config: DecoderConfig,
    ) -> Self {
        let n = sentence.len();

        let mut next_state = 0;
        for ff in ffs.iter_mut() {
            if ff.is_stateful() {
                ff.assign_state_index(next_state);
                next_state += 1;
            }
            ff.set_source(&sentence);
        }

        let constraint = sentence.target().map(|target| {
            let mut wrapped = Vec::with_capacity(target.len() + 2);
            wrapped.push(vocab.start_id());
            wrapped.extend_from_slice(target);
            wrapped.push(vocab.stop_id());
            StateConstraint::new(wrapped)
        });

        let matchers: Vec<Rc<NonterminalMatcher>> = grammars
            .iter()
            .map(|g| {
                Rc::new(NonterminalMatcher::for_grammar(
                    g.is_regexp(),
                    Rc::clone(&vocab),
                ))
            })
            .collect();
        let dotcharts = grammars
            .iter()
            .zip(&matchers)
            .map(|(g, m)| DotChart::new(Rc::clone(g), Rc::clone(m), n))
            .collect();

        let goal_sym = vocab.id(goal_symbol);
        log::debug!("finished seeding chart for input {}", sentence.id());

        Chart {
            sentence,
            ffs,
            grammars,
            matchers,
            dotcharts,
            cells: ChartSpan::new(n),
            arena: NodeArena::new(),
            goal_bin: Cell::new(0, n, goal_sym),
            goal_sym,
            constraint,
            config,
            stats: ChartStats::default(),
            n,
        }
    }

    /// Override the goal symbol by id. Must be called before expanding.
    pub fn set_goal_symbol_id(&mut self, id: SymId) {
        self.goal_sym = id;
        self.goal_bin = Cell::new(0, self.n, id);
    }

    pub fn stats(&self) -> ChartStats {
        self.stats
    }

    /// The cell for `(i, j)`, created lazily.
    pub fn get_cell(&mut self, i: usize, j: usize) -> &Cell {
        debug_assert!(i < j && j <= self.n);
        let goal_sym = self.goal_sym;
        self.cells
            .get_or_insert_with(i, j, || Cell::new(i, j, goal_sym))
    }

    /// Run the strategy selected by the configuration.
    pub fn decode(self) -> Option<HyperGraph> {
        if self.config.use_dot_chart {
            self.expand()
        } else {
            self.expand_sans_dot_chart()
        }
    }

    /// CKY decoding with dot charts: widths ascending, per span the fixed
    /// order dot-expand, cube-complete, unary, dot-seed, sort.
    pub fn expand(mut self) -> Option<HyperGraph> {
        let n = self.n;
        for width in 1..=n {
            for i in 0..=n - width {
                let j = i + width;
                if self.config.cancelled() {
                    log::warn!("decoding of input {} cancelled", self.sentence.id());
                    return None;
                }
                if self.sentence.lattice().distance(i, j).is_infinite() {
                    continue;
                }
                log::trace!("processing span ({}, {})", i, j);

                {
                    let Chart {
                        dotcharts,
                        cells,
                        arena,
                        sentence,
                        ..
                    } = &mut self;
                    for dc in dotcharts.iter_mut() {
                        dc.expand_dot_cell(i, j, sentence.lattice(), cells, arena);
                    }
                }

                self.complete_span(i, j);
                self.add_unary_nodes(i, j);

                {
                    let Chart {
                        dotcharts,
                        grammars,
                        cells,
                        arena,
                        sentence,
                        ..
                    } = &mut self;
                    let dist = sentence.lattice().distance(i, j);
                    for (dc, grammar) in dotcharts.iter_mut().zip(grammars.iter()) {
                        if grammar.has_rule_for_span(i, j, dist) {
                            dc.start_dot_items(i, j, cells, arena);
                        }
                    }
                }

                {
                    let Chart { cells, arena, .. } = &mut self;
                    if let Some(cell) = cells.get_mut(i, j) {
                        cell.ensure_sorted(arena);
                    }
                }
            }
        }
        self.finish_goal()
    }

    /// CKY+ decoding without dot charts: spans anchored at `i` from right to
    /// left, trie matches recomputed in place, candidates accumulated per
    /// width and cube-pruned when their span comes up.
    pub fn expand_sans_dot_chart(mut self) -> Option<HyperGraph> {
        let n = self.n;
        for i in (0..n).rev() {
            if self.config.cancelled() {
                log::warn!("decoding of input {} cancelled", self.sentence.id());
                return None;
            }

            let mut all_candidates: Vec<CubePruner> =
                (0..=n - i).map(|_| CubePruner::new()).collect();

            self.seed_preterminals(i);

            for j in i + 1..=n {
                if !self.sentence.has_path(i, j) {
                    continue;
                }
                for g in 0..self.grammars.len() {
                    let root = DotNode::root(i, self.grammars[g].root());
                    self.consume(g, &root, j - 1, &mut all_candidates);
                }
                let pruner = std::mem::replace(&mut all_candidates[j - i], CubePruner::new());
                self.apply_cube_pruning(i, j, pruner);
                self.add_unary_nodes(i, j);
            }
        }
        self.finish_goal()
    }

    /// Inject a terminal production directly into `Cell(i, j)`.
    pub fn add_axiom(
        &mut self,
        i: usize,
        j: usize,
        rule: Rc<Rule>,
        path: SourcePath,
    ) -> Option<NodeId> {
        let Chart {
            ffs,
            cells,
            arena,
            sentence,
            stats,
            goal_sym,
            ..
        } = self;
        let result = compute_node_result(ffs, &rule, &[], arena, i, j, path, sentence);
        let cell = cells.get_or_insert_with(i, j, || Cell::new(i, j, *goal_sym));
        cell.add_hyper_edge(arena, result, Some(rule), Vec::new(), path, false, None, stats)
    }

    /// Collect the completed dot items over `(i, j)` and cube-prune them
    /// into the cell. Terminal productions bypass the cube.
    fn complete_span(&mut self, i: usize, j: usize) {
        let mut pruner = CubePruner::new();
        self.seed_candidates(i, j, &mut pruner);
        self.apply_cube_pruning(i, j, pruner);
    }

    fn seed_candidates(&mut self, i: usize, j: usize, pruner: &mut CubePruner) {
        let Chart {
            grammars,
            dotcharts,
            ffs,
            cells,
            arena,
            sentence,
            constraint,
            stats,
            config,
            goal_sym,
            ..
        } = self;
        let dist = sentence.lattice().distance(i, j);

        for (grammar, dotchart) in grammars.iter().zip(dotcharts.iter()) {
            if !grammar.has_rule_for_span(i, j, dist) {
                continue;
            }
            let Some(dot_cell) = dotchart.dot_cell(i, j) else {
                continue;
            };

            for dn in dot_cell.dot_nodes() {
                let Some(collection) = grammar.node(dn.trie).rules() else {
                    continue;
                };
                if collection.is_empty() {
                    continue;
                }
                let rules = collection.sorted_rules(ffs);
                let path = dn.path;

                if collection.arity() == 0 {
                    // Terminal productions go straight into the cell.
                    for rule in rules.iter() {
                        let result =
                            compute_node_result(ffs, rule, &[], arena, i, j, path, sentence);
                        if constraint
                            .as_ref()
                            .map_or(true, |c| c.is_legal(&result.states))
                        {
                            let cell =
                                cells.get_or_insert_with(i, j, || Cell::new(i, j, *goal_sym));
                            cell.add_hyper_edge(
                                arena,
                                result,
                                Some(Rc::clone(rule)),
                                Vec::new(),
                                path,
                                true,
                                config.beam_width,
                                stats,
                            );
                        }
                    }
                } else {
                    let Some(ants) = resolve_antecedents(cells, &dn.antecedents) else {
                        continue;
                    };
                    let ants = Rc::new(ants);
                    let tails: Vec<NodeId> = ants.iter().map(|nodes| nodes[0]).collect();
                    let result =
                        compute_node_result(ffs, &rules[0], &tails, arena, i, j, path, sentence);
                    let dot = pruner.next_dot_id();
                    pruner.push(CubePruneState::seed(dot, result, rules, ants, path));
                }
            }
        }
    }

    /// Pop up to `pop_limit` states off the cube agenda, admitting each into
    /// the cell and pushing its unvisited neighbors.
    fn apply_cube_pruning(&mut self, i: usize, j: usize, mut pruner: CubePruner) {
        let Chart {
            ffs,
            cells,
            arena,
            sentence,
            constraint,
            stats,
            config,
            goal_sym,
            ..
        } = self;
        let pop_limit = config.pop_limit;
        let mut pops = 0usize;

        while pop_limit == 0 || pops < pop_limit {
            let Some(state) = pruner.pop() else {
                break;
            };
            pops += 1;

            if constraint
                .as_ref()
                .map_or(true, |c| c.is_legal(&state.result.states))
            {
                let cell = cells.get_or_insert_with(i, j, || Cell::new(i, j, *goal_sym));
                cell.add_hyper_edge(
                    arena,
                    state.result.clone(),
                    Some(Rc::clone(state.rule())),
                    state.tails.clone(),
                    state.path,
                    true,
                    config.beam_width,
                    stats,
                );
            }

            for (ranks, rule, tails) in state.successors() {
                let result =
                    compute_node_result(ffs, &rule, &tails, arena, i, j, state.path, sentence);
                pruner.push(CubePruneState {
                    result,
                    ranks,
                    rules: Rc::clone(&state.rules),
                    ants: Rc::clone(&state.ants),
                    tails,
                    path: state.path,
                    dot: state.dot,
                });
            }
        }
    }

    /// Agenda-based unary closure over `Cell(i, j)`.
    ///
    /// Each lhs is expanded at most once; a cheaper unary chain revisiting an
    /// already-expanded lhs is deliberately not reopened. Returns the number
    /// of nodes enqueued beyond the initial frontier.
    fn add_unary_nodes(&mut self, i: usize, j: usize) -> usize {
        let Chart {
            grammars,
            ffs,
            cells,
            arena,
            sentence,
            stats,
            config,
            ..
        } = self;
        let Some(cell) = cells.get_mut(i, j) else {
            return 0;
        };
        let dist = sentence.lattice().distance(i, j);

        let mut queue: VecDeque<NodeId> = cell.sorted_nodes(arena).iter().copied().collect();
        let mut seen: FxHashSet<SymId> = FxHashSet::default();
        let mut added = 0;
        log::trace!("adding unary items to ({}, {})", i, j);

        while let Some(node_id) = queue.pop_front() {
            let lhs = arena[node_id].lhs;
            seen.insert(lhs);

            for grammar in grammars.iter() {
                if !grammar.has_rule_for_span(i, j, dist) {
                    continue;
                }
                let root = grammar.node(grammar.root());
                let Some(child) = root.match_nonterminal(lhs) else {
                    continue;
                };
                let Some(collection) = grammar.node(child).rules() else {
                    continue;
                };
                if collection.arity() != 1 || collection.is_empty() {
                    continue;
                }

                for rule in collection.sorted_rules(ffs).iter() {
                    let result = compute_node_result(
                        ffs,
                        rule,
                        &[node_id],
                        arena,
                        i,
                        j,
                        SourcePath::new(),
                        sentence,
                    );
                    let added_node = cell.add_hyper_edge(
                        arena,
                        result,
                        Some(Rc::clone(rule)),
                        vec![node_id],
                        SourcePath::new(),
                        true,
                        config.beam_width,
                        stats,
                    );
                    if let Some(new_id) = added_node {
                        if !seen.contains(&arena[new_id].lhs) {
                            queue.push_back(new_id);
                            added += 1;
                        }
                    }
                }
            }
        }
        added
    }

    /// CKY+ preterminal seeding: every outgoing arc of node `i` whose label
    /// reaches a rule-bearing trie child becomes a chart entry directly.
    fn seed_preterminals(&mut self, i: usize) {
        let Chart {
            grammars,
            ffs,
            cells,
            arena,
            sentence,
            constraint,
            stats,
            goal_sym,
            ..
        } = self;

        for grammar in grammars.iter() {
            for arc in &sentence.node(i).outgoing {
                let root = grammar.node(grammar.root());
                let Some(child_id) = root.match_terminal(arc.label) else {
                    continue;
                };
                let child = grammar.node(child_id);
                let Some(collection) = child.rules() else {
                    continue;
                };
                if collection.is_empty() {
                    continue;
                }
                let j = arc.head;
                let path = SourcePath::new().extend(arc);

                for rule in collection.sorted_rules(ffs).iter() {
                    let result = compute_node_result(ffs, rule, &[], arena, i, j, path, sentence);
                    if constraint
                        .as_ref()
                        .map_or(true, |c| c.is_legal(&result.states))
                    {
                        let cell = cells.get_or_insert_with(i, j, || Cell::new(i, j, *goal_sym));
                        cell.add_hyper_edge(
                            arena,
                            result,
                            Some(Rc::clone(rule)),
                            Vec::new(),
                            path,
                            false,
                            None,
                            stats,
                        );
                    }
                }
            }
        }
    }

    /// CKY+ trie consumption: extend a partial match to end point `l` across
    /// a terminal arc or any matching supernode of `Cell(dn.j, l)`, then
    /// recurse to every later extension point.
    fn consume(&mut self, g: usize, dn: &DotNode, l: usize, all_candidates: &mut [CubePruner]) {
        let i = dn.i;
        let j = dn.j;
        let first = dn.is_root();

        // Terminal arcs (j, l).
        if self.sentence.lattice().distance(j, l) == 1.0 {
            let mut extended = Vec::new();
            {
                let node = self.grammars[g].node(dn.trie);
                for arc in &self.sentence.node(j).outgoing {
                    if arc.head != l {
                        continue;
                    }
                    if let Some(child) = node.match_terminal(arc.label) {
                        extended.push(DotNode {
                            i,
                            j: l,
                            trie: child,
                            antecedents: dn.antecedents.clone(),
                            path: dn.path.extend(arc),
                        });
                    }
                }
            }
            for new_dn in extended {
                self.add_to_chart(g, &new_dn, first, all_candidates);
            }
        }

        // Supernodes over (j, l), in lhs order.
        if self.grammars[g].node(dn.trie).has_nonterminal_extensions() {
            let mut extended = Vec::new();
            {
                let Chart {
                    grammars,
                    matchers,
                    cells,
                    arena,
                    ..
                } = &mut *self;
                if let Some(cell) = cells.get_mut(j, l) {
                    let supers = cell.super_nodes(arena);
                    let mut lhss: Vec<SymId> = supers.keys().copied().collect();
                    lhss.sort_unstable();

                    let node = grammars[g].node(dn.trie);
                    for lhs in lhss {
                        for child in matchers[g].matching_children(node, lhs) {
                            let mut antecedents = dn.antecedents.clone();
                            antecedents.push(SuperNodeRef { i: j, j: l, lhs });
                            extended.push(DotNode {
                                i,
                                j: l,
                                trie: child,
                                antecedents,
                                path: dn.path.extend_nonterminal(),
                            });
                        }
                    }
                }
            }
            for new_dn in extended {
                self.add_to_chart(g, &new_dn, first, all_candidates);
            }
        }
    }

    /// Record a completed match as a cube candidate (unless it is a unary or
    /// preterminal item, which other machinery owns) and keep consuming.
    fn add_to_chart(
        &mut self,
        g: usize,
        dn: &DotNode,
        first: bool,
        all_candidates: &mut [CubePruner],
    ) {
        if !first && self.grammars[g].node(dn.trie).has_rules() {
            self.add_to_candidates(g, dn, all_candidates);
        }
        for l in dn.j + 1..=self.n {
            self.consume(g, dn, l, all_candidates);
        }
    }

    fn add_to_candidates(&mut self, g: usize, dn: &DotNode, all_candidates: &mut [CubePruner]) {
        let Chart {
            grammars,
            ffs,
            cells,
            arena,
            sentence,
            ..
        } = self;

        let Some(collection) = grammars[g].node(dn.trie).rules() else {
            return;
        };
        if collection.is_empty() {
            return;
        }
        let rules = collection.sorted_rules(ffs);
        let Some(ants) = resolve_antecedents(cells, &dn.antecedents) else {
            return;
        };
        let ants = Rc::new(ants);
        let tails: Vec<NodeId> = ants.iter().map(|nodes| nodes[0]).collect();
        let result =
            compute_node_result(ffs, &rules[0], &tails, arena, dn.i, dn.j, dn.path, sentence);

        let pruner = &mut all_candidates[dn.j - dn.i];
        let dot = pruner.next_dot_id();
        pruner.push(CubePruneState::seed(dot, result, rules, ants, dn.path));
    }

    /// Transition `Cell(0, n)` into the goal bin and wrap up the hypergraph.
    fn finish_goal(mut self) -> Option<HyperGraph> {
        self.stats.n_dotitems = self.dotcharts.iter().map(DotChart::n_dotitems).sum();
        log::debug!(
            "input {}: chart: added {} merged {} dot-items added {}",
            self.sentence.id(),
            self.stats.n_added,
            self.stats.n_merged,
            self.stats.n_dotitems
        );

        let n = self.n;
        let frontier = match self.cells.get_mut(0, n) {
            Some(cell) => cell.sorted_nodes(&self.arena).to_vec(),
            None => Vec::new(),
        };

        let goal_found = !frontier.is_empty() && {
            let Chart {
                goal_bin,
                arena,
                ffs,
                sentence,
                stats,
                ..
            } = &mut self;
            goal_bin.transit_to_goal(arena, &frontier, ffs, sentence, stats)
        };
        if !goal_found {
            log::error!(
                "no complete item in Cell[0,{}]; possible reasons: (1) the grammars have no \
                 valid derivation for the input; (2) too-aggressive pruning",
                n
            );
            return None;
        }

        let root = self.goal_bin.sorted_nodes(&self.arena)[0];
        Some(HyperGraph::new(self.arena, root, self.sentence.id()))
    }
}

/// Look up the node lists of a dot node's antecedent supernodes. The
/// referenced cells are always sub-spans that were sorted when their span
/// finished processing. `None` when any supernode is gone (e.g. pruned).
fn resolve_antecedents(
    cells: &ChartSpan<Cell>,
    antecedents: &[SuperNodeRef],
) -> Option<Vec<Vec<NodeId>>> {
    let mut ants = Vec::with_capacity(antecedents.len());
    for sn in antecedents {
        let sup = cells.get(sn.i, sn.j)?.super_node(sn.lhs)?;
        ants.push(sup.nodes.clone());
    }
    Some(ants)
}
