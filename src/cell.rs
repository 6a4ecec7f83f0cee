//! Per-span hypergraph cell: node merging, supernode bundling, goal transit.
//!
//! A cell owns no nodes (the chart's arena does); it maintains the
//! signature index that makes `(lhs, dp-states)` unique within the span,
//! plus a lazily computed score-descending view of its nodes and the
//! per-lhs supernode bundles derived from it.

use crate::chart::ChartStats;
use crate::feature::{compute_final_cost, DpState, FeatureFunction, NodeResult};
use crate::grammar::Rule;
use crate::hypergraph::{HGNode, HyperEdge, NodeArena, NodeId};
use crate::lattice::SourcePath;
use crate::sentence::Sentence;
use crate::vocab::SymId;
use ordered_float::OrderedFloat;
use rustc_hash::FxHashMap;
use std::rc::Rc;

/// All nodes of one cell sharing an lhs, 1-best first once the cell is
/// sorted. Never empty.
#[derive(Clone, Debug)]
pub struct SuperNode {
    pub lhs: SymId,
    pub nodes: Vec<NodeId>,
}

/// Node identity within a cell.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct NodeSignature {
    lhs: SymId,
    states: Rc<[DpState]>,
}

/// Hypergraph fragment for one span.
#[derive(Debug)]
pub struct Cell {
    i: usize,
    j: usize,
    goal_sym: SymId,
    index: FxHashMap<NodeSignature, NodeId>,
    nodes: Vec<NodeId>,
    sorted: Option<Vec<NodeId>>,
    supers: FxHashMap<SymId, SuperNode>,
    best_score: f64,
}

impl Cell {
    pub fn new(i: usize, j: usize, goal_sym: SymId) -> Self {
        Cell {
            i,
            j,
            goal_sym,
            index: FxHashMap::default(),
            nodes: Vec::new(),
            sorted: None,
            supers: FxHashMap::default(),
            best_score: f64::NEG_INFINITY,
        }
    }

    pub fn span(&self) -> (usize, usize) {
        (self.i, self.j)
    }

    /// Node ids in insertion order.
    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Insert a hyperedge, merging into an existing node when the resulting
    /// `(lhs, dp-states)` identity already exists.
    ///
    /// With `prune_inside_beam`, a would-be new node scoring more than
    /// `beam_width` below the cell's running best is dropped instead.
    /// Returns the affected node, or `None` when beam-pruned.
    pub fn add_hyper_edge(
        &mut self,
        arena: &mut NodeArena,
        result: NodeResult,
        rule: Option<Rc<Rule>>,
        tails: Vec<NodeId>,
        path: SourcePath,
        prune_inside_beam: bool,
        beam_width: Option<f64>,
        stats: &mut ChartStats,
    ) -> Option<NodeId> {
        let lhs = rule.as_ref().map_or(self.goal_sym, |r| r.lhs);
        let states: Rc<[DpState]> = Rc::from(result.states);
        let signature = NodeSignature {
            lhs,
            states: Rc::clone(&states),
        };
        let viterbi = result.viterbi_cost;
        let edge = HyperEdge {
            rule,
            tails,
            source_path: path,
            transition_cost: result.transition_cost,
        };

        self.sorted = None;
        if viterbi > self.best_score {
            self.best_score = viterbi;
        }

        match self.index.get(&signature) {
            Some(&id) => {
                arena[id].add_edge(edge, viterbi);
                stats.n_merged += 1;
                Some(id)
            }
            None => {
                if prune_inside_beam {
                    if let Some(width) = beam_width {
                        if viterbi < self.best_score - width {
                            stats.n_merged += 1;
                            return None;
                        }
                    }
                }
                let id = arena.push(HGNode::new(self.i, self.j, lhs, states, edge, viterbi));
                self.index.insert(signature, id);
                self.nodes.push(id);
                stats.n_added += 1;
                Some(id)
            }
        }
    }

    /// Sort the cell's nodes (score descending, insertion order on ties) and
    /// rebuild the supernode bundles. Cheap when already sorted.
    pub fn ensure_sorted(&mut self, arena: &NodeArena) {
        if self.sorted.is_some() {
            return;
        }
        let mut ids = self.nodes.clone();
        ids.sort_by(|&a, &b| {
            OrderedFloat(arena[b].score)
                .cmp(&OrderedFloat(arena[a].score))
                .then(a.cmp(&b))
        });
        self.supers.clear();
        for &id in &ids {
            let lhs = arena[id].lhs;
            self.supers
                .entry(lhs)
                .or_insert_with(|| SuperNode {
                    lhs,
                    nodes: Vec::new(),
                })
                .nodes
                .push(id);
        }
        self.sorted = Some(ids);
    }

    /// Score-descending node view.
    pub fn sorted_nodes(&mut self, arena: &NodeArena) -> &[NodeId] {
        self.ensure_sorted(arena);
        self.sorted.as_deref().unwrap_or(&[])
    }

    /// Per-lhs supernodes; sorts the cell first.
    pub fn super_nodes(&mut self, arena: &NodeArena) -> &FxHashMap<SymId, SuperNode> {
        self.ensure_sorted(arena);
        &self.supers
    }

    /// Supernode lookup on an already-sorted cell.
    pub fn super_node(&self, lhs: SymId) -> Option<&SuperNode> {
        debug_assert!(self.sorted.is_some(), "cell queried before sorting");
        self.supers.get(&lhs)
    }

    /// Attach a rule-less goal hyperedge for every goal-lhs node of the
    /// frontier. Returns whether any goal node was produced. Used only on
    /// the synthetic goal bin.
    pub fn transit_to_goal(
        &mut self,
        arena: &mut NodeArena,
        frontier: &[NodeId],
        ffs: &[Box<dyn FeatureFunction>],
        sentence: &Sentence,
        stats: &mut ChartStats,
    ) -> bool {
        for &id in frontier {
            if arena[id].lhs != self.goal_sym {
                continue;
            }
            let final_cost = compute_final_cost(ffs, &arena[id], sentence);
            let result = NodeResult::goal(final_cost, arena[id].score + final_cost);
            self.add_hyper_edge(
                arena,
                result,
                None,
                vec![id],
                SourcePath::new(),
                false,
                None,
                stats,
            );
        }
        // Goal edges carry no states, so they all merge into one node.
        debug_assert!(self.nodes.len() <= 1);
        !self.nodes.is_empty()
    }
}
