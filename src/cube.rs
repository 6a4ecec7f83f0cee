//! Cube pruning: bounded best-first expansion over the lattice of
//! rule x tail-node choices for one span.
//!
//! A state pins one rule (rank 0) and one node per antecedent supernode
//! (ranks 1..R). The agenda is a max-heap on the pruning score with a
//! monotone insertion counter for deterministic tie-breaking, plus a
//! visited set: the same cube point is reachable along multiple axes and
//! must be pushed at most once. Monotonicity of the scores is not assumed.

use crate::feature::NodeResult;
use crate::grammar::Rule;
use crate::hypergraph::NodeId;
use crate::lattice::SourcePath;
use ordered_float::OrderedFloat;
use priority_queue::PriorityQueue;
use rustc_hash::{FxHashMap, FxHashSet};
use std::cmp::Reverse;
use std::rc::Rc;

/// One point of the (R+1)-dimensional cube.
#[derive(Clone, Debug)]
pub struct CubePruneState {
    pub result: NodeResult,
    /// 1-based position per dimension: `ranks[0]` into `rules`,
    /// `ranks[k]` into `ants[k-1]`.
    pub ranks: Vec<u32>,
    /// Sorted rules of the originating dot node.
    pub rules: Rc<Vec<Rc<Rule>>>,
    /// Antecedent node lists, 1-best first.
    pub ants: Rc<Vec<Vec<NodeId>>>,
    /// Tail nodes selected by `ranks`.
    pub tails: Vec<NodeId>,
    pub path: SourcePath,
    /// Identity of the originating dot node within this span's expansion.
    pub dot: u32,
}

/// State identity: originating dot node plus cube coordinates.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct StateKey {
    dot: u32,
    ranks: Box<[u32]>,
}

impl CubePruneState {
    /// The all-ones corner of a dot node's cube: best rule, 1-best tails.
    pub fn seed(
        dot: u32,
        result: NodeResult,
        rules: Rc<Vec<Rc<Rule>>>,
        ants: Rc<Vec<Vec<NodeId>>>,
        path: SourcePath,
    ) -> Self {
        let tails = ants.iter().map(|nodes| nodes[0]).collect();
        CubePruneState {
            result,
            ranks: vec![1; 1 + ants.len()],
            rules,
            ants,
            tails,
            path,
            dot,
        }
    }

    pub fn rule(&self) -> &Rc<Rule> {
        &self.rules[self.ranks[0] as usize - 1]
    }

    fn key(&self) -> StateKey {
        StateKey {
            dot: self.dot,
            ranks: self.ranks.clone().into_boxed_slice(),
        }
    }

    /// Neighbor coordinates one step along each axis, skipping those that
    /// run off the end of their dimension. Yields `(ranks, rule, tails)`.
    pub fn successors(&self) -> Vec<(Vec<u32>, Rc<Rule>, Vec<NodeId>)> {
        let mut out = Vec::new();
        for k in 0..self.ranks.len() {
            let mut ranks = self.ranks.clone();
            ranks[k] += 1;

            let in_bounds = if k == 0 {
                ranks[0] as usize <= self.rules.len()
            } else {
                ranks[k] as usize <= self.ants[k - 1].len()
            };
            if !in_bounds {
                continue;
            }

            let rule = Rc::clone(&self.rules[ranks[0] as usize - 1]);
            let tails = self
                .ants
                .iter()
                .enumerate()
                .map(|(x, nodes)| nodes[ranks[x + 1] as usize - 1])
                .collect();
            out.push((ranks, rule, tails));
        }
        out
    }
}

/// Priority: pruning score descending, then insertion order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct CubePriority {
    score: OrderedFloat<f64>,
    seq: Reverse<u64>,
}

/// The per-span cube-pruning agenda.
#[derive(Default)]
pub struct CubePruner {
    heap: PriorityQueue<StateKey, CubePriority>,
    states: FxHashMap<StateKey, CubePruneState>,
    visited: FxHashSet<StateKey>,
    seq: u64,
    next_dot: u32,
}

impl CubePruner {
    pub fn new() -> Self {
        CubePruner::default()
    }

    /// Allocate the identity for the next seeded dot node.
    pub fn next_dot_id(&mut self) -> u32 {
        let id = self.next_dot;
        self.next_dot += 1;
        id
    }

    /// Push a state unless its identity has been pushed before.
    pub fn push(&mut self, state: CubePruneState) -> bool {
        let key = state.key();
        if !self.visited.insert(key.clone()) {
            return false;
        }
        let priority = CubePriority {
            score: OrderedFloat(state.result.pruning_score()),
            seq: Reverse(self.seq),
        };
        self.seq += 1;
        self.heap.push(key.clone(), priority);
        self.states.insert(key, state);
        true
    }

    /// Pop the best state; total and deterministic order.
    pub fn pop(&mut self) -> Option<CubePruneState> {
        let (key, _) = self.heap.pop()?;
        self.states.remove(&key)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::{SrcSym, TgtSym};
    use crate::hypergraph::{HGNode, HyperEdge, NodeArena};
    use crate::vocab::SymId;

    fn result(score: f64) -> NodeResult {
        NodeResult {
            transition_cost: score,
            viterbi_cost: score,
            future_cost: 0.0,
            states: Vec::new(),
        }
    }

    fn rule(lhs: SymId, score: f64) -> Rc<Rule> {
        Rc::new(Rule::new(
            lhs,
            vec![SrcSym::Nonterminal(9)],
            vec![TgtSym::Nonterminal(1)],
            vec![score],
        ))
    }

    fn leaf(arena: &mut NodeArena, score: f64) -> NodeId {
        let edge = HyperEdge {
            rule: None,
            tails: Vec::new(),
            source_path: SourcePath::new(),
            transition_cost: score,
        };
        arena.push(HGNode::new(0, 1, 1, Rc::from(Vec::new()), edge, score))
    }

    #[test]
    fn test_pop_order_score_then_insertion() {
        let mut pruner = CubePruner::new();
        let rules = Rc::new(vec![rule(1, 0.0)]);
        let ants: Rc<Vec<Vec<NodeId>>> = Rc::new(Vec::new());

        for (dot, score) in [(0u32, -2.0), (1, -1.0), (2, -1.0)] {
            pruner.push(CubePruneState::seed(
                dot,
                result(score),
                Rc::clone(&rules),
                Rc::clone(&ants),
                SourcePath::new(),
            ));
        }

        // Best score first; equal scores pop in insertion order.
        assert_eq!(pruner.pop().unwrap().dot, 1);
        assert_eq!(pruner.pop().unwrap().dot, 2);
        assert_eq!(pruner.pop().unwrap().dot, 0);
        assert!(pruner.pop().is_none());
    }

    #[test]
    fn test_visited_rejects_duplicate_push() {
        let mut pruner = CubePruner::new();
        let rules = Rc::new(vec![rule(1, 0.0)]);
        let ants: Rc<Vec<Vec<NodeId>>> = Rc::new(Vec::new());

        let state = CubePruneState::seed(
            0,
            result(-1.0),
            Rc::clone(&rules),
            Rc::clone(&ants),
            SourcePath::new(),
        );
        assert!(pruner.push(state.clone()));
        assert!(!pruner.push(state));
        assert_eq!(pruner.len(), 1);
    }

    #[test]
    fn test_successors_respect_bounds() {
        let mut arena = NodeArena::new();
        let n1 = leaf(&mut arena, -1.0);
        let n2 = leaf(&mut arena, -2.0);

        let rules = Rc::new(vec![rule(1, 0.0), rule(1, -0.5)]);
        let ants = Rc::new(vec![vec![n1, n2]]);
        let seed = CubePruneState::seed(
            0,
            result(-1.0),
            Rc::clone(&rules),
            Rc::clone(&ants),
            SourcePath::new(),
        );

        let successors = seed.successors();
        // One step along the rule axis, one along the tail axis.
        assert_eq!(successors.len(), 2);
        assert_eq!(successors[0].0, vec![2, 1]);
        assert!(Rc::ptr_eq(&successors[0].1, &rules[1]));
        assert_eq!(successors[0].2, vec![n1]);
        assert_eq!(successors[1].0, vec![1, 2]);
        assert_eq!(successors[1].2, vec![n2]);

        // The far corner has no successors.
        let corner = CubePruneState {
            result: result(-3.0),
            ranks: vec![2, 2],
            rules,
            ants,
            tails: vec![n2],
            path: SourcePath::new(),
            dot: 0,
        };
        assert!(corner.successors().is_empty());
    }
}
