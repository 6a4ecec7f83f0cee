//! Translation hypergraph: or-nodes, and-edges, and the arena that owns them.
//!
//! All `HGNode`s produced while decoding one sentence live in a single
//! `NodeArena` owned by the chart. Cells, supernodes, dot items, and edges
//! refer to nodes through copyable `NodeId` indices, so there is no shared
//! mutable ownership and the whole forest is released at once. Spans strictly
//! decrease along tails, so the graph is acyclic by construction.

use crate::feature::DpState;
use crate::grammar::Rule;
use crate::lattice::SourcePath;
use crate::vocab::SymId;
use std::ops::{Index, IndexMut};
use std::rc::Rc;

/// Arena index of an `HGNode`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// One derivation option: a rule applied to ordered tail nodes ("and-node").
///
/// `rule` is `None` only for the synthetic edges into the goal node.
#[derive(Clone, Debug)]
pub struct HyperEdge {
    pub rule: Option<Rc<Rule>>,
    pub tails: Vec<NodeId>,
    pub source_path: SourcePath,
    pub transition_cost: f64,
}

/// A choice point labeled by span, lhs, and dynamic-programming states
/// ("or-node"). Never exists without at least one incoming edge.
#[derive(Clone, Debug)]
pub struct HGNode {
    pub i: usize,
    pub j: usize,
    pub lhs: SymId,
    pub states: Rc<[DpState]>,
    pub edges: Vec<HyperEdge>,
    /// Index into `edges` of the Viterbi-best incoming edge.
    pub best_edge: usize,
    /// Viterbi score of the best derivation of this node.
    pub score: f64,
}

impl HGNode {
    pub fn new(
        i: usize,
        j: usize,
        lhs: SymId,
        states: Rc<[DpState]>,
        edge: HyperEdge,
        score: f64,
    ) -> Self {
        HGNode {
            i,
            j,
            lhs,
            states,
            edges: vec![edge],
            best_edge: 0,
            score,
        }
    }

    pub fn span(&self) -> (usize, usize) {
        (self.i, self.j)
    }

    /// Merge another incoming edge, keeping the Viterbi maximum.
    pub fn add_edge(&mut self, edge: HyperEdge, viterbi: f64) {
        self.edges.push(edge);
        if viterbi > self.score {
            self.score = viterbi;
            self.best_edge = self.edges.len() - 1;
        }
    }

    pub fn best_hyper_edge(&self) -> &HyperEdge {
        &self.edges[self.best_edge]
    }
}

/// Per-sentence owner of every `HGNode`.
#[derive(Debug, Default)]
pub struct NodeArena {
    nodes: Vec<HGNode>,
}

impl NodeArena {
    pub fn new() -> Self {
        NodeArena::default()
    }

    pub fn push(&mut self, node: HGNode) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    pub fn get(&self, id: NodeId) -> &HGNode {
        &self.nodes[id.index()]
    }

    pub fn get_mut(&mut self, id: NodeId) -> &mut HGNode {
        &mut self.nodes[id.index()]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &HGNode)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(idx, node)| (NodeId(idx as u32), node))
    }
}

impl Index<NodeId> for NodeArena {
    type Output = HGNode;

    fn index(&self, id: NodeId) -> &HGNode {
        self.get(id)
    }
}

impl IndexMut<NodeId> for NodeArena {
    fn index_mut(&mut self, id: NodeId) -> &mut HGNode {
        self.get_mut(id)
    }
}

/// The decoded forest: the arena plus the single goal root.
#[derive(Debug)]
pub struct HyperGraph {
    arena: NodeArena,
    root: NodeId,
    sentence_id: usize,
}

impl HyperGraph {
    pub fn new(arena: NodeArena, root: NodeId, sentence_id: usize) -> Self {
        HyperGraph {
            arena,
            root,
            sentence_id,
        }
    }

    pub fn root_id(&self) -> NodeId {
        self.root
    }

    pub fn root(&self) -> &HGNode {
        &self.arena[self.root]
    }

    pub fn node(&self, id: NodeId) -> &HGNode {
        &self.arena[id]
    }

    /// Viterbi score of the 1-best derivation.
    pub fn best_score(&self) -> f64 {
        self.root().score
    }

    pub fn num_nodes(&self) -> usize {
        self.arena.len()
    }

    /// All nodes of the forest in arena (creation) order.
    pub fn nodes(&self) -> impl Iterator<Item = &HGNode> {
        self.arena.iter().map(|(_, node)| node)
    }

    pub fn sentence_id(&self) -> usize {
        self.sentence_id
    }
}
