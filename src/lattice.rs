//! Input word lattice.
//!
//! The source side of a sentence is a DAG over positions `0..=n` whose arcs
//! carry integer word labels. A plain sentence is the degenerate lattice with
//! exactly one arc `(k, k+1)` per word. All-pairs hop distances are
//! precomputed at construction; `distance(i, j) == +inf` means no path and
//! the decoder skips the span entirely.

use crate::vocab::SymId;

/// One labeled arc of the lattice.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LatticeArc {
    /// Integer word label.
    pub label: SymId,
    /// Head node (arc target).
    pub head: usize,
    /// Arc cost contributed to the source path score (0 for plain sentences).
    pub cost: f64,
}

/// A lattice node and its outgoing arcs.
#[derive(Clone, Debug, Default)]
pub struct LatticeNode {
    pub outgoing: Vec<LatticeArc>,
}

/// Accumulated cost of the lattice arcs consumed by a partial rule match.
///
/// Extending across a nonterminal contributes nothing; the antecedent's own
/// edges already carry their arc costs.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SourcePath {
    cost: f64,
}

impl SourcePath {
    pub fn new() -> Self {
        SourcePath::default()
    }

    /// Extend across a terminal arc.
    pub fn extend(self, arc: &LatticeArc) -> SourcePath {
        SourcePath {
            cost: self.cost + arc.cost,
        }
    }

    /// Extend across a completed nonterminal.
    pub fn extend_nonterminal(self) -> SourcePath {
        self
    }

    pub fn cost(self) -> f64 {
        self.cost
    }
}

/// Directed acyclic word lattice over positions `0..=n`.
#[derive(Clone, Debug)]
pub struct Lattice {
    nodes: Vec<LatticeNode>,
    /// dist[i][j]: minimum number of arcs on any path i -> j, +inf if none.
    dist: Vec<Vec<f64>>,
}

impl Lattice {
    /// Build a lattice from explicit arcs `(tail, head, label, cost)` over
    /// `num_nodes` nodes. Arcs must point forward (`tail < head`).
    pub fn from_arcs(num_nodes: usize, arcs: &[(usize, usize, SymId, f64)]) -> Self {
        let mut nodes = vec![LatticeNode::default(); num_nodes];
        for &(tail, head, label, cost) in arcs {
            debug_assert!(tail < head && head < num_nodes);
            nodes[tail].outgoing.push(LatticeArc { label, head, cost });
        }
        let dist = Self::compute_distances(&nodes);
        Lattice { nodes, dist }
    }

    /// The degenerate lattice of a plain token sequence.
    pub fn linear(labels: &[SymId]) -> Self {
        let arcs: Vec<_> = labels
            .iter()
            .enumerate()
            .map(|(k, &label)| (k, k + 1, label, 0.0))
            .collect();
        Self::from_arcs(labels.len() + 1, &arcs)
    }

    /// Number of nodes (one more than the source span length).
    pub fn size(&self) -> usize {
        self.nodes.len()
    }

    pub fn node(&self, k: usize) -> &LatticeNode {
        &self.nodes[k]
    }

    /// Minimum hop count from `i` to `j`, `+inf` when unreachable.
    pub fn distance(&self, i: usize, j: usize) -> f64 {
        self.dist[i][j]
    }

    /// Whether any path connects `i` to `j`.
    pub fn has_path(&self, i: usize, j: usize) -> bool {
        self.dist[i][j].is_finite()
    }

    /// BFS from every node; arcs are forward-only so a single left-to-right
    /// relaxation pass per source suffices.
    fn compute_distances(nodes: &[LatticeNode]) -> Vec<Vec<f64>> {
        let n = nodes.len();
        let mut dist = vec![vec![f64::INFINITY; n]; n];
        for i in 0..n {
            dist[i][i] = 0.0;
            for k in i..n {
                if dist[i][k].is_infinite() {
                    continue;
                }
                for arc in &nodes[k].outgoing {
                    let through = dist[i][k] + 1.0;
                    if through < dist[i][arc.head] {
                        dist[i][arc.head] = through;
                    }
                }
            }
        }
        dist
    }
}
