//! cubedec: chart decoder for synchronous context-free grammars.
//!
//! This crate provides:
//! - Integerized vocabulary, sentences, and word lattices
//! - Trie-indexed synchronous grammars with a text rule format
//! - Feature scoring interfaces with opaque dynamic-programming states
//! - A CKY chart parser with dot charts and cube pruning, plus the
//!   dot-chart-free CKY+ variant
//! - Translation hypergraphs with Viterbi bookkeeping

pub mod cell;
pub mod chart;
pub mod config;
pub mod constraint;
pub mod cube;
pub mod dotchart;
pub mod feature;
pub mod grammar;
pub mod hypergraph;
pub mod lattice;
pub mod matcher;
pub mod parse;
pub mod sentence;
pub mod vocab;

// Re-exports for convenience
pub use cell::{Cell, SuperNode};
pub use chart::{Chart, ChartSpan, ChartStats};
pub use config::{CancelToken, DecoderConfig};
pub use constraint::StateConstraint;
pub use dotchart::{DotChart, DotNode};
pub use feature::{
    BoundaryContext, DpState, FeatureFunction, NodeResult, RuleScore, SourcePathScore,
    WordPenalty,
};
pub use grammar::{Grammar, MemoryGrammar, Rule, RuleCollection, SrcSym, TgtSym};
pub use hypergraph::{HGNode, HyperEdge, HyperGraph, NodeId};
pub use lattice::{Lattice, LatticeArc, SourcePath};
pub use matcher::NonterminalMatcher;
pub use parse::{parse_rule, parse_rules, RuleParseError};
pub use sentence::Sentence;
pub use vocab::{SymId, Vocabulary};
