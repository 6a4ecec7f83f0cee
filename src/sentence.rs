//! One unit of decoding input: an integerized source lattice plus metadata.

use crate::lattice::{Lattice, LatticeNode};
use crate::vocab::{SymId, Vocabulary};

/// A sentence to decode. Holds the integerized input lattice and, for
/// constrained decoding, the forced target token ids.
#[derive(Clone, Debug)]
pub struct Sentence {
    id: usize,
    lattice: Lattice,
    target: Option<Vec<SymId>>,
}

impl Sentence {
    pub fn new(id: usize, lattice: Lattice) -> Self {
        Sentence {
            id,
            lattice,
            target: None,
        }
    }

    /// Convenience constructor for plain (non-lattice) input.
    pub fn from_words(vocab: &Vocabulary, id: usize, text: &str) -> Self {
        Sentence::new(id, Lattice::linear(&vocab.ids(text)))
    }

    /// Attach a forced target side; its presence switches the chart into
    /// constrained decoding.
    pub fn with_target(mut self, target: Vec<SymId>) -> Self {
        self.target = Some(target);
        self
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Source span length (lattice nodes minus one).
    pub fn len(&self) -> usize {
        self.lattice.size() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn lattice(&self) -> &Lattice {
        &self.lattice
    }

    pub fn node(&self, k: usize) -> &LatticeNode {
        self.lattice.node(k)
    }

    pub fn has_path(&self, i: usize, j: usize) -> bool {
        self.lattice.has_path(i, j)
    }

    pub fn target(&self) -> Option<&[SymId]> {
        self.target.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_words() {
        let vocab = Vocabulary::new();
        let sentence = Sentence::from_words(&vocab, 3, "a b c");

        assert_eq!(sentence.id(), 3);
        assert_eq!(sentence.len(), 3);
        assert!(sentence.has_path(0, 3));
        assert_eq!(sentence.node(1).outgoing.len(), 1);
        assert_eq!(sentence.target(), None);
    }

    #[test]
    fn test_with_target() {
        let vocab = Vocabulary::new();
        let target = vocab.ids("x y");
        let sentence = Sentence::from_words(&vocab, 0, "a").with_target(target.clone());

        assert_eq!(sentence.target(), Some(target.as_slice()));
    }
}
