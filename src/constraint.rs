//! Forced-target decoding constraint.
//!
//! When a sentence carries a forced target side, only hyperedges whose
//! dynamic-programming states are compatible with it may enter the chart.
//! Each context word recorded in a state must occur in `<s> target </s>`;
//! a hypothesis producing any other word can never extend to the forced
//! string. This is an admissibility filter, not a full prefix check.

use crate::feature::DpState;
use crate::vocab::SymId;
use rustc_hash::FxHashSet;

/// Admissibility check over dp states against a forced target.
#[derive(Clone, Debug)]
pub struct StateConstraint {
    target: FxHashSet<SymId>,
}

impl StateConstraint {
    /// `target` should already be wrapped in the start/stop markers.
    pub fn new(target: Vec<SymId>) -> Self {
        StateConstraint {
            target: target.into_iter().collect(),
        }
    }

    /// Whether every word of every state occurs in the target.
    /// Pure and deterministic; empty states are always legal.
    pub fn is_legal<'a>(&self, states: impl IntoIterator<Item = &'a DpState>) -> bool {
        states
            .into_iter()
            .all(|state| state.ids().iter().all(|id| self.target.contains(id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_membership_check() {
        let constraint = StateConstraint::new(vec![1, 2, 3]);

        assert!(constraint.is_legal([&DpState::new(vec![2, 3])]));
        assert!(constraint.is_legal([&DpState::new(vec![3, 3])]));
        assert!(!constraint.is_legal([&DpState::new(vec![5])]));
        assert!(!constraint.is_legal([&DpState::new(vec![1, 9])]));
    }

    #[test]
    fn test_empty_states_are_legal() {
        let constraint = StateConstraint::new(vec![1]);

        assert!(constraint.is_legal([&DpState::empty()]));
        assert!(constraint.is_legal(std::iter::empty()));
    }

    #[test]
    fn test_all_states_must_pass() {
        let constraint = StateConstraint::new(vec![1, 2]);

        assert!(!constraint.is_legal([&DpState::new(vec![1]), &DpState::new(vec![9])]));
    }
}
