//! Nonterminal matching between trie edges and chart items.
//!
//! The default matcher requires a trie edge label to equal the antecedent's
//! lhs id. Regexp grammars instead treat each edge label's textual form as a
//! regular expression over the lhs text; compiled patterns and per-pair
//! verdicts are cached, so matching stays pure and deterministic.

use crate::grammar::{TrieId, TrieNode};
use crate::vocab::{SymId, Vocabulary};
use regex::Regex;
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::rc::Rc;

/// Links trie nonterminal edges to chart items.
pub enum NonterminalMatcher {
    Exact,
    Regexp(RegexpCache),
}

/// Compiled-pattern and verdict cache for regexp grammars.
pub struct RegexpCache {
    vocab: Rc<Vocabulary>,
    patterns: RefCell<FxHashMap<SymId, Option<Regex>>>,
    verdicts: RefCell<FxHashMap<(SymId, SymId), bool>>,
}

impl NonterminalMatcher {
    /// Matcher for a grammar, regexp or exact.
    pub fn for_grammar(regexp: bool, vocab: Rc<Vocabulary>) -> Self {
        if regexp {
            NonterminalMatcher::Regexp(RegexpCache {
                vocab,
                patterns: RefCell::new(FxHashMap::default()),
                verdicts: RefCell::new(FxHashMap::default()),
            })
        } else {
            NonterminalMatcher::Exact
        }
    }

    /// Whether a trie edge label accepts an antecedent lhs.
    pub fn matches(&self, edge_label: SymId, lhs: SymId) -> bool {
        match self {
            NonterminalMatcher::Exact => edge_label == lhs,
            NonterminalMatcher::Regexp(cache) => cache.matches(edge_label, lhs),
        }
    }

    /// Child trie nodes reachable from `node` by an edge accepting `lhs`,
    /// in deterministic (edge-label) order.
    pub fn matching_children(&self, node: &TrieNode, lhs: SymId) -> Vec<TrieId> {
        match self {
            NonterminalMatcher::Exact => node.match_nonterminal(lhs).into_iter().collect(),
            NonterminalMatcher::Regexp(cache) => {
                let mut edges: Vec<(SymId, TrieId)> = node.nonterminal_edges().collect();
                edges.sort_unstable_by_key(|&(label, _)| label);
                edges
                    .into_iter()
                    .filter(|&(label, _)| cache.matches(label, lhs))
                    .map(|(_, id)| id)
                    .collect()
            }
        }
    }
}

impl RegexpCache {
    fn matches(&self, edge_label: SymId, lhs: SymId) -> bool {
        if let Some(&verdict) = self.verdicts.borrow().get(&(edge_label, lhs)) {
            return verdict;
        }
        let verdict = self.evaluate(edge_label, lhs);
        self.verdicts.borrow_mut().insert((edge_label, lhs), verdict);
        verdict
    }

    fn evaluate(&self, edge_label: SymId, lhs: SymId) -> bool {
        let mut patterns = self.patterns.borrow_mut();
        let compiled = patterns.entry(edge_label).or_insert_with(|| {
            let text = self.vocab.term(edge_label);
            match Regex::new(&format!("^(?:{})$", text)) {
                Ok(re) => Some(re),
                Err(err) => {
                    log::warn!("invalid nonterminal pattern {:?}: {}", text, err);
                    None
                }
            }
        });
        match compiled {
            Some(re) => re.is_match(&self.vocab.term(lhs)),
            // Unparsable patterns fall back to literal equality.
            None => edge_label == lhs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::{Grammar, MemoryGrammar, Rule, SrcSym, TgtSym};

    fn unary_rule(lhs: SymId, nt: SymId) -> Rule {
        Rule::new(
            lhs,
            vec![SrcSym::Nonterminal(nt)],
            vec![TgtSym::Nonterminal(1)],
            vec![0.0],
        )
    }

    #[test]
    fn test_exact_matcher() {
        let vocab = Rc::new(Vocabulary::new());
        let (np, vp) = (vocab.id("NP"), vocab.id("VP"));
        let matcher = NonterminalMatcher::for_grammar(false, Rc::clone(&vocab));

        assert!(matcher.matches(np, np));
        assert!(!matcher.matches(np, vp));
    }

    #[test]
    fn test_regexp_matcher_patterns() {
        let vocab = Rc::new(Vocabulary::new());
        let pattern = vocab.id("N.*");
        let (np, nn, vp) = (vocab.id("NP"), vocab.id("NN"), vocab.id("VP"));
        let matcher = NonterminalMatcher::for_grammar(true, Rc::clone(&vocab));

        assert!(matcher.matches(pattern, np));
        assert!(matcher.matches(pattern, nn));
        assert!(!matcher.matches(pattern, vp));
        // Cached verdict is stable.
        assert!(matcher.matches(pattern, np));
    }

    #[test]
    fn test_regexp_anchoring() {
        let vocab = Rc::new(Vocabulary::new());
        let pattern = vocab.id("NP");
        let npish = vocab.id("XNPX");
        let matcher = NonterminalMatcher::for_grammar(true, Rc::clone(&vocab));

        // The pattern must cover the whole lhs, not a substring.
        assert!(!matcher.matches(pattern, npish));
    }

    #[test]
    fn test_matching_children_order() {
        let vocab = Rc::new(Vocabulary::new());
        let s = vocab.id("S");
        let pat_a = vocab.id("N.");
        let pat_b = vocab.id(".P");
        let np = vocab.id("NP");

        let mut grammar = MemoryGrammar::new().with_regexp();
        grammar.add_rule(unary_rule(s, pat_b));
        grammar.add_rule(unary_rule(s, pat_a));

        let matcher = NonterminalMatcher::for_grammar(true, Rc::clone(&vocab));
        let root = grammar.node(grammar.root());
        let children = matcher.matching_children(root, np);

        // Both patterns accept NP; results come in edge-label order
        // regardless of rule insertion order.
        assert_eq!(children.len(), 2);
        assert_eq!(children, {
            let mut expected = vec![
                root.match_nonterminal(pat_a).unwrap(),
                root.match_nonterminal(pat_b).unwrap(),
            ];
            if pat_b < pat_a {
                expected.reverse();
            }
            expected
        });
    }
}
