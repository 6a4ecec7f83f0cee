//! Text parser for grammar rules.
//!
//! Rules use the pipe-delimited line format
//!
//! ```text
//! [S] ||| [X,1] [X,2] ||| [X,1] [X,2] ||| 0.5 -1.2
//! ```
//!
//! with fields lhs, source side, target side, and feature scores. Source
//! nonterminals are bracketed and may carry an explicit 1-based index;
//! unindexed nonterminals are numbered in order of appearance. Target
//! nonterminal references resolve to source indices the same way. This
//! lets tests and small programs write grammars as readable text instead of
//! constructing `Rule` values by hand.

use crate::grammar::{Rule, SrcSym, TgtSym};
use crate::vocab::Vocabulary;
use thiserror::Error;

/// Grammar line parse error.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuleParseError {
    #[error("expected 4 '|||'-separated fields, found {0}")]
    WrongFieldCount(usize),
    #[error("malformed left-hand side: {0:?}")]
    BadLhs(String),
    #[error("malformed nonterminal token: {0:?}")]
    BadNonterminal(String),
    #[error("target references nonterminal {index} but source has only {arity}")]
    BadReference { index: usize, arity: usize },
    #[error("invalid feature score: {0:?}")]
    BadScore(String),
}

/// Result type for rule parsing.
pub type ParseResult<T> = Result<T, RuleParseError>;

/// Parse a single grammar line.
pub fn parse_rule(vocab: &Vocabulary, line: &str) -> ParseResult<Rule> {
    let fields: Vec<&str> = line.split("|||").map(str::trim).collect();
    if fields.len() != 4 {
        return Err(RuleParseError::WrongFieldCount(fields.len()));
    }

    let lhs = match strip_brackets(fields[0]) {
        Some(name) if !name.is_empty() && !name.contains(',') => vocab.id(name),
        _ => return Err(RuleParseError::BadLhs(fields[0].to_string())),
    };

    // Source side: terminals and (possibly indexed) nonterminals. The
    // per-symbol indices only matter for resolving target references, so we
    // record the order in which indices were assigned.
    let mut source = Vec::new();
    let mut nt_indices = Vec::new();
    let mut next_index = 1;
    for token in fields[1].split_whitespace() {
        match strip_brackets(token) {
            Some(inner) => {
                let (name, index) = split_nonterminal(inner, &mut next_index)
                    .ok_or_else(|| RuleParseError::BadNonterminal(token.to_string()))?;
                source.push(SrcSym::Nonterminal(vocab.id(name)));
                nt_indices.push(index);
            }
            None => source.push(SrcSym::Terminal(vocab.id(token))),
        }
    }

    let arity = nt_indices.len();
    let mut target = Vec::new();
    let mut next_tgt_index = 1;
    for token in fields[2].split_whitespace() {
        match strip_brackets(token) {
            Some(inner) => {
                let (_, index) = split_nonterminal(inner, &mut next_tgt_index)
                    .ok_or_else(|| RuleParseError::BadNonterminal(token.to_string()))?;
                // Map the written index back to the source nonterminal's
                // 1-based position.
                let position = nt_indices
                    .iter()
                    .position(|&idx| idx == index)
                    .ok_or(RuleParseError::BadReference { index, arity })?;
                target.push(TgtSym::Nonterminal(position + 1));
            }
            None => target.push(TgtSym::Terminal(vocab.id(token))),
        }
    }

    let mut scores = Vec::new();
    for token in fields[3].split_whitespace() {
        let score: f64 = token
            .parse()
            .map_err(|_| RuleParseError::BadScore(token.to_string()))?;
        scores.push(score);
    }

    Ok(Rule::new(lhs, source, target, scores))
}

/// Parse a newline-separated block of rules, skipping blanks and `#` comments.
pub fn parse_rules(vocab: &Vocabulary, text: &str) -> ParseResult<Vec<Rule>> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| parse_rule(vocab, line))
        .collect()
}

fn strip_brackets(token: &str) -> Option<&str> {
    token.strip_prefix('[')?.strip_suffix(']')
}

/// Split `X,2` into name and index, assigning the next free index to bare
/// names like `X`.
fn split_nonterminal<'a>(inner: &'a str, next_index: &mut usize) -> Option<(&'a str, usize)> {
    let (name, index) = match inner.split_once(',') {
        Some((name, idx)) => (name, idx.parse().ok()?),
        None => {
            let idx = *next_index;
            (inner, idx)
        }
    };
    if name.is_empty() {
        return None;
    }
    *next_index = (*next_index).max(index) + 1;
    Some((name, index))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_terminal_rule() {
        let vocab = Vocabulary::new();
        let rule = parse_rule(&vocab, "[X] ||| maison ||| house ||| -0.5").unwrap();

        assert_eq!(rule.lhs, vocab.lookup("X").unwrap());
        assert_eq!(rule.source, vec![SrcSym::Terminal(vocab.lookup("maison").unwrap())]);
        assert_eq!(rule.target, vec![TgtSym::Terminal(vocab.lookup("house").unwrap())]);
        assert_eq!(rule.feature_scores, vec![-0.5]);
        assert_eq!(rule.arity, 0);
    }

    #[test]
    fn test_parse_reordering_rule() {
        let vocab = Vocabulary::new();
        let rule = parse_rule(&vocab, "[S] ||| [X,1] de [X,2] ||| [X,2] of [X,1] ||| 0.2 0.3").unwrap();

        assert_eq!(rule.arity, 2);
        assert_eq!(
            rule.target,
            vec![
                TgtSym::Nonterminal(2),
                TgtSym::Terminal(vocab.lookup("of").unwrap()),
                TgtSym::Nonterminal(1),
            ]
        );
    }

    #[test]
    fn test_parse_unindexed_nonterminals() {
        let vocab = Vocabulary::new();
        let rule = parse_rule(&vocab, "[S] ||| [X] [X] ||| [X,1] [X,2] ||| 0").unwrap();

        assert_eq!(rule.arity, 2);
        assert_eq!(rule.target, vec![TgtSym::Nonterminal(1), TgtSym::Nonterminal(2)]);
    }

    #[test]
    fn test_parse_errors() {
        let vocab = Vocabulary::new();

        assert_eq!(
            parse_rule(&vocab, "[S] ||| a ||| b").unwrap_err(),
            RuleParseError::WrongFieldCount(3)
        );
        assert_eq!(
            parse_rule(&vocab, "S ||| a ||| b ||| 0").unwrap_err(),
            RuleParseError::BadLhs("S".to_string())
        );
        assert!(matches!(
            parse_rule(&vocab, "[S] ||| [X,1] ||| [X,3] ||| 0"),
            Err(RuleParseError::BadReference { index: 3, arity: 1 })
        ));
        assert!(matches!(
            parse_rule(&vocab, "[S] ||| a ||| b ||| zero"),
            Err(RuleParseError::BadScore(_))
        ));
    }

    #[test]
    fn test_parse_rules_skips_comments() {
        let vocab = Vocabulary::new();
        let rules = parse_rules(
            &vocab,
            "# glue grammar\n\
             [GOAL] ||| [X,1] ||| [X,1] ||| 0\n\
             \n\
             [X] ||| casa ||| house ||| -0.1\n",
        )
        .unwrap();

        assert_eq!(rules.len(), 2);
    }
}
