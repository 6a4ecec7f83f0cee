//! Decoding benchmark over a small hierarchical grammar.
//!
//! Run with: cargo bench --bench decode_bench
//!
//! The grammar has PP-attachment-style ambiguity, so the number of
//! derivations grows quickly with sentence length and the cube-pruning
//! pop limit does real work.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::rc::Rc;

use cubedec::{Chart, DecoderConfig, FeatureFunction, MemoryGrammar, RuleScore, Sentence, Vocabulary};

const GRAMMAR: &str = "\
    [X] ||| the ||| le ||| -0.5\n\
    [X] ||| man ||| homme ||| -1\n\
    [X] ||| saw ||| vu ||| -1.5\n\
    [X] ||| with ||| avec ||| -0.5\n\
    [X] ||| telescope ||| telescope ||| -1\n\
    [X] ||| [X,1] [X,2] ||| [X,1] [X,2] ||| -0.25\n\
    [X] ||| [X,1] [X,2] ||| [X,2] [X,1] ||| -0.75\n\
    [GOAL] ||| [X,1] ||| [X,1] ||| 0\n";

fn sentence_text(num_pps: usize) -> String {
    let mut words = vec!["the", "man", "saw", "the", "man"];
    for _ in 0..num_pps {
        words.extend(["with", "the", "telescope"]);
    }
    words.join(" ")
}

fn decode(text: &str, pop_limit: usize, use_dot_chart: bool) -> f64 {
    let vocab = Rc::new(Vocabulary::new());
    let mut grammar = MemoryGrammar::new();
    grammar.add_rules(cubedec::parse_rules(&vocab, GRAMMAR).unwrap());

    let sentence = Sentence::from_words(&vocab, 0, text);
    let ffs: Vec<Box<dyn FeatureFunction>> = vec![Box::new(RuleScore::new(vec![1.0]))];
    let config = DecoderConfig {
        pop_limit,
        use_dot_chart,
        ..DecoderConfig::default()
    };

    Chart::new(sentence, ffs, vec![Rc::new(grammar)], "GOAL", vocab, config)
        .decode()
        .expect("grammar covers the sentence")
        .best_score()
}

fn bench_decode(c: &mut Criterion) {
    let short = sentence_text(1);
    let long = sentence_text(3);

    c.bench_function("cky_short_pop100", |b| {
        b.iter(|| decode(black_box(&short), 100, true))
    });
    c.bench_function("cky_long_pop100", |b| {
        b.iter(|| decode(black_box(&long), 100, true))
    });
    c.bench_function("cky_long_pop10", |b| {
        b.iter(|| decode(black_box(&long), 10, true))
    });
    c.bench_function("cky_plus_long_pop100", |b| {
        b.iter(|| decode(black_box(&long), 100, false))
    });
}

criterion_group!(benches, bench_decode);
criterion_main!(benches);
