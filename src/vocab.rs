//! Symbol vocabulary: a bijection between symbol strings and integer ids.
//!
//! Every terminal, nonterminal, and reserved marker is interned once and
//! referred to by `SymId` everywhere else, so comparisons on the decoding
//! hot path are O(1) integer equality.
//!
//! The vocabulary is an injected handle (`Rc<Vocabulary>`) shared read-mostly
//! between the grammars, the matcher, and the chart. Writes happen while
//! grammars and sentences are being built, not during decoding.

use rustc_hash::FxHashMap;
use std::cell::RefCell;

/// Interned symbol id.
pub type SymId = u32;

/// Reserved sentence-start marker.
pub const START_SYM: &str = "<s>";
/// Reserved sentence-stop marker.
pub const STOP_SYM: &str = "</s>";
/// Default goal nonterminal.
pub const GOAL_SYM: &str = "GOAL";

#[derive(Debug, Default)]
struct VocabInner {
    str_to_id: FxHashMap<Box<str>, SymId>,
    id_to_str: Vec<Box<str>>,
}

impl VocabInner {
    fn intern(&mut self, s: &str) -> SymId {
        if let Some(&id) = self.str_to_id.get(s) {
            return id;
        }
        let id = self.id_to_str.len() as SymId;
        let boxed: Box<str> = s.into();
        self.str_to_id.insert(boxed.clone(), id);
        self.id_to_str.push(boxed);
        id
    }
}

/// Shared symbol table.
///
/// Interior mutability lets callers intern through a shared handle; decoding
/// itself only reads. Single-threaded per chart, so `RefCell` suffices.
#[derive(Debug)]
pub struct Vocabulary {
    inner: RefCell<VocabInner>,
}

impl Default for Vocabulary {
    fn default() -> Self {
        Vocabulary::new()
    }
}

impl Vocabulary {
    /// Create a vocabulary with the reserved symbols pre-interned.
    pub fn new() -> Self {
        let vocab = Vocabulary {
            inner: RefCell::new(VocabInner::default()),
        };
        vocab.id(START_SYM);
        vocab.id(STOP_SYM);
        vocab.id(GOAL_SYM);
        vocab
    }

    /// Intern a string, returning its unique id.
    pub fn id(&self, s: &str) -> SymId {
        self.inner.borrow_mut().intern(s)
    }

    /// Look up an already-interned string without interning it.
    pub fn lookup(&self, s: &str) -> Option<SymId> {
        self.inner.borrow().str_to_id.get(s).copied()
    }

    /// Resolve an id back to its string.
    pub fn term(&self, id: SymId) -> String {
        self.inner.borrow().id_to_str[id as usize].to_string()
    }

    /// Id of the reserved sentence-start marker.
    pub fn start_id(&self) -> SymId {
        self.lookup(START_SYM).expect("reserved symbol")
    }

    /// Id of the reserved sentence-stop marker.
    pub fn stop_id(&self) -> SymId {
        self.lookup(STOP_SYM).expect("reserved symbol")
    }

    /// Intern each whitespace-separated token of `text` in order.
    pub fn ids(&self, text: &str) -> Vec<SymId> {
        text.split_whitespace().map(|w| self.id(w)).collect()
    }

    /// Number of interned symbols.
    pub fn len(&self) -> usize {
        self.inner.borrow().id_to_str.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
