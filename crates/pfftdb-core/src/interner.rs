//! Term interning: every distinct [`Term`] in a graph is stored once and
//! referenced by a 4-byte [`TermId`]. Indexes and join bindings work in id
//! space; terms are only materialised when results leave the engine.

use ahash::AHashMap;

use crate::term::Term;

/// Interned term ID (4 bytes instead of a full `Term`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct TermId(u32);

impl TermId {
    pub const fn raw(self) -> u32 {
        self.0
    }
}

/// Term interner: maps terms to compact IDs and back.
#[derive(Debug, Default)]
pub struct TermInterner {
    /// Term to ID mapping
    term_to_id: AHashMap<Term, TermId>,
    /// ID to term mapping (index = raw id)
    id_to_term: Vec<Term>,
}

impl TermInterner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a term, returning its ID.
    pub fn intern(&mut self, term: &Term) -> TermId {
        if let Some(id) = self.term_to_id.get(term) {
            return *id;
        }
        let id = TermId(self.id_to_term.len() as u32);
        self.term_to_id.insert(term.clone(), id);
        self.id_to_term.push(term.clone());
        id
    }

    /// Look up an existing ID for a term without inserting.
    pub fn id_of(&self, term: &Term) -> Option<TermId> {
        self.term_to_id.get(term).copied()
    }

    /// Look up a term by ID.
    pub fn lookup(&self, id: TermId) -> Option<&Term> {
        self.id_to_term.get(id.0 as usize)
    }
}
