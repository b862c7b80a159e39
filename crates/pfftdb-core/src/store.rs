//! Indexed triple storage for one named graph.
//!
//! Triples live in an append-only slot table addressed by a `u32` triple id.
//! Every access path (subject, predicate, object and the three pairs) maps to a
//! Roaring bitmap of triple ids, so any combination of bound positions resolves
//! to a single index lookup. Ids are never reused while the graph is
//! non-empty; compaction renumbers them densely without reordering. Ascending
//! id order is insertion order, which is what makes scans and path
//! tie-breaking deterministic.

use ahash::AHashMap;
use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::interner::{TermId, TermInterner};
use crate::term::{Term, Triple, TriplePattern};

/// Tombstones tolerated before a removal triggers [`TripleStore::compact`].
const COMPACT_MIN_TOMBSTONES: usize = 1024;

/// A stored triple in id space.
pub(crate) type TripleKey = [TermId; 3];

/// A pattern in id space (`None` = wildcard).
pub(crate) type KeyPattern = [Option<TermId>; 3];

// ============================================================================
// Candidate sets
// ============================================================================

/// Triple ids matching a key pattern.
pub(crate) enum Candidates<'a> {
    Empty,
    One(u32),
    Bitmap(&'a RoaringBitmap),
}

impl<'a> Candidates<'a> {
    pub(crate) fn len(&self) -> u64 {
        match self {
            Candidates::Empty => 0,
            Candidates::One(_) => 1,
            Candidates::Bitmap(b) => b.len(),
        }
    }

    pub(crate) fn iter(&self) -> CandidateIter<'a> {
        match self {
            Candidates::Empty => CandidateIter::Done,
            Candidates::One(id) => CandidateIter::One(Some(*id)),
            Candidates::Bitmap(b) => {
                let bitmap: &'a RoaringBitmap = *b;
                CandidateIter::Bitmap(bitmap.iter())
            }
        }
    }
}

pub(crate) enum CandidateIter<'a> {
    Done,
    One(Option<u32>),
    Bitmap(roaring::bitmap::Iter<'a>),
}

impl Iterator for CandidateIter<'_> {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        match self {
            CandidateIter::Done => None,
            CandidateIter::One(id) => id.take(),
            CandidateIter::Bitmap(it) => it.next(),
        }
    }
}

// ============================================================================
// Options and reports
// ============================================================================

/// Paging and ordering for materialised triple listings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TripleOptions {
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: usize,
    /// `s`, `p` or `o` (also `sub`/`pred`/`obj`); a leading `-` sorts descending.
    #[serde(default)]
    pub order_by: Option<String>,
}

/// Outcome of a best-effort bulk insert.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkReport {
    /// Triples that were not already present.
    pub inserted: usize,
    /// Valid triples that were already present.
    pub duplicates: usize,
    /// Malformed records: `(index in the batch, reason)`.
    pub skipped: Vec<(usize, String)>,
}

// ============================================================================
// TripleStore
// ============================================================================

/// Indexed set of triples for a single named graph.
#[derive(Debug, Default)]
pub struct TripleStore {
    interner: TermInterner,
    /// triple id -> key (`None` once removed)
    slots: Vec<Option<TripleKey>>,
    /// key -> triple id (set semantics)
    keys: AHashMap<TripleKey, u32>,
    /// All live triple ids.
    all: RoaringBitmap,
    by_subject: AHashMap<TermId, RoaringBitmap>,
    by_predicate: AHashMap<TermId, RoaringBitmap>,
    by_object: AHashMap<TermId, RoaringBitmap>,
    by_sp: AHashMap<(TermId, TermId), RoaringBitmap>,
    by_po: AHashMap<(TermId, TermId), RoaringBitmap>,
    by_so: AHashMap<(TermId, TermId), RoaringBitmap>,
}

impl TripleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of triples stored.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    // ========================================================================
    // Mutation
    // ========================================================================

    /// Insert a triple. Returns `false` if it was already present.
    pub fn add(&mut self, triple: &Triple) -> Result<bool> {
        triple.validate()?;
        let key = [
            self.interner.intern(&triple.subject),
            self.interner.intern(&triple.predicate),
            self.interner.intern(&triple.object),
        ];
        self.insert_key(key)
    }

    /// Insert every valid triple; malformed records are skipped and reported.
    pub fn add_bulk<'t>(&mut self, triples: impl IntoIterator<Item = &'t Triple>) -> BulkReport {
        let mut report = BulkReport::default();
        for (index, triple) in triples.into_iter().enumerate() {
            match self.add(triple) {
                Ok(true) => report.inserted += 1,
                Ok(false) => report.duplicates += 1,
                Err(err) => {
                    tracing::warn!(index, triple = %triple, error = %err, "skipping malformed triple");
                    report.skipped.push((index, err.to_string()));
                }
            }
        }
        report
    }

    pub(crate) fn insert_key(&mut self, key: TripleKey) -> Result<bool> {
        if self.keys.contains_key(&key) {
            return Ok(false);
        }
        let id = u32::try_from(self.slots.len())
            .ok()
            .filter(|id| *id < u32::MAX)
            .ok_or_else(|| Error::validation("triple", "graph triple id space exhausted"))?;
        let [s, p, o] = key;

        self.slots.push(Some(key));
        self.keys.insert(key, id);
        self.all.insert(id);
        self.by_subject.entry(s).or_default().insert(id);
        self.by_predicate.entry(p).or_default().insert(id);
        self.by_object.entry(o).or_default().insert(id);
        self.by_sp.entry((s, p)).or_default().insert(id);
        self.by_po.entry((p, o)).or_default().insert(id);
        self.by_so.entry((s, o)).or_default().insert(id);
        Ok(true)
    }

    /// Delete every triple matching `pattern`; returns the number removed.
    pub fn remove(&mut self, pattern: &TriplePattern) -> Result<usize> {
        self.remove_many(std::slice::from_ref(pattern))
    }

    /// Delete every triple matching any of `patterns`; returns the number
    /// removed. A triple matched by several patterns is counted once.
    ///
    /// All candidates of all patterns are validated against the slot table
    /// before anything is touched, so an index desync aborts the call with the
    /// store unchanged.
    pub fn remove_many(&mut self, patterns: &[TriplePattern]) -> Result<usize> {
        if patterns.iter().any(TriplePattern::is_wildcard) {
            return Ok(self.remove_all());
        }
        let mut doomed_ids = RoaringBitmap::new();
        for pattern in patterns {
            if let Some(key_pattern) = self.key_pattern(pattern) {
                doomed_ids.extend(self.candidates(&key_pattern).iter());
            }
        }
        let mut doomed = Vec::with_capacity(doomed_ids.len() as usize);
        for id in &doomed_ids {
            let key = self.key(id).ok_or_else(|| {
                Error::InvariantViolation(format!("index references missing triple id {id}"))
            })?;
            if self.keys.get(&key) != Some(&id) {
                return Err(Error::InvariantViolation(format!(
                    "key map disagrees with slot for triple id {id}"
                )));
            }
            doomed.push((id, key));
        }
        for (id, key) in &doomed {
            self.unindex(*id, *key);
        }
        if self.keys.is_empty() {
            self.reset();
        } else if self.needs_compaction() {
            self.compact()?;
        }
        Ok(doomed.len())
    }

    /// Empty the graph. Returns the number of triples removed.
    pub fn remove_all(&mut self) -> usize {
        let removed = self.keys.len();
        self.reset();
        removed
    }

    fn reset(&mut self) {
        *self = TripleStore::default();
    }

    /// Tombstones outnumber live triples and exceed [`COMPACT_MIN_TOMBSTONES`].
    fn needs_compaction(&self) -> bool {
        let tombstones = self.slots.len() - self.keys.len();
        tombstones >= COMPACT_MIN_TOMBSTONES && tombstones > self.keys.len()
    }

    /// Rebuild the store from its live triples in id order.
    ///
    /// Triple ids and term ids are renumbered densely; relative insertion
    /// order is kept, terms no longer referenced by any triple are dropped.
    /// Callers must not hold ids across a mutation.
    fn compact(&mut self) -> Result<()> {
        let before = self.slots.len();
        let mut fresh = TripleStore::default();
        for &[s, p, o] in self.slots.iter().flatten() {
            let (Some(s), Some(p), Some(o)) = (
                self.interner.lookup(s),
                self.interner.lookup(p),
                self.interner.lookup(o),
            ) else {
                continue;
            };
            let key = [
                fresh.interner.intern(s),
                fresh.interner.intern(p),
                fresh.interner.intern(o),
            ];
            fresh.insert_key(key)?;
        }
        tracing::debug!(slots_before = before, live = fresh.len(), "compacted triple store");
        *self = fresh;
        Ok(())
    }

    fn unindex(&mut self, id: u32, key: TripleKey) {
        let [s, p, o] = key;
        self.slots[id as usize] = None;
        self.keys.remove(&key);
        self.all.remove(id);
        remove_from(&mut self.by_subject, &s, id);
        remove_from(&mut self.by_predicate, &p, id);
        remove_from(&mut self.by_object, &o, id);
        remove_from(&mut self.by_sp, &(s, p), id);
        remove_from(&mut self.by_po, &(p, o), id);
        remove_from(&mut self.by_so, &(s, o), id);
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    /// Lazily iterate triples matching `pattern` in insertion order.
    ///
    /// Each call re-evaluates against the current state.
    pub fn scan<'a>(&'a self, pattern: &TriplePattern) -> Scan<'a> {
        let ids = match self.key_pattern(pattern) {
            Some(kp) => self.candidates(&kp).iter(),
            None => CandidateIter::Done,
        };
        Scan { store: self, ids }
    }

    /// Number of triples matching `pattern`, without materialising them.
    pub fn count(&self, pattern: &TriplePattern) -> u64 {
        match self.key_pattern(pattern) {
            Some(kp) => self.candidates(&kp).len(),
            None => 0,
        }
    }

    pub fn contains(&self, triple: &Triple) -> bool {
        self.count(&TriplePattern::from(triple)) == 1
    }

    /// Materialised, optionally ordered and paged listing.
    pub fn triples(&self, pattern: &TriplePattern, options: &TripleOptions) -> Result<Vec<Triple>> {
        let order = options
            .order_by
            .as_deref()
            .map(parse_triple_order)
            .transpose()?;

        let mut out: Vec<Triple> = self.scan(pattern).collect();
        if let Some((position, descending)) = order {
            out.sort_by(|a, b| {
                let ord = a.terms()[position].sort_cmp(b.terms()[position]);
                if descending {
                    ord.reverse()
                } else {
                    ord
                }
            });
        }
        let limit = options.limit.unwrap_or(usize::MAX);
        Ok(out.into_iter().skip(options.offset).take(limit).collect())
    }

    /// A single value from the first matching triple: the subject if it is a
    /// wildcard, else the predicate if it is a wildcard, else the object.
    pub fn value(&self, pattern: &TriplePattern) -> Option<Term> {
        let triple = self.scan(pattern).next()?;
        if pattern.subject.is_none() {
            Some(triple.subject)
        } else if pattern.predicate.is_none() {
            Some(triple.predicate)
        } else {
            Some(triple.object)
        }
    }

    // ========================================================================
    // Id-space access (join engine, inference, path search)
    // ========================================================================

    pub(crate) fn id_of(&self, term: &Term) -> Option<TermId> {
        self.interner.id_of(term)
    }

    pub(crate) fn term(&self, id: TermId) -> Option<&Term> {
        self.interner.lookup(id)
    }

    pub(crate) fn key(&self, triple_id: u32) -> Option<TripleKey> {
        self.slots.get(triple_id as usize).copied().flatten()
    }

    pub(crate) fn contains_key(&self, key: &TripleKey) -> bool {
        self.keys.contains_key(key)
    }

    /// Translate a term pattern to id space. `None` means some bound term has
    /// never been seen, so nothing can match.
    pub(crate) fn key_pattern(&self, pattern: &TriplePattern) -> Option<KeyPattern> {
        fn field(store: &TripleStore, t: &Option<Term>) -> Option<Option<TermId>> {
            match t {
                None => Some(None),
                Some(t) => store.id_of(t).map(Some),
            }
        }
        Some([
            field(self, &pattern.subject)?,
            field(self, &pattern.predicate)?,
            field(self, &pattern.object)?,
        ])
    }

    /// Pick the most specific index for the bound positions.
    pub(crate) fn candidates(&self, kp: &KeyPattern) -> Candidates<'_> {
        fn bitmap(b: Option<&RoaringBitmap>) -> Candidates<'_> {
            match b {
                Some(b) => Candidates::Bitmap(b),
                None => Candidates::Empty,
            }
        }
        match *kp {
            [Some(s), Some(p), Some(o)] => match self.keys.get(&[s, p, o]) {
                Some(id) => Candidates::One(*id),
                None => Candidates::Empty,
            },
            [Some(s), Some(p), None] => bitmap(self.by_sp.get(&(s, p))),
            [None, Some(p), Some(o)] => bitmap(self.by_po.get(&(p, o))),
            [Some(s), None, Some(o)] => bitmap(self.by_so.get(&(s, o))),
            [Some(s), None, None] => bitmap(self.by_subject.get(&s)),
            [None, Some(p), None] => bitmap(self.by_predicate.get(&p)),
            [None, None, Some(o)] => bitmap(self.by_object.get(&o)),
            [None, None, None] => Candidates::Bitmap(&self.all),
        }
    }

    /// Keys matching `kp`, in insertion order.
    pub(crate) fn matching_keys<'a>(&'a self, kp: &KeyPattern) -> impl Iterator<Item = TripleKey> + 'a {
        let ids = self.candidates(kp).iter();
        ids.filter_map(move |id| self.key(id))
    }

    pub(crate) fn resolve_key(&self, key: TripleKey) -> Option<Triple> {
        Some(Triple::new(
            self.term(key[0])?.clone(),
            self.term(key[1])?.clone(),
            self.term(key[2])?.clone(),
        ))
    }

    // ========================================================================
    // Invariants
    // ========================================================================

    /// Rebuild every index from the slot table and compare with the live ones.
    pub fn check_invariants(&self) -> Result<()> {
        let mut expected = TripleStore {
            slots: self.slots.clone(),
            ..TripleStore::default()
        };
        for (id, slot) in self.slots.iter().enumerate() {
            let Some(key) = slot else { continue };
            let id = id as u32;
            for term_id in key {
                if self.interner.lookup(*term_id).is_none() {
                    return Err(Error::InvariantViolation(format!(
                        "triple id {id} references unknown term id {}",
                        term_id.raw()
                    )));
                }
            }
            if expected.keys.insert(*key, id).is_some() {
                return Err(Error::InvariantViolation(format!(
                    "duplicate triple stored at id {id}"
                )));
            }
            let [s, p, o] = *key;
            expected.all.insert(id);
            expected.by_subject.entry(s).or_default().insert(id);
            expected.by_predicate.entry(p).or_default().insert(id);
            expected.by_object.entry(o).or_default().insert(id);
            expected.by_sp.entry((s, p)).or_default().insert(id);
            expected.by_po.entry((p, o)).or_default().insert(id);
            expected.by_so.entry((s, o)).or_default().insert(id);
        }

        let checks: [(&str, bool); 8] = [
            ("keys", expected.keys == self.keys),
            ("all", expected.all == self.all),
            ("subject", expected.by_subject == self.by_subject),
            ("predicate", expected.by_predicate == self.by_predicate),
            ("object", expected.by_object == self.by_object),
            ("subject/predicate", expected.by_sp == self.by_sp),
            ("predicate/object", expected.by_po == self.by_po),
            ("subject/object", expected.by_so == self.by_so),
        ];
        for (name, ok) in checks {
            if !ok {
                return Err(Error::InvariantViolation(format!("{name} index out of sync")));
            }
        }
        Ok(())
    }
}

fn remove_from<K: std::hash::Hash + Eq>(index: &mut AHashMap<K, RoaringBitmap>, key: &K, id: u32) {
    if let Some(bitmap) = index.get_mut(key) {
        bitmap.remove(id);
        if bitmap.is_empty() {
            index.remove(key);
        }
    }
}

fn parse_triple_order(raw: &str) -> Result<(usize, bool)> {
    let (descending, field) = match raw.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, raw),
    };
    let position = match field {
        "s" | "sub" | "subject" => 0,
        "p" | "pred" | "predicate" => 1,
        "o" | "obj" | "object" => 2,
        other => {
            return Err(Error::validation(
                "order_by",
                format!("unknown triple field `{other}` (expected s, p or o)"),
            ))
        }
    };
    Ok((position, descending))
}

/// Lazy scan over a store; see [`TripleStore::scan`].
pub struct Scan<'a> {
    store: &'a TripleStore,
    ids: CandidateIter<'a>,
}

impl Iterator for Scan<'_> {
    type Item = Triple;

    fn next(&mut self) -> Option<Triple> {
        loop {
            let id = self.ids.next()?;
            if let Some(triple) = self.store.key(id).and_then(|k| self.store.resolve_key(k)) {
                return Some(triple);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str, p: &str, o: Term) -> Triple {
        Triple::new(Term::iri(s), Term::iri(p), o)
    }

    fn sample() -> TripleStore {
        let mut store = TripleStore::new();
        store.add(&t("paul", "is_not", Term::iri("human"))).unwrap();
        store.add(&t("paul", "is_not", Term::iri("person"))).unwrap();
        store.add(&t("paul", "foaf", Term::int(123))).unwrap();
        store.add(&t("paul", "foaf", Term::string("abc"))).unwrap();
        store.add(&t("berta", "foaf", Term::string("abc"))).unwrap();
        store.add(&t("berta", "dd", Term::float(1.0).unwrap())).unwrap();
        store
    }

    #[test]
    fn test_add_is_idempotent() {
        let mut store = TripleStore::new();
        let triple = t("a", "p", Term::iri("o"));
        assert!(store.add(&triple).unwrap());
        assert!(!store.add(&triple).unwrap());
        assert_eq!(store.len(), 1);
        store.check_invariants().unwrap();
    }

    #[test]
    fn test_remove_sequence() {
        let mut store = sample();
        assert_eq!(store.remove(&TriplePattern::from(&t("paul", "is_not", Term::iri("human")))).unwrap(), 1);
        assert_eq!(store.len(), 5);
        assert_eq!(store.remove(&TriplePattern::from(&t("paul", "is_not", Term::iri("person")))).unwrap(), 1);
        assert_eq!(store.len(), 4);

        let by_subject = TriplePattern::new(Some(Term::iri("paul")), None, None);
        assert_eq!(store.remove(&by_subject).unwrap(), 2);
        assert_eq!(store.len(), 2);
        store.check_invariants().unwrap();

        assert_eq!(store.remove(&TriplePattern::any()).unwrap(), 2);
        assert!(store.is_empty());
        assert_eq!(store.scan(&TriplePattern::any()).count(), 0);
    }

    #[test]
    fn test_remove_many_counts_overlapping_matches_once() {
        let mut store = sample();
        let patterns = [
            TriplePattern::new(Some(Term::iri("paul")), Some(Term::iri("foaf")), None),
            TriplePattern::new(None, None, Some(Term::string("abc"))),
            TriplePattern::new(Some(Term::iri("nobody")), None, None),
        ];
        // paul/foaf/123, paul/foaf/"abc", berta/foaf/"abc"
        assert_eq!(store.remove_many(&patterns).unwrap(), 3);
        assert_eq!(store.len(), 3);
        store.check_invariants().unwrap();
        assert_eq!(store.remove_many(&[]).unwrap(), 0);
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_remove_many_with_a_wildcard_empties_the_graph() {
        let mut store = sample();
        let patterns = [
            TriplePattern::new(Some(Term::iri("paul")), None, None),
            TriplePattern::any(),
        ];
        assert_eq!(store.remove_many(&patterns).unwrap(), 6);
        assert!(store.is_empty());
    }

    #[test]
    fn test_churn_is_reclaimed_by_compaction() {
        let mut store = TripleStore::new();
        let keeper = t("keep", "p", Term::iri("me"));
        store.add(&keeper).unwrap();
        for i in 0..10_000 {
            let churn = t(&format!("s{i}"), "p", Term::int(i));
            store.add(&churn).unwrap();
            assert_eq!(store.remove(&TriplePattern::from(&churn)).unwrap(), 1);
        }
        store.add(&t("last", "p", Term::iri("me"))).unwrap();

        assert_eq!(store.len(), 2);
        assert!(store.slots.len() <= COMPACT_MIN_TOMBSTONES + 2, "slots = {}", store.slots.len());
        assert_eq!(store.id_of(&Term::iri("s0")), None);
        assert_eq!(store.id_of(&Term::int(42)), None);
        store.check_invariants().unwrap();

        let order: Vec<Triple> = store.scan(&TriplePattern::any()).collect();
        assert_eq!(order, vec![keeper, t("last", "p", Term::iri("me"))]);
    }

    #[test]
    fn test_compaction_keeps_insertion_order() {
        let mut store = TripleStore::new();
        for i in 0..10 {
            store.add(&t(&format!("n{i}"), "next", Term::iri(format!("n{}", i + 1)))).unwrap();
        }
        for i in (0..10).step_by(2) {
            store.remove(&TriplePattern::new(Some(Term::iri(format!("n{i}"))), None, None)).unwrap();
        }
        let before: Vec<Triple> = store.scan(&TriplePattern::any()).collect();
        store.compact().unwrap();
        assert_eq!(store.slots.len(), 5);
        assert_eq!(store.scan(&TriplePattern::any()).collect::<Vec<_>>(), before);
        assert_eq!(store.id_of(&Term::iri("n0")), None);
        store.check_invariants().unwrap();
    }

    #[test]
    fn test_remove_unknown_term_is_noop() {
        let mut store = sample();
        let pattern = TriplePattern::new(Some(Term::iri("nobody")), None, None);
        assert_eq!(store.remove(&pattern).unwrap(), 0);
        assert_eq!(store.len(), 6);
    }

    #[test]
    fn test_every_bound_combination_uses_an_index() {
        let store = sample();
        let paul = Some(Term::iri("paul"));
        let foaf = Some(Term::iri("foaf"));
        let abc = Some(Term::string("abc"));
        let cases = [
            (TriplePattern::new(None, None, None), 6),
            (TriplePattern::new(paul.clone(), None, None), 4),
            (TriplePattern::new(paul.clone(), foaf.clone(), None), 2),
            (TriplePattern::new(paul.clone(), None, abc.clone()), 1),
            (TriplePattern::new(paul.clone(), foaf.clone(), abc.clone()), 1),
            (TriplePattern::new(None, foaf.clone(), None), 3),
            (TriplePattern::new(None, foaf.clone(), abc.clone()), 2),
            (TriplePattern::new(None, None, abc.clone()), 2),
        ];
        for (pattern, expected) in cases {
            assert_eq!(store.count(&pattern), expected, "{pattern:?}");
            assert_eq!(store.scan(&pattern).count() as u64, expected, "{pattern:?}");
            assert!(store.scan(&pattern).all(|tr| pattern.matches(&tr)));
        }
    }

    #[test]
    fn test_scan_is_restartable_and_ordered() {
        let store = sample();
        let first: Vec<Triple> = store.scan(&TriplePattern::any()).collect();
        let second: Vec<Triple> = store.scan(&TriplePattern::any()).collect();
        assert_eq!(first, second);
        assert_eq!(first[0], t("paul", "is_not", Term::iri("human")));
        assert_eq!(first[5].object, Term::int(1));
    }

    #[test]
    fn test_literal_kinds_are_kept_apart() {
        let store = sample();
        let iri_abc = TriplePattern::new(None, None, Some(Term::iri("abc")));
        assert_eq!(store.count(&iri_abc), 0);
        let num = TriplePattern::new(None, None, Some(Term::int(123)));
        assert_eq!(store.count(&num), 1);
        let text = TriplePattern::new(None, None, Some(Term::string("123")));
        assert_eq!(store.count(&text), 0);
    }

    #[test]
    fn test_value_picks_the_wildcard_position() {
        let mut store = TripleStore::new();
        store.add(&t("paul", "is_not", Term::iri("human"))).unwrap();
        store.add(&t("paul", "has", Term::iri("hands"))).unwrap();

        let obj = TriplePattern::new(Some(Term::iri("paul")), Some(Term::iri("is_not")), None);
        assert_eq!(store.value(&obj), Some(Term::iri("human")));
        let sub = TriplePattern::new(None, Some(Term::iri("is_not")), Some(Term::iri("human")));
        assert_eq!(store.value(&sub), Some(Term::iri("paul")));
        let missing = TriplePattern::new(None, Some(Term::iri("likes")), None);
        assert_eq!(store.value(&missing), None);
    }

    #[test]
    fn test_triples_order_and_paging() {
        let mut store = TripleStore::new();
        for (s, n) in [("c", 3), ("a", 1), ("b", 2)] {
            store.add(&t(s, "n", Term::int(n))).unwrap();
        }
        let opts = TripleOptions {
            order_by: Some("-o".into()),
            offset: 1,
            limit: Some(1),
        };
        let page = store.triples(&TriplePattern::any(), &opts).unwrap();
        assert_eq!(page, vec![t("b", "n", Term::int(2))]);

        let bad = TripleOptions {
            order_by: Some("x".into()),
            ..TripleOptions::default()
        };
        assert!(store.triples(&TriplePattern::any(), &bad).is_err());
    }

    #[test]
    fn test_bulk_skips_malformed_records() {
        let mut store = TripleStore::new();
        let batch = vec![
            t("a", "p", Term::iri("b")),
            t("a", "p", Term::string("")),
            t("a", "p", Term::iri("b")),
            Triple::new(Term::iri("a"), Term::Bool(true), Term::iri("c")),
            t("a", "q", Term::iri("c")),
        ];
        let report = store.add_bulk(&batch);
        assert_eq!(report.inserted, 2);
        assert_eq!(report.duplicates, 1);
        assert_eq!(
            report.skipped.iter().map(|(i, _)| *i).collect::<Vec<_>>(),
            vec![1, 3]
        );
        store.check_invariants().unwrap();
    }
}
