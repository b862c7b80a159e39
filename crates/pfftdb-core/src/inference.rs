//! Rule-based inference.
//!
//! A [`Rule`] reads a graph and materialises derived triples into it. The
//! closure rules (`symmetric`, `transitive`) run in rounds: every round is
//! computed from the state at round start, new triples are accumulated in an
//! overlay, and the overlay is committed to the store only once a round
//! derives nothing. Hitting the round cap returns [`Error::Convergence`] and
//! leaves the graph untouched.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use ahash::{AHashMap, AHashSet};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::cancel::Cancellation;
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::graph::Graph;
use crate::interner::TermId;
use crate::prefix::PrefixTable;
use crate::store::{TripleKey, TripleStore};
use crate::term::{vocab, Term, Triple};

// ============================================================================
// Rule interface
// ============================================================================

/// Everything a rule may consult besides the graph itself.
#[derive(Debug, Clone, Copy)]
pub struct InferenceContext<'a> {
    pub config: &'a EngineConfig,
    pub cancel: &'a Cancellation,
}

/// A record a rule could not process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedRecord {
    pub subject: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InferenceReport {
    pub rule: String,
    /// Triples newly added to the graph.
    pub derived: usize,
    /// Productive rounds (rounds that found something new).
    pub iterations: usize,
    pub skipped: Vec<SkippedRecord>,
}

impl InferenceReport {
    fn new(rule: &str) -> Self {
        Self {
            rule: rule.to_string(),
            ..Self::default()
        }
    }
}

/// A named derivation procedure.
pub trait Rule: Send + Sync {
    fn name(&self) -> &str;

    /// Apply the rule to `graph`, taking whatever locks it needs.
    fn apply(&self, graph: &Graph, ctx: &InferenceContext<'_>) -> Result<InferenceReport>;
}

/// Rules addressable by name.
#[derive(Clone, Default)]
pub struct RuleRegistry {
    rules: BTreeMap<String, Arc<dyn Rule>>,
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// `symmetric` and `transitive`.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(SymmetricRule));
        registry.register(Arc::new(TransitiveRule));
        registry
    }

    /// Register (or replace) a rule under its own name.
    pub fn register(&mut self, rule: Arc<dyn Rule>) {
        self.rules.insert(rule.name().to_string(), rule);
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Rule>> {
        self.rules
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownRule(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.rules.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for RuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.rules.keys()).finish()
    }
}

// ============================================================================
// Overlay + fixpoint driver
// ============================================================================

/// Derived-but-uncommitted triples on top of a store.
#[derive(Default)]
struct Overlay {
    added: Vec<TripleKey>,
    seen: AHashSet<TripleKey>,
    by_predicate: AHashMap<TermId, Vec<(TermId, TermId)>>,
}

impl Overlay {
    fn contains(&self, store: &TripleStore, key: &TripleKey) -> bool {
        store.contains_key(key) || self.seen.contains(key)
    }

    fn push(&mut self, key: TripleKey) {
        if self.seen.insert(key) {
            self.added.push(key);
            self.by_predicate.entry(key[1]).or_default().push((key[0], key[2]));
        }
    }

    /// `(subject, object)` pairs for predicate `p`, stored triples first.
    fn edges(&self, store: &TripleStore, p: TermId) -> Vec<(TermId, TermId)> {
        let mut edges: Vec<(TermId, TermId)> = store
            .matching_keys(&[None, Some(p), None])
            .map(|[s, _, o]| (s, o))
            .collect();
        if let Some(extra) = self.by_predicate.get(&p) {
            edges.extend_from_slice(extra);
        }
        edges
    }

    /// Subjects `x` with `(x, rdf:type, class)`.
    fn typed(&self, store: &TripleStore, class: &str) -> Vec<TermId> {
        let (Some(rdf_type), Some(class)) = (
            store.id_of(&Term::iri(vocab::RDF_TYPE)),
            store.id_of(&Term::iri(class)),
        ) else {
            return Vec::new();
        };
        let mut out: Vec<TermId> = store
            .matching_keys(&[None, Some(rdf_type), Some(class)])
            .map(|k| k[0])
            .collect();
        if let Some(extra) = self.by_predicate.get(&rdf_type) {
            out.extend(extra.iter().filter(|(_, o)| *o == class).map(|(s, _)| *s));
        }
        dedup_in_order(out)
    }
}

fn dedup_in_order(ids: Vec<TermId>) -> Vec<TermId> {
    let mut seen = AHashSet::with_capacity(ids.len());
    ids.into_iter().filter(|id| seen.insert(*id)).collect()
}

fn has_node_subject(store: &TripleStore, subject: TermId) -> bool {
    store.term(subject).is_some_and(Term::is_node)
}

/// Run `round` to a fixpoint and commit the overlay.
fn saturate<F>(
    store: &mut TripleStore,
    rule: &str,
    ctx: &InferenceContext<'_>,
    round: F,
) -> Result<InferenceReport>
where
    F: Fn(&TripleStore, &Overlay) -> Vec<TripleKey>,
{
    let mut overlay = Overlay::default();
    let mut report = InferenceReport::new(rule);
    loop {
        ctx.cancel.check()?;
        let fresh = round(store, &overlay);
        if fresh.is_empty() {
            break;
        }
        report.iterations += 1;
        if report.iterations > ctx.config.max_inference_iterations {
            return Err(Error::Convergence {
                rule: rule.to_string(),
                iterations: ctx.config.max_inference_iterations,
            });
        }
        for key in fresh {
            overlay.push(key);
        }
    }
    for key in overlay.added {
        if store.insert_key(key)? {
            report.derived += 1;
        }
    }
    Ok(report)
}

// ============================================================================
// Builtin rules
// ============================================================================

/// For every `(P, rdf:type, owl:SymmetricProperty)` and `(s, P, o)`, derive
/// `(o, P, s)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SymmetricRule;

impl Rule for SymmetricRule {
    fn name(&self) -> &str {
        "symmetric"
    }

    fn apply(&self, graph: &Graph, ctx: &InferenceContext<'_>) -> Result<InferenceReport> {
        let mut store = graph.write()?;
        saturate(&mut store, self.name(), ctx, |store, overlay| {
            let mut fresh = Vec::new();
            let mut round_seen = AHashSet::new();
            for p in overlay.typed(store, vocab::OWL_SYMMETRIC_PROPERTY) {
                for (s, o) in overlay.edges(store, p) {
                    let key = [o, p, s];
                    if has_node_subject(store, o)
                        && !overlay.contains(store, &key)
                        && round_seen.insert(key)
                    {
                        fresh.push(key);
                    }
                }
            }
            fresh
        })
    }
}

/// Transitive closure of every `owl:TransitiveProperty` plus the configured
/// implicitly transitive predicates.
///
/// Each round composes the relation with itself, so a chain of length `n`
/// closes in about `log2(n)` rounds. Predicates are independent and are
/// processed in parallel.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransitiveRule;

impl TransitiveRule {
    fn compose(store: &TripleStore, overlay: &Overlay, p: TermId) -> Vec<TripleKey> {
        let edges = overlay.edges(store, p);
        let mut successors: AHashMap<TermId, Vec<TermId>> = AHashMap::new();
        for &(s, o) in &edges {
            successors.entry(s).or_default().push(o);
        }
        let mut fresh = Vec::new();
        let mut round_seen = AHashSet::new();
        for &(a, b) in &edges {
            if !has_node_subject(store, a) {
                continue;
            }
            let Some(next) = successors.get(&b) else { continue };
            for &c in next {
                let key = [a, p, c];
                if !overlay.contains(store, &key) && round_seen.insert(key) {
                    fresh.push(key);
                }
            }
        }
        fresh
    }
}

impl Rule for TransitiveRule {
    fn name(&self) -> &str {
        "transitive"
    }

    fn apply(&self, graph: &Graph, ctx: &InferenceContext<'_>) -> Result<InferenceReport> {
        let mut store = graph.write()?;
        let implicit: Vec<TermId> = ctx
            .config
            .implicit_transitive
            .iter()
            .filter_map(|p| store.id_of(&Term::iri(p.as_str())))
            .collect();

        saturate(&mut store, self.name(), ctx, |store, overlay| {
            let mut predicates = overlay.typed(store, vocab::OWL_TRANSITIVE_PROPERTY);
            predicates.extend(implicit.iter().copied());
            let predicates = dedup_in_order(predicates);
            predicates
                .par_iter()
                .map(|&p| Self::compose(store, overlay, p))
                .collect::<Vec<_>>()
                .into_iter()
                .flatten()
                .collect()
        })
    }
}

// ============================================================================
// Geocoding rule
// ============================================================================

/// A resolved location.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GeocodeError {
    /// Quota exhausted; no further lookups should be attempted.
    #[error("geocoder over query limit")]
    OverQueryLimit,

    #[error("no geocoding results")]
    NoResults,

    #[error("geocoder request failed: {0}")]
    Request(String),
}

/// Address lookup service.
pub trait Geocoder: Send + Sync {
    fn geocode(&self, address: &str) -> std::result::Result<Coordinates, GeocodeError>;
}

impl<G: Geocoder + ?Sized> Geocoder for Arc<G> {
    fn geocode(&self, address: &str) -> std::result::Result<Coordinates, GeocodeError> {
        (**self).geocode(address)
    }
}

/// `geo`: for every `(place, address_predicate, address)` derive
/// `(place, lat_predicate, lat)` and `(place, lng_predicate, lng)`.
///
/// Lookups run without holding the graph lock; results are inserted under a
/// single write lock at the end.
pub struct GeocodeRule<G> {
    geocoder: G,
    address_predicate: String,
    lat_predicate: String,
    lng_predicate: String,
}

impl<G: Geocoder> GeocodeRule<G> {
    pub fn new(geocoder: G) -> Self {
        Self {
            geocoder,
            address_predicate: "location:address".to_string(),
            lat_predicate: "location:lat".to_string(),
            lng_predicate: "location:lng".to_string(),
        }
    }

    pub fn with_predicates(
        mut self,
        address: impl Into<String>,
        lat: impl Into<String>,
        lng: impl Into<String>,
    ) -> Self {
        self.address_predicate = address.into();
        self.lat_predicate = lat.into();
        self.lng_predicate = lng.into();
        self
    }

    /// Expand the rule's prefixed predicates through `prefixes`, the same way
    /// request data is expanded before it is stored.
    pub fn with_prefixes(mut self, prefixes: &PrefixTable) -> Self {
        self.address_predicate = prefixes.resolve(&self.address_predicate).into_owned();
        self.lat_predicate = prefixes.resolve(&self.lat_predicate).into_owned();
        self.lng_predicate = prefixes.resolve(&self.lng_predicate).into_owned();
        self
    }

    /// Distinct `(place, address text)` pairs, in insertion order.
    fn addresses(&self, graph: &Graph, report: &mut InferenceReport) -> Result<Vec<(Term, String)>> {
        let store = graph.read()?;
        let Some(p) = store.id_of(&Term::iri(self.address_predicate.as_str())) else {
            return Ok(Vec::new());
        };
        let mut seen = AHashSet::new();
        let mut out = Vec::new();
        for [s, _, o] in store.matching_keys(&[None, Some(p), None]) {
            let (Some(place), Some(address)) = (store.term(s), store.term(o)) else {
                continue;
            };
            if !place.is_node() {
                report.skipped.push(SkippedRecord {
                    subject: place.to_string(),
                    reason: "literal subject".to_string(),
                });
                continue;
            }
            let Some(text) = address.text() else {
                report.skipped.push(SkippedRecord {
                    subject: place.to_string(),
                    reason: format!("address {address} is not text"),
                });
                continue;
            };
            if seen.insert((s, o)) {
                out.push((place.clone(), text.to_string()));
            }
        }
        Ok(out)
    }
}

impl<G: Geocoder> Rule for GeocodeRule<G> {
    fn name(&self) -> &str {
        "geo"
    }

    fn apply(&self, graph: &Graph, ctx: &InferenceContext<'_>) -> Result<InferenceReport> {
        let started = Instant::now();
        let mut report = InferenceReport::new(self.name());
        let pending = self.addresses(graph, &mut report)?;

        let lat = Term::iri(self.lat_predicate.as_str());
        let lng = Term::iri(self.lng_predicate.as_str());
        let mut derived: Vec<Triple> = Vec::with_capacity(pending.len() * 2);
        let mut remaining = pending.iter();
        while let Some((place, address)) = remaining.next() {
            ctx.cancel.check()?;
            let coords = match self.geocoder.geocode(address) {
                Ok(coords) => coords,
                Err(GeocodeError::OverQueryLimit) => {
                    tracing::warn!(graph = %graph.name(), address = %address, "geocoder over query limit, aborting");
                    report.skipped.push(SkippedRecord {
                        subject: place.to_string(),
                        reason: GeocodeError::OverQueryLimit.to_string(),
                    });
                    for (place, _) in remaining.by_ref() {
                        report.skipped.push(SkippedRecord {
                            subject: place.to_string(),
                            reason: "not attempted: geocoder over query limit".to_string(),
                        });
                    }
                    break;
                }
                Err(err) => {
                    tracing::warn!(graph = %graph.name(), address = %address, error = %err, "geocoding failed");
                    report.skipped.push(SkippedRecord {
                        subject: place.to_string(),
                        reason: err.to_string(),
                    });
                    continue;
                }
            };
            match (Term::float(coords.lat), Term::float(coords.lng)) {
                (Ok(lat_value), Ok(lng_value)) => {
                    derived.push(Triple::new(place.clone(), lat.clone(), lat_value));
                    derived.push(Triple::new(place.clone(), lng.clone(), lng_value));
                }
                _ => report.skipped.push(SkippedRecord {
                    subject: place.to_string(),
                    reason: "geocoder returned non-finite coordinates".to_string(),
                }),
            }
        }

        if !derived.is_empty() {
            let mut store = graph.write()?;
            for triple in &derived {
                if store.add(triple)? {
                    report.derived += 1;
                }
            }
            report.iterations = 1;
        }
        tracing::debug!(
            graph = %graph.name(),
            derived = report.derived,
            skipped = report.skipped.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "geo rule applied"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Database;
    use crate::term::TriplePattern;

    fn typed(p: &str, class: &str) -> Triple {
        Triple::iris(p, vocab::RDF_TYPE, class)
    }

    #[test]
    fn symmetric_adds_reverse_edges_once() {
        let db = Database::default();
        let g = db.graph("g").unwrap();
        g.add(&typed("spouse", vocab::OWL_SYMMETRIC_PROPERTY)).unwrap();
        g.add(&Triple::iris("x", "spouse", "y")).unwrap();
        g.add(&Triple::iris("x", "other", "y")).unwrap();

        let report = db.infer("g", "symmetric", &Cancellation::new()).unwrap();
        assert_eq!(report.derived, 1);
        assert!(g.read().unwrap().contains(&Triple::iris("y", "spouse", "x")));
        assert!(!g.read().unwrap().contains(&Triple::iris("y", "other", "x")));

        let again = db.infer("g", "symmetric", &Cancellation::new()).unwrap();
        assert_eq!(again.derived, 0);
        assert_eq!(again.iterations, 0);
    }

    #[test]
    fn symmetric_skips_literal_objects() {
        let db = Database::default();
        let g = db.graph("g").unwrap();
        g.add(&typed("near", vocab::OWL_SYMMETRIC_PROPERTY)).unwrap();
        g.add(&Triple::new(Term::iri("x"), Term::iri("near"), Term::int(3)))
            .unwrap();
        let report = db.infer("g", "symmetric", &Cancellation::new()).unwrap();
        assert_eq!(report.derived, 0);
    }

    #[test]
    fn transitive_closes_declared_and_implicit_predicates() {
        let db = Database::default();
        let g = db.graph("g").unwrap();
        g.add(&typed("ancestor", vocab::OWL_TRANSITIVE_PROPERTY)).unwrap();
        for (s, o) in [("a", "b"), ("b", "c"), ("c", "d")] {
            g.add(&Triple::iris(s, "ancestor", o)).unwrap();
        }
        g.add(&Triple::iris("cat", vocab::RDFS_SUBCLASS_OF, "mammal")).unwrap();
        g.add(&Triple::iris("mammal", vocab::RDFS_SUBCLASS_OF, "animal")).unwrap();

        let report = db.infer("g", "transitive", &Cancellation::new()).unwrap();
        // a-c, b-d, a-d and cat-animal
        assert_eq!(report.derived, 4);
        let store = g.read().unwrap();
        assert!(store.contains(&Triple::iris("a", "ancestor", "d")));
        assert!(store.contains(&Triple::iris("cat", vocab::RDFS_SUBCLASS_OF, "animal")));
        store.check_invariants().unwrap();
    }

    #[test]
    fn non_convergence_leaves_graph_unchanged() {
        let config = EngineConfig {
            max_inference_iterations: 1,
            ..EngineConfig::default()
        };
        let db = Database::new(config);
        let g = db.graph("g").unwrap();
        g.add(&typed("next", vocab::OWL_TRANSITIVE_PROPERTY)).unwrap();
        for (s, o) in [("a", "b"), ("b", "c"), ("c", "d"), ("d", "e")] {
            g.add(&Triple::iris(s, "next", o)).unwrap();
        }
        let before = g.count(&TriplePattern::any()).unwrap();
        let err = db.infer("g", "transitive", &Cancellation::new()).unwrap_err();
        assert!(matches!(err, Error::Convergence { .. }));
        assert_eq!(g.count(&TriplePattern::any()).unwrap(), before);
    }

    #[test]
    fn unknown_rule_is_a_validation_error() {
        let db = Database::default();
        let err = db.infer("g", "owl-full", &Cancellation::new()).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Validation);
    }

    struct FixedGeocoder;

    impl Geocoder for FixedGeocoder {
        fn geocode(&self, address: &str) -> std::result::Result<Coordinates, GeocodeError> {
            match address {
                "limit" => Err(GeocodeError::OverQueryLimit),
                "nowhere" => Err(GeocodeError::NoResults),
                _ => Ok(Coordinates {
                    lat: 52.5,
                    lng: 13.25,
                }),
            }
        }
    }

    fn address(place: &str, text: &str) -> Triple {
        Triple::new(Term::iri(place), Term::iri("location:address"), Term::string(text))
    }

    #[test]
    fn geo_rule_derives_coordinates_and_skips_failures() {
        let mut db = Database::default();
        db.register_rule(Arc::new(GeocodeRule::new(FixedGeocoder)));
        let g = db.graph("g").unwrap();
        g.add(&address("office", "Berlin")).unwrap();
        g.add(&address("ghost", "nowhere")).unwrap();

        let report = db.infer("g", "geo", &Cancellation::new()).unwrap();
        assert_eq!(report.derived, 2);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(
            g.value(&TriplePattern::new(
                Some(Term::iri("office")),
                Some(Term::iri("location:lat")),
                None
            ))
            .unwrap(),
            Some(Term::float(52.5).unwrap())
        );
    }

    #[test]
    fn geo_rule_matches_prefix_expanded_predicates() {
        let prefixes = PrefixTable::new().with("location", "http://loc.example/");
        let mut db = Database::default();
        db.register_rule(Arc::new(GeocodeRule::new(FixedGeocoder).with_prefixes(&prefixes)));
        let g = db.graph("g").unwrap();
        g.add(&Triple::new(
            Term::iri("office"),
            Term::iri("http://loc.example/address"),
            Term::string("Berlin"),
        ))
        .unwrap();
        // unexpanded spelling is a different predicate once the prefix is mapped
        g.add(&address("ghost", "Berlin")).unwrap();

        let report = db.infer("g", "geo", &Cancellation::new()).unwrap();
        assert_eq!(report.derived, 2);
        assert_eq!(
            g.value(&TriplePattern::new(
                Some(Term::iri("office")),
                Some(Term::iri("http://loc.example/lng")),
                None
            ))
            .unwrap(),
            Some(Term::float(13.25).unwrap())
        );
        assert_eq!(
            g.count(&TriplePattern::new(Some(Term::iri("ghost")), None, None)).unwrap(),
            1
        );
    }

    #[test]
    fn geo_rule_stops_at_quota() {
        let mut db = Database::default();
        db.register_rule(Arc::new(GeocodeRule::new(FixedGeocoder)));
        let g = db.graph("g").unwrap();
        g.add(&address("a", "Berlin")).unwrap();
        g.add(&address("b", "limit")).unwrap();
        g.add(&address("c", "Paris")).unwrap();

        let report = db.infer("g", "geo", &Cancellation::new()).unwrap();
        assert_eq!(report.derived, 2);
        assert_eq!(report.skipped.len(), 2);
        assert!(report.skipped[1].reason.starts_with("not attempted"));
    }
}
