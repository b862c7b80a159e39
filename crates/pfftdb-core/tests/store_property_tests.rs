use std::collections::HashSet;

use pfftdb_core::codec::{term_to_json, Resolver};
use pfftdb_core::{
    Cancellation, Database, PrefixPolicy, PrefixTable, Term, Triple, TriplePattern, TripleStore,
};
use proptest::prelude::*;

const NODES: u8 = 6;
const PREDICATES: u8 = 3;

#[derive(Debug, Clone)]
enum Op {
    Add(u8, u8, u8),
    /// `None` fields are wildcards.
    Remove(Option<u8>, Option<u8>, Option<u8>),
}

fn node(i: u8) -> Term {
    if i % 3 == 0 {
        Term::blank(format!("b{i}"))
    } else {
        Term::iri(format!("n{i}"))
    }
}

fn predicate(i: u8) -> Term {
    Term::iri(format!("p{i}"))
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0..NODES, 0..PREDICATES, 0..NODES).prop_map(|(s, p, o)| Op::Add(s, p, o)),
        1 => (
            prop::option::of(0..NODES),
            prop::option::of(0..PREDICATES),
            prop::option::of(0..NODES),
        )
            .prop_map(|(s, p, o)| Op::Remove(s, p, o)),
    ]
}

fn term_strategy() -> impl Strategy<Value = Term> {
    prop_oneof![
        "[a-z][a-z0-9/#.-]{0,12}".prop_map(Term::iri),
        "[a-z][a-z0-9]{0,6}".prop_map(Term::blank),
        ".{0,12}".prop_map(Term::string),
        any::<i64>().prop_map(Term::int),
        (-1.0e9f64..1.0e9).prop_map(|f| Term::float(f).unwrap()),
        any::<bool>().prop_map(Term::Bool),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        failure_persistence: None,
        ..ProptestConfig::default()
    })]

    #[test]
    fn indexes_track_an_arbitrary_mutation_sequence(ops in prop::collection::vec(op_strategy(), 0..60)) {
        let mut store = TripleStore::new();
        let mut model: HashSet<Triple> = HashSet::new();

        for op in ops {
            match op {
                Op::Add(s, p, o) => {
                    let triple = Triple::new(node(s), predicate(p), node(o));
                    let inserted = store.add(&triple).unwrap();
                    prop_assert_eq!(inserted, model.insert(triple));
                }
                Op::Remove(s, p, o) => {
                    let pattern = TriplePattern::new(s.map(node), p.map(predicate), o.map(node));
                    let before = model.len();
                    model.retain(|t| !pattern.matches(t));
                    prop_assert_eq!(store.remove(&pattern).unwrap(), before - model.len());
                }
            }
            prop_assert!(store.check_invariants().is_ok());
        }

        let scanned: HashSet<Triple> = store.scan(&TriplePattern::any()).collect();
        prop_assert_eq!(&scanned, &model);
        prop_assert_eq!(store.len(), model.len());
        for s in 0..NODES {
            let pattern = TriplePattern::new(Some(node(s)), None, None);
            let expected = model.iter().filter(|t| pattern.matches(t)).count() as u64;
            prop_assert_eq!(store.count(&pattern), expected);
        }
    }

    #[test]
    fn wire_terms_round_trip(term in term_strategy()) {
        let table = PrefixTable::new();
        let resolver = Resolver::new(&table, PrefixPolicy::PassThrough);
        let json = term_to_json(&term);
        prop_assert_eq!(resolver.term(&json).unwrap(), term);
    }

    #[test]
    fn transitive_closure_matches_reachability(edges in prop::collection::vec((0..NODES, 0..NODES), 0..20)) {
        let db = Database::default();
        let g = db.graph("g").unwrap();
        g.add(&Triple::iris("reach", pfftdb_core::term::vocab::RDF_TYPE, pfftdb_core::term::vocab::OWL_TRANSITIVE_PROPERTY)).unwrap();
        let name = |i: u8| format!("v{i}");
        for (a, b) in &edges {
            g.add(&Triple::iris(&name(*a), "reach", &name(*b))).unwrap();
        }
        db.infer("g", "transitive", &Cancellation::new()).unwrap();

        // naive reachability in >= 1 hop
        let mut expected: HashSet<(u8, u8)> = edges.iter().copied().collect();
        loop {
            let mut grew = false;
            let snapshot: Vec<(u8, u8)> = expected.iter().copied().collect();
            for &(a, b) in &snapshot {
                for &(c, d) in &snapshot {
                    if b == c && expected.insert((a, d)) {
                        grew = true;
                    }
                }
            }
            if !grew {
                break;
            }
        }

        let pattern = TriplePattern::new(None, Some(Term::iri("reach")), None);
        prop_assert_eq!(g.count(&pattern).unwrap(), expected.len() as u64);
        for (a, b) in expected {
            prop_assert!(g.read().unwrap().contains(&Triple::iris(&name(a), "reach", &name(b))));
        }
    }
}
