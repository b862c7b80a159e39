//! Conjunctive pattern queries.
//!
//! Patterns are joined left to right with a backtracking nested-loop join.
//! Variables are compiled to dense slots and bindings are kept in term-id
//! space; terms are only materialised for the final solutions.
//!
//! Post-processing runs in a fixed order: filter, projection, distinct,
//! ordering, then offset/limit.

use std::cmp::Ordering;

use ahash::{AHashMap, AHashSet};
use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::cancel::Cancellation;
use crate::error::{Error, Result};
use crate::interner::TermId;
use crate::store::{KeyPattern, TripleStore};
use crate::term::{Term, BLANK_PREFIX};

// ============================================================================
// Query model
// ============================================================================

/// One position of a query pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternTerm {
    /// Anonymous wildcard; matches anything and is never projected.
    Any,
    /// Named variable, stored without the leading `?`.
    Var(String),
    /// A fixed term; acts as a filter, never binds.
    Value(Term),
}

impl PatternTerm {
    /// Variable from `?name` or `name`.
    pub fn var(name: &str) -> Self {
        PatternTerm::Var(strip_var(name).to_string())
    }
}

impl From<Term> for PatternTerm {
    fn from(term: Term) -> Self {
        PatternTerm::Value(term)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryPattern {
    pub subject: PatternTerm,
    pub predicate: PatternTerm,
    pub object: PatternTerm,
}

impl QueryPattern {
    pub fn new(
        subject: impl Into<PatternTerm>,
        predicate: impl Into<PatternTerm>,
        object: impl Into<PatternTerm>,
    ) -> Self {
        Self {
            subject: subject.into(),
            predicate: predicate.into(),
            object: object.into(),
        }
    }

    fn positions(&self) -> [&PatternTerm; 3] {
        [&self.subject, &self.predicate, &self.object]
    }
}

/// Comparison operator of a [`Filter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Gt,
    Lt,
    Ge,
    Le,
    Eq,
    Ne,
    /// Case-insensitive prefix match on text.
    Like,
}

impl FilterOp {
    pub fn parse(op: &str) -> Result<Self> {
        Ok(match op {
            ">" => FilterOp::Gt,
            "<" => FilterOp::Lt,
            ">=" => FilterOp::Ge,
            "<=" => FilterOp::Le,
            "==" => FilterOp::Eq,
            "!=" => FilterOp::Ne,
            "LIKE" | "like" => FilterOp::Like,
            other => {
                return Err(Error::validation(
                    "filter",
                    format!("unknown operator `{other}`"),
                ))
            }
        })
    }
}

/// `?key op val`. Unbound or incomparable values fail the filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub key: String,
    pub op: FilterOp,
    pub val: Term,
}

impl Filter {
    pub fn new(key: &str, op: FilterOp, val: Term) -> Self {
        Self {
            key: strip_var(key).to_string(),
            op,
            val,
        }
    }

    fn accepts(&self, term: &Term) -> bool {
        if self.op == FilterOp::Like {
            return match (filter_text(term), filter_text(&self.val)) {
                (Some(a), Some(b)) => a.to_lowercase().starts_with(&b.to_lowercase()),
                _ => false,
            };
        }
        let Some(ord) = compare_for_filter(term, &self.val) else {
            return false;
        };
        match self.op {
            FilterOp::Gt => ord == Ordering::Greater,
            FilterOp::Lt => ord == Ordering::Less,
            FilterOp::Ge => ord != Ordering::Less,
            FilterOp::Le => ord != Ordering::Greater,
            FilterOp::Eq => ord == Ordering::Equal,
            FilterOp::Ne => ord != Ordering::Equal,
            FilterOp::Like => false,
        }
    }
}

fn filter_text(term: &Term) -> Option<String> {
    match term {
        Term::Iri(s) | Term::Str(s) => Some(s.clone()),
        Term::BlankNode(s) => Some(format!("{BLANK_PREFIX}{s}")),
        _ => None,
    }
}

fn compare_for_filter(a: &Term, b: &Term) -> Option<Ordering> {
    match (a, b) {
        (Term::Number(x), Term::Number(y)) => Some(x.cmp_value(*y)),
        (Term::Bool(x), Term::Bool(y)) => Some(x.cmp(y)),
        _ => {
            let (x, y) = (filter_text(a)?, filter_text(b)?);
            Some(x.to_lowercase().cmp(&y.to_lowercase()))
        }
    }
}

/// Result shaping for [`evaluate`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryOptions {
    /// Variables to keep, in output order. `None` keeps every variable in
    /// first-seen order.
    pub select: Option<Vec<String>>,
    pub distinct: bool,
    /// Indices of patterns with left-outer semantics.
    pub optional: Vec<usize>,
    pub filter: Vec<Filter>,
    /// Variable name; a leading `-` sorts descending.
    pub order_by: Option<String>,
    pub limit: Option<usize>,
    pub offset: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    pub patterns: Vec<QueryPattern>,
    pub options: QueryOptions,
}

impl Query {
    pub fn new(patterns: Vec<QueryPattern>) -> Self {
        Self {
            patterns,
            options: QueryOptions::default(),
        }
    }

    pub fn with_options(mut self, options: QueryOptions) -> Self {
        self.options = options;
        self
    }
}

// ============================================================================
// Solutions
// ============================================================================

/// One row of variable bindings, in projection order. Unbound optional
/// variables are absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Solution {
    bindings: Vec<(String, Term)>,
}

impl Solution {
    pub fn get(&self, var: &str) -> Option<&Term> {
        let var = strip_var(var);
        self.bindings.iter().find(|(k, _)| k == var).map(|(_, t)| t)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Term)> {
        self.bindings.iter().map(|(k, t)| (k.as_str(), t))
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, Term)> for Solution {
    fn from_iter<I: IntoIterator<Item = (K, Term)>>(iter: I) -> Self {
        Self {
            bindings: iter.into_iter().map(|(k, t)| (k.into(), t)).collect(),
        }
    }
}

impl Serialize for Solution {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.bindings.len()))?;
        for (var, term) in &self.bindings {
            map.serialize_entry(var, &crate::codec::WireTerm(term))?;
        }
        map.end()
    }
}

// ============================================================================
// Evaluation
// ============================================================================

/// Evaluate `query` against one consistent view of `store`.
pub fn evaluate(store: &TripleStore, query: &Query, cancel: &Cancellation) -> Result<Vec<Solution>> {
    let plan = Plan::compile(store, query)?;
    let rows = plan.rows(store, cancel)?;
    let projection = plan.projection.clone();
    Ok(rows
        .into_iter()
        .map(|row| {
            projection
                .iter()
                .filter_map(|&slot| {
                    let term = store.term(row[slot]?)?;
                    Some((plan.vars[slot].clone(), term.clone()))
                })
                .collect()
        })
        .collect())
}

/// Number of solutions `evaluate` would return.
pub fn count(store: &TripleStore, query: &Query, cancel: &Cancellation) -> Result<usize> {
    let plan = Plan::compile(store, query)?;
    Ok(plan.rows(store, cancel)?.len())
}

type Row = Vec<Option<TermId>>;

#[derive(Debug, Clone, Copy)]
enum Slot {
    Any,
    Var(usize),
    /// A fixed term; `None` if the store has never seen it.
    Value(Option<TermId>),
}

struct Plan<'q> {
    patterns: Vec<[Slot; 3]>,
    optional: Vec<bool>,
    vars: Vec<String>,
    projection: Vec<usize>,
    filters: Vec<(usize, &'q Filter)>,
    order: Option<(usize, bool)>,
    options: &'q QueryOptions,
}

impl<'q> Plan<'q> {
    fn compile(store: &TripleStore, query: &'q Query) -> Result<Self> {
        if query.patterns.is_empty() {
            return Err(Error::validation("query", "at least one pattern is required"));
        }
        let mut vars: Vec<String> = Vec::new();
        let mut slots: AHashMap<String, usize> = AHashMap::new();
        let mut patterns = Vec::with_capacity(query.patterns.len());
        for pattern in &query.patterns {
            let mut compiled = [Slot::Any; 3];
            for (i, position) in pattern.positions().into_iter().enumerate() {
                compiled[i] = match position {
                    PatternTerm::Any => Slot::Any,
                    PatternTerm::Value(term) => Slot::Value(store.id_of(term)),
                    PatternTerm::Var(name) => {
                        let name = strip_var(name);
                        if name.is_empty() {
                            return Err(Error::validation("query", "variable without a name"));
                        }
                        let next = vars.len();
                        let slot = *slots.entry(name.to_string()).or_insert(next);
                        if slot == next {
                            vars.push(name.to_string());
                        }
                        Slot::Var(slot)
                    }
                };
            }
            patterns.push(compiled);
        }

        let options = &query.options;
        let lookup = |what: &'static str, name: &str| -> Result<usize> {
            slots
                .get(strip_var(name))
                .copied()
                .ok_or_else(|| Error::validation(what, format!("unknown variable `{name}`")))
        };

        let mut optional = vec![false; patterns.len()];
        for &index in &options.optional {
            let flag = optional.get_mut(index).ok_or_else(|| {
                Error::validation("optional", format!("pattern index {index} out of range"))
            })?;
            *flag = true;
        }

        let projection = match &options.select {
            Some(select) if !select.is_empty() => select
                .iter()
                .map(|name| lookup("select", name))
                .collect::<Result<Vec<_>>>()?,
            _ => (0..vars.len()).collect(),
        };

        let filters = options
            .filter
            .iter()
            .map(|f| Ok((lookup("filter", &f.key)?, f)))
            .collect::<Result<Vec<_>>>()?;

        let order = match options.order_by.as_deref() {
            None | Some("") => None,
            Some(raw) => {
                let (descending, name) = match raw.strip_prefix('-') {
                    Some(rest) => (true, rest),
                    None => (false, raw),
                };
                Some((lookup("order_by", name)?, descending))
            }
        };

        Ok(Self {
            patterns,
            optional,
            vars,
            projection,
            filters,
            order,
            options,
        })
    }

    /// Join, then apply every post-processing step except materialisation.
    fn rows(&self, store: &TripleStore, cancel: &Cancellation) -> Result<Vec<Row>> {
        let mut rows = Vec::new();
        let mut binding: Row = vec![None; self.vars.len()];
        self.solve(store, 0, &mut binding, &mut rows, cancel)?;

        if !self.filters.is_empty() {
            rows.retain(|row| {
                self.filters.iter().all(|(slot, filter)| {
                    row[*slot]
                        .and_then(|id| store.term(id))
                        .is_some_and(|term| filter.accepts(term))
                })
            });
        }

        if self.options.distinct {
            let mut seen: AHashSet<Vec<Option<TermId>>> = AHashSet::new();
            rows.retain(|row| seen.insert(self.projection.iter().map(|&s| row[s]).collect()));
        }

        if let Some((slot, descending)) = self.order {
            rows.sort_by(|a, b| {
                let ta = a[slot].and_then(|id| store.term(id));
                let tb = b[slot].and_then(|id| store.term(id));
                match (ta, tb) {
                    (Some(x), Some(y)) if descending => y.sort_cmp(x),
                    (Some(x), Some(y)) => x.sort_cmp(y),
                    (Some(_), None) => Ordering::Less,
                    (None, Some(_)) => Ordering::Greater,
                    (None, None) => Ordering::Equal,
                }
            });
        }

        let limit = self.options.limit.unwrap_or(usize::MAX);
        Ok(rows.into_iter().skip(self.options.offset).take(limit).collect())
    }

    fn solve(
        &self,
        store: &TripleStore,
        level: usize,
        binding: &mut Row,
        out: &mut Vec<Row>,
        cancel: &Cancellation,
    ) -> Result<()> {
        cancel.check()?;
        let Some(pattern) = self.patterns.get(level) else {
            out.push(binding.clone());
            return Ok(());
        };

        let mut key_pattern: KeyPattern = [None; 3];
        let mut satisfiable = true;
        for (i, slot) in pattern.iter().enumerate() {
            key_pattern[i] = match *slot {
                Slot::Any => None,
                Slot::Var(v) => binding[v],
                Slot::Value(Some(id)) => Some(id),
                Slot::Value(None) => {
                    satisfiable = false;
                    None
                }
            };
        }

        let mut matched = false;
        if satisfiable {
            let mut newly_bound: Vec<usize> = Vec::with_capacity(3);
            for key in store.matching_keys(&key_pattern) {
                let mut consistent = true;
                for (i, slot) in pattern.iter().enumerate() {
                    let Slot::Var(v) = *slot else { continue };
                    match binding[v] {
                        Some(bound) if bound != key[i] => {
                            consistent = false;
                            break;
                        }
                        Some(_) => {}
                        None => {
                            binding[v] = Some(key[i]);
                            newly_bound.push(v);
                        }
                    }
                }
                if consistent {
                    matched = true;
                    self.solve(store, level + 1, binding, out, cancel)?;
                }
                for v in newly_bound.drain(..) {
                    binding[v] = None;
                }
            }
        }

        if !matched && self.optional[level] {
            self.solve(store, level + 1, binding, out, cancel)?;
        }
        Ok(())
    }
}

fn strip_var(name: &str) -> &str {
    name.strip_prefix('?').unwrap_or(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::term::Triple;

    fn var(name: &str) -> PatternTerm {
        PatternTerm::var(name)
    }

    fn iri(s: &str) -> PatternTerm {
        PatternTerm::Value(Term::iri(s))
    }

    fn people() -> TripleStore {
        let mut store = TripleStore::new();
        store.add(&Triple::iris("a", "knows", "b")).unwrap();
        store
            .add(&Triple::new(Term::iri("a"), Term::iri("name"), Term::string("Ann")))
            .unwrap();
        store
            .add(&Triple::new(Term::iri("b"), Term::iri("name"), Term::string("Bob")))
            .unwrap();
        store.add(&Triple::iris("b", "knows", "c")).unwrap();
        store
    }

    #[test]
    fn join_shares_variable_bindings() {
        let store = people();
        let query = Query::new(vec![
            QueryPattern::new(var("?x"), iri("knows"), iri("b")),
            QueryPattern::new(var("?x"), iri("name"), var("?n")),
        ]);
        let solutions = evaluate(&store, &query, &Cancellation::new()).unwrap();
        let expected: Solution = [("x", Term::iri("a")), ("n", Term::string("Ann"))]
            .into_iter()
            .collect();
        assert_eq!(solutions, vec![expected]);
    }

    #[test]
    fn repeated_variable_in_one_pattern_must_agree() {
        let mut store = TripleStore::new();
        store.add(&Triple::iris("a", "likes", "a")).unwrap();
        store.add(&Triple::iris("a", "likes", "b")).unwrap();
        let query = Query::new(vec![QueryPattern::new(var("x"), iri("likes"), var("x"))]);
        let solutions = evaluate(&store, &query, &Cancellation::new()).unwrap();
        assert_eq!(solutions.len(), 1);
        assert_eq!(solutions[0].get("x"), Some(&Term::iri("a")));
    }

    #[test]
    fn unknown_literal_short_circuits() {
        let store = people();
        let query = Query::new(vec![QueryPattern::new(var("x"), iri("name"), Term::string("Zed"))]);
        assert!(evaluate(&store, &query, &Cancellation::new()).unwrap().is_empty());
    }

    #[test]
    fn wildcards_are_not_projected() {
        let store = people();
        let query = Query::new(vec![QueryPattern::new(var("x"), PatternTerm::Any, iri("b"))]);
        let solutions = evaluate(&store, &query, &Cancellation::new()).unwrap();
        assert_eq!(solutions.len(), 1);
        assert_eq!(solutions[0].len(), 1);
    }

    #[test]
    fn optional_pattern_keeps_unmatched_rows() {
        let store = people();
        let query = Query::new(vec![
            QueryPattern::new(var("x"), iri("name"), var("n")),
            QueryPattern::new(var("x"), iri("knows"), var("y")),
            QueryPattern::new(var("y"), iri("name"), var("yn")),
        ])
        .with_options(QueryOptions {
            optional: vec![2],
            ..QueryOptions::default()
        });
        let solutions = evaluate(&store, &query, &Cancellation::new()).unwrap();
        assert_eq!(solutions.len(), 2);
        assert_eq!(solutions[0].get("yn"), Some(&Term::string("Bob")));
        assert_eq!(solutions[1].get("y"), Some(&Term::iri("c")));
        assert_eq!(solutions[1].get("yn"), None);
    }

    #[test]
    fn select_distinct_order_and_page() {
        let store = people();
        let base = vec![QueryPattern::new(var("x"), var("p"), var("o"))];

        let distinct = Query::new(base.clone()).with_options(QueryOptions {
            select: Some(vec!["?x".into()]),
            distinct: true,
            order_by: Some("-x".into()),
            ..QueryOptions::default()
        });
        let xs: Vec<Term> = evaluate(&store, &distinct, &Cancellation::new())
            .unwrap()
            .iter()
            .filter_map(|s| s.get("x").cloned())
            .collect();
        assert_eq!(xs, vec![Term::iri("b"), Term::iri("a")]);

        let paged = Query::new(base).with_options(QueryOptions {
            offset: 1,
            limit: Some(2),
            ..QueryOptions::default()
        });
        assert_eq!(count(&store, &paged, &Cancellation::new()).unwrap(), 2);
    }

    #[test]
    fn filters_compare_by_kind() {
        let mut store = TripleStore::new();
        for (s, v) in [("a", 1), ("b", 5), ("c", 10)] {
            store.add(&Triple::new(Term::iri(s), Term::iri("n"), Term::int(v))).unwrap();
        }
        store
            .add(&Triple::new(Term::iri("d"), Term::iri("n"), Term::string("Delta")))
            .unwrap();
        let run = |filter: Filter| -> usize {
            let q = Query::new(vec![QueryPattern::new(var("s"), iri("n"), var("v"))]).with_options(
                QueryOptions {
                    filter: vec![filter],
                    ..QueryOptions::default()
                },
            );
            count(&store, &q, &Cancellation::new()).unwrap()
        };
        assert_eq!(run(Filter::new("v", FilterOp::Gt, Term::int(5))), 1);
        assert_eq!(run(Filter::new("v", FilterOp::Ge, Term::int(5))), 2);
        assert_eq!(run(Filter::new("?v", FilterOp::Lt, Term::float(5.5).unwrap())), 2);
        assert_eq!(run(Filter::new("v", FilterOp::Ne, Term::int(5))), 2);
        assert_eq!(run(Filter::new("v", FilterOp::Like, Term::string("de"))), 1);
        assert_eq!(run(Filter::new("v", FilterOp::Eq, Term::string("delta"))), 1);
    }

    #[test]
    fn bad_options_are_validation_errors() {
        let store = people();
        let pattern = vec![QueryPattern::new(var("x"), iri("knows"), var("y"))];
        for options in [
            QueryOptions {
                select: Some(vec!["z".into()]),
                ..QueryOptions::default()
            },
            QueryOptions {
                optional: vec![3],
                ..QueryOptions::default()
            },
            QueryOptions {
                order_by: Some("-nope".into()),
                ..QueryOptions::default()
            },
        ] {
            let q = Query::new(pattern.clone()).with_options(options);
            assert!(matches!(
                evaluate(&store, &q, &Cancellation::new()),
                Err(Error::Validation { .. })
            ));
        }
        assert!(evaluate(&store, &Query::default(), &Cancellation::new()).is_err());
    }

    #[test]
    fn cancelled_evaluation_returns_nothing() {
        let store = people();
        let token = Cancellation::new();
        token.cancel();
        let q = Query::new(vec![QueryPattern::new(var("x"), var("p"), var("o"))]);
        assert!(matches!(evaluate(&store, &q, &token), Err(Error::Cancelled)));
    }
}
