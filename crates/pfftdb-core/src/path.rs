//! Shortest paths over an adjacency predicate.
//!
//! Endpoints are given by label: a node `n` carries label `l` when
//! `(n, name_predicate, l)` is stored. The search is a breadth-first walk
//! along `(a, adjacent_predicate, b)` edges in stored direction, so the first
//! path found has the fewest edges; among equally short paths the one
//! discovered first (by triple insertion order) wins.

use ahash::{AHashMap, AHashSet};

use crate::cancel::Cancellation;
use crate::error::{Error, Result};
use crate::interner::TermId;
use crate::store::TripleStore;
use crate::term::Term;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathRequest {
    pub start: Term,
    pub end: Term,
    pub name_predicate: Term,
    pub adjacent_predicate: Term,
}

/// One hop of a path: the node and its display label (if it has one).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathStep {
    pub node: Term,
    pub label: Option<Term>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Path {
    /// From start to end inclusive.
    pub steps: Vec<PathStep>,
    /// The adjacency predicate that was followed.
    pub predicate: Term,
}

impl Path {
    /// Number of edges.
    pub fn edges(&self) -> usize {
        self.steps.len().saturating_sub(1)
    }

    pub fn labels(&self) -> impl Iterator<Item = Option<&Term>> {
        self.steps.iter().map(|s| s.label.as_ref())
    }
}

/// Breadth-first search from `start` to `end`. `Ok(None)` when unreachable
/// (or farther than `max_depth` edges).
pub fn find_path(
    store: &TripleStore,
    request: &PathRequest,
    max_depth: Option<usize>,
    cancel: &Cancellation,
) -> Result<Option<Path>> {
    let start = resolve_label(store, &request.start, &request.name_predicate)?;
    let end = resolve_label(store, &request.end, &request.name_predicate)?;
    let name = store.id_of(&request.name_predicate);

    let build = |nodes: Vec<TermId>| -> Result<Path> {
        let steps = nodes
            .into_iter()
            .map(|id| {
                let node = store
                    .term(id)
                    .cloned()
                    .ok_or_else(|| Error::InvariantViolation(format!("unknown term id {}", id.raw())))?;
                let label = name
                    .and_then(|np| store.matching_keys(&[Some(id), Some(np), None]).next())
                    .and_then(|[_, _, o]| store.term(o).cloned());
                Ok(PathStep { node, label })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Path {
            steps,
            predicate: request.adjacent_predicate.clone(),
        })
    };

    if start == end {
        return build(vec![start]).map(Some);
    }
    let Some(adjacent) = store.id_of(&request.adjacent_predicate) else {
        return Ok(None);
    };

    let mut parent: AHashMap<TermId, TermId> = AHashMap::new();
    let mut visited: AHashSet<TermId> = AHashSet::from_iter([start]);
    let mut frontier = vec![start];
    let mut depth = 0usize;

    while !frontier.is_empty() {
        cancel.check()?;
        if max_depth.is_some_and(|max| depth >= max) {
            return Ok(None);
        }
        depth += 1;
        let mut next = Vec::new();
        for &node in &frontier {
            for [_, _, neighbour] in store.matching_keys(&[Some(node), Some(adjacent), None]) {
                if !visited.insert(neighbour) {
                    continue;
                }
                parent.insert(neighbour, node);
                if neighbour == end {
                    let mut chain = vec![end];
                    let mut cursor = end;
                    while let Some(&prev) = parent.get(&cursor) {
                        chain.push(prev);
                        cursor = prev;
                    }
                    chain.reverse();
                    return build(chain).map(Some);
                }
                next.push(neighbour);
            }
        }
        frontier = next;
    }
    Ok(None)
}

/// The unique node labelled `label`.
fn resolve_label(store: &TripleStore, label: &Term, name_predicate: &Term) -> Result<TermId> {
    let ambiguous = |matches: usize| Error::Ambiguous {
        label: label.to_string(),
        predicate: name_predicate.to_string(),
        matches,
    };
    let Some(np) = store.id_of(name_predicate) else {
        return Err(ambiguous(0));
    };

    // identifiers and string literals with the same text are the same label
    let forms: Vec<Term> = match label.text() {
        Some(text) => vec![Term::iri(text), Term::string(text)],
        None => vec![label.clone()],
    };
    let mut nodes: Vec<TermId> = Vec::new();
    for form in &forms {
        let Some(object) = store.id_of(form) else { continue };
        for [s, _, _] in store.matching_keys(&[None, Some(np), Some(object)]) {
            if !nodes.contains(&s) {
                nodes.push(s);
            }
        }
    }
    match nodes.as_slice() {
        [only] => Ok(*only),
        _ => Err(ambiguous(nodes.len())),
    }
}
