//! Named-graph registry.
//!
//! A [`Database`] maps graph names to [`Graph`]s, creating them on first use.
//! Each graph owns one [`TripleStore`] behind a `parking_lot::RwLock`: reads
//! (scans, queries, path searches) share the lock for their whole evaluation,
//! mutations and closure inference take it exclusively. Every acquisition is
//! bounded by the configured lock timeout.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::cancel::Cancellation;
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::inference::{InferenceContext, InferenceReport, Rule, RuleRegistry};
use crate::path::{self, Path, PathRequest};
use crate::query::{self, Query, Solution};
use crate::store::{BulkReport, TripleOptions, TripleStore};
use crate::term::{Term, Triple, TriplePattern};

// ============================================================================
// Graph
// ============================================================================

/// One named graph: a locked triple store.
#[derive(Debug)]
pub struct Graph {
    name: String,
    store: RwLock<TripleStore>,
    lock_timeout: Duration,
}

impl Graph {
    fn new(name: &str, lock_timeout: Duration) -> Self {
        Self {
            name: name.to_string(),
            store: RwLock::new(TripleStore::new()),
            lock_timeout,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Shared access, waiting at most the configured lock timeout.
    pub fn read(&self) -> Result<RwLockReadGuard<'_, TripleStore>> {
        self.store
            .try_read_for(self.lock_timeout)
            .ok_or_else(|| self.timeout())
    }

    /// Exclusive access, waiting at most the configured lock timeout.
    pub fn write(&self) -> Result<RwLockWriteGuard<'_, TripleStore>> {
        self.store
            .try_write_for(self.lock_timeout)
            .ok_or_else(|| self.timeout())
    }

    fn timeout(&self) -> Error {
        tracing::warn!(graph = %self.name, waited_ms = self.lock_timeout.as_millis() as u64, "graph lock timeout");
        Error::LockTimeout {
            graph: self.name.clone(),
            waited: self.lock_timeout,
        }
    }

    pub fn add(&self, triple: &Triple) -> Result<bool> {
        self.write()?.add(triple)
    }

    pub fn add_bulk(&self, triples: &[Triple]) -> Result<BulkReport> {
        let started = Instant::now();
        let report = self.write()?.add_bulk(triples);
        tracing::debug!(
            graph = %self.name,
            inserted = report.inserted,
            skipped = report.skipped.len(),
            elapsed_us = started.elapsed().as_micros() as u64,
            "add_bulk"
        );
        Ok(report)
    }

    pub fn remove(&self, pattern: &TriplePattern) -> Result<usize> {
        self.remove_many(std::slice::from_ref(pattern))
    }

    /// Delete every triple matching any of `patterns` under one write lock.
    pub fn remove_many(&self, patterns: &[TriplePattern]) -> Result<usize> {
        let started = Instant::now();
        let removed = self.write()?.remove_many(patterns)?;
        tracing::debug!(
            graph = %self.name,
            patterns = patterns.len(),
            removed,
            elapsed_us = started.elapsed().as_micros() as u64,
            "remove"
        );
        Ok(removed)
    }

    pub fn remove_all(&self) -> Result<usize> {
        Ok(self.write()?.remove_all())
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.read()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.read()?.is_empty())
    }

    pub fn count(&self, pattern: &TriplePattern) -> Result<u64> {
        Ok(self.read()?.count(pattern))
    }

    pub fn value(&self, pattern: &TriplePattern) -> Result<Option<Term>> {
        Ok(self.read()?.value(pattern))
    }

    pub fn triples(&self, pattern: &TriplePattern, options: &TripleOptions) -> Result<Vec<Triple>> {
        self.read()?.triples(pattern, options)
    }

    /// Every triple, in insertion order.
    pub fn snapshot(&self) -> Result<Vec<Triple>> {
        Ok(self.read()?.scan(&TriplePattern::any()).collect())
    }

    pub fn query(&self, query: &Query, cancel: &Cancellation) -> Result<Vec<Solution>> {
        let started = Instant::now();
        let store = self.read()?;
        let solutions = query::evaluate(&store, query, cancel)?;
        drop(store);
        tracing::debug!(
            graph = %self.name,
            patterns = query.patterns.len(),
            solutions = solutions.len(),
            elapsed_us = started.elapsed().as_micros() as u64,
            "query"
        );
        Ok(solutions)
    }

    pub fn query_count(&self, query: &Query, cancel: &Cancellation) -> Result<usize> {
        let store = self.read()?;
        query::count(&store, query, cancel)
    }

    pub fn find_path(
        &self,
        request: &PathRequest,
        max_depth: Option<usize>,
        cancel: &Cancellation,
    ) -> Result<Option<Path>> {
        let started = Instant::now();
        let store = self.read()?;
        let found = path::find_path(&store, request, max_depth, cancel)?;
        drop(store);
        tracing::debug!(
            graph = %self.name,
            start = %request.start,
            end = %request.end,
            hops = found.as_ref().map(Path::edges),
            elapsed_us = started.elapsed().as_micros() as u64,
            "find_path"
        );
        Ok(found)
    }
}

// ============================================================================
// Database
// ============================================================================

/// Registry of named graphs plus the inference rules that can run on them.
#[derive(Debug)]
pub struct Database {
    config: EngineConfig,
    graphs: DashMap<String, Arc<Graph>>,
    rules: RuleRegistry,
}

impl Default for Database {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl Database {
    /// An empty database with the builtin rules registered.
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            graphs: DashMap::new(),
            rules: RuleRegistry::builtin(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn register_rule(&mut self, rule: Arc<dyn Rule>) {
        self.rules.register(rule);
    }

    pub fn rules(&self) -> &RuleRegistry {
        &self.rules
    }

    /// The graph called `name`, created empty if it does not exist yet.
    pub fn graph(&self, name: &str) -> Result<Arc<Graph>> {
        if name.is_empty() {
            return Err(Error::validation("graph", "graph name must not be empty"));
        }
        if let Some(graph) = self.graphs.get(name) {
            return Ok(Arc::clone(graph.value()));
        }
        let graph = self
            .graphs
            .entry(name.to_string())
            .or_insert_with(|| {
                tracing::debug!(graph = %name, "creating graph");
                Arc::new(Graph::new(name, self.config.lock_timeout()))
            })
            .clone();
        Ok(graph)
    }

    /// The graph called `name`, if it exists.
    pub fn get(&self, name: &str) -> Option<Arc<Graph>> {
        self.graphs.get(name).map(|g| Arc::clone(g.value()))
    }

    /// Names of all graphs, sorted.
    pub fn graphs(&self) -> Vec<String> {
        let mut names: Vec<String> = self.graphs.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Forget a graph. Returns `false` if it did not exist.
    pub fn drop_graph(&self, name: &str) -> bool {
        let dropped = self.graphs.remove(name).is_some();
        if dropped {
            tracing::info!(graph = %name, "dropped graph");
        }
        dropped
    }

    /// Copy every triple of `source` into `target`; returns how many were new.
    ///
    /// The source is snapshotted under its read lock and released before the
    /// target's write lock is taken, so the two locks are never held together.
    pub fn merge(&self, source: &str, target: &str) -> Result<usize> {
        let Some(from) = self.get(source) else {
            return Err(Error::validation("graph", format!("unknown graph `{source}`")));
        };
        let triples = from.snapshot()?;
        let into = self.graph(target)?;
        let report = into.add_bulk(&triples)?;
        tracing::debug!(source = %source, target = %target, inserted = report.inserted, "merge");
        Ok(report.inserted)
    }

    /// Apply the rule registered as `rule` to graph `graph`.
    pub fn infer(&self, graph: &str, rule: &str, cancel: &Cancellation) -> Result<InferenceReport> {
        let rule = self.rules.get(rule)?;
        let graph = self.graph(graph)?;
        let started = Instant::now();
        let ctx = InferenceContext {
            config: &self.config,
            cancel,
        };
        let report = rule.apply(&graph, &ctx)?;
        tracing::debug!(
            graph = %graph.name(),
            rule = %report.rule,
            derived = report.derived,
            iterations = report.iterations,
            elapsed_us = started.elapsed().as_micros() as u64,
            "inference"
        );
        Ok(report)
    }

    /// Shortest path in `graph`; `Ok(None)` if the end is unreachable.
    pub fn find_path(&self, graph: &str, request: &PathRequest, cancel: &Cancellation) -> Result<Option<Path>> {
        self.graph(graph)?
            .find_path(request, self.config.max_path_depth, cancel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn graphs_are_created_on_first_use_and_isolated() {
        let db = Database::default();
        db.graph("a").unwrap().add(&Triple::iris("s", "p", "o")).unwrap();
        assert_eq!(db.graph("b").unwrap().len().unwrap(), 0);
        assert_eq!(db.graphs(), vec!["a".to_string(), "b".to_string()]);
        assert!(db.graph("").is_err());
    }

    #[test]
    fn drop_forgets_the_graph() {
        let db = Database::default();
        db.graph("a").unwrap().add(&Triple::iris("s", "p", "o")).unwrap();
        assert!(db.drop_graph("a"));
        assert!(!db.drop_graph("a"));
        assert!(db.get("a").is_none());
        assert_eq!(db.graph("a").unwrap().len().unwrap(), 0);
    }

    #[test]
    fn merge_copies_missing_triples() {
        let db = Database::default();
        let a = db.graph("a").unwrap();
        a.add(&Triple::iris("s", "p", "o1")).unwrap();
        a.add(&Triple::iris("s", "p", "o2")).unwrap();
        db.graph("b").unwrap().add(&Triple::iris("s", "p", "o1")).unwrap();

        assert_eq!(db.merge("a", "b").unwrap(), 1);
        assert_eq!(db.graph("b").unwrap().len().unwrap(), 2);
        assert!(db.merge("missing", "b").is_err());
    }

    #[test]
    fn write_lock_times_out_while_reader_holds_it() {
        let db = Database::new(EngineConfig {
            lock_timeout_ms: 10,
            ..EngineConfig::default()
        });
        let g = db.graph("g").unwrap();
        let guard = g.read().unwrap();
        let err = g.add(&Triple::iris("s", "p", "o")).unwrap_err();
        assert!(matches!(err, Error::LockTimeout { .. }));
        // readers still share
        assert!(g.read().is_ok());
        drop(guard);
        assert!(g.add(&Triple::iris("s", "p", "o")).unwrap());
    }
}
