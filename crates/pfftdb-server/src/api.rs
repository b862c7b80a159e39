//! `/v1/*` request handlers.
//!
//! Handlers are plain functions from a request body (or query string) to a
//! [`Reply`], so they can be exercised without a socket. The hyper layer in
//! `server.rs` only routes and converts.

use std::collections::HashMap;

use hyper::StatusCode;
use pfftdb_core::codec::{term_to_json, triple_to_json, Resolver};
use pfftdb_core::query::{Filter, FilterOp};
use pfftdb_core::{
    Cancellation, Database, Error, ErrorKind, PathRequest, PrefixTable, Query, QueryOptions, Term,
    TripleOptions,
};
use serde::Deserialize;
use serde_json::{json, Value};
use url::form_urlencoded;

/// Select value that turns a query into a count.
const COUNT_SELECT: &str = "?COUNT";

// ============================================================================
// Errors and replies
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Engine(#[from] Error),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Engine(e) => match e.kind() {
                ErrorKind::Validation | ErrorKind::Ambiguity => StatusCode::BAD_REQUEST,
                ErrorKind::Convergence => StatusCode::UNPROCESSABLE_ENTITY,
                ErrorKind::ConcurrencyTimeout => StatusCode::SERVICE_UNAVAILABLE,
                ErrorKind::InvariantViolation => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Internal(_) => "internal",
            ApiError::Engine(e) => e.kind().as_str(),
        }
    }

    pub fn to_json(&self) -> Value {
        json!({ "error": self.to_string(), "kind": self.kind() })
    }
}

fn bad_request(msg: impl Into<String>) -> ApiError {
    ApiError::BadRequest(msg.into())
}

#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Text(&'static str),
    Json(Value),
}

pub type ApiResult = Result<Reply, ApiError>;

// ============================================================================
// State
// ============================================================================

pub struct AppState {
    pub db: Database,
    /// Server-wide prefixes; a request's own table overrides entries.
    pub prefixes: PrefixTable,
}

impl AppState {
    pub fn new(db: Database, prefixes: PrefixTable) -> Self {
        Self { db, prefixes }
    }

    fn table(&self, request: &PrefixTable) -> PrefixTable {
        if request.is_empty() {
            self.prefixes.clone()
        } else {
            self.prefixes.merged_with(request)
        }
    }
}

fn parse_body<'a, T: Deserialize<'a>>(body: &'a [u8], what: &str) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|e| bad_request(format!("failed to parse {what} request JSON: {e}")))
}

pub fn parse_query_params(query: Option<&str>) -> HashMap<String, String> {
    let mut out = HashMap::new();
    let Some(q) = query else {
        return out;
    };
    for (k, v) in form_urlencoded::parse(q.as_bytes()) {
        out.insert(k.into_owned(), v.into_owned());
    }
    out
}

fn required<'a>(params: &'a HashMap<String, String>, key: &str) -> Result<&'a str, ApiError> {
    params
        .get(key)
        .map(String::as_str)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| bad_request(format!("missing query parameter `{key}`")))
}

// ============================================================================
// Request bodies
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DataRequest {
    graph: String,
    #[serde(default)]
    prefix: PrefixTable,
    data: Vec<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TriplesRequest {
    graph: String,
    #[serde(default)]
    prefix: PrefixTable,
    #[serde(default)]
    sub: Value,
    #[serde(default)]
    pred: Value,
    #[serde(default)]
    obj: Value,
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    offset: usize,
    #[serde(default)]
    orderby: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FilterRequest {
    key: String,
    op: String,
    val: Value,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct QueryRequest {
    graph: String,
    #[serde(default)]
    prefix: PrefixTable,
    data: Vec<Value>,
    #[serde(default)]
    select: Vec<String>,
    #[serde(default)]
    distinct: bool,
    #[serde(default)]
    optional: Vec<usize>,
    #[serde(default)]
    filter: Vec<FilterRequest>,
    #[serde(default)]
    orderby: Option<String>,
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    offset: usize,
}

// ============================================================================
// Handlers
// ============================================================================

pub fn ping() -> ApiResult {
    Ok(Reply::Text("PONG"))
}

pub fn graphs(state: &AppState) -> ApiResult {
    Ok(Reply::Json(json!({ "data": state.db.graphs() })))
}

/// `POST /v1/data`: best-effort insert; undecodable records are skipped.
pub fn add(state: &AppState, body: &[u8]) -> ApiResult {
    let req: DataRequest = parse_body(body, "data")?;
    let graph = state.db.graph(&req.graph)?;
    let table = state.table(&req.prefix);
    let resolver = Resolver::new(&table, state.db.config().prefix_policy);

    let mut skipped: Vec<(usize, String)> = Vec::new();
    let mut triples = Vec::with_capacity(req.data.len());
    let mut positions = Vec::with_capacity(req.data.len());
    for (index, value) in req.data.iter().enumerate() {
        match resolver.triple(value) {
            Ok(triple) => {
                triples.push(triple);
                positions.push(index);
            }
            Err(e) => {
                tracing::warn!(graph = %req.graph, index, error = %e, "skipping undecodable triple");
                skipped.push((index, e.to_string()));
            }
        }
    }
    let report = graph.add_bulk(&triples)?;
    skipped.extend(report.skipped.into_iter().map(|(i, reason)| (positions[i], reason)));
    skipped.sort_by_key(|(i, _)| *i);

    let skipped: Vec<Value> = skipped
        .into_iter()
        .map(|(index, reason)| json!({ "index": index, "reason": reason }))
        .collect();
    Ok(Reply::Json(json!({
        "graph": req.graph,
        "data": report.inserted,
        "duplicates": report.duplicates,
        "skipped": skipped,
    })))
}

/// `DELETE /v1/data`: every pattern must decode before anything is removed,
/// and all patterns are removed under one write lock.
pub fn remove(state: &AppState, body: &[u8]) -> ApiResult {
    let req: DataRequest = parse_body(body, "data")?;
    let graph = state.db.graph(&req.graph)?;
    let table = state.table(&req.prefix);
    let resolver = Resolver::new(&table, state.db.config().prefix_policy);
    let patterns = req
        .data
        .iter()
        .map(|v| resolver.triple_pattern(v))
        .collect::<Result<Vec<_>, _>>()?;

    let removed = graph.remove_many(&patterns)?;
    Ok(Reply::Json(json!({ "graph": req.graph, "data": removed })))
}

fn triples_request(
    state: &AppState,
    body: &[u8],
) -> Result<(TriplesRequest, pfftdb_core::TriplePattern), ApiError> {
    let req: TriplesRequest = parse_body(body, "triples")?;
    let table = state.table(&req.prefix);
    let resolver = Resolver::new(&table, state.db.config().prefix_policy);
    let pattern = pfftdb_core::TriplePattern::new(
        resolver.pattern_field(&req.sub)?,
        resolver.pattern_field(&req.pred)?,
        resolver.pattern_field(&req.obj)?,
    );
    Ok((req, pattern))
}

/// `POST /v1/triples`
pub fn triples(state: &AppState, body: &[u8]) -> ApiResult {
    let (req, pattern) = triples_request(state, body)?;
    let options = TripleOptions {
        limit: req.limit,
        offset: req.offset,
        order_by: req.orderby.clone().filter(|o| !o.is_empty()),
    };
    let found = state.db.graph(&req.graph)?.triples(&pattern, &options)?;
    let data: Vec<Value> = found.iter().map(triple_to_json).collect();
    Ok(Reply::Json(json!({ "graph": req.graph, "data": data })))
}

/// `POST /v1/triples/count`
pub fn count(state: &AppState, body: &[u8]) -> ApiResult {
    let (req, pattern) = triples_request(state, body)?;
    let n = state.db.graph(&req.graph)?.count(&pattern)?;
    Ok(Reply::Json(json!({ "graph": req.graph, "data": n })))
}

/// `POST /v1/value`
pub fn value(state: &AppState, body: &[u8]) -> ApiResult {
    let (req, pattern) = triples_request(state, body)?;
    let found = state.db.graph(&req.graph)?.value(&pattern)?;
    let data = found.as_ref().map(term_to_json).unwrap_or(Value::Null);
    Ok(Reply::Json(json!({ "graph": req.graph, "data": data })))
}

/// Filter operands are literal: a bare string is text, not an identifier.
fn filter_operand(resolver: &Resolver<'_>, value: &Value) -> Result<Term, Error> {
    match value {
        Value::String(s) => Ok(Term::string(s.as_str())),
        other => resolver.term(other),
    }
}

/// `POST /v1/query`; `?COUNT` as the first `select` entry returns the number
/// of solutions.
pub fn query(state: &AppState, body: &[u8]) -> ApiResult {
    let req: QueryRequest = parse_body(body, "query")?;
    let table = state.table(&req.prefix);
    let resolver = Resolver::new(&table, state.db.config().prefix_policy);

    let patterns = req
        .data
        .iter()
        .map(|v| resolver.query_pattern(v))
        .collect::<Result<Vec<_>, _>>()?;
    let filter = req
        .filter
        .iter()
        .map(|f| {
            Ok(Filter::new(
                &f.key,
                FilterOp::parse(&f.op)?,
                filter_operand(&resolver, &f.val)?,
            ))
        })
        .collect::<Result<Vec<_>, Error>>()?;

    let counting = req.select.first().is_some_and(|s| s == COUNT_SELECT);
    let select = if counting || req.select.is_empty() {
        None
    } else {
        Some(req.select.clone())
    };
    let query = Query::new(patterns).with_options(QueryOptions {
        select,
        distinct: req.distinct,
        optional: req.optional.clone(),
        filter,
        order_by: req.orderby.clone().filter(|o| !o.is_empty()),
        limit: req.limit,
        offset: req.offset,
    });

    let graph = state.db.graph(&req.graph)?;
    let cancel = state.db.config().query_cancellation();
    if counting {
        let n = graph.query_count(&query, &cancel)?;
        return Ok(Reply::Json(json!({ "graph": req.graph, "data": n })));
    }
    let solutions = graph.query(&query, &cancel)?;
    let data = serde_json::to_value(&solutions).map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Reply::Json(json!({ "graph": req.graph, "data": data })))
}

/// `GET /v1/path?graph&start&end&predicateName&predicateAdjacent`
pub fn path(state: &AppState, query: Option<&str>) -> ApiResult {
    let params = parse_query_params(query);
    let graph = required(&params, "graph")?;
    let resolver = Resolver::new(&state.prefixes, state.db.config().prefix_policy);
    let predicate = |key: &str| -> Result<Term, ApiError> {
        Ok(resolver.term(&Value::String(required(&params, key)?.to_string()))?)
    };
    let request = PathRequest {
        start: Term::string(required(&params, "start")?),
        end: Term::string(required(&params, "end")?),
        name_predicate: predicate("predicateName")?,
        adjacent_predicate: predicate("predicateAdjacent")?,
    };

    let found = state.db.find_path(graph, &request, &Cancellation::new())?;
    let (labels, nodes): (Vec<Value>, Vec<Value>) = match &found {
        Some(p) => (
            p.labels()
                .map(|label| label.map(term_to_json).unwrap_or(Value::Null))
                .collect(),
            p.steps.iter().map(|step| term_to_json(&step.node)).collect(),
        ),
        None => (Vec::new(), Vec::new()),
    };
    Ok(Reply::Json(json!({
        "graph": graph,
        "data": labels,
        "nodes": nodes,
        "predicate": term_to_json(&request.adjacent_predicate),
    })))
}

/// `PUT /v1/inference?graph&inference`. Blocking: the geocoder may do I/O.
pub fn inference(state: &AppState, query: Option<&str>) -> ApiResult {
    let params = parse_query_params(query);
    let graph = required(&params, "graph")?;
    let rule = required(&params, "inference")?;
    let report = state.db.infer(graph, rule, &Cancellation::new())?;
    Ok(Reply::Json(json!({ "graph": graph, "data": report })))
}

/// `POST /v1/drop?graph`
pub fn drop_graph(state: &AppState, query: Option<&str>) -> ApiResult {
    let params = parse_query_params(query);
    let graph = required(&params, "graph")?;
    state.db.drop_graph(graph);
    Ok(Reply::Text("OK"))
}

/// `POST /v1/merge?source&target`
pub fn merge(state: &AppState, query: Option<&str>) -> ApiResult {
    let params = parse_query_params(query);
    let source = required(&params, "source")?;
    let target = required(&params, "target")?;
    let inserted = state.db.merge(source, target)?;
    Ok(Reply::Json(json!({ "graph": target, "data": inserted })))
}
