//! hyper HTTP/1 front end: accept loop, routing, response helpers.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, Result};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::CONTENT_TYPE;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use pfftdb_core::Database;
use serde::Serialize;
use tokio::net::TcpListener;

use crate::api::{self, ApiError, ApiResult, AppState, Reply};
use crate::config::ServerConfig;

/// Build the database described by `config`: startup graphs plus the optional
/// `geo` rule.
pub fn build_state(config: &ServerConfig) -> Result<AppState> {
    #[allow(unused_mut)]
    let mut db = Database::new(config.engine.clone());

    if let Some(geocoder) = &config.geocoder {
        #[cfg(feature = "geocode-http")]
        {
            let http = crate::geocode::HttpGeocoder::new(geocoder)?;
            let rule = pfftdb_core::GeocodeRule::new(http).with_prefixes(&config.prefixes);
            db.register_rule(Arc::new(rule));
            tracing::info!(url = %geocoder.base_url, "geo rule enabled");
        }
        #[cfg(not(feature = "geocode-http"))]
        tracing::warn!(url = %geocoder.base_url, "geocoder configured but built without `geocode-http`");
    }

    for name in &config.graphs {
        db.graph(name)
            .map_err(|e| anyhow!("failed to create graph `{name}`: {e}"))?;
    }
    tracing::info!(rules = ?db.rules().names().collect::<Vec<_>>(), "inference rules");
    Ok(AppState::new(db, config.prefixes.clone()))
}

pub fn run(config: ServerConfig) -> Result<()> {
    let state = Arc::new(build_state(&config)?);
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| anyhow!("failed to initialize tokio runtime: {e}"))?;

    rt.block_on(async move {
        let listener = TcpListener::bind(config.listen)
            .await
            .map_err(|e| anyhow!("failed to bind {}: {e}", config.listen))?;
        serve(listener, state).await
    })
}

/// Accept connections on `listener` until an accept error.
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> Result<()> {
    let bound = listener
        .local_addr()
        .map_err(|e| anyhow!("failed to read bound addr: {e}"))?;
    tracing::info!(addr = %bound, graphs = state.db.graphs().len(), "pfftdb listening");

    loop {
        let (stream, peer) = listener
            .accept()
            .await
            .map_err(|e| anyhow!("accept failed: {e}"))?;
        let io = TokioIo::new(stream);
        let state = state.clone();

        tokio::spawn(async move {
            let service = service_fn(move |req| handle_request(req, state.clone()));
            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                tracing::warn!(peer = %peer, error = %e, "connection error");
            }
        });
    }
}

async fn handle_request(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let started = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = req.uri().query().map(str::to_string);

    let result: ApiResult = match (&method, path.as_str()) {
        (&Method::GET, "/v1/ping") => api::ping(),
        (&Method::GET, "/v1/graphs") => api::graphs(&state),
        (&Method::POST, "/v1/data") => {
            let body = req.into_body().collect().await?.to_bytes();
            blocking(state, move |s| api::add(s, &body)).await
        }
        (&Method::DELETE, "/v1/data") => {
            let body = req.into_body().collect().await?.to_bytes();
            blocking(state, move |s| api::remove(s, &body)).await
        }
        (&Method::POST, "/v1/triples") => {
            let body = req.into_body().collect().await?.to_bytes();
            blocking(state, move |s| api::triples(s, &body)).await
        }
        (&Method::POST, "/v1/triples/count") => {
            let body = req.into_body().collect().await?.to_bytes();
            blocking(state, move |s| api::count(s, &body)).await
        }
        (&Method::POST, "/v1/value") => {
            let body = req.into_body().collect().await?.to_bytes();
            blocking(state, move |s| api::value(s, &body)).await
        }
        (&Method::POST, "/v1/query") => {
            let body = req.into_body().collect().await?.to_bytes();
            blocking(state, move |s| api::query(s, &body)).await
        }
        (&Method::GET, "/v1/path") => blocking(state, move |s| api::path(s, query.as_deref())).await,
        (&Method::PUT, "/v1/inference") => {
            blocking(state, move |s| api::inference(s, query.as_deref())).await
        }
        (&Method::POST, "/v1/drop") => api::drop_graph(&state, query.as_deref()),
        (&Method::POST, "/v1/merge") => blocking(state, move |s| api::merge(s, query.as_deref())).await,
        (
            _,
            "/v1/ping" | "/v1/graphs" | "/v1/data" | "/v1/triples" | "/v1/triples/count" | "/v1/value"
            | "/v1/query" | "/v1/path" | "/v1/inference" | "/v1/drop" | "/v1/merge",
        ) => {
            return Ok(json_error(
                StatusCode::METHOD_NOT_ALLOWED,
                &format!("method {method} not allowed"),
                "method_not_allowed",
            ))
        }
        _ => return Ok(json_error(StatusCode::NOT_FOUND, "not found", "not_found")),
    };

    let resp = match result {
        Ok(Reply::Text(text)) => text_response(StatusCode::OK, text),
        Ok(Reply::Json(value)) => json_response(StatusCode::OK, &value),
        Err(e) => {
            let status = e.status();
            if status.is_server_error() {
                tracing::error!(method = %method, path = %path, error = %e, "request failed");
            } else {
                tracing::debug!(method = %method, path = %path, error = %e, "request rejected");
            }
            json_response(status, &e.to_json())
        }
    };
    tracing::debug!(
        method = %method,
        path = %path,
        status = resp.status().as_u16(),
        elapsed_us = started.elapsed().as_micros() as u64,
        "handled"
    );
    Ok(resp)
}

/// Engine calls may block on graph locks or geocoder I/O.
async fn blocking<F>(state: Arc<AppState>, f: F) -> ApiResult
where
    F: FnOnce(&AppState) -> ApiResult + Send + 'static,
{
    tokio::task::spawn_blocking(move || f(&state))
        .await
        .unwrap_or_else(|e| Err(ApiError::Internal(format!("handler task failed: {e}"))))
}

fn text_response(status: StatusCode, body: &str) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::from_static(b"internal error"))))
}

fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Response<Full<Bytes>> {
    let body = serde_json::to_vec(value).unwrap_or_else(|_| b"{\"error\":\"serialize\"}".to_vec());
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(body)))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::from_static(b"{\"error\":\"internal\"}"))))
}

fn json_error(status: StatusCode, msg: &str, kind: &str) -> Response<Full<Bytes>> {
    let v = serde_json::json!({ "error": msg, "kind": kind });
    json_response(status, &v)
}
