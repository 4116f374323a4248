//! Route table for the photo gateway.
//!
//! ## Structure
//! - **Probes** (never behind auth)
//!   - `GET    /healthz` - liveness
//!   - `GET    /readyz` - readiness, probes the object store
//!
//! - **Entity files**
//!   - `POST   /upload/{id}` - upload multipart files under `photos/{id}/`
//!   - `DELETE /upload/{id}` - delete every file of the entity
//!   - `DELETE /upload/{id}/{sub_id}` - delete files whose token starts with `sub_id`
//!
//! - **Listing**
//!   - `GET    /objects` - public URLs of every object
//!   - `GET    /objects/exists?folder=` - folder existence and contents

use crate::{
    AppState,
    handlers::{
        file_handlers::{
            delete_entity_files, delete_sub_id_files, folder_info, list_objects, upload_files,
        },
        health_handlers::{healthz, readyz},
    },
    middleware::auth::require_bearer,
};
use axum::{
    Router,
    body::Body,
    extract::{ConnectInfo, DefaultBodyLimit},
    http::{HeaderMap, Request},
    middleware::from_fn_with_state,
    routing::{delete, get, post},
};
use std::net::SocketAddr;
use tower::ServiceBuilder;
use tower_http::{
    LatencyUnit,
    cors::CorsLayer,
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, info_span};

/// Build the full router with shared state and HTTP layers applied.
///
/// File routes are wrapped in `require_bearer` only when `state.auth` is set;
/// the probes stay open either way.
pub fn routes(state: AppState, max_upload_bytes: usize) -> Router {
    let mut files = Router::new()
        .route("/upload/{id}", post(upload_files).delete(delete_entity_files))
        .route("/upload/{id}/{sub_id}", delete(delete_sub_id_files))
        .route("/objects", get(list_objects))
        .route("/objects/exists", get(folder_info));

    if let Some(validator) = state.auth.clone() {
        files = files.route_layer(from_fn_with_state(validator, require_bearer));
    }

    let http = ServiceBuilder::new()
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &Request<Body>| {
                    let request_id = req
                        .headers()
                        .get("x-request-id")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("-");
                    let peer = req
                        .extensions()
                        .get::<ConnectInfo<SocketAddr>>()
                        .map(|ConnectInfo(addr)| *addr);
                    info_span!(
                        "http",
                        request_id = %request_id,
                        method = %req.method(),
                        path = %req.uri().path(),
                        client_ip = %client_ip(req.headers(), peer),
                    )
                })
                .on_response(
                    DefaultOnResponse::new()
                        .level(Level::INFO)
                        .latency_unit(LatencyUnit::Millis),
                ),
        )
        .layer(PropagateRequestIdLayer::x_request_id())
        // Must stay outside CorsLayer: Cors needs a `Default` response body.
        .layer(RequestBodyLimitLayer::new(max_upload_bytes))
        .layer(CorsLayer::permissive());

    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .merge(files)
        .layer(DefaultBodyLimit::disable())
        .layer(http)
        .with_state(state)
}

/// Client address for request logs: `X-Real-IP`, then the first
/// `X-Forwarded-For` entry, then the connection peer.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    if let Some(real_ip) = header("x-real-ip") {
        return real_ip.to_string();
    }
    if let Some(first) = header("x-forwarded-for")
        .and_then(|list| list.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
    {
        return first.to_string();
    }
    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "-".to_string())
}
