//! HTTP surface of the hydrator.
//!
//! One public endpoint: the gateway's authorization hook POSTs the request
//! body here and always gets a body back with HTTP 200 — enriched when
//! resolution succeeded, echoed untouched otherwise. The only caller-visible
//! failure mode is a bad HTTP verb.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{any, get},
};
use serde_json::Value;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::handler::Hydrator;
use crate::reqdata::{HeaderValues, ReqBody, ReqData};

/// Path of the hydration endpoint.
pub const HYDRATE_PATH: &str = "/v1/hydrate";

pub type AppState = Arc<Hydrator>;

/// Build the public router: the hydration endpoint plus a health probe.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route(HYDRATE_PATH, any(hydrate))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

async fn health_check() -> Json<Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

fn collect_headers(headers: &HeaderMap) -> HeaderValues {
    let mut collected: HeaderValues = BTreeMap::new();
    for (name, value) in headers {
        let Ok(value) = value.to_str() else {
            continue;
        };
        collected
            .entry(name.as_str().to_string())
            .or_default()
            .push(value.to_string());
    }
    collected
}

async fn hydrate(
    State(hydrator): State<AppState>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if method != Method::POST {
        let message = format!("Bad request method. Got {}, expected POST", method);
        error!("{}", message);
        return (StatusCode::BAD_REQUEST, message).into_response();
    }

    let parsed: ReqBody = match serde_json::from_slice(&body) {
        Ok(parsed) => parsed,
        Err(err) => {
            // A parse failure echoes the zero-value body, still 200.
            error!("An error occurred while parsing request: {}", err);
            return Json(ReqBody::default()).into_response();
        }
    };

    let data = ReqData::new(parsed, collect_headers(&headers));
    Json(hydrator.process(data).await).into_response()
}
