use std::collections::HashMap;
use std::sync::Arc;

use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::{StatusCode, header};
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::{MethodFilter, MethodRouter, get, on};
use serde::Deserialize;
use tracing::{Instrument, error, warn};

use chbackup_core::operation::{Flag, HttpMethod};
use chbackup_core::{Config, DispatchError, Dispatcher, Operation, Options, operations};

use crate::metrics::{self, Metrics};

/// Everything a handler needs, passed explicitly through router state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub dispatcher: Dispatcher,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    pub fn new(config: Config, dispatcher: Dispatcher, metrics: Arc<Metrics>) -> Self {
        Self {
            config: Arc::new(config),
            dispatcher,
            metrics,
        }
    }
}

/// Query-string options. Flags an operation does not accept are ignored.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RequestQuery {
    #[serde(alias = "table")]
    pub tables: String,
    pub schema: bool,
    pub data: bool,
    #[serde(rename = "diff-from", alias = "diff_from")]
    pub diff_from: String,
    pub format: String,
}

impl RequestQuery {
    fn options(&self, op: &Operation) -> Options {
        let accepts = |flag: Flag| op.flags.contains(&flag);
        Options {
            tables: if accepts(Flag::Tables) {
                self.tables.clone()
            } else {
                String::new()
            },
            schema: accepts(Flag::Schema) && self.schema,
            data: accepts(Flag::Data) && self.data,
            format: String::new(),
        }
    }
}

/// Builds the API from the operation catalogue and pre-registers a metric
/// series for every generated route.
pub fn router(state: AppState) -> Router {
    let scheme = state.config.api.addressing;
    let mut router = Router::new();

    for op in operations() {
        for template in op.path_templates(scheme) {
            state.metrics.preregister(op.method.as_str(), &template);
            router = router.route(&template, operation_route(op, template.contains('{')));
        }
    }

    router
        .route("/metrics", get(render_metrics))
        .fallback(unknown_route)
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state.metrics),
            metrics::track,
        ))
        .with_state(state)
}

fn operation_route(op: &'static Operation, has_params: bool) -> MethodRouter<AppState> {
    let filter = match op.method {
        HttpMethod::Get => MethodFilter::GET,
        HttpMethod::Post => MethodFilter::POST,
    };
    if has_params {
        on(
            filter,
            move |State(state): State<AppState>,
                  Path(path): Path<HashMap<String, String>>,
                  Query(query): Query<RequestQuery>| handle(state, op, path, query),
        )
    } else {
        on(
            filter,
            move |State(state): State<AppState>, Query(query): Query<RequestQuery>| {
                handle(state, op, HashMap::new(), query)
            },
        )
    }
}

async fn handle(
    state: AppState,
    op: &'static Operation,
    path: HashMap<String, String>,
    query: RequestQuery,
) -> Response {
    let mut params = op.params_from_path(state.config.api.addressing, &path);
    if params.diff_from.is_empty() && op.flags.contains(&Flag::DiffFrom) {
        params.diff_from = query.diff_from.clone();
    }
    if params.format.is_empty() {
        params.format = query.format.clone();
    }
    let options = query.options(op);

    let (address, options) = match op.resolve(params, options) {
        Ok(request) => request,
        Err(err) => return error_response(op, &err),
    };

    // The engine call and its leases outlive the request: a client that hangs
    // up must not free a resource while the engine is still working on it.
    let task = tokio::spawn(
        async move {
            let mut body: Vec<u8> = Vec::new();
            let result = state
                .dispatcher
                .dispatch(&state.config, op, &address, &options, &mut body)
                .await;
            (result, body)
        }
        .instrument(tracing::Span::current()),
    );
    let (result, body) = match task.await {
        Ok(done) => done,
        Err(e) => {
            error!(op = op.name, error = %e, "Dispatch task failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, format!("{e}\n")).into_response();
        }
    };

    match result {
        Ok(()) if body.is_empty() => {
            (StatusCode::OK, format!("{} completed\n", op.name)).into_response()
        }
        Ok(()) => (StatusCode::OK, String::from_utf8_lossy(&body).into_owned()).into_response(),
        Err(err) => error_response(op, &err),
    }
}

fn error_response(op: &Operation, err: &DispatchError) -> Response {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        error!(op = op.name, status = status.as_u16(), error = %err, "Operation failed");
    } else {
        warn!(op = op.name, status = status.as_u16(), error = %err, "Request rejected");
    }
    (status, format!("{err}\n")).into_response()
}

async fn render_metrics(State(state): State<AppState>) -> Response {
    match state.metrics.render() {
        Ok(text) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, format!("{e}\n")).into_response()
        }
    }
}

async fn unknown_route() -> Response {
    (StatusCode::NOT_FOUND, "unknown operation\n").into_response()
}
