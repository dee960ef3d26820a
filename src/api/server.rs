//! HTTP server for the surveyload import API.
//!
//! The upload handler only accepts the file and queues a job; parsing,
//! validation and the bulk write all happen in the background runner. The
//! frontend polls the job endpoint and can stream pipeline logs over SSE.
//!
//! # API Endpoints
//!
//! | Method | Path                  | Description                         |
//! |--------|-----------------------|-------------------------------------|
//! | GET    | `/health`             | Health check                        |
//! | POST   | `/api/import`         | Upload CSV, create an import job    |
//! | GET    | `/api/jobs/{id}`      | Poll one job's status               |
//! | GET    | `/api/tables/{table}` | Row count for a table (cached)      |
//! | DELETE | `/api/tables/{table}` | Mass delete a table                 |
//! | GET    | `/api/logs`           | SSE stream for real-time logs       |

use axum::{
    extract::{Multipart, Path, State},
    http::{header, Method, StatusCode},
    response::{sse::Event, Json, Sse},
    routing::{get, post},
    Router,
};
use futures::stream::Stream;
use serde_json::{json, Value};
use std::{convert::Infallible, net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use super::logs::LOG_BROADCASTER;
use super::types::{error_response, ImportSubmitted, JobView, TableView};
use crate::import::{ImportCoordinator, JobRunner};
use crate::models::{ErrorPolicy, ImportJob};
use crate::parser;
use crate::schema::ImportSchema;
use crate::signals::TableStats;

/// Shared state for all handlers.
pub struct AppState {
    pub coordinator: Arc<ImportCoordinator>,
    pub runner: Arc<dyn JobRunner>,
    /// Where uploaded files are written before the job picks them up.
    pub upload_dir: PathBuf,
}

type ApiError = (StatusCode, Json<Value>);

fn bad_request(message: impl AsRef<str>) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(error_response(message.as_ref())))
}

/// Start the HTTP server
pub async fn start_server(
    port: u16,
    state: Arc<AppState>,
) -> Result<(), Box<dyn std::error::Error>> {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT]);

    let app = Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/api/import", post(upload_csv))
        .route("/api/jobs/{id}", get(get_job))
        .route("/api/tables/{table}", get(table_stats).delete(delete_table))
        .route("/api/logs", get(sse_logs))
        .layer(cors)
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    println!("surveyload server running on http://localhost:{port}");
    println!("  POST   /api/import         - upload CSV, create import job");
    println!("  GET    /api/jobs/{{id}}      - poll job status");
    println!("  GET    /api/logs           - SSE log stream");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Health check endpoint
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "surveyload",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// SSE endpoint for real-time log streaming
async fn sse_logs() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = LOG_BROADCASTER.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(entry) => {
            let json = serde_json::to_string(&entry).ok()?;
            Some(Ok(Event::default().data(json)))
        }
        Err(_) => None,
    });

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

/// Upload CSV endpoint: accepts the file plus the rule description,
/// creates a pending job and hands it to the background runner.
async fn upload_csv(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<ImportSubmitted>), ApiError> {
    let mut file_data: Option<Vec<u8>> = None;
    let mut schema_text: Option<String> = None;
    let mut table: Option<String> = None;
    let mut delimiter: Option<char> = None;
    let mut policy = ErrorPolicy::Strict;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("multipart error: {e}")))?
    {
        let name = field.name().unwrap_or("").to_string();

        match name.as_str() {
            "file" => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| bad_request(format!("read error: {e}")))?;
                file_data = Some(bytes.to_vec());
            }
            "schema" => {
                schema_text = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| bad_request(format!("read error: {e}")))?,
                );
            }
            "table" => {
                table = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| bad_request(format!("read error: {e}")))?,
                );
            }
            "delimiter" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| bad_request(format!("read error: {e}")))?;
                delimiter = text.chars().next();
            }
            "policy" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| bad_request(format!("read error: {e}")))?;
                policy = match text.trim() {
                    "partial" => ErrorPolicy::Partial,
                    "strict" | "" => ErrorPolicy::Strict,
                    other => return Err(bad_request(format!("unknown policy '{other}'"))),
                };
            }
            _ => {}
        }
    }

    let bytes = file_data.ok_or_else(|| bad_request("no file provided"))?;
    let table = table.unwrap_or_else(|| "responses".to_string());

    // reject a malformed rule description now, not minutes later in the job
    let schema: Value = match schema_text {
        Some(text) => serde_json::from_str(&text)
            .map_err(|e| bad_request(format!("schema is not valid JSON: {e}")))?,
        None => json!({}),
    };
    ImportSchema::from_json(&schema).map_err(|e| bad_request(e.to_string()))?;

    // fix the delimiter at submission so the job is reproducible
    let delimiter = delimiter.or_else(|| {
        let content = parser::decode_content(&bytes, &parser::detect_encoding(&bytes));
        Some(parser::detect_delimiter(&content))
    });

    let job = ImportJob::new(table, PathBuf::new(), delimiter, schema, policy);
    let upload_path = state.upload_dir.join(format!("{}.csv", job.id));

    tokio::fs::create_dir_all(&state.upload_dir)
        .await
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(error_response(&format!("cannot create upload dir: {e}"))),
            )
        })?;
    tokio::fs::write(&upload_path, &bytes).await.map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(error_response(&format!("cannot store upload: {e}"))),
        )
    })?;

    let job = state.coordinator.jobs().create(ImportJob {
        file_path: upload_path,
        ..job
    });

    state.runner.submit(job.id);

    Ok((StatusCode::ACCEPTED, Json(ImportSubmitted::from(&job))))
}

/// Poll one job's status.
async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<JobView>, ApiError> {
    match state.coordinator.jobs().get(id) {
        Some(job) => Ok(Json(JobView::from(job))),
        None => Err((
            StatusCode::NOT_FOUND,
            Json(error_response(&format!("job not found: {id}"))),
        )),
    }
}

/// Row count for a table, served from the cache when warm.
async fn table_stats(
    State(state): State<Arc<AppState>>,
    Path(table): Path<String>,
) -> Result<Json<TableView>, ApiError> {
    let cache = state.coordinator.cache();

    if let Some(stats) = cache.stats(&table) {
        return Ok(Json(TableView::new(&table, &stats, true)));
    }

    let rows = state.coordinator.store().count(&table).map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(error_response(&e.to_string())),
        )
    })?;

    let stats = TableStats::now(rows);
    cache.put(&table, stats.clone());
    Ok(Json(TableView::new(&table, &stats, false)))
}

/// Mass delete a table's responses.
async fn delete_table(
    State(state): State<Arc<AppState>>,
    Path(table): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let coordinator = Arc::clone(&state.coordinator);
    let table_name = table.clone();

    // file-backed stores block; keep it off the async workers
    let removed = tokio::task::spawn_blocking(move || coordinator.delete_table(&table_name))
        .await
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(error_response(&format!("delete worker crashed: {e}"))),
            )
        })?
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(error_response(&e.to_string())),
            )
        })?;

    Ok(Json(json!({ "table": table, "deleted": removed })))
}
