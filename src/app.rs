#![cfg(feature = "web")]
use axum::{
    Json, Router,
    body::Body,
    extract::{DefaultBodyLimit, Multipart, Path, Query, State, multipart::MultipartError},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;

use crate::aggregate::{ChartData, ChartRequest};
use crate::chart::ChartState;
use crate::config::Config;
use crate::dashboard::{Dashboard, DashboardChart, load_dashboard, save_dashboard};
use crate::downloader;
use crate::error::AnalysisError;
use crate::render::{MAX_IMAGE_SIDE, RenderOptions, render_png};
use crate::store::{FileId, FileInfo, FileStore};
use crate::suggest::{ChartSuggestion, HeuristicEngine, SuggestionEngine};
use crate::summary::DataFrameSummary;

const DASHBOARD_FILE: &str = "dashboard.bin.gz";

/// Structured error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
}

/// API-level errors with HTTP status mapping.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            ApiError::BadRequest(detail) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", detail),
            ApiError::NotFound(detail) => (StatusCode::NOT_FOUND, "NOT_FOUND", detail),
            ApiError::PayloadTooLarge(detail) => {
                (StatusCode::PAYLOAD_TOO_LARGE, "PAYLOAD_TOO_LARGE", detail)
            }
            ApiError::Internal(detail) => {
                log::error!("internal error: {}", detail);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = ErrorBody {
            error: ErrorDetail { code, message },
        };
        (status, Json(body)).into_response()
    }
}

impl From<AnalysisError> for ApiError {
    fn from(err: AnalysisError) -> Self {
        match err {
            AnalysisError::FileNotFound(_) | AnalysisError::NoSuchChart(_) => {
                ApiError::NotFound(err.to_string())
            }
            AnalysisError::Io { .. }
            | AnalysisError::Render(_)
            | AnalysisError::Export(_)
            | AnalysisError::Serialization(_) => ApiError::Internal(err.to_string()),
            _ => ApiError::BadRequest(err.to_string()),
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge(err.body_text())
        } else {
            ApiError::BadRequest(err.body_text())
        }
    }
}

/// Shared server state: uploaded files, the dashboard and the engine that
/// proposes charts.
pub struct AppState {
    files: Mutex<FileStore>,
    dashboard: Mutex<Dashboard>,
    engine: Box<dyn SuggestionEngine>,
    dashboard_path: Option<PathBuf>,
    config: Config,
}

impl AppState {
    /// State backed by `config.data_folder`; a dashboard saved there by an
    /// earlier run is loaded back.
    pub fn new(config: Config) -> Self {
        let dashboard_path = config.data_folder.join(DASHBOARD_FILE);
        let dashboard = if dashboard_path.exists() {
            load_dashboard(&dashboard_path).unwrap_or_else(|e| {
                log::warn!("ignoring unreadable dashboard: {}", e);
                Dashboard::new()
            })
        } else {
            Dashboard::new()
        };
        AppState {
            files: Mutex::new(FileStore::new(config.data_folder.clone())),
            dashboard: Mutex::new(dashboard),
            engine: Box::new(HeuristicEngine {
                max_suggestions: config.max_suggestions,
            }),
            dashboard_path: Some(dashboard_path),
            config,
        }
    }

    /// State that writes nothing to disk.
    pub fn in_memory(config: Config) -> Self {
        AppState {
            files: Mutex::new(FileStore::in_memory()),
            dashboard: Mutex::new(Dashboard::new()),
            engine: Box::new(HeuristicEngine {
                max_suggestions: config.max_suggestions,
            }),
            dashboard_path: None,
            config,
        }
    }

    /// Swap the suggestion engine.
    pub fn with_engine(mut self, engine: impl SuggestionEngine + 'static) -> Self {
        self.engine = Box::new(engine);
        self
    }

    fn files(&self) -> MutexGuard<'_, FileStore> {
        recover(&self.files, "file store")
    }

    fn dashboard(&self) -> MutexGuard<'_, Dashboard> {
        recover(&self.dashboard, "dashboard")
    }

    fn persist_dashboard(&self, dashboard: &Dashboard) {
        if let Some(path) = &self.dashboard_path {
            if let Err(e) = save_dashboard(dashboard, path) {
                log::warn!("could not save dashboard: {}", e);
            }
        }
    }
}

#[derive(Deserialize)]
struct ChartQuery {
    file_id: FileId,
    #[serde(flatten)]
    request: ChartRequest,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Deserialize)]
struct ImageQuery {
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Deserialize)]
struct ExportQuery {
    format: Option<String>,
}

#[derive(Deserialize)]
struct AddChart {
    suggestion: ChartSuggestion,
    file_id: FileId,
}

#[derive(Serialize)]
struct UploadResponse {
    file_id: FileId,
    filename: String,
    summary: DataFrameSummary,
}

#[derive(Serialize)]
struct AnalyzeResponse {
    file_id: FileId,
    filename: String,
    suggestions: Vec<ChartSuggestion>,
}

#[derive(Serialize)]
struct RemovedFile {
    file_id: FileId,
    dashboard_charts_removed: usize,
}

/// Build the API router around shared state.
pub fn router(state: Arc<AppState>) -> Router {
    let body_limit = state.config.max_upload_bytes;
    Router::new()
        .route("/health", get(health))
        .route("/upload", post(upload_file))
        .route("/suggest", post(get_suggestions))
        .route("/analyze", post(analyze_file))
        .route("/chart-data", post(get_chart_data))
        .route("/chart-data/export", post(export_chart_data))
        .route("/chart-view", post(get_chart_view))
        .route("/chart-image", post(get_chart_image))
        .route("/files", get(list_files))
        .route("/files/:id", delete(delete_file))
        .route("/dashboard", get(get_dashboard).post(add_to_dashboard))
        .route("/dashboard/:index", delete(remove_from_dashboard))
        .route("/dashboard/export", get(export_dashboard))
        .route("/dashboard/import", post(import_dashboard))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let bind = config.bind;
    if config.openai_api_key.is_some() {
        log::info!("OPENAI_API_KEY is set; suggestions still come from the built-in heuristics");
    }
    log::info!("keeping uploads in {}", config.data_folder.display());

    let app_state = Arc::new(AppState::new(config));
    let app = router(app_state);

    let listener = TcpListener::bind(bind).await?;
    log::info!("Listening on http://{}", bind);
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let files = state.files().len();
    Ok(Json(serde_json::json!({ "status": "ok", "files": files })))
}

/// Lock shared state. Every handler leaves the store consistent between
/// statements, so a panic elsewhere does not invalidate it.
fn recover<'a, T>(lock: &'a Mutex<T>, name: &str) -> MutexGuard<'a, T> {
    lock.lock().unwrap_or_else(|poisoned| {
        log::warn!("{} lock was poisoned, recovering", name);
        poisoned.into_inner()
    })
}

/// Pull the first field called `name` out of a multipart body.
async fn read_field(
    multipart: &mut Multipart,
    name: &str,
) -> Result<Option<(String, Vec<u8>)>, ApiError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some(name) {
            let filename = field.file_name().unwrap_or_default().to_string();
            let bytes = field.bytes().await?;
            return Ok(Some((filename, bytes.to_vec())));
        }
    }
    Ok(None)
}

/// Store an uploaded file; every failure is reported as a bad upload.
async fn receive_upload(
    state: &AppState,
    multipart: &mut Multipart,
) -> Result<(FileId, String, DataFrameSummary), ApiError> {
    let upload_error = |detail: String| format!("Error procesando archivo: {}", detail);
    let (filename, bytes) = match read_field(multipart, "file").await {
        Ok(Some(field)) => field,
        Ok(None) => {
            return Err(ApiError::BadRequest(upload_error(
                "no se recibió ningún archivo".into(),
            )));
        }
        Err(ApiError::PayloadTooLarge(detail)) => {
            return Err(ApiError::PayloadTooLarge(upload_error(detail)));
        }
        Err(e) => return Err(ApiError::BadRequest(upload_error(e.to_string()))),
    };

    let folder = state.files().data_folder().map(PathBuf::from);
    let prepared =
        tokio::task::spawn_blocking(move || FileStore::prepare(folder.as_deref(), &filename, &bytes))
            .await
            .map_err(|e| ApiError::Internal(format!("upload task failed: {}", e)))?;
    let stored = prepared.map_err(|e| match e {
        AnalysisError::Io { .. } => ApiError::Internal(e.to_string()),
        other => ApiError::BadRequest(upload_error(other.to_string())),
    })?;

    let mut files = state.files();
    let stored = files.register(stored);
    Ok((stored.id, stored.filename.clone(), stored.summary.clone()))
}

async fn upload_file(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let (file_id, filename, summary) = receive_upload(&state, &mut multipart).await?;
    Ok(Json(UploadResponse {
        file_id,
        filename,
        summary,
    }))
}

async fn get_suggestions(
    State(state): State<Arc<AppState>>,
    Json(summary): Json<DataFrameSummary>,
) -> Result<Json<Vec<ChartSuggestion>>, ApiError> {
    Ok(Json(state.engine.suggest(&summary)?))
}

async fn analyze_file(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<AnalyzeResponse>, ApiError> {
    let (file_id, filename, summary) = receive_upload(&state, &mut multipart).await?;
    let suggestions = state.engine.suggest(&summary)?;
    log::info!("{} suggestions for {}", suggestions.len(), filename);
    Ok(Json(AnalyzeResponse {
        file_id,
        filename,
        suggestions,
    }))
}

fn chart_data(state: &AppState, query: &ChartQuery) -> Result<Arc<ChartData>, ApiError> {
    Ok(state.files().chart_data(&query.file_id, &query.request)?)
}

async fn get_chart_data(
    State(state): State<Arc<AppState>>,
    Json(query): Json<ChartQuery>,
) -> Result<Json<ChartData>, ApiError> {
    let data = chart_data(&state, &query)?;
    Ok(Json(data.as_ref().clone()))
}

/// Resolve a chart into what a panel shows. Aggregation failures come back
/// as an error state rather than an HTTP error.
async fn get_chart_view(
    State(state): State<Arc<AppState>>,
    Json(query): Json<ChartQuery>,
) -> Result<Json<ChartState>, ApiError> {
    let result = {
        let mut files = state.files();
        files.get(&query.file_id)?;
        files.chart_data(&query.file_id, &query.request)
    };
    let view = ChartState::from_result(&query.request, result.as_deref())
        .with_text(query.title, query.description);
    Ok(Json(view))
}

async fn get_chart_image(
    State(state): State<Arc<AppState>>,
    Query(size): Query<ImageQuery>,
    Json(query): Json<ChartQuery>,
) -> Result<Response, ApiError> {
    let data = chart_data(&state, &query)?;
    let chart = ChartState::from_result(&query.request, Ok(data.as_ref()))
        .with_text(query.title, query.description);
    let view = match chart {
        ChartState::Ready(view) => view,
        ChartState::NoData { message } | ChartState::Error { message } => {
            return Err(ApiError::BadRequest(message));
        }
    };

    let defaults = RenderOptions::default();
    let options = RenderOptions {
        width: size.width.unwrap_or(defaults.width),
        height: size.height.unwrap_or(defaults.height),
        ..defaults
    };
    let valid = 1..=MAX_IMAGE_SIDE;
    if !valid.contains(&options.width) || !valid.contains(&options.height) {
        return Err(ApiError::BadRequest(format!(
            "image size must be between 1 and {} pixels per side, got {}x{}",
            MAX_IMAGE_SIDE, options.width, options.height
        )));
    }
    let png = render_png(&view, &options)?;

    Ok(([(header::CONTENT_TYPE, "image/png")], png).into_response())
}

async fn export_chart_data(
    State(state): State<Arc<AppState>>,
    Query(export): Query<ExportQuery>,
    Json(query): Json<ChartQuery>,
) -> Result<Response, ApiError> {
    let format = export.format.as_deref().unwrap_or("csv").to_lowercase();
    let data = chart_data(&state, &query)?;

    let (content_type, filename, body) = match format.as_str() {
        "csv" => (
            "text/csv; charset=utf-8",
            "chart-data.csv",
            downloader::to_csv(&data).into_bytes(),
        ),
        "xlsx" => (
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            "chart-data.xlsx",
            downloader::to_xlsx(&data)?,
        ),
        other => {
            return Err(ApiError::BadRequest(format!(
                "unsupported export format: {}",
                other
            )));
        }
    };

    attachment(content_type, filename, body)
}

fn attachment(content_type: &str, filename: &str, body: Vec<u8>) -> Result<Response, ApiError> {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", filename),
        )
        .body(Body::from(body))
        .map_err(|e| ApiError::Internal(e.to_string()))
}

async fn list_files(State(state): State<Arc<AppState>>) -> Result<Json<Vec<FileInfo>>, ApiError> {
    Ok(Json(state.files().list()))
}

/// Delete a file together with the dashboard charts built from it.
async fn delete_file(
    State(state): State<Arc<AppState>>,
    Path(id): Path<FileId>,
) -> Result<Json<RemovedFile>, ApiError> {
    state.files().remove(&id)?;
    let removed = {
        let mut dashboard = state.dashboard();
        let removed = dashboard.remove_file(&id);
        if removed > 0 {
            state.persist_dashboard(&dashboard);
        }
        removed
    };
    Ok(Json(RemovedFile {
        file_id: id,
        dashboard_charts_removed: removed,
    }))
}

async fn get_dashboard(State(state): State<Arc<AppState>>) -> Result<Json<Dashboard>, ApiError> {
    Ok(Json(state.dashboard().clone()))
}

async fn add_to_dashboard(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<AddChart>,
) -> Result<(StatusCode, Json<DashboardChart>), ApiError> {
    payload.suggestion.validate()?;
    state.files().get(&payload.file_id)?;

    let mut dashboard = state.dashboard();
    let added = dashboard.add(payload.suggestion, payload.file_id).clone();
    state.persist_dashboard(&dashboard);
    Ok((StatusCode::CREATED, Json(added)))
}

async fn remove_from_dashboard(
    State(state): State<Arc<AppState>>,
    Path(index): Path<usize>,
) -> Result<Json<DashboardChart>, ApiError> {
    let mut dashboard = state.dashboard();
    let removed = dashboard.remove(index)?;
    state.persist_dashboard(&dashboard);
    Ok(Json(removed))
}

async fn export_dashboard(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let bytes = state.dashboard().export_bytes()?;
    attachment("application/gzip", DASHBOARD_FILE, bytes)
}

async fn import_dashboard(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<Dashboard>, ApiError> {
    let data = match read_field(&mut multipart, "dashboard").await? {
        Some((_, bytes)) if !bytes.is_empty() => bytes,
        _ => return Err(ApiError::BadRequest("No file data received".into())),
    };

    let loaded = Dashboard::import_bytes(&data)
        .map_err(|e| ApiError::BadRequest(format!("Failed to load dashboard: {}", e)))?;
    let mut dashboard = state.dashboard();
    *dashboard = loaded;
    state.persist_dashboard(&dashboard);
    log::info!("imported dashboard with {} charts", dashboard.len());
    Ok(Json(dashboard.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;
    use tower::ServiceExt;
    use uuid::Uuid;

    const BOUNDARY: &str = "XBOUNDARYX";
    const SALES: &str = "Región,Ventas,Fecha\nCentro,3000,2024-01-01\nNorte,2500,2024-02-01\nCentro,1000,2024-03-01\n";

    fn app() -> (Arc<AppState>, Router) {
        let state = Arc::new(AppState::in_memory(Config::default()));
        (Arc::clone(&state), router(state))
    }

    fn multipart(uri: &str, field: &str, filename: &str, content: &[u8]) -> Request<Body> {
        let mut body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(content);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn empty(method: &str, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, body.to_vec())
    }

    async fn send_json(app: &Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let (status, body) = send(app, request).await;
        (status, serde_json::from_slice(&body).unwrap())
    }

    async fn upload_sales(app: &Router) -> String {
        let (status, body) =
            send_json(app, multipart("/upload", "file", "ventas.csv", SALES.as_bytes())).await;
        assert_eq!(status, StatusCode::OK);
        body["file_id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn upload_returns_the_summary() {
        let (_, app) = app();
        let (status, body) =
            send_json(&app, multipart("/upload", "file", "ventas.csv", SALES.as_bytes())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["filename"], "ventas.csv");
        assert_eq!(
            body["summary"]["columns"],
            serde_json::json!(["Región", "Ventas", "Fecha"])
        );
        assert_eq!(body["summary"]["dtypes"]["Ventas"], "int64");
    }

    #[tokio::test]
    async fn bad_uploads_are_reported_in_spanish() {
        let (_, app) = app();
        let (status, body) =
            send_json(&app, multipart("/upload", "file", "notas.txt", b"hola")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "BAD_REQUEST");
        assert!(
            body["error"]["message"]
                .as_str()
                .unwrap()
                .starts_with("Error procesando archivo: ")
        );

        let (status, _) = send_json(&app, multipart("/upload", "other", "a.csv", b"a\n1")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn out_of_range_excel_dates_do_not_break_the_store() {
        use rust_xlsxwriter::{Format, Workbook};

        let mut workbook = Workbook::new();
        let date = Format::new().set_num_format("yyyy-mm-dd");
        let sheet = workbook.add_worksheet();
        sheet.write_string(0, 0, "Fecha").unwrap();
        sheet.write_number_with_format(1, 0, 1.0e15, &date).unwrap();
        let xlsx = workbook.save_to_buffer().unwrap();

        let (state, app) = app();
        let (status, _) = send_json(&app, multipart("/upload", "file", "fechas.xlsx", &xlsx)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(state.files().len(), 1);

        let (status, body) = send_json(&app, empty("GET", "/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["files"], 1);
    }

    #[tokio::test]
    async fn poisoned_store_keeps_serving() {
        let (state, app) = app();
        upload_sales(&app).await;

        let poisoner = Arc::clone(&state);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.files.lock().unwrap();
            panic!("handler panicked while holding the store");
        })
        .join();
        assert!(state.files.is_poisoned());

        let (status, listing) = send_json(&app, empty("GET", "/files")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(listing.as_array().unwrap().len(), 1);
        upload_sales(&app).await;
        assert_eq!(state.files().len(), 2);
    }

    #[tokio::test]
    async fn oversized_uploads_are_rejected() {
        let config = Config {
            max_upload_bytes: 64,
            ..Config::default()
        };
        let app = router(Arc::new(AppState::in_memory(config)));
        let big = "a,b\n".to_string() + &"1,2\n".repeat(100);
        let (status, body) =
            send_json(&app, multipart("/upload", "file", "big.csv", big.as_bytes())).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body["error"]["code"], "PAYLOAD_TOO_LARGE");
    }

    #[tokio::test]
    async fn analyze_uploads_and_suggests() {
        let (state, app) = app();
        let (status, body) =
            send_json(&app, multipart("/analyze", "file", "ventas.csv", SALES.as_bytes())).await;
        assert_eq!(status, StatusCode::OK);
        let suggestions = body["suggestions"].as_array().unwrap();
        assert!(!suggestions.is_empty());
        assert!(suggestions.len() <= 6);
        assert_eq!(state.files().len(), 1);
    }

    #[tokio::test]
    async fn suggest_accepts_a_summary() {
        let (_, app) = app();
        let summary = serde_json::json!({
            "columns": ["Región", "Ventas"],
            "dtypes": {"Región": "object", "Ventas": "int64"},
            "describe": {"Región": {"count": 3, "unique": 2, "top": "Centro", "freq": 2}},
            "info": ""
        });
        let (status, body) = send_json(&app, json_request("POST", "/suggest", summary)).await;
        assert_eq!(status, StatusCode::OK);
        let first = &body.as_array().unwrap()[0];
        assert_eq!(first["parameters"]["x_axis"], "Región");
    }

    #[tokio::test]
    async fn chart_data_aggregates_the_upload() {
        let (_, app) = app();
        let id = upload_sales(&app).await;
        let request = serde_json::json!({
            "file_id": id, "x_axis": "Región", "y_axis": "Ventas", "chart_type": "bar"
        });
        let (status, body) = send_json(&app, json_request("POST", "/chart-data", request)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["columns"], serde_json::json!(["Región", "Ventas"]));
        assert_eq!(body["data"][0]["Región"], "Centro");
        assert_eq!(body["data"][0]["Ventas"], 4000);
    }

    #[tokio::test]
    async fn unknown_files_and_columns_map_to_statuses() {
        let (_, app) = app();
        let missing = serde_json::json!({"file_id": Uuid::new_v4(), "x_axis": "a"});
        let (status, body) = send_json(&app, json_request("POST", "/chart-data", missing)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "NOT_FOUND");

        let id = upload_sales(&app).await;
        let bad = serde_json::json!({"file_id": id, "x_axis": "Nope"});
        let (status, _) = send_json(&app, json_request("POST", "/chart-data", bad)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn chart_view_resolves_or_reports() {
        let (_, app) = app();
        let id = upload_sales(&app).await;
        let request = serde_json::json!({
            "file_id": id, "x_axis": "Región", "y_axis": "Ventas",
            "chart_type": "donut", "title": "Ventas por Región"
        });
        let (status, body) = send_json(&app, json_request("POST", "/chart-view", request)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["state"], "ready");
        assert_eq!(body["kind"], "donut");
        assert_eq!(body["title"], "Ventas por Región");
        assert_eq!(body["center"]["value"], 2);

        let bad = serde_json::json!({"file_id": id, "x_axis": "Nope"});
        let (status, body) = send_json(&app, json_request("POST", "/chart-view", bad)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["state"], "error");
    }

    #[tokio::test]
    async fn chart_data_exports_as_csv_and_xlsx() {
        let (_, app) = app();
        let id = upload_sales(&app).await;
        let request = serde_json::json!({"file_id": id, "x_axis": "Región", "y_axis": "Ventas"});

        let (status, body) = send(
            &app,
            json_request("POST", "/chart-data/export?format=csv", request.clone()),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            String::from_utf8(body).unwrap(),
            "Región,Ventas\nCentro,4000\nNorte,2500\n"
        );

        let (status, body) = send(
            &app,
            json_request("POST", "/chart-data/export?format=xlsx", request.clone()),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(&body[..2], b"PK");

        let (status, _) = send(
            &app,
            json_request("POST", "/chart-data/export?format=pdf", request),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn zero_sized_images_are_bad_requests() {
        let (_, app) = app();
        let id = upload_sales(&app).await;
        let request = serde_json::json!({"file_id": id, "x_axis": "Región", "y_axis": "Ventas"});
        let (status, body) = send_json(
            &app,
            json_request("POST", "/chart-image?width=0&height=10", request),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "BAD_REQUEST");
    }

    #[tokio::test]
    async fn huge_images_are_bad_requests() {
        let (_, app) = app();
        let id = upload_sales(&app).await;
        let request = serde_json::json!({"file_id": id, "x_axis": "Región", "y_axis": "Ventas"});
        for uri in [
            "/chart-image?width=100000&height=600",
            "/chart-image?width=800&height=4097",
            "/chart-image?width=4294967295&height=4294967295",
        ] {
            let (status, body) = send_json(&app, json_request("POST", uri, request.clone())).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
            assert_eq!(body["error"]["code"], "BAD_REQUEST");
            assert!(body["error"]["message"].as_str().unwrap().contains("4096"));
        }
    }

    #[tokio::test]
    async fn files_can_be_listed_and_deleted() {
        let (state, app) = app();
        let id = upload_sales(&app).await;
        let (_, listing) = send_json(&app, empty("GET", "/files")).await;
        assert_eq!(listing[0]["file_id"], id.as_str());
        assert_eq!(listing[0]["rows"], 3);

        let suggestion = serde_json::json!({
            "suggestion": {
                "title": "Ventas por Región", "chart_type": "bar",
                "parameters": {"x_axis": "Región", "y_axis": "Ventas"},
                "insight": "Centro vende más."
            },
            "file_id": id
        });
        let (status, _) = send_json(&app, json_request("POST", "/dashboard", suggestion)).await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = send_json(&app, empty("DELETE", &format!("/files/{}", id))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["dashboard_charts_removed"], 1);
        assert!(state.dashboard().is_empty());

        let (status, _) = send_json(&app, empty("DELETE", &format!("/files/{}", id))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn dashboard_round_trip_through_export_and_import() {
        let (state, app) = app();
        let id = upload_sales(&app).await;
        for title in ["Uno", "Dos"] {
            let add = serde_json::json!({
                "suggestion": {
                    "title": title, "chart_type": "pie",
                    "parameters": {"x_axis": "Región", "y_axis": "Ventas"},
                    "insight": "-"
                },
                "file_id": id
            });
            let (status, _) = send_json(&app, json_request("POST", "/dashboard", add)).await;
            assert_eq!(status, StatusCode::CREATED);
        }

        let (status, exported) = send(&app, empty("GET", "/dashboard/export")).await;
        assert_eq!(status, StatusCode::OK);

        let (status, removed) = send_json(&app, empty("DELETE", "/dashboard/0")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(removed["suggestion"]["title"], "Uno");
        let (status, _) = send_json(&app, empty("DELETE", "/dashboard/7")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = send_json(
            &app,
            multipart("/dashboard/import", "dashboard", DASHBOARD_FILE, &exported),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["charts"].as_array().unwrap().len(), 2);
        assert_eq!(state.dashboard().len(), 2);

        let (status, _) = send_json(
            &app,
            multipart("/dashboard/import", "dashboard", "x.bin.gz", b"garbage"),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn dashboard_rejects_unknown_files() {
        let (_, app) = app();
        let add = serde_json::json!({
            "suggestion": {
                "title": "t", "chart_type": "bar",
                "parameters": {"x_axis": "a"}, "insight": ""
            },
            "file_id": Uuid::new_v4()
        });
        let (status, _) = send_json(&app, json_request("POST", "/dashboard", add)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn dashboard_survives_a_restart() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            data_folder: dir.path().to_path_buf(),
            ..Config::default()
        };
        let state = Arc::new(AppState::new(config.clone()));
        let app = router(Arc::clone(&state));
        let id = upload_sales(&app).await;
        let add = serde_json::json!({
            "suggestion": {
                "title": "t", "chart_type": "bar",
                "parameters": {"x_axis": "Región"}, "insight": ""
            },
            "file_id": id
        });
        let (status, _) = send_json(&app, json_request("POST", "/dashboard", add)).await;
        assert_eq!(status, StatusCode::CREATED);

        let restarted = AppState::new(config);
        assert_eq!(restarted.dashboard().len(), 1);
    }

    struct FixedEngine;

    impl SuggestionEngine for FixedEngine {
        fn suggest(&self, _: &DataFrameSummary) -> crate::error::Result<Vec<ChartSuggestion>> {
            Ok(crate::suggest::sample_suggestions())
        }
    }

    #[tokio::test]
    async fn the_engine_can_be_swapped() {
        let state = AppState::in_memory(Config::default()).with_engine(FixedEngine);
        let app = router(Arc::new(state));
        let (status, body) =
            send_json(&app, multipart("/analyze", "file", "ventas.csv", SALES.as_bytes())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["suggestions"][0]["title"], "Ventas por Región");
        assert_eq!(body["suggestions"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let (_, app) = app();
        let (status, body) = send_json(&app, empty("GET", "/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["files"], 0);
    }
}
