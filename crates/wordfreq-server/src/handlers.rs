use std::path::Path as FsPath;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::{DefaultBodyLimit, Path, Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::{error, info};
use wordfreq_text::{
    AnalysisOptions, AnalysisReport, DecodeError, ExportError, LoadError, Pipeline, RawDocument,
    RunController, RunOutcome, RunPhase, SessionEvent, SessionState, StopwordSet, WordCount,
    decode, file_too_large_message, has_txt_extension, to_csv_string,
};

use crate::sessions::{SessionStore, SessionStoreError, valid_session_id};

const CSV_FILENAME: &str = "word-frequency.csv";

#[derive(Clone)]
pub struct AppState {
    pub stopwords: Arc<StopwordSet>,
    pub sessions: SessionStore,
    pub max_upload_bytes: u64,
}

/// Options accepted on every analysis request. Missing fields fall back to
/// the defaults (stateless) or the session's current options.
#[derive(Debug, Default, Deserialize)]
pub struct AnalyzeQuery {
    pub filename: Option<String>,
    pub top_n: Option<usize>,
    pub min_word_length: Option<usize>,
    pub keep_internal_apostrophes: Option<bool>,
    pub include_numbers: Option<bool>,
    pub allow_non_latin_letters: Option<bool>,
    pub require_txt_extension: Option<bool>,
    pub stopwords: Option<String>,
    pub format: Option<String>,
}

impl AnalyzeQuery {
    fn options(&self, base: AnalysisOptions) -> AnalysisOptions {
        AnalysisOptions {
            top_n: self.top_n.unwrap_or(base.top_n),
            min_word_length: self.min_word_length.unwrap_or(base.min_word_length),
            keep_internal_apostrophes: self
                .keep_internal_apostrophes
                .unwrap_or(base.keep_internal_apostrophes),
            include_numbers: self.include_numbers.unwrap_or(base.include_numbers),
            allow_non_latin_letters: self
                .allow_non_latin_letters
                .unwrap_or(base.allow_non_latin_letters),
        }
        .clamped()
    }

    fn check_extension(&self) -> Result<(), ApiError> {
        if !self.require_txt_extension.unwrap_or(true) {
            return Ok(());
        }
        match self.filename.as_deref() {
            Some(name) if has_txt_extension(FsPath::new(name)) => Ok(()),
            _ => Err(LoadError::UnsupportedFileType.into()),
        }
    }

    fn wants_csv(&self) -> Result<bool, ApiError> {
        match self.format.as_deref().map(str::to_ascii_lowercase).as_deref() {
            None | Some("json") => Ok(false),
            Some("csv") => Ok(true),
            Some(other) => Err(ApiError::bad_request(format!(
                "format must be json or csv, got {other}"
            ))),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    pub search: Option<String>,
}

#[derive(Serialize)]
pub struct ReportResponse {
    filename: Option<String>,
    encoding: &'static str,
    options: AnalysisOptions,
    total: usize,
    items: Vec<WordCount>,
    warning: Option<String>,
    preview: String,
    debug: DebugInfo,
}

#[derive(Serialize)]
struct DebugInfo {
    loaded_chars: usize,
    tokens: usize,
    skipped_short: usize,
    skipped_stopwords: usize,
    distinct_words: usize,
    sample_tokens: Vec<String>,
    built_in_stopwords: usize,
    additional_stopwords: usize,
    merged_stopwords: usize,
    preview: String,
}

impl ReportResponse {
    fn new(report: &AnalysisReport, items: Vec<WordCount>) -> Self {
        Self {
            filename: report.filename.clone(),
            encoding: report.encoding.name(),
            options: report.options,
            total: items.len(),
            items,
            warning: report.advisory.as_ref().map(|advisory| advisory.message()),
            preview: report.preview.compact.clone(),
            debug: DebugInfo {
                loaded_chars: report.preview.loaded_chars,
                tokens: report.stats.tokens,
                skipped_short: report.stats.skipped_short,
                skipped_stopwords: report.stats.skipped_stopwords,
                distinct_words: report.stats.distinct_words,
                sample_tokens: report.stats.sample_tokens.clone(),
                built_in_stopwords: report.stopwords.built_in,
                additional_stopwords: report.stopwords.additional,
                merged_stopwords: report.stopwords.merged,
                preview: report.preview.debug.clone(),
            },
        }
    }
}

#[derive(Serialize)]
pub struct SessionResponse {
    id: String,
    generation: u64,
    phase: &'static str,
    status: String,
    options: AnalysisOptions,
    additional_stopwords: String,
    search: Option<String>,
    report: Option<ReportResponse>,
}

impl SessionResponse {
    fn new(id: &str, state: &SessionState, search: Option<String>) -> Self {
        let report = state.report.as_deref().map(|report| {
            let items = state.filtered_results(search.as_deref().unwrap_or_default());
            ReportResponse::new(report, items)
        });
        Self {
            id: id.to_string(),
            generation: state.generation,
            phase: phase_name(state.phase),
            status: state.status_message.clone(),
            options: state.options,
            additional_stopwords: state.additional_stopwords.clone(),
            search,
            report,
        }
    }
}

#[derive(Serialize)]
pub struct RunResponse {
    outcome: &'static str,
    session: SessionResponse,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

pub fn router(state: AppState) -> Router {
    let body_limit = usize::try_from(state.max_upload_bytes).unwrap_or(usize::MAX);
    Router::new()
        .route("/healthz", get(healthz))
        .route("/v1/analyze", post(analyze_document))
        .route(
            "/v1/sessions/{id}",
            get(session_snapshot).delete(delete_session),
        )
        .route(
            "/v1/sessions/{id}/stopwords",
            put(set_stopwords).delete(clear_stopwords),
        )
        .route("/v1/sessions/{id}/runs", post(start_run).delete(cancel_run))
        .route("/v1/sessions/{id}/export.csv", get(export_csv))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

async fn healthz() -> impl IntoResponse {
    "ok"
}

async fn analyze_document(
    State(state): State<AppState>,
    Query(params): Query<AnalyzeQuery>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Response, ApiError> {
    let wants_csv = params.wants_csv()?;
    params.check_extension()?;
    let body = read_body(&headers, body, state.max_upload_bytes)?;

    let options = params.options(AnalysisOptions::default());
    let additional = params.stopwords.clone().unwrap_or_default();
    let document = RawDocument::new(body.to_vec(), params.filename.clone());
    let built_in = Arc::clone(&state.stopwords);

    // A fresh controller per request: nothing can supersede it.
    let token = RunController::new().begin();
    let outcome = tokio::task::spawn_blocking(move || {
        Pipeline::new(&built_in, &additional, options).run(&document, &token)
    })
    .await
    .map_err(|err| {
        error!("analysis task failed: {err}");
        ApiError::Internal
    })??;

    let RunOutcome::Completed(report) = outcome else {
        return Err(ApiError::Internal);
    };
    if wants_csv {
        return Ok(csv_response(&report.results));
    }
    let response = ReportResponse::new(&report, report.results.clone());
    Ok(no_store(Json(response)))
}

async fn session_snapshot(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<SearchQuery>,
) -> Result<Response, ApiError> {
    check_session_id(&id)?;
    let session = state
        .sessions
        .get(&id)
        .ok_or_else(|| ApiError::NotFound(format!("session {id} not found")))?;
    let snapshot = session.snapshot();
    Ok(no_store(Json(SessionResponse::new(&id, &snapshot, params.search))))
}

async fn set_stopwords(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Response, ApiError> {
    check_session_id(&id)?;
    let body = read_body(&headers, body, state.max_upload_bytes)?;
    let raw = decode(&body, "stopwords")?;
    let session = state.sessions.get_or_create(&id)?;
    let snapshot = session.apply(SessionEvent::StopwordsChanged(raw));
    Ok(no_store(Json(SessionResponse::new(&id, &snapshot, None))))
}

async fn clear_stopwords(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    check_session_id(&id)?;
    let session = state.sessions.get_or_create(&id)?;
    let snapshot = session.apply(SessionEvent::StopwordsCleared);
    Ok(no_store(Json(SessionResponse::new(&id, &snapshot, None))))
}

async fn start_run(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<AnalyzeQuery>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Response, ApiError> {
    check_session_id(&id)?;
    params.check_extension()?;
    let body = read_body(&headers, body, state.max_upload_bytes)?;

    let session = state.sessions.get_or_create(&id)?;
    let options = params.options(session.snapshot().options);
    let snapshot = session.apply(SessionEvent::OptionsChanged(options));
    let additional = params
        .stopwords
        .clone()
        .unwrap_or_else(|| snapshot.additional_stopwords.clone());

    let document = RawDocument::new(body.to_vec(), params.filename.clone());
    let token = session.begin_run(params.filename.clone());
    let generation = token.generation();
    info!("session {id}: run {generation} started");

    let built_in = Arc::clone(&state.stopwords);
    let outcome = tokio::task::spawn_blocking(move || {
        Pipeline::new(&built_in, &additional, options).run(&document, &token)
    })
    .await
    .map_err(|err| {
        error!("analysis task failed: {err}");
        ApiError::Internal
    })?;

    let (outcome, snapshot) = match outcome {
        Ok(RunOutcome::Completed(report)) => {
            let snapshot = session.apply(SessionEvent::RunCompleted(report));
            let published =
                snapshot.generation == generation && snapshot.phase == RunPhase::Completed;
            (if published { "completed" } else { "superseded" }, snapshot)
        }
        Ok(RunOutcome::Cancelled) => ("superseded", session.snapshot()),
        Err(err) => {
            let snapshot = session.apply(SessionEvent::RunFailed {
                generation,
                message: err.to_string(),
            });
            if snapshot.generation != generation {
                info!("session {id}: run {generation} failed after being superseded: {err}");
                ("superseded", snapshot)
            } else {
                info!("session {id}: run {generation} failed: {err}");
                return Err(err.into());
            }
        }
    };
    let response = RunResponse {
        outcome,
        session: SessionResponse::new(&id, &snapshot, None),
    };
    Ok(no_store(Json(response)))
}

async fn cancel_run(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    check_session_id(&id)?;
    let session = state
        .sessions
        .get(&id)
        .ok_or_else(|| ApiError::NotFound(format!("session {id} not found")))?;
    let snapshot = session.cancel_run();
    info!("session {id}: cancelled, generation now {}", snapshot.generation);
    Ok(no_store(Json(SessionResponse::new(&id, &snapshot, None))))
}

async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    check_session_id(&id)?;
    state
        .sessions
        .remove(&id)
        .ok_or_else(|| ApiError::NotFound(format!("session {id} not found")))?;
    info!("session {id}: deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn export_csv(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<SearchQuery>,
) -> Result<Response, ApiError> {
    check_session_id(&id)?;
    let session = state
        .sessions
        .get(&id)
        .ok_or_else(|| ApiError::NotFound(format!("session {id} not found")))?;
    let rows = session
        .snapshot()
        .filtered_results(params.search.as_deref().unwrap_or_default());
    if rows.is_empty() {
        return Err(ApiError::NotFound(ExportError::Empty.to_string()));
    }
    Ok(csv_response(&rows))
}

fn check_session_id(id: &str) -> Result<(), ApiError> {
    if valid_session_id(id) {
        return Ok(());
    }
    Err(ApiError::bad_request(
        "session id must be 1-64 characters of letters, digits, '-' or '_'",
    ))
}

fn read_body(
    headers: &HeaderMap,
    body: Result<Bytes, BytesRejection>,
    limit: u64,
) -> Result<Bytes, ApiError> {
    match body {
        Ok(bytes) => Ok(bytes),
        Err(rejection) if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE => {
            let size = headers
                .get(header::CONTENT_LENGTH)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.parse::<u64>().ok())
                .unwrap_or(limit.saturating_add(1));
            Err(ApiError::PayloadTooLarge(file_too_large_message(size, limit)))
        }
        Err(rejection) => Err(ApiError::bad_request(rejection.body_text())),
    }
}

fn csv_response(rows: &[WordCount]) -> Response {
    let disposition = format!("attachment; filename=\"{CSV_FILENAME}\"");
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/csv; charset=utf-8"),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    (headers, to_csv_string(rows)).into_response()
}

fn no_store(body: impl IntoResponse) -> Response {
    (
        [(header::CACHE_CONTROL, HeaderValue::from_static("no-store"))],
        body,
    )
        .into_response()
}

fn phase_name(phase: RunPhase) -> &'static str {
    match phase {
        RunPhase::Idle => "idle",
        RunPhase::Running => "running",
        RunPhase::Completed => "completed",
        RunPhase::Failed => "failed",
        RunPhase::Cancelled => "cancelled",
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    PayloadTooLarge(String),
    #[error("{0}")]
    UnsupportedMediaType(String),
    #[error("{0}")]
    Unprocessable(String),
    #[error("{0}")]
    Unavailable(String),
    #[error("internal server error")]
    Internal,
}

impl ApiError {
    fn bad_request<T: Into<String>>(msg: T) -> Self {
        ApiError::BadRequest(msg.into())
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApiError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<LoadError> for ApiError {
    fn from(err: LoadError) -> Self {
        match err {
            LoadError::UnsupportedFileType => ApiError::UnsupportedMediaType(err.to_string()),
            LoadError::FileTooLarge { .. } => ApiError::PayloadTooLarge(err.to_string()),
            LoadError::Unreadable(_) => ApiError::Unprocessable(err.to_string()),
            LoadError::Io(io) => {
                error!("unexpected io error during analysis: {io}");
                ApiError::Internal
            }
        }
    }
}

impl From<SessionStoreError> for ApiError {
    fn from(err: SessionStoreError) -> Self {
        ApiError::Unavailable(err.to_string())
    }
}

impl From<DecodeError> for ApiError {
    fn from(err: DecodeError) -> Self {
        ApiError::Unprocessable(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            ApiError::Internal => {
                let body = Json(json!({ "error": "internal server error" }));
                (status, body).into_response()
            }
            other => {
                let body = Json(ErrorResponse {
                    error: other.to_string(),
                });
                (status, body).into_response()
            }
        }
    }
}
