use axum::{
    Router,
    body::Bytes,
    extract::{
        DefaultBodyLimit, Multipart, Request, State,
        multipart::{MultipartError, MultipartRejection},
        rejection::BytesRejection,
    },
    http::{HeaderValue, StatusCode},
    middleware::{Next, from_fn},
    response::{Json, Response},
    routing::{get, post},
};
use serde_json::{Value, json};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{Instrument, error, info, warn};
use uuid::Uuid;

use crate::{
    agents::{PatientConsultant, PatientProfile, PrescriptionReader, ReportExtractor, SymptomAdvisor},
    config::ServiceConfig,
    error::{AgentError, LoaderError},
    format::{markdown_to_html, symptom_analysis_markdown},
    llm::{ModelClient, OpenRouterClient},
    loader::SmartLoader,
};

type ApiResult<T> = Result<Json<T>, ApiError>;
type ApiError = (StatusCode, Json<Value>);

fn error_response(status: StatusCode, message: &str) -> ApiError {
    (
        status,
        Json(json!({
            "status": "error",
            "message": message
        })),
    )
}

fn bad_request_error(message: &str) -> ApiError {
    error_response(StatusCode::BAD_REQUEST, message)
}

fn internal_error(message: &str) -> ApiError {
    error_response(StatusCode::INTERNAL_SERVER_ERROR, message)
}

/// Maps an agent failure to a response; bad uploads are the caller's fault, the rest is ours.
fn agent_error(context: &str, e: &AgentError) -> ApiError {
    let message = format!("{context}: {e}");
    match e {
        AgentError::Loader(LoaderError::UnsupportedFormat { .. })
        | AgentError::Loader(LoaderError::DecodeError { .. }) => {
            warn!(error = %e, "{}", context);
            bad_request_error(&message)
        }
        _ => {
            error!(error = %e, "{}", context);
            internal_error(&message)
        }
    }
}

fn multipart_error(e: MultipartError) -> ApiError {
    warn!(error = %e, "Rejected multipart upload");
    error_response(e.status(), &e.body_text())
}

/// A body that is not multipart at all carries no file part.
fn multipart_rejection(rejection: MultipartRejection) -> ApiError {
    warn!(error = %rejection.body_text(), "Request is not a multipart upload");
    error_response(rejection.status(), "No file part in the request.")
}

fn body_rejection(rejection: BytesRejection) -> ApiError {
    warn!(error = %rejection.body_text(), "Failed to read request body");
    error_response(rejection.status(), &rejection.body_text())
}

/// Agents built once at startup and shared by every request.
pub struct Agents {
    pub extractor: ReportExtractor,
    pub consultant: PatientConsultant,
    pub prescription: PrescriptionReader,
    pub symptom: SymptomAdvisor,
}

impl Agents {
    pub fn new(client: Arc<dyn ModelClient>, config: &ServiceConfig) -> Self {
        let loader = SmartLoader::new(config.loader.clone());
        let models = &config.models;
        Self {
            extractor: ReportExtractor::new(client.clone(), loader.clone(), &models.extraction),
            consultant: PatientConsultant::new(client.clone(), &models.extraction),
            prescription: PrescriptionReader::new(
                client.clone(),
                loader,
                &models.prescription_vision,
                &models.prescription_knowledge,
            ),
            symptom: SymptomAdvisor::new(client, &models.symptom),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    /// `None` when the service runs degraded (no model credential).
    pub agents: Option<Arc<Agents>>,
    pub upload_dir: Option<PathBuf>,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn from_config(config: &ServiceConfig) -> Self {
        let agents = match &config.api_key {
            Some(api_key) => {
                match OpenRouterClient::new(api_key, &config.base_url, config.request_timeout) {
                    Ok(client) => Some(Arc::new(Agents::new(Arc::new(client), config))),
                    Err(e) => {
                        error!("Failed to initialize model client: {}", e);
                        None
                    }
                }
            }
            None => {
                warn!("Starting without model credentials; analysis endpoints will return 500");
                None
            }
        };

        Self {
            agents,
            upload_dir: config.upload_dir.clone(),
            max_upload_bytes: config.max_upload_bytes,
        }
    }

    pub fn with_client(client: Arc<dyn ModelClient>, config: &ServiceConfig) -> Self {
        Self {
            agents: Some(Arc::new(Agents::new(client, config))),
            upload_dir: config.upload_dir.clone(),
            max_upload_bytes: config.max_upload_bytes,
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.agents.is_none()
    }

    fn agents(&self, message: &str) -> Result<Arc<Agents>, ApiError> {
        self.agents.clone().ok_or_else(|| internal_error(message))
    }
}

pub fn create_app(config: &ServiceConfig) -> Router {
    build_router(AppState::from_config(config))
}

pub fn build_router(app_state: AppState) -> Router {
    let body_limit = app_state.max_upload_bytes;
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/analyze_reports", get(reports_info).post(analyze_reports))
        .route("/analyze_prescription", post(analyze_prescription))
        .route("/doctor_assistant", post(doctor_assistant))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(from_fn(correlation_id_middleware))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

/// Tags each request with a correlation ID header and tracing span.
async fn correlation_id_middleware(mut request: Request, next: Next) -> Response {
    let correlation_id = Uuid::new_v4().to_string();

    if let Ok(value) = HeaderValue::from_str(&correlation_id) {
        request.headers_mut().insert("x-correlation-id", value);
    }

    let span = tracing::info_span!("http_request", correlation_id = %correlation_id);
    next.run(request).instrument(span).await
}

async fn root() -> Json<Value> {
    Json(json!({
        "service": "Medical Agent Service",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "AI-assisted medical report, prescription, and symptom analysis",
        "endpoints": {
            "POST /analyze_reports": "Upload a report (pdf, docx, txt, jpg, png) with an optional patient profile",
            "POST /analyze_prescription": "Upload a prescription image",
            "POST /doctor_assistant": "Send {\"symptoms\": \"...\"} for preliminary guidance",
            "GET /health": "Health check"
        }
    }))
}

async fn health_check(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "degraded": state.is_degraded(),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn reports_info() -> Json<Value> {
    Json(json!({
        "status": "info",
        "message": "Send a POST request with a 'file' and patient profile data to initiate analysis."
    }))
}

struct Upload {
    file_name: String,
    bytes: Bytes,
}

#[derive(Default)]
struct ReportForm {
    upload: Option<Upload>,
    name: Option<String>,
    age: Option<String>,
    gender: Option<String>,
    history: Option<String>,
    complaints: Option<String>,
}

impl ReportForm {
    fn profile(&self) -> PatientProfile {
        let defaults = PatientProfile::default();
        PatientProfile {
            name: self.name.clone().unwrap_or(defaults.name),
            age: self.age.clone().unwrap_or(defaults.age),
            gender: self.gender.clone().unwrap_or(defaults.gender),
            history: self.history.clone().unwrap_or(defaults.history),
            complaints: self.complaints.clone().unwrap_or(defaults.complaints),
        }
    }
}

async fn read_form(mut multipart: Multipart) -> Result<ReportForm, ApiError> {
    let mut form = ReportForm::default();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await.map_err(multipart_error)?;
                form.upload = Some(Upload { file_name, bytes });
            }
            "name" | "age" | "gender" | "history" | "complaints" => {
                let value = field.text().await.map_err(multipart_error)?;
                let slot = match name.as_str() {
                    "name" => &mut form.name,
                    "age" => &mut form.age,
                    "gender" => &mut form.gender,
                    "history" => &mut form.history,
                    _ => &mut form.complaints,
                };
                *slot = Some(value);
            }
            _ => {}
        }
    }

    Ok(form)
}

fn require_upload(upload: Option<Upload>) -> Result<Upload, ApiError> {
    let upload = upload.ok_or_else(|| bad_request_error("No file part in the request."))?;
    if upload.file_name.is_empty() {
        return Err(bad_request_error("No selected file."));
    }
    Ok(upload)
}

/// Writes the upload to a temp file that keeps its extension and is deleted on drop.
async fn persist_upload(upload: Upload, dir: Option<PathBuf>) -> Result<NamedTempFile, ApiError> {
    let suffix = Path::new(&upload.file_name)
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    let result = tokio::task::spawn_blocking(move || -> std::io::Result<NamedTempFile> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("upload-").suffix(&suffix);
        let mut file = match &dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        file.write_all(&upload.bytes)?;
        file.flush()?;
        Ok(file)
    })
    .await;

    match result {
        Ok(Ok(file)) => Ok(file),
        Ok(Err(e)) => {
            error!("Failed to store upload: {}", e);
            Err(internal_error(&format!(
                "An unexpected server error occurred: {e}"
            )))
        }
        Err(e) => {
            error!("Upload task failed: {}", e);
            Err(internal_error(&format!(
                "An unexpected server error occurred: {e}"
            )))
        }
    }
}

async fn analyze_reports(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Value> {
    // Request shape is checked before the degraded state
    let form = read_form(multipart.map_err(multipart_rejection)?).await?;
    let profile = form.profile();
    let upload = require_upload(form.upload)?;

    let agents =
        state.agents("System Error: AI agents failed to initialize. Check OPENROUTER_API_KEY.")?;

    info!(file = %upload.file_name, "Starting medical report analysis");
    // Removed when `tmp_file` drops, on success or any early return
    let tmp_file = persist_upload(upload, state.upload_dir.clone()).await?;

    // Step 1: structured extraction
    let record = agents
        .extractor
        .analyze_file(tmp_file.path())
        .await
        .map_err(|e| agent_error("Extraction Agent Failed", &e))?;

    // Step 2: patient-facing consultation, as Markdown and as JSON
    let markdown = agents
        .consultant
        .consult_markdown(&record, Some(&profile))
        .await
        .map_err(|e| agent_error("Consultant Agent Failed (Markdown)", &e))?;

    let summary = agents
        .consultant
        .consult_json(&record, Some(&profile))
        .await
        .map_err(|e| agent_error("Consultant Agent Failed (JSON parsing/validation)", &e))?;

    info!(doc_type = ?record.meta.doc_type, "Medical report analysis completed");

    Ok(Json(json!({
        "status": "success",
        "service": "Medical Consultation",
        "patient_profile": profile,
        "structured_medical_data": record,
        "consultation_summary_html": markdown_to_html(&markdown),
        "consultation_summary_markdown": markdown,
        "consultation_summary_json": summary
    })))
}

async fn analyze_prescription(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Value> {
    let form = read_form(multipart.map_err(multipart_rejection)?).await?;
    let upload = require_upload(form.upload)?;

    let agents = state.agents("System Error: Prescription Agent failed to initialize.")?;

    info!(file = %upload.file_name, "Starting prescription analysis");
    let tmp_file = persist_upload(upload, state.upload_dir.clone()).await?;

    let result = agents
        .prescription
        .analyze(tmp_file.path())
        .await
        .map_err(|e| agent_error("Prescription Analysis Failed", &e))?;

    Ok(Json(json!({
        "status": "success",
        "service": "Prescription Analysis",
        "raw_extraction": result.raw_extraction,
        "analysis": result.analysis
    })))
}

fn validate_symptoms(body: &[u8]) -> Result<String, ApiError> {
    let data: Option<Value> = serde_json::from_slice(body).ok();
    let symptoms = data
        .as_ref()
        .and_then(|d| d.get("symptoms"))
        .ok_or_else(|| bad_request_error("Missing 'symptoms' field in request JSON."))?;

    match symptoms.as_str() {
        Some(s) if !s.is_empty() => Ok(s.to_string()),
        _ => Err(bad_request_error("Symptoms must be a non-empty string.")),
    }
}

async fn doctor_assistant(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> ApiResult<Value> {
    // Malformed JSON reports the same message as a missing field
    let body = body.map_err(body_rejection)?;
    let symptoms = validate_symptoms(&body)?;

    let agents = state.agents("System Error: Symptom Analysis Agent failed to initialize.")?;

    info!(chars = symptoms.len(), "Starting symptom analysis");
    let analysis = agents
        .symptom
        .analyze(&symptoms)
        .await
        .map_err(|e| agent_error("Symptom Analysis Failed", &e))?;

    Ok(Json(json!({
        "status": "success",
        "service": "Symptom Analysis",
        "analysis_markdown": symptom_analysis_markdown(&analysis),
        "input_symptoms": symptoms,
        "analysis_json": analysis
    })))
}
