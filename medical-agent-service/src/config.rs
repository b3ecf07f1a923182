use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_PORT: u16 = 5001;
pub const DEFAULT_SCANNED_PDF_THRESHOLD: usize = 50;
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

/// Settings for [`crate::loader::SmartLoader`].
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Average extracted characters per page below which a PDF is sent as raw bytes.
    pub scanned_pdf_threshold: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            scanned_pdf_threshold: DEFAULT_SCANNED_PDF_THRESHOLD,
        }
    }
}

/// Model identifiers used by each agent.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub extraction: String,
    pub symptom: String,
    pub prescription_vision: String,
    pub prescription_knowledge: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            extraction: "google/gemini-2.0-flash-001".to_string(),
            symptom: "google/gemini-2.5-flash".to_string(),
            prescription_vision: "google/gemini-2.5-flash-lite".to_string(),
            prescription_knowledge: "google/gemini-2.5-flash-lite".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub port: u16,
    pub request_timeout: Duration,
    pub max_upload_bytes: usize,
    /// Directory for transient upload files; the system temp dir when unset.
    pub upload_dir: Option<PathBuf>,
    pub models: ModelConfig,
    pub loader: LoaderConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            port: DEFAULT_PORT,
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            upload_dir: None,
            models: ModelConfig::default(),
            loader: LoaderConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Reads configuration from the process environment.
    ///
    /// A missing `OPENROUTER_API_KEY` is not an error: the service starts in a
    /// degraded state and the agent endpoints report it per request.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let model_defaults = ModelConfig::default();

        let api_key = lookup("OPENROUTER_API_KEY").filter(|k| !k.trim().is_empty());
        if api_key.is_none() {
            warn!("OPENROUTER_API_KEY not found in environment variables");
        }

        let prescription = lookup("PRESCRIPTION_MODEL");

        Self {
            api_key,
            base_url: lookup("OPENROUTER_BASE_URL").unwrap_or(defaults.base_url),
            port: parse_or("PORT", lookup("PORT"), defaults.port),
            request_timeout: Duration::from_secs(parse_or(
                "MODEL_TIMEOUT_SECS",
                lookup("MODEL_TIMEOUT_SECS"),
                DEFAULT_TIMEOUT_SECS,
            )),
            max_upload_bytes: parse_or(
                "MAX_UPLOAD_BYTES",
                lookup("MAX_UPLOAD_BYTES"),
                defaults.max_upload_bytes,
            ),
            upload_dir: lookup("UPLOAD_DIR").map(PathBuf::from),
            models: ModelConfig {
                extraction: lookup("EXTRACTION_MODEL").unwrap_or(model_defaults.extraction),
                symptom: lookup("SYMPTOM_MODEL").unwrap_or(model_defaults.symptom),
                prescription_vision: prescription
                    .clone()
                    .unwrap_or(model_defaults.prescription_vision),
                prescription_knowledge: prescription
                    .unwrap_or(model_defaults.prescription_knowledge),
            },
            loader: LoaderConfig {
                scanned_pdf_threshold: parse_or(
                    "SCANNED_PDF_CHARS_PER_PAGE",
                    lookup("SCANNED_PDF_CHARS_PER_PAGE"),
                    DEFAULT_SCANNED_PDF_THRESHOLD,
                ),
            },
        }
    }
}

fn parse_or<T: FromStr + Copy + std::fmt::Display>(key: &str, raw: Option<String>, default: T) -> T {
    match raw {
        None => default,
        Some(value) => value.trim().parse().unwrap_or_else(|_| {
            warn!(key, value = %value, fallback = %default, "Invalid value, using default");
            default
        }),
    }
}
