use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

use crate::error::{AgentError, AgentResult};
use crate::llm::{ContentPart, GenerationRequest, ModelClient, OutputFormat};
use crate::loader::{DocumentPayload, SmartLoader};
use crate::schema::{MedicalRecord, medical_record_schema, validate_json};

const EXTRACTION_INSTRUCTION: &str = r#"### ROLE
You are an expert Medical AI Agent. You accept input as raw text, images (scans), or PDFs.

### OBJECTIVE
1. CLASSIFY the document (Diagnostic, Clinical, Procedural, Administrative).
2. EXTRACT entities accurately into the provided schema.
3. OUTPUT strict JSON that conforms exactly to the MedicalRecord schema.

### RULES
- If the input is an image/PDF, visually analyze checkboxes, handwritten text, and layout.
- If text is illegible or a field is not present, mark the field as null or omit it according to the schema.
- Maintain patient privacy (Extract entities exactly).
"#;

/// Classifies a medical document and extracts it into a [`MedicalRecord`].
pub struct ReportExtractor {
    client: Arc<dyn ModelClient>,
    loader: SmartLoader,
    model: String,
}

impl ReportExtractor {
    pub fn new(client: Arc<dyn ModelClient>, loader: SmartLoader, model: impl Into<String>) -> Self {
        Self {
            client,
            loader,
            model: model.into(),
        }
    }

    pub async fn analyze_file(&self, path: &Path) -> AgentResult<MedicalRecord> {
        info!(path = %path.display(), "Processing document for extraction");

        // PDF parsing and image decoding are CPU-bound
        let payload = load_blocking(self.loader.clone(), path.to_path_buf()).await?;
        info!(payload = %payload.describe(), "Document loaded");

        let request = GenerationRequest::new(&self.model, vec![ContentPart::from(payload)])
            .system(EXTRACTION_INSTRUCTION)
            .temperature(0.1)
            .output(OutputFormat::JsonSchema {
                name: "MedicalRecord".to_string(),
                schema: medical_record_schema(),
            });

        let raw = self.client.generate(request).await.map_err(|e| {
            error!(error = %e, "Extraction model call failed");
            AgentError::from(e)
        })?;

        // Reject anything that doesn't fit the record shape
        let record: MedicalRecord = validate_json(&raw)?;
        info!(
            doc_type = ?record.meta.doc_type,
            confidence = record.meta.confidence,
            "Document classified"
        );
        Ok(record)
    }
}

/// Runs the synchronous loader on the blocking pool.
pub async fn load_blocking(loader: SmartLoader, path: PathBuf) -> AgentResult<DocumentPayload> {
    tokio::task::spawn_blocking(move || loader.process_file(&path))
        .await
        .map_err(|e| AgentError::Upstream(format!("loader task failed: {e}")))?
        .map_err(AgentError::from)
}
