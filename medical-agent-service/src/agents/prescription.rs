use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};

use super::report_extractor::load_blocking;
use crate::error::{AgentError, AgentResult, LoaderError};
use crate::llm::{ContentPart, GenerationRequest, ModelClient, OutputFormat};
use crate::loader::{DocumentKind, SmartLoader};
use crate::schema::{
    MedicineExplanations, PrescriptionAnalysis, PrescriptionExtraction, validate_json,
};

const EXTRACTION_PROMPT: &str = r#"You are an expert Pharmacist.
1. Identify ONLY medicine names and forms from the image.
2. Classify forms into: "Tablets", "Capsules", "Cream", "Syrup", "Drops", etc.
3. Output strictly this JSON format and nothing else:
   {"medicines": [{"name": "MedName", "form": "MedForm"}]}
"#;

const EXPLANATION_PROMPT: &str = r#"You are an expert Pharmacist.
TASK: For each medicine in the input, provide a patient-friendly summary.
OUTPUT JSON format:
{
    "MedicineName": {
        "purpose": "Brief reason for use",
        "side_effects": "2-3 common side effects",
        "interactions": "1 major warning"
    }
}
"#;

/// Reads a prescription image, then explains each medicine found on it.
pub struct PrescriptionReader {
    client: Arc<dyn ModelClient>,
    loader: SmartLoader,
    vision_model: String,
    knowledge_model: String,
}

impl PrescriptionReader {
    pub fn new(
        client: Arc<dyn ModelClient>,
        loader: SmartLoader,
        vision_model: impl Into<String>,
        knowledge_model: impl Into<String>,
    ) -> Self {
        Self {
            client,
            loader,
            vision_model: vision_model.into(),
            knowledge_model: knowledge_model.into(),
        }
    }

    pub async fn analyze(&self, path: &Path) -> AgentResult<PrescriptionAnalysis> {
        // Vision only: refuse documents before spending a model call
        let kind = DocumentKind::from_path(path)?;
        if !kind.is_image() {
            return Err(LoaderError::UnsupportedFormat {
                extension: path
                    .extension()
                    .map(|e| format!(".{}", e.to_string_lossy()))
                    .unwrap_or_default(),
            }
            .into());
        }

        let payload = load_blocking(self.loader.clone(), path.to_path_buf()).await?;

        // Step 1: read medicine names and dosages off the image
        let raw_extraction = self.extract_medicines(ContentPart::from(payload)).await.map_err(|e| {
            error!(error = %e, "Prescription extraction failed");
            AgentError::Upstream(format!("Failed to extract medicines from image: {e}"))
        })?;
        info!(medicines = raw_extraction.medicines.len(), "Medicines extracted");

        // Step 2: explain each medicine from general knowledge
        let analysis = self.explain_medicines(&raw_extraction).await.map_err(|e| {
            error!(error = %e, "Medicine explanation failed");
            AgentError::Upstream(format!("Failed to generate explanation report: {e}"))
        })?;

        Ok(PrescriptionAnalysis {
            raw_extraction,
            analysis,
        })
    }

    async fn extract_medicines(&self, image: ContentPart) -> AgentResult<PrescriptionExtraction> {
        let request = GenerationRequest::new(
            &self.vision_model,
            vec![ContentPart::Text(EXTRACTION_PROMPT.to_string()), image],
        )
        .temperature(0.1)
        .output(OutputFormat::Json);

        let raw = self.client.generate(request).await?;
        validate_json(&raw)
    }

    async fn explain_medicines(
        &self,
        extraction: &PrescriptionExtraction,
    ) -> AgentResult<MedicineExplanations> {
        let input = serde_json::to_string(extraction)
            .map_err(|e| AgentError::Validation(e.to_string()))?;
        let prompt = format!("{EXPLANATION_PROMPT}\nINPUT: {input}");

        let request = GenerationRequest::new(&self.knowledge_model, vec![ContentPart::Text(prompt)])
            .temperature(0.4)
            .output(OutputFormat::Json);

        let raw = self.client.generate(request).await?;
        validate_json(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::testing::*;
    use crate::error::UpstreamError;
    use crate::loader::fixtures::png_bytes;
    use tempfile::TempDir;

    fn reader(model: Arc<ScriptedModel>) -> PrescriptionReader {
        PrescriptionReader::new(model, SmartLoader::default(), "vision", "knowledge")
    }

    fn write_png(dir: &TempDir) -> std::path::PathBuf {
        let path = dir.path().join("rx.png");
        std::fs::write(&path, png_bytes()).unwrap();
        path
    }

    #[tokio::test]
    async fn test_two_step_analysis() {
        let dir = TempDir::new().unwrap();
        let path = write_png(&dir);
        let model = Arc::new(
            ScriptedModel::new()
                .reply(&format!("```json\n{MEDICINES_JSON}\n```"))
                .reply(EXPLANATIONS_JSON),
        );

        let result = reader(model.clone()).analyze(&path).await.unwrap();
        assert_eq!(result.raw_extraction.medicines.len(), 2);
        assert_eq!(result.analysis["Ibuprofen"].interactions, "Warfarin");

        let requests = model.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].model, "vision");
        assert!(matches!(
            &requests[0].parts[1],
            ContentPart::Binary { media_type, .. } if media_type == "image/png"
        ));
        assert_eq!(requests[1].model, "knowledge");
        match &requests[1].parts[0] {
            ContentPart::Text(prompt) => assert!(prompt.contains("Amoxicillin")),
            other => panic!("unexpected part {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_pdf_upload_is_rejected_before_model() {
        let model = Arc::new(ScriptedModel::new());
        let err = reader(model.clone())
            .analyze(Path::new("/tmp/rx.pdf"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            AgentError::Loader(LoaderError::UnsupportedFormat { .. })
        ));
        assert!(model.requests().is_empty());
    }

    #[tokio::test]
    async fn test_extraction_failure_stops_pipeline() {
        let dir = TempDir::new().unwrap();
        let path = write_png(&dir);
        let model = Arc::new(ScriptedModel::new().reply("I cannot read this handwriting"));

        let err = reader(model.clone()).analyze(&path).await.unwrap_err();
        match err {
            AgentError::Upstream(msg) => {
                assert!(msg.starts_with("Failed to extract medicines from image"))
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(model.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_explanation_failure_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = write_png(&dir);
        let model = Arc::new(
            ScriptedModel::new()
                .reply(MEDICINES_JSON)
                .fail(UpstreamError::Status {
                    status: 503,
                    body: "overloaded".to_string(),
                }),
        );

        let err = reader(model).analyze(&path).await.unwrap_err();
        assert!(err.to_string().contains("Failed to generate explanation report"));
    }
}
