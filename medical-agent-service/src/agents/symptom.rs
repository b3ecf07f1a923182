use std::sync::Arc;
use tracing::info;

use crate::error::AgentResult;
use crate::llm::{ContentPart, GenerationRequest, ModelClient, OutputFormat};
use crate::schema::{SymptomAnalysis, symptom_analysis_schema, validate_json};

pub const FINAL_STATEMENT: &str = "Connect the doctor/hospital near your location.";

/// Preliminary, non-diagnostic guidance for free-text symptoms.
pub struct SymptomAdvisor {
    client: Arc<dyn ModelClient>,
    model: String,
}

impl SymptomAdvisor {
    pub fn new(client: Arc<dyn ModelClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }

    pub async fn analyze(&self, symptoms: &str) -> AgentResult<SymptomAnalysis> {
        let prompt = format!(
            r#"### SYSTEM ROLE: Structured Medical Advisor
You are an expert medical assistant providing preliminary, non-diagnostic guidance. Your response must be highly structured, cautious, and helpful. You MUST start your analysis by generating the **disclaimer_and_urgency** field first.

### USER INPUT
Symptoms: {symptoms}

### INSTRUCTIONS
1. Fill all fields of the required JSON schema.
2. Ensure the "final_statement" field contains the exact phrase: "{FINAL_STATEMENT}"
"#
        );

        let request = GenerationRequest::new(&self.model, vec![ContentPart::Text(prompt)])
            .temperature(0.7)
            .output(OutputFormat::JsonSchema {
                name: "SymptomAnalysis".to_string(),
                schema: symptom_analysis_schema(),
            });

        let raw = self.client.generate(request).await?;
        let analysis: SymptomAnalysis = validate_json(&raw)?;
        info!(
            problems = analysis.possible_medical_problems.len(),
            specialist = %analysis.recommended_specialist,
            "Symptom analysis completed"
        );
        Ok(analysis)
    }
}
