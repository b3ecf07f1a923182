use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::error::{AgentError, AgentResult};
use crate::llm::{ContentPart, GenerationRequest, ModelClient, OutputFormat};
use crate::schema::{ConsultationSummary, MedicalRecord, consultation_summary_schema, validate_json};

const CONSULTANT_ROLE: &str = r#"### SYSTEM ROLE
You are a senior, empathetic, and professional Medical Consultant AI. Your task is to interpret a technical medical report analysis for a specific patient. You must bridge the gap between complex medical data and patient understanding.

### RESPONSE GUIDELINES
1. **Tone:** Professional yet warm.
2. **Prioritization:** Start with the most critical findings (Red Flags).
3. **Correlation:** Explain what findings mean in simple English. Insert a diagram tag (e.g. [Image of X]) on a new line if helpful.
4. **Actionable Advice:** Provide 3 specific lifestyle/dietary recommendations.
5. **Safety Guardrails:** Do NOT diagnose or prescribe medication. ALWAYS end with a medical disclaimer.
"#;

const MARKDOWN_FORMAT: &str = r#"
### REQUIRED OUTPUT FORMAT (Markdown)
## Dr. AI Summary

**1. The Big Picture**
(A 2-sentence summary of the overall health status shown in the report.)

**2. Key Findings (Explained)**
- **[Parameter Name]:** [Status: High/Low/Normal]
  - *Interpretation:* (Explain what this means in simple English.)

**3. Lifestyle & Dietary Recommendations**
- (Tip 1)
- (Tip 2)
- (Tip 3)

**4. When to see a Human Doctor**
(Specific symptoms or red flags that require immediate attention.)

---
*Disclaimer: I am an AI assistant. This analysis is for informational purposes and does not replace professional medical advice.*
"#;

const JSON_FORMAT: &str = r#"
### REQUIRED OUTPUT FORMAT (JSON)
Generate the JSON strictly following the schema. Cover the big picture, each key finding with its status and interpretation, three lifestyle tips, red flags that need a human doctor, and the disclaimer.
"#;

/// Optional patient details submitted with a report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientProfile {
    pub name: String,
    pub age: String,
    pub gender: String,
    pub history: String,
    pub complaints: String,
}

impl Default for PatientProfile {
    fn default() -> Self {
        Self {
            name: "Unknown".to_string(),
            age: String::new(),
            gender: "Unknown".to_string(),
            history: "None".to_string(),
            complaints: "None".to_string(),
        }
    }
}

impl PatientProfile {
    fn render(&self) -> String {
        let age = if self.age.trim().is_empty() {
            "Unknown"
        } else {
            self.age.as_str()
        };
        format!(
            "- Name: {}\n- Age: {}\n- Gender: {}\n- Medical History: {}\n- Current Complaints: {}",
            self.name, age, self.gender, self.history, self.complaints
        )
    }
}

/// Turns an extracted [`MedicalRecord`] into a patient-facing consultation.
pub struct PatientConsultant {
    client: Arc<dyn ModelClient>,
    model: String,
}

impl PatientConsultant {
    pub fn new(client: Arc<dyn ModelClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }

    pub async fn consult_markdown(
        &self,
        record: &MedicalRecord,
        profile: Option<&PatientProfile>,
    ) -> AgentResult<String> {
        let request = self
            .request(record, profile)?
            .system(format!("{CONSULTANT_ROLE}{MARKDOWN_FORMAT}"));

        let markdown = self.client.generate(request).await?;
        // Free text has no schema, so an empty reply is the only failure to catch
        if markdown.trim().is_empty() {
            return Err(AgentError::Upstream(
                "consultation model returned an empty reply".to_string(),
            ));
        }

        info!(chars = markdown.len(), "Generated Markdown consultation");
        Ok(markdown)
    }

    pub async fn consult_json(
        &self,
        record: &MedicalRecord,
        profile: Option<&PatientProfile>,
    ) -> AgentResult<ConsultationSummary> {
        let request = self
            .request(record, profile)?
            .system(format!("{CONSULTANT_ROLE}{JSON_FORMAT}"))
            .output(OutputFormat::JsonSchema {
                name: "ConsultationSummary".to_string(),
                schema: consultation_summary_schema(),
            });

        let raw = self.client.generate(request).await?;
        let summary: ConsultationSummary = validate_json(&raw)?;
        info!(findings = summary.key_findings.len(), "Generated JSON consultation");
        Ok(summary)
    }

    fn request(
        &self,
        record: &MedicalRecord,
        profile: Option<&PatientProfile>,
    ) -> AgentResult<GenerationRequest> {
        let profile_str = match profile {
            Some(profile) => profile.render(),
            None => "No specific patient profile provided. Interpret the report based on general medical standards.".to_string(),
        };
        let report_str = serde_json::to_string_pretty(record)
            .map_err(|e| AgentError::Validation(format!("record is not serializable: {e}")))?;

        let prompt = format!(
            "Please generate a consultation summary based on the following context:\n\n\
             ### PATIENT PROFILE\n{profile_str}\n\n\
             ### INPUT DATA (From Report Analyser Agent)\n{report_str}\n"
        );

        Ok(GenerationRequest::new(&self.model, vec![ContentPart::Text(prompt)]).temperature(0.4))
    }
}
