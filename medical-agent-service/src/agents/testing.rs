use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::error::UpstreamError;
use crate::llm::{GenerationRequest, ModelClient};

/// Replays canned replies in order and records every request it sees.
#[derive(Default)]
pub struct ScriptedModel {
    replies: Mutex<VecDeque<Result<String, UpstreamError>>>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, text: &str) -> Self {
        self.replies.lock().unwrap().push_back(Ok(text.to_string()));
        self
    }

    pub fn fail(self, error: UpstreamError) -> Self {
        self.replies.lock().unwrap().push_back(Err(error));
        self
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    async fn generate(&self, request: GenerationRequest) -> Result<String, UpstreamError> {
        self.requests.lock().unwrap().push(request);
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(UpstreamError::MalformedResponse("no scripted reply".into())))
    }
}

pub const RECORD_JSON: &str = r#"{
    "meta": { "doc_type": "Diagnostic", "confidence": 0.9, "processed_date": "2026-10-18" },
    "patient": { "name": "Jane Roe" },
    "content": {
        "diagnostic": {
            "test_name": "Lipid panel",
            "results": [{ "item": "LDL", "value": 172.0, "unit": "mg/dL", "flag": "High" }]
        }
    },
    "summary": "Elevated LDL cholesterol."
}"#;

pub const CONSULTATION_JSON: &str = r#"{
    "overall_summary": "Your cholesterol is high. Everything else looks normal.",
    "key_findings": [
        { "parameter_name": "LDL", "status": "High", "interpretation": "Too much bad cholesterol." }
    ],
    "lifestyle_recommendations": ["Eat more fibre", "Walk daily", "Limit fried food"],
    "when_to_see_doctor": ["Chest pain"]
}"#;

pub const CONSULTATION_MARKDOWN: &str = "## Dr. AI Summary\n\n**1. The Big Picture**\nYour LDL is high.";

pub const SYMPTOM_JSON: &str = r#"{
    "disclaimer_and_urgency": "This is not a diagnosis. Seek emergency care for chest pain.",
    "current_condition_analysis": "Likely a viral upper respiratory infection.",
    "possible_medical_problems": ["Common cold", "Influenza", "Sinusitis"],
    "immediate_actions": ["Rest", "Stay hydrated"],
    "recommended_specialist": "General Practitioner (GP)",
    "final_statement": "Connect the doctor/hospital near your location."
}"#;

pub const MEDICINES_JSON: &str =
    r#"{"medicines": [{"name": "Amoxicillin", "form": "Capsules"}, {"name": "Ibuprofen", "form": "Tablets"}]}"#;

pub const EXPLANATIONS_JSON: &str = r#"{
    "Amoxicillin": { "purpose": "Bacterial infections", "side_effects": "Nausea, rash", "interactions": "Methotrexate" },
    "Ibuprofen": { "purpose": "Pain and inflammation", "side_effects": "Stomach upset", "interactions": "Warfarin" }
}"#;
