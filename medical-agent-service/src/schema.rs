//! Output contracts for each agent, plus the JSON Schemas sent to the model.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeMap;

use crate::error::{AgentError, AgentResult};
use crate::llm::strip_code_fences;

pub const DEFAULT_DISCLAIMER: &str = "I am an AI assistant. This analysis is for informational purposes and does not replace professional medical advice.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocType {
    Diagnostic,
    Clinical,
    Procedural,
    Administrative,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabResult {
    pub item: String,
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub flag: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticContent {
    #[serde(default)]
    pub test_name: Option<String>,
    #[serde(default)]
    pub collection_date: Option<String>,
    #[serde(default)]
    pub results: Vec<LabResult>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClinicalContent {
    #[serde(default)]
    pub encounter_type: Option<String>,
    #[serde(default)]
    pub diagnosis_list: Vec<String>,
    #[serde(default)]
    pub chief_complaint: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProceduralContent {
    #[serde(default)]
    pub procedure_name: Option<String>,
    #[serde(default)]
    pub surgeon: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdministrativeContent {
    #[serde(default)]
    pub document_intent: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentSection {
    #[serde(default)]
    pub diagnostic: Option<DiagnosticContent>,
    #[serde(default)]
    pub clinical: Option<ClinicalContent>,
    #[serde(default)]
    pub procedural: Option<ProceduralContent>,
    #[serde(default)]
    pub administrative: Option<AdministrativeContent>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatientInfo {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub dob: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderInfo {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub facility: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaData {
    pub doc_type: DocType,
    pub confidence: f64,
    #[serde(default = "today")]
    pub processed_date: String,
}

fn today() -> String {
    chrono::Local::now().date_naive().to_string()
}

/// Classified and extracted medical document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedicalRecord {
    pub meta: MetaData,
    #[serde(default)]
    pub patient: PatientInfo,
    #[serde(default)]
    pub provider: ProviderInfo,
    pub content: ContentSection,
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyFinding {
    pub parameter_name: String,
    pub status: String,
    pub interpretation: String,
    #[serde(default)]
    pub image_tag: Option<String>,
}

/// Patient-facing consultation built from a [`MedicalRecord`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsultationSummary {
    pub overall_summary: String,
    #[serde(default)]
    pub key_findings: Vec<KeyFinding>,
    pub lifestyle_recommendations: Vec<String>,
    pub when_to_see_doctor: Vec<String>,
    #[serde(default = "default_disclaimer")]
    pub disclaimer: String,
}

fn default_disclaimer() -> String {
    DEFAULT_DISCLAIMER.to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymptomAnalysis {
    pub disclaimer_and_urgency: String,
    pub current_condition_analysis: String,
    pub possible_medical_problems: Vec<String>,
    pub immediate_actions: Vec<String>,
    pub recommended_specialist: String,
    pub final_statement: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Medicine {
    pub name: String,
    pub form: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrescriptionExtraction {
    pub medicines: Vec<Medicine>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedicineExplanation {
    pub purpose: String,
    pub side_effects: String,
    pub interactions: String,
}

pub type MedicineExplanations = BTreeMap<String, MedicineExplanation>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrescriptionAnalysis {
    pub raw_extraction: PrescriptionExtraction,
    pub analysis: MedicineExplanations,
}

/// Parses a model reply into `T`.
///
/// An object carrying an `"error"` key is the model reporting its own failure
/// and is surfaced as an upstream error rather than a schema mismatch.
pub fn validate_json<T: DeserializeOwned>(raw: &str) -> AgentResult<T> {
    let cleaned = strip_code_fences(raw);
    let value: Value = serde_json::from_str(cleaned).map_err(|e| {
        let preview: String = cleaned.chars().take(100).collect();
        AgentError::Validation(format!("model returned malformed JSON: {e}. Raw: {preview}"))
    })?;

    if let Some(message) = value.get("error") {
        return Err(AgentError::Upstream(match message {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }));
    }

    serde_json::from_value(value).map_err(|e| AgentError::Validation(e.to_string()))
}

fn nullable(kind: &str) -> Value {
    json!({ "type": [kind, "null"] })
}

fn string_list() -> Value {
    json!({ "type": "array", "items": { "type": "string" } })
}

pub fn medical_record_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "meta": {
                "type": "object",
                "properties": {
                    "doc_type": {
                        "type": "string",
                        "enum": ["Diagnostic", "Clinical", "Procedural", "Administrative"]
                    },
                    "confidence": { "type": "number", "description": "Confidence 0-1" },
                    "processed_date": { "type": "string", "description": "ISO date" }
                },
                "required": ["doc_type", "confidence"]
            },
            "patient": {
                "type": "object",
                "properties": {
                    "name": nullable("string"),
                    "id": nullable("string"),
                    "dob": nullable("string")
                }
            },
            "provider": {
                "type": "object",
                "properties": {
                    "name": nullable("string"),
                    "facility": nullable("string")
                }
            },
            "content": {
                "type": "object",
                "properties": {
                    "diagnostic": {
                        "type": ["object", "null"],
                        "properties": {
                            "test_name": nullable("string"),
                            "collection_date": nullable("string"),
                            "results": {
                                "type": "array",
                                "items": {
                                    "type": "object",
                                    "properties": {
                                        "item": { "type": "string" },
                                        "value": nullable("number"),
                                        "unit": nullable("string"),
                                        "flag": { "type": ["string", "null"], "description": "High/Low/Normal" }
                                    },
                                    "required": ["item"]
                                }
                            }
                        }
                    },
                    "clinical": {
                        "type": ["object", "null"],
                        "properties": {
                            "encounter_type": nullable("string"),
                            "diagnosis_list": string_list(),
                            "chief_complaint": nullable("string")
                        }
                    },
                    "procedural": {
                        "type": ["object", "null"],
                        "properties": {
                            "procedure_name": nullable("string"),
                            "surgeon": nullable("string")
                        }
                    },
                    "administrative": {
                        "type": ["object", "null"],
                        "properties": {
                            "document_intent": nullable("string")
                        }
                    }
                }
            },
            "summary": { "type": "string" }
        },
        "required": ["meta", "content", "summary"]
    })
}

pub fn consultation_summary_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "overall_summary": {
                "type": "string",
                "description": "A 2-sentence summary of the overall health status."
            },
            "key_findings": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "parameter_name": { "type": "string" },
                        "status": { "type": "string", "description": "High, Low, or Normal" },
                        "interpretation": {
                            "type": "string",
                            "description": "Simple English explanation of the finding."
                        },
                        "image_tag": nullable("string")
                    },
                    "required": ["parameter_name", "status", "interpretation"]
                }
            },
            "lifestyle_recommendations": {
                "type": "array",
                "items": { "type": "string" },
                "description": "Three specific lifestyle or dietary tips."
            },
            "when_to_see_doctor": {
                "type": "array",
                "items": { "type": "string" },
                "description": "Specific symptoms or red flags requiring attention."
            },
            "disclaimer": { "type": "string" }
        },
        "required": ["overall_summary", "lifestyle_recommendations", "when_to_see_doctor"]
    })
}

pub fn symptom_analysis_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "disclaimer_and_urgency": {
                "type": "string",
                "description": "A clear, mandatory disclaimer that this is not a diagnosis, including advice on when to seek immediate emergency care."
            },
            "current_condition_analysis": {
                "type": "string",
                "description": "What the user might be currently experiencing, in simple terms."
            },
            "possible_medical_problems": {
                "type": "array",
                "items": { "type": "string" },
                "description": "3-5 of the most common and likely conditions associated with the symptoms."
            },
            "immediate_actions": {
                "type": "array",
                "items": { "type": "string" },
                "description": "2 immediate actions the user can take."
            },
            "recommended_specialist": {
                "type": "string",
                "description": "The most appropriate specialist or hospital department to visit."
            },
            "final_statement": {
                "type": "string",
                "description": "Must be the exact phrase: 'Connect the doctor/hospital near your location.'"
            }
        },
        "required": [
            "disclaimer_and_urgency",
            "current_condition_analysis",
            "possible_medical_problems",
            "immediate_actions",
            "recommended_specialist",
            "final_statement"
        ]
    })
}
