use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use reqwest::Client;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, error, info};

use crate::error::UpstreamError;
use crate::loader::{DocumentPayload, PDF_MEDIA_TYPE};

/// One piece of user content sent to the model.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentPart {
    Text(String),
    Binary {
        bytes: Vec<u8>,
        media_type: String,
        filename: Option<String>,
    },
}

impl From<DocumentPayload> for ContentPart {
    fn from(payload: DocumentPayload) -> Self {
        match payload {
            DocumentPayload::Text(text) => ContentPart::Text(text),
            DocumentPayload::Binary { bytes, media_type } => ContentPart::Binary {
                bytes,
                media_type: media_type.to_string(),
                filename: (media_type == PDF_MEDIA_TYPE).then(|| "document.pdf".to_string()),
            },
        }
    }
}

/// Shape the model is asked to reply in.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputFormat {
    Text,
    Json,
    JsonSchema { name: String, schema: Value },
}

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub model: String,
    pub system_instruction: Option<String>,
    pub parts: Vec<ContentPart>,
    pub output: OutputFormat,
    pub temperature: f32,
}

impl GenerationRequest {
    pub fn new(model: impl Into<String>, parts: Vec<ContentPart>) -> Self {
        Self {
            model: model.into(),
            system_instruction: None,
            parts,
            output: OutputFormat::Text,
            temperature: 0.2,
        }
    }

    pub fn system(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = Some(instruction.into());
        self
    }

    pub fn output(mut self, output: OutputFormat) -> Self {
        self.output = output;
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// A generative model reachable over the network.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Returns the raw text of the first completion.
    async fn generate(&self, request: GenerationRequest) -> Result<String, UpstreamError>;
}

/// OpenAI-compatible chat-completions client for OpenRouter.
pub struct OpenRouterClient {
    http: Client,
    api_key: String,
    base_url: String,
    timeout: Duration,
}

impl OpenRouterClient {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, UpstreamError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait]
impl ModelClient for OpenRouterClient {
    async fn generate(&self, request: GenerationRequest) -> Result<String, UpstreamError> {
        let model = request.model.clone();
        let payload = build_payload(&request);
        debug!(model = %model, parts = request.parts.len(), "Calling model API");

        let response = self
            .http
            .post(self.endpoint())
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(model = %model, status = status.as_u16(), "Model API request failed");
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let response_json: Value = response.json().await.map_err(|e| self.map_send_error(e))?;
        let content = extract_content(&response_json)?;

        info!(model = %model, chars = content.len(), "Model API call completed");
        Ok(content)
    }
}

impl OpenRouterClient {
    fn map_send_error(&self, e: reqwest::Error) -> UpstreamError {
        if e.is_timeout() {
            UpstreamError::Timeout {
                secs: self.timeout.as_secs(),
            }
        } else {
            UpstreamError::Request(e)
        }
    }
}

/// Builds the chat-completions request body.
pub fn build_payload(request: &GenerationRequest) -> Value {
    let mut messages = Vec::new();
    if let Some(system) = &request.system_instruction {
        messages.push(json!({ "role": "system", "content": system }));
    }

    let content: Vec<Value> = request.parts.iter().map(content_part_json).collect();
    messages.push(json!({ "role": "user", "content": content }));

    let mut payload = json!({
        "model": request.model,
        "messages": messages,
        "temperature": request.temperature,
    });

    match &request.output {
        OutputFormat::Text => {}
        OutputFormat::Json => {
            payload["response_format"] = json!({ "type": "json_object" });
        }
        // Strict mode demands every property be required; the record schemas keep optional fields.
        OutputFormat::JsonSchema { name, schema } => {
            payload["response_format"] = json!({
                "type": "json_schema",
                "json_schema": {
                    "name": name,
                    "strict": false,
                    "schema": schema,
                }
            });
        }
    }

    payload
}

fn content_part_json(part: &ContentPart) -> Value {
    match part {
        ContentPart::Text(text) => json!({ "type": "text", "text": text }),
        ContentPart::Binary {
            bytes,
            media_type,
            filename,
        } => {
            let data_url = format!("data:{};base64,{}", media_type, STANDARD.encode(bytes));
            if media_type.starts_with("image/") {
                json!({ "type": "image_url", "image_url": { "url": data_url } })
            } else {
                json!({
                    "type": "file",
                    "file": {
                        "filename": filename.as_deref().unwrap_or("document"),
                        "file_data": data_url,
                    }
                })
            }
        }
    }
}

fn extract_content(response_json: &Value) -> Result<String, UpstreamError> {
    response_json["choices"][0]["message"]["content"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| {
            UpstreamError::MalformedResponse(
                "missing choices[0].message.content".to_string(),
            )
        })
}

/// Removes a Markdown code fence wrapped around a reply, if present.
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
