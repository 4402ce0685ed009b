use anyhow::{bail, Context, Result};
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use serde_json::{json, Map, Value};

use super::{
    non_empty_env, truncate_text, ProviderRequest, ProviderResponse, RequestPart, TextProvider,
};

const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

pub struct GeminiProvider {
    api_base: String,
    http: HttpClient,
}

impl Default for GeminiProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl GeminiProvider {
    pub fn new() -> Self {
        Self::with_api_base(
            non_empty_env("GEMINI_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
        )
    }

    pub fn with_api_base(api_base: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into().trim().trim_end_matches('/').to_string(),
            http: HttpClient::new(),
        }
    }

    fn api_key() -> Option<String> {
        non_empty_env("GEMINI_API_KEY").or_else(|| non_empty_env("GOOGLE_API_KEY"))
    }

    fn endpoint_for_model(&self, model: &str) -> String {
        let trimmed = model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:generateContent", self.api_base, model_path)
    }

    fn build_payload(request: &ProviderRequest) -> Value {
        let parts = request
            .parts
            .iter()
            .map(|part| match part {
                RequestPart::Text(text) => json!({ "text": text }),
                RequestPart::Image(image) => image.to_part(),
            })
            .collect::<Vec<_>>();

        let mut payload = Map::new();
        payload.insert(
            "contents".to_string(),
            json!([{ "role": "user", "parts": parts }]),
        );
        if let Some(instruction) = request
            .system_instruction
            .as_deref()
            .filter(|text| !text.trim().is_empty())
        {
            payload.insert(
                "systemInstruction".to_string(),
                json!({ "parts": [{ "text": instruction }] }),
            );
        }

        let mut generation_config = Map::new();
        if let Some(temperature) = request.temperature {
            generation_config.insert("temperature".to_string(), json!(temperature));
        }
        // JSON mode cannot be combined with tools.
        if request.tools.is_empty() {
            generation_config.insert(
                "responseMimeType".to_string(),
                Value::String("application/json".to_string()),
            );
        } else {
            payload.insert("tools".to_string(), Value::Array(request.tools.clone()));
        }
        payload.insert(
            "generationConfig".to_string(),
            Value::Object(generation_config),
        );
        Value::Object(payload)
    }

    fn extract_text(response_payload: &Value) -> Result<String> {
        let candidate = response_payload
            .get("candidates")
            .and_then(Value::as_array)
            .and_then(|rows| rows.first());
        let Some(candidate) = candidate else {
            let reason = response_payload
                .pointer("/promptFeedback/blockReason")
                .and_then(Value::as_str)
                .unwrap_or("no candidates");
            bail!("Gemini returned no candidates ({reason})");
        };
        let text = candidate
            .pointer("/content/parts")
            .and_then(Value::as_array)
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|part| part.get("text").and_then(Value::as_str))
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();
        if text.trim().is_empty() {
            let reason = candidate
                .get("finishReason")
                .and_then(Value::as_str)
                .unwrap_or("unknown");
            bail!("Gemini returned no text (finish reason {reason})");
        }
        Ok(text)
    }
}

impl TextProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    fn generate(&self, request: &ProviderRequest) -> Result<ProviderResponse> {
        let Some(api_key) = Self::api_key() else {
            bail!("GEMINI_API_KEY or GOOGLE_API_KEY not set");
        };
        let endpoint = self.endpoint_for_model(&request.model);
        let payload = Self::build_payload(request);

        let response = self
            .http
            .post(&endpoint)
            .query(&[("key", api_key.as_str())])
            .timeout(request.timeout)
            .json(&payload)
            .send()
            .with_context(|| format!("Gemini request failed ({endpoint})"))?;
        let response_payload = response_json_or_error("Gemini", response)?;
        let text = Self::extract_text(&response_payload)?;

        let mut provider_response = Map::new();
        provider_response.insert("endpoint".to_string(), Value::String(endpoint));
        provider_response.insert(
            "usage_metadata".to_string(),
            response_payload
                .get("usageMetadata")
                .cloned()
                .unwrap_or(Value::Null),
        );
        provider_response.insert(
            "model_version".to_string(),
            response_payload
                .get("modelVersion")
                .cloned()
                .unwrap_or(Value::Null),
        );
        Ok(ProviderResponse {
            text,
            provider_response,
            warnings: Vec::new(),
        })
    }
}

fn response_json_or_error(provider: &str, response: HttpResponse) -> Result<Value> {
    let status = response.status();
    let code = status.as_u16();
    let body = response
        .text()
        .with_context(|| format!("{provider} response body read failed"))?;
    if !status.is_success() {
        bail!(
            "{provider} request failed ({code}): {}",
            truncate_text(&body, 512)
        );
    }
    let parsed: Value = serde_json::from_str(&body)
        .with_context(|| format!("{provider} returned invalid JSON payload"))?;
    Ok(parsed)
}
