//! Gemini backend for the `ModelBackend` seam.
//!
//! Talks to the Generative Language API over plain HTTP (reqwest). The
//! pipeline only needs `generate`: text or text+image in, text out, with an
//! optional response schema for structured extraction.

use base64::Engine;
use recipeflow_core::{Error, GenerateRequest, ModelBackend, Result};
use serde::Serialize;

fn env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub fn gemini_api_key_from_env() -> Option<String> {
    env("RECIPEFLOW_GEMINI_API_KEY")
        .or_else(|| env("GEMINI_API_KEY"))
        .or_else(|| env("GOOGLE_AI_API_KEY"))
}

pub fn gemini_model_from_env() -> String {
    env("RECIPEFLOW_GEMINI_MODEL").unwrap_or_else(|| "gemini-2.0-flash".to_string())
}

pub fn gemini_timeout_ms_from_env() -> u64 {
    env("RECIPEFLOW_GEMINI_TIMEOUT_MS")
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(30_000)
        .clamp(200, 120_000)
}

fn gemini_base_url_from_env() -> String {
    env("RECIPEFLOW_GEMINI_BASE_URL")
        .unwrap_or_else(|| "https://generativelanguage.googleapis.com".to_string())
}

#[derive(Debug, Serialize)]
struct ReqPart {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Serialize)]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
struct ReqContent {
    parts: Vec<ReqPart>,
}

#[derive(Debug, Serialize)]
struct GenCfg {
    temperature: f32,
    top_p: f32,
    top_k: u32,
    max_output_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_schema: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct GeminiReq {
    contents: Vec<ReqContent>,
    generation_config: GenCfg,
}

#[derive(Debug, Clone)]
pub struct GeminiClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    timeout_ms: u64,
}

impl GeminiClient {
    pub fn from_env(client: reqwest::Client) -> Result<Self> {
        let api_key = gemini_api_key_from_env().ok_or_else(|| {
            Error::NotConfigured(
                "missing RECIPEFLOW_GEMINI_API_KEY (or GEMINI_API_KEY / GOOGLE_AI_API_KEY)"
                    .to_string(),
            )
        })?;
        Ok(Self {
            client,
            api_key,
            model: gemini_model_from_env(),
            base_url: gemini_base_url_from_env(),
            timeout_ms: gemini_timeout_ms_from_env(),
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{base}/v1beta/models/{model}:generateContent?key={key}",
            base = self.base_url.trim_end_matches('/'),
            model = self.model,
            key = self.api_key
        )
    }
}

#[async_trait::async_trait]
impl ModelBackend for GeminiClient {
    async fn generate(&self, req: &GenerateRequest) -> Result<String> {
        let mut parts = vec![ReqPart {
            text: Some(req.prompt.clone()),
            inline_data: None,
        }];
        if let Some(image) = &req.image {
            parts.push(ReqPart {
                text: None,
                inline_data: Some(InlineData {
                    mime_type: image.mime_type.clone(),
                    data: base64::engine::general_purpose::STANDARD.encode(&image.data),
                }),
            });
        }

        let body = GeminiReq {
            contents: vec![ReqContent { parts }],
            generation_config: GenCfg {
                temperature: req.temperature,
                top_p: req.top_p,
                top_k: req.top_k,
                max_output_tokens: req.max_tokens,
                response_mime_type: req
                    .schema
                    .is_some()
                    .then(|| "application/json".to_string()),
                response_schema: req.schema.clone(),
            },
        };

        let resp = self
            .client
            .post(self.endpoint())
            .timeout(std::time::Duration::from_millis(self.timeout_ms))
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Llm(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Llm(format!("gemini HTTP {status}")));
        }

        let v: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| Error::Llm(format!("gemini bad json: {e}")))?;

        // candidates[0].content.parts[*].text
        let mut out = String::new();
        if let Some(parts) = v
            .get("candidates")
            .and_then(|c| c.as_array())
            .and_then(|c| c.first())
            .and_then(|c0| c0.get("content"))
            .and_then(|c| c.get("parts"))
            .and_then(|p| p.as_array())
        {
            for p in parts {
                if let Some(t) = p.get("text").and_then(|t| t.as_str()) {
                    if !out.is_empty() {
                        out.push('\n');
                    }
                    out.push_str(t);
                }
            }
        }

        if out.chars().any(|c| !c.is_whitespace()) {
            Ok(out)
        } else {
            Err(Error::Llm("gemini returned empty output".to_string()))
        }
    }
}
