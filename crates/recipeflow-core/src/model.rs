//! The seam to the external AI model.
//!
//! The pipeline treats the model as a text-in/text-out box: OCR calls send an
//! image and get raw text back; structured extraction additionally pins a
//! JSON response schema. All provider failures surface as `Error::Llm` and
//! are handled identically upstream (retry, then fallback).

use crate::Result;

#[derive(Debug, Clone)]
pub struct InlineImage {
    pub mime_type: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub prompt: String,
    pub image: Option<InlineImage>,
    /// When set, the backend must request schema-constrained JSON output.
    pub schema: Option<serde_json::Value>,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub max_tokens: u32,
}

impl GenerateRequest {
    /// A text-only request with the pipeline's default sampling knobs.
    pub fn text(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            image: None,
            schema: None,
            temperature: 0.1,
            top_p: 0.8,
            top_k: 40,
            max_tokens: 2048,
        }
    }
}

#[async_trait::async_trait]
pub trait ModelBackend: Send + Sync {
    async fn generate(&self, req: &GenerateRequest) -> Result<String>;
}
