//! AI-backed structured recipe extraction.
//!
//! One `StructuredExtractor` lives for the whole process and is shared
//! across requests: it owns the model handle and the extraction cache.
//! Model failures never escape — every path ends in either a validated
//! draft with an explainable confidence or a deterministic low-confidence
//! fallback the caller can detect by score.

use recipeflow_core::{
    Error, FormatHint, GenerateRequest, InlineImage, Ingredient, ModelBackend, ProcessOptions,
    RecipeDraft, Result, RetryPolicy,
};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

use crate::image::NormalizedImage;
use crate::retry::{retry_async, AttemptError};
use crate::textprep;

/// Confidence assigned when text extraction exhausts all attempts.
pub const TEXT_FALLBACK_CONFIDENCE: f64 = 0.2;
/// Confidence assigned when image extraction exhausts all attempts.
pub const IMAGE_FALLBACK_CONFIDENCE: f64 = 0.1;

/// Successful extractions never claim more than this.
pub const MAX_TEXT_CONFIDENCE: f64 = 0.98;
/// OCR is inherently less trustworthy than clean text.
pub const MAX_IMAGE_CONFIDENCE: f64 = 0.9;

/// Input cap before prompting; bounded model context.
const MAX_PROMPT_CHARS: usize = 30_000;

const TEXT_FALLBACK_NAME: &str = "Recipe Extraction Failed";
const IMAGE_FALLBACK_NAME: &str = "Image Processing Failed";
const FALLBACK_TAG: &str = "extraction-failed";

#[derive(Debug, Clone)]
pub struct Extraction {
    pub draft: RecipeDraft,
    pub confidence: f64,
    /// True when this is the post-exhaustion fallback, not a model result.
    pub degraded: bool,
    /// True when served from the extraction cache without a model call.
    pub cached: bool,
}

#[derive(Debug, Clone)]
struct CachedExtraction {
    draft: RecipeDraft,
    confidence: f64,
}

pub struct StructuredExtractor {
    model: Arc<dyn ModelBackend>,
    // Values are immutable after insertion; racing inserts for the same key
    // are fine (identical inputs produce interchangeable values).
    cache: RwLock<HashMap<String, CachedExtraction>>,
}

impl StructuredExtractor {
    pub fn new(model: Arc<dyn ModelBackend>) -> Self {
        Self {
            model,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Extract a structured recipe from text. Infallible: exhaustion turns
    /// into the fallback draft at [`TEXT_FALLBACK_CONFIDENCE`].
    pub async fn extract_text(&self, text: &str, opts: &ProcessOptions) -> Extraction {
        let cleaned = textprep::clean_recipe_text(text);
        let bounded = textprep::truncate_for_prompt(&cleaned, MAX_PROMPT_CHARS);

        let key = content_hash(bounded.as_bytes());
        if let Some(hit) = self.cache_get(opts, &key) {
            info!("extraction cache hit");
            return hit;
        }

        let prompt = build_text_prompt(&bounded, opts);
        let policy = RetryPolicy::from_options(opts, 1.0);

        let outcome = retry_async(&policy, "structured extraction", |attempt| {
            let req = GenerateRequest {
                prompt: prompt.clone(),
                image: None,
                schema: Some(draft_response_schema()),
                temperature: sampling_temperature(opts, attempt),
                top_p: opts.top_p.unwrap_or(0.8),
                top_k: opts.top_k.unwrap_or(40),
                max_tokens: opts.max_tokens.unwrap_or(2048),
            };
            async move {
                let raw = self
                    .model
                    .generate(&req)
                    .await
                    .map_err(AttemptError::Retryable)?;
                parse_draft(&raw).map_err(AttemptError::Retryable)
            }
        })
        .await;

        match outcome {
            Ok(draft) => {
                let confidence = text_confidence(&draft);
                self.cache_put(opts, key, &draft, confidence);
                Extraction {
                    draft,
                    confidence,
                    degraded: false,
                    cached: false,
                }
            }
            Err(failure) => {
                warn!(error = %failure.into_error(), "all extraction attempts failed, using fallback");
                Extraction {
                    draft: fallback_draft(&bounded, TEXT_FALLBACK_NAME),
                    confidence: TEXT_FALLBACK_CONFIDENCE,
                    degraded: true,
                    cached: false,
                }
            }
        }
    }

    /// Extract a structured recipe from a single normalized image.
    /// Confidence is the text formula scaled by the image quality score and
    /// capped at [`MAX_IMAGE_CONFIDENCE`].
    pub async fn extract_image(&self, image: &NormalizedImage, opts: &ProcessOptions) -> Extraction {
        let key = content_hash(&image.data);
        if let Some(hit) = self.cache_get(opts, &key) {
            info!("extraction cache hit for image");
            return hit;
        }

        let prompt = build_image_prompt(opts);
        let policy = RetryPolicy::from_options(opts, 2.0);

        let outcome = retry_async(&policy, "image extraction", |attempt| {
            let req = GenerateRequest {
                prompt: prompt.clone(),
                image: Some(InlineImage {
                    mime_type: image.mime_type.to_string(),
                    data: image.data.clone(),
                }),
                schema: Some(draft_response_schema()),
                temperature: sampling_temperature(opts, attempt),
                top_p: opts.top_p.unwrap_or(0.8),
                top_k: opts.top_k.unwrap_or(40),
                max_tokens: opts.max_tokens.unwrap_or(2048),
            };
            async move {
                let raw = self
                    .model
                    .generate(&req)
                    .await
                    .map_err(AttemptError::Retryable)?;
                parse_draft(&raw).map_err(AttemptError::Retryable)
            }
        })
        .await;

        match outcome {
            Ok(draft) => {
                let confidence = (text_confidence(&draft) * image.quality_score)
                    .clamp(IMAGE_FALLBACK_CONFIDENCE, MAX_IMAGE_CONFIDENCE);
                self.cache_put(opts, key, &draft, confidence);
                Extraction {
                    draft,
                    confidence,
                    degraded: false,
                    cached: false,
                }
            }
            Err(failure) => {
                warn!(error = %failure.into_error(), "all image extraction attempts failed, using fallback");
                Extraction {
                    draft: fallback_draft("", IMAGE_FALLBACK_NAME),
                    confidence: IMAGE_FALLBACK_CONFIDENCE,
                    degraded: true,
                    cached: false,
                }
            }
        }
    }

    /// The image-path fallback, exposed for the all-pages-failed case where
    /// no model call is even possible.
    pub fn image_fallback(&self) -> Extraction {
        Extraction {
            draft: fallback_draft("", IMAGE_FALLBACK_NAME),
            confidence: IMAGE_FALLBACK_CONFIDENCE,
            degraded: true,
            cached: false,
        }
    }

    fn cache_get(&self, opts: &ProcessOptions, key: &str) -> Option<Extraction> {
        if !opts.use_cache {
            return None;
        }
        let cache = self.cache.read().ok()?;
        cache.get(key).map(|hit| Extraction {
            draft: hit.draft.clone(),
            confidence: hit.confidence,
            degraded: false,
            cached: true,
        })
    }

    fn cache_put(&self, opts: &ProcessOptions, key: String, draft: &RecipeDraft, confidence: f64) {
        if !opts.use_cache {
            return;
        }
        if let Ok(mut cache) = self.cache.write() {
            cache.insert(
                key,
                CachedExtraction {
                    draft: draft.clone(),
                    confidence,
                },
            );
        }
    }
}

fn content_hash(bytes: &[u8]) -> String {
    let mut h = Sha256::new();
    h.update(bytes);
    hex::encode(h.finalize())
}

/// Temperature widens slightly on each retry unless the caller pinned it.
fn sampling_temperature(opts: &ProcessOptions, attempt: u32) -> f32 {
    opts.temperature
        .unwrap_or(0.1 + 0.05 * attempt as f32)
}

/// Pull a JSON object out of a model response that may be wrapped in
/// markdown fences or surrounded by prose.
fn repair_json(response: &str) -> String {
    let trimmed = response.trim();

    if let Some(start) = trimmed.find("```json") {
        if let Some(end) = trimmed[start + 7..].find("```") {
            return trimmed[start + 7..start + 7 + end].trim().to_string();
        }
    }
    if let Some(start) = trimmed.find("```") {
        let after = start + 3;
        let content_start = trimmed[after..]
            .find('\n')
            .map(|i| after + i + 1)
            .unwrap_or(after);
        if let Some(end) = trimmed[content_start..].find("```") {
            return trimmed[content_start..content_start + end].trim().to_string();
        }
    }

    if let Some(obj_start) = trimmed.find('{') {
        if let Some(obj_end) = trimmed.rfind('}') {
            if obj_end > obj_start {
                return trimmed[obj_start..=obj_end].to_string();
            }
        }
    }

    trimmed.to_string()
}

fn parse_draft(raw: &str) -> Result<RecipeDraft> {
    let draft: RecipeDraft = match serde_json::from_str(raw) {
        Ok(d) => d,
        Err(_) => serde_json::from_str(&repair_json(raw))
            .map_err(|e| Error::Llm(format!("model returned unparseable json: {e}")))?,
    };
    draft.validate()?;
    Ok(draft)
}

/// Confidence of a successful text extraction. Base 0.8, bumped for each
/// sign of completeness, capped at 0.98 — never fully confident in a model.
pub fn text_confidence(draft: &RecipeDraft) -> f64 {
    let mut confidence: f64 = 0.8;

    if !draft.name.trim().is_empty() && draft.name != "Untitled Recipe" {
        confidence += 0.05;
    }

    let ingredients = draft.ingredients.len();
    if ingredients >= 3 {
        confidence += 0.05;
    }
    if ingredients >= 8 {
        confidence += 0.05;
    }

    // Stages weigh more than a flat list: they imply the model actually
    // recovered structure, not just lines.
    if draft.instructions.as_ref().is_some_and(|i| i.len() >= 3) {
        confidence += 0.05;
    }
    if draft.stages.as_ref().is_some_and(|s| s.len() >= 2) {
        confidence += 0.1;
    }

    if draft.prep_time.is_some() {
        confidence += 0.03;
    }
    if draft.cook_time.is_some() {
        confidence += 0.03;
    }

    if draft.servings.is_some() {
        confidence += 0.02;
    }
    if draft.main_ingredient.as_ref().is_some_and(|m| !m.is_empty()) {
        confidence += 0.02;
    }
    if !draft.tags.is_empty() {
        confidence += 0.02;
    }

    confidence.min(MAX_TEXT_CONFIDENCE)
}

/// Best-effort recipe name from the first few lines of the input: short,
/// non-numeric lines are usually titles.
fn scrape_fallback_name(text: &str, default: &str) -> String {
    for line in text.lines().take(3) {
        let line = line.trim();
        let len = line.chars().count();
        let leading_digits = line.chars().take(10).any(|c| c.is_ascii_digit());
        if len > 3 && len < 100 && !leading_digits {
            return line.to_string();
        }
    }
    default.to_string()
}

fn fallback_draft(text: &str, default_name: &str) -> RecipeDraft {
    RecipeDraft {
        name: scrape_fallback_name(text, default_name),
        description: Some(
            "Recipe extraction failed. Please try again with cleaner input.".to_string(),
        ),
        category: None,
        difficulty: None,
        prep_time: None,
        cook_time: None,
        servings: None,
        stages: None,
        instructions: Some(vec![
            "Recipe processing failed. Please try again with simpler formatting.".to_string(),
        ]),
        ingredients: vec![Ingredient {
            item: "not specified".to_string(),
            amount: "not specified".to_string(),
            unit: None,
            stage_id: None,
        }],
        main_ingredient: None,
        tags: vec![FALLBACK_TAG.to_string()],
    }
}

/// JSON schema the model's response is constrained to. Note there is no
/// totalTime property: the total is always derived downstream.
fn draft_response_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "name": {"type": "string"},
            "description": {"type": "string", "nullable": true},
            "category": {
                "type": "string",
                "enum": ["appetizer", "main", "side", "soup", "salad", "dessert",
                         "baking", "breakfast", "beverage", "snack", "other"],
                "nullable": true
            },
            "difficulty": {
                "type": "string",
                "enum": ["easy", "medium", "hard"],
                "nullable": true
            },
            "prepTime": {"type": "integer", "nullable": true},
            "cookTime": {"type": "integer", "nullable": true},
            "servings": {"type": "integer", "nullable": true},
            "stages": {
                "type": "array",
                "nullable": true,
                "items": {
                    "type": "object",
                    "properties": {
                        "title": {"type": "string"},
                        "instructions": {"type": "array", "items": {"type": "string"}}
                    },
                    "required": ["title", "instructions"]
                }
            },
            "instructions": {"type": "array", "nullable": true, "items": {"type": "string"}},
            "ingredients": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "item": {"type": "string"},
                        "amount": {"type": "string"},
                        "unit": {"type": "string", "nullable": true},
                        "stageId": {"type": "integer", "nullable": true}
                    },
                    "required": ["item", "amount"]
                }
            },
            "mainIngredient": {"type": "string", "nullable": true},
            "tags": {"type": "array", "items": {"type": "string"}}
        },
        "required": ["name", "ingredients"]
    })
}

fn format_hint_line(hint: FormatHint) -> &'static str {
    match hint {
        FormatHint::Structured => {
            "\nPREFERENCE: Use 'stages' to organize instructions into logical cooking phases.\n"
        }
        FormatHint::Simple => {
            "\nPREFERENCE: Use a flat 'instructions' array for step-by-step directions.\n"
        }
        FormatHint::Unspecified => "",
    }
}

fn build_text_prompt(text: &str, opts: &ProcessOptions) -> String {
    let mut prompt = String::from(
        "Extract complete recipe information from the following text. Focus on accuracy and completeness.

CRITICAL RULES:
- DO NOT invent or guess missing information
- If information is not clearly stated, use null/empty values
- For missing ingredient amounts: use \"not specified\"
- For missing times: use null, do NOT estimate
- For missing servings: use null, do NOT guess
- For tags: only use terms that appear in the text or are clearly implied
- difficulty must be exactly one of: easy, medium, hard (or null)
- category must be one of the schema's allowed values (or null)
- cookTime includes any resting or cooling time the recipe mentions
- NEVER output a totalTime field; it is computed elsewhere

INGREDIENT EXTRACTION RULES:
- \"2 cups flour\" -> item: \"flour\", amount: \"2\", unit: \"cups\"
- \"1 \u{5e7}\"\u{5d2} \u{5e4}\u{5e8}\u{5d2}\u{5d9}\u{5d5}\u{5ea}\" -> item: \"\u{5e4}\u{5e8}\u{5d2}\u{5d9}\u{5d5}\u{5ea}\", amount: \"1\", unit: \"\u{5e7}\"\u{5d2}\"
- \"salt to taste\" -> item: \"salt\", amount: \"to taste\", unit: null
- Always separate the NUMBER from the UNIT into different fields

STRUCTURE DECISION:
- Use \"instructions\" (set \"stages\" to null) for straightforward recipes
- Use \"stages\" (set \"instructions\" to null) only for recipes with distinct preparation phases
- Never use both instructions and stages together

GOOD EXAMPLES:
Input: \"Boil pasta for 10 minutes\"
Output: prepTime: null, cookTime: 10

BAD EXAMPLES (DO NOT DO THIS):
Input: \"Mix ingredients and bake\"
Output: prepTime: 15, cookTime: 30 (WRONG - these were not specified!)
",
    );

    if textprep::contains_hebrew(text) {
        prompt.push_str(
            "\nHEBREW TEXT HANDLING:
- Process Hebrew ingredients and instructions accurately
- Keep original Hebrew ingredient names where appropriate
- Convert Hebrew time expressions to minutes (\u{5d3}\u{5e7}\u{5d5}\u{5ea} = minutes, \u{5e9}\u{5e2}\u{5d5}\u{5ea} = hours)
",
        );
    }

    prompt.push_str(format_hint_line(opts.format_hint));
    prompt.push_str("\nRECIPE TEXT:\n");
    prompt.push_str(text);
    prompt.push_str("\n\nExtract the recipe information as a single JSON object matching the required schema.\n");
    prompt
}

fn build_image_prompt(opts: &ProcessOptions) -> String {
    let mut prompt = String::from(
        "Analyze this image and extract complete recipe information. The image may contain a recipe card, a cookbook page, or a handwritten recipe, in English or Hebrew.

CRITICAL RULES:
- Extract ONLY information that is clearly visible in the image
- DO NOT invent or guess missing information
- If text is unclear or unreadable, use null/empty values
- For missing amounts: use \"not specified\"
- difficulty must be exactly one of: easy, medium, hard (or null)
- cookTime includes any resting or cooling time
- NEVER output a totalTime field
- If the image does not contain a recipe, return a minimal valid response

READING ORDER:
1. Recipe name/title (usually the largest text at the top)
2. Ingredient list (bullets, dashes, or numbers)
3. Instructions (numbered steps or paragraphs)
4. Times, temperatures, and servings

STRUCTURE DECISION:
- Use \"instructions\" for simple step-by-step recipes
- Use \"stages\" only when the page clearly shows distinct preparation phases
- Never use both instructions and stages together
",
    );
    prompt.push_str(format_hint_line(opts.format_hint));
    prompt.push_str("\nExtract the recipe information as a single JSON object matching the required schema.\n");
    prompt
}
