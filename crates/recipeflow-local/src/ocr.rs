//! Per-page OCR and multi-page text consolidation.
//!
//! Each page gets its own OCR-only model call at temperature 0.0 (raw text
//! out, no schema). A failed page contributes nothing; the caller decides
//! what to do when every page fails. Consolidation merges pages in index
//! order and drops near-duplicate ingredient/instruction lines — multi-page
//! photos of the same card often repeat the header area.

use recipeflow_core::{GenerateRequest, InlineImage, ModelBackend};
use std::collections::HashSet;
use tracing::warn;

use crate::image::NormalizedImage;

const OCR_PROMPT: &str = "Extract the readable text from this image of a recipe page. \
Preserve the line structure (one ingredient or step per line). \
The text may be in English or Hebrew. Return only the text.";

const PAGE_HEADER: &str = "=== MULTI-PAGE RECIPE ===";

/// Measurement tokens ignored when building a line's dedup key.
const MEASUREMENT_TOKENS: &[&str] = &[
    "cup", "cups", "tbsp", "tablespoon", "tablespoons", "tsp", "teaspoon", "teaspoons", "gram",
    "grams", "g", "kg", "ml", "l", "liter", "oz", "ounce", "ounces", "lb", "pound", "pounds",
    // Hebrew: cup(s), tablespoon(s), teaspoon, gram, kg, ml.
    "כוס", "כוסות", "כף", "כפות", "כפית", "גרם", "ק\"ג", "מ\"ל",
];

#[derive(Debug, Clone)]
pub struct PageText {
    /// 0-based original image index.
    pub page: usize,
    pub text: String,
}

/// OCR every image sequentially, in index order. Pages that fail or come
/// back empty are skipped.
pub async fn ocr_pages(model: &dyn ModelBackend, images: &[NormalizedImage]) -> Vec<PageText> {
    let mut out = Vec::new();
    for (page, img) in images.iter().enumerate() {
        let req = GenerateRequest {
            image: Some(InlineImage {
                mime_type: img.mime_type.to_string(),
                data: img.data.clone(),
            }),
            // Fixed 0.0 for determinism; OCR has one right answer.
            temperature: 0.0,
            ..GenerateRequest::text(OCR_PROMPT)
        };
        match model.generate(&req).await {
            Ok(text) if text.chars().any(|c| !c.is_whitespace()) => {
                out.push(PageText { page, text });
            }
            Ok(_) => {
                warn!(page = page + 1, "ocr returned empty text, skipping page");
            }
            Err(e) => {
                warn!(page = page + 1, error = %e, "ocr failed, skipping page");
            }
        }
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    General,
    Ingredients,
    Instructions,
}

/// Detect section headers in either language. Only line *starts* count, so
/// "mix the ingredients" doesn't flip the section mid-list.
fn section_of(line: &str) -> Option<Section> {
    let l = strip_enumeration(line).to_lowercase();
    for kw in ["ingredients", "מרכיבים", "רכיבים"] {
        if l.starts_with(kw) {
            return Some(Section::Ingredients);
        }
    }
    for kw in ["instructions", "directions", "הוראות", "אופן הכנה"] {
        if l.starts_with(kw) {
            return Some(Section::Instructions);
        }
    }
    None
}

/// Drop leading bullets, enumeration, and list punctuation.
fn strip_enumeration(line: &str) -> &str {
    line.trim_start_matches(|c: char| {
        c.is_whitespace() || c.is_ascii_digit() || matches!(c, '-' | '*' | '•' | '.' | ')' | '(')
    })
}

fn is_quantity_token(token: &str) -> bool {
    !token.is_empty()
        && token
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '/' | '.' | ',' | '-' | '½' | '¼' | '¾' | '⅓' | '⅔'))
}

/// Normalized key for near-duplicate detection: the first 4 significant
/// words of the line, after stripping bullets, quantities, and measurement
/// tokens. Empty when the line has no significant words.
fn dedup_key(line: &str) -> String {
    let stripped = strip_enumeration(line);
    stripped
        .split_whitespace()
        .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|t| !t.is_empty())
        .filter(|t| !is_quantity_token(t))
        .map(|t| t.to_lowercase())
        .filter(|t| !MEASUREMENT_TOKENS.contains(&t.as_str()))
        .take(4)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Merge OCR'd pages into one document with page markers, dropping lines
/// whose dedup key was already seen in the same logical section.
pub fn consolidate_pages(pages: &[PageText]) -> String {
    let mut ordered: Vec<&PageText> = pages.iter().collect();
    ordered.sort_by_key(|p| p.page);

    let mut out = vec![PAGE_HEADER.to_string(), String::new()];
    let mut section = Section::General;
    let mut seen_ingredients: HashSet<String> = HashSet::new();
    let mut seen_instructions: HashSet<String> = HashSet::new();

    for page in ordered {
        out.push(format!("--- PAGE {} ---", page.page + 1));
        for line in page.text.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                out.push(String::new());
                continue;
            }

            if let Some(s) = section_of(trimmed) {
                section = s;
                out.push(trimmed.to_string());
                continue;
            }

            let seen = match section {
                Section::General => None,
                Section::Ingredients => Some(&mut seen_ingredients),
                Section::Instructions => Some(&mut seen_instructions),
            };
            if let Some(seen) = seen {
                let key = dedup_key(trimmed);
                if !key.is_empty() && !seen.insert(key) {
                    continue;
                }
            }
            out.push(trimmed.to_string());
        }
        out.push(String::new());
    }

    while out.last().is_some_and(|l| l.is_empty()) {
        out.pop();
    }
    out.join("\n")
}
