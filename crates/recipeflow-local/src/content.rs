//! Multi-strategy recipe content extraction from HTML.
//!
//! Strategies run in a fixed priority order and the first hit wins, even if
//! a later strategy would also have succeeded:
//!
//! 1. JSON-LD structured data (confidence 0.95)
//! 2. Microdata `itemtype` markup (0.85)
//! 3. Heuristic CSS selectors + likelihood scoring (0.75)
//! 4. Whole-page visible text (0.5)
//!
//! Every strategy's output goes through the same cleaning pass before it is
//! returned, so downstream prompting sees uniform text.

use std::io::Cursor;
use tracing::info;

use crate::textprep;

pub const CONFIDENCE_JSON_LD: f64 = 0.95;
pub const CONFIDENCE_MICRODATA: f64 = 0.85;
pub const CONFIDENCE_SELECTORS: f64 = 0.75;
pub const CONFIDENCE_FULL_TEXT: f64 = 0.5;

/// Candidate blocks commonly hosting recipe bodies.
const RECIPE_SELECTORS: &[&str] = &[
    ".recipe-content",
    ".recipe-card",
    ".recipe-details",
    ".entry-content",
    ".post-content",
    "[class*=\"recipe\"]",
    ".instructions",
    ".ingredients",
];

/// Recipe nouns weighted x2 by the likelihood heuristic.
const RECIPE_KEYWORDS: &[&str] = &[
    "ingredients",
    "instructions",
    "directions",
    "recipe",
    "cooking",
    "bake",
    "cook",
    "preparation",
    "prep time",
    "cook time",
    "servings",
    "serves",
    "yield",
    "minutes",
    "hours",
    // Hebrew: ingredients, instructions, recipe, cooking, preparation.
    "מרכיבים",
    "הוראות",
    "מתכון",
    "בישול",
    "הכנה",
];

/// Cooking verbs weighted x1.
const COOKING_VERBS: &[&str] = &[
    "mix", "stir", "add", "combine", "heat", "boil", "simmer", "chop", "slice", "dice", "pour",
    "serve", "season",
    // Hebrew: mix, add, heat, cook, cut.
    "לערבב", "להוסיף", "לחמם", "לבשל", "לחתוך",
];

/// Minimum likelihood score a selector candidate must clear.
const SELECTOR_SCORE_THRESHOLD: i64 = 10;

#[derive(Debug, Clone)]
pub struct ExtractedContent {
    pub content: String,
    pub extraction_method: &'static str,
    pub confidence: f64,
}

/// Extract the best recipe text the page offers.
pub fn extract_content(html: &str, source_url: &str) -> ExtractedContent {
    let doc = html_scraper::Html::parse_document(html);

    if let Some(content) = extract_json_ld(&doc) {
        info!(url = source_url, "extracted recipe from JSON-LD");
        return ExtractedContent {
            content: textprep::clean_recipe_text(&content),
            extraction_method: "json-ld",
            confidence: CONFIDENCE_JSON_LD,
        };
    }

    if let Some(content) = extract_microdata(&doc) {
        info!(url = source_url, "extracted recipe from microdata");
        return ExtractedContent {
            content: textprep::clean_recipe_text(&content),
            extraction_method: "microdata",
            confidence: CONFIDENCE_MICRODATA,
        };
    }

    if let Some(content) = extract_by_selectors(&doc) {
        info!(url = source_url, "extracted recipe via css selectors");
        return ExtractedContent {
            content: textprep::clean_recipe_text(&content),
            extraction_method: "css-selectors",
            confidence: CONFIDENCE_SELECTORS,
        };
    }

    info!(url = source_url, "falling back to full-text extraction");
    ExtractedContent {
        content: textprep::clean_recipe_text(&extract_full_text(html)),
        extraction_method: "full-text",
        confidence: CONFIDENCE_FULL_TEXT,
    }
}

/// Parse an ISO-8601-style duration ("PT1H30M") into minutes. Seconds-only
/// durations collapse to nothing: a zero-minute time is never displayed, so
/// it is reported as absent.
pub fn parse_iso_duration_minutes(s: &str) -> Option<u32> {
    let idx = s.find("PT")?;
    let tail = &s[idx + 2..];
    let mut minutes = 0u32;
    let mut digits = String::new();
    for ch in tail.chars() {
        if ch.is_ascii_digit() {
            digits.push(ch);
            continue;
        }
        match ch {
            'H' => {
                minutes = minutes.saturating_add(digits.parse::<u32>().ok()?.saturating_mul(60));
                digits.clear();
            }
            'M' => {
                minutes = minutes.saturating_add(digits.parse::<u32>().ok()?);
                break;
            }
            _ => break,
        }
    }
    (minutes > 0).then_some(minutes)
}

fn type_includes_recipe(v: &serde_json::Value) -> bool {
    match v.get("@type") {
        Some(serde_json::Value::String(s)) => s.contains("Recipe"),
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .any(|t| t.as_str().is_some_and(|s| s.contains("Recipe"))),
        _ => false,
    }
}

fn scalar_to_string(v: &serde_json::Value) -> Option<String> {
    match v {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Array(items) => items.first().and_then(scalar_to_string),
        _ => None,
    }
}

fn extract_json_ld(doc: &html_scraper::Html) -> Option<String> {
    let sel = html_scraper::Selector::parse("script[type=\"application/ld+json\"]").ok()?;
    for script in doc.select(&sel) {
        let raw = script.text().collect::<String>();
        let Ok(data) = serde_json::from_str::<serde_json::Value>(&raw) else {
            continue;
        };

        let candidates: Vec<&serde_json::Value> = match &data {
            serde_json::Value::Array(items) => items.iter().collect(),
            other => vec![other],
        };
        for candidate in candidates {
            if type_includes_recipe(candidate) {
                return Some(format_recipe_object(candidate));
            }
            // One level of @graph nesting.
            if let Some(graph) = candidate.get("@graph").and_then(|g| g.as_array()) {
                if let Some(recipe) = graph.iter().find(|item| type_includes_recipe(item)) {
                    return Some(format_recipe_object(recipe));
                }
            }
        }
    }
    None
}

/// Format a machine-readable recipe object into the deterministic labeled
/// text block every downstream prompt consumes.
fn format_recipe_object(data: &serde_json::Value) -> String {
    let mut lines: Vec<String> = Vec::new();

    if let Some(name) = data.get("name").and_then(scalar_to_string) {
        lines.push(format!("Recipe: {name}"));
        lines.push(String::new());
    }

    if let Some(desc) = data.get("description").and_then(scalar_to_string) {
        lines.push(format!("Description: {desc}"));
        lines.push(String::new());
    }

    let prep = data
        .get("prepTime")
        .and_then(|v| v.as_str())
        .and_then(parse_iso_duration_minutes);
    let cook = data
        .get("cookTime")
        .and_then(|v| v.as_str())
        .and_then(parse_iso_duration_minutes);
    let total = data
        .get("totalTime")
        .and_then(|v| v.as_str())
        .and_then(parse_iso_duration_minutes);
    if prep.is_some() || cook.is_some() || total.is_some() {
        lines.push("Times:".to_string());
        if let Some(m) = prep {
            lines.push(format!("- Prep time: {m} minutes"));
        }
        if let Some(m) = cook {
            lines.push(format!("- Cook time: {m} minutes"));
        }
        if let Some(m) = total {
            lines.push(format!("- Total time: {m} minutes"));
        }
        lines.push(String::new());
    }

    if let Some(servings) = data
        .get("recipeYield")
        .or_else(|| data.get("yield"))
        .and_then(scalar_to_string)
    {
        lines.push(format!("Servings: {servings}"));
        lines.push(String::new());
    }

    if let Some(ingredients) = data.get("recipeIngredient").and_then(|v| v.as_array()) {
        if !ingredients.is_empty() {
            lines.push("Ingredients:".to_string());
            for ing in ingredients {
                if let Some(s) = scalar_to_string(ing) {
                    lines.push(format!("- {s}"));
                }
            }
            lines.push(String::new());
        }
    }

    if let Some(instructions) = data.get("recipeInstructions").and_then(|v| v.as_array()) {
        if !instructions.is_empty() {
            lines.push("Instructions:".to_string());
            for (i, step) in instructions.iter().enumerate() {
                let text = match step {
                    serde_json::Value::Object(obj) => {
                        obj.get("text").and_then(|t| t.as_str()).map(str::to_string)
                    }
                    other => scalar_to_string(other),
                };
                if let Some(text) = text {
                    lines.push(format!("{}. {text}", i + 1));
                }
            }
            lines.push(String::new());
        }
    }

    let category = data.get("recipeCategory").and_then(scalar_to_string);
    let cuisine = data.get("recipeCuisine").and_then(scalar_to_string);
    let keywords = data.get("keywords").and_then(|v| match v {
        serde_json::Value::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(scalar_to_string).collect();
            (!parts.is_empty()).then(|| parts.join(", "))
        }
        other => scalar_to_string(other),
    });
    if category.is_some() || cuisine.is_some() || keywords.is_some() {
        lines.push("Additional Info:".to_string());
        if let Some(c) = category {
            lines.push(format!("- Category: {c}"));
        }
        if let Some(c) = cuisine {
            lines.push(format!("- Cuisine: {c}"));
        }
        if let Some(k) = keywords {
            lines.push(format!("- Keywords: {k}"));
        }
    }

    lines.join("\n")
}

fn element_text(el: &html_scraper::ElementRef) -> String {
    el.text().collect::<Vec<_>>().join(" ").trim().to_string()
}

fn extract_microdata(doc: &html_scraper::Html) -> Option<String> {
    let recipe_sel = html_scraper::Selector::parse("[itemtype*=\"Recipe\"]").ok()?;
    let recipe_el = doc.select(&recipe_sel).next()?;

    let mut lines: Vec<String> = Vec::new();

    let name_sel = html_scraper::Selector::parse("[itemprop=\"name\"]").ok()?;
    if let Some(el) = recipe_el.select(&name_sel).next() {
        lines.push(format!("Recipe: {}", element_text(&el)));
        lines.push(String::new());
    }

    let desc_sel = html_scraper::Selector::parse("[itemprop=\"description\"]").ok()?;
    if let Some(el) = recipe_el.select(&desc_sel).next() {
        lines.push(format!("Description: {}", element_text(&el)));
        lines.push(String::new());
    }

    let ing_sel = html_scraper::Selector::parse("[itemprop=\"recipeIngredient\"]").ok()?;
    let ingredients: Vec<String> = recipe_el
        .select(&ing_sel)
        .map(|el| element_text(&el))
        .filter(|t| !t.is_empty())
        .collect();
    if !ingredients.is_empty() {
        lines.push("Ingredients:".to_string());
        for ing in &ingredients {
            lines.push(format!("- {ing}"));
        }
        lines.push(String::new());
    }

    let step_sel = html_scraper::Selector::parse("[itemprop=\"recipeInstructions\"]").ok()?;
    let steps: Vec<String> = recipe_el
        .select(&step_sel)
        .map(|el| element_text(&el))
        .filter(|t| !t.is_empty())
        .collect();
    if !steps.is_empty() {
        lines.push("Instructions:".to_string());
        for (i, step) in steps.iter().enumerate() {
            lines.push(format!("{}. {step}", i + 1));
        }
        lines.push(String::new());
    }

    (!lines.is_empty()).then(|| lines.join("\n"))
}

/// Score text by recipe likelihood: keyword hits x2 plus verb hits x1, with
/// a 0.5x penalty under 100 chars and 0.8x over 10,000 chars.
pub fn score_recipe_text(text: &str) -> i64 {
    if text.is_empty() {
        return 0;
    }
    let lower = text.to_lowercase();
    let mut score = 0i64;
    for kw in RECIPE_KEYWORDS {
        score += 2 * lower.matches(kw).count() as i64;
    }
    for verb in COOKING_VERBS {
        score += lower.matches(verb).count() as i64;
    }

    let len = text.chars().count();
    let scaled = if len < 100 {
        score as f64 * 0.5
    } else if len > 10_000 {
        score as f64 * 0.8
    } else {
        score as f64
    };
    scaled as i64
}

fn extract_by_selectors(doc: &html_scraper::Html) -> Option<String> {
    let mut best_score = 0i64;
    let mut best_text: Option<String> = None;

    for selector in RECIPE_SELECTORS {
        let Ok(sel) = html_scraper::Selector::parse(selector) else {
            continue;
        };
        for el in doc.select(&sel) {
            let text = element_text(&el);
            let score = score_recipe_text(&text);
            if score > best_score {
                best_score = score;
                best_text = Some(text);
            }
        }
    }

    (best_score > SELECTOR_SCORE_THRESHOLD).then(|| best_text.unwrap_or_default())
}

/// Minimal, best-effort stripper for `<tag ...> ... </tag>` blocks.
/// Conservative on purpose: only removes when a close tag is found, and is
/// ASCII-case-insensitive on tag names.
fn strip_tag_blocks(html: &str, tag: &str) -> String {
    let tag_lc = tag.to_ascii_lowercase();
    let open_pat = format!("<{tag_lc}");
    let close_pat = format!("</{tag_lc}>");

    let mut out = String::new();
    let mut i = 0usize;
    let lower = html.to_ascii_lowercase();
    while let Some(rel_start) = lower[i..].find(&open_pat) {
        let start = i + rel_start;
        let after_open = start + open_pat.len();
        if let Some(rel_end) = lower[after_open..].find(&close_pat) {
            let end = after_open + rel_end + close_pat.len();
            out.push_str(&html[i..start]);
            i = end;
        } else {
            break;
        }
    }
    out.push_str(&html[i..]);
    out
}

fn extract_full_text(html: &str) -> String {
    let mut stripped = html.to_string();
    for tag in ["script", "style", "noscript", "nav", "header", "footer", "aside"] {
        stripped = strip_tag_blocks(&stripped, tag);
    }
    html2text::from_read(Cursor::new(stripped.as_bytes()), 80)
        .unwrap_or_else(|_| stripped.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    const JSON_LD_PAGE: &str = r#"<html><head>
        <script type="application/ld+json">
        {
          "@context": "https://schema.org",
          "@type": "Recipe",
          "name": "Chocolate Chip Cookies",
          "description": "Classic cookies.",
          "prepTime": "PT15M",
          "cookTime": "PT12M",
          "recipeYield": "24",
          "recipeIngredient": ["2 cups flour", "1 cup sugar", "2 eggs"],
          "recipeInstructions": [
            {"@type": "HowToStep", "text": "Mix the dry ingredients."},
            {"@type": "HowToStep", "text": "Bake until golden."}
          ],
          "recipeCategory": "Dessert"
        }
        </script></head>
        <body itemscope itemtype="https://schema.org/Recipe">
          <h1 itemprop="name">Microdata Cookies</h1>
          <li itemprop="recipeIngredient">1 cup butter</li>
        </body></html>"#;

    #[test]
    fn json_ld_wins_over_microdata() {
        let out = extract_content(JSON_LD_PAGE, "https://example.com/cookies");
        assert_eq!(out.extraction_method, "json-ld");
        assert_eq!(out.confidence, CONFIDENCE_JSON_LD);
        assert!(out.content.contains("Chocolate Chip Cookies"));
        assert!(!out.content.contains("Microdata Cookies"));
    }

    #[test]
    fn json_ld_durations_become_minutes() {
        let out = extract_content(JSON_LD_PAGE, "https://example.com/cookies");
        assert!(out.content.contains("Prep time: 15 minutes"));
        assert!(out.content.contains("Cook time: 12 minutes"));
    }

    #[test]
    fn json_ld_recipe_found_inside_graph() {
        let html = r#"<html><head><script type="application/ld+json">
        {"@graph": [
            {"@type": "WebSite", "name": "Food Site"},
            {"@type": "Recipe", "name": "Graph Soup",
             "recipeIngredient": ["1 onion"],
             "recipeInstructions": ["Boil the onion."]}
        ]}
        </script></head><body></body></html>"#;
        let out = extract_content(html, "https://example.com/soup");
        assert_eq!(out.extraction_method, "json-ld");
        assert!(out.content.contains("Graph Soup"));
    }

    #[test]
    fn microdata_used_when_no_json_ld() {
        let html = r#"<html><body>
          <div itemscope itemtype="http://schema.org/Recipe">
            <h1 itemprop="name">Simple Salad</h1>
            <p itemprop="description">Fresh and fast.</p>
            <li itemprop="recipeIngredient">2 tomatoes</li>
            <li itemprop="recipeIngredient">1 cucumber</li>
            <div itemprop="recipeInstructions">Chop everything and toss.</div>
          </div>
        </body></html>"#;
        let out = extract_content(html, "https://example.com/salad");
        assert_eq!(out.extraction_method, "microdata");
        assert_eq!(out.confidence, CONFIDENCE_MICRODATA);
        assert!(out.content.contains("Recipe: Simple Salad"));
        assert!(out.content.contains("- 2 tomatoes"));
        assert!(out.content.contains("1. Chop everything and toss."));
    }

    #[test]
    fn selector_strategy_picks_highest_scoring_block() {
        let html = r#"<html><body>
          <div class="entry-content">Short unrelated blurb about the site.</div>
          <div class="recipe-content">
            Ingredients for this recipe: flour, sugar, eggs, butter.
            Instructions: mix the ingredients, stir well, add eggs, bake for
            30 minutes, serve warm. This recipe serves 4 and cooking takes
            45 minutes total. Stir and simmer, then season to taste.
          </div>
        </body></html>"#;
        let out = extract_content(html, "https://example.com/blog");
        assert_eq!(out.extraction_method, "css-selectors");
        assert_eq!(out.confidence, CONFIDENCE_SELECTORS);
        assert!(out.content.contains("flour"));
    }

    #[test]
    fn full_text_fallback_drops_script_and_nav() {
        let html = r#"<html><body>
          <nav>Home | About</nav>
          <script>var tracker = "evil";</script>
          <p>Grandma's stew notes, no markup at all.</p>
          <footer>All rights reserved</footer>
        </body></html>"#;
        let out = extract_content(html, "https://example.com/notes");
        assert_eq!(out.extraction_method, "full-text");
        assert_eq!(out.confidence, CONFIDENCE_FULL_TEXT);
        assert!(out.content.contains("stew notes"));
        assert!(!out.content.contains("tracker"));
        assert!(!out.content.contains("Home | About"));
    }

    #[test]
    fn iso_durations_parse_to_minutes() {
        assert_eq!(parse_iso_duration_minutes("PT15M"), Some(15));
        assert_eq!(parse_iso_duration_minutes("PT1H30M"), Some(90));
        assert_eq!(parse_iso_duration_minutes("PT2H"), Some(120));
        assert_eq!(parse_iso_duration_minutes("PT45S"), None);
        assert_eq!(parse_iso_duration_minutes("garbage"), None);
        assert_eq!(parse_iso_duration_minutes(""), None);
    }

    #[test]
    fn likelihood_score_penalizes_short_text() {
        let short = "recipe recipe";
        let long = format!("recipe recipe {}", "filler words here ".repeat(10));
        assert!(score_recipe_text(&long) > score_recipe_text(short));
    }
}
