//! Minimal, deterministic text normalization helpers.
//!
//! Everything here is hand-rolled scanning: the noise-phrase lists are fixed,
//! and phrase removal must be safe on mixed Latin/Hebrew text, so we match on
//! chars rather than bytes.

/// Website noise stripped from extracted page text before it reaches the
/// model. Both scripts; matched case-insensitively.
const NOISE_PHRASES: &[&str] = &[
    "advertisement",
    "cookie policy",
    "subscribe to our newsletter",
    "follow us on",
    "share this recipe",
    "rate this recipe",
    "print recipe",
    "save recipe",
    "jump to recipe",
    "skip to recipe",
    "click here",
    // Hebrew: advertisement, cookie policy, newsletter signup, follow us,
    // share/rate/print the recipe.
    "פרסומת",
    "מדיניות עוגיות",
    "הירשמו לניוזלטר",
    "עקבו אחרינו",
    "שתפו את המתכון",
    "דרגו את המתכון",
    "הדפסו את המתכון",
];

fn lc(ch: char) -> char {
    // Single-char lowercase is enough here: the phrase lists are ASCII or
    // Hebrew (which has no case), so multi-char expansions never match them.
    ch.to_lowercase().next().unwrap_or(ch)
}

/// Remove every case-insensitive occurrence of `phrase` from `text`.
fn remove_phrase_ci(text: &str, phrase: &str) -> String {
    let hay: Vec<char> = text.chars().collect();
    let needle: Vec<char> = phrase.chars().map(lc).collect();
    if needle.is_empty() || hay.len() < needle.len() {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut i = 0usize;
    while i < hay.len() {
        let end = i + needle.len();
        let matched = end <= hay.len() && hay[i..end].iter().map(|c| lc(*c)).eq(needle.iter().copied());
        if matched {
            i = end;
        } else {
            out.push(hay[i]);
            i += 1;
        }
    }
    out
}

/// Collapse runs of spaces/tabs while keeping line structure: single
/// newlines survive, 3+ blank lines collapse to one blank line.
///
/// Line structure matters downstream — the extraction-failure fallback
/// scrapes a recipe name from the first few lines of the cleaned input.
pub fn collapse_whitespace_keep_lines(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut blank_run = 0usize;
    for line in text.replace("\r\n", "\n").replace('\r', "\n").split('\n') {
        let collapsed = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if collapsed.is_empty() {
            blank_run += 1;
            continue;
        }
        if !out.is_empty() {
            out.push('\n');
            if blank_run > 0 {
                out.push('\n');
            }
        }
        blank_run = 0;
        out.push_str(&collapsed);
    }
    out
}

/// Clean extracted recipe text: whitespace collapse + noise-phrase removal.
/// Applied to every content-extraction strategy's output and to raw text
/// input before prompting.
pub fn clean_recipe_text(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    let mut t = text.to_string();
    for phrase in NOISE_PHRASES {
        t = remove_phrase_ci(&t, phrase);
    }
    collapse_whitespace_keep_lines(&t)
}

/// Bound the text the model sees. Cuts at `max_chars`, then backs up to the
/// last sentence end if one exists in the final fifth of the budget.
pub fn truncate_for_prompt(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    if let Some(pos) = cut.rfind('.') {
        let pos_chars = cut[..=pos].chars().count();
        if pos_chars * 5 > max_chars * 4 {
            return cut[..=pos].to_string();
        }
    }
    cut
}

/// True when the text contains characters from the Hebrew Unicode block.
pub fn contains_hebrew(text: &str) -> bool {
    text.chars().any(|c| ('\u{0590}'..='\u{05FF}').contains(&c))
}
