//! The canonical recipe entity and the wire-level draft the extractor emits.
//!
//! Field names follow the upstream JSON contract (camelCase). `Recipe` adds
//! identity and timestamps on top of `RecipeDraft`; only the assembler in
//! `recipeflow-local` constructs full `Recipe` values.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Appetizer,
    Main,
    Side,
    Soup,
    Salad,
    Dessert,
    Baking,
    Breakfast,
    Beverage,
    Snack,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

/// One ingredient line. `amount` is free text on purpose: real recipes say
/// "2", "1/2", "to taste", or nothing at all, and the extractor is forbidden
/// from inventing a number ("not specified" stands in instead).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ingredient {
    pub item: String,
    pub amount: String,
    #[serde(default)]
    pub unit: Option<String>,
    /// Groups the ingredient under a stage when the recipe uses stages.
    #[serde(default)]
    pub stage_id: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    pub title: String,
    pub instructions: Vec<String>,
}

/// What the model must emit: everything in `Recipe` minus identity,
/// timestamps, and the derived total time.
///
/// Unknown fields are ignored on deserialization, so a model (or caller)
/// that emits `totalTime` anyway has it silently discarded — the total is
/// always recomputed at assembly time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipeDraft {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<Category>,
    #[serde(default)]
    pub difficulty: Option<Difficulty>,
    /// Minutes.
    #[serde(default)]
    pub prep_time: Option<u32>,
    /// Minutes. Resting/cooling time is folded in here by extraction convention.
    #[serde(default)]
    pub cook_time: Option<u32>,
    #[serde(default)]
    pub servings: Option<u32>,
    #[serde(default)]
    pub stages: Option<Vec<Stage>>,
    #[serde(default)]
    pub instructions: Option<Vec<String>>,
    #[serde(default)]
    pub ingredients: Vec<Ingredient>,
    #[serde(default)]
    pub main_ingredient: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl RecipeDraft {
    /// Enforce the structural invariants a well-formed draft must satisfy.
    ///
    /// A recipe carries exactly one of `stages` / `instructions`: both
    /// present and both absent are rejected. The name must be non-empty.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Validation("recipe name is empty".to_string()));
        }
        match (&self.stages, &self.instructions) {
            (Some(_), Some(_)) => Err(Error::Validation(
                "recipe has both stages and instructions".to_string(),
            )),
            (None, None) => Err(Error::Validation(
                "recipe has neither stages nor instructions".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

/// Derived total time: `prep + cook` with missing values treated as 0.
/// `None` only when both inputs are `None` (no time information at all).
pub fn total_time(prep: Option<u32>, cook: Option<u32>) -> Option<u32> {
    match (prep, cook) {
        (None, None) => None,
        (p, c) => Some(p.unwrap_or(0) + c.unwrap_or(0)),
    }
}

/// The canonical output entity. Identity and timestamps are assigned once at
/// assembly time and are immutable afterward.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipe {
    pub id: String,
    pub creation_time: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<Category>,
    #[serde(default)]
    pub difficulty: Option<Difficulty>,
    #[serde(default)]
    pub prep_time: Option<u32>,
    #[serde(default)]
    pub cook_time: Option<u32>,
    /// Always recomputed from `prep_time`/`cook_time`; never taken as input.
    #[serde(default)]
    pub total_time: Option<u32>,
    #[serde(default)]
    pub servings: Option<u32>,
    #[serde(default)]
    pub stages: Option<Vec<Stage>>,
    #[serde(default)]
    pub instructions: Option<Vec<String>>,
    #[serde(default)]
    pub ingredients: Vec<Ingredient>,
    #[serde(default)]
    pub main_ingredient: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub source_url: Option<String>,
}

// Tags are a set for equality purposes (serialization keeps insertion
// order). Everything else compares field-wise.
impl PartialEq for Recipe {
    fn eq(&self, other: &Self) -> bool {
        let tags_a: BTreeSet<&str> = self.tags.iter().map(|s| s.as_str()).collect();
        let tags_b: BTreeSet<&str> = other.tags.iter().map(|s| s.as_str()).collect();
        self.id == other.id
            && self.creation_time == other.creation_time
            && self.updated_at == other.updated_at
            && self.name == other.name
            && self.description == other.description
            && self.category == other.category
            && self.difficulty == other.difficulty
            && self.prep_time == other.prep_time
            && self.cook_time == other.cook_time
            && self.total_time == other.total_time
            && self.servings == other.servings
            && self.stages == other.stages
            && self.instructions == other.instructions
            && self.ingredients == other.ingredients
            && self.main_ingredient == other.main_ingredient
            && tags_a == tags_b
            && self.source_url == other.source_url
    }
}

/// Where an extraction came from and how reliable the source stage thought
/// it was. Used only to compute the blended score; not guaranteed to be
/// retained downstream.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Provenance {
    pub source_url: Option<String>,
    pub extraction_method: Option<&'static str>,
    pub source_confidence: Option<f64>,
}

/// A pipeline invocation's full output: the recipe plus how much to trust it
/// and how long it took.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionResult {
    pub recipe: Recipe,
    /// In [0, 1]; see the confidence module for how it is composed.
    pub confidence_score: f64,
    /// Wall-clock seconds for the whole pipeline invocation.
    pub processing_time: f64,
    #[serde(skip)]
    pub provenance: Provenance,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft_with(stages: Option<Vec<Stage>>, instructions: Option<Vec<String>>) -> RecipeDraft {
        RecipeDraft {
            name: "Test".to_string(),
            description: None,
            category: None,
            difficulty: None,
            prep_time: None,
            cook_time: None,
            servings: None,
            stages,
            instructions,
            ingredients: Vec::new(),
            main_ingredient: None,
            tags: Vec::new(),
        }
    }

    #[test]
    fn draft_requires_exactly_one_instruction_shape() {
        let flat = draft_with(None, Some(vec!["Mix.".to_string()]));
        assert!(flat.validate().is_ok());

        let staged = draft_with(
            Some(vec![Stage {
                title: "Dough".to_string(),
                instructions: vec!["Knead.".to_string()],
            }]),
            None,
        );
        assert!(staged.validate().is_ok());

        let both = draft_with(
            Some(vec![Stage {
                title: "Dough".to_string(),
                instructions: vec!["Knead.".to_string()],
            }]),
            Some(vec!["Mix.".to_string()]),
        );
        assert!(both.validate().is_err());

        let neither = draft_with(None, None);
        assert!(neither.validate().is_err());
    }

    #[test]
    fn draft_rejects_empty_name() {
        let mut d = draft_with(None, Some(vec!["Mix.".to_string()]));
        d.name = "   ".to_string();
        assert!(d.validate().is_err());
    }

    #[test]
    fn total_time_treats_missing_as_zero_but_not_both() {
        assert_eq!(total_time(None, None), None);
        assert_eq!(total_time(Some(15), None), Some(15));
        assert_eq!(total_time(None, Some(30)), Some(30));
        assert_eq!(total_time(Some(15), Some(30)), Some(45));
    }

    #[test]
    fn draft_ignores_caller_supplied_total_time() {
        let js = r#"{
            "name": "Cake",
            "prepTime": 10,
            "cookTime": 20,
            "totalTime": 999,
            "instructions": ["Bake."]
        }"#;
        let d: RecipeDraft = serde_json::from_str(js).unwrap();
        assert_eq!(d.prep_time, Some(10));
        assert_eq!(d.cook_time, Some(20));
        // No field to land in; the derived value comes from prep + cook.
        assert_eq!(total_time(d.prep_time, d.cook_time), Some(30));
    }

    #[test]
    fn draft_rejects_out_of_enum_difficulty() {
        let js = r#"{"name": "X", "difficulty": "impossible", "instructions": ["y"]}"#;
        assert!(serde_json::from_str::<RecipeDraft>(js).is_err());
    }

    #[test]
    fn draft_parses_camel_case_wire_names() {
        let js = r#"{
            "name": "Shakshuka",
            "prepTime": 5,
            "cookTime": 15,
            "mainIngredient": "eggs",
            "instructions": ["Simmer sauce.", "Crack eggs."],
            "ingredients": [
                {"item": "eggs", "amount": "4", "unit": null},
                {"item": "salt", "amount": "to taste"}
            ],
            "tags": ["breakfast"]
        }"#;
        let d: RecipeDraft = serde_json::from_str(js).unwrap();
        assert_eq!(d.main_ingredient.as_deref(), Some("eggs"));
        assert_eq!(d.ingredients.len(), 2);
        assert_eq!(d.ingredients[1].amount, "to taste");
        assert!(d.ingredients[1].unit.is_none());
        assert!(d.validate().is_ok());
    }

    #[test]
    fn recipe_equality_treats_tags_as_a_set() {
        let base = Recipe {
            id: "r1".to_string(),
            creation_time: DateTime::<Utc>::MIN_UTC,
            updated_at: None,
            name: "Soup".to_string(),
            description: None,
            category: None,
            difficulty: None,
            prep_time: None,
            cook_time: None,
            total_time: None,
            servings: None,
            stages: None,
            instructions: Some(vec!["Boil.".to_string()]),
            ingredients: Vec::new(),
            main_ingredient: None,
            tags: vec!["vegan".to_string(), "quick".to_string()],
            source_url: None,
        };
        let mut reordered = base.clone();
        reordered.tags = vec!["quick".to_string(), "vegan".to_string()];
        assert_eq!(base, reordered);

        let mut different = base.clone();
        different.tags = vec!["vegan".to_string()];
        assert_ne!(base, different);
    }
}
