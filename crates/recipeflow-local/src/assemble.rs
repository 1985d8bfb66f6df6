//! Mapping validated drafts into canonical `Recipe` entities.
//!
//! The assembler owns identity: it is the only place that mints ids and
//! timestamps. It must never raise — anything inconsistent degrades to a
//! minimal valid recipe carrying whatever name survived.

use chrono::Utc;
use recipeflow_core::{Recipe, RecipeDraft};
use recipeflow_core::recipe::total_time;
use tracing::error;
use uuid::Uuid;

const ERROR_NAME: &str = "Recipe Processing Error";

/// Build the canonical recipe from an extraction draft. `total_time` is
/// recomputed here regardless of what the draft's source claimed.
pub fn assemble(draft: &RecipeDraft, source_url: Option<String>) -> Recipe {
    match draft.validate() {
        Ok(()) => Recipe {
            id: Uuid::new_v4().to_string(),
            creation_time: Utc::now(),
            updated_at: None,
            name: draft.name.clone(),
            description: draft.description.clone(),
            category: draft.category,
            difficulty: draft.difficulty,
            prep_time: draft.prep_time,
            cook_time: draft.cook_time,
            total_time: total_time(draft.prep_time, draft.cook_time),
            servings: draft.servings,
            stages: draft.stages.clone(),
            instructions: draft.instructions.clone(),
            ingredients: draft.ingredients.clone(),
            main_ingredient: draft.main_ingredient.clone(),
            tags: draft.tags.clone(),
            source_url,
        },
        Err(e) => {
            error!(error = %e, "draft failed assembly, degrading to minimal recipe");
            minimal_recipe(&draft.name, source_url)
        }
    }
}

/// The degraded shape: still a valid recipe, with a diagnostic instruction
/// instead of content.
fn minimal_recipe(name: &str, source_url: Option<String>) -> Recipe {
    let name = if name.trim().is_empty() {
        ERROR_NAME.to_string()
    } else {
        name.to_string()
    };
    Recipe {
        id: Uuid::new_v4().to_string(),
        creation_time: Utc::now(),
        updated_at: None,
        name,
        description: None,
        category: None,
        difficulty: None,
        prep_time: None,
        cook_time: None,
        total_time: None,
        servings: None,
        stages: None,
        instructions: Some(vec!["Error processing recipe details".to_string()]),
        ingredients: Vec::new(),
        main_ingredient: None,
        tags: Vec::new(),
        source_url,
    }
}
