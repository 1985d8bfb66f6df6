//! Backend-agnostic types and traits for the recipeflow extraction pipeline.
//!
//! This crate intentionally contains no IO. Concrete backends (HTTP fetch,
//! Gemini model calls, image decoding) live in `recipeflow-local`.

pub mod model;
pub mod options;
pub mod recipe;

pub use model::{GenerateRequest, InlineImage, ModelBackend};
pub use options::{FormatHint, ProcessOptions, RetryPolicy};
pub use recipe::{
    Category, Difficulty, ExtractionResult, Ingredient, Provenance, Recipe, RecipeDraft, Stage,
};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("fetch failed: {0}")]
    Fetch(String),
    #[error("invalid image: {0}")]
    InvalidImage(String),
    #[error("llm failed: {0}")]
    Llm(String),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("cache error: {0}")]
    Cache(String),
    #[error("not configured: {0}")]
    NotConfigured(String),
}

pub type Result<T> = std::result::Result<T, Error>;
