//! Local implementations for the recipeflow extraction pipeline:
//! reqwest-based fetching, scraper-based content extraction, image
//! normalization, Gemini-backed OCR and structured extraction, and the
//! `RecipePipeline` service that wires them together.

pub mod ai;
pub mod assemble;
pub mod confidence;
pub mod content;
pub mod fetch;
pub mod gemini;
pub mod image;
pub mod ocr;
pub mod pipeline;
pub mod retry;
pub mod textprep;

pub use pipeline::RecipePipeline;
