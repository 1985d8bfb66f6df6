//! Public facade crate for `recipeflow`.
//!
//! This crate intentionally contains no IO or provider-specific logic.
//! It re-exports the backend-agnostic types/traits from `recipeflow-core`.

pub use recipeflow_core::*;
