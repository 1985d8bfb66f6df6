//! The long-lived pipeline service and its three entry points.
//!
//! One `RecipePipeline` is constructed at process start and shared by every
//! request handler; it owns the HTTP client, the model handle, and the
//! extraction cache. Within a request, stages run sequentially — images are
//! OCR'd one at a time in index order to bound memory and external-API
//! concurrency.

use recipeflow_core::{
    Error, ExtractionResult, ModelBackend, ProcessOptions, Provenance, Result,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use crate::ai::StructuredExtractor;
use crate::assemble::assemble;
use crate::confidence::{blend_multi_image, blend_url};
use crate::content::extract_content;
use crate::fetch::Fetcher;
use crate::image::{normalize_image, ImageInput, NormalizedImage};
use crate::ocr::{consolidate_pages, ocr_pages};

pub struct RecipePipeline {
    fetcher: Fetcher,
    model: Arc<dyn ModelBackend>,
    extractor: StructuredExtractor,
}

impl RecipePipeline {
    pub fn new(model: Arc<dyn ModelBackend>) -> Result<Self> {
        Ok(Self {
            fetcher: Fetcher::new()?,
            extractor: StructuredExtractor::new(model.clone()),
            model,
        })
    }

    /// Extract a structured recipe from free text.
    pub async fn process_text(
        &self,
        text: &str,
        opts: &ProcessOptions,
    ) -> Result<ExtractionResult> {
        let start = Instant::now();
        let extraction = self.extractor.extract_text(text, opts).await;
        let recipe = assemble(&extraction.draft, None);
        Ok(ExtractionResult {
            recipe,
            confidence_score: extraction.confidence,
            processing_time: start.elapsed().as_secs_f64(),
            provenance: Provenance::default(),
        })
    }

    /// Fetch a recipe page, extract its content, and run structured
    /// extraction. Fetch failures surface as errors — a URL that cannot be
    /// fetched has no content to fall back on.
    pub async fn process_url(&self, url: &str, opts: &ProcessOptions) -> Result<ExtractionResult> {
        let start = Instant::now();

        let page = self.fetcher.fetch(url, opts).await?;
        let content = extract_content(&page.content, &page.final_url);
        info!(
            url = %page.final_url,
            method = content.extraction_method,
            "content extracted"
        );

        // The model benefits from knowing where the text came from and how
        // it was pulled out of the page.
        let prefaced = format!(
            "Recipe source: {}\nExtraction method: {}\n\n{}",
            page.final_url, content.extraction_method, content.content
        );
        let extraction = self.extractor.extract_text(&prefaced, opts).await;
        let confidence = blend_url(extraction.confidence, content.confidence);

        let recipe = assemble(&extraction.draft, Some(page.final_url.clone()));
        Ok(ExtractionResult {
            recipe,
            confidence_score: confidence,
            processing_time: start.elapsed().as_secs_f64(),
            provenance: Provenance {
                source_url: Some(page.final_url),
                extraction_method: Some(content.extraction_method),
                source_confidence: Some(content.confidence),
            },
        })
    }

    /// Extract a structured recipe from one or more photographs.
    ///
    /// A single image goes to the model directly with the image attached.
    /// Multiple images are OCR'd page by page and consolidated into one
    /// document first; per-page failures are swallowed, and only the
    /// nothing-at-all case degrades to the image fallback.
    pub async fn process_images(
        &self,
        images: &[ImageInput],
        opts: &ProcessOptions,
    ) -> Result<ExtractionResult> {
        let start = Instant::now();

        if images.is_empty() {
            return Err(Error::InvalidImage("no images provided".to_string()));
        }

        if images.len() == 1 {
            let normalized = normalize_image(&images[0])?;
            let extraction = self.extractor.extract_image(&normalized, opts).await;
            let recipe = assemble(&extraction.draft, None);
            return Ok(ExtractionResult {
                recipe,
                confidence_score: extraction.confidence,
                processing_time: start.elapsed().as_secs_f64(),
                provenance: Provenance {
                    source_url: None,
                    extraction_method: Some("image"),
                    source_confidence: Some(normalized.quality_score),
                },
            });
        }

        let mut normalized: Vec<NormalizedImage> = Vec::new();
        for (i, input) in images.iter().enumerate() {
            match normalize_image(input) {
                Ok(img) => normalized.push(img),
                Err(e) => warn!(page = i + 1, error = %e, "skipping invalid image"),
            }
        }

        let pages = ocr_pages(self.model.as_ref(), &normalized).await;
        if pages.is_empty() {
            // Every page failed (or was invalid): report the image fallback
            // rather than an error so callers get a usable object.
            warn!("no text extracted from any page");
            let extraction = self.extractor.image_fallback();
            let recipe = assemble(&extraction.draft, None);
            return Ok(ExtractionResult {
                recipe,
                confidence_score: extraction.confidence,
                processing_time: start.elapsed().as_secs_f64(),
                provenance: Provenance {
                    source_url: None,
                    extraction_method: Some("multi-image"),
                    source_confidence: None,
                },
            });
        }

        let consolidated = consolidate_pages(&pages);
        let extraction = self.extractor.extract_text(&consolidated, opts).await;
        // The completeness boost only applies to real extractions; a
        // post-exhaustion fallback keeps its exact fallback score.
        let confidence = if extraction.degraded {
            extraction.confidence
        } else {
            blend_multi_image(extraction.confidence)
        };

        let recipe = assemble(&extraction.draft, None);
        Ok(ExtractionResult {
            recipe,
            confidence_score: confidence,
            processing_time: start.elapsed().as_secs_f64(),
            provenance: Provenance {
                source_url: None,
                extraction_method: Some("multi-image"),
                source_confidence: None,
            },
        })
    }
}
