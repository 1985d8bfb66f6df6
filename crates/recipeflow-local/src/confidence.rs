//! Confidence blending across pipeline stages.
//!
//! The weights are fixed policy, not per-request tunables.

/// Weight of the URL content-extraction stage in the blended score.
pub const URL_EXTRACTION_WEIGHT: f64 = 0.3;
/// Weight of the AI extraction stage in the blended score.
pub const AI_PROCESSING_WEIGHT: f64 = 0.7;

/// Consolidated multi-page text is typically more complete than a single
/// page; the boost acknowledges that, up to a hard cap.
pub const MULTI_IMAGE_BOOST: f64 = 1.1;
pub const MULTI_IMAGE_CAP: f64 = 0.95;

/// Blend for URL-sourced input. The outer `min` makes the source stage a
/// one-way ratchet: a weak extraction strategy can suppress the AI's own
/// confidence but never inflate it.
pub fn blend_url(ai_confidence: f64, url_confidence: f64) -> f64 {
    let weighted = url_confidence * URL_EXTRACTION_WEIGHT + ai_confidence * AI_PROCESSING_WEIGHT;
    ai_confidence.min(weighted)
}

/// Blend for consolidated multi-image input.
pub fn blend_multi_image(ai_confidence: f64) -> f64 {
    MULTI_IMAGE_CAP.min(ai_confidence * MULTI_IMAGE_BOOST)
}
