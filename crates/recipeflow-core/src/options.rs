//! Per-request knobs and the retry policy shared by fetch and model calls.

use std::time::Duration;

/// Advisory hint for how the extractor should shape instructions.
///
/// "Structured" nudges the model toward `stages`, "Simple" toward a flat
/// `instructions` list. The model may ignore the hint; it never overrides
/// the one-of-stages-or-instructions invariant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FormatHint {
    Structured,
    Simple,
    #[default]
    Unspecified,
}

/// Options bag accepted by every pipeline entry point.
///
/// Everything is optional; unset fields fall back to per-stage defaults
/// (e.g. the image path uses a longer base retry delay than the text path).
#[derive(Debug, Clone)]
pub struct ProcessOptions {
    /// Read and write the extraction cache. Defaults to true.
    pub use_cache: bool,
    pub max_retries: Option<u32>,
    /// Base retry delay in seconds; doubled on each attempt.
    pub retry_delay: Option<f64>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub top_k: Option<u32>,
    pub max_tokens: Option<u32>,
    pub format_hint: FormatHint,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self {
            use_cache: true,
            max_retries: None,
            retry_delay: None,
            temperature: None,
            top_p: None,
            top_k: None,
            max_tokens: None,
            format_hint: FormatHint::Unspecified,
        }
    }
}

/// Deterministic exponential backoff: attempt `n` (0-based) sleeps
/// `base_delay * multiplier^n` before the next try. No jitter.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: f64,
}

impl RetryPolicy {
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            multiplier: 2.0,
        }
    }

    /// Policy for a request, with `base_delay_secs` as the fallback when the
    /// options carry no explicit retry delay.
    pub fn from_options(opts: &ProcessOptions, base_delay_secs: f64) -> Self {
        let attempts = opts.max_retries.unwrap_or(Self::DEFAULT_MAX_ATTEMPTS);
        let delay = opts.retry_delay.unwrap_or(base_delay_secs).max(0.0);
        Self::new(attempts, Duration::from_secs_f64(delay))
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .mul_f64(self.multiplier.powi(attempt as i32))
    }
}
