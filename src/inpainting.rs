//! Inpainting model selection and prompt construction

use crate::{
    config::{SceneContext, DEFAULT_INPAINTING_PROMPT},
    error::{PersonRemovalError, Result},
    inference::{with_call_timeout, InpaintRequest, InpainterRegistry},
    mask::InpaintingMask,
};
use instant::Instant;
use std::time::Duration;
use tracing::{info, instrument, warn};

/// Qualifiers appended to every prompt
const QUALITY_QUALIFIERS: &[&str] = &[
    "photorealistic",
    "high quality",
    "consistent lighting",
    "no people",
];

/// Successful fill
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InpaintOutcome {
    pub result_url: String,
    pub model_used: String,
    /// Time spent across all attempts, failed ones included
    pub processing_time_ms: u64,
}

/// Walks the registered back-ends until one fills the image
#[derive(Debug, Clone)]
pub struct InpaintingSelector {
    registry: InpainterRegistry,
    dedupe_preferred: bool,
    call_timeout: Duration,
}

impl InpaintingSelector {
    #[must_use]
    pub fn new(registry: InpainterRegistry, call_timeout: Duration) -> Self {
        Self {
            registry,
            dedupe_preferred: false,
            call_timeout,
        }
    }

    /// Do not retry the preferred back-end when walking the priority list
    #[must_use]
    pub fn with_dedupe_preferred(mut self, dedupe: bool) -> Self {
        self.dedupe_preferred = dedupe;
        self
    }

    #[must_use]
    pub fn registry(&self) -> &InpainterRegistry {
        &self.registry
    }

    /// Fill the masked region, trying back-ends in priority order
    ///
    /// # Errors
    /// - `Inpainting` when no back-end is registered or every back-end failed
    /// - `Cancelled` is returned as soon as a back-end reports it
    #[instrument(skip(self, mask, prompt), fields(regions = mask.regions.len()))]
    pub async fn fill(
        &self,
        image_url: &str,
        mask: &InpaintingMask,
        prompt: &str,
        preferred_model: Option<&str>,
    ) -> Result<InpaintOutcome> {
        let start = Instant::now();
        let attempts = self
            .registry
            .attempt_order(preferred_model, self.dedupe_preferred);

        if attempts.is_empty() {
            return Err(PersonRemovalError::inpainting(
                "No inpainting back-ends are registered",
            ));
        }

        let request = InpaintRequest {
            image_url,
            mask,
            prompt,
        };
        let mut failures = Vec::with_capacity(attempts.len());

        for inpainter in &attempts {
            let name = inpainter.name();
            let operation = format!("inpainting with '{}'", name);
            match with_call_timeout(self.call_timeout, &operation, inpainter.fill(request)).await {
                Ok(result_url) => {
                    let elapsed = start.elapsed().as_millis() as u64;
                    info!(model = %name, elapsed_ms = elapsed, "Inpainting succeeded");
                    return Ok(InpaintOutcome {
                        result_url,
                        model_used: name.to_string(),
                        processing_time_ms: elapsed,
                    });
                },
                Err(e @ PersonRemovalError::Cancelled(_)) => return Err(e),
                Err(e) => {
                    warn!(model = %name, error = %e, "Inpainting back-end failed");
                    failures.push(format!("{}: {}", name, e));
                },
            }
        }

        Err(PersonRemovalError::inpainting(format!(
            "All {} inpainting attempts failed ({})",
            attempts.len(),
            failures.join("; ")
        )))
    }
}

/// Append scene-context and quality qualifiers to `base`
#[must_use]
pub fn augment_prompt(base: &str, context: SceneContext) -> String {
    let base = base.trim().trim_end_matches(',');
    let mut parts: Vec<&str> = Vec::with_capacity(8);
    if !base.is_empty() {
        parts.push(base);
    }
    parts.extend_from_slice(context_keywords(context));
    parts.extend_from_slice(QUALITY_QUALIFIERS);
    parts.join(", ")
}

/// Prompt for one run: the custom prompt if given, the default otherwise
#[must_use]
pub fn build_prompt(custom_prompt: Option<&str>, context: SceneContext) -> String {
    let base = custom_prompt
        .filter(|p| !p.trim().is_empty())
        .unwrap_or(DEFAULT_INPAINTING_PROMPT);
    augment_prompt(base, context)
}

fn context_keywords(context: SceneContext) -> &'static [&'static str] {
    match context {
        SceneContext::Generic => &[],
        SceneContext::Outdoor => &["outdoor scenery", "natural daylight"],
        SceneContext::Indoor => &["interior", "matching walls and floor"],
        SceneContext::Crowd => &["empty street", "continuous background texture"],
    }
}
