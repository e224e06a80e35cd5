//! Configuration types for person removal operations

use crate::{
    error::{PersonRemovalError, Result},
    utils::validation::NumericValidator,
};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::path::Path;
use std::time::Duration;

/// Image dimensions assumed when a capability does not report true dimensions
pub const FALLBACK_IMAGE_DIMENSIONS: (u32, u32) = (1024, 1024);

/// Detections at or below this confidence are dropped by the primary detector
pub const PRIMARY_CONFIDENCE_THRESHOLD: f64 = 0.5;

/// Confidence substituted when a capability omits or mangles it
pub const DEFAULT_CONFIDENCE: f64 = 0.9;

/// Base prompt used when no custom prompt is supplied
pub const DEFAULT_INPAINTING_PROMPT: &str =
    "natural background, seamless continuation of the scene";

/// Largest margin accepted around removed regions
pub const MAX_MASK_DILATION_PX: u32 = 256;

/// Coarse scene hint used to enrich the inpainting prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SceneContext {
    Generic,
    Outdoor,
    Indoor,
    Crowd,
}

impl Default for SceneContext {
    fn default() -> Self {
        Self::Generic
    }
}

/// Quality parameters for the promptable segmentation capability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SegmentationParams {
    /// Sampling grid density
    pub points_per_side: u32,
    pub pred_iou_thresh: f64,
    pub stability_score_thresh: f64,
    /// Regions smaller than this (pixels²) are discarded by the back-end
    pub min_mask_region_area: u32,
    pub confidence_threshold: f64,
}

impl Default for SegmentationParams {
    fn default() -> Self {
        Self {
            points_per_side: 32,
            pred_iou_thresh: 0.88,
            stability_score_thresh: 0.95,
            min_mask_region_area: 100,
            confidence_threshold: PRIMARY_CONFIDENCE_THRESHOLD,
        }
    }
}

/// Parameters for the bounding-box person detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PersonDetectorParams {
    /// Object class the detector is restricted to
    pub class_name: String,
    pub confidence_threshold: f64,
    pub iou_threshold: f64,
}

impl Default for PersonDetectorParams {
    fn default() -> Self {
        Self {
            class_name: "person".to_string(),
            confidence_threshold: 0.25,
            iou_threshold: 0.45,
        }
    }
}

/// Whole-pipeline retry policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RetryPolicy {
    /// Total number of pipeline attempts (`maxRetries`)
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Stop immediately when an attempt finds nobody in the image
    pub short_circuit_no_people: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            base_delay_ms: 1000,
            max_delay_ms: 5000,
            short_circuit_no_people: true,
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt `attempt` (1-based); zero for the first attempt
    ///
    /// `min(base * 2^(attempt-2), max)` for `attempt >= 2`.
    #[must_use]
    pub fn delay_before_attempt(&self, attempt: u32) -> Duration {
        if attempt < 2 {
            return Duration::ZERO;
        }
        let exponent = (attempt - 2).min(32);
        let factor = 1u64.checked_shl(exponent).unwrap_or(u64::MAX);
        let delay = self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms);
        Duration::from_millis(delay)
    }
}

/// Time budget for individual remote calls
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TimeoutConfig {
    pub remote_call_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            remote_call_ms: 60_000,
        }
    }
}

impl TimeoutConfig {
    #[must_use]
    pub fn remote_call(&self) -> Duration {
        Duration::from_millis(self.remote_call_ms)
    }
}

/// Options controlling one person removal run
///
/// The retry budget is read from a top-level `maxRetries` key as well as
/// from `retry.maxAttempts`; the top-level key wins when both are present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(remote = "Self", default, rename_all = "camelCase")]
pub struct PersonRemovalOptions {
    /// Number of highest-scoring people to keep
    pub target_foreground_count: usize,
    /// Inpainting back-end to try first
    pub preferred_inpainting_model: Option<String>,
    /// Override for the generative-fill base prompt
    pub custom_prompt: Option<String>,
    /// Attempt the box-detector + refiner chain when primary segmentation fails
    #[serde(rename = "fallbackToYOLO")]
    pub fallback_to_yolo: bool,
    pub retry: RetryPolicy,
    pub timeouts: TimeoutConfig,
    /// Skip the preferred model when walking the priority list after it failed
    pub dedupe_preferred_model: bool,
    /// Issue per-box refinement calls concurrently
    pub parallel_refinement: bool,
    pub scene_context: SceneContext,
    /// Pixels added around every removed region in the fill mask
    pub mask_dilation_px: u32,
    pub segmentation: SegmentationParams,
    pub person_detector: PersonDetectorParams,
}

impl Default for PersonRemovalOptions {
    fn default() -> Self {
        Self {
            target_foreground_count: 1,
            preferred_inpainting_model: None,
            custom_prompt: None,
            fallback_to_yolo: true,
            retry: RetryPolicy::default(),
            timeouts: TimeoutConfig::default(),
            dedupe_preferred_model: false,
            parallel_refinement: false,
            scene_context: SceneContext::default(),
            mask_dilation_px: 8,
            segmentation: SegmentationParams::default(),
            person_detector: PersonDetectorParams::default(),
        }
    }
}

/// Wire shape accepting the top-level `maxRetries` alongside the nested options
#[derive(Deserialize)]
struct OptionsDocument {
    #[serde(default, rename = "maxRetries")]
    max_retries: Option<u32>,
    #[serde(flatten, deserialize_with = "PersonRemovalOptions::deserialize")]
    options: PersonRemovalOptions,
}

impl<'de> Deserialize<'de> for PersonRemovalOptions {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let OptionsDocument {
            max_retries,
            mut options,
        } = OptionsDocument::deserialize(deserializer)?;
        if let Some(attempts) = max_retries {
            options.retry.max_attempts = attempts;
        }
        Ok(options)
    }
}

impl Serialize for PersonRemovalOptions {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        PersonRemovalOptions::serialize(self, serializer)
    }
}

impl PersonRemovalOptions {
    /// Create a new options builder
    ///
    /// ```rust
    /// use imgly_person_removal::PersonRemovalOptions;
    ///
    /// let options = PersonRemovalOptions::builder()
    ///     .target_foreground_count(2)
    ///     .preferred_inpainting_model("lama")
    ///     .max_retries(3)
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(options.retry.max_attempts, 3);
    /// ```
    #[must_use]
    pub fn builder() -> PersonRemovalOptionsBuilder {
        PersonRemovalOptionsBuilder::default()
    }

    /// `maxRetries` in the external vocabulary
    #[must_use]
    pub fn max_retries(&self) -> u32 {
        self.retry.max_attempts
    }

    /// Validate all configuration parameters
    ///
    /// # Errors
    /// - `maxRetries` outside 1-10
    /// - backoff cap below the base delay
    /// - zero remote call timeout
    /// - confidence thresholds outside `[0, 1]`
    /// - mask dilation above [`MAX_MASK_DILATION_PX`]
    pub fn validate(&self) -> Result<()> {
        if !(1..=10).contains(&self.retry.max_attempts) {
            return Err(PersonRemovalError::config_value_error(
                "maxRetries",
                self.retry.max_attempts,
                "1-10",
                Some(2),
            ));
        }

        if self.retry.max_delay_ms < self.retry.base_delay_ms {
            return Err(PersonRemovalError::invalid_config(format!(
                "Backoff cap ({} ms) is below the base delay ({} ms)",
                self.retry.max_delay_ms, self.retry.base_delay_ms
            )));
        }

        NumericValidator::validate_positive(
            self.timeouts.remote_call_ms,
            "Remote call timeout (ms)",
        )?;
        NumericValidator::validate_range(
            self.mask_dilation_px,
            0,
            MAX_MASK_DILATION_PX,
            "Mask dilation (px)",
        )?;
        NumericValidator::validate_unit_interval(
            self.segmentation.confidence_threshold,
            "segmentation confidence threshold",
        )?;
        NumericValidator::validate_unit_interval(
            self.person_detector.confidence_threshold,
            "person detector confidence threshold",
        )?;
        NumericValidator::validate_unit_interval(
            self.person_detector.iou_threshold,
            "person detector IoU threshold",
        )?;

        if let Some(model) = &self.preferred_inpainting_model {
            if model.trim().is_empty() {
                return Err(PersonRemovalError::invalid_config(
                    "Preferred inpainting model name must not be empty",
                ));
            }
        }

        Ok(())
    }

    /// Load options from a JSON file
    ///
    /// # Errors
    /// - File cannot be read
    /// - JSON is malformed
    /// - Loaded options fail validation
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let options: Self = serde_json::from_str(&contents)?;
        options.validate()?;
        Ok(options)
    }
}

/// Builder for `PersonRemovalOptions`
#[derive(Debug, Default)]
pub struct PersonRemovalOptionsBuilder {
    options: PersonRemovalOptions,
}

impl PersonRemovalOptionsBuilder {
    #[must_use]
    pub fn target_foreground_count(mut self, count: usize) -> Self {
        self.options.target_foreground_count = count;
        self
    }

    #[must_use]
    pub fn preferred_inpainting_model<S: Into<String>>(mut self, model: S) -> Self {
        self.options.preferred_inpainting_model = Some(model.into());
        self
    }

    #[must_use]
    pub fn custom_prompt<S: Into<String>>(mut self, prompt: S) -> Self {
        self.options.custom_prompt = Some(prompt.into());
        self
    }

    #[must_use]
    pub fn fallback_to_yolo(mut self, enabled: bool) -> Self {
        self.options.fallback_to_yolo = enabled;
        self
    }

    #[must_use]
    pub fn max_retries(mut self, attempts: u32) -> Self {
        self.options.retry.max_attempts = attempts;
        self
    }

    #[must_use]
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.options.retry = policy;
        self
    }

    #[must_use]
    pub fn remote_call_timeout(mut self, timeout: Duration) -> Self {
        self.options.timeouts.remote_call_ms = timeout.as_millis() as u64;
        self
    }

    #[must_use]
    pub fn dedupe_preferred_model(mut self, dedupe: bool) -> Self {
        self.options.dedupe_preferred_model = dedupe;
        self
    }

    #[must_use]
    pub fn parallel_refinement(mut self, parallel: bool) -> Self {
        self.options.parallel_refinement = parallel;
        self
    }

    #[must_use]
    pub fn scene_context(mut self, context: SceneContext) -> Self {
        self.options.scene_context = context;
        self
    }

    #[must_use]
    pub fn mask_dilation_px(mut self, pixels: u32) -> Self {
        self.options.mask_dilation_px = pixels;
        self
    }

    #[must_use]
    pub fn segmentation(mut self, params: SegmentationParams) -> Self {
        self.options.segmentation = params;
        self
    }

    #[must_use]
    pub fn person_detector(mut self, params: PersonDetectorParams) -> Self {
        self.options.person_detector = params;
        self
    }

    /// Build and validate the options
    ///
    /// # Errors
    /// See [`PersonRemovalOptions::validate`].
    pub fn build(self) -> Result<PersonRemovalOptions> {
        self.options.validate()?;
        Ok(self.options)
    }
}

/// Connection settings for one remote capability
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointConfig {
    pub url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

/// A named inpainting endpoint; list order is priority order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NamedEndpoint {
    pub name: String,
    #[serde(flatten)]
    pub endpoint: EndpointConfig,
}

/// Remote capabilities wired into the pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConfig {
    pub segmenter: EndpointConfig,
    #[serde(default)]
    pub person_detector: Option<EndpointConfig>,
    #[serde(default)]
    pub refiner: Option<EndpointConfig>,
    pub inpainters: Vec<NamedEndpoint>,
}

impl ServiceConfig {
    /// Load a service configuration from a JSON file
    ///
    /// # Errors
    /// - File cannot be read or parsed
    /// - No inpainting endpoints configured
    /// - Box detector configured without a refiner (or vice versa)
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration is internally consistent
    ///
    /// # Errors
    /// - No inpainting endpoints configured
    /// - Duplicate inpainter names
    /// - Box detector configured without a refiner (or vice versa)
    pub fn validate(&self) -> Result<()> {
        if self.inpainters.is_empty() {
            return Err(PersonRemovalError::invalid_config(
                "At least one inpainting endpoint must be configured",
            ));
        }

        let mut names: Vec<&str> = self.inpainters.iter().map(|i| i.name.as_str()).collect();
        names.sort_unstable();
        if names.windows(2).any(|pair| pair[0] == pair[1]) {
            return Err(PersonRemovalError::invalid_config(
                "Inpainting endpoint names must be unique",
            ));
        }

        if self.person_detector.is_some() != self.refiner.is_some() {
            return Err(PersonRemovalError::invalid_config(
                "The fallback chain needs both a person detector and a refiner",
            ));
        }

        Ok(())
    }
}
