//! Configuration conversion utilities for CLI arguments

use crate::cli::main_impl::Cli;
use crate::config::PersonRemovalOptions;
use anyhow::{Context, Result};

/// Convert CLI arguments to `PersonRemovalOptions`
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Build options from CLI arguments, on top of `--options` when given
    pub(crate) fn from_cli(cli: &Cli) -> Result<PersonRemovalOptions> {
        let mut options = match &cli.options {
            Some(path) => PersonRemovalOptions::from_file(path)
                .with_context(|| format!("Failed to load options from {}", path.display()))?,
            None => PersonRemovalOptions::default(),
        };

        if let Some(keep) = cli.keep {
            options.target_foreground_count = keep;
        }
        if let Some(model) = &cli.model {
            options.preferred_inpainting_model = Some(model.clone());
        }
        if let Some(prompt) = &cli.prompt {
            options.custom_prompt = Some(prompt.clone());
        }
        if let Some(scene) = cli.scene {
            options.scene_context = scene.into();
        }
        if cli.no_fallback {
            options.fallback_to_yolo = false;
        }
        if let Some(attempts) = cli.max_retries {
            options.retry.max_attempts = attempts;
        }
        if let Some(timeout_ms) = cli.timeout_ms {
            options.timeouts.remote_call_ms = timeout_ms;
        }
        if cli.dedupe_preferred {
            options.dedupe_preferred_model = true;
        }
        if cli.parallel_refinement {
            options.parallel_refinement = true;
        }

        options.validate().context("Invalid options")?;
        Ok(options)
    }

    /// Validate CLI arguments for consistency
    pub(crate) fn validate_cli(cli: &Cli) -> Result<()> {
        let url = cli.image_url.trim();
        if url.is_empty() {
            anyhow::bail!("IMAGE_URL must not be empty");
        }
        reqwest::Url::parse(url).with_context(|| format!("IMAGE_URL is not a valid URL: {}", url))?;

        if !cli.dry_run && cli.services.is_none() {
            anyhow::bail!("--services FILE is required unless --dry-run is set");
        }

        Ok(())
    }
}
