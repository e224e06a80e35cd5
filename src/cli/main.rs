//! Person Removal CLI Tool
//!
//! Command-line interface for removing background people from one image
//! using the unified processor.

use super::{config::CliConfigBuilder, progress::IndicatifProgressReporter};
use crate::{
    backends::{HttpServiceFactory, MockServiceFactory},
    config::{SceneContext, ServiceConfig},
    processor::{PersonRemovalProcessor, ServiceFactory},
    services::{ConsoleProgressReporter, ProgressReporter},
    tracing_config::{events, init_cli_tracing, spans, TracingFormat},
    types::PersonRemovalResult,
};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Remove background people from a photograph
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "imgly-rmpeople")]
#[allow(clippy::struct_excessive_bools)]
pub struct Cli {
    /// Public URL of the image to process
    #[arg(value_name = "IMAGE_URL")]
    pub image_url: String,

    /// JSON file describing the segmentation, detection and inpainting endpoints
    #[arg(short, long, value_name = "FILE", required_unless_present = "dry_run")]
    pub services: Option<PathBuf>,

    /// JSON file with pipeline options; flags below override its values
    #[arg(long, value_name = "FILE")]
    pub options: Option<PathBuf>,

    /// Number of highest-scoring people to keep
    #[arg(short, long, value_name = "N")]
    pub keep: Option<usize>,

    /// Inpainting back-end to try first
    #[arg(short, long, value_name = "NAME")]
    pub model: Option<String>,

    /// Custom inpainting prompt
    #[arg(short, long, value_name = "TEXT")]
    pub prompt: Option<String>,

    /// Scene hint added to the inpainting prompt
    #[arg(long, value_enum)]
    pub scene: Option<CliSceneContext>,

    /// Do not fall back to the box detector when segmentation fails
    #[arg(long)]
    pub no_fallback: bool,

    /// Total number of pipeline attempts (1-10)
    #[arg(long, value_name = "N")]
    pub max_retries: Option<u32>,

    /// Timeout for each remote call in milliseconds
    #[arg(long, value_name = "MS")]
    pub timeout_ms: Option<u64>,

    /// Do not retry the preferred model when walking the priority list
    #[arg(long)]
    pub dedupe_preferred: bool,

    /// Refine detector boxes concurrently
    #[arg(long)]
    pub parallel_refinement: bool,

    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,

    /// Use offline mock services instead of the configured endpoints
    #[arg(long)]
    pub dry_run: bool,

    /// Log output format
    #[arg(long, value_enum, default_value_t = CliLogFormat::Console)]
    pub log_format: CliLogFormat,

    /// Enable verbose logging (-v: DEBUG, -vv: TRACE, -vvv: TRACE including HTTP internals)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliSceneContext {
    Generic,
    Outdoor,
    Indoor,
    Crowd,
}

impl From<CliSceneContext> for SceneContext {
    fn from(scene: CliSceneContext) -> Self {
        match scene {
            CliSceneContext::Generic => SceneContext::Generic,
            CliSceneContext::Outdoor => SceneContext::Outdoor,
            CliSceneContext::Indoor => SceneContext::Indoor,
            CliSceneContext::Crowd => SceneContext::Crowd,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliLogFormat {
    Console,
    Compact,
    #[cfg(feature = "tracing-json")]
    Json,
}

impl From<CliLogFormat> for TracingFormat {
    fn from(format: CliLogFormat) -> Self {
        match format {
            CliLogFormat::Console => TracingFormat::Console,
            CliLogFormat::Compact => TracingFormat::Compact,
            #[cfg(feature = "tracing-json")]
            CliLogFormat::Json => TracingFormat::Json,
        }
    }
}

pub async fn main() -> Result<()> {
    let cli = Cli::parse();

    let session_id = init_cli_tracing(cli.verbose, cli.log_format.into())
        .context("Failed to initialize tracing")?;

    CliConfigBuilder::validate_cli(&cli).context("Invalid CLI arguments")?;
    let options = CliConfigBuilder::from_cli(&cli).context("Failed to build options")?;

    let factory: Box<dyn ServiceFactory> = if cli.dry_run {
        events::warning_with_recommendation(
            "Running against mock services, no remote calls will be made",
            "pass --services FILE to process the image for real",
        );
        Box::new(MockServiceFactory::new())
    } else {
        let path = cli
            .services
            .as_ref()
            .context("--services is required unless --dry-run is set")?;
        let config = ServiceConfig::from_file(path)
            .with_context(|| format!("Failed to load service config from {}", path.display()))?;
        Box::new(HttpServiceFactory::new(config, options.timeouts.remote_call()))
    };

    let reporter: Arc<dyn ProgressReporter> = if cli.json || cli.verbose > 0 {
        Arc::new(ConsoleProgressReporter::new(cli.verbose > 0))
    } else {
        Arc::new(IndicatifProgressReporter::new())
    };

    let processor = PersonRemovalProcessor::with_factory(factory.as_ref(), options)
        .context("Failed to create person removal processor")?
        .with_progress_reporter(reporter);

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            events::progress("Interrupted, cancelling", "🛑");
            on_interrupt.cancel();
        }
    });

    let session = spans::session(&session_id, &cli.image_url, &factory.description());
    let result = processor
        .run_with_cancellation(&cli.image_url, cancel)
        .instrument(session)
        .await;

    for (stage, ms) in [
        ("detection", result.timings.detection_ms),
        ("separation", result.timings.separation_ms),
        ("mask_generation", result.timings.mask_generation_ms),
        ("inpainting", result.timings.inpainting_ms),
        ("validation", result.timings.validation_ms),
    ] {
        events::stage_timing(stage, ms);
    }

    if cli.json {
        let json = serde_json::to_string_pretty(&result).context("Failed to serialize result")?;
        println!("{}", json);
    } else {
        print_summary(&result);
    }

    if !result.success {
        let message = result.error.as_deref().unwrap_or("unknown error");
        events::error_with_context(&message, "person removal");
        anyhow::bail!("Person removal failed after {} attempt(s): {}", result.attempts, message);
    }

    Ok(())
}

fn print_summary(result: &PersonRemovalResult) {
    let details = &result.details;
    if result.success {
        println!("✅ Result: {}", result.result_url.as_deref().unwrap_or_default());
    } else {
        println!("❌ Failed: {}", result.error.as_deref().unwrap_or_default());
    }
    println!(
        "   People: {} detected, {} kept, {} removed",
        details.people_detected, details.foreground_people, details.background_people
    );
    if !details.model_used.is_empty() {
        println!("   Detection: {}", details.model_used);
    }
    if !details.inpainting_model.is_empty() {
        println!("   Inpainting: {}", details.inpainting_model);
    }
    println!(
        "   Time: {}ms over {} attempt(s)",
        result.processing_time, result.attempts
    );
}
