//! IMG.LY Person Removal CLI Tool
//!
//! Command-line interface for removing background people from photographs
//! using remotely hosted segmentation and inpainting services.

#[cfg(feature = "cli")]
use imgly_person_removal::cli;

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::main().await
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI feature not enabled. Please rebuild with --features cli");
    std::process::exit(2);
}
