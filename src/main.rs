// SPDX-License-Identifier: GPL-3.0-only

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "viewfinder")]
#[command(about = "Single-shot still capture with viewport cropping")]
#[command(version = env!("GIT_VERSION"))]
struct Cli {
    /// Config file (default: <config dir>/viewfinder/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List available cameras
    List,

    /// Crop an existing image as if it had just been captured
    Crop {
        /// Encoded JPEG or PNG image
        #[arg(short, long)]
        input: PathBuf,

        /// Preview surface size, WIDTHxHEIGHT
        #[arg(short, long, value_parser = cli::parse_preview)]
        preview: viewfinder::backends::camera::PreviewSpec,

        /// Viewport in preview coordinates, LEFT,TOP,WIDTH,HEIGHT
        #[arg(short, long, value_parser = cli::parse_viewport)]
        viewport: viewfinder::pipelines::photo::ViewportRect,

        /// Output directory
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Run a full session on the virtual back camera and take one photo
    Capture {
        /// Image the virtual camera delivers (default: generated test pattern)
        #[arg(short, long)]
        still: Option<PathBuf>,

        /// Preview surface size, WIDTHxHEIGHT
        #[arg(short, long, value_parser = cli::parse_preview)]
        preview: viewfinder::backends::camera::PreviewSpec,

        /// Viewport in preview coordinates, LEFT,TOP,WIDTH,HEIGHT
        #[arg(short, long, value_parser = cli::parse_viewport)]
        viewport: viewfinder::pipelines::photo::ViewportRect,

        /// Output directory
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set RUST_LOG to control log level, e.g. RUST_LOG=viewfinder=debug
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();
    let config = cli::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::List => cli::list_cameras(),
        Commands::Crop {
            input,
            preview,
            viewport,
            output,
        } => cli::crop_image(&config, &input, preview, viewport, output),
        Commands::Capture {
            still,
            preview,
            viewport,
            output,
        } => cli::capture_photo(&config, still, preview, viewport, output),
    }
}
