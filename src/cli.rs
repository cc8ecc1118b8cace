// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands for camera operations
//!
//! This module provides command-line functionality for:
//! - Listing available cameras
//! - Cropping an existing image through the still pipeline
//! - Running one full capture session on the virtual camera

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use viewfinder::Config;
use viewfinder::backends::camera::{CameraBackend, PreviewSpec, RawFrame};
use viewfinder::backends::virtual_camera::{
    StillSource, VirtualCameraBackend, VirtualCameraConfig, load_still_file, still_dimensions,
};
use viewfinder::pipelines::photo::{FrameProcessor, PhotoPipeline, ViewportRect};
use viewfinder::session::SessionController;
use viewfinder::storage::FileHandoff;

type CliResult = Result<(), Box<dyn std::error::Error>>;

pub fn parse_preview(value: &str) -> Result<PreviewSpec, String> {
    PreviewSpec::parse(value).ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{}'", value))
}

pub fn parse_viewport(value: &str) -> Result<ViewportRect, String> {
    ViewportRect::parse(value)
        .ok_or_else(|| format!("expected LEFT,TOP,WIDTH,HEIGHT, got '{}'", value))
}

/// Explicit config file, or the default location with fallback to defaults
pub fn load_config(path: Option<&Path>) -> Result<Config, Box<dyn std::error::Error>> {
    match path {
        Some(path) => Ok(Config::load(path)?),
        None => Ok(Config::load_or_default()),
    }
}

fn pipeline_for(config: &Config, output: Option<PathBuf>) -> (PhotoPipeline, PathBuf) {
    let output_dir = output.unwrap_or_else(|| config.output_dir());
    let handoff = Arc::new(FileHandoff::new(&output_dir, config.file_naming.clone()));
    let processor = FrameProcessor::new(config.processor_options());
    (PhotoPipeline::new(processor, handoff), output_dir)
}

/// List all available cameras
pub fn list_cameras() -> CliResult {
    let backend = VirtualCameraBackend::default();
    let cameras = backend.enumerate_cameras();

    if cameras.is_empty() {
        println!("No cameras found.");
        return Ok(());
    }

    println!("Available cameras:");
    println!();
    for camera in &cameras {
        println!("  [{}] {} ({})", camera.id, camera.name, camera.facing);
    }

    Ok(())
}

/// Run the still pipeline on an existing image file
pub fn crop_image(
    config: &Config,
    input: &Path,
    preview: PreviewSpec,
    viewport: ViewportRect,
    output: Option<PathBuf>,
) -> CliResult {
    let still = load_still_file(input)?;
    if let Some((width, height)) = still_dimensions(&still) {
        println!("Input: {} ({}x{})", input.display(), width, height);
    }

    let (pipeline, output_dir) = pipeline_for(config, output);
    println!("Output directory: {}", output_dir.display());

    let start = Instant::now();
    let frame = RawFrame::new(still.data, still.format);
    let reference = pipeline.run(frame, preview, viewport)?;

    println!("Saved: {}", reference);
    println!("Processing took {:.2?}", start.elapsed());
    Ok(())
}

/// Open the virtual camera, start the preview, capture once and close
pub fn capture_photo(
    config: &Config,
    still: Option<PathBuf>,
    preview: PreviewSpec,
    viewport: ViewportRect,
    output: Option<PathBuf>,
) -> CliResult {
    let mut camera_config = VirtualCameraConfig::default();
    if let Some(path) = still {
        camera_config.still = StillSource::File(path);
    }
    let backend = Arc::new(VirtualCameraBackend::new(camera_config));
    let (pipeline, output_dir) = pipeline_for(config, output);

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let controller = SessionController::spawn(backend, pipeline, config.session_config());

        let camera = controller.start(config.facing, preview).await?;
        println!("Using camera: {}", camera);
        println!("Preview: {}", preview);

        let start = Instant::now();
        let result = controller.capture(viewport).await;
        controller.shutdown().await;

        let reference = result?;
        println!("Saved: {}", reference);
        println!("Output directory: {}", output_dir.display());
        println!("Capture took {:.2?}", start.elapsed());
        Ok::<_, Box<dyn std::error::Error>>(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_preview() {
        assert_eq!(parse_preview("1080x1920"), Ok(PreviewSpec::new(1080, 1920)));
        assert!(parse_preview("0x10").is_err());
        assert!(parse_preview("wide").is_err());
    }

    #[test]
    fn test_parse_viewport() {
        assert_eq!(
            parse_viewport("1,2,3,4"),
            Ok(ViewportRect::new(1, 2, 3, 4))
        );
        assert!(parse_viewport("1,2").is_err());
    }
}
