//! Runs one CLI invocation and maps its outcome to a process exit code.

use std::path::PathBuf;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use thiserror::Error;

use crate::buffer::PixelBuffer;
use crate::config::{ApplyArgs, Cli, Command, CommonArgs};
use crate::engine::SegmentationEngine;
use crate::errors::SegError;
use crate::image_processor::save_rgba;
use crate::native::NativeLibrary;
use crate::traits::SegmentationBackend;

pub const EXIT_SUCCESS: u8 = 0;
/// Reported by clap itself for missing or blank required arguments.
pub const EXIT_USAGE: u8 = 2;
pub const EXIT_FAILURE: u8 = 5;
pub const EXIT_INVALID_BG_COLOR: u8 = 6;
pub const EXIT_BG_IMAGE_NOT_FOUND: u8 = 7;

#[derive(Error, Debug)]
pub enum DriverError {
    #[error("Invalid --bg-color format {0:?}. Use r,g,b (e.g., 255,255,255)")]
    InvalidBackgroundColor(String),

    #[error(transparent)]
    Segmentation(#[from] SegError),
}

impl DriverError {
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::InvalidBackgroundColor(_) => EXIT_INVALID_BG_COLOR,
            Self::Segmentation(SegError::BackgroundFileNotFound { .. }) => EXIT_BG_IMAGE_NOT_FOUND,
            Self::Segmentation(_) => EXIT_FAILURE,
        }
    }
}

/// Background requested on the `apply` command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackgroundChoice {
    Color([u8; 3]),
    Image(PathBuf),
}

/// Parses `r,g,b`. Commas and spaces both separate components.
pub fn parse_bg_color(s: &str) -> Option<[u8; 3]> {
    let parts: Vec<&str> = s
        .split(|c: char| c == ',' || c == ' ')
        .filter(|part| !part.is_empty())
        .collect();
    match parts.as_slice() {
        [r, g, b] => Some([r.parse().ok()?, g.parse().ok()?, b.parse().ok()?]),
        _ => None,
    }
}

impl ApplyArgs {
    /// Color wins over image; neither means black. Checked before any
    /// native module is loaded.
    pub fn background(&self) -> Result<BackgroundChoice, DriverError> {
        if let Some(color) = self.bg_color.as_deref().filter(|c| !c.is_empty()) {
            return parse_bg_color(color)
                .map(BackgroundChoice::Color)
                .ok_or_else(|| DriverError::InvalidBackgroundColor(color.to_string()));
        }

        if let Some(image) = self.bg_image.as_ref().filter(|p| !p.as_os_str().is_empty()) {
            if !image.is_file() {
                return Err(SegError::BackgroundFileNotFound {
                    path: image.clone(),
                }
                .into());
            }
            return Ok(BackgroundChoice::Image(image.clone()));
        }

        tracing::warn!("No background specified. Using black.");
        Ok(BackgroundChoice::Color([0, 0, 0]))
    }
}

/// Opens the real native module, honouring `--native-lib`.
pub fn open_native(cli: &Cli) -> crate::Result<NativeLibrary> {
    match &cli.native_lib {
        Some(path) => NativeLibrary::load_from(path),
        None => NativeLibrary::load(),
    }
}

/// Executes `cli` and returns the exit code. `open_backend` is only called
/// once every argument has been validated.
pub fn run<B, F>(cli: &Cli, open_backend: F) -> u8
where
    B: SegmentationBackend,
    F: FnOnce(&Cli) -> crate::Result<B>,
{
    match execute(cli, open_backend) {
        Ok(()) => EXIT_SUCCESS,
        Err(err) => {
            let code = err.exit_code();
            tracing::error!(exit_code = code, "{:#}", anyhow::Error::from(err));
            code
        }
    }
}

fn execute<B, F>(cli: &Cli, open_backend: F) -> Result<(), DriverError>
where
    B: SegmentationBackend,
    F: FnOnce(&Cli) -> crate::Result<B>,
{
    match &cli.command {
        Command::Mask(args) => {
            tracing::info!(
                input = %args.input.display(),
                output = %args.output.display(),
                "Generating mask"
            );
            let options = args.model_options()?;
            let backend = open_backend(cli)?;
            let mask = with_spinner("Segmenting", || {
                SegmentationEngine::with_session(backend, &args.model, &options, |engine| {
                    engine.segment(&args.input)
                })
            })?;
            save_output(args, &mask)?;
            tracing::info!(output = %args.output.display(), "Successfully saved mask");
        }
        Command::Apply(args) => {
            let common = &args.common;
            tracing::info!(
                input = %common.input.display(),
                output = %common.output.display(),
                "Applying background"
            );
            let background = args.background()?;
            let options = common.model_options()?;
            let backend = open_backend(cli)?;
            let result = with_spinner("Compositing", || {
                SegmentationEngine::with_session(backend, &common.model, &options, |engine| {
                    match &background {
                        BackgroundChoice::Color([r, g, b]) => {
                            tracing::info!("Using background color: {r},{g},{b}");
                            engine.recolor_background(&common.input, *r, *g, *b)
                        }
                        BackgroundChoice::Image(path) => {
                            tracing::info!("Using background image: {}", path.display());
                            engine.replace_background_image(&common.input, path)
                        }
                    }
                })
            })?;
            save_output(common, &result)?;
            tracing::info!(output = %common.output.display(), "Successfully saved result");
        }
    }
    Ok(())
}

fn save_output(args: &CommonArgs, pixels: &PixelBuffer) -> crate::Result<()> {
    save_rgba(&args.output, pixels)
}

/// Shows a spinner on stderr while `f` blocks. Hidden when stderr is not a
/// terminal.
fn with_spinner<T>(message: &'static str, f: impl FnOnce() -> T) -> T {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.green} [{elapsed}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(message);
    spinner.enable_steady_tick(Duration::from_millis(100));
    let result = f();
    spinner.finish_and_clear();
    result
}
