//! Image format detection and conversion to ISO
//!
//! Conversion itself is delegated to an external tool per source format;
//! this module batches the work, classifies failures and reports the
//! produced `.iso` files so they can be indexed.

use super::batch::{run_batch, BatchCounters, BatchReport, ItemContext, ItemResult, OperationKind};
use crate::cancel::CancelFlag;
use crate::error::{OpError, OpResult, WorkerError};
use crate::pool::WorkerPool;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// How often a running converter is checked for exit or cancellation
const CONVERTER_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Disc image formats known to the tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum ImageFormat {
    Iso,
    Bin,
    Img,
    Mdf,
    Nrg,
}

impl ImageFormat {
    /// Match a file extension, ignoring case
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "iso" => Some(ImageFormat::Iso),
            "bin" => Some(ImageFormat::Bin),
            "img" => Some(ImageFormat::Img),
            "mdf" => Some(ImageFormat::Mdf),
            "nrg" => Some(ImageFormat::Nrg),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Iso => "iso",
            ImageFormat::Bin => "bin",
            ImageFormat::Img => "img",
            ImageFormat::Mdf => "mdf",
            ImageFormat::Nrg => "nrg",
        }
    }

    /// Formats searched together with this one
    pub fn family(&self) -> &'static [ImageFormat] {
        match self {
            ImageFormat::Bin | ImageFormat::Img => &[ImageFormat::Bin, ImageFormat::Img],
            ImageFormat::Iso => &[ImageFormat::Iso],
            ImageFormat::Mdf => &[ImageFormat::Mdf],
            ImageFormat::Nrg => &[ImageFormat::Nrg],
        }
    }

    pub fn is_convertible(&self) -> bool {
        !matches!(self, ImageFormat::Iso)
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.extension().to_ascii_uppercase())
    }
}

/// Path the converted image is written to
pub fn output_path(input: &Path) -> PathBuf {
    input.with_extension("iso")
}

/// Turns one image into an ISO
pub trait Converter: Send + Sync {
    /// Whether inputs of `format` can be handled
    fn supports(&self, format: ImageFormat) -> bool;

    /// Convert `input` into `output`
    ///
    /// On failure or cancellation no partial `output` may be left behind.
    fn convert(&self, input: &Path, output: &Path, cancel: &CancelFlag) -> OpResult<()>;
}

/// Runs `ccd2iso`, `mdf2iso` or `nrg2iso` as a child process
#[derive(Debug, Clone, Default)]
pub struct ExternalConverter;

impl ExternalConverter {
    pub fn program_for(format: ImageFormat) -> Option<&'static str> {
        match format {
            ImageFormat::Bin | ImageFormat::Img => Some("ccd2iso"),
            ImageFormat::Mdf => Some("mdf2iso"),
            ImageFormat::Nrg => Some("nrg2iso"),
            ImageFormat::Iso => None,
        }
    }
}

impl Converter for ExternalConverter {
    fn supports(&self, format: ImageFormat) -> bool {
        Self::program_for(format).is_some()
    }

    fn convert(&self, input: &Path, output: &Path, cancel: &CancelFlag) -> OpResult<()> {
        let input_str = input.to_string_lossy().into_owned();
        let program = ImageFormat::from_path(input)
            .and_then(Self::program_for)
            .ok_or_else(|| OpError::UnsupportedFormat { path: input_str.clone() })?;

        let mut child = Command::new(program)
            .arg(input)
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| OpError::ConverterFailed {
                path: input_str.clone(),
                reason: if e.kind() == io::ErrorKind::NotFound {
                    format!("'{}' not found in PATH", program)
                } else {
                    e.to_string()
                },
            })?;

        debug!(program, input = %input.display(), "Converter started");

        loop {
            match child.try_wait() {
                Ok(Some(status)) if status.success() && output.exists() => return Ok(()),
                Ok(Some(status)) => {
                    remove_partial(output);
                    return Err(OpError::ConverterFailed {
                        path: input_str,
                        reason: format!("{} exited with {}", program, status),
                    });
                }
                Ok(None) if cancel.is_cancelled() => {
                    if let Err(e) = child.kill() {
                        warn!(program, error = %e, "Failed to kill converter");
                    }
                    let _ = child.wait();
                    remove_partial(output);
                    return Err(OpError::Cancelled { path: input_str });
                }
                Ok(None) => thread::sleep(CONVERTER_POLL_INTERVAL),
                Err(e) => {
                    let _ = child.kill();
                    remove_partial(output);
                    return Err(OpError::ConverterFailed {
                        path: input_str,
                        reason: e.to_string(),
                    });
                }
            }
        }
    }
}

fn remove_partial(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "Removed partial output"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove partial output"),
    }
}

/// Convert every input on the pool
pub fn convert_batch(
    pool: &WorkerPool,
    inputs: Vec<String>,
    converter: Arc<dyn Converter>,
    overwrite: bool,
    cancel: &CancelFlag,
    counters: &Arc<BatchCounters>,
) -> Result<BatchReport, WorkerError> {
    run_batch(pool, OperationKind::Convert, inputs, cancel, counters, move |input, ctx| {
        convert_one(converter.as_ref(), input, overwrite, ctx)
    })
}

fn convert_one(converter: &dyn Converter, input: &str, overwrite: bool, ctx: &ItemContext<'_>) -> ItemResult {
    let path = Path::new(input);
    if !path.is_file() {
        return ItemResult::error(input, OpError::SourceMissing { path: input.to_string() });
    }

    let format = match ImageFormat::from_path(path) {
        Some(format) if format.is_convertible() && converter.supports(format) => format,
        _ => return ItemResult::error(input, OpError::UnsupportedFormat { path: input.to_string() }),
    };

    let output = output_path(path);
    let output_str = output.to_string_lossy().into_owned();
    if output.exists() && !overwrite {
        return ItemResult::error(input, OpError::FileExists { path: output_str });
    }

    debug!(input, format = %format, "Converting");

    match converter.convert(path, &output, ctx.cancel) {
        Ok(()) => {
            let size = fs::metadata(&output).map(|m| m.len()).unwrap_or(0);
            ctx.counters.add_bytes(size);
            ItemResult::success(input, format!("Converted '{}' to '{}'", input, output_str))
                .with_created(vec![output_str])
        }
        Err(reason) => ItemResult::error(input, reason),
    }
}
