//! Command line arguments and their resolution into a [`BuildRequest`].

use std::fmt;
use std::path::{Path, PathBuf};

use clap::{Parser, ValueEnum};
use tracing::{debug, error, info};

use crate::acquire::ModelHub;
use crate::capabilities::Capabilities;
use crate::error::{BuildError, Result};

/// Model names that expand to `<name>.onnx` and can be fetched from the model hub.
pub const MODEL_ALIASES: [&str; 5] = ["yolov8n", "yolov8s", "yolov8m", "yolov8l", "yolov8x"];

/// Model fetched when `--download` is given without an input.
pub const DEFAULT_MODEL: &str = "yolov8n";

pub const ENGINE_EXTENSION: &str = "trt";

const BYTES_PER_MB: u64 = 1024 * 1024;

/// Largest `--workspace` whose byte count fits in a `u64`.
pub const MAX_WORKSPACE_MB: u64 = u64::MAX / BYTES_PER_MB;

/// Largest `--batch-size`. The profile's max batch is twice this and must fit
/// the `i32` dimensions the compiler takes.
pub const MAX_BATCH_SIZE: u32 = (i32::MAX / 2) as u32;

/// `None` if the byte count does not fit in a `u64`.
pub fn mb_to_bytes(mb: u64) -> Option<u64> {
    mb.checked_mul(BYTES_PER_MB)
}

pub fn bytes_to_mb(bytes: u64) -> u64 {
    bytes / BYTES_PER_MB
}

/// Numeric precision of the compiled kernels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Precision {
    Fp32,
    Fp16,
    Int8,
}

impl Precision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Precision::Fp32 => "fp32",
            Precision::Fp16 => "fp16",
            Precision::Int8 => "int8",
        }
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Build a TensorRT engine from an ONNX model.
#[derive(Parser, Debug, Clone)]
#[command(name = "trt-builder", version, about, long_about = None)]
pub struct Args {
    /// Path to ONNX model (or model name to download)
    pub input: Option<String>,

    /// Output path for TensorRT engine
    pub output: Option<PathBuf>,

    /// Precision mode
    #[arg(long, value_enum, default_value_t = Precision::Fp16)]
    pub precision: Precision,

    /// Workspace size in MB
    #[arg(long, default_value_t = 1024, value_parser = clap::value_parser!(u64).range(1..=MAX_WORKSPACE_MB))]
    pub workspace: u64,

    /// Maximum batch size
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..=MAX_BATCH_SIZE as i64))]
    pub batch_size: u32,

    /// Download the model if not found
    #[arg(long, default_value_t = false)]
    pub download: bool,

    /// Enable verbose TensorRT logging
    #[arg(long, default_value_t = false)]
    pub verbose: bool,

    /// Validate ONNX model before conversion
    #[arg(long, default_value_t = false)]
    pub validate: bool,

    /// Python interpreter used for ONNX validation
    #[arg(long, env = "TRT_BUILDER_PYTHON", default_value_t = String::from("python3"))]
    pub python: String,

    /// Model hub export command
    #[arg(long, env = "TRT_BUILDER_EXPORTER", default_value_t = String::from("yolo"))]
    pub exporter: String,

    /// ONNX opset requested from the exporter
    #[arg(long, default_value_t = 11)]
    pub opset: u32,
}

/// Fully resolved parameters for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildRequest {
    pub input: PathBuf,
    pub output: PathBuf,
    pub precision: Precision,
    pub workspace_bytes: u64,
    pub max_batch_size: u32,
    pub validate: bool,
}

impl BuildRequest {
    pub fn workspace_mb(&self) -> u64 {
        bytes_to_mb(self.workspace_bytes)
    }
}

/// Returns `<alias>.onnx` for a known model alias.
pub fn expand_alias(token: &str) -> Option<PathBuf> {
    MODEL_ALIASES
        .contains(&token)
        .then(|| PathBuf::from(format!("{token}.onnx")))
}

/// `<dir>/<stem>_<precision>.trt`, next to the input.
pub fn default_output_path(input: &Path, precision: Precision) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("model");
    let name = format!("{stem}_{precision}.{ENGINE_EXTENSION}");
    match input.parent() {
        Some(dir) => dir.join(name),
        None => PathBuf::from(name),
    }
}

fn not_found(path: PathBuf) -> BuildError {
    error!("ONNX model not found: {}", path.display());
    info!("Use --download flag to automatically download YOLOv8 models");
    BuildError::InputNotFound(path)
}

/// Resolve the input model, fetching it from the hub when asked to.
async fn resolve_input(args: &Args, hub: &ModelHub, caps: &Capabilities) -> Result<PathBuf> {
    let token = match &args.input {
        Some(token) => token,
        None if args.download => return hub.acquire(DEFAULT_MODEL, caps).await,
        None => return Err(BuildError::Usage("no input model given".to_string())),
    };

    if let Some(expanded) = expand_alias(token) {
        debug!("Expanded model alias {} to {}", token, expanded.display());
        if expanded.exists() {
            return Ok(expanded);
        }
        if args.download {
            return hub.acquire(token, caps).await;
        }
        return Err(not_found(expanded));
    }

    Ok(PathBuf::from(token))
}

/// Turn parsed arguments into a [`BuildRequest`].
pub async fn resolve(args: &Args, hub: &ModelHub, caps: &Capabilities) -> Result<BuildRequest> {
    let input = resolve_input(args, hub, caps).await?;
    if !input.exists() {
        return Err(not_found(input));
    }

    if args.batch_size == 0 || args.batch_size > MAX_BATCH_SIZE {
        return Err(BuildError::Usage(format!(
            "--batch-size must be between 1 and {MAX_BATCH_SIZE}"
        )));
    }
    let workspace_bytes = mb_to_bytes(args.workspace).ok_or_else(|| {
        BuildError::Usage(format!("--workspace must be at most {MAX_WORKSPACE_MB} MB"))
    })?;

    let output = args
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(&input, args.precision));

    Ok(BuildRequest {
        input,
        output,
        precision: args.precision,
        workspace_bytes,
        max_batch_size: args.batch_size,
        validate: args.validate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(tokens: &[&str]) -> Args {
        let mut argv = vec!["trt-builder"];
        argv.extend_from_slice(tokens);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults() {
        let a = args(&["model.onnx"]);
        assert_eq!(a.precision, Precision::Fp16);
        assert_eq!(a.workspace, 1024);
        assert_eq!(a.batch_size, 1);
        assert!(!a.download && !a.verbose && !a.validate);
        assert_eq!(a.opset, 11);
        assert!(a.output.is_none());
    }

    #[test]
    fn test_rejects_unknown_precision() {
        assert!(Args::try_parse_from(["trt-builder", "m.onnx", "--precision", "fp8"]).is_err());
    }

    #[test]
    fn test_rejects_zero_workspace_and_batch() {
        assert!(Args::try_parse_from(["trt-builder", "m.onnx", "--workspace", "0"]).is_err());
        assert!(Args::try_parse_from(["trt-builder", "m.onnx", "--batch-size", "0"]).is_err());
    }

    #[test]
    fn test_alias_default_output() {
        for precision in [Precision::Fp32, Precision::Fp16, Precision::Int8] {
            for alias in MODEL_ALIASES {
                let input = expand_alias(alias).unwrap();
                assert_eq!(input, PathBuf::from(format!("{alias}.onnx")));
                let out = default_output_path(&input, precision);
                assert_eq!(out, PathBuf::from(format!("{alias}_{precision}.trt")));
            }
        }
    }

    #[test]
    fn test_unknown_alias_is_not_expanded() {
        assert!(expand_alias("yolov9n").is_none());
        assert!(expand_alias("yolov8n.onnx").is_none());
    }

    #[test]
    fn test_default_output_keeps_directory() {
        let out = default_output_path(Path::new("models/det/net.onnx"), Precision::Int8);
        assert_eq!(out, PathBuf::from("models/det/net_int8.trt"));
    }

    #[test]
    fn test_workspace_conversion() {
        assert_eq!(mb_to_bytes(2048), Some(2_147_483_648));
        for mb in [1, 512, 1024, 4096, MAX_WORKSPACE_MB] {
            let bytes = mb_to_bytes(mb).unwrap();
            assert_eq!(mb_to_bytes(bytes_to_mb(bytes)), Some(bytes));
        }
    }

    #[test]
    fn test_workspace_overflow() {
        assert_eq!(mb_to_bytes(1 << 44), None);
        assert_eq!(mb_to_bytes(MAX_WORKSPACE_MB + 1), None);
        let max = MAX_WORKSPACE_MB.to_string();
        assert_eq!(args(&["m.onnx", "--workspace", &max]).workspace, MAX_WORKSPACE_MB);
        let over = (MAX_WORKSPACE_MB + 1).to_string();
        assert!(Args::try_parse_from(["trt-builder", "m.onnx", "--workspace", &over]).is_err());
    }

    #[test]
    fn test_batch_size_bounds() {
        let max = MAX_BATCH_SIZE.to_string();
        assert_eq!(args(&["m.onnx", "--batch-size", &max]).batch_size, MAX_BATCH_SIZE);
        let over = (MAX_BATCH_SIZE + 1).to_string();
        assert!(Args::try_parse_from(["trt-builder", "m.onnx", "--batch-size", &over]).is_err());
        assert!(
            Args::try_parse_from(["trt-builder", "m.onnx", "--batch-size", "3000000000"]).is_err()
        );
        // Twice the largest batch still fits an i32 dimension.
        assert!(i32::try_from(2 * i64::from(MAX_BATCH_SIZE)).is_ok());
    }
}
