//! Engine build policy.
//!
//! The heavy lifting (ONNX parsing, kernel selection, serialization format) is
//! done by a [`Compiler`] backend. This module decides what to ask it for:
//! which precision the platform can honour, how large the workspace is, and
//! which dynamic shape profile to register.

use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::capabilities::PlatformSupport;
use crate::error::{BuildError, Result};
use crate::request::{bytes_to_mb, BuildRequest, Precision};

/// Dimension value a network uses for "unspecified".
pub const DYNAMIC_DIM: i64 = -1;

/// A network input or output as declared by the parsed model.
#[derive(Debug, Clone, PartialEq)]
pub struct TensorInfo {
    pub name: String,
    pub dims: Vec<i64>,
    pub data_type: String,
}

impl TensorInfo {
    pub fn has_dynamic_batch(&self) -> bool {
        self.dims.first() == Some(&DYNAMIC_DIM)
    }
}

impl fmt::Display for TensorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:?} {}", self.name, self.dims, self.data_type)
    }
}

/// The declared inputs and outputs of a parsed network.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NetworkSummary {
    pub inputs: Vec<TensorInfo>,
    pub outputs: Vec<TensorInfo>,
}

/// min/opt/max shapes of one input, batch first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapeProfile {
    pub input: String,
    pub min: Vec<i64>,
    pub opt: Vec<i64>,
    pub max: Vec<i64>,
}

/// What the compiler is asked to build.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildSettings {
    pub workspace_bytes: u64,
    pub precision: Precision,
    pub profile: Option<ShapeProfile>,
}

/// A serialized engine written to disk.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledEngine {
    pub path: PathBuf,
    pub size: u64,
    pub precision: Precision,
}

/// Backend that turns an ONNX file into a serialized engine.
///
/// `parse` is called once, before `build`. Implementations hold whatever
/// native resources they need between the two calls and release them when
/// dropped.
#[async_trait(?Send)]
pub trait Compiler {
    /// Reduced precision fast paths of the target device.
    async fn platform(&mut self) -> Result<PlatformSupport>;

    /// Parse the model. Parser diagnostics are returned in [`BuildError::ParseFailed`].
    async fn parse(&mut self, onnx_path: &Path) -> Result<NetworkSummary>;

    /// Compile the parsed network and return the serialized engine.
    async fn build(&mut self, settings: &BuildSettings) -> Result<Vec<u8>>;
}

/// Where a build currently is. Any stage may move to `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Parsing,
    Configuring,
    Building,
    Serializing,
    Done,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Idle => "idle",
            Stage::Parsing => "parsing",
            Stage::Configuring => "configuring",
            Stage::Building => "building",
            Stage::Serializing => "serializing",
            Stage::Done => "done",
            Stage::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// The precision actually compiled for, given what the platform supports.
pub fn select_precision(requested: Precision, platform: PlatformSupport) -> Precision {
    match requested {
        Precision::Fp16 if platform.fast_fp16 => {
            info!("FP16 mode enabled");
            Precision::Fp16
        }
        Precision::Fp16 => {
            warn!("FP16 not supported on this platform, falling back to FP32");
            Precision::Fp32
        }
        Precision::Int8 if platform.fast_int8 => {
            info!("INT8 mode enabled");
            warn!("INT8 requires a calibration dataset, use the calibration tool for best results");
            Precision::Int8
        }
        Precision::Int8 => {
            warn!("INT8 not supported on this platform, falling back to FP32");
            Precision::Fp32
        }
        Precision::Fp32 => {
            info!("FP32 mode enabled");
            Precision::Fp32
        }
    }
}

/// Profile for an input with a dynamic batch: batch 1 up to twice `max_batch`,
/// tuned for `max_batch`. Inputs with a fixed batch get no profile.
pub fn shape_profile(input: &TensorInfo, max_batch: u32) -> Option<ShapeProfile> {
    if !input.has_dynamic_batch() {
        debug!("Input {} has a fixed batch dimension", input.name);
        return None;
    }

    for (i, dim) in input.dims.iter().enumerate().skip(1) {
        if *dim == DYNAMIC_DIM {
            warn!(
                "Input {} has dynamic dimension {} which the profile does not cover",
                input.name, i
            );
        }
    }

    let with_batch = |batch: i64| {
        let mut dims = input.dims.clone();
        dims[0] = batch;
        dims
    };
    let max_batch = i64::from(max_batch);
    let profile = ShapeProfile {
        input: input.name.clone(),
        min: with_batch(1),
        opt: with_batch(max_batch),
        max: with_batch(max_batch * 2),
    };
    info!(
        "Dynamic shapes - Min: {:?}, Opt: {:?}, Max: {:?}",
        profile.min, profile.opt, profile.max
    );
    Some(profile)
}

/// Dimensions as `i32`, which is what native shape APIs take.
pub fn dims_i32(dims: &[i64]) -> Result<Vec<i32>> {
    dims.iter()
        .map(|d| {
            i32::try_from(*d).map_err(|_| {
                BuildError::BuildFailed(format!("dimension {d} does not fit in i32"))
            })
        })
        .collect()
}

/// Drives a [`Compiler`] through one build.
pub struct EngineBuilder<C> {
    compiler: C,
    stage: Stage,
}

impl<C: Compiler> EngineBuilder<C> {
    pub fn new(compiler: C) -> Self {
        EngineBuilder {
            compiler,
            stage: Stage::Idle,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn compiler(&self) -> &C {
        &self.compiler
    }

    fn enter(&mut self, next: Stage) {
        debug!("Build stage {} -> {}", self.stage, next);
        self.stage = next;
    }

    /// Build the engine described by `request` and write it to `request.output`.
    pub async fn build(&mut self, request: &BuildRequest) -> Result<CompiledEngine> {
        if self.stage != Stage::Idle {
            return Err(BuildError::Unexpected(format!(
                "engine builder reused in stage {}",
                self.stage
            )));
        }
        match self.run(request).await {
            Ok(engine) => {
                self.enter(Stage::Done);
                Ok(engine)
            }
            Err(e) => {
                error!("Engine build failed while {}: {}", self.stage, e);
                self.enter(Stage::Failed);
                Err(e)
            }
        }
    }

    async fn run(&mut self, request: &BuildRequest) -> Result<CompiledEngine> {
        self.enter(Stage::Parsing);
        info!("Parsing ONNX model: {}", request.input.display());
        let network = self
            .compiler
            .parse(&request.input)
            .await
            .inspect_err(|e| {
                if let BuildError::ParseFailed(errors) = e {
                    error!("Failed to parse ONNX model");
                    for err in errors {
                        error!("Parser error: {}", err);
                    }
                }
            })?;
        log_network(&network);

        self.enter(Stage::Configuring);
        info!("Workspace size: {} MB", bytes_to_mb(request.workspace_bytes));
        let platform = self.compiler.platform().await?;
        let precision = select_precision(request.precision, platform);
        let first_input = network
            .inputs
            .first()
            .ok_or_else(|| BuildError::BuildFailed("network declares no inputs".to_string()))?;
        let settings = BuildSettings {
            workspace_bytes: request.workspace_bytes,
            precision,
            profile: shape_profile(first_input, request.max_batch_size),
        };

        self.enter(Stage::Building);
        info!(
            "Building {} engine. This may take several minutes...",
            precision.as_str().to_uppercase()
        );
        let plan = self.compiler.build(&settings).await?;

        self.enter(Stage::Serializing);
        info!("Serializing engine to: {}", request.output.display());
        let size = write_engine(&request.output, &plan).await?;
        info!("Engine built successfully!");
        info!("Engine file size: {:.2} MB", size as f64 / (1024.0 * 1024.0));

        Ok(CompiledEngine {
            path: request.output.clone(),
            size,
            precision,
        })
    }
}

fn log_network(network: &NetworkSummary) {
    info!("Network inputs: {}", network.inputs.len());
    info!("Network outputs: {}", network.outputs.len());
    for (i, t) in network.inputs.iter().enumerate() {
        info!("Input {}: {}", i, t);
    }
    for (i, t) in network.outputs.iter().enumerate() {
        info!("Output {}: {}", i, t);
    }
}

/// Write the plan, creating parent directories. Returns the file size.
async fn write_engine(path: &Path, plan: &[u8]) -> Result<u64> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| BuildError::io(dir, e))?;
    }
    tokio::fs::write(path, plan)
        .await
        .map_err(|e| BuildError::io(path, e))?;
    let meta = tokio::fs::metadata(path)
        .await
        .map_err(|e| BuildError::io(path, e))?;
    Ok(meta.len())
}
