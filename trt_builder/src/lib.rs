//! # trt-builder
//!
//! Convert ONNX models into serialized TensorRT engines.
//!
//! A run resolves its arguments into a [`BuildRequest`], optionally exports the
//! model from the model hub and checks it with the ONNX checker, then hands it
//! to a [`Compiler`] backend under the precision and shape profile policy in
//! [`engine`].
//!
//! ```bash
//! trt-builder yolov8n --download --precision fp16 --batch-size 4
//! trt-builder model.onnx model.trt --precision fp32 --workspace 2048
//! ```

pub mod acquire;
pub mod capabilities;
pub mod cli;
pub mod engine;
pub mod error;
pub mod report;
pub mod request;
pub mod validate;

#[cfg(feature = "tensorrt")]
pub mod tensorrt;

use std::path::Path;

use async_trait::async_trait;

pub use acquire::ModelHub;
pub use capabilities::{Capabilities, PlatformSupport};
pub use engine::{
    BuildSettings, CompiledEngine, Compiler, EngineBuilder, NetworkSummary, ShapeProfile, Stage,
    TensorInfo,
};
pub use error::{BuildError, Result};
pub use request::{Args, BuildRequest, Precision};
pub use validate::SchemaChecker;

/// Stand-in backend for builds without the `tensorrt` feature.
#[derive(Debug, Default)]
pub struct NoCompiler;

impl NoCompiler {
    fn missing() -> BuildError {
        BuildError::DependencyMissing {
            tool: "TensorRT".to_string(),
            hint: "rebuild trt-builder with `--features tensorrt`".to_string(),
        }
    }
}

#[async_trait(?Send)]
impl Compiler for NoCompiler {
    async fn platform(&mut self) -> Result<PlatformSupport> {
        Err(Self::missing())
    }

    async fn parse(&mut self, _onnx_path: &Path) -> Result<NetworkSummary> {
        Err(Self::missing())
    }

    async fn build(&mut self, _settings: &BuildSettings) -> Result<Vec<u8>> {
        Err(Self::missing())
    }
}

#[cfg(feature = "tensorrt")]
pub fn default_compiler() -> tensorrt::TensorRt {
    tensorrt::TensorRt::new()
}

#[cfg(not(feature = "tensorrt"))]
pub fn default_compiler() -> NoCompiler {
    NoCompiler
}

/// One full run: resolve, acquire, validate, build.
pub async fn run<C: Compiler>(args: &Args, compiler: C) -> Result<CompiledEngine> {
    let caps = Capabilities::detect(&args.python, &args.exporter, args.validate, args.download).await;
    let hub = ModelHub::new(args.exporter.clone(), args.opset);
    let request = request::resolve(args, &hub, &caps).await?;

    if request.validate {
        SchemaChecker::new(args.python.clone())
            .check(&request.input, &caps)
            .await?;
    }

    report::log_settings(&request);
    let engine = EngineBuilder::new(compiler).build(&request).await?;
    report::log_completion(&engine);
    Ok(engine)
}
