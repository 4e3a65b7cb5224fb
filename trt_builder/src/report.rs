//! Progress reporting: the tracing subscriber and the banners around a build.

use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::engine::CompiledEngine;
use crate::request::BuildRequest;

const RULE: &str = "============================================================";

/// Default filter. TensorRT messages go through the bindings' own target.
pub fn filter_directives(verbose: bool) -> &'static str {
    if verbose {
        "warn,trt_builder=debug,async_tensorrt=trace"
    } else {
        "warn,trt_builder=info,async_tensorrt=warn"
    }
}

/// Install the process-wide subscriber. `RUST_LOG` overrides the defaults.
pub fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directives(verbose)));
    // Only fails if a subscriber is already installed, which is fine.
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

pub fn log_settings(request: &BuildRequest) {
    info!("{}", RULE);
    info!("Building TensorRT engine with following settings:");
    info!("  ONNX model: {}", request.input.display());
    info!("  Engine output: {}", request.output.display());
    info!("  Precision: {}", request.precision.as_str().to_uppercase());
    info!("  Workspace: {} MB", request.workspace_mb());
    info!("  Max batch size: {}", request.max_batch_size);
    info!("{}", RULE);
}

pub fn log_completion(engine: &CompiledEngine) {
    info!("{}", RULE);
    info!("Engine build completed successfully!");
    info!("Engine saved to: {}", engine.path.display());
    info!("Compiled precision: {}", engine.precision.as_str().to_uppercase());
    info!("You can now use this engine with the DeepDetect plugin:");
    info!("  deepdetect engine-path={}", engine.path.display());
    info!("{}", RULE);
}
