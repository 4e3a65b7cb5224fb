//! Fetch pretrained models from the model hub and export them to ONNX.

use std::path::PathBuf;

use tokio::process::Command;
use tracing::{error, info};

use crate::capabilities::Capabilities;
use crate::error::{BuildError, Result};

/// The model hub export command, e.g. the ultralytics `yolo` CLI.
#[derive(Debug, Clone)]
pub struct ModelHub {
    program: String,
    opset: u32,
}

impl ModelHub {
    pub fn new(program: impl Into<String>, opset: u32) -> Self {
        ModelHub {
            program: program.into(),
            opset,
        }
    }

    /// Command line exporting `<model>.pt` to ONNX with a dynamic batch dimension.
    pub fn export_args(&self, model: &str) -> Vec<String> {
        vec![
            "export".to_string(),
            format!("model={model}.pt"),
            "format=onnx".to_string(),
            "dynamic=True".to_string(),
            "simplify=True".to_string(),
            format!("opset={}", self.opset),
        ]
    }

    /// Path to `<model>.onnx`, exporting it first if it is not on disk.
    pub async fn acquire(&self, model: &str, caps: &Capabilities) -> Result<PathBuf> {
        let onnx_path = PathBuf::from(format!("{model}.onnx"));
        if onnx_path.exists() {
            info!("Model already exists: {}", onnx_path.display());
            return Ok(onnx_path);
        }

        if !caps.hub_client_available {
            error!(
                "{} not found. Please install with: pip install ultralytics",
                self.program
            );
            error!("Or manually download the ONNX model and provide the path");
            return Err(BuildError::DependencyMissing {
                tool: self.program.clone(),
                hint: "pip install ultralytics".to_string(),
            });
        }

        info!("Downloading {}...", onnx_path.display());
        let output = Command::new(&self.program)
            .args(self.export_args(model))
            .output()
            .await
            .map_err(|e| self.export_failed(model, e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(self.export_failed(model, stderr.trim().to_string()));
        }
        if !onnx_path.exists() {
            return Err(self.export_failed(
                model,
                format!("exporter did not produce {}", onnx_path.display()),
            ));
        }

        info!("Model exported to: {}", onnx_path.display());
        Ok(onnx_path)
    }

    fn export_failed(&self, model: &str, detail: String) -> BuildError {
        error!("Failed to download/export model: {}", detail);
        BuildError::ExportFailed {
            model: model.to_string(),
            detail,
        }
    }
}
