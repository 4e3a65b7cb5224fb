//! Best-effort structural check of an ONNX file with the `onnx` checker.

use std::path::Path;

use tokio::process::Command;
use tracing::{error, info, warn};

use crate::capabilities::Capabilities;
use crate::error::{BuildError, Result};

const CHECK_SCRIPT: &str = "import sys, onnx; onnx.checker.check_model(onnx.load(sys.argv[1]))";

/// Runs `onnx.checker` through a Python interpreter.
#[derive(Debug, Clone)]
pub struct SchemaChecker {
    python: String,
}

impl SchemaChecker {
    pub fn new(python: impl Into<String>) -> Self {
        SchemaChecker {
            python: python.into(),
        }
    }

    /// Ok when the model passes, or when the checker is not installed.
    pub async fn check(&self, onnx_path: &Path, caps: &Capabilities) -> Result<()> {
        if !caps.validation_available {
            warn!("ONNX package not found, skipping model validation");
            return Ok(());
        }

        let output = Command::new(&self.python)
            .arg("-c")
            .arg(CHECK_SCRIPT)
            .arg(onnx_path)
            .output()
            .await
            .map_err(|e| BuildError::ValidationFailed(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            // The checker's own message is the last line of the traceback.
            let detail = stderr
                .lines()
                .rev()
                .find(|l| !l.trim().is_empty())
                .unwrap_or("checker exited with an error")
                .trim()
                .to_string();
            error!("ONNX model validation failed: {}", detail);
            return Err(BuildError::ValidationFailed(detail));
        }

        info!("ONNX model validation passed: {}", onnx_path.display());
        Ok(())
    }
}
