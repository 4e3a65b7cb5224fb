//! Errors that end a build run.

use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, BuildError>;

/// Every way a run can fail. All of them are terminal for the run.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// Bad or missing command line arguments.
    #[error("usage error: {0}")]
    Usage(String),

    /// The ONNX model does not exist on disk.
    #[error("ONNX model not found: {}", .0.display())]
    InputNotFound(PathBuf),

    /// An optional external tool or library is not installed.
    #[error("{tool} not found: {hint}")]
    DependencyMissing { tool: String, hint: String },

    /// The model hub could not export the model to ONNX.
    #[error("failed to export model '{model}': {detail}")]
    ExportFailed { model: String, detail: String },

    /// The schema checker rejected the ONNX file.
    #[error("ONNX model validation failed: {0}")]
    ValidationFailed(String),

    /// The ONNX parser reported errors.
    #[error("failed to parse ONNX model ({} parser errors)", .0.len())]
    ParseFailed(Vec<String>),

    /// The compiler returned no engine.
    #[error("failed to build engine: {0}")]
    BuildFailed(String),

    #[error("I/O error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Catch-all for faults nothing else handled, such as a panic in the pipeline.
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl BuildError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BuildError::Io {
            path: path.into(),
            source,
        }
    }

    /// Process exit code for this failure.
    pub fn exit_code(&self) -> u8 {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_not_found_message() {
        let e = BuildError::InputNotFound(PathBuf::from("yolov8n.onnx"));
        assert_eq!(e.to_string(), "ONNX model not found: yolov8n.onnx");
    }

    #[test]
    fn test_parse_failed_counts_errors() {
        let e = BuildError::ParseFailed(vec!["a".into(), "b".into()]);
        assert!(e.to_string().contains("2 parser errors"));
    }

    #[test]
    fn test_every_failure_exits_with_one() {
        let errors = [
            BuildError::Usage("x".into()),
            BuildError::ValidationFailed("x".into()),
            BuildError::BuildFailed("x".into()),
            BuildError::Unexpected("x".into()),
        ];
        for e in errors {
            assert_eq!(e.exit_code(), 1);
        }
    }
}
