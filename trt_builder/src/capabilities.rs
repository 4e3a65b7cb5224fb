//! What the host can do: optional external tools, and the GPU's fast paths.
//!
//! Everything here is probed once at startup and then passed around by value.

use tokio::process::Command;
use tracing::{debug, warn};

/// Optional external tools found on this host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// The ONNX schema checker can be imported.
    pub validation_available: bool,
    /// The model hub export command runs.
    pub hub_client_available: bool,
}

impl Capabilities {
    /// Probe only the tools this run will use; the rest are reported absent.
    pub async fn detect(
        python: &str,
        exporter: &str,
        need_validation: bool,
        need_hub: bool,
    ) -> Self {
        let validation_available =
            need_validation && command_succeeds(python, &["-c", "import onnx.checker"]).await;
        let hub_client_available = need_hub && command_succeeds(exporter, &["version"]).await;
        let caps = Capabilities {
            validation_available,
            hub_client_available,
        };
        debug!(?caps, "Detected capabilities");
        caps
    }
}

async fn command_succeeds(program: &str, args: &[&str]) -> bool {
    match Command::new(program).args(args).output().await {
        Ok(output) => output.status.success(),
        Err(e) => {
            debug!("Could not run {}: {}", program, e);
            false
        }
    }
}

/// Reduced precision fast paths reported by the platform.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlatformSupport {
    pub fast_fp16: bool,
    pub fast_int8: bool,
}

impl PlatformSupport {
    pub const NONE: PlatformSupport = PlatformSupport {
        fast_fp16: false,
        fast_int8: false,
    };

    /// Fast paths for a CUDA compute capability `major.minor`.
    ///
    /// sm_61 has dp4a but crippled half throughput, sm_60/62 the opposite.
    pub fn from_compute_capability(major: u32, minor: u32) -> Self {
        let cc = (major, minor);
        PlatformSupport {
            fast_fp16: matches!(cc, (5, 3) | (6, 0) | (6, 2)) || major >= 7,
            fast_int8: cc == (6, 1) || major >= 7,
        }
    }

    /// Fast paths of GPU 0, read from `nvidia-smi`. No GPU means no fast paths.
    pub async fn probe() -> Self {
        let output = Command::new("nvidia-smi")
            .args(["-i", "0", "--query-gpu=compute_cap", "--format=csv,noheader"])
            .output()
            .await;
        let stdout = match output {
            Ok(output) if output.status.success() => {
                String::from_utf8_lossy(&output.stdout).into_owned()
            }
            Ok(output) => {
                warn!(
                    "nvidia-smi failed: {}",
                    String::from_utf8_lossy(&output.stderr).trim()
                );
                return PlatformSupport::NONE;
            }
            Err(e) => {
                warn!("Could not run nvidia-smi: {}", e);
                return PlatformSupport::NONE;
            }
        };
        match parse_compute_capability(&stdout) {
            Some((major, minor)) => {
                debug!("GPU 0 compute capability {}.{}", major, minor);
                Self::from_compute_capability(major, minor)
            }
            None => {
                warn!("Unrecognised compute capability: {}", stdout.trim());
                PlatformSupport::NONE
            }
        }
    }
}

/// Parse `"8.6"` into `(8, 6)`.
pub fn parse_compute_capability(s: &str) -> Option<(u32, u32)> {
    let (major, minor) = s.lines().next()?.trim().split_once('.')?;
    Some((major.parse().ok()?, minor.parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_compute_capability() {
        assert_eq!(parse_compute_capability("8.6\n"), Some((8, 6)));
        assert_eq!(parse_compute_capability("7.5\n8.6\n"), Some((7, 5)));
        assert_eq!(parse_compute_capability("[N/A]"), None);
        assert_eq!(parse_compute_capability(""), None);
    }

    #[test]
    fn test_fast_paths_by_architecture() {
        // Maxwell
        assert_eq!(
            PlatformSupport::from_compute_capability(5, 2),
            PlatformSupport::NONE
        );
        // Jetson Nano
        let nano = PlatformSupport::from_compute_capability(5, 3);
        assert!(nano.fast_fp16 && !nano.fast_int8);
        // GTX 10 series
        let pascal = PlatformSupport::from_compute_capability(6, 1);
        assert!(!pascal.fast_fp16 && pascal.fast_int8);
        // Ampere
        let ampere = PlatformSupport::from_compute_capability(8, 6);
        assert!(ampere.fast_fp16 && ampere.fast_int8);
    }

    #[tokio::test]
    async fn test_missing_tools_are_unavailable() {
        let caps = Capabilities::detect(
            "trt-builder-no-such-python",
            "trt-builder-no-such-exporter",
            true,
            true,
        )
        .await;
        assert_eq!(caps, Capabilities::default());
    }

    #[tokio::test]
    async fn test_unneeded_tools_are_not_probed() {
        let caps = Capabilities::detect("python3", "yolo", false, false).await;
        assert!(!caps.validation_available);
        assert!(!caps.hub_client_available);
    }
}
