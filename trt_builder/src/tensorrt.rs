//! [`Compiler`] backed by TensorRT through `async_tensorrt`.

use std::path::Path;

use async_trait::async_trait;
use async_tensorrt::{
    Builder, NetworkDefinition, NetworkDefinitionCreationFlags, Parser, Tensor,
};
use tracing::debug;

use crate::capabilities::PlatformSupport;
use crate::engine::{dims_i32, BuildSettings, Compiler, NetworkSummary, TensorInfo};
use crate::error::{BuildError, Result};
use crate::request::Precision;

/// Native handles that live from parse to build.
///
/// Fields drop in declaration order, so the network goes before the builder
/// that created it.
struct Session {
    network: NetworkDefinition,
    builder: Builder,
}

#[derive(Default)]
pub struct TensorRt {
    session: Option<Session>,
}

impl TensorRt {
    pub fn new() -> Self {
        Self::default()
    }
}

fn tensor_info(tensor: &Tensor) -> TensorInfo {
    TensorInfo {
        name: tensor.name(),
        dims: tensor.dimensions().iter().map(|d| i64::from(*d)).collect(),
        data_type: format!("{:?}", tensor.data_type()),
    }
}

fn build_failed(e: async_tensorrt::Error) -> BuildError {
    BuildError::BuildFailed(e.to_string())
}

#[async_trait(?Send)]
impl Compiler for TensorRt {
    async fn platform(&mut self) -> Result<PlatformSupport> {
        Ok(PlatformSupport::probe().await)
    }

    async fn parse(&mut self, onnx_path: &Path) -> Result<NetworkSummary> {
        let mut builder = Builder::new().await.map_err(build_failed)?;
        let network = builder.network_definition(NetworkDefinitionCreationFlags::ExplicitBatchSize);
        let network = Parser::parse_network_definition_from_file(network, &onnx_path)
            .map_err(|e| BuildError::ParseFailed(vec![e.to_string()]))?;

        let summary = NetworkSummary {
            inputs: network.inputs().iter().map(tensor_info).collect(),
            outputs: network.outputs().iter().map(tensor_info).collect(),
        };
        self.session = Some(Session { network, builder });
        Ok(summary)
    }

    async fn build(&mut self, settings: &BuildSettings) -> Result<Vec<u8>> {
        // Taking the session releases every handle when this call returns.
        let Session {
            mut network,
            mut builder,
        } = self
            .session
            .take()
            .ok_or_else(|| BuildError::BuildFailed("no parsed network".to_string()))?;

        let mut profile = builder.optimization_profile().map_err(build_failed)?;
        if let Some(p) = &settings.profile {
            profile
                .set_shape(
                    &p.input,
                    &dims_i32(&p.min)?,
                    &dims_i32(&p.opt)?,
                    &dims_i32(&p.max)?,
                )
                .map_err(build_failed)?;
        }
        builder.add_optimization_profile(profile).map_err(build_failed)?;

        let mut config = builder
            .config()
            .await
            .with_max_workspace_size(settings.workspace_bytes as usize);
        config = match settings.precision {
            Precision::Fp16 => config.with_fp16(),
            Precision::Int8 => config.with_int8(),
            Precision::Fp32 => config,
        };
        debug!("Builder configured for {}", settings.precision);

        let plan = builder
            .build_serialized_network(&mut network, config)
            .await
            .map_err(build_failed)?;
        Ok(plan.as_bytes().to_vec())
    }
}
