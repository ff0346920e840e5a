//! Apply one layer to every timestep of a sequence
//!
//! A sequence is a `[depth, length, ..]` tensor of nodes; axis 1 is time.
//! The wrapped layer is built once per timestep under a single parameter
//! scope. The first timestep resolves parameters with the caller's [`Reuse`]
//! policy and every later timestep requires them, so all timesteps run on the
//! same weights and a gradient step updates them with the sum of every
//! timestep's contribution. A build that fails at any timestep leaves the
//! injector without the parameters it created.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    node::SharedNode,
    param::{summarize, NamedParams, ParamInjection, Reuse},
    tensor::{OwnedShape, Tensor, TensorError},
};

use super::LayerError;

pub const TIME_AXIS: usize = 1;

/// A layer that can be rebuilt for each timestep
pub trait TimestepLayer {
    /// Names the parameter scope of the layer
    fn name(&self) -> &str;

    fn build(
        &self,
        inputs: Vec<SharedNode>,
        param_injection: ParamInjection<'_>,
    ) -> Result<Vec<SharedNode>, LayerError>;
}

/// A [`TimestepLayer`] backed by a closure
pub struct FnLayer<F> {
    name: String,
    build: F,
}
impl<F> FnLayer<F>
where
    F: Fn(Vec<SharedNode>, ParamInjection<'_>) -> Result<Vec<SharedNode>, LayerError>,
{
    pub fn new(name: impl Into<String>, build: F) -> Self {
        Self {
            name: name.into(),
            build,
        }
    }
}
impl<F> TimestepLayer for FnLayer<F>
where
    F: Fn(Vec<SharedNode>, ParamInjection<'_>) -> Result<Vec<SharedNode>, LayerError>,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn build(
        &self,
        inputs: Vec<SharedNode>,
        param_injection: ParamInjection<'_>,
    ) -> Result<Vec<SharedNode>, LayerError> {
        (self.build)(inputs, param_injection)
    }
}
impl<F> core::fmt::Debug for FnLayer<F> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FnLayer").field("name", &self.name).finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeDistributedConfig {
    pub name: String,
}
impl Default for TimeDistributedConfig {
    fn default() -> Self {
        Self {
            name: "time_distributed".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum SequenceInput {
    /// `[depth, length, ..]`
    Packed(Tensor<SharedNode>),
    /// one node vector per timestep
    Steps(Vec<Vec<SharedNode>>),
}
impl From<Tensor<SharedNode>> for SequenceInput {
    fn from(value: Tensor<SharedNode>) -> Self {
        Self::Packed(value)
    }
}
impl From<Vec<Vec<SharedNode>>> for SequenceInput {
    fn from(value: Vec<Vec<SharedNode>>) -> Self {
        Self::Steps(value)
    }
}

#[derive(Debug, Clone)]
pub struct TimeDistributed {
    outputs: Tensor<SharedNode>,
    params: Vec<NamedParams>,
}
impl TimeDistributed {
    /// `[depth, length]`
    pub fn outputs(&self) -> &Tensor<SharedNode> {
        &self.outputs
    }
    pub fn into_outputs(self) -> Tensor<SharedNode> {
        self.outputs
    }

    pub fn depth(&self) -> usize {
        self.outputs.shape()[0]
    }
    pub fn len(&self) -> usize {
        self.outputs.shape()[TIME_AXIS]
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The output nodes of each timestep
    pub fn steps(&self) -> Vec<Vec<SharedNode>> {
        self.outputs
            .data()
            .chunks(self.depth())
            .map(|step| step.to_vec())
            .collect()
    }

    /// Parameters under the scope of this layer
    pub fn params(&self) -> &[NamedParams] {
        &self.params
    }
    pub fn num_params(&self) -> usize {
        summarize(&self.params).num_params
    }
}

pub fn time_distributed<L>(
    inputs: impl Into<SequenceInput>,
    layer: &L,
    config: &TimeDistributedConfig,
    mut param_injection: ParamInjection<'_>,
) -> Result<TimeDistributed, TimeDistributedError>
where
    L: TimestepLayer + ?Sized,
{
    tracing::info!(
        "TimeDistributedLayer {}: layer_class: {}",
        config.name,
        layer.name()
    );
    if layer.name().is_empty() {
        return Err(TimeDistributedError::EmptyLayerName);
    }

    let inputs = match inputs.into() {
        SequenceInput::Packed(tensor) => tensor,
        SequenceInput::Steps(steps) if steps.is_empty() => {
            return Err(TimeDistributedError::EmptySequence)
        }
        SequenceInput::Steps(steps) => Tensor::from_steps(steps)?,
    };
    if inputs.rank() < 2 {
        return Err(TimeDistributedError::InvalidRank {
            shape: inputs.shape().to_vec(),
        });
    }
    let length = inputs.shape()[TIME_AXIS];
    if length == 0 {
        return Err(TimeDistributedError::EmptySequence);
    }
    let steps = inputs.unstack(TIME_AXIS)?;

    let mut param_injection = param_injection.name_append(&format!(":{}", config.name));
    let checkpoint = param_injection.injector.checkpoint();
    let outputs = match build_timesteps(steps, layer, &mut param_injection) {
        Ok(outputs) => outputs,
        Err(e) => {
            param_injection.injector.rollback(checkpoint);
            return Err(e);
        }
    };

    let params = param_injection.params_in_scope();
    tracing::info!(
        "TimeDistributedLayer {}: output shape: {:?}, params: {}",
        config.name,
        outputs.shape(),
        params.len()
    );
    Ok(TimeDistributed { outputs, params })
}

fn build_timesteps<L>(
    steps: Vec<Tensor<SharedNode>>,
    layer: &L,
    param_injection: &mut ParamInjection<'_>,
) -> Result<Tensor<SharedNode>, TimeDistributedError>
where
    L: TimestepLayer + ?Sized,
{
    let first_reuse = param_injection.reuse;
    let layer_scope = format!(":{}", layer.name());

    let mut outputs_seq: Vec<Vec<SharedNode>> = Vec::with_capacity(steps.len());
    for (index, step) in steps.into_iter().enumerate() {
        let _span = tracing::debug_span!("timestep", index).entered();
        let reuse = match index {
            0 => first_reuse,
            _ => Reuse::Require,
        };
        let param_injection = param_injection.name_append(&layer_scope).with_reuse(reuse);
        let outputs = layer
            .build(step.into_data(), param_injection)
            .map_err(|source| TimeDistributedError::Timestep { index, source })?;
        if outputs.is_empty() {
            return Err(TimeDistributedError::EmptyOutput { index });
        }
        if let Some(first) = outputs_seq.first() {
            if first.len() != outputs.len() {
                return Err(TimeDistributedError::InconsistentOutputDepth {
                    index,
                    expected: first.len(),
                    actual: outputs.len(),
                });
            }
        }
        tracing::debug!(depth = outputs.len(), "built");
        outputs_seq.push(outputs);
    }
    Ok(Tensor::from_steps(outputs_seq)?)
}

#[derive(Debug, Error)]
pub enum TimeDistributedError {
    #[error("The wrapped layer has an empty name")]
    EmptyLayerName,
    #[error("Sequence input must have at least rank 2 `[depth, length, ..]`, got shape {shape:?}")]
    InvalidRank { shape: OwnedShape },
    #[error("Sequence input has no timesteps")]
    EmptySequence,
    #[error("Timestep {index}: {source}")]
    Timestep { index: usize, source: LayerError },
    #[error("Timestep {index} produced no outputs")]
    EmptyOutput { index: usize },
    #[error("Timestep {index} produced {actual} outputs, earlier timesteps produced {expected}")]
    InconsistentOutputDepth {
        index: usize,
        expected: usize,
        actual: usize,
    },
    #[error("Tensor error: {0}")]
    Tensor(#[from] TensorError),
}
