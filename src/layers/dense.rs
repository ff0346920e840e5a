use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};

use crate::{
    node::SharedNode,
    nodes::{
        linear::{linear_layer, LinearLayerConfig},
        weights::WeightInit,
    },
    param::ParamInjection,
};

use super::{activation::Activation, time_distributed::TimestepLayer, LayerError};

/// A fully connected layer, optionally followed by an activation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenseLayerConfig {
    pub name: String,
    pub depth: NonZeroUsize,
    #[serde(default)]
    pub activation: Option<Activation>,
    #[serde(default)]
    pub lambda: Option<f64>,
    #[serde(default)]
    pub init: WeightInit,
}
impl DenseLayerConfig {
    pub fn new(name: impl Into<String>, depth: NonZeroUsize) -> Self {
        Self {
            name: name.into(),
            depth,
            activation: None,
            lambda: None,
            init: WeightInit::default(),
        }
    }

    pub fn with_activation(self, activation: Activation) -> Self {
        Self {
            activation: Some(activation),
            ..self
        }
    }

    fn linear(&self) -> LinearLayerConfig {
        LinearLayerConfig {
            depth: self.depth,
            lambda: self.lambda,
            init: self.init,
        }
    }
}

pub fn dense_layer(
    inputs: Vec<SharedNode>,
    config: &DenseLayerConfig,
    param_injection: ParamInjection<'_>,
) -> Result<Vec<SharedNode>, LayerError> {
    let linear_layer = linear_layer(inputs, config.linear(), param_injection)?;
    assert_eq!(linear_layer.len(), config.depth.get());
    Ok(match &config.activation {
        Some(activation) => activation.activate(&linear_layer),
        None => linear_layer,
    })
}

impl TimestepLayer for DenseLayerConfig {
    fn name(&self) -> &str {
        &self.name
    }

    fn build(
        &self,
        inputs: Vec<SharedNode>,
        param_injection: ParamInjection<'_>,
    ) -> Result<Vec<SharedNode>, LayerError> {
        dense_layer(inputs, self, param_injection)
    }
}
