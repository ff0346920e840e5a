use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    node::{clone_node_batch, shared_node, SharedNode},
    param::{ParamError, ParamInjection, SharedParams},
};

use super::{
    bias::{bias_node, default_bias, BiasNodeError},
    weights::{weight_node, WeightInit, WeightNodeError},
};

/// ```math
/// f_{w,b} (x) = wx + b
/// ```
///
/// - `lambda`: for regularization
pub fn linear_node(
    input_nodes: Vec<SharedNode>,
    lambda: Option<f64>,
    init: WeightInit,
    mut param_injection: ParamInjection<'_>,
) -> Result<SharedNode, LinearNodeError> {
    let op_len = input_nodes.len();
    let weights = param_injection
        .name_append(":weights")
        .try_get_or_create_params(|| {
            init.weights(op_len).map_err(LinearNodeError::from)
        })?;
    let bias = param_injection
        .name_append(":bias")
        .get_or_create_params(|| [default_bias()])?;
    linear_node_manual(input_nodes, lambda, weights, bias)
}
pub fn linear_node_manual(
    input_nodes: Vec<SharedNode>,
    lambda: Option<f64>,
    weights: SharedParams,
    bias: SharedParams,
) -> Result<SharedNode, LinearNodeError> {
    let weight_node = shared_node(weight_node(input_nodes, weights, lambda)?);
    let bias_node = shared_node(bias_node(weight_node, bias)?);
    Ok(bias_node)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearLayerConfig {
    pub depth: NonZeroUsize,
    pub lambda: Option<f64>,
    #[serde(default)]
    pub init: WeightInit,
}
pub fn linear_layer(
    input_nodes: Vec<SharedNode>,
    config: LinearLayerConfig,
    mut param_injection: ParamInjection<'_>,
) -> Result<Vec<SharedNode>, LinearNodeError> {
    let mut layer = vec![];
    for depth in 0..config.depth.get() {
        let param_injection = param_injection.name_append(&format!(":depth.{depth}"));
        let linear_node = linear_node(
            clone_node_batch(&input_nodes),
            config.lambda,
            config.init,
            param_injection,
        )?;
        layer.push(linear_node);
    }
    Ok(layer)
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum LinearNodeError {
    #[error("Weight node error: {0}")]
    Weight(#[from] WeightNodeError),
    #[error("Bias node error: {0}")]
    Bias(#[from] BiasNodeError),
    #[error("Parameter error: {0}")]
    Param(#[from] ParamError),
}

#[cfg(test)]
mod tests {
    use crate::{
        nodes::input::{input_node_batch, InputNodeBatchParams},
        param::{shared_params, ParamInjector, Reuse},
    };

    use super::*;

    #[test]
    fn evaluate_manual() {
        let input_nodes = input_node_batch(InputNodeBatchParams { start: 0, len: 3 });
        let node = linear_node_manual(
            input_nodes,
            None,
            shared_params(vec![3.0, 2.0, 1.0]),
            shared_params(vec![4.0]),
        )
        .unwrap();
        let ret = node.borrow_mut().evaluate_once(&[1.0, 2.0, 3.0], 0);
        assert_eq!(ret, (3.0 * 1.0 + 2.0 * 2.0 + 1.0 * 3.0) + 4.0);
    }

    #[test]
    fn layer_param_names() {
        let mut injector = ParamInjector::empty();
        let mut injection = ParamInjection::new(&mut injector);
        let input_nodes = input_node_batch(InputNodeBatchParams { start: 0, len: 3 });
        let config = LinearLayerConfig {
            depth: NonZeroUsize::new(2).unwrap(),
            lambda: None,
            init: WeightInit::Uniform,
        };
        let layer = linear_layer(input_nodes, config, injection.name_append(":dense")).unwrap();
        assert_eq!(layer.len(), 2);
        let names = injector
            .params()
            .iter()
            .map(|p| p.name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(
            names,
            [
                ":dense:depth.0:weights",
                ":dense:depth.0:bias",
                ":dense:depth.1:weights",
                ":dense:depth.1:bias",
            ]
        );
        assert_eq!(injector.num_params(), 8);
    }

    #[test]
    fn required_params_must_exist() {
        let mut injector = ParamInjector::empty();
        let injection = ParamInjection::new(&mut injector).with_reuse(Reuse::Require);
        let input_nodes = input_node_batch(InputNodeBatchParams { start: 0, len: 1 });
        let err = linear_node(input_nodes, None, WeightInit::Uniform, injection).unwrap_err();
        assert_eq!(
            err,
            LinearNodeError::Param(ParamError::NotFound {
                name: ":weights".into()
            })
        );
    }

    #[test]
    fn invalid_init_is_reported() {
        let mut injector = ParamInjector::empty();
        let injection = ParamInjection::new(&mut injector);
        let input_nodes = input_node_batch(InputNodeBatchParams { start: 0, len: 1 });
        let init = WeightInit::Normal { std_dev: -1.0 };
        let err = linear_node(input_nodes, None, init, injection).unwrap_err();
        assert_eq!(
            err,
            LinearNodeError::Weight(WeightNodeError::InvalidStdDev { std_dev: -1.0 })
        );
    }
}
