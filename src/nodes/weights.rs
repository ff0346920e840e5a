use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    node::{Node, NodeComputation, SharedNode},
    param::SharedParams,
};

/// ```math
/// X \sim U(-\frac{1}{\sqrt{n}}, \frac{1}{\sqrt{n}})
/// ```
pub fn rnd_weights(op_len: usize) -> Vec<f64> {
    if op_len == 0 {
        return vec![];
    }
    let weight_bound = 1.0 / (op_len as f64).sqrt();
    let mut rng = rand::thread_rng();
    (0..op_len)
        .map(|_| {
            let weight: f64 = rng.gen_range(-weight_bound..weight_bound);
            weight
        })
        .collect()
}

/// ```math
/// X \sim N(0, \sigma^2)
/// ```
pub fn normal_weights(op_len: usize, std_dev: f64) -> Result<Vec<f64>, WeightNodeError> {
    let normal =
        Normal::new(0.0, std_dev).map_err(|_| WeightNodeError::InvalidStdDev { std_dev })?;
    let mut rng = rand::thread_rng();
    Ok((0..op_len).map(|_| normal.sample(&mut rng)).collect())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub enum WeightInit {
    #[default]
    Uniform,
    Normal {
        std_dev: f64,
    },
}
impl WeightInit {
    pub fn weights(&self, op_len: usize) -> Result<Vec<f64>, WeightNodeError> {
        match self {
            WeightInit::Uniform => Ok(rnd_weights(op_len)),
            WeightInit::Normal { std_dev } => normal_weights(op_len, *std_dev),
        }
    }
}

/// ```math
/// f_w (x) = wx
/// ```
///
/// - `lambda`: for regularization
pub fn weight_node(
    operands: Vec<SharedNode>,
    weights: SharedParams,
    lambda: Option<f64>,
) -> Result<Node, WeightNodeError> {
    let len = weights.borrow().len();
    if operands.len() != len {
        return Err(WeightNodeError::ParameterSizeNotMatched {
            operands: operands.len(),
            weights: len,
        });
    }
    let computation = WeightNodeComputation {
        lambda: lambda.unwrap_or(0.),
    };
    Ok(Node::new(operands, Box::new(computation), weights))
}

#[derive(Debug)]
struct WeightNodeComputation {
    lambda: f64,
}
impl NodeComputation for WeightNodeComputation {
    fn compute_output(
        &self,
        parameters: &[f64],
        operand_outputs: &[f64],
        _graph_inputs: &[f64],
    ) -> f64 {
        assert_eq!(operand_outputs.len(), parameters.len());
        weight(operand_outputs, parameters)
    }

    fn compute_gradient_of_this_at_operand(
        &self,
        parameters: &[f64],
        operand_outputs: &[f64],
        mut buf: Vec<f64>,
    ) -> Vec<f64> {
        assert_eq!(operand_outputs.len(), parameters.len());
        buf.extend(parameters);
        buf
    }

    fn compute_gradient_of_this_at_parameter(
        &self,
        parameters: &[f64],
        operand_outputs: &[f64],
        mut buf: Vec<f64>,
    ) -> Vec<f64> {
        assert_eq!(operand_outputs.len(), parameters.len());
        buf.extend(operand_outputs);
        buf
    }

    fn regularization(&self, parameter: f64) -> f64 {
        derivative_of_l2_regularization(parameter, self.lambda)
    }
}

fn weight(x: &[f64], w: &[f64]) -> f64 {
    assert_eq!(x.len(), w.len());
    x.iter()
        .copied()
        .zip(w.iter().copied())
        .map(|(x, w)| x * w)
        .sum()
}

fn derivative_of_l2_regularization(w: f64, lambda: f64) -> f64 {
    w * lambda
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum WeightNodeError {
    #[error("Parameter size not matched: {operands} operands, {weights} weights")]
    ParameterSizeNotMatched { operands: usize, weights: usize },
    #[error("Invalid standard deviation for normal weight initialization: {std_dev}")]
    InvalidStdDev { std_dev: f64 },
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::{
        node::shared_node,
        nodes::input::{input_node_batch, InputNodeBatchParams},
        param::shared_params,
    };

    use super::*;

    fn assertion(assert_weight: impl Fn(&Node)) {
        let input_nodes = input_node_batch(InputNodeBatchParams { start: 0, len: 3 });
        let weights = shared_params(vec![3.0, 2.0, 1.0]);
        let weight_node = shared_node(weight_node(input_nodes, weights, None).unwrap());
        weight_node.borrow_mut().evaluate_once(&[1.0, 2.0, 3.0], 0);
        assert_weight(&weight_node.borrow());
    }

    #[test]
    fn evaluate() {
        assertion(|weight_node| {
            let output = weight_node.output(0).unwrap();
            assert_eq!(output, 3.0 * 1.0 + 2.0 * 2.0 + 1.0 * 3.0);
        });
    }

    #[test]
    fn gradient_of_this_at_operand() {
        assertion(|weight_node| {
            let params = Arc::clone(weight_node.parameters());
            let params = params.borrow();
            let ret = weight_node
                .gradient_of_this_at_operand(0, params.values(), vec![])
                .unwrap();
            assert_eq!(&ret, &[3.0, 2.0, 1.0]);
        });
    }

    #[test]
    fn gradient_of_this_at_parameter() {
        assertion(|weight_node| {
            let params = Arc::clone(weight_node.parameters());
            let params = params.borrow();
            let ret = weight_node
                .gradient_of_this_at_parameter(0, params.values(), vec![])
                .unwrap();
            assert_eq!(&ret, &[1.0, 2.0, 3.0]);
        });
    }

    #[test]
    fn size_mismatch() {
        let input_nodes = input_node_batch(InputNodeBatchParams { start: 0, len: 2 });
        let err = weight_node(input_nodes, shared_params(vec![1.0]), None).unwrap_err();
        assert_eq!(
            err,
            WeightNodeError::ParameterSizeNotMatched {
                operands: 2,
                weights: 1
            }
        );
    }

    #[test]
    fn init_bounds() {
        let w = WeightInit::Uniform.weights(4).unwrap();
        assert_eq!(w.len(), 4);
        assert!(w.iter().all(|w| w.abs() <= 0.5));
        let w = WeightInit::Normal { std_dev: 0.1 }.weights(8).unwrap();
        assert_eq!(w.len(), 8);
        assert!(WeightInit::Normal { std_dev: -1.0 }.weights(1).is_err());
    }
}
