use thiserror::Error;

use crate::{
    node::{Node, NodeComputation, SharedNode},
    param::SharedParams,
};

pub fn default_bias() -> f64 {
    0.0
}

/// ```math
/// f_b (x) = x + b
/// ```
pub fn bias_node(operand: SharedNode, bias: SharedParams) -> Result<Node, BiasNodeError> {
    let len = bias.borrow().len();
    if len != 1 {
        return Err(BiasNodeError::ParameterSizeNotMatched { bias: len });
    }
    let computation = BiasNodeComputation {};
    Ok(Node::new(vec![operand], Box::new(computation), bias))
}

#[derive(Debug)]
struct BiasNodeComputation {}
impl NodeComputation for BiasNodeComputation {
    fn compute_output(
        &self,
        parameters: &[f64],
        operand_outputs: &[f64],
        _graph_inputs: &[f64],
    ) -> f64 {
        assert_eq!(operand_outputs.len(), 1);
        assert_eq!(parameters.len(), 1);
        operand_outputs[0] + parameters[0]
    }

    fn compute_gradient_of_this_at_operand(
        &self,
        parameters: &[f64],
        operand_outputs: &[f64],
        mut buf: Vec<f64>,
    ) -> Vec<f64> {
        assert_eq!(operand_outputs.len(), 1);
        assert_eq!(parameters.len(), 1);
        buf.extend([1.0]);
        buf
    }

    fn compute_gradient_of_this_at_parameter(
        &self,
        parameters: &[f64],
        operand_outputs: &[f64],
        mut buf: Vec<f64>,
    ) -> Vec<f64> {
        assert_eq!(operand_outputs.len(), 1);
        assert_eq!(parameters.len(), 1);
        buf.extend([1.0]);
        buf
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum BiasNodeError {
    #[error("Parameter size not matched: expected 1 bias, got {bias}")]
    ParameterSizeNotMatched { bias: usize },
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::{node::shared_node, nodes::input::input_node, param::shared_params};

    use super::*;

    #[test]
    fn evaluate() {
        let mut node = bias_node(shared_node(input_node(0)), shared_params(vec![2.0])).unwrap();
        assert_eq!(node.evaluate_once(&[3.0], 0), 5.0);
    }

    #[test]
    fn wrong_bias_size() {
        let x = shared_node(input_node(0));
        let err = bias_node(Arc::clone(&x), shared_params(vec![1.0, 2.0])).unwrap_err();
        assert_eq!(err, BiasNodeError::ParameterSizeNotMatched { bias: 2 });
        assert_eq!(x.borrow().num_successors(), 0);
    }
}
