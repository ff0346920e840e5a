use crate::{
    node::{shared_node, Node, NodeComputation, SharedNode},
    param::empty_shared_params,
};

/// ```math
/// f(x) = x[i]
/// ```
pub fn input_node(input_index: usize) -> Node {
    let computation = InputNodeComputation { input_index };
    Node::new(Vec::new(), Box::new(computation), empty_shared_params())
}

/// Hands out input nodes over consecutive sample indices
#[derive(Debug, Clone)]
pub struct InputNodeGen {
    next_index: usize,
}
impl InputNodeGen {
    pub fn new() -> Self {
        Self { next_index: 0 }
    }

    pub fn gen(&mut self, len: usize) -> Vec<SharedNode> {
        let start = self.next_index;
        self.next_index = start + len;
        input_node_batch(InputNodeBatchParams { start, len })
    }

    /// the sample index the next generated node reads
    pub fn next_index(&self) -> usize {
        self.next_index
    }
}
impl Default for InputNodeGen {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct InputNodeBatchParams {
    pub start: usize,
    pub len: usize,
}
pub fn input_node_batch(params: InputNodeBatchParams) -> Vec<SharedNode> {
    (0..params.len)
        .map(|i| shared_node(input_node(params.start + i)))
        .collect()
}

#[derive(Debug)]
struct InputNodeComputation {
    input_index: usize,
}
impl NodeComputation for InputNodeComputation {
    fn compute_output(
        &self,
        parameters: &[f64],
        operand_outputs: &[f64],
        graph_inputs: &[f64],
    ) -> f64 {
        assert!(parameters.is_empty());
        assert!(operand_outputs.is_empty());
        graph_inputs[self.input_index]
    }

    fn compute_gradient_of_this_at_operand(
        &self,
        parameters: &[f64],
        operand_outputs: &[f64],
        buf: Vec<f64>,
    ) -> Vec<f64> {
        assert!(parameters.is_empty());
        assert!(operand_outputs.is_empty());
        buf
    }

    fn compute_gradient_of_this_at_parameter(
        &self,
        parameters: &[f64],
        operand_outputs: &[f64],
        buf: Vec<f64>,
    ) -> Vec<f64> {
        assert!(parameters.is_empty());
        assert!(operand_outputs.is_empty());
        buf
    }
}
