use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{
    node::{shared_node, SharedNode},
    nodes::{relu::relu_node, sigmoid::sigmoid_node, tanh::tanh_node},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Activation {
    Sigmoid,
    Tanh,
    ReLu,
}
impl Activation {
    pub fn activate(&self, inputs: &[SharedNode]) -> Vec<SharedNode> {
        inputs
            .iter()
            .map(Arc::clone)
            .map(|x| match self {
                Activation::Sigmoid => sigmoid_node(x),
                Activation::Tanh => tanh_node(x),
                Activation::ReLu => relu_node(x),
            })
            .map(shared_node)
            .collect::<Vec<SharedNode>>()
    }
}
