use std::{num::NonZeroUsize, sync::Arc};

use crate::{
    layers::{
        activation::Activation,
        dense::{dense_layer, DenseLayerConfig},
    },
    network::{
        train::{TrainError, TrainOption},
        NeuralNetwork,
    },
    node::{shared_node, SharedNode},
    nodes::{
        bias::bias_node,
        input::{input_node, input_node_batch, InputNodeBatchParams},
        linear::linear_node_manual,
        mse::l2_error_node,
        relu::relu_node,
        weights::weight_node,
    },
    param::{shared_params, ParamInjection, ParamInjector, SharedParams},
};

use super::{binary_accurate, init_tracing};

fn single_linear_relu(
    input_nodes: Vec<SharedNode>,
    initial_weights: SharedParams,
    initial_bias: SharedParams,
) -> SharedNode {
    let linear_node = linear_node_manual(input_nodes, None, initial_weights, initial_bias).unwrap();
    shared_node(relu_node(linear_node))
}

fn single_linear_relu_network(
    node_count: usize,
    initial_weights: SharedParams,
    initial_bias: SharedParams,
) -> NeuralNetwork {
    let input_nodes = input_node_batch(InputNodeBatchParams {
        start: 0,
        len: node_count,
    });
    let relu_node = single_linear_relu(input_nodes, initial_weights, initial_bias);
    let label_node = shared_node(input_node(node_count));
    let error_node = shared_node(l2_error_node(Arc::clone(&relu_node), label_node));
    NeuralNetwork::new(vec![relu_node], error_node)
}

#[test]
fn evaluate() {
    let initial_weights = shared_params(vec![3.0, 2.0, 1.0]);
    let initial_bias = shared_params(vec![-20.0]);
    let mut network = single_linear_relu_network(3, initial_weights, initial_bias);
    let ret = network.evaluate(&[&[1.0, 2.0, 3.0]]);
    assert_eq!(ret[0][0], 0.0);
}

#[test]
fn evaluate_batch() {
    let initial_weights = shared_params(vec![2.0, 1.0]);
    let initial_bias = shared_params(vec![3.0]);
    let mut network = single_linear_relu_network(2, initial_weights, initial_bias);
    let ret = network.evaluate(&[[2.0, -2.0], [6.0, -2.0], [-9.0, 0.0]]);
    assert_eq!(ret, [[5.0, 13.0, 0.0]]);
}

#[test]
fn error() {
    let input = shared_node(input_node(0));
    let relu = shared_node(relu_node(input));
    let label = shared_node(input_node(1));
    let error = shared_node(l2_error_node(Arc::clone(&relu), label));
    let mut network = NeuralNetwork::new(vec![relu], error);
    let inputs = vec![-2.0, 1.0];
    let ret = network.evaluate(&[&inputs]);
    assert_eq!(ret[0][0], 0.0);
    let ret = network.error(&[&inputs]);
    assert_eq!(ret, 1.0);
    let ret = network.error(&[vec![-2.0, 1.0], vec![3.0, 1.0]]);
    assert_eq!(ret, (1.0 + 4.0) / 2.0);
}

#[test]
fn cache_reset() {
    let initial_weights = shared_params(vec![2.0, 1.0]);
    let initial_bias = shared_params(vec![3.0]);
    let mut network = single_linear_relu_network(2, initial_weights, initial_bias);
    let ret = network.evaluate(&[&[2.0, -2.0]]);
    assert_eq!(ret[0][0], 5.0);
    let ret = network.evaluate(&[&[6.0, -2.0]]);
    assert!(ret[0][0] != 5.0);
}

#[test]
fn errors_on_dataset() {
    let initial_weights = shared_params(vec![2.0, 1.0]);
    let initial_bias = shared_params(vec![3.0]);
    let mut network = single_linear_relu_network(2, initial_weights, initial_bias);
    let dataset = vec![vec![2.0, -2.0, 5.0], vec![6.0, -2.0, 5.0]];
    let ret = network.accuracy(&dataset, binary_accurate);
    assert!(ret > 0.499);
    assert!(ret < 0.501);
    let ret = network.compute_avg_error(&dataset);
    assert_eq!(ret, (0.0 + 64.0) / 2.0);
}

struct LinearReluGraph {
    weight_node: SharedNode,
    bias_node: SharedNode,
    network: NeuralNetwork,
}

fn linear_relu_graph() -> LinearReluGraph {
    let label_index = 2;
    let input_nodes = input_node_batch(InputNodeBatchParams {
        start: 0,
        len: label_index,
    });
    let initial_weights = shared_params(vec![2.0, 1.0]);
    let weight_node = shared_node(weight_node(input_nodes, initial_weights, None).unwrap());
    let initial_bias = shared_params(vec![3.0]);
    let bias_node = shared_node(bias_node(Arc::clone(&weight_node), initial_bias).unwrap());
    let relu_node = shared_node(relu_node(Arc::clone(&bias_node)));
    let label_node = shared_node(input_node(label_index));
    let error_node = shared_node(l2_error_node(Arc::clone(&relu_node), label_node));
    let network = NeuralNetwork::new(vec![relu_node], error_node);
    LinearReluGraph {
        weight_node,
        bias_node,
        network,
    }
}

#[test]
fn gradients() {
    let mut graph = linear_relu_graph();
    let inputs = vec![2.0, -2.0, 1.0];

    let ret = graph.network.evaluate(&[&inputs]);
    assert_eq!(ret[0][0], 5.0);
    let ret = graph.network.error(&[&inputs]);
    assert_eq!(ret, 16.0);
}

#[test]
fn backpropagation_step() {
    let mut graph = linear_relu_graph();
    let step_size = 0.5;

    let inputs = vec![2.0, -2.0, 1.0];
    let err = graph
        .network
        .backpropagation_step(&[&inputs], step_size)
        .unwrap();
    assert_eq!(err, 16.0);
    {
        let weight_node = graph.weight_node.borrow();
        let weights = weight_node.parameters().borrow();
        assert_eq!(weights.values(), &[-6.0, 9.0]);
        assert_eq!(weights.gradient(), &[0.0, 0.0]);
    }
    {
        let bias_node = graph.bias_node.borrow();
        let bias = bias_node.parameters().borrow();
        assert_eq!(bias.values(), &[-1.0]);
    }
}

#[test]
fn backpropagation_step2() {
    let label_index = 1;
    let input_nodes = input_node_batch(InputNodeBatchParams {
        start: 0,
        len: label_index,
    });
    let initial_weights1 = shared_params(vec![2.0]);
    let weight_node1 = shared_node(weight_node(input_nodes, initial_weights1, None).unwrap());
    let initial_weights2 = shared_params(vec![3.0]);
    let weight_node2 = shared_node(
        weight_node(vec![Arc::clone(&weight_node1)], initial_weights2, None).unwrap(),
    );
    let label_node = shared_node(input_node(label_index));
    let error_node = shared_node(l2_error_node(Arc::clone(&weight_node2), label_node));
    let step_size = 0.5;
    let mut network = NeuralNetwork::new(vec![Arc::clone(&weight_node2)], error_node);

    let inputs = vec![2.0, 1.0];
    network.backpropagation_step(&[&inputs], step_size).unwrap();
    {
        let weight_node = weight_node2.borrow();
        let weights = weight_node.parameters().borrow();
        assert_eq!(weights.values(), &[-41.0]); // 3 - 0.5 * 88
    }
    {
        let weight_node = weight_node1.borrow();
        let weights = weight_node.parameters().borrow();
        assert_eq!(weights.values(), &[-64.0]); // 2 - 0.5 * 132
    }
}

#[test]
fn batch_gradient_is_averaged() {
    let mut graph = linear_relu_graph();
    // same sample twice gives the single-sample step
    let inputs = vec![2.0, -2.0, 1.0];
    graph
        .network
        .backpropagation_step(&[&inputs, &inputs], 0.5)
        .unwrap();
    let weight_node = graph.weight_node.borrow();
    let weights = weight_node.parameters().borrow();
    assert_eq!(weights.values(), &[-6.0, 9.0]);
}

#[test]
fn train_rejects_bad_input() {
    let mut graph = linear_relu_graph();
    let dataset: Vec<Vec<f64>> = vec![];
    let err = graph
        .network
        .train(&dataset, 0.1, 10, TrainOption::StochasticGradientDescent)
        .unwrap_err();
    assert_eq!(err, TrainError::EmptyDataset);

    let dataset = vec![vec![2.0, -2.0, 1.0]];
    let option = TrainOption::MiniBatchGradientDescent { batch_size: 0 };
    let err = graph.network.train(&dataset, 0.1, 10, option).unwrap_err();
    assert_eq!(err, TrainError::ZeroBatchSize);
}

#[test]
fn train_reports_divergence() {
    // e = (w x - l)^2 overshoots further on every step
    let input = input_node_batch(InputNodeBatchParams { start: 0, len: 1 });
    let weight = shared_node(weight_node(input, shared_params(vec![1.0]), None).unwrap());
    let label = shared_node(input_node(1));
    let error = shared_node(l2_error_node(Arc::clone(&weight), label));
    let mut network = NeuralNetwork::new(vec![weight], error);
    let dataset = vec![vec![2.0, 1.0]];
    let err = network
        .train(&dataset, 10.0, 1_000, TrainOption::BatchGradientDescent)
        .unwrap_err();
    assert!(matches!(err, TrainError::NonFiniteError { .. }));
}

#[test]
fn learn_xor_sigmoid() {
    init_tracing();
    let mut param_injector = ParamInjector::empty();
    let mut param_injection = ParamInjection::new(&mut param_injector);

    let label_index = 2;
    let input_nodes = input_node_batch(InputNodeBatchParams {
        start: 0,
        len: label_index,
    });
    let hidden = DenseLayerConfig::new("hidden", NonZeroUsize::new(4).unwrap())
        .with_activation(Activation::Sigmoid);
    let hidden = dense_layer(input_nodes, &hidden, param_injection.name_append(":hidden")).unwrap();
    let output = DenseLayerConfig::new("output", NonZeroUsize::new(1).unwrap())
        .with_activation(Activation::Sigmoid);
    let output = dense_layer(hidden, &output, param_injection.name_append(":output")).unwrap();
    let label_node = shared_node(input_node(label_index));
    let error_node = shared_node(l2_error_node(Arc::clone(&output[0]), label_node));
    let step_size = 0.5;
    let mut network = NeuralNetwork::new(output, error_node);

    let dataset = vec![
        vec![0.0, 0.0, 0.0],
        vec![0.0, 1.0, 1.0],
        vec![1.0, 0.0, 1.0],
        vec![1.0, 1.0, 0.0],
    ];

    let max_steps = 20_000;
    network
        .train(
            &dataset,
            step_size,
            max_steps,
            TrainOption::StochasticGradientDescent,
        )
        .unwrap();
    let ret = network.accuracy(&dataset, binary_accurate);
    assert_eq!(ret, 1.0);
    param_injector.log_params(true);
    assert_eq!(param_injector.num_params(), 4 * 3 + 5);
}
