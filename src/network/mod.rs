use std::time::{Duration, Instant};

use crate::node::{graph_delete_caches, graph_do_gradient_descent_steps, GraphError, SharedNode};

pub mod train;

#[derive(Debug)]
pub struct NeuralNetwork {
    /// output: a prediction
    terminal_nodes: Vec<SharedNode>,
    /// output: the error between the prediction and the label
    error_node: SharedNode,
}
impl NeuralNetwork {
    fn check_rep(&self) {}

    pub fn new(terminal_nodes: Vec<SharedNode>, error_node: SharedNode) -> NeuralNetwork {
        let this = NeuralNetwork {
            terminal_nodes,
            error_node,
        };
        this.check_rep();
        this
    }

    pub fn terminal_nodes(&self) -> &[SharedNode] {
        &self.terminal_nodes
    }
    pub fn error_node(&self) -> &SharedNode {
        &self.error_node
    }

    /// Return outputs from all terminal nodes
    ///
    /// `evaluate()[i][j]`: output of terminal node $i$ on sample $j$
    pub fn evaluate<I>(&mut self, inputs: &[I]) -> Vec<Vec<f64>>
    where
        I: AsRef<[f64]>,
    {
        let mut outputs = vec![Vec::with_capacity(inputs.len()); self.terminal_nodes.len()];
        for (batch_index, inputs) in inputs.iter().enumerate() {
            for (terminal_node, outputs) in self.terminal_nodes.iter().zip(outputs.iter_mut()) {
                let mut terminal_node = terminal_node.borrow_mut();
                outputs.push(terminal_node.evaluate_once(inputs.as_ref(), batch_index));
            }
        }
        for terminal_node in &self.terminal_nodes {
            graph_delete_caches(terminal_node);
        }
        self.check_rep();
        outputs
    }

    /// Mean output of the error node over `inputs`
    pub fn error<I>(&mut self, inputs: &[I]) -> f64
    where
        I: AsRef<[f64]>,
    {
        let err = self.compute_error(inputs);
        graph_delete_caches(&self.error_node);
        self.check_rep();
        err
    }

    /// Return the error of the batch before the step
    ///
    /// `step_size`: learning rate
    pub fn backpropagation_step<I>(
        &mut self,
        inputs: &[I],
        step_size: f64,
    ) -> Result<f64, GraphError>
    where
        I: AsRef<[f64]>,
    {
        let err = self.compute_error(inputs);
        graph_do_gradient_descent_steps(&self.error_node, step_size)?;
        self.check_rep();
        Ok(err)
    }

    /// Keep the caches for backpropagation
    fn compute_error<I>(&mut self, inputs: &[I]) -> f64
    where
        I: AsRef<[f64]>,
    {
        if inputs.is_empty() {
            return 0.;
        }
        let mut error_node = self.error_node.borrow_mut();
        let mut sum = 0.;
        for (batch_index, inputs) in inputs.iter().enumerate() {
            sum += error_node.evaluate_once(inputs.as_ref(), batch_index);
        }
        sum / inputs.len() as f64
    }

    pub fn compute_avg_error<S>(&mut self, dataset: &[S]) -> f64
    where
        S: AsRef<[f64]>,
    {
        let mut progress_printer = ProgressPrinter::new();
        let mut avg = 0.;
        for (i, inputs) in dataset.iter().enumerate() {
            let err = self.error(&[inputs.as_ref()]);
            avg += err / dataset.len() as f64;
            progress_printer.print_progress(i, dataset.len());
        }
        avg
    }

    pub fn accuracy<S>(
        &mut self,
        dataset: &[S],
        accurate: impl Fn(AccurateFnParams<'_>) -> bool,
    ) -> f64
    where
        S: AsRef<[f64]>,
    {
        let mut progress_printer = ProgressPrinter::new();
        let mut accurate_count = 0;
        for (i, inputs) in dataset.iter().enumerate() {
            let eval = self.evaluate(&[inputs.as_ref()]);
            let eval = eval.iter().map(|x| x[0]).collect::<Vec<f64>>();
            let params = AccurateFnParams {
                inputs: inputs.as_ref(),
                outputs: eval,
            };
            if accurate(params) {
                accurate_count += 1;
            }
            progress_printer.print_progress(i, dataset.len());
        }
        self.check_rep();
        accurate_count as f64 / dataset.len() as f64
    }
}

#[derive(Debug, Clone)]
pub struct AccurateFnParams<'a> {
    pub inputs: &'a [f64],
    pub outputs: Vec<f64>,
}

struct ProgressPrinter {
    now: Instant,
}
impl ProgressPrinter {
    pub fn new() -> Self {
        Self {
            now: Instant::now(),
        }
    }

    fn print_progress(&mut self, i: usize, len: usize) {
        let gap = len / 10;
        if gap != 0 && i % gap != 0 {
            return;
        }
        let percentage = (100 * i) as f64 / len as f64;
        let elapsed = human_duration(self.now.elapsed());
        self.now = Instant::now();
        tracing::info!("{percentage:.2}%; {elapsed}");
    }
}

fn human_duration(duration: Duration) -> String {
    let seconds = duration.as_secs_f64();
    let minutes = seconds / 60.;
    let milliseconds = seconds * 1_000.;
    let microseconds = milliseconds * 1_000.;
    if 1. < minutes {
        return format!("{minutes:.2} min");
    }
    if 1. < seconds {
        return format!("{seconds:.2} s");
    }
    if 1. < milliseconds {
        return format!("{milliseconds:.2} ms");
    }
    format!("{microseconds:.2} us")
}
