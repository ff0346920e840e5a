use rand::Rng;
use serde::{Deserialize, Serialize};
use strict_num::FiniteF64;
use thiserror::Error;

use crate::node::GraphError;

use super::{NeuralNetwork, ProgressPrinter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrainOption {
    StochasticGradientDescent,
    MiniBatchGradientDescent { batch_size: usize },
    BatchGradientDescent,
}
impl TrainOption {
    fn batch_size(&self, dataset_len: usize) -> usize {
        match self {
            TrainOption::StochasticGradientDescent => 1,
            TrainOption::MiniBatchGradientDescent { batch_size } => *batch_size,
            TrainOption::BatchGradientDescent => dataset_len,
        }
    }
}

impl NeuralNetwork {
    /// Run `max_steps` gradient descent steps on samples drawn from `dataset`
    pub fn train<S>(
        &mut self,
        dataset: &[S],
        step_size: f64,
        max_steps: usize,
        option: TrainOption,
    ) -> Result<(), TrainError>
    where
        S: AsRef<[f64]>,
    {
        if dataset.is_empty() {
            return Err(TrainError::EmptyDataset);
        }
        let batch_size = option.batch_size(dataset.len());
        if batch_size == 0 {
            return Err(TrainError::ZeroBatchSize);
        }
        tracing::info!(?option, batch_size, step_size, max_steps, "train");

        let mut batch_input = Vec::with_capacity(batch_size);
        let mut rng = rand::thread_rng();
        let mut progress_printer = ProgressPrinter::new();
        for step in 0..max_steps {
            batch_input.clear();
            for _ in 0..batch_size {
                let dataset_index: usize = rng.gen_range(0..dataset.len());
                batch_input.push(dataset[dataset_index].as_ref());
            }
            let error = self.backpropagation_step(&batch_input, step_size)?;
            if FiniteF64::new(error).is_none() {
                return Err(TrainError::NonFiniteError { step, error });
            }
            progress_printer.print_progress(step, max_steps);
        }
        Ok(())
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TrainError {
    #[error("Cannot train on an empty dataset")]
    EmptyDataset,
    #[error("Batch size must be positive")]
    ZeroBatchSize,
    #[error("Error diverged to {error} at step {step}")]
    NonFiniteError { step: usize, error: f64 },
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),
}
