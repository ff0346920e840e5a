use thiserror::Error;

use crate::{nodes::linear::LinearNodeError, param::ParamError, tensor::TensorError};

pub mod activation;
pub mod dense;
pub mod time_distributed;

#[derive(Debug, Error)]
pub enum LayerError {
    #[error("Linear node error: {0}")]
    Linear(#[from] LinearNodeError),
    #[error("Parameter error: {0}")]
    Param(#[from] ParamError),
    #[error("Tensor error: {0}")]
    Tensor(#[from] TensorError),
    #[error("{0}")]
    Other(Box<dyn std::error::Error + Send + Sync>),
}
