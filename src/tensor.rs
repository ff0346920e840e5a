//! Owned n-d containers
//!
//! Layout is column-major: `index[0]` has stride 1. A sequence of feature
//! vectors therefore has shape `[depth, length]` and each timestep is a
//! contiguous run of `depth` elements.

use thiserror::Error;

pub type Index = [usize];
pub type OwnedIndex = Vec<usize>;

pub type Shape = [usize];
pub type OwnedShape = Vec<usize>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tensor<T> {
    data: Vec<T>,
    shape: OwnedShape,
}
impl<T> Tensor<T> {
    fn check_rep(&self) {
        if !cfg!(debug_assertions) {
            return;
        }
        assert!(!self.shape.is_empty());
        assert_eq!(self.data.len(), self.shape.iter().product::<usize>());
    }

    pub fn new(data: Vec<T>, shape: OwnedShape) -> Result<Self, TensorError> {
        if shape.is_empty() {
            return Err(TensorError::EmptyShape);
        }
        let n = shape.iter().copied().product::<usize>();
        if data.len() != n {
            return Err(TensorError::LengthNotMatched {
                expected: n,
                actual: data.len(),
            });
        }
        let this = Self { data, shape };
        this.check_rep();
        Ok(this)
    }

    pub fn get(&self, index: &Index) -> Option<&T> {
        if self.shape.len() != index.len() {
            return None;
        }
        if self
            .shape
            .iter()
            .copied()
            .zip(index.iter().copied())
            .any(|(shape, index)| shape <= index)
        {
            return None;
        }
        self.data.get(position(&self.shape, index))
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }
    pub fn rank(&self) -> usize {
        self.shape.len()
    }
    pub fn data(&self) -> &[T] {
        &self.data
    }
    pub fn into_data(self) -> Vec<T> {
        self.data
    }
}
impl<T: Clone> Tensor<T> {
    /// Split along `axis`
    ///
    /// Each piece takes the shape with `axis` removed; pieces of a rank-1
    /// tensor have shape `[1]`.
    pub fn unstack(&self, axis: usize) -> Result<Vec<Tensor<T>>, TensorError> {
        if self.rank() <= axis {
            return Err(TensorError::AxisOutOfRange {
                axis,
                rank: self.rank(),
            });
        }
        let mut piece_shape = self.shape.clone();
        let len = piece_shape.remove(axis);
        let piece_len = piece_shape.iter().product::<usize>();

        let mut pieces = vec![];
        for i in 0..len {
            let mut data = Vec::with_capacity(piece_len);
            for pos in 0..piece_len {
                let mut index = index_at(&piece_shape, pos);
                index.insert(axis, i);
                data.push(self.data[position(&self.shape, &index)].clone());
            }
            let shape = if piece_shape.is_empty() {
                vec![1]
            } else {
                piece_shape.clone()
            };
            pieces.push(Tensor::new(data, shape)?);
        }
        Ok(pieces)
    }

    /// Join equally shaped tensors along a new `axis`
    pub fn stack(tensors: Vec<Tensor<T>>, axis: usize) -> Result<Tensor<T>, TensorError> {
        let Some(first) = tensors.first() else {
            return Err(TensorError::EmptyStack);
        };
        let piece_shape = first.shape.clone();
        if piece_shape.len() < axis {
            return Err(TensorError::AxisOutOfRange {
                axis,
                rank: piece_shape.len() + 1,
            });
        }
        if let Some(t) = tensors.iter().find(|t| t.shape != piece_shape) {
            return Err(TensorError::ShapeNotMatched {
                expected: piece_shape,
                actual: t.shape.clone(),
            });
        }
        let mut shape = piece_shape.clone();
        shape.insert(axis, tensors.len());
        let n = shape.iter().product::<usize>();

        let mut data = Vec::with_capacity(n);
        for pos in 0..n {
            let mut index = index_at(&shape, pos);
            let i = index.remove(axis);
            data.push(tensors[i].data[position(&piece_shape, &index)].clone());
        }
        Tensor::new(data, shape)
    }
}
impl<T> Tensor<T> {
    /// Pack per-timestep vectors into a `[depth, length]` tensor
    pub fn from_steps(steps: Vec<Vec<T>>) -> Result<Tensor<T>, TensorError> {
        let Some(first) = steps.first() else {
            return Err(TensorError::EmptyStack);
        };
        let depth = first.len();
        if let Some(step) = steps.iter().find(|s| s.len() != depth) {
            return Err(TensorError::ShapeNotMatched {
                expected: vec![depth],
                actual: vec![step.len()],
            });
        }
        let len = steps.len();
        let data = steps.into_iter().flatten().collect();
        Tensor::new(data, vec![depth, len])
    }
}

fn position(shape: &Shape, index: &Index) -> usize {
    assert_eq!(shape.len(), index.len());
    let mut pos = 0;
    let mut mag = 1;
    for (i, len) in index.iter().copied().zip(shape.iter().copied()) {
        pos += i * mag;
        mag *= len;
    }
    pos
}

fn index_at(shape: &Shape, mut pos: usize) -> OwnedIndex {
    let mut index = Vec::with_capacity(shape.len());
    for len in shape.iter().copied() {
        index.push(pos % len);
        pos /= len;
    }
    index
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TensorError {
    #[error("Tensor shape must have at least one dimension")]
    EmptyShape,
    #[error("Data length not matched: shape holds {expected}, got {actual}")]
    LengthNotMatched { expected: usize, actual: usize },
    #[error("Shape not matched: expected {expected:?}, got {actual:?}")]
    ShapeNotMatched {
        expected: OwnedShape,
        actual: OwnedShape,
    },
    #[error("Axis {axis} out of range for rank {rank}")]
    AxisOutOfRange { axis: usize, rank: usize },
    #[error("Nothing to stack")]
    EmptyStack,
}
