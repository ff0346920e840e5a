pub mod bias;
pub mod input;
pub mod linear;
pub mod mse;
pub mod relu;
pub mod sigmoid;
pub mod sum;
pub mod tanh;
pub mod weights;
