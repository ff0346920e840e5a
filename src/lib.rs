#![allow(clippy::arc_with_non_send_sync)]

pub mod layers;
pub mod network;
pub mod node;
pub mod nodes;
pub mod param;
mod reused_buf;
pub mod tensor;
#[cfg(test)]
mod tests;
