//! # Minerva - Small-Network Training and Reinforcement Learning
//!
//! Minerva is a self-contained training engine for small, fixed-capacity
//! neural networks, together with a model-free reinforcement-learning
//! control loop built on top of it. Gradients are derived analytically per
//! layer type; there is no autodiff, no GPU path, and no background work.
//! Every public operation runs to completion on the calling thread.
//!
//! ## What's inside
//!
//! - **Feed-forward networks**: topology construction with silent
//!   clamp-into-range sizing, forward propagation, backpropagation with
//!   optional L2 weight decay
//! - **Recurrent networks**: lateral per-layer feedback trained by
//!   depth-limited backpropagation through time over ring-buffered history
//! - **Serialization**: a deterministic line-oriented text format for
//!   trained weights, plus bincode snapshots
//! - **Reinforcement learning**: an epsilon-greedy SARSA / Q-learning
//!   controller driving any environment that implements a three-method trait
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use minerva::agent::{Algorithm, RlAgent};
//! use minerva::activations::Activation;
//! use minerva::topology::Topology;
//! # use minerva::agent::Environment;
//! # struct MyEnv;
//! # impl Environment for MyEnv {
//! #     fn set_inputs(&mut self, out: &mut [f64]) {}
//! #     fn act(&mut self, action: usize) {}
//! #     fn reward(&mut self) -> f64 { 0.0 }
//! # }
//!
//! let topology = Topology::new(5, 2)
//!     .with_hidden_sizes(&[8])
//!     .with_activation(Activation::Relu)
//!     .with_learning_rate(0.01);
//!
//! let mut env = MyEnv;
//! let mut agent = RlAgent::new(Algorithm::Sarsa, 0.1, 0.2, 0.99, &topology, &mut env, 42);
//! for _ in 0..1000 {
//!     agent.step(&mut env);
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`activations`] - Activation functions and the output head
//! - [`agent`] - The SARSA / Q-learning controller and environment trait
//! - [`error`] - Error types and result handling
//! - [`network`] - Feed-forward networks: forward and backward passes
//! - [`recurrent`] - Recurrent networks trained with truncated BPTT
//! - [`serialize`] - Text import/export of trained networks
//! - [`topology`] - Network shape and hyperparameters

pub mod activations;
pub mod agent;
pub mod error;
pub mod network;
pub mod recurrent;
pub mod serialize;
pub mod topology;

#[cfg(test)]
mod tests;
