//! Activation functions and the output head.
//!
//! Derivatives are expressed in terms of the *activated output* rather than
//! the pre-activation sum: `tanh' = 1 - v^2`, `sigmoid' = v * (1 - v)`, and
//! so on. The backward pass only keeps post-activation values around, so
//! every derivative here must accept those.

use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// An enumeration of the activation functions available to hidden layers.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, Default)]
pub enum Activation {
    Sigmoid,
    #[default]
    Tanh,
    Relu,
    LeakyRelu { alpha: f64 },
    Linear,
}

/// Slope used for `LeakyRelu` when none is given (and when one is
/// reconstructed from the wire code, which does not carry the slope).
pub const DEFAULT_LEAKY_ALPHA: f64 = 0.01;

impl Activation {
    /// Apply the activation function to a pre-activation value.
    pub fn apply(&self, x: f64) -> f64 {
        match self {
            Activation::Sigmoid => 1.0 / (1.0 + (-x).exp()),
            Activation::Tanh => x.tanh(),
            Activation::Relu => x.max(0.0),
            Activation::LeakyRelu { alpha } => {
                if x > 0.0 {
                    x
                } else {
                    alpha * x
                }
            }
            Activation::Linear => x,
        }
    }

    /// Derivative of the activation, given the *activated output* `v`.
    pub fn derivative(&self, v: f64) -> f64 {
        match self {
            Activation::Sigmoid => v * (1.0 - v),
            Activation::Tanh => 1.0 - v * v,
            Activation::Relu => {
                if v > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Activation::LeakyRelu { alpha } => {
                if v > 0.0 {
                    1.0
                } else {
                    *alpha
                }
            }
            Activation::Linear => 1.0,
        }
    }

    /// Apply the activation function to an array in-place.
    pub fn apply_inplace(&self, values: &mut Array1<f64>) {
        values.mapv_inplace(|x| self.apply(x));
    }

    /// Elementwise derivative of an array of activated outputs.
    pub fn derivative_of_output(&self, values: &Array1<f64>) -> Array1<f64> {
        values.mapv(|v| self.derivative(v))
    }

    /// Stable integer code used by the text serialization format.
    pub fn code(&self) -> i32 {
        match self {
            Activation::Sigmoid => 0,
            Activation::Tanh => 1,
            Activation::Relu => 2,
            Activation::LeakyRelu { .. } => 3,
            Activation::Linear => 4,
        }
    }

    /// Inverse of [`code`](Self::code). Unknown codes fall back to sigmoid,
    /// the zero value of the format.
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => Activation::Tanh,
            2 => Activation::Relu,
            3 => Activation::LeakyRelu {
                alpha: DEFAULT_LEAKY_ALPHA,
            },
            4 => Activation::Linear,
            _ => Activation::Sigmoid,
        }
    }
}

/// Activation applied by the output layer.
///
/// The regression configuration keeps the output linear; a sigmoid head is
/// supported for callers that want outputs squashed into (0, 1).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum OutputKind {
    #[default]
    Linear,
    Sigmoid,
}

impl OutputKind {
    pub fn apply(&self, x: f64) -> f64 {
        match self {
            OutputKind::Linear => x,
            OutputKind::Sigmoid => 1.0 / (1.0 + (-x).exp()),
        }
    }

    /// Derivative given the activated output `v`.
    pub fn derivative(&self, v: f64) -> f64 {
        match self {
            OutputKind::Linear => 1.0,
            OutputKind::Sigmoid => v * (1.0 - v),
        }
    }
}
