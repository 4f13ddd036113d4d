use serde::{Deserialize, Serialize};

use crate::activations::{Activation, OutputKind};

/// Hard upper bound on neurons per layer (and on the input/output widths).
pub const MAX_NEURONS: usize = 128;

/// Hard upper bound on the number of hidden layers.
pub const MAX_HIDDEN_LAYERS: usize = 8;

/// Shape and hyperparameters of a feed-forward network.
///
/// A `Topology` is a plain description; nothing is validated until a network
/// is built from it, at which point every dimension is silently clamped into
/// range. Out-of-range configuration is never an error.
///
/// # Example
///
/// ```rust
/// use minerva::topology::Topology;
/// use minerva::activations::Activation;
///
/// let topology = Topology::new(4, 2)
///     .with_hidden_sizes(&[16, 16])
///     .with_activation(Activation::Relu)
///     .with_learning_rate(0.01);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Topology {
    pub input_size: usize,
    pub output_size: usize,
    pub hidden_sizes: Vec<usize>,
    pub activation: Activation,
    pub output: OutputKind,
    pub learning_rate: f64,
    pub l2_decay: f64,
}

impl Topology {
    /// A single hidden layer of 16 tanh neurons, linear output, learning
    /// rate 0.01, no weight decay.
    pub fn new(input_size: usize, output_size: usize) -> Self {
        Topology {
            input_size,
            output_size,
            hidden_sizes: vec![16],
            activation: Activation::default(),
            output: OutputKind::default(),
            learning_rate: 0.01,
            l2_decay: 0.0,
        }
    }

    pub fn with_hidden_sizes(mut self, sizes: &[usize]) -> Self {
        self.hidden_sizes = sizes.to_vec();
        self
    }

    pub fn with_activation(mut self, activation: Activation) -> Self {
        self.activation = activation;
        self
    }

    pub fn with_output(mut self, output: OutputKind) -> Self {
        self.output = output;
        self
    }

    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    pub fn with_l2_decay(mut self, l2_decay: f64) -> Self {
        self.l2_decay = l2_decay;
        self
    }

    /// Copy of this topology with every field forced into its valid range:
    /// sizes into `[1, MAX_NEURONS]`, the hidden-layer list into
    /// `[1, MAX_HIDDEN_LAYERS]` entries (an empty list becomes one layer of
    /// one neuron), rates to their absolute values.
    pub fn clamped(&self) -> Topology {
        let mut hidden_sizes: Vec<usize> = self
            .hidden_sizes
            .iter()
            .take(MAX_HIDDEN_LAYERS)
            .map(|&n| clamp_size(n))
            .collect();
        if hidden_sizes.is_empty() {
            hidden_sizes.push(1);
        }
        Topology {
            input_size: clamp_size(self.input_size),
            output_size: clamp_size(self.output_size),
            hidden_sizes,
            activation: self.activation,
            output: self.output,
            learning_rate: self.learning_rate.abs(),
            l2_decay: self.l2_decay.abs(),
        }
    }
}

pub(crate) fn clamp_size(n: usize) -> usize {
    n.clamp(1, MAX_NEURONS)
}
