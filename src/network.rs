use ndarray::{Array1, Array2, ArrayView1, Axis};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{Read, Write};

use crate::error::Result;
use crate::topology::Topology;

/// Where a layer reads its inputs from.
///
/// The first layer reads the network's external input buffer; every other
/// layer reads the activations of the layer at the given index. Layers are
/// owned by the network and refer to each other by index only.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeedSource {
    ExternalInput,
    Previous(usize),
}

/// Position of a layer in the chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LayerKind {
    First,
    Hidden,
    Output,
}

/// A fully connected layer: weight matrix, bias vector, and the forward-pass
/// state the backward pass needs (pre-activation sums, activated values, and
/// the per-neuron error signal).
///
/// `weights` is `(fan_in, size)`: column `i` holds the incoming weights of
/// neuron `i`.
#[derive(Serialize, Deserialize, Clone)]
pub struct Layer {
    pub weights: Array2<f64>,
    pub biases: Array1<f64>,
    pub kind: LayerKind,
    pub feed: FeedSource,
    pre_activation: Array1<f64>,
    value: Array1<f64>,
    delta: Array1<f64>,
}

impl Layer {
    /// New layer with weights drawn uniformly from (-1, 1) and zero biases.
    fn new(fan_in: usize, size: usize, kind: LayerKind, feed: FeedSource, rng: &mut impl Rng) -> Self {
        Layer {
            weights: Array2::random_using((fan_in, size), Uniform::new(-1.0, 1.0), rng),
            biases: Array1::zeros(size),
            kind,
            feed,
            pre_activation: Array1::zeros(size),
            value: Array1::zeros(size),
            delta: Array1::zeros(size),
        }
    }

    /// All-zero layer, used when every weight will be filled in afterwards.
    fn zeroed(fan_in: usize, size: usize, kind: LayerKind, feed: FeedSource) -> Self {
        Layer {
            weights: Array2::zeros((fan_in, size)),
            biases: Array1::zeros(size),
            kind,
            feed,
            pre_activation: Array1::zeros(size),
            value: Array1::zeros(size),
            delta: Array1::zeros(size),
        }
    }

    pub fn size(&self) -> usize {
        self.biases.len()
    }

    pub fn fan_in(&self) -> usize {
        self.weights.nrows()
    }

    /// Activated values from the most recent forward pass.
    pub fn value(&self) -> ArrayView1<f64> {
        self.value.view()
    }

    /// Pre-activation sums from the most recent forward pass.
    pub fn pre_activation(&self) -> ArrayView1<f64> {
        self.pre_activation.view()
    }
}

/// A feed-forward neural network: an owned chain of layers (hidden layers
/// first, then exactly one output layer) plus the input/target/prediction
/// buffers, all sized once at construction from the clamped topology.
///
/// # Example
///
/// ```rust
/// use minerva::network::NeuralNetwork;
/// use minerva::topology::Topology;
/// use ndarray::array;
/// use rand::SeedableRng;
///
/// let topology = Topology::new(2, 1).with_hidden_sizes(&[8]);
/// let mut rng = rand::rngs::StdRng::seed_from_u64(7);
/// let mut network = NeuralNetwork::new(&topology, &mut rng);
///
/// let input = array![0.5, -0.25];
/// let target = array![1.0];
/// let mse = network.train(input.view(), target.view());
/// assert!(mse.is_finite());
/// ```
#[derive(Serialize, Deserialize, Clone)]
pub struct NeuralNetwork {
    topology: Topology,
    pub layers: Vec<Layer>,
    input: Array1<f64>,
    target: Array1<f64>,
    prediction: Array1<f64>,
}

impl NeuralNetwork {
    /// Build a network from a topology, clamping every dimension into range.
    /// Weights are drawn uniformly from (-1, 1) with the caller's generator;
    /// biases start at zero. There is no error path.
    pub fn new(topology: &Topology, rng: &mut impl Rng) -> Self {
        let topology = topology.clamped();
        let layers = build_layers(&topology, |fan_in, size, kind, feed| {
            Layer::new(fan_in, size, kind, feed, rng)
        });
        let input = Array1::zeros(topology.input_size);
        let target = Array1::zeros(topology.output_size);
        let prediction = Array1::zeros(topology.output_size);
        NeuralNetwork {
            topology,
            layers,
            input,
            target,
            prediction,
        }
    }

    /// Build a network with every weight and bias at zero. Deterministic;
    /// the importer fills such a network from a token stream.
    pub fn zeroed(topology: &Topology) -> Self {
        let topology = topology.clamped();
        let layers = build_layers(&topology, Layer::zeroed);
        let input = Array1::zeros(topology.input_size);
        let target = Array1::zeros(topology.output_size);
        let prediction = Array1::zeros(topology.output_size);
        NeuralNetwork {
            topology,
            layers,
            input,
            target,
            prediction,
        }
    }

    /// The clamped topology this network was built from.
    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Prediction from the most recent forward pass.
    pub fn prediction(&self) -> ArrayView1<f64> {
        self.prediction.view()
    }

    /// Evaluate the network on an input vector.
    ///
    /// Copies the input into the network's buffer (extra values are ignored,
    /// missing ones read as zero), then propagates layer by layer: each
    /// neuron's pre-activation is `bias + weights . source`, hidden layers
    /// apply the configured activation, the output layer applies the output
    /// head. The per-layer caches this fills are what `backward` consumes.
    pub fn forward(&mut self, input: ArrayView1<f64>) -> ArrayView1<f64> {
        copy_into(&mut self.input, input);

        for i in 0..self.layers.len() {
            let (before, rest) = self.layers.split_at_mut(i);
            let layer = &mut rest[0];
            let source = match layer.feed {
                FeedSource::ExternalInput => self.input.view(),
                FeedSource::Previous(j) => before[j].value.view(),
            };
            layer.pre_activation.assign(&(source.dot(&layer.weights) + &layer.biases));
            match layer.kind {
                LayerKind::Output => {
                    let head = self.topology.output;
                    layer.value = layer.pre_activation.mapv(|x| head.apply(x));
                }
                _ => {
                    let act = self.topology.activation;
                    layer.value = layer.pre_activation.mapv(|x| act.apply(x));
                }
            }
        }

        let last = self.layers.last().expect("network always has an output layer");
        self.prediction.assign(&last.value);
        self.prediction.view()
    }

    /// One backpropagation step against a target vector, using the cached
    /// state of the most recent `forward` call.
    ///
    /// All per-neuron deltas are computed first (output layer from the loss
    /// derivative, hidden layers in reverse order through the next layer's
    /// still-unmodified weights), and only then are the weight and bias
    /// updates applied: `w -= lr * (delta * source - l2 * w)`,
    /// `b -= lr * delta`.
    pub fn backward(&mut self, target: ArrayView1<f64>) {
        self.backward_with_rate(target, self.topology.learning_rate);
    }

    /// [`backward`](Self::backward) with the topology's learning rate
    /// overridden for this one step. Negative rates are taken absolute,
    /// like every other rate in the crate.
    pub fn backward_with_rate(&mut self, target: ArrayView1<f64>, learning_rate: f64) {
        copy_into(&mut self.target, target);

        let lr = learning_rate.abs();
        let lambda = self.topology.l2_decay;
        let count = self.layers.len();

        // output deltas
        {
            let head = self.topology.output;
            let out = &mut self.layers[count - 1];
            for i in 0..out.size() {
                let v = out.value[i];
                out.delta[i] = head.derivative(v) * (v - self.target[i]);
            }
        }

        // hidden deltas, reverse layer order
        for l in (0..count - 1).rev() {
            let (current, next) = self.layers.split_at_mut(l + 1);
            let layer = &mut current[l];
            let next = &next[0];
            let propagated = next.weights.dot(&next.delta);
            for i in 0..layer.size() {
                layer.delta[i] = self.topology.activation.derivative(layer.value[i]) * propagated[i];
            }
        }

        // apply updates now that every delta is fixed
        for i in 0..count {
            let (before, rest) = self.layers.split_at_mut(i);
            let layer = &mut rest[0];
            let source = match layer.feed {
                FeedSource::ExternalInput => self.input.view(),
                FeedSource::Previous(j) => before[j].value.view(),
            };
            let gradient = source
                .insert_axis(Axis(1))
                .dot(&layer.delta.view().insert_axis(Axis(0)));
            layer
                .weights
                .zip_mut_with(&gradient, |w, &g| *w -= lr * (g - lambda * *w));
            layer.biases.zip_mut_with(&layer.delta, |b, &d| *b -= lr * d);
        }
    }

    /// Forward then backward, returning the mean squared error of the
    /// prediction made before the update.
    pub fn train(&mut self, input: ArrayView1<f64>, target: ArrayView1<f64>) -> f64 {
        self.forward(input);
        self.backward(target);
        let diff = &self.prediction - &self.target;
        diff.mapv(|d| d * d).sum() / self.target.len() as f64
    }

    /// Save the network's state to a file as a bincode snapshot.
    pub fn save(&self, path: &str) -> Result<()> {
        let serialized = bincode::serialize(self)?;
        let mut file = fs::File::create(path)?;
        file.write_all(&serialized)?;
        Ok(())
    }

    /// Load a network from a bincode snapshot.
    pub fn load(path: &str) -> Result<Self> {
        let mut file = fs::File::open(path)?;
        let mut buffer = Vec::new();
        file.read_to_end(&mut buffer)?;
        let deserialized: Self = bincode::deserialize(&buffer)?;
        Ok(deserialized)
    }
}

fn build_layers<F>(topology: &Topology, mut make: F) -> Vec<Layer>
where
    F: FnMut(usize, usize, LayerKind, FeedSource) -> Layer,
{
    let hidden_count = topology.hidden_sizes.len();
    let mut layers = Vec::with_capacity(hidden_count + 1);
    let mut fan_in = topology.input_size;
    for (i, &size) in topology.hidden_sizes.iter().enumerate() {
        let kind = if i == 0 { LayerKind::First } else { LayerKind::Hidden };
        let feed = if i == 0 {
            FeedSource::ExternalInput
        } else {
            FeedSource::Previous(i - 1)
        };
        layers.push(make(fan_in, size, kind, feed));
        fan_in = size;
    }
    layers.push(make(
        fan_in,
        topology.output_size,
        LayerKind::Output,
        FeedSource::Previous(hidden_count - 1),
    ));
    layers
}

/// Copy the overlapping prefix of `source` into `buffer`, zeroing the rest.
/// Length mismatches are tolerated, never reported.
fn copy_into(buffer: &mut Array1<f64>, source: ArrayView1<f64>) {
    let n = buffer.len().min(source.len());
    buffer.fill(0.0);
    for i in 0..n {
        buffer[i] = source[i];
    }
}
