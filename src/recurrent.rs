//! Recurrent network with truncated backpropagation through time.
//!
//! Hidden layers carry an extra `(size, size)` matrix of lateral weights:
//! each neuron feeds every neuron of its own layer (itself included) one
//! time-step later. Activations and error signals live in per-layer ring
//! buffers of [`RNN_MAX_DEPTH`] slots indexed by logical time modulo the
//! depth, so look-backs older than the ring simply wrap onto zeroed or
//! overwritten slots and no allocation happens after construction.

use ndarray::{Array1, Array2, ArrayView1, Axis};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::network::FeedSource;
use crate::topology::{clamp_size, MAX_HIDDEN_LAYERS};

/// Capacity of every history/delta ring. A power of two; the truncation
/// depth is clamped below this so a window never reads its own newest slot
/// as its oldest.
pub const RNN_MAX_DEPTH: usize = 16;

/// Shape and hyperparameters of a recurrent network.
///
/// Hidden layers are always tanh and the output head is always linear, the
/// one configuration the recurrent trainer supports.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecurrentTopology {
    pub input_size: usize,
    pub output_size: usize,
    pub hidden_sizes: Vec<usize>,
    pub learning_rate: f64,
    pub bptt_depth: usize,
}

impl RecurrentTopology {
    pub fn new(input_size: usize, output_size: usize) -> Self {
        RecurrentTopology {
            input_size,
            output_size,
            hidden_sizes: vec![16],
            learning_rate: 0.01,
            bptt_depth: 4,
        }
    }

    pub fn with_hidden_sizes(mut self, sizes: &[usize]) -> Self {
        self.hidden_sizes = sizes.to_vec();
        self
    }

    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    pub fn with_bptt_depth(mut self, bptt_depth: usize) -> Self {
        self.bptt_depth = bptt_depth;
        self
    }

    /// Clamp every field into range, like [`Topology::clamped`].
    ///
    /// [`Topology::clamped`]: crate::topology::Topology::clamped
    pub fn clamped(&self) -> RecurrentTopology {
        let mut hidden_sizes: Vec<usize> = self
            .hidden_sizes
            .iter()
            .take(MAX_HIDDEN_LAYERS)
            .map(|&n| clamp_size(n))
            .collect();
        if hidden_sizes.is_empty() {
            hidden_sizes.push(1);
        }
        RecurrentTopology {
            input_size: clamp_size(self.input_size),
            output_size: clamp_size(self.output_size),
            hidden_sizes,
            learning_rate: self.learning_rate.abs(),
            bptt_depth: self.bptt_depth.clamp(1, RNN_MAX_DEPTH - 1),
        }
    }
}

/// A hidden layer of the recurrent network.
///
/// `weights` is `(fan_in, size)` like the feed-forward case;
/// `recurrent_weights` is `(size, size)` with row `i` holding neuron `i`'s
/// incoming lateral weights. `history` and `delta` are
/// `(RNN_MAX_DEPTH, size)` rings.
#[derive(Serialize, Deserialize, Clone)]
struct RecurrentLayer {
    weights: Array2<f64>,
    recurrent_weights: Array2<f64>,
    biases: Array1<f64>,
    history: Array2<f64>,
    delta: Array2<f64>,
    feed: FeedSource,
}

impl RecurrentLayer {
    /// Xavier init for feed-forward weights, `sqrt(1 / fan_in)` for the
    /// lateral ones (their fan-in is the layer's own size), zero biases.
    fn new(fan_in: usize, size: usize, feed: FeedSource, rng: &mut impl Rng) -> Self {
        let limit = (6.0 / (fan_in + size) as f64).sqrt();
        let recurrent_limit = (1.0 / size as f64).sqrt();
        RecurrentLayer {
            weights: Array2::random_using((fan_in, size), Uniform::new(-limit, limit), rng),
            recurrent_weights: Array2::random_using(
                (size, size),
                Uniform::new(-recurrent_limit, recurrent_limit),
                rng,
            ),
            biases: Array1::zeros(size),
            history: Array2::zeros((RNN_MAX_DEPTH, size)),
            delta: Array2::zeros((RNN_MAX_DEPTH, size)),
            feed,
        }
    }

    fn size(&self) -> usize {
        self.biases.len()
    }
}

/// The output layer has no lateral feedback, only a history/delta ring so
/// the window update can revisit its past predictions.
#[derive(Serialize, Deserialize, Clone)]
struct OutputLayer {
    weights: Array2<f64>,
    biases: Array1<f64>,
    history: Array2<f64>,
    delta: Array2<f64>,
}

impl OutputLayer {
    fn new(fan_in: usize, size: usize, rng: &mut impl Rng) -> Self {
        let limit = (6.0 / (fan_in + size) as f64).sqrt();
        OutputLayer {
            weights: Array2::random_using((fan_in, size), Uniform::new(-limit, limit), rng),
            biases: Array1::zeros(size),
            history: Array2::zeros((RNN_MAX_DEPTH, size)),
            delta: Array2::zeros((RNN_MAX_DEPTH, size)),
        }
    }
}

/// Gradient and error-signal statistics from the most recent backward pass.
/// Useful for spotting vanishing or exploding gradients without a debugger.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct BpttMetrics {
    pub grad_count: usize,
    pub recurrent_grad_count: usize,
    pub delta_count: usize,
    pub grad_min: f64,
    pub grad_max: f64,
    pub grad_mean: f64,
    pub recurrent_grad_min: f64,
    pub recurrent_grad_max: f64,
    pub recurrent_grad_mean: f64,
    pub delta_min: f64,
    pub delta_max: f64,
    pub delta_mean: f64,
}

impl BpttMetrics {
    fn reset(&mut self) {
        *self = BpttMetrics {
            grad_min: f64::INFINITY,
            grad_max: f64::NEG_INFINITY,
            recurrent_grad_min: f64::INFINITY,
            recurrent_grad_max: f64::NEG_INFINITY,
            delta_min: f64::INFINITY,
            delta_max: f64::NEG_INFINITY,
            ..BpttMetrics::default()
        };
    }

    fn track_grad(&mut self, g: f64) {
        self.grad_count += 1;
        self.grad_min = self.grad_min.min(g);
        self.grad_max = self.grad_max.max(g);
        self.grad_mean += g;
    }

    fn track_recurrent_grad(&mut self, g: f64) {
        self.recurrent_grad_count += 1;
        self.recurrent_grad_min = self.recurrent_grad_min.min(g);
        self.recurrent_grad_max = self.recurrent_grad_max.max(g);
        self.recurrent_grad_mean += g;
    }

    fn track_delta(&mut self, d: f64) {
        self.delta_count += 1;
        self.delta_min = self.delta_min.min(d);
        self.delta_max = self.delta_max.max(d);
        self.delta_mean += d;
    }

    fn finalize(&mut self) {
        if self.grad_count > 0 {
            self.grad_mean /= self.grad_count as f64;
        }
        if self.recurrent_grad_count > 0 {
            self.recurrent_grad_mean /= self.recurrent_grad_count as f64;
        }
        if self.delta_count > 0 {
            self.delta_mean /= self.delta_count as f64;
        }
    }
}

/// A recurrent network trained with truncated BPTT.
///
/// Each `forward` advances a monotonically increasing logical time `t` and
/// writes into slot `t % RNN_MAX_DEPTH` of every ring; `backward` revisits
/// the last `bptt_depth` slots.
///
/// # Example
///
/// ```rust
/// use minerva::recurrent::{RecurrentNetwork, RecurrentTopology};
/// use ndarray::array;
/// use rand::SeedableRng;
///
/// let topology = RecurrentTopology::new(1, 1).with_bptt_depth(4);
/// let mut rng = rand::rngs::StdRng::seed_from_u64(3);
/// let mut rnn = RecurrentNetwork::new(&topology, &mut rng);
///
/// for step in 0..32 {
///     let x = (step as f64 * 0.1).sin();
///     rnn.train(array![x].view(), array![0.5 * x].view());
/// }
/// ```
#[derive(Serialize, Deserialize, Clone)]
pub struct RecurrentNetwork {
    topology: RecurrentTopology,
    layers: Vec<RecurrentLayer>,
    output: OutputLayer,
    inputs: Array2<f64>,
    targets: Array2<f64>,
    prediction: Array1<f64>,
    t: usize,
    metrics: BpttMetrics,
}

impl RecurrentNetwork {
    /// Build a recurrent network, clamping every dimension into range.
    pub fn new(topology: &RecurrentTopology, rng: &mut impl Rng) -> Self {
        let topology = topology.clamped();
        let mut layers = Vec::with_capacity(topology.hidden_sizes.len());
        let mut fan_in = topology.input_size;
        for (i, &size) in topology.hidden_sizes.iter().enumerate() {
            let feed = if i == 0 {
                FeedSource::ExternalInput
            } else {
                FeedSource::Previous(i - 1)
            };
            layers.push(RecurrentLayer::new(fan_in, size, feed, rng));
            fan_in = size;
        }
        let output = OutputLayer::new(fan_in, topology.output_size, rng);
        let inputs = Array2::zeros((RNN_MAX_DEPTH, topology.input_size));
        let targets = Array2::zeros((RNN_MAX_DEPTH, topology.output_size));
        let prediction = Array1::zeros(topology.output_size);
        RecurrentNetwork {
            topology,
            layers,
            output,
            inputs,
            targets,
            prediction,
            t: 0,
            metrics: BpttMetrics::default(),
        }
    }

    pub fn topology(&self) -> &RecurrentTopology {
        &self.topology
    }

    pub fn prediction(&self) -> ArrayView1<f64> {
        self.prediction.view()
    }

    /// Statistics from the most recent `backward` call.
    pub fn metrics(&self) -> &BpttMetrics {
        &self.metrics
    }

    /// Logical time, incremented once per forward pass.
    pub fn time(&self) -> usize {
        self.t
    }

    /// Ring slot holding the state from `back` steps before the current
    /// time-step.
    fn slot(&self, back: usize) -> usize {
        (self.t % RNN_MAX_DEPTH + RNN_MAX_DEPTH - back % RNN_MAX_DEPTH) % RNN_MAX_DEPTH
    }

    /// Input snapshot from `back` steps ago.
    #[cfg(test)]
    pub(crate) fn input_snapshot(&self, back: usize) -> ArrayView1<f64> {
        self.inputs.row(self.slot(back))
    }

    /// First hidden layer's activations from `back` steps ago.
    #[cfg(test)]
    pub(crate) fn history_snapshot(&self, back: usize) -> ArrayView1<f64> {
        self.layers[0].history.row(self.slot(back))
    }

    /// Advance time, snapshot the input and target at the new slot, and
    /// propagate: each hidden neuron sums its feed-forward inputs at this
    /// step plus its lateral inputs from the previous step, then tanh; the
    /// output head is linear. Returns the mean squared error at this step.
    pub fn forward(&mut self, input: ArrayView1<f64>, target: ArrayView1<f64>) -> f64 {
        self.t += 1;
        let now = self.slot(0);
        let then = self.slot(1);

        copy_row(&mut self.inputs, now, input);
        copy_row(&mut self.targets, now, target);

        for i in 0..self.layers.len() {
            let (before, rest) = self.layers.split_at_mut(i);
            let layer = &mut rest[0];
            let source = match layer.feed {
                FeedSource::ExternalInput => self.inputs.row(now),
                FeedSource::Previous(j) => before[j].history.row(now),
            };
            let lateral = layer.recurrent_weights.dot(&layer.history.row(then));
            let mut values = source.dot(&layer.weights) + lateral + &layer.biases;
            values.mapv_inplace(f64::tanh);
            layer.history.row_mut(now).assign(&values);
        }

        let feed = self
            .layers
            .last()
            .expect("recurrent network always has a hidden layer");
        let values = feed.history.row(now).dot(&self.output.weights) + &self.output.biases;
        self.output.history.row_mut(now).assign(&values);
        self.prediction.assign(&values);

        let diff = &self.prediction - &self.targets.row(now);
        diff.mapv(|d| d * d).sum() / self.topology.output_size as f64
    }

    /// One truncated-BPTT parameter update over the last `bptt_depth` steps.
    ///
    /// Error signals are computed for the whole window first (output layer
    /// at every retained step, then hidden layers oldest to newest so the
    /// lateral term reads this window's fresh deltas), and the gradients of
    /// every step are accumulated before a single application at
    /// `learning_rate / bptt_depth`. Lateral edges take the previous step's
    /// activation as their input; feed-forward edges the same step's source.
    pub fn backward(&mut self) {
        let depth = self.topology.bptt_depth;
        let rate = self.topology.learning_rate / depth as f64;
        self.metrics.reset();

        // output-layer deltas at every retained step
        for back in 0..depth {
            let when = self.slot(back);
            for i in 0..self.output.biases.len() {
                let d = self.output.history[[when, i]] - self.targets[[when, i]];
                self.output.delta[[when, i]] = d;
                self.metrics.track_delta(d);
            }
        }

        // hidden-layer deltas, oldest step first, reverse layer order
        for back in (0..depth).rev() {
            let now = self.slot(back);
            let then = self.slot(back + 1);
            for l in (0..self.layers.len()).rev() {
                let spatial: Array1<f64> = if l == self.layers.len() - 1 {
                    self.output.weights.dot(&self.output.delta.row(now))
                } else {
                    let next = &self.layers[l + 1];
                    next.weights.dot(&next.delta.row(now))
                };
                let layer = &mut self.layers[l];
                let temporal = layer.recurrent_weights.dot(&layer.delta.row(then));
                let mut deltas = spatial + temporal;
                for (i, d) in deltas.iter_mut().enumerate() {
                    let v = layer.history[[now, i]];
                    *d *= 1.0 - v * v;
                    self.metrics.track_delta(*d);
                }
                layer.delta.row_mut(now).assign(&deltas);
            }
        }

        // accumulate gradients across the window, then apply once
        let mut output_wgrad = Array2::<f64>::zeros(self.output.weights.dim());
        let mut output_bgrad = Array1::<f64>::zeros(self.output.biases.len());
        let mut wgrads: Vec<Array2<f64>> = self
            .layers
            .iter()
            .map(|l| Array2::zeros(l.weights.dim()))
            .collect();
        let mut rgrads: Vec<Array2<f64>> = self
            .layers
            .iter()
            .map(|l| Array2::zeros(l.recurrent_weights.dim()))
            .collect();
        let mut bgrads: Vec<Array1<f64>> = self
            .layers
            .iter()
            .map(|l| Array1::zeros(l.size()))
            .collect();

        for back in 0..depth {
            let now = self.slot(back);
            let then = self.slot(back + 1);

            let output_delta = self.output.delta.row(now);
            let feed = &self.layers[self.layers.len() - 1];
            let step_grad = outer(feed.history.row(now), output_delta);
            for &g in step_grad.iter() {
                self.metrics.track_grad(g);
            }
            output_wgrad += &step_grad;
            output_bgrad += &output_delta;

            for l in 0..self.layers.len() {
                let layer = &self.layers[l];
                let delta = layer.delta.row(now);
                bgrads[l] += &delta;

                // lateral edge input is the previous step's activation
                let step_rgrad = outer(delta, layer.history.row(then));
                for &g in step_rgrad.iter() {
                    self.metrics.track_recurrent_grad(g);
                }
                rgrads[l] += &step_rgrad;

                let step_wgrad = match layer.feed {
                    FeedSource::ExternalInput => outer(self.inputs.row(now), delta),
                    FeedSource::Previous(j) => outer(self.layers[j].history.row(now), delta),
                };
                for &g in step_wgrad.iter() {
                    self.metrics.track_grad(g);
                }
                wgrads[l] += &step_wgrad;
            }
        }

        self.output
            .weights
            .zip_mut_with(&output_wgrad, |w, &g| *w -= rate * g);
        self.output
            .biases
            .zip_mut_with(&output_bgrad, |b, &g| *b -= rate * g);
        for (l, layer) in self.layers.iter_mut().enumerate() {
            layer.weights.zip_mut_with(&wgrads[l], |w, &g| *w -= rate * g);
            layer
                .recurrent_weights
                .zip_mut_with(&rgrads[l], |w, &g| *w -= rate * g);
            layer.biases.zip_mut_with(&bgrads[l], |b, &g| *b -= rate * g);
        }

        self.metrics.finalize();
    }

    /// Forward then one BPTT update; returns this step's mean squared error.
    pub fn train(&mut self, input: ArrayView1<f64>, target: ArrayView1<f64>) -> f64 {
        let mse = self.forward(input, target);
        self.backward();
        mse
    }

    /// Zero every history, delta, and snapshot ring, e.g. between unrelated
    /// sequences. Weights and the time counter are untouched.
    pub fn reset_history(&mut self) {
        for layer in &mut self.layers {
            layer.history.fill(0.0);
            layer.delta.fill(0.0);
        }
        self.output.history.fill(0.0);
        self.output.delta.fill(0.0);
        self.inputs.fill(0.0);
        self.targets.fill(0.0);
    }
}

/// Outer product `column . row` as a fresh `(a.len(), b.len())` matrix.
fn outer(a: ArrayView1<f64>, b: ArrayView1<f64>) -> Array2<f64> {
    a.insert_axis(Axis(1)).dot(&b.insert_axis(Axis(0)))
}

/// Copy the overlapping prefix of `source` into row `row`, zeroing the rest.
fn copy_row(buffer: &mut Array2<f64>, row: usize, source: ArrayView1<f64>) {
    let mut target = buffer.row_mut(row);
    let n = target.len().min(source.len());
    target.fill(0.0);
    for i in 0..n {
        target[i] = source[i];
    }
}
