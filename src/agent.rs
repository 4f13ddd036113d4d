//! Model-free reinforcement-learning control loop.
//!
//! [`RlAgent`] wraps a [`NeuralNetwork`] as an action-value approximator and
//! drives an external [`Environment`] one epsilon-greedy Bellman step at a
//! time. The agent never sees the environment's state directly: it asks the
//! environment to encode itself into the input buffer, and two extra slots
//! at the front of that buffer carry the previous action's exploratory flag
//! and index.

use ndarray::{aview1, Array1, ArrayView1};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::Result;
use crate::network::NeuralNetwork;
use crate::serialize;
use crate::topology::Topology;

/// The world an agent acts in. Implementations own whatever state they
/// like; the agent only ever calls these three methods, always in the order
/// `set_inputs`, `act`, `reward` within a step.
pub trait Environment {
    /// Encode the current state into `out` (length = the topology's input
    /// size, before the two reserved action slots are counted).
    fn set_inputs(&mut self, out: &mut [f64]);

    /// Apply an action to the environment.
    fn act(&mut self, action: usize);

    /// Reward for the most recent transition.
    fn reward(&mut self) -> f64;
}

/// Bellman update rule.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Algorithm {
    /// On-policy: updates the just-taken action's value toward
    /// `r + gamma * Q_next[action]`.
    Sarsa,
    /// Off-policy: updates the *previous* action's value toward
    /// `r + gamma * max(Q_next)`.
    QLearning,
}

/// An action choice and whether it came from exploration.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct Action {
    pub index: usize,
    pub exploratory: bool,
}

fn restored_rng() -> StdRng {
    StdRng::seed_from_u64(0)
}

/// An epsilon-greedy SARSA / Q-learning controller over a neural
/// action-value approximator.
///
/// # Example
///
/// ```rust
/// use minerva::agent::{Algorithm, Environment, RlAgent};
/// use minerva::topology::Topology;
///
/// struct Corridor {
///     position: usize,
/// }
///
/// impl Environment for Corridor {
///     fn set_inputs(&mut self, out: &mut [f64]) {
///         for (i, slot) in out.iter_mut().enumerate() {
///             *slot = if i == self.position { 1.0 } else { 0.0 };
///         }
///     }
///     fn act(&mut self, action: usize) {
///         if action == 0 && self.position > 0 {
///             self.position -= 1;
///         } else if action == 1 && self.position < 4 {
///             self.position += 1;
///         }
///     }
///     fn reward(&mut self) -> f64 {
///         if self.position == 4 {
///             1.0
///         } else {
///             0.0
///         }
///     }
/// }
///
/// let topology = Topology::new(5, 2).with_hidden_sizes(&[8]);
/// let mut env = Corridor { position: 0 };
/// let mut agent = RlAgent::new(Algorithm::Sarsa, 0.1, 0.2, 0.99, &topology, &mut env, 42);
/// for _ in 0..20 {
///     agent.step(&mut env);
/// }
/// ```
#[derive(Serialize, Deserialize)]
pub struct RlAgent {
    network: NeuralNetwork,
    algorithm: Algorithm,
    alpha: f64,
    epsilon: f64,
    gamma: f64,
    q_current: Array1<f64>,
    q_next: Array1<f64>,
    action: Action,
    input: Vec<f64>,
    #[serde(skip, default = "restored_rng")]
    rng: StdRng,
}

impl RlAgent {
    /// Build an agent over `topology` widened by the two reserved action
    /// slots, and load the environment's initial encoding. `alpha` is the
    /// Bellman learning rate, `epsilon` the exploration rate, `gamma` the
    /// discount factor; the seed drives both weight initialization and
    /// action sampling, so equal seeds give equal runs.
    pub fn new(
        algorithm: Algorithm,
        alpha: f64,
        epsilon: f64,
        gamma: f64,
        topology: &Topology,
        env: &mut impl Environment,
        seed: u64,
    ) -> Self {
        let mut widened = topology.clone();
        widened.input_size = topology.input_size + 2;
        let mut rng = StdRng::seed_from_u64(seed);
        let network = NeuralNetwork::new(&widened, &mut rng);

        let action_count = network.topology().output_size;
        let input_size = network.topology().input_size;
        let mut agent = RlAgent {
            network,
            algorithm,
            alpha,
            epsilon,
            gamma,
            q_current: Array1::zeros(action_count),
            q_next: Array1::zeros(action_count),
            action: Action::default(),
            input: vec![0.0; input_size],
            rng,
        };
        agent.load_inputs(env);
        agent
    }

    /// The approximator, e.g. for inspection or standalone evaluation.
    pub fn network(&self) -> &NeuralNetwork {
        &self.network
    }

    /// The most recent action.
    pub fn action(&self) -> Action {
        self.action
    }

    /// Number of available actions.
    pub fn action_count(&self) -> usize {
        self.q_current.len()
    }

    /// Current-state action value at `index` (clamped into range).
    pub fn q_value(&self, index: usize) -> f64 {
        let index = index.min(self.q_current.len() - 1);
        self.q_current[index]
    }

    /// Current-state action values from the most recent step.
    pub fn q_values(&self) -> ArrayView1<f64> {
        self.q_current.view()
    }

    /// Adjust the exploration rate, clamped into [0, 1].
    pub fn set_epsilon(&mut self, epsilon: f64) {
        self.epsilon = epsilon.clamp(0.0, 1.0);
    }

    /// One SARSA / Q-learning step.
    ///
    /// Reads the state, evaluates current action values, picks an action
    /// epsilon-greedily, applies it, collects the reward, evaluates the
    /// next state's action values, and trains the approximator against a
    /// target that shifts exactly one entry of the current values in the
    /// Bellman direction.
    pub fn step(&mut self, env: &mut impl Environment) {
        self.load_inputs(env);
        self.network.forward(aview1(&self.input));
        self.q_current.assign(&self.network.prediction());

        let last_action = self.action;
        self.action = self.choose_action();

        env.act(self.action.index);
        let reward = env.reward();

        self.load_inputs(env);
        self.network.forward(aview1(&self.input));
        self.q_next.assign(&self.network.prediction());

        let mut target = self.q_current.clone();
        match self.algorithm {
            Algorithm::Sarsa => {
                let taken = self.action.index;
                let bellman = reward + self.gamma * self.q_next[taken];
                target[taken] += self.alpha * (bellman - self.q_current[taken]);
            }
            Algorithm::QLearning => {
                let taken = last_action.index;
                let best = self
                    .q_next
                    .iter()
                    .cloned()
                    .fold(f64::NEG_INFINITY, f64::max);
                let bellman = reward + self.gamma * best;
                target[taken] += self.alpha * (bellman - self.q_current[taken]);
            }
        }
        self.network.backward(target.view());
    }

    /// Pure-exploitation action for the current state, without learning.
    /// Evaluation rollouts call this instead of [`step`](Self::step).
    pub fn greedy_action(&mut self, env: &mut impl Environment) -> usize {
        self.load_inputs(env);
        self.network.forward(aview1(&self.input));
        let index = argmax(self.network.prediction());
        self.action = Action {
            index,
            exploratory: false,
        };
        index
    }

    /// Text export of the underlying network, interchangeable with
    /// [`serialize::export_network`].
    pub fn export<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        serialize::export_network(&self.network, path)
    }

    /// Save the whole agent as a bincode snapshot. The RNG is not part of
    /// the snapshot; [`load`](Self::load) reseeds it.
    pub fn save(&self, path: &str) -> Result<()> {
        let serialized = bincode::serialize(self)?;
        fs::write(path, serialized)?;
        Ok(())
    }

    /// Load an agent from a bincode snapshot, reseeding its RNG.
    pub fn load(path: &str, seed: u64) -> Result<Self> {
        let data = fs::read(path)?;
        let mut agent: Self = bincode::deserialize(&data)?;
        agent.rng = StdRng::seed_from_u64(seed);
        Ok(agent)
    }

    /// Epsilon-greedy over the current action values.
    fn choose_action(&mut self) -> Action {
        if self.rng.gen::<f64>() < self.epsilon {
            Action {
                index: self.rng.gen_range(0..self.q_current.len()),
                exploratory: true,
            }
        } else {
            Action {
                index: argmax(self.q_current.view()),
                exploratory: false,
            }
        }
    }

    /// Fill the input buffer: previous action's exploratory flag and index,
    /// then the environment's state encoding.
    fn load_inputs(&mut self, env: &mut impl Environment) {
        self.input[0] = self.action.exploratory as u8 as f64;
        self.input[1] = self.action.index as f64;
        env.set_inputs(&mut self.input[2..]);
    }
}

/// Index of the largest value; ties go to the first-seen index.
fn argmax(values: ArrayView1<f64>) -> usize {
    let mut best = 0;
    let mut top = values[0];
    for (i, &v) in values.iter().enumerate().skip(1) {
        if v > top {
            best = i;
            top = v;
        }
    }
    best
}
