//! Line-oriented text format for trained feed-forward networks.
//!
//! The format is a header (`AC`, `L2`, `LR`, `NI`, `NO`, `NH` records, one
//! per line) followed by one `HID:` marker per hidden layer and a final
//! `OUT:` marker, each marker followed by one line per neuron:
//!
//! ```text
//! W:<weight> W:<weight> ... B:<bias>
//! ```
//!
//! Floats carry 17 significant digits, enough to reproduce every f64
//! exactly. The reader trusts the markers over the header: hidden-layer
//! count comes from counting `HID:` lines and neurons-per-layer from
//! counting the `W:` lines under each, so a file with a wrong `NH` still
//! loads. Unparsable weight or bias tokens fall back to 0.0 instead of
//! aborting the import; only a missing or unreadable file is an error, and
//! in that case no network is constructed at all.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use crate::activations::Activation;
use crate::error::Result;
use crate::network::{Layer, NeuralNetwork};
use crate::topology::Topology;

/// Write a network to a file in the text format.
pub fn export_network<P: AsRef<Path>>(network: &NeuralNetwork, path: P) -> Result<()> {
    let file = File::create(path)?;
    write_network(network, BufWriter::new(file))
}

/// Read a network back from a file written by [`export_network`].
pub fn import_network<P: AsRef<Path>>(path: P) -> Result<NeuralNetwork> {
    let file = File::open(path)?;
    read_network(BufReader::new(file))
}

/// Write a network to any writer in the text format.
pub fn write_network<W: Write>(network: &NeuralNetwork, mut writer: W) -> Result<()> {
    let topology = network.topology();
    writeln!(writer, "AC {}", topology.activation.code())?;
    writeln!(writer, "L2 {:.16e}", topology.l2_decay)?;
    writeln!(writer, "LR {:.16e}", topology.learning_rate)?;
    writeln!(writer, "NI {}", topology.input_size)?;
    writeln!(writer, "NO {}", topology.output_size)?;
    writeln!(writer, "NH {}", topology.hidden_sizes.len())?;

    let hidden_count = network.layers.len() - 1;
    for layer in &network.layers[..hidden_count] {
        writeln!(writer, "HID:")?;
        write_layer_neurons(&mut writer, layer)?;
    }
    writeln!(writer, "OUT:")?;
    write_layer_neurons(&mut writer, &network.layers[hidden_count])?;
    Ok(())
}

fn write_layer_neurons<W: Write>(writer: &mut W, layer: &Layer) -> Result<()> {
    for neuron in 0..layer.size() {
        for j in 0..layer.fan_in() {
            write!(writer, "W:{:.16e} ", layer.weights[[j, neuron]])?;
        }
        writeln!(writer, "B:{:.16e}", layer.biases[neuron])?;
    }
    Ok(())
}

/// Read a network from any buffered reader.
pub fn read_network<R: BufRead>(reader: R) -> Result<NeuralNetwork> {
    let lines: Vec<String> = reader.lines().collect::<std::io::Result<_>>()?;

    // first pass: header fields plus layer shape from the markers
    let mut activation_code = 0i32;
    let mut l2_decay = 0.0f64;
    let mut learning_rate = 0.0f64;
    let mut input_size = 0usize;
    let mut output_size = 0usize;
    let mut hidden_sizes: Vec<usize> = Vec::new();
    let mut counting = true;
    for line in &lines {
        if let Some(rest) = line.strip_prefix("AC ") {
            activation_code = rest.trim().parse().unwrap_or(0);
        } else if let Some(rest) = line.strip_prefix("L2 ") {
            l2_decay = rest.trim().parse().unwrap_or(0.0);
        } else if let Some(rest) = line.strip_prefix("LR ") {
            learning_rate = rest.trim().parse().unwrap_or(0.0);
        } else if let Some(rest) = line.strip_prefix("NI ") {
            input_size = rest.trim().parse().unwrap_or(0);
        } else if let Some(rest) = line.strip_prefix("NO ") {
            output_size = rest.trim().parse().unwrap_or(0);
        } else if line.starts_with("HID:") {
            hidden_sizes.push(0);
        } else if line.starts_with("OUT:") {
            counting = false;
        } else if counting && line.starts_with('W') {
            if let Some(last) = hidden_sizes.last_mut() {
                *last += 1;
            }
        }
    }

    let topology = Topology {
        input_size,
        output_size,
        hidden_sizes,
        activation: Activation::from_code(activation_code),
        output: Default::default(),
        learning_rate,
        l2_decay,
    };
    let mut network = NeuralNetwork::zeroed(&topology);

    // second pass: fill weights and biases
    let mut layer: Option<usize> = None;
    let mut in_output = false;
    let mut neuron = 0usize;
    let output_index = network.layers.len() - 1;
    for line in &lines {
        if line.starts_with("HID:") {
            layer = Some(layer.map_or(0, |l| l + 1));
            in_output = false;
            neuron = 0;
        } else if line.starts_with("OUT:") {
            layer = Some(output_index);
            in_output = true;
            neuron = 0;
        } else if line.starts_with('W') {
            match layer {
                Some(l) if in_output || l < output_index => {
                    fill_neuron(&mut network, l, neuron, line);
                    neuron += 1;
                }
                _ => {}
            }
        }
    }

    Ok(network)
}

fn fill_neuron(network: &mut NeuralNetwork, layer: usize, neuron: usize, line: &str) {
    let target = &mut network.layers[layer];
    if neuron >= target.size() {
        return;
    }
    let mut index = 0usize;
    for token in line.split_whitespace() {
        if let Some(value) = token.strip_prefix("W:") {
            if index < target.fan_in() {
                target.weights[[index, neuron]] = value.parse().unwrap_or(0.0);
                index += 1;
            }
        } else if let Some(value) = token.strip_prefix("B:") {
            target.biases[neuron] = value.parse().unwrap_or(0.0);
        }
    }
}
