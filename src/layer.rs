// layer.rs
// Description: Core network implementation. Cells with momentum state, layers, the resonance
//              transform between hidden and output layer, and the two layer network with
//              forward inference and checkpoint save and load.
//              Training lives in train.rs, token generation in generate.rs.
// History:
// - 2026-02-01: Consolidate project into 6 files: main, layer, train, math, tokenizer, utils.
// - 2026-02-01: Add checkpoint save and load for model parameters.
// - 2026-02-03: Replace transformer stack with cell based dense layers and resonance transform.
// - 2026-02-06: Add gaussian similarity smoothing rounds to the resonance transform.
// Author: Marcus Schlieper

use std::f64::consts::PI;
use std::path::PathBuf;

use ndarray::Array1;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{NetworkError, Result};
use crate::math;
use crate::utils;

pub const CHECKPOINT_MAGIC: &str = "NEUROQUANTA_NETWORK_CHECKPOINT";
pub const CHECKPOINT_VERSION: &str = "1";
pub const MODEL_SUFFIX: &str = ".nqm";

/// Below this population std the resonance transform treats activations as stagnant.
pub const STAGNATION_STD: f64 = 0.01;

// ----------------------------------------
// Cell
// ----------------------------------------

/// One neuron. Weighted sum plus bias, PulseWave activation, momentum state per parameter.
#[derive(Clone, Debug)]
pub struct Cell {
    pub weights: Array1<f64>,
    pub weight_velocity: Array1<f64>,
    pub bias: f64,
    pub bias_velocity: f64,
    /// Pre-activation of the most recent forward call.
    pub last_weighted_sum: f64,
    pub last_output: f64,
}

impl Cell {
    pub fn new<R: Rng>(i_num_inputs: usize, rng: &mut R) -> Self {
        Self {
            weights: Array1::from_shape_fn(i_num_inputs, |_| rng.random_range(-1.0_f64..=1.0)),
            weight_velocity: Array1::zeros(i_num_inputs),
            bias: rng.random_range(-1.0_f64..=1.0),
            bias_velocity: 0.0,
            last_weighted_sum: 0.0,
            last_output: 0.0,
        }
    }

    pub fn num_inputs(&self) -> usize {
        self.weights.len()
    }

    pub fn forward(&mut self, a_inputs: &Array1<f64>) -> Result<f64> {
        if a_inputs.len() != self.weights.len() {
            return Err(NetworkError::shape("cell_forward", self.weights.len(), a_inputs.len()));
        }
        self.last_weighted_sum = self.weights.dot(a_inputs) + self.bias;
        self.last_output = math::activate(self.last_weighted_sum);
        Ok(self.last_output)
    }

    /// Momentum update of all weights (scaled by their input) and the bias.
    /// d_step is the effective rate, learning rate times any boost factor.
    pub fn momentum_step(&mut self, d_delta: f64, a_inputs: &Array1<f64>, d_step: f64, d_momentum: f64) {
        for ((d_w, d_v), &d_x) in self
            .weights
            .iter_mut()
            .zip(self.weight_velocity.iter_mut())
            .zip(a_inputs.iter())
        {
            *d_v = d_momentum * *d_v + d_step * d_delta * d_x;
            *d_w += *d_v;
        }
        self.bias_velocity = d_momentum * self.bias_velocity + d_step * d_delta;
        self.bias += self.bias_velocity;
    }

    /// Undirected random walk: every weight and the bias move by scale * uniform(-1, 1).
    pub fn perturb<R: Rng>(&mut self, d_scale: f64, rng: &mut R) {
        for d_w in self.weights.iter_mut() {
            *d_w += d_scale * rng.random_range(-1.0_f64..=1.0);
        }
        self.bias += d_scale * rng.random_range(-1.0_f64..=1.0);
    }

    pub fn parameters(&self) -> usize {
        self.weights.len() + 1
    }

    // Checkpoint layout: weights, weight velocities, bias, bias velocity.
    pub fn get_parameters_flat(&self) -> Vec<f64> {
        let mut v: Vec<f64> = Vec::with_capacity(2 * self.weights.len() + 2);
        v.extend(self.weights.iter().copied());
        v.extend(self.weight_velocity.iter().copied());
        v.push(self.bias);
        v.push(self.bias_velocity);
        v
    }

    pub fn set_parameters_flat(&mut self, v_params: &[f64]) -> Result<usize> {
        let i_n = self.weights.len();
        let i_needed = 2 * i_n + 2;
        if v_params.len() < i_needed {
            return Err(NetworkError::Checkpoint("not_enough_params_cell".to_string()));
        }
        self.weights.assign(&Array1::from(v_params[..i_n].to_vec()));
        self.weight_velocity
            .assign(&Array1::from(v_params[i_n..2 * i_n].to_vec()));
        self.bias = v_params[2 * i_n];
        self.bias_velocity = v_params[2 * i_n + 1];
        Ok(i_needed)
    }
}

// ----------------------------------------
// Layer
// ----------------------------------------

#[derive(Clone, Debug)]
pub struct Layer {
    pub cells: Vec<Cell>,
}

impl Layer {
    pub fn new<R: Rng>(i_num_cells: usize, i_num_inputs: usize, rng: &mut R) -> Self {
        Self {
            cells: (0..i_num_cells).map(|_| Cell::new(i_num_inputs, rng)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Output order follows cell order.
    pub fn forward(&mut self, a_inputs: &Array1<f64>) -> Result<Array1<f64>> {
        let mut a_out = Array1::zeros(self.cells.len());
        for (i, cell) in self.cells.iter_mut().enumerate() {
            a_out[i] = cell.forward(a_inputs)?;
        }
        Ok(a_out)
    }

    pub fn parameters(&self) -> usize {
        self.cells.iter().map(|c| c.parameters()).sum()
    }

    pub fn get_parameters_flat(&self) -> Vec<f64> {
        self.cells.iter().flat_map(|c| c.get_parameters_flat()).collect()
    }

    pub fn set_parameters_flat(&mut self, v_params: &[f64]) -> Result<usize> {
        let mut i_used: usize = 0;
        for cell in self.cells.iter_mut() {
            i_used += cell.set_parameters_flat(&v_params[i_used..])?;
        }
        Ok(i_used)
    }
}

// ----------------------------------------
// Resonance transform
// ----------------------------------------

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ResonanceConfig {
    /// modulation 0.3, phase pi/8, jitter 0.05
    #[default]
    Standard,
    /// modulation 0.8, phase pi/3, jitter 0.1
    Innovative,
}

impl ResonanceConfig {
    pub fn parameters(self) -> (f64, f64, f64) {
        match self {
            ResonanceConfig::Standard => (0.3, PI / 8.0, 0.05),
            ResonanceConfig::Innovative => (0.8, PI / 3.0, 0.1),
        }
    }
}

/// Nonlinear remapping of the hidden activations. Sinusoidal modulation with per element
/// phase jitter, a random kick when the activations have collapsed, and optional rounds
/// of dense gaussian similarity smoothing.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResonanceTransform {
    pub modulation_intensity: f64,
    pub phase_base: f64,
    pub phase_jitter: f64,
    pub attention_enabled: bool,
    pub attention_rounds: usize,
    #[serde(skip, default = "utils::entropy_rng")]
    rng: StdRng,
}

impl Default for ResonanceTransform {
    fn default() -> Self {
        Self::new(ResonanceConfig::default())
    }
}

impl ResonanceTransform {
    pub fn new(config: ResonanceConfig) -> Self {
        Self::from_rng(config, utils::entropy_rng())
    }

    pub fn with_seed(config: ResonanceConfig, u64_seed: u64) -> Self {
        Self::from_rng(config, StdRng::seed_from_u64(u64_seed))
    }

    fn from_rng(config: ResonanceConfig, rng: StdRng) -> Self {
        let (d_modulation, d_phase, d_jitter) = config.parameters();
        Self {
            modulation_intensity: d_modulation,
            phase_base: d_phase,
            phase_jitter: d_jitter,
            attention_enabled: false,
            attention_rounds: 0,
            rng,
        }
    }

    /// Enable similarity smoothing with the given number of rounds.
    pub fn with_attention(mut self, i_rounds: usize) -> Self {
        self.attention_enabled = true;
        self.attention_rounds = i_rounds;
        self
    }

    pub fn with_jitter(mut self, d_jitter: f64) -> Self {
        self.phase_jitter = d_jitter.abs();
        self
    }

    pub fn reseed(&mut self, u64_seed: u64) {
        self.rng = StdRng::seed_from_u64(u64_seed);
    }

    pub fn transform(&mut self, a_activations: &Array1<f64>) -> Array1<f64> {
        let (_, d_std) = math::mean_std(a_activations);
        let b_stagnant = d_std < STAGNATION_STD;

        let mut a_out = Array1::zeros(a_activations.len());
        for (i, &d_a) in a_activations.iter().enumerate() {
            let d_phase = if self.phase_jitter > 0.0 {
                self.phase_base + self.rng.random_range(-self.phase_jitter..=self.phase_jitter)
            } else {
                self.phase_base
            };
            let d_angle = d_a * d_phase;
            let mut d_modulated =
                d_a + self.modulation_intensity * (d_angle.sin() + d_angle.cos()) * (-d_a.abs()).exp();
            if b_stagnant {
                d_modulated += self.rng.random_range(-0.5_f64..=0.5);
            }
            a_out[i] = d_modulated;
        }

        if b_stagnant {
            debug!(d_std, "resonance stagnation, perturbing activations");
        }

        if self.attention_enabled {
            for _ in 0..self.attention_rounds {
                a_out = math::similarity_smooth(&a_out);
            }
        }

        a_out
    }
}

// ----------------------------------------
// Network
// ----------------------------------------

/// Intermediate values of one forward pass, reused by the backward update.
#[derive(Clone, Debug)]
pub struct ForwardPass {
    /// Hidden activations after the resonance transform, if one is attached.
    pub hidden: Array1<f64>,
    pub output: Array1<f64>,
}

/// Dense network: input sized hidden layer, hidden sized output layer, optional resonance
/// transform in between.
#[derive(Clone, Debug)]
pub struct Network {
    pub input_size: usize,
    pub hidden_size: usize,
    pub output_size: usize,
    pub hidden_layer: Layer,
    pub output_layer: Layer,
    pub resonance: Option<ResonanceTransform>,
    pub(crate) rng: StdRng,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NetworkCheckpoint {
    pub s_magic: String,
    pub s_version: String,
    pub i_input_size: usize,
    pub i_hidden_size: usize,
    pub i_output_size: usize,
    pub v_params: Vec<f64>,
    pub resonance: Option<ResonanceTransform>,
}

impl NetworkCheckpoint {
    pub fn validate(&self) -> Result<()> {
        if self.s_magic != CHECKPOINT_MAGIC {
            return Err(NetworkError::Checkpoint("magic_mismatch".to_string()));
        }
        if self.s_version != CHECKPOINT_VERSION {
            return Err(NetworkError::Checkpoint("version_unsupported".to_string()));
        }
        let i_expected = Network::flat_len(self.i_input_size, self.i_hidden_size, self.i_output_size);
        if self.v_params.len() != i_expected {
            return Err(NetworkError::Checkpoint(format!(
                "param_count_mismatch: expected {}, got {}",
                i_expected,
                self.v_params.len()
            )));
        }
        Ok(())
    }
}

impl Network {
    pub fn new(i_input_size: usize, i_hidden_size: usize, i_output_size: usize) -> Self {
        Self::from_rng(i_input_size, i_hidden_size, i_output_size, utils::entropy_rng())
    }

    pub fn with_seed(i_input_size: usize, i_hidden_size: usize, i_output_size: usize, u64_seed: u64) -> Self {
        Self::from_rng(
            i_input_size,
            i_hidden_size,
            i_output_size,
            StdRng::seed_from_u64(u64_seed),
        )
    }

    fn from_rng(i_input_size: usize, i_hidden_size: usize, i_output_size: usize, mut rng: StdRng) -> Self {
        let hidden_layer = Layer::new(i_hidden_size, i_input_size, &mut rng);
        let output_layer = Layer::new(i_output_size, i_hidden_size, &mut rng);
        Self {
            input_size: i_input_size,
            hidden_size: i_hidden_size,
            output_size: i_output_size,
            hidden_layer,
            output_layer,
            resonance: None,
            rng,
        }
    }

    pub fn attach_resonance(&mut self, resonance: ResonanceTransform) {
        self.resonance = Some(resonance);
    }

    pub fn detach_resonance(&mut self) -> Option<ResonanceTransform> {
        self.resonance.take()
    }

    /// Reseed the network source and the attached transform.
    pub fn reseed(&mut self, u64_seed: u64) {
        self.rng = StdRng::seed_from_u64(u64_seed);
        if let Some(res) = self.resonance.as_mut() {
            res.reseed(u64_seed ^ 0xA5A5_A5A5_A5A5_A5A5);
        }
    }

    pub fn description(&self) -> String {
        let s_res = match &self.resonance {
            Some(r) if r.attention_enabled => format!("Resonance(attention x{})", r.attention_rounds),
            Some(_) => "Resonance".to_string(),
            None => "None".to_string(),
        };
        format!(
            "Input({}), Hidden({}), {}, Output({})",
            self.input_size, self.hidden_size, s_res, self.output_size
        )
    }

    pub fn parameter_count(&self) -> usize {
        self.hidden_layer.parameters() + self.output_layer.parameters()
    }

    pub fn forward_pass(&mut self, a_input: &Array1<f64>) -> Result<ForwardPass> {
        if a_input.len() != self.input_size {
            return Err(NetworkError::shape("network_input", self.input_size, a_input.len()));
        }
        let mut a_hidden = self.hidden_layer.forward(a_input)?;
        if let Some(res) = self.resonance.as_mut() {
            a_hidden = res.transform(&a_hidden);
        }
        let a_output = self.output_layer.forward(&a_hidden)?;
        Ok(ForwardPass {
            hidden: a_hidden,
            output: a_output,
        })
    }

    pub fn predict(&mut self, v_input: &[f64]) -> Result<Vec<f64>> {
        let a_input = Array1::from(v_input.to_vec());
        Ok(self.forward_pass(&a_input)?.output.to_vec())
    }

    pub fn to_integers(v_output: &[f64]) -> Vec<i64> {
        v_output.iter().map(|d| d.round_ties_even() as i64).collect()
    }

    fn flat_len(i_input_size: usize, i_hidden_size: usize, i_output_size: usize) -> usize {
        i_hidden_size * (2 * i_input_size + 2) + i_output_size * (2 * i_hidden_size + 2)
    }

    fn collect_all_parameters_flat(&self) -> Vec<f64> {
        let mut v_params = self.hidden_layer.get_parameters_flat();
        v_params.extend(self.output_layer.get_parameters_flat());
        v_params
    }

    fn assign_all_parameters_flat(&mut self, v_params: &[f64]) -> Result<()> {
        let mut i_pos = self.hidden_layer.set_parameters_flat(v_params)?;
        i_pos += self.output_layer.set_parameters_flat(&v_params[i_pos..])?;
        if i_pos != v_params.len() {
            return Err(NetworkError::Checkpoint("params_length_mismatch".to_string()));
        }
        Ok(())
    }

    pub fn to_checkpoint(&self) -> NetworkCheckpoint {
        NetworkCheckpoint {
            s_magic: CHECKPOINT_MAGIC.to_string(),
            s_version: CHECKPOINT_VERSION.to_string(),
            i_input_size: self.input_size,
            i_hidden_size: self.hidden_size,
            i_output_size: self.output_size,
            v_params: self.collect_all_parameters_flat(),
            resonance: self.resonance.clone(),
        }
    }

    pub fn from_checkpoint(cp: NetworkCheckpoint) -> Result<Self> {
        cp.validate()?;
        let mut network = Network::new(cp.i_input_size, cp.i_hidden_size, cp.i_output_size);
        network.assign_all_parameters_flat(&cp.v_params)?;
        network.resonance = cp.resonance;
        Ok(network)
    }

    /// Writes the full state to `<s_name>.nqm` and returns the path.
    pub fn save(&self, s_name: &str) -> Result<PathBuf> {
        let path = utils::artifact_path(s_name, MODEL_SUFFIX)?;
        let v_bytes = bincode::serialize(&self.to_checkpoint())?;
        utils::write_file_atomic(&path, &v_bytes)?;
        info!(path = %path.display(), bytes = v_bytes.len(), "saved network");
        Ok(path)
    }

    pub fn load(s_name: &str) -> Result<Self> {
        let path = utils::artifact_path(s_name, MODEL_SUFFIX)?;
        let v_bytes = std::fs::read(&path)?;
        let cp: NetworkCheckpoint = bincode::deserialize(&v_bytes)?;
        let network = Self::from_checkpoint(cp)?;
        info!(path = %path.display(), "loaded network {}", network.description());
        Ok(network)
    }
}
