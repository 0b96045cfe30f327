// train.rs
// Description: Training. Momentum gradient steps with stabilized deltas, the error driven
//              modulation nudge, the adaptive learning rate schedule and random refinement
//              bursts. Also holds the dialogue dataset used by the menu driver.
// History:
// - 2026-02-01: Consolidate project into 6 files: main, layer, train, math, tokenizer, utils.
// - 2026-02-03: Move training loop out of layer.rs, add momentum and stabilized deltas.
// - 2026-02-05: Add adaptive learning rate, delta clipping and refinement bursts.
// Author: Marcus Schlieper

use ndarray::Array1;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{NetworkError, Result};
use crate::generate::window_from_ids;
use crate::layer::Network;
use crate::math;
use crate::tokenizer::Tokenizer;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorMetric {
    /// Sum of |target - output| over outputs.
    Absolute,
    /// Mean of (target - output)^2 over outputs.
    MeanSquared,
}

#[derive(Clone, Debug)]
pub struct TrainConfig {
    pub i_epochs: usize,
    pub d_learning_rate: f64,
    pub d_momentum: f64,
    pub error_metric: ErrorMetric,
    pub b_clip_delta: bool,
    pub b_adaptive_lr: bool,
    /// Number of refinement bursts spread over the run, 0 disables refinement.
    pub i_refinement_cycles: usize,
    pub i_refinement_epochs: usize,
    /// Multiplier on the gradient step.
    pub d_boost_factor: f64,
    /// Multiplier on the refinement noise.
    pub d_refinement_boost: f64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self::classic(10, 0.5)
    }
}

impl TrainConfig {
    /// Absolute error, no clipping, fixed rate, no refinement.
    pub fn classic(i_epochs: usize, d_learning_rate: f64) -> Self {
        Self {
            i_epochs,
            d_learning_rate,
            d_momentum: 0.9,
            error_metric: ErrorMetric::Absolute,
            b_clip_delta: false,
            b_adaptive_lr: false,
            i_refinement_cycles: 0,
            i_refinement_epochs: 5,
            d_boost_factor: 1.0,
            d_refinement_boost: 1.5,
        }
    }

    /// Mean squared error, clipped deltas, adaptive rate and two refinement bursts.
    pub fn adaptive(i_epochs: usize, d_learning_rate: f64) -> Self {
        Self {
            error_metric: ErrorMetric::MeanSquared,
            b_clip_delta: true,
            b_adaptive_lr: true,
            i_refinement_cycles: 2,
            ..Self::classic(i_epochs, d_learning_rate)
        }
    }

    pub fn momentum(mut self, d_momentum: f64) -> Self {
        self.d_momentum = d_momentum;
        self
    }

    pub fn refinement(mut self, i_cycles: usize, i_epochs: usize, d_boost: f64) -> Self {
        self.i_refinement_cycles = i_cycles;
        self.i_refinement_epochs = i_epochs;
        self.d_refinement_boost = d_boost;
        self
    }

    pub fn boost_factor(mut self, d_boost: f64) -> Self {
        self.d_boost_factor = d_boost;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.i_epochs == 0 {
            return Err(NetworkError::InvalidArgument("epochs_must_be_positive".to_string()));
        }
        if !self.d_learning_rate.is_finite() || self.d_learning_rate <= 0.0 {
            return Err(NetworkError::InvalidArgument("invalid_learning_rate".to_string()));
        }
        if !self.d_momentum.is_finite() || !self.d_boost_factor.is_finite() {
            return Err(NetworkError::InvalidArgument("invalid_momentum_or_boost".to_string()));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrainingExample {
    pub input: Vec<f64>,
    pub target: Vec<f64>,
}

impl TrainingExample {
    pub fn new(v_input: Vec<f64>, v_target: Vec<f64>) -> Self {
        Self {
            input: v_input,
            target: v_target,
        }
    }
}

impl From<(Vec<f64>, Vec<f64>)> for TrainingExample {
    fn from(t_pair: (Vec<f64>, Vec<f64>)) -> Self {
        Self::new(t_pair.0, t_pair.1)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EpochReport {
    /// 1 based.
    pub epoch: usize,
    pub total_error: f64,
    /// Rate used during this epoch.
    pub learning_rate: f64,
}

/// Rate for the next epoch: +5% when the relative improvement is below 0.1%, else -2%.
pub fn next_learning_rate(d_lr: f64, d_previous_error: f64, d_current_error: f64) -> f64 {
    let d_improvement = d_previous_error - d_current_error;
    if d_improvement < 0.001 * d_previous_error {
        d_lr * 1.05
    } else {
        d_lr * 0.98
    }
}

/// Bounded nudge, damped by the error magnitude.
pub fn modulation_adjustment(d_learning_rate: f64, d_total_error: f64) -> f64 {
    d_learning_rate * d_total_error.sin() * (-d_total_error.abs()).exp()
}

impl Network {
    /// Classic variant with the given epochs and rate.
    pub fn train_simple(
        &mut self,
        v_data: &[TrainingExample],
        i_epochs: usize,
        d_learning_rate: f64,
    ) -> Result<Vec<EpochReport>> {
        self.train(v_data, &TrainConfig::classic(i_epochs, d_learning_rate))
    }

    /// The learning rate evolves inside this call only; config is not modified.
    pub fn train(&mut self, v_data: &[TrainingExample], config: &TrainConfig) -> Result<Vec<EpochReport>> {
        config.validate()?;
        if v_data.is_empty() {
            return Err(NetworkError::InvalidArgument("empty_training_data".to_string()));
        }
        for example in v_data.iter() {
            if example.input.len() != self.input_size {
                return Err(NetworkError::shape("training_input", self.input_size, example.input.len()));
            }
            if example.target.len() != self.output_size {
                return Err(NetworkError::shape("training_target", self.output_size, example.target.len()));
            }
        }

        let i_refine_interval = if config.i_refinement_cycles > 0 {
            (config.i_epochs / config.i_refinement_cycles).max(1)
        } else {
            0
        };

        let mut d_lr = config.d_learning_rate;
        let mut opt_previous_error: Option<f64> = None;
        let mut v_reports: Vec<EpochReport> = Vec::with_capacity(config.i_epochs);

        for i_epoch in 0..config.i_epochs {
            let mut d_total_error: f64 = 0.0;
            for example in v_data.iter() {
                d_total_error += self.train_example(example, d_lr, config)?;
            }

            info!(
                "Epoch {}/{} - total error: {:.4} - lr: {:.5}",
                i_epoch + 1,
                config.i_epochs,
                d_total_error,
                d_lr
            );
            v_reports.push(EpochReport {
                epoch: i_epoch + 1,
                total_error: d_total_error,
                learning_rate: d_lr,
            });

            if let Some(res) = self.resonance.as_mut() {
                res.modulation_intensity += modulation_adjustment(d_lr, d_total_error);
            }

            if config.b_adaptive_lr {
                if let Some(d_previous) = opt_previous_error {
                    d_lr = next_learning_rate(d_lr, d_previous, d_total_error);
                }
                opt_previous_error = Some(d_total_error);
            }

            if i_refine_interval > 0 && (i_epoch + 1) % i_refine_interval == 0 {
                self.refine(config.i_refinement_epochs, d_lr, config.d_refinement_boost);
            }
        }

        Ok(v_reports)
    }

    // One forward pass and one backward update. Returns the example error.
    fn train_example(&mut self, example: &TrainingExample, d_lr: f64, config: &TrainConfig) -> Result<f64> {
        let a_input = Array1::from(example.input.clone());
        let a_target = Array1::from(example.target.clone());

        let pass = self.forward_pass(&a_input)?;
        let a_errors = &a_target - &pass.output;

        let d_error = match config.error_metric {
            ErrorMetric::Absolute => a_errors.iter().map(|e| e.abs()).sum::<f64>(),
            ErrorMetric::MeanSquared => {
                let d_n = (a_errors.len() as f64).max(1.0);
                a_errors.iter().map(|e| e * e).sum::<f64>() / d_n
            }
        };

        let d_step = config.d_boost_factor * d_lr;

        // Output layer. error * f'(sum) per cell, reused below for the hidden layer.
        let mut v_output_terms: Vec<f64> = Vec::with_capacity(self.output_size);
        for (cell, &d_err) in self.output_layer.cells.iter_mut().zip(a_errors.iter()) {
            let d_term = d_err * math::activate_derivative(cell.last_weighted_sum);
            v_output_terms.push(d_term);
            let d_delta = math::stabilize_delta(d_term, config.b_clip_delta);
            cell.momentum_step(d_delta, &pass.hidden, d_step, config.d_momentum);
        }

        // Hidden layer. Single step through the already updated output weights,
        // the resonance transform is not differentiated.
        for (i, cell) in self.hidden_layer.cells.iter_mut().enumerate() {
            let d_error_sum: f64 = self
                .output_layer
                .cells
                .iter()
                .zip(v_output_terms.iter())
                .map(|(out_cell, &d_term)| out_cell.weights[i] * d_term)
                .sum();
            let d_raw_delta = d_error_sum * math::activate_derivative(cell.last_weighted_sum);
            let d_delta = math::stabilize_delta(d_raw_delta, config.b_clip_delta);
            cell.momentum_step(d_delta, &a_input, d_step, config.d_momentum);
        }

        Ok(d_error)
    }

    /// Random perturbation of every weight and bias by boost * lr * uniform(-1, 1) per epoch.
    /// Not gradient based.
    pub fn refine(&mut self, i_epochs: usize, d_learning_rate: f64, d_boost_factor: f64) {
        let d_scale = d_boost_factor * d_learning_rate;
        for i_epoch in 0..i_epochs {
            for cell in self
                .hidden_layer
                .cells
                .iter_mut()
                .chain(self.output_layer.cells.iter_mut())
            {
                cell.perturb(d_scale, &mut self.rng);
            }
            if let Some(res) = self.resonance.as_mut() {
                res.modulation_intensity += d_scale * (i_epoch as f64).sin();
            }
        }
        debug!(i_epochs, d_scale, "refinement burst finished");
    }
}

// ----------------------------------------
// Dataset
// ----------------------------------------

#[allow(clippy::upper_case_acronyms)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DatasetType {
    JSON,
    Builtin,
}

/// Prompt and response texts for the text model.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Dataset {
    pub prompts: Vec<String>,
    pub responses: Vec<String>,
}

impl Dataset {
    pub fn new(s_path: &str, dataset_type: DatasetType) -> Result<Self> {
        match dataset_type {
            DatasetType::JSON => {
                let s_json = std::fs::read_to_string(s_path)?;
                let dataset: Dataset = serde_json::from_str(&s_json)?;
                if dataset.prompts.len() != dataset.responses.len() {
                    return Err(NetworkError::InvalidArgument(
                        "dataset_prompts_responses_length_mismatch".to_string(),
                    ));
                }
                Ok(dataset)
            }
            DatasetType::Builtin => Ok(Self::builtin()),
        }
    }

    pub fn builtin() -> Self {
        let v_pairs = [
            ("hello", "hello, how are you?"),
            ("how are you?", "i am fine, thank you."),
            ("what is your name?", "my name is quanta."),
            ("good bye", "bye, see you soon."),
        ];
        Self {
            prompts: v_pairs.iter().map(|(p, _)| p.to_string()).collect(),
            responses: v_pairs.iter().map(|(_, r)| r.to_string()).collect(),
        }
    }

    pub fn texts(&self) -> Vec<String> {
        self.prompts.iter().chain(self.responses.iter()).cloned().collect()
    }

    /// Next token examples: the previous i_window ids (left padded with 0) as input and a
    /// one hot vector over the vocabulary as target.
    pub fn window_examples(&self, tokenizer: &Tokenizer, i_window: usize) -> Vec<TrainingExample> {
        let i_vocab = tokenizer.vocab_size();
        let mut v_examples: Vec<TrainingExample> = Vec::new();

        for (s_prompt, s_response) in self.prompts.iter().zip(self.responses.iter()) {
            let mut v_ids = tokenizer.encode_unpadded(s_prompt);
            v_ids.extend(tokenizer.encode_unpadded(s_response));

            for i_pos in 1..v_ids.len() {
                let v_input: Vec<f64> = window_from_ids(&v_ids[..i_pos], i_window)
                    .iter()
                    .map(|&id| id as f64)
                    .collect();

                let mut v_target = vec![0.0; i_vocab];
                if let Some(d) = v_target.get_mut(v_ids[i_pos]) {
                    *d = 1.0;
                }
                v_examples.push(TrainingExample::new(v_input, v_target));
            }
        }

        v_examples
    }
}
