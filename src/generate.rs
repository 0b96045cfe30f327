// generate.rs
// Description: Autoregressive token generation. Two explicit modes:
//              - ResonantBag: bag of tokens state driven by the resonance transform alone,
//                multiplicative repetition penalty, softmax, argmax.
//              - SlidingWindow: full forward pass over a token window, additive penalty per
//                occurrence, argmax, window slides by one token.
//              Optional trace of the top 5 probabilities per step.
// History:
// - 2026-02-01: Greedy decode moved out of layer.rs.
// - 2026-02-05: Add sliding window mode with additive penalty.
// - 2026-02-06: Add resonant bag of tokens mode with repetition penalty and trace output.
// Author: Marcus Schlieper

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use ndarray::Array1;
use tracing::debug;

use crate::error::{NetworkError, Result};
use crate::layer::Network;
use crate::math;
use crate::tokenizer::{Tokenizer, I_PAD};

pub const TRACE_TOP_K: usize = 5;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GenerationMode {
    ResonantBag,
    SlidingWindow,
}

#[derive(Clone, Debug)]
pub struct GenerationConfig {
    pub i_max_steps: usize,
    /// ResonantBag: logit multiplier per previous occurrence, (0, 1) suppresses repeats.
    pub d_repetition_penalty: f64,
    /// SlidingWindow: subtracted from the output once per previous occurrence.
    pub d_penalty_factor: f64,
    pub b_show_trace: bool,
    pub u64_trace_delay_ms: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            i_max_steps: 10,
            d_repetition_penalty: 0.7,
            d_penalty_factor: 0.5,
            b_show_trace: false,
            u64_trace_delay_ms: 300,
        }
    }
}

impl GenerationConfig {
    pub fn new(i_max_steps: usize) -> Self {
        Self {
            i_max_steps,
            ..Self::default()
        }
    }

    pub fn repetition_penalty(mut self, d_penalty: f64) -> Self {
        self.d_repetition_penalty = d_penalty;
        self
    }

    pub fn penalty_factor(mut self, d_factor: f64) -> Self {
        self.d_penalty_factor = d_factor;
        self
    }

    pub fn trace(mut self, u64_delay_ms: u64) -> Self {
        self.b_show_trace = true;
        self.u64_trace_delay_ms = u64_delay_ms;
        self
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TraceStep {
    /// 1 based.
    pub step: usize,
    /// Largest probabilities, descending.
    pub top: Vec<(usize, f64)>,
    pub chosen: usize,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct GenerationOutput {
    pub token_ids: Vec<usize>,
    /// Empty unless tracing was requested.
    pub trace: Vec<TraceStep>,
}

/// Last i_window ids, left padded with the padding id.
pub fn window_from_ids(v_ids: &[usize], i_window: usize) -> Vec<usize> {
    let i_start = v_ids.len().saturating_sub(i_window);
    let mut v_window = vec![I_PAD; i_window - (v_ids.len() - i_start)];
    v_window.extend_from_slice(&v_ids[i_start..]);
    v_window
}

fn record_trace(
    v_trace: &mut Vec<TraceStep>,
    tokenizer: &Tokenizer,
    i_step: usize,
    a_probs: &Array1<f64>,
    i_chosen: usize,
    u64_delay_ms: u64,
) {
    let v_top = math::top_k(a_probs, TRACE_TOP_K);
    println!("Step {}:", i_step);
    for (i_id, d_p) in v_top.iter() {
        println!("  {:>16} {:.4}", format!("{:?}", tokenizer.token(*i_id).unwrap_or("?")), d_p);
    }
    println!("  -> {:?}", tokenizer.token(i_chosen).unwrap_or("?"));
    v_trace.push(TraceStep {
        step: i_step,
        top: v_top,
        chosen: i_chosen,
    });
    if u64_delay_ms > 0 {
        std::thread::sleep(Duration::from_millis(u64_delay_ms));
    }
}

impl Network {
    pub fn generate(
        &mut self,
        mode: GenerationMode,
        v_prompt_ids: &[usize],
        i_vocab_size: usize,
        config: &GenerationConfig,
        opt_tokenizer: Option<&Tokenizer>,
    ) -> Result<GenerationOutput> {
        match mode {
            GenerationMode::ResonantBag => {
                self.generate_resonant(v_prompt_ids, i_vocab_size, config, opt_tokenizer)
            }
            GenerationMode::SlidingWindow => self.generate_sliding(v_prompt_ids, config, opt_tokenizer),
        }
    }

    /// Bag of tokens generation. The trained layers are bypassed; the resonance transform
    /// updates the vocabulary sized state on every step.
    pub fn generate_resonant(
        &mut self,
        v_prompt_ids: &[usize],
        i_vocab_size: usize,
        config: &GenerationConfig,
        opt_tokenizer: Option<&Tokenizer>,
    ) -> Result<GenerationOutput> {
        let res = self.resonance.as_mut().ok_or(NetworkError::MissingResonance)?;
        let opt_trace_tokenizer = match (config.b_show_trace, opt_tokenizer) {
            (true, None) => return Err(NetworkError::MissingTokenizer),
            (true, Some(tok)) => Some(tok),
            (false, _) => None,
        };
        if i_vocab_size == 0 {
            return Err(NetworkError::InvalidArgument("vocab_size_must_be_positive".to_string()));
        }

        let mut a_state: Array1<f64> = Array1::zeros(i_vocab_size);
        for &i_id in v_prompt_ids.iter() {
            if i_id >= i_vocab_size {
                return Err(NetworkError::shape("prompt_token_id", i_vocab_size, i_id));
            }
            a_state[i_id] = 1.0;
        }

        let mut output = GenerationOutput::default();
        let mut m_counts: HashMap<usize, usize> = HashMap::new();

        for i_step in 0..config.i_max_steps {
            a_state = res.transform(&a_state);

            let mut a_logits = a_state.clone();
            math::apply_repetition_penalty(&mut a_logits, &m_counts, config.d_repetition_penalty);
            let a_probs = math::softmax(&a_logits);
            let i_next = math::argmax(&a_probs).unwrap_or(I_PAD);

            output.token_ids.push(i_next);
            *m_counts.entry(i_next).or_insert(0) += 1;

            if let Some(tokenizer) = opt_trace_tokenizer {
                record_trace(
                    &mut output.trace,
                    tokenizer,
                    i_step + 1,
                    &a_probs,
                    i_next,
                    config.u64_trace_delay_ms,
                );
            }
        }

        debug!(steps = config.i_max_steps, "resonant generation finished");
        Ok(output)
    }

    /// Sliding window generation over the full forward pass. The prompt must be exactly
    /// input_size ids; the output index with the highest penalized value is the next token.
    pub fn generate_sliding(
        &mut self,
        v_prompt_ids: &[usize],
        config: &GenerationConfig,
        opt_tokenizer: Option<&Tokenizer>,
    ) -> Result<GenerationOutput> {
        let opt_trace_tokenizer = match (config.b_show_trace, opt_tokenizer) {
            (true, None) => return Err(NetworkError::MissingTokenizer),
            (true, Some(tok)) => Some(tok),
            (false, _) => None,
        };
        if v_prompt_ids.len() != self.input_size {
            return Err(NetworkError::shape("sliding_window", self.input_size, v_prompt_ids.len()));
        }

        let mut v_window: VecDeque<f64> = v_prompt_ids.iter().map(|&i| i as f64).collect();
        let mut m_counts: HashMap<usize, usize> = HashMap::new();
        for &i_id in v_prompt_ids.iter().filter(|&&i| i != I_PAD) {
            *m_counts.entry(i_id).or_insert(0) += 1;
        }

        let mut output = GenerationOutput::default();

        for i_step in 0..config.i_max_steps {
            let a_input: Array1<f64> = v_window.iter().copied().collect();
            let mut a_out = self.forward_pass(&a_input)?.output;
            math::apply_additive_penalty(&mut a_out, &m_counts, config.d_penalty_factor);

            let i_next = math::argmax(&a_out)
                .ok_or_else(|| NetworkError::InvalidArgument("empty_output_layer".to_string()))?;

            output.token_ids.push(i_next);
            *m_counts.entry(i_next).or_insert(0) += 1;

            if v_window.pop_front().is_some() {
                v_window.push_back(i_next as f64);
            }

            if let Some(tokenizer) = opt_trace_tokenizer {
                let a_probs = math::softmax(&a_out);
                record_trace(
                    &mut output.trace,
                    tokenizer,
                    i_step + 1,
                    &a_probs,
                    i_next,
                    config.u64_trace_delay_ms,
                );
            }
        }

        debug!(steps = config.i_max_steps, "sliding window generation finished");
        Ok(output)
    }

    /// Encode, generate in ResonantBag mode, decode.
    pub fn respond(&mut self, s_text: &str, tokenizer: &Tokenizer, config: &GenerationConfig) -> Result<String> {
        let v_ids = tokenizer.encode_unpadded(s_text);
        let output = self.generate_resonant(&v_ids, tokenizer.vocab_size(), config, Some(tokenizer))?;
        Ok(tokenizer.decode_ids(&output.token_ids))
    }

    /// Encode the last input_size tokens, generate in SlidingWindow mode, decode.
    pub fn respond_sliding(
        &mut self,
        s_text: &str,
        tokenizer: &Tokenizer,
        config: &GenerationConfig,
    ) -> Result<String> {
        let v_window = window_from_ids(&tokenizer.encode_unpadded(s_text), self.input_size);
        let output = self.generate_sliding(&v_window, config, Some(tokenizer))?;
        Ok(tokenizer.decode_ids(&output.token_ids))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::{ResonanceConfig, ResonanceTransform};

    fn resonant_network(u64_seed: u64) -> Network {
        let mut network = Network::with_seed(3, 4, 3, u64_seed);
        network.attach_resonance(ResonanceTransform::with_seed(ResonanceConfig::Innovative, u64_seed));
        network
    }

    fn tokenizer() -> Tokenizer {
        let mut tokenizer = Tokenizer::default();
        tokenizer.register(&["a b c d"]);
        tokenizer
    }

    #[test]
    fn test_window_from_ids() {
        assert_eq!(window_from_ids(&[5, 6], 4), vec![0, 0, 5, 6]);
        assert_eq!(window_from_ids(&[1, 2, 3, 4, 5], 3), vec![3, 4, 5]);
        assert!(window_from_ids(&[1, 2], 0).is_empty());
    }

    #[test]
    fn test_resonant_requires_transform() {
        let mut network = Network::with_seed(3, 4, 3, 1);
        let err = network
            .generate_resonant(&[1], 5, &GenerationConfig::new(3), None)
            .unwrap_err();
        assert!(matches!(err, NetworkError::MissingResonance));
    }

    #[test]
    fn test_trace_requires_tokenizer() {
        let mut network = resonant_network(2);
        let config = GenerationConfig::new(2).trace(0);
        assert!(matches!(
            network.generate_resonant(&[1], 5, &config, None),
            Err(NetworkError::MissingTokenizer)
        ));
        assert!(matches!(
            network.generate_sliding(&[1, 2, 3], &config, None),
            Err(NetworkError::MissingTokenizer)
        ));
    }

    #[test]
    fn test_resonant_generates_requested_steps_within_vocab() {
        let mut network = resonant_network(3);
        let output = network
            .generate_resonant(&[1, 3], 8, &GenerationConfig::new(6), None)
            .unwrap();
        assert_eq!(output.token_ids.len(), 6);
        assert!(output.token_ids.iter().all(|&i| i < 8));
        assert!(output.trace.is_empty());
    }

    #[test]
    fn test_resonant_rejects_prompt_outside_vocab() {
        let mut network = resonant_network(4);
        assert!(matches!(
            network.generate_resonant(&[9], 8, &GenerationConfig::new(2), None),
            Err(NetworkError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_resonant_seeded_runs_match() {
        let v_first = resonant_network(5)
            .generate_resonant(&[2], 6, &GenerationConfig::new(5), None)
            .unwrap();
        let v_second = resonant_network(5)
            .generate_resonant(&[2], 6, &GenerationConfig::new(5), None)
            .unwrap();
        assert_eq!(v_first, v_second);
    }

    #[test]
    fn test_trace_records_top_five() {
        let tok = tokenizer();
        let mut network = resonant_network(6);
        let config = GenerationConfig::new(3).trace(0);
        let output = network
            .generate_resonant(&[1], tok.vocab_size(), &config, Some(&tok))
            .unwrap();
        assert_eq!(output.trace.len(), 3);
        for (step, &i_chosen) in output.trace.iter().zip(output.token_ids.iter()) {
            assert_eq!(step.top.len(), TRACE_TOP_K.min(tok.vocab_size()));
            assert_eq!(step.chosen, i_chosen);
            assert_eq!(step.top[0].0, i_chosen);
        }
    }

    // Jitter 0 and no attention: the transform is deterministic unless the state stagnates,
    // and a second transform with the same seed replays any stagnation kick.
    fn steady_network(u64_seed: u64) -> Network {
        let mut network = Network::with_seed(3, 4, 3, u64_seed);
        network.attach_resonance(
            ResonanceTransform::with_seed(ResonanceConfig::Innovative, u64_seed).with_jitter(0.0),
        );
        network
    }

    #[test]
    fn test_resonant_steps_follow_transform_of_bag_state() {
        let v_prompt = [1, 3];
        let i_vocab = 6;
        let config = GenerationConfig::new(4).repetition_penalty(0.5);
        let output = steady_network(20)
            .generate_resonant(&v_prompt, i_vocab, &config, None)
            .unwrap();

        let mut res = ResonanceTransform::with_seed(ResonanceConfig::Innovative, 20).with_jitter(0.0);
        let mut a_state: Array1<f64> = Array1::zeros(i_vocab);
        for &i_id in v_prompt.iter() {
            a_state[i_id] = 1.0;
        }
        let mut m_counts: HashMap<usize, usize> = HashMap::new();
        let mut v_expected: Vec<usize> = Vec::new();
        for _ in 0..4 {
            a_state = res.transform(&a_state);
            let mut a_logits = a_state.clone();
            math::apply_repetition_penalty(&mut a_logits, &m_counts, 0.5);
            let i_next = math::argmax(&math::softmax(&a_logits)).unwrap();
            *m_counts.entry(i_next).or_insert(0) += 1;
            v_expected.push(i_next);
        }

        assert_eq!(output.token_ids, v_expected);
        // prompt positions are lifted above the rest, the first of the tie wins
        assert_eq!(output.token_ids[0], 1);
    }

    #[test]
    fn test_resonant_ignores_trained_layers() {
        let v_reference = steady_network(21)
            .generate_resonant(&[2], 5, &GenerationConfig::new(5), None)
            .unwrap();

        let mut network = steady_network(21);
        for cell in network
            .hidden_layer
            .cells
            .iter_mut()
            .chain(network.output_layer.cells.iter_mut())
        {
            cell.weights.fill(3.0);
            cell.bias = -2.0;
        }
        let v_changed = network
            .generate_resonant(&[2], 5, &GenerationConfig::new(5), None)
            .unwrap();

        assert_eq!(v_changed, v_reference);
    }

    #[test]
    fn test_repetition_penalty_changes_second_token() {
        let v_plain = steady_network(22)
            .generate_resonant(&[1, 3], 6, &GenerationConfig::new(2).repetition_penalty(1.0), None)
            .unwrap();
        let v_penalized = steady_network(22)
            .generate_resonant(&[1, 3], 6, &GenerationConfig::new(2).repetition_penalty(0.01), None)
            .unwrap();

        assert_eq!(v_plain.token_ids[0], v_penalized.token_ids[0]);
        // without penalty the leading prompt id keeps winning, with it the other prompt id takes over
        assert_eq!(v_plain.token_ids, vec![1, 1]);
        assert_eq!(v_penalized.token_ids, vec![1, 3]);
    }

    #[test]
    fn test_sliding_steps_follow_forward_pass_with_additive_penalty() {
        let mut network = Network::with_seed(3, 4, 5, 23);
        let mut reference = network.clone();
        let v_prompt = [1, 0, 2];
        let config = GenerationConfig::new(4).penalty_factor(0.5);
        let output = network.generate_sliding(&v_prompt, &config, None).unwrap();

        let mut v_window: Vec<usize> = v_prompt.to_vec();
        let mut m_counts: HashMap<usize, usize> = HashMap::from([(1, 1), (2, 1)]);
        let mut v_expected: Vec<usize> = Vec::new();
        for _ in 0..4 {
            let a_input: Array1<f64> = v_window.iter().map(|&i| i as f64).collect();
            let mut a_out = reference.forward_pass(&a_input).unwrap().output;
            for (&i_id, &i_count) in m_counts.iter() {
                a_out[i_id] -= 0.5 * i_count as f64;
            }
            let i_next = math::argmax(&a_out).unwrap();
            *m_counts.entry(i_next).or_insert(0) += 1;
            v_expected.push(i_next);
            v_window.remove(0);
            v_window.push(i_next);
        }

        assert_eq!(output.token_ids, v_expected);
    }

    #[test]
    fn test_sliding_window_rejects_wrong_prompt_length() {
        let mut network = Network::with_seed(3, 4, 5, 7);
        assert!(matches!(
            network.generate_sliding(&[1, 2], &GenerationConfig::new(2), None),
            Err(NetworkError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_sliding_window_without_resonance() {
        let mut network = Network::with_seed(3, 4, 5, 8);
        let output = network
            .generate_sliding(&[1, 2, 3], &GenerationConfig::new(4), None)
            .unwrap();
        assert_eq!(output.token_ids.len(), 4);
        assert!(output.token_ids.iter().all(|&i| i < 5));
    }

    #[test]
    fn test_sliding_penalty_avoids_immediate_repeat() {
        let mut network = Network::with_seed(3, 4, 5, 9);
        // Outputs lie in [-1, 1], so a factor above 2 rules out any already seen index.
        let config = GenerationConfig::new(2).penalty_factor(10.0);
        let output = network.generate_sliding(&[0, 0, 0], &config, None).unwrap();
        assert_ne!(output.token_ids[0], output.token_ids[1]);
    }

    #[test]
    fn test_respond_decodes_text() {
        let tok = tokenizer();
        let mut network = resonant_network(10);
        let config = GenerationConfig {
            u64_trace_delay_ms: 0,
            ..GenerationConfig::new(4)
        };
        let s_out = network.respond("a b", &tok, &config).unwrap();
        assert!(s_out.len() <= 4 * 2 + 3);
    }
}
