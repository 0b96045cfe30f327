// math.rs
// Description: Numeric helpers. PulseWave activation and its training derivative, delta
//              stabilization, population statistics, softmax, argmax and top k selection,
//              repetition penalties and the gaussian similarity smoothing pass.
// History:
// - 2026-02-01: Consolidate project into 6 files: main, layer, train, math, tokenizer, utils.
// - 2026-02-03: Switch to f64 and PulseWave activation.
// - 2026-02-05: Add multiplicative and additive repetition penalties.
// Author: Marcus Schlieper

use std::cmp::Ordering;
use std::collections::HashMap;

use ndarray::Array1;

/// PulseWave activation: mean of tanh and sin.
pub fn activate(d_x: f64) -> f64 {
    (d_x.tanh() + d_x.sin()) / 2.0
}

/// Derivative used by training. Kept in this exact form, including the shared /2.
pub fn activate_derivative(d_x: f64) -> f64 {
    let d_tanh = d_x.tanh();
    ((1.0 - d_tanh * d_tanh) + d_x.cos()) / 2.0
}

/// Squash a raw delta into (-1, 1); optionally clamp to [-1, 1] afterwards.
pub fn stabilize_delta(d_raw_delta: f64, b_clip: bool) -> f64 {
    let d_delta = d_raw_delta / (1.0 + d_raw_delta.abs());
    if b_clip {
        d_delta.clamp(-1.0, 1.0)
    } else {
        d_delta
    }
}

/// Mean and population standard deviation. Empty input yields (0, 0).
pub fn mean_std(a_values: &Array1<f64>) -> (f64, f64) {
    if a_values.is_empty() {
        return (0.0, 0.0);
    }
    let d_n = a_values.len() as f64;
    let d_mean = a_values.sum() / d_n;
    let d_var = a_values.iter().map(|&x| (x - d_mean) * (x - d_mean)).sum::<f64>() / d_n;
    (d_mean, d_var.sqrt())
}

/// Max-shifted softmax over a vector.
pub fn softmax(a_logits: &Array1<f64>) -> Array1<f64> {
    if a_logits.is_empty() {
        return a_logits.clone();
    }
    let d_max = a_logits.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let a_exp = a_logits.mapv(|x| (x - d_max).exp());
    let d_sum = a_exp.sum().max(1e-300);
    a_exp / d_sum
}

/// Index of the largest value; the first one wins on ties.
pub fn argmax(a_values: &Array1<f64>) -> Option<usize> {
    let mut opt_best: Option<(usize, f64)> = None;
    for (i, &d) in a_values.iter().enumerate() {
        match opt_best {
            Some((_, d_best)) if d <= d_best => {}
            _ => opt_best = Some((i, d)),
        }
    }
    opt_best.map(|(i, _)| i)
}

/// Indices and values of the k largest entries, largest first.
pub fn top_k(a_values: &Array1<f64>, i_k: usize) -> Vec<(usize, f64)> {
    let mut v_pairs: Vec<(usize, f64)> = a_values.iter().copied().enumerate().collect();
    v_pairs.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
    v_pairs.truncate(i_k);
    v_pairs
}

/// Multiply the logit of each already generated id by penalty^count.
/// Ids outside the logit vector are ignored.
pub fn apply_repetition_penalty(
    a_logits: &mut Array1<f64>,
    m_counts: &HashMap<usize, usize>,
    d_penalty: f64,
) {
    for (&i_id, &i_count) in m_counts.iter() {
        if let Some(d) = a_logits.get_mut(i_id) {
            *d *= d_penalty.powi(i_count as i32);
        }
    }
}

/// Subtract factor * count from each already seen index.
pub fn apply_additive_penalty(
    a_output: &mut Array1<f64>,
    m_counts: &HashMap<usize, usize>,
    d_factor: f64,
) {
    for (&i_id, &i_count) in m_counts.iter() {
        if let Some(d) = a_output.get_mut(i_id) {
            *d -= d_factor * i_count as f64;
        }
    }
}

/// One dense smoothing round: every position becomes the average of all positions
/// weighted by exp(-(v_i - v_j)^2). Reads from the previous round only.
pub fn similarity_smooth(a_values: &Array1<f64>) -> Array1<f64> {
    let mut a_out = Array1::zeros(a_values.len());
    for (i, &d_vi) in a_values.iter().enumerate() {
        let mut d_weighted = 0.0;
        let mut d_norm = 0.0;
        for &d_vj in a_values.iter() {
            let d_diff = d_vi - d_vj;
            let d_w = (-(d_diff * d_diff)).exp();
            d_weighted += d_w * d_vj;
            d_norm += d_w;
        }
        // d_norm >= 1 because the self term contributes exp(0).
        a_out[i] = d_weighted / d_norm;
    }
    a_out
}
