// lib.rs
// Description: NeuroQuanta, a small two layer network with PulseWave activation, momentum
//              training, a resonance transform between the layers and token generation over
//              a word and symbol vocabulary.
// History:
// - 2026-02-03: Split into library and menu binary.
// - 2026-02-06: Add generate module.
// Author: Marcus Schlieper

pub mod error;
pub mod generate;
pub mod layer;
pub mod math;
pub mod tokenizer;
pub mod train;
pub mod utils;

pub use crate::error::{NetworkError, Result};
pub use crate::generate::{GenerationConfig, GenerationMode, GenerationOutput, TraceStep};
pub use crate::layer::{Cell, ForwardPass, Layer, Network, NetworkCheckpoint, ResonanceConfig, ResonanceTransform};
pub use crate::tokenizer::{JoinMode, Tokenizer, TokenizerConfig};
pub use crate::train::{Dataset, DatasetType, EpochReport, ErrorMetric, TrainConfig, TrainingExample};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
