// main.rs
// Description: Binary entry point with menu loop. XOR demo, text model training, resonant and
//              sliding window generation, model and vocabulary save and load.
// History:
// - 2026-02-01: Add menu loop and checkpoint save and load.
// - 2026-02-03: Switch to library crate, binary artifacts and tracing output.
// - 2026-02-06: Add XOR demo and sliding window command.
// Author: Marcus Schlieper

use std::io::Write;

use tracing::warn;
use tracing_subscriber::FmtSubscriber;

use neuroquanta::utils;
use neuroquanta::{
    Dataset, DatasetType, GenerationConfig, Network, ResonanceConfig, ResonanceTransform, Tokenizer,
    TrainConfig, TrainingExample,
};

pub const WINDOW_SIZE: usize = 4;
pub const HIDDEN_SIZE: usize = 16;
pub const GENERATION_STEPS: usize = 10;
pub const TRAIN_EPOCHS: usize = 200;
pub const TRAIN_LEARNING_RATE: f64 = 0.05;

fn read_line_ascii_trimmed() -> Result<String, String> {
    let mut s_input = String::new();
    std::io::stdin()
        .read_line(&mut s_input)
        .map_err(|_| "input_read_error".to_string())?;
    Ok(s_input.trim().to_string())
}

fn prompt_line(s_label: &str) -> Option<String> {
    print!("{}", s_label);
    let _ = std::io::stdout().flush();
    match read_line_ascii_trimmed() {
        Ok(s) => Some(s),
        Err(e) => {
            println!("Input error: {}", e);
            None
        }
    }
}

// The text model reads WINDOW_SIZE token ids and scores every vocabulary entry.
fn build_text_network(tokenizer: &Tokenizer) -> Network {
    let mut network = Network::new(WINDOW_SIZE, HIDDEN_SIZE, tokenizer.vocab_size());
    network.attach_resonance(ResonanceTransform::new(ResonanceConfig::Standard).with_attention(1));
    network
}

fn run_xor_demo() {
    let v_base: Vec<TrainingExample> = vec![
        TrainingExample::new(vec![0.0, 0.0], vec![0.0]),
        TrainingExample::new(vec![0.0, 1.0], vec![1.0]),
        TrainingExample::new(vec![1.0, 0.0], vec![1.0]),
        TrainingExample::new(vec![1.0, 1.0], vec![0.0]),
    ];
    let v_data: Vec<TrainingExample> = v_base.iter().cycle().take(v_base.len() * 10).cloned().collect();

    let mut network = Network::new(2, 4, 1);
    network.attach_resonance(ResonanceTransform::new(ResonanceConfig::Innovative));

    println!("\n=== XOR DEMO ===");
    println!("Network architecture: {}", network.description());

    if let Err(e) = network.train_simple(&v_data, 10, 0.5) {
        eprintln!("Training failed: {}", e);
        return;
    }

    for example in v_base.iter() {
        match network.predict(&example.input) {
            Ok(v_out) => println!(
                "{:?} -> {:?} (integer {:?}, target {:?})",
                example.input,
                v_out,
                Network::to_integers(&v_out),
                example.target
            ),
            Err(e) => println!("Prediction error: {}", e),
        }
    }
}

fn main() {
    let log_level = utils::parse_log_level(std::env::var("NQ_LOG").ok().as_deref());
    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("Logging setup failed.");
    }

    let dataset = match Dataset::new("data/dialogue.json", DatasetType::JSON) {
        Ok(ds) => ds,
        Err(e) => {
            warn!(error = %e, "dialogue dataset not loaded, using builtin corpus");
            Dataset::builtin()
        }
    };

    let mut tokenizer = Tokenizer::default();
    tokenizer.register(&dataset.texts());

    let mut network = build_text_network(&tokenizer);

    println!("\n=== MODEL INFORMATION ===");
    println!("NeuroQuanta {}", neuroquanta::VERSION);
    println!("Network architecture: {}", network.description());
    println!(
        "Vocabulary size: {}, window: {}, max sequence length: {}",
        tokenizer.vocab_size(),
        WINDOW_SIZE,
        tokenizer.max_sequence_length()
    );
    println!("Total parameters: {}", network.parameter_count());

    let mut s_artifact_name: String = "checkpoints/neuroquanta".to_string();

    loop {
        println!("\n--- Menu Mode ---");
        println!("Commands:");
        println!("  x XOR demo");
        println!("  t Train");
        println!("  a Ask");
        println!("  w Ask (sliding window)");
        println!("  s Save model");
        println!("  l Load model");
        println!("  e Exit");

        let s_cmd = match prompt_line("\nEnter command: ") {
            Some(s) => s.to_lowercase(),
            None => continue,
        };

        if s_cmd == "e" {
            println!("Exit.");
            break;
        }

        if s_cmd == "x" {
            run_xor_demo();
            continue;
        }

        if s_cmd == "t" {
            let v_examples = dataset.window_examples(&tokenizer, WINDOW_SIZE);
            println!("\n=== TRAINING TEXT MODEL ===");
            println!(
                "Training on {} examples for {} epochs with learning rate {}",
                v_examples.len(),
                TRAIN_EPOCHS,
                TRAIN_LEARNING_RATE
            );

            let config = TrainConfig::adaptive(TRAIN_EPOCHS, TRAIN_LEARNING_RATE);
            match network.train(&v_examples, &config) {
                Ok(v_reports) => {
                    if let Some(report) = v_reports.last() {
                        println!(
                            "Final error: {:.4} (learning rate {:.5})",
                            report.total_error, report.learning_rate
                        );
                    }
                }
                Err(e) => eprintln!("Training failed: {}", e),
            }
            continue;
        }

        if s_cmd == "a" || s_cmd == "w" {
            let s_user = match prompt_line("Enter prompt: ") {
                Some(s) => s,
                None => continue,
            };
            if s_user.is_empty() {
                println!("Empty prompt.");
                continue;
            }

            let result = if s_cmd == "a" {
                let config = GenerationConfig::new(GENERATION_STEPS).trace(300);
                network.respond(&s_user, &tokenizer, &config)
            } else {
                network.respond_sliding(&s_user, &tokenizer, &GenerationConfig::new(GENERATION_STEPS))
            };

            match result {
                Ok(s_out) => println!("Model output: {}", s_out),
                Err(e) => println!("Model output error: {}", e),
            }
            continue;
        }

        if s_cmd == "s" || s_cmd == "l" {
            let s_name = match prompt_line("Enter artifact name or press Enter for default: ") {
                Some(s) => s,
                None => continue,
            };
            if !s_name.is_empty() {
                s_artifact_name = s_name;
            }

            if s_cmd == "s" {
                match network.save(&s_artifact_name) {
                    Ok(path) => println!("Saved model: {}", path.display()),
                    Err(e) => {
                        println!("Save failed: {}", e);
                        continue;
                    }
                }
                match tokenizer.save(&s_artifact_name) {
                    Ok(path) => println!("Saved vocabulary: {}", path.display()),
                    Err(e) => println!("Save failed: {}", e),
                }
                continue;
            }

            // Model and vocabulary are replaced together so their sizes stay consistent.
            match (Network::load(&s_artifact_name), Tokenizer::load(&s_artifact_name)) {
                (Ok(network_loaded), Ok(tokenizer_loaded)) => {
                    if network_loaded.output_size != tokenizer_loaded.vocab_size() {
                        println!(
                            "Load failed: model output size {} does not match vocabulary size {}",
                            network_loaded.output_size,
                            tokenizer_loaded.vocab_size()
                        );
                        continue;
                    }
                    network = network_loaded;
                    tokenizer = tokenizer_loaded;
                    println!("Loaded: {}", s_artifact_name);
                }
                (Err(e), _) | (_, Err(e)) => println!("Load failed: {}", e),
            }
            continue;
        }

        println!("Unknown command.");
    }
}
