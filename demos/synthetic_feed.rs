//! Demonstration of the EMG Predict Agent pipeline.
//!
//! This example shows how to:
//! 1. Build a pipeline around a predictor
//! 2. Ingest a synthetic EMG signal and word events
//! 3. Watch predictions complete out of dispatch order
//! 4. Export the session as JSON
//!
//! Run with: cargo run --example synthetic_feed
//!
//! No sensor or inference service is needed; a local predictor with variable
//! latency stands in for the model.

use async_trait::async_trait;
use emg_predict_agent::{
    core::{Pipeline, PipelineSettings},
    inference::{InferenceError, Predictor},
    stats::create_shared_stats,
    WordEvent,
};
use std::sync::Arc;
use std::time::Duration;

/// Flags a window as a contraction when its mean amplitude is high.
struct AmplitudeThreshold {
    threshold: f64,
}

#[async_trait]
impl Predictor for AmplitudeThreshold {
    async fn predict(&self, values: Vec<f64>) -> Result<f64, InferenceError> {
        let mean = values.iter().map(|v| v.abs()).sum::<f64>() / values.len() as f64;
        // Latency varies with the signal so completions interleave.
        let latency_ms = 20 + (mean as u64 % 7) * 15;
        tokio::time::sleep(Duration::from_millis(latency_ms)).await;
        Ok(if mean >= self.threshold { 1.0 } else { 0.0 })
    }
}

/// A resting baseline with a burst of activity every 100 samples.
fn synthetic_emg(n: u64) -> f64 {
    let t = n as f64;
    let baseline = 40.0 + 5.0 * (t * 0.7).sin();
    let burst = if (n / 50) % 2 == 1 {
        300.0 * (t * 0.3).sin().abs()
    } else {
        0.0
    };
    baseline + burst
}

#[tokio::main]
async fn main() {
    println!("EMG Predict Agent - Synthetic Feed Demo");
    println!("=======================================");
    println!();

    let settings = PipelineSettings::default();
    let stats = create_shared_stats();
    let predictor = Arc::new(AmplitudeThreshold { threshold: 120.0 });

    let mut pipeline = match Pipeline::new(
        settings,
        predictor,
        stats.clone(),
        tokio::runtime::Handle::current(),
    ) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            eprintln!("Error: {e}");
            return;
        }
    };
    let view = pipeline.view();

    println!(
        "Window: {} samples, stride {}",
        settings.window_size, settings.stride
    );
    println!("Instance ID: {}", view.instance_id());
    println!();

    let words = ["água", "comida", "banheiro", "dormir"];
    for n in 1..=400u64 {
        if n % 100 == 1 {
            let word = words[(n / 100) as usize % words.len()];
            pipeline.record_word(WordEvent::new(word));
            println!("Showing word: {word}");
        }

        if let Some(handle) = pipeline.ingest_value(synthetic_emg(n)) {
            println!("  sample {n:>3}: dispatched window {}", handle.window_id);
        }

        // Roughly 500 Hz
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    pipeline.shutdown(Duration::from_secs(2)).await;

    println!();
    println!("Predictions (completion order):");
    for p in view.predictions() {
        println!(
            "  window {:>2} [{:>3}..{:>3}] -> {:?} ({} ms)",
            p.window_id,
            p.first_seq,
            p.last_seq,
            p.prediction,
            p.latency_ms()
        );
    }

    println!();
    println!(
        "Highlighted word: {}",
        view.current_highlight().unwrap_or_else(|| "(none)".to_string())
    );
    println!("Max value: {:.1}", view.max_value());

    match view.export().to_json_pretty() {
        Ok(json) => println!("Export size: {} bytes", json.len()),
        Err(e) => eprintln!("Export failed: {e}"),
    }

    println!();
    println!("{}", stats.summary());
}
