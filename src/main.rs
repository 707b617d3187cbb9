//! EMG Predict Agent CLI
//!
//! Streams EMG samples into the windowing pipeline and dispatches predictions.

use chrono::Utc;
use clap::{Parser, Subcommand};
use emg_predict_agent::{
    config::{Config, FeedSource},
    core::{export::session_file_name, ExportDocument, Pipeline, PipelineSettings},
    feed::SampleFeed,
    inference::{HttpPredictor, InferenceConfig},
    logging::init_logging,
    stats::{create_shared_stats_with_persistence, PersistedStats},
    VERSION,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// How often the foreground loop prints a progress line.
const REPORT_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(name = "emg-predict")]
#[command(version = VERSION)]
#[command(about = "Sliding-window EMG prediction agent", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start ingesting samples and dispatching predictions
    Start {
        /// Samples per prediction window
        #[arg(long)]
        window_size: Option<usize>,

        /// Samples dropped after each dispatched window
        #[arg(long)]
        stride: Option<usize>,

        /// Display history capacity
        #[arg(long, conflicts_with = "unbounded_history")]
        history: Option<usize>,

        /// Keep every sample in the display history
        #[arg(long)]
        unbounded_history: bool,

        /// Inference endpoint URL
        #[arg(long)]
        predict_url: Option<String>,

        /// Inference timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Extra attempts for a failed inference call
        #[arg(long)]
        retries: Option<u32>,

        /// Read the feed from a TCP bridge at this address
        #[arg(long, conflicts_with = "stdin")]
        tcp: Option<String>,

        /// Read the feed from standard input
        #[arg(long)]
        stdin: bool,

        /// Serve export and word endpoints on this port (requires server feature)
        #[arg(long)]
        serve: Option<u16>,
    },

    /// Show configuration and cumulative statistics
    Status,

    /// Merge session exports into one file
    Export {
        /// Directory holding session exports
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Export format (json or jsonl)
        #[arg(long, default_value = "json")]
        format: String,
    },

    /// Show configuration
    Config,

    /// Check the configuration file for fatal errors
    Validate,
}

/// Command-line overrides for `start`.
struct StartOverrides {
    window_size: Option<usize>,
    stride: Option<usize>,
    history: Option<usize>,
    unbounded_history: bool,
    predict_url: Option<String>,
    timeout: Option<u64>,
    retries: Option<u32>,
    tcp: Option<String>,
    stdin: bool,
    serve: Option<u16>,
}

impl StartOverrides {
    fn apply(&self, config: &mut Config) {
        if let Some(n) = self.window_size {
            config.window_size = n;
        }
        if let Some(n) = self.stride {
            config.stride = n;
        }
        if self.unbounded_history {
            config.history_capacity = None;
        } else if let Some(n) = self.history {
            config.history_capacity = Some(n);
        }
        if let Some(ref url) = self.predict_url {
            config.inference_url = url.clone();
        }
        if let Some(secs) = self.timeout {
            config.inference_timeout = Duration::from_secs(secs);
        }
        if let Some(n) = self.retries {
            config.max_retries = n;
        }
        if self.stdin {
            config.feed = FeedSource::Stdin;
        } else if let Some(ref addr) = self.tcp {
            config.feed = FeedSource::Tcp { addr: addr.clone() };
        }
    }
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.verbose) {
        eprintln!("Warning: Could not initialize logging: {e}");
    }

    match cli.command {
        Commands::Start {
            window_size,
            stride,
            history,
            unbounded_history,
            predict_url,
            timeout,
            retries,
            tcp,
            stdin,
            serve,
        } => {
            cmd_start(StartOverrides {
                window_size,
                stride,
                history,
                unbounded_history,
                predict_url,
                timeout,
                retries,
                tcp,
                stdin,
                serve,
            });
        }
        Commands::Status => {
            cmd_status();
        }
        Commands::Export { output, format } => {
            cmd_export(output, &format);
        }
        Commands::Config => {
            cmd_config();
        }
        Commands::Validate => {
            cmd_validate();
        }
    }
}

fn cmd_start(overrides: StartOverrides) {
    println!("EMG Predict Agent v{VERSION}");
    println!();

    let mut config = Config::load().unwrap_or_else(|e| {
        eprintln!("Warning: Could not load config ({e}), using defaults");
        Config::default()
    });
    overrides.apply(&mut config);

    // Misconfiguration is fatal at startup.
    let settings = match PipelineSettings::from_config(&config) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = config.ensure_directories() {
        eprintln!("Warning: Could not create directories: {e}");
    }

    println!("Starting pipeline...");
    println!("  Feed: {}", config.feed);
    println!(
        "  Window: {} samples, stride {}",
        config.window_size, config.stride
    );
    match config.history_capacity {
        Some(n) => println!("  Display history: last {n} samples"),
        None => println!("  Display history: unbounded"),
    }
    println!(
        "  Inference: {} (timeout {}s, retries {})",
        config.inference_url,
        config.inference_timeout.as_secs(),
        config.max_retries
    );

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("emg-dispatch")
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error creating async runtime: {e}");
            std::process::exit(1);
        }
    };

    let predictor = match HttpPredictor::new(InferenceConfig::new(config.inference_url.clone())) {
        Ok(predictor) => predictor,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let stats = create_shared_stats_with_persistence(config.data_path.join("stats.json"));

    let mut pipeline = match Pipeline::new(
        settings,
        Arc::new(predictor),
        stats.clone(),
        runtime.handle().clone(),
    ) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };
    let view = pipeline.view();
    println!("Instance ID: {}", view.instance_id());

    let mut feed = SampleFeed::new(config.feed.clone());
    if let Err(e) = feed.start() {
        eprintln!("Error starting feed: {e}");
        std::process::exit(1);
    }

    #[cfg(feature = "server")]
    let server_shutdown = match overrides.serve {
        Some(port) => {
            use emg_predict_agent::server::{run, ServerConfig, ServerState};
            let state = ServerState::new(view.clone(), feed.sender());
            match runtime.block_on(run(ServerConfig::new(port), state)) {
                Ok((addr, shutdown)) => {
                    println!("  Server: http://{addr}");
                    Some(shutdown)
                }
                Err(e) => {
                    eprintln!("Warning: Could not start server: {e}");
                    None
                }
            }
        }
        None => None,
    };

    #[cfg(not(feature = "server"))]
    if overrides.serve.is_some() {
        eprintln!("Warning: --serve flag ignored (server feature not enabled at compile time)");
    }

    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(running.clone());

    // Main ingestion loop; dispatches run on the runtime.
    let receiver = feed.receiver().clone();
    let mut last_report = Instant::now();

    while running.load(Ordering::SeqCst) {
        match receiver.recv_timeout(Duration::from_millis(100)) {
            Ok(line) => {
                pipeline.ingest_line(&line);
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                if !feed.is_running() && receiver.is_empty() {
                    println!("Feed closed.");
                    break;
                }
            }
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                eprintln!("Feed disconnected unexpectedly");
                break;
            }
        }

        if last_report.elapsed() >= REPORT_INTERVAL {
            let snapshot = stats.snapshot();
            let latest = view
                .latest_prediction()
                .and_then(|p| p.prediction)
                .map(|p| p.to_string())
                .unwrap_or_else(|| "-".to_string());
            println!(
                "[{}] {} samples | {} windows | {} in flight | latest prediction: {} | max: {}",
                Utc::now().format("%H:%M:%S"),
                snapshot.samples_ingested,
                snapshot.windows_dispatched,
                pipeline.in_flight(),
                latest,
                view.max_value()
            );
            last_report = Instant::now();
        }
    }

    println!();
    println!("Stopping pipeline...");
    feed.stop();

    let report = runtime.block_on(pipeline.shutdown(config.shutdown_grace));
    if report.cancelled > 0 {
        println!(
            "Drained {} predictions, cancelled {} still in flight",
            report.completed, report.cancelled
        );
    }

    #[cfg(feature = "server")]
    if let Some(shutdown) = server_shutdown {
        let _ = shutdown.send(());
    }

    // Export the session
    let document = view.export();
    let export_path = config.export_path.join(session_file_name(Utc::now()));
    match document.write_to(&export_path) {
        Ok(()) => {
            stats.record_export();
            println!(
                "Exported {} samples, {} predictions to {:?}",
                document.sample_history.len(),
                document.predictions.len(),
                export_path
            );
        }
        Err(e) => eprintln!("Error writing export: {e}"),
    }

    if let Err(e) = stats.save() {
        eprintln!("Warning: Could not save stats: {e}");
    }

    runtime.shutdown_timeout(Duration::from_secs(1));

    println!();
    println!("{}", stats.summary());
}

fn cmd_status() {
    let config = Config::load().unwrap_or_default();

    println!("EMG Predict Agent Status");
    println!("========================");
    println!();

    println!("Configuration:");
    println!("  Feed: {}", config.feed);
    println!(
        "  Window: {} samples, stride {}",
        config.window_size, config.stride
    );
    println!("  Inference: {}", config.inference_url);
    match config.validate() {
        Ok(()) => println!("  Valid: yes"),
        Err(e) => println!("  Valid: no ({e})"),
    }
    println!();

    let stats_path = config.data_path.join("stats.json");
    if stats_path.exists() {
        match PersistedStats::read(&stats_path) {
            Ok(stats) => {
                println!("Cumulative Statistics:");
                println!("  Samples ingested: {}", stats.samples_ingested);
                println!("  Malformed dropped: {}", stats.malformed_dropped);
                println!("  Word events: {}", stats.word_events);
                println!("  Windows dispatched: {}", stats.windows_dispatched);
                println!("  Predictions succeeded: {}", stats.predictions_succeeded);
                println!("  Predictions failed: {}", stats.predictions_failed);
                println!("  Exports written: {}", stats.exports_written);
                println!("  Last updated: {}", stats.last_updated);
            }
            Err(e) => eprintln!("Could not read stats: {e}"),
        }
    } else {
        println!("No previous session data found.");
    }
}

fn cmd_export(output: Option<PathBuf>, format: &str) {
    let config = Config::load().unwrap_or_default();
    let export_dir = output.unwrap_or(config.export_path.clone());

    let mut session_files: Vec<PathBuf> = std::fs::read_dir(&export_dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| {
                    p.extension().map(|e| e == "json").unwrap_or(false)
                        && p.file_name()
                            .and_then(|n| n.to_str())
                            .map(|n| n.starts_with("session_"))
                            .unwrap_or(false)
                })
                .collect()
        })
        .unwrap_or_default();
    session_files.sort();

    if session_files.is_empty() {
        println!("No session data found in {export_dir:?}");
        println!("Run 'emg-predict start' to begin collecting data.");
        return;
    }

    println!(
        "Found {} session file(s) in {:?}",
        session_files.len(),
        export_dir
    );

    let mut documents: Vec<ExportDocument> = Vec::new();
    for file in &session_files {
        match ExportDocument::read_from(file) {
            Ok(doc) => documents.push(doc),
            Err(e) => eprintln!("Skipping {file:?}: {e}"),
        }
    }

    let predictions: usize = documents.iter().map(|d| d.predictions.len()).sum();
    println!("Total sessions: {}", documents.len());
    println!("Total predictions: {predictions}");

    let output_path = export_dir.join(format!(
        "export_{}.{}",
        Utc::now().format("%Y%m%d_%H%M%S"),
        if format == "jsonl" { "jsonl" } else { "json" }
    ));

    let result = if format == "jsonl" {
        // One session document per line
        let lines: Vec<String> = documents
            .iter()
            .filter_map(|d| serde_json::to_string(d).ok())
            .collect();
        std::fs::write(&output_path, lines.join("\n"))
    } else {
        match serde_json::to_string_pretty(&documents) {
            Ok(json) => std::fs::write(&output_path, json),
            Err(e) => {
                eprintln!("Error serializing: {e}");
                return;
            }
        }
    };

    match result {
        Ok(_) => println!("Exported to {output_path:?}"),
        Err(e) => eprintln!("Error writing export: {e}"),
    }
}

fn cmd_config() {
    let config = Config::load().unwrap_or_default();

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(&config).unwrap_or_else(|_| "Error".to_string())
    );
}

fn cmd_validate() {
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    match config.validate() {
        Ok(()) => println!("Configuration OK: {:?}", Config::config_path()),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

/// Set up Ctrl+C handler.
fn ctrlc_handler(running: Arc<AtomicBool>) {
    if let Err(e) = ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    }) {
        eprintln!("Warning: Could not set Ctrl+C handler: {e}");
    }
}
