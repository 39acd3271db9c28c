//! ClipForge - Group Discussion Highlight Pipeline
//!
//! This is the main entry point for the ClipForge application, which
//! organizes multi-microphone discussion recordings, transcribes them,
//! finds entertainment highlights with an LLM, and cuts shareable clips.

use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use clipforge::aggregate::aggregate_transcripts;
use clipforge::analyze::{AnalysisResults, AnalyzerFactory, AnalyzerTrait};
use clipforge::classify::classify_session;
use clipforge::cli::{Args, Commands};
use clipforge::clips::ClipExtractor;
use clipforge::clock::SystemClock;
use clipforge::config::Config;
use clipforge::pipeline::Pipeline;
use clipforge::session::{AudioProcessingStatus, Session};
use clipforge::speakers::{map_speaker_labels, strategy_for_file};
use clipforge::storage::{FileSessionStore, SessionStore};
use clipforge::transcribe::{persist_sidecars, read_sidecars, TranscriberFactory, TranscriberTrait};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Setup logging to both console and file
    setup_logging(args.verbose)?;

    // Load configuration
    let mut config = match &args.config {
        Some(config_path) => Config::from_file(config_path)?,
        None => {
            // Try to load config.toml from current directory first
            if std::path::Path::new("config.toml").exists() {
                info!("Found config.toml in current directory, loading...");
                Config::from_file("config.toml")?
            } else {
                Config::default()
            }
        }
    };

    // Execute command
    match args.command {
        Commands::Process { input } => {
            info!("Processing session folder: {}", input.display());
            let pipeline = Pipeline::new(config);
            let session = pipeline.process_session(&input).await?;
            println!(
                "Session {} finished with status {:?}",
                session.id, session.status
            );
            for clip in &session.clips {
                println!("  {} -> {}", clip.label, clip.clip.url);
            }
        }
        Commands::Batch { input_dir } => {
            if let Some(dir) = input_dir {
                config.pipeline.root_dir = dir.to_string_lossy().to_string();
            }
            info!("Processing sessions under {}", config.pipeline.root_dir);
            let pipeline = Arc::new(Pipeline::new(config));
            let sessions = pipeline.process_batch().await?;
            println!("Processed {} sessions", sessions.len());
            for session in &sessions {
                println!("  {} -> {:?}", session.id, session.status);
            }
        }
        Commands::Repair { session_id } => {
            info!("Repairing session: {}", session_id);
            let pipeline = Pipeline::new(config);
            let session = pipeline.repair_session(&session_id).await?;
            println!(
                "Session {} finished with status {:?}",
                session.id, session.status
            );
        }
        Commands::Sessions => {
            let store = FileSessionStore::new(&config.pipeline.store_dir);
            let sessions = store.list().await?;

            if sessions.is_empty() {
                println!("No stored sessions found.");
            } else {
                println!("\nStored Sessions:");
                println!(
                    "{:<32} {:<14} {:<6} {:<20}",
                    "Id", "Status", "Files", "Updated"
                );
                println!("{}", "-".repeat(75));
                for session in sessions {
                    println!(
                        "{:<32} {:<14} {:<6} {:<20}",
                        session.id,
                        format!("{:?}", session.status),
                        session.audio_files.len(),
                        session.updated_at.format("%Y-%m-%d %H:%M:%S")
                    );
                }
            }
        }
        Commands::Classify { input } => {
            info!("Classifying session folder: {}", input.display());
            let id = input
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("session")
                .to_string();
            let mut session = Session::new(id.clone(), id, input.clone(), Utc::now());
            classify_session(&mut session)?;
            print_classification(&session);
        }
        Commands::Transcribe { input } => {
            info!("Transcribing file: {}", input.display());
            let transcriber = TranscriberFactory::create_default(config.transcription.clone());
            let audio_url = transcriber.upload_file(&input).await?;
            let job_id = transcriber.submit_job(&audio_url).await?;
            println!("Submitted job {}", job_id);
            let result = transcriber.poll_transcription(&job_id).await?;
            let (json_path, txt_path) = persist_sidecars(&input, &result)?;
            println!("Transcript -> {}", txt_path.display());
            println!("Raw result -> {}", json_path.display());
        }
        Commands::Analyze { input } => {
            info!("Analyzing session folder: {}", input.display());
            let id = input
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("session")
                .to_string();
            let mut session = Session::new(id.clone(), id, input.clone(), Utc::now());
            classify_session(&mut session)?;
            for (slot, name) in config.pipeline.participants.iter().enumerate() {
                session
                    .mic_assignments
                    .entry(slot as u32)
                    .or_insert_with(|| name.clone());
            }
            session.derive_participants();

            let assignments = session.mic_assignments.clone();
            for file in &mut session.audio_files {
                if let Some((text, raw)) = read_sidecars(&file.path) {
                    file.transcript = Some(map_speaker_labels(
                        &text,
                        strategy_for_file(file),
                        &assignments,
                    ));
                    file.raw_transcription_path = Some(raw);
                    file.status = AudioProcessingStatus::TranscriptionComplete;
                }
            }
            if !session.audio_files.iter().any(|f| f.has_transcript()) {
                anyhow::bail!("No transcript sidecars found in {}", input.display());
            }

            let transcript =
                aggregate_transcripts(&session, config.analysis.transcript_char_budget);
            let analyzer =
                AnalyzerFactory::create_default(config.analysis.clone(), Arc::new(SystemClock));
            let results = analyzer.analyze_session(&session, &transcript, &input).await?;
            print_analysis(&results);
        }
        Commands::Clip {
            input,
            session_id,
            start,
            end,
        } => {
            info!("Extracting clip from: {}", input.display());
            let extractor = ClipExtractor::new(config.clips.clone());
            let clip = extractor.extract_clip(&input, &session_id, start, end)?;
            println!(
                "Wrote {} ({:.1}s) -> {}",
                clip.path.display(),
                clip.duration_secs,
                clip.url
            );
        }
        Commands::Init { force } => {
            let path = std::path::Path::new("config.toml");
            if path.exists() && !force {
                println!("config.toml already exists, use --force to overwrite");
            } else {
                Config::default().save_to_file(path)?;
                println!("Wrote default configuration to config.toml");
            }
        }
    }

    Ok(())
}

/// Setup logging to both console and file
fn setup_logging(verbose: bool) -> Result<()> {
    // Create log directory
    let clipforge_dir = std::env::current_dir()?.join(".clipforge");
    let log_dir = clipforge_dir.join("log");
    std::fs::create_dir_all(&log_dir)?;

    // Set up file appender with daily rotation
    let file_appender = rolling::daily(&log_dir, "clipforge.log");
    let (non_blocking_file, _guard) = non_blocking(file_appender);
    // Keep the guard alive for the duration of the program
    std::mem::forget(_guard);

    // Determine log level
    let log_level = if verbose { Level::DEBUG } else { Level::INFO };

    // Create console layer
    let console_layer = fmt::layer()
        .with_target(false)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true);

    // Create file layer
    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_target(false)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false); // No ANSI colors in file

    // Setup layered subscriber
    let subscriber = tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(console_layer)
        .with(file_layer);

    // Initialize the subscriber
    subscriber
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!(
        "Logging initialized - console: {}, file: {}",
        log_level,
        log_dir.join("clipforge.log").display()
    );

    Ok(())
}

fn print_analysis(results: &AnalysisResults) {
    if results.degraded {
        println!(
            "\nDegraded analysis: {}",
            results
                .degraded_reason
                .as_deref()
                .unwrap_or("no reason recorded")
        );
        return;
    }

    println!("\nCategory Winners:");
    for winner in &results.winners {
        let score = winner
            .score
            .map(|s| format!(" (score {:.1})", s))
            .unwrap_or_default();
        println!(
            "  {}: {} - \"{}\"{}",
            winner.category.title(),
            winner.speaker,
            winner.quote,
            score
        );
    }
    for list in &results.top_fives {
        println!("\n{}:", list.category.title());
        for entry in &list.entries {
            println!("  {}. {} - \"{}\"", entry.rank, entry.speaker, entry.quote);
        }
    }
}

fn print_classification(session: &Session) {
    println!("\nClassified Files:");
    println!("{:<32} {:<14} {:<10}", "File", "Kind", "Size (KB)");
    println!("{}", "-".repeat(60));
    for file in &session.audio_files {
        let kind = if file.is_master {
            "master".to_string()
        } else if let Some(slot) = file.speaker_slot {
            format!("mic {}", slot + 1)
        } else if let Some(role) = file.aux_role {
            role.label().to_lowercase()
        } else {
            "unidentified".to_string()
        };
        println!(
            "{:<32} {:<14} {:<10.1}",
            file.file_name,
            kind,
            file.size_bytes as f64 / 1024.0
        );
    }
}
