use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use sequence_detection::record::{GIMBAL_PITCH_TAG, IMAGE_SOURCE_TAG};
use sequence_detection::{
    collect_images, extract_packet, prepare_destination, tag_value, CancelToken, EventSink,
    RunEvent, RunTally, SequenceClassifier, SequenceConfig, Severity,
};

#[derive(Parser)]
#[command(name = "polesort")]
#[command(about = "Sorts drone pole-inspection photos into completed-pole batches")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan a folder of drone photos and move each complete pole sequence
    /// into the output folder
    Verify {
        /// Folder containing the captured images
        #[arg(short, long)]
        path: PathBuf,

        /// Name of the output folder, created inside the scanned folder
        #[arg(short, long)]
        output: String,

        /// Minimum number of orbit shots for a sequence to be complete
        #[arg(long, default_value_t = 25)]
        min_orbit_shots: u32,

        /// Gimbal pitch at or below which a shot counts as NADIR (degrees)
        #[arg(long, default_value_t = -89.0, allow_negative_numbers = true)]
        nadir_pitch: f64,

        /// Write the final tally to a JSON file
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Print the embedded metadata tags of a single image
    Inspect {
        /// Image file to inspect
        file: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Verify {
            path,
            output,
            min_orbit_shots,
            nadir_pitch,
            report,
        } => run_verify(path, output, min_orbit_shots, nadir_pitch, report),
        Commands::Inspect { file } => inspect(&file),
    }
}

fn run_verify(
    path: PathBuf,
    output: String,
    min_orbit_shots: u32,
    nadir_pitch: f64,
    report: Option<PathBuf>,
) -> Result<()> {
    let destination = prepare_destination(&path, &output)?;

    println!("🔍 Processing images from folder: {}", path.display());
    let files = collect_images(&path)?;
    println!("📸 Found {} images...", files.len());

    let classifier = SequenceClassifier::new(SequenceConfig {
        nadir_pitch_max: nadir_pitch,
        min_orbit_shots,
    });

    let mut sink = ConsoleSink::default();
    let tally = classifier.classify(&files, &destination, &mut sink, &CancelToken::new())?;

    if let Some(report_path) = report {
        let json =
            serde_json::to_string_pretty(&tally).context("Failed to serialize tally report")?;
        std::fs::write(&report_path, json)
            .with_context(|| format!("Failed to write report to {}", report_path.display()))?;
        println!("💾 Report saved to: {}", report_path.display());
    }

    Ok(())
}

fn inspect(file: &PathBuf) -> Result<()> {
    match extract_packet(file)? {
        None => println!("No metadata packet found in {}", file.display()),
        Some(packet) => {
            println!("Metadata packet: {} bytes", packet.xmp.len());
            for tag in [GIMBAL_PITCH_TAG, IMAGE_SOURCE_TAG] {
                println!("  {tag} = {}", tag_value(&packet.xmp, tag).unwrap_or("<absent>"));
            }
            match &packet.maker_note {
                Some(bytes) => println!("Maker note: {} bytes", bytes.len()),
                None => println!("Maker note: absent"),
            }
        }
    }
    Ok(())
}

/// Renders run events as timestamped console lines.
#[derive(Default)]
struct ConsoleSink {
    last_decile: u32,
}

impl EventSink for ConsoleSink {
    fn emit(&mut self, event: RunEvent) {
        match event {
            RunEvent::Progress(fraction) => {
                // Whole-decile steps keep large batches readable.
                let decile = (fraction * 10.0) as u32;
                if decile > self.last_decile {
                    self.last_decile = decile;
                    println!("… {}%", decile * 10);
                }
            }
            RunEvent::Log { severity, message } => {
                let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
                println!("{timestamp} [{:5}] {message}", tag(severity));
            }
            RunEvent::PoleCount(count) => println!("🗼 Poles completed: {count}"),
            RunEvent::Tally(tally) => print_tally(&tally),
            RunEvent::Finished => println!("✅ Processing Completed!"),
        }
    }
}

fn tag(severity: Severity) -> &'static str {
    match severity {
        Severity::Info => "info",
        Severity::Notice => "note",
        Severity::Success => "ok",
        Severity::Warning => "warn",
        Severity::Error => "error",
    }
}

fn print_tally(tally: &RunTally) {
    println!();
    println!("Total Images Processed: {}", tally.processed);
    println!("Total Valid Pole Sequences: {}", tally.valid_sequences);
    println!("Total Poles (unique zoom shots): {}", tally.poles);
    println!("Total Broken Image Sequences: {}", tally.broken);
    println!("Duplicate NADIR Shots: {}", tally.duplicate_nadir);
    println!("Duplicate Zoom Shots: {}", tally.duplicate_zoom);
    println!("Broken Sequences due to missing NADIR: {}", tally.missing_nadir);
    println!("Broken Sequences due to missing ZOOM: {}", tally.missing_zoom);
}
