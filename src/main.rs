//! m4b-normalizer
//!
//! Converts a library of audiobook folders into one chaptered M4B per book,
//! with cover art embedded where one can be found.

mod audio;
mod conversion;
mod core;
mod cover_art;
mod error;
mod logging;
#[cfg(test)]
mod test_fixtures;

use clap::Parser;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use crate::conversion::{prepare_output_dir, run_batch, BatchReport};
use crate::core::{classify, BookTask, Settings, SettingsFile};
use crate::cover_art::CoverArtClient;
use crate::error::RunError;

#[derive(Parser, Debug)]
#[command(name = "m4b-normalizer", version)]
#[command(about = "Normalize a folder of audiobooks into chaptered M4B files", long_about = None)]
struct Cli {
    /// Directory containing one subdirectory per book
    #[arg(default_value = "audiobooks")]
    root: PathBuf,

    /// Output directory (default: `normalized_audiobooks` next to ROOT)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Settings file to load instead of the default location
    #[arg(long)]
    settings: Option<PathBuf>,

    /// ffmpeg binary
    #[arg(long)]
    ffmpeg: Option<PathBuf>,

    /// ffprobe binary
    #[arg(long)]
    ffprobe: Option<PathBuf>,

    /// Maximum number of books converted at once
    #[arg(short, long, value_parser = clap::value_parser!(u16).range(1..))]
    jobs: Option<u16>,

    /// Never query the cover-art service
    #[arg(long)]
    no_cover_download: bool,

    /// Answer yes to every confirmation prompt
    #[arg(short = 'y', long)]
    yes: bool,

    /// Classify and write the report, then stop
    #[arg(long)]
    scan_only: bool,

    /// Show debug output in the terminal
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    /// Defaults, then the settings file, then command-line flags
    fn into_settings(self) -> Settings {
        let root = self.root.canonicalize().unwrap_or(self.root);
        let mut settings =
            Settings::new(root).with_file(SettingsFile::load(self.settings.as_deref()));

        if let Some(output) = self.output {
            settings = settings.with_output_dir(output);
        }
        if let Some(ffmpeg) = self.ffmpeg {
            settings.ffmpeg_path = ffmpeg;
        }
        if let Some(ffprobe) = self.ffprobe {
            settings.ffprobe_path = ffprobe;
        }
        if let Some(jobs) = self.jobs {
            settings.max_workers = Some(usize::from(jobs));
        }
        if self.no_cover_download {
            settings.download_covers = false;
        }
        settings.assume_yes = self.yes;
        settings.scan_only = self.scan_only;
        settings
    }
}

/// Totals for a whole run
#[derive(Debug, Default, PartialEq, Eq)]
struct RunSummary {
    converted: usize,
    failed: usize,
}

impl RunSummary {
    fn add(&mut self, report: &BatchReport) {
        self.converted += report.converted();
        self.failed += report.failed();
    }
}

/// Ask a yes/no question until it gets an answer
///
/// End of input or a read error counts as "no".
fn confirm<R: BufRead, W: Write>(input: &mut R, output: &mut W, prompt: &str) -> bool {
    loop {
        let _ = write!(output, "{} (y/n): ", prompt);
        let _ = output.flush();

        let mut line = String::new();
        match input.read_line(&mut line) {
            Ok(0) | Err(_) => {
                let _ = writeln!(output);
                return false;
            }
            Ok(_) => {}
        }

        match line.trim().to_lowercase().as_str() {
            "y" | "yes" => return true,
            "n" | "no" => return false,
            _ => {
                let _ = writeln!(output, "Please answer 'y' or 'n'.");
            }
        }
    }
}

/// Confirmation gate; stdin is read on the blocking pool
async fn gate(settings: &Settings, prompt: &str) -> bool {
    if settings.assume_yes {
        return true;
    }
    let prompt = prompt.to_string();
    tokio::task::spawn_blocking(move || {
        let stdin = io::stdin();
        confirm(&mut stdin.lock(), &mut io::stdout(), &prompt)
    })
    .await
    .unwrap_or(false)
}

fn log_plan(heading: &str, tasks: &[BookTask]) {
    log::info!("{} ({}):", heading, tasks.len());
    for task in tasks {
        log::info!("  - {}  ->  {}", task.display_name, task.output_file_name());
    }
}

async fn run(settings: Arc<Settings>) -> Result<RunSummary, RunError> {
    let output_dir = prepare_output_dir(&settings)?;

    let covers = if settings.download_covers {
        match CoverArtClient::new(&settings) {
            Ok(client) => Some(client),
            Err(e) => {
                log::warn!("Cover downloads disabled: {}", e);
                None
            }
        }
    } else {
        None
    };

    log::info!("Scanning {}", settings.root_dir.display());
    let classification = classify(settings.clone(), covers.as_ref()).await?;
    log::info!(
        "Found {} books ({} normal, {} problematic). Report: {}",
        classification.records.len(),
        classification.normal.len(),
        classification.problematic.len(),
        settings.report_path().display()
    );

    let mut summary = RunSummary::default();
    if settings.scan_only {
        return Ok(summary);
    }
    if classification.normal.is_empty() && classification.problematic.is_empty() {
        log::info!("No audiobooks found in {}", settings.root_dir.display());
        return Ok(summary);
    }

    if !classification.normal.is_empty() {
        log_plan("Books to convert", &classification.normal);
        if !gate(&settings, "Proceed with conversion?").await {
            log::info!("Conversion cancelled. Nothing was converted.");
            return Ok(summary);
        }
        let report = run_batch(settings.clone(), classification.normal).await;
        summary.add(&report);
    }

    if !classification.problematic.is_empty() {
        log_plan(
            "Problematic books (some files could not be probed)",
            &classification.problematic,
        );
        if gate(&settings, "Attempt to convert problematic books?").await {
            let report = run_batch(settings.clone(), classification.problematic).await;
            summary.add(&report);
        } else {
            log::info!("Skipping problematic books.");
        }
    }

    log::info!(
        "All done: {} converted, {} failed. Output: {}",
        summary.converted,
        summary.failed,
        output_dir.display()
    );
    Ok(summary)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose);

    let settings = Arc::new(cli.into_settings());
    match run(settings).await {
        Ok(summary) if summary.failed > 0 => ExitCode::from(2),
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("[Critical Error] {}", e);
            ExitCode::from(1)
        }
    }
}
