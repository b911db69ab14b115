//! Error types for the normalizer
//!
//! Every failure below the batch level is a value carried back to the
//! caller: a book that fails is logged and counted, never allowed to take
//! its siblings down with it.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Failure running an external media tool (ffmpeg / ffprobe)
#[derive(Error, Debug)]
pub enum ToolError {
    /// The binary could not be spawned at all - an environment problem,
    /// not a per-file data problem
    #[error("{program} not found. Please ensure FFmpeg is installed and in your PATH")]
    NotFound { program: String },

    /// The tool ran and exited non-zero
    #[error("{program} exited with {status}: {stderr_tail}")]
    Failed {
        program: String,
        status: String,
        /// Last few lines of stderr, joined with spaces
        stderr_tail: String,
    },

    /// The tool did not finish within the configured limit and was killed
    #[error("{program} timed out after {}s", .timeout.as_secs())]
    TimedOut { program: String, timeout: Duration },

    #[error("failed to run {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

impl ToolError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ToolError::NotFound { .. })
    }
}

/// Duration could not be determined for a file
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("unparsable duration output {output:?}")]
    Parse { output: String },
}

/// Failure converting a single book
#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("mux failed for {title}: {source}")]
    Mux {
        title: String,
        #[source]
        source: ToolError,
    },

    #[error("mux for {title} exited cleanly but produced no output at {}", .output.display())]
    MissingOutput { title: String, output: PathBuf },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("book {0} has no audio files")]
    NoAudio(String),
}

impl ConvertError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        ConvertError::Io {
            context: context.into(),
            source,
        }
    }
}

/// Failure scanning the input tree
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("root directory {} is not a directory", .0.display())]
    NotADirectory(PathBuf),

    #[error("failed to read {}: {source}", .path.display())]
    ReadDir {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("failed to write report {}: {source}", .path.display())]
    Report {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failure looking up or downloading cover art
#[derive(Error, Debug)]
pub enum CoverArtError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("no search results")]
    NoResults,

    #[error("no ISBN found")]
    NoIsbn,

    #[error("no cover image found for ISBN {0}")]
    NotAnImage(String),

    #[error("failed to save cover: {0}")]
    Io(#[from] std::io::Error),
}

/// Invalid startup configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("input root {} does not exist or is not a directory", .0.display())]
    MissingRoot(PathBuf),

    #[error("output directory {} must not contain the input root {}", .output.display(), .root.display())]
    OutputContainsRoot { output: PathBuf, root: PathBuf },

    #[error("failed to prepare output directory {}: {source}", .path.display())]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Fatal failure before any book is converted
#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Scan(#[from] ScanError),
}
