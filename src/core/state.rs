//! Run settings
//!
//! `Settings` is built once at startup (defaults, then an optional JSON
//! settings file, then command-line overrides) and shared read-only with
//! every component behind an `Arc`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

/// Values that may be persisted in `settings.json`
///
/// Every field is optional so a partial file only overrides what it names.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsFile {
    #[serde(default)]
    pub output_dir_name: Option<String>,
    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,
    #[serde(default)]
    pub ffprobe_path: Option<PathBuf>,
    #[serde(default)]
    pub tool_timeout_secs: Option<u64>,
    #[serde(default)]
    pub aac_bitrate_kbps: Option<u32>,
    #[serde(default)]
    pub max_workers: Option<usize>,
    #[serde(default)]
    pub download_covers: Option<bool>,
    #[serde(default)]
    pub cover_search_url: Option<String>,
    #[serde(default)]
    pub cover_image_url: Option<String>,
}

impl SettingsFile {
    const SETTINGS_FILE: &'static str = "settings.json";

    /// Default location: `<config dir>/m4b-normalizer/settings.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("m4b-normalizer").join(Self::SETTINGS_FILE))
    }

    /// Load a settings file, or return defaults if it is missing or malformed
    pub fn load(path: Option<&Path>) -> Self {
        let path = match path.map(Path::to_path_buf).or_else(Self::default_path) {
            Some(p) => p,
            None => return Self::default(),
        };

        match Self::try_load(&path) {
            Ok(Some(file)) => {
                log::debug!("Loaded settings from {}", path.display());
                file
            }
            Ok(None) => Self::default(),
            Err(e) => {
                log::warn!("Ignoring settings file {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    fn try_load(path: &Path) -> Result<Option<Self>, String> {
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read settings file: {}", e))?;
        let file = serde_json::from_str(&contents)
            .map_err(|e| format!("Failed to parse settings file: {}", e))?;
        Ok(Some(file))
    }
}

/// Immutable configuration for one normalization run
#[derive(Debug, Clone)]
pub struct Settings {
    /// Directory containing one subdirectory per book
    pub root_dir: PathBuf,
    /// Directory receiving one subdirectory per converted book
    pub output_dir: PathBuf,
    /// Subdirectory name skipped while scanning the root
    pub output_dir_name: String,
    pub report_file_name: String,
    pub audio_extensions: Vec<String>,
    pub image_extensions: Vec<String>,
    pub ffmpeg_path: PathBuf,
    pub ffprobe_path: PathBuf,
    /// Upper bound on any single external tool run
    pub tool_timeout: Duration,
    /// Bitrate used whenever audio is transcoded to AAC
    pub aac_bitrate_kbps: u32,
    /// Optional cap on the worker pool
    pub max_workers: Option<usize>,
    pub download_covers: bool,
    pub cover_search_url: String,
    pub cover_image_url: String,
    /// Skip the y/n confirmation gates
    pub assume_yes: bool,
    /// Stop after writing the metadata report
    pub scan_only: bool,
}

impl Settings {
    pub const DEFAULT_OUTPUT_DIR_NAME: &'static str = "normalized_audiobooks";
    pub const DEFAULT_REPORT_FILE_NAME: &'static str = "metadata_report.jsonl";
    pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30 * 60);
    pub const DEFAULT_AAC_BITRATE_KBPS: u32 = 128;
    pub const DEFAULT_COVER_SEARCH_URL: &'static str = "http://openlibrary.org/search.json";
    pub const DEFAULT_COVER_IMAGE_URL: &'static str = "http://covers.openlibrary.org/b/isbn";

    /// Defaults for a given input root
    ///
    /// The output directory is placed next to the root, not inside it.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        let root_dir = root_dir.into();
        let output_dir_name = Self::DEFAULT_OUTPUT_DIR_NAME.to_string();
        let output_dir = root_dir
            .parent()
            .map(|p| p.join(&output_dir_name))
            .unwrap_or_else(|| PathBuf::from(&output_dir_name));

        Self {
            root_dir,
            output_dir,
            output_dir_name,
            report_file_name: Self::DEFAULT_REPORT_FILE_NAME.to_string(),
            audio_extensions: vec!["mp3".into(), "m4a".into(), "m4b".into()],
            image_extensions: vec!["jpg".into(), "jpeg".into(), "png".into()],
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
            tool_timeout: Self::DEFAULT_TOOL_TIMEOUT,
            aac_bitrate_kbps: Self::DEFAULT_AAC_BITRATE_KBPS,
            max_workers: None,
            download_covers: true,
            cover_search_url: Self::DEFAULT_COVER_SEARCH_URL.to_string(),
            cover_image_url: Self::DEFAULT_COVER_IMAGE_URL.to_string(),
            assume_yes: false,
            scan_only: false,
        }
    }

    /// Apply values from a settings file on top of the current ones
    pub fn with_file(mut self, file: SettingsFile) -> Self {
        if let Some(name) = file.output_dir_name {
            self.output_dir = self
                .output_dir
                .parent()
                .map(|p| p.join(&name))
                .unwrap_or_else(|| PathBuf::from(&name));
            self.output_dir_name = name;
        }
        if let Some(p) = file.ffmpeg_path {
            self.ffmpeg_path = p;
        }
        if let Some(p) = file.ffprobe_path {
            self.ffprobe_path = p;
        }
        if let Some(secs) = file.tool_timeout_secs {
            self.tool_timeout = Duration::from_secs(secs);
        }
        if let Some(kbps) = file.aac_bitrate_kbps {
            self.aac_bitrate_kbps = kbps;
        }
        if file.max_workers.is_some() {
            self.max_workers = file.max_workers;
        }
        if let Some(enabled) = file.download_covers {
            self.download_covers = enabled;
        }
        if let Some(url) = file.cover_search_url {
            self.cover_search_url = url;
        }
        if let Some(url) = file.cover_image_url {
            self.cover_image_url = url;
        }
        self
    }

    /// Override the output directory (its final component becomes the skip name)
    pub fn with_output_dir(mut self, output_dir: impl Into<PathBuf>) -> Self {
        self.output_dir = output_dir.into();
        if let Some(name) = self.output_dir.file_name() {
            self.output_dir_name = name.to_string_lossy().to_string();
        }
        self
    }

    /// Path of the newline-delimited JSON report
    pub fn report_path(&self) -> PathBuf {
        self.output_dir.join(&self.report_file_name)
    }

    /// Where downloaded covers are cached for this run
    pub fn covers_dir(&self) -> PathBuf {
        self.output_dir.join(".covers")
    }

    /// Check the settings are safe to run with
    ///
    /// The output directory is wiped at startup, so it must never be the
    /// input root or one of its ancestors.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.root_dir.is_dir() {
            return Err(ConfigError::MissingRoot(self.root_dir.clone()));
        }

        let root = self
            .root_dir
            .canonicalize()
            .unwrap_or_else(|_| self.root_dir.clone());
        let output = self
            .output_dir
            .canonicalize()
            .unwrap_or_else(|_| self.output_dir.clone());

        if root.starts_with(&output) {
            return Err(ConfigError::OutputContainsRoot { output, root });
        }
        Ok(())
    }

    /// Lowercased extension of a path, if any
    fn extension_of(path: &Path) -> Option<String> {
        path.extension()
            .map(|e| e.to_string_lossy().to_lowercase())
    }

    pub fn is_audio_file(&self, path: &Path) -> bool {
        Self::extension_of(path).is_some_and(|ext| self.audio_extensions.contains(&ext))
    }

    pub fn is_image_file(&self, path: &Path) -> bool {
        Self::extension_of(path).is_some_and(|ext| self.image_extensions.contains(&ext))
    }
}
