//! Duration probing through ffprobe
//!
//! A prober memoizes results per file path. Each owner (the classifier,
//! or one book task) gets its own prober, so no state is shared between
//! workers.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::conversion::{duration_probe_args, run_tool, video_stream_probe_args};
use crate::core::Settings;
use crate::error::ProbeError;

/// Longest duration accepted from a probe (30 days)
const MAX_DURATION_SECS: f64 = 30.0 * 24.0 * 3600.0;

/// Parse ffprobe's bare numeric duration output
pub fn parse_duration(stdout: &str) -> Result<f64, ProbeError> {
    let trimmed = stdout.trim();
    match trimmed.parse::<f64>() {
        Ok(secs) if (0.0..=MAX_DURATION_SECS).contains(&secs) => Ok(secs),
        _ => Err(ProbeError::Parse {
            output: trimmed.to_string(),
        }),
    }
}

/// Probe the duration of one file in seconds
pub async fn probe_duration(settings: &Settings, path: &Path) -> Result<f64, ProbeError> {
    let output = run_tool(
        &settings.ffprobe_path,
        &duration_probe_args(path),
        settings.tool_timeout,
    )
    .await?;
    parse_duration(&output.stdout)
}

/// Memoizing duration prober
pub struct DurationProber {
    settings: Arc<Settings>,
    cache: HashMap<PathBuf, Option<f64>>,
}

impl DurationProber {
    pub fn new(settings: Arc<Settings>) -> Self {
        Self {
            settings,
            cache: HashMap::new(),
        }
    }

    /// Duration in seconds, or None if it could not be determined
    ///
    /// Failures are logged once per file; later calls hit the cache.
    pub async fn duration(&mut self, path: &Path) -> Option<f64> {
        if let Some(cached) = self.cache.get(path) {
            return *cached;
        }

        let result = match probe_duration(&self.settings, path).await {
            Ok(secs) => Some(secs),
            Err(e) => {
                let file_name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_else(|| path.display().to_string());
                if let ProbeError::Tool(tool) = &e
                    && tool.is_not_found()
                {
                    log::error!("[Critical Error] {}", tool);
                }
                log::warn!(
                    "  [Warning] Could not get duration for {}. Chapter will be skipped. Error: {}",
                    file_name,
                    e
                );
                None
            }
        };

        self.cache.insert(path.to_path_buf(), result);
        result
    }

    /// Whether the file already carries a video (cover) stream
    ///
    /// A failed probe counts as "no cover".
    pub async fn has_embedded_video(&self, path: &Path) -> bool {
        match run_tool(
            &self.settings.ffprobe_path,
            &video_stream_probe_args(path),
            self.settings.tool_timeout,
        )
        .await
        {
            Ok(output) => output.stdout.contains("video"),
            Err(e) => {
                log::warn!(
                    "  [Warning] Could not inspect streams of {}: {}",
                    path.display(),
                    e
                );
                false
            }
        }
    }

    #[cfg(test)]
    pub fn cached_paths(&self) -> usize {
        self.cache.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("12.5\n").unwrap(), 12.5);
        assert_eq!(parse_duration("  3600.000000 ").unwrap(), 3600.0);
        assert!(parse_duration("N/A").is_err());
        assert!(parse_duration("").is_err());
        assert!(parse_duration("-1").is_err());
        assert!(parse_duration("inf").is_err());
        assert!(parse_duration("NaN").is_err());
        assert!(parse_duration("1e300").is_err());
        assert!(parse_duration("2592001").is_err());
        assert_eq!(parse_duration("2592000").unwrap(), 2_592_000.0);
    }

    #[tokio::test]
    async fn test_missing_ffprobe_is_probe_failure() {
        let mut settings = Settings::new("/tmp/audiobooks");
        settings.ffprobe_path = PathBuf::from("/nonexistent/ffprobe");
        let mut prober = DurationProber::new(Arc::new(settings));

        assert_eq!(prober.duration(Path::new("/tmp/a.mp3")).await, None);
        assert!(!prober.has_embedded_video(Path::new("/tmp/a.m4b")).await);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_probe_results_are_memoized() {
        let fixture = crate::test_fixtures::Fixture::new();
        let good = fixture.audio_file("Book", "01.mp3", "61.25");
        let bad = fixture.audio_file("Book", "02.mp3", "broken");

        let mut prober = DurationProber::new(fixture.settings());
        assert_eq!(prober.duration(&good).await, Some(61.25));
        assert_eq!(prober.duration(&bad).await, None);
        assert_eq!(prober.cached_paths(), 2);

        // Changing the file does not change a memoized answer
        std::fs::write(&good, "5").unwrap();
        assert_eq!(prober.duration(&good).await, Some(61.25));
        assert_eq!(prober.cached_paths(), 2);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_has_embedded_video() {
        let fixture = crate::test_fixtures::Fixture::new();
        let with_cover = fixture.audio_file("Book", "with.m4b", "100 video");
        let without = fixture.audio_file("Book", "without.m4b", "100");

        let prober = DurationProber::new(fixture.settings());
        assert!(prober.has_embedded_video(&with_cover).await);
        assert!(!prober.has_embedded_video(&without).await);
    }
}
