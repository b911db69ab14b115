//! Chapter metadata for the mux step
//!
//! One chapter per audio file, titled with the file's base name. Files whose
//! duration cannot be probed get no chapter and do not advance the clock, so
//! the next chapter starts where the previous known one ended.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use super::probe::DurationProber;

/// Header token of an FFmpeg metadata file
pub const FFMETADATA_HEADER: &str = ";FFMETADATA1";

/// A named time range in milliseconds, `[start_ms, end_ms)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterEntry {
    pub title: String,
    pub start_ms: u64,
    pub end_ms: u64,
}

/// Ordered, contiguous chapters for one book
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChapterPlan {
    pub chapters: Vec<ChapterEntry>,
    pub total_duration_ms: u64,
}

impl ChapterPlan {
    /// Build chapters from files with already-known durations (seconds)
    pub fn from_durations<'a, I>(files: I) -> Self
    where
        I: IntoIterator<Item = (&'a Path, Option<f64>)>,
    {
        let mut plan = ChapterPlan::default();

        for (path, duration) in files {
            let Some(secs) = duration else {
                continue;
            };

            let start_ms = plan.total_duration_ms;
            let end_ms = start_ms.saturating_add((secs * 1000.0) as u64);
            plan.chapters.push(ChapterEntry {
                title: chapter_title(path),
                start_ms,
                end_ms,
            });
            plan.total_duration_ms = end_ms;
        }

        plan
    }

    /// Render as an FFmpeg metadata file (timebase 1/1000)
    pub fn to_ffmetadata(&self) -> String {
        let mut out = String::new();
        out.push_str(FFMETADATA_HEADER);
        out.push('\n');
        for chapter in &self.chapters {
            // Writing to a String cannot fail
            let _ = write!(
                out,
                "[CHAPTER]\nTIMEBASE=1/1000\nSTART={}\nEND={}\ntitle={}\n",
                chapter.start_ms,
                chapter.end_ms,
                escape_metadata_value(&chapter.title)
            );
        }
        out
    }
}

/// Probe every file in order and build the chapter plan
pub async fn build_chapters(prober: &mut DurationProber, audio_files: &[PathBuf]) -> ChapterPlan {
    let mut durations = Vec::with_capacity(audio_files.len());
    for file in audio_files {
        durations.push(prober.duration(file).await);
    }

    ChapterPlan::from_durations(
        audio_files
            .iter()
            .map(PathBuf::as_path)
            .zip(durations),
    )
}

/// File name without its extension
fn chapter_title(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Escape characters that are special in FFmpeg metadata values
fn escape_metadata_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '=' | ';' | '#' | '\\' | '\n') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
