//! Test fixtures for the conversion pipeline
//!
//! Real media tools are replaced by small shell scripts so the classifier,
//! orchestrator and scheduler can run end to end on plain text files.
//!
//! Fake audio files hold their duration as the first word ("61.5"), or
//! "broken" / "unrecoverable" to make probing fail. A file containing the
//! word "video" reports an embedded cover stream.
//!
//! The fake ffmpeg fails on any argument containing "Doomed" and on inputs
//! containing "unrecoverable". Otherwise it writes an output whose first
//! line is "42" followed by its arguments ("ARG ...") and the contents of
//! any .txt inputs (concat manifest, chapter metadata).

#![cfg(test)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

use crate::core::Settings;

const FAKE_FFPROBE: &str = r#"
for a in "$@"; do f="$a"; done
case " $* " in
  *" v:0 "*)
    if grep -q video "$f" 2>/dev/null; then echo video; fi
    exit 0
    ;;
esac
if [ ! -f "$f" ]; then
  echo "$f: No such file or directory" >&2
  exit 1
fi
d=$(head -n 1 "$f" | cut -d ' ' -f 1)
case "$d" in
  broken|"")
    echo "[mov,mp4,m4a] moov atom not found" >&2
    echo "$f: Invalid data found when processing input" >&2
    exit 1
    ;;
esac
echo "$d"
"#;

const FAKE_FFMPEG: &str = r#"
out=""
for a in "$@"; do out="$a"; done
for a in "$@"; do
  case "$a" in
    *Doomed*)
      echo "Error opening output file" >&2
      echo "Conversion failed!" >&2
      exit 1
      ;;
  esac
done
in=""
prev=""
for a in "$@"; do
  if [ "$prev" = "-i" ] && [ -z "$in" ]; then in="$a"; fi
  prev="$a"
done
if [ -f "$in" ] && grep -q unrecoverable "$in"; then
  echo "$in: Invalid data found when processing input" >&2
  exit 1
fi
{
  echo 42
  for a in "$@"; do echo "ARG $a"; done
  for a in "$@"; do
    case "$a" in
      *.txt) if [ -f "$a" ]; then cat "$a"; fi ;;
    esac
  done
} > "$out"
"#;

/// Write an executable `/bin/sh` script
#[cfg(unix)]
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{}", body)).expect("Failed to write script");
    let mut perms = fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).expect("Failed to make script executable");
    path
}

/// A temporary library with fake media tools
pub struct Fixture {
    pub temp: TempDir,
    pub root: PathBuf,
    pub output: PathBuf,
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
}

impl Fixture {
    #[cfg(unix)]
    pub fn new() -> Self {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let root = temp.path().join("audiobooks");
        let output = temp.path().join("normalized_audiobooks");
        let bin = temp.path().join("bin");
        fs::create_dir_all(&root).unwrap();
        fs::create_dir_all(&output).unwrap();
        fs::create_dir_all(&bin).unwrap();

        let ffmpeg = write_script(&bin, "ffmpeg", FAKE_FFMPEG);
        let ffprobe = write_script(&bin, "ffprobe", FAKE_FFPROBE);

        Self {
            temp,
            root,
            output,
            ffmpeg,
            ffprobe,
        }
    }

    /// Settings pointing at the fake tools, with cover downloads disabled
    pub fn settings(&self) -> Arc<Settings> {
        Arc::new(self.settings_value())
    }

    pub fn settings_value(&self) -> Settings {
        let mut settings = Settings::new(&self.root).with_output_dir(&self.output);
        settings.ffmpeg_path = self.ffmpeg.clone();
        settings.ffprobe_path = self.ffprobe.clone();
        settings.download_covers = false;
        settings.assume_yes = true;
        settings
    }

    pub fn book_dir(&self, book: &str) -> PathBuf {
        let dir = self.root.join(book);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    /// Create a file inside a book directory
    pub fn file(&self, book: &str, name: &str, contents: &str) -> PathBuf {
        let path = self.book_dir(book).join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    /// Create a fake audio file whose first word is its duration
    pub fn audio_file(&self, book: &str, name: &str, duration: &str) -> PathBuf {
        self.file(book, name, duration)
    }
}
