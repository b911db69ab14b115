//! FFmpeg / ffprobe subprocess handling
//!
//! Every external tool invocation goes through [`run_tool`], which maps
//! spawn failures, non-zero exits and timeouts onto [`ToolError`]. The
//! argument builders are kept as plain functions so the exact command
//! lines can be checked without running anything.

use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use crate::error::ToolError;

/// Number of stderr lines kept for diagnostics
const STDERR_TAIL_LINES: usize = 5;

/// Captured stdout of a successful tool run
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    pub stdout: String,
}

/// Run an external tool to completion, capturing stdout and stderr
///
/// The child is killed if `timeout` expires before it exits.
pub async fn run_tool(
    program: &Path,
    args: &[OsString],
    timeout: Duration,
) -> Result<ToolOutput, ToolError> {
    let name = program_name(program);

    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| match e.kind() {
            ErrorKind::NotFound => ToolError::NotFound {
                program: name.clone(),
            },
            _ => ToolError::Io {
                program: name.clone(),
                source: e,
            },
        })?;

    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(result) => result.map_err(|e| ToolError::Io {
            program: name.clone(),
            source: e,
        })?,
        Err(_) => {
            return Err(ToolError::TimedOut {
                program: name,
                timeout,
            });
        }
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ToolError::Failed {
            program: name,
            status: output.status.to_string(),
            stderr_tail: stderr_tail(&stderr, STDERR_TAIL_LINES),
        });
    }

    Ok(ToolOutput {
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
    })
}

/// Last `n` non-empty lines of diagnostic output, joined with spaces
pub fn stderr_tail(stderr: &str, n: usize) -> String {
    let lines: Vec<&str> = stderr
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].join(" ")
}

/// Render a command line for logging
pub fn format_command(program: &Path, args: &[OsString]) -> String {
    let mut parts = vec![program.to_string_lossy().to_string()];
    parts.extend(args.iter().map(|a| a.to_string_lossy().to_string()));
    parts.join(" ")
}

fn program_name(program: &Path) -> String {
    program
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| program.to_string_lossy().to_string())
}

fn args_of<I, S>(items: I) -> Vec<OsString>
where
    I: IntoIterator<Item = S>,
    S: Into<OsString>,
{
    items.into_iter().map(Into::into).collect()
}

/// ffprobe: container duration in seconds as bare numeric stdout
pub fn duration_probe_args(input: &Path) -> Vec<OsString> {
    let mut args = args_of([
        "-v",
        "error",
        "-show_entries",
        "format=duration",
        "-of",
        "default=noprint_wrappers=1:nokey=1",
    ]);
    args.push(input.into());
    args
}

/// ffprobe: codec type of the first video stream (empty when there is none)
pub fn video_stream_probe_args(input: &Path) -> Vec<OsString> {
    let mut args = args_of([
        "-v",
        "error",
        "-select_streams",
        "v:0",
        "-show_entries",
        "stream=codec_type",
        "-of",
        "csv=p=0",
    ]);
    args.push(input.into());
    args
}

/// ffmpeg: re-encode one file to AAC
pub fn reencode_args(input: &Path, output: &Path, bitrate_kbps: u32) -> Vec<OsString> {
    let mut args = args_of(["-y", "-i"]);
    args.push(input.into());
    args.extend(args_of(["-c:a", "aac", "-b:a"]));
    args.push(format!("{}k", bitrate_kbps).into());
    args.push(output.into());
    args
}

/// ffmpeg: copy the audio of a single M4B and attach a cover image
pub fn attach_cover_args(input: &Path, image: &Path, title: &str, output: &Path) -> Vec<OsString> {
    let mut args = args_of(["-y", "-i"]);
    args.push(input.into());
    args.push("-i".into());
    args.push(image.into());
    args.extend(args_of([
        "-map",
        "0:a",
        "-map",
        "1:v",
        "-c:a",
        "copy",
        "-c:v",
        "png",
        "-disposition:v",
        "attached_pic",
        "-metadata",
    ]));
    args.push(format!("title={}", title).into());
    args.push(output.into());
    args
}

/// How the concatenated audio is written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioCodec {
    /// Transcode to AAC at the given bitrate
    Aac(u32),
    /// Stream-copy untouched
    Copy,
}

/// Inputs for a concatenation mux
#[derive(Debug, Clone)]
pub struct ConcatMux<'a> {
    pub manifest: &'a Path,
    pub chapters: &'a Path,
    pub cover: Option<&'a Path>,
    pub codec: AudioCodec,
    pub title: &'a str,
    pub output: &'a Path,
}

/// ffmpeg: concat manifest + chapter metadata (+ cover) into one M4B
///
/// Inputs are 0 = audio manifest, 1 = chapter metadata, 2 = cover image.
pub fn concat_mux_args(mux: &ConcatMux<'_>) -> Vec<OsString> {
    let mut args = args_of(["-y", "-f", "concat", "-safe", "0", "-i"]);
    args.push(mux.manifest.into());
    args.push("-i".into());
    args.push(mux.chapters.into());
    if let Some(cover) = mux.cover {
        args.push("-i".into());
        args.push(cover.into());
    }

    args.extend(args_of(["-map", "0:a", "-map_metadata", "1"]));
    if mux.cover.is_some() {
        args.extend(args_of(["-map", "2:v"]));
    }

    match mux.codec {
        AudioCodec::Aac(kbps) => {
            args.extend(args_of(["-c:a", "aac", "-b:a"]));
            args.push(format!("{}k", kbps).into());
        }
        AudioCodec::Copy => args.extend(args_of(["-c:a", "copy"])),
    }

    if mux.cover.is_some() {
        args.extend(args_of(["-c:v", "png", "-disposition:v", "attached_pic"]));
    }

    args.push("-metadata".into());
    args.push(format!("title={}", mux.title).into());
    args.push(mux.output.into());
    args
}
