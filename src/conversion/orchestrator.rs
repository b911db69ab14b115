//! Per-book conversion
//!
//! Two strategies:
//! - a single M4B is copied as-is, or remuxed with a cover attached when it
//!   has none and one is available
//! - anything else is concatenated through the ffmpeg concat demuxer with
//!   one chapter per input file
//!
//! All temporary files live in the book's scratch directory, which is
//! removed whether or not the conversion succeeded.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::ffmpeg::{
    attach_cover_args, concat_mux_args, format_command, reencode_args, run_tool, AudioCodec,
    ConcatMux,
};
use super::output_manager::BookWorkspace;
use crate::audio::{build_chapters, AudioContainer, DurationProber};
use crate::core::{BookTask, Settings};
use crate::error::{ConvertError, ToolError};

const MANIFEST_FILE: &str = "concat_list.txt";
const CHAPTERS_FILE: &str = "chapters_metadata.txt";
const REENCODE_DIR: &str = "reencoded";

/// Convert one book into its output M4B
///
/// Returns the path of the written file.
pub async fn convert_book(settings: Arc<Settings>, task: &BookTask) -> Result<PathBuf, ConvertError> {
    if task.audio_files.is_empty() {
        return Err(ConvertError::NoAudio(task.display_name.clone()));
    }

    let workspace = BookWorkspace::for_task(&settings, task);
    workspace.create().await.map_err(|e| {
        ConvertError::io(
            format!("failed to create {}", workspace.scratch_dir.display()),
            e,
        )
    })?;

    let mut prober = DurationProber::new(settings.clone());
    let result = if task.is_single_m4b() {
        convert_single_m4b(&settings, &prober, task, &workspace).await
    } else {
        convert_multiple(&settings, &mut prober, task, &workspace).await
    };

    workspace.cleanup().await;

    let result = result.and_then(|()| {
        if workspace.output_file.is_file() {
            Ok(workspace.output_file.clone())
        } else {
            Err(ConvertError::MissingOutput {
                title: task.display_name.clone(),
                output: workspace.output_file.clone(),
            })
        }
    });

    if result.is_err() {
        workspace.discard_output().await;
    }
    result
}

/// Single M4B: keep an existing cover, attach a local one, or copy verbatim
async fn convert_single_m4b(
    settings: &Settings,
    prober: &DurationProber,
    task: &BookTask,
    workspace: &BookWorkspace,
) -> Result<(), ConvertError> {
    let input = &task.audio_files[0];

    if prober.has_embedded_video(input).await {
        log::debug!("{} already has a cover, copying", task.display_name);
        return copy_verbatim(input, &workspace.output_file).await;
    }

    match &task.cover_image {
        Some(image) => {
            let args = attach_cover_args(input, image, &task.display_name, &workspace.output_file);
            run_mux(settings, &args, &task.display_name).await
        }
        None => copy_verbatim(input, &workspace.output_file).await,
    }
}

async fn copy_verbatim(input: &Path, output: &Path) -> Result<(), ConvertError> {
    tokio::fs::copy(input, output)
        .await
        .map(|_| ())
        .map_err(|e| ConvertError::io(format!("failed to copy {}", input.display()), e))
}

/// Several files, or a single non-M4B file: concatenate with chapters
async fn convert_multiple(
    settings: &Settings,
    prober: &mut DurationProber,
    task: &BookTask,
    workspace: &BookWorkspace,
) -> Result<(), ConvertError> {
    let inputs = resolve_inputs(settings, prober, task, workspace).await;

    let manifest = workspace.scratch_path(MANIFEST_FILE);
    tokio::fs::write(&manifest, concat_manifest(&inputs))
        .await
        .map_err(|e| ConvertError::io("failed to write concat list", e))?;

    let plan = build_chapters(prober, &inputs).await;
    let chapters = workspace.scratch_path(CHAPTERS_FILE);
    tokio::fs::write(&chapters, plan.to_ffmetadata())
        .await
        .map_err(|e| ConvertError::io("failed to write chapter metadata", e))?;
    log::debug!(
        "{}: {} chapters, {} ms",
        task.display_name,
        plan.chapters.len(),
        plan.total_duration_ms
    );

    let args = concat_mux_args(&ConcatMux {
        manifest: &manifest,
        chapters: &chapters,
        cover: task.cover_image.as_deref(),
        codec: codec_for(settings, task),
        title: &task.display_name,
        output: &workspace.output_file,
    });
    run_mux(settings, &args, &task.display_name).await
}

/// MP3 sources are transcoded to AAC; AAC-family sources are copied
fn codec_for(settings: &Settings, task: &BookTask) -> AudioCodec {
    match task.audio_files.first().map(|p| AudioContainer::of(p)) {
        Some(AudioContainer::Mp3) => AudioCodec::Aac(settings.aac_bitrate_kbps),
        _ => AudioCodec::Copy,
    }
}

/// Swap unprobeable M4A inputs for AAC re-encodes where possible
///
/// A file whose re-encode also fails is kept as-is; its chapter is dropped.
async fn resolve_inputs(
    settings: &Settings,
    prober: &mut DurationProber,
    task: &BookTask,
    workspace: &BookWorkspace,
) -> Vec<PathBuf> {
    let mut inputs = Vec::with_capacity(task.audio_files.len());

    for file in &task.audio_files {
        if AudioContainer::of(file) != AudioContainer::M4a || prober.duration(file).await.is_some() {
            inputs.push(file.clone());
            continue;
        }

        let Some(file_name) = file.file_name() else {
            inputs.push(file.clone());
            continue;
        };
        let reencoded = workspace.scratch_path(REENCODE_DIR).join(file_name);

        if reencode(settings, file, &reencoded, &task.display_name).await {
            inputs.push(reencoded);
        } else {
            inputs.push(file.clone());
        }
    }

    inputs
}

async fn reencode(settings: &Settings, input: &Path, output: &Path, title: &str) -> bool {
    let file_name = input
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    log::info!("  [Re-encode] Re-encoding {} for {}", file_name, title);

    if let Some(parent) = output.parent()
        && let Err(e) = tokio::fs::create_dir_all(parent).await
    {
        log::error!("  [Re-encode Error] Failed to create {}: {}", parent.display(), e);
        return false;
    }

    let args = reencode_args(input, output, settings.aac_bitrate_kbps);
    match run_tool(&settings.ffmpeg_path, &args, settings.tool_timeout).await {
        Ok(_) => {
            log::info!("  [Re-encode] Successfully re-encoded {}", file_name);
            true
        }
        Err(e) if e.is_not_found() => {
            log::error!("  [Critical Error] {}", e);
            false
        }
        Err(e) => {
            log::error!(
                "  [Re-encode Error] Failed to re-encode {} for {}\n    => Details: {}",
                file_name,
                title,
                e
            );
            false
        }
    }
}

/// Run the final mux, logging enough to diagnose a failure without re-running
async fn run_mux(settings: &Settings, args: &[OsString], title: &str) -> Result<(), ConvertError> {
    match run_tool(&settings.ffmpeg_path, args, settings.tool_timeout).await {
        Ok(_) => Ok(()),
        Err(e) => {
            match &e {
                ToolError::NotFound { .. } => log::error!("  [Critical Error] {}", e),
                ToolError::Failed { stderr_tail, .. } => log::error!(
                    "  [FFmpeg Error] Failed on book: {}\n    => Command: {}\n    => Details: {}",
                    title,
                    format_command(&settings.ffmpeg_path, args),
                    stderr_tail
                ),
                _ => log::error!(
                    "  [FFmpeg Error] Failed on book: {}\n    => Command: {}\n    => Details: {}",
                    title,
                    format_command(&settings.ffmpeg_path, args),
                    e
                ),
            }
            Err(ConvertError::Mux {
                title: title.to_string(),
                source: e,
            })
        }
    }
}

/// Concat demuxer list: one `file '<path>'` line per input
///
/// Backslashes become forward slashes and single quotes are escaped as
/// `'\''` so any path survives the demuxer's quoting.
pub fn concat_manifest(files: &[PathBuf]) -> String {
    let mut out = String::new();
    for file in files {
        let absolute = std::path::absolute(file).unwrap_or_else(|_| file.clone());
        let safe = absolute
            .to_string_lossy()
            .replace('\\', "/")
            .replace('\'', "'\\''");
        out.push_str("file '");
        out.push_str(&safe);
        out.push_str("'\n");
    }
    out
}
