//! Book conversion
//!
//! Turns classified books into M4B files using ffmpeg: output directory
//! setup, per-book conversion and the parallel batch runner.

mod ffmpeg;
mod orchestrator;
mod output_manager;
mod parallel;

pub use ffmpeg::{duration_probe_args, run_tool, video_stream_probe_args};
pub use output_manager::prepare_output_dir;
pub use parallel::{run_batch, BatchReport};
