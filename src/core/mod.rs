//! Core application logic and state
//!
//! This module contains:
//! - Run settings (defaults, settings file, command line)
//! - Book identity and output naming
//! - Library scanning and book classification
//! - The metadata report

mod book;
mod report;
mod scanning;
mod state;

pub use book::{BookDetails, BookTask};
pub use report::MetadataReportRecord;
pub use scanning::classify;
pub use state::{Settings, SettingsFile};
