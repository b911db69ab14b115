use std::path::Path;

/// Audio container, judged by file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioContainer {
    Mp3,
    M4a,
    M4b,
    Other,
}

impl AudioContainer {
    pub fn of(path: &Path) -> Self {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "mp3" => Self::Mp3,
            "m4a" => Self::M4a,
            "m4b" => Self::M4b,
            _ => Self::Other,
        }
    }
}
