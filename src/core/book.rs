//! Book identity: tasks, author/title extraction, output naming

use std::path::PathBuf;

/// Separator between author and title in a book directory name
const NAME_SEPARATOR: &str = " - ";

/// Author used when a directory name has no separator
pub const UNKNOWN_AUTHOR: &str = "UnknownAuthor";

/// Title component used when the title strips to nothing
const UNTITLED: &str = "Untitled";

/// One book to convert, created by the classifier
///
/// Never mutated after classification; the orchestrator consumes it once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookTask {
    pub source_dir: PathBuf,
    /// Directory name of the book (e.g. "Jane Doe - The Great Novel")
    pub display_name: String,
    /// Audio files in playback order, never empty
    pub audio_files: Vec<PathBuf>,
    pub cover_image: Option<PathBuf>,
    pub is_problematic: bool,
}

impl BookTask {
    pub fn details(&self) -> BookDetails {
        BookDetails::from_display_name(&self.display_name)
    }

    /// `<AlnumTitle>By<AlnumAuthor>.m4b`
    pub fn output_file_name(&self) -> String {
        self.details().output_file_name()
    }

    /// True when the book is a single file already in an M4B container
    pub fn is_single_m4b(&self) -> bool {
        match self.audio_files.as_slice() {
            [only] => only
                .extension()
                .is_some_and(|e| e.eq_ignore_ascii_case("m4b")),
            _ => false,
        }
    }
}

/// Author and title derived from a directory name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookDetails {
    pub author: String,
    pub title: String,
}

impl BookDetails {
    /// Split "Author - Title" and strip common noise from the title
    ///
    /// Removes "by {author}", "- mp3", "mp3" and a trailing "audiobook".
    /// Names without a separator become the title of an unknown author.
    pub fn from_display_name(display_name: &str) -> Self {
        let parts: Vec<&str> = display_name.split(NAME_SEPARATOR).map(str::trim).collect();

        if parts.len() < 2 {
            return Self {
                author: UNKNOWN_AUTHOR.to_string(),
                title: display_name.to_string(),
            };
        }

        let author = parts[0].to_string();
        let mut title = parts[1..].join(NAME_SEPARATOR);

        title = title.replace(&format!("by {}", author), "").trim().to_string();
        title = title.replace("- mp3", "").trim().to_string();
        title = title.replace("mp3", "").trim().to_string();
        title = strip_audiobook_suffix(&title).to_string();

        Self { author, title }
    }

    /// Output file name built from the alphanumeric characters of title and author
    pub fn output_file_name(&self) -> String {
        let mut title = alphanumeric_only(&self.title);
        let author = alphanumeric_only(&self.author);

        if title.is_empty() {
            title = UNTITLED.to_string();
        }

        format!("{}By{}.m4b", title, author)
    }
}

fn alphanumeric_only(s: &str) -> String {
    s.chars().filter(|c| c.is_alphanumeric()).collect()
}

fn strip_audiobook_suffix(title: &str) -> &str {
    const SUFFIX: &str = "audiobook";
    let cut = title.len().saturating_sub(SUFFIX.len());
    match title.get(cut..) {
        Some(tail) if title.len() >= SUFFIX.len() && tail.eq_ignore_ascii_case(SUFFIX) => {
            title[..cut].trim()
        }
        _ => title,
    }
}
