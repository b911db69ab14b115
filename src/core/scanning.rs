//! Library scanning and book classification
//!
//! The input root holds one subdirectory per book. Each book directory is
//! scanned for audio and image files, every audio file is probed, and the
//! book lands in the "normal" or "problematic" set depending on whether all
//! probes succeeded. One report record is written per book.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

use crate::audio::DurationProber;
use crate::core::report::write_report;
use crate::core::{BookDetails, BookTask, MetadataReportRecord, Settings};
use crate::cover_art::CoverArtClient;
use crate::error::ScanError;

/// Result of scanning the input root
#[derive(Debug, Default)]
pub struct Classification {
    /// Books whose files all probed cleanly, in scan order
    pub normal: Vec<BookTask>,
    /// Books with at least one failed probe, in scan order
    pub problematic: Vec<BookTask>,
    /// One record per classified book, in scan order
    pub records: Vec<MetadataReportRecord>,
}

/// Assets found in one book directory
#[derive(Debug, Default, PartialEq, Eq)]
pub struct BookAssets {
    pub audio_files: Vec<PathBuf>,
    /// First image in name order
    pub image_file: Option<PathBuf>,
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.'))
}

/// Immediate, non-hidden entries of `dir` in name order
fn sorted_children(dir: &Path) -> impl Iterator<Item = walkdir::Result<walkdir::DirEntry>> {
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_hidden(e.path()))
}

/// Collect the audio files and first image of one book directory
///
/// Failing to list the directory itself fails the book. A bad entry inside
/// it (a dangling symlink, say) is logged and skipped.
pub fn scan_book_dir(settings: &Settings, dir: &Path) -> Result<BookAssets, ScanError> {
    let mut assets = BookAssets::default();

    for entry in sorted_children(dir) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(source) if source.depth() == 0 || source.path() == Some(dir) => {
                return Err(ScanError::ReadDir {
                    path: dir.to_path_buf(),
                    source,
                });
            }
            Err(e) => {
                log::warn!("  [Warning] Skipping unreadable entry in {}: {}", dir.display(), e);
                continue;
            }
        };
        let path = entry.path();
        if !entry.file_type().is_file() {
            continue;
        }

        if settings.is_audio_file(path) {
            assets.audio_files.push(path.to_path_buf());
        } else if settings.is_image_file(path) && assets.image_file.is_none() {
            assets.image_file = Some(path.to_path_buf());
        }
    }

    Ok(assets)
}

/// Book directories under the root, skipping the output directory
///
/// Unreadable entries are logged and skipped.
pub fn find_book_dirs(settings: &Settings) -> Result<Vec<PathBuf>, ScanError> {
    if !settings.root_dir.is_dir() {
        return Err(ScanError::NotADirectory(settings.root_dir.clone()));
    }

    let mut dirs = Vec::new();
    for entry in sorted_children(&settings.root_dir) {
        match entry {
            Ok(entry) => {
                if !entry.file_type().is_dir() {
                    continue;
                }
                if entry.file_name().to_string_lossy() == settings.output_dir_name {
                    continue;
                }
                dirs.push(entry.into_path());
            }
            Err(e) => log::error!("  [Error] Skipping unreadable entry in root: {}", e),
        }
    }
    Ok(dirs)
}

/// Scan the root, probe every audio file, write the report, and split the books
///
/// `covers` is used for books without a local image; pass `None` to skip
/// downloads entirely.
pub async fn classify(
    settings: Arc<Settings>,
    covers: Option<&CoverArtClient>,
) -> Result<Classification, ScanError> {
    let dirs = find_book_dirs(&settings)?;
    classify_dirs(settings, dirs, covers).await
}

async fn classify_dirs(
    settings: Arc<Settings>,
    dirs: Vec<PathBuf>,
    covers: Option<&CoverArtClient>,
) -> Result<Classification, ScanError> {
    let mut prober = DurationProber::new(settings.clone());
    let mut result = Classification::default();

    for dir in dirs {
        let display_name = dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        let assets = match scan_book_dir(&settings, &dir) {
            Ok(assets) => assets,
            Err(e) => {
                log::error!("  [Error] Skipping {}: {}", display_name, e);
                continue;
            }
        };

        if assets.audio_files.is_empty() {
            log::debug!("No audio files in {}, skipping", display_name);
            continue;
        }

        let mut is_problematic = false;
        for audio in &assets.audio_files {
            if prober.duration(audio).await.is_none() {
                is_problematic = true;
            }
        }

        let cleaned_title = BookDetails::from_display_name(&display_name).title;

        let cover_image = match (assets.image_file, covers) {
            (Some(image), _) => Some(image),
            (None, Some(client)) => {
                let dest = settings.covers_dir().join(format!("{}.jpg", display_name));
                client.fetch_cover(&cleaned_title, &dest).await
            }
            (None, None) => None,
        };

        result.records.push(MetadataReportRecord {
            book_title: display_name.clone(),
            cleaned_title,
            audio_file_count: assets.audio_files.len(),
            cover_art_found: cover_image.is_some(),
            is_problematic,
        });

        let task = BookTask {
            source_dir: dir,
            display_name,
            audio_files: assets.audio_files,
            cover_image,
            is_problematic,
        };

        if is_problematic {
            result.problematic.push(task);
        } else {
            result.normal.push(task);
        }
    }

    write_report(&settings.report_path(), &result.records)?;
    Ok(result)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::core::report::read_report;
    use crate::test_fixtures::Fixture;

    #[test]
    fn test_scan_book_dir_partitions_assets() {
        let fixture = Fixture::new();
        fixture.audio_file("Book", "02.MP3", "10");
        fixture.audio_file("Book", "01.m4a", "10");
        fixture.file("Book", "b_cover.png", "png");
        fixture.file("Book", "a_cover.jpg", "jpg");
        fixture.file("Book", "notes.txt", "text");
        fixture.file("Book", ".hidden.mp3", "10");

        let settings = fixture.settings_value();
        let assets = scan_book_dir(&settings, &fixture.root.join("Book")).unwrap();

        let names: Vec<String> = assets
            .audio_files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["01.m4a", "02.MP3"]);
        assert_eq!(
            assets.image_file,
            Some(fixture.root.join("Book").join("a_cover.jpg"))
        );
    }

    #[test]
    fn test_find_book_dirs_skips_output_and_files() {
        let fixture = Fixture::new();
        fixture.book_dir("B Book");
        fixture.book_dir("A Book");
        fixture.book_dir("normalized_audiobooks");
        std::fs::write(fixture.root.join("stray.mp3"), "1").unwrap();

        let settings = fixture.settings_value();
        let dirs = find_book_dirs(&settings).unwrap();
        assert_eq!(
            dirs,
            vec![fixture.root.join("A Book"), fixture.root.join("B Book")]
        );
    }

    #[test]
    fn test_find_book_dirs_missing_root() {
        let settings = crate::core::Settings::new("/nonexistent/audiobooks");
        assert!(matches!(
            find_book_dirs(&settings),
            Err(ScanError::NotADirectory(_))
        ));
    }

    #[tokio::test]
    async fn test_classify_splits_normal_and_problematic() {
        let fixture = Fixture::new();
        fixture.audio_file("Jane Doe - Good Book", "01.mp3", "60");
        fixture.audio_file("Jane Doe - Good Book", "02.mp3", "30");
        fixture.file("Jane Doe - Good Book", "cover.jpg", "img");
        fixture.audio_file("John Roe - Bad Book - mp3", "01.mp3", "60");
        fixture.audio_file("John Roe - Bad Book - mp3", "02.m4a", "broken");
        fixture.file("Empty Book", "readme.txt", "nothing here");

        let settings = fixture.settings();
        let result = classify(settings.clone(), None).await.unwrap();

        assert_eq!(result.normal.len(), 1);
        assert_eq!(result.problematic.len(), 1);
        assert_eq!(result.normal[0].display_name, "Jane Doe - Good Book");
        assert!(result.normal[0].cover_image.is_some());
        assert!(!result.normal[0].is_problematic);
        assert!(result.problematic[0].is_problematic);
        assert_eq!(result.problematic[0].audio_files.len(), 2);

        let records = read_report(&settings.report_path()).unwrap();
        assert_eq!(records, result.records);
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].cleaned_title, "Bad Book");
        assert!(records[1].is_problematic);
        assert!(!records[1].cover_art_found);
        assert_eq!(records[0].audio_file_count, 2);
    }

    #[tokio::test]
    async fn test_classify_is_deterministic_and_leaves_source_untouched() {
        let fixture = Fixture::new();
        fixture.audio_file("A - One", "01.mp3", "1");
        fixture.audio_file("B - Two", "01.m4b", "broken");
        fixture.audio_file("C - Three", "x.mp3", "2");

        let listing = |root: &Path| -> Vec<PathBuf> {
            WalkDir::new(root)
                .sort_by_file_name()
                .into_iter()
                .map(|e| e.unwrap().into_path())
                .collect()
        };
        let before = listing(&fixture.root);

        let settings = fixture.settings();
        classify(settings.clone(), None).await.unwrap();
        let first = std::fs::read(settings.report_path()).unwrap();
        classify(settings.clone(), None).await.unwrap();
        let second = std::fs::read(settings.report_path()).unwrap();

        assert_eq!(first, second);
        assert_eq!(listing(&fixture.root), before);
    }

    #[tokio::test]
    async fn test_output_dir_inside_root_is_skipped() {
        let fixture = Fixture::new();
        fixture.audio_file("A - One", "01.mp3", "1");
        let output_inside = fixture.book_dir("normalized_audiobooks");
        std::fs::write(output_inside.join("old.mp3"), "1").unwrap();

        let mut settings = fixture.settings_value().with_output_dir(&output_inside);
        settings.download_covers = false;
        let result = classify(Arc::new(settings), None).await.unwrap();

        assert_eq!(result.normal.len(), 1);
        assert_eq!(result.records.len(), 1);
    }

    #[tokio::test]
    async fn test_unlistable_book_dir_is_skipped() {
        let fixture = Fixture::new();
        fixture.audio_file("A - Readable", "01.mp3", "1");
        let vanished = fixture.root.join("B - Vanished");

        let dirs = vec![fixture.root.join("A - Readable"), vanished.clone()];
        let settings = fixture.settings();
        assert!(matches!(
            scan_book_dir(&settings, &vanished),
            Err(ScanError::ReadDir { .. })
        ));

        let result = classify_dirs(settings.clone(), dirs, None).await.unwrap();

        assert_eq!(result.normal.len(), 1);
        assert_eq!(result.normal[0].display_name, "A - Readable");
        assert!(result.problematic.is_empty());
        assert_eq!(read_report(&settings.report_path()).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_dangling_symlink_does_not_drop_book() {
        let fixture = Fixture::new();
        fixture.audio_file("A - Good", "01.mp3", "10");
        fixture.audio_file("A - Good", "02.mp3", "20");
        std::os::unix::fs::symlink(
            "/nonexistent/notes.txt",
            fixture.root.join("A - Good").join("notes.txt"),
        )
        .unwrap();

        let result = classify(fixture.settings(), None).await.unwrap();

        assert_eq!(result.normal.len(), 1);
        assert_eq!(result.normal[0].audio_files.len(), 2);
        assert_eq!(result.records.len(), 1);
    }

    #[tokio::test]
    async fn test_report_write_failure_is_returned() {
        let fixture = Fixture::new();
        fixture.audio_file("A - One", "01.mp3", "1");
        let settings = fixture
            .settings_value()
            .with_output_dir(fixture.temp.path().join("missing_output"));

        let result = classify(Arc::new(settings), None).await;
        assert!(matches!(result, Err(ScanError::Report { .. })));
    }
}
