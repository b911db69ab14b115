//! Parallel book conversion using tokio
//!
//! Converts a batch of books concurrently using a worker pool sized from
//! the CPU count, the batch size and the configured limit. Every book runs
//! in its own spawned task, so a panic inside one conversion is reported
//! for that book only.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use futures::future::FutureExt;
use futures::stream::{FuturesUnordered, StreamExt};
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinError;

use super::orchestrator::convert_book;
use crate::core::{BookTask, Settings};
use crate::error::ConvertError;

/// Number of parallel workers for a batch of `task_count` books
fn calculate_worker_count(task_count: usize, max_workers: Option<usize>) -> usize {
    let available = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4);

    available
        .min(task_count)
        .min(max_workers.unwrap_or(usize::MAX))
        .max(1)
}

/// Why a book produced no output
#[derive(Error, Debug)]
pub enum BookFailure {
    #[error(transparent)]
    Convert(#[from] ConvertError),

    #[error("conversion task panicked: {0}")]
    Panicked(String),
}

/// Result of converting one book
#[derive(Debug)]
pub struct BookOutcome {
    pub display_name: String,
    pub result: Result<PathBuf, BookFailure>,
}

/// Outcomes of one batch, in task order
#[derive(Debug, Default)]
pub struct BatchReport {
    pub outcomes: Vec<BookOutcome>,
}

impl BatchReport {
    pub fn converted(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.converted()
    }
}

/// Convert every task, isolating failures per book
pub async fn run_batch(settings: Arc<Settings>, tasks: Vec<BookTask>) -> BatchReport {
    run_batch_with(settings, tasks, |settings, task| async move {
        convert_book(settings, &task).await
    })
    .await
}

/// [`run_batch`] with the per-book conversion supplied by the caller
pub async fn run_batch_with<F, Fut>(
    settings: Arc<Settings>,
    tasks: Vec<BookTask>,
    convert: F,
) -> BatchReport
where
    F: Fn(Arc<Settings>, BookTask) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<PathBuf, ConvertError>> + Send + 'static,
{
    if tasks.is_empty() {
        return BatchReport::default();
    }

    let worker_count = calculate_worker_count(tasks.len(), settings.max_workers);
    let semaphore = Arc::new(Semaphore::new(worker_count));
    let convert = Arc::new(convert);

    log::info!(
        "Starting parallel conversion: {} books with {} workers",
        tasks.len(),
        worker_count
    );

    let mut slots: Vec<Option<BookOutcome>> = tasks.iter().map(|_| None).collect();
    let mut futures = FuturesUnordered::new();

    for (index, task) in tasks.into_iter().enumerate() {
        let display_name = task.display_name.clone();
        let semaphore = semaphore.clone();
        let settings = settings.clone();
        let convert = convert.clone();

        let handle = tokio::spawn(async move {
            // The semaphore is never closed, so this only waits
            let _permit = semaphore.acquire_owned().await.ok();
            let name = task.display_name.clone();
            log::info!("[Processing] Starting: {}", name);
            let started = Instant::now();

            let result = convert(settings, task).await;

            let elapsed = started.elapsed().as_secs_f64();
            match &result {
                Ok(output) => log::info!(
                    "[Finished] Book: {} | Time: {:.2}s | Output: {}",
                    name,
                    elapsed,
                    output
                        .file_name()
                        .map(|n| n.to_string_lossy().to_string())
                        .unwrap_or_default()
                ),
                Err(e) => log::error!("[Failed] Book: {} | Time: {:.2}s | {}", name, elapsed, e),
            }
            result
        });

        futures.push(handle.map(move |joined| (index, display_name, joined)));
    }

    while let Some((index, display_name, joined)) = futures.next().await {
        let result = match joined {
            Ok(result) => result.map_err(BookFailure::from),
            Err(e) => {
                let message = panic_message(e);
                log::error!("[Failed] Book: {} | {}", display_name, message);
                Err(BookFailure::Panicked(message))
            }
        };
        slots[index] = Some(BookOutcome {
            display_name,
            result,
        });
    }

    let outcomes: Vec<BookOutcome> = slots.into_iter().flatten().collect();
    let report = BatchReport { outcomes };
    log::info!(
        "Batch complete: {} converted, {} failed",
        report.converted(),
        report.failed()
    );
    report
}

fn panic_message(err: JoinError) -> String {
    if err.is_cancelled() {
        return "task was cancelled".to_string();
    }
    let payload = err.into_panic();
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(name: &str) -> BookTask {
        BookTask {
            source_dir: PathBuf::from("/lib/audiobooks").join(name),
            display_name: name.to_string(),
            audio_files: vec![PathBuf::from("/lib/audiobooks").join(name).join("01.mp3")],
            cover_image: None,
            is_problematic: false,
        }
    }

    #[test]
    fn test_calculate_worker_count() {
        assert_eq!(calculate_worker_count(1, None), 1);
        assert_eq!(calculate_worker_count(0, None), 1);
        assert_eq!(calculate_worker_count(100, Some(2)), 2);

        let count = calculate_worker_count(100, None);
        assert!(count >= 1 && count <= 100);
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let settings = Arc::new(Settings::new("/lib/audiobooks"));
        let report = run_batch(settings, vec![]).await;
        assert!(report.outcomes.is_empty());
        assert_eq!(report.converted(), 0);
        assert_eq!(report.failed(), 0);
    }

    #[tokio::test]
    async fn test_panicking_book_does_not_stop_siblings() {
        let settings = Arc::new(Settings::new("/lib/audiobooks"));
        let tasks = vec![task("A"), task("Boom"), task("C"), task("D")];

        let report = run_batch_with(settings, tasks, |_settings, task| async move {
            if task.display_name == "Boom" {
                panic!("orchestrator defect");
            }
            Ok(PathBuf::from(format!("/out/{}.m4b", task.display_name)))
        })
        .await;

        assert_eq!(report.converted(), 3);
        assert_eq!(report.failed(), 1);

        let names: Vec<&str> = report
            .outcomes
            .iter()
            .map(|o| o.display_name.as_str())
            .collect();
        assert_eq!(names, vec!["A", "Boom", "C", "D"]);
        match &report.outcomes[1].result {
            Err(BookFailure::Panicked(message)) => assert_eq!(message, "orchestrator defect"),
            other => panic!("expected panic outcome, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_worker_limit_is_respected() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let mut settings = Settings::new("/lib/audiobooks");
        settings.max_workers = Some(2);
        let tasks: Vec<BookTask> = (0..6).map(|i| task(&format!("Book {}", i))).collect();

        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (r, p) = (running.clone(), peak.clone());

        let report = run_batch_with(Arc::new(settings), tasks, move |_settings, task| {
            let running = r.clone();
            let peak = p.clone();
            async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                running.fetch_sub(1, Ordering::SeqCst);
                Ok(PathBuf::from(task.display_name))
            }
        })
        .await;

        assert_eq!(report.converted(), 6);
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }
}
