//! Runs every pending URL of a [`DownloadSpec`] under a parallelism limit.

use std::collections::{BTreeMap, HashSet};
use std::num::NonZeroUsize;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use futures::FutureExt;
use tokio::fs;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::downloader::{Downloader, TransferReport};
use crate::error::TransferError;
use crate::ledger::Ledger;
use crate::progress::ProgressTable;
use crate::state::UrlOutcome;
use crate::utils::file_name_from_url;

/// Folder name to the URLs to download into it.
pub type DownloadSpec = BTreeMap<String, Vec<String>>;

#[derive(Debug, Clone)]
pub struct DispatchOptions {
    pub parallelism: NonZeroUsize,
    /// Deadline for one transfer; `None` lets a transfer run forever.
    pub transfer_timeout: Option<Duration>,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            parallelism: NonZeroUsize::new(10).unwrap_or(NonZeroUsize::MIN),
            transfer_timeout: None,
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub completed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub folder_errors: usize,
    pub ledger_errors: usize,
    pub bytes_downloaded: u64,
}

impl RunSummary {
    fn record(&mut self, outcome: UrlOutcome) {
        match outcome {
            UrlOutcome::Skipped => self.skipped += 1,
            UrlOutcome::Completed => self.completed += 1,
            UrlOutcome::Failed => self.failed += 1,
        }
    }
}

struct Finished {
    outcome: UrlOutcome,
    bytes: u64,
    ledger_error: bool,
}

pub struct Dispatcher {
    downloader: Downloader,
    ledger: Arc<Ledger>,
    options: DispatchOptions,
    cancel: CancellationToken,
}

impl Dispatcher {
    pub fn new(
        client: reqwest::Client,
        ledger: Arc<Ledger>,
        progress: Arc<ProgressTable>,
        options: DispatchOptions,
    ) -> Self {
        Self {
            downloader: Downloader::new(client, progress),
            ledger,
            options,
            cancel: CancellationToken::new(),
        }
    }

    /// Token that stops submission and aborts in-flight transfers when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Downloads every URL of `spec` not yet in the ledger into
    /// `base_dir/<folder>/`, returning once all started transfers are over.
    ///
    /// Failures of single URLs or folders are logged and counted, never returned.
    pub async fn run(&self, spec: &DownloadSpec, base_dir: &Path) -> Result<RunSummary> {
        let semaphore = Arc::new(Semaphore::new(self.options.parallelism.get()));
        let mut tasks = JoinSet::new();
        let mut summary = RunSummary::default();
        let mut next_slot = 0usize;
        // One download per URL and one URL per destination file within a run
        let mut submitted: HashSet<&str> = HashSet::new();
        let mut claimed: HashSet<PathBuf> = HashSet::new();

        'folders: for (folder, urls) in spec {
            let folder_path = base_dir.join(folder);
            if let Err(err) = fs::create_dir_all(&folder_path).await {
                tracing::error!(
                    "failed to create directory {}: {}, skipping {} URLs",
                    folder_path.display(),
                    err,
                    urls.len()
                );
                summary.folder_errors += 1;
                continue;
            }

            for url in urls {
                if self.ledger.is_done(url).await {
                    tracing::info!(url = url.as_str(), "already downloaded, skipping");
                    summary.record(UrlOutcome::Skipped);
                    continue;
                }
                if !submitted.insert(url.as_str()) {
                    tracing::info!(url = url.as_str(), "listed more than once, skipping repeat");
                    summary.record(UrlOutcome::Skipped);
                    continue;
                }
                let dest = folder_path.join(file_name_from_url(url));
                if !claimed.insert(dest.clone()) {
                    tracing::error!(
                        url = url.as_str(),
                        "{} is already the target of another URL in this run, not downloading",
                        dest.display()
                    );
                    summary.record(UrlOutcome::Failed);
                    continue;
                }

                let permit = tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => break 'folders,
                    permit = Arc::clone(&semaphore).acquire_owned() => permit?,
                };

                let slot = next_slot;
                next_slot += 1;

                let job = Job {
                    downloader: self.downloader.clone(),
                    ledger: Arc::clone(&self.ledger),
                    cancel: self.cancel.clone(),
                    timeout: self.options.transfer_timeout,
                    url: url.clone(),
                    folder: folder_path.clone(),
                    slot,
                };
                tasks.spawn(async move {
                    let finished = job.run_guarded().await;
                    drop(permit);
                    finished
                });
            }
        }

        if self.cancel.is_cancelled() {
            tracing::warn!("cancelled, no further downloads will be started");
        }

        while let Some(joined) = tasks.join_next().await {
            let finished = match joined {
                Ok(finished) => finished,
                Err(err) => {
                    tracing::error!("download task did not finish: {}", err);
                    summary.record(UrlOutcome::Failed);
                    continue;
                }
            };
            summary.record(finished.outcome);
            summary.bytes_downloaded += finished.bytes;
            if finished.ledger_error {
                summary.ledger_errors += 1;
            }
        }

        tracing::info!(
            completed = summary.completed,
            skipped = summary.skipped,
            failed = summary.failed,
            folder_errors = summary.folder_errors,
            "all downloads finished"
        );
        Ok(summary)
    }
}

/// One URL's trip from in-flight to completed or failed.
struct Job {
    downloader: Downloader,
    ledger: Arc<Ledger>,
    cancel: CancellationToken,
    timeout: Option<Duration>,
    url: String,
    folder: PathBuf,
    slot: usize,
}

impl Job {
    /// Like [`Job::run`], but a panic inside the transfer only fails this URL.
    async fn run_guarded(self) -> Finished {
        let url = self.url.clone();
        let slot = self.slot;
        let downloader = self.downloader.clone();

        match AssertUnwindSafe(self.run()).catch_unwind().await {
            Ok(finished) => finished,
            Err(panic) => {
                let reason = panic_message(panic.as_ref());
                tracing::error!(url = url.as_str(), "download task panicked: {}", reason);
                downloader
                    .progress()
                    .report(slot, format!("Failed ({}): {}", url, reason));
                Finished {
                    outcome: UrlOutcome::Failed,
                    bytes: 0,
                    ledger_error: false,
                }
            }
        }
    }

    async fn run(self) -> Finished {
        match self.transfer().await {
            Ok(report) => {
                self.downloader.progress().report(
                    self.slot,
                    format!("Completed ({})", display_name(&report.path)),
                );
                let ledger_error = match self.ledger.mark_done(&self.url).await {
                    Ok(()) => false,
                    Err(err) => {
                        tracing::error!(url = self.url.as_str(), "{:#}", anyhow::Error::from(err));
                        true
                    }
                };
                Finished {
                    outcome: UrlOutcome::Completed,
                    bytes: report.bytes_written,
                    ledger_error,
                }
            }
            Err(err) => {
                let err = anyhow::Error::from(err);
                tracing::error!(url = self.url.as_str(), "failed to download: {:#}", err);
                self.downloader
                    .progress()
                    .report(self.slot, format!("Failed ({}): {:#}", self.url, err));
                Finished {
                    outcome: UrlOutcome::Failed,
                    bytes: 0,
                    ledger_error: false,
                }
            }
        }
    }

    async fn transfer(&self) -> Result<TransferReport, TransferError> {
        let fetch = self.downloader.fetch(&self.url, &self.folder, self.slot);
        let bounded = async {
            match self.timeout {
                Some(limit) => tokio::time::timeout(limit, fetch)
                    .await
                    .unwrap_or(Err(TransferError::TimedOut(limit))),
                None => fetch.await,
            }
        };
        tokio::select! {
            res = bounded => res,
            _ = self.cancel.cancelled() => Err(TransferError::Cancelled),
        }
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
