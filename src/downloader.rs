//! Resumable single-URL transfers.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures::TryStreamExt;
use reqwest::header::{self, HeaderMap};
use reqwest::{Client, StatusCode};
use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::io::StreamReader;

use crate::error::{ErrContext, TransferError};
use crate::progress::ProgressTable;
use crate::state::{TotalSize, TransferState};
use crate::utils::file_name_from_url;

/// Upper bound of a single read from the response body.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Outcome of a finished transfer.
#[derive(Debug, Clone)]
pub struct TransferReport {
    pub path: PathBuf,
    pub resumed_from: u64,
    pub bytes_written: u64,
    pub total: TotalSize,
}

pub fn build_client() -> reqwest::Result<Client> {
    Client::builder()
        .user_agent(concat!("bulkdl/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(Duration::from_secs(10))
        .build()
}

#[derive(Clone)]
pub struct Downloader {
    client: Client,
    progress: Arc<ProgressTable>,
}

impl Downloader {
    pub fn new(client: Client, progress: Arc<ProgressTable>) -> Self {
        Self { client, progress }
    }

    pub fn progress(&self) -> &ProgressTable {
        &self.progress
    }

    /// Fetches `url` into `dest_folder`, continuing any partial file found there.
    ///
    /// On error the partial file is left exactly as written so that a later
    /// call resumes from it. Content written by earlier runs is trusted as is.
    pub async fn fetch(
        &self,
        url: &str,
        dest_folder: &Path,
        slot: usize,
    ) -> Result<TransferReport, TransferError> {
        let file_name = file_name_from_url(url);
        let path = dest_folder.join(&file_name);

        let existing_bytes = match fs::metadata(&path).await {
            Ok(meta) => meta.len(),
            Err(err) if err.kind() == io::ErrorKind::NotFound => 0,
            Err(err) => return Err(err).context(format!("failed to inspect {}", path.display())),
        };
        let mut state = TransferState::new(path, file_name, existing_bytes, slot);

        tracing::info!(url, path = %state.path.display(), existing_bytes, "starting download");

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&state.path)
            .await
            .context(format!("failed to open {}", state.path.display()))?;

        let mut request = self.client.get(url);
        if existing_bytes > 0 {
            request = request.header(header::RANGE, format!("bytes={}-", existing_bytes));
        }
        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::RANGE_NOT_SATISFIABLE && existing_bytes > 0 {
            // Nothing left past our offset: fine only if the file is already whole.
            if content_range_total(response.headers()) == Some(existing_bytes) {
                state.total = TotalSize::Known(existing_bytes);
                self.progress.report(slot, state.status_line());
                tracing::info!(url, "already complete on disk");
                return Ok(report(&state));
            }
            return Err(TransferError::UnexpectedStatus(status));
        }
        if !status.is_success() {
            return Err(TransferError::UnexpectedStatus(status));
        }

        if existing_bytes > 0 && status != StatusCode::PARTIAL_CONTENT {
            // Range ignored, the body starts at byte 0 again.
            tracing::warn!(url, "server ignored range request, restarting from scratch");
            file.set_len(0)
                .await
                .context(format!("failed to truncate {}", state.path.display()))?;
            state.existing_bytes = 0;
            state.transferred = 0;
        }

        state.total = total_size(response.headers(), state.existing_bytes > 0);
        if state.total == TotalSize::Unknown {
            tracing::debug!(url, "total size unknown, progress will show bytes only");
        }
        self.progress.report(slot, state.status_line());

        let streamed = self.stream_body(response, &mut file, &mut state, url).await;
        // Flush on failure too, so the partial file holds everything received.
        let flushed = file
            .flush()
            .await
            .context(format!("failed to flush {}", state.path.display()));
        drop(file);
        streamed?;
        flushed?;

        tracing::info!(url, bytes = state.transferred - state.existing_bytes, "completed download");
        Ok(report(&state))
    }

    async fn stream_body(
        &self,
        response: reqwest::Response,
        file: &mut fs::File,
        state: &mut TransferState,
        url: &str,
    ) -> Result<(), TransferError> {
        let body = response
            .bytes_stream()
            .map_err(|err| io::Error::new(io::ErrorKind::Other, err));
        let mut reader = StreamReader::new(body);
        let mut buf = vec![0u8; CHUNK_SIZE];

        loop {
            let n = reader
                .read(&mut buf)
                .await
                .context(format!("error while downloading {}", url))?;
            if n == 0 {
                return Ok(());
            }
            file.write_all(&buf[..n])
                .await
                .context(format!("error while writing {}", state.path.display()))?;
            state.transferred += n as u64;
            self.progress.report(state.slot, state.status_line());
        }
    }
}

fn report(state: &TransferState) -> TransferReport {
    TransferReport {
        path: state.path.clone(),
        resumed_from: state.existing_bytes,
        bytes_written: state.transferred - state.existing_bytes,
        total: state.total,
    }
}

/// Size of the whole resource, from `Content-Range` when present, otherwise
/// from `Content-Length` unless we asked for a range.
pub fn total_size(headers: &HeaderMap, resumed: bool) -> TotalSize {
    if headers.contains_key(header::CONTENT_RANGE) {
        return match content_range_total(headers) {
            Some(total) => TotalSize::Known(total),
            None => {
                tracing::warn!(
                    "failed to parse total size from Content-Range {:?}",
                    headers.get(header::CONTENT_RANGE)
                );
                TotalSize::Unknown
            }
        };
    }

    if resumed {
        return TotalSize::Unknown;
    }

    match headers.get(header::CONTENT_LENGTH) {
        None => TotalSize::Unknown,
        Some(value) => match value.to_str().ok().and_then(|v| v.trim().parse().ok()) {
            Some(total) => TotalSize::Known(total),
            None => {
                tracing::warn!("failed to parse total size from Content-Length {:?}", value);
                TotalSize::Unknown
            }
        },
    }
}

/// Total from `Content-Range: bytes <range>/<total>`; `None` if absent,
/// malformed or `*`.
fn content_range_total(headers: &HeaderMap) -> Option<u64> {
    let value = headers.get(header::CONTENT_RANGE)?.to_str().ok()?;
    let (unit, rest) = value.trim().split_once(' ')?;
    if !unit.eq_ignore_ascii_case("bytes") {
        return None;
    }
    let (_, total) = rest.rsplit_once('/')?;
    total.trim().parse().ok()
}
