//! Completion ledger: the set of URLs whose files are fully downloaded.
//!
//! Persisted as a newline-delimited list of URLs, one per line, only ever
//! appended to. A URL present here is never fetched again.

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};

use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::LedgerError;

pub struct Ledger {
    path: PathBuf,
    done: Mutex<HashSet<String>>,
}

impl Ledger {
    /// Loads the ledger stored at `path`. A missing file is an empty ledger.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let path = path.as_ref().to_path_buf();
        let done = match fs::read_to_string(&path).await {
            Ok(content) => parse(&content),
            Err(err) if err.kind() == io::ErrorKind::NotFound => HashSet::new(),
            Err(source) => return Err(LedgerError::StorageUnavailable { path, source }),
        };
        tracing::debug!("loaded {} completed URLs from {}", done.len(), path.display());

        Ok(Self {
            path,
            done: Mutex::new(done),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn is_done(&self, url: &str) -> bool {
        self.done.lock().await.contains(url)
    }

    /// Treats `urls` as done for this process without writing them out.
    pub async fn assume_done<I, S>(&self, urls: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut done = self.done.lock().await;
        done.extend(urls.into_iter().map(Into::into));
    }

    /// Durably records `url` as complete. Returns once the line is synced.
    pub async fn mark_done(&self, url: &str) -> Result<(), LedgerError> {
        if url.contains(['\n', '\r']) {
            return Err(LedgerError::InvalidEntry(url.to_string()));
        }

        // Held across the append so concurrent callers never interleave lines.
        let mut done = self.done.lock().await;
        if done.contains(url) {
            return Ok(());
        }

        self.append(url)
            .await
            .map_err(|source| LedgerError::Write {
                path: self.path.clone(),
                source,
            })?;
        done.insert(url.to_string());
        Ok(())
    }

    async fn append(&self, url: &str) -> io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(format!("{url}\n").as_bytes()).await?;
        file.flush().await?;
        file.sync_data().await
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.done.lock().await.len()
    }

    #[cfg(test)]
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn parse(content: &str) -> HashSet<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}
