use std::path::PathBuf;

use indicatif::HumanBytes;

/// Expected size of a transfer. Servers are not obliged to tell us.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TotalSize {
    Known(u64),
    Unknown,
}

/// Book-keeping of one in-flight transfer, owned by its task.
#[derive(Debug, Clone)]
pub struct TransferState {
    pub path: PathBuf,
    pub file_name: String,
    pub existing_bytes: u64,
    pub total: TotalSize,
    pub transferred: u64,
    pub slot: usize,
}

impl TransferState {
    pub fn new(path: PathBuf, file_name: String, existing_bytes: u64, slot: usize) -> Self {
        Self {
            path,
            file_name,
            existing_bytes,
            total: TotalSize::Unknown,
            transferred: existing_bytes,
            slot,
        }
    }

    /// Percentage of the file on disk, when the total is known.
    pub fn percent(&self) -> Option<f64> {
        match self.total {
            TotalSize::Known(0) => Some(100.0),
            TotalSize::Known(total) => Some(self.transferred as f64 / total as f64 * 100.0),
            TotalSize::Unknown => None,
        }
    }

    pub fn status_line(&self) -> String {
        match self.percent() {
            Some(pct) => format!(
                "Downloading ({})... {:.2}% complete",
                self.file_name, pct
            ),
            None => format!(
                "Downloading ({})... {} so far",
                self.file_name,
                HumanBytes(self.transferred)
            ),
        }
    }
}

/// Where a URL ended up after a dispatcher run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlOutcome {
    Skipped,
    Completed,
    Failed,
}
