pub mod config;
pub mod dispatcher;
pub mod downloader;
pub mod error;
pub mod hashing;
pub mod ledger;
pub mod logging;
pub mod progress;
pub mod state;
pub mod utils;

pub use dispatcher::{DispatchOptions, Dispatcher, DownloadSpec, RunSummary};
pub use downloader::{Downloader, TransferReport};
pub use ledger::Ledger;
pub use progress::ProgressTable;
