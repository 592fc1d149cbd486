use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::dispatcher::{DispatchOptions, DownloadSpec};
use crate::error::ConfigError;

pub const DEFAULT_PARALLEL: usize = 10;
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
pub const DEFAULT_DOWNLOADS_DIR: &str = "downloads";
pub const DEFAULT_LEDGER_FILE: &str = "download_list.txt";

/// Contents of the YAML config file.
///
/// ```yaml
/// parallel: 4
/// download:
///   isos:
///     - https://example.com/debian.iso
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Folder name to URLs.
    pub download: DownloadSpec,
    pub parallel: Option<usize>,
    /// Base directory the folders are created in.
    #[serde(alias = "downloads_tmp_dir")]
    pub downloads: Option<PathBuf>,
    /// Completion ledger location.
    pub downloaded_file: Option<PathBuf>,
    /// URLs to treat as already downloaded.
    pub downloaded: Vec<String>,
    /// Per-transfer deadline in seconds. Unset means no deadline.
    pub timeout_secs: Option<u64>,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(content: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(content)
    }
}

/// Values given on the command line, taking precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub download_dir: Option<PathBuf>,
    pub parallel: Option<usize>,
    pub timeout_secs: Option<u64>,
}

/// Everything a run needs, with relative paths resolved against the root directory.
#[derive(Debug, Clone)]
pub struct Settings {
    pub spec: DownloadSpec,
    pub download_dir: PathBuf,
    pub ledger_path: PathBuf,
    pub assumed_done: Vec<String>,
    pub options: DispatchOptions,
}

impl Settings {
    pub fn resolve(root: &Path, config: Config, overrides: Overrides) -> Result<Self, ConfigError> {
        let parallel = overrides
            .parallel
            .or(config.parallel)
            .unwrap_or(DEFAULT_PARALLEL);
        let parallelism = NonZeroUsize::new(parallel).ok_or(ConfigError::ZeroParallelism)?;

        let download_dir = overrides
            .download_dir
            .or(config.downloads)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DOWNLOADS_DIR));
        let ledger_path = config
            .downloaded_file
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LEDGER_FILE));

        let transfer_timeout = overrides
            .timeout_secs
            .or(config.timeout_secs)
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);

        Ok(Self {
            spec: config.download,
            download_dir: root.join(download_dir),
            ledger_path: root.join(ledger_path),
            assumed_done: config.downloaded,
            options: DispatchOptions {
                parallelism,
                transfer_timeout,
            },
        })
    }
}
