use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Downloads files listed in a YAML configuration", long_about = None)]
pub struct Args {
    /// Directory holding the config file, the ledger and the downloads
    #[arg(index = 1)]
    pub directory: PathBuf,

    /// Directory to save downloaded folders in (default: <directory>/downloads)
    #[arg(short = 'd', long = "download-dir")]
    pub download_dir: Option<PathBuf>,

    /// Maximum number of concurrent downloads (default: 10)
    #[arg(short = 'p', long)]
    pub parallel: Option<usize>,

    /// Config file path (default: <directory>/config.yaml)
    #[arg(short = 'c', long = "config-file")]
    pub config_file: Option<PathBuf>,

    /// Give up on a single download after this many seconds
    #[arg(short = 't', long)]
    pub timeout: Option<u64>,

    /// Log file path (default: <directory>/bulkdl.log)
    #[arg(long = "log-file")]
    pub log_file: Option<PathBuf>,

    /// Do not draw the live progress table
    #[arg(short = 'q', long)]
    pub quiet: bool,
}
