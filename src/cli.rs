use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::logging::LogFormat;

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormatArg {
    Text,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Text => LogFormat::Text,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct CliOptions {
    /// Image file to analyze
    #[arg(short, long)]
    pub input: PathBuf,

    /// Write the JSON report here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Optional path to config file (YAML)
    #[arg(long)]
    pub config_path: Option<PathBuf>,

    /// Number of evaluation worker threads (overrides config; 0 = all CPUs)
    #[arg(long)]
    pub workers: Option<usize>,

    /// Seconds to wait for the report before giving up
    #[arg(long, default_value_t = 60)]
    pub timeout_secs: u64,

    /// Pretty-print the JSON report
    #[arg(long)]
    pub pretty: bool,

    /// Log output format (logs go to stderr)
    #[arg(long, value_enum, default_value_t = LogFormatArg::Text)]
    pub log_format: LogFormatArg,
}

pub fn parse() -> CliOptions {
    CliOptions::parse()
}
