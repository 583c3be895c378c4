use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing::level_filters::LevelFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Input folder to pack, or archive file to unpack.
    #[arg(short, long)]
    pub input: PathBuf,

    /// Output archive file (packing) or folder (unpacking).
    #[arg(short, long)]
    pub output: PathBuf,

    /// Compression level 0-9 (0 = no compression).
    #[arg(short = 'l', long, default_value_t = 0, value_parser = clap::value_parser!(i32).range(0..=9))]
    pub compression_level: i32,

    /// Minimum severity of log events to print.
    #[arg(short = 's', long, value_enum, default_value_t = SeverityLevel::Warning)]
    pub severity_level: SeverityLevel,

    /// Unpack the archive after packing and compare the result with the source.
    #[arg(short = 't', long)]
    pub test_unpack: bool,
}

/// Log severity threshold, most to least verbose.
#[derive(ValueEnum, Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum SeverityLevel {
    Trace,
    Debug,
    Info,
    Warning,
    Error,
    /// Same filter as `error`; the `tracing` levels stop there.
    Fatal,
}

impl SeverityLevel {
    /// The `tracing` filter admitting this severity and above.
    pub fn filter(self) -> LevelFilter {
        match self {
            SeverityLevel::Trace => LevelFilter::TRACE,
            SeverityLevel::Debug => LevelFilter::DEBUG,
            SeverityLevel::Info => LevelFilter::INFO,
            SeverityLevel::Warning => LevelFilter::WARN,
            SeverityLevel::Error | SeverityLevel::Fatal => LevelFilter::ERROR,
        }
    }
}

/// Parses the command line; argument errors print usage and exit non-zero.
pub fn run() -> Args {
    Args::parse()
}
