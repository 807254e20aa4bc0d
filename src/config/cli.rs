//! CLI argument parsing

use clap::Parser;
use std::path::PathBuf;

/// soundprobe - musical descriptors for a single audio file
///
/// Decodes the file, runs tempo, key, danceability and loudness analysis,
/// and prints the response JSON on stdout.
#[derive(Parser, Debug)]
#[command(name = "soundprobe")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Audio file to analyze
    #[arg(short, long, value_name = "FILE")]
    pub input: PathBuf,

    /// Filename to report for the upload (defaults to the input's file name)
    #[arg(short, long, value_name = "FILENAME")]
    pub name: Option<String>,

    /// Directory for request-scoped staging files (defaults to the system temp dir)
    #[arg(long, value_name = "DIR")]
    pub staging_dir: Option<PathBuf>,

    /// Number of analysis worker threads (defaults to CPU count)
    #[arg(short = 'j', long, value_name = "N")]
    pub threads: Option<usize>,

    /// Largest accepted upload in MiB
    #[arg(long, value_name = "N", default_value_t = 512)]
    pub max_upload_mb: u64,

    /// Pretty-print the response JSON
    #[arg(long, default_value = "false")]
    pub pretty: bool,

    /// Verbose output (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (errors only)
    #[arg(short, long, default_value = "false")]
    pub quiet: bool,
}

impl Cli {
    /// Filename reported to the orchestrator
    ///
    /// An explicit `--name` wins, even if empty, so the empty-filename path
    /// can be exercised from the command line.
    pub fn upload_name(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => self
                .input
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        }
    }

    /// Default tracing filter for the verbosity flags
    pub fn log_filter(&self) -> &'static str {
        if self.quiet {
            return "error";
        }
        match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}
