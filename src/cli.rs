use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::encoding::DEFAULT_SAMPLE_SIZE;

#[derive(Debug, Parser)]
#[command(author, version, about = "Repair messy delimited files", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Detect encoding and describe a delimited file into a .meta file
    Probe(ProbeArgs),
    /// Normalize a file to UTF-8, writing a sibling artifact when needed
    Convert(ConvertArgs),
    /// Stream the file in batches and report missingness and bad rows
    Report(ReportArgs),
    /// Apply a missing-value strategy and write the repaired file
    Remediate(RemediateArgs),
}

#[derive(Debug, Args)]
pub struct ProbeArgs {
    /// Input delimited file to inspect
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Optional destination .meta file for the descriptor
    #[arg(short, long)]
    pub meta: Option<PathBuf>,
    /// Number of bytes to sample for encoding detection
    #[arg(long, default_value_t = DEFAULT_SAMPLE_SIZE)]
    pub sample_bytes: usize,
    /// Delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
}

#[derive(Debug, Args)]
pub struct ConvertArgs {
    /// Input delimited file to normalize
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Number of bytes to sample for encoding detection
    #[arg(long, default_value_t = DEFAULT_SAMPLE_SIZE)]
    pub sample_bytes: usize,
    /// Delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
}

#[derive(Debug, Args)]
pub struct ReportArgs {
    /// Input delimited file to analyze
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Rows per batch; omit to analyze the whole file at once
    #[arg(short = 'b', long = "batch-size")]
    pub batch_size: Option<usize>,
    /// Restrict analysis to this comma-separated list of columns
    #[arg(short = 'C', long = "columns", value_delimiter = ',')]
    pub columns: Vec<String>,
    /// Delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Treat the first row as data rather than a header
    #[arg(long = "no-header")]
    pub no_header: bool,
    /// Number of bytes to sample for encoding detection
    #[arg(long, default_value_t = DEFAULT_SAMPLE_SIZE)]
    pub sample_bytes: usize,
    /// Skip the UTF-8 conversion step and read the input as-is
    #[arg(long = "no-convert")]
    pub no_convert: bool,
    /// Emit the reports as JSON instead of aligned tables
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct RemediateArgs {
    /// Input delimited file to repair
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Destination for the repaired UTF-8 CSV
    #[arg(short = 'o', long = "output")]
    pub output: PathBuf,
    /// Remediation method: drop, fill, mode, ffill, or bfill
    #[arg(long)]
    pub method: String,
    /// Fill sub-strategy when --method fill is used (mode, ffill, bfill)
    #[arg(long = "fill-with")]
    pub fill_with: Option<String>,
    /// Restrict remediation to this comma-separated list of columns
    #[arg(short = 'C', long = "columns", value_delimiter = ',')]
    pub columns: Vec<String>,
    /// Delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Number of bytes to sample for encoding detection
    #[arg(long, default_value_t = DEFAULT_SAMPLE_SIZE)]
    pub sample_bytes: usize,
    /// Skip the UTF-8 conversion step and read the input as-is
    #[arg(long = "no-convert")]
    pub no_convert: bool,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}
