//! CLI argument parsing for the TLI analyzer

use crate::config::AnalyzerConfig;
use crate::log_record::LogFormat;
use clap::{ArgAction, Parser, ValueEnum};
use std::path::PathBuf;

/// Report format written to stdout
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Structured YAML document (default)
    #[default]
    Yaml,
    /// SQL-script-like report with each transaction's statements
    Sql,
    /// Aggregated victim+culprit combinations with counts
    Summary,
}

#[derive(Parser, Debug)]
#[command(name = "tli-analyzer")]
#[command(version)]
#[command(
    about = "Find transaction lock invalidations in YDB logs and trace them to the culprit transaction",
    long_about = None
)]
#[command(after_help = "Examples:
    tli-analyzer --log-file ydb.log > report.yaml
    tli-analyzer --log-file ydb_sorted.log --no-sort -o sql > report.sql
    grep \"Transaction locks invalidated\\|LockId\\|BreakLocks\\|SessionId\" ydb.log | tli-analyzer -o summary
    tli-analyzer --log-file ydb.log --output-dir reports/")]
pub struct Cli {
    /// Log file to analyze (reads stdin when omitted)
    #[arg(long = "log-file", value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Input log dialect: systemd for journalctl output, raw for ydbd log files
    #[arg(short = 'f', long = "log-format", value_enum)]
    pub log_format: Option<LogFormat>,

    /// Input is already latest-first; skip sorting
    #[arg(long = "no-sort")]
    pub no_sort: bool,

    /// Report format printed to stdout
    #[arg(short = 'o', long = "output-format", value_enum, default_value = "yaml")]
    pub output_format: OutputFormat,

    /// Write every report format into this directory instead of stdout
    #[arg(long = "output-dir", value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Keep every log line that contributed to a chain in the YAML report
    #[arg(long = "collect-details")]
    pub collect_details: bool,

    /// TOML configuration file; command-line flags take precedence
    #[arg(long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, conflicts_with = "quiet")]
    pub verbose: u8,

    /// Only log errors
    #[arg(short = 'q', long = "quiet")]
    pub quiet: bool,
}

impl Cli {
    /// Apply command-line overrides on top of `base`
    pub fn merge_into(&self, mut base: AnalyzerConfig) -> AnalyzerConfig {
        if let Some(format) = self.log_format {
            base.log_format = format;
        }
        if self.no_sort {
            base.sort = false;
        }
        if self.collect_details {
            base.collect_details = true;
        }
        if let Some(dir) = &self.output_dir {
            base.output_dir = Some(dir.clone());
        }
        base
    }

    /// Default log directive for the chosen verbosity
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            return tracing::Level::ERROR;
        }
        match self.verbose {
            0 => tracing::Level::WARN,
            1 => tracing::Level::INFO,
            2 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        }
    }
}
