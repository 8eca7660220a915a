use anyhow::{Context, Result};
use clap::Parser;
use std::fs::File;
use std::io::{self, BufReader, IsTerminal, Write};
use tli_analyzer::{
    analyzer,
    cli::Cli,
    config::AnalyzerConfig,
    error::AnalyzerError,
    report::renderer_for,
};
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber; `RUST_LOG` overrides the verbosity flags
fn init_tracing(level: tracing::Level) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

/// Load the config file (if any) and apply command-line overrides
fn load_config(args: &Cli) -> Result<AnalyzerConfig> {
    let base = match &args.config {
        Some(path) => AnalyzerConfig::from_toml(path)?,
        None => AnalyzerConfig::default(),
    };
    let config = args.merge_into(base);
    config.validate()?;
    Ok(config)
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_level());

    let config = load_config(&args)?;

    let outcome = match &args.log_file {
        Some(path) => {
            if !path.exists() {
                return Err(AnalyzerError::InputNotFound(path.clone()).into());
            }
            let file = File::open(path)
                .with_context(|| format!("Failed to open log file: {}", path.display()))?;
            analyzer::analyze(BufReader::new(file), &config)
                .context("Failed to analyze log data")?
        }
        None => {
            let stdin = io::stdin();
            if stdin.is_terminal() {
                anyhow::bail!(
                    "No input provided. Either specify --log-file or pipe data to stdin. Use --help for usage examples."
                );
            }
            analyzer::analyze(stdin.lock(), &config).context("Failed to analyze log data")?
        }
    };

    if let Some(dir) = &config.output_dir {
        analyzer::write_reports(&outcome.chains, dir)
            .with_context(|| format!("Failed to write reports to {}", dir.display()))?;
        return Ok(());
    }

    if outcome.chains.is_empty() {
        return Ok(());
    }

    let renderer = renderer_for(args.output_format);
    let report = renderer.render(&outcome.chains)?;
    let mut stdout = io::stdout().lock();
    stdout
        .write_all(report.as_bytes())
        .with_context(|| format!("Failed to write {} report to stdout", renderer.name()))?;
    stdout.flush()?;

    Ok(())
}
