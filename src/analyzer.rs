//! End-to-end analysis pipeline: order, parse, correlate, report

use crate::chain::LockInvalidationChain;
use crate::config::AnalyzerConfig;
use crate::correlator::ChainCorrelator;
use crate::error::Result;
use crate::log_parser::{lossy_lines, LogParser, ParseStats};
use crate::log_sorter::sort_reverse_chronological;
use crate::report::Renderer;
use crate::sql_output::SqlRenderer;
use crate::summary_output::SummaryRenderer;
use crate::yaml_output::YamlRenderer;
use std::fs;
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};

/// File names of the artifacts written by [`write_reports`]
pub const YAML_REPORT_FILE: &str = "tli_report.yaml";
pub const SQL_REPORT_FILE: &str = "tli_report.sql";
pub const SUMMARY_REPORT_FILE: &str = "tli_summary.txt";

/// Result of one analysis run
#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    /// Chains in creation order (latest invalidation first)
    pub chains: Vec<LockInvalidationChain>,
    pub parse_stats: ParseStats,
}

/// Analyze a whole log
///
/// With `config.sort` the input is read fully and ordered latest-first;
/// otherwise lines are streamed straight into the correlator and must
/// already be in that order.
pub fn analyze<R: BufRead>(reader: R, config: &AnalyzerConfig) -> Result<AnalysisOutcome> {
    let parser = LogParser::new(config.log_format);

    let lines: Box<dyn Iterator<Item = io::Result<String>> + '_> = if config.sort {
        let sorted = sort_reverse_chronological(reader, config.log_format)?;
        Box::new(sorted.into_iter().map(Ok))
    } else {
        Box::new(lossy_lines(reader))
    };

    let mut correlator = ChainCorrelator::new(config.collect_details);
    let mut records = parser.parse_stream(lines);
    for record in &mut records {
        correlator.observe(record?);
    }
    let parse_stats = records.stats();

    tracing::info!(
        "Parsed {} lines: {} records, {} rejected",
        parse_stats.lines_read,
        parse_stats.records,
        parse_stats.rejected
    );

    Ok(AnalysisOutcome {
        chains: correlator.finish(),
        parse_stats,
    })
}

/// Write YAML, SQL and summary reports into `dir`, creating it if needed
///
/// Returns the paths written.
pub fn write_reports(chains: &[LockInvalidationChain], dir: &Path) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)?;

    let renderers: [(&str, Box<dyn Renderer>); 3] = [
        (YAML_REPORT_FILE, Box::new(YamlRenderer::new())),
        (SQL_REPORT_FILE, Box::new(SqlRenderer::new())),
        (SUMMARY_REPORT_FILE, Box::new(SummaryRenderer::new())),
    ];

    let mut written = Vec::with_capacity(renderers.len());
    for (file_name, renderer) in renderers {
        let path = dir.join(file_name);
        fs::write(&path, renderer.render(chains)?)?;
        tracing::info!("Wrote {} report to {}", renderer.name(), path.display());
        written.push(path);
    }
    Ok(written)
}
