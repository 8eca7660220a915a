//! Report rendering shared by all output formats

use crate::chain::LockInvalidationChain;
use crate::cli::OutputFormat;
use crate::error::Result;
use crate::sql_output::SqlRenderer;
use crate::summary_output::SummaryRenderer;
use crate::yaml_output::YamlRenderer;

/// Turns a finished chain set into one textual report
///
/// Renderers only read the chains.
pub trait Renderer {
    /// Short format name used in error messages and file names
    fn name(&self) -> &'static str;

    /// Produce the full report text
    fn render(&self, chains: &[LockInvalidationChain]) -> Result<String>;
}

/// Renderer for an output format, stamped with the current time
pub fn renderer_for(format: OutputFormat) -> Box<dyn Renderer> {
    match format {
        OutputFormat::Yaml => Box::new(YamlRenderer::new()),
        OutputFormat::Sql => Box::new(SqlRenderer::new()),
        OutputFormat::Summary => Box::new(SummaryRenderer::new()),
    }
}

/// Local wall-clock time in ISO 8601 with microseconds
pub fn generated_at_now() -> String {
    chrono::Local::now()
        .format("%Y-%m-%dT%H:%M:%S%.6f")
        .to_string()
}

/// Chains ordered by the victim's timestamp, ties in input order
pub fn by_victim_time(chains: &[LockInvalidationChain]) -> Vec<&LockInvalidationChain> {
    let mut sorted: Vec<&LockInvalidationChain> = chains.iter().collect();
    sorted.sort_by(|a, b| a.victim_entry.timestamp.cmp(&b.victim_entry.timestamp));
    sorted
}
