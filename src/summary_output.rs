//! Aggregated summary of victim/culprit query-sequence combinations

use crate::chain::{single_line, LockInvalidationChain};
use crate::error::{AnalyzerError, Result};
use crate::log_record::LogRecord;
use crate::report::{generated_at_now, Renderer};
use std::collections::HashMap;
use std::fmt::{self, Write};

const RULE_WIDTH: usize = 80;

/// Chains sharing the same victim and culprit query sequences
#[derive(Debug, Clone)]
pub struct CombinationGroup<'a> {
    pub victim_hash: String,
    pub culprit_hash: String,
    /// Members in input order; the first one represents the group
    pub chains: Vec<&'a LockInvalidationChain>,
}

impl CombinationGroup<'_> {
    /// Earliest and latest victim timestamps in the group
    pub fn occurrence_range(&self) -> (&str, &str) {
        let mut timestamps: Vec<&str> = self
            .chains
            .iter()
            .map(|c| c.victim_entry.timestamp.as_str())
            .collect();
        timestamps.sort_unstable();
        (
            timestamps.first().copied().unwrap_or(""),
            timestamps.last().copied().unwrap_or(""),
        )
    }
}

/// Group chains by (victim hash, culprit hash), largest group first
///
/// Chains missing either query list are left out. Equal-sized groups keep
/// the order in which they first appear.
pub fn group_combinations(chains: &[LockInvalidationChain]) -> Vec<CombinationGroup<'_>> {
    let mut groups: Vec<CombinationGroup<'_>> = Vec::new();
    let mut index: HashMap<(String, String), usize> = HashMap::new();

    for chain in chains {
        if chain.victim_queries.is_empty() || chain.culprit_queries.is_empty() {
            continue;
        }
        let key = (chain.victim_hash(), chain.culprit_hash());
        match index.get(&key) {
            Some(&i) => groups[i].chains.push(chain),
            None => {
                index.insert(key.clone(), groups.len());
                groups.push(CombinationGroup {
                    victim_hash: key.0,
                    culprit_hash: key.1,
                    chains: vec![chain],
                });
            }
        }
    }

    groups.sort_by(|a, b| b.chains.len().cmp(&a.chains.len()));
    groups
}

/// Aggregated plain-text summary
#[derive(Debug, Clone)]
pub struct SummaryRenderer {
    generated_at: String,
}

impl SummaryRenderer {
    pub fn new() -> Self {
        Self::with_generated_at(generated_at_now())
    }

    /// Renderer with a fixed generation timestamp
    pub fn with_generated_at(generated_at: impl Into<String>) -> Self {
        Self {
            generated_at: generated_at.into(),
        }
    }

    fn write_summary(&self, out: &mut String, chains: &[LockInvalidationChain]) -> fmt::Result {
        if chains.is_empty() {
            return writeln!(out, "No transaction lock invalidation events found");
        }

        let rule = "=".repeat(RULE_WIDTH);
        writeln!(out, "{rule}")?;
        writeln!(out, "YDB Transaction Lock Invalidation (TLI) Aggregated Summary")?;
        writeln!(out, "{rule}")?;
        writeln!(out, "Generated at: {}", self.generated_at)?;
        writeln!(out, "Total invalidation events: {}", chains.len())?;
        writeln!(out, "{rule}\n")?;

        let groups = group_combinations(chains);
        if groups.is_empty() {
            return writeln!(out, "No valid victim+culprit combinations found");
        }

        writeln!(out, "Found {} unique victim+culprit combinations:\n", groups.len())?;
        let thin = "-".repeat(RULE_WIDTH);
        for (i, group) in groups.iter().enumerate() {
            let representative = group.chains[0];
            writeln!(out, "{thin}")?;
            writeln!(out, "#{} TLI Count: {}", i + 1, group.chains.len())?;
            writeln!(out, "{thin}")?;

            writeln!(out, "VICTIM:")?;
            write_queries(out, &representative.victim_queries)?;
            writeln!(out)?;
            writeln!(out, "CULPRIT:")?;
            write_queries(out, &representative.culprit_queries)?;
            writeln!(out)?;

            writeln!(out, "DETAILS:")?;
            writeln!(
                out,
                "  Table: {}",
                representative.table_name.as_deref().unwrap_or("None")
            )?;
            writeln!(out, "  Victim Hash: {}", group.victim_hash)?;
            writeln!(out, "  Culprit Hash: {}", group.culprit_hash)?;
            if group.victim_hash == group.culprit_hash {
                writeln!(
                    out,
                    "  Victim and culprit are different instances of the same transaction."
                )?;
            }
            let (first, last) = group.occurrence_range();
            writeln!(out, "  First occurrence: {first}")?;
            writeln!(out, "  Last occurrence: {last}")?;
            writeln!(out)?;
        }
        Ok(())
    }
}

impl Default for SummaryRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for SummaryRenderer {
    fn name(&self) -> &'static str {
        "summary"
    }

    fn render(&self, chains: &[LockInvalidationChain]) -> Result<String> {
        let mut out = String::new();
        self.write_summary(&mut out, chains)
            .map_err(|e| AnalyzerError::Render {
                format: self.name(),
                message: e.to_string(),
            })?;
        Ok(out)
    }
}

fn write_queries(out: &mut String, queries: &[LogRecord]) -> fmt::Result {
    for (j, query) in queries.iter().enumerate() {
        match (&query.query_text, &query.query_action) {
            (Some(text), _) => writeln!(out, "  {}. {}", j + 1, single_line(text))?,
            (None, action) => writeln!(out, "  {}. {}", j + 1, action.as_deref().unwrap_or("None"))?,
        }
    }
    Ok(())
}
