//! Merge stage: deduplicating concatenation of output files

use crate::config::MergeSpec;
use crate::Result;
use anyhow::Context;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// What happened to one merge target
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Target written with this many unique lines
    Written { lines: usize },
    /// Every source was empty or missing, target left absent
    Skipped,
}

/// Collect unique trimmed lines from the sources, first occurrence wins
pub fn merge_lines(spec: &MergeSpec, dir: &Path) -> Result<Vec<String>> {
    let mut seen = HashSet::new();
    let mut lines = Vec::new();

    for source in &spec.source_files {
        let path = dir.join(source);
        if !path.exists() {
            warn!(target_file = %spec.target_file, source = %source, "merge source missing, skipping");
            continue;
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        for line in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
            if seen.insert(line.to_string()) {
                lines.push(line.to_string());
            }
        }
    }

    Ok(lines)
}

/// Merge one spec into `dir/{target_file}`
pub fn merge_one(spec: &MergeSpec, dir: &Path) -> Result<MergeOutcome> {
    let lines = merge_lines(spec, dir)?;
    if lines.is_empty() {
        info!(target_file = %spec.target_file, "no lines to merge, skipping target");
        return Ok(MergeOutcome::Skipped);
    }

    let path = dir.join(&spec.target_file);
    let mut content = lines.join("\n");
    content.push('\n');
    fs::write(&path, content).with_context(|| format!("failed to write {}", path.display()))?;

    info!(target_file = %spec.target_file, lines = lines.len(), "merged");
    Ok(MergeOutcome::Written { lines: lines.len() })
}

/// Run every merge spec in configured order
///
/// A failing spec is logged and does not stop the remaining ones.
pub fn merge_all(specs: &[MergeSpec], dir: &Path) -> Vec<(String, MergeOutcome)> {
    let mut outcomes = Vec::new();
    for spec in specs {
        match merge_one(spec, dir) {
            Ok(outcome) => outcomes.push((spec.target_file.clone(), outcome)),
            Err(e) => {
                let error = format!("{:#}", e);
                warn!(target_file = %spec.target_file, %error, "merge failed");
            }
        }
    }
    outcomes
}
