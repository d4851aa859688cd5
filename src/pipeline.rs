//! End-to-end runs: analysis of the source tree and conversion of the selected units.
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::analysis::knowledge::{AnalysisRecord, KnowledgeBase};
use crate::analysis::scan::scan_sources;
use crate::analysis::{SourceUnit, UnitType};
use crate::config::{Config, Selection};
use crate::convert::chunker::chunk;
use crate::convert::merge::{merge, qualified_target_path};
use crate::convert::orchestrator::{CancelToken, ChunkFailure, Orchestrator, RetryPolicy};
use crate::convert::output::{write_artifact, write_json};
use crate::convert::prompt;
use crate::provider::Provider;

// ── Run summary ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FailureKind {
    ClassificationAmbiguous,
    ChunkOversized,
    Provider,
    Sanitize,
    MergeAllFailed,
    /// Another unit already wrote the same target; this one was nested under its package.
    TargetCollision,
    Cancelled,
    Io,
}

impl FailureKind {
    /// Whether the unit still produced its normal output.
    pub fn is_fatal_for_unit(&self) -> bool {
        matches!(
            self,
            FailureKind::MergeAllFailed | FailureKind::Cancelled | FailureKind::Io
        )
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl From<&ChunkFailure> for FailureKind {
    fn from(failure: &ChunkFailure) -> Self {
        match failure {
            ChunkFailure::Provider { .. } => FailureKind::Provider,
            ChunkFailure::Sanitize(_) => FailureKind::Sanitize,
            ChunkFailure::Cancelled => FailureKind::Cancelled,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnitFailure {
    pub path: String,
    pub kind: FailureKind,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub units_scanned: usize,
    pub units_processed: usize,
    pub chunks_emitted: usize,
    pub oversized_chunks: usize,
    pub translation_failures: usize,
    pub merge_failures: usize,
    pub cancelled: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Written artifact paths.
    pub artifacts: Vec<String>,
    pub failures: Vec<UnitFailure>,
}

impl RunSummary {
    pub fn new() -> Self {
        Self {
            units_scanned: 0,
            units_processed: 0,
            chunks_emitted: 0,
            oversized_chunks: 0,
            translation_failures: 0,
            merge_failures: 0,
            cancelled: false,
            started_at: Utc::now(),
            finished_at: None,
            artifacts: Vec::new(),
            failures: Vec::new(),
        }
    }

    pub fn record(&mut self, path: &str, kind: FailureKind, detail: impl Into<String>) {
        self.failures.push(UnitFailure {
            path: path.to_string(),
            kind,
            detail: detail.into(),
        });
    }

    pub fn failures_of(&self, kind: FailureKind) -> impl Iterator<Item = &UnitFailure> {
        self.failures.iter().filter(move |f| f.kind == kind)
    }

    fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }
}

impl Default for RunSummary {
    fn default() -> Self {
        Self::new()
    }
}

// ── Analysis ─────────────────────────────────────────────────────────

/// Classified units of one source tree plus their knowledge base.
pub struct Analysis {
    pub units: Vec<SourceUnit>,
    pub knowledge: KnowledgeBase,
    pub failures: Vec<UnitFailure>,
}

/// Scans and classifies the configured source tree. Unreadable files are
/// recorded and skipped.
pub fn analyze(config: &Config) -> Result<Analysis> {
    let root = Path::new(&config.source_dir);
    let files = scan_sources(root, &config.scan_options())?;
    info!("Found {} Java files under {}", files.len(), root.display());

    let mut analysis = Analysis {
        units: Vec::with_capacity(files.len()),
        knowledge: KnowledgeBase::new(),
        failures: Vec::new(),
    };

    for file in files {
        let text = match std::fs::read_to_string(&file.absolute) {
            Ok(text) => text,
            Err(e) => {
                warn!("Failed to read {}: {e}", file.relative);
                analysis.failures.push(UnitFailure {
                    path: file.relative,
                    kind: FailureKind::Io,
                    detail: e.to_string(),
                });
                continue;
            }
        };

        let unit = SourceUnit::new(file.relative, text);
        if let Some(ambiguity) = &unit.ambiguity {
            warn!("{} classified as Other: {ambiguity}", unit.path);
            analysis.failures.push(UnitFailure {
                path: unit.path.clone(),
                kind: FailureKind::ClassificationAmbiguous,
                detail: ambiguity.to_string(),
            });
        }
        analysis.knowledge.add_unit(AnalysisRecord::from_unit(
            &unit,
            config.project_package.as_deref(),
        ));
        analysis.units.push(unit);
    }

    let stats = analysis.knowledge.statistics();
    for (unit_type, count) in &stats.by_type {
        info!("  {unit_type}: {count}");
    }
    Ok(analysis)
}

/// Units to convert, in conversion order.
pub fn select_units<'u>(units: &'u [SourceUnit], config: &Config) -> Vec<&'u SourceUnit> {
    let selected: Vec<&SourceUnit> = match config.selection {
        Selection::All => units.iter().collect(),
        Selection::Matched => select_matched(units),
    };
    selected
        .into_iter()
        .filter(|u| config.should_convert(u.unit_type))
        .collect()
}

/// First controller, then the service and DAO named after it. Falls back to
/// the first unit of each type.
fn select_matched(units: &[SourceUnit]) -> Vec<&SourceUnit> {
    let of_type = |t: UnitType| units.iter().filter(move |u| u.unit_type == t);
    let mut selected = Vec::new();

    let controller = of_type(UnitType::Controller).next();
    let base = controller.map(|c| c.name().replace("Controller", ""));
    selected.extend(controller);

    for unit_type in [UnitType::Service, UnitType::Dao] {
        let matched = base
            .as_deref()
            .filter(|b| !b.is_empty())
            .and_then(|b| of_type(unit_type).find(|u| u.name().starts_with(b)));
        selected.extend(matched.or_else(|| of_type(unit_type).next()));
    }
    selected
}

// ── Conversion ───────────────────────────────────────────────────────

pub struct Converter<'a, P: Provider + ?Sized> {
    config: &'a Config,
    orchestrator: Orchestrator<'a, P>,
    cancel: CancelToken,
    written: HashSet<PathBuf>,
}

impl<'a, P: Provider + ?Sized> Converter<'a, P> {
    pub fn new(config: &'a Config, provider: &'a P, cancel: CancelToken) -> Self {
        let orchestrator =
            Orchestrator::new(provider, RetryPolicy::from(&config.retry), cancel.clone())
                .with_generation(&config.provider);
        Self {
            config,
            orchestrator,
            cancel,
            written: HashSet::new(),
        }
    }

    /// Adds LLM descriptions and a project overview to the knowledge base.
    /// Failures only cost the description.
    pub fn describe(&mut self, analysis: &mut Analysis) {
        for unit in &analysis.units {
            if self.cancel.is_cancelled() {
                return;
            }
            let Some(first) = chunk(unit, self.config.budget_for(unit.unit_type)).next() else {
                continue;
            };
            match self.orchestrator.describe(&first) {
                Ok(description) => {
                    analysis.knowledge.set_description(&unit.path, description);
                }
                Err(e) => warn!("No description for {}: {e}", unit.path),
            }
        }

        if self.cancel.is_cancelled() {
            return;
        }
        let stats = analysis.knowledge.statistics();
        let names: Vec<&str> = analysis.units.iter().map(|u| u.name()).collect();
        match self
            .orchestrator
            .complete(prompt::overview_prompt(&stats, &names))
        {
            Ok(overview) if !overview.is_empty() => analysis.knowledge.set_project_overview(overview),
            Ok(_) => {}
            Err(e) => warn!("No project overview: {e}"),
        }
    }

    /// Runs the whole conversion: knowledge base, selected units, summary.
    ///
    /// `on_unit` is called with `(position, total, unit)` before each unit.
    /// Per-unit failures land in the summary; only knowledge base or summary
    /// write errors are returned.
    pub fn run(
        &mut self,
        analysis: &mut Analysis,
        mut on_unit: impl FnMut(usize, usize, &SourceUnit),
    ) -> Result<RunSummary> {
        let mut summary = RunSummary::new();
        self.written.clear();
        summary.units_scanned = analysis.units.len();
        summary.failures.extend(analysis.failures.iter().cloned());

        if self.config.describe_units {
            self.describe(analysis);
        }
        analysis
            .knowledge
            .write_json(Path::new(&self.config.knowledge_base_path))?;

        let selected = select_units(&analysis.units, self.config);
        info!("Converting {} units", selected.len());
        let output_root = Path::new(&self.config.output_dir);

        for (position, unit) in selected.iter().enumerate() {
            if self.cancel.is_cancelled() {
                break;
            }
            on_unit(position, selected.len(), unit);
            self.convert_unit(unit, output_root, &mut summary);
        }

        summary.cancelled = self.cancel.is_cancelled();
        if summary.cancelled {
            warn!("Run cancelled; partial results kept");
        }
        summary.finish();
        write_json(Path::new(&self.config.summary_path), &summary)?;
        info!(
            "Done: {} units processed, {} chunks, {} translation failures, {} merge failures",
            summary.units_processed,
            summary.chunks_emitted,
            summary.translation_failures,
            summary.merge_failures
        );
        Ok(summary)
    }

    fn convert_unit(&mut self, unit: &SourceUnit, output_root: &Path, summary: &mut RunSummary) {
        let budget = self.config.budget_for(unit.unit_type);
        let chunks = chunk(unit, budget);
        info!(
            "Converting {} ({}, {} chunk(s))",
            unit.path,
            unit.unit_type,
            chunks.len()
        );

        summary.chunks_emitted += chunks.len();
        for oversized in chunks.clone().filter(|c| c.oversized) {
            summary.oversized_chunks += 1;
            summary.record(
                &unit.path,
                FailureKind::ChunkOversized,
                format!(
                    "chunk {}/{} is {} {:?} over a budget of {}",
                    oversized.index + 1,
                    oversized.total,
                    budget.measure(oversized.text),
                    budget.unit,
                    budget.limit
                ),
            );
        }

        let results = self.orchestrator.translate_unit(chunks);
        if results
            .iter()
            .any(|r| r.outcome == Err(ChunkFailure::Cancelled))
        {
            summary.record(
                &unit.path,
                FailureKind::Cancelled,
                "cancelled before all chunks were translated",
            );
            return;
        }

        for result in &results {
            if let Err(failure) = &result.outcome {
                summary.translation_failures += 1;
                summary.record(
                    &unit.path,
                    FailureKind::from(failure),
                    format!("chunk {} [{}]: {failure}", result.index + 1, failure.label()),
                );
            }
        }

        let mut artifact = merge(unit, &results);
        if !self.written.insert(artifact.target_path.clone()) {
            let relocated = qualified_target_path(unit);
            warn!(
                "{} already written this run; writing {} to {}",
                artifact.target_path.display(),
                unit.path,
                relocated.display()
            );
            summary.record(
                &unit.path,
                FailureKind::TargetCollision,
                format!(
                    "{} taken by another unit, wrote {}",
                    artifact.target_path.display(),
                    relocated.display()
                ),
            );
            self.written.insert(relocated.clone());
            artifact.target_path = relocated;
        }
        if artifact.failed {
            summary.merge_failures += 1;
            summary.record(
                &unit.path,
                FailureKind::MergeAllFailed,
                "no chunk produced usable output",
            );
        }

        match write_artifact(output_root, &artifact) {
            Ok(path) => summary.artifacts.push(path.to_string_lossy().replace('\\', "/")),
            Err(e) => {
                warn!("Failed to write {}: {e:#}", unit.path);
                summary.record(&unit.path, FailureKind::Io, format!("{e:#}"));
            }
        }
        summary.units_processed += 1;
    }
}
