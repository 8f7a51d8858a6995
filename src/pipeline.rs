use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tracing::info;

use crate::builder::build_panel;
use crate::cleaner::{CleanReport, clean_panel};
use crate::composite::{GroupOutcome, ScoringOutput, score_panel, write_group_artifacts};
use crate::config::PipelineConfig;
use crate::csv_io::{cell, open_reader};
use crate::panel::{read_panel, write_panel};
use crate::raw::{CLUBS_FILE, load_clubs, load_raw_tables};
use crate::regression::{
    BY_POSITION_FILE, GlobalScope, RegressionReport, run_regressions, write_by_position,
    write_coefficients,
};
use crate::report::{ReportSummary, SUMMARY_WORKBOOK, write_summary_workbook};

pub const PANEL_FILE: &str = "panel_df.csv";
pub const CLEANED_FILE: &str = "panel_df_cleaned.csv";
pub const PCA_FILE: &str = "panel_with_pca.csv";
pub const ALL_PCA_FILE: &str = "panel_with_all_pca.csv";
pub const GROUP_OUTPUT_DIR: &str = "pca_outputs_by_position";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelinePaths {
    pub data_dir: PathBuf,
    pub out_dir: PathBuf,
}

impl PipelinePaths {
    pub fn new(data_dir: impl Into<PathBuf>, out_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            out_dir: out_dir.into(),
        }
    }

    pub fn output(&self, name: &str) -> PathBuf {
        self.out_dir.join(name)
    }
}

fn require_input(path: &Path, stage: &str) -> Result<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(anyhow!(
            "missing prerequisite {} (run the `{stage}` stage first)",
            path.display()
        ))
    }
}

/// Deletes an artifact of an earlier run; a missing file is fine.
fn remove_stale(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err).with_context(|| format!("remove stale {}", path.display())),
    }
}

pub fn run_build(paths: &PipelinePaths, cfg: &PipelineConfig) -> Result<usize> {
    let raw = load_raw_tables(&paths.data_dir)
        .with_context(|| format!("load raw extracts from {}", paths.data_dir.display()))?;
    let panel = build_panel(&raw, cfg);
    let out = paths.output(PANEL_FILE);
    write_panel(&panel, &out)?;
    info!(rows = panel.len(), path = %out.display(), "build stage done");
    Ok(panel.len())
}

pub fn run_clean(paths: &PipelinePaths) -> Result<CleanReport> {
    let input = paths.output(PANEL_FILE);
    require_input(&input, "build")?;
    let panel = read_panel(&input)?;
    let (cleaned, report) = clean_panel(panel);
    write_panel(&cleaned, &paths.output(CLEANED_FILE))?;
    Ok(report)
}

pub fn run_score(paths: &PipelinePaths, cfg: &PipelineConfig) -> Result<ScoringOutput> {
    let input = paths.output(CLEANED_FILE);
    require_input(&input, "clean")?;
    let panel = read_panel(&input)?;
    let output = score_panel(panel, cfg)?;

    write_panel(&output.global_panel, &paths.output(PCA_FILE))?;
    write_panel(&output.full_panel, &paths.output(ALL_PCA_FILE))?;

    let group_dir = paths.output(GROUP_OUTPUT_DIR);
    fs::create_dir_all(&group_dir)
        .with_context(|| format!("create {}", group_dir.display()))?;
    for group in &cfg.position_groups {
        remove_stale(&group_dir.join(format!("{}_loadings.csv", group.name)))?;
        remove_stale(&group_dir.join(format!("{}_variance.txt", group.name)))?;
    }
    for outcome in &output.groups {
        if let GroupOutcome::Scored(group) = outcome {
            write_group_artifacts(&group_dir, group)?;
        }
    }
    info!(
        groups = output.groups.len(),
        path = %group_dir.display(),
        "score stage done"
    );
    Ok(output)
}

pub fn run_regress(paths: &PipelinePaths, cfg: &PipelineConfig) -> Result<RegressionReport> {
    let input = paths.output(ALL_PCA_FILE);
    require_input(&input, "score")?;
    let panel = read_panel(&input)?;
    let clubs_path = paths.data_dir.join(CLUBS_FILE);
    let clubs = load_clubs(&clubs_path)?;

    for scope in GlobalScope::ALL {
        remove_stale(&paths.output(&scope.file_name()))?;
    }
    let report = run_regressions(&panel, &clubs, cfg);
    for (scope, result) in &report.global {
        write_coefficients(&paths.output(&scope.file_name()), result)?;
    }
    write_by_position(&paths.output(BY_POSITION_FILE), &report.by_position)?;
    info!(
        fitted = report.global.len() + report.by_position.len(),
        skipped = report.skipped.len(),
        "regress stage done"
    );
    Ok(report)
}

pub fn run_report(paths: &PipelinePaths) -> Result<ReportSummary> {
    let out = paths.output(SUMMARY_WORKBOOK);
    remove_stale(&out)?;
    write_summary_workbook(&paths.out_dir, &out)
}

#[derive(Debug)]
pub struct RunSummary {
    pub panel_rows: usize,
    pub clean: CleanReport,
    pub scoring: ScoringOutput,
    pub regression: RegressionReport,
    pub report: ReportSummary,
}

pub fn run_all(paths: &PipelinePaths, cfg: &PipelineConfig) -> Result<RunSummary> {
    let panel_rows = run_build(paths, cfg).context("build stage")?;
    let clean = run_clean(paths).context("clean stage")?;
    let scoring = run_score(paths, cfg).context("score stage")?;
    let regression = run_regress(paths, cfg).context("regress stage")?;
    let report = run_report(paths).context("report stage")?;
    Ok(RunSummary {
        panel_rows,
        clean,
        scoring,
        regression,
        report,
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct PanelDescription {
    pub path: PathBuf,
    pub rows: usize,
    pub columns: Vec<String>,
    pub positions: BTreeMap<String, usize>,
    pub score_columns: Vec<String>,
    /// Share of empty cells per column, in header order.
    pub null_rates: Vec<(String, f64)>,
}

fn is_score_column(name: &str) -> bool {
    name.starts_with("performance_score")
        || name.ends_with("_composite_score")
        || name.contains("_PC")
}

/// Summary of any panel CSV, whichever stage wrote it.
pub fn describe(path: &Path) -> Result<PanelDescription> {
    let (mut reader, idx) = open_reader(path)?;
    let columns = idx.names().to_vec();
    let position_col = idx.get("position");
    let mut nulls = vec![0usize; columns.len()];
    let mut positions = BTreeMap::new();
    let mut rows = 0usize;

    for record in reader.records() {
        let record = record.with_context(|| format!("read {}", path.display()))?;
        rows += 1;
        for (c, slot) in nulls.iter_mut().enumerate() {
            if cell(&record, Some(c)).is_none() {
                *slot += 1;
            }
        }
        if position_col.is_some() {
            let label = cell(&record, position_col).unwrap_or("(missing)");
            *positions.entry(label.to_string()).or_insert(0) += 1;
        }
    }

    let null_rates = columns
        .iter()
        .zip(&nulls)
        .map(|(name, n)| {
            let rate = if rows == 0 { 0.0 } else { *n as f64 / rows as f64 };
            (name.clone(), rate)
        })
        .collect();
    Ok(PanelDescription {
        path: path.to_path_buf(),
        rows,
        score_columns: columns
            .iter()
            .filter(|c| is_score_column(c))
            .cloned()
            .collect(),
        columns,
        positions,
        null_rates,
    })
}

impl fmt::Display for PanelDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.path.display())?;
        writeln!(f, "rows: {}  columns: {}", self.rows, self.columns.len())?;
        if !self.positions.is_empty() {
            writeln!(f, "positions:")?;
            for (label, count) in &self.positions {
                writeln!(f, "  {label:<22} {count:>7}")?;
            }
        }
        if !self.score_columns.is_empty() {
            writeln!(f, "score columns: {}", self.score_columns.join(", "))?;
        }
        writeln!(f, "null rates:")?;
        for (name, rate) in &self.null_rates {
            writeln!(f, "  {name:<32} {:>6.1}%", rate * 100.0)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_prerequisite_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let paths = PipelinePaths::new(dir.path(), dir.path());
        let err = run_clean(&paths).unwrap_err();
        let msg = format!("{err:#}");
        assert!(msg.contains(PANEL_FILE));
        assert!(msg.contains("build"));
    }

    #[test]
    fn describe_counts_nulls_and_positions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.csv");
        fs::write(
            &path,
            "player_id,year,position,market_value_in_eur,performance_composite_score\n\
1,2020,Centre-Back,100,0.5\n\
2,2020,Centre-Back,,0.1\n\
3,2021,,50,-0.2\n",
        )
        .unwrap();
        let d = describe(&path).unwrap();
        assert_eq!(d.rows, 3);
        assert_eq!(d.positions.get("Centre-Back"), Some(&2));
        assert_eq!(d.positions.get("(missing)"), Some(&1));
        assert_eq!(d.score_columns, vec!["performance_composite_score".to_string()]);
        let (_, rate) = &d.null_rates[3];
        assert!((rate - 1.0 / 3.0).abs() < 1e-12);
    }
}
