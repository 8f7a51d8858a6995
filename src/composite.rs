use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use nalgebra::DMatrix;
use tracing::{info, warn};

use crate::config::{PipelineConfig, PositionGroup};
use crate::csv_io::{format_f64, open_writer};
use crate::panel::{Panel, PanelRecord};
use crate::pca::{PcaFit, Standardizer, fit_pca};

pub const PCA_FEATURES: [&str; 10] = [
    "minutes_played",
    "goals",
    "assists",
    "yellow_cards",
    "red_cards",
    "appearances",
    "goals_per_90",
    "assists_per_90",
    "starts",
    "subs",
];

pub const GLOBAL_COMPOSITE_COLUMN: &str = "performance_composite_score";

/// Missing entries count as zero: no record means no performance.
pub fn feature_vector(rec: &PanelRecord) -> [f64; 10] {
    [
        rec.minutes_played,
        rec.goals,
        rec.assists,
        rec.yellow_cards,
        rec.red_cards,
        rec.appearances,
        rec.goals_per_90,
        rec.assists_per_90,
        rec.starts,
        rec.subs,
    ]
    .map(|v| v.unwrap_or(0.0))
}

#[derive(Debug, Clone)]
pub struct PopulationScore {
    pub standardizer: Standardizer,
    pub pca: PcaFit,
    /// Row-major projections, one row per scored record.
    pub projections: DMatrix<f64>,
    pub composite: Vec<f64>,
}

impl PopulationScore {
    pub fn rows(&self) -> usize {
        self.composite.len()
    }

    pub fn component(&self, idx: usize) -> Vec<f64> {
        self.projections.column(idx).iter().copied().collect()
    }
}

/// Standardize, decompose and collapse one population. Scaler and components
/// are fitted on exactly the records passed in.
pub fn score_population(records: &[&PanelRecord], max_components: usize) -> Result<PopulationScore> {
    if records.is_empty() {
        return Err(anyhow!("cannot score an empty population"));
    }
    let flat: Vec<f64> = records.iter().flat_map(|r| feature_vector(r)).collect();
    let x = DMatrix::from_row_slice(records.len(), PCA_FEATURES.len(), &flat);

    let standardizer = Standardizer::fit(&x);
    let scaled = standardizer.transform(&x);
    let pca = fit_pca(&scaled, max_components)?;
    let projections = pca.project(&scaled);

    let composite = (0..projections.nrows())
        .map(|row| {
            pca.explained_variance_ratio
                .iter()
                .enumerate()
                .map(|(k, ratio)| ratio * projections[(row, k)])
                .sum()
        })
        .collect();

    Ok(PopulationScore {
        standardizer,
        pca,
        projections,
        composite,
    })
}

#[derive(Debug, Clone)]
pub struct GroupScore {
    pub group: PositionGroup,
    /// Panel row indices of the group members, in panel order.
    pub rows: Vec<usize>,
    pub score: PopulationScore,
}

#[derive(Debug, Clone)]
pub enum GroupOutcome {
    Scored(GroupScore),
    Skipped { group: String, rows: usize },
}

#[derive(Debug, Clone)]
pub struct ScoringOutput {
    /// Input panel plus the global component and composite columns.
    pub global_panel: Panel,
    /// Global panel plus every scored group's columns.
    pub full_panel: Panel,
    pub global: PopulationScore,
    pub groups: Vec<GroupOutcome>,
}

pub fn global_component_column(idx: usize) -> String {
    if idx == 0 {
        "performance_score".to_string()
    } else {
        format!("performance_score_{}", idx + 1)
    }
}

pub fn score_panel(panel: Panel, cfg: &PipelineConfig) -> Result<ScoringOutput> {
    let all: Vec<&PanelRecord> = panel.records.iter().collect();
    let global = score_population(&all, cfg.max_components).context("score global population")?;
    info!(
        rows = global.rows(),
        ratios = ?rounded(&global.pca.explained_variance_ratio),
        "global PCA complete"
    );

    let mut global_panel = panel;
    for k in 0..global.pca.n_components() {
        let values = global.component(k).into_iter().map(Some).collect();
        global_panel.set_extra_column(&global_component_column(k), values)?;
    }
    let composite = global.composite.iter().copied().map(Some).collect();
    global_panel.set_extra_column(GLOBAL_COMPOSITE_COLUMN, composite)?;

    let mut full_panel = global_panel.clone();
    let mut groups = Vec::with_capacity(cfg.position_groups.len());
    for group in &cfg.position_groups {
        let rows: Vec<usize> = full_panel
            .records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.position.as_deref().is_some_and(|p| group.contains(p)))
            .map(|(i, _)| i)
            .collect();

        if rows.len() < cfg.min_group_rows {
            warn!(
                group = %group.name,
                rows = rows.len(),
                min = cfg.min_group_rows,
                "skipping position group: too few samples"
            );
            groups.push(GroupOutcome::Skipped {
                group: group.name.clone(),
                rows: rows.len(),
            });
            continue;
        }

        let members: Vec<&PanelRecord> = rows.iter().map(|&i| &full_panel.records[i]).collect();
        let score = score_population(&members, cfg.max_components)
            .with_context(|| format!("score position group {}", group.name))?;
        info!(
            group = %group.name,
            rows = rows.len(),
            ratios = ?rounded(&score.pca.explained_variance_ratio),
            "group PCA complete"
        );

        for k in 0..score.pca.n_components() {
            let values = scatter(full_panel.len(), &rows, &score.component(k));
            full_panel.set_extra_column(&group.component_column(k), values)?;
        }
        let values = scatter(full_panel.len(), &rows, &score.composite);
        full_panel.set_extra_column(&group.composite_column(), values)?;

        groups.push(GroupOutcome::Scored(GroupScore {
            group: group.clone(),
            rows,
            score,
        }));
    }

    Ok(ScoringOutput {
        global_panel,
        full_panel,
        global,
        groups,
    })
}

fn scatter(len: usize, rows: &[usize], values: &[f64]) -> Vec<Option<f64>> {
    let mut out = vec![None; len];
    for (&row, &v) in rows.iter().zip(values) {
        out[row] = Some(v);
    }
    out
}

fn rounded(values: &[f64]) -> Vec<f64> {
    values.iter().map(|v| (v * 10_000.0).round() / 10_000.0).collect()
}

/// `{Group}_loadings.csv` (feature x component) and `{Group}_variance.txt`.
pub fn write_group_artifacts(dir: &Path, group: &GroupScore) -> Result<()> {
    let name = &group.group.name;
    write_loadings(&dir.join(format!("{name}_loadings.csv")), &group.score.pca)?;

    let variance_path = dir.join(format!("{name}_variance.txt"));
    fs::write(&variance_path, variance_report(&group.score.pca))
        .with_context(|| format!("write {}", variance_path.display()))?;
    Ok(())
}

pub fn write_loadings(path: &Path, pca: &PcaFit) -> Result<()> {
    let mut writer = open_writer(path)?;
    let mut header = vec![String::new()];
    header.extend((1..=pca.n_components()).map(|k| format!("PC{k}")));
    writer.write_record(&header)?;
    for (f, feature) in PCA_FEATURES.iter().enumerate() {
        let mut row = vec![feature.to_string()];
        row.extend((0..pca.n_components()).map(|k| format_f64(Some(pca.loading(f, k)))));
        writer.write_record(&row)?;
    }
    writer
        .flush()
        .with_context(|| format!("flush {}", path.display()))?;
    Ok(())
}

pub fn variance_report(pca: &PcaFit) -> String {
    let mut out = String::new();
    for (k, ratio) in pca.explained_variance_ratio.iter().enumerate() {
        out.push_str(&format!("PC{}: {ratio:.4}\n", k + 1));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(i: usize, position: &str) -> PanelRecord {
        let minutes = 200.0 + (i * 37 % 900) as f64;
        let goals = (i % 7) as f64;
        PanelRecord {
            player_id: i as i64,
            year: 2020,
            minutes_played: Some(minutes),
            goals: Some(goals),
            assists: Some((i % 5) as f64),
            yellow_cards: Some((i % 3) as f64),
            red_cards: Some(if i % 11 == 0 { 1.0 } else { 0.0 }),
            appearances: Some((3 + i % 20) as f64),
            goals_per_90: Some(goals * 90.0 / minutes),
            assists_per_90: None,
            starts: Some((i % 15) as f64),
            subs: Some((i % 4) as f64),
            position: Some(position.to_string()),
            ..Default::default()
        }
    }

    fn panel_with(counts: &[(&str, usize)]) -> Panel {
        let mut records = Vec::new();
        for (position, n) in counts {
            for _ in 0..*n {
                let i = records.len();
                records.push(member(i, position));
            }
        }
        Panel {
            records,
            has_lineup_counts: true,
            ..Default::default()
        }
    }

    #[test]
    fn composite_is_variance_weighted_projection() {
        let panel = panel_with(&[("Centre-Back", 30)]);
        let refs: Vec<&PanelRecord> = panel.records.iter().collect();
        let score = score_population(&refs, 5).unwrap();
        assert_eq!(score.pca.n_components(), 5);
        for row in 0..score.rows() {
            let expected: f64 = (0..5)
                .map(|k| score.pca.explained_variance_ratio[k] * score.projections[(row, k)])
                .sum();
            assert!((score.composite[row] - expected).abs() < 1e-12);
        }
        let ratios = &score.pca.explained_variance_ratio;
        assert!(ratios.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn group_threshold_is_inclusive_at_fifty() {
        let panel = panel_with(&[("Centre-Forward", 50), ("Goalkeeper", 49), ("Unknown", 5)]);
        let out = score_panel(panel, &PipelineConfig::default()).unwrap();

        let attackers = out
            .full_panel
            .extra_column("Attackers_composite_score")
            .expect("attackers scored");
        assert!(out.full_panel.extra_column("Goalkeepers_composite_score").is_none());
        assert!(out.full_panel.extra_column("Goalkeepers_PC1").is_none());

        for (rec, value) in out.full_panel.records.iter().zip(&attackers.values) {
            let inside = rec.position.as_deref() == Some("Centre-Forward");
            assert_eq!(value.is_some(), inside);
        }
        let skipped: Vec<(&str, usize)> = out
            .groups
            .iter()
            .filter_map(|g| match g {
                GroupOutcome::Skipped { group, rows } => Some((group.as_str(), *rows)),
                GroupOutcome::Scored(_) => None,
            })
            .collect();
        assert!(skipped.contains(&("Goalkeepers", 49)));
        assert!(!skipped.iter().any(|(g, _)| *g == "Attackers"));
    }

    #[test]
    fn global_columns_cover_every_row() {
        let panel = panel_with(&[("Centre-Back", 12), ("Left Winger", 8)]);
        let out = score_panel(panel, &PipelineConfig::default()).unwrap();
        let global = out
            .global_panel
            .extra_column(GLOBAL_COMPOSITE_COLUMN)
            .unwrap();
        assert_eq!(global.values.len(), 20);
        assert!(global.values.iter().all(|v| v.is_some()));
        assert!(out.global_panel.extra_column("performance_score_5").is_some());
        assert!(out.global_panel.extra_column("Defenders_composite_score").is_none());
    }

    #[test]
    fn variance_report_format() {
        let panel = panel_with(&[("Centre-Back", 10)]);
        let refs: Vec<&PanelRecord> = panel.records.iter().collect();
        let score = score_population(&refs, 2).unwrap();
        let report = variance_report(&score.pca);
        let lines: Vec<&str> = report.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("PC1: 0."));
    }
}
