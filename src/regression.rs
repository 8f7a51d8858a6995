use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::composite::GLOBAL_COMPOSITE_COLUMN;
use crate::config::{PipelineConfig, PositionGroup};
use crate::csv_io::{format_f64, open_writer};
use crate::ols::{OlsFit, fit_ols, standardize, standardize_columns};
use crate::panel::{Panel, PanelRecord};
use crate::raw::Club;

pub const POSITION_COMPOSITE: &str = "position_composite_score";
pub const BY_POSITION_FILE: &str = "regression_results_market_value_by_position.csv";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    MarketValue,
    TransferFee,
}

impl Target {
    pub fn column(self) -> &'static str {
        match self {
            Target::MarketValue => "market_value_in_eur",
            Target::TransferFee => "transfer_fee",
        }
    }

    fn value(self, rec: &PanelRecord) -> Option<f64> {
        match self {
            Target::MarketValue => rec.market_value_in_eur,
            Target::TransferFee => rec.transfer_fee,
        }
    }

    fn stem(self) -> &'static str {
        match self {
            Target::MarketValue => "market_value",
            Target::TransferFee => "transfer_fee",
        }
    }

    fn label(self) -> &'static str {
        match self {
            Target::MarketValue => "Market Value",
            Target::TransferFee => "Transfer Fee",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobalScope {
    pub target: Target,
    pub with_year: bool,
}

impl GlobalScope {
    pub const ALL: [GlobalScope; 4] = [
        GlobalScope {
            target: Target::MarketValue,
            with_year: false,
        },
        GlobalScope {
            target: Target::MarketValue,
            with_year: true,
        },
        GlobalScope {
            target: Target::TransferFee,
            with_year: false,
        },
        GlobalScope {
            target: Target::TransferFee,
            with_year: true,
        },
    ];

    pub fn file_name(self) -> String {
        let suffix = if self.with_year { "_with_year" } else { "" };
        format!("{}_regression_coefficients{suffix}.csv", self.target.stem())
    }

    pub fn sheet_name(self) -> String {
        let target = match self.target {
            Target::MarketValue => "MarketValue",
            Target::TransferFee => "TransferFee",
        };
        let suffix = if self.with_year { "WithYear" } else { "" };
        format!("{target}{suffix}")
    }

    pub fn title(self) -> String {
        let suffix = if self.with_year { " (with Year)" } else { "" };
        format!("{} Regression Coefficients{suffix}", self.target.label())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CoefficientRow {
    pub feature: String,
    pub coefficient: f64,
    pub std_error: f64,
    pub t_value: f64,
    pub p_value: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegressionResult {
    pub scope: String,
    pub sample_size: usize,
    pub r2: f64,
    pub intercept: f64,
    pub intercept_t_value: f64,
    pub intercept_p_value: f64,
    pub coefficients: Vec<CoefficientRow>,
    pub dropped_features: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RegressionReport {
    pub global: Vec<(GlobalScope, RegressionResult)>,
    pub by_position: Vec<RegressionResult>,
    pub skipped: Vec<String>,
}

/// Row-major feature values with nulls, one row per panel record.
#[derive(Debug, Clone)]
pub struct FeatureTable {
    pub names: Vec<String>,
    pub rows: Vec<Vec<Option<f64>>>,
}

impl FeatureTable {
    fn index(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    pub fn value(&self, row: usize, name: &str) -> Option<f64> {
        self.rows[row][self.index(name)?]
    }
}

/// Composite scores, controls and one-hot dummies for every panel row.
pub fn build_feature_table(panel: &Panel, clubs: &[Club], cfg: &PipelineConfig) -> FeatureTable {
    let competition: HashMap<i64, &str> = clubs
        .iter()
        .filter_map(|c| Some((c.club_id, c.domestic_competition_id.as_deref()?)))
        .collect();
    let global = panel.extra_column(GLOBAL_COMPOSITE_COLUMN);
    let group_cols: Vec<_> = cfg
        .position_groups
        .iter()
        .filter_map(|g| panel.extra_column(&g.composite_column()))
        .collect();

    let foot_levels = dummy_levels(panel.records.iter().map(|r| r.foot.clone()));
    let country_groups: Vec<String> = panel
        .records
        .iter()
        .map(|r| country_group(r, cfg).to_string())
        .collect();
    let country_levels = dummy_levels(country_groups.iter().cloned().map(Some));

    let mut names: Vec<String> = [
        GLOBAL_COMPOSITE_COLUMN,
        POSITION_COMPOSITE,
        "age",
        "height_in_cm",
        "is_big5_league",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    names.extend(foot_levels.iter().map(|l| format!("foot_{l}")));
    names.extend(country_levels.iter().map(|l| format!("country_group_{l}")));
    names.push("year".to_string());

    let rows = panel
        .records
        .iter()
        .enumerate()
        .map(|(i, rec)| {
            let big5 = rec
                .club_id
                .and_then(|id| competition.get(&id))
                .is_some_and(|comp| cfg.is_big5(comp));
            let mut row = vec![
                global.and_then(|c| c.values[i]),
                group_cols.iter().find_map(|c| c.values[i]),
                rec.age,
                rec.height_in_cm,
                Some(if big5 { 1.0 } else { 0.0 }),
            ];
            row.extend(
                foot_levels
                    .iter()
                    .map(|l| Some(indicator(rec.foot.as_deref() == Some(l.as_str())))),
            );
            row.extend(
                country_levels
                    .iter()
                    .map(|l| Some(indicator(country_groups[i] == *l))),
            );
            row.push(Some(rec.year as f64));
            row
        })
        .collect();

    FeatureTable { names, rows }
}

fn country_group<'a>(rec: &PanelRecord, cfg: &'a PipelineConfig) -> &'a str {
    match rec.country_of_citizenship.as_deref() {
        Some(c) if cfg.is_top_country(c) => "Top10",
        _ => "Other",
    }
}

/// Sorted distinct levels minus the first, as drop-first one-hot encoding does.
fn dummy_levels(values: impl Iterator<Item = Option<String>>) -> Vec<String> {
    let levels: BTreeSet<String> = values.flatten().collect();
    levels.into_iter().skip(1).collect()
}

fn indicator(flag: bool) -> f64 {
    if flag { 1.0 } else { 0.0 }
}

pub fn run_regressions(panel: &Panel, clubs: &[Club], cfg: &PipelineConfig) -> RegressionReport {
    let table = build_feature_table(panel, clubs, cfg);
    let mut report = RegressionReport::default();

    for scope in GlobalScope::ALL {
        let features: Vec<&str> = table
            .names
            .iter()
            .map(|s| s.as_str())
            .filter(|n| scope.with_year || *n != "year")
            .collect();
        let name = scope.title();
        match fit_scope(
            &name,
            panel,
            &table,
            &features,
            scope.target,
            cfg.standardize_regressions,
        ) {
            Ok(result) => {
                info!(scope = %name, n = result.sample_size, r2 = result.r2, "regression fitted");
                report.global.push((scope, result));
            }
            Err(err) => {
                warn!(scope = %name, "regression skipped: {err:#}");
                report.skipped.push(name);
            }
        }
    }

    for group in &cfg.position_groups {
        match fit_position_group(panel, &table, group) {
            Ok(result) => {
                info!(
                    group = %group.name,
                    n = result.sample_size,
                    r2 = result.r2,
                    "position regression fitted"
                );
                report.by_position.push(result);
            }
            Err(err) => {
                warn!(group = %group.name, "position regression skipped: {err:#}");
                report.skipped.push(group.name.clone());
            }
        }
    }

    report
}

fn fit_position_group(
    panel: &Panel,
    table: &FeatureTable,
    group: &PositionGroup,
) -> Result<RegressionResult> {
    let column = group.composite_column();
    let scores = panel
        .extra_column(&column)
        .with_context(|| format!("no {column} column (group not scored)"))?;

    let mut x = Vec::new();
    let mut y = Vec::new();
    for (i, rec) in panel.records.iter().enumerate() {
        if !rec.position.as_deref().is_some_and(|p| group.contains(p)) {
            continue;
        }
        let (Some(global), Some(own), Some(target)) = (
            table.value(i, GLOBAL_COMPOSITE_COLUMN),
            scores.values[i],
            positive(Target::MarketValue.value(rec)),
        ) else {
            continue;
        };
        x.push(vec![global, own]);
        y.push(target.ln());
    }

    let fit = fit_ols(&x, &y).with_context(|| format!("fit {}", group.name))?;
    Ok(result_from_fit(
        &group.name,
        &[GLOBAL_COMPOSITE_COLUMN.to_string(), column],
        &fit,
        Vec::new(),
    ))
}

fn fit_scope(
    name: &str,
    panel: &Panel,
    table: &FeatureTable,
    features: &[&str],
    target: Target,
    standardized: bool,
) -> Result<RegressionResult> {
    let cols: Vec<usize> = features
        .iter()
        .filter_map(|f| table.index(f))
        .collect();

    let mut x: Vec<Vec<f64>> = Vec::new();
    let mut y: Vec<f64> = Vec::new();
    for (i, rec) in panel.records.iter().enumerate() {
        let Some(t) = positive(target.value(rec)) else {
            continue;
        };
        let values: Option<Vec<f64>> = cols.iter().map(|&c| table.rows[i][c]).collect();
        let Some(values) = values else {
            continue;
        };
        x.push(values);
        y.push(t.ln());
    }

    let (kept, dropped) = split_constant_columns(&x, &cols);
    if !dropped.is_empty() {
        warn!(scope = %name, ?dropped, "dropping constant features");
    }
    let x: Vec<Vec<f64>> = x
        .iter()
        .map(|r| kept.iter().map(|&k| r[k]).collect())
        .collect();
    let (x, y) = if standardized {
        (standardize_columns(&x), standardize(&y))
    } else {
        (x, y)
    };

    let kept_names: Vec<String> = kept.iter().map(|&k| table.names[cols[k]].clone()).collect();
    let dropped_names: Vec<String> = dropped.iter().map(|&k| table.names[cols[k]].clone()).collect();
    let fit = fit_ols(&x, &y).with_context(|| format!("fit {name}"))?;
    Ok(result_from_fit(name, &kept_names, &fit, dropped_names))
}

/// Strictly positive targets only: log of zero or a negative value is invalid.
fn positive(value: Option<f64>) -> Option<f64> {
    value.filter(|v| *v > 0.0)
}

/// Splits positions (into `cols`) into varying and constant columns of `x`.
fn split_constant_columns(x: &[Vec<f64>], cols: &[usize]) -> (Vec<usize>, Vec<usize>) {
    let mut kept = Vec::new();
    let mut dropped = Vec::new();
    for k in 0..cols.len() {
        let first = x.first().map(|r| r[k]);
        let constant = match first {
            Some(f) => x.iter().all(|r| r[k] == f),
            None => false,
        };
        if constant {
            dropped.push(k);
        } else {
            kept.push(k);
        }
    }
    (kept, dropped)
}

fn result_from_fit(
    scope: &str,
    names: &[String],
    fit: &OlsFit,
    dropped_features: Vec<String>,
) -> RegressionResult {
    let coefficients = names
        .iter()
        .enumerate()
        .map(|(j, name)| CoefficientRow {
            feature: name.clone(),
            coefficient: fit.coefficients[j],
            std_error: fit.std_errors[j],
            t_value: fit.t_values[j],
            p_value: fit.p_values[j],
        })
        .collect();
    RegressionResult {
        scope: scope.to_string(),
        sample_size: fit.n,
        r2: fit.r2,
        intercept: fit.intercept,
        intercept_t_value: fit.intercept_t_value,
        intercept_p_value: fit.intercept_p_value,
        coefficients,
        dropped_features,
    }
}

pub fn write_coefficients(path: &Path, result: &RegressionResult) -> Result<()> {
    let mut writer = open_writer(path)?;
    writer.write_record([
        "feature",
        "coefficient",
        "std_error",
        "t_value",
        "p_value",
        "R2",
        "sample_size",
    ])?;
    for row in &result.coefficients {
        writer.write_record([
            row.feature.clone(),
            format_f64(Some(row.coefficient)),
            format_f64(Some(row.std_error)),
            format_f64(Some(row.t_value)),
            format_f64(Some(row.p_value)),
            format_f64(Some(result.r2)),
            result.sample_size.to_string(),
        ])?;
    }
    writer
        .flush()
        .with_context(|| format!("flush {}", path.display()))?;
    Ok(())
}

pub fn write_by_position(path: &Path, results: &[RegressionResult]) -> Result<()> {
    let mut writer = open_writer(path)?;
    writer.write_record([
        "position_group",
        "sample_size",
        "r2",
        "intercept",
        "variable",
        "coefficient",
        "t_value",
        "p_value",
    ])?;
    for result in results {
        for row in &result.coefficients {
            writer.write_record([
                result.scope.clone(),
                result.sample_size.to_string(),
                format_f64(Some(result.r2)),
                format_f64(Some(result.intercept)),
                row.feature.clone(),
                format_f64(Some(row.coefficient)),
                format_f64(Some(row.t_value)),
                format_f64(Some(row.p_value)),
            ])?;
        }
    }
    writer
        .flush()
        .with_context(|| format!("flush {}", path.display()))?;
    Ok(())
}
