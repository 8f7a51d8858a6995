use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::Level;

use market_panel::composite::GroupOutcome;
use market_panel::config::{DATA_DIR_ENV, OUT_DIR_ENV, dir_from_env, load_pipeline_config};
use market_panel::pipeline::{self, PipelinePaths};
use market_panel::regression::RegressionReport;

#[derive(Debug, Parser)]
#[command(name = "market_panel", about = "Player-year panel, PCA composites and value regressions")]
struct Cli {
    /// Pipeline config JSON (defaults to MARKET_PANEL_CONFIG, then the bundled config)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding the raw CSV extracts
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Directory receiving every stage's artifacts
    #[arg(long, global = true)]
    out_dir: Option<PathBuf>,

    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Join raw extracts into panel_df.csv
    Build,
    /// Apply completeness rules -> panel_df_cleaned.csv
    Clean,
    /// Global and per-position PCA composites
    Score,
    /// Log value / log fee regressions
    Regress,
    /// Summary workbook of the coefficient tables
    Report,
    /// All stages in order
    Run,
    /// Summarize any panel CSV
    Describe { file: PathBuf },
}

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");

    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .init();

    let cfg = load_pipeline_config(cli.config.as_deref())?;
    let paths = PipelinePaths::new(
        cli.data_dir
            .or_else(|| dir_from_env(DATA_DIR_ENV))
            .unwrap_or_else(|| PathBuf::from("data")),
        cli.out_dir
            .or_else(|| dir_from_env(OUT_DIR_ENV))
            .unwrap_or_else(|| PathBuf::from("output")),
    );

    match cli.command {
        Command::Build => {
            let rows = pipeline::run_build(&paths, &cfg)?;
            println!("panel rows: {rows}");
        }
        Command::Clean => {
            let report = pipeline::run_clean(&paths)?;
            println!(
                "rows {} -> {} (dropped {})",
                report.rows_before,
                report.rows_after,
                report.dropped()
            );
        }
        Command::Score => {
            let output = pipeline::run_score(&paths, &cfg)?;
            print_groups(&output.groups);
        }
        Command::Regress => {
            let report = pipeline::run_regress(&paths, &cfg)?;
            print_regressions(&report);
        }
        Command::Report => {
            let summary = pipeline::run_report(&paths)?;
            println!("sheets: {}", summary.sheets.join(", "));
        }
        Command::Run => {
            let summary = pipeline::run_all(&paths, &cfg)?;
            println!("panel rows: {}", summary.panel_rows);
            println!(
                "cleaned rows: {} (dropped {})",
                summary.clean.rows_after,
                summary.clean.dropped()
            );
            print_groups(&summary.scoring.groups);
            print_regressions(&summary.regression);
            println!("sheets: {}", summary.report.sheets.join(", "));
        }
        Command::Describe { file } => {
            print!("{}", pipeline::describe(&file)?);
        }
    }
    Ok(())
}

fn print_groups(groups: &[GroupOutcome]) {
    for outcome in groups {
        match outcome {
            GroupOutcome::Scored(g) => {
                let ratios = g
                    .score
                    .pca
                    .explained_variance_ratio
                    .iter()
                    .map(|r| format!("{r:.3}"))
                    .collect::<Vec<_>>()
                    .join(" ");
                println!("{:<12} rows={:<6} ratios={ratios}", g.group.name, g.rows.len());
            }
            GroupOutcome::Skipped { group, rows } => {
                println!("{group:<12} rows={rows:<6} skipped");
            }
        }
    }
}

fn print_regressions(report: &RegressionReport) {
    for (scope, result) in &report.global {
        println!(
            "{} n={} R2={:.4}",
            scope.title(),
            result.sample_size,
            result.r2
        );
        for row in &result.coefficients {
            println!(
                "  {:<32} {:>10.4}  t={:>8.2}  p={:.4}",
                row.feature, row.coefficient, row.t_value, row.p_value
            );
        }
        if !result.dropped_features.is_empty() {
            println!("  dropped constant: {}", result.dropped_features.join(", "));
        }
    }
    for result in &report.by_position {
        println!(
            "{:<12} n={} R2={:.4} intercept={:.4}",
            result.scope, result.sample_size, result.r2, result.intercept
        );
    }
    if !report.skipped.is_empty() {
        println!("skipped: {}", report.skipped.join(", "));
    }
}
