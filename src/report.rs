use std::path::Path;

use anyhow::{Context, Result, anyhow};
use rust_xlsxwriter::{Chart, ChartType, Workbook, Worksheet};
use tracing::{info, warn};

use crate::csv_io::{cell, cell_string, open_reader, parse_f64, parse_i64};
use crate::regression::{BY_POSITION_FILE, CoefficientRow, GlobalScope};

pub const SUMMARY_WORKBOOK: &str = "regression_results_summary.xlsx";

#[derive(Debug, Clone, PartialEq)]
pub struct CoefficientTable {
    pub sheet: String,
    pub title: String,
    pub r2: Option<f64>,
    pub sample_size: Option<i64>,
    pub rows: Vec<CoefficientRow>,
}

#[derive(Debug, Clone, Default)]
pub struct ReportSummary {
    pub sheets: Vec<String>,
    pub missing: Vec<String>,
}

pub fn read_coefficient_table(path: &Path, sheet: &str, title: &str) -> Result<CoefficientTable> {
    let (mut reader, idx) = open_reader(path)?;
    let c_feature = idx.require("feature", path)?;
    let c_coef = idx.require("coefficient", path)?;
    let num = |rec: &csv::StringRecord, name: &str| parse_f64(cell(rec, idx.get(name)));

    let mut table = CoefficientTable {
        sheet: sheet.to_string(),
        title: title.to_string(),
        r2: None,
        sample_size: None,
        rows: Vec::new(),
    };
    for (row, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("{} line {}", path.display(), row + 2))?;
        let Some(feature) = cell_string(&record, Some(c_feature)) else {
            continue;
        };
        table.r2 = table.r2.or(num(&record, "R2"));
        table.sample_size = table
            .sample_size
            .or(parse_i64(cell(&record, idx.get("sample_size"))));
        table.rows.push(CoefficientRow {
            feature,
            coefficient: parse_f64(cell(&record, Some(c_coef))).unwrap_or(f64::NAN),
            std_error: num(&record, "std_error").unwrap_or(f64::NAN),
            t_value: num(&record, "t_value").unwrap_or(f64::NAN),
            p_value: num(&record, "p_value").unwrap_or(f64::NAN),
        });
    }
    Ok(table)
}

/// Collects whichever coefficient tables exist in `dir` and writes the summary
/// workbook. Fails only when none exist.
pub fn write_summary_workbook(dir: &Path, path: &Path) -> Result<ReportSummary> {
    let mut summary = ReportSummary::default();
    let mut tables = Vec::new();
    for scope in GlobalScope::ALL {
        let csv_path = dir.join(scope.file_name());
        if !csv_path.exists() {
            warn!(path = %csv_path.display(), "coefficient table missing");
            summary.missing.push(scope.file_name());
            continue;
        }
        tables.push(read_coefficient_table(
            &csv_path,
            &scope.sheet_name(),
            &scope.title(),
        )?);
    }
    if tables.is_empty() {
        return Err(anyhow!(
            "no coefficient tables found in {} (run the regress stage first)",
            dir.display()
        ));
    }

    let mut workbook = Workbook::new();
    for table in &tables {
        let sheet = workbook.add_worksheet();
        sheet.set_name(&table.sheet)?;
        write_table(sheet, table)?;
        summary.sheets.push(table.sheet.clone());
    }

    let by_position = dir.join(BY_POSITION_FILE);
    if by_position.exists() {
        let rows = read_raw_rows(&by_position)?;
        let sheet = workbook.add_worksheet();
        sheet.set_name("ByPosition")?;
        write_rows(sheet, &rows)?;
        summary.sheets.push("ByPosition".to_string());
    }

    workbook
        .save(path)
        .with_context(|| format!("failed writing workbook to {}", path.display()))?;
    info!(path = %path.display(), sheets = summary.sheets.len(), "summary workbook written");
    Ok(summary)
}

fn write_table(sheet: &mut Worksheet, table: &CoefficientTable) -> Result<()> {
    let header = ["Feature", "Coefficient", "Std Error", "t", "p"];
    for (col, name) in header.iter().enumerate() {
        sheet.write_string(0, col as u16, *name)?;
    }
    for (i, row) in table.rows.iter().enumerate() {
        let r = i as u32 + 1;
        sheet.write_string(r, 0, &row.feature)?;
        for (col, value) in [row.coefficient, row.std_error, row.t_value, row.p_value]
            .into_iter()
            .enumerate()
        {
            if value.is_finite() {
                sheet.write_number(r, col as u16 + 1, value)?;
            }
        }
    }
    if table.rows.is_empty() {
        return Ok(());
    }

    let last = table.rows.len() as u32;
    let mut chart = Chart::new(ChartType::Bar);
    chart
        .add_series()
        .set_categories((table.sheet.as_str(), 1, 0, last, 0))
        .set_values((table.sheet.as_str(), 1, 1, last, 1));
    chart.title().set_name(&chart_title(table));
    chart.legend().set_hidden();
    sheet
        .insert_chart(1, 7, &chart)
        .with_context(|| format!("insert chart into {}", table.sheet))?;
    Ok(())
}

fn chart_title(table: &CoefficientTable) -> String {
    match table.r2 {
        Some(r2) => format!("{} (R² = {r2:.3})", table.title),
        None => table.title.clone(),
    }
}

fn read_raw_rows(path: &Path) -> Result<Vec<Vec<String>>> {
    let (mut reader, idx) = open_reader(path)?;
    let mut rows = vec![idx.names().to_vec()];
    for record in reader.records() {
        let record = record.with_context(|| format!("read {}", path.display()))?;
        rows.push(record.iter().map(|s| s.to_string()).collect());
    }
    Ok(rows)
}

fn write_rows(worksheet: &mut Worksheet, rows: &[Vec<String>]) -> Result<()> {
    for (row_idx, row) in rows.iter().enumerate() {
        for (col_idx, value) in row.iter().enumerate() {
            worksheet
                .write_string(row_idx as u32, col_idx as u16, value)
                .with_context(|| format!("write cell ({row_idx},{col_idx})"))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    const TABLE: &str = "feature,coefficient,std_error,t_value,p_value,R2,sample_size\n\
performance_composite_score,0.41,0.02,20.5,0,0.37,812\n\
age,-0.12,0.03,-4,0.0001,0.37,812\n";

    #[test]
    fn reads_coefficient_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.csv");
        fs::write(&path, TABLE).unwrap();
        let table = read_coefficient_table(&path, "MarketValue", "Market Value").unwrap();
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.r2, Some(0.37));
        assert_eq!(table.sample_size, Some(812));
        assert_eq!(table.rows[1].feature, "age");
        assert!(chart_title(&table).contains("R² = 0.370"));
    }

    #[test]
    fn workbook_uses_tables_present() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(GlobalScope::ALL[0].file_name()), TABLE).unwrap();
        let out = dir.path().join(SUMMARY_WORKBOOK);
        let summary = write_summary_workbook(dir.path(), &out).unwrap();
        assert_eq!(summary.sheets, vec!["MarketValue".to_string()]);
        assert_eq!(summary.missing.len(), 3);
        assert!(fs::metadata(&out).unwrap().len() > 0);
    }

    #[test]
    fn no_tables_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join(SUMMARY_WORKBOOK);
        assert!(write_summary_workbook(dir.path(), &out).is_err());
    }
}
