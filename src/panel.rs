use std::path::Path;

use anyhow::{Context, Result, anyhow};

use crate::csv_io::{
    cell, cell_string, format_f64, format_opt, open_reader, open_writer, parse_f64,
    parse_i64, required_i64,
};

pub const COL_STARTS: &str = "starts";
pub const COL_SUBS: &str = "subs";
pub const COL_DEFENSIVE: &str = "defensive_contributions";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PanelRecord {
    pub player_id: i64,
    pub year: i32,
    pub player_name: Option<String>,
    pub minutes_played: Option<f64>,
    pub goals: Option<f64>,
    pub assists: Option<f64>,
    pub yellow_cards: Option<f64>,
    pub red_cards: Option<f64>,
    pub appearances: Option<f64>,
    pub goals_per_90: Option<f64>,
    pub assists_per_90: Option<f64>,
    pub starts: Option<f64>,
    pub subs: Option<f64>,
    pub defensive_contributions: Option<f64>,
    pub market_value_in_eur: Option<f64>,
    pub transfer_fee: Option<f64>,
    pub position: Option<String>,
    pub foot: Option<String>,
    pub height_in_cm: Option<f64>,
    pub country_of_citizenship: Option<String>,
    pub age: Option<f64>,
    pub club_id: Option<i64>,
    pub club_name: Option<String>,
    pub total_market_value: Option<f64>,
}

impl PanelRecord {
    pub fn key(&self) -> (i64, i32) {
        (self.player_id, self.year)
    }
}

/// Extra numeric column aligned with `Panel::records`.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtraColumn {
    pub name: String,
    pub values: Vec<Option<f64>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Panel {
    pub records: Vec<PanelRecord>,
    pub has_lineup_counts: bool,
    pub has_defensive_counts: bool,
    pub extra: Vec<ExtraColumn>,
}

const BASE_COLUMNS: [&str; 24] = [
    "player_id",
    "year",
    "player_name",
    "minutes_played",
    "goals",
    "assists",
    "yellow_cards",
    "red_cards",
    "appearances",
    "goals_per_90",
    "assists_per_90",
    COL_STARTS,
    COL_SUBS,
    COL_DEFENSIVE,
    "market_value_in_eur",
    "transfer_fee",
    "position",
    "foot",
    "height_in_cm",
    "country_of_citizenship",
    "age",
    "club_id",
    "club_name",
    "total_market_value",
];

impl Panel {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn extra_column(&self, name: &str) -> Option<&ExtraColumn> {
        self.extra.iter().find(|c| c.name == name)
    }

    /// Appends a column, replacing any existing one of the same name so that
    /// re-scoring an already scored panel stays idempotent.
    pub fn set_extra_column(&mut self, name: &str, values: Vec<Option<f64>>) -> Result<()> {
        if values.len() != self.records.len() {
            return Err(anyhow!(
                "column {name} has {} values for {} records",
                values.len(),
                self.records.len()
            ));
        }
        if let Some(existing) = self.extra.iter_mut().find(|c| c.name == name) {
            existing.values = values;
        } else {
            self.extra.push(ExtraColumn {
                name: name.to_string(),
                values,
            });
        }
        Ok(())
    }

    pub fn sort_by_key(&mut self) {
        if self.records.windows(2).all(|w| w[0].key() <= w[1].key()) {
            return;
        }
        let mut order: Vec<usize> = (0..self.records.len()).collect();
        order.sort_by_key(|&i| self.records[i].key());
        self.records = order.iter().map(|&i| self.records[i].clone()).collect();
        for col in &mut self.extra {
            col.values = order.iter().map(|&i| col.values[i]).collect();
        }
    }

    pub fn column_names(&self) -> Vec<String> {
        let mut names: Vec<String> = BASE_COLUMNS
            .iter()
            .filter(|name| self.base_column_present(name))
            .map(|name| name.to_string())
            .collect();
        names.extend(self.extra.iter().map(|c| c.name.clone()));
        names
    }

    fn base_column_present(&self, name: &str) -> bool {
        match name {
            COL_STARTS | COL_SUBS => self.has_lineup_counts,
            COL_DEFENSIVE => self.has_defensive_counts,
            _ => true,
        }
    }
}

pub fn write_panel(panel: &Panel, path: &Path) -> Result<()> {
    let mut writer = open_writer(path)?;
    writer
        .write_record(panel.column_names())
        .with_context(|| format!("write header {}", path.display()))?;

    for (row, rec) in panel.records.iter().enumerate() {
        let mut out: Vec<String> = Vec::with_capacity(BASE_COLUMNS.len() + panel.extra.len());
        out.push(rec.player_id.to_string());
        out.push(rec.year.to_string());
        out.push(rec.player_name.clone().unwrap_or_default());
        out.push(format_f64(rec.minutes_played));
        out.push(format_f64(rec.goals));
        out.push(format_f64(rec.assists));
        out.push(format_f64(rec.yellow_cards));
        out.push(format_f64(rec.red_cards));
        out.push(format_f64(rec.appearances));
        out.push(format_f64(rec.goals_per_90));
        out.push(format_f64(rec.assists_per_90));
        if panel.has_lineup_counts {
            out.push(format_f64(rec.starts));
            out.push(format_f64(rec.subs));
        }
        if panel.has_defensive_counts {
            out.push(format_f64(rec.defensive_contributions));
        }
        out.push(format_f64(rec.market_value_in_eur));
        out.push(format_f64(rec.transfer_fee));
        out.push(rec.position.clone().unwrap_or_default());
        out.push(rec.foot.clone().unwrap_or_default());
        out.push(format_f64(rec.height_in_cm));
        out.push(rec.country_of_citizenship.clone().unwrap_or_default());
        out.push(format_f64(rec.age));
        out.push(format_opt(rec.club_id));
        out.push(rec.club_name.clone().unwrap_or_default());
        out.push(format_f64(rec.total_market_value));
        for col in &panel.extra {
            out.push(format_f64(col.values[row]));
        }
        writer
            .write_record(&out)
            .with_context(|| format!("write row {row} of {}", path.display()))?;
    }
    writer
        .flush()
        .with_context(|| format!("flush {}", path.display()))?;
    Ok(())
}

pub fn read_panel(path: &Path) -> Result<Panel> {
    let (mut reader, idx) = open_reader(path)?;
    let c_player = idx.require("player_id", path)?;
    let c_year = idx.require("year", path)?;
    let extra_names: Vec<(usize, String)> = idx
        .names()
        .iter()
        .enumerate()
        .filter(|(_, name)| !BASE_COLUMNS.contains(&name.as_str()))
        .map(|(i, name)| (i, name.clone()))
        .collect();

    let num = |rec: &csv::StringRecord, name: &str| parse_f64(cell(rec, idx.get(name)));
    let text = |rec: &csv::StringRecord, name: &str| cell_string(rec, idx.get(name));

    let mut panel = Panel {
        records: Vec::new(),
        has_lineup_counts: idx.has(COL_STARTS) || idx.has(COL_SUBS),
        has_defensive_counts: idx.has(COL_DEFENSIVE),
        extra: extra_names
            .iter()
            .map(|(_, name)| ExtraColumn {
                name: name.clone(),
                values: Vec::new(),
            })
            .collect(),
    };

    for (row, record) in reader.records().enumerate() {
        let line = row + 2;
        let record = record.with_context(|| format!("{} line {line}", path.display()))?;
        let year = required_i64(&record, c_year, "year", path, line)?;
        panel.records.push(PanelRecord {
            player_id: required_i64(&record, c_player, "player_id", path, line)?,
            year: i32::try_from(year)
                .with_context(|| format!("{} line {line}: year out of range", path.display()))?,
            player_name: text(&record, "player_name"),
            minutes_played: num(&record, "minutes_played"),
            goals: num(&record, "goals"),
            assists: num(&record, "assists"),
            yellow_cards: num(&record, "yellow_cards"),
            red_cards: num(&record, "red_cards"),
            appearances: num(&record, "appearances"),
            goals_per_90: num(&record, "goals_per_90"),
            assists_per_90: num(&record, "assists_per_90"),
            starts: num(&record, COL_STARTS),
            subs: num(&record, COL_SUBS),
            defensive_contributions: num(&record, COL_DEFENSIVE),
            market_value_in_eur: num(&record, "market_value_in_eur"),
            transfer_fee: num(&record, "transfer_fee"),
            position: text(&record, "position"),
            foot: text(&record, "foot"),
            height_in_cm: num(&record, "height_in_cm"),
            country_of_citizenship: text(&record, "country_of_citizenship"),
            age: num(&record, "age"),
            club_id: parse_i64(cell(&record, idx.get("club_id"))),
            club_name: text(&record, "club_name"),
            total_market_value: num(&record, "total_market_value"),
        });
        for (slot, (col_idx, _)) in extra_names.iter().enumerate() {
            panel.extra[slot]
                .values
                .push(parse_f64(cell(&record, Some(*col_idx))));
        }
    }
    panel.sort_by_key();
    Ok(panel)
}
