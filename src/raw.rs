use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{Datelike, NaiveDate};
use tracing::{debug, info};

use crate::csv_io::{
    cell, cell_string, open_reader, parse_f64, parse_i64, parse_year, required_date, required_i64,
};

pub const APPEARANCES_FILE: &str = "Appearances.csv";
pub const VALUATIONS_FILE: &str = "player_valuations.csv";
pub const TRANSFERS_FILE: &str = "transfers.csv";
pub const PLAYERS_FILE: &str = "players.csv";
pub const LINEUPS_FILE: &str = "game_lineups.csv";
pub const EVENTS_FILE: &str = "game_events.csv";
pub const CLUBS_FILE: &str = "clubs.csv";

#[derive(Debug, Clone, PartialEq)]
pub struct Appearance {
    pub player_id: i64,
    pub date: NaiveDate,
    pub player_name: Option<String>,
    pub club_id: Option<i64>,
    pub minutes_played: Option<f64>,
    pub goals: Option<f64>,
    pub assists: Option<f64>,
    pub yellow_cards: Option<f64>,
    pub red_cards: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Valuation {
    pub player_id: i64,
    pub date: NaiveDate,
    pub market_value_in_eur: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transfer {
    pub player_id: i64,
    pub date: NaiveDate,
    pub transfer_fee: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlayerProfile {
    pub player_id: i64,
    pub position: Option<String>,
    pub foot: Option<String>,
    pub height_in_cm: Option<f64>,
    pub country_of_citizenship: Option<String>,
    pub birth_year: Option<i32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineupRole {
    Starting,
    Substitute,
}

impl LineupRole {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "starting_lineup" => Some(Self::Starting),
            "substitutes" => Some(Self::Substitute),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LineupEntry {
    pub player_id: i64,
    pub year: i32,
    pub role: Option<LineupRole>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchEvent {
    pub player_id: i64,
    pub year: i32,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Club {
    pub club_id: i64,
    pub name: Option<String>,
    pub total_market_value: Option<f64>,
    pub domestic_competition_id: Option<String>,
}

/// Every extract the panel builder joins. Lineups and events are optional;
/// without them the corresponding panel columns are not produced.
#[derive(Debug, Clone, Default)]
pub struct RawTables {
    pub appearances: Vec<Appearance>,
    pub valuations: Vec<Valuation>,
    pub transfers: Vec<Transfer>,
    pub players: Vec<PlayerProfile>,
    pub lineups: Option<Vec<LineupEntry>>,
    pub events: Option<Vec<MatchEvent>>,
    pub clubs: Vec<Club>,
}

pub fn load_raw_tables(dir: &Path) -> Result<RawTables> {
    let appearances = load_appearances(&dir.join(APPEARANCES_FILE))?;
    let valuations = load_valuations(&dir.join(VALUATIONS_FILE))?;
    let transfers = load_transfers(&dir.join(TRANSFERS_FILE))?;
    let players = load_players(&dir.join(PLAYERS_FILE))?;
    let clubs = load_clubs(&dir.join(CLUBS_FILE))?;

    let lineups = optional_file(dir, LINEUPS_FILE)
        .map(|p| load_lineups(&p))
        .transpose()?;
    let events = optional_file(dir, EVENTS_FILE)
        .map(|p| load_events(&p))
        .transpose()?;

    info!(
        appearances = appearances.len(),
        valuations = valuations.len(),
        transfers = transfers.len(),
        players = players.len(),
        clubs = clubs.len(),
        lineups = lineups.as_ref().map(|v| v.len()),
        events = events.as_ref().map(|v| v.len()),
        "raw extracts loaded from {}",
        dir.display()
    );

    Ok(RawTables {
        appearances,
        valuations,
        transfers,
        players,
        lineups,
        events,
        clubs,
    })
}

fn optional_file(dir: &Path, name: &str) -> Option<PathBuf> {
    let path = dir.join(name);
    if path.exists() {
        Some(path)
    } else {
        debug!("optional extract {} not found", path.display());
        None
    }
}

pub fn load_appearances(path: &Path) -> Result<Vec<Appearance>> {
    let (mut reader, idx) = open_reader(path)?;
    let c_player = idx.require("player_id", path)?;
    let c_date = idx.require("date", path)?;
    let c_minutes = idx.require("minutes_played", path)?;
    let c_goals = idx.require("goals", path)?;
    let c_assists = idx.require("assists", path)?;
    let c_yellow = idx.get("yellow_cards");
    let c_red = idx.get("red_cards");
    let c_club = idx.get("player_club_id");
    let c_name = idx.get("player_name");

    let mut out = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let line = row + 2;
        let record = record.with_context(|| format!("{} line {line}", path.display()))?;
        out.push(Appearance {
            player_id: required_i64(&record, c_player, "player_id", path, line)?,
            date: required_date(&record, c_date, "date", path, line)?,
            player_name: cell_string(&record, c_name),
            club_id: parse_i64(cell(&record, c_club)),
            minutes_played: parse_f64(cell(&record, Some(c_minutes))),
            goals: parse_f64(cell(&record, Some(c_goals))),
            assists: parse_f64(cell(&record, Some(c_assists))),
            yellow_cards: parse_f64(cell(&record, c_yellow)),
            red_cards: parse_f64(cell(&record, c_red)),
        });
    }
    Ok(out)
}

pub fn load_valuations(path: &Path) -> Result<Vec<Valuation>> {
    let (mut reader, idx) = open_reader(path)?;
    let c_player = idx.require("player_id", path)?;
    let c_date = idx.require("date", path)?;
    let c_value = idx.require("market_value_in_eur", path)?;

    let mut out = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let line = row + 2;
        let record = record.with_context(|| format!("{} line {line}", path.display()))?;
        out.push(Valuation {
            player_id: required_i64(&record, c_player, "player_id", path, line)?,
            date: required_date(&record, c_date, "date", path, line)?,
            market_value_in_eur: parse_f64(cell(&record, Some(c_value))),
        });
    }
    Ok(out)
}

pub fn load_transfers(path: &Path) -> Result<Vec<Transfer>> {
    let (mut reader, idx) = open_reader(path)?;
    let c_player = idx.require("player_id", path)?;
    let c_date = idx.require("transfer_date", path)?;
    let c_fee = idx.require("transfer_fee", path)?;

    let mut out = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let line = row + 2;
        let record = record.with_context(|| format!("{} line {line}", path.display()))?;
        out.push(Transfer {
            player_id: required_i64(&record, c_player, "player_id", path, line)?,
            date: required_date(&record, c_date, "transfer_date", path, line)?,
            transfer_fee: parse_f64(cell(&record, Some(c_fee))),
        });
    }
    Ok(out)
}

pub fn load_players(path: &Path) -> Result<Vec<PlayerProfile>> {
    let (mut reader, idx) = open_reader(path)?;
    let c_player = idx.require("player_id", path)?;
    let c_sub = idx.get("sub_position");
    let c_pos = idx.get("position");
    let c_foot = idx.get("foot");
    let c_height = idx.get("height_in_cm");
    let c_country = idx.get("country_of_citizenship");
    let c_birth = idx.get("date_of_birth");

    let mut out = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let line = row + 2;
        let record = record.with_context(|| format!("{} line {line}", path.display()))?;
        out.push(PlayerProfile {
            player_id: required_i64(&record, c_player, "player_id", path, line)?,
            position: cell_string(&record, c_sub).or_else(|| cell_string(&record, c_pos)),
            foot: cell_string(&record, c_foot),
            height_in_cm: parse_f64(cell(&record, c_height)),
            country_of_citizenship: cell_string(&record, c_country),
            birth_year: cell(&record, c_birth).and_then(parse_year),
        });
    }
    Ok(out)
}

pub fn load_lineups(path: &Path) -> Result<Vec<LineupEntry>> {
    let (mut reader, idx) = open_reader(path)?;
    let c_player = idx.require("player_id", path)?;
    let c_date = idx.require("date", path)?;
    let c_type = idx.require("type", path)?;

    let mut out = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let line = row + 2;
        let record = record.with_context(|| format!("{} line {line}", path.display()))?;
        out.push(LineupEntry {
            player_id: required_i64(&record, c_player, "player_id", path, line)?,
            year: required_date(&record, c_date, "date", path, line)?.year(),
            role: cell(&record, Some(c_type)).and_then(LineupRole::parse),
        });
    }
    Ok(out)
}

pub fn load_events(path: &Path) -> Result<Vec<MatchEvent>> {
    let (mut reader, idx) = open_reader(path)?;
    let c_player = idx.require("player_id", path)?;
    let c_date = idx.require("date", path)?;
    let c_desc = idx.require("description", path)?;

    let mut out = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let line = row + 2;
        let record = record.with_context(|| format!("{} line {line}", path.display()))?;
        // Events without a player (e.g. team-level incidents) carry no panel signal.
        let Some(player_id) = parse_i64(cell(&record, Some(c_player))) else {
            continue;
        };
        out.push(MatchEvent {
            player_id,
            year: required_date(&record, c_date, "date", path, line)?.year(),
            description: cell_string(&record, Some(c_desc)).unwrap_or_default(),
        });
    }
    Ok(out)
}

pub fn load_clubs(path: &Path) -> Result<Vec<Club>> {
    let (mut reader, idx) = open_reader(path)?;
    let c_club = idx.require("club_id", path)?;
    let c_name = idx.get("name");
    let c_total = idx.get("total_market_value");
    let c_comp = idx.get("domestic_competition_id");

    let mut out = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let line = row + 2;
        let record = record.with_context(|| format!("{} line {line}", path.display()))?;
        out.push(Club {
            club_id: required_i64(&record, c_club, "club_id", path, line)?,
            name: cell_string(&record, c_name),
            total_market_value: parse_f64(cell(&record, c_total)),
            domestic_competition_id: cell_string(&record, c_comp),
        });
    }
    Ok(out)
}
