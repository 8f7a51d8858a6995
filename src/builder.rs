use std::collections::{BTreeMap, HashMap};

use chrono::Datelike;
use tracing::{debug, info};

use crate::config::{PipelineConfig, TransferFeePolicy};
use crate::panel::{Panel, PanelRecord};
use crate::raw::{
    Appearance, Club, LineupEntry, LineupRole, MatchEvent, PlayerProfile, RawTables, Transfer,
    Valuation,
};

type PlayerYear = (i64, i32);

#[derive(Debug, Default)]
struct AppearanceTotals {
    player_name: Option<String>,
    minutes_played: f64,
    goals: f64,
    assists: f64,
    yellow_cards: f64,
    red_cards: f64,
    appearances: u32,
    clubs: Vec<i64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LineupCounts {
    pub starts: u32,
    pub subs: u32,
}

pub fn build_panel(raw: &RawTables, cfg: &PipelineConfig) -> Panel {
    let totals = aggregate_appearances(&raw.appearances);
    let valuations = latest_valuations(&raw.valuations);
    let transfers = yearly_transfer_fees(&raw.transfers, cfg.transfer_fee_policy);
    let lineups = raw.lineups.as_deref().map(lineup_counts);
    let defensive = raw
        .events
        .as_deref()
        .map(|events| defensive_action_counts(events, &cfg.defensive_keywords));
    let players: HashMap<i64, &PlayerProfile> =
        raw.players.iter().map(|p| (p.player_id, p)).collect();
    let clubs: HashMap<i64, &Club> = raw.clubs.iter().map(|c| (c.club_id, c)).collect();

    let mut records = Vec::with_capacity(totals.len());
    for ((player_id, year), t) in totals {
        let key = (player_id, year);
        let minutes = t.minutes_played;
        let profile = players.get(&player_id).copied();
        let club_id = club_of_record(&t.clubs);
        let club = club_id.and_then(|id| clubs.get(&id).copied());
        let lineup = lineups.as_ref().map(|m| m.get(&key).copied().unwrap_or_default());

        records.push(PanelRecord {
            player_id,
            year,
            player_name: t.player_name,
            minutes_played: Some(minutes),
            goals: Some(t.goals),
            assists: Some(t.assists),
            yellow_cards: Some(t.yellow_cards),
            red_cards: Some(t.red_cards),
            appearances: Some(t.appearances as f64),
            goals_per_90: per_90(t.goals, Some(minutes)),
            assists_per_90: per_90(t.assists, Some(minutes)),
            starts: lineup.map(|l| l.starts as f64),
            subs: lineup.map(|l| l.subs as f64),
            defensive_contributions: defensive
                .as_ref()
                .map(|m| m.get(&key).copied().unwrap_or(0) as f64),
            market_value_in_eur: valuations.get(&key).copied().flatten(),
            transfer_fee: transfers.get(&key).copied().flatten(),
            position: profile.and_then(|p| p.position.clone()),
            foot: profile.and_then(|p| p.foot.clone()),
            height_in_cm: profile.and_then(|p| p.height_in_cm),
            country_of_citizenship: profile.and_then(|p| p.country_of_citizenship.clone()),
            age: profile
                .and_then(|p| p.birth_year)
                .map(|birth| (year - birth) as f64),
            club_id,
            club_name: club.and_then(|c| c.name.clone()),
            total_market_value: club.and_then(|c| c.total_market_value),
        });
    }

    info!(
        rows = records.len(),
        lineups = lineups.is_some(),
        defensive = defensive.is_some(),
        "panel built"
    );

    Panel {
        records,
        has_lineup_counts: lineups.is_some(),
        has_defensive_counts: defensive.is_some(),
        extra: Vec::new(),
    }
}

/// Rate per 90 minutes; undefined when minutes are zero or unknown.
pub fn per_90(count: f64, minutes_played: Option<f64>) -> Option<f64> {
    match minutes_played {
        Some(m) if m != 0.0 => Some(count * 90.0 / m),
        _ => None,
    }
}

fn aggregate_appearances(rows: &[Appearance]) -> BTreeMap<PlayerYear, AppearanceTotals> {
    let mut out: BTreeMap<PlayerYear, AppearanceTotals> = BTreeMap::new();
    for row in rows {
        let t = out.entry((row.player_id, row.date.year())).or_default();
        if t.player_name.is_none() {
            t.player_name = row.player_name.clone();
        }
        t.minutes_played += row.minutes_played.unwrap_or(0.0);
        t.goals += row.goals.unwrap_or(0.0);
        t.assists += row.assists.unwrap_or(0.0);
        t.yellow_cards += row.yellow_cards.unwrap_or(0.0);
        t.red_cards += row.red_cards.unwrap_or(0.0);
        t.appearances += 1;
        if let Some(club) = row.club_id {
            t.clubs.push(club);
        }
    }
    out
}

/// Latest valuation per player-year: stable ascending sort by date, keep last.
pub fn latest_valuations(rows: &[Valuation]) -> BTreeMap<PlayerYear, Option<f64>> {
    let mut sorted: Vec<&Valuation> = rows.iter().collect();
    sorted.sort_by_key(|v| v.date);
    let mut out = BTreeMap::new();
    for v in sorted {
        out.insert((v.player_id, v.date.year()), v.market_value_in_eur);
    }
    out
}

pub fn yearly_transfer_fees(
    rows: &[Transfer],
    policy: TransferFeePolicy,
) -> BTreeMap<PlayerYear, Option<f64>> {
    let mut out: BTreeMap<PlayerYear, Option<f64>> = BTreeMap::new();
    let mut collisions = 0usize;
    for t in rows {
        let key = (t.player_id, t.date.year());
        let Some(prev) = out.get(&key).copied() else {
            out.insert(key, t.transfer_fee);
            continue;
        };
        collisions += 1;
        let merged = match policy {
            TransferFeePolicy::Last => t.transfer_fee,
            TransferFeePolicy::Largest => match (prev, t.transfer_fee) {
                (Some(a), Some(b)) => Some(a.max(b)),
                (a, b) => a.or(b),
            },
            TransferFeePolicy::Total => match (prev, t.transfer_fee) {
                (Some(a), Some(b)) => Some(a + b),
                (a, b) => a.or(b),
            },
        };
        out.insert(key, merged);
    }
    if collisions > 0 {
        debug!(collisions, ?policy, "player-years with several transfers");
    }
    out
}

/// Modal club; ties go to the smallest id, all-unique falls back to the first.
pub fn club_of_record(clubs: &[i64]) -> Option<i64> {
    let first = *clubs.first()?;
    let mut counts: BTreeMap<i64, usize> = BTreeMap::new();
    for club in clubs {
        *counts.entry(*club).or_default() += 1;
    }
    let max = counts.values().copied().max().unwrap_or(0);
    if max <= 1 {
        return Some(first);
    }
    counts
        .into_iter()
        .find(|(_, n)| *n == max)
        .map(|(club, _)| club)
}

pub fn lineup_counts(rows: &[LineupEntry]) -> BTreeMap<PlayerYear, LineupCounts> {
    let mut out: BTreeMap<PlayerYear, LineupCounts> = BTreeMap::new();
    for row in rows {
        let entry = out.entry((row.player_id, row.year)).or_default();
        match row.role {
            Some(LineupRole::Starting) => entry.starts += 1,
            Some(LineupRole::Substitute) => entry.subs += 1,
            None => {}
        }
    }
    out
}

/// Heuristic: an event is defensive when its description contains any keyword.
/// Substring matching accepts collisions such as "block" inside "blocked shot".
pub fn defensive_action_counts(
    rows: &[MatchEvent],
    keywords: &[String],
) -> BTreeMap<PlayerYear, u32> {
    let keywords: Vec<String> = keywords
        .iter()
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .collect();
    let mut out: BTreeMap<PlayerYear, u32> = BTreeMap::new();
    for row in rows {
        if is_defensive_action(&row.description, &keywords) {
            *out.entry((row.player_id, row.year)).or_default() += 1;
        }
    }
    out
}

fn is_defensive_action(description: &str, keywords: &[String]) -> bool {
    let lower = description.to_lowercase();
    keywords.iter().any(|k| lower.contains(k.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn appearance(player_id: i64, day: NaiveDate, minutes: f64, goals: f64) -> Appearance {
        Appearance {
            player_id,
            date: day,
            player_name: Some(format!("p{player_id}")),
            club_id: Some(10),
            minutes_played: Some(minutes),
            goals: Some(goals),
            assists: Some(0.0),
            yellow_cards: None,
            red_cards: Some(1.0),
        }
    }

    #[test]
    fn per_90_exact_and_undefined() {
        assert_eq!(per_90(5.0, Some(450.0)), Some(1.0));
        assert_eq!(per_90(3.0, Some(0.0)), None);
        assert_eq!(per_90(3.0, None), None);
        assert_eq!(per_90(0.0, Some(90.0)), Some(0.0));
    }

    #[test]
    fn appearances_sum_per_player_year() {
        let raw = RawTables {
            appearances: vec![
                appearance(1, date(2020, 3, 1), 90.0, 1.0),
                appearance(1, date(2020, 9, 1), 360.0, 4.0),
                appearance(1, date(2021, 1, 5), 0.0, 0.0),
            ],
            ..Default::default()
        };
        let panel = build_panel(&raw, &PipelineConfig::default());
        assert_eq!(panel.len(), 2);
        let r2020 = &panel.records[0];
        assert_eq!(r2020.key(), (1, 2020));
        assert_eq!(r2020.minutes_played, Some(450.0));
        assert_eq!(r2020.goals_per_90, Some(1.0));
        assert_eq!(r2020.appearances, Some(2.0));
        assert_eq!(r2020.yellow_cards, Some(0.0));
        assert_eq!(r2020.red_cards, Some(2.0));
        assert_eq!(panel.records[1].goals_per_90, None);
        assert!(!panel.has_lineup_counts);
    }

    #[test]
    fn latest_valuation_wins_within_year() {
        let rows = vec![
            Valuation {
                player_id: 1,
                date: date(2020, 12, 1),
                market_value_in_eur: Some(300.0),
            },
            Valuation {
                player_id: 1,
                date: date(2020, 1, 1),
                market_value_in_eur: Some(100.0),
            },
            Valuation {
                player_id: 1,
                date: date(2020, 12, 1),
                market_value_in_eur: Some(350.0),
            },
        ];
        let out = latest_valuations(&rows);
        assert_eq!(out.get(&(1, 2020)), Some(&Some(350.0)));
    }

    #[test]
    fn transfer_policies() {
        let rows = vec![
            Transfer {
                player_id: 7,
                date: date(2019, 1, 30),
                transfer_fee: Some(5.0),
            },
            Transfer {
                player_id: 7,
                date: date(2019, 8, 1),
                transfer_fee: Some(2.0),
            },
        ];
        let get = |p| yearly_transfer_fees(&rows, p).get(&(7, 2019)).copied().flatten();
        assert_eq!(get(TransferFeePolicy::Last), Some(2.0));
        assert_eq!(get(TransferFeePolicy::Largest), Some(5.0));
        assert_eq!(get(TransferFeePolicy::Total), Some(7.0));
    }

    #[test]
    fn club_mode_rules() {
        assert_eq!(club_of_record(&[]), None);
        assert_eq!(club_of_record(&[5, 3, 5]), Some(5));
        assert_eq!(club_of_record(&[9, 3, 7]), Some(9));
        assert_eq!(club_of_record(&[9, 3, 9, 3]), Some(3));
    }

    #[test]
    fn defensive_keywords_are_case_insensitive() {
        let events = vec![
            MatchEvent {
                player_id: 1,
                year: 2020,
                description: "Successful TACKLE in midfield".to_string(),
            },
            MatchEvent {
                player_id: 1,
                year: 2020,
                description: "Header, clearance and block".to_string(),
            },
            MatchEvent {
                player_id: 1,
                year: 2020,
                description: "Goal".to_string(),
            },
        ];
        let kw = PipelineConfig::default().defensive_keywords;
        let out = defensive_action_counts(&events, &kw);
        assert_eq!(out.get(&(1, 2020)), Some(&2));
    }

    #[test]
    fn lineup_roles_counted() {
        let rows = vec![
            LineupEntry {
                player_id: 2,
                year: 2022,
                role: Some(LineupRole::Starting),
            },
            LineupEntry {
                player_id: 2,
                year: 2022,
                role: Some(LineupRole::Substitute),
            },
            LineupEntry {
                player_id: 2,
                year: 2022,
                role: Some(LineupRole::Starting),
            },
        ];
        let out = lineup_counts(&rows);
        assert_eq!(out.get(&(2, 2022)), Some(&LineupCounts { starts: 2, subs: 1 }));
    }
}
