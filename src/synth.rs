use std::path::Path;

use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::info;

use crate::csv_io::open_writer;
use crate::raw::{
    APPEARANCES_FILE, CLUBS_FILE, EVENTS_FILE, LINEUPS_FILE, PLAYERS_FILE, TRANSFERS_FILE,
    VALUATIONS_FILE,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SynthConfig {
    pub players: usize,
    pub first_year: i32,
    pub years: usize,
    pub clubs: usize,
    pub seed: u64,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            players: 400,
            first_year: 2017,
            years: 5,
            clubs: 16,
            seed: 2024,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SynthSummary {
    pub players: usize,
    pub appearances: usize,
    pub valuations: usize,
    pub transfers: usize,
    pub lineups: usize,
    pub events: usize,
    pub clubs: usize,
}

const POSITIONS: [(&str, &str); 16] = [
    ("Attack", "Centre-Forward"),
    ("Attack", "Left Winger"),
    ("Attack", "Right Winger"),
    ("Attack", "Second Striker"),
    ("Midfield", "Attacking Midfield"),
    ("Midfield", "Central Midfield"),
    ("Midfield", "Defensive Midfield"),
    ("Midfield", "Left Midfield"),
    ("Midfield", "Right Midfield"),
    ("Defender", "Centre-Back"),
    ("Defender", "Left-Back"),
    ("Defender", "Right-Back"),
    ("Defender", "Full-Back"),
    ("Goalkeeper", "Goalkeeper"),
    ("Goalkeeper", "Keeper"),
    ("", ""),
];

const COUNTRIES: [&str; 14] = [
    "France",
    "Germany",
    "Spain",
    "Italy",
    "Brazil",
    "Argentina",
    "England",
    "Portugal",
    "Netherlands",
    "Croatia",
    "Ghana",
    "Japan",
    "Norway",
    "Uruguay",
];

const COMPETITIONS: [&str; 8] = ["GB1", "ES1", "IT1", "L1", "FR1", "NL1", "PO1", "BE1"];

const EVENT_TEXT: [&str; 8] = [
    "Tackle won",
    "Interception",
    "Blocked shot",
    "Clearance, header",
    "Foul",
    "Shot on target",
    "Substitution",
    "Successful tackle and clearance",
];

struct Player {
    id: i64,
    name: String,
    broad: &'static str,
    detailed: &'static str,
    /// Goal threat in [0, 1]; drives goals, assists and market value.
    attack: f64,
    club: i64,
}

pub fn write_synthetic_extracts(dir: &Path, cfg: &SynthConfig) -> Result<SynthSummary> {
    let mut rng = StdRng::seed_from_u64(cfg.seed);
    let mut summary = SynthSummary {
        players: cfg.players,
        clubs: cfg.clubs,
        ..Default::default()
    };

    let clubs = cfg.clubs.max(1);
    let mut w = open_writer(&dir.join(CLUBS_FILE))?;
    w.write_record(["club_id", "name", "domestic_competition_id", "total_market_value"])?;
    for c in 0..clubs {
        let total = rng.gen_range(20..900) as f64 * 1e6;
        w.write_record([
            (c + 1).to_string(),
            format!("Club {}", c + 1),
            COMPETITIONS[c % COMPETITIONS.len()].to_string(),
            total.to_string(),
        ])?;
    }
    w.flush().context("flush clubs")?;

    let mut roster = Vec::with_capacity(cfg.players);
    let mut w = open_writer(&dir.join(PLAYERS_FILE))?;
    w.write_record([
        "player_id",
        "name",
        "position",
        "sub_position",
        "foot",
        "height_in_cm",
        "country_of_citizenship",
        "date_of_birth",
    ])?;
    for i in 0..cfg.players {
        let (broad, detailed) = POSITIONS[i % POSITIONS.len()];
        let attack = match broad {
            "Attack" => rng.gen_range(0.5..1.0),
            "Midfield" => rng.gen_range(0.25..0.7),
            "Defender" => rng.gen_range(0.05..0.3),
            _ => rng.gen_range(0.0..0.05),
        };
        let foot = match rng.gen_range(0..20) {
            0 => "",
            1..=4 => "left",
            5 => "both",
            _ => "right",
        };
        let height = if rng.gen_bool(0.03) {
            String::new()
        } else {
            rng.gen_range(165..200).to_string()
        };
        let birth = format!(
            "{}-{:02}-{:02}",
            rng.gen_range(1984..2003),
            rng.gen_range(1..=12),
            rng.gen_range(1..=28)
        );
        let player = Player {
            id: 1000 + i as i64,
            name: format!("Player {i}"),
            broad,
            detailed,
            attack,
            club: rng.gen_range(1..=clubs as i64),
        };
        w.write_record([
            player.id.to_string(),
            player.name.clone(),
            player.broad.to_string(),
            player.detailed.to_string(),
            foot.to_string(),
            height,
            COUNTRIES[rng.gen_range(0..COUNTRIES.len())].to_string(),
            birth,
        ])?;
        roster.push(player);
    }
    w.flush().context("flush players")?;

    let mut apps = open_writer(&dir.join(APPEARANCES_FILE))?;
    apps.write_record([
        "appearance_id",
        "game_id",
        "player_id",
        "player_club_id",
        "date",
        "player_name",
        "yellow_cards",
        "red_cards",
        "goals",
        "assists",
        "minutes_played",
    ])?;
    let mut lineups = open_writer(&dir.join(LINEUPS_FILE))?;
    lineups.write_record(["game_lineups_id", "date", "game_id", "player_id", "type"])?;
    let mut events = open_writer(&dir.join(EVENTS_FILE))?;
    events.write_record(["game_event_id", "date", "game_id", "player_id", "description"])?;
    let mut valuations = open_writer(&dir.join(VALUATIONS_FILE))?;
    valuations.write_record(["player_id", "date", "market_value_in_eur"])?;
    let mut transfers = open_writer(&dir.join(TRANSFERS_FILE))?;
    transfers.write_record(["player_id", "transfer_date", "from_club_id", "to_club_id", "transfer_fee"])?;

    let mut game_id = 500_000i64;
    for offset in 0..cfg.years {
        let year = cfg.first_year + offset as i32;
        for player in &mut roster {
            if rng.gen_bool(0.3) {
                let to = rng.gen_range(1..=clubs as i64);
                let fee = match rng.gen_range(0..10) {
                    0..=2 => "0".to_string(),
                    3 => String::new(),
                    _ => (rng.gen_range(1..400) as f64 * 1e5 * (0.5 + player.attack)).round().to_string(),
                };
                transfers.write_record([
                    player.id.to_string(),
                    format!("{year}-{:02}-{:02}", rng.gen_range(1..=12), rng.gen_range(1..=28)),
                    player.club.to_string(),
                    to.to_string(),
                    fee,
                ])?;
                summary.transfers += 1;
                player.club = to;
            }

            let games = rng.gen_range(0..=14);
            let mut form = 0.0;
            for _ in 0..games {
                game_id += 1;
                let date = format!("{year}-{:02}-{:02}", rng.gen_range(1..=12), rng.gen_range(1..=28));
                let starter = rng.gen_bool(0.7);
                let minutes = if starter {
                    rng.gen_range(60..=90)
                } else {
                    rng.gen_range(1..=30)
                };
                let chance = player.attack * minutes as f64 / 90.0;
                let goals = u32::from(rng.gen_bool((chance * 0.6).min(0.95)))
                    + u32::from(rng.gen_bool((chance * 0.15).min(0.95)));
                let assists = u32::from(rng.gen_bool((chance * 0.4).min(0.95)));
                form += f64::from(goals + assists);
                // Occasional blank minutes cell, as in the real extract.
                let minutes_cell = if rng.gen_bool(0.005) {
                    String::new()
                } else {
                    minutes.to_string()
                };
                apps.write_record([
                    format!("{game_id}_{}", player.id),
                    game_id.to_string(),
                    player.id.to_string(),
                    player.club.to_string(),
                    date.clone(),
                    player.name.clone(),
                    u32::from(rng.gen_bool(0.12)).to_string(),
                    u32::from(rng.gen_bool(0.01)).to_string(),
                    goals.to_string(),
                    assists.to_string(),
                    minutes_cell,
                ])?;
                summary.appearances += 1;

                let role = if starter { "starting_lineup" } else { "substitutes" };
                lineups.write_record([
                    format!("L{game_id}_{}", player.id),
                    date.clone(),
                    game_id.to_string(),
                    player.id.to_string(),
                    role.to_string(),
                ])?;
                summary.lineups += 1;

                for _ in 0..rng.gen_range(0..3) {
                    events.write_record([
                        format!("E{}", summary.events),
                        date.clone(),
                        game_id.to_string(),
                        player.id.to_string(),
                        EVENT_TEXT[rng.gen_range(0..EVENT_TEXT.len())].to_string(),
                    ])?;
                    summary.events += 1;
                }
            }
            if games > 0 && rng.gen_bool(0.05) {
                events.write_record([
                    format!("E{}", summary.events),
                    format!("{year}-06-01"),
                    game_id.to_string(),
                    String::new(),
                    "Team warning".to_string(),
                ])?;
                summary.events += 1;
            }

            let age_factor = 1.0 + 0.1 * rng.gen_range(-1.0..1.0);
            let base = (13.0 + 2.5 * player.attack + 0.15 * form).exp() * age_factor;
            for _ in 0..rng.gen_range(0..=2) {
                let value = (base * rng.gen_range(0.8..1.2) / 1e4).round() * 1e4;
                valuations.write_record([
                    player.id.to_string(),
                    format!("{year}-{:02}-{:02}", rng.gen_range(1..=12), rng.gen_range(1..=28)),
                    value.to_string(),
                ])?;
                summary.valuations += 1;
            }
        }
    }

    apps.flush().context("flush appearances")?;
    lineups.flush().context("flush lineups")?;
    events.flush().context("flush events")?;
    valuations.flush().context("flush valuations")?;
    transfers.flush().context("flush transfers")?;

    info!(
        players = summary.players,
        appearances = summary.appearances,
        valuations = summary.valuations,
        transfers = summary.transfers,
        seed = cfg.seed,
        "synthetic extracts written to {}",
        dir.display()
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn small() -> SynthConfig {
        SynthConfig {
            players: 40,
            years: 2,
            ..Default::default()
        }
    }

    #[test]
    fn same_seed_same_bytes() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        write_synthetic_extracts(a.path(), &small()).unwrap();
        write_synthetic_extracts(b.path(), &small()).unwrap();
        for name in [APPEARANCES_FILE, VALUATIONS_FILE, TRANSFERS_FILE, EVENTS_FILE] {
            assert_eq!(
                fs::read(a.path().join(name)).unwrap(),
                fs::read(b.path().join(name)).unwrap(),
                "{name} differs"
            );
        }
    }

    #[test]
    fn extracts_load_back() {
        let dir = tempfile::tempdir().unwrap();
        let summary = write_synthetic_extracts(dir.path(), &small()).unwrap();
        let raw = crate::raw::load_raw_tables(dir.path()).unwrap();
        assert_eq!(raw.players.len(), 40);
        assert_eq!(raw.appearances.len(), summary.appearances);
        assert_eq!(raw.lineups.map(|l| l.len()), Some(summary.lineups));
        assert_eq!(raw.clubs.len(), 16);
    }
}
