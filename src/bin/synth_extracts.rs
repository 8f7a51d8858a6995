use std::path::PathBuf;

use anyhow::{Context, Result};

use market_panel::config::{DATA_DIR_ENV, dir_from_env};
use market_panel::synth::{SynthConfig, write_synthetic_extracts};

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env");
    tracing_subscriber::fmt().init();

    let defaults = SynthConfig::default();
    let cfg = SynthConfig {
        players: parse_arg("--players")?.unwrap_or(defaults.players),
        years: parse_arg("--years")?.unwrap_or(defaults.years),
        seed: parse_arg("--seed")?.unwrap_or(defaults.seed),
        ..defaults
    };
    let dir = parse_dir_arg()
        .or_else(|| dir_from_env(DATA_DIR_ENV))
        .unwrap_or_else(|| PathBuf::from("data"));

    let summary = write_synthetic_extracts(&dir, &cfg)?;
    println!("synthetic extracts written: {}", dir.display());
    println!("players: {}  clubs: {}", summary.players, summary.clubs);
    println!(
        "appearances: {}  valuations: {}  transfers: {}",
        summary.appearances, summary.valuations, summary.transfers
    );
    println!("lineups: {}  events: {}", summary.lineups, summary.events);
    Ok(())
}

fn arg_value(flag: &str) -> Option<String> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let prefix = format!("{flag}=");
    for (idx, arg) in args.iter().enumerate() {
        if let Some(raw) = arg.strip_prefix(&prefix) {
            return Some(raw.trim().to_string());
        }
        if arg == flag
            && let Some(next) = args.get(idx + 1)
        {
            return Some(next.trim().to_string());
        }
    }
    None
}

fn parse_arg<T>(flag: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    arg_value(flag)
        .map(|raw| raw.parse::<T>().with_context(|| format!("invalid {flag} {raw:?}")))
        .transpose()
}

fn parse_dir_arg() -> Option<PathBuf> {
    arg_value("--out")
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
}
