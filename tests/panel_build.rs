use std::fs;
use std::path::PathBuf;

use market_panel::builder::build_panel;
use market_panel::cleaner::{UNKNOWN_POSITION, clean_panel};
use market_panel::config::{PipelineConfig, TransferFeePolicy};
use market_panel::panel::{COL_DEFENSIVE, COL_STARTS, PanelRecord, read_panel, write_panel};
use market_panel::raw::{EVENTS_FILE, LINEUPS_FILE, load_raw_tables};

fn fixture_dir() -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push("raw");
    path
}

fn row(records: &[PanelRecord], player_id: i64, year: i32) -> &PanelRecord {
    records
        .iter()
        .find(|r| r.key() == (player_id, year))
        .expect("player-year present")
}

#[test]
fn builds_one_row_per_player_year() {
    let raw = load_raw_tables(&fixture_dir()).expect("fixtures load");
    let panel = build_panel(&raw, &PipelineConfig::default());
    let keys: Vec<_> = panel.records.iter().map(|r| r.key()).collect();
    assert_eq!(keys, vec![(10, 2020), (10, 2021), (20, 2020), (30, 2021)]);
    assert!(panel.has_lineup_counts);
    assert!(panel.has_defensive_counts);
}

#[test]
fn aggregates_and_rates() {
    let raw = load_raw_tables(&fixture_dir()).expect("fixtures load");
    let panel = build_panel(&raw, &PipelineConfig::default());

    let ana = row(&panel.records, 10, 2020);
    assert_eq!(ana.player_name.as_deref(), Some("Ana"));
    assert_eq!(ana.minutes_played, Some(450.0));
    assert_eq!(ana.goals, Some(5.0));
    assert_eq!(ana.goals_per_90, Some(1.0));
    assert_eq!(ana.assists_per_90, Some(0.4));
    assert_eq!(ana.yellow_cards, Some(1.0));
    assert_eq!(ana.appearances, Some(5.0));

    let idle = row(&panel.records, 10, 2021);
    assert_eq!(idle.minutes_played, Some(0.0));
    assert_eq!(idle.goals_per_90, None);
    assert_eq!(idle.assists_per_90, None);

    let ben = row(&panel.records, 20, 2020);
    assert_eq!(ben.goals_per_90, Some(1.0));
    assert_eq!(ben.red_cards, Some(1.0));
}

#[test]
fn joins_valuation_transfer_and_profile() {
    let raw = load_raw_tables(&fixture_dir()).expect("fixtures load");
    let panel = build_panel(&raw, &PipelineConfig::default());

    let ana = row(&panel.records, 10, 2020);
    assert_eq!(ana.market_value_in_eur, Some(2_500_000.0));
    // The later transfer of the year carries no fee and wins.
    assert_eq!(ana.transfer_fee, None);
    assert_eq!(ana.position.as_deref(), Some("Centre-Forward"));
    assert_eq!(ana.age, Some(25.0));
    assert_eq!(ana.club_id, Some(100));
    assert_eq!(ana.club_name.as_deref(), Some("Alpha FC"));
    assert_eq!(ana.total_market_value, Some(500_000_000.0));
    assert_eq!(ana.starts, Some(2.0));
    assert_eq!(ana.subs, Some(1.0));
    assert_eq!(ana.defensive_contributions, Some(2.0));

    let idle = row(&panel.records, 10, 2021);
    assert_eq!(idle.market_value_in_eur, None);
    assert_eq!(idle.age, Some(26.0));
    assert_eq!(idle.starts, Some(0.0));
    assert_eq!(idle.defensive_contributions, Some(1.0));

    let ben = row(&panel.records, 20, 2020);
    assert_eq!(ben.transfer_fee, Some(0.0));
    assert_eq!(ben.position.as_deref(), Some("Defender"));
    assert_eq!(ben.age, Some(30.0));
    assert_eq!(ben.height_in_cm, None);
    // Two clubs, one appearance each: the first seen is kept.
    assert_eq!(ben.club_id, Some(300));
    assert_eq!(ben.total_market_value, None);

    let cy = row(&panel.records, 30, 2021);
    assert_eq!(cy.position, None);
    assert_eq!(cy.foot, None);
}

#[test]
fn largest_fee_policy() {
    let raw = load_raw_tables(&fixture_dir()).expect("fixtures load");
    let cfg = PipelineConfig {
        transfer_fee_policy: TransferFeePolicy::Largest,
        ..PipelineConfig::default()
    };
    let panel = build_panel(&raw, &cfg);
    assert_eq!(row(&panel.records, 10, 2020).transfer_fee, Some(3_000_000.0));
}

#[test]
fn optional_extracts_leave_columns_out() {
    let dir = tempfile::tempdir().expect("tempdir");
    for entry in fs::read_dir(fixture_dir()).expect("fixture dir") {
        let entry = entry.expect("dir entry");
        let name = entry.file_name();
        if name == LINEUPS_FILE || name == EVENTS_FILE {
            continue;
        }
        fs::copy(entry.path(), dir.path().join(&name)).expect("copy fixture");
    }
    let raw = load_raw_tables(dir.path()).expect("extracts load");
    let panel = build_panel(&raw, &PipelineConfig::default());
    assert!(!panel.has_lineup_counts);
    assert!(!panel.has_defensive_counts);

    let out = dir.path().join("panel_df.csv");
    write_panel(&panel, &out).expect("write panel");
    let header = fs::read_to_string(&out).expect("read panel");
    let header = header.lines().next().unwrap_or_default();
    assert!(!header.split(',').any(|c| c == COL_STARTS || c == COL_DEFENSIVE));

    let (cleaned, _) = clean_panel(read_panel(&out).expect("read back"));
    assert!(cleaned.records.iter().all(|r| r.starts.is_none()));
}

#[test]
fn panel_survives_csv_and_cleaning() {
    let raw = load_raw_tables(&fixture_dir()).expect("fixtures load");
    let panel = build_panel(&raw, &PipelineConfig::default());
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("panel_df.csv");
    write_panel(&panel, &path).expect("write panel");

    let back = read_panel(&path).expect("read panel");
    assert_eq!(back, panel);

    let values_before: Vec<_> = back.records.iter().map(|r| r.market_value_in_eur).collect();
    let (cleaned, report) = clean_panel(back);
    assert_eq!(report.dropped(), 0);
    assert_eq!(report.positions_filled, 1);
    let values_after: Vec<_> = cleaned.records.iter().map(|r| r.market_value_in_eur).collect();
    assert_eq!(values_before, values_after);
    assert_eq!(
        row(&cleaned.records, 30, 2021).position.as_deref(),
        Some(UNKNOWN_POSITION)
    );
    assert_eq!(row(&cleaned.records, 30, 2021).yellow_cards, Some(0.0));
}
