use tracing::info;

use crate::panel::Panel;

pub const UNKNOWN_POSITION: &str = "Unknown";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanReport {
    pub rows_before: usize,
    pub rows_after: usize,
    pub cards_filled: usize,
    pub counts_filled: usize,
    pub positions_filled: usize,
}

impl CleanReport {
    pub fn dropped(&self) -> usize {
        self.rows_before - self.rows_after
    }
}

/// Drops rows lacking minutes, goals or assists and fills the optional fields.
/// Market value and transfer fee are left untouched: empty means "no known value".
pub fn clean_panel(mut panel: Panel) -> (Panel, CleanReport) {
    let mut report = CleanReport {
        rows_before: panel.len(),
        ..Default::default()
    };

    let keep: Vec<bool> = panel
        .records
        .iter()
        .map(|r| r.minutes_played.is_some() && r.goals.is_some() && r.assists.is_some())
        .collect();
    if keep.iter().any(|k| !k) {
        let mut mask = keep.iter();
        panel.records.retain(|_| *mask.next().unwrap_or(&true));
        for col in &mut panel.extra {
            let mut mask = keep.iter();
            col.values.retain(|_| *mask.next().unwrap_or(&true));
        }
    }

    let lineups = panel.has_lineup_counts;
    let defensive = panel.has_defensive_counts;
    for rec in &mut panel.records {
        report.cards_filled += fill_zero(&mut rec.yellow_cards) + fill_zero(&mut rec.red_cards);
        if lineups {
            report.counts_filled += fill_zero(&mut rec.starts) + fill_zero(&mut rec.subs);
        }
        if defensive {
            report.counts_filled += fill_zero(&mut rec.defensive_contributions);
        }
        if rec.position.is_none() {
            rec.position = Some(UNKNOWN_POSITION.to_string());
            report.positions_filled += 1;
        }
    }

    report.rows_after = panel.len();
    info!(
        dropped = report.dropped(),
        rows = report.rows_after,
        cards_filled = report.cards_filled,
        counts_filled = report.counts_filled,
        positions_filled = report.positions_filled,
        "panel cleaned"
    );
    (panel, report)
}

fn fill_zero(slot: &mut Option<f64>) -> usize {
    if slot.is_none() {
        *slot = Some(0.0);
        1
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::panel::PanelRecord;

    fn rec(player_id: i64, minutes: Option<f64>) -> PanelRecord {
        PanelRecord {
            player_id,
            year: 2020,
            minutes_played: minutes,
            goals: Some(0.0),
            assists: Some(0.0),
            market_value_in_eur: if player_id % 2 == 0 { Some(1e6) } else { None },
            ..Default::default()
        }
    }

    #[test]
    fn drops_incomplete_rows_and_fills_defaults() {
        let mut panel = Panel {
            records: vec![rec(1, Some(90.0)), rec(2, None), rec(3, Some(10.0))],
            has_lineup_counts: true,
            has_defensive_counts: false,
            extra: Vec::new(),
        };
        panel
            .set_extra_column("x", vec![Some(1.0), Some(2.0), Some(3.0)])
            .unwrap();

        let (cleaned, report) = clean_panel(panel);
        assert_eq!(report.dropped(), 1);
        assert_eq!(cleaned.len(), 2);
        assert_eq!(cleaned.extra[0].values, vec![Some(1.0), Some(3.0)]);
        for r in &cleaned.records {
            assert_eq!(r.yellow_cards, Some(0.0));
            assert_eq!(r.starts, Some(0.0));
            assert_eq!(r.defensive_contributions, None);
            assert_eq!(r.position.as_deref(), Some(UNKNOWN_POSITION));
        }
    }

    #[test]
    fn valuations_are_never_imputed() {
        let panel = Panel {
            records: (1..=6).map(|i| rec(i, Some(90.0))).collect(),
            ..Default::default()
        };
        let nulls_before = panel
            .records
            .iter()
            .filter(|r| r.market_value_in_eur.is_none())
            .count();
        let (cleaned, _) = clean_panel(panel);
        let nulls_after = cleaned
            .records
            .iter()
            .filter(|r| r.market_value_in_eur.is_none())
            .count();
        assert_eq!(nulls_before, nulls_after);
        assert!(cleaned.records.iter().all(|r| r.transfer_fee.is_none()));
    }
}
