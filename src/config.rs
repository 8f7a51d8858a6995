use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

pub const CONFIG_PATH_ENV: &str = "MARKET_PANEL_CONFIG";
pub const DATA_DIR_ENV: &str = "MARKET_PANEL_DATA_DIR";
pub const OUT_DIR_ENV: &str = "MARKET_PANEL_OUT_DIR";

/// How several transfers of one player inside one calendar year collapse into
/// the single `transfer_fee` cell of the panel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferFeePolicy {
    /// Last transfer in file order wins, including an empty fee.
    #[default]
    Last,
    /// Largest known fee of the year.
    Largest,
    /// Sum of known fees of the year.
    Total,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionGroup {
    pub name: String,
    pub positions: Vec<String>,
}

impl PositionGroup {
    pub fn new(name: &str, positions: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            positions: positions.iter().map(|p| p.to_string()).collect(),
        }
    }

    pub fn contains(&self, position: &str) -> bool {
        self.positions.iter().any(|p| p == position)
    }

    pub fn composite_column(&self) -> String {
        format!("{}_composite_score", self.name)
    }

    pub fn component_column(&self, idx: usize) -> String {
        format!("{}_PC{}", self.name, idx + 1)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub defensive_keywords: Vec<String>,
    pub position_groups: Vec<PositionGroup>,
    pub min_group_rows: usize,
    pub max_components: usize,
    #[serde(default)]
    pub transfer_fee_policy: TransferFeePolicy,
    #[serde(default)]
    pub big5_competition_ids: Vec<String>,
    #[serde(default)]
    pub top_countries: Vec<String>,
    #[serde(default = "default_standardize")]
    pub standardize_regressions: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            defensive_keywords: ["tackle", "interception", "block", "clearance"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            position_groups: vec![
                PositionGroup::new(
                    "Attackers",
                    &[
                        "Centre-Forward",
                        "Left Winger",
                        "Right Winger",
                        "Second Striker",
                    ],
                ),
                PositionGroup::new(
                    "Midfielders",
                    &[
                        "Attacking Midfield",
                        "Central Midfield",
                        "Defensive Midfield",
                        "Left Midfield",
                        "Right Midfield",
                    ],
                ),
                PositionGroup::new(
                    "Defenders",
                    &["Centre-Back", "Left-Back", "Right-Back", "Full-Back"],
                ),
                PositionGroup::new("Goalkeepers", &["Goalkeeper", "Keeper"]),
            ],
            min_group_rows: 50,
            max_components: 5,
            transfer_fee_policy: TransferFeePolicy::Last,
            big5_competition_ids: ["GB1", "ES1", "IT1", "L1", "FR1"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            top_countries: [
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
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            standardize_regressions: true,
        }
    }
}

impl PipelineConfig {
    pub fn bundled() -> Result<Self> {
        let raw = include_str!("../assets/pipeline_config.json");
        let cfg = serde_json::from_str::<PipelineConfig>(raw)
            .context("parse bundled pipeline config")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("read pipeline config {}", path.display()))?;
        let cfg = serde_json::from_str::<PipelineConfig>(&raw)
            .with_context(|| format!("parse pipeline config {}", path.display()))?;
        cfg.validate()
            .with_context(|| format!("validate pipeline config {}", path.display()))?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_components == 0 {
            return Err(anyhow!("max_components must be at least 1"));
        }
        if self
            .defensive_keywords
            .iter()
            .all(|k| k.trim().is_empty())
        {
            return Err(anyhow!("defensive_keywords must contain a non-empty keyword"));
        }
        let mut owner: HashMap<&str, &str> = HashMap::new();
        for group in &self.position_groups {
            if group.name.trim().is_empty() {
                return Err(anyhow!("position group with empty name"));
            }
            for position in &group.positions {
                if let Some(prev) = owner.insert(position.as_str(), group.name.as_str()) {
                    return Err(anyhow!(
                        "position {position:?} is listed in both {prev} and {}",
                        group.name
                    ));
                }
            }
        }
        Ok(())
    }

    pub fn is_big5(&self, competition_id: &str) -> bool {
        self.big5_competition_ids
            .iter()
            .any(|id| id == competition_id)
    }

    pub fn is_top_country(&self, country: &str) -> bool {
        self.top_countries.iter().any(|c| c == country)
    }
}

/// Resolves the config: explicit path, then `MARKET_PANEL_CONFIG`, then the
/// bundled asset.
pub fn load_pipeline_config(explicit: Option<&Path>) -> Result<PipelineConfig> {
    if let Some(path) = explicit {
        return PipelineConfig::from_path(path);
    }
    if let Some(path) = config_path_override()
        && path.exists()
    {
        return PipelineConfig::from_path(&path);
    }
    PipelineConfig::bundled()
}

pub fn dir_from_env(key: &str) -> Option<PathBuf> {
    env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
}

fn config_path_override() -> Option<PathBuf> {
    dir_from_env(CONFIG_PATH_ENV)
}

fn default_standardize() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundled_config_matches_default() {
        let bundled = PipelineConfig::bundled().expect("bundled config");
        assert_eq!(bundled, PipelineConfig::default());
    }

    #[test]
    fn duplicate_position_label_is_rejected() {
        let mut cfg = PipelineConfig::default();
        cfg.position_groups[0]
            .positions
            .push("Centre-Back".to_string());
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("Centre-Back"));
    }

    #[test]
    fn group_lookup() {
        let cfg = PipelineConfig::default();
        assert!(cfg.position_groups[3].contains("Keeper"));
        assert!(!cfg.position_groups.iter().any(|g| g.contains("Unknown")));
        assert_eq!(cfg.position_groups[1].composite_column(), "Midfielders_composite_score");
        assert_eq!(cfg.position_groups[2].component_column(0), "Defenders_PC1");
    }

    #[test]
    fn policy_parses_snake_case() {
        let p: TransferFeePolicy = serde_json::from_str("\"largest\"").unwrap();
        assert_eq!(p, TransferFeePolicy::Largest);
    }
}
