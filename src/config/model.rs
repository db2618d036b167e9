use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CurrencyConfig {
    pub types: Vec<String>,
    #[serde(default)]
    pub conversion: Vec<ConversionEdgeDef>,
    #[serde(default)]
    pub base: Option<String>,
    #[serde(default)]
    pub hidden: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionEdgeDef {
    pub from: String,
    pub to: String,
    pub rate: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckProfileLevel {
    #[serde(default)]
    pub dc: Option<i64>,
    #[serde(default)]
    pub crit_success: Option<serde_json::Value>,
    #[serde(default)]
    pub crit_fail: Option<serde_json::Value>,
}

impl CheckProfileLevel {
    /// `{**default, **override}` — override wins field-by-field, missing
    /// override fields fall back to default (spec §4.10).
    pub fn merged_over(&self, default: &CheckProfileLevel) -> CheckProfileLevel {
        CheckProfileLevel {
            dc: self.dc.or(default.dc),
            crit_success: self.crit_success.clone().or_else(|| default.crit_success.clone()),
            crit_fail: self.crit_fail.clone().or_else(|| default.crit_fail.clone()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckProfile {
    pub sides: u32,
    pub default: CheckProfileLevel,
    /// Per-level overrides, keyed by level name (`apprentice`, `experienced`,
    /// `master`, ...). Captures every sibling key of `sides`/`default`.
    #[serde(flatten)]
    pub levels: HashMap<String, CheckProfileLevel>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NpcProgression {
    #[serde(default)]
    pub level_names: HashMap<String, String>,
    #[serde(default = "default_apprentice_threshold")]
    pub apprentice_to_experienced: u32,
    #[serde(default = "default_master_threshold")]
    pub experienced_to_master: u32,
    #[serde(default = "default_xp_per_success")]
    pub xp_per_success: u32,
}

fn default_apprentice_threshold() -> u32 {
    100
}
fn default_master_threshold() -> u32 {
    300
}
fn default_xp_per_success() -> u32 {
    10
}

impl NpcProgression {
    /// `1 -> apprentice, 2 -> experienced, 3 -> master` fallback when the
    /// config's `level_names` table doesn't cover a level.
    pub fn level_key(&self, level: u8) -> String {
        if let Some(name) = self.level_names.get(&level.to_string()) {
            return name.clone();
        }
        match level {
            1 => "apprentice",
            2 => "experienced",
            3 => "master",
            _ => "apprentice",
        }
        .to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CostDuration {
    #[serde(default)]
    pub cost: HashMap<String, i64>,
    pub duration_turns: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct InternalSettings {
    #[serde(default = "default_refund_ratio")]
    pub facility_refund_ratio: f64,
    #[serde(default = "default_dice_max_count")]
    pub dice_max_count: u32,
    #[serde(default = "default_dice_max_sides")]
    pub dice_max_sides: u32,
    #[serde(default = "default_formula_max_len")]
    pub formula_max_len: usize,
    #[serde(default)]
    pub audit_log_keep_turns: Option<u32>,
}

fn default_refund_ratio() -> f64 {
    0.3
}
fn default_dice_max_count() -> u32 {
    20
}
fn default_dice_max_sides() -> u32 {
    1000
}
fn default_formula_max_len() -> usize {
    500
}

impl Default for CheckProfileLevel {
    fn default() -> Self {
        CheckProfileLevel {
            dc: None,
            crit_success: None,
            crit_fail: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BastionConfig {
    pub currency: CurrencyConfig,
    #[serde(default)]
    pub check_profiles: HashMap<String, CheckProfile>,
    #[serde(default)]
    pub default_build_costs: HashMap<String, CostDuration>,
    #[serde(default)]
    pub npc_progression: NpcProgression,
    #[serde(default)]
    pub player_classes: Vec<serde_json::Value>,
    #[serde(default)]
    pub internal_settings: InternalSettings,
    /// Legacy/undocumented but real and honored (spec §9): caps how many
    /// facilities one player may own via `set_facility_owner`.
    #[serde(default = "default_owner_limit")]
    pub facility_owner_limit: u32,
}

fn default_owner_limit() -> u32 {
    3
}

/// Allow-listed settings overlay (spec §4.3). Every other key is rejected
/// by the loader.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SettingsOverride {
    #[serde(default)]
    pub currency: Option<SettingsCurrency>,
    #[serde(default)]
    pub default_build_costs: HashMap<String, CostDurationPatch>,
    #[serde(default)]
    pub npc_progression: Option<NpcProgressionPatch>,
    #[serde(default)]
    pub check_profiles: HashMap<String, CheckProfilePatch>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SettingsCurrency {
    #[serde(default)]
    pub conversion: Option<Vec<ConversionEdgeDef>>,
    #[serde(default)]
    pub hidden: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CostDurationPatch {
    #[serde(default)]
    pub cost: Option<HashMap<String, i64>>,
    #[serde(default)]
    pub duration_turns: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NpcProgressionPatch {
    #[serde(default)]
    pub apprentice_to_experienced: Option<u32>,
    #[serde(default)]
    pub experienced_to_master: Option<u32>,
    #[serde(default)]
    pub xp_per_success: Option<u32>,
}

/// Per-level field overrides only — never `sides`, never a way to remove
/// `default` (spec §4.3).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CheckProfilePatch {
    #[serde(default)]
    pub levels: HashMap<String, CheckProfileLevel>,
}
