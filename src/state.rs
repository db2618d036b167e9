//! Session State (spec §3) — the single persisted aggregate produced and
//! consumed by the Session Manager (C11) and mutated only by the Ledger,
//! NPC Service, Facility Lifecycle, and Order Engine.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SessionState {
    pub session_id: String,
    pub session_name: String,
    #[serde(default = "default_dm_name")]
    pub dm_name: String,
    pub created: String,
    pub last_modified: String,
    #[serde(default)]
    pub current_turn: u32,
    pub bastion: Bastion,
    #[serde(default)]
    pub players: Vec<serde_json::Value>,
    #[serde(default)]
    pub loaded_packs: Vec<String>,
    #[serde(default)]
    pub turn_log: Vec<TurnLogEntry>,
    #[serde(default)]
    pub audit_log: Vec<AuditEntry>,
    /// Accepts the legacy misspelled/mis-cased wire names on read; always
    /// written back out under the canonical name. See SPEC_FULL.md §D.4.
    #[serde(default, alias = "EventHistory", alias = "Eventhsitory")]
    pub event_history: Vec<EventHistoryEntry>,
    #[serde(rename = "_session_filename", skip_serializing_if = "Option::is_none")]
    pub session_filename: Option<String>,
}

fn default_dm_name() -> String {
    "DM".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Bastion {
    pub name: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub description: String,
    /// The sole authoritative balance, in base-currency units. `treasury`
    /// (per-currency breakdown) is never stored — it is a display
    /// projection computed on demand from the currency model.
    #[serde(default)]
    pub treasury_base: i64,
    #[serde(default)]
    pub inventory: Vec<InventoryItem>,
    #[serde(default)]
    pub stats: HashMap<String, i64>,
    #[serde(default)]
    pub stats_registry: HashMap<String, StatDescriptor>,
    #[serde(default)]
    pub facilities: Vec<FacilityInstance>,
    #[serde(default)]
    pub npcs_unassigned: Vec<Npc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InventoryItem {
    pub item: String,
    pub qty: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StatDescriptor {
    pub name: String,
    #[serde(default)]
    pub min: Option<i64>,
    #[serde(default)]
    pub max: Option<i64>,
    #[serde(default)]
    pub source_pack: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BuildStatusKind {
    Building,
    Upgrading,
    Operational,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildStatus {
    pub status: BuildStatusKind,
    pub started_turn: u32,
    #[serde(default)]
    pub remaining_turns: Option<u32>,
    #[serde(default)]
    pub target_id: Option<String>,
}

impl BuildStatus {
    pub fn operational(started_turn: u32) -> Self {
        Self {
            status: BuildStatusKind::Operational,
            started_turn,
            remaining_turns: None,
            target_id: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FacilityInstance {
    pub facility_id: String,
    #[serde(default)]
    pub built_turn: Option<u32>,
    pub build_status: BuildStatus,
    #[serde(default)]
    pub assigned_npcs: Vec<Npc>,
    #[serde(default)]
    pub current_orders: Vec<OrderInstance>,
    #[serde(default)]
    pub owner_player_id: Option<String>,
    #[serde(default)]
    pub custom_stats: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    InProgress,
    Ready,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RollSource {
    Manual,
    Auto,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderInstance {
    pub order_id: String,
    pub order_def_id: String,
    pub npc_id: String,
    pub npc_level: u8,
    pub started_turn: u32,
    pub duration_turns: u32,
    #[serde(default)]
    pub progress: u32,
    pub status: OrderStatus,
    #[serde(default)]
    pub roll: Option<i64>,
    #[serde(default)]
    pub roll_locked: bool,
    #[serde(default)]
    pub roll_source: Option<RollSource>,
    #[serde(default)]
    pub formula_inputs: HashMap<String, HashMap<String, f64>>,
    #[serde(default)]
    pub ready_turn: Option<u32>,
}

impl OrderInstance {
    pub fn refresh_status(&mut self) {
        if self.progress >= self.duration_turns {
            self.status = OrderStatus::Ready;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Npc {
    pub npc_id: String,
    pub name: String,
    pub profession: String,
    pub level: u8,
    #[serde(default)]
    pub xp: u32,
    #[serde(default)]
    pub upkeep: HashMap<String, u32>,
    pub hired_turn: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub turn: u32,
    pub event_type: String,
    pub source_type: String,
    pub source_id: String,
    pub action: String,
    #[serde(default)]
    pub roll: Option<i64>,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub changes: String,
    #[serde(default)]
    pub log_text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnLogEntry {
    pub turn: u32,
    #[serde(default)]
    pub facility_id: Option<String>,
    pub message: String,
    #[serde(rename = "type", default)]
    pub log_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventHistoryEntry {
    pub turn: u32,
    pub event_id: String,
    pub text: String,
}

/// Context carried into [`crate::ledger::Ledger::apply_effects`] so it can
/// emit exactly one audit entry per call (spec §4.5 step 4).
#[derive(Debug, Clone)]
pub struct AuditContext {
    pub event_type: String,
    pub source_type: String,
    pub source_id: String,
    pub action: String,
    pub roll: Option<i64>,
    pub result: Option<String>,
}
