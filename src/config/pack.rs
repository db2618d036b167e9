use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pack {
    pub pack_id: String,
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub facilities: Vec<FacilityDef>,
    #[serde(default)]
    pub custom_mechanics: Vec<MechanicDef>,
    /// Allow-listed subset (`currency`, `check_profiles`, `player_classes`)
    /// merged in by the loader; anything else is ignored with a warning.
    #[serde(default)]
    pub config: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FacilityDef {
    pub id: String,
    pub name: String,
    pub tier: u32,
    #[serde(default)]
    pub parent: Option<String>,
    pub build: BuildDef,
    #[serde(default)]
    pub npc_slots: u32,
    #[serde(default)]
    pub npc_allowed_professions: Option<Vec<String>>,
    #[serde(default)]
    pub orders: Vec<OrderDef>,
    /// The pack this entry was loaded from, recorded for diagnostics.
    #[serde(default)]
    pub source_pack: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildDef {
    #[serde(default)]
    pub cost: HashMap<String, i64>,
    pub duration_turns: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderDef {
    pub id: String,
    pub name: String,
    pub duration_turns: u32,
    #[serde(default)]
    pub min_npc_level: Option<u8>,
    pub outcome: OutcomeDef,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OutcomeDef {
    #[serde(default)]
    pub check_profile: Option<String>,
    #[serde(default)]
    pub on_success: Option<OutcomeBlock>,
    #[serde(default)]
    pub on_failure: Option<OutcomeBlock>,
    #[serde(default)]
    pub on_critical_success: Option<OutcomeBlock>,
    #[serde(default)]
    pub on_critical_failure: Option<OutcomeBlock>,
}

impl OutcomeDef {
    pub fn block(&self, bucket: &str) -> Option<&OutcomeBlock> {
        match bucket {
            "on_success" => self.on_success.as_ref(),
            "on_failure" => self.on_failure.as_ref(),
            "on_critical_success" => self
                .on_critical_success
                .as_ref()
                .or(self.on_success.as_ref()),
            "on_critical_failure" => self
                .on_critical_failure
                .as_ref()
                .or(self.on_failure.as_ref()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OutcomeBlock {
    #[serde(default)]
    pub effects: Vec<Effect>,
}

/// An effect is tagged by which optional fields are present, not an
/// exclusive union — a single object may mix currency deltas with a log
/// message, per spec §3 (see SPEC_FULL.md §A for why this is a struct of
/// `Option`s rather than an enum).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Effect {
    #[serde(default)]
    pub item: Option<String>,
    #[serde(default)]
    pub qty: Option<i64>,
    #[serde(default)]
    pub stat: Option<String>,
    #[serde(default)]
    pub delta: Option<i64>,
    #[serde(default)]
    pub log: Option<String>,
    #[serde(default)]
    pub event: Option<String>,
    #[serde(default)]
    pub random_event: Option<String>,
    #[serde(default)]
    pub trigger: Option<String>,
    /// `{currency: "gold", amount: 5}` shorthand form.
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub amount: Option<i64>,
    /// Long-form currency keys (`{"gold": 5, "silver": -1}`) land here —
    /// everything not matched by a named field above.
    #[serde(flatten)]
    pub currency_amounts: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormulaInput {
    pub name: String,
    pub source: String,
    #[serde(default)]
    pub default: Option<serde_json::Value>,
    #[serde(default)]
    pub check_profile: Option<String>,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub value: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionClause {
    #[serde(rename = "if")]
    pub cond: Option<String>,
    #[serde(default)]
    pub then: Option<serde_json::Value>,
    #[serde(default)]
    pub then_formula: Option<String>,
    #[serde(default, rename = "else")]
    pub else_: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Calculation {
    Conditions {
        name: String,
        conditions: Vec<ConditionClause>,
    },
    Formula {
        name: String,
        formula: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormulaDef {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub inputs: Vec<FormulaInput>,
    #[serde(default)]
    pub calculations: Vec<Calculation>,
    #[serde(default)]
    pub effects: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventDef {
    pub id: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventGroupMember {
    pub event_id: String,
    #[serde(default)]
    pub weight: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MechanicDef {
    #[serde(rename = "event_table")]
    EventTable {
        #[serde(default)]
        events: Vec<EventDef>,
        #[serde(default)]
        groups: HashMap<String, Vec<EventGroupMember>>,
    },
    #[serde(rename = "formula_engine")]
    FormulaEngine(Box<FormulaDef>),
    #[serde(rename = "stat_counter")]
    StatCounter {
        key: String,
        name: String,
        #[serde(default)]
        min: Option<i64>,
        #[serde(default)]
        max: Option<i64>,
        #[serde(default)]
        initial: i64,
    },
    /// Recognized but inert: no runtime behavior is defined for this
    /// mechanic anywhere in the source material (SPEC_FULL.md §C.4).
    #[serde(rename = "market_tracker")]
    MarketTracker(serde_json::Value),
}
