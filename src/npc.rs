//! C8 — NPC Service. Hire/move/fire, slot and profession checks, per-turn
//! upkeep, and XP/level progression.

use crate::config::catalog::Catalog;
use crate::config::model::NpcProgression;
use crate::currency::CurrencyModel;
use crate::ledger::Ledger;
use crate::rng::Rng;
use crate::state::{AuditContext, FacilityInstance, Npc, SessionState};
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct HireResult {
    pub success: bool,
    pub message: String,
    pub npc_id: Option<String>,
}

#[derive(Debug, Default)]
pub struct MoveResult {
    pub success: bool,
    pub message: String,
    pub cancelled_orders: u32,
}

#[derive(Debug, Default)]
pub struct FireResult {
    pub success: bool,
    pub message: String,
}

fn slugify(name: &str) -> String {
    let mut out = String::new();
    let mut last_was_dash = true;
    for c in name.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c);
            last_was_dash = false;
        } else if !last_was_dash {
            out.push('-');
            last_was_dash = true;
        }
    }
    let trimmed = out.trim_end_matches('-');
    if trimmed.is_empty() { "npc".to_string() } else { trimmed.to_string() }
}

fn all_npc_ids(session: &SessionState) -> impl Iterator<Item = &str> {
    session
        .bastion
        .npcs_unassigned
        .iter()
        .chain(session.bastion.facilities.iter().flat_map(|f| f.assigned_npcs.iter()))
        .map(|n| n.npc_id.as_str())
}

fn generate_npc_id(session: &SessionState, name: &str, rng: &mut dyn Rng) -> String {
    let base = slugify(name);
    loop {
        let suffix = rng.uniform(0xffff) as u32;
        let candidate = format!("{base}-{suffix:04x}");
        if !all_npc_ids(session).any(|id| id == candidate) {
            return candidate;
        }
    }
}

/// Any facility whose `current_orders` references `npc_id`.
fn active_order_count(session: &SessionState, npc_id: &str) -> u32 {
    session
        .bastion
        .facilities
        .iter()
        .flat_map(|f| f.current_orders.iter())
        .filter(|o| o.npc_id == npc_id)
        .count() as u32
}

fn find_facility_mut<'a>(session: &'a mut SessionState, facility_id: &str) -> Option<&'a mut FacilityInstance> {
    session.bastion.facilities.iter_mut().find(|f| f.facility_id == facility_id)
}

/// Removes the NPC from wherever it currently lives (reserve or a facility's
/// roster) and returns it.
fn extract_npc(session: &mut SessionState, npc_id: &str) -> Option<Npc> {
    if let Some(pos) = session.bastion.npcs_unassigned.iter().position(|n| n.npc_id == npc_id) {
        return Some(session.bastion.npcs_unassigned.remove(pos));
    }
    for facility in &mut session.bastion.facilities {
        if let Some(pos) = facility.assigned_npcs.iter().position(|n| n.npc_id == npc_id) {
            return Some(facility.assigned_npcs.remove(pos));
        }
    }
    None
}

#[allow(clippy::too_many_arguments)]
pub fn hire_npc(
    session: &mut SessionState,
    catalog: &Catalog,
    rng: &mut dyn Rng,
    currency_types: &[String],
    name: &str,
    profession: &str,
    level: u8,
    upkeep: HashMap<String, u32>,
    facility_id: Option<&str>,
) -> HireResult {
    if name.trim().is_empty() {
        return HireResult { success: false, message: "name is required".into(), npc_id: None };
    }
    if profession.trim().is_empty() {
        return HireResult { success: false, message: "profession is required".into(), npc_id: None };
    }
    if !(1..=3).contains(&level) {
        return HireResult { success: false, message: "level must be 1, 2, or 3".into(), npc_id: None };
    }
    for currency in upkeep.keys() {
        if !currency_types.iter().any(|t| t == currency) {
            return HireResult {
                success: false,
                message: format!("unknown upkeep currency '{currency}'"),
                npc_id: None,
            };
        }
    }

    if let Some(facility_id) = facility_id {
        let Some(def) = catalog.facility(facility_id) else {
            return HireResult { success: false, message: format!("unknown facility '{facility_id}'"), npc_id: None };
        };
        let Some(instance) = session.bastion.facilities.iter().find(|f| f.facility_id == facility_id) else {
            return HireResult { success: false, message: format!("facility '{facility_id}' not built"), npc_id: None };
        };
        if instance.assigned_npcs.len() as u32 >= def.npc_slots {
            return HireResult { success: false, message: "facility has no free NPC slots".into(), npc_id: None };
        }
        if let Some(allowed) = &def.npc_allowed_professions {
            if !allowed.iter().any(|p| p == profession) {
                return HireResult {
                    success: false,
                    message: format!("profession '{profession}' not allowed at '{facility_id}'"),
                    npc_id: None,
                };
            }
        }
    }

    let npc_id = generate_npc_id(session, name, rng);
    let npc = Npc {
        npc_id: npc_id.clone(),
        name: name.to_string(),
        profession: profession.to_string(),
        level,
        xp: 0,
        upkeep,
        hired_turn: session.current_turn,
    };
    match facility_id.and_then(|id| find_facility_mut(session, id)) {
        Some(facility) => facility.assigned_npcs.push(npc),
        None => session.bastion.npcs_unassigned.push(npc),
    }
    log::info!("hired npc '{npc_id}' ({profession}, level {level})");
    HireResult { success: true, message: "hired".into(), npc_id: Some(npc_id) }
}

pub fn move_npc(
    session: &mut SessionState,
    catalog: &Catalog,
    npc_id: &str,
    target_facility_id: Option<&str>,
    force: bool,
) -> MoveResult {
    if find_npc(session, npc_id).is_none() {
        return MoveResult { success: false, message: format!("unknown npc '{npc_id}'"), cancelled_orders: 0 };
    }

    let active = active_order_count(session, npc_id);
    if active > 0 && !force {
        return MoveResult {
            success: false,
            message: "npc has an active order; pass force to move anyway".into(),
            cancelled_orders: 0,
        };
    }

    let mut cancelled = 0u32;
    if active > 0 {
        for facility in &mut session.bastion.facilities {
            let before = facility.current_orders.len();
            facility.current_orders.retain(|o| o.npc_id != npc_id);
            cancelled += (before - facility.current_orders.len()) as u32;
        }
    }

    let npc = match extract_npc(session, npc_id) {
        Some(n) => n,
        None => {
            return MoveResult { success: false, message: "npc vanished mid-move".into(), cancelled_orders: cancelled };
        }
    };

    match target_facility_id {
        None => {
            session.bastion.npcs_unassigned.push(npc);
            MoveResult { success: true, message: "moved to reserve".into(), cancelled_orders: cancelled }
        }
        Some(facility_id) => {
            let Some(def) = catalog.facility(facility_id) else {
                session.bastion.npcs_unassigned.push(npc);
                return MoveResult { success: false, message: format!("unknown facility '{facility_id}'"), cancelled_orders: cancelled };
            };
            let Some(instance) = session.bastion.facilities.iter().find(|f| f.facility_id == facility_id) else {
                session.bastion.npcs_unassigned.push(npc);
                return MoveResult { success: false, message: format!("facility '{facility_id}' not built"), cancelled_orders: cancelled };
            };
            if instance.assigned_npcs.len() as u32 >= def.npc_slots {
                session.bastion.npcs_unassigned.push(npc);
                return MoveResult { success: false, message: "facility has no free NPC slots".into(), cancelled_orders: cancelled };
            }
            let mut message = "moved".to_string();
            if let Some(allowed) = &def.npc_allowed_professions {
                if !allowed.iter().any(|p| p == &npc.profession) {
                    message = format!("warning: profession '{}' not normally allowed here", npc.profession);
                }
            }
            find_facility_mut(session, facility_id).unwrap().assigned_npcs.push(npc);
            MoveResult { success: true, message, cancelled_orders: cancelled }
        }
    }
}

pub fn fire_npc(session: &mut SessionState, npc_id: &str) -> FireResult {
    if active_order_count(session, npc_id) > 0 {
        return FireResult { success: false, message: "npc has an active order and cannot be fired".into() };
    }
    match extract_npc(session, npc_id) {
        Some(_) => {
            log::info!("fired npc '{npc_id}'");
            FireResult { success: true, message: "fired".into() }
        }
        None => FireResult { success: false, message: format!("unknown npc '{npc_id}'") },
    }
}

/// Runs once per [`crate::facility::advance_turn`] (spec §4.8): every NPC
/// with a positive upkeep entry is debited through the ledger, each in its
/// own `apply_effects` call so each NPC gets its own audit entry.
pub fn apply_upkeep(session: &mut SessionState, currency_model: &CurrencyModel) {
    let npc_ids: Vec<(String, HashMap<String, u32>)> = session
        .bastion
        .npcs_unassigned
        .iter()
        .chain(session.bastion.facilities.iter().flat_map(|f| f.assigned_npcs.iter()))
        .map(|n| (n.npc_id.clone(), n.upkeep.clone()))
        .collect();

    for (npc_id, upkeep) in npc_ids {
        let effect_amounts: HashMap<String, serde_json::Value> = upkeep
            .iter()
            .filter(|(_, v)| **v > 0)
            .map(|(c, v)| (c.clone(), serde_json::json!(-(*v as i64))))
            .collect();
        if effect_amounts.is_empty() {
            continue;
        }
        let effect = crate::config::pack::Effect { currency_amounts: effect_amounts, ..Default::default() };
        Ledger::apply_effects(
            session,
            &[effect],
            AuditContext {
                event_type: "npc_upkeep".to_string(),
                source_type: "npc".to_string(),
                source_id: npc_id,
                action: "upkeep".to_string(),
                roll: None,
                result: None,
            },
            currency_model,
        );
    }
}

fn find_npc<'a>(session: &'a SessionState, npc_id: &str) -> Option<&'a Npc> {
    session
        .bastion
        .npcs_unassigned
        .iter()
        .chain(session.bastion.facilities.iter().flat_map(|f| f.assigned_npcs.iter()))
        .find(|n| n.npc_id == npc_id)
}

fn find_npc_mut<'a>(session: &'a mut SessionState, npc_id: &str) -> Option<&'a mut Npc> {
    if let Some(n) = session.bastion.npcs_unassigned.iter_mut().find(|n| n.npc_id == npc_id) {
        return Some(n);
    }
    session
        .bastion
        .facilities
        .iter_mut()
        .flat_map(|f| f.assigned_npcs.iter_mut())
        .find(|n| n.npc_id == npc_id)
}

/// Awards `xp_per_success * duration_turns` XP to the acting NPC on any
/// successfully evaluated order (spec §4.8). Level never decreases.
pub fn award_xp(session: &mut SessionState, npc_id: &str, duration_turns: u32, progression: &NpcProgression) {
    let Some(npc) = find_npc_mut(session, npc_id) else {
        return;
    };
    npc.xp += progression.xp_per_success * duration_turns;
    if npc.level == 1 && npc.xp >= progression.apprentice_to_experienced {
        npc.level = 2;
    }
    if npc.level == 2 && npc.xp >= progression.experienced_to_master {
        npc.level = 3;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::SmallRngSource;

    #[test]
    fn hire_assigns_unique_id_and_reserve_slot() {
        let mut session = SessionState::default();
        let catalog = Catalog::default();
        let mut rng = SmallRngSource::seeded(42);
        let result = hire_npc(
            &mut session,
            &catalog,
            &mut rng,
            &["gold".to_string()],
            "Bram the Brewer",
            "brewer",
            1,
            HashMap::from([("gold".to_string(), 1u32)]),
            None,
        );
        assert!(result.success);
        assert_eq!(session.bastion.npcs_unassigned.len(), 1);
        assert!(result.npc_id.unwrap().starts_with("bram-the-brewer-"));
    }

    #[test]
    fn fire_blocked_while_order_active() {
        let mut session = SessionState::default();
        session.bastion.npcs_unassigned.push(Npc {
            npc_id: "n1".into(),
            name: "N".into(),
            profession: "p".into(),
            level: 1,
            xp: 0,
            upkeep: HashMap::new(),
            hired_turn: 0,
        });
        let mut facility = sample_facility();
        facility.current_orders.push(sample_order("n1"));
        session.bastion.facilities.push(facility);

        let result = fire_npc(&mut session, "n1");
        assert!(!result.success);
    }

    #[test]
    fn apply_upkeep_debits_all_npcs() {
        let mut session = SessionState::default();
        for i in 0..2 {
            session.bastion.npcs_unassigned.push(Npc {
                npc_id: format!("n{i}"),
                name: "N".into(),
                profession: "p".into(),
                level: 1,
                xp: 0,
                upkeep: HashMap::from([("gold".to_string(), 1u32)]),
                hired_turn: 0,
            });
        }
        session.bastion.treasury_base = 1000;
        let currency_model = crate::currency::build_or_fallback(&["gold".into(), "copper".into()], &[
            crate::currency::ConversionEdge { from: "gold".into(), to: "copper".into(), rate: 10 },
        ], Some("copper"));
        apply_upkeep(&mut session, &currency_model);
        assert_eq!(session.bastion.treasury_base, 1000 - 20);
        assert_eq!(session.audit_log.len(), 2);
    }

    fn sample_facility() -> FacilityInstance {
        FacilityInstance {
            facility_id: "tavern".into(),
            built_turn: Some(0),
            build_status: crate::state::BuildStatus::operational(0),
            assigned_npcs: Vec::new(),
            current_orders: Vec::new(),
            owner_player_id: None,
            custom_stats: HashMap::new(),
        }
    }

    fn sample_order(npc_id: &str) -> crate::state::OrderInstance {
        crate::state::OrderInstance {
            order_id: "o1".into(),
            order_def_id: "brew".into(),
            npc_id: npc_id.into(),
            npc_level: 1,
            started_turn: 0,
            duration_turns: 2,
            progress: 0,
            status: crate::state::OrderStatus::InProgress,
            roll: None,
            roll_locked: false,
            roll_source: None,
            formula_inputs: HashMap::new(),
            ready_turn: None,
        }
    }
}
