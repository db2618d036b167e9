//! C10 — Order Engine. Per-order state machine (`in_progress -> ready ->
//! evaluated`), roll locking, outcome-bucket selection, and effect
//! expansion through the formula engine (C6), event service (C7), and
//! ledger (C5).

use crate::config::catalog::Catalog;
use crate::config::model::{BastionConfig, CheckProfile, NpcProgression};
use crate::currency::CurrencyModel;
use crate::events;
use crate::expr::ExprLimits;
use crate::formula;
use crate::ledger::Ledger;
use crate::npc;
use crate::rng::Rng;
use crate::state::{AuditContext, BuildStatusKind, OrderInstance, OrderStatus, RollSource, SessionState};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct StartOrderResult {
    pub success: bool,
    pub message: String,
    pub order_id: Option<String>,
}

/// Spec §4.10 Start: the target facility must be operational, the NPC must
/// be assigned there, free of any active order, and meet `min_npc_level`,
/// and a slot must be free.
pub fn start_order(
    session: &mut SessionState,
    catalog: &Catalog,
    facility_id: &str,
    order_def_id: &str,
    npc_id: &str,
) -> StartOrderResult {
    let Some(def) = catalog.facility(facility_id) else {
        return StartOrderResult { success: false, message: format!("unknown facility '{facility_id}'"), order_id: None };
    };
    let Some(order_def) = def.orders.iter().find(|o| o.id == order_def_id).cloned() else {
        return StartOrderResult { success: false, message: format!("unknown order '{order_def_id}'"), order_id: None };
    };
    let Some(facility) = session.bastion.facilities.iter().find(|f| f.facility_id == facility_id) else {
        return StartOrderResult { success: false, message: format!("facility '{facility_id}' not built"), order_id: None };
    };
    if facility.build_status.status != BuildStatusKind::Operational {
        return StartOrderResult { success: false, message: "facility is not operational".into(), order_id: None };
    }
    if facility.current_orders.len() as u32 >= def.npc_slots {
        return StartOrderResult { success: false, message: "no free NPC slots".into(), order_id: None };
    }
    let Some(npc) = facility.assigned_npcs.iter().find(|n| n.npc_id == npc_id) else {
        return StartOrderResult { success: false, message: format!("npc '{npc_id}' is not assigned to '{facility_id}'"), order_id: None };
    };
    if let Some(min_level) = order_def.min_npc_level {
        if npc.level < min_level {
            return StartOrderResult {
                success: false,
                message: format!("npc level {} below required {min_level}", npc.level),
                order_id: None,
            };
        }
    }
    let npc_level = npc.level;
    let already_busy = session
        .bastion
        .facilities
        .iter()
        .flat_map(|f| f.current_orders.iter())
        .any(|o| o.npc_id == npc_id);
    if already_busy {
        return StartOrderResult { success: false, message: "npc already has an active order".into(), order_id: None };
    }

    let order_id = Uuid::now_v7().to_string();
    let instance = OrderInstance {
        order_id: order_id.clone(),
        order_def_id: order_def_id.to_string(),
        npc_id: npc_id.to_string(),
        npc_level,
        started_turn: session.current_turn,
        duration_turns: order_def.duration_turns,
        progress: 0,
        status: OrderStatus::InProgress,
        roll: None,
        roll_locked: false,
        roll_source: None,
        formula_inputs: HashMap::new(),
        ready_turn: None,
    };
    session
        .bastion
        .facilities
        .iter_mut()
        .find(|f| f.facility_id == facility_id)
        .unwrap()
        .current_orders
        .push(instance);
    log::info!("started order '{order_def_id}' at '{facility_id}' with npc '{npc_id}'");
    StartOrderResult { success: true, message: "order started".into(), order_id: Some(order_id) }
}

#[derive(Debug, Default)]
pub struct SimpleResult {
    pub success: bool,
    pub message: String,
}

pub fn save_formula_inputs(
    session: &mut SessionState,
    facility_id: &str,
    order_id: &str,
    formula_id: &str,
    inputs: HashMap<String, f64>,
) -> SimpleResult {
    let Some(facility) = session.bastion.facilities.iter_mut().find(|f| f.facility_id == facility_id) else {
        return SimpleResult { success: false, message: format!("facility '{facility_id}' not built") };
    };
    let Some(order) = facility.current_orders.iter_mut().find(|o| o.order_id == order_id) else {
        return SimpleResult { success: false, message: format!("order '{order_id}' not found") };
    };
    order.formula_inputs.insert(formula_id.to_string(), inputs);
    SimpleResult { success: true, message: "formula inputs saved".into() }
}

/// Spec §4.10 Lock roll: only when `status = ready` and not already locked.
/// A `check_profile` requires a roll in `[1, sides]` (drawn automatically
/// when `auto = true`); without one the roll stays `null`.
pub fn lock_order_roll(
    session: &mut SessionState,
    catalog: &Catalog,
    config: &BastionConfig,
    facility_id: &str,
    order_id: &str,
    roll: Option<i64>,
    auto: bool,
    rng: &mut dyn Rng,
) -> SimpleResult {
    let Some(facility) = session.bastion.facilities.iter_mut().find(|f| f.facility_id == facility_id) else {
        return SimpleResult { success: false, message: format!("facility '{facility_id}' not built") };
    };
    let Some(order) = facility.current_orders.iter_mut().find(|o| o.order_id == order_id) else {
        return SimpleResult { success: false, message: format!("order '{order_id}' not found") };
    };
    if order.status != OrderStatus::Ready {
        return SimpleResult { success: false, message: "order is not ready".into() };
    }
    if order.roll_locked {
        return SimpleResult { success: false, message: "roll is already locked".into() };
    }

    let profile = catalog
        .order_def(facility_id, &order.order_def_id)
        .and_then(|d| d.outcome.check_profile.as_ref())
        .and_then(|p| config.check_profiles.get(p));

    match profile {
        Some(profile) => {
            let value = if auto {
                rng.roll_die(profile.sides) as i64
            } else {
                match roll {
                    Some(r) if (1..=profile.sides as i64).contains(&r) => r,
                    _ => return SimpleResult { success: false, message: format!("roll must be in [1, {}]", profile.sides) },
                }
            };
            order.roll = Some(value);
            order.roll_locked = true;
            order.roll_source = Some(if auto { RollSource::Auto } else { RollSource::Manual });
        }
        None => {
            order.roll = None;
            order.roll_locked = true;
            order.roll_source = None;
        }
    }
    SimpleResult { success: true, message: "roll locked".into() }
}

fn value_in_set(value: &Option<serde_json::Value>, roll: i64) -> bool {
    match value {
        Some(serde_json::Value::Number(n)) => n.as_i64() == Some(roll),
        Some(serde_json::Value::Array(arr)) => arr.iter().any(|v| v.as_i64() == Some(roll)),
        _ => false,
    }
}

/// Spec §4.10 bucket selection: per-level override merged over `default`,
/// with the level looked up via `npc_progression.level_names` (falling back
/// to apprentice/experienced/master).
fn resolve_bucket(profile: Option<&CheckProfile>, progression: &NpcProgression, npc_level: u8, roll: Option<i64>) -> &'static str {
    let Some(profile) = profile else {
        return "on_success";
    };
    let level_key = progression.level_key(npc_level);
    let merged = match profile.levels.get(&level_key) {
        Some(level) => level.merged_over(&profile.default),
        None => profile.default.clone(),
    };
    let roll = roll.unwrap_or(0);
    if value_in_set(&merged.crit_success, roll) {
        return "on_critical_success";
    }
    if value_in_set(&merged.crit_fail, roll) {
        return "on_critical_failure";
    }
    if roll >= merged.dc.unwrap_or(0) {
        "on_success"
    } else {
        "on_failure"
    }
}

#[derive(Debug, Default)]
pub struct EvaluateResult {
    pub success: bool,
    pub message: String,
    pub bucket: Option<String>,
}

/// Spec §4.10 Evaluate: expands the outcome bucket's effects through the
/// formula engine (trigger expansion), the event service, then the ledger,
/// awards XP, and removes the order instance.
pub fn evaluate_order(
    session: &mut SessionState,
    catalog: &Catalog,
    config: &BastionConfig,
    currency_model: &CurrencyModel,
    facility_id: &str,
    order_id: &str,
    rng: &mut dyn Rng,
) -> EvaluateResult {
    let Some(facility_idx) = session.bastion.facilities.iter().position(|f| f.facility_id == facility_id) else {
        return EvaluateResult { success: false, message: format!("facility '{facility_id}' not built"), bucket: None };
    };
    let Some(order_idx) = session.bastion.facilities[facility_idx]
        .current_orders
        .iter()
        .position(|o| o.order_id == order_id)
    else {
        return EvaluateResult { success: false, message: format!("order '{order_id}' not found"), bucket: None };
    };
    let order = session.bastion.facilities[facility_idx].current_orders[order_idx].clone();
    if order.status != OrderStatus::Ready {
        return EvaluateResult { success: false, message: "order is not ready".into(), bucket: None };
    }
    let Some(order_def) = catalog.order_def(facility_id, &order.order_def_id).cloned() else {
        return EvaluateResult { success: false, message: "unknown order definition".into(), bucket: None };
    };
    if order_def.outcome.check_profile.is_some() && !order.roll_locked {
        return EvaluateResult { success: false, message: "roll must be locked before evaluation".into(), bucket: None };
    }

    let profile = order_def.outcome.check_profile.as_ref().and_then(|p| config.check_profiles.get(p));
    let bucket = resolve_bucket(profile, &config.npc_progression, order.npc_level, order.roll);
    let effects = order_def.outcome.block(bucket).map(|b| b.effects.clone()).unwrap_or_default();

    let limits = ExprLimits {
        dice_max_count: config.internal_settings.dice_max_count,
        dice_max_sides: config.internal_settings.dice_max_sides,
        formula_max_len: config.internal_settings.formula_max_len,
    };

    let mut expanded = Vec::new();
    let mut formula_errors = Vec::new();
    for effect in effects {
        if let Some(formula_id) = effect.trigger.clone() {
            match catalog.formula_index.get(&formula_id) {
                Some(def) => {
                    let inputs = order.formula_inputs.get(&formula_id).cloned().unwrap_or_default();
                    let resolved = formula::resolve(def, &inputs, session, currency_model, &config.check_profiles, &limits, rng);
                    expanded.extend(resolved.effects);
                    formula_errors.extend(resolved.errors);
                }
                None => formula_errors.push(format!("unknown formula '{formula_id}'")),
            }
            let mut residual = effect.clone();
            residual.trigger = None;
            expanded.push(residual);
        } else {
            expanded.push(effect);
        }
    }

    for effect in &expanded {
        if let Some(event_id) = &effect.event {
            events::resolve_event(session, catalog, event_id);
        }
        if let Some(group_ref) = &effect.random_event {
            events::resolve_random_event(session, catalog, group_ref, rng);
        }
    }

    let ledger_result = Ledger::apply_effects(
        session,
        &expanded,
        AuditContext {
            event_type: "order_evaluate".into(),
            source_type: "order".into(),
            source_id: order.order_id.clone(),
            action: bucket.to_string(),
            roll: order.roll,
            result: Some(bucket.to_string()),
        },
        currency_model,
    );

    npc::award_xp(session, &order.npc_id, order.duration_turns, &config.npc_progression);
    session.bastion.facilities[facility_idx].current_orders.remove(order_idx);
    log::info!("evaluated order '{order_id}' at '{facility_id}': {bucket}");

    let mut errors = formula_errors;
    errors.extend(ledger_result.errors);
    EvaluateResult {
        success: errors.is_empty(),
        message: if errors.is_empty() { "evaluated".into() } else { errors.join("; ") },
        bucket: Some(bucket.to_string()),
    }
}

fn ready_order_locations(session: &SessionState) -> Vec<(String, String)> {
    session
        .bastion
        .facilities
        .iter()
        .flat_map(|f| {
            f.current_orders
                .iter()
                .filter(|o| o.status == OrderStatus::Ready)
                .map(move |o| (f.facility_id.clone(), o.order_id.clone()))
        })
        .collect()
}

fn needs_roll(session: &SessionState, catalog: &Catalog, facility_id: &str, order_id: &str) -> bool {
    let Some(facility) = session.bastion.facilities.iter().find(|f| f.facility_id == facility_id) else {
        return false;
    };
    let Some(order) = facility.current_orders.iter().find(|o| o.order_id == order_id) else {
        return false;
    };
    catalog
        .order_def(facility_id, &order.order_def_id)
        .map(|d| d.outcome.check_profile.is_some() && !order.roll_locked)
        .unwrap_or(false)
}

/// Spec §4.10 batch evaluate: skips any ready order still needing a roll.
pub fn evaluate_ready_orders(
    session: &mut SessionState,
    catalog: &Catalog,
    config: &BastionConfig,
    currency_model: &CurrencyModel,
    rng: &mut dyn Rng,
) -> Vec<EvaluateResult> {
    let filtered: Vec<_> = ready_order_locations(session)
        .into_iter()
        .filter(|(f, o)| !needs_roll(session, catalog, f, o))
        .collect();
    filtered
        .into_iter()
        .map(|(facility_id, order_id)| evaluate_order(session, catalog, config, currency_model, &facility_id, &order_id, rng))
        .collect()
}

/// Spec §4.10 batch roll+evaluate: auto-rolls any ready order still missing
/// a roll, then evaluates every ready order.
pub fn roll_and_evaluate_ready_orders(
    session: &mut SessionState,
    catalog: &Catalog,
    config: &BastionConfig,
    currency_model: &CurrencyModel,
    rng: &mut dyn Rng,
) -> Vec<EvaluateResult> {
    let targets = ready_order_locations(session);
    for (facility_id, order_id) in &targets {
        if needs_roll(session, catalog, facility_id, order_id) {
            lock_order_roll(session, catalog, config, facility_id, order_id, None, true, rng);
        }
    }
    targets
        .into_iter()
        .map(|(facility_id, order_id)| evaluate_order(session, catalog, config, currency_model, &facility_id, &order_id, rng))
        .collect()
}
