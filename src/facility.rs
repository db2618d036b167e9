//! C9 — Facility Lifecycle. Build/upgrade/demolish timers, refund policy,
//! ownership, and the per-facility state classification query.

use crate::config::catalog::Catalog;
use crate::config::model::BastionConfig;
use crate::config::pack::{Effect, FacilityDef};
use crate::currency::CurrencyModel;
use crate::ledger::Ledger;
use crate::state::{
    AuditContext, BuildStatus, BuildStatusKind, FacilityInstance, OrderStatus, SessionState,
};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub enum FacilityState {
    Building,
    Upgrading,
    Ready,
    Busy { remaining_turns: u32 },
    Free,
}

#[derive(Debug, Clone)]
pub struct FacilityStateInfo {
    pub facility_id: String,
    pub state: FacilityState,
    pub slots_total: u32,
    pub slots_used: u32,
}

/// Pure query (spec §4.9): `building`/`upgrading` take priority from
/// `build_status`; otherwise `ready` if any order is ready, else `busy`
/// with the minimum remaining turns across in-progress orders, else `free`.
pub fn classify(instance: &FacilityInstance, catalog: &Catalog) -> FacilityStateInfo {
    let state = match instance.build_status.status {
        BuildStatusKind::Building => FacilityState::Building,
        BuildStatusKind::Upgrading => FacilityState::Upgrading,
        BuildStatusKind::Operational => {
            if instance.current_orders.iter().any(|o| o.status == OrderStatus::Ready) {
                FacilityState::Ready
            } else {
                let min_remaining = instance
                    .current_orders
                    .iter()
                    .filter(|o| o.status == OrderStatus::InProgress)
                    .map(|o| o.duration_turns.saturating_sub(o.progress))
                    .min();
                match min_remaining {
                    Some(remaining_turns) => FacilityState::Busy { remaining_turns },
                    None => FacilityState::Free,
                }
            }
        }
    };
    let slots_total = catalog.facility(&instance.facility_id).map(|d| d.npc_slots).unwrap_or(0);
    FacilityStateInfo {
        facility_id: instance.facility_id.clone(),
        state,
        slots_total,
        slots_used: instance.current_orders.len() as u32,
    }
}

pub fn get_facility_states(session: &SessionState, catalog: &Catalog) -> Vec<FacilityStateInfo> {
    session.bastion.facilities.iter().map(|f| classify(f, catalog)).collect()
}

fn cost_and_duration(def: &FacilityDef, config: &BastionConfig, default_key: &str) -> (HashMap<String, i64>, u32) {
    let fallback = config.default_build_costs.get(default_key);
    let cost = if !def.build.cost.is_empty() {
        def.build.cost.clone()
    } else {
        fallback.map(|c| c.cost.clone()).unwrap_or_default()
    };
    let duration = if def.build.duration_turns > 0 {
        def.build.duration_turns
    } else {
        fallback.map(|c| c.duration_turns).unwrap_or(1)
    };
    (cost, duration)
}

fn base_units(cost: &HashMap<String, i64>, currency_model: &CurrencyModel) -> i64 {
    cost.iter().map(|(c, a)| currency_model.to_base_units(c, *a).unwrap_or(0)).sum()
}

fn debit_effect(cost: &HashMap<String, i64>) -> Effect {
    Effect {
        currency_amounts: cost.iter().map(|(c, a)| (c.clone(), serde_json::json!(-*a))).collect(),
        ..Default::default()
    }
}

#[derive(Debug, Default)]
pub struct BuildResult {
    pub success: bool,
    pub message: String,
    pub requires_confirmation: bool,
    pub projected_treasury_base: Option<i64>,
}

/// Spec §4.9 Build: rejects a duplicate instance, computes cost/duration
/// (pack-declared over the `new_facility` default), and — unless
/// `allow_negative` — returns `requires_confirmation=true` with the
/// projected base rather than going negative.
pub fn build_facility(
    session: &mut SessionState,
    catalog: &Catalog,
    config: &BastionConfig,
    currency_model: &CurrencyModel,
    facility_id: &str,
    allow_negative: bool,
) -> BuildResult {
    if session.bastion.facilities.iter().any(|f| f.facility_id == facility_id) {
        return BuildResult {
            success: false,
            message: format!("facility '{facility_id}' already exists"),
            ..Default::default()
        };
    }
    let Some(def) = catalog.facility(facility_id) else {
        return BuildResult { success: false, message: format!("unknown facility '{facility_id}'"), ..Default::default() };
    };

    let (cost, duration) = cost_and_duration(def, config, "new_facility");
    let projected = session.bastion.treasury_base - base_units(&cost, currency_model);
    if projected < 0 && !allow_negative {
        return BuildResult {
            success: false,
            message: "insufficient funds".into(),
            requires_confirmation: true,
            projected_treasury_base: Some(projected),
        };
    }

    Ledger::apply_effects(
        session,
        &[debit_effect(&cost)],
        AuditContext {
            event_type: "facility_build".into(),
            source_type: "facility".into(),
            source_id: facility_id.to_string(),
            action: "build".into(),
            roll: None,
            result: None,
        },
        currency_model,
    );
    session.bastion.facilities.push(FacilityInstance {
        facility_id: facility_id.to_string(),
        built_turn: None,
        build_status: BuildStatus {
            status: BuildStatusKind::Building,
            started_turn: session.current_turn,
            remaining_turns: Some(duration),
            target_id: None,
        },
        assigned_npcs: Vec::new(),
        current_orders: Vec::new(),
        owner_player_id: None,
        custom_stats: HashMap::new(),
    });
    log::info!("started building '{facility_id}' ({duration} turns)");
    BuildResult { success: true, message: "building started".into(), requires_confirmation: false, projected_treasury_base: Some(projected) }
}

/// Spec §4.9 Upgrade: valid only for an operational instance with no active
/// orders; the target is the unique catalog entry whose `parent` equals the
/// current facility id.
pub fn upgrade_facility(
    session: &mut SessionState,
    catalog: &Catalog,
    config: &BastionConfig,
    currency_model: &CurrencyModel,
    facility_id: &str,
    allow_negative: bool,
) -> BuildResult {
    let Some(instance) = session.bastion.facilities.iter().find(|f| f.facility_id == facility_id) else {
        return BuildResult { success: false, message: format!("facility '{facility_id}' not built"), ..Default::default() };
    };
    if instance.build_status.status != BuildStatusKind::Operational {
        return BuildResult { success: false, message: "facility is not operational".into(), ..Default::default() };
    }
    if !instance.current_orders.is_empty() {
        return BuildResult { success: false, message: "facility has active orders".into(), ..Default::default() };
    }
    let Some(source_def) = catalog.facility(facility_id) else {
        return BuildResult { success: false, message: format!("unknown facility '{facility_id}'"), ..Default::default() };
    };
    let Some(target) = catalog.upgrade_target(facility_id) else {
        return BuildResult { success: false, message: "no unique upgrade target found".into(), ..Default::default() };
    };

    let (cost, duration) = cost_and_duration(target, config, &format!("upgrade_tier_{}", source_def.tier));
    let projected = session.bastion.treasury_base - base_units(&cost, currency_model);
    if projected < 0 && !allow_negative {
        return BuildResult {
            success: false,
            message: "insufficient funds".into(),
            requires_confirmation: true,
            projected_treasury_base: Some(projected),
        };
    }

    let target_id = target.id.clone();
    Ledger::apply_effects(
        session,
        &[debit_effect(&cost)],
        AuditContext {
            event_type: "facility_upgrade".into(),
            source_type: "facility".into(),
            source_id: facility_id.to_string(),
            action: "upgrade".into(),
            roll: None,
            result: None,
        },
        currency_model,
    );
    let instance = session.bastion.facilities.iter_mut().find(|f| f.facility_id == facility_id).unwrap();
    instance.build_status = BuildStatus {
        status: BuildStatusKind::Upgrading,
        started_turn: session.current_turn,
        remaining_turns: Some(duration),
        target_id: Some(target_id),
    };
    log::info!("started upgrading '{facility_id}' ({duration} turns)");
    BuildResult { success: true, message: "upgrade started".into(), requires_confirmation: false, projected_treasury_base: Some(projected) }
}

#[derive(Debug, Default)]
pub struct DemolishResult {
    pub success: bool,
    pub message: String,
    pub refund: HashMap<String, i64>,
    pub cancelled_orders: u32,
}

/// Spec §4.9 Demolish: refunds `floor(chain_cost * refund_ratio)` per
/// currency, where chain cost sums every ancestor tier up to tier 1 (plus
/// an in-progress upgrade target's cost, if any). All assigned NPCs move to
/// the reserve; active orders are dropped and counted.
pub fn demolish_facility(
    session: &mut SessionState,
    catalog: &Catalog,
    config: &BastionConfig,
    currency_model: &CurrencyModel,
    facility_id: &str,
    refund_ratio: f64,
) -> DemolishResult {
    let Some(pos) = session.bastion.facilities.iter().position(|f| f.facility_id == facility_id) else {
        return DemolishResult { success: false, message: format!("facility '{facility_id}' not built"), ..Default::default() };
    };

    let mut total_cost: HashMap<String, i64> = HashMap::new();
    let mut current_id = Some(facility_id.to_string());
    while let Some(id) = current_id {
        let Some(def) = catalog.facility(&id) else { break };
        let (cost, _) = cost_and_duration(def, config, "new_facility");
        for (c, a) in cost {
            *total_cost.entry(c).or_insert(0) += a;
        }
        current_id = def.parent.clone();
    }

    let instance = &session.bastion.facilities[pos];
    if instance.build_status.status == BuildStatusKind::Upgrading {
        if let Some(target_id) = instance.build_status.target_id.clone() {
            if let Some(target_def) = catalog.facility(&target_id) {
                let source_tier = catalog.facility(facility_id).map(|d| d.tier).unwrap_or(1);
                let (cost, _) = cost_and_duration(target_def, config, &format!("upgrade_tier_{source_tier}"));
                for (c, a) in cost {
                    *total_cost.entry(c).or_insert(0) += a;
                }
            }
        }
    }

    let refund: HashMap<String, i64> = total_cost
        .iter()
        .map(|(c, a)| (c.clone(), (*a as f64 * refund_ratio).floor() as i64))
        .collect();
    let cancelled_orders = instance.current_orders.len() as u32;

    let mut removed = session.bastion.facilities.remove(pos);
    session.bastion.npcs_unassigned.append(&mut removed.assigned_npcs);

    let credit_effect = Effect {
        currency_amounts: refund.iter().map(|(c, a)| (c.clone(), serde_json::json!(*a))).collect(),
        ..Default::default()
    };
    Ledger::apply_effects(
        session,
        &[credit_effect],
        AuditContext {
            event_type: "facility_demolish".into(),
            source_type: "facility".into(),
            source_id: facility_id.to_string(),
            action: "demolish".into(),
            roll: None,
            result: None,
        },
        currency_model,
    );
    log::info!("demolished '{facility_id}', refunded {refund:?}");
    DemolishResult { success: true, message: "demolished".into(), refund, cancelled_orders }
}

#[derive(Debug, Default)]
pub struct OwnerResult {
    pub success: bool,
    pub message: String,
}

/// Advisory ownership tracking (spec §9 Open Question #2): not consulted by
/// `start_order`, but callers that want per-player facility caps can enforce
/// `facility_owner_limit` here.
pub fn set_facility_owner(
    session: &mut SessionState,
    config: &BastionConfig,
    facility_id: &str,
    player_id: Option<String>,
) -> OwnerResult {
    if let Some(pid) = &player_id {
        let owned = session
            .bastion
            .facilities
            .iter()
            .filter(|f| f.owner_player_id.as_deref() == Some(pid.as_str()) && f.facility_id != facility_id)
            .count() as u32;
        if owned >= config.facility_owner_limit {
            return OwnerResult { success: false, message: format!("player '{pid}' already owns the facility limit ({})", config.facility_owner_limit) };
        }
    }
    let Some(instance) = session.bastion.facilities.iter_mut().find(|f| f.facility_id == facility_id) else {
        return OwnerResult { success: false, message: format!("facility '{facility_id}' not built") };
    };
    instance.owner_player_id = player_id;
    OwnerResult { success: true, message: "owner set".into() }
}

#[derive(Debug, Default)]
pub struct AdvanceTurnResult {
    pub success: bool,
    pub message: String,
}

/// Spec §4.9 Advance turn: refused while any order is ready. Otherwise ticks
/// `current_turn`, applies NPC upkeep (C8), promotes expired build/upgrade
/// timers, and advances in-progress order progress.
pub fn advance_turn(
    session: &mut SessionState,
    config: &BastionConfig,
    currency_model: &CurrencyModel,
) -> AdvanceTurnResult {
    let any_ready = session
        .bastion
        .facilities
        .iter()
        .flat_map(|f| f.current_orders.iter())
        .any(|o| o.status == OrderStatus::Ready);
    if any_ready {
        return AdvanceTurnResult { success: false, message: "cannot advance turn: an order is ready for evaluation".into() };
    }

    session.current_turn += 1;
    let turn = session.current_turn;

    crate::npc::apply_upkeep(session, currency_model);

    for facility in &mut session.bastion.facilities {
        if let Some(remaining) = facility.build_status.remaining_turns.as_mut() {
            *remaining = remaining.saturating_sub(1);
            if *remaining == 0 {
                match facility.build_status.status {
                    BuildStatusKind::Building => {
                        facility.built_turn = Some(turn);
                        facility.build_status = BuildStatus::operational(turn);
                    }
                    BuildStatusKind::Upgrading => {
                        if let Some(target_id) = facility.build_status.target_id.take() {
                            facility.facility_id = target_id;
                        }
                        facility.built_turn = Some(turn);
                        facility.build_status = BuildStatus::operational(turn);
                    }
                    BuildStatusKind::Operational => {}
                }
            }
        }
        for order in &mut facility.current_orders {
            if order.status == OrderStatus::InProgress {
                order.progress += 1;
                if order.progress >= order.duration_turns {
                    order.status = OrderStatus::Ready;
                    order.ready_turn = Some(turn);
                }
            }
        }
    }

    Ledger::trim_audit_log(session, config.internal_settings.audit_log_keep_turns);
    log::info!("advanced to turn {turn}");
    AdvanceTurnResult { success: true, message: format!("advanced to turn {turn}") }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::pack::{BuildDef, FacilityDef};

    fn catalog_with_tavern() -> Catalog {
        let mut catalog = Catalog::default();
        catalog.facilities.insert(
            "tavern_1".to_string(),
            FacilityDef {
                id: "tavern_1".into(),
                name: "Tavern".into(),
                tier: 1,
                parent: None,
                build: BuildDef { cost: HashMap::from([("gold".to_string(), 1)]), duration_turns: 2 },
                npc_slots: 1,
                npc_allowed_professions: None,
                orders: Vec::new(),
                source_pack: "core".into(),
            },
        );
        catalog
    }

    fn currency_model() -> CurrencyModel {
        crate::currency::build_or_fallback(
            &["copper".into(), "silver".into(), "gold".into()],
            &[
                crate::currency::ConversionEdge { from: "silver".into(), to: "copper".into(), rate: 10 },
                crate::currency::ConversionEdge { from: "gold".into(), to: "silver".into(), rate: 10 },
            ],
            Some("copper"),
        )
    }

    #[test]
    fn scenario_s1_build_and_advance() {
        let mut session = SessionState::default();
        session.bastion.treasury_base = 1000;
        let catalog = catalog_with_tavern();
        let config = BastionConfig::default();
        let model = currency_model();

        let result = build_facility(&mut session, &catalog, &config, &model, "tavern_1", false);
        assert!(result.success);
        assert_eq!(session.bastion.treasury_base, 0);
        assert_eq!(session.bastion.facilities[0].build_status.status, BuildStatusKind::Building);

        advance_turn(&mut session, &config, &model);
        advance_turn(&mut session, &config, &model);
        assert_eq!(session.current_turn, 2);
        assert_eq!(session.bastion.facilities[0].build_status.status, BuildStatusKind::Operational);
        assert_eq!(session.bastion.facilities[0].built_turn, Some(2));
    }

    #[test]
    fn scenario_s5_insufficient_funds_requires_confirmation() {
        let mut session = SessionState::default();
        session.bastion.treasury_base = 0;
        let catalog = catalog_with_tavern();
        let config = BastionConfig::default();
        let model = currency_model();

        let rejected = build_facility(&mut session, &catalog, &config, &model, "tavern_1", false);
        assert!(!rejected.success);
        assert!(rejected.requires_confirmation);
        assert!(rejected.projected_treasury_base.unwrap() < 0);
        assert!(session.bastion.facilities.is_empty());

        let accepted = build_facility(&mut session, &catalog, &config, &model, "tavern_1", true);
        assert!(accepted.success);
        assert!(session.bastion.treasury_base < 0);
    }

    #[test]
    fn advance_turn_refused_while_order_ready() {
        let mut session = SessionState::default();
        let config = BastionConfig::default();
        let model = currency_model();
        session.bastion.facilities.push(FacilityInstance {
            facility_id: "tavern_1".into(),
            built_turn: Some(0),
            build_status: BuildStatus::operational(0),
            assigned_npcs: Vec::new(),
            current_orders: vec![crate::state::OrderInstance {
                order_id: "o1".into(),
                order_def_id: "brew".into(),
                npc_id: "n1".into(),
                npc_level: 1,
                started_turn: 0,
                duration_turns: 1,
                progress: 1,
                status: OrderStatus::Ready,
                roll: None,
                roll_locked: false,
                roll_source: None,
                formula_inputs: HashMap::new(),
                ready_turn: Some(0),
            }],
            owner_player_id: None,
            custom_stats: HashMap::new(),
        });
        let result = advance_turn(&mut session, &config, &model);
        assert!(!result.success);
        assert_eq!(session.current_turn, 0);
    }
}
