//! Acceptance tests for scenarios S1-S6.

use bastion_engine::config::catalog::Catalog;
use bastion_engine::config::model::{BastionConfig, CheckProfile, CheckProfileLevel, InternalSettings};
use bastion_engine::config::pack::{
    BuildDef, Effect, FacilityDef, OrderDef, OutcomeBlock, OutcomeDef, Pack,
};
use bastion_engine::config::validate::{self, Mode};
use bastion_engine::currency::{self, ConversionEdge};
use bastion_engine::facility;
use bastion_engine::formula;
use bastion_engine::orders;
use bastion_engine::rng::SmallRngSource;
use bastion_engine::state::{
    AuditContext, BuildStatus, BuildStatusKind, FacilityInstance, Npc, OrderStatus, SessionState,
};
use std::collections::HashMap;

fn currency_model() -> currency::CurrencyModel {
    currency::build_or_fallback(
        &["copper".into(), "silver".into(), "gold".into()],
        &[
            ConversionEdge { from: "silver".into(), to: "copper".into(), rate: 10 },
            ConversionEdge { from: "gold".into(), to: "silver".into(), rate: 10 },
        ],
        Some("copper"),
    )
}

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

/// S1: build consumes a one-gold cost (100 copper in base units from a
/// 1000-copper treasury), then the facility becomes operational after two
/// `advance_turn` calls matching its two-turn build duration.
#[test]
fn s1_build_facility_and_advance_to_operational() {
    let mut session = SessionState::default();
    session.bastion.treasury_base = 1000;
    let catalog = catalog_with_tavern();
    let config = BastionConfig::default();
    let model = currency_model();

    let build = facility::build_facility(&mut session, &catalog, &config, &model, "tavern_1", false);
    assert!(build.success);
    assert_eq!(session.bastion.treasury_base, 0);

    facility::advance_turn(&mut session, &config, &model);
    facility::advance_turn(&mut session, &config, &model);

    assert_eq!(session.current_turn, 2);
    let instance = &session.bastion.facilities[0];
    assert_eq!(instance.build_status.status, BuildStatusKind::Operational);
    assert_eq!(instance.built_turn, Some(2));
}

/// S2: a ready order with a `d20` check profile locked at a roll of 20
/// resolves to the `on_critical_success` bucket.
#[test]
fn s2_order_locked_at_nat_twenty_resolves_critical() {
    let mut catalog = Catalog::default();
    catalog.facilities.insert(
        "tavern_1".to_string(),
        FacilityDef {
            id: "tavern_1".into(),
            name: "Tavern".into(),
            tier: 1,
            parent: None,
            build: BuildDef { cost: HashMap::new(), duration_turns: 1 },
            npc_slots: 1,
            npc_allowed_professions: None,
            orders: vec![OrderDef {
                id: "brew".into(),
                name: "Brew Ale".into(),
                duration_turns: 1,
                min_npc_level: None,
                outcome: OutcomeDef {
                    check_profile: Some("d20".into()),
                    on_success: Some(OutcomeBlock { effects: vec![] }),
                    on_failure: Some(OutcomeBlock { effects: vec![] }),
                    on_critical_success: Some(OutcomeBlock { effects: vec![] }),
                    on_critical_failure: None,
                },
            }],
            source_pack: "core".into(),
        },
    );
    let mut config = BastionConfig::default();
    config.check_profiles.insert(
        "d20".to_string(),
        CheckProfile {
            sides: 20,
            default: CheckProfileLevel {
                dc: Some(10),
                crit_success: Some(serde_json::json!([20])),
                crit_fail: Some(serde_json::json!([1])),
            },
            levels: HashMap::new(),
        },
    );
    config.internal_settings = InternalSettings::default();

    let mut session = SessionState::default();
    session.bastion.facilities.push(FacilityInstance {
        facility_id: "tavern_1".into(),
        built_turn: Some(0),
        build_status: BuildStatus::operational(0),
        assigned_npcs: vec![Npc {
            npc_id: "n1".into(),
            name: "Brewer".into(),
            profession: "brewer".into(),
            level: 1,
            xp: 0,
            upkeep: HashMap::new(),
            hired_turn: 0,
        }],
        current_orders: Vec::new(),
        owner_player_id: None,
        custom_stats: HashMap::new(),
    });

    let currency_model = currency::build_or_fallback(&["gold".into()], &[], None);
    let mut rng = SmallRngSource::seeded(1);

    let start = orders::start_order(&mut session, &catalog, "tavern_1", "brew", "n1");
    let order_id = start.order_id.unwrap();
    session.bastion.facilities[0].current_orders[0].status = OrderStatus::Ready;

    let lock = orders::lock_order_roll(&mut session, &catalog, &config, "tavern_1", &order_id, Some(20), false, &mut rng);
    assert!(lock.success);

    let result = orders::evaluate_order(&mut session, &catalog, &config, &currency_model, "tavern_1", &order_id, &mut rng);
    assert!(result.success);
    assert_eq!(result.bucket.as_deref(), Some("on_critical_success"));
}

/// S3: a `payout` formula with a `number` input `tip`, calculation
/// `total = tip * 2`, and effect `{gold: "${total}"}`, fed `tip = 3`,
/// resolves to a single effect crediting 6 gold.
#[test]
fn s3_formula_trigger_resolves_effect_from_saved_inputs() {
    use bastion_engine::config::pack::{Calculation, FormulaInput};

    let formula_def = bastion_engine::config::pack::FormulaDef {
        id: "payout".into(),
        name: Some("payout".into()),
        inputs: vec![FormulaInput {
            name: "tip".into(),
            source: "number".into(),
            default: None,
            check_profile: None,
            key: None,
            value: None,
        }],
        calculations: vec![Calculation::Formula { name: "total".into(), formula: "tip * 2".into() }],
        effects: vec![serde_json::json!({"gold": "${total}"})],
    };

    let mut session = SessionState::default();
    session.bastion.facilities.push(FacilityInstance {
        facility_id: "tavern_1".into(),
        built_turn: Some(0),
        build_status: BuildStatus::operational(0),
        assigned_npcs: Vec::new(),
        current_orders: vec![bastion_engine::state::OrderInstance {
            order_id: "o1".into(),
            order_def_id: "brew".into(),
            npc_id: "n1".into(),
            npc_level: 1,
            started_turn: 0,
            duration_turns: 1,
            progress: 1,
            status: OrderStatus::Ready,
            roll: None,
            roll_locked: true,
            roll_source: None,
            formula_inputs: HashMap::new(),
            ready_turn: Some(0),
        }],
        owner_player_id: None,
        custom_stats: HashMap::new(),
    });

    let saved = orders::save_formula_inputs(
        &mut session,
        "tavern_1",
        "o1",
        "payout",
        HashMap::from([("tip".to_string(), 3.0)]),
    );
    assert!(saved.success);

    let inputs = session.bastion.facilities[0].current_orders[0]
        .formula_inputs
        .get("payout")
        .cloned()
        .unwrap();
    let currency_model = currency::build_or_fallback(&["gold".into()], &[], None);
    let limits = bastion_engine::expr::ExprLimits::default();
    let mut rng = SmallRngSource::seeded(1);

    let resolved = formula::resolve(&formula_def, &inputs, &session, &currency_model, &HashMap::new(), &limits, &mut rng);
    assert!(resolved.errors.is_empty());
    assert_eq!(resolved.effects.len(), 1);
    assert_eq!(resolved.effects[0].currency_amounts.get("gold").and_then(|v| v.as_i64()), Some(6));
}

/// S4: two NPCs each with an upkeep of one gold-equivalent are debited
/// exactly their combined cost (in base copper units) on `advance_turn`.
#[test]
fn s4_advance_turn_debits_upkeep_for_every_npc() {
    let mut session = SessionState::default();
    session.bastion.treasury_base = 1000;
    for i in 0..2 {
        session.bastion.npcs_unassigned.push(Npc {
            npc_id: format!("n{i}"),
            name: "Hand".into(),
            profession: "laborer".into(),
            level: 1,
            xp: 0,
            upkeep: HashMap::from([("gold".to_string(), 1u32)]),
            hired_turn: 0,
        });
    }
    let config = BastionConfig::default();
    let model = currency_model();

    let result = facility::advance_turn(&mut session, &config, &model);
    assert!(result.success);

    // one gold == 100 copper in this model; two NPCs owe 200 copper total.
    assert_eq!(session.bastion.treasury_base, 1000 - 200);
    assert_eq!(session.audit_log.iter().filter(|e| e.event_type == "npc_upkeep").count(), 2);
}

/// S5: building with an empty treasury is rejected and reports the negative
/// projection unless `allow_negative` is set, in which case it succeeds and
/// leaves the treasury negative.
#[test]
fn s5_insufficient_funds_requires_confirmation_then_allows_negative() {
    let mut session = SessionState::default();
    session.bastion.treasury_base = 0;
    let catalog = catalog_with_tavern();
    let config = BastionConfig::default();
    let model = currency_model();

    let rejected = facility::build_facility(&mut session, &catalog, &config, &model, "tavern_1", false);
    assert!(!rejected.success);
    assert!(rejected.requires_confirmation);
    assert!(rejected.projected_treasury_base.unwrap() < 0);
    assert!(session.bastion.facilities.is_empty());

    let accepted = facility::build_facility(&mut session, &catalog, &config, &model, "tavern_1", true);
    assert!(accepted.success);
    assert!(session.bastion.treasury_base < 0);
}

/// S6: a pack with one valid facility and one whose parent is missing loads
/// with the invalid facility dropped; the valid one survives untouched.
#[test]
fn s6_validator_drops_facility_with_missing_parent() {
    let mut pack = Pack {
        pack_id: "misc".into(),
        name: "Miscellany".into(),
        version: None,
        facilities: vec![
            FacilityDef {
                id: "well_1".into(),
                name: "Well".into(),
                tier: 1,
                parent: None,
                build: BuildDef { cost: HashMap::new(), duration_turns: 1 },
                npc_slots: 0,
                npc_allowed_professions: None,
                orders: Vec::new(),
                source_pack: String::new(),
            },
            FacilityDef {
                id: "orphan_2".into(),
                name: "Orphan Wing".into(),
                tier: 2,
                parent: Some("ghost_keep".into()),
                build: BuildDef { cost: HashMap::new(), duration_turns: 1 },
                npc_slots: 0,
                npc_allowed_professions: None,
                orders: Vec::new(),
                source_pack: String::new(),
            },
        ],
        custom_mechanics: Vec::new(),
        config: None,
    };

    let result = validate::validate_pack(&mut pack, &HashMap::new(), Mode::Sanitize);
    assert!(!result.errors.is_empty());
    assert_eq!(pack.facilities.len(), 1);
    assert_eq!(pack.facilities[0].id, "well_1");
}

/// Build-cost debit and subsequent upkeep each emit their own audit entry
/// through the ledger (spec §4.5 step 4), exercised alongside S1/S4 above
/// to confirm `apply_effects` is atomic per call.
#[test]
fn apply_effects_emits_exactly_one_audit_entry_per_call() {
    let mut session = SessionState::default();
    let model = currency::build_or_fallback(&["gold".into()], &[], None);
    let effect = Effect {
        currency_amounts: HashMap::from([("gold".to_string(), serde_json::json!(5))]),
        ..Default::default()
    };
    let before = session.audit_log.len();
    bastion_engine::ledger::Ledger::apply_effects(
        &mut session,
        &[effect],
        AuditContext {
            event_type: "manual".into(),
            source_type: "gm".into(),
            source_id: "gm".into(),
            action: "grant".into(),
            roll: None,
            result: None,
        },
        &model,
    );
    assert_eq!(session.audit_log.len(), before + 1);
    assert_eq!(session.bastion.treasury_base, 5);
}
