//! Acceptance tests for the eleven state invariants and the dice/roll
//! boundary behaviors.

use bastion_engine::config::catalog::Catalog;
use bastion_engine::config::model::{BastionConfig, CheckProfile, CheckProfileLevel, InternalSettings};
use bastion_engine::config::pack::{BuildDef, Effect, FacilityDef, OrderDef, OutcomeBlock, OutcomeDef};
use bastion_engine::currency::{self, ConversionEdge};
use bastion_engine::expr::{self, ErrorSink, ExprLimits, Vars};
use bastion_engine::facility;
use bastion_engine::ledger::Ledger;
use bastion_engine::npc;
use bastion_engine::orders;
use bastion_engine::rng::SmallRngSource;
use bastion_engine::state::{
    AuditContext, BuildStatus, BuildStatusKind, FacilityInstance, Npc, OrderInstance, OrderStatus,
    SessionState,
};
use std::collections::HashMap;

fn model_3_tier() -> currency::CurrencyModel {
    currency::build_or_fallback(
        &["copper".into(), "silver".into(), "gold".into()],
        &[
            ConversionEdge { from: "silver".into(), to: "copper".into(), rate: 10 },
            ConversionEdge { from: "gold".into(), to: "silver".into(), rate: 10 },
        ],
        Some("copper"),
    )
}

fn gold_effect(amount: i64) -> Effect {
    Effect { currency_amounts: HashMap::from([("gold".to_string(), serde_json::json!(amount))]), ..Default::default() }
}

// --- Invariant 1: treasury_base equals the sum of base-unit projections ----

#[test]
fn invariant_1_treasury_base_matches_currency_conversion() {
    let mut session = SessionState::default();
    let model = model_3_tier();
    Ledger::apply_effects(
        &mut session,
        &[gold_effect(2)],
        AuditContext { event_type: "t".into(), source_type: "t".into(), source_id: "t".into(), action: "t".into(), roll: None, result: None },
        &model,
    );
    // 2 gold * 10 silver/gold * 10 copper/silver = 200 copper.
    assert_eq!(session.bastion.treasury_base, 200);
}

// --- Invariant 2: inventory has no non-positive qty and no duplicate keys --

#[test]
fn invariant_2_inventory_has_no_nonpositive_or_duplicate_entries() {
    let mut session = SessionState::default();
    let model = model_3_tier();
    let grant = Effect { item: Some("torch".into()), qty: Some(3), ..Default::default() };
    let spend_all = Effect { item: Some("torch".into()), qty: Some(-3), ..Default::default() };
    Ledger::apply_effects(&mut session, &[grant], audit_ctx(), &model);
    assert_eq!(session.bastion.inventory.len(), 1);
    Ledger::apply_effects(&mut session, &[spend_all], audit_ctx(), &model);
    assert!(session.bastion.inventory.iter().all(|i| i.qty > 0));
    assert!(!session.bastion.inventory.iter().any(|i| i.item == "torch"));

    let keys: std::collections::HashSet<_> = session.bastion.inventory.iter().map(|i| &i.item).collect();
    assert_eq!(keys.len(), session.bastion.inventory.len());
}

fn audit_ctx() -> AuditContext {
    AuditContext { event_type: "t".into(), source_type: "t".into(), source_id: "t".into(), action: "t".into(), roll: None, result: None }
}

// --- Invariant 3 & 4: build status is exclusive, ready iff progress>=duration, never regresses --

#[test]
fn invariant_3_and_4_build_status_and_order_ready_semantics() {
    let mut session = SessionState::default();
    let mut catalog = Catalog::default();
    catalog.facilities.insert(
        "well_1".into(),
        FacilityDef {
            id: "well_1".into(),
            name: "Well".into(),
            tier: 1,
            parent: None,
            build: BuildDef { cost: HashMap::new(), duration_turns: 2 },
            npc_slots: 0,
            npc_allowed_professions: None,
            orders: Vec::new(),
            source_pack: "core".into(),
        },
    );
    let config = BastionConfig::default();
    let model = model_3_tier();

    facility::build_facility(&mut session, &catalog, &config, &model, "well_1", true);
    assert_eq!(session.bastion.facilities[0].build_status.status, BuildStatusKind::Building);

    facility::advance_turn(&mut session, &config, &model);
    assert_eq!(session.bastion.facilities[0].build_status.status, BuildStatusKind::Building);

    facility::advance_turn(&mut session, &config, &model);
    assert_eq!(session.bastion.facilities[0].build_status.status, BuildStatusKind::Operational);

    // order readiness: progress < duration stays in_progress, then flips to ready and stays ready.
    session.bastion.facilities[0].current_orders.push(OrderInstance {
        order_id: "o1".into(),
        order_def_id: "chore".into(),
        npc_id: "n1".into(),
        npc_level: 1,
        started_turn: session.current_turn,
        duration_turns: 2,
        progress: 0,
        status: OrderStatus::InProgress,
        roll: None,
        roll_locked: false,
        roll_source: None,
        formula_inputs: HashMap::new(),
        ready_turn: None,
    });
    facility::advance_turn(&mut session, &config, &model);
    assert_eq!(session.bastion.facilities[0].current_orders[0].status, OrderStatus::InProgress);
    facility::advance_turn(&mut session, &config, &model);
    assert_eq!(session.bastion.facilities[0].current_orders[0].status, OrderStatus::Ready);
}

// --- Invariant 5: current_turn is monotonically non-decreasing -------------

#[test]
fn invariant_5_current_turn_never_decreases() {
    let mut session = SessionState::default();
    let config = BastionConfig::default();
    let model = model_3_tier();
    let mut last = session.current_turn;
    for _ in 0..5 {
        facility::advance_turn(&mut session, &config, &model);
        assert!(session.current_turn >= last);
        last = session.current_turn;
    }
}

// --- Invariant 6: advance_turn refuses while any order is ready ------------

#[test]
fn invariant_6_advance_turn_refused_while_order_ready() {
    let mut session = SessionState::default();
    let config = BastionConfig::default();
    let model = model_3_tier();
    session.bastion.facilities.push(FacilityInstance {
        facility_id: "tavern_1".into(),
        built_turn: Some(0),
        build_status: BuildStatus::operational(0),
        assigned_npcs: Vec::new(),
        current_orders: vec![OrderInstance {
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
    let before = session.current_turn;
    let result = facility::advance_turn(&mut session, &config, &model);
    assert!(!result.success);
    assert_eq!(session.current_turn, before);
}

// --- Invariant 7: NPC with active order can't be fired; forced move cancels it --

#[test]
fn invariant_7_active_order_blocks_fire_but_forced_move_cancels_it() {
    let mut session = SessionState::default();
    let catalog = Catalog::default();
    let mut facility = FacilityInstance {
        facility_id: "tavern_1".into(),
        built_turn: Some(0),
        build_status: BuildStatus::operational(0),
        assigned_npcs: vec![Npc { npc_id: "n1".into(), name: "N".into(), profession: "p".into(), level: 1, xp: 0, upkeep: HashMap::new(), hired_turn: 0 }],
        current_orders: Vec::new(),
        owner_player_id: None,
        custom_stats: HashMap::new(),
    };
    facility.current_orders.push(OrderInstance {
        order_id: "o1".into(),
        order_def_id: "brew".into(),
        npc_id: "n1".into(),
        npc_level: 1,
        started_turn: 0,
        duration_turns: 2,
        progress: 0,
        status: OrderStatus::InProgress,
        roll: None,
        roll_locked: false,
        roll_source: None,
        formula_inputs: HashMap::new(),
        ready_turn: None,
    });
    session.bastion.facilities.push(facility);

    let fire = npc::fire_npc(&mut session, "n1");
    assert!(!fire.success);

    let blocked_move = npc::move_npc(&mut session, &catalog, "n1", None, false);
    assert!(!blocked_move.success);

    let forced_move = npc::move_npc(&mut session, &catalog, "n1", None, true);
    assert!(forced_move.success);
    assert_eq!(forced_move.cancelled_orders, 1);
    assert!(session.bastion.facilities[0].current_orders.is_empty());
    assert!(session.bastion.npcs_unassigned.iter().any(|n| n.npc_id == "n1"));
}

// --- Invariant 8: evaluate_order requires a locked, in-range roll ----------

fn catalog_with_checked_brew() -> Catalog {
    let mut catalog = Catalog::default();
    catalog.facilities.insert(
        "tavern_1".into(),
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
                name: "Brew".into(),
                duration_turns: 1,
                min_npc_level: None,
                outcome: OutcomeDef {
                    check_profile: Some("d20".into()),
                    on_success: Some(OutcomeBlock { effects: vec![] }),
                    on_failure: Some(OutcomeBlock { effects: vec![] }),
                    on_critical_success: None,
                    on_critical_failure: None,
                },
            }],
            source_pack: "core".into(),
        },
    );
    catalog
}

fn config_with_d20() -> BastionConfig {
    let mut config = BastionConfig::default();
    config.check_profiles.insert(
        "d20".to_string(),
        CheckProfile { sides: 20, default: CheckProfileLevel { dc: Some(10), crit_success: None, crit_fail: None }, levels: HashMap::new() },
    );
    config.internal_settings = InternalSettings::default();
    config
}

#[test]
fn invariant_8_evaluate_rejected_until_roll_locked_in_range() {
    let catalog = catalog_with_checked_brew();
    let config = config_with_d20();
    let model = currency::build_or_fallback(&["gold".into()], &[], None);
    let mut rng = SmallRngSource::seeded(5);

    let mut session = SessionState::default();
    session.bastion.facilities.push(FacilityInstance {
        facility_id: "tavern_1".into(),
        built_turn: Some(0),
        build_status: BuildStatus::operational(0),
        assigned_npcs: vec![Npc { npc_id: "n1".into(), name: "B".into(), profession: "p".into(), level: 1, xp: 0, upkeep: HashMap::new(), hired_turn: 0 }],
        current_orders: Vec::new(),
        owner_player_id: None,
        custom_stats: HashMap::new(),
    });
    let start = orders::start_order(&mut session, &catalog, "tavern_1", "brew", "n1");
    let order_id = start.order_id.unwrap();
    session.bastion.facilities[0].current_orders[0].status = OrderStatus::Ready;

    // evaluating before a roll is locked is rejected.
    let unlocked = orders::evaluate_order(&mut session, &catalog, &config, &model, "tavern_1", &order_id, &mut rng);
    assert!(!unlocked.success);
    assert!(session.bastion.facilities[0].current_orders.iter().any(|o| o.order_id == order_id));

    // rolls outside [1, sides] are rejected by lock_order_roll itself.
    let too_low = orders::lock_order_roll(&mut session, &catalog, &config, "tavern_1", &order_id, Some(0), false, &mut rng);
    assert!(!too_low.success);
    let too_high = orders::lock_order_roll(&mut session, &catalog, &config, "tavern_1", &order_id, Some(21), false, &mut rng);
    assert!(!too_high.success);

    let in_range = orders::lock_order_roll(&mut session, &catalog, &config, "tavern_1", &order_id, Some(15), false, &mut rng);
    assert!(in_range.success);

    let evaluated = orders::evaluate_order(&mut session, &catalog, &config, &model, "tavern_1", &order_id, &mut rng);
    assert!(evaluated.success);
}

// --- Invariant 9: demolish refund = floor(chain_cost * refund_ratio); NPCs go to reserve --

#[test]
fn invariant_9_demolish_refunds_chain_cost_and_frees_npcs() {
    let mut catalog = Catalog::default();
    catalog.facilities.insert(
        "tavern_1".into(),
        FacilityDef {
            id: "tavern_1".into(),
            name: "Tavern".into(),
            tier: 1,
            parent: None,
            build: BuildDef { cost: HashMap::from([("gold".to_string(), 10)]), duration_turns: 1 },
            npc_slots: 1,
            npc_allowed_professions: None,
            orders: Vec::new(),
            source_pack: "core".into(),
        },
    );
    let config = BastionConfig::default();
    let model = currency::build_or_fallback(&["gold".into()], &[], None);

    let mut session = SessionState::default();
    session.bastion.facilities.push(FacilityInstance {
        facility_id: "tavern_1".into(),
        built_turn: Some(0),
        build_status: BuildStatus::operational(0),
        assigned_npcs: vec![Npc { npc_id: "n1".into(), name: "B".into(), profession: "p".into(), level: 1, xp: 0, upkeep: HashMap::new(), hired_turn: 0 }],
        current_orders: Vec::new(),
        owner_player_id: None,
        custom_stats: HashMap::new(),
    });

    let refund_ratio = 0.3;
    let result = facility::demolish_facility(&mut session, &catalog, &config, &model, "tavern_1", refund_ratio);
    assert!(result.success);
    // floor(10 * 0.3) == 3
    assert_eq!(result.refund.get("gold"), Some(&3));
    assert!(session.bastion.facilities.is_empty());
    assert!(session.bastion.npcs_unassigned.iter().any(|n| n.npc_id == "n1"));
}

// --- Invariant 10: base currency has factor 1; every type reaches it ------

#[test]
fn invariant_10_currency_model_base_factor_and_reachability() {
    let model = model_3_tier();
    assert_eq!(model.factor(&model.base).unwrap().to_f64(), 1.0);
    for currency in &model.types {
        assert!(model.factor(currency).is_some(), "currency '{currency}' unreachable from base");
    }
}

// --- Invariant 11: applying E then E' equals applying E++E' in one call ---

#[test]
fn invariant_11_sequential_effects_equal_a_single_combined_call() {
    let model = model_3_tier();
    let effects_a = vec![gold_effect(1)];
    let effects_b = vec![gold_effect(2)];

    let mut sequential = SessionState::default();
    Ledger::apply_effects(&mut sequential, &effects_a, audit_ctx(), &model);
    Ledger::apply_effects(&mut sequential, &effects_b, audit_ctx(), &model);

    let mut combined = SessionState::default();
    let mut all = effects_a.clone();
    all.extend(effects_b.clone());
    Ledger::apply_effects(&mut combined, &all, audit_ctx(), &model);

    assert_eq!(sequential.bastion.treasury_base, combined.bastion.treasury_base);
}

// --- Boundary behaviors: dice limits, expression length, roll bounds ------

#[test]
fn boundary_dice_count_and_sides_at_limit_accepted_above_rejected() {
    let limits = ExprLimits { dice_max_count: 4, dice_max_sides: 6, formula_max_len: 500 };
    let mut rng = SmallRngSource::seeded(9);
    let vars = Vars::new();

    let mut at_limit = ErrorSink::new();
    let v = expr::evaluate("4d6", &vars, &limits, &mut rng, &mut at_limit);
    assert!(at_limit.is_empty());
    assert!(v >= 4.0 && v <= 24.0);

    let mut over_count = ErrorSink::new();
    expr::evaluate("5d6", &vars, &limits, &mut rng, &mut over_count);
    assert!(!over_count.is_empty());

    let mut over_sides = ErrorSink::new();
    expr::evaluate("1d7", &vars, &limits, &mut rng, &mut over_sides);
    assert!(!over_sides.is_empty());
}

#[test]
fn boundary_expression_at_max_length_accepted_over_length_rejected() {
    let limits = ExprLimits { dice_max_count: 20, dice_max_sides: 1000, formula_max_len: 10 };
    let mut rng = SmallRngSource::seeded(1);
    let vars = Vars::new();

    let mut within = ErrorSink::new();
    expr::evaluate("1+2+3+4", &vars, &limits, &mut rng, &mut within);
    assert!(within.is_empty());

    let mut over = ErrorSink::new();
    expr::evaluate("1+2+3+4+5+6+7", &vars, &limits, &mut rng, &mut over);
    assert!(!over.is_empty());
}

#[test]
fn boundary_roll_at_one_and_sides_accepted_zero_and_sides_plus_one_rejected() {
    let catalog = catalog_with_checked_brew();
    let config = config_with_d20();
    let mut rng = SmallRngSource::seeded(3);

    for roll in [1i64, 20i64] {
        let mut session = SessionState::default();
        session.bastion.facilities.push(FacilityInstance {
            facility_id: "tavern_1".into(),
            built_turn: Some(0),
            build_status: BuildStatus::operational(0),
            assigned_npcs: vec![Npc { npc_id: "n1".into(), name: "B".into(), profession: "p".into(), level: 1, xp: 0, upkeep: HashMap::new(), hired_turn: 0 }],
            current_orders: Vec::new(),
            owner_player_id: None,
            custom_stats: HashMap::new(),
        });
        let start = orders::start_order(&mut session, &catalog, "tavern_1", "brew", "n1");
        let order_id = start.order_id.unwrap();
        session.bastion.facilities[0].current_orders[0].status = OrderStatus::Ready;
        let result = orders::lock_order_roll(&mut session, &catalog, &config, "tavern_1", &order_id, Some(roll), false, &mut rng);
        assert!(result.success, "roll {roll} should be accepted");
    }

    for roll in [0i64, 21i64] {
        let mut session = SessionState::default();
        session.bastion.facilities.push(FacilityInstance {
            facility_id: "tavern_1".into(),
            built_turn: Some(0),
            build_status: BuildStatus::operational(0),
            assigned_npcs: vec![Npc { npc_id: "n1".into(), name: "B".into(), profession: "p".into(), level: 1, xp: 0, upkeep: HashMap::new(), hired_turn: 0 }],
            current_orders: Vec::new(),
            owner_player_id: None,
            custom_stats: HashMap::new(),
        });
        let start = orders::start_order(&mut session, &catalog, "tavern_1", "brew", "n1");
        let order_id = start.order_id.unwrap();
        session.bastion.facilities[0].current_orders[0].status = OrderStatus::Ready;
        let result = orders::lock_order_roll(&mut session, &catalog, &config, "tavern_1", &order_id, Some(roll), false, &mut rng);
        assert!(!result.success, "roll {roll} should be rejected");
    }
}
