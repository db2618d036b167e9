//! C4 — Pack/Config Validator. Strict mode reports and rejects; sanitize
//! mode reports and drops invalid entries so partial packs still load
//! (spec §4.4). Validation walks facilities -> orders -> outcome blocks ->
//! effects, cascading drops upward (an invalid order drops the order, an
//! invalid facility drops the facility, and any facility whose parent
//! vanished is dropped too).

use super::model::CheckProfile;
use super::pack::{Effect, FacilityDef, Pack};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Strict,
    Sanitize,
}

#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

pub fn validate_pack(
    pack: &mut Pack,
    check_profiles: &HashMap<String, CheckProfile>,
    mode: Mode,
) -> ValidationResult {
    let mut result = ValidationResult::default();

    if pack.pack_id.is_empty() {
        result.errors.push("pack is missing pack_id".to_string());
    }
    if pack.name.is_empty() {
        result.errors.push("pack is missing name".to_string());
    }

    let ids: HashMap<String, u32> = pack
        .facilities
        .iter()
        .map(|f| (f.id.clone(), f.tier))
        .collect();

    let mut dropped: HashSet<String> = HashSet::new();
    for facility in &mut pack.facilities {
        if let Err(e) = validate_facility(facility, &ids, check_profiles) {
            result.errors.push(format!("facility '{}': {e}", facility.id));
            dropped.insert(facility.id.clone());
            continue;
        }
        sanitize_orders(facility, check_profiles, &mut result);
    }

    // cascade: drop any facility whose parent vanished, repeat to a fixed point.
    loop {
        let mut newly_dropped = Vec::new();
        for facility in &pack.facilities {
            if dropped.contains(&facility.id) {
                continue;
            }
            if let Some(parent) = &facility.parent {
                if dropped.contains(parent) {
                    newly_dropped.push(facility.id.clone());
                }
            }
        }
        if newly_dropped.is_empty() {
            break;
        }
        for id in newly_dropped {
            result
                .warnings
                .push(format!("facility '{id}' dropped: parent was invalid/dropped"));
            dropped.insert(id);
        }
    }

    if mode == Mode::Sanitize {
        pack.facilities.retain(|f| !dropped.contains(&f.id));
    }

    result
}

fn validate_facility(
    facility: &FacilityDef,
    ids: &HashMap<String, u32>,
    check_profiles: &HashMap<String, CheckProfile>,
) -> Result<(), String> {
    if facility.id.is_empty() {
        return Err("missing id".to_string());
    }
    if facility.tier == 0 {
        return Err("tier must be a positive integer".to_string());
    }
    match (&facility.parent, facility.tier) {
        (None, 1) => {}
        (None, _) => return Err("non-tier-1 facility must declare a parent".to_string()),
        (Some(_), 1) => return Err("tier-1 facility must not declare a parent".to_string()),
        (Some(parent), tier) => match ids.get(parent) {
            None => return Err(format!("parent '{parent}' not found in pack")),
            Some(parent_tier) if *parent_tier >= tier => {
                return Err(format!(
                    "parent '{parent}' tier {parent_tier} must be lower than {tier}"
                ))
            }
            Some(_) => {}
        },
    }
    if facility.build.duration_turns == 0 {
        return Err("build.duration_turns must be positive".to_string());
    }
    for order in &facility.orders {
        if let Some(profile_id) = &order.outcome.check_profile {
            if !check_profiles.contains_key(profile_id) {
                return Err(format!(
                    "order '{}' references unknown check_profile '{profile_id}'",
                    order.id
                ));
            }
        }
    }
    Ok(())
}

fn sanitize_orders(
    facility: &mut FacilityDef,
    check_profiles: &HashMap<String, CheckProfile>,
    result: &mut ValidationResult,
) {
    facility.orders.retain_mut(|order| {
        if order.duration_turns == 0 {
            result.warnings.push(format!(
                "order '{}' dropped: duration_turns must be positive",
                order.id
            ));
            return false;
        }
        if let Some(profile_id) = &order.outcome.check_profile {
            if !check_profiles.contains_key(profile_id) {
                result.warnings.push(format!(
                    "order '{}' dropped: unknown check_profile '{profile_id}'",
                    order.id
                ));
                return false;
            }
        }
        for block in [
            &mut order.outcome.on_success,
            &mut order.outcome.on_failure,
            &mut order.outcome.on_critical_success,
            &mut order.outcome.on_critical_failure,
        ] {
            if let Some(block) = block {
                block
                    .effects
                    .retain(|effect| validate_effect(effect, check_profiles).is_ok());
            }
        }
        true
    });
}

fn validate_effect(
    effect: &Effect,
    _check_profiles: &HashMap<String, CheckProfile>,
) -> Result<(), String> {
    let tag_count = [
        effect.item.is_some() || effect.qty.is_some(),
        effect.stat.is_some(),
        effect.log.is_some(),
        effect.event.is_some(),
        effect.random_event.is_some(),
        effect.trigger.is_some(),
        effect.currency.is_some() || effect.amount.is_some(),
        !effect.currency_amounts.is_empty(),
    ]
    .iter()
    .filter(|x| **x)
    .count();
    if tag_count == 0 {
        return Err("effect has no recognized keys".to_string());
    }
    if effect.item.is_some() != effect.qty.is_some() {
        return Err("item effect requires both 'item' and 'qty'".to_string());
    }
    if effect.stat.is_some() != effect.delta.is_some() {
        return Err("stat effect requires both 'stat' and 'delta'".to_string());
    }
    if effect.currency.is_some() != effect.amount.is_some() {
        return Err("currency shorthand requires both 'currency' and 'amount'".to_string());
    }
    Ok(())
}
