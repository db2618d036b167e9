//! C6 — Formula Engine. Binds inputs (user, stat, item, currency, check-roll)
//! into a variable map, runs calculations through the expression evaluator
//! (C1), and resolves effect templates into concrete [`Effect`]s fed back
//! into the ledger (C5).

use crate::config::model::CheckProfile;
use crate::config::pack::{Calculation, ConditionClause, Effect, FormulaDef};
use crate::currency::CurrencyModel;
use crate::expr::{self, ErrorSink, ExprLimits, Vars};
use crate::rng::Rng;
use crate::state::SessionState;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct ResolvedFormula {
    pub effects: Vec<Effect>,
    pub errors: Vec<String>,
}

/// Runs `formula` against the pre-stored `inputs` (`formula_inputs[formula_id]`
/// on the order instance, spec §4.6) plus session-derived `stat`/`item`
/// readings, and returns the fully-resolved effect list.
pub fn resolve(
    formula: &FormulaDef,
    inputs: &HashMap<String, f64>,
    state: &SessionState,
    currency_model: &CurrencyModel,
    check_profiles: &HashMap<String, CheckProfile>,
    limits: &ExprLimits,
    rng: &mut dyn Rng,
) -> ResolvedFormula {
    let mut vars = Vars::new();
    let mut errors = Vec::new();

    for input in &formula.inputs {
        let value = match input.source.as_str() {
            "number" => match inputs.get(&input.name) {
                Some(v) => *v,
                None => match input.default.as_ref().and_then(value_as_f64) {
                    Some(v) => v,
                    None => {
                        errors.push(format!("formula '{}': missing required input '{}'", formula.id, input.name));
                        continue;
                    }
                },
            },
            "check" => match inputs.get(&input.name) {
                Some(v) => {
                    if let Some(profile) = input.check_profile.as_ref().and_then(|p| check_profiles.get(p)) {
                        if *v < 1.0 || *v > profile.sides as f64 {
                            errors.push(format!(
                                "formula '{}': check input '{}' out of range [1, {}]",
                                formula.id, input.name, profile.sides
                            ));
                        }
                    }
                    *v
                }
                None => {
                    errors.push(format!("formula '{}': missing required check input '{}'", formula.id, input.name));
                    continue;
                }
            },
            "stat" => {
                let key = input.key.as_deref().unwrap_or(&input.name);
                *state.bastion.stats.get(key).unwrap_or(&0) as f64
            }
            "item" => {
                let key = input.key.as_deref().unwrap_or(&input.name);
                state
                    .bastion
                    .inventory
                    .iter()
                    .find(|i| i.item == key)
                    .map(|i| i.qty as f64)
                    .unwrap_or(0.0)
            }
            "currency" => {
                let key = input.key.as_deref().unwrap_or(&input.name);
                let amount = input.value.as_ref().and_then(|v| v.as_i64()).unwrap_or(0);
                currency_model.to_base_units(key, amount).unwrap_or(0) as f64
            }
            other => {
                errors.push(format!("formula '{}': unknown input source '{other}'", formula.id));
                0.0
            }
        };
        vars.insert(input.name.clone(), value);
    }

    let mut sink = ErrorSink::new();
    for calc in &formula.calculations {
        match calc {
            Calculation::Formula { name, formula: expr_text } => {
                let v = expr::evaluate(expr_text, &vars, limits, rng, &mut sink);
                vars.insert(name.clone(), v);
            }
            Calculation::Conditions { name, conditions } => {
                let v = eval_conditions(conditions, &vars, limits, rng, &mut sink);
                vars.insert(name.clone(), v);
            }
        }
    }
    for e in sink.into_vec() {
        errors.push(format!("formula '{}': {e}", formula.id));
    }

    let effects = formula
        .effects
        .iter()
        .filter_map(|template| resolve_effect_template(template, &vars))
        .collect();

    ResolvedFormula { effects, errors }
}

fn eval_conditions(
    conditions: &[ConditionClause],
    vars: &Vars,
    limits: &ExprLimits,
    rng: &mut dyn Rng,
    sink: &mut ErrorSink,
) -> f64 {
    for clause in conditions {
        let holds = match &clause.cond {
            Some(cond) => expr::evaluate_bool(cond, vars, limits, rng, sink),
            None => true,
        };
        if !holds {
            continue;
        }
        if let Some(then_formula) = &clause.then_formula {
            return expr::evaluate(then_formula, vars, limits, rng, sink);
        }
        if let Some(then) = &clause.then {
            return value_or_expr(then, vars, limits, rng, sink);
        }
        if let Some(else_) = &clause.else_ {
            return value_or_expr(else_, vars, limits, rng, sink);
        }
        return 0.0;
    }
    0.0
}

fn value_or_expr(
    value: &serde_json::Value,
    vars: &Vars,
    limits: &ExprLimits,
    rng: &mut dyn Rng,
    sink: &mut ErrorSink,
) -> f64 {
    match value {
        serde_json::Value::Number(n) => n.as_f64().unwrap_or(0.0),
        serde_json::Value::String(s) => expr::evaluate(s, vars, limits, rng, sink),
        _ => 0.0,
    }
}

fn value_as_f64(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Round-half-to-even, matching the formula engine's rounding rule, which is
/// distinct from the ledger's round-half-away-from-zero currency conversion
/// (spec §4.6 vs §4.2).
fn round_bankers(value: f64) -> i64 {
    let floor = value.floor();
    let diff = value - floor;
    if (diff - 0.5).abs() < 1e-9 {
        let f = floor as i64;
        if f % 2 == 0 { f } else { f + 1 }
    } else {
        value.round() as i64
    }
}

/// `${name}` substitution inside a template string, formatting each
/// substituted variable as a plain number.
fn substitute(template: &str, vars: &Vars) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let Some(end) = rest[start..].find('}') else {
            out.push_str(&rest[start..]);
            rest = "";
            break;
        };
        let name = &rest[start + 2..start + end];
        let value = vars.get(name).copied().unwrap_or(0.0);
        out.push_str(&format_number(value));
        rest = &rest[start + end + 1..];
    }
    out.push_str(rest);
    out
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

const NUMERIC_KEYS: &[&str] = &["qty", "delta", "amount"];

/// Resolves one effect template (a JSON object with possible `${name}`
/// string substitutions) against the bound variables, per spec §4.6.
/// Returns `None` if the template resolves to no recognized fields.
fn resolve_effect_template(template: &serde_json::Value, vars: &Vars) -> Option<Effect> {
    let obj = template.as_object()?;
    let mut effect = Effect::default();
    let mut any = false;

    for (key, raw) in obj {
        let substituted = raw.as_str().map(|s| substitute(s, vars));
        match key.as_str() {
            "item" | "stat" | "currency" | "event" | "random_event" | "trigger" => {
                if let Some(s) = string_field(raw, substituted.as_deref()) {
                    match key.as_str() {
                        "item" => effect.item = Some(s),
                        "stat" => effect.stat = Some(s),
                        "currency" => effect.currency = Some(s),
                        "event" => effect.event = Some(s),
                        "random_event" => effect.random_event = Some(s),
                        "trigger" => effect.trigger = Some(s),
                        _ => unreachable!(),
                    }
                    any = true;
                }
            }
            "log" => {
                if let Some(s) = string_field(raw, substituted.as_deref()) {
                    effect.log = Some(s);
                    any = true;
                }
            }
            key if NUMERIC_KEYS.contains(&key) => {
                if let Some(n) = numeric_field(raw, substituted.as_deref()) {
                    match key {
                        "qty" => effect.qty = Some(n),
                        "delta" => effect.delta = Some(n),
                        "amount" => effect.amount = Some(n),
                        _ => unreachable!(),
                    }
                    any = true;
                }
            }
            currency => {
                // long-form currency key, e.g. `{"gold": "${total}"}`.
                if let Some(n) = numeric_field(raw, substituted.as_deref()) {
                    effect.currency_amounts.insert(currency.to_string(), serde_json::json!(n));
                    any = true;
                }
            }
        }
    }

    any.then_some(effect)
}

fn string_field(raw: &serde_json::Value, substituted: Option<&str>) -> Option<String> {
    if let Some(s) = substituted {
        return (!s.is_empty()).then(|| s.to_string());
    }
    match raw {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Null => None,
        _ => None,
    }
}

fn numeric_field(raw: &serde_json::Value, substituted: Option<&str>) -> Option<i64> {
    if let Some(s) = substituted {
        return s.trim().parse::<f64>().ok().map(round_bankers);
    }
    match raw {
        serde_json::Value::Number(n) => n.as_f64().map(round_bankers).or_else(|| n.as_i64()),
        serde_json::Value::Null => None,
        _ => None,
    }
}
