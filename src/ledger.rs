//! C5 — Ledger. Applies a list of effects to session state atomically (in
//! the sense that one call produces one coherent mutation + one audit
//! entry), updating the authoritative `treasury_base` scalar.

use crate::config::pack::Effect;
use crate::currency::CurrencyModel;
use crate::state::{AuditContext, AuditEntry, InventoryItem, SessionState};

#[derive(Debug, Default)]
pub struct LedgerResult {
    pub success: bool,
    pub errors: Vec<String>,
    pub entry: Option<AuditEntry>,
}

pub struct Ledger;

impl Ledger {
    /// Primary operation (spec §4.5). Applies every sub-effect of `effects`
    /// in order, best-effort per sub-effect but never aborting the whole
    /// call, then writes `treasury_base` back and appends exactly one audit
    /// entry built from `context`.
    pub fn apply_effects(
        session: &mut SessionState,
        effects: &[Effect],
        context: AuditContext,
        currency_model: &CurrencyModel,
    ) -> LedgerResult {
        let mut errors = Vec::new();
        let mut changes: Vec<String> = Vec::new();
        let mut logs: Vec<String> = Vec::new();
        let mut treasury_base = session.bastion.treasury_base;

        for effect in effects {
            // currency shorthand {currency, amount}
            if let (Some(currency), Some(amount)) = (&effect.currency, effect.amount) {
                match currency_model.to_base_units(currency, amount) {
                    Some(base_delta) => {
                        treasury_base += base_delta;
                        changes.push(format!("{currency}: {amount:+}"));
                    }
                    None => errors.push(format!("unknown currency '{currency}' in effect")),
                }
            }

            // long-form currency keys
            for (currency, value) in &effect.currency_amounts {
                let Some(amount) = value.as_i64() else {
                    errors.push(format!("currency delta for '{currency}' is not an integer"));
                    continue;
                };
                match currency_model.to_base_units(currency, amount) {
                    Some(base_delta) => {
                        treasury_base += base_delta;
                        changes.push(format!("{currency}: {amount:+}"));
                    }
                    None => errors.push(format!("unknown currency '{currency}' in effect")),
                }
            }

            // item delta
            if let (Some(item), Some(qty)) = (&effect.item, effect.qty) {
                apply_item_delta(&mut session.bastion.inventory, item, qty);
                changes.push(format!("{item}: {qty:+}"));
            }

            // stat delta
            if let (Some(stat), Some(delta)) = (&effect.stat, effect.delta) {
                let entry = session.bastion.stats.entry(stat.clone()).or_insert(0);
                *entry += delta;
                changes.push(format!("{stat}: {delta:+}"));
            }

            // log text
            if let Some(text) = &effect.log {
                logs.push(text.clone());
            }
        }

        session.bastion.treasury_base = treasury_base;

        let entry = AuditEntry {
            turn: session.current_turn,
            event_type: context.event_type,
            source_type: context.source_type,
            source_id: context.source_id,
            action: context.action,
            roll: context.roll,
            result: context.result,
            changes: changes.join(", "),
            log_text: logs.join(" "),
        };
        session.audit_log.push(entry.clone());

        LedgerResult {
            success: errors.is_empty(),
            errors,
            entry: Some(entry),
        }
    }

    /// Trims audit entries older than `max_turn - keep_turns`. Advisory —
    /// never fails the caller if skipped (SPEC_FULL.md §D.3).
    pub fn trim_audit_log(session: &mut SessionState, keep_turns: Option<u32>) {
        let Some(keep_turns) = keep_turns else {
            return;
        };
        let cutoff = session.current_turn.saturating_sub(keep_turns);
        session.audit_log.retain(|e| e.turn >= cutoff);
    }
}

fn apply_item_delta(inventory: &mut Vec<InventoryItem>, item: &str, qty: i64) {
    if let Some(existing) = inventory.iter_mut().find(|i| i.item == item) {
        existing.qty += qty;
        if existing.qty <= 0 {
            inventory.retain(|i| i.item != item);
        }
    } else if qty > 0 {
        inventory.push(InventoryItem {
            item: item.to_string(),
            qty,
        });
    }
}
