//! C7 — Event Service. Resolves `event`/`random_event` effect references
//! against the catalog's event index and weighted groups, appending to the
//! session's event history and audit log.

use crate::config::catalog::Catalog;
use crate::rng::Rng;
use crate::state::{AuditEntry, EventHistoryEntry, SessionState};

#[derive(Debug, Default)]
pub struct EventResult {
    pub entry: Option<EventHistoryEntry>,
    pub warning: Option<String>,
}

/// Resolves `{event: id}` (spec §4.7). Unknown ids are silently ignored
/// other than a warning — events are informational, never fatal.
pub fn resolve_event(session: &mut SessionState, catalog: &Catalog, event_id: &str) -> EventResult {
    let Some(def) = catalog.event_index.get(event_id) else {
        return EventResult {
            entry: None,
            warning: Some(format!("unknown event id '{event_id}'")),
        };
    };
    let entry = EventHistoryEntry {
        turn: session.current_turn,
        event_id: def.id.clone(),
        text: def.text.clone(),
    };
    session.event_history.push(entry.clone());
    session.audit_log.push(AuditEntry {
        turn: session.current_turn,
        event_type: "event".to_string(),
        source_type: "event".to_string(),
        source_id: def.id.clone(),
        action: "triggered".to_string(),
        roll: None,
        result: None,
        changes: String::new(),
        log_text: def.text.clone(),
    });
    EventResult { entry: Some(entry), warning: None }
}

/// Resolves `{random_event: "group:<gid>"}` via weighted selection (spec
/// §4.7): non-positive or missing weights default to 1, an empty group
/// warns without drawing, and the sampler never panics on exhaustion.
pub fn resolve_random_event(
    session: &mut SessionState,
    catalog: &Catalog,
    group_ref: &str,
    rng: &mut dyn Rng,
) -> EventResult {
    let gid = group_ref.strip_prefix("group:").unwrap_or(group_ref);
    let Some(members) = catalog.event_groups.get(gid) else {
        return EventResult {
            entry: None,
            warning: Some(format!("unknown event group '{gid}'")),
        };
    };
    if members.is_empty() {
        return EventResult {
            entry: None,
            warning: Some(format!("event group '{gid}' is empty")),
        };
    }

    let weights: Vec<i64> = members.iter().map(|m| m.weight.filter(|w| *w > 0).unwrap_or(1)).collect();
    let total: i64 = weights.iter().sum();
    let mut draw = rng.uniform(total.max(1) as u64) as i64;
    let mut chosen = members.len() - 1;
    for (i, w) in weights.iter().enumerate() {
        if draw <= *w {
            chosen = i;
            break;
        }
        draw -= w;
    }

    let event_id = &members[chosen].event_id;
    resolve_event(session, catalog, event_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::pack::{EventDef, EventGroupMember};
    use crate::rng::SmallRngSource;

    fn catalog_with(events: Vec<EventDef>, groups: Vec<(&str, Vec<EventGroupMember>)>) -> Catalog {
        let mut catalog = Catalog::default();
        for e in events {
            catalog.event_index.insert(e.id.clone(), e);
        }
        for (gid, members) in groups {
            catalog.event_groups.insert(gid.to_string(), members);
        }
        catalog
    }

    #[test]
    fn resolves_known_event() {
        let catalog = catalog_with(
            vec![EventDef { id: "bandits".into(), text: "Bandits attack!".into() }],
            vec![],
        );
        let mut session = SessionState::default();
        let result = resolve_event(&mut session, &catalog, "bandits");
        assert!(result.warning.is_none());
        assert_eq!(session.event_history.len(), 1);
        assert_eq!(session.audit_log.len(), 1);
    }

    #[test]
    fn empty_group_warns_without_drawing() {
        let catalog = catalog_with(vec![], vec![("misfortunes", vec![])]);
        let mut session = SessionState::default();
        let mut rng = SmallRngSource::seeded(7);
        let result = resolve_random_event(&mut session, &catalog, "group:misfortunes", &mut rng);
        assert!(result.entry.is_none());
        assert!(result.warning.is_some());
        assert!(session.event_history.is_empty());
    }

    #[test]
    fn weighted_group_always_selects_a_member() {
        let catalog = catalog_with(
            vec![
                EventDef { id: "a".into(), text: "A".into() },
                EventDef { id: "b".into(), text: "B".into() },
            ],
            vec![(
                "mix",
                vec![
                    EventGroupMember { event_id: "a".into(), weight: Some(1) },
                    EventGroupMember { event_id: "b".into(), weight: Some(0) },
                ],
            )],
        );
        let mut session = SessionState::default();
        let mut rng = SmallRngSource::seeded(3);
        for _ in 0..10 {
            let result = resolve_random_event(&mut session, &catalog, "group:mix", &mut rng);
            assert!(result.entry.is_some());
        }
    }
}
