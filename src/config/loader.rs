//! C3 — Config & Pack Loader. Reads the base config, an optional settings
//! overlay, and zero or more content packs from a core (read-only) and a
//! custom (writable) directory, merges them per spec §4.3, and produces an
//! immutable [`CompiledConfig`] + [`Catalog`].

use super::catalog::{Catalog, CompiledConfig};
use super::model::BastionConfig;
use super::pack::{MechanicDef, Pack};
use super::validate;
use crate::currency::{self, ConversionEdge};
use crate::error::{EngineError, Result};
use crate::state::StatDescriptor;
use std::collections::HashSet;
use std::path::Path;

pub struct LoadReport {
    pub warnings: Vec<String>,
    pub loaded_pack_ids: Vec<String>,
}

pub fn load_base_config(path: &Path) -> Result<BastionConfig> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

pub fn load_settings(path: &Path) -> Result<Option<super::model::SettingsOverride>> {
    if !path.exists() {
        return Ok(None);
    }
    let text = std::fs::read_to_string(path)?;
    Ok(Some(serde_json::from_str(&text)?))
}

/// Reads every `*.json` file in `dir` (sorted by filename for determinism),
/// ignoring a missing directory.
pub fn load_pack_dir(dir: &Path) -> Result<Vec<Pack>> {
    let mut out = Vec::new();
    if !dir.is_dir() {
        return Ok(out);
    }
    let mut entries: Vec<_> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().map(|e| e == "json").unwrap_or(false))
        .collect();
    entries.sort();
    for path in entries {
        let text = std::fs::read_to_string(&path)?;
        match serde_json::from_str::<Pack>(&text) {
            Ok(pack) => out.push(pack),
            Err(e) => log::warn!("skipping unparsable pack {}: {e}", path.display()),
        }
    }
    Ok(out)
}

/// Core packs load before custom packs (first-seen wins on id collisions),
/// matching `facility_manager.py::_load_facility_catalog`.
pub fn load_packs(core_dir: &Path, custom_dir: &Path) -> Result<Vec<Pack>> {
    let mut packs = load_pack_dir(core_dir)?;
    packs.extend(load_pack_dir(custom_dir)?);
    Ok(packs)
}

pub fn build(
    mut base: BastionConfig,
    settings: Option<super::model::SettingsOverride>,
    mut packs: Vec<Pack>,
    mode: validate::Mode,
) -> Result<(CompiledConfig, Catalog, LoadReport)> {
    let mut warnings = Vec::new();
    let mut loaded_pack_ids = Vec::new();

    // --- merge packs' allow-listed config contributions ---
    let mut seen_types: HashSet<String> = base.currency.types.iter().cloned().collect();
    let mut seen_profiles: HashSet<String> = base.check_profiles.keys().cloned().collect();

    for pack in &packs {
        let Some(cfg) = pack.config.as_ref() else {
            continue;
        };
        if let Some(currency) = cfg.get("currency") {
            if let Some(types) = currency.get("types").and_then(|v| v.as_array()) {
                for t in types {
                    if let Some(name) = t.as_str() {
                        if seen_types.insert(name.to_string()) {
                            base.currency.types.push(name.to_string());
                        } else {
                            warnings.push(format!(
                                "pack '{}' redeclares currency type '{}', ignored",
                                pack.pack_id, name
                            ));
                        }
                    }
                }
            }
            if let Some(edges) = currency.get("conversion").and_then(|v| v.as_array()) {
                for edge in edges {
                    if let Ok(e) =
                        serde_json::from_value::<super::model::ConversionEdgeDef>(edge.clone())
                    {
                        base.currency.conversion.push(e);
                    }
                }
            }
        }
        if let Some(profiles) = cfg.get("check_profiles").and_then(|v| v.as_object()) {
            for (name, def) in profiles {
                if seen_profiles.insert(name.clone()) {
                    if let Ok(profile) =
                        serde_json::from_value::<super::model::CheckProfile>(def.clone())
                    {
                        base.check_profiles.insert(name.clone(), profile);
                    }
                } else {
                    warnings.push(format!(
                        "pack '{}' redeclares check profile '{}', ignored (no override)",
                        pack.pack_id, name
                    ));
                }
            }
        }
        if let Some(classes) = cfg.get("player_classes").and_then(|v| v.as_array()) {
            base.player_classes.extend(classes.iter().cloned());
        }
    }

    // dedupe currency types preserving first order, conversion edges by
    // (from,to) with last occurrence winning.
    let mut dedup_seen = HashSet::new();
    base.currency.types.retain(|t| dedup_seen.insert(t.clone()));

    // --- settings overlay (allow-listed subset only) ---
    if let Some(settings) = settings {
        if let Some(currency) = settings.currency {
            if let Some(conversion) = currency.conversion {
                base.currency.conversion = conversion;
            }
            if let Some(hidden) = currency.hidden {
                let hidden_set: HashSet<&String> = hidden.iter().collect();
                let core_type = base.currency.types.first().cloned();
                base.currency
                    .types
                    .retain(|t| Some(t) == core_type.as_ref() || !hidden_set.contains(t));
                base.currency
                    .conversion
                    .retain(|e| !hidden_set.contains(&e.from) && !hidden_set.contains(&e.to));
            }
        }
        for (key, patch) in settings.default_build_costs {
            let entry = base.default_build_costs.entry(key).or_default();
            if let Some(cost) = patch.cost {
                entry.cost = cost;
            }
            if let Some(duration) = patch.duration_turns {
                entry.duration_turns = duration;
            }
        }
        if let Some(progression) = settings.npc_progression {
            if let Some(v) = progression.apprentice_to_experienced {
                base.npc_progression.apprentice_to_experienced = v;
            }
            if let Some(v) = progression.experienced_to_master {
                base.npc_progression.experienced_to_master = v;
            }
            if let Some(v) = progression.xp_per_success {
                base.npc_progression.xp_per_success = v;
            }
        }
        for (profile_name, patch) in settings.check_profiles {
            if let Some(profile) = base.check_profiles.get_mut(&profile_name) {
                for (level, fields) in patch.levels {
                    if level == "sides" {
                        continue;
                    }
                    if level == "default" {
                        profile.default = fields.merged_over(&profile.default);
                    } else {
                        let merged = fields.merged_over(
                            profile.levels.get(&level).unwrap_or(&profile.default),
                        );
                        profile.levels.insert(level, merged);
                    }
                }
            }
        }
    }

    // --- currency model ---
    let edges: Vec<ConversionEdge> = base
        .currency
        .conversion
        .iter()
        .map(|e| ConversionEdge {
            from: e.from.clone(),
            to: e.to.clone(),
            rate: e.rate,
        })
        .collect();
    let currency_model =
        currency::build_or_fallback(&base.currency.types, &edges, base.currency.base.as_deref());

    // --- validate + sanitize each pack, then assemble the catalog ---
    let mut catalog = Catalog::default();
    for pack in &mut packs {
        let result = validate::validate_pack(pack, &base.check_profiles, mode);
        for w in result.warnings {
            warnings.push(format!("[{}] {w}", pack.pack_id));
        }
        if matches!(mode, validate::Mode::Strict) && !result.errors.is_empty() {
            return Err(EngineError::Validation(result.errors));
        }
        for e in result.errors {
            warnings.push(format!("[{}] dropped: {e}", pack.pack_id));
        }

        loaded_pack_ids.push(pack.pack_id.clone());

        for facility in &mut pack.facilities {
            facility.source_pack = pack.pack_id.clone();
            if catalog.facilities.contains_key(&facility.id) {
                warnings.push(format!(
                    "facility id '{}' already defined, later pack '{}' ignored",
                    facility.id, pack.pack_id
                ));
                continue;
            }
            catalog.facilities.insert(facility.id.clone(), facility.clone());
        }

        for mechanic in &pack.custom_mechanics {
            match mechanic {
                MechanicDef::EventTable { events, groups } => {
                    for event in events {
                        catalog
                            .event_index
                            .entry(event.id.clone())
                            .or_insert_with(|| event.clone());
                    }
                    for (group_id, members) in groups {
                        catalog
                            .event_groups
                            .entry(group_id.clone())
                            .or_default()
                            .extend(members.clone());
                    }
                }
                MechanicDef::FormulaEngine(def) => {
                    if let Some(name) = &def.name {
                        catalog
                            .formula_index
                            .entry(name.clone())
                            .or_insert_with(|| (**def).clone());
                    }
                    catalog
                        .formula_index
                        .entry(def.id.clone())
                        .or_insert_with(|| (**def).clone());
                }
                MechanicDef::StatCounter {
                    key,
                    name,
                    min,
                    max,
                    ..
                } => {
                    catalog.stats_registry.entry(key.clone()).or_insert_with(|| StatDescriptor {
                        name: name.clone(),
                        min: *min,
                        max: *max,
                        source_pack: Some(pack.pack_id.clone()),
                    });
                }
                MechanicDef::MarketTracker(_) => {}
            }
        }
    }

    Ok((
        CompiledConfig {
            base,
            currency_model,
        },
        catalog,
        LoadReport {
            warnings,
            loaded_pack_ids,
        },
    ))
}
