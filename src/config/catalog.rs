use super::pack::{EventDef, EventGroupMember, FacilityDef, FormulaDef};
use crate::currency::CurrencyModel;
use crate::state::StatDescriptor;
use std::collections::HashMap;

/// The immutable, load-once compilation output of C3/C4: facility
/// definitions keyed by id, the event index/group index, and the formula
/// index (aliased by both `name` and `id`, matching
/// `facility_manager.py::_load_formula_engines`).
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    pub facilities: HashMap<String, FacilityDef>,
    pub event_index: HashMap<String, EventDef>,
    pub event_groups: HashMap<String, Vec<EventGroupMember>>,
    pub formula_index: HashMap<String, FormulaDef>,
    pub stats_registry: HashMap<String, StatDescriptor>,
}

impl Catalog {
    pub fn facility(&self, id: &str) -> Option<&FacilityDef> {
        self.facilities.get(id)
    }

    pub fn order_def<'a>(
        &'a self,
        facility_id: &str,
        order_id: &str,
    ) -> Option<&'a crate::config::pack::OrderDef> {
        self.facility(facility_id)?
            .orders
            .iter()
            .find(|o| o.id == order_id)
    }

    /// The unique facility whose `parent` equals `facility_id`; `None` if
    /// there is none, and logs a warning on ambiguity (spec §4.9 Upgrade).
    pub fn upgrade_target(&self, facility_id: &str) -> Option<&FacilityDef> {
        let mut matches = self
            .facilities
            .values()
            .filter(|f| f.parent.as_deref() == Some(facility_id));
        let first = matches.next()?;
        if matches.next().is_some() {
            log::warn!("ambiguous upgrade target for facility '{facility_id}'");
            return None;
        }
        Some(first)
    }
}

#[derive(Debug, Clone)]
pub struct CompiledConfig {
    pub base: crate::config::model::BastionConfig,
    pub currency_model: CurrencyModel,
}
