//! `BastionEngine` — the facade that owns the compiled config and catalog
//! and exposes the full operation surface (spec §6) as inherent methods,
//! wiring the sub-services together the way `FacilityManager` does in the
//! original, but via plain struct fields rather than injected closures
//! (spec §9 Design Notes).

use crate::config::catalog::{Catalog, CompiledConfig};
use crate::config::loader::{self, LoadReport};
use crate::config::model::{BastionConfig, SettingsOverride};
use crate::config::pack::{Effect, Pack};
use crate::config::validate::{self, Mode};
use crate::currency::CurrencyModel;
use crate::error::Result;
use crate::events;
use crate::facility;
use crate::formula;
use crate::ledger::{Ledger, LedgerResult};
use crate::npc;
use crate::orders;
use crate::rng::{Rng, SmallRngSource};
use crate::session;
use crate::state::{AuditContext, AuditEntry, Bastion, SessionState};
use std::collections::HashMap;
use std::path::PathBuf;
use uuid::Uuid;

/// Filesystem layout this engine reads/writes against (spec §6: sessions
/// under `data/sessions/`, packs under `data/facilities/` + `custom_packs/`).
pub struct EnginePaths {
    pub base_config: PathBuf,
    pub settings: PathBuf,
    pub core_packs_dir: PathBuf,
    pub custom_packs_dir: PathBuf,
    pub sessions_dir: PathBuf,
}

pub struct BastionEngine {
    paths: EnginePaths,
    mode: Mode,
    config: CompiledConfig,
    catalog: Catalog,
    packs: Vec<Pack>,
    settings: Option<SettingsOverride>,
    loaded_pack_ids: Vec<String>,
    session: Option<SessionState>,
    rng: Box<dyn Rng>,
}

#[derive(Debug, Default)]
pub struct SimpleResult {
    pub success: bool,
    pub message: String,
}

impl BastionEngine {
    /// Loads the base config, settings overlay, and content packs, compiles
    /// the catalog, and returns a ready-to-use engine with no active
    /// session. Fatal (strict-mode) validation errors propagate as `Err`;
    /// everything past this point returns data, never an error (spec §7).
    pub fn load(paths: EnginePaths, mode: Mode) -> Result<Self> {
        let base = loader::load_base_config(&paths.base_config)?;
        let settings = loader::load_settings(&paths.settings)?;
        let packs = loader::load_packs(&paths.core_packs_dir, &paths.custom_packs_dir)?;
        let (config, catalog, report) = loader::build(base, settings.clone(), packs.clone(), mode)?;
        for w in &report.warnings {
            log::warn!("{w}");
        }
        Ok(Self {
            paths,
            mode,
            config,
            catalog,
            packs,
            settings,
            loaded_pack_ids: report.loaded_pack_ids,
            session: None,
            rng: Box::new(SmallRngSource::from_entropy()),
        })
    }

    /// Swaps in a deterministic RNG (tests, replay tooling).
    pub fn with_rng(mut self, rng: Box<dyn Rng>) -> Self {
        self.rng = rng;
        self
    }

    fn no_active_session<T: Default>() -> T {
        T::default()
    }

    // --- C11 Session Manager -------------------------------------------------

    pub fn create_session(&mut self, session_name: &str, dm_name: Option<&str>, bastion_name: &str) -> Result<session::SaveResult> {
        let now = session::now_stamp();
        let mut state = SessionState {
            session_id: Uuid::now_v7().to_string(),
            session_name: session_name.to_string(),
            dm_name: dm_name.unwrap_or("DM").to_string(),
            created: now.clone(),
            last_modified: now,
            current_turn: 0,
            bastion: Bastion { name: bastion_name.to_string(), ..Default::default() },
            players: Vec::new(),
            loaded_packs: self.loaded_pack_ids.clone(),
            turn_log: Vec::new(),
            audit_log: Vec::new(),
            event_history: Vec::new(),
            session_filename: None,
        };
        let result = session::create_session(&self.paths.sessions_dir, &mut state)?;
        self.session = Some(state);
        Ok(result)
    }

    pub fn save_session(&mut self) -> Result<session::SaveResult> {
        match self.session.as_mut() {
            Some(state) => session::save_session(&self.paths.sessions_dir, state),
            None => Ok(session::SaveResult { success: false, message: "no active session".into(), filename: None }),
        }
    }

    pub fn load_session(&mut self, filename: &str) -> Result<SimpleResult> {
        let state = session::load_session(&self.paths.sessions_dir, filename)?;
        self.session = Some(state);
        Ok(SimpleResult { success: true, message: "session loaded".into() })
    }

    pub fn load_latest_session(&mut self) -> Result<SimpleResult> {
        match session::load_latest_session(&self.paths.sessions_dir)? {
            Some(state) => {
                self.session = Some(state);
                Ok(SimpleResult { success: true, message: "session loaded".into() })
            }
            None => Ok(SimpleResult { success: false, message: "no sessions found".into() }),
        }
    }

    pub fn list_sessions(&self) -> Result<Vec<session::SessionSummary>> {
        session::list_sessions(&self.paths.sessions_dir)
    }

    pub fn delete_session(&mut self, filename: &str) -> Result<SimpleResult> {
        session::delete_session(&self.paths.sessions_dir, filename)?;
        if self.session.as_ref().and_then(|s| s.session_filename.as_deref()) == Some(filename) {
            self.session = None;
        }
        Ok(SimpleResult { success: true, message: "session deleted".into() })
    }

    pub fn backup_session(&self) -> Result<SimpleResult> {
        let Some(filename) = self.session.as_ref().and_then(|s| s.session_filename.clone()) else {
            return Ok(SimpleResult { success: false, message: "no active session".into() });
        };
        let backup_name = session::backup_session(&self.paths.sessions_dir, &filename)?;
        Ok(SimpleResult { success: true, message: format!("backed up to '{backup_name}'") })
    }

    pub fn get_session_info(&self, filename: &str) -> Result<session::SessionSummary> {
        session::get_session_info(&self.paths.sessions_dir, filename)
    }

    pub fn current_session(&self) -> Option<&SessionState> {
        self.session.as_ref()
    }

    // --- C5 Ledger ------------------------------------------------------------

    pub fn apply_effects(&mut self, effects: &[Effect], context: AuditContext) -> LedgerResult {
        let Some(session) = self.session.as_mut() else {
            return LedgerResult { success: false, errors: vec!["no active session".into()], entry: None };
        };
        Ledger::apply_effects(session, effects, context, &self.config.currency_model)
    }

    pub fn add_audit_entry(&mut self, entry: AuditEntry) -> SimpleResult {
        let Some(session) = self.session.as_mut() else {
            return SimpleResult { success: false, message: "no active session".into() };
        };
        session.audit_log.push(entry);
        SimpleResult { success: true, message: "audit entry recorded".into() }
    }

    // --- C9 Facility Lifecycle --------------------------------------------

    pub fn add_build_facility(&mut self, facility_id: &str, allow_negative: bool) -> facility::BuildResult {
        let Some(session) = self.session.as_mut() else {
            return Self::no_active_session();
        };
        facility::build_facility(session, &self.catalog, &self.config.base, &self.config.currency_model, facility_id, allow_negative)
    }

    pub fn add_upgrade_facility(&mut self, facility_id: &str, allow_negative: bool) -> facility::BuildResult {
        let Some(session) = self.session.as_mut() else {
            return Self::no_active_session();
        };
        facility::upgrade_facility(session, &self.catalog, &self.config.base, &self.config.currency_model, facility_id, allow_negative)
    }

    pub fn demolish_facility(&mut self, facility_id: &str) -> facility::DemolishResult {
        let Some(session) = self.session.as_mut() else {
            return Self::no_active_session();
        };
        facility::demolish_facility(
            session,
            &self.catalog,
            &self.config.base,
            &self.config.currency_model,
            facility_id,
            self.config.base.internal_settings.facility_refund_ratio,
        )
    }

    pub fn set_facility_owner(&mut self, facility_id: &str, player_id: Option<String>) -> facility::OwnerResult {
        let Some(session) = self.session.as_mut() else {
            return Self::no_active_session();
        };
        facility::set_facility_owner(session, &self.config.base, facility_id, player_id)
    }

    pub fn get_facility_states(&self) -> Vec<facility::FacilityStateInfo> {
        match self.session.as_ref() {
            Some(session) => facility::get_facility_states(session, &self.catalog),
            None => Vec::new(),
        }
    }

    pub fn advance_turn(&mut self) -> facility::AdvanceTurnResult {
        let Some(session) = self.session.as_mut() else {
            return Self::no_active_session();
        };
        facility::advance_turn(session, &self.config.base, &self.config.currency_model)
    }

    // --- C8 NPC Service ---------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    pub fn hire_npc(
        &mut self,
        name: &str,
        profession: &str,
        level: u8,
        upkeep: HashMap<String, u32>,
        facility_id: Option<&str>,
    ) -> npc::HireResult {
        let currency_types = self.config.base.currency.types.clone();
        let Some(session) = self.session.as_mut() else {
            return Self::no_active_session();
        };
        npc::hire_npc(session, &self.catalog, self.rng.as_mut(), &currency_types, name, profession, level, upkeep, facility_id)
    }

    pub fn move_npc(&mut self, npc_id: &str, target_facility_id: Option<&str>, force: bool) -> npc::MoveResult {
        let Some(session) = self.session.as_mut() else {
            return Self::no_active_session();
        };
        npc::move_npc(session, &self.catalog, npc_id, target_facility_id, force)
    }

    pub fn fire_npc(&mut self, npc_id: &str) -> npc::FireResult {
        let Some(session) = self.session.as_mut() else {
            return Self::no_active_session();
        };
        npc::fire_npc(session, npc_id)
    }

    // --- C10 Order Engine ---------------------------------------------------

    pub fn start_order(&mut self, facility_id: &str, order_def_id: &str, npc_id: &str) -> orders::StartOrderResult {
        let Some(session) = self.session.as_mut() else {
            return Self::no_active_session();
        };
        orders::start_order(session, &self.catalog, facility_id, order_def_id, npc_id)
    }

    pub fn lock_order_roll(&mut self, facility_id: &str, order_id: &str, roll: Option<i64>, auto: bool) -> orders::SimpleResult {
        let Some(session) = self.session.as_mut() else {
            return orders::SimpleResult { success: false, message: "no active session".into() };
        };
        orders::lock_order_roll(session, &self.catalog, &self.config.base, facility_id, order_id, roll, auto, self.rng.as_mut())
    }

    pub fn save_formula_inputs(&mut self, facility_id: &str, order_id: &str, formula_id: &str, inputs: HashMap<String, f64>) -> orders::SimpleResult {
        let Some(session) = self.session.as_mut() else {
            return orders::SimpleResult { success: false, message: "no active session".into() };
        };
        orders::save_formula_inputs(session, facility_id, order_id, formula_id, inputs)
    }

    pub fn evaluate_order(&mut self, facility_id: &str, order_id: &str) -> orders::EvaluateResult {
        let Some(session) = self.session.as_mut() else {
            return Self::no_active_session();
        };
        orders::evaluate_order(session, &self.catalog, &self.config.base, &self.config.currency_model, facility_id, order_id, self.rng.as_mut())
    }

    pub fn evaluate_ready_orders(&mut self) -> Vec<orders::EvaluateResult> {
        let Some(session) = self.session.as_mut() else {
            return Vec::new();
        };
        orders::evaluate_ready_orders(session, &self.catalog, &self.config.base, &self.config.currency_model, self.rng.as_mut())
    }

    pub fn roll_and_evaluate_ready_orders(&mut self) -> Vec<orders::EvaluateResult> {
        let Some(session) = self.session.as_mut() else {
            return Vec::new();
        };
        orders::roll_and_evaluate_ready_orders(session, &self.catalog, &self.config.base, &self.config.currency_model, self.rng.as_mut())
    }

    // --- C6 Formula Engine / C7 Event Service direct access -----------------
    // Exposed for callers that want to resolve a formula or event outside of
    // an order's evaluate pipeline (e.g. a manual GM action effect).

    pub fn resolve_formula(&mut self, formula_id: &str, inputs: &HashMap<String, f64>) -> Option<formula::ResolvedFormula> {
        let def = self.catalog.formula_index.get(formula_id)?.clone();
        let limits = crate::expr::ExprLimits {
            dice_max_count: self.config.base.internal_settings.dice_max_count,
            dice_max_sides: self.config.base.internal_settings.dice_max_sides,
            formula_max_len: self.config.base.internal_settings.formula_max_len,
        };
        let session = self.session.as_ref()?;
        Some(formula::resolve(&def, inputs, session, &self.config.currency_model, &self.config.base.check_profiles, &limits, self.rng.as_mut()))
    }

    pub fn resolve_event(&mut self, event_id: &str) -> events::EventResult {
        let Some(session) = self.session.as_mut() else {
            return events::EventResult { entry: None, warning: Some("no active session".into()) };
        };
        events::resolve_event(session, &self.catalog, event_id)
    }

    // --- C3/C4 Config & Pack Loader / Validator -----------------------------

    pub fn validate_packs(&self) -> Vec<String> {
        let mut messages = Vec::new();
        for pack in &self.packs {
            let mut clone = pack.clone();
            let result = validate::validate_pack(&mut clone, &self.config.base.check_profiles, self.mode);
            for w in result.warnings {
                messages.push(format!("[{}] {w}", pack.pack_id));
            }
            for e in result.errors {
                messages.push(format!("[{}] {e}", pack.pack_id));
            }
        }
        messages
    }

    pub fn get_currency_model(&self) -> &CurrencyModel {
        &self.config.currency_model
    }

    pub fn get_bastion_config(&self) -> &BastionConfig {
        &self.config.base
    }

    pub fn get_settings(&self) -> Option<&SettingsOverride> {
        self.settings.as_ref()
    }

    pub fn save_settings(&mut self, settings: SettingsOverride) -> Result<SimpleResult> {
        let text = serde_json::to_string_pretty(&settings)?;
        std::fs::write(&self.paths.settings, text)?;
        self.settings = Some(settings);
        let report = self.reload_config()?;
        Ok(SimpleResult { success: true, message: format!("settings saved, {} warning(s) on reload", report.warnings.len()) })
    }

    /// Re-reads the base config, settings overlay, and packs from disk and
    /// recompiles the catalog in place (spec §9: "make reload an explicit
    /// operation that swaps the pointer atomically"). The active session is
    /// untouched; only catalog/config lookups observe the new definitions.
    pub fn reload_config(&mut self) -> Result<LoadReport> {
        let base = loader::load_base_config(&self.paths.base_config)?;
        let settings = loader::load_settings(&self.paths.settings)?;
        let packs = loader::load_packs(&self.paths.core_packs_dir, &self.paths.custom_packs_dir)?;
        let (config, catalog, report) = loader::build(base, settings.clone(), packs.clone(), self.mode)?;
        self.config = config;
        self.catalog = catalog;
        self.packs = packs;
        self.settings = settings;
        self.loaded_pack_ids = report.loaded_pack_ids.clone();
        Ok(report)
    }
}
