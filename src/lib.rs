//! Rules engine for a turn-based "bastion" management game: a content-pack
//! loader/validator, a currency model, a ledger, a formula/expression
//! evaluator, an event sampler, NPC and facility lifecycles, and an order
//! state machine, wired together behind [`engine::BastionEngine`].
//!
//! No error bubbles past the engine boundary: every public operation
//! returns a result record carrying `success`/`message` rather than
//! propagating a `Result` across the call, except for the handful of
//! fallible construction-time operations (loading config/packs, opening a
//! session file) that surface an [`error::EngineError`].

pub mod config;
pub mod currency;
pub mod engine;
pub mod error;
pub mod events;
pub mod expr;
pub mod facility;
pub mod formula;
pub mod ledger;
pub mod npc;
pub mod orders;
pub mod rng;
pub mod session;
pub mod state;

/// Default NPC level range, used by validation and by docs/tests rather
/// than scattered magic numbers.
pub const NPC_LEVEL_RANGE: std::ops::RangeInclusive<u8> = 1..=3;

/// Default facility-owner cap applied when a base config omits
/// `facility_owner_limit` (spec §9 Open Question #2, resolved in
/// SPEC_FULL.md §D.2).
pub const DEFAULT_FACILITY_OWNER_LIMIT: u32 = 3;
