//! C3/C4 — Config & Pack Loader, Pack/Config Validator.

pub mod catalog;
pub mod loader;
pub mod model;
pub mod pack;
pub mod validate;

pub use catalog::{Catalog, CompiledConfig};
pub use model::BastionConfig;
pub use pack::{Effect, FacilityDef, OrderDef, Pack};
