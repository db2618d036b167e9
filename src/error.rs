use std::fmt;

/// Crate-wide error type. Every public operation on [`crate::engine::BastionEngine`]
/// catches these internally and packages them into a `success=false` result record —
/// nothing here is meant to cross the engine boundary (spec §7).
#[derive(Debug)]
pub enum EngineError {
    Io(std::io::Error),
    Json(serde_json::Error),
    Config(String),
    Validation(Vec<String>),
    NotFound(String),
    Invalid(String),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Io(e) => write!(f, "io error: {e}"),
            EngineError::Json(e) => write!(f, "json error: {e}"),
            EngineError::Config(m) => write!(f, "config error: {m}"),
            EngineError::Validation(errs) => write!(f, "validation failed: {}", errs.join("; ")),
            EngineError::NotFound(m) => write!(f, "not found: {m}"),
            EngineError::Invalid(m) => write!(f, "invalid: {m}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<std::io::Error> for EngineError {
    fn from(e: std::io::Error) -> Self {
        EngineError::Io(e)
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::Json(e)
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
