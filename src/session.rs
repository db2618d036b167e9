//! C11 — Session Manager. Creates the initial session file, persists/loads/
//! lists/deletes snapshots under a sessions directory, and exposes a
//! timestamped backup helper and a lightweight metadata-only read
//! (SPEC_FULL.md §C.1, §C.3).

use crate::error::{EngineError, Result};
use crate::state::SessionState;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

fn slugify(name: &str) -> String {
    let mut out = String::new();
    let mut last_was_dash = true;
    for c in name.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c);
            last_was_dash = false;
        } else if !last_was_dash {
            out.push('-');
            last_was_dash = true;
        }
    }
    let trimmed = out.trim_end_matches('-');
    if trimmed.is_empty() { "session".to_string() } else { trimmed.to_string() }
}

pub(crate) fn now_stamp() -> String {
    let secs = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0);
    secs.to_string()
}

fn filename_for(session: &SessionState) -> String {
    let stem = if !session.session_id.trim().is_empty() {
        slugify(&session.session_id)
    } else {
        slugify(&session.bastion.name)
    };
    format!("{stem}.json")
}

fn path_for(dir: &Path, filename: &str) -> PathBuf {
    dir.join(filename)
}

#[derive(Debug, Default)]
pub struct SaveResult {
    pub success: bool,
    pub message: String,
    pub filename: Option<String>,
}

/// Spec §4.11 create: derives a stable filename from `session_id` (falling
/// back to a slugified bastion name), stamps `last_modified`, and writes the
/// initial snapshot. Subsequent saves reuse the stored filename.
pub fn create_session(dir: &Path, session: &mut SessionState) -> Result<SaveResult> {
    fs::create_dir_all(dir)?;
    let filename = filename_for(session);
    session.session_filename = Some(filename.clone());
    session.last_modified = now_stamp();
    write_session(dir, &filename, session)?;
    log::info!("created session '{filename}'");
    Ok(SaveResult { success: true, message: "session created".into(), filename: Some(filename) })
}

/// Spec §4.11 save: rewrites the file in full, reusing `_session_filename`
/// recorded at creation/load time.
pub fn save_session(dir: &Path, session: &mut SessionState) -> Result<SaveResult> {
    let Some(filename) = session.session_filename.clone() else {
        return Ok(SaveResult { success: false, message: "session has no filename; call create_session first".into(), filename: None });
    };
    session.last_modified = now_stamp();
    write_session(dir, &filename, session)?;
    Ok(SaveResult { success: true, message: "session saved".into(), filename: Some(filename) })
}

fn write_session(dir: &Path, filename: &str, session: &SessionState) -> Result<()> {
    let text = serde_json::to_string_pretty(session)?;
    fs::write(path_for(dir, filename), text)?;
    Ok(())
}

/// Spec §4.11 load: reads the file and attaches `_session_filename`.
pub fn load_session(dir: &Path, filename: &str) -> Result<SessionState> {
    let text = fs::read_to_string(path_for(dir, filename))
        .map_err(|_| EngineError::NotFound(format!("session '{filename}' not found")))?;
    let mut session: SessionState = serde_json::from_str(&text)?;
    session.session_filename = Some(filename.to_string());
    migrate(&mut session);
    Ok(session)
}

/// Forward-compat migration hook (spec §4.11): reads `metadata.version` and
/// passes unchanged for the current version. No prior version exists yet,
/// so this is a no-op placeholder with a defined seam.
fn migrate(_session: &mut SessionState) {}

/// Spec §4.11 load_latest: the most recently modified `*.json` file in `dir`.
pub fn load_latest_session(dir: &Path) -> Result<Option<SessionState>> {
    if !dir.is_dir() {
        return Ok(None);
    }
    let mut latest: Option<(PathBuf, SystemTime)> = None;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().map(|e| e != "json").unwrap_or(true) {
            continue;
        }
        let modified = entry.metadata()?.modified().unwrap_or(UNIX_EPOCH);
        if latest.as_ref().map(|(_, m)| modified > *m).unwrap_or(true) {
            latest = Some((path, modified));
        }
    }
    let Some((path, _)) = latest else {
        return Ok(None);
    };
    let filename = path.file_name().and_then(|n| n.to_str()).unwrap_or_default().to_string();
    Ok(Some(load_session(dir, &filename)?))
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SessionSummary {
    pub filename: String,
    pub session_id: String,
    pub session_name: String,
    pub current_turn: u32,
    pub last_modified: String,
}

#[derive(Debug, serde::Deserialize)]
struct SessionInfoRaw {
    #[serde(default)]
    session_id: String,
    #[serde(default)]
    session_name: String,
    #[serde(default)]
    current_turn: u32,
    #[serde(default)]
    last_modified: String,
}

/// Spec §4.11 list: enumerates every session file in `dir` without loading
/// full state for each.
pub fn list_sessions(dir: &Path) -> Result<Vec<SessionSummary>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut out = Vec::new();
    let mut entries: Vec<_> = fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().map(|e| e == "json").unwrap_or(false))
        .collect();
    entries.sort();
    for path in entries {
        let filename = path.file_name().and_then(|n| n.to_str()).unwrap_or_default().to_string();
        match get_session_info(dir, &filename) {
            Ok(summary) => out.push(summary),
            Err(e) => log::warn!("skipping unreadable session {filename}: {e}"),
        }
    }
    Ok(out)
}

/// SPEC_FULL.md §C.3: a metadata-only read, cheaper than [`load_session`]
/// when callers only need the session picker's display fields.
pub fn get_session_info(dir: &Path, filename: &str) -> Result<SessionSummary> {
    let text = fs::read_to_string(path_for(dir, filename))
        .map_err(|_| EngineError::NotFound(format!("session '{filename}' not found")))?;
    let raw: SessionInfoRaw = serde_json::from_str(&text)?;
    Ok(SessionSummary {
        filename: filename.to_string(),
        session_id: raw.session_id,
        session_name: raw.session_name,
        current_turn: raw.current_turn,
        last_modified: raw.last_modified,
    })
}

/// Spec §4.11 delete.
pub fn delete_session(dir: &Path, filename: &str) -> Result<()> {
    fs::remove_file(path_for(dir, filename)).map_err(|_| EngineError::NotFound(format!("session '{filename}' not found")))?;
    log::info!("deleted session '{filename}'");
    Ok(())
}

/// SPEC_FULL.md §C.1 (`session_manager.py::backup_session`): copies the
/// current session file to a timestamped backup path before a risky
/// operation, without touching the primary file.
pub fn backup_session(dir: &Path, filename: &str) -> Result<String> {
    let source = path_for(dir, filename);
    if !source.exists() {
        return Err(EngineError::NotFound(format!("session '{filename}' not found")));
    }
    let stem = filename.strip_suffix(".json").unwrap_or(filename);
    let backup_name = format!("{stem}.backup-{}.json", now_stamp());
    fs::copy(&source, path_for(dir, &backup_name))?;
    log::info!("backed up session '{filename}' to '{backup_name}'");
    Ok(backup_name)
}
