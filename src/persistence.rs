//! Persistence layer for the active run state.
//!
//! Supports both JSON (human-readable) and bincode (efficient binary) formats.

use crate::error::{Result, SkillEvalError};
use crate::eval::RunState;
use std::fs;
use std::path::{Path, PathBuf};

/// Default filename for the run state.
pub const DEFAULT_STATE_FILENAME: &str = "run_state.json";

/// Save format for run state files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveFormat {
    /// JSON format (human-readable, larger).
    Json,
    /// Bincode format (binary, compact).
    Bincode,
}

impl SaveFormat {
    /// Determine format from file extension.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("bin") | Some("bincode") => SaveFormat::Bincode,
            _ => SaveFormat::Json,
        }
    }
}

/// Save a RunState to a file.
pub fn save_state(state: &RunState, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| SkillEvalError::io(parent, e))?;
        }
    }

    let data = match SaveFormat::from_path(path) {
        SaveFormat::Json => serde_json::to_string_pretty(state)
            .map_err(|e| SkillEvalError::Serialization(e.to_string()))?
            .into_bytes(),
        SaveFormat::Bincode => bincode::encode_to_vec(state, bincode::config::standard())
            .map_err(|e| SkillEvalError::Serialization(e.to_string()))?,
    };

    // Write beside the target and rename so a crash never leaves half a file.
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, &data).map_err(|e| SkillEvalError::io(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| SkillEvalError::io(path, e))?;

    Ok(())
}

/// Load a RunState, or `None` when nothing has been saved yet.
pub fn load_state(path: &Path) -> Result<Option<RunState>> {
    if !state_exists(path) {
        return Ok(None);
    }

    let data = fs::read(path).map_err(|e| SkillEvalError::io(path, e))?;
    let state = match SaveFormat::from_path(path) {
        SaveFormat::Json => serde_json::from_slice(&data)
            .map_err(|e| SkillEvalError::Serialization(e.to_string()))?,
        SaveFormat::Bincode => {
            let (state, _): (RunState, usize) =
                bincode::decode_from_slice(&data, bincode::config::standard())
                    .map_err(|e| SkillEvalError::Serialization(e.to_string()))?;
            state
        }
    };

    Ok(Some(state))
}

/// Check if a state file exists at the given path.
pub fn state_exists(path: &Path) -> bool {
    path.exists() && path.is_file()
}

/// File-backed store for one run state.
#[derive(Debug, Clone)]
pub struct RunStore {
    path: PathBuf,
}

impl RunStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn save(&self, state: &RunState) -> Result<()> {
        save_state(state, &self.path)
    }

    pub fn load(&self) -> Result<Option<RunState>> {
        load_state(&self.path)
    }

    /// Remove the saved state. Missing files are not an error.
    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SkillEvalError::io(&self.path, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::{
        CriterionScore, EvaluationItem, GenerationResult, JudgeResult, ParsedScore, Phase, Winner,
    };
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn create_test_state() -> RunState {
        let mut items = EvaluationItem::batch(&["build a button".to_string(), "write a haiku".to_string()]);
        items[0].result_a = GenerationResult::success("<button>A</button>", 120);
        items[0].result_b = GenerationResult::success("<button>B</button>", 95);
        items[0].screenshot_a = Some("iVBOR".to_string());
        items[0].judge = JudgeResult::complete(
            "**[A]**".to_string(),
            Some(ParsedScore {
                winner: Some(Winner::A),
                score_a: Some(4.5),
                score_b: Some(3.0),
                breakdown: Some(BTreeMap::from([(
                    "clarity".to_string(),
                    CriterionScore { a: 5.0, b: 3.0 },
                )])),
            }),
            800,
        );
        items[1].result_a = GenerationResult::failure("rate limited", Some(10));

        RunState {
            run_id: 3,
            evaluations: items,
            phase: Phase::Complete,
            error: Some("earlier problem".to_string()),
            started_at: Some(1_700_000_000_000),
            ended_at: Some(1_700_000_050_000),
            ..Default::default()
        }
    }

    #[test]
    fn test_save_and_load_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");

        let original = create_test_state();
        save_state(&original, &path).unwrap();
        assert!(state_exists(&path));

        let loaded = load_state(&path).unwrap().unwrap();
        assert_eq!(loaded, original);

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"status\": \"complete\""));
    }

    #[test]
    fn test_save_and_load_bincode() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.bin");

        let original = create_test_state();
        save_state(&original, &path).unwrap();

        let loaded = load_state(&path).unwrap().unwrap();
        assert_eq!(loaded, original);
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(SaveFormat::from_path(Path::new("a.json")), SaveFormat::Json);
        assert_eq!(SaveFormat::from_path(Path::new("a.bin")), SaveFormat::Bincode);
        assert_eq!(SaveFormat::from_path(Path::new("a.bincode")), SaveFormat::Bincode);
        assert_eq!(SaveFormat::from_path(Path::new("a")), SaveFormat::Json);
    }

    #[test]
    fn test_missing_file_is_none() {
        let dir = TempDir::new().unwrap();
        assert!(load_state(&dir.path().join("absent.json")).unwrap().is_none());
    }

    #[test]
    fn test_corrupt_file_errors() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(load_state(&path), Err(SkillEvalError::Serialization(_))));
    }

    #[test]
    fn test_store_creates_dirs_and_clears() {
        let dir = TempDir::new().unwrap();
        let store = RunStore::new(dir.path().join("nested/deeper").join(DEFAULT_STATE_FILENAME));

        store.save(&create_test_state()).unwrap();
        assert!(store.load().unwrap().is_some());

        store.clear().unwrap();
        assert!(!state_exists(store.path()));
        store.clear().unwrap();
    }
}
