use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::models::Observation;
use crate::utils::error::StateError;

pub type Observations = BTreeMap<String, Observation>;

/// Loads the persisted observations. A missing file means an empty mapping,
/// not an error.
pub fn load(path: &Path) -> Result<Observations, StateError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Observations::new()),
        Err(e) => {
            return Err(StateError::Read {
                path: display(path),
                source: e,
            });
        }
    };
    serde_json::from_str(&raw).map_err(|e| StateError::Decode {
        path: display(path),
        source: e,
    })
}

/// Writes the full mapping atomically: encode, write a sibling temp file,
/// rename over the target. Concurrent readers only ever see a fully-written
/// version.
pub fn save(path: &Path, observations: &Observations) -> Result<(), StateError> {
    let encoded = serde_json::to_string_pretty(observations).map_err(StateError::Encode)?;
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, encoded).map_err(|e| StateError::Write {
        path: display(&tmp),
        source: e,
    })?;
    fs::rename(&tmp, path).map_err(|e| StateError::Write {
        path: display(path),
        source: e,
    })
}

fn display(path: &Path) -> String {
    path.display().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn sample_observations() -> Observations {
        let mut observations = Observations::new();
        observations.insert(
            "ippodo-sayaka".to_string(),
            Observation {
                last_value: json!("Sold Out"),
                in_stock: false,
                last_changed_at: Some(chrono::Utc::now()),
                last_alerted_at: None,
            },
        );
        observations
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        let observations = sample_observations();

        save(&path, &observations).unwrap();
        let loaded = load(&path).unwrap();

        assert_eq!(loaded, observations);
    }

    #[test]
    fn test_missing_file_loads_empty() {
        let dir = TempDir::new().unwrap();
        let loaded = load(&dir.path().join("nope.json")).unwrap();
        assert!(loaded.is_empty());
    }

    #[test]
    fn test_save_leaves_no_temp_file_behind() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");

        save(&path, &sample_observations()).unwrap();
        save(&path, &sample_observations()).unwrap();

        assert!(path.exists());
        assert!(!dir.path().join("state.tmp").exists());
    }

    #[test]
    fn test_corrupt_file_is_a_decode_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, "{broken").unwrap();

        let err = load(&path).unwrap_err();
        assert!(matches!(err, StateError::Decode { .. }));
    }
}
