//! Snapshot input files
//!
//! Inputs are JSON, optionally zstd-compressed (`.json.zst`). A file holds
//! either one [`SnapshotInput`] or a list of them.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::snapshot::SnapshotInput;

const ZSTD_LEVEL: i32 = 3;

#[derive(Deserialize)]
#[serde(untagged)]
enum InputFile {
    Many(Vec<SnapshotInput>),
    One(Box<SnapshotInput>),
}

fn is_compressed(path: &Path) -> bool {
    path.to_string_lossy().ends_with(".zst")
}

fn read_json_bytes(path: &Path) -> Result<Vec<u8>> {
    let raw = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    if is_compressed(path) {
        zstd::decode_all(&raw[..]).with_context(|| format!("Failed to decompress {}", path.display()))
    } else {
        Ok(raw)
    }
}

/// Load every input in a `.json` / `.json.zst` file
pub fn load_inputs(path: &Path) -> Result<Vec<SnapshotInput>> {
    let json = read_json_bytes(path)?;
    let file: InputFile =
        serde_json::from_slice(&json).with_context(|| format!("Failed to parse {}", path.display()))?;

    let inputs = match file {
        InputFile::Many(inputs) => inputs,
        InputFile::One(input) => vec![*input],
    };
    info!("Loaded {} inputs from {}", inputs.len(), path.display());
    Ok(inputs)
}

/// Write any serializable value as JSON, compressed when the path ends in `.zst`
pub fn save_json<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }

    let json = serde_json::to_vec_pretty(value)?;
    let bytes = if is_compressed(path) {
        zstd::encode_all(&json[..], ZSTD_LEVEL)?
    } else {
        json
    };
    std::fs::write(path, bytes).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

/// Input files in `dir`, sorted by name
pub fn list_input_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(vec![]);
    }

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("Failed to list {}", dir.display()))? {
        let path = entry?.path();
        let name = path.to_string_lossy();
        if name.ends_with(".json") || name.ends_with(".json.zst") {
            files.push(path);
        }
    }

    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::bars_from_closes;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("market-structure-{}-{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn test_round_trip_plain_and_compressed() {
        let dir = scratch_dir("cache");
        let input = SnapshotInput::new("ES", "5m", bars_from_closes(&[100.0, 101.0, 102.0]));

        save_json(&input, &dir.join("es.json")).unwrap();
        save_json(&vec![input.clone(), input], &dir.join("batch.json.zst")).unwrap();

        let one = load_inputs(&dir.join("es.json")).unwrap();
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].primary_bars().map(|b| b.len()), Some(3));

        let many = load_inputs(&dir.join("batch.json.zst")).unwrap();
        assert_eq!(many.len(), 2);

        let files = list_input_files(&dir).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files[0].ends_with("batch.json.zst"));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_missing_file_reports_path() {
        let err = load_inputs(Path::new("/nonexistent/input.json")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/input.json"));
    }

    #[test]
    fn test_missing_dir_lists_nothing() {
        assert!(list_input_files(Path::new("/nonexistent/dir")).unwrap().is_empty());
    }
}
