//! Artifact reading and writing
//!
//! Master structures and dependency maps are persisted as pretty-printed
//! JSON under `<prefix>_ms.json` / `<prefix>_dm.json`. Map keys are sorted
//! at the type level, so re-serializing a loaded artifact reproduces it
//! byte for byte and diffs across firmware versions stay small.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::master::MasterStruct;

#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("output file {0} already exists (pass --force-overwrite to replace)")]
    OutputCollision(PathBuf),

    #[error("malformed master struct {0}: {1}")]
    MalformedMsInput(PathBuf, serde_json::Error),

    #[error("serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Derive the artifact path from a user-given prefix. A trailing `.json`
/// or `_<kind>` is stripped first, so pointing `-o` at a previous artifact
/// produces the same family of file names instead of stacking suffixes.
pub fn artifact_path(prefix: &str, kind: &str) -> PathBuf {
    let base = prefix.strip_suffix(".json").unwrap_or(prefix);
    let tag = format!("_{}", kind);
    let base = base.strip_suffix(&tag).unwrap_or(base);
    PathBuf::from(format!("{}_{}.json", base, kind))
}

/// Serialize `value` to `<prefix>_<kind>.json`. Refuses to replace an
/// existing file unless `overwrite` is set.
pub fn write_artifact<T: Serialize>(
    value: &T,
    prefix: &str,
    kind: &str,
    overwrite: bool,
) -> Result<PathBuf, ArtifactError> {
    let path = artifact_path(prefix, kind);
    if path.exists() && !overwrite {
        return Err(ArtifactError::OutputCollision(path));
    }
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut json = serde_json::to_string_pretty(value)?;
    json.push('\n');
    std::fs::write(&path, json)?;
    log::info!("wrote {}", path.display());
    Ok(path)
}

/// Load a previously written master structure.
pub fn load_master(path: &Path) -> Result<MasterStruct, ArtifactError> {
    let content = std::fs::read_to_string(path)?;
    serde_json::from_str(&content)
        .map_err(|e| ArtifactError::MalformedMsInput(path.to_path_buf(), e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_path_suffix_handling() {
        assert_eq!(artifact_path("snapshot", "ms"), PathBuf::from("snapshot_ms.json"));
        assert_eq!(
            artifact_path("out/snapshot", "dm"),
            PathBuf::from("out/snapshot_dm.json")
        );
        // pointing at an existing artifact does not stack suffixes
        assert_eq!(
            artifact_path("snapshot_ms.json", "ms"),
            PathBuf::from("snapshot_ms.json")
        );
        assert_eq!(
            artifact_path("snapshot_ms", "ms"),
            PathBuf::from("snapshot_ms.json")
        );
    }

    #[test]
    fn test_write_and_load_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let prefix = tmp.path().join("snap").display().to_string();

        let ms = MasterStruct::default();
        let path = write_artifact(&ms, &prefix, "ms", false).unwrap();
        assert!(path.ends_with("snap_ms.json"));

        let loaded = load_master(&path).unwrap();
        assert!(loaded.units.is_empty());
    }

    #[test]
    fn test_output_collision() {
        let tmp = tempfile::tempdir().unwrap();
        let prefix = tmp.path().join("snap").display().to_string();

        let ms = MasterStruct::default();
        write_artifact(&ms, &prefix, "ms", false).unwrap();

        let err = write_artifact(&ms, &prefix, "ms", false).unwrap_err();
        assert!(matches!(err, ArtifactError::OutputCollision(_)));

        // overwrite allowed when forced
        write_artifact(&ms, &prefix, "ms", true).unwrap();
    }

    #[test]
    fn test_load_malformed_input() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("bad_ms.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = load_master(&path).unwrap_err();
        assert!(matches!(err, ArtifactError::MalformedMsInput(..)));
    }
}
