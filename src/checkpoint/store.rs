//! Atomic checkpoint persistence.

use std::path::{Path, PathBuf};

use crate::checkpoint::Checkpoint;
use crate::models::{KothasetError, Result};

/// Persists checkpoints under a cache directory, one file per output path.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    cache_dir: PathBuf,
}

impl CheckpointStore {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Checkpoint file path for the given output path.
    ///
    /// Derived from the absolute output path with separators and `:` escaped,
    /// so outputs sharing a basename in different directories get distinct
    /// checkpoint files.
    pub fn path_for(&self, output_path: &Path) -> PathBuf {
        let absolute =
            std::path::absolute(output_path).unwrap_or_else(|_| output_path.to_path_buf());
        let escaped: String = absolute
            .to_string_lossy()
            .chars()
            .map(|c| match c {
                '/' | '\\' | ':' => '_',
                other => other,
            })
            .collect();
        self.cache_dir.join(format!("{escaped}.checkpoint"))
    }

    /// Save a checkpoint atomically: write to a temp file, then rename over
    /// the target.
    pub fn save(&self, checkpoint: &Checkpoint, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| KothasetError::checkpoint("creating cache directory", Some(e)))?;
            }
        }

        let data = serde_json::to_string_pretty(checkpoint)
            .map_err(|e| KothasetError::checkpoint(format!("serializing checkpoint: {e}"), None))?;

        let tmp_path = path.with_file_name(format!(
            "{}.tmp",
            path.file_name().unwrap_or_default().to_string_lossy()
        ));
        std::fs::write(&tmp_path, data)
            .map_err(|e| KothasetError::checkpoint("writing checkpoint temp file", Some(e)))?;
        std::fs::rename(&tmp_path, path)
            .map_err(|e| KothasetError::checkpoint("renaming checkpoint into place", Some(e)))
    }

    /// Save a checkpoint at the derived path for its output file.
    pub fn save_for(&self, checkpoint: &Checkpoint) -> Result<PathBuf> {
        let path = self.path_for(&checkpoint.config.output_path);
        self.save(checkpoint, &path)?;
        Ok(path)
    }

    /// Load a checkpoint from disk.
    pub fn load(path: &Path) -> Result<Checkpoint> {
        let data = std::fs::read_to_string(path).map_err(|e| KothasetError::ResumeLoad {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        serde_json::from_str(&data).map_err(|e| KothasetError::ResumeLoad {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GenerationConfig;
    use tempfile::TempDir;

    fn config_with_output(output: &str) -> GenerationConfig {
        GenerationConfig {
            output_path: PathBuf::from(output),
            model: "m".to_string(),
            input: "t".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path().join("cache"));
        let config = config_with_output("out.jsonl");

        let checkpoint = Checkpoint::new(&config, 42, 3, 9000);
        let path = store.path_for(&config.output_path);
        store.save(&checkpoint, &path).unwrap();

        let loaded = CheckpointStore::load(&path).unwrap();
        assert_eq!(loaded.completed, 42);
        assert_eq!(loaded.failed, 3);
        assert_eq!(loaded.tokens_used, 9000);
        assert_eq!(loaded.config, checkpoint.config);
        assert_eq!(loaded.schema_version, checkpoint.schema_version);
    }

    #[test]
    fn no_temp_file_remains_after_save() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path().join("cache"));
        let config = config_with_output("out.jsonl");

        let checkpoint = Checkpoint::new(&config, 1, 0, 10);
        let path = store.path_for(&config.output_path);
        store.save(&checkpoint, &path).unwrap();

        let leftovers: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn distinct_directories_get_distinct_checkpoint_files() {
        let store = CheckpointStore::new(".kothaset");
        let one = store.path_for(Path::new("one/dataset.jsonl"));
        let two = store.path_for(Path::new("two/dataset.jsonl"));
        assert_ne!(one, two);
    }

    #[test]
    fn derived_name_has_no_separators() {
        let store = CheckpointStore::new(".kothaset");
        let path = store.path_for(Path::new("a/b/dataset.jsonl"));
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.ends_with(".checkpoint"));
        assert!(!name.contains('/'));
        assert!(!name.contains('\\'));
        assert!(!name.contains(':'));
    }

    #[test]
    fn load_missing_file_is_resume_error() {
        let err = CheckpointStore::load(Path::new("/nonexistent/cp.checkpoint")).unwrap_err();
        assert!(matches!(err, KothasetError::ResumeLoad { .. }));
    }
}
