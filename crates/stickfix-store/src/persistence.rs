//! Durable storage for the registry.
//!
//! The registry lives in a single JSON document with two rotating backup
//! generations next to it:
//!
//! ```text
//! data/
//! ├── users.json        # primary
//! ├── users.bk1.json    # generation 1 (previous primary)
//! └── users.bk2.json    # generation 2 (oldest)
//! ```
//!
//! # Save cycle
//!
//! 1. Rotate: generation 1 → generation 2, primary → generation 1.
//! 2. Write the registry to `users.json.tmp` and rename it over the primary.
//! 3. Reload the primary to validate the write.
//! 4. If the reload finds corrupt data, fall back to generation 1, then
//!    generation 2. The first loadable document is copied over the primary
//!    and handed back to the caller. If none loads the save fails with
//!    [`StoreError::RecoveryExhausted`].
//!
//! Rotation only copies files, and the primary is replaced by rename, so a
//! failed write leaves the previous primary and both generations in place.
//! A generation is only shifted down the ring when it parses: an unreadable
//! primary never displaces a good backup.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, error, info, warn};

use crate::error::{StoreError, StoreResult};
use crate::user::Registry;

// ── generations ──────────────────────────────────────────────────────

/// One of the two backup generations, newest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Generation {
    /// The primary as it was before the latest save.
    First,
    /// The primary as it was two saves ago.
    Second,
}

impl Generation {
    /// Newest first, the order recovery tries them in.
    pub const ALL: [Generation; 2] = [Generation::First, Generation::Second];

    pub fn number(self) -> u8 {
        match self {
            Self::First => 1,
            Self::Second => 2,
        }
    }

    pub fn from_number(n: u8) -> StoreResult<Self> {
        match n {
            1 => Ok(Self::First),
            2 => Ok(Self::Second),
            other => Err(StoreError::InvalidArgument(format!(
                "backup generation must be 1 or 2, got {other}"
            ))),
        }
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "generation {}", self.number())
    }
}

/// Result of a successful [`Persistence::save`].
#[derive(Debug)]
pub enum SaveOutcome {
    /// The registry was written and verified.
    Written,
    /// The written file did not reload; `registry` was restored from a
    /// backup and must replace the in-memory state.
    Recovered {
        generation: Generation,
        registry: Registry,
    },
}

// ── persistence manager ──────────────────────────────────────────────

/// File-backed registry storage with two backup generations.
#[derive(Debug, Clone)]
pub struct Persistence {
    path: PathBuf,
}

impl Persistence {
    /// Manage the registry document at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the primary document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of a backup generation, a sibling of the primary.
    pub fn backup_path(&self, generation: Generation) -> PathBuf {
        self.sibling(&format!("bk{}", generation.number()))
    }

    /// Staging file for registry writes.
    fn temp_path(&self) -> PathBuf {
        self.staging("tmp")
    }

    /// Staging file for backup copies, kept apart from [`temp_path`](Self::temp_path).
    fn copy_temp_path(&self) -> PathBuf {
        self.staging("copy")
    }

    fn staging(&self, suffix: &str) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".");
        name.push(suffix);
        self.path.with_file_name(name)
    }

    fn sibling(&self, tag: &str) -> PathBuf {
        let stem = self
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        match self.path.extension() {
            Some(ext) => self
                .path
                .with_file_name(format!("{stem}.{tag}.{}", ext.to_string_lossy())),
            None => self.path.with_file_name(format!("{stem}.{tag}")),
        }
    }

    /// Load the primary document.
    ///
    /// On first start (no file) an empty registry is written and returned.
    /// Parse failures surface as [`StoreError::CorruptData`], I/O failures
    /// as [`StoreError::Unavailable`].
    pub fn load(&self) -> StoreResult<Registry> {
        if !self.path.exists() {
            info!(path = %self.path.display(), "registry file missing, creating empty registry");
            let registry = Registry::new();
            self.write(&registry)?;
            return Ok(registry);
        }
        let registry = read_registry(&self.path)?;
        info!(path = %self.path.display(), users = registry.len(), "registry loaded");
        Ok(registry)
    }

    /// Rotate backups, write `registry`, and verify the write.
    pub fn save(&self, registry: &Registry) -> StoreResult<SaveOutcome> {
        self.rotate()?;
        self.write(registry)?;

        match read_registry(&self.path) {
            Ok(_) => {
                debug!(path = %self.path.display(), users = registry.len(), "registry saved");
                Ok(SaveOutcome::Written)
            }
            Err(e) if e.is_corrupt() => {
                warn!(error = %e, "saved registry failed verification, recovering from backups");
                let (generation, registry) = self.recover()?;
                Ok(SaveOutcome::Recovered {
                    generation,
                    registry,
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Walk the backup generations newest first and restore the first that
    /// loads over the primary.
    pub fn recover(&self) -> StoreResult<(Generation, Registry)> {
        self.recover_with(|_| true)
    }

    /// Like [`recover`](Self::recover), skipping generations with no users.
    pub fn recover_nonempty(&self) -> StoreResult<(Generation, Registry)> {
        self.recover_with(|registry| !registry.is_empty())
    }

    fn recover_with(
        &self,
        accept: impl Fn(&Registry) -> bool,
    ) -> StoreResult<(Generation, Registry)> {
        for generation in Generation::ALL {
            let backup = self.backup_path(generation);
            match read_registry(&backup) {
                Ok(registry) if accept(&registry) => {
                    self.copy_atomic(&backup, &self.path)?;
                    info!(%generation, users = registry.len(), "registry restored from backup");
                    return Ok((generation, registry));
                }
                Ok(_) => debug!(%generation, "backup skipped"),
                Err(e) => warn!(%generation, error = %e, "backup unusable"),
            }
        }
        error!(path = %self.path.display(), "no usable backup generation");
        Err(StoreError::RecoveryExhausted {
            path: self.path.clone(),
        })
    }

    /// Load one backup generation and copy it over the primary.
    pub fn restore(&self, generation: Generation) -> StoreResult<Registry> {
        let backup = self.backup_path(generation);
        let registry = read_registry(&backup)?;
        self.copy_atomic(&backup, &self.path)?;
        info!(%generation, users = registry.len(), "registry restored from backup");
        Ok(registry)
    }

    /// Parse the primary as it is on disk, without creating it.
    pub fn verify(&self) -> StoreResult<Registry> {
        read_registry(&self.path)
    }

    /// Shift the backup ring: generation 1 → 2, primary → generation 1.
    ///
    /// Each step only runs when its source parses. A corrupt primary leaves
    /// both generations as they are; a corrupt generation 1 is overwritten
    /// by the primary without first being pushed onto generation 2.
    fn rotate(&self) -> StoreResult<()> {
        if !self.path.exists() {
            return Ok(());
        }
        if !self.loadable(&self.path)? {
            warn!(path = %self.path.display(), "primary is corrupt, keeping backups unrotated");
            return Ok(());
        }

        let first = self.backup_path(Generation::First);
        let second = self.backup_path(Generation::Second);
        if first.exists() {
            if self.loadable(&first)? {
                self.copy_atomic(&first, &second)?;
            } else {
                warn!(path = %first.display(), "generation 1 is corrupt, not shifting it");
            }
        }
        self.copy_atomic(&self.path, &first)?;
        debug!(path = %self.path.display(), "backups rotated");
        Ok(())
    }

    /// `Ok(false)` for a file that exists but does not parse.
    fn loadable(&self, path: &Path) -> StoreResult<bool> {
        match read_registry(path) {
            Ok(_) => Ok(true),
            Err(e) if e.is_corrupt() => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn write(&self, registry: &Registry) -> StoreResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| StoreError::unavailable(parent, e))?;
        }

        let json = serde_json::to_string_pretty(registry)
            .map_err(|e| StoreError::corrupt(&self.path, e))?;
        let temp = self.temp_path();
        fs::write(&temp, json).map_err(|e| StoreError::unavailable(&temp, e))?;
        fs::rename(&temp, &self.path).map_err(|e| StoreError::unavailable(&self.path, e))?;
        Ok(())
    }

    fn copy_atomic(&self, from: &Path, to: &Path) -> StoreResult<()> {
        let temp = self.copy_temp_path();
        fs::copy(from, &temp).map_err(|e| StoreError::unavailable(from, e))?;
        fs::rename(&temp, to).map_err(|e| StoreError::unavailable(to, e))?;
        Ok(())
    }
}

/// Read and parse one registry document.
fn read_registry(path: &Path) -> StoreResult<Registry> {
    let contents = fs::read_to_string(path).map_err(|e| StoreError::unavailable(path, e))?;
    let mut registry: Registry =
        serde_json::from_str(&contents).map_err(|e| StoreError::corrupt(path, e))?;
    registry.normalize_ids();
    Ok(registry)
}

// ── tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn registry_with(id: &str, sticker: &str) -> Registry {
        let mut registry = Registry::new();
        let user = registry.get_or_create(id);
        user.shuffle = true;
        user.add_sticker(sticker, &["cat"]);
        registry
    }

    fn write_raw(path: &Path, registry: &Registry) {
        fs::write(path, serde_json::to_string(registry).unwrap()).unwrap();
    }

    #[test]
    fn backup_paths_are_siblings() {
        let store = Persistence::new("/data/users.json");
        assert_eq!(
            store.backup_path(Generation::First),
            PathBuf::from("/data/users.bk1.json")
        );
        assert_eq!(
            store.backup_path(Generation::Second),
            PathBuf::from("/data/users.bk2.json")
        );
        assert_eq!(store.temp_path(), PathBuf::from("/data/users.json.tmp"));
        assert_eq!(store.copy_temp_path(), PathBuf::from("/data/users.json.copy"));
    }

    #[test]
    fn generation_numbers() {
        assert_eq!(Generation::from_number(1).unwrap(), Generation::First);
        assert_eq!(Generation::from_number(2).unwrap(), Generation::Second);
        assert!(Generation::from_number(3).is_err());
        assert_eq!(Generation::Second.to_string(), "generation 2");
    }

    #[test]
    fn load_missing_creates_empty_file() {
        let dir = tempdir().unwrap();
        let store = Persistence::new(dir.path().join("nested").join("users.json"));

        let registry = store.load().unwrap();
        assert!(registry.is_empty());
        assert!(store.path().exists());
    }

    #[test]
    fn load_corrupt_is_corrupt_data() {
        let dir = tempdir().unwrap();
        let store = Persistence::new(dir.path().join("users.json"));
        fs::write(store.path(), "{ not json").unwrap();

        let err = store.load().unwrap_err();
        assert!(err.is_corrupt(), "unexpected error: {err}");
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempdir().unwrap();
        let store = Persistence::new(dir.path().join("users.json"));
        let registry = registry_with("42", "s1");

        assert!(matches!(store.save(&registry).unwrap(), SaveOutcome::Written));
        assert_eq!(store.load().unwrap(), registry);
        assert!(!store.temp_path().exists());
    }

    #[test]
    fn save_rotates_two_generations() {
        let dir = tempdir().unwrap();
        let store = Persistence::new(dir.path().join("users.json"));
        let v1 = registry_with("42", "s1");
        let v2 = registry_with("42", "s2");
        let v3 = registry_with("42", "s3");

        store.save(&v1).unwrap();
        assert!(!store.backup_path(Generation::First).exists());

        store.save(&v2).unwrap();
        store.save(&v3).unwrap();

        assert_eq!(store.load().unwrap(), v3);
        assert_eq!(read_registry(&store.backup_path(Generation::First)).unwrap(), v2);
        assert_eq!(read_registry(&store.backup_path(Generation::Second)).unwrap(), v1);
    }

    #[test]
    fn recover_prefers_newest_valid_generation() {
        let dir = tempdir().unwrap();
        let store = Persistence::new(dir.path().join("users.json"));
        let newer = registry_with("42", "newer");
        let older = registry_with("42", "older");

        fs::write(store.path(), "garbage").unwrap();
        write_raw(&store.backup_path(Generation::First), &newer);
        write_raw(&store.backup_path(Generation::Second), &older);

        let (generation, registry) = store.recover().unwrap();
        assert_eq!(generation, Generation::First);
        assert_eq!(registry, newer);
        assert_eq!(store.load().unwrap(), newer);
    }

    #[test]
    fn recover_falls_through_to_second_generation() {
        let dir = tempdir().unwrap();
        let store = Persistence::new(dir.path().join("users.json"));
        let older = registry_with("42", "older");

        fs::write(store.path(), "garbage").unwrap();
        fs::write(store.backup_path(Generation::First), "[1, 2").unwrap();
        write_raw(&store.backup_path(Generation::Second), &older);

        let (generation, registry) = store.recover().unwrap();
        assert_eq!(generation, Generation::Second);
        assert_eq!(registry, older);
        store.verify().unwrap();
    }

    #[test]
    fn recover_with_nothing_usable_is_fatal() {
        let dir = tempdir().unwrap();
        let store = Persistence::new(dir.path().join("users.json"));
        fs::write(store.path(), "garbage").unwrap();
        fs::write(store.backup_path(Generation::First), "garbage").unwrap();

        let err = store.recover().unwrap_err();
        assert!(matches!(err, StoreError::RecoveryExhausted { .. }));
    }

    #[test]
    fn recover_nonempty_skips_empty_generation() {
        let dir = tempdir().unwrap();
        let store = Persistence::new(dir.path().join("users.json"));
        let older = registry_with("42", "older");

        write_raw(store.path(), &Registry::new());
        write_raw(&store.backup_path(Generation::First), &Registry::new());
        write_raw(&store.backup_path(Generation::Second), &older);

        let (generation, registry) = store.recover_nonempty().unwrap();
        assert_eq!(generation, Generation::Second);
        assert_eq!(registry, older);
        assert_eq!(store.verify().unwrap(), older);
    }

    #[test]
    fn restore_missing_generation_is_unavailable() {
        let dir = tempdir().unwrap();
        let store = Persistence::new(dir.path().join("users.json"));
        let err = store.restore(Generation::Second).unwrap_err();
        assert!(matches!(err, StoreError::Unavailable { .. }));
    }

    #[test]
    fn failed_write_keeps_primary_and_rotated_backups() {
        let dir = tempdir().unwrap();
        let store = Persistence::new(dir.path().join("users.json"));
        let v1 = registry_with("42", "s1");
        let v2 = registry_with("42", "s2");
        store.save(&v1).unwrap();
        store.save(&v2).unwrap();

        // Rotation stages through its own file, so it succeeds; the write
        // then fails on the directory squatting on the write staging path.
        fs::create_dir(store.temp_path()).unwrap();
        let err = store.save(&registry_with("42", "s3")).unwrap_err();
        assert!(matches!(err, StoreError::Unavailable { .. }));
        fs::remove_dir(store.temp_path()).unwrap();

        assert_eq!(store.load().unwrap(), v2);
        assert_eq!(read_registry(&store.backup_path(Generation::First)).unwrap(), v2);
        assert_eq!(read_registry(&store.backup_path(Generation::Second)).unwrap(), v1);
    }

    #[test]
    fn failed_rotation_writes_nothing() {
        let dir = tempdir().unwrap();
        let store = Persistence::new(dir.path().join("users.json"));
        let v1 = registry_with("42", "s1");
        store.save(&v1).unwrap();
        store.save(&v1).unwrap();

        fs::create_dir(store.copy_temp_path()).unwrap();
        let err = store.save(&registry_with("42", "s2")).unwrap_err();
        assert!(matches!(err, StoreError::Unavailable { .. }));
        fs::remove_dir(store.copy_temp_path()).unwrap();

        assert_eq!(store.load().unwrap(), v1);
    }

    #[test]
    fn corrupt_primary_is_not_rotated_into_backups() {
        let dir = tempdir().unwrap();
        let store = Persistence::new(dir.path().join("users.json"));
        let v1 = registry_with("42", "s1");
        let v2 = registry_with("42", "s2");
        store.save(&v1).unwrap();
        store.save(&v2).unwrap();
        store.save(&v2).unwrap();

        fs::write(store.path(), "garbage").unwrap();
        let v3 = registry_with("42", "s3");
        assert!(matches!(store.save(&v3).unwrap(), SaveOutcome::Written));

        assert_eq!(store.load().unwrap(), v3);
        assert_eq!(read_registry(&store.backup_path(Generation::First)).unwrap(), v2);
        assert_eq!(read_registry(&store.backup_path(Generation::Second)).unwrap(), v1);
    }

    #[test]
    fn corrupt_first_generation_does_not_displace_second() {
        let dir = tempdir().unwrap();
        let store = Persistence::new(dir.path().join("users.json"));
        let v1 = registry_with("42", "s1");
        let v2 = registry_with("42", "s2");
        store.save(&v1).unwrap();
        store.save(&v1).unwrap();
        store.save(&v2).unwrap();

        fs::write(store.backup_path(Generation::First), "garbage").unwrap();
        store.save(&registry_with("42", "s3")).unwrap();

        assert_eq!(read_registry(&store.backup_path(Generation::First)).unwrap(), v2);
        assert_eq!(read_registry(&store.backup_path(Generation::Second)).unwrap(), v1);
    }
}
