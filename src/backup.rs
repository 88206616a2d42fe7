//! Snapshots of the system resolver file.
//!
//! Backups are byte copies stored in one directory and named
//! `Initial.<ext>` (taken once, on first run) or
//! `Backup_<YYYY-MM-DD_HH-MM-SS>.<ext>`. Because the timestamp sorts
//! lexicographically, the greatest file name is treated as the latest.

use crate::config::ChangerConfig;
use crate::error::{ChangerError, Result};
use crate::privileged::PrivilegedExecutor;
use crate::writer::ResolverWriter;
use chrono::{Local, NaiveDateTime};
use std::path::{Path, PathBuf};

/// Stem of the snapshot taken on first run.
const INITIAL_STEM: &str = "Initial";

/// `strftime` format embedded in timestamped backup names.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Creates, lists, restores and deletes resolver file backups.
///
/// # Lifecycle
///
/// 1. [`ensure_initial_backup`](Self::ensure_initial_backup) on start-up.
/// 2. [`create_backup`](Self::create_backup) whenever the user asks.
/// 3. [`restore`](Self::restore) / [`restore_latest`](Self::restore_latest)
///    copy a snapshot back with elevation and restart the resolver.
/// 4. [`delete`](Self::delete) / [`clean_all`](Self::clean_all) remove them.
///
/// Snapshots are taken without elevation; the resolver file is normally
/// world-readable.
#[derive(Debug, Clone)]
pub struct BackupManager {
    backup_dir: PathBuf,
    source: PathBuf,
    extension: String,
}

impl BackupManager {
    /// Creates a manager using the backup dir and resolver file of `config`.
    #[must_use]
    pub fn new(config: &ChangerConfig) -> Self {
        Self::with_dir(config.backups_dir(), &config.resolved_conf)
            .with_extension(config.backup_extension())
    }

    /// Creates a manager over explicit paths (useful for testing).
    #[must_use]
    pub fn with_dir(backup_dir: impl Into<PathBuf>, source: impl Into<PathBuf>) -> Self {
        Self {
            backup_dir: backup_dir.into(),
            source: source.into(),
            extension: "conf".to_string(),
        }
    }

    /// Overrides the backup file extension.
    #[must_use]
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    /// Returns the backup directory path.
    #[must_use]
    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    /// Name of the first-run snapshot, e.g. `Initial.conf`.
    #[must_use]
    pub fn initial_name(&self) -> String {
        format!("{INITIAL_STEM}.{}", self.extension)
    }

    /// Takes the first-run snapshot unless it already exists.
    ///
    /// Returns `true` if it was created, `false` if it already existed.
    ///
    /// # Errors
    ///
    /// Returns [`ChangerError::Io`] if the directory cannot be created or the
    /// resolver file cannot be copied.
    pub fn ensure_initial_backup(&self) -> Result<bool> {
        std::fs::create_dir_all(&self.backup_dir)?;

        let path = self.backup_dir.join(self.initial_name());
        if path.exists() {
            tracing::debug!(path = %path.display(), "Initial backup already exists, skipping");
            return Ok(false);
        }

        std::fs::copy(&self.source, &path)?;
        tracing::info!(path = %path.display(), "Created initial backup");
        Ok(true)
    }

    /// Takes a timestamped snapshot and returns its file name.
    ///
    /// Two calls within the same second share a name; the second overwrites
    /// the first.
    ///
    /// # Errors
    ///
    /// Returns [`ChangerError::Io`] if the directory cannot be created or the
    /// resolver file cannot be copied.
    pub fn create_backup(&self) -> Result<String> {
        self.create_backup_at(Local::now().naive_local())
    }

    /// Takes a snapshot named after `timestamp`.
    ///
    /// # Errors
    ///
    /// Same as [`create_backup`](Self::create_backup).
    pub fn create_backup_at(&self, timestamp: NaiveDateTime) -> Result<String> {
        std::fs::create_dir_all(&self.backup_dir)?;

        let name = format!(
            "Backup_{}.{}",
            timestamp.format(TIMESTAMP_FORMAT),
            self.extension
        );
        let path = self.backup_dir.join(&name);
        std::fs::copy(&self.source, &path)?;

        tracing::info!(name = %name, "Created backup");
        Ok(name)
    }

    /// Lists backup file names, latest first.
    ///
    /// Returns an empty vec if the directory does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`ChangerError::Io`] if the directory cannot be read.
    pub fn list(&self) -> Result<Vec<String>> {
        if !self.backup_dir.exists() {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.backup_dir)? {
            let path = entry?.path();
            if path.is_file() {
                if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                    names.push(name.to_string());
                }
            }
        }
        names.sort_unstable_by(|a, b| b.cmp(a));
        Ok(names)
    }

    /// The lexicographically greatest backup name, if any.
    ///
    /// # Errors
    ///
    /// Returns [`ChangerError::Io`] if the directory cannot be read.
    pub fn latest(&self) -> Result<Option<String>> {
        Ok(self.list()?.into_iter().next())
    }

    /// Copies the named backup over the resolver file and restarts the
    /// resolver, both with elevation.
    ///
    /// # Errors
    ///
    /// Returns [`ChangerError::InvalidBackupName`] for names that are not a
    /// plain file name, [`ChangerError::Io`] if the backup does not exist, or
    /// any [`ResolverWriter::install`] error.
    pub fn restore(
        &self,
        name: &str,
        writer: &ResolverWriter,
        exec: &mut PrivilegedExecutor,
    ) -> Result<()> {
        let path = self.backup_path(name)?;
        if !path.is_file() {
            return Err(ChangerError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("backup not found: {name}"),
            )));
        }

        writer.install(exec, &path)?;
        tracing::info!(name = %name, "Restored backup");
        Ok(())
    }

    /// Restores the latest backup and returns its name.
    ///
    /// # Errors
    ///
    /// Returns [`ChangerError::NoBackups`] if the directory is missing or
    /// empty, otherwise the same errors as [`restore`](Self::restore).
    pub fn restore_latest(
        &self,
        writer: &ResolverWriter,
        exec: &mut PrivilegedExecutor,
    ) -> Result<String> {
        let Some(latest) = self.latest()? else {
            return Err(ChangerError::NoBackups);
        };
        self.restore(&latest, writer, exec)?;
        Ok(latest)
    }

    /// Deletes one backup.
    ///
    /// # Errors
    ///
    /// Returns [`ChangerError::InvalidBackupName`] for names that are not a
    /// plain file name, or [`ChangerError::Io`] if the file cannot be removed.
    pub fn delete(&self, name: &str) -> Result<()> {
        let path = self.backup_path(name)?;
        std::fs::remove_file(&path)?;
        tracing::info!(name = %name, "Deleted backup");
        Ok(())
    }

    /// Deletes every file in the backup directory and returns how many were
    /// removed. Irreversible.
    ///
    /// # Errors
    ///
    /// Returns [`ChangerError::NoBackupDirectory`] if the directory does not
    /// exist, or [`ChangerError::Io`] on the first file that cannot be removed.
    pub fn clean_all(&self) -> Result<usize> {
        if !self.backup_dir.exists() {
            return Err(ChangerError::NoBackupDirectory);
        }

        let mut removed = 0;
        for entry in std::fs::read_dir(&self.backup_dir)? {
            let path = entry?.path();
            if path.is_file() {
                std::fs::remove_file(&path)?;
                removed += 1;
            }
        }
        tracing::info!(count = removed, "Removed all backups");
        Ok(removed)
    }

    fn backup_path(&self, name: &str) -> Result<PathBuf> {
        let plain = !name.is_empty()
            && name != "."
            && name != ".."
            && !name.contains('/')
            && !name.contains('\0');
        if !plain {
            return Err(ChangerError::InvalidBackupName {
                name: name.to_string(),
            });
        }
        Ok(self.backup_dir.join(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, s)
            .unwrap()
    }

    fn setup() -> (tempfile::TempDir, BackupManager) {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("resolved.conf");
        std::fs::write(&source, "[Resolve]\nDNS=8.8.8.8 8.8.4.4\nDNSOverTLS=yes\n").unwrap();
        let manager = BackupManager::with_dir(dir.path().join("backups"), source);
        (dir, manager)
    }

    #[test]
    fn initial_backup_is_created_once() {
        let (_dir, manager) = setup();

        assert!(manager.ensure_initial_backup().unwrap());
        assert!(!manager.ensure_initial_backup().unwrap());
        assert_eq!(manager.list().unwrap(), ["Initial.conf"]);
    }

    #[test]
    fn initial_backup_is_byte_exact() {
        let (dir, manager) = setup();
        manager.ensure_initial_backup().unwrap();
        assert_eq!(
            std::fs::read(manager.backup_dir().join("Initial.conf")).unwrap(),
            std::fs::read(dir.path().join("resolved.conf")).unwrap()
        );
    }

    #[test]
    fn timestamped_names() {
        let (_dir, manager) = setup();
        let name = manager.create_backup_at(at(2024, 1, 1, 9, 5, 7)).unwrap();
        assert_eq!(name, "Backup_2024-01-01_09-05-07.conf");
        assert!(manager.backup_dir().join(&name).is_file());

        let name = manager.create_backup().unwrap();
        assert!(name.starts_with("Backup_") && name.ends_with(".conf"));
    }

    #[test]
    fn same_second_overwrites() {
        let (dir, manager) = setup();
        let ts = at(2024, 6, 1, 0, 0, 0);
        manager.create_backup_at(ts).unwrap();

        std::fs::write(dir.path().join("resolved.conf"), "changed").unwrap();
        manager.create_backup_at(ts).unwrap();

        assert_eq!(manager.list().unwrap().len(), 1);
        assert_eq!(
            std::fs::read_to_string(manager.backup_dir().join("Backup_2024-06-01_00-00-00.conf"))
                .unwrap(),
            "changed"
        );
    }

    #[test]
    fn list_is_latest_first() {
        let (_dir, manager) = setup();
        manager.create_backup_at(at(2024, 1, 1, 0, 0, 0)).unwrap();
        manager.create_backup_at(at(2024, 6, 1, 0, 0, 0)).unwrap();
        manager.create_backup_at(at(2023, 12, 31, 23, 59, 59)).unwrap();

        assert_eq!(
            manager.list().unwrap(),
            [
                "Backup_2024-06-01_00-00-00.conf",
                "Backup_2024-01-01_00-00-00.conf",
                "Backup_2023-12-31_23-59-59.conf",
            ]
        );
        assert_eq!(
            manager.latest().unwrap().as_deref(),
            Some("Backup_2024-06-01_00-00-00.conf")
        );
    }

    #[test]
    fn initial_sorts_above_timestamped() {
        let (_dir, manager) = setup();
        manager.create_backup_at(at(2024, 6, 1, 0, 0, 0)).unwrap();
        manager.ensure_initial_backup().unwrap();

        assert_eq!(manager.latest().unwrap().as_deref(), Some("Initial.conf"));
    }

    #[test]
    fn list_missing_dir_is_empty() {
        let (_dir, manager) = setup();
        assert!(manager.list().unwrap().is_empty());
        assert!(manager.latest().unwrap().is_none());
    }

    #[test]
    fn delete_one() {
        let (_dir, manager) = setup();
        let keep = manager.create_backup_at(at(2024, 1, 1, 0, 0, 0)).unwrap();
        let gone = manager.create_backup_at(at(2024, 1, 2, 0, 0, 0)).unwrap();

        manager.delete(&gone).unwrap();
        assert_eq!(manager.list().unwrap(), [keep]);
        assert!(matches!(manager.delete(&gone), Err(ChangerError::Io(_))));
    }

    #[test]
    fn rejects_path_like_names() {
        let (_dir, manager) = setup();
        for name in ["", ".", "..", "../resolved.conf", "a/b"] {
            assert!(
                matches!(manager.delete(name), Err(ChangerError::InvalidBackupName { .. })),
                "{name:?} should be rejected"
            );
        }
    }

    #[test]
    fn clean_all_requires_directory() {
        let (_dir, manager) = setup();
        assert!(matches!(manager.clean_all(), Err(ChangerError::NoBackupDirectory)));
    }

    #[test]
    fn clean_all_removes_everything() {
        let (_dir, manager) = setup();
        manager.ensure_initial_backup().unwrap();
        manager.create_backup_at(at(2024, 1, 1, 0, 0, 0)).unwrap();
        std::fs::write(manager.backup_dir().join("notes.txt"), "x").unwrap();

        assert_eq!(manager.clean_all().unwrap(), 3);
        assert!(manager.list().unwrap().is_empty());
        assert!(manager.backup_dir().exists());
        assert_eq!(manager.clean_all().unwrap(), 0);
    }

    #[test]
    fn missing_source_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let manager = BackupManager::with_dir(dir.path().join("backups"), dir.path().join("nope"));
        assert!(matches!(manager.ensure_initial_backup(), Err(ChangerError::Io(_))));
    }
}
