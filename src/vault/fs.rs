// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Filesystem operations for the vault data directory.
//!
//! Writes go through a uniquely named temp file in the target directory,
//! `sync_all` and rename, so a crash never leaves a half-written record
//! behind and concurrent writers never share a temp file. Deletion of
//! record files goes through [`VaultStorage::shred`], which overwrites the
//! bytes before unlinking.
//!
//! Overwriting is best-effort: copy-on-write filesystems, journaling and SSD
//! wear-leveling can keep older copies of a block that no overwrite reaches.

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};
use tempfile::NamedTempFile;

use super::{VaultError, VaultPaths, VaultResult};
use crate::crypto::fill_random;

/// Overwrite passes used when destroying a record.
pub const SHRED_PASSES: usize = 3;

const SHRED_CHUNK: usize = 64 * 1024;

/// Storage manager for the custody data directory.
#[derive(Debug, Clone)]
pub struct VaultStorage {
    paths: VaultPaths,
    initialized: bool,
}

impl VaultStorage {
    /// Create a new VaultStorage instance.
    ///
    /// Does NOT initialize the directory structure. Call `initialize()` first.
    pub fn new(paths: VaultPaths) -> Self {
        Self {
            paths,
            initialized: false,
        }
    }

    /// Get the storage paths.
    pub fn paths(&self) -> &VaultPaths {
        &self.paths
    }

    /// Check if storage is initialized.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Create the directory structure. Idempotent.
    pub fn initialize(&mut self) -> VaultResult<()> {
        for dir in [self.paths.personas_dir(), self.paths.audit_dir()] {
            fs::create_dir_all(&dir)?;
        }
        self.initialized = true;
        Ok(())
    }

    /// Write, read back and delete a marker file in the data directory.
    pub fn health_check(&self) -> VaultResult<()> {
        self.ensure_initialized()?;

        let marker = self.paths.root().join(".health_check");
        let expected = b"health_check_data";

        fs::write(&marker, expected)?;
        let read_back = fs::read(&marker)?;
        fs::remove_file(&marker)?;

        if read_back != expected {
            return Err(VaultError::IntegrityViolation(
                "health check data mismatch".to_string(),
            ));
        }
        Ok(())
    }

    // ========== Path Containment ==========

    /// Resolve `file_name` inside `dir`, refusing anything that escapes it.
    ///
    /// `dir` is canonicalized first. If the target already exists it is
    /// canonicalized too, so a symlink pointing elsewhere is rejected.
    pub fn contained_path(&self, dir: impl AsRef<Path>, file_name: &str) -> VaultResult<PathBuf> {
        self.ensure_initialized()?;

        let canonical_dir = fs::canonicalize(dir.as_ref())?;
        let candidate = canonical_dir.join(file_name);
        if candidate.parent() != Some(canonical_dir.as_path()) {
            return Err(VaultError::PathTraversalRejected);
        }

        match fs::symlink_metadata(&candidate) {
            Ok(meta) if meta.file_type().is_symlink() => Err(VaultError::PathTraversalRejected),
            Ok(_) => {
                let resolved = fs::canonicalize(&candidate)?;
                if resolved != candidate {
                    return Err(VaultError::PathTraversalRejected);
                }
                Ok(candidate)
            }
            Err(_) => Ok(candidate),
        }
    }

    // ========== JSON Operations ==========

    /// Read a JSON file and deserialize it.
    pub fn read_json<T: DeserializeOwned>(&self, path: impl AsRef<Path>) -> VaultResult<T> {
        self.ensure_initialized()?;

        let file = File::open(path.as_ref())?;
        let reader = BufReader::new(file);
        Ok(serde_json::from_reader(reader)?)
    }

    /// Write a JSON file atomically (temp file, fsync, rename).
    pub fn write_json<T: Serialize>(&self, path: impl AsRef<Path>, value: &T) -> VaultResult<()> {
        self.ensure_initialized()?;

        let path = path.as_ref();
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)?;

        let mut temp = NamedTempFile::new_in(parent)?;
        {
            let mut writer = BufWriter::new(temp.as_file_mut());
            serde_json::to_writer_pretty(&mut writer, value)?;
            writer.flush()?;
        }
        temp.as_file().sync_all()?;

        temp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }

    // ========== Raw File Operations ==========

    /// Read raw bytes from a file.
    pub fn read_raw(&self, path: impl AsRef<Path>) -> VaultResult<Vec<u8>> {
        self.ensure_initialized()?;

        let mut file = File::open(path.as_ref())?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)?;
        Ok(data)
    }

    /// Append one line to a file, creating it and its parents if needed.
    pub fn append_line(&self, path: impl AsRef<Path>, line: &[u8]) -> VaultResult<()> {
        self.ensure_initialized()?;

        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        let mut buf = Vec::with_capacity(line.len() + 1);
        buf.extend_from_slice(line);
        buf.push(b'\n');
        file.write_all(&buf)?;
        file.flush()?;
        Ok(())
    }

    /// Whether a regular file exists at `path`.
    pub fn exists(&self, path: impl AsRef<Path>) -> bool {
        path.as_ref().is_file()
    }

    /// Names of regular files in `dir` ending in `.{suffix}`, with the suffix
    /// stripped. Missing directories yield an empty list.
    pub fn list_files(&self, dir: impl AsRef<Path>, suffix: &str) -> VaultResult<Vec<String>> {
        self.ensure_initialized()?;

        let dir = dir.as_ref();
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let dotted = format!(".{suffix}");
        let mut names = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if let Some(stem) = name.strip_suffix(&dotted) {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Overwrite a file with random bytes `passes` times, then unlink it.
    ///
    /// Each pass is flushed with `sync_all` before the next one starts.
    pub fn shred(&self, path: impl AsRef<Path>, passes: usize) -> VaultResult<()> {
        self.ensure_initialized()?;

        let path = path.as_ref();
        let len = fs::metadata(path)?.len();
        let mut file = OpenOptions::new().write(true).open(path)?;
        let mut chunk = vec![0u8; SHRED_CHUNK];

        for _ in 0..passes {
            file.seek(SeekFrom::Start(0))?;
            let mut remaining = len;
            while remaining > 0 {
                let n = remaining.min(SHRED_CHUNK as u64) as usize;
                fill_random(&mut chunk[..n])?;
                file.write_all(&chunk[..n])?;
                remaining -= n as u64;
            }
            file.sync_all()?;
        }
        drop(file);

        fs::remove_file(path)?;
        Ok(())
    }

    fn ensure_initialized(&self) -> VaultResult<()> {
        if self.initialized {
            Ok(())
        } else {
            Err(VaultError::NotInitialized)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    fn test_storage() -> (TempDir, VaultStorage) {
        let dir = TempDir::new().unwrap();
        let mut storage = VaultStorage::new(VaultPaths::new(dir.path()));
        storage.initialize().expect("Failed to initialize test storage");
        (dir, storage)
    }

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct TestData {
        id: String,
        value: i32,
    }

    #[test]
    fn initialize_creates_directories() {
        let (_dir, storage) = test_storage();
        assert!(storage.is_initialized());
        assert!(storage.paths().personas_dir().exists());
        assert!(storage.paths().audit_dir().exists());
    }

    #[test]
    fn write_and_read_json() {
        let (_dir, storage) = test_storage();
        let data = TestData {
            id: "test-1".to_string(),
            value: 42,
        };

        let path = storage.paths().personas_dir().join("test.json");
        storage.write_json(&path, &data).unwrap();
        assert!(storage.exists(&path));
        assert!(!storage.exists(storage.paths().personas_dir()));

        let read: TestData = storage.read_json(&path).unwrap();
        assert_eq!(read, data);
    }

    #[test]
    fn concurrent_writes_to_one_record_do_not_collide() {
        let (_dir, storage) = test_storage();
        let dir = storage.paths().personas_dir();
        let path = dir.join("shared.persona.json");

        std::thread::scope(|scope| {
            for value in 0..8 {
                let (storage, path) = (&storage, &path);
                scope.spawn(move || {
                    let data = TestData {
                        id: "shared".to_string(),
                        value,
                    };
                    storage.write_json(path, &data).unwrap();
                });
            }
        });

        let read: TestData = storage.read_json(&path).unwrap();
        assert_eq!(read.id, "shared");
        assert!((0..8).contains(&read.value));

        let entries: Vec<_> = fs::read_dir(&dir).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn missing_file_maps_to_not_found() {
        let (_dir, storage) = test_storage();
        let path = storage.paths().personas_dir().join("absent.json");
        let result = storage.read_json::<TestData>(&path);
        assert!(matches!(result, Err(VaultError::NotFound(_))));
    }

    #[test]
    fn append_line_accumulates() {
        let (_dir, storage) = test_storage();
        let path = storage.paths().audit_events_file("2026-01-01");
        storage.append_line(&path, b"{\"a\":1}").unwrap();
        storage.append_line(&path, b"{\"a\":2}").unwrap();

        let content = String::from_utf8(storage.read_raw(&path).unwrap()).unwrap();
        assert_eq!(content, "{\"a\":1}\n{\"a\":2}\n");
    }

    #[test]
    fn health_check_works() {
        let (_dir, storage) = test_storage();
        storage.health_check().expect("Health check should pass");
    }

    #[test]
    fn list_files_strips_compound_suffix() {
        let (_dir, storage) = test_storage();
        let dir = storage.paths().personas_dir();
        for name in ["b.persona.json", "a.persona.json", "c.json", "d.persona.tmp"] {
            fs::write(dir.join(name), b"{}").unwrap();
        }

        let ids = storage.list_files(&dir, "persona.json").unwrap();
        assert_eq!(ids, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn shred_overwrites_and_removes() {
        let (_dir, storage) = test_storage();
        let path = storage.paths().personas_dir().join("victim.persona.json");
        fs::write(&path, vec![0x41u8; 3 * SHRED_CHUNK + 17]).unwrap();

        storage.shred(&path, SHRED_PASSES).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn shred_missing_file_errors() {
        let (_dir, storage) = test_storage();
        let path = storage.paths().personas_dir().join("ghost.persona.json");
        assert!(matches!(
            storage.shred(&path, SHRED_PASSES),
            Err(VaultError::NotFound(_))
        ));
    }

    #[test]
    fn contained_path_stays_in_directory() {
        let (_dir, storage) = test_storage();
        let dir = storage.paths().personas_dir();

        let ok = storage.contained_path(&dir, "abc.persona.json").unwrap();
        assert_eq!(ok.parent(), Some(fs::canonicalize(&dir).unwrap().as_path()));

        assert!(matches!(
            storage.contained_path(&dir, "../escape.persona.json"),
            Err(VaultError::PathTraversalRejected)
        ));
    }

    #[cfg(unix)]
    #[test]
    fn contained_path_rejects_symlink() {
        let (dir, storage) = test_storage();
        let outside = dir.path().join("outside.json");
        fs::write(&outside, b"{}").unwrap();
        let link = storage.paths().personas_dir().join("link.persona.json");
        std::os::unix::fs::symlink(&outside, &link).unwrap();

        assert!(matches!(
            storage.contained_path(storage.paths().personas_dir(), "link.persona.json"),
            Err(VaultError::PathTraversalRejected)
        ));
    }

    #[test]
    fn uninitialized_storage_returns_error() {
        let storage = VaultStorage::new(VaultPaths::new("/tmp/never-init"));
        let result = storage.read_json::<TestData>("/tmp/any.json");
        assert!(matches!(result, Err(VaultError::NotInitialized)));
    }
}
