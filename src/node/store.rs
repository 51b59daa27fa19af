//! Local store directory and its scratch space.
//!
//! # Responsibilities
//! - Create the store directory and persist the node ID
//! - Remove temporary directories abandoned by a crashed process
//! - Create and record a fresh temporary directory for this run
//!
//! # Layout
//! ```text
//! <store>/
//!     NODE_ID                  node UUID, written on first boot
//!     temp-dirs-record.txt     one temp dir path per line
//!     replica-temp-<uuid>/     scratch space of the current run
//! ```

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use uuid::Uuid;

use crate::config::StoreConfig;

pub const TEMP_DIRS_RECORD: &str = "temp-dirs-record.txt";
pub const TEMP_DIR_PREFIX: &str = "replica-temp";
pub const NODE_ID_FILE: &str = "NODE_ID";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to create dir for store: {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("could not clean up temporary directories from record file {path}: {source}")]
    Cleanup {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("could not create temporary directory for temp storage: {source}")]
    CreateTemp {
        #[source]
        source: io::Error,
    },
    #[error("could not record temporary directory path to record file: {path}: {source}")]
    Record {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid node ID in {path}: {reason}")]
    NodeId { path: PathBuf, reason: String },
}

/// An acquired store. Its temporary directory lives until [`StoreHandle::release`].
#[derive(Debug)]
pub struct StoreHandle {
    root: Option<PathBuf>,
    temp_dir: PathBuf,
    record: Option<PathBuf>,
    node_id: Uuid,
    initial_boot: bool,
}

impl StoreHandle {
    /// Open the store described by `config`.
    pub fn acquire(config: &StoreConfig) -> Result<Self, StoreError> {
        if config.in_memory {
            let temp_dir = create_temp_dir(&std::env::temp_dir())?;
            return Ok(Self {
                root: None,
                temp_dir,
                record: None,
                node_id: Uuid::new_v4(),
                initial_boot: true,
            });
        }

        let root = PathBuf::from(&config.path);
        let record = root.join(TEMP_DIRS_RECORD);

        // Abandoned temp dirs go first, in case they are what filled the disk.
        if record.exists() {
            cleanup_temp_dirs(&record).map_err(|source| StoreError::Cleanup {
                path: record.clone(),
                source,
            })?;
        }

        fs::create_dir_all(&root).map_err(|source| StoreError::CreateDir {
            path: root.clone(),
            source,
        })?;

        let (node_id, initial_boot) = load_or_create_node_id(&root)?;
        let temp_dir = create_temp_dir(&root)?;
        record_temp_dir(&record, &temp_dir).map_err(|source| StoreError::Record {
            path: record.clone(),
            source,
        })?;

        Ok(Self {
            root: Some(root),
            temp_dir,
            record: Some(record),
            node_id,
            initial_boot,
        })
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    pub fn node_id(&self) -> Uuid {
        self.node_id
    }

    /// The node ID was created by this run.
    pub fn initial_boot(&self) -> bool {
        self.initial_boot
    }

    /// Remove this run's temporary directory and its record entry.
    pub fn release(self) -> io::Result<()> {
        match fs::remove_dir_all(&self.temp_dir) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        if let Some(record) = &self.record {
            forget_temp_dir(record, &self.temp_dir)?;
        }
        tracing::debug!(temp_dir = %self.temp_dir.display(), "Temporary directory removed");
        Ok(())
    }
}

fn load_or_create_node_id(root: &Path) -> Result<(Uuid, bool), StoreError> {
    let path = root.join(NODE_ID_FILE);
    match fs::read_to_string(&path) {
        Ok(content) => {
            let id = Uuid::parse_str(content.trim()).map_err(|e| StoreError::NodeId {
                path: path.clone(),
                reason: e.to_string(),
            })?;
            Ok((id, false))
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            let id = Uuid::new_v4();
            fs::write(&path, id.to_string()).map_err(|e| StoreError::NodeId {
                path: path.clone(),
                reason: e.to_string(),
            })?;
            Ok((id, true))
        }
        Err(e) => Err(StoreError::NodeId {
            path,
            reason: e.to_string(),
        }),
    }
}

fn create_temp_dir(parent: &Path) -> Result<PathBuf, StoreError> {
    let dir = parent.join(format!("{}-{}", TEMP_DIR_PREFIX, Uuid::new_v4()));
    fs::create_dir_all(&dir).map_err(|source| StoreError::CreateTemp { source })?;
    Ok(dir)
}

/// Remove every directory listed in `record`, then empty it.
pub fn cleanup_temp_dirs(record: &Path) -> io::Result<()> {
    let content = fs::read_to_string(record)?;
    for line in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
        match fs::remove_dir_all(line) {
            Ok(()) => tracing::info!(temp_dir = line, "Removed abandoned temporary directory"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
    }
    fs::write(record, "")
}

/// Append `dir` to `record`, creating the record if needed.
pub fn record_temp_dir(record: &Path, dir: &Path) -> io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(record)?;
    writeln!(file, "{}", dir.display())
}

fn forget_temp_dir(record: &Path, dir: &Path) -> io::Result<()> {
    let content = match fs::read_to_string(record) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };
    let dir = dir.display().to_string();
    let kept: Vec<&str> = content.lines().filter(|line| line.trim() != dir).collect();
    let mut rewritten = kept.join("\n");
    if !rewritten.is_empty() {
        rewritten.push('\n');
    }
    fs::write(record, rewritten)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch() -> PathBuf {
        std::env::temp_dir().join(format!("replica-store-test-{}", Uuid::new_v4()))
    }

    fn config(path: &Path) -> StoreConfig {
        StoreConfig {
            path: path.display().to_string(),
            ..StoreConfig::default()
        }
    }

    #[test]
    fn acquire_creates_and_records_temp_dir() {
        let root = scratch();
        let store = StoreHandle::acquire(&config(&root)).unwrap();

        assert!(store.temp_dir().is_dir());
        assert!(store.temp_dir().starts_with(&root));
        assert!(store.initial_boot());
        let record = fs::read_to_string(root.join(TEMP_DIRS_RECORD)).unwrap();
        assert_eq!(record.trim(), store.temp_dir().display().to_string());

        let temp_dir = store.temp_dir().to_path_buf();
        store.release().unwrap();
        assert!(!temp_dir.exists());
        assert!(fs::read_to_string(root.join(TEMP_DIRS_RECORD)).unwrap().is_empty());

        fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn abandoned_temp_dirs_are_cleaned_on_restart() {
        let root = scratch();
        let first = StoreHandle::acquire(&config(&root)).unwrap();
        let abandoned = first.temp_dir().to_path_buf();
        let node_id = first.node_id();
        // Simulate a crash: the handle is never released.
        std::mem::forget(first);

        let second = StoreHandle::acquire(&config(&root)).unwrap();
        assert!(!abandoned.exists());
        assert_ne!(second.temp_dir(), abandoned.as_path());
        assert_eq!(second.node_id(), node_id);
        assert!(!second.initial_boot());

        second.release().unwrap();
        fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn in_memory_store_keeps_no_record() {
        let store = StoreHandle::acquire(&StoreConfig {
            in_memory: true,
            ..StoreConfig::default()
        })
        .unwrap();

        assert!(store.root().is_none());
        assert!(store.temp_dir().is_dir());
        store.release().unwrap();
    }

    #[test]
    fn corrupt_node_id_is_an_error() {
        let root = scratch();
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join(NODE_ID_FILE), "not-a-uuid").unwrap();

        let err = StoreHandle::acquire(&config(&root)).unwrap_err();
        assert!(matches!(err, StoreError::NodeId { .. }));

        fs::remove_dir_all(&root).unwrap();
    }
}
