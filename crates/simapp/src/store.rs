//! In-memory versioned state store.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    str::FromStr,
};

use notsim_server::Store;
use parking_lot::RwLock;
use toml::{Table, Value};

use crate::errors::SimAppError;

/// Section of `app.toml` holding the store settings.
pub const STORE_SECTION: &str = "store";

/// Storage backends the application can run on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbBackend {
    /// Everything in process memory, lost on exit.
    MemDb,
}

impl DbBackend {
    /// Backend name as used in configuration.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::MemDb => "memdb",
        }
    }
}

impl FromStr for DbBackend {
    type Err = SimAppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "memdb" => Ok(Self::MemDb),
            other => Err(SimAppError::UnsupportedBackend(other.to_string())),
        }
    }
}

/// Defaults of the `[store]` section.
pub fn store_defaults() -> Table {
    let mut table = Table::new();
    table.insert(
        "app_db_backend".to_string(),
        Value::String(DbBackend::MemDb.as_str().to_string()),
    );
    table
}

#[derive(Debug, Default)]
struct State {
    version: u64,
    committed: BTreeMap<Vec<u8>, Vec<u8>>,
    pending: BTreeMap<Vec<u8>, Vec<u8>>,
}

/// A store keeping committed state in memory.
///
/// Writes are staged until [`MemStore::commit`]; reads only see committed state.
#[derive(Debug)]
pub struct MemStore {
    data_dir: PathBuf,
    state: RwLock<State>,
}

impl MemStore {
    /// Opens an empty store rooted at `data_dir`.
    pub fn open(backend: DbBackend, data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        match backend {
            DbBackend::MemDb => Self {
                data_dir,
                state: RwLock::default(),
            },
        }
    }

    /// Stages a write.
    pub fn set(&self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) {
        self.state.write().pending.insert(key.into(), value.into());
    }

    /// Applies the staged writes and bumps the version.
    pub fn commit(&self) -> u64 {
        let mut state = self.state.write();
        let pending = std::mem::take(&mut state.pending);
        state.committed.extend(pending);
        state.version += 1;
        state.version
    }
}

impl Store for MemStore {
    fn latest_version(&self) -> u64 {
        self.state.read().version
    }

    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.state.read().committed.get(key).cloned()
    }

    fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_see_committed_writes_only() {
        let store = MemStore::open(DbBackend::MemDb, "/tmp/data");
        store.set("k", "v1");
        assert_eq!(store.get(b"k"), None);
        assert_eq!(store.commit(), 1);
        assert_eq!(store.get(b"k"), Some(b"v1".to_vec()));
        assert_eq!(store.latest_version(), 1);
        assert_eq!(store.data_dir(), Path::new("/tmp/data"));
    }

    #[test]
    fn test_only_memdb_is_supported() {
        assert_eq!("memdb".parse::<DbBackend>().unwrap(), DbBackend::MemDb);
        assert!(matches!(
            "goleveldb".parse::<DbBackend>(),
            Err(SimAppError::UnsupportedBackend(name)) if name == "goleveldb"
        ));
    }
}
