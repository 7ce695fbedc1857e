//! Named signing key references.
//!
//! The keyring only maps key names to the address they sign for. File based backends keep one TOML
//! record per key under `<home>/keyring-<backend>`.

use std::{
    collections::BTreeMap,
    fmt, fs,
    path::{Path, PathBuf},
    str::FromStr,
    sync::Arc,
};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::errors::ClientError;

const KEY_FILE_EXT: &str = "toml";

/// Where keys are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyringBackend {
    /// The operating system's credential store, mirrored on disk.
    Os,

    /// Plain files under the home directory.
    File,

    /// Plain files meant for tests and local networks.
    Test,

    /// Process memory only.
    Memory,
}

impl KeyringBackend {
    /// Backend name as used in configuration.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Os => "os",
            Self::File => "file",
            Self::Test => "test",
            Self::Memory => "memory",
        }
    }
}

impl fmt::Display for KeyringBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyringBackend {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "os" => Ok(Self::Os),
            "file" => Ok(Self::File),
            "test" => Ok(Self::Test),
            "memory" => Ok(Self::Memory),
            other => Err(ClientError::InvalidKeyringBackend(other.to_string())),
        }
    }
}

/// A named key and the address it signs for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRecord {
    /// Key name.
    pub name: String,

    /// Hex address.
    pub address: String,
}

impl KeyRecord {
    fn derive(name: &str, backend: KeyringBackend) -> Self {
        let digest = Sha256::digest(format!("{backend}/{name}").as_bytes());
        Self {
            name: name.to_string(),
            address: hex::encode(&digest[..20]),
        }
    }
}

/// A keyring opened on one backend.
#[derive(Debug, Clone)]
pub struct Keyring {
    backend: KeyringBackend,
    dir: Option<PathBuf>,
    memory: Arc<RwLock<BTreeMap<String, KeyRecord>>>,
}

impl Keyring {
    /// Opens the keyring of `backend` under `home`. Nothing is touched on disk.
    pub fn open(backend: KeyringBackend, home: &Path) -> Self {
        let dir = match backend {
            KeyringBackend::Memory => None,
            other => Some(home.join(format!("keyring-{other}"))),
        };
        Self {
            backend,
            dir,
            memory: Arc::default(),
        }
    }

    /// The backend.
    pub fn backend(&self) -> KeyringBackend {
        self.backend
    }

    /// Directory holding the key files, if the backend uses one.
    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    fn key_path(&self, dir: &Path, name: &str) -> PathBuf {
        dir.join(format!("{name}.{KEY_FILE_EXT}"))
    }

    /// Creates a key named `name`.
    pub fn add(&self, name: &str) -> Result<KeyRecord, ClientError> {
        validate_name(name)?;
        let record = KeyRecord::derive(name, self.backend);

        let Some(dir) = &self.dir else {
            let mut keys = self.memory.write();
            if keys.contains_key(name) {
                return Err(ClientError::KeyExists(name.to_string()));
            }
            keys.insert(name.to_string(), record.clone());
            return Ok(record);
        };

        let path = self.key_path(dir, name);
        if path.exists() {
            return Err(ClientError::KeyExists(name.to_string()));
        }
        let io_err = |source| ClientError::KeyringIo {
            path: path.clone(),
            source,
        };
        fs::create_dir_all(dir).map_err(io_err)?;
        let contents = toml::to_string(&record).map_err(|err| ClientError::MalformedKey {
            path: path.clone(),
            reason: err.to_string(),
        })?;
        fs::write(&path, contents).map_err(io_err)?;
        Ok(record)
    }

    /// Looks a key up by name.
    pub fn get(&self, name: &str) -> Result<KeyRecord, ClientError> {
        let Some(dir) = &self.dir else {
            return self
                .memory
                .read()
                .get(name)
                .cloned()
                .ok_or_else(|| ClientError::KeyNotFound(name.to_string()));
        };

        let path = self.key_path(dir, name);
        if !path.exists() {
            return Err(ClientError::KeyNotFound(name.to_string()));
        }
        read_record(&path)
    }

    /// All keys, sorted by name.
    pub fn list(&self) -> Result<Vec<KeyRecord>, ClientError> {
        let Some(dir) = &self.dir else {
            return Ok(self.memory.read().values().cloned().collect());
        };
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let entries = fs::read_dir(dir).map_err(|source| ClientError::KeyringIo {
            path: dir.to_path_buf(),
            source,
        })?;
        let mut records = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|source| ClientError::KeyringIo {
                    path: dir.to_path_buf(),
                    source,
                })?
                .path();
            if path.extension().is_some_and(|ext| ext == KEY_FILE_EXT) {
                records.push(read_record(&path)?);
            }
        }
        records.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(records)
    }
}

fn validate_name(name: &str) -> Result<(), ClientError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(ClientError::InvalidArgument {
            name: "name".to_string(),
            reason: format!("`{name}` must be non-empty ascii alphanumerics, `-` or `_`"),
        })
    }
}

fn read_record(path: &Path) -> Result<KeyRecord, ClientError> {
    let contents = fs::read_to_string(path).map_err(|source| ClientError::KeyringIo {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|err| ClientError::MalformedKey {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_names() {
        for backend in [
            KeyringBackend::Os,
            KeyringBackend::File,
            KeyringBackend::Test,
            KeyringBackend::Memory,
        ] {
            assert_eq!(backend.as_str().parse::<KeyringBackend>().unwrap(), backend);
        }
        assert!(matches!(
            "kwallet".parse::<KeyringBackend>(),
            Err(ClientError::InvalidKeyringBackend(_))
        ));
    }

    #[test]
    fn test_file_keyring_roundtrip() {
        let home = tempfile::tempdir().unwrap();
        let keyring = Keyring::open(KeyringBackend::Test, home.path());
        assert_eq!(keyring.dir(), Some(home.path().join("keyring-test").as_path()));
        assert!(keyring.list().unwrap().is_empty());

        let alice = keyring.add("alice").unwrap();
        keyring.add("bob").unwrap();
        assert_eq!(keyring.get("alice").unwrap(), alice);
        assert_eq!(alice.address.len(), 40);

        let names: Vec<_> = keyring.list().unwrap().into_iter().map(|k| k.name).collect();
        assert_eq!(names, ["alice", "bob"]);

        // a second handle on the same directory sees the same keys
        let reopened = Keyring::open(KeyringBackend::Test, home.path());
        assert_eq!(reopened.get("bob").unwrap().name, "bob");
    }

    #[test]
    fn test_memory_keyring() {
        let keyring = Keyring::open(KeyringBackend::Memory, Path::new("/nonexistent"));
        assert!(keyring.dir().is_none());
        keyring.add("val").unwrap();
        assert!(matches!(keyring.add("val"), Err(ClientError::KeyExists(_))));
        assert!(matches!(keyring.get("other"), Err(ClientError::KeyNotFound(_))));
    }

    #[test]
    fn test_invalid_key_name() {
        let keyring = Keyring::open(KeyringBackend::Memory, Path::new("."));
        assert!(matches!(
            keyring.add("../escape"),
            Err(ClientError::InvalidArgument { .. })
        ));
    }
}
