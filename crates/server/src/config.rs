//! The global configuration map.
//!
//! Every configuration source is flattened into a single map of dotted keys. Sources are layered
//! with increasing precedence: built-in defaults, the files under `<home>/config`, environment
//! variables and finally command-line flags. Once built, the map is read-only and shared behind an
//! [`Arc`].

use std::{
    collections::BTreeMap,
    env, fmt, fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use toml::{Table, Value};
use tracing::debug;

use crate::errors::ConfigError;

/// Name of the file holding the server configuration.
pub const APP_CONFIG_FILE: &str = "app.toml";

/// Name of the file holding the client configuration.
pub const CLIENT_CONFIG_FILE: &str = "client.toml";

/// Name of the configuration directory under the home directory.
pub const CONFIG_DIR: &str = "config";

/// Key under which the resolved home directory is stored.
pub const HOME_KEY: &str = "home";

/// A configuration file together with its default contents.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigFile {
    name: String,
    namespace: Option<String>,
    defaults: Table,
}

impl ConfigFile {
    /// A file whose keys land at the top level of the global map.
    pub fn new(name: impl Into<String>, defaults: Table) -> Self {
        Self {
            name: name.into(),
            namespace: None,
            defaults,
        }
    }

    /// Prefixes every key of the file with `namespace.` in the global map.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// File name relative to the configuration directory.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The namespace keys are stored under, if any.
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Default contents.
    pub fn defaults(&self) -> &Table {
        &self.defaults
    }
}

/// Something that knows which configuration files exist and what they contain by default.
pub trait ConfigWriter: Send + Sync + fmt::Debug {
    /// The files making up the configuration, with their defaults.
    fn config_files(&self) -> Vec<ConfigFile>;

    /// Writes the default files into `config_dir`, leaving existing files untouched.
    ///
    /// Returns the files that were created.
    fn write_config(&self, config_dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
        fs::create_dir_all(config_dir).map_err(|source| ConfigError::Write {
            path: config_dir.to_path_buf(),
            source,
        })?;

        let mut written = Vec::new();
        for file in self.config_files() {
            let path = config_dir.join(file.name());
            if path.exists() {
                debug!(path = %path.display(), "config file exists, not overwriting");
                continue;
            }
            let contents = toml::to_string_pretty(file.defaults())?;
            fs::write(&path, contents).map_err(|source| ConfigError::Write {
                path: path.clone(),
                source,
            })?;
            written.push(path);
        }
        Ok(written)
    }
}

/// The flattened, read-only configuration of a single invocation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GlobalConfig {
    values: BTreeMap<String, Value>,
}

impl GlobalConfig {
    /// Starts building a configuration.
    pub fn builder() -> GlobalConfigBuilder {
        GlobalConfigBuilder::default()
    }

    /// Raw value at `key`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// String value at `key`.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// Boolean value at `key`.
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(Value::as_bool)
    }

    /// Non-negative integer value at `key`.
    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.get(key)
            .and_then(Value::as_integer)
            .and_then(|v| u64::try_from(v).ok())
    }

    /// The home directory the configuration was loaded from.
    pub fn home(&self) -> Option<PathBuf> {
        self.get_str(HOME_KEY).map(PathBuf::from)
    }

    /// Whether `key` is present.
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Iterates over all keys and values in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Rebuilds the nested table of every key under `prefix.`.
    ///
    /// Components use this to deserialize their own section into a typed config.
    pub fn section(&self, prefix: &str) -> Table {
        let mut table = Table::new();
        let dotted = format!("{prefix}.");
        for (key, value) in &self.values {
            if let Some(rest) = key.strip_prefix(&dotted) {
                insert_path(&mut table, rest, value.clone());
            }
        }
        table
    }

    /// Rebuilds the full nested table.
    pub fn to_table(&self) -> Table {
        let mut table = Table::new();
        for (key, value) in &self.values {
            insert_path(&mut table, key, value.clone());
        }
        table
    }
}

/// Builder layering configuration sources on top of each other.
#[derive(Debug, Clone, Default)]
pub struct GlobalConfigBuilder {
    values: BTreeMap<String, Value>,
}

impl GlobalConfigBuilder {
    /// Adds the defaults of `files`.
    pub fn with_defaults(mut self, files: &[ConfigFile]) -> Self {
        for file in files {
            flatten_into(&mut self.values, file.namespace(), file.defaults());
        }
        self
    }

    /// Overlays the contents of `files` read from `config_dir`.
    ///
    /// A missing file keeps the defaults. A file that exists but cannot be read or parsed is an
    /// error.
    pub fn load_files(
        mut self,
        config_dir: &Path,
        files: &[ConfigFile],
    ) -> Result<Self, ConfigError> {
        for file in files {
            let path = config_dir.join(file.name());
            let Some(table) = read_table(&path)? else {
                debug!(path = %path.display(), "config file not found, using defaults");
                continue;
            };
            flatten_into(&mut self.values, file.namespace(), &table);
        }
        Ok(self)
    }

    /// Overlays environment variables named `<PREFIX>_<KEY>` for every known key.
    pub fn apply_env(self, prefix: &str) -> Result<Self, ConfigError> {
        self.apply_env_from(prefix, |name| env::var(name).ok())
    }

    /// Like [`Self::apply_env`] with a custom variable lookup.
    pub fn apply_env_from(
        mut self,
        prefix: &str,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let keys: Vec<String> = self.values.keys().cloned().collect();
        for key in keys {
            if let Some(raw) = lookup(&env_var_name(prefix, &key)) {
                self = self.set_raw(&key, &raw)?;
            }
        }
        Ok(self)
    }

    /// Sets `key` from a raw string, coerced to the type of the value already present.
    pub fn set_raw(mut self, key: &str, raw: &str) -> Result<Self, ConfigError> {
        let value = coerce(key, raw, self.values.get(key))?;
        self.values.insert(key.to_string(), value);
        Ok(self)
    }

    /// Sets `key` to a typed value.
    pub fn set(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.values.insert(key.to_string(), value.into());
        self
    }

    /// Current value at `key`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Freezes the configuration.
    pub fn build(self) -> Arc<GlobalConfig> {
        Arc::new(GlobalConfig {
            values: self.values,
        })
    }
}

/// Environment variable consulted for `key`.
pub fn env_var_name(prefix: &str, key: &str) -> String {
    format!("{prefix}_{}", key.replace(['.', '-'], "_")).to_uppercase()
}

fn read_table(path: &Path) -> Result<Option<Table>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let table = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(Some(table))
}

fn flatten_into(out: &mut BTreeMap<String, Value>, prefix: Option<&str>, table: &Table) {
    for (key, value) in table {
        let full = match prefix {
            Some(prefix) => format!("{prefix}.{key}"),
            None => key.clone(),
        };
        match value {
            Value::Table(inner) => flatten_into(out, Some(&full), inner),
            other => {
                out.insert(full, other.clone());
            }
        }
    }
}

fn insert_path(table: &mut Table, dotted: &str, value: Value) {
    match dotted.split_once('.') {
        None => {
            table.insert(dotted.to_string(), value);
        }
        Some((head, rest)) => {
            let entry = table
                .entry(head.to_string())
                .or_insert_with(|| Value::Table(Table::new()));
            if !entry.is_table() {
                *entry = Value::Table(Table::new());
            }
            if let Value::Table(inner) = entry {
                insert_path(inner, rest, value);
            }
        }
    }
}

fn coerce(key: &str, raw: &str, current: Option<&Value>) -> Result<Value, ConfigError> {
    let invalid = |expected| ConfigError::InvalidValue {
        key: key.to_string(),
        value: raw.to_string(),
        expected,
    };

    Ok(match current {
        Some(Value::Boolean(_)) => Value::Boolean(raw.parse().map_err(|_| invalid("a boolean"))?),
        Some(Value::Integer(_)) => Value::Integer(raw.parse().map_err(|_| invalid("an integer"))?),
        Some(Value::Float(_)) => Value::Float(raw.parse().map_err(|_| invalid("a float"))?),
        Some(Value::Array(_)) => Value::Array(
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| Value::String(s.to_string()))
                .collect(),
        ),
        _ => Value::String(raw.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app_file() -> ConfigFile {
        let defaults: Table = toml::from_str(
            r#"
            log_level = "info"
            log_no_color = false

            [bft]
            max_tx_bytes = 1024
            "#,
        )
        .unwrap();
        ConfigFile::new(APP_CONFIG_FILE, defaults)
    }

    fn client_file() -> ConfigFile {
        let defaults: Table = toml::from_str(r#"chain-id = """#).unwrap();
        ConfigFile::new(CLIENT_CONFIG_FILE, defaults).with_namespace("client")
    }

    #[test]
    fn test_defaults_are_flattened() {
        let config = GlobalConfig::builder()
            .with_defaults(&[app_file(), client_file()])
            .build();

        assert_eq!(config.get_str("log_level"), Some("info"));
        assert_eq!(config.get_u64("bft.max_tx_bytes"), Some(1024));
        assert_eq!(config.get_str("client.chain-id"), Some(""));
        assert!(!config.contains("chain-id"));
    }

    #[test]
    fn test_missing_files_keep_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let files = [app_file()];
        let config = GlobalConfig::builder()
            .with_defaults(&files)
            .load_files(dir.path(), &files)
            .unwrap()
            .build();

        assert_eq!(config.get_str("log_level"), Some("info"));
    }

    #[test]
    fn test_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(APP_CONFIG_FILE),
            "log_level = \"debug\"\n[bft]\nmax_tx_bytes = 7\n",
        )
        .unwrap();
        let files = [app_file()];
        let config = GlobalConfig::builder()
            .with_defaults(&files)
            .load_files(dir.path(), &files)
            .unwrap()
            .build();

        assert_eq!(config.get_str("log_level"), Some("debug"));
        assert_eq!(config.get_u64("bft.max_tx_bytes"), Some(7));
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(APP_CONFIG_FILE), "log_level = [").unwrap();
        let files = [app_file()];
        let err = GlobalConfig::builder()
            .with_defaults(&files)
            .load_files(dir.path(), &files)
            .unwrap_err();

        assert!(matches!(err, ConfigError::Parse { .. }));
        let cause = std::error::Error::source(&err).unwrap().to_string();
        assert!(!err.to_string().contains(&cause), "{err}");
    }

    #[test]
    fn test_unreadable_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join(APP_CONFIG_FILE)).unwrap();
        let files = [app_file()];
        let err = GlobalConfig::builder()
            .load_files(dir.path(), &files)
            .unwrap_err();

        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_env_overrides_with_type_coercion() {
        let files = [app_file(), client_file()];
        let config = GlobalConfig::builder()
            .with_defaults(&files)
            .apply_env_from("NOTSIMD", |name| match name {
                "NOTSIMD_BFT_MAX_TX_BYTES" => Some("42".to_string()),
                "NOTSIMD_LOG_NO_COLOR" => Some("true".to_string()),
                "NOTSIMD_CLIENT_CHAIN_ID" => Some("sim-1".to_string()),
                _ => None,
            })
            .unwrap()
            .build();

        assert_eq!(config.get_u64("bft.max_tx_bytes"), Some(42));
        assert_eq!(config.get_bool("log_no_color"), Some(true));
        assert_eq!(config.get_str("client.chain-id"), Some("sim-1"));
    }

    #[test]
    fn test_bad_env_value_is_rejected() {
        let err = GlobalConfig::builder()
            .with_defaults(&[app_file()])
            .apply_env_from("NOTSIMD", |name| {
                (name == "NOTSIMD_BFT_MAX_TX_BYTES").then(|| "lots".to_string())
            })
            .unwrap_err();

        assert!(matches!(err, ConfigError::InvalidValue { expected: "an integer", .. }));
    }

    #[test]
    fn test_section_rebuilds_nested_table() {
        let config = GlobalConfig::builder()
            .set("bft.consensus.timeout_commit", 5000)
            .set("bft.log_level", "info")
            .set("other", true)
            .build();

        let section = config.section("bft");
        assert_eq!(section["log_level"].as_str(), Some("info"));
        assert_eq!(
            section["consensus"]["timeout_commit"].as_integer(),
            Some(5000)
        );
        assert!(!section.contains_key("other"));
    }

    #[test]
    fn test_write_config_keeps_existing_files() {
        #[derive(Debug)]
        struct Writer;

        impl ConfigWriter for Writer {
            fn config_files(&self) -> Vec<ConfigFile> {
                vec![app_file(), client_file()]
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let config_dir = dir.path().join(CONFIG_DIR);
        fs::create_dir_all(&config_dir).unwrap();
        fs::write(config_dir.join(CLIENT_CONFIG_FILE), "chain-id = \"kept\"\n").unwrap();

        let written = Writer.write_config(&config_dir).unwrap();
        assert_eq!(written, vec![config_dir.join(APP_CONFIG_FILE)]);

        let client = fs::read_to_string(config_dir.join(CLIENT_CONFIG_FILE)).unwrap();
        assert!(client.contains("kept"));
        let app: Table =
            toml::from_str(&fs::read_to_string(config_dir.join(APP_CONFIG_FILE)).unwrap()).unwrap();
        assert_eq!(app["bft"]["max_tx_bytes"].as_integer(), Some(1024));
    }
}
