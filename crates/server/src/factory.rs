//! Classification of an invocation before the dependency graph is built.
//!
//! The factory walks the raw arguments against the command tree to find out which command is
//! about to run, loads the configuration with the invocation's flags on top, and builds the logger.
//! Whether the selected command needs the full application graph decides which bootstrap path the
//! binary takes.

use std::{
    collections::BTreeMap,
    env, fmt,
    path::{Path, PathBuf},
    sync::Arc,
};

use notsim_common::logging::{Logger, LoggerConfig};
use tracing::debug;

use crate::{
    command::{CommandNode, FlagSpec, RootCommand},
    config::{ConfigFile, ConfigWriter, GlobalConfig, APP_CONFIG_FILE, CONFIG_DIR, HOME_KEY},
    errors::{ConfigError, FactoryError},
};

/// Builds the logger once the configuration is known.
pub type LoggerFactory = fn(&str, &GlobalConfig) -> Result<Logger, FactoryError>;

/// Flag selecting the home directory.
pub const FLAG_HOME: &str = "home";

/// Flag selecting the log level.
pub const FLAG_LOG_LEVEL: &str = "log-level";

/// Flag disabling colored logs.
pub const FLAG_LOG_NO_COLOR: &str = "log-no-color";

/// Configuration key of the log level.
pub const LOG_LEVEL_KEY: &str = "log_level";

/// Configuration key of the color switch.
pub const LOG_NO_COLOR_KEY: &str = "log_no_color";

/// Help subcommand the argument parser adds to every command with children.
const HELP_COMMAND: &str = "help";

/// Default logger: installs the global subscriber configured from `log_level` and `log_no_color`.
pub fn new_logger(base_name: &str, config: &GlobalConfig) -> Result<Logger, FactoryError> {
    let mut logger_config = LoggerConfig::with_base_name(base_name);
    if let Some(level) = config.get_str(LOG_LEVEL_KEY) {
        logger_config.set_log_level(level)?;
    }
    logger_config.set_ansi(!config.get_bool(LOG_NO_COLOR_KEY).unwrap_or(false));
    Ok(Logger::install(&logger_config))
}

/// Result of classifying an invocation.
#[derive(Debug, Clone)]
pub struct ParsedCommand {
    path: Vec<String>,
    requires_app: bool,
    config: Arc<GlobalConfig>,
    logger: Logger,
}

impl ParsedCommand {
    /// Names of the selected commands below the root. Empty when only the root was selected.
    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// Whether the selected command needs the full application graph.
    pub fn requires_app(&self) -> bool {
        self.requires_app
    }

    /// The loaded configuration.
    pub fn config(&self) -> &Arc<GlobalConfig> {
        &self.config
    }

    /// The logger built from the configuration.
    pub fn logger(&self) -> &Logger {
        &self.logger
    }
}

/// Whether the classified command needs the full application graph.
pub fn is_app_required(parsed: &ParsedCommand) -> bool {
    parsed.requires_app()
}

/// Classifies invocations and loads their configuration.
#[derive(Clone)]
pub struct CommandFactory {
    home_dir: PathBuf,
    env_prefix: Option<String>,
    config_writer: Option<Arc<dyn ConfigWriter>>,
    logger_factory: LoggerFactory,
}

impl fmt::Debug for CommandFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandFactory")
            .field("home_dir", &self.home_dir)
            .field("env_prefix", &self.env_prefix)
            .field("config_writer", &self.config_writer)
            .finish_non_exhaustive()
    }
}

impl CommandFactory {
    /// Starts building a factory.
    pub fn builder() -> CommandFactoryBuilder {
        CommandFactoryBuilder::default()
    }

    /// The home directory used when neither a flag nor the environment picks one.
    pub fn default_home_dir(&self) -> &Path {
        &self.home_dir
    }

    fn env_prefix(&self, root: &RootCommand) -> String {
        self.env_prefix
            .clone()
            .unwrap_or_else(|| root.name().replace('-', "_").to_uppercase())
    }

    fn global_flags(&self) -> [FlagSpec; 3] {
        [
            FlagSpec::value(FLAG_HOME, "directory for config and data")
                .default_value(self.home_dir.display().to_string())
                .config_key(HOME_KEY)
                .global(),
            FlagSpec::value(FLAG_LOG_LEVEL, "the logging level (trace|debug|info|warn|error|off)")
                .config_key(LOG_LEVEL_KEY)
                .global(),
            FlagSpec::switch(FLAG_LOG_NO_COLOR, "disable colored logs")
                .config_key(LOG_NO_COLOR_KEY)
                .global(),
        ]
    }

    /// Adds the global flags the factory understands to the root command.
    ///
    /// Safe to call more than once.
    pub fn enhance_root_command(&self, root: &mut RootCommand) {
        for flag in self.global_flags() {
            root.node_mut().add_flag(flag);
        }
    }

    /// Classifies `args` against `root` and loads the configuration for the selected command.
    pub fn parse_command(
        &self,
        root: &mut RootCommand,
        args: &[String],
    ) -> Result<ParsedCommand, FactoryError> {
        self.enhance_root_command(root);

        let classified = classify(root.node(), args)?;
        let requires_app = root
            .node()
            .find_path(classified.path.as_slice())
            .is_some_and(CommandNode::requires_app);

        let prefix = self.env_prefix(root);
        let home = classified
            .flags
            .get(HOME_KEY)
            .map(PathBuf::from)
            .or_else(|| env::var(format!("{prefix}_HOME")).ok().map(PathBuf::from))
            .unwrap_or_else(|| self.home_dir.clone());

        let config = self.load_config(&home, &prefix, &classified.flags)?;
        let logger = (self.logger_factory)(root.name(), &config)?;

        debug!(
            command = %classified.path.join(" "),
            home = %home.display(),
            requires_app,
            "classified invocation"
        );

        Ok(ParsedCommand {
            path: classified.path,
            requires_app,
            config,
            logger,
        })
    }

    fn config_files(&self) -> Vec<ConfigFile> {
        match &self.config_writer {
            Some(writer) => writer.config_files(),
            None => vec![ConfigFile::new(APP_CONFIG_FILE, toml::Table::new())],
        }
    }

    fn load_config(
        &self,
        home: &Path,
        prefix: &str,
        flags: &BTreeMap<String, String>,
    ) -> Result<Arc<GlobalConfig>, ConfigError> {
        let files = self.config_files();
        let mut builder = GlobalConfig::builder()
            .with_defaults(&files)
            .load_files(&home.join(CONFIG_DIR), &files)?
            .apply_env(prefix)?;
        for (key, raw) in flags {
            builder = builder.set_raw(key, raw)?;
        }
        Ok(builder
            .set(HOME_KEY, home.display().to_string())
            .build())
    }
}

/// Builder for [`CommandFactory`].
#[derive(Debug, Default)]
pub struct CommandFactoryBuilder {
    home_dir: Option<PathBuf>,
    std_home_dir: Option<String>,
    env_prefix: Option<String>,
    config_writer: Option<Arc<dyn ConfigWriter>>,
    logger_factory: Option<LoggerFactory>,
}

impl CommandFactoryBuilder {
    /// Uses `dir` as the default home directory.
    pub fn with_default_home_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.home_dir = Some(dir.into());
        self
    }

    /// Uses `name` under the user's home directory as the default home directory.
    pub fn with_std_default_home_dir(mut self, name: impl Into<String>) -> Self {
        self.std_home_dir = Some(name.into());
        self
    }

    /// Prefix of the environment variables overriding configuration keys.
    ///
    /// Defaults to the upper-cased root command name.
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = Some(prefix.into());
        self
    }

    /// Provides the configuration files and their defaults.
    pub fn with_config_writer(mut self, writer: Arc<dyn ConfigWriter>) -> Self {
        self.config_writer = Some(writer);
        self
    }

    /// Replaces the logger construction.
    pub fn with_logger_factory(mut self, factory: LoggerFactory) -> Self {
        self.logger_factory = Some(factory);
        self
    }

    /// Builds the factory.
    pub fn build(self) -> Result<CommandFactory, FactoryError> {
        let home_dir = match (self.home_dir, self.std_home_dir) {
            (Some(dir), _) => dir,
            (None, Some(name)) => user_home_dir()
                .ok_or(ConfigError::HomeDirUnavailable)?
                .join(name),
            (None, None) => PathBuf::from("."),
        };
        Ok(CommandFactory {
            home_dir,
            env_prefix: self.env_prefix,
            config_writer: self.config_writer,
            logger_factory: self.logger_factory.unwrap_or(new_logger),
        })
    }
}

fn user_home_dir() -> Option<PathBuf> {
    env::var_os("HOME")
        .or_else(|| env::var_os("USERPROFILE"))
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

#[derive(Debug, Default)]
struct Classified {
    path: Vec<String>,
    flags: BTreeMap<String, String>,
}

/// Walks the raw arguments down the command tree.
///
/// Flags are skipped (consuming their value when they take one) and the first token that names no
/// child ends the descent. A leading `help` selects the root, whatever it asks help for. Any other
/// unknown token directly below a root that takes no positional arguments is an invalid
/// invocation. Values of flags bound to configuration keys are collected.
fn classify(root: &CommandNode, args: &[String]) -> Result<Classified, FactoryError> {
    let mut classified = Classified::default();
    let mut node = root;
    let mut visible: Vec<&FlagSpec> = root.flags().iter().collect();
    let mut descending = true;

    let mut tokens = args.iter();
    while let Some(token) = tokens.next() {
        if token == "--" {
            break;
        }

        if let Some(body) = token.strip_prefix("--") {
            let (name, inline) = match body.split_once('=') {
                Some((name, value)) => (name, Some(value.to_string())),
                None => (body, None),
            };
            let Some(flag) = visible.iter().find(|f| f.name() == name) else {
                continue;
            };
            let value = if flag.takes_value() {
                match inline {
                    Some(value) => value,
                    None => tokens.next().cloned().ok_or_else(|| {
                        FactoryError::InvalidInvocation(format!("flag needs an argument: --{name}"))
                    })?,
                }
            } else {
                inline.unwrap_or_else(|| "true".to_string())
            };
            if let Some(key) = flag.bound_key() {
                classified.flags.insert(key.to_string(), value);
            }
            continue;
        }

        if token.starts_with('-') || !descending {
            continue;
        }

        match node.find(token) {
            Some(child) => {
                node = child;
                classified.path.push(child.name().to_string());
                visible.extend(child.flags());
            }
            None if classified.path.is_empty() && token == HELP_COMMAND => break,
            None if classified.path.is_empty() && root.args().is_empty() => {
                return Err(FactoryError::InvalidInvocation(format!(
                    "unknown command \"{token}\" for \"{}\"",
                    root.name()
                )));
            }
            None => descending = false,
        }
    }

    Ok(classified)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn nop_logger(_: &str, _: &GlobalConfig) -> Result<Logger, FactoryError> {
        Ok(Logger::nop())
    }

    #[derive(Debug)]
    struct Writer;

    impl ConfigWriter for Writer {
        fn config_files(&self) -> Vec<ConfigFile> {
            let defaults = toml::from_str("log_level = \"info\"\nlog_no_color = false\n").unwrap();
            vec![ConfigFile::new(APP_CONFIG_FILE, defaults)]
        }
    }

    fn root() -> RootCommand {
        let mut root = RootCommand::new("simd", "test node");
        root.add_subcommand(CommandNode::new("start", "run").requiring_app())
            .unwrap();
        root.add_subcommand(
            CommandNode::new("query", "queries")
                .flag(FlagSpec::value("node", "rpc endpoint").config_key("client.node"))
                .with_subcommand(CommandNode::new("balance", "balances"))
                .unwrap(),
        )
        .unwrap();
        root
    }

    fn factory(home: &Path) -> CommandFactory {
        CommandFactory::builder()
            .with_default_home_dir(home)
            .with_env_prefix("SIMD_FACTORY_TEST")
            .with_config_writer(Arc::new(Writer))
            .with_logger_factory(nop_logger)
            .build()
            .unwrap()
    }

    #[test]
    fn test_classifies_app_commands() {
        let dir = tempfile::tempdir().unwrap();
        let mut root = root();
        let parsed = factory(dir.path())
            .parse_command(&mut root, &args(&["start"]))
            .unwrap();
        assert_eq!(parsed.path(), ["start"]);
        assert!(is_app_required(&parsed));
    }

    #[test]
    fn test_classifies_client_commands() {
        let dir = tempfile::tempdir().unwrap();
        let mut root = root();
        let parsed = factory(dir.path())
            .parse_command(
                &mut root,
                &args(&["--log-level", "debug", "query", "--node", "http://x:1", "balance", "addr"]),
            )
            .unwrap();
        assert_eq!(parsed.path(), ["query", "balance"]);
        assert!(!parsed.requires_app());
        assert_eq!(parsed.config().get_str("log_level"), Some("debug"));
        assert_eq!(parsed.config().get_str("client.node"), Some("http://x:1"));
    }

    #[test]
    fn test_no_arguments_selects_the_root() {
        let dir = tempfile::tempdir().unwrap();
        let mut root = root();
        let parsed = factory(dir.path()).parse_command(&mut root, &[]).unwrap();
        assert!(parsed.path().is_empty());
        assert!(!parsed.requires_app());
        assert_eq!(parsed.config().home(), Some(dir.path().to_path_buf()));
    }

    #[test]
    fn test_unknown_root_command_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut root = root();
        let err = factory(dir.path())
            .parse_command(&mut root, &args(&["bogus"]))
            .unwrap_err();
        assert!(matches!(err, FactoryError::InvalidInvocation(_)));
    }

    #[test]
    fn test_help_selects_the_root() {
        let dir = tempfile::tempdir().unwrap();
        let factory = factory(dir.path());
        for list in [&["help"][..], &["help", "start"], &["help", "query", "balance"]] {
            let mut root = root();
            let parsed = factory.parse_command(&mut root, &args(list)).unwrap();
            assert!(parsed.path().is_empty(), "{list:?} selected {:?}", parsed.path());
            assert!(!parsed.requires_app());
        }
    }

    #[test]
    fn test_missing_flag_value_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut root = root();
        let err = factory(dir.path())
            .parse_command(&mut root, &args(&["query", "--node"]))
            .unwrap_err();
        assert!(matches!(err, FactoryError::InvalidInvocation(_)));
    }

    #[test]
    fn test_home_flag_selects_config_dir() {
        let default_home = tempfile::tempdir().unwrap();
        let other_home = tempfile::tempdir().unwrap();
        let config_dir = other_home.path().join(CONFIG_DIR);
        fs::create_dir_all(&config_dir).unwrap();
        fs::write(config_dir.join(APP_CONFIG_FILE), "log_level = \"warn\"\n").unwrap();

        let mut root = root();
        let home = other_home.path().display().to_string();
        let parsed = factory(default_home.path())
            .parse_command(&mut root, &args(&["--home", &home, "query"]))
            .unwrap();
        assert_eq!(parsed.config().get_str("log_level"), Some("warn"));
        assert_eq!(parsed.config().home(), Some(other_home.path().to_path_buf()));
    }

    #[test]
    fn test_corrupt_config_fails_to_load() {
        let dir = tempfile::tempdir().unwrap();
        let config_dir = dir.path().join(CONFIG_DIR);
        fs::create_dir_all(&config_dir).unwrap();
        fs::write(config_dir.join(APP_CONFIG_FILE), "this is not toml").unwrap();

        let mut root = root();
        let err = factory(dir.path())
            .parse_command(&mut root, &args(&["query"]))
            .unwrap_err();
        assert!(matches!(err, FactoryError::ConfigLoadFailure(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_enhance_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let factory = factory(dir.path());
        let mut root = root();
        factory.enhance_root_command(&mut root);
        factory.enhance_root_command(&mut root);
        let homes = root
            .node()
            .flags()
            .iter()
            .filter(|f| f.name() == FLAG_HOME)
            .count();
        assert_eq!(homes, 1);
    }

    #[test]
    fn test_switch_flag_coerces_to_bool() {
        let dir = tempfile::tempdir().unwrap();
        let mut root = root();
        let parsed = factory(dir.path())
            .parse_command(&mut root, &args(&["query", "--log-no-color"]))
            .unwrap();
        assert_eq!(parsed.config().get_bool(LOG_NO_COLOR_KEY), Some(true));
    }
}
