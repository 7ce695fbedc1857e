//! Hand-written top-level commands.

use std::{path::PathBuf, sync::Arc};

use notsim_server::{
    config::{CONFIG_DIR, HOME_KEY},
    CommandError, CommandNode, ConfigWriter, GlobalConfig, Invocation,
};
use tracing::info;

fn home_dir(config: Option<&GlobalConfig>, inv: &Invocation<'_>) -> Result<PathBuf, CommandError> {
    config
        .and_then(GlobalConfig::home)
        .or_else(|| inv.value(HOME_KEY).map(PathBuf::from))
        .ok_or_else(|| CommandError::InvalidInvocation("no home directory selected".to_string()))
}

/// `init`: writes the default configuration files into the home directory.
pub(crate) fn init_command(
    writer: Arc<dyn ConfigWriter>,
    config: Option<Arc<GlobalConfig>>,
) -> CommandNode {
    CommandNode::new("init", "Write the default configuration files").handler(move |inv| {
        let config_dir = home_dir(config.as_deref(), inv)?.join(CONFIG_DIR);
        let written = writer.write_config(&config_dir)?;
        info!(dir = %config_dir.display(), files = written.len(), "initialized config");
        if written.is_empty() {
            inv.println(format!(
                "configuration in {} already exists",
                config_dir.display()
            ))?;
        }
        for path in written {
            inv.println(format!("wrote {}", path.display()))?;
        }
        Ok(())
    })
}

/// `config show`: prints the configuration of the invocation.
pub(crate) fn config_command(config: Option<Arc<GlobalConfig>>) -> Result<CommandNode, CommandError> {
    let show = CommandNode::new("show", "Print the effective configuration").handler(move |inv| {
        let config = config
            .as_ref()
            .ok_or(CommandError::MissingContext("GlobalConfig"))?;
        let rendered = toml::to_string_pretty(&config.to_table()).map_err(CommandError::failed)?;
        inv.println(rendered.trim_end())?;
        Ok(())
    });
    CommandNode::new("config", "Inspect the node configuration").with_subcommand(show)
}

/// `version`: prints the node version.
pub(crate) fn version_command(version: &'static str) -> CommandNode {
    CommandNode::new("version", "Print the node version").handler(move |inv| {
        inv.println(version)?;
        Ok(())
    })
}
