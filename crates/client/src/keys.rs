//! The `keys` command group.

use notsim_server::{ArgSpec, CommandError, CommandNode};
use serde_json::Value;

use crate::{context::ClientContext, flags::keys_command};

fn render(ctx: &ClientContext, value: &impl serde::Serialize) -> Result<String, CommandError> {
    let value: Value = serde_json::to_value(value).map_err(CommandError::failed)?;
    Ok(ctx.output().render(&value)?)
}

/// `keys add`, `keys show` and `keys list`.
pub fn keys_commands() -> Result<CommandNode, CommandError> {
    let add = CommandNode::new("add", "Add a key to the keyring")
        .arg(ArgSpec::required("name", "name of the key"))
        .handler(|inv| {
            let ctx = inv.context::<ClientContext>()?.clone();
            let name = inv.value("name").unwrap_or_default().to_string();
            let record = ctx.keyring().add(&name)?;
            inv.println(render(&ctx, &record)?)?;
            Ok(())
        });

    let show = CommandNode::new("show", "Show a key of the keyring")
        .arg(ArgSpec::required("name", "name of the key"))
        .handler(|inv| {
            let ctx = inv.context::<ClientContext>()?.clone();
            let record = ctx.keyring().get(inv.value("name").unwrap_or_default())?;
            inv.println(render(&ctx, &record)?)?;
            Ok(())
        });

    let list = CommandNode::new("list", "List the keys of the keyring").handler(|inv| {
        let ctx = inv.context::<ClientContext>()?.clone();
        let records = ctx.keyring().list()?;
        inv.println(render(&ctx, &records)?)?;
        Ok(())
    });

    keys_command()
        .with_subcommand(add)?
        .with_subcommand(show)?
        .with_subcommand(list)
}
