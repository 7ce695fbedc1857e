//! Commands derived from module and service descriptors.
//!
//! Every module may describe its query and transaction services. Each described RPC method
//! becomes a command under `query <module>` or `tx <module>`; services that belong to no module
//! (node introspection for instance) are attached the same way after the modules. Hand-written
//! commands always take precedence over derived ones of the same name.

use std::{collections::BTreeMap, fmt};

use notsim_server::{ArgSpec, CommandError, CommandNode, CommandSource, FlagSpec, RootCommand};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::{
    context::ClientContext,
    flags::{is_reserved, query_command, tx_command},
};

/// Node method receiving signed transactions.
pub const BROADCAST_METHOD: &str = "tx.Service.BroadcastTx";

/// How one RPC method is exposed as a command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RpcCommandOptions {
    /// Method name within its service.
    pub rpc_method: String,

    /// Command name. Defaults to the kebab-cased method name.
    pub use_name: Option<String>,

    /// One-line description.
    pub short: String,

    /// Request fields taken as positional arguments, in order.
    pub positional_args: Vec<String>,

    /// Request fields taken as flags, with their usage.
    pub flag_options: BTreeMap<String, String>,

    /// Don't expose the method.
    pub skip: bool,
}

impl RpcCommandOptions {
    /// Exposes `rpc_method` with default settings.
    pub fn new(rpc_method: impl Into<String>) -> Self {
        Self {
            rpc_method: rpc_method.into(),
            ..Default::default()
        }
    }

    /// Sets the command name.
    pub fn use_name(mut self, name: impl Into<String>) -> Self {
        self.use_name = Some(name.into());
        self
    }

    /// Sets the description.
    pub fn short(mut self, short: impl Into<String>) -> Self {
        self.short = short.into();
        self
    }

    /// Takes the field `name` as the next positional argument.
    pub fn positional(mut self, name: impl Into<String>) -> Self {
        self.positional_args.push(name.into());
        self
    }

    /// Takes the field `name` as a flag.
    pub fn flag(mut self, name: impl Into<String>, usage: impl Into<String>) -> Self {
        self.flag_options.insert(name.into(), usage.into());
        self
    }

    /// Hides the method.
    pub fn skip(mut self) -> Self {
        self.skip = true;
        self
    }

    /// Name of the derived command.
    pub fn command_name(&self) -> String {
        self.use_name
            .clone()
            .unwrap_or_else(|| kebab_case(&self.rpc_method))
    }
}

/// Describes the commands of one service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceCommandDescriptor {
    /// Fully qualified service name, the prefix of every method call.
    pub service: String,

    /// Description of the command group.
    pub short: String,

    /// Exposed methods.
    pub rpc_command_options: Vec<RpcCommandOptions>,

    /// Nested command groups.
    pub sub_commands: BTreeMap<String, ServiceCommandDescriptor>,
}

impl ServiceCommandDescriptor {
    /// A descriptor for `service` without methods.
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            ..Default::default()
        }
    }

    /// Sets the group description.
    pub fn short(mut self, short: impl Into<String>) -> Self {
        self.short = short.into();
        self
    }

    /// Exposes a method.
    pub fn rpc(mut self, options: RpcCommandOptions) -> Self {
        self.rpc_command_options.push(options);
        self
    }

    /// Adds a nested group.
    pub fn sub_command(mut self, name: impl Into<String>, descriptor: ServiceCommandDescriptor) -> Self {
        self.sub_commands.insert(name.into(), descriptor);
        self
    }
}

/// The query and transaction descriptors of one module or service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleOptions {
    /// Commands under `query`.
    pub query: Option<ServiceCommandDescriptor>,

    /// Commands under `tx`.
    pub tx: Option<ServiceCommandDescriptor>,
}

/// Descriptors of every module plus the explicit overrides and auxiliary services.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppOptions {
    /// Descriptors declared by the modules themselves.
    pub modules: BTreeMap<String, ModuleOptions>,

    /// Explicit descriptors. Replace the module's own one; entries naming no module are
    /// auxiliary services.
    pub module_options: BTreeMap<String, ModuleOptions>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Query,
    Tx,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Query => "query",
            Self::Tx => "tx",
        })
    }
}

impl AppOptions {
    /// Module descriptors with the explicit overrides applied, by module name.
    pub fn effective_modules(&self) -> BTreeMap<&str, &ModuleOptions> {
        self.modules
            .iter()
            .map(|(name, own)| {
                let opts = self.module_options.get(name).unwrap_or(own);
                (name.as_str(), opts)
            })
            .collect()
    }

    /// Descriptors that belong to no module.
    pub fn services(&self) -> BTreeMap<&str, &ModuleOptions> {
        self.module_options
            .iter()
            .filter(|(name, _)| !self.modules.contains_key(*name))
            .map(|(name, opts)| (name.as_str(), opts))
            .collect()
    }

    /// Attaches the derived commands to `root`.
    ///
    /// Creates the `query` and `tx` groups if they are missing. Module commands are attached
    /// before service commands; a derived command never replaces an existing one.
    pub fn enhance_root_command(&self, root: &mut RootCommand) -> Result<(), CommandError> {
        let groups: [(Kind, fn() -> CommandNode); 2] =
            [(Kind::Query, query_command), (Kind::Tx, tx_command)];
        for (kind, make) in groups {
            if root.node().find(&kind.to_string()).is_none() {
                root.add_subcommand(make())?;
            }
        }

        let modules = self
            .effective_modules()
            .into_iter()
            .map(|(name, opts)| (name, opts, CommandSource::Module(name.to_string())));
        let services = self
            .services()
            .into_iter()
            .map(|(name, opts)| (name, opts, CommandSource::Service(name.to_string())));

        for (name, opts, source) in modules.chain(services) {
            for (kind, descriptor) in [(Kind::Query, &opts.query), (Kind::Tx, &opts.tx)] {
                let Some(descriptor) = descriptor else {
                    continue;
                };
                let group = build_group(name, descriptor, kind, &source);
                let parent = root
                    .node_mut()
                    .find_mut(&kind.to_string())
                    .ok_or_else(|| CommandError::failed(format!("missing `{kind}` command")))?;
                if parent.merge_subcommand(group) {
                    debug!(%kind, command = %name, ?source, "attached derived commands");
                }
            }
        }
        Ok(())
    }
}

fn build_group(
    name: &str,
    descriptor: &ServiceCommandDescriptor,
    kind: Kind,
    source: &CommandSource,
) -> CommandNode {
    let about = if descriptor.short.is_empty() {
        format!("{kind} commands for the {name} module")
    } else {
        descriptor.short.clone()
    };
    let mut group = CommandNode::new(name, about).with_source(source.clone());

    for rpc in descriptor.rpc_command_options.iter().filter(|rpc| !rpc.skip) {
        group.merge_subcommand(build_rpc(&descriptor.service, rpc, kind, source));
    }
    for (sub_name, sub) in &descriptor.sub_commands {
        group.merge_subcommand(build_group(sub_name, sub, kind, source));
    }
    group
}

fn build_rpc(
    service: &str,
    rpc: &RpcCommandOptions,
    kind: Kind,
    source: &CommandSource,
) -> CommandNode {
    let method = format!("{service}.{}", rpc.rpc_method);
    let about = if rpc.short.is_empty() {
        format!("Execute the {} RPC method", rpc.rpc_method)
    } else {
        rpc.short.clone()
    };

    let mut command = CommandNode::new(rpc.command_name(), about).with_source(source.clone());
    for arg in &rpc.positional_args {
        command = command.arg(ArgSpec::required(arg.clone(), arg.clone()));
    }
    let mut fields = rpc.positional_args.clone();
    for (flag, usage) in &rpc.flag_options {
        if is_reserved(flag) || rpc.positional_args.contains(flag) {
            warn!(%method, %flag, "flag name is taken, not exposing it");
            continue;
        }
        command = command.flag(FlagSpec::value(flag.clone(), usage.clone()));
        fields.push(flag.clone());
    }

    let type_url = format!("/{service}/{}", rpc.rpc_method);
    command.handler(move |inv| {
        let ctx = inv.context::<ClientContext>()?.clone();

        let mut params = Map::new();
        for field in &fields {
            if let Some(value) = inv.value(field) {
                params.insert(field.replace('-', "_"), Value::String(value.to_string()));
            }
        }

        let client = ctx.node_client()?;
        let result = match kind {
            Kind::Query => client.call(&method, params)?,
            Kind::Tx => {
                let signer = ctx.signer()?;
                let mut msg = Map::new();
                msg.insert("@type".to_string(), Value::String(type_url.clone()));
                msg.extend(params);
                let mut request = Map::new();
                request.insert("msg".to_string(), Value::Object(msg));
                request.insert("signer".to_string(), Value::String(signer.address));
                request.insert("chain_id".to_string(), ctx.chain_id().into());
                request.insert("mode".to_string(), ctx.broadcast_mode().as_str().into());
                client.call(BROADCAST_METHOD, request)?
            }
        };

        inv.println(ctx.output().render(&result)?)?;
        Ok(())
    })
}

fn kebab_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, c) in name.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 {
                out.push('-');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}
