//! The command tree.
//!
//! Commands are assembled at runtime from several places (built-in commands, module commands,
//! consensus engine commands, service commands), so the tree is kept as plain data and only turned
//! into a [`clap::Command`] when it is executed.

use std::{
    any::{type_name, Any},
    fmt,
    io::{self, Write},
    iter,
    sync::Arc,
};

use clap::{error::ErrorKind, Arg, ArgAction, ArgMatches};
use tracing::{debug, warn};

use crate::errors::CommandError;

/// Body of a runnable command.
pub type CommandHandler = Arc<dyn Fn(&mut Invocation<'_>) -> Result<(), CommandError> + Send + Sync>;

/// Context returned by the pre-execution hook.
pub type CommandContext = Box<dyn Any + Send + Sync>;

/// Hook run once before the body of any runnable command.
pub type PreRunHook =
    Arc<dyn Fn(&Invocation<'_>) -> Result<Option<CommandContext>, CommandError> + Send + Sync>;

/// Where a command comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandSource {
    /// Written by hand as part of the node.
    BuiltIn,

    /// Derived from the descriptor of the named module.
    Module(String),

    /// Derived from the descriptor of the named service.
    Service(String),
}

impl CommandSource {
    /// Whether the command was derived from a descriptor rather than written by hand.
    pub fn is_derived(&self) -> bool {
        !matches!(self, Self::BuiltIn)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum FlagKind {
    Switch,
    Value { default: Option<String> },
}

/// A `--long` flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagSpec {
    name: String,
    help: String,
    kind: FlagKind,
    config_key: Option<String>,
    global: bool,
}

impl FlagSpec {
    /// A boolean flag.
    pub fn switch(name: impl Into<String>, help: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            help: help.into(),
            kind: FlagKind::Switch,
            config_key: None,
            global: false,
        }
    }

    /// A flag taking one value.
    pub fn value(name: impl Into<String>, help: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            help: help.into(),
            kind: FlagKind::Value { default: None },
            config_key: None,
            global: false,
        }
    }

    /// Sets the default value. Has no effect on switches.
    pub fn default_value(mut self, default: impl Into<String>) -> Self {
        if let FlagKind::Value { default: slot } = &mut self.kind {
            *slot = Some(default.into());
        }
        self
    }

    /// Binds the flag to a configuration key, so that it overrides files and environment.
    pub fn config_key(mut self, key: impl Into<String>) -> Self {
        self.config_key = Some(key.into());
        self
    }

    /// Makes the flag available on every descendant command.
    pub fn global(mut self) -> Self {
        self.global = true;
        self
    }

    /// Flag name, without dashes.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the flag consumes a value.
    pub fn takes_value(&self) -> bool {
        matches!(self.kind, FlagKind::Value { .. })
    }

    /// The configuration key the flag overrides.
    pub fn bound_key(&self) -> Option<&str> {
        self.config_key.as_deref()
    }

    /// Whether the flag is inherited by descendants.
    pub fn is_global(&self) -> bool {
        self.global
    }

    fn to_arg(&self) -> Arg {
        let arg = Arg::new(self.name.clone())
            .long(self.name.clone())
            .help(self.help.clone())
            .global(self.global);
        match &self.kind {
            FlagKind::Switch => arg.action(ArgAction::SetTrue),
            FlagKind::Value { default } => {
                let arg = arg.action(ArgAction::Set).num_args(1);
                match default {
                    Some(default) => arg.default_value(default.clone()),
                    None => arg,
                }
            }
        }
    }
}

/// A positional argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgSpec {
    name: String,
    help: String,
    required: bool,
    variadic: bool,
}

impl ArgSpec {
    /// A mandatory positional argument.
    pub fn required(name: impl Into<String>, help: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            help: help.into(),
            required: true,
            variadic: false,
        }
    }

    /// An optional positional argument.
    pub fn optional(name: impl Into<String>, help: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            help: help.into(),
            required: false,
            variadic: false,
        }
    }

    /// Accepts any number of values. Only valid for the last positional argument.
    pub fn variadic(mut self) -> Self {
        self.variadic = true;
        self
    }

    /// Argument name.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn to_arg(&self) -> Arg {
        let arg = Arg::new(self.name.clone())
            .help(self.help.clone())
            .required(self.required);
        if self.variadic {
            let min = usize::from(self.required);
            arg.action(ArgAction::Append).num_args(min..)
        } else {
            arg.action(ArgAction::Set)
        }
    }
}

/// A node in the command tree.
#[derive(Clone)]
pub struct CommandNode {
    name: String,
    about: String,
    aliases: Vec<String>,
    source: CommandSource,
    requires_app: bool,
    flags: Vec<FlagSpec>,
    args: Vec<ArgSpec>,
    handler: Option<CommandHandler>,
    children: Vec<CommandNode>,
}

impl fmt::Debug for CommandNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandNode")
            .field("name", &self.name)
            .field("source", &self.source)
            .field("requires_app", &self.requires_app)
            .field("runnable", &self.handler.is_some())
            .field("children", &self.children)
            .finish_non_exhaustive()
    }
}

impl CommandNode {
    /// A hand-written command with no body.
    pub fn new(name: impl Into<String>, about: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            about: about.into(),
            aliases: Vec::new(),
            source: CommandSource::BuiltIn,
            requires_app: false,
            flags: Vec::new(),
            args: Vec::new(),
            handler: None,
            children: Vec::new(),
        }
    }

    /// Records where the command comes from.
    pub fn with_source(mut self, source: CommandSource) -> Self {
        self.source = source;
        self
    }

    /// Marks the command as needing the full application graph.
    pub fn requiring_app(mut self) -> Self {
        self.requires_app = true;
        self
    }

    /// Adds an alternative name.
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    /// Adds a flag.
    pub fn flag(mut self, flag: FlagSpec) -> Self {
        self.flags.push(flag);
        self
    }

    /// Adds a positional argument.
    pub fn arg(mut self, arg: ArgSpec) -> Self {
        self.args.push(arg);
        self
    }

    /// Sets the body, making the command runnable.
    pub fn handler(
        mut self,
        handler: impl Fn(&mut Invocation<'_>) -> Result<(), CommandError> + Send + Sync + 'static,
    ) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    /// Adds a child, failing if the name is taken.
    pub fn with_subcommand(mut self, child: CommandNode) -> Result<Self, CommandError> {
        self.add_subcommand(child)?;
        Ok(self)
    }

    /// Adds a child, failing if the name is taken.
    pub fn add_subcommand(&mut self, child: CommandNode) -> Result<(), CommandError> {
        if self.name_taken(&child) {
            return Err(CommandError::DuplicateCommand {
                parent: self.name.clone(),
                name: child.name,
            });
        }
        self.children.push(child);
        Ok(())
    }

    /// Adds a derived child unless a command with that name already exists.
    ///
    /// The existing command always wins. Returns whether the child was added.
    pub fn merge_subcommand(&mut self, child: CommandNode) -> bool {
        if self.name_taken(&child) {
            warn!(
                parent = %self.name,
                command = %child.name,
                source = ?child.source,
                "command already registered, keeping the existing one"
            );
            return false;
        }
        self.children.push(child);
        true
    }

    /// Adds a flag to an existing node, unless one with that name exists.
    pub fn add_flag(&mut self, flag: FlagSpec) -> bool {
        if self.flags.iter().any(|f| f.name == flag.name) {
            return false;
        }
        self.flags.push(flag);
        true
    }

    fn name_taken(&self, child: &CommandNode) -> bool {
        iter::once(&child.name)
            .chain(&child.aliases)
            .any(|name| self.find(name).is_some())
    }

    /// Command name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// One-line description.
    pub fn about(&self) -> &str {
        &self.about
    }

    /// Where the command comes from.
    pub fn source(&self) -> &CommandSource {
        &self.source
    }

    /// Whether the command needs the full application graph.
    pub fn requires_app(&self) -> bool {
        self.requires_app
    }

    /// Whether the command has a body.
    pub fn is_runnable(&self) -> bool {
        self.handler.is_some()
    }

    /// Flags declared on this node.
    pub fn flags(&self) -> &[FlagSpec] {
        &self.flags
    }

    /// Positional arguments declared on this node.
    pub fn args(&self) -> &[ArgSpec] {
        &self.args
    }

    /// Direct children.
    pub fn children(&self) -> &[CommandNode] {
        &self.children
    }

    /// Finds a direct child by name or alias.
    pub fn find(&self, name: &str) -> Option<&CommandNode> {
        self.children
            .iter()
            .find(|c| c.name == name || c.aliases.iter().any(|a| a == name))
    }

    /// Finds a direct child by name or alias.
    pub fn find_mut(&mut self, name: &str) -> Option<&mut CommandNode> {
        self.children
            .iter_mut()
            .find(|c| c.name == name || c.aliases.iter().any(|a| a == name))
    }

    /// Follows `path` down from this node.
    pub fn find_path<S: AsRef<str>>(&self, path: &[S]) -> Option<&CommandNode> {
        path.iter()
            .try_fold(self, |node, name| node.find(name.as_ref()))
    }

    fn to_clap(&self) -> clap::Command {
        let mut cmd = clap::Command::new(self.name.clone()).about(self.about.clone());
        for alias in &self.aliases {
            cmd = cmd.alias(alias.clone());
        }
        for flag in &self.flags {
            cmd = cmd.arg(flag.to_arg());
        }
        for arg in &self.args {
            cmd = cmd.arg(arg.to_arg());
        }
        for child in &self.children {
            cmd = cmd.subcommand(child.to_clap());
        }
        cmd
    }
}

/// State handed to a command body.
pub struct Invocation<'a> {
    path: Vec<String>,
    matches: &'a ArgMatches,
    out: &'a mut dyn Write,
    context: Option<CommandContext>,
}

impl fmt::Debug for Invocation<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invocation")
            .field("path", &self.path)
            .field("has_context", &self.context.is_some())
            .finish_non_exhaustive()
    }
}

impl<'a> Invocation<'a> {
    /// Creates an invocation writing to `out`.
    pub fn new(path: Vec<String>, matches: &'a ArgMatches, out: &'a mut dyn Write) -> Self {
        Self {
            path,
            matches,
            out,
            context: None,
        }
    }

    /// Names of the commands from the root down to the executed one.
    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// Parsed arguments of the executed command, including inherited flags.
    pub fn matches(&self) -> &ArgMatches {
        self.matches
    }

    /// Value of a flag or positional argument.
    pub fn value(&self, name: &str) -> Option<&str> {
        self.matches
            .try_get_one::<String>(name)
            .ok()
            .flatten()
            .map(String::as_str)
    }

    /// All values of a variadic positional argument.
    pub fn values(&self, name: &str) -> Vec<&str> {
        self.matches
            .try_get_many::<String>(name)
            .ok()
            .flatten()
            .map(|vals| vals.map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Whether a switch was set.
    pub fn switch(&self, name: &str) -> bool {
        self.matches
            .try_get_one::<bool>(name)
            .ok()
            .flatten()
            .copied()
            .unwrap_or(false)
    }

    /// Whether a flag was given on the command line rather than defaulted.
    pub fn is_explicit(&self, name: &str) -> bool {
        self.matches
            .try_contains_id(name)
            .unwrap_or(false)
            && self.matches.value_source(name) == Some(clap::parser::ValueSource::CommandLine)
    }

    /// Context left by the pre-execution hook.
    pub fn context<C: Any>(&self) -> Result<&C, CommandError> {
        self.context
            .as_ref()
            .and_then(|ctx| ctx.downcast_ref::<C>())
            .ok_or(CommandError::MissingContext(type_name::<C>()))
    }

    /// Sets the context, replacing any previous one.
    pub fn set_context(&mut self, context: CommandContext) {
        self.context = Some(context);
    }

    /// Writes `text` followed by a newline to the command output.
    pub fn println(&mut self, text: impl fmt::Display) -> io::Result<()> {
        writeln!(self.out, "{text}")
    }
}

/// The root of the command tree plus the process-level hooks.
#[derive(Clone)]
pub struct RootCommand {
    node: CommandNode,
    version: Option<String>,
    pre_run: Option<PreRunHook>,
}

impl fmt::Debug for RootCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RootCommand")
            .field("node", &self.node)
            .field("version", &self.version)
            .field("has_pre_run", &self.pre_run.is_some())
            .finish()
    }
}

impl RootCommand {
    /// Creates an empty root.
    pub fn new(name: impl Into<String>, about: impl Into<String>) -> Self {
        Self {
            node: CommandNode::new(name, about),
            version: None,
            pre_run: None,
        }
    }

    /// The executable name.
    pub fn name(&self) -> &str {
        self.node.name()
    }

    /// Sets the version printed by `--version`.
    pub fn set_version(&mut self, version: impl Into<String>) {
        self.version = Some(version.into());
    }

    /// Installs the pre-execution hook, replacing any previous one.
    pub fn set_pre_run(
        &mut self,
        hook: impl Fn(&Invocation<'_>) -> Result<Option<CommandContext>, CommandError>
            + Send
            + Sync
            + 'static,
    ) {
        self.pre_run = Some(Arc::new(hook));
    }

    /// Whether a pre-execution hook is installed.
    pub fn has_pre_run(&self) -> bool {
        self.pre_run.is_some()
    }

    /// The root node.
    pub fn node(&self) -> &CommandNode {
        &self.node
    }

    /// The root node.
    pub fn node_mut(&mut self) -> &mut CommandNode {
        &mut self.node
    }

    /// Adds a top-level command, failing if the name is taken.
    pub fn add_subcommand(&mut self, child: CommandNode) -> Result<(), CommandError> {
        self.node.add_subcommand(child)
    }

    /// Builds the clap command for the whole tree.
    pub fn to_clap(&self) -> clap::Command {
        let cmd = self.node.to_clap();
        match &self.version {
            Some(version) => cmd.version(version.clone()),
            None => cmd,
        }
    }

    /// Parses `args` (without the executable name) and runs the selected command, writing output
    /// to stdout.
    pub fn execute(&self, args: &[String]) -> Result<(), CommandError> {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        self.execute_with(args, &mut out)
    }

    /// Parses `args` and runs the selected command, writing output to `out`.
    ///
    /// Help and version requests are written to `out` and are not errors. Selecting a command
    /// without a body prints its help.
    pub fn execute_with(&self, args: &[String], out: &mut dyn Write) -> Result<(), CommandError> {
        let mut cmd = self.to_clap();
        let argv = iter::once(self.node.name.clone()).chain(args.iter().cloned());
        let matches = match cmd.try_get_matches_from_mut(argv) {
            Ok(matches) => matches,
            Err(err) => {
                return match err.kind() {
                    ErrorKind::DisplayHelp
                    | ErrorKind::DisplayVersion
                    | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                        write!(out, "{}", err.render())?;
                        Ok(())
                    }
                    _ => Err(CommandError::InvalidInvocation(err.render().to_string())),
                };
            }
        };

        let mut node = &self.node;
        let mut clap_cmd = &mut cmd;
        let mut sub_matches = &matches;
        let mut path = vec![node.name.clone()];
        while let Some((name, next)) = sub_matches.subcommand() {
            let (Some(child), Some(child_cmd)) = (node.find(name), clap_cmd.find_subcommand_mut(name))
            else {
                return Err(CommandError::InvalidInvocation(format!(
                    "unknown command \"{name}\""
                )));
            };
            node = child;
            clap_cmd = child_cmd;
            sub_matches = next;
            path.push(node.name.clone());
        }

        let Some(handler) = node.handler.clone() else {
            write!(out, "{}", clap_cmd.render_help())?;
            return Ok(());
        };

        debug!(command = %path.join(" "), "executing command");
        let mut invocation = Invocation::new(path, sub_matches, out);
        if let Some(hook) = &self.pre_run {
            if let Some(context) = hook(&invocation)? {
                invocation.set_context(context);
            }
        }
        handler(&mut invocation)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn sample_root() -> RootCommand {
        let mut root = RootCommand::new("node", "test node");
        let echo = CommandNode::new("echo", "print the arguments")
            .arg(ArgSpec::required("words", "what to print").variadic())
            .flag(FlagSpec::switch("upper", "print in upper case"))
            .handler(|inv| {
                let text = inv.values("words").join(" ");
                let text = if inv.switch("upper") { text.to_uppercase() } else { text };
                inv.println(text)?;
                Ok(())
            });
        let query = CommandNode::new("query", "query subcommands")
            .alias("q")
            .flag(FlagSpec::value("output", "output format").default_value("text").global())
            .with_subcommand(CommandNode::new("status", "node status").handler(|inv| {
                let output = inv.value("output").unwrap_or_default().to_string();
                inv.println(format!("status as {output}"))?;
                Ok(())
            }))
            .unwrap();
        root.add_subcommand(echo).unwrap();
        root.add_subcommand(query).unwrap();
        root
    }

    fn run(root: &RootCommand, list: &[&str]) -> (Result<(), CommandError>, String) {
        let mut out = Vec::new();
        let res = root.execute_with(&args(list), &mut out);
        (res, String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_runs_leaf_with_args() {
        let root = sample_root();
        let (res, out) = run(&root, &["echo", "--upper", "hi", "there"]);
        res.unwrap();
        assert_eq!(out, "HI THERE\n");
    }

    #[test]
    fn test_inherited_flag_and_alias() {
        let root = sample_root();
        let (res, out) = run(&root, &["q", "status", "--output", "json"]);
        res.unwrap();
        assert_eq!(out, "status as json\n");

        let (res, out) = run(&root, &["query", "status"]);
        res.unwrap();
        assert_eq!(out, "status as text\n");
    }

    #[test]
    fn test_group_without_body_prints_help() {
        let root = sample_root();
        let (res, out) = run(&root, &["query"]);
        res.unwrap();
        assert!(out.contains("status"), "help should list children: {out}");

        let (res, out) = run(&root, &[]);
        res.unwrap();
        assert!(out.contains("echo"));
    }

    #[test]
    fn test_help_flag_is_not_an_error() {
        let root = sample_root();
        let (res, out) = run(&root, &["echo", "--help"]);
        res.unwrap();
        assert!(out.contains("print the arguments"));
    }

    #[test]
    fn test_unknown_command_is_invalid_invocation() {
        let root = sample_root();
        let (res, _) = run(&root, &["frobnicate"]);
        assert!(matches!(res, Err(CommandError::InvalidInvocation(_))));
    }

    #[test]
    fn test_duplicate_child_is_rejected() {
        let mut root = sample_root();
        let err = root
            .add_subcommand(CommandNode::new("echo", "again"))
            .unwrap_err();
        assert!(matches!(err, CommandError::DuplicateCommand { .. }));

        let err = root
            .add_subcommand(CommandNode::new("q", "clashes with an alias"))
            .unwrap_err();
        assert!(matches!(err, CommandError::DuplicateCommand { .. }));
    }

    #[test]
    fn test_merge_keeps_existing_command() {
        let mut root = sample_root();
        let derived = CommandNode::new("echo", "derived")
            .with_source(CommandSource::Module("bank".to_string()));
        assert!(!root.node_mut().merge_subcommand(derived));
        assert_eq!(root.node().find("echo").unwrap().about(), "print the arguments");
        assert_eq!(root.node().find("echo").unwrap().source(), &CommandSource::BuiltIn);
    }

    #[test]
    fn test_pre_run_runs_once_before_body() {
        let mut root = sample_root();
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        root.set_pre_run(move |inv| {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(Some(Box::new(format!("ctx for {}", inv.path().join(" "))) as CommandContext))
        });
        root.node_mut()
            .add_subcommand(CommandNode::new("ctx", "print context").handler(|inv| {
                let ctx = inv.context::<String>()?.clone();
                inv.println(ctx)?;
                Ok(())
            }))
            .unwrap();

        let (res, out) = run(&root, &["ctx"]);
        res.unwrap();
        assert_eq!(out, "ctx for node ctx\n");
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // help output never reaches the hook
        let (res, _) = run(&root, &["query"]);
        res.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failing_pre_run_aborts() {
        let mut root = sample_root();
        root.set_pre_run(|_| Err(CommandError::failed("no context")));
        let (res, out) = run(&root, &["echo", "hi"]);
        assert!(matches!(res, Err(CommandError::Failed(msg)) if msg == "no context"));
        assert!(out.is_empty());
    }

    #[test]
    fn test_find_path() {
        let root = sample_root();
        assert!(root.node().find_path(&["q", "status"]).is_some());
        assert!(root.node().find_path(&["query", "missing"]).is_none());
        assert!(root.node().find_path::<&str>(&[]).is_some());
    }
}
