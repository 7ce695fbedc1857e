//! Flags shared by the client command groups.

use notsim_server::{CommandNode, FlagSpec};

/// Output format flag.
pub const FLAG_OUTPUT: &str = "output";

/// Node address flag.
pub const FLAG_NODE: &str = "node";

/// Chain id flag.
pub const FLAG_CHAIN_ID: &str = "chain-id";

/// Signing key flag.
pub const FLAG_FROM: &str = "from";

/// Keyring backend flag.
pub const FLAG_KEYRING_BACKEND: &str = "keyring-backend";

/// Broadcast mode flag.
pub const FLAG_BROADCAST_MODE: &str = "broadcast-mode";

/// Flags inherited by every command of a client group. Derived commands may not redeclare them.
pub const RESERVED_FLAGS: [&str; 6] = [
    FLAG_OUTPUT,
    FLAG_NODE,
    FLAG_CHAIN_ID,
    FLAG_FROM,
    FLAG_KEYRING_BACKEND,
    FLAG_BROADCAST_MODE,
];

fn output_flag() -> FlagSpec {
    FlagSpec::value(FLAG_OUTPUT, "output format (text|json)")
        .config_key("client.output")
        .global()
}

fn node_flag() -> FlagSpec {
    FlagSpec::value(FLAG_NODE, "<host>:<port> of the node's json-rpc endpoint")
        .config_key("client.node")
        .global()
}

fn keyring_backend_flag() -> FlagSpec {
    FlagSpec::value(FLAG_KEYRING_BACKEND, "keyring backend (os|file|test|memory)")
        .config_key("client.keyring-backend")
        .global()
}

/// The `query` parent.
pub fn query_command() -> CommandNode {
    CommandNode::new("query", "Querying subcommands")
        .alias("q")
        .flag(output_flag())
        .flag(node_flag())
}

/// The `tx` parent.
pub fn tx_command() -> CommandNode {
    CommandNode::new("tx", "Transactions subcommands")
        .flag(output_flag())
        .flag(node_flag())
        .flag(
            FlagSpec::value(FLAG_CHAIN_ID, "the network chain id")
                .config_key("client.chain-id")
                .global(),
        )
        .flag(FlagSpec::value(FLAG_FROM, "name of the signing key").global())
        .flag(keyring_backend_flag())
        .flag(
            FlagSpec::value(FLAG_BROADCAST_MODE, "transaction broadcasting mode (sync|async)")
                .config_key("client.broadcast-mode")
                .global(),
        )
}

/// The `keys` parent.
pub fn keys_command() -> CommandNode {
    CommandNode::new("keys", "Manage the keyring")
        .flag(output_flag())
        .flag(keyring_backend_flag())
}

/// Whether a derived command may declare a flag named `name`.
pub fn is_reserved(name: &str) -> bool {
    RESERVED_FLAGS.contains(&name)
}
