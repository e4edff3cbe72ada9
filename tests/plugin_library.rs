//! Native plugins loaded from shared libraries. The libraries are built from
//! the crates under `tests/fixtures` on first use.

mod common;

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Arc, OnceLock};

use common::MockConnection;
use serde_json::json;
use slirc_bot::bot::{BotClient, BotModule};
use slirc_bot::chat::{self, ChatMessage};
use slirc_bot::error::PluginError;
use slirc_bot::plugin::abi::{ABI_KIND_NATIVE, NATIVE_ABI_VERSION};
use slirc_bot::plugin::{ComponentKind, PluginLoader};
use slirc_bot::protocol::{IrcProtocol, Protocol};

fn plugin_dir() -> &'static Path {
    static DIR: OnceLock<PathBuf> = OnceLock::new();
    DIR.get_or_init(|| {
        let target = Path::new(env!("CARGO_TARGET_TMPDIR")).join("plugins");
        let mut build = Command::new(env!("CARGO"));
        build
            .args(["build", "--quiet", "--manifest-path"])
            .arg(Path::new(env!("CARGO_MANIFEST_DIR")).join("Cargo.toml"))
            .args(["-p", "slircbot-botmodule-echo", "-p", "slircbot-botmodule-future"])
            .arg("--target-dir")
            .arg(&target);
        let profile = if cfg!(debug_assertions) {
            "debug"
        } else {
            build.arg("--release");
            "release"
        };
        let status = build.status().expect("cargo should run");
        assert!(status.success(), "building the plugin fixtures failed");
        target.join(profile)
    })
}

fn network(client: &mut BotClient) -> Arc<MockConnection> {
    let connection = MockConnection::new();
    let protocol = IrcProtocol::new();
    protocol.set_config(&json!({ "nickname": "bot" })).unwrap();
    client.add_network("test", connection.clone(), Arc::new(protocol));
    connection
}

fn channel_message(text: &str) -> ChatMessage {
    ChatMessage::to("#rust", text)
        .with(chat::TARGET_TYPE, chat::TARGET_CHANNEL)
        .with(chat::NETWORK, "test")
}

#[test]
fn test_library_path_matches_fixture() {
    let loader = PluginLoader::new(plugin_dir());
    let path = loader.library_path(ComponentKind::BotModule, "echo");
    assert!(path.is_file(), "missing {}", path.display());
}

#[tokio::test]
async fn test_native_module_from_library() {
    let loader = PluginLoader::new(plugin_dir());
    let mut client = BotClient::new();
    let connection = network(&mut client);
    assert_eq!(client.run().await, 1);
    connection.clear();

    let module: Arc<dyn BotModule> = Arc::new(loader.resolve_bot_module("echo").unwrap());
    assert!(loader.is_loaded("echo"));
    assert_eq!(loader.refcount("echo"), Some(1));

    client.add_module("echo", module.clone());
    module.set_config(&json!({ "prefix": "> " })).unwrap();
    assert!(module.set_config(&json!({ "prefix": 7 })).is_err());

    client.on_message(&channel_message("!echo hello there"));
    assert_eq!(connection.lines(), vec!["PRIVMSG #rust :> hello there"]);

    // Commands registered by the module are released with the client.
    drop(module);
    drop(client);
    assert_eq!(loader.refcount("echo"), Some(0));
    assert!(loader.is_loaded("echo"));
}

#[test]
fn test_library_is_shared_between_instances() {
    let loader = PluginLoader::new(plugin_dir());
    let first = loader.resolve_bot_module("echo").unwrap();
    let second = loader.resolve_bot_module("echo").unwrap();
    assert_eq!(loader.refcount("echo"), Some(2));

    drop(first);
    assert_eq!(loader.refcount("echo"), Some(1));
    drop(second);
    assert_eq!(loader.refcount("echo"), Some(0));
    assert!(loader.is_loaded("echo"));

    let again = loader.resolve_bot_module("echo").unwrap();
    assert_eq!(loader.refcount("echo"), Some(1));
    drop(again);
}

#[test]
fn test_library_loaded_for_other_kind_is_refused() {
    let loader = PluginLoader::new(plugin_dir());
    let _module = loader.resolve_bot_module("echo").unwrap();
    let err = loader.resolve_connection("echo").unwrap_err();
    assert!(matches!(
        err,
        PluginError::KindMismatch {
            expected: "connection",
            actual: "bot module",
            ..
        }
    ));
}

#[test]
fn test_newer_interface_revision_is_refused() {
    let loader = PluginLoader::new(plugin_dir());
    match loader.resolve_bot_module("future") {
        Err(PluginError::UnsupportedAbi {
            name,
            kind,
            version,
        }) => {
            assert_eq!(name, "future");
            assert_eq!(kind, ABI_KIND_NATIVE);
            assert_eq!(version, NATIVE_ABI_VERSION + 1);
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("plugin with an unknown interface was accepted"),
    }
    assert!(loader.refcount("future").is_none());
    assert!(!loader.is_loaded("future"));
}
