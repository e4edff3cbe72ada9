//! Native bot module loaded by the plugin tests: `!echo <text>` answers with
//! the configured prefix followed by the text.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use slirc_bot::bot::{BotModule, ClientHandle};
use slirc_bot::ConfigError;

#[derive(Default)]
struct EchoModule {
    prefix: Arc<Mutex<String>>,
}

impl BotModule for EchoModule {
    fn attach(&self, client: ClientHandle) {
        let prefix = Arc::clone(&self.prefix);
        let sender = client.clone();
        let _ = client.register_bot_command("!echo", move |_, parameters, message| {
            let text = format!("{}{parameters}", prefix.lock());
            if let Some(reply) = message.reply(text) {
                sender.send_message(&reply);
            }
        });
    }

    fn set_config(&self, config: &Value) -> Result<(), ConfigError> {
        match config.get("prefix") {
            Some(Value::String(prefix)) => *self.prefix.lock() = prefix.clone(),
            Some(_) => return Err(ConfigError::invalid("prefix", "must be a string")),
            None => {}
        }
        Ok(())
    }
}

slirc_bot::export_plugin!(
    slirc_bot::bot::BotModule,
    "echo",
    "Repeats its parameters",
    EchoModule::default()
);
