use crate::error::Result;
use crate::keys::Keys;
use crate::target::{Target, TargetUpdate};
use crate::transport::{HttpTransport, SchemeTransport, WsTransport};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Deserialize;
use staticagent_common::base58;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// CLI interface for the static agent.
#[derive(Parser)]
#[command(name = "staticagent", about = "Static agent messaging tool")]
#[command(version)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Path to a custom configuration file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Endpoint override.
    #[arg(long, global = true)]
    pub endpoint: Option<String>,

    /// Path of the 32-byte key seed file.
    #[arg(long, global = true)]
    pub key_file: Option<PathBuf>,

    /// Increase log verbosity (repeat for more detail).
    #[arg(short = 'v', long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Write logs to a file instead of stderr
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,
}

/// Available subcommands.
#[derive(Subcommand)]
pub enum Commands {
    /// Generate a new keypair and print it.
    Keygen,
    /// Print the local DID and verkey.
    Identity,
    /// Send a JSON message to the configured target.
    Send {
        /// Message as JSON; must contain `@type`.
        message: String,
        /// Send without encryption.
        #[arg(long, conflicts_with = "anoncrypt")]
        plaintext: bool,
        /// Encrypt without revealing the sender.
        #[arg(long)]
        anoncrypt: bool,
        /// Ask the receiver to reply over the same exchange.
        #[arg(long, value_enum)]
        return_route: Option<ReturnRouteArg>,
        /// Wait for a reply threaded to the sent message and print it.
        #[arg(long)]
        await_reply: bool,
    },
}

/// `--return-route` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReturnRouteArg {
    /// No return route.
    None,
    /// Return everything.
    All,
    /// Return replies in the sent message's thread.
    Thread,
}

/// Runtime configuration loaded from file, env, and defaults.
#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    /// Endpoint of the other agent (`http(s)://` or `ws(s)://`).
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Single recipient verkey, base58.
    #[serde(default)]
    pub their_vk: Option<String>,
    /// Recipient verkeys, base58.
    #[serde(default)]
    pub recipients: Vec<String>,
    /// Mediator verkeys, base58, innermost first.
    #[serde(default)]
    pub routing_keys: Vec<String>,
    /// Own verkey, base58.
    #[serde(default)]
    pub my_verkey: Option<String>,
    /// Own secret key, base58 (32-byte seed or 64-byte secret).
    #[serde(default)]
    pub my_sigkey: Option<String>,
    /// Outbound HTTP settings.
    pub http: HttpConfig,
    /// Default time to wait for replies, in milliseconds.
    pub reply_timeout_ms: u64,
}

/// Outbound HTTP settings.
#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    /// Request timeout in milliseconds.
    pub timeout_ms: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { timeout_ms: 10_000 }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            their_vk: None,
            recipients: Vec::new(),
            routing_keys: Vec::new(),
            my_verkey: None,
            my_sigkey: None,
            http: HttpConfig::default(),
            reply_timeout_ms: 5_000,
        }
    }
}

fn check_key(field: &str, value: &str) -> std::result::Result<(), String> {
    base58::decode_key(value)
        .map(|_| ())
        .map_err(|e| format!("{field} is not a valid verkey: {e}"))
}

impl AgentConfig {
    /// Validates the configuration values are within acceptable bounds.
    /// Returns Ok(()) if valid, Err with description otherwise.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if let Some(endpoint) = &self.endpoint {
            let scheme_ok = ["http://", "https://", "ws://", "wss://"]
                .iter()
                .any(|s| endpoint.starts_with(s));
            if !scheme_ok {
                return Err(format!(
                    "endpoint must start with http://, https://, ws:// or wss://, got: {endpoint}"
                ));
            }
        }

        if self.their_vk.is_some() && !self.recipients.is_empty() {
            return Err("their_vk and recipients are mutually exclusive".to_string());
        }
        if let Some(vk) = &self.their_vk {
            check_key("their_vk", vk)?;
        }
        for vk in &self.recipients {
            check_key("recipients", vk)?;
        }
        for vk in &self.routing_keys {
            check_key("routing_keys", vk)?;
        }

        match (&self.my_verkey, &self.my_sigkey) {
            (Some(vk), Some(sk)) => {
                Keys::from_b58(vk, sk).map_err(|e| format!("my_verkey/my_sigkey: {e}"))?;
            }
            (None, None) => {}
            _ => return Err("my_verkey and my_sigkey must be set together".to_string()),
        }

        if self.http.timeout_ms == 0 {
            return Err("http.timeout_ms must be greater than 0".to_string());
        }
        if self.reply_timeout_ms == 0 {
            return Err("reply_timeout_ms must be greater than 0".to_string());
        }

        Ok(())
    }

    /// Own keys, if given inline.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidKey`](crate::Error::InvalidKey) if the keys
    /// are malformed or do not match.
    pub fn keys(&self) -> Result<Option<Keys>> {
        match (&self.my_verkey, &self.my_sigkey) {
            (Some(vk), Some(sk)) => Ok(Some(Keys::from_b58(vk, sk)?)),
            _ => Ok(None),
        }
    }

    /// Target described by this configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidKey`](crate::Error::InvalidKey) for bad keys
    /// and [`Error::MutuallyExclusive`](crate::Error::MutuallyExclusive) if
    /// both `their_vk` and `recipients` are set.
    pub fn target(&self) -> Result<Target> {
        let mut parts = TargetUpdate {
            endpoint: self.endpoint.clone(),
            ..TargetUpdate::default()
        };
        if let Some(vk) = &self.their_vk {
            parts = parts.their_vk_b58(vk)?;
        }
        if !self.recipients.is_empty() {
            let recipients = self
                .recipients
                .iter()
                .map(|vk| base58::decode_key(vk))
                .collect::<std::result::Result<Vec<_>, _>>()?;
            parts = parts.recipients(recipients);
        }
        if !self.routing_keys.is_empty() {
            let routing_keys = self
                .routing_keys
                .iter()
                .map(|vk| base58::decode_key(vk))
                .collect::<std::result::Result<Vec<_>, _>>()?;
            parts = parts.routing_keys(routing_keys);
        }
        Target::build(parts)
    }

    /// HTTP/websocket transport using the configured timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`](crate::Error::Transport) if the HTTP
    /// client cannot be built.
    pub fn transport(&self) -> Result<SchemeTransport> {
        Ok(SchemeTransport::new(
            HttpTransport::with_timeout(Duration::from_millis(self.http.timeout_ms))?,
            WsTransport::new(self.reply_timeout()),
        ))
    }

    /// Default reply timeout.
    #[must_use]
    pub fn reply_timeout(&self) -> Duration {
        Duration::from_millis(self.reply_timeout_ms)
    }
}

/// Default location of the key seed file.
#[must_use]
pub fn default_key_path() -> PathBuf {
    dirs::data_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("staticagent")
        .join("agent_key")
}

/// # Errors
///
/// Returns an error if the configuration file cannot be read or parsed.
#[allow(clippy::cast_possible_wrap)]
pub fn load_config(path: Option<&Path>) -> anyhow::Result<AgentConfig> {
    let defaults = AgentConfig::default();
    let mut builder = config::Config::builder()
        .set_default("recipients", Vec::<String>::new())?
        .set_default("routing_keys", Vec::<String>::new())?
        .set_default("http.timeout_ms", defaults.http.timeout_ms as i64)?
        .set_default("reply_timeout_ms", defaults.reply_timeout_ms as i64)?;

    if let Some(config_path) = path {
        if config_path.exists() {
            builder = builder.add_source(config::File::from(config_path));
        }
    } else {
        let native_path = dirs::config_dir().map(|d| d.join("staticagent").join("config.toml"));
        let xdg_path = dirs::home_dir().map(|d| {
            d.join(".config")
                .join("staticagent")
                .join("config.toml")
        });

        let resolved = native_path
            .filter(|p| p.exists())
            .or_else(|| xdg_path.filter(|p| p.exists()));

        if let Some(config_path) = resolved {
            builder = builder.add_source(config::File::from(config_path));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("STATICAGENT")
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("recipients")
            .with_list_parse_key("routing_keys")
            .try_parsing(true),
    );

    let settings = builder.build()?;
    let config: AgentConfig = settings.try_deserialize()?;

    Ok(config)
}
