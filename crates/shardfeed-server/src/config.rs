//! Feed server configuration.
//!
//! Settings are resolved once at startup, in increasing precedence: built-in
//! defaults, the optional TOML settings file, then command-line flags. The
//! resulting [`FeedConfig`] is immutable for the life of the process.

use std::path::{Path, PathBuf};

use clap::Parser;
use serde::Deserialize;

use shardfeed_core::{ShardPolicy, SourceSet};

use crate::error::Error;

/// Default address to bind to.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default port for the subscriber endpoint.
pub const DEFAULT_PORT: u16 = 9400;

/// WebSocket path subscribers connect to.
pub const WS_PATH: &str = "/ws";

/// Default per-subscriber outbound queue depth.
pub const DEFAULT_SEND_BUFFER: usize = 256;

/// Change feed configuration.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// Address to bind to.
    pub host: String,

    /// Port for the subscriber endpoint.
    pub port: u16,

    /// Attach capture to primary shard copies only.
    pub primary_shard_only: bool,

    /// Filter rules, one `index/type/id` string each.
    pub listen_source: Vec<String>,

    /// Messages buffered per subscriber before sends start failing.
    pub send_buffer: usize,
}

impl FeedConfig {
    pub fn new() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            primary_shard_only: true,
            listen_source: vec![shardfeed_core::source::MATCH_ALL.to_string()],
            send_buffer: DEFAULT_SEND_BUFFER,
        }
    }

    /// Load a TOML settings file on top of the defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read settings file {}: {}", path.display(), e))
        })?;
        let settings: SettingsFile = toml::from_str(&text).map_err(|e| {
            Error::Config(format!("invalid settings file {}: {}", path.display(), e))
        })?;
        Ok(Self::new().merge(settings.changes))
    }

    /// Set the bind host.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the subscriber port. `0` picks a free port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the primary-only shard policy.
    pub fn with_primary_shard_only(mut self, primary_only: bool) -> Self {
        self.primary_shard_only = primary_only;
        self
    }

    /// Replace the filter rules.
    pub fn with_listen_source<I, S>(mut self, rules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.listen_source = rules.into_iter().map(Into::into).collect();
        self
    }

    /// Set the per-subscriber queue depth.
    pub fn with_send_buffer(mut self, size: usize) -> Self {
        self.send_buffer = size.max(1);
        self
    }

    fn merge(mut self, settings: ChangeSettings) -> Self {
        if let Some(host) = settings.host {
            self = self.with_host(host);
        }
        if let Some(port) = settings.port {
            self = self.with_port(port);
        }
        if let Some(primary_only) = settings.primary_shard_only {
            self = self.with_primary_shard_only(primary_only);
        }
        if let Some(rules) = settings.listen_source {
            self = self.with_listen_source(rules);
        }
        if let Some(size) = settings.send_buffer {
            self = self.with_send_buffer(size);
        }
        self
    }

    /// Address string for the listener.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn shard_policy(&self) -> ShardPolicy {
        ShardPolicy::from_primary_only(self.primary_shard_only)
    }

    /// Parse the filter rules.
    pub fn source_set(&self) -> Result<SourceSet, Error> {
        if self.listen_source.is_empty() {
            return Err(Error::Config("listenSource must contain at least one rule".into()));
        }
        SourceSet::parse(&self.listen_source).map_err(|e| Error::Config(e.to_string()))
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Settings file layout.
///
/// ```toml
/// [changes]
/// primaryShardOnly = true
/// port = 9400
/// listenSource = ["wallet/tx", "market"]
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SettingsFile {
    pub changes: ChangeSettings,
}

/// The `[changes]` table.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct ChangeSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub primary_shard_only: Option<bool>,
    pub listen_source: Option<Vec<String>>,
    pub send_buffer: Option<usize>,
}

/// Command-line arguments for the server.
#[derive(Parser, Debug)]
#[command(name = "shardfeed-server")]
#[command(version, about = "Live document change feed over WebSocket", long_about = None)]
pub struct Args {
    /// TOML settings file with a [changes] table.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to bind to.
    #[arg(long)]
    pub host: Option<String>,

    /// Port for the subscriber endpoint.
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Attach capture to primary shards only (true/false).
    #[arg(long, value_name = "BOOL")]
    pub primary_shard_only: Option<bool>,

    /// Filter rule `index/type/id`; repeat for more rules.
    #[arg(long = "listen-source", value_name = "RULE")]
    pub listen_source: Vec<String>,

    /// Messages buffered per subscriber.
    #[arg(long)]
    pub send_buffer: Option<usize>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Args {
    /// Resolve defaults, the settings file, and flags into a configuration.
    pub fn into_config(self) -> Result<FeedConfig, Error> {
        let config = match &self.config {
            Some(path) => FeedConfig::from_file(path)?,
            None => FeedConfig::new(),
        };

        let flags = ChangeSettings {
            host: self.host,
            port: self.port,
            primary_shard_only: self.primary_shard_only,
            listen_source: if self.listen_source.is_empty() {
                None
            } else {
                Some(self.listen_source)
            },
            send_buffer: self.send_buffer,
        };

        let config = config.merge(flags);
        config.source_set()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = FeedConfig::default();
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.host, DEFAULT_HOST);
        assert!(config.primary_shard_only);
        assert_eq!(config.listen_source, vec!["*".to_string()]);
        assert_eq!(config.shard_policy(), ShardPolicy::PrimaryOnly);
        assert_eq!(config.source_set().unwrap().len(), 1);
    }

    #[test]
    fn test_config_builder() {
        let config = FeedConfig::new()
            .with_host("0.0.0.0")
            .with_port(9500)
            .with_primary_shard_only(false)
            .with_listen_source(["wallet/tx", "market"])
            .with_send_buffer(0);

        assert_eq!(config.listen_addr(), "0.0.0.0:9500");
        assert_eq!(config.shard_policy(), ShardPolicy::AllShards);
        assert_eq!(config.source_set().unwrap().len(), 2);
        assert_eq!(config.send_buffer, 1);
    }

    #[test]
    fn test_invalid_rules_rejected() {
        let config = FeedConfig::new().with_listen_source(["wallet//x"]);
        assert!(matches!(config.source_set(), Err(Error::Config(_))));

        let empty = FeedConfig::new().with_listen_source(Vec::<String>::new());
        assert!(matches!(empty.source_set(), Err(Error::Config(_))));
    }

    #[test]
    fn test_settings_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[changes]\nprimaryShardOnly = false\nport = 9555\nlistenSource = [\"wallet/tx\"]"
        )
        .unwrap();

        let config = FeedConfig::from_file(file.path()).unwrap();
        assert!(!config.primary_shard_only);
        assert_eq!(config.port, 9555);
        assert_eq!(config.listen_source, vec!["wallet/tx".to_string()]);
        assert_eq!(config.host, DEFAULT_HOST);
    }

    #[test]
    fn test_settings_file_unknown_key() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[changes]\nprimaryShardsOnly = false").unwrap();
        assert!(matches!(
            FeedConfig::from_file(file.path()),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_flags_override_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[changes]\nport = 9555\nlistenSource = [\"wallet\"]").unwrap();

        let args = Args::parse_from([
            "shardfeed-server",
            "--config",
            file.path().to_str().unwrap(),
            "--port",
            "9600",
            "--primary-shard-only",
            "false",
        ]);
        let config = args.into_config().unwrap();
        assert_eq!(config.port, 9600);
        assert!(!config.primary_shard_only);
        assert_eq!(config.listen_source, vec!["wallet".to_string()]);
    }

    #[test]
    fn test_repeated_listen_source_flag() {
        let args = Args::parse_from([
            "shardfeed-server",
            "--listen-source",
            "wallet/tx",
            "--listen-source",
            "market",
        ]);
        let config = args.into_config().unwrap();
        assert_eq!(config.listen_source.len(), 2);
        assert_eq!(config.port, DEFAULT_PORT);
    }
}
