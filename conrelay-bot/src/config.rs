//! Persistent configuration for conrelay-bot.
//!
//! Config file lives at `~/.config/conrelay/relay.toml`. Every field is
//! optional; CLI flags override file values, and anything left unset falls
//! back to the session defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use conrelay_sdk::SessionConfig;
use conrelay_sdk::config::DEFAULT_PORT;
use serde::{Deserialize, Serialize};

/// User configuration (persisted in relay.toml).
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RelayConfig {
    /// Console host name or IP.
    pub host: Option<String>,
    /// Console port. Default: 8081
    pub port: Option<u16>,
    /// Console password. Prefer `CONRELAY_PASSWORD` over storing it here.
    pub password: Option<String>,
    pub connect_timeout_ms: Option<u64>,
    /// Minimum spacing between commands written to the console.
    pub min_command_interval_ms: Option<u64>,
    pub command_timeout_ms: Option<u64>,
    pub reconnect_delay_ms: Option<u64>,
    /// Reconnect after the console drops. Default: true
    pub auto_reconnect: Option<bool>,
}

/// Values given on the command line; these win over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub password: Option<String>,
    pub no_reconnect: bool,
}

fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("conrelay")
}

pub fn default_path() -> PathBuf {
    config_dir().join("relay.toml")
}

impl RelayConfig {
    /// Load `path`, or the default location when `None`.
    ///
    /// A missing default file yields an empty config. An explicit path that
    /// cannot be read, or any file that fails to parse, is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (default_path(), false),
        };
        if !explicit && !path.exists() {
            tracing::debug!(path = %path.display(), "No config file; using defaults");
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("can't read config file {}", path.display()))?;
        let config = Self::parse(&text)
            .with_context(|| format!("bad config file {}", path.display()))?;
        tracing::debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Merge: CLI overrides > config file > defaults, then validate.
    pub fn resolve(&self, cli: &Overrides) -> Result<SessionConfig> {
        let defaults = SessionConfig::default();
        let ms = |v: Option<u64>, fallback: Duration| v.map(Duration::from_millis).unwrap_or(fallback);

        let host = cli
            .host
            .clone()
            .or_else(|| self.host.clone())
            .context("no console host configured (set `host` in the config file or pass --host)")?;
        let password = cli
            .password
            .clone()
            .or_else(|| self.password.clone())
            .context("no console password configured (set CONRELAY_PASSWORD or pass --password)")?;

        let config = SessionConfig {
            host,
            port: cli.port.or(self.port).unwrap_or(DEFAULT_PORT),
            password,
            connect_timeout: ms(self.connect_timeout_ms, defaults.connect_timeout),
            min_command_interval: ms(self.min_command_interval_ms, defaults.min_command_interval),
            default_command_timeout: ms(self.command_timeout_ms, defaults.default_command_timeout),
            reconnect_delay: ms(self.reconnect_delay_ms, defaults.reconnect_delay),
            auto_reconnect: !cli.no_reconnect && self.auto_reconnect.unwrap_or(defaults.auto_reconnect),
            reply_settle: defaults.reply_settle,
        };
        config.validate().context("invalid console settings")?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_login() -> RelayConfig {
        RelayConfig {
            host: Some("game.local".to_string()),
            password: Some("hunter2".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn parse_full_file() {
        let config = RelayConfig::parse(
            r#"
            host = "10.0.0.5"
            port = 8082
            password = "secret"
            connect_timeout_ms = 3000
            min_command_interval_ms = 500
            command_timeout_ms = 8000
            reconnect_delay_ms = 10000
            auto_reconnect = false
            "#,
        )
        .unwrap();
        assert_eq!(config.host.as_deref(), Some("10.0.0.5"));
        assert_eq!(config.port, Some(8082));
        assert_eq!(config.auto_reconnect, Some(false));

        let session = config.resolve(&Overrides::default()).unwrap();
        assert_eq!(session.addr(), "10.0.0.5:8082");
        assert_eq!(session.connect_timeout, Duration::from_secs(3));
        assert_eq!(session.min_command_interval, Duration::from_millis(500));
        assert_eq!(session.default_command_timeout, Duration::from_secs(8));
        assert_eq!(session.reconnect_delay, Duration::from_secs(10));
        assert!(!session.auto_reconnect);
    }

    #[test]
    fn empty_file_is_all_defaults() {
        assert_eq!(RelayConfig::parse("").unwrap(), RelayConfig::default());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(RelayConfig::parse("hots = \"typo\"").is_err());
    }

    #[test]
    fn defaults_fill_unset_fields() {
        let session = with_login().resolve(&Overrides::default()).unwrap();
        assert_eq!(session.port, DEFAULT_PORT);
        assert_eq!(session.min_command_interval, Duration::from_millis(350));
        assert_eq!(session.default_command_timeout, Duration::from_millis(5000));
        assert_eq!(session.reconnect_delay, Duration::from_secs(5));
        assert!(session.auto_reconnect);
    }

    #[test]
    fn cli_overrides_file() {
        let cli = Overrides {
            host: Some("override.local".to_string()),
            port: Some(9000),
            password: Some("from-env".to_string()),
            no_reconnect: true,
        };
        let session = with_login().resolve(&cli).unwrap();
        assert_eq!(session.host, "override.local");
        assert_eq!(session.port, 9000);
        assert_eq!(session.password, "from-env");
        assert!(!session.auto_reconnect);
    }

    #[test]
    fn missing_host_or_password_is_an_error() {
        let no_host = RelayConfig {
            host: None,
            ..with_login()
        };
        assert!(no_host.resolve(&Overrides::default()).is_err());

        let no_password = RelayConfig {
            password: None,
            ..with_login()
        };
        assert!(no_password.resolve(&Overrides::default()).is_err());
    }

    #[test]
    fn invalid_values_fail_validation() {
        let config = RelayConfig {
            port: Some(0),
            ..with_login()
        };
        let err = config.resolve(&Overrides::default()).unwrap_err();
        assert!(format!("{err:#}").contains("port must be non-zero"));
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let path = std::env::temp_dir().join("conrelay-no-such-dir/relay.toml");
        assert!(RelayConfig::load(Some(&path)).is_err());
    }

    #[test]
    fn explicit_file_is_loaded() {
        let path = std::env::temp_dir().join(format!("conrelay-test-{}.toml", std::process::id()));
        std::fs::write(&path, "host = \"game.local\"\npassword = \"pw\"\n").unwrap();
        let config = RelayConfig::load(Some(&path));
        let _ = std::fs::remove_file(&path);
        assert_eq!(config.unwrap().host.as_deref(), Some("game.local"));
    }
}
