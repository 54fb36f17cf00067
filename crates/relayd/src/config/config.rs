use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;

use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::filter::Targets;

use super::diagnostics::{format_diagnostics, Diagnostic, Error, LoadError, ValidationError};
use super::partial::PartialConfig;

pub const DEFAULT_LISTEN: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 10000;
pub const DEFAULT_STATIC_DIR: &str = "public";
pub const DEFAULT_STORAGE_URL: &str = "sqlite://relayd.sqlite?mode=rwc";

/// Environment variables read by [`Config::apply_env`]
pub const ENV_STORAGE_URL: &str = "DATABASE_URL";
/// Older deployments set the connection string here
pub const ENV_STORAGE_URL_FALLBACK: &str = "MONGO_URI";
pub const ENV_PORT: &str = "PORT";
pub const ENV_LISTEN: &str = "RELAYD_LISTEN";
pub const ENV_STATIC_DIR: &str = "RELAYD_STATIC_DIR";
pub const ENV_SERIAL_DEVICE: &str = "RELAYD_SERIAL_DEVICE";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(transparent)]
    Load(#[from] LoadError),

    /// Formatted diagnostics for every error found
    #[error("{0}")]
    Invalid(String),
}

#[derive(Debug, Default)]
pub struct Config {
    pub logging: LoggingConfig,
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub serial: SerialConfig,
}

// LogLevel needs Deserialize because it's used in PartialLoggingConfig with toml::Spanned
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

#[derive(Debug, Default)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: LogLevel,

    /// Per-target levels, e.g. `"relayd::api" = "debug"`
    pub overrides: HashMap<String, LogLevel>,
}

impl LoggingConfig {
    /// Build a per-target filter for the tracing subscriber
    pub fn targets(&self) -> Targets {
        Targets::new()
            .with_default(LevelFilter::from(self.level))
            .with_targets(
                self.overrides
                    .iter()
                    .map(|(target, level)| (target.clone(), LevelFilter::from(*level))),
            )
    }
}

#[derive(Debug)]
pub struct ServerConfig {
    /// Address or hostname to bind
    pub listen: String,

    pub port: u16,

    /// Directory served for paths no route matches
    pub static_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: DEFAULT_LISTEN.to_string(),
            port: DEFAULT_PORT,
            static_dir: Some(PathBuf::from(DEFAULT_STATIC_DIR)),
        }
    }
}

#[derive(Debug)]
pub struct StorageConfig {
    /// `memory://`, `sqlite://...` or `postgres://...`
    pub url: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_STORAGE_URL.to_string(),
        }
    }
}

#[derive(Debug, Default)]
pub struct SerialConfig {
    /// Serial device receiving `'1'`/`'0'`; the bridge is off when unset
    pub device: Option<PathBuf>,
}

impl Config {
    /// Load configuration from multiple TOML files with import resolution
    ///
    /// Supports multiple config files, `imports` within files, conflict
    /// detection across all sources and validation, with all errors and
    /// warnings reported together.
    ///
    /// Returns Ok((Config, diagnostics)) where diagnostics contains only warnings.
    pub fn from_files(paths: &[PathBuf]) -> Result<(Self, Vec<Diagnostic>), ConfigError> {
        let configs = PartialConfig::load_with_imports(paths)?;
        let (partial, diagnostics) = PartialConfig::merge(configs);
        Self::from_partial(partial, diagnostics)
    }

    /// Convert a PartialConfig to a Config, validating all fields
    ///
    /// Unset fields take their defaults. Takes diagnostics from the merge step
    /// and adds validation diagnostics.
    pub fn from_partial(
        partial: PartialConfig,
        mut diagnostics: Vec<Diagnostic>,
    ) -> Result<(Self, Vec<Diagnostic>), ConfigError> {
        let logging = partial
            .logging
            .map(|logging| LoggingConfig {
                level: logging.level.map(|s| *s.get_ref()).unwrap_or_default(),
                overrides: logging
                    .overrides
                    .map(|hm| hm.into_iter().map(|(k, v)| (k, *v.get_ref())).collect())
                    .unwrap_or_default(),
            })
            .unwrap_or_default();

        let mut server = ServerConfig::default();
        if let Some(partial_server) = partial.server {
            if let Some(listen) = partial_server.listen {
                server.listen = listen.into_inner();
            }
            if let Some(port) = partial_server.port {
                server.port = port.into_inner();
            }
            if let Some(static_dir) = partial_server.static_dir {
                server.static_dir = Some(static_dir.into_inner());
            }
        }

        let storage = partial
            .storage
            .and_then(|s| s.url)
            .map(|url| StorageConfig {
                url: url.into_inner(),
            })
            .unwrap_or_default();

        let serial = SerialConfig {
            device: partial
                .serial
                .and_then(|s| s.device)
                .map(|d| d.into_inner()),
        };

        let config = Config {
            logging,
            server,
            storage,
            serial,
        };

        diagnostics.extend(
            config
                .validate()
                .into_iter()
                .map(|e| Diagnostic::Error(Error::Validation(e))),
        );

        if diagnostics.iter().any(|d| d.is_error()) {
            Err(ConfigError::Invalid(format_diagnostics(&diagnostics)))
        } else {
            Ok((config, diagnostics))
        }
    }

    /// Override file values with environment variables
    ///
    /// `lookup` is usually `|key| std::env::var(key).ok()`. Empty values are
    /// treated as unset.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());
        let mut errors = Vec::new();

        if let Some(url) = get(ENV_STORAGE_URL).or_else(|| get(ENV_STORAGE_URL_FALLBACK)) {
            self.storage.url = url;
        }

        if let Some(port) = get(ENV_PORT) {
            match port.parse() {
                Ok(port) => self.server.port = port,
                Err(_) => errors.push(ValidationError {
                    field_path: ENV_PORT.to_string(),
                    message: format!("'{}' is not a valid port number", port),
                }),
            }
        }

        if let Some(listen) = get(ENV_LISTEN) {
            self.server.listen = listen;
        }

        if let Some(dir) = get(ENV_STATIC_DIR) {
            self.server.static_dir = Some(PathBuf::from(dir));
        }

        if let Some(device) = get(ENV_SERIAL_DEVICE) {
            self.serial.device = Some(PathBuf::from(device));
        }

        errors.extend(self.validate());

        if errors.is_empty() {
            Ok(())
        } else {
            let diagnostics: Vec<_> = errors
                .into_iter()
                .map(|e| Diagnostic::Error(Error::Validation(e)))
                .collect();
            Err(ConfigError::Invalid(format_diagnostics(&diagnostics)))
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.server.listen.trim().is_empty() {
            errors.push(ValidationError {
                field_path: "server.listen".to_string(),
                message: "listen address must not be empty".to_string(),
            });
        }

        if self.storage.url.trim().is_empty() {
            errors.push(ValidationError {
                field_path: "storage.url".to_string(),
                message: "storage url must not be empty".to_string(),
            });
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;

    // Tests go through Config::from_files() with actual file I/O

    fn write_file(dir: &std::path::Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        let mut file = fs::File::create(&path).unwrap();
        write!(file, "{}", content).unwrap();
        path
    }

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_files() {
        let (config, diagnostics) = Config::from_files(&[]).unwrap();
        assert!(diagnostics.is_empty());
        assert_eq!(config.logging.level, LogLevel::Info);
        assert_eq!(config.server.listen, DEFAULT_LISTEN);
        assert_eq!(config.server.port, DEFAULT_PORT);
        assert_eq!(config.server.static_dir, Some(PathBuf::from("public")));
        assert_eq!(config.storage.url, DEFAULT_STORAGE_URL);
        assert_eq!(config.serial.device, None);
    }

    #[test]
    fn test_full_config() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = write_file(
            temp_dir.path(),
            "relayd.toml",
            r#"
[logging]
level = "debug"

[logging.overrides]
"tower_http" = "warn"

[server]
listen = "127.0.0.1"
port = 8080
static_dir = "/srv/relay"

[storage]
url = "postgres://relay@db/relay"

[serial]
device = "/dev/ttyACM0"
"#,
        );

        let (config, diagnostics) = Config::from_files(&[path]).unwrap();
        assert!(diagnostics.is_empty());
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.logging.overrides.get("tower_http"), Some(&LogLevel::Warn));
        assert_eq!(config.server.listen, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.static_dir, Some(PathBuf::from("/srv/relay")));
        assert_eq!(config.storage.url, "postgres://relay@db/relay");
        assert_eq!(config.serial.device, Some(PathBuf::from("/dev/ttyACM0")));
    }

    #[test]
    fn test_conflict_detection() {
        let temp_dir = tempfile::tempdir().unwrap();
        let base = write_file(temp_dir.path(), "base.toml", "[server]\nport = 8080\n");
        let conflict = write_file(temp_dir.path(), "conflict.toml", "[server]\nport = 9090\n");

        let result = Config::from_files(&[base, conflict]);
        let err_msg = result.unwrap_err().to_string();
        assert!(err_msg.contains("Merge conflict"));
        assert!(err_msg.contains("server.port"));
    }

    #[test]
    fn test_multiple_conflicts_reported() {
        let temp_dir = tempfile::tempdir().unwrap();
        let base = write_file(
            temp_dir.path(),
            "base.toml",
            "[logging]\nlevel = \"info\"\n\n[storage]\nurl = \"memory://\"\n",
        );
        let conflict = write_file(
            temp_dir.path(),
            "conflict.toml",
            "[logging]\nlevel = \"debug\"\n\n[storage]\nurl = \"sqlite::memory:\"\n",
        );

        let err_msg = Config::from_files(&[base, conflict])
            .unwrap_err()
            .to_string();
        assert!(err_msg.contains("logging.level"));
        assert!(err_msg.contains("storage.url"));
    }

    #[test]
    fn test_relative_import_paths() {
        let temp_dir = tempfile::tempdir().unwrap();
        write_file(
            temp_dir.path(),
            "configs/storage.toml",
            "[storage]\nurl = \"memory://\"\n",
        );
        let main = write_file(
            temp_dir.path(),
            "main.toml",
            "imports = [\"configs/storage.toml\"]\n\n[server]\nport = 8081\n",
        );

        let (config, _) = Config::from_files(&[main]).unwrap();
        assert_eq!(config.storage.url, "memory://");
        assert_eq!(config.server.port, 8081);
    }

    #[test]
    fn test_import_cycle_detection() {
        let temp_dir = tempfile::tempdir().unwrap();
        let a = write_file(temp_dir.path(), "a.toml", "imports = [\"b.toml\"]\n");
        write_file(temp_dir.path(), "b.toml", "imports = [\"a.toml\"]\n");

        let err = Config::from_files(&[a]).unwrap_err();
        assert!(matches!(err, ConfigError::Load(LoadError::ImportCycle { .. })));
    }

    #[test]
    fn test_empty_config_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let empty = write_file(temp_dir.path(), "empty.toml", "");

        let (config, diagnostics) = Config::from_files(&[empty]).unwrap();
        assert_eq!(diagnostics.len(), 1, "Expected 1 warning for empty config");
        assert!(diagnostics[0].is_warning());
        assert_eq!(config.server.port, DEFAULT_PORT);
    }

    #[test]
    fn test_out_of_range_port_is_parse_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = write_file(temp_dir.path(), "bad.toml", "[server]\nport = 70000\n");

        let err = Config::from_files(&[path]).unwrap_err();
        assert!(matches!(err, ConfigError::Load(LoadError::Parse { .. })));
    }

    #[test]
    fn test_empty_storage_url_is_invalid() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = write_file(temp_dir.path(), "bad.toml", "[storage]\nurl = \"\"\n");

        let err_msg = Config::from_files(&[path]).unwrap_err().to_string();
        assert!(err_msg.contains("storage.url"));
    }

    #[test]
    fn test_missing_file_error() {
        let missing_path = PathBuf::from("/nonexistent/relayd.toml");

        let err_msg = Config::from_files(&[missing_path]).unwrap_err().to_string();
        assert!(err_msg.contains("Failed to read"), "Error should mention read failure");
        assert!(err_msg.contains("/nonexistent/relayd.toml"), "Error should include file path");
    }

    #[test]
    fn test_env_overrides_files() {
        let mut config = Config::default();
        config
            .apply_env(env(&[
                ("DATABASE_URL", "memory://"),
                ("PORT", "3000"),
                ("RELAYD_LISTEN", "::1"),
                ("RELAYD_STATIC_DIR", "/var/www"),
                ("RELAYD_SERIAL_DEVICE", "/dev/ttyUSB1"),
            ]))
            .unwrap();

        assert_eq!(config.storage.url, "memory://");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.listen, "::1");
        assert_eq!(config.server.static_dir, Some(PathBuf::from("/var/www")));
        assert_eq!(config.serial.device, Some(PathBuf::from("/dev/ttyUSB1")));
    }

    #[test]
    fn test_empty_env_values_are_ignored() {
        let mut config = Config::default();
        config.apply_env(env(&[("PORT", ""), ("DATABASE_URL", "")])).unwrap();
        assert_eq!(config.server.port, DEFAULT_PORT);
        assert_eq!(config.storage.url, DEFAULT_STORAGE_URL);
    }

    #[test]
    fn test_legacy_storage_variable_is_honored() {
        let mut config = Config::default();
        config
            .apply_env(env(&[("MONGO_URI", "sqlite::memory:")]))
            .unwrap();
        assert_eq!(config.storage.url, "sqlite::memory:");
    }

    #[test]
    fn test_database_url_wins_over_legacy_variable() {
        let mut config = Config::default();
        config
            .apply_env(env(&[
                ("DATABASE_URL", "memory://"),
                ("MONGO_URI", "sqlite::memory:"),
            ]))
            .unwrap();
        assert_eq!(config.storage.url, "memory://");
    }

    #[test]
    fn test_invalid_env_port() {
        let mut config = Config::default();
        let err_msg = config
            .apply_env(env(&[("PORT", "ten thousand")]))
            .unwrap_err()
            .to_string();
        assert!(err_msg.contains("PORT"));
        assert!(err_msg.contains("not a valid port number"));
    }
}
