use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MIN_SIGNING_KEY_LEN: usize = 16;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub notifications: NotificationConfig,
    pub token: TokenConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct NotificationConfig {
    /// Absent means notifications are only written to the log.
    pub webhook_url: Option<String>,
    pub link_base_url: String,
    pub poll_interval_ms: u64,
    pub batch_size: u32,
    pub max_attempts: u32,
    pub base_backoff_secs: u64,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct TokenConfig {
    pub signing_key: SecretString,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub signing_key: Option<String>,
    pub webhook_url: Option<String>,
    pub port: Option<u16>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://despesas.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            notifications: NotificationConfig {
                webhook_url: None,
                link_base_url: "http://localhost:8080".to_string(),
                poll_interval_ms: 1_000,
                batch_size: 50,
                max_attempts: 8,
                base_backoff_secs: 2,
                timeout_secs: 10,
            },
            token: TokenConfig { signing_key: String::new().into() },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("despesas.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(notifications) = patch.notifications {
            if let Some(webhook_url) = notifications.webhook_url {
                self.notifications.webhook_url = Some(webhook_url);
            }
            if let Some(link_base_url) = notifications.link_base_url {
                self.notifications.link_base_url = link_base_url;
            }
            if let Some(poll_interval_ms) = notifications.poll_interval_ms {
                self.notifications.poll_interval_ms = poll_interval_ms;
            }
            if let Some(batch_size) = notifications.batch_size {
                self.notifications.batch_size = batch_size;
            }
            if let Some(max_attempts) = notifications.max_attempts {
                self.notifications.max_attempts = max_attempts;
            }
            if let Some(base_backoff_secs) = notifications.base_backoff_secs {
                self.notifications.base_backoff_secs = base_backoff_secs;
            }
            if let Some(timeout_secs) = notifications.timeout_secs {
                self.notifications.timeout_secs = timeout_secs;
            }
        }

        if let Some(token) = patch.token {
            if let Some(signing_key) = token.signing_key {
                self.token.signing_key = secret_value(signing_key);
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("DESPESAS_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("DESPESAS_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("DESPESAS_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("DESPESAS_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("DESPESAS_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("DESPESAS_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("DESPESAS_SERVER_PORT") {
            self.server.port = parse_u16("DESPESAS_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("DESPESAS_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("DESPESAS_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("DESPESAS_NOTIFICATIONS_WEBHOOK_URL") {
            self.notifications.webhook_url = Some(value);
        }
        if let Some(value) = read_env("DESPESAS_NOTIFICATIONS_LINK_BASE_URL") {
            self.notifications.link_base_url = value;
        }
        if let Some(value) = read_env("DESPESAS_NOTIFICATIONS_POLL_INTERVAL_MS") {
            self.notifications.poll_interval_ms =
                parse_u64("DESPESAS_NOTIFICATIONS_POLL_INTERVAL_MS", &value)?;
        }
        if let Some(value) = read_env("DESPESAS_NOTIFICATIONS_BATCH_SIZE") {
            self.notifications.batch_size =
                parse_u32("DESPESAS_NOTIFICATIONS_BATCH_SIZE", &value)?;
        }
        if let Some(value) = read_env("DESPESAS_NOTIFICATIONS_MAX_ATTEMPTS") {
            self.notifications.max_attempts =
                parse_u32("DESPESAS_NOTIFICATIONS_MAX_ATTEMPTS", &value)?;
        }
        if let Some(value) = read_env("DESPESAS_NOTIFICATIONS_BASE_BACKOFF_SECS") {
            self.notifications.base_backoff_secs =
                parse_u64("DESPESAS_NOTIFICATIONS_BASE_BACKOFF_SECS", &value)?;
        }
        if let Some(value) = read_env("DESPESAS_NOTIFICATIONS_TIMEOUT_SECS") {
            self.notifications.timeout_secs =
                parse_u64("DESPESAS_NOTIFICATIONS_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("DESPESAS_TOKEN_SIGNING_KEY") {
            self.token.signing_key = secret_value(value);
        }

        let log_level =
            read_env("DESPESAS_LOGGING_LEVEL").or_else(|| read_env("DESPESAS_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("DESPESAS_LOGGING_FORMAT").or_else(|| read_env("DESPESAS_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(signing_key) = overrides.signing_key {
            self.token.signing_key = secret_value(signing_key);
        }
        if let Some(webhook_url) = overrides.webhook_url {
            self.notifications.webhook_url = Some(webhook_url);
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_server(&self.server)?;
        validate_notifications(&self.notifications)?;
        validate_token(&self.token)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("despesas.toml"), PathBuf::from("config/despesas.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_notifications(notifications: &NotificationConfig) -> Result<(), ConfigError> {
    if let Some(webhook_url) = &notifications.webhook_url {
        if !is_http_url(webhook_url) {
            return Err(ConfigError::Validation(
                "notifications.webhook_url must start with http:// or https://".to_string(),
            ));
        }
    }

    if !is_http_url(&notifications.link_base_url) {
        return Err(ConfigError::Validation(
            "notifications.link_base_url must start with http:// or https://".to_string(),
        ));
    }

    if notifications.poll_interval_ms == 0 {
        return Err(ConfigError::Validation(
            "notifications.poll_interval_ms must be greater than zero".to_string(),
        ));
    }

    if notifications.batch_size == 0 || notifications.batch_size > 500 {
        return Err(ConfigError::Validation(
            "notifications.batch_size must be in range 1..=500".to_string(),
        ));
    }

    if notifications.max_attempts == 0 {
        return Err(ConfigError::Validation(
            "notifications.max_attempts must be greater than zero".to_string(),
        ));
    }

    if notifications.timeout_secs == 0 || notifications.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "notifications.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_token(token: &TokenConfig) -> Result<(), ConfigError> {
    let signing_key = token.signing_key.expose_secret();
    if signing_key.trim().is_empty() {
        return Err(ConfigError::Validation(
            "token.signing_key is required (set DESPESAS_TOKEN_SIGNING_KEY)".to_string(),
        ));
    }

    if signing_key.len() < MIN_SIGNING_KEY_LEN {
        return Err(ConfigError::Validation(format!(
            "token.signing_key must be at least {MIN_SIGNING_KEY_LEN} characters long"
        )));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    server: Option<ServerPatch>,
    notifications: Option<NotificationPatch>,
    token: Option<TokenPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct NotificationPatch {
    webhook_url: Option<String>,
    link_base_url: Option<String>,
    poll_interval_ms: Option<u64>,
    batch_size: Option<u32>,
    max_attempts: Option<u32>,
    base_backoff_secs: Option<u64>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct TokenPatch {
    signing_key: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    const SIGNING_KEY: &str = "unit-test-signing-key";

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_DESPESAS_SIGNING_KEY", "signing-key-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("despesas.toml");
            fs::write(
                &path,
                r#"
[token]
signing_key = "${TEST_DESPESAS_SIGNING_KEY}"

[notifications]
webhook_url = "https://hooks.example.test/despesas"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.token.signing_key.expose_secret() == "signing-key-from-env",
                "signing key should be interpolated from the environment",
            )?;
            ensure(
                config.notifications.webhook_url.as_deref()
                    == Some("https://hooks.example.test/despesas"),
                "webhook url should be read from the file",
            )?;
            Ok(())
        })();

        clear_vars(&["TEST_DESPESAS_SIGNING_KEY"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("DESPESAS_TOKEN_SIGNING_KEY", SIGNING_KEY);
        env::set_var("DESPESAS_LOG_LEVEL", "warn");
        env::set_var("DESPESAS_LOG_FORMAT", "json");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warn log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Json),
                "json logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars(&["DESPESAS_TOKEN_SIGNING_KEY", "DESPESAS_LOG_LEVEL", "DESPESAS_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("DESPESAS_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("DESPESAS_TOKEN_SIGNING_KEY", "signing-key-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("despesas.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[token]
signing_key = "signing-key-from-file"

[server]
port = 9090

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(config.server.port == 9090, "file port should win over the default")?;
            ensure(
                config.token.signing_key.expose_secret() == "signing-key-from-env",
                "env signing key should win over file and defaults",
            )?;
            Ok(())
        })();

        clear_vars(&["DESPESAS_DATABASE_URL", "DESPESAS_TOKEN_SIGNING_KEY"]);
        result
    }

    #[test]
    fn validation_fails_fast_without_signing_key() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(&["DESPESAS_TOKEN_SIGNING_KEY"]);

        let error = match AppConfig::load(LoadOptions::default()) {
            Ok(_) => {
                return Err("expected validation failure but config load succeeded".to_string())
            }
            Err(error) => error,
        };
        let has_message = matches!(
            error,
            ConfigError::Validation(ref message) if message.contains("token.signing_key")
        );
        ensure(has_message, "validation failure should mention token.signing_key")
    }

    #[test]
    fn short_signing_keys_are_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let result = AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                signing_key: Some("short".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        });

        ensure(
            matches!(result, Err(ConfigError::Validation(ref message)) if message.contains("at least")),
            "a five character key should be rejected",
        )
    }

    #[test]
    fn webhook_url_must_be_http() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let result = AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                signing_key: Some(SIGNING_KEY.to_string()),
                webhook_url: Some("ftp://hooks.example.test".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        });

        ensure(
            matches!(result, Err(ConfigError::Validation(ref message)) if message.contains("webhook_url")),
            "non-http webhook url should be rejected",
        )
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("DESPESAS_TOKEN_SIGNING_KEY", "super-secret-signing-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(
                !debug.contains("super-secret-signing-value"),
                "debug output should not contain the signing key",
            )?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )?;
            Ok(())
        })();

        clear_vars(&["DESPESAS_TOKEN_SIGNING_KEY"]);
        result
    }
}
