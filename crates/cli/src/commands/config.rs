use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use despesas_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let file_path = detect_config_path();
    let file_doc = load_config_file_doc(file_path.as_deref());
    let sources = Sources { file_doc: file_doc.as_ref(), file_path: file_path.as_deref() };

    let signing_key = redact_secret(config.token.signing_key.expose_secret());
    let webhook_url = config.notifications.webhook_url.as_deref().map(redact_url);

    let fields: Vec<(&str, String)> = vec![
        ("database.url", config.database.url.clone()),
        ("database.max_connections", config.database.max_connections.to_string()),
        ("database.timeout_secs", config.database.timeout_secs.to_string()),
        ("server.bind_address", config.server.bind_address.clone()),
        ("server.port", config.server.port.to_string()),
        ("server.graceful_shutdown_secs", config.server.graceful_shutdown_secs.to_string()),
        ("notifications.webhook_url", webhook_url.unwrap_or_else(|| "<unset>".to_string())),
        ("notifications.link_base_url", config.notifications.link_base_url.clone()),
        ("notifications.poll_interval_ms", config.notifications.poll_interval_ms.to_string()),
        ("notifications.batch_size", config.notifications.batch_size.to_string()),
        ("notifications.max_attempts", config.notifications.max_attempts.to_string()),
        ("notifications.base_backoff_secs", config.notifications.base_backoff_secs.to_string()),
        ("notifications.timeout_secs", config.notifications.timeout_secs.to_string()),
        ("token.signing_key", signing_key),
        ("logging.level", config.logging.level.clone()),
        ("logging.format", format!("{:?}", config.logging.format).to_ascii_lowercase()),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    lines.extend(fields.iter().map(|(key, value)| {
        format!("- {key} = {value} (source: {})", sources.of(key))
    }));
    lines.join("\n")
}

struct Sources<'a> {
    file_doc: Option<&'a Value>,
    file_path: Option<&'a Path>,
}

impl Sources<'_> {
    fn of(&self, key_path: &str) -> String {
        for env_key in env_keys(key_path) {
            if env::var_os(&env_key).is_some() {
                return format!("env ({env_key})");
            }
        }

        if let Some(doc) = self.file_doc {
            if contains_path(doc, key_path) {
                let file_path = self
                    .file_path
                    .map(|path| path.display().to_string())
                    .unwrap_or_else(|| "config file".to_string());
                return format!("file ({file_path})");
            }
        }

        "default".to_string()
    }
}

/// `logging.level` -> `DESPESAS_LOGGING_LEVEL`, plus the short `DESPESAS_LOG_*` aliases.
fn env_keys(key_path: &str) -> Vec<String> {
    let primary = format!("DESPESAS_{}", key_path.replace('.', "_").to_ascii_uppercase());
    match key_path {
        "logging.level" => vec![primary, "DESPESAS_LOG_LEVEL".to_string()],
        "logging.format" => vec![primary, "DESPESAS_LOG_FORMAT".to_string()],
        _ => vec![primary],
    }
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("despesas.toml"), PathBuf::from("config/despesas.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
    raw.parse::<Value>().ok()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn redact_secret(secret: &str) -> String {
    if secret.trim().is_empty() {
        "<empty>".to_string()
    } else {
        "<redacted>".to_string()
    }
}

/// Keeps scheme and host; paths and query strings often carry webhook secrets.
fn redact_url(url: &str) -> String {
    match url.split_once("://") {
        Some((scheme, rest)) => {
            let host = rest.split(['/', '?']).next().unwrap_or_default();
            format!("{scheme}://{host}/***")
        }
        None => "<redacted>".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::{env_keys, redact_secret, redact_url};

    #[test]
    fn secrets_never_render_in_clear() {
        assert_eq!(redact_secret("a-very-long-signing-key"), "<redacted>");
        assert_eq!(redact_secret("  "), "<empty>");
        assert_eq!(
            redact_url("https://hooks.example.test/services/T000/B000?token=abc"),
            "https://hooks.example.test/***"
        );
        assert_eq!(redact_url("not a url"), "<redacted>");
    }

    #[test]
    fn env_keys_follow_the_section_naming() {
        assert_eq!(env_keys("notifications.webhook_url"), vec!["DESPESAS_NOTIFICATIONS_WEBHOOK_URL"]);
        assert_eq!(env_keys("logging.format"), vec!["DESPESAS_LOGGING_FORMAT", "DESPESAS_LOG_FORMAT"]);
    }
}
