use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use fieldops_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

struct ConfigField {
    key_path: &'static str,
    env_keys: &'static [&'static str],
    value: String,
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in effective_fields(&config) {
        let source = field_source(
            field.key_path,
            field.env_keys,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(format!("- {} = {} (source: {source})", field.key_path, field.value));
    }

    lines.join("\n")
}

fn effective_fields(config: &AppConfig) -> Vec<ConfigField> {
    vec![
        ConfigField {
            key_path: "database.url",
            env_keys: &["FIELDOPS_DATABASE_URL"],
            value: config.database.url.clone(),
        },
        ConfigField {
            key_path: "database.max_connections",
            env_keys: &["FIELDOPS_DATABASE_MAX_CONNECTIONS"],
            value: config.database.max_connections.to_string(),
        },
        ConfigField {
            key_path: "database.timeout_secs",
            env_keys: &["FIELDOPS_DATABASE_TIMEOUT_SECS"],
            value: config.database.timeout_secs.to_string(),
        },
        ConfigField {
            key_path: "workflow.id_max_attempts",
            env_keys: &["FIELDOPS_WORKFLOW_ID_MAX_ATTEMPTS"],
            value: config.workflow.id_max_attempts.to_string(),
        },
        ConfigField {
            key_path: "workflow.remark_max_chars",
            env_keys: &["FIELDOPS_WORKFLOW_REMARK_MAX_CHARS"],
            value: config.workflow.remark_max_chars.to_string(),
        },
        ConfigField {
            key_path: "security.token_secret",
            env_keys: &["FIELDOPS_SECURITY_TOKEN_SECRET"],
            value: redact(config.security.token_secret.expose_secret()),
        },
        ConfigField {
            key_path: "security.initial_password",
            env_keys: &["FIELDOPS_SECURITY_INITIAL_PASSWORD"],
            value: redact(config.security.initial_password.expose_secret()),
        },
        ConfigField {
            key_path: "logging.level",
            env_keys: &["FIELDOPS_LOGGING_LEVEL", "FIELDOPS_LOG_LEVEL"],
            value: config.logging.level.clone(),
        },
        ConfigField {
            key_path: "logging.format",
            env_keys: &["FIELDOPS_LOGGING_FORMAT", "FIELDOPS_LOG_FORMAT"],
            value: config.logging.format.as_str().to_string(),
        },
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    ["fieldops.toml", "config/fieldops.toml"].into_iter().map(PathBuf::from).find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(doc: &Value, key_path: &str) -> bool {
    let mut current = doc;
    for segment in key_path.split('.') {
        let Some(next) = current.get(segment) else {
            return false;
        };
        current = next;
    }
    true
}

fn redact(secret: &str) -> String {
    if secret.trim().is_empty() {
        "<empty>".to_string()
    } else {
        format!("<redacted:{} chars>", secret.chars().count())
    }
}
