use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MIN_TOKEN_SECRET_CHARS: usize = 32;
pub const MIN_INITIAL_PASSWORD_CHARS: usize = 12;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub workflow: WorkflowConfig,
    pub security: SecurityConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkflowConfig {
    pub id_max_attempts: u32,
    pub remark_max_chars: usize,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self { id_max_attempts: 5, remark_max_chars: 200 }
    }
}

/// Secrets have no built-in values; loading fails until both are supplied.
#[derive(Clone, Debug)]
pub struct SecurityConfig {
    pub token_secret: SecretString,
    pub initial_password: SecretString,
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
    pub id_max_attempts: Option<u32>,
    pub token_secret: Option<String>,
    pub initial_password: Option<String>,
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
                url: "sqlite://fieldops.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            workflow: WorkflowConfig::default(),
            security: SecurityConfig {
                token_secret: String::new().into(),
                initial_password: String::new().into(),
            },
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

impl LogFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Compact => "compact",
            Self::Pretty => "pretty",
            Self::Json => "json",
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
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("fieldops.toml"));
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

        if let Some(workflow) = patch.workflow {
            if let Some(id_max_attempts) = workflow.id_max_attempts {
                self.workflow.id_max_attempts = id_max_attempts;
            }
            if let Some(remark_max_chars) = workflow.remark_max_chars {
                self.workflow.remark_max_chars = remark_max_chars;
            }
        }

        if let Some(security) = patch.security {
            if let Some(token_secret) = security.token_secret {
                self.security.token_secret = secret_value(token_secret);
            }
            if let Some(initial_password) = security.initial_password {
                self.security.initial_password = secret_value(initial_password);
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
        if let Some(value) = read_env("FIELDOPS_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("FIELDOPS_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("FIELDOPS_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("FIELDOPS_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("FIELDOPS_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("FIELDOPS_WORKFLOW_ID_MAX_ATTEMPTS") {
            self.workflow.id_max_attempts =
                parse_u32("FIELDOPS_WORKFLOW_ID_MAX_ATTEMPTS", &value)?;
        }
        if let Some(value) = read_env("FIELDOPS_WORKFLOW_REMARK_MAX_CHARS") {
            self.workflow.remark_max_chars =
                parse_usize("FIELDOPS_WORKFLOW_REMARK_MAX_CHARS", &value)?;
        }

        if let Some(value) = read_env("FIELDOPS_SECURITY_TOKEN_SECRET") {
            self.security.token_secret = secret_value(value);
        }
        if let Some(value) = read_env("FIELDOPS_SECURITY_INITIAL_PASSWORD") {
            self.security.initial_password = secret_value(value);
        }

        let log_level =
            read_env("FIELDOPS_LOGGING_LEVEL").or_else(|| read_env("FIELDOPS_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("FIELDOPS_LOGGING_FORMAT").or_else(|| read_env("FIELDOPS_LOG_FORMAT"));
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
        if let Some(id_max_attempts) = overrides.id_max_attempts {
            self.workflow.id_max_attempts = id_max_attempts;
        }
        if let Some(token_secret) = overrides.token_secret {
            self.security.token_secret = secret_value(token_secret);
        }
        if let Some(initial_password) = overrides.initial_password {
            self.security.initial_password = secret_value(initial_password);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_workflow(&self.workflow)?;
        validate_security(&self.security)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("fieldops.toml"), PathBuf::from("config/fieldops.toml")]
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

fn validate_workflow(workflow: &WorkflowConfig) -> Result<(), ConfigError> {
    if workflow.id_max_attempts == 0 || workflow.id_max_attempts > 20 {
        return Err(ConfigError::Validation(
            "workflow.id_max_attempts must be in range 1..=20".to_string(),
        ));
    }
    if workflow.remark_max_chars == 0 {
        return Err(ConfigError::Validation(
            "workflow.remark_max_chars must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_security(security: &SecurityConfig) -> Result<(), ConfigError> {
    let token_secret = security.token_secret.expose_secret();
    if token_secret.trim().is_empty() {
        return Err(ConfigError::Validation(
            "security.token_secret is required; set FIELDOPS_SECURITY_TOKEN_SECRET".to_string(),
        ));
    }
    if token_secret.chars().count() < MIN_TOKEN_SECRET_CHARS {
        return Err(ConfigError::Validation(format!(
            "security.token_secret must be at least {MIN_TOKEN_SECRET_CHARS} characters"
        )));
    }

    let initial_password = security.initial_password.expose_secret();
    if initial_password.trim().is_empty() {
        return Err(ConfigError::Validation(
            "security.initial_password is required; set FIELDOPS_SECURITY_INITIAL_PASSWORD"
                .to_string(),
        ));
    }
    if initial_password.chars().count() < MIN_INITIAL_PASSWORD_CHARS {
        return Err(ConfigError::Validation(format!(
            "security.initial_password must be at least {MIN_INITIAL_PASSWORD_CHARS} characters"
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

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
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

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    workflow: Option<WorkflowPatch>,
    security: Option<SecurityPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct WorkflowPatch {
    id_max_attempts: Option<u32>,
    remark_max_chars: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct SecurityPatch {
    token_secret: Option<String>,
    initial_password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
