use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub crm: CrmConfig,
    pub webhook: WebhookConfig,
    pub mcp: McpConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct CrmConfig {
    pub api_key: SecretString,
    pub base_url: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct WebhookConfig {
    pub shared_secret: Option<SecretString>,
    pub bind_address: String,
    pub port: u16,
}

#[derive(Clone, Debug)]
pub struct McpConfig {
    pub auth_enabled: bool,
    pub rate_limit_window_secs: u64,
    pub agent_keys: Vec<AgentKeyConfig>,
}

/// One API key an MCP agent may present, with its rate budget.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct AgentKeyConfig {
    pub key: String,
    pub name: String,
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,
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
    pub crm_api_key: Option<String>,
    pub crm_base_url: Option<String>,
    pub webhook_shared_secret: Option<String>,
    pub log_level: Option<String>,
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
            crm: CrmConfig {
                api_key: String::new().into(),
                base_url: "https://api.followupboss.com/v1".to_string(),
                timeout_secs: 30,
            },
            webhook: WebhookConfig {
                shared_secret: None,
                bind_address: "127.0.0.1".to_string(),
                port: 8081,
            },
            mcp: McpConfig {
                auth_enabled: false,
                rate_limit_window_secs: 60,
                agent_keys: Vec::new(),
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

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("leadbridge.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(crm) = patch.crm {
            if let Some(api_key_value) = crm.api_key {
                self.crm.api_key = secret_value(api_key_value);
            }
            if let Some(base_url) = crm.base_url {
                self.crm.base_url = base_url;
            }
            if let Some(timeout_secs) = crm.timeout_secs {
                self.crm.timeout_secs = timeout_secs;
            }
        }

        if let Some(webhook) = patch.webhook {
            if let Some(shared_secret_value) = webhook.shared_secret {
                self.webhook.shared_secret = Some(secret_value(shared_secret_value));
            }
            if let Some(bind_address) = webhook.bind_address {
                self.webhook.bind_address = bind_address;
            }
            if let Some(port) = webhook.port {
                self.webhook.port = port;
            }
        }

        if let Some(mcp) = patch.mcp {
            if let Some(auth_enabled) = mcp.auth_enabled {
                self.mcp.auth_enabled = auth_enabled;
            }
            if let Some(rate_limit_window_secs) = mcp.rate_limit_window_secs {
                self.mcp.rate_limit_window_secs = rate_limit_window_secs;
            }
            if let Some(agent_keys) = mcp.agent_keys {
                self.mcp.agent_keys = agent_keys;
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
        if let Some(value) = read_env("LEADBRIDGE_CRM_API_KEY") {
            self.crm.api_key = secret_value(value);
        }
        if let Some(value) = read_env("LEADBRIDGE_CRM_BASE_URL") {
            self.crm.base_url = value;
        }
        if let Some(value) = read_env("LEADBRIDGE_CRM_TIMEOUT_SECS") {
            self.crm.timeout_secs = parse_u64("LEADBRIDGE_CRM_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("LEADBRIDGE_WEBHOOK_SECRET") {
            self.webhook.shared_secret = Some(secret_value(value));
        }
        if let Some(value) = read_env("LEADBRIDGE_WEBHOOK_BIND_ADDRESS") {
            self.webhook.bind_address = value;
        }
        if let Some(value) = read_env("LEADBRIDGE_WEBHOOK_PORT") {
            self.webhook.port = parse_u16("LEADBRIDGE_WEBHOOK_PORT", &value)?;
        }

        if let Some(value) = read_env("LEADBRIDGE_MCP_AUTH_ENABLED") {
            self.mcp.auth_enabled = parse_bool("LEADBRIDGE_MCP_AUTH_ENABLED", &value)?;
        }
        if let Some(value) = read_env("LEADBRIDGE_MCP_RATE_LIMIT_WINDOW_SECS") {
            self.mcp.rate_limit_window_secs =
                parse_u64("LEADBRIDGE_MCP_RATE_LIMIT_WINDOW_SECS", &value)?;
        }
        if let Some(value) = read_env("LEADBRIDGE_MCP_AGENT_KEYS") {
            self.mcp.agent_keys = serde_json::from_str(&value).map_err(|_| {
                ConfigError::InvalidEnvOverride {
                    key: "LEADBRIDGE_MCP_AGENT_KEYS".to_string(),
                    value: "<json agent key list>".to_string(),
                }
            })?;
            if !self.mcp.agent_keys.is_empty() {
                self.mcp.auth_enabled = true;
            }
        }

        let log_level =
            read_env("LEADBRIDGE_LOGGING_LEVEL").or_else(|| read_env("LEADBRIDGE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("LEADBRIDGE_LOGGING_FORMAT").or_else(|| read_env("LEADBRIDGE_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(crm_api_key) = overrides.crm_api_key {
            self.crm.api_key = secret_value(crm_api_key);
        }
        if let Some(crm_base_url) = overrides.crm_base_url {
            self.crm.base_url = crm_base_url;
        }
        if let Some(webhook_shared_secret) = overrides.webhook_shared_secret {
            self.webhook.shared_secret = Some(secret_value(webhook_shared_secret));
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_crm(&self.crm)?;
        validate_webhook(&self.webhook)?;
        validate_mcp(&self.mcp)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

impl CrmConfig {
    /// True when the base URL points at a loopback host. Plain-http bases
    /// are only accepted for loopback, which is what the wire tests use.
    pub fn is_loopback(&self) -> bool {
        let rest = self
            .base_url
            .strip_prefix("http://")
            .or_else(|| self.base_url.strip_prefix("https://"))
            .unwrap_or(self.base_url.as_str());
        let host = rest.split(['/', ':']).next().unwrap_or("");
        matches!(host, "127.0.0.1" | "localhost" | "[::1]")
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("leadbridge.toml"), PathBuf::from("config/leadbridge.toml")]
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

fn validate_crm(crm: &CrmConfig) -> Result<(), ConfigError> {
    if crm.api_key.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "crm.api_key is required. Get it from Follow Up Boss > Admin > API".to_string(),
        ));
    }

    let base_url = crm.base_url.trim();
    if !base_url.starts_with("https://") && !base_url.starts_with("http://") {
        return Err(ConfigError::Validation(
            "crm.base_url must start with https:// (or http:// for loopback hosts)".to_string(),
        ));
    }
    if base_url.starts_with("http://") && !crm.is_loopback() {
        return Err(ConfigError::Validation(
            "crm.base_url must use https:// for non-loopback hosts".to_string(),
        ));
    }

    if crm.timeout_secs == 0 || crm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "crm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_webhook(webhook: &WebhookConfig) -> Result<(), ConfigError> {
    if webhook.port == 0 {
        return Err(ConfigError::Validation(
            "webhook.port must be greater than zero".to_string(),
        ));
    }

    if let Some(secret) = &webhook.shared_secret {
        if secret.expose_secret().trim().is_empty() {
            return Err(ConfigError::Validation(
                "webhook.shared_secret must not be blank when set; omit it to disable signature checking"
                    .to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_mcp(mcp: &McpConfig) -> Result<(), ConfigError> {
    if mcp.auth_enabled && mcp.agent_keys.is_empty() {
        return Err(ConfigError::Validation(
            "mcp.auth_enabled is true but no agent keys are configured".to_string(),
        ));
    }

    if mcp.rate_limit_window_secs == 0 {
        return Err(ConfigError::Validation(
            "mcp.rate_limit_window_secs must be greater than zero".to_string(),
        ));
    }

    for agent_key in &mcp.agent_keys {
        if agent_key.key.trim().is_empty() || agent_key.name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "mcp.agent_keys entries require both a key and a name".to_string(),
            ));
        }
        if agent_key.requests_per_minute == 0 {
            return Err(ConfigError::Validation(format!(
                "mcp.agent_keys entry `{}` must allow at least one request per minute",
                agent_key.name
            )));
        }
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

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
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

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn default_requests_per_minute() -> u32 {
    60
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    crm: Option<CrmPatch>,
    webhook: Option<WebhookPatch>,
    mcp: Option<McpPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct CrmPatch {
    api_key: Option<String>,
    base_url: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct WebhookPatch {
    shared_secret: Option<String>,
    bind_address: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
struct McpPatch {
    auth_enabled: Option<bool>,
    rate_limit_window_secs: Option<u64>,
    agent_keys: Option<Vec<AgentKeyConfig>>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
