use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub klaviyo: KlaviyoConfig,
    pub campaign: CampaignConfig,
    pub approvals: ApprovalsConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct KlaviyoConfig {
    pub base_url: String,
    pub revision: String,
    pub timeout_secs: u64,
}

/// Sender defaults applied when a campaign-draft proposal omits the sender
/// fields.
#[derive(Clone, Debug)]
pub struct CampaignConfig {
    pub default_from_email: String,
    pub default_from_label: String,
}

#[derive(Clone, Debug)]
pub struct ApprovalsConfig {
    /// Allows `execute_action` to synthesize an action from literal fields
    /// when the approval id is unknown (pending cache wiped by a restart).
    /// Weakens the approval guarantee; disable to require a staged proposal.
    pub stateless_execute_fallback: bool,
    /// TTL for staged proposals, in seconds. Unset means unlimited retention.
    pub pending_ttl_secs: Option<u64>,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    OpenAi,
    Ollama,
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
    pub llm_provider: Option<LlmProvider>,
    pub llm_api_key: Option<String>,
    pub llm_base_url: Option<String>,
    pub llm_model: Option<String>,
    pub klaviyo_base_url: Option<String>,
    pub campaign_from_email: Option<String>,
    pub campaign_from_label: Option<String>,
    pub stateless_execute_fallback: Option<bool>,
    pub pending_ttl_secs: Option<u64>,
    pub server_port: Option<u16>,
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
            llm: LlmConfig {
                provider: LlmProvider::OpenAi,
                api_key: None,
                base_url: None,
                model: "gpt-4-turbo".to_string(),
                timeout_secs: 60,
            },
            klaviyo: KlaviyoConfig {
                base_url: "https://a.klaviyo.com/api".to_string(),
                revision: "2024-10-15".to_string(),
                timeout_secs: 10,
            },
            campaign: CampaignConfig {
                default_from_email: String::new(),
                default_from_label: String::new(),
            },
            approvals: ApprovalsConfig {
                stateless_execute_fallback: true,
                pending_ttl_secs: None,
            },
            server: ServerConfig { bind_address: "127.0.0.1".to_string(), port: 8000 },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|ollama)"
            ))),
        }
    }
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
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("nexus.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(llm_api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(llm_api_key_value)); // ubs:ignore
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
        }

        if let Some(klaviyo) = patch.klaviyo {
            if let Some(base_url) = klaviyo.base_url {
                self.klaviyo.base_url = base_url;
            }
            if let Some(revision) = klaviyo.revision {
                self.klaviyo.revision = revision;
            }
            if let Some(timeout_secs) = klaviyo.timeout_secs {
                self.klaviyo.timeout_secs = timeout_secs;
            }
        }

        if let Some(campaign) = patch.campaign {
            if let Some(default_from_email) = campaign.default_from_email {
                self.campaign.default_from_email = default_from_email;
            }
            if let Some(default_from_label) = campaign.default_from_label {
                self.campaign.default_from_label = default_from_label;
            }
        }

        if let Some(approvals) = patch.approvals {
            if let Some(stateless_execute_fallback) = approvals.stateless_execute_fallback {
                self.approvals.stateless_execute_fallback = stateless_execute_fallback;
            }
            if let Some(pending_ttl_secs) = approvals.pending_ttl_secs {
                self.approvals.pending_ttl_secs = Some(pending_ttl_secs);
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
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
        if let Some(value) = read_env("NEXUS_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("NEXUS_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value)); // ubs:ignore
        }
        if let Some(value) = read_env("NEXUS_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("NEXUS_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("NEXUS_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("NEXUS_LLM_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("NEXUS_KLAVIYO_BASE_URL") {
            self.klaviyo.base_url = value;
        }
        if let Some(value) = read_env("NEXUS_KLAVIYO_REVISION") {
            self.klaviyo.revision = value;
        }
        if let Some(value) = read_env("NEXUS_KLAVIYO_TIMEOUT_SECS") {
            self.klaviyo.timeout_secs = parse_u64("NEXUS_KLAVIYO_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("NEXUS_CAMPAIGN_FROM_EMAIL") {
            self.campaign.default_from_email = value;
        }
        if let Some(value) = read_env("NEXUS_CAMPAIGN_FROM_LABEL") {
            self.campaign.default_from_label = value;
        }

        if let Some(value) = read_env("NEXUS_APPROVALS_STATELESS_FALLBACK") {
            self.approvals.stateless_execute_fallback =
                parse_bool("NEXUS_APPROVALS_STATELESS_FALLBACK", &value)?;
        }
        if let Some(value) = read_env("NEXUS_APPROVALS_PENDING_TTL_SECS") {
            self.approvals.pending_ttl_secs =
                Some(parse_u64("NEXUS_APPROVALS_PENDING_TTL_SECS", &value)?);
        }

        if let Some(value) = read_env("NEXUS_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("NEXUS_SERVER_PORT") {
            self.server.port = parse_u16("NEXUS_SERVER_PORT", &value)?;
        }

        let log_level = read_env("NEXUS_LOGGING_LEVEL").or_else(|| read_env("NEXUS_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format = read_env("NEXUS_LOGGING_FORMAT").or_else(|| read_env("NEXUS_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_api_key) = overrides.llm_api_key {
            self.llm.api_key = Some(secret_value(llm_api_key)); // ubs:ignore
        }
        if let Some(llm_base_url) = overrides.llm_base_url {
            self.llm.base_url = Some(llm_base_url);
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(klaviyo_base_url) = overrides.klaviyo_base_url {
            self.klaviyo.base_url = klaviyo_base_url;
        }
        if let Some(campaign_from_email) = overrides.campaign_from_email {
            self.campaign.default_from_email = campaign_from_email;
        }
        if let Some(campaign_from_label) = overrides.campaign_from_label {
            self.campaign.default_from_label = campaign_from_label;
        }
        if let Some(stateless_execute_fallback) = overrides.stateless_execute_fallback {
            self.approvals.stateless_execute_fallback = stateless_execute_fallback;
        }
        if let Some(pending_ttl_secs) = overrides.pending_ttl_secs {
            self.approvals.pending_ttl_secs = Some(pending_ttl_secs);
        }
        if let Some(server_port) = overrides.server_port {
            self.server.port = server_port;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_llm(&self.llm)?;
        validate_klaviyo(&self.klaviyo)?;
        validate_campaign(&self.campaign)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("nexus.toml"), PathBuf::from("config/nexus.toml")]
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

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation("llm.timeout_secs must be in range 1..=300".to_string()));
    }

    if llm.model.trim().is_empty() {
        return Err(ConfigError::Validation("llm.model must not be empty".to_string()));
    }

    match llm.provider {
        LlmProvider::OpenAi => {
            let missing = llm
                .api_key
                .as_ref()
                .map(|value| value.expose_secret().trim().is_empty()) // ubs:ignore
                .unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.api_key is required for the openai provider".to_string(),
                ));
            }
        }
        LlmProvider::Ollama => {
            let missing =
                llm.base_url.as_ref().map(|value| value.trim().is_empty()).unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.base_url is required for the ollama provider".to_string(),
                ));
            }
        }
    }

    Ok(())
}

fn validate_klaviyo(klaviyo: &KlaviyoConfig) -> Result<(), ConfigError> {
    if !klaviyo.base_url.starts_with("http://") && !klaviyo.base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "klaviyo.base_url must start with http:// or https://".to_string(),
        ));
    }

    if klaviyo.revision.trim().is_empty() {
        return Err(ConfigError::Validation("klaviyo.revision must not be empty".to_string()));
    }

    if klaviyo.timeout_secs == 0 || klaviyo.timeout_secs > 60 {
        return Err(ConfigError::Validation(
            "klaviyo.timeout_secs must be in range 1..=60".to_string(),
        ));
    }

    Ok(())
}

fn validate_campaign(campaign: &CampaignConfig) -> Result<(), ConfigError> {
    let from_email = campaign.default_from_email.trim();
    if !from_email.is_empty() && !from_email.contains('@') {
        return Err(ConfigError::Validation(
            "campaign.default_from_email must be a valid email address".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.bind_address.trim().is_empty() {
        return Err(ConfigError::Validation("server.bind_address must not be empty".to_string()));
    }

    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
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

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    llm: Option<LlmPatch>,
    klaviyo: Option<KlaviyoPatch>,
    campaign: Option<CampaignPatch>,
    approvals: Option<ApprovalsPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct KlaviyoPatch {
    base_url: Option<String>,
    revision: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct CampaignPatch {
    default_from_email: Option<String>,
    default_from_label: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ApprovalsPatch {
    stateless_execute_fallback: Option<bool>,
    pending_ttl_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
