use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use chrono_tz::Tz;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::memory::{DEFAULT_DIGEST_TURNS, DEFAULT_MAX_TURNS};
use crate::reference::{
    ReferenceMatcher, DEFAULT_ORDER_REFERENCE_PHRASES, DEFAULT_PRODUCT_REFERENCE_PHRASES,
};

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub data: DataConfig,
    pub memory: MemoryConfig,
    pub dialogue: DialogueConfig,
    pub promotion: PromotionConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Clone, Debug)]
pub struct DataConfig {
    pub orders_path: PathBuf,
    pub catalog_path: PathBuf,
}

#[derive(Clone, Debug)]
pub struct MemoryConfig {
    pub max_turns: usize,
    pub digest_turns: usize,
}

#[derive(Clone, Debug)]
pub struct DialogueConfig {
    pub order_reference_phrases: Vec<String>,
    pub product_reference_phrases: Vec<String>,
}

impl DialogueConfig {
    pub fn reference_matcher(&self) -> ReferenceMatcher {
        ReferenceMatcher::new(
            self.order_reference_phrases.iter().cloned(),
            self.product_reference_phrases.iter().cloned(),
        )
    }
}

/// Time-gated promotion window, `[start_hour, end_hour)` in `timezone`.
#[derive(Clone, Debug)]
pub struct PromotionConfig {
    pub timezone: String,
    pub start_hour: u32,
    pub end_hour: u32,
    pub discount_percent: u32,
}

impl PromotionConfig {
    pub fn time_zone(&self) -> Result<Tz, ConfigError> {
        self.timezone.trim().parse::<Tz>().map_err(|_| {
            ConfigError::Validation(format!(
                "promotion.timezone `{}` is not an IANA time zone name",
                self.timezone
            ))
        })
    }
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    Disabled,
    #[serde(rename = "openai")]
    OpenAi,
    Anthropic,
    Ollama,
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Ollama => "ollama",
        }
    }
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
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub orders_path: Option<PathBuf>,
    pub catalog_path: Option<PathBuf>,
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
                provider: LlmProvider::Ollama,
                api_key: None,
                base_url: Some("http://localhost:11434".to_string()),
                model: "llama3.1".to_string(),
                timeout_secs: 30,
                temperature: 0.3,
                max_tokens: 1000,
            },
            data: DataConfig {
                orders_path: PathBuf::from("data/customer_orders.json"),
                catalog_path: PathBuf::from("data/product_catalog.json"),
            },
            memory: MemoryConfig {
                max_turns: DEFAULT_MAX_TURNS,
                digest_turns: DEFAULT_DIGEST_TURNS,
            },
            dialogue: DialogueConfig {
                order_reference_phrases: owned_phrases(DEFAULT_ORDER_REFERENCE_PHRASES),
                product_reference_phrases: owned_phrases(DEFAULT_PRODUCT_REFERENCE_PHRASES),
            },
            promotion: PromotionConfig {
                timezone: "US/Pacific".to_string(),
                start_hour: 8,
                end_hour: 10,
                discount_percent: 10,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn owned_phrases(phrases: &[&str]) -> Vec<String> {
    phrases.iter().map(|phrase| phrase.to_string()).collect()
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "disabled" | "none" => Ok(Self::Disabled),
            "openai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected disabled|openai|anthropic|ollama)"
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
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("waypoint.toml"));
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
            if let Some(api_key) = llm.api_key {
                self.llm.api_key = Some(secret_value(api_key));
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
            if let Some(temperature) = llm.temperature {
                self.llm.temperature = temperature;
            }
            if let Some(max_tokens) = llm.max_tokens {
                self.llm.max_tokens = max_tokens;
            }
        }

        if let Some(data) = patch.data {
            if let Some(orders_path) = data.orders_path {
                self.data.orders_path = orders_path;
            }
            if let Some(catalog_path) = data.catalog_path {
                self.data.catalog_path = catalog_path;
            }
        }

        if let Some(memory) = patch.memory {
            if let Some(max_turns) = memory.max_turns {
                self.memory.max_turns = max_turns;
            }
            if let Some(digest_turns) = memory.digest_turns {
                self.memory.digest_turns = digest_turns;
            }
        }

        if let Some(dialogue) = patch.dialogue {
            if let Some(phrases) = dialogue.order_reference_phrases {
                self.dialogue.order_reference_phrases = phrases;
            }
            if let Some(phrases) = dialogue.product_reference_phrases {
                self.dialogue.product_reference_phrases = phrases;
            }
        }

        if let Some(promotion) = patch.promotion {
            if let Some(timezone) = promotion.timezone {
                self.promotion.timezone = timezone;
            }
            if let Some(start_hour) = promotion.start_hour {
                self.promotion.start_hour = start_hour;
            }
            if let Some(end_hour) = promotion.end_hour {
                self.promotion.end_hour = end_hour;
            }
            if let Some(discount_percent) = promotion.discount_percent {
                self.promotion.discount_percent = discount_percent;
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
        if let Some(value) = read_env("WAYPOINT_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("WAYPOINT_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("WAYPOINT_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("WAYPOINT_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("WAYPOINT_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("WAYPOINT_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("WAYPOINT_LLM_TEMPERATURE") {
            self.llm.temperature = parse_f32("WAYPOINT_LLM_TEMPERATURE", &value)?;
        }
        if let Some(value) = read_env("WAYPOINT_LLM_MAX_TOKENS") {
            self.llm.max_tokens = parse_u32("WAYPOINT_LLM_MAX_TOKENS", &value)?;
        }

        if let Some(value) = read_env("WAYPOINT_DATA_ORDERS_PATH") {
            self.data.orders_path = PathBuf::from(value);
        }
        if let Some(value) = read_env("WAYPOINT_DATA_CATALOG_PATH") {
            self.data.catalog_path = PathBuf::from(value);
        }

        if let Some(value) = read_env("WAYPOINT_MEMORY_MAX_TURNS") {
            self.memory.max_turns = parse_usize("WAYPOINT_MEMORY_MAX_TURNS", &value)?;
        }
        if let Some(value) = read_env("WAYPOINT_MEMORY_DIGEST_TURNS") {
            self.memory.digest_turns = parse_usize("WAYPOINT_MEMORY_DIGEST_TURNS", &value)?;
        }

        if let Some(value) = read_env("WAYPOINT_DIALOGUE_ORDER_REFERENCE_PHRASES") {
            self.dialogue.order_reference_phrases = split_list(&value);
        }
        if let Some(value) = read_env("WAYPOINT_DIALOGUE_PRODUCT_REFERENCE_PHRASES") {
            self.dialogue.product_reference_phrases = split_list(&value);
        }

        if let Some(value) = read_env("WAYPOINT_PROMOTION_TIMEZONE") {
            self.promotion.timezone = value;
        }
        if let Some(value) = read_env("WAYPOINT_PROMOTION_START_HOUR") {
            self.promotion.start_hour = parse_u32("WAYPOINT_PROMOTION_START_HOUR", &value)?;
        }
        if let Some(value) = read_env("WAYPOINT_PROMOTION_END_HOUR") {
            self.promotion.end_hour = parse_u32("WAYPOINT_PROMOTION_END_HOUR", &value)?;
        }
        if let Some(value) = read_env("WAYPOINT_PROMOTION_DISCOUNT_PERCENT") {
            self.promotion.discount_percent =
                parse_u32("WAYPOINT_PROMOTION_DISCOUNT_PERCENT", &value)?;
        }

        let log_level =
            read_env("WAYPOINT_LOGGING_LEVEL").or_else(|| read_env("WAYPOINT_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("WAYPOINT_LOGGING_FORMAT").or_else(|| read_env("WAYPOINT_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(log_format) = overrides.log_format {
            self.logging.format = log_format;
        }
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(orders_path) = overrides.orders_path {
            self.data.orders_path = orders_path;
        }
        if let Some(catalog_path) = overrides.catalog_path {
            self.data.catalog_path = catalog_path;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_llm(&self.llm)?;
        validate_data(&self.data)?;
        validate_memory(&self.memory)?;
        validate_dialogue(&self.dialogue)?;
        validate_promotion(&self.promotion)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("waypoint.toml"), PathBuf::from("config/waypoint.toml")]
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
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if !(0.0..=2.0).contains(&llm.temperature) {
        return Err(ConfigError::Validation(
            "llm.temperature must be in range 0.0..=2.0".to_string(),
        ));
    }

    if llm.max_tokens == 0 {
        return Err(ConfigError::Validation(
            "llm.max_tokens must be greater than zero".to_string(),
        ));
    }

    match llm.provider {
        LlmProvider::OpenAi | LlmProvider::Anthropic => {
            let missing = llm
                .api_key
                .as_ref()
                .map(|value| value.expose_secret().trim().is_empty())
                .unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.api_key is required for openai/anthropic providers".to_string(),
                ));
            }
        }
        LlmProvider::Ollama => {
            let missing =
                llm.base_url.as_ref().map(|value| value.trim().is_empty()).unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.base_url is required for ollama provider".to_string(),
                ));
            }
        }
        LlmProvider::Disabled => {}
    }

    if let Some(base_url) = &llm.base_url {
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::Validation(
                "llm.base_url must start with http:// or https://".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_data(data: &DataConfig) -> Result<(), ConfigError> {
    if data.orders_path.as_os_str().is_empty() {
        return Err(ConfigError::Validation("data.orders_path must not be empty".to_string()));
    }
    if data.catalog_path.as_os_str().is_empty() {
        return Err(ConfigError::Validation("data.catalog_path must not be empty".to_string()));
    }
    Ok(())
}

fn validate_memory(memory: &MemoryConfig) -> Result<(), ConfigError> {
    if memory.max_turns == 0 {
        return Err(ConfigError::Validation(
            "memory.max_turns must be greater than zero".to_string(),
        ));
    }

    if memory.digest_turns == 0 || memory.digest_turns > memory.max_turns {
        return Err(ConfigError::Validation(
            "memory.digest_turns must be in range 1..=memory.max_turns".to_string(),
        ));
    }

    Ok(())
}

fn validate_dialogue(dialogue: &DialogueConfig) -> Result<(), ConfigError> {
    let blank = |phrases: &[String]| phrases.iter().all(|phrase| phrase.trim().is_empty());

    if blank(&dialogue.order_reference_phrases) {
        return Err(ConfigError::Validation(
            "dialogue.order_reference_phrases must contain at least one phrase".to_string(),
        ));
    }
    if blank(&dialogue.product_reference_phrases) {
        return Err(ConfigError::Validation(
            "dialogue.product_reference_phrases must contain at least one phrase".to_string(),
        ));
    }

    Ok(())
}

fn validate_promotion(promotion: &PromotionConfig) -> Result<(), ConfigError> {
    promotion.time_zone()?;

    if promotion.start_hour >= promotion.end_hour || promotion.end_hour > 24 {
        return Err(ConfigError::Validation(
            "promotion window must satisfy start_hour < end_hour <= 24".to_string(),
        ));
    }

    if promotion.discount_percent == 0 || promotion.discount_percent > 100 {
        return Err(ConfigError::Validation(
            "promotion.discount_percent must be in range 1..=100".to_string(),
        ));
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

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
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

fn parse_f32(key: &str, value: &str) -> Result<f32, ConfigError> {
    value.parse::<f32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    llm: Option<LlmPatch>,
    data: Option<DataPatch>,
    memory: Option<MemoryPatch>,
    dialogue: Option<DialoguePatch>,
    promotion: Option<PromotionPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct DataPatch {
    orders_path: Option<PathBuf>,
    catalog_path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct MemoryPatch {
    max_turns: Option<usize>,
    digest_turns: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct DialoguePatch {
    order_reference_phrases: Option<Vec<String>>,
    product_reference_phrases: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct PromotionPatch {
    timezone: Option<String>,
    start_hour: Option<u32>,
    end_hour: Option<u32>,
    discount_percent: Option<u32>,
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
    use std::path::PathBuf;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LlmProvider, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

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
    fn defaults_match_documented_values() -> Result<(), String> {
        let config = AppConfig::default();
        config.validate().map_err(|err| format!("defaults must validate: {err}"))?;

        ensure(config.memory.max_turns == 5, "history bound defaults to five turns")?;
        ensure(config.memory.digest_turns == 3, "digest defaults to three turns")?;
        ensure(config.promotion.start_hour == 8, "promotion window opens at 8")?;
        ensure(config.promotion.end_hour == 10, "promotion window closes at 10")?;
        ensure(config.llm.provider == LlmProvider::Ollama, "default provider is ollama")?;
        ensure(
            config.dialogue.reference_matcher().is_product_reference("what are those?"),
            "default phrase lists are used",
        )
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_WAYPOINT_API_KEY", "sk-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("waypoint.toml");
            fs::write(
                &path,
                r#"
[llm]
provider = "openai"
api_key = "${TEST_WAYPOINT_API_KEY}"
base_url = "https://api.openai.com/v1"
model = "gpt-4o-mini"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.llm.provider == LlmProvider::OpenAi, "provider should come from file")?;
            ensure(
                config.llm.api_key.as_ref().map(|key| key.expose_secret() == "sk-from-env")
                    == Some(true),
                "api key should be interpolated from environment",
            )?;
            Ok(())
        })();

        clear_vars(&["TEST_WAYPOINT_API_KEY"]);
        result
    }

    #[test]
    fn missing_interpolation_variable_is_reported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(&["TEST_WAYPOINT_UNSET"]);

        let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
        let path = dir.path().join("waypoint.toml");
        fs::write(&path, "[llm]\nmodel = \"${TEST_WAYPOINT_UNSET}\"\n")
            .map_err(|err| err.to_string())?;

        let result =
            AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() });
        ensure(
            matches!(
                result,
                Err(ConfigError::MissingEnvInterpolation { ref var }) if var == "TEST_WAYPOINT_UNSET"
            ),
            "missing variable should be named in the error",
        )
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("WAYPOINT_LOG_LEVEL", "warn");
        env::set_var("WAYPOINT_LOG_FORMAT", "pretty");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Pretty),
                "pretty logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars(&["WAYPOINT_LOG_LEVEL", "WAYPOINT_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("WAYPOINT_DATA_ORDERS_PATH", "from-env/orders.json");
        env::set_var("WAYPOINT_MEMORY_MAX_TURNS", "8");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("waypoint.toml");
            fs::write(
                &path,
                r#"
[data]
orders_path = "from-file/orders.json"
catalog_path = "from-file/catalog.json"

[memory]
max_turns = 6
digest_turns = 2

[dialogue]
product_reference_phrases = ["that gear"]

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    catalog_path: Some(PathBuf::from("from-override/catalog.json")),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.data.catalog_path == PathBuf::from("from-override/catalog.json"),
                "override catalog path should win",
            )?;
            ensure(
                config.data.orders_path == PathBuf::from("from-env/orders.json"),
                "env orders path should win over file",
            )?;
            ensure(config.memory.max_turns == 8, "env max turns should win over file")?;
            ensure(config.memory.digest_turns == 2, "file digest turns should win over defaults")?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(
                config.dialogue.reference_matcher().is_product_reference("is that gear light?"),
                "file phrase list should replace the defaults",
            )?;
            Ok(())
        })();

        clear_vars(&["WAYPOINT_DATA_ORDERS_PATH", "WAYPOINT_MEMORY_MAX_TURNS"]);
        result
    }

    #[test]
    fn invalid_numeric_env_override_is_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        env::set_var("WAYPOINT_PROMOTION_START_HOUR", "early");

        let result = AppConfig::load(LoadOptions::default());
        clear_vars(&["WAYPOINT_PROMOTION_START_HOUR"]);

        ensure(
            matches!(
                result,
                Err(ConfigError::InvalidEnvOverride { ref key, .. })
                    if key == "WAYPOINT_PROMOTION_START_HOUR"
            ),
            "bad start hour should be reported with its variable name",
        )
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("WAYPOINT_LLM_PROVIDER", "anthropic");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("llm.api_key")
            );
            ensure(has_message, "validation failure should mention llm.api_key")
        })();

        clear_vars(&["WAYPOINT_LLM_PROVIDER"]);
        result
    }

    #[test]
    fn promotion_window_and_zone_are_validated() -> Result<(), String> {
        let mut config = AppConfig::default();
        config.promotion.timezone = "Mars/Olympus".to_string();
        ensure(
            matches!(
                config.validate(),
                Err(ConfigError::Validation(ref message)) if message.contains("promotion.timezone")
            ),
            "unknown zone should be rejected",
        )?;

        let mut config = AppConfig::default();
        config.promotion.start_hour = 10;
        config.promotion.end_hour = 8;
        ensure(config.validate().is_err(), "inverted window should be rejected")?;

        let mut config = AppConfig::default();
        config.memory.digest_turns = 9;
        ensure(config.validate().is_err(), "digest longer than history should be rejected")
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("WAYPOINT_LLM_PROVIDER", "openai");
        env::set_var("WAYPOINT_LLM_API_KEY", "sk-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(!debug.contains("sk-secret-value"), "debug output should not contain api key")?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )?;
            Ok(())
        })();

        clear_vars(&["WAYPOINT_LLM_PROVIDER", "WAYPOINT_LLM_API_KEY"]);
        result
    }
}
