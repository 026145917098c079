use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::ExposeSecret;
use toml::Value;
use waypoint_core::config::{AppConfig, ConfigOverrides, LoadOptions};

struct Sources<'a> {
    overrides: &'a ConfigOverrides,
    file_doc: Option<Value>,
    file_path: Option<PathBuf>,
}

pub fn run(options: LoadOptions) -> String {
    let config = match AppConfig::load(options.clone()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let file_path = detect_config_path(options.config_path.as_deref());
    let sources = Sources {
        overrides: &options.overrides,
        file_doc: load_config_file_doc(file_path.as_deref()),
        file_path,
    };

    let mut lines =
        vec!["effective config (source precedence: flag > env > file > default):".to_string()];
    let mut push = |key: &str, value: &str, env_keys: &[&str], flagged: bool| {
        lines.push(render_line(key, value, sources.field_source(key, env_keys, flagged)));
    };
    let overrides = sources.overrides;

    let llm = &config.llm;
    let provider_flagged = overrides.llm_provider.is_some();
    push("llm.provider", llm.provider.as_str(), &["WAYPOINT_LLM_PROVIDER"], provider_flagged);
    push("llm.model", &llm.model, &["WAYPOINT_LLM_MODEL"], overrides.llm_model.is_some());
    push(
        "llm.base_url",
        llm.base_url.as_deref().unwrap_or("<unset>"),
        &["WAYPOINT_LLM_BASE_URL"],
        false,
    );
    let api_key = match &llm.api_key {
        Some(secret) => redact_secret(secret.expose_secret()),
        None => "<unset>".to_string(),
    };
    push("llm.api_key", &api_key, &["WAYPOINT_LLM_API_KEY"], false);
    push(
        "llm.timeout_secs",
        &llm.timeout_secs.to_string(),
        &["WAYPOINT_LLM_TIMEOUT_SECS"],
        false,
    );
    push("llm.temperature", &llm.temperature.to_string(), &["WAYPOINT_LLM_TEMPERATURE"], false);
    push("llm.max_tokens", &llm.max_tokens.to_string(), &["WAYPOINT_LLM_MAX_TOKENS"], false);

    push(
        "data.orders_path",
        &config.data.orders_path.display().to_string(),
        &["WAYPOINT_DATA_ORDERS_PATH"],
        overrides.orders_path.is_some(),
    );
    push(
        "data.catalog_path",
        &config.data.catalog_path.display().to_string(),
        &["WAYPOINT_DATA_CATALOG_PATH"],
        overrides.catalog_path.is_some(),
    );

    push(
        "memory.max_turns",
        &config.memory.max_turns.to_string(),
        &["WAYPOINT_MEMORY_MAX_TURNS"],
        false,
    );
    push(
        "memory.digest_turns",
        &config.memory.digest_turns.to_string(),
        &["WAYPOINT_MEMORY_DIGEST_TURNS"],
        false,
    );

    push(
        "dialogue.order_reference_phrases",
        &config.dialogue.order_reference_phrases.len().to_string(),
        &["WAYPOINT_DIALOGUE_ORDER_REFERENCE_PHRASES"],
        false,
    );
    push(
        "dialogue.product_reference_phrases",
        &config.dialogue.product_reference_phrases.len().to_string(),
        &["WAYPOINT_DIALOGUE_PRODUCT_REFERENCE_PHRASES"],
        false,
    );

    let promotion = &config.promotion;
    push("promotion.timezone", &promotion.timezone, &["WAYPOINT_PROMOTION_TIMEZONE"], false);
    push(
        "promotion.start_hour",
        &promotion.start_hour.to_string(),
        &["WAYPOINT_PROMOTION_START_HOUR"],
        false,
    );
    push(
        "promotion.end_hour",
        &promotion.end_hour.to_string(),
        &["WAYPOINT_PROMOTION_END_HOUR"],
        false,
    );
    push(
        "promotion.discount_percent",
        &promotion.discount_percent.to_string(),
        &["WAYPOINT_PROMOTION_DISCOUNT_PERCENT"],
        false,
    );

    push(
        "logging.level",
        &config.logging.level,
        &["WAYPOINT_LOGGING_LEVEL", "WAYPOINT_LOG_LEVEL"],
        overrides.log_level.is_some(),
    );
    push(
        "logging.format",
        &format!("{:?}", config.logging.format).to_ascii_lowercase(),
        &["WAYPOINT_LOGGING_FORMAT", "WAYPOINT_LOG_FORMAT"],
        overrides.log_format.is_some(),
    );

    lines.join("\n")
}

impl Sources<'_> {
    fn field_source(&self, key_path: &str, env_keys: &[&str], flagged: bool) -> String {
        if flagged {
            return "flag".to_string();
        }

        if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
            return format!("env ({env_key})");
        }

        if let Some(doc) = &self.file_doc {
            if contains_path(doc, key_path) {
                let file_path = self
                    .file_path
                    .as_ref()
                    .map(|path| path.display().to_string())
                    .unwrap_or_else(|| "config file".to_string());
                return format!("file ({file_path})");
            }
        }

        "default".to_string()
    }
}

fn detect_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return path.exists().then(|| path.to_path_buf());
    }

    ["waypoint.toml", "config/waypoint.toml"].into_iter().map(PathBuf::from).find(|p| p.exists())
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

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

/// Keeps a provider prefix such as `sk-` visible and hides the rest.
fn redact_secret(secret: &str) -> String {
    let trimmed = secret.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('-') {
        return format!("{prefix}-***");
    }

    "<redacted>".to_string()
}

#[cfg(test)]
mod tests {
    use super::{contains_path, redact_secret};

    #[test]
    fn redaction_keeps_only_the_key_prefix() {
        assert_eq!(redact_secret("sk-live-abcdef"), "sk-***");
        assert_eq!(redact_secret("plainsecret"), "<redacted>");
        assert_eq!(redact_secret("   "), "<empty>");
    }

    #[test]
    fn nested_toml_keys_are_found_by_dotted_path() {
        let doc: toml::Value = "[promotion]\nstart_hour = 7\n".parse().expect("toml");
        assert!(contains_path(&doc, "promotion.start_hour"));
        assert!(!contains_path(&doc, "promotion.end_hour"));
        assert!(!contains_path(&doc, "llm.model"));
    }
}
