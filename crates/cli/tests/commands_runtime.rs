use std::env;
use std::fs;
use std::path::Path;
use std::sync::{Mutex, OnceLock};

use serde_json::Value;
use tempfile::TempDir;
use waypoint_agent::AgentRuntime;
use waypoint_cli::commands::{ask, chat, config, doctor};
use waypoint_core::config::{AppConfig, ConfigOverrides, LlmProvider, LoadOptions};

const ORDERS: &str = r##"[
  {"CustomerName": "John Doe", "Email": "john.doe@example.com", "OrderNumber": "#W001",
   "ProductsOrdered": ["SOBP001"], "Status": "delivered", "TrackingNumber": "TRK123456789"},
  {"CustomerName": "Ethan Harris", "Email": "ethan.harris@example.com", "OrderNumber": "#W007",
   "ProductsOrdered": ["SOSB006"], "Status": "cancelled", "TrackingNumber": null}
]"##;

const CATALOG: &str = r#"[
  {"ProductName": "Summit Trail Backpack 40L", "SKU": "SOBP001",
   "Description": "Lightweight hiking backpack", "Inventory": 42, "Tags": ["backpack", "hiking"]},
  {"ProductName": "Down Sleeping Bag 20F", "SKU": "SOSB006",
   "Description": "Warm down sleeping bag", "Inventory": 18, "Tags": ["sleeping bag", "camping"]}
]"#;

#[test]
fn ask_completes_an_order_lookup_across_two_messages() {
    let data = data_dir();
    with_env(&[], || {
        let queries =
            vec!["my email is john.doe@example.com".to_string(), "it's W001".to_string()];
        let result = ask::run(offline_options(data.path()), &queries);
        assert_eq!(result.exit_code, 0, "expected successful ask run: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "ask");
        assert_eq!(payload["status"], "ok");

        let turns = payload["turns"].as_array().expect("turns array");
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0]["intent"], "ORDER_STATUS");
        assert!(turns[0]["reply"].as_str().unwrap_or_default().contains("Now I need your order"));
        assert_eq!(turns[1]["handler"], "order_status");
        let reply = turns[1]["reply"].as_str().unwrap_or_default();
        assert!(reply.starts_with("Hello John Doe!"), "unexpected reply: {reply}");
        assert!(reply.contains("TRK123456789"));
    });
}

#[test]
fn ask_returns_config_failure_for_unknown_provider() {
    let data = data_dir();
    with_env(&[("WAYPOINT_LLM_PROVIDER", "carrier-pigeon")], || {
        let options = LoadOptions {
            overrides: ConfigOverrides {
                orders_path: Some(data.path().join("orders.json")),
                catalog_path: Some(data.path().join("catalog.json")),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        };
        let result = ask::run(options, &["hello".to_string()]);
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "ask");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn ask_reports_missing_order_data_as_unavailable() {
    let data = data_dir();
    with_env(&[], || {
        let mut options = offline_options(data.path());
        options.overrides.orders_path = Some(data.path().join("missing.json"));

        let result = ask::run(options, &["hello".to_string()]);
        assert_eq!(result.exit_code, 4);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "service_unavailable");
        assert!(payload["message"].as_str().unwrap_or_default().contains("missing.json"));
    });
}

#[test]
fn doctor_json_reports_each_readiness_check() {
    let data = data_dir();
    with_env(&[], || {
        let result = doctor::run(offline_options(data.path()), true);
        assert_eq!(result.exit_code, 0, "expected healthy doctor run: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["overall_status"], "pass");

        let checks = payload["checks"].as_array().expect("checks array");
        let status_of = |name: &str| {
            checks
                .iter()
                .find(|check| check["name"] == name)
                .map(|check| check["status"].clone())
                .unwrap_or(Value::Null)
        };
        assert_eq!(status_of("config_validation"), "pass");
        assert_eq!(status_of("order_data"), "pass");
        assert_eq!(status_of("catalog_data"), "pass");
        assert_eq!(status_of("promotion_window"), "pass");
        assert_eq!(status_of("llm_client"), "skipped");
    });
}

#[test]
fn doctor_fails_when_catalog_cannot_be_read() {
    let data = data_dir();
    with_env(&[], || {
        let mut options = offline_options(data.path());
        options.overrides.catalog_path = Some(data.path().join("nope.json"));

        let result = doctor::run(options, false);
        assert_eq!(result.exit_code, 1);
        assert!(result.output.starts_with("doctor: one or more readiness checks failed"));
        assert!(result.output.contains("- [fail] catalog_data:"));
        assert!(result.output.contains("- [ok] order_data: loaded 2 orders"));
    });
}

#[test]
fn doctor_skips_dependent_checks_when_config_is_invalid() {
    with_env(&[("WAYPOINT_MEMORY_MAX_TURNS", "0")], || {
        let result = doctor::run(LoadOptions::default(), false);
        assert_eq!(result.exit_code, 1);
        assert!(result.output.contains("- [fail] config_validation:"));
        assert!(result.output.contains("- [skip] order_data:"));
        assert!(result.output.contains("- [skip] llm_client:"));
    });
}

#[test]
fn config_attributes_sources_and_redacts_the_api_key() {
    let data = data_dir();
    let config_path = data.path().join("waypoint.toml");
    fs::write(&config_path, "[promotion]\nstart_hour = 7\n").expect("write config");

    with_env(
        &[("WAYPOINT_LLM_API_KEY", "sk-live-abcdef123456"), ("WAYPOINT_MEMORY_MAX_TURNS", "7")],
        || {
            let mut options = offline_options(data.path());
            options.config_path = Some(config_path.clone());
            options.require_file = true;

            let output = config::run(options);
            assert!(!output.contains("abcdef123456"), "secret leaked: {output}");
            assert!(output.contains(
                "- llm.api_key = sk-*** (source: env (WAYPOINT_LLM_API_KEY))"
            ));
            assert!(output.contains("- llm.provider = disabled (source: flag)"));
            assert!(output.contains(
                "- memory.max_turns = 7 (source: env (WAYPOINT_MEMORY_MAX_TURNS))"
            ));
            assert!(output.contains(&format!(
                "- promotion.start_hour = 7 (source: file ({}))",
                config_path.display()
            )));
            assert!(output.contains("- promotion.end_hour = 10 (source: default)"));
        },
    );
}

#[test]
fn config_reports_validation_failures_inline() {
    with_env(&[("WAYPOINT_PROMOTION_TIMEZONE", "Mars/Olympus_Mons")], || {
        let output = config::run(LoadOptions::default());
        assert!(output.starts_with("config validation failed:"), "unexpected: {output}");
    });
}

#[test]
fn chat_loop_handles_help_blank_lines_and_quit() {
    let data = data_dir();
    with_env(&[], || {
        let config = AppConfig::load(offline_options(data.path())).expect("config");
        let runtime = AgentRuntime::from_config(&config).expect("runtime");
        let mut session = runtime.open_session();

        let input = "help\n\nmy email is john.doe@example.com\nW001\nquit\nW007\n";
        let mut output = Vec::new();
        let executor = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("tokio runtime");
        let handled = executor
            .block_on(chat::converse(&mut session, input.as_bytes(), &mut output))
            .expect("chat loop");

        assert_eq!(handled, 2);
        let transcript = String::from_utf8(output).expect("utf8 transcript");
        assert!(transcript.contains("Things you can ask:"));
        assert!(transcript.contains("assistant> Hello John Doe!"));
        assert!(transcript.ends_with("Thanks for stopping by. Goodbye!\n"));
        assert_eq!(session.memory().history_len(), 2);
    });
}

fn data_dir() -> TempDir {
    let dir = tempfile::tempdir().expect("temp dir");
    fs::write(dir.path().join("orders.json"), ORDERS).expect("write orders");
    fs::write(dir.path().join("catalog.json"), CATALOG).expect("write catalog");
    dir
}

fn offline_options(data: &Path) -> LoadOptions {
    LoadOptions {
        overrides: ConfigOverrides {
            llm_provider: Some(LlmProvider::Disabled),
            orders_path: Some(data.join("orders.json")),
            catalog_path: Some(data.join("catalog.json")),
            ..ConfigOverrides::default()
        },
        ..LoadOptions::default()
    }
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard = match ENV_LOCK.get_or_init(|| Mutex::new(())).lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };

    let keys = [
        "WAYPOINT_LLM_PROVIDER",
        "WAYPOINT_LLM_API_KEY",
        "WAYPOINT_LLM_BASE_URL",
        "WAYPOINT_LLM_MODEL",
        "WAYPOINT_LLM_TIMEOUT_SECS",
        "WAYPOINT_LLM_TEMPERATURE",
        "WAYPOINT_LLM_MAX_TOKENS",
        "WAYPOINT_DATA_ORDERS_PATH",
        "WAYPOINT_DATA_CATALOG_PATH",
        "WAYPOINT_MEMORY_MAX_TURNS",
        "WAYPOINT_MEMORY_DIGEST_TURNS",
        "WAYPOINT_DIALOGUE_ORDER_REFERENCE_PHRASES",
        "WAYPOINT_DIALOGUE_PRODUCT_REFERENCE_PHRASES",
        "WAYPOINT_PROMOTION_TIMEZONE",
        "WAYPOINT_PROMOTION_START_HOUR",
        "WAYPOINT_PROMOTION_END_HOUR",
        "WAYPOINT_PROMOTION_DISCOUNT_PERCENT",
        "WAYPOINT_LOGGING_LEVEL",
        "WAYPOINT_LOGGING_FORMAT",
        "WAYPOINT_LOG_LEVEL",
        "WAYPOINT_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
