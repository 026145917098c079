use serde::Serialize;
use waypoint_agent::{client_from_config, LlmClient};
use waypoint_core::config::{AppConfig, LlmProvider, LoadOptions};
use waypoint_core::{InMemoryOrderBook, ProductCatalog};

use crate::commands::CommandResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

impl DoctorCheck {
    fn pass(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Pass, details: details.into() }
    }

    fn fail(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Fail, details: details.into() }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

const DEPENDENT_CHECKS: [&str; 4] =
    ["order_data", "catalog_data", "promotion_window", "llm_client"];

pub fn run(options: LoadOptions, json_output: bool) -> CommandResult {
    let report = build_report(options);
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { 1 };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

fn build_report(options: LoadOptions) -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(options) {
        Ok(config) => {
            checks.push(DoctorCheck::pass(
                "config_validation",
                "configuration loaded and validated",
            ));
            checks.push(check_order_data(&config));
            checks.push(check_catalog_data(&config));
            checks.push(check_promotion_window(&config));
            checks.push(check_llm_client(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck::fail("config_validation", error.to_string()));
            checks.extend(DEPENDENT_CHECKS.into_iter().map(|name| DoctorCheck {
                name,
                status: CheckStatus::Skipped,
                details: "skipped because configuration did not load".to_string(),
            }));
        }
    }

    let healthy = checks.iter().all(|check| check.status != CheckStatus::Fail);
    let overall_status = if healthy { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if healthy {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_order_data(config: &AppConfig) -> DoctorCheck {
    match InMemoryOrderBook::from_json_file(&config.data.orders_path) {
        Ok(orders) if orders.is_empty() => DoctorCheck::fail(
            "order_data",
            format!("`{}` contains no orders", config.data.orders_path.display()),
        ),
        Ok(orders) => DoctorCheck::pass(
            "order_data",
            format!("loaded {} orders from `{}`", orders.len(), config.data.orders_path.display()),
        ),
        Err(error) => DoctorCheck::fail("order_data", error.to_string()),
    }
}

fn check_catalog_data(config: &AppConfig) -> DoctorCheck {
    match ProductCatalog::from_json_file(&config.data.catalog_path) {
        Ok(catalog) if catalog.is_empty() => DoctorCheck::fail(
            "catalog_data",
            format!("`{}` contains no products", config.data.catalog_path.display()),
        ),
        Ok(catalog) => DoctorCheck::pass(
            "catalog_data",
            format!(
                "loaded {} products from `{}`",
                catalog.len(),
                config.data.catalog_path.display()
            ),
        ),
        Err(error) => DoctorCheck::fail("catalog_data", error.to_string()),
    }
}

fn check_promotion_window(config: &AppConfig) -> DoctorCheck {
    let promotion = &config.promotion;
    match promotion.time_zone() {
        Ok(zone) => DoctorCheck::pass(
            "promotion_window",
            format!(
                "{:02}:00 to {:02}:00 {zone}, {}% discount",
                promotion.start_hour, promotion.end_hour, promotion.discount_percent
            ),
        ),
        Err(error) => DoctorCheck::fail("promotion_window", error.to_string()),
    }
}

/// Builds the client only; no request is sent to the provider.
fn check_llm_client(config: &AppConfig) -> DoctorCheck {
    if config.llm.provider == LlmProvider::Disabled {
        return DoctorCheck {
            name: "llm_client",
            status: CheckStatus::Skipped,
            details: "provider disabled; replies use keyword routing and canned text".to_string(),
        };
    }

    match client_from_config(&config.llm) {
        Ok(client) => DoctorCheck::pass(
            "llm_client",
            format!("{} client ready for model `{}`", client.provider(), config.llm.model),
        ),
        Err(error) => DoctorCheck::fail("llm_client", format!("{error:#}")),
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
