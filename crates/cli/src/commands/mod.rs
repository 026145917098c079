pub mod ask;
pub mod chat;
pub mod config;
pub mod doctor;

use serde::Serialize;
use waypoint_agent::AgentRuntime;
use waypoint_core::config::{AppConfig, LoadOptions};
use waypoint_core::InterfaceError;

use crate::logging;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
}

impl CommandResult {
    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
        };
        Self { exit_code, output: serialize_payload(payload) }
    }

    /// Interactive output was already written; nothing left to print.
    pub fn silent(exit_code: u8) -> Self {
        Self { exit_code, output: String::new() }
    }

    fn from_interface_error(command: &str, error: InterfaceError, exit_code: u8) -> Self {
        let message = format!("{} ({error})", error.user_message());
        Self::failure(command, error.error_class(), message, exit_code)
    }
}

/// Config load, logging, and runtime construction shared by the
/// conversational commands. Failures come back as ready-to-print results.
pub(crate) fn prepare(command: &str, options: LoadOptions) -> Result<AgentRuntime, CommandResult> {
    let config = load_config(command, options)?;
    logging::init(&config.logging);

    AgentRuntime::from_config(&config).map_err(|error| {
        CommandResult::from_interface_error(command, error.into_interface(command), 4)
    })
}

pub(crate) fn load_config(command: &str, options: LoadOptions) -> Result<AppConfig, CommandResult> {
    AppConfig::load(options).map_err(|error| {
        CommandResult::failure(
            command,
            "config_validation",
            format!("configuration issue: {error}"),
            2,
        )
    })
}

pub(crate) fn async_runtime(command: &str) -> Result<tokio::runtime::Runtime, CommandResult> {
    tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(|error| {
        CommandResult::failure(
            command,
            "runtime_init",
            format!("failed to initialize async runtime: {error}"),
            3,
        )
    })
}

pub(crate) fn serialize_payload<T: Serialize>(payload: T) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}
