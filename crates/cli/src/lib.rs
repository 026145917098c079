pub mod commands;
pub mod logging;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use waypoint_core::config::{ConfigOverrides, LoadOptions};
use waypoint_core::{LlmProvider, LogFormat};

#[derive(Debug, Parser)]
#[command(
    name = "waypoint",
    about = "Waypoint customer support assistant",
    long_about = "Talk to the order-status and product assistant, run scripted conversations, and inspect configuration.",
    after_help = "Examples:\n  waypoint chat\n  waypoint ask \"my email is john.doe@example.com\" \"W001\"\n  waypoint config\n  waypoint doctor --json"
)]
pub struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Debug, Default, Args)]
pub struct GlobalArgs {
    #[arg(long, global = true, help = "Read configuration from this file instead of waypoint.toml")]
    pub config: Option<PathBuf>,
    #[arg(long, global = true, help = "Override the log level (trace, debug, info, warn, error)")]
    pub log_level: Option<String>,
    #[arg(long, global = true, help = "Override the log format (compact, pretty, json)")]
    pub log_format: Option<LogFormat>,
    #[arg(
        long,
        global = true,
        help = "Override the model provider (disabled, openai, anthropic, ollama)"
    )]
    pub provider: Option<LlmProvider>,
    #[arg(long, global = true, help = "Override the model name")]
    pub model: Option<String>,
    #[arg(long, global = true, help = "Override the customer orders JSON file")]
    pub orders: Option<PathBuf>,
    #[arg(long, global = true, help = "Override the product catalog JSON file")]
    pub catalog: Option<PathBuf>,
}

impl GlobalArgs {
    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            config_path: self.config.clone(),
            require_file: self.config.is_some(),
            overrides: ConfigOverrides {
                log_level: self.log_level.clone(),
                log_format: self.log_format,
                llm_provider: self.provider,
                llm_model: self.model.clone(),
                orders_path: self.orders.clone(),
                catalog_path: self.catalog.clone(),
            },
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Start an interactive conversation")]
    Chat,
    #[command(about = "Send queries through one conversation and print the replies as JSON")]
    Ask {
        #[arg(required = true, help = "Messages to send, in order")]
        queries: Vec<String>,
    },
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, data files, and model client readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let options = cli.global.load_options();

    let result = match cli.command {
        Command::Chat => commands::chat::run(options),
        Command::Ask { queries } => commands::ask::run(options, &queries),
        Command::Config => commands::CommandResult {
            exit_code: 0,
            output: commands::config::run(options),
        },
        Command::Doctor { json } => commands::doctor::run(options, json),
    };

    if !result.output.is_empty() {
        println!("{}", result.output);
    }
    ExitCode::from(result.exit_code)
}
