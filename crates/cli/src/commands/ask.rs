use serde::Serialize;
use waypoint_agent::AgentRuntime;
use waypoint_core::config::LoadOptions;
use waypoint_core::Intent;

use crate::commands::{async_runtime, prepare, serialize_payload, CommandResult};

#[derive(Debug, Serialize)]
pub struct AskReport {
    pub command: &'static str,
    pub status: &'static str,
    pub session_id: String,
    pub turns: Vec<AskTurn>,
}

#[derive(Debug, Serialize)]
pub struct AskTurn {
    pub query: String,
    pub reply: String,
    pub intent: Intent,
    pub handler: String,
}

pub fn run(options: LoadOptions, queries: &[String]) -> CommandResult {
    let runtime = match prepare("ask", options) {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };
    let executor = match async_runtime("ask") {
        Ok(executor) => executor,
        Err(result) => return result,
    };

    let report = executor.block_on(converse(&runtime, queries));
    CommandResult { exit_code: 0, output: serialize_payload(report) }
}

/// Sends every query through a single fresh session, in order.
pub async fn converse(runtime: &AgentRuntime, queries: &[String]) -> AskReport {
    let mut session = runtime.open_session();
    let mut turns = Vec::with_capacity(queries.len());
    for query in queries {
        let reply = session.handle_message(query).await;
        turns.push(AskTurn {
            query: query.clone(),
            reply: reply.text,
            intent: reply.intent,
            handler: reply.handler,
        });
    }

    AskReport { command: "ask", status: "ok", session_id: session.id().to_string(), turns }
}
