use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::info;
use waypoint_agent::ConversationSession;
use waypoint_core::config::LoadOptions;

use crate::commands::{async_runtime, prepare, CommandResult};

const EXIT_WORDS: [&str; 4] = ["quit", "exit", "bye", "q"];
const HELP_WORDS: [&str; 3] = ["help", "h", "?"];

const BANNER: &str = "Waypoint support assistant. Type `help` for examples, `quit` to leave.\n\n";

const HELP: &str = "Things you can ask:\n\
                    - Check order #W001 for john.doe@example.com\n\
                    - I need a lightweight backpack for hiking\n\
                    - Tell me about SOBP001\n\
                    - Can I get the Early Risers discount?\n\
                    - Who are you?\n\n";

const FAREWELL: &str = "Thanks for stopping by. Goodbye!\n";

/// Exit code when reading stdin or writing stdout fails mid-conversation.
pub const EXIT_TERMINAL_IO: u8 = 5;

pub fn run(options: LoadOptions) -> CommandResult {
    let runtime = match prepare("chat", options) {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };
    let executor = match async_runtime("chat") {
        Ok(executor) => executor,
        Err(result) => return result,
    };

    let outcome = executor.block_on(async {
        let mut session = runtime.open_session();
        let session_id = session.id();
        let stdin = BufReader::new(tokio::io::stdin());
        let result = tokio::select! {
            result = converse(&mut session, stdin, tokio::io::stdout()) => result,
            _ = tokio::signal::ctrl_c() => Ok(0),
        };
        info!(event_name = "chat.closed", session_id = %session_id, "chat session closed");
        result
    });

    finish(outcome)
}

fn finish(outcome: std::io::Result<usize>) -> CommandResult {
    match outcome {
        Ok(_) => CommandResult::silent(0),
        Err(error) => CommandResult::failure(
            "chat",
            "io",
            format!("terminal I/O failed: {error}"),
            EXIT_TERMINAL_IO,
        ),
    }
}

/// Reads one message per line until an exit word or end of input. Returns
/// the number of messages the session handled.
pub async fn converse<R, W>(
    session: &mut ConversationSession,
    reader: R,
    mut writer: W,
) -> std::io::Result<usize>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    writer.write_all(BANNER.as_bytes()).await?;
    let mut lines = reader.lines();
    let mut handled = 0;

    loop {
        writer.write_all(b"you> ").await?;
        writer.flush().await?;

        let Some(line) = lines.next_line().await? else {
            writer.write_all(b"\n").await?;
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        let command = input.to_ascii_lowercase();
        if EXIT_WORDS.contains(&command.as_str()) {
            writer.write_all(FAREWELL.as_bytes()).await?;
            break;
        }
        if HELP_WORDS.contains(&command.as_str()) {
            writer.write_all(HELP.as_bytes()).await?;
            continue;
        }

        let reply = session.handle_message(input).await;
        handled += 1;
        writer.write_all(format!("assistant> {}\n\n", reply.text).as_bytes()).await?;
    }

    writer.flush().await?;
    Ok(handled)
}

#[cfg(test)]
mod tests {
    use std::io::{Error, ErrorKind};

    use super::{finish, EXIT_TERMINAL_IO};

    #[test]
    fn terminal_failures_exit_with_the_io_code() {
        let result = finish(Err(Error::new(ErrorKind::BrokenPipe, "stdout closed")));
        assert_eq!(result.exit_code, EXIT_TERMINAL_IO);

        let payload: serde_json::Value = serde_json::from_str(&result.output).expect("json");
        assert_eq!(payload["error_class"], "io");
        assert!(payload["message"].as_str().unwrap_or_default().contains("stdout closed"));
    }

    #[test]
    fn finished_conversations_print_nothing() {
        let result = finish(Ok(3));
        assert_eq!(result.exit_code, 0);
        assert!(result.output.is_empty());
    }
}
