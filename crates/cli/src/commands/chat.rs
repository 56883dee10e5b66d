use hostline_core::domain::call::CallSid;
use hostline_db::{connect_with_config, migrations};
use serde::Serialize;

use crate::commands::{prepare, CommandResult};

pub const DEFAULT_CALL_SID: &str = "CA-cli-chat";

#[derive(Debug, Serialize)]
struct ChatTurn {
    caller: String,
    agent: String,
    tools: Vec<String>,
    ends_call: bool,
}

#[derive(Debug, Serialize)]
struct ChatTranscript {
    command: &'static str,
    status: &'static str,
    call_sid: String,
    provider: &'static str,
    turns: Vec<ChatTurn>,
}

/// Sends each message through the configured agent as one call, stopping at a farewell.
pub fn run(messages: &[String], call_sid: &str) -> CommandResult {
    let (config, runtime) = match prepare("chat") {
        Ok(prepared) => prepared,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = connect_with_config(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;

        let agent = hostline_agent::build_runtime(&config, pool.clone(), None)
            .map_err(|error| ("agent_setup", format!("{error:#}"), 7u8))?;
        let mut session = agent
            .open_session(CallSid(call_sid.to_string()), None, None)
            .map_err(|error| ("agent_setup", format!("{error:#}"), 7u8))?;

        let mut turns = Vec::with_capacity(messages.len());
        for message in messages {
            let actions_before = session.record.actions.len();
            let reply = agent.respond(&mut session, message).await;
            let tools = session.record.actions[actions_before..]
                .iter()
                .map(|action| action.tool_name.clone())
                .collect();
            let ends_call = reply.ends_call;
            turns.push(ChatTurn { caller: message.clone(), agent: reply.text, tools, ends_call });
            if ends_call {
                break;
            }
        }

        pool.close().await;
        Ok::<_, (&'static str, String, u8)>(ChatTranscript {
            command: "chat",
            status: "ok",
            call_sid: call_sid.to_string(),
            provider: agent.llm().provider(),
            turns,
        })
    });

    match result {
        Ok(transcript) => match serde_json::to_string(&transcript) {
            Ok(output) => CommandResult { exit_code: 0, output },
            Err(error) => CommandResult::failure("chat", "serialization", error.to_string(), 1),
        },
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("chat", error_class, message, exit_code)
        }
    }
}
