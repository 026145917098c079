use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use super::{HandlerReply, IntentHandler, TurnContext};
use crate::llm::LlmClient;
use crate::prompts::unknown_messages;

pub const CLARIFICATION_TEMPERATURE: f32 = 0.5;

const CAPABILITIES_REPLY: &str = "Hello! I'm here to help with your orders and gear. I can help \
                                  you with:\n\
                                  - **Order Status & Tracking**: check your order status and get \
                                  tracking information\n\
                                  - **Product Recommendations**: find the right outdoor gear for \
                                  your next trip\n\n\
                                  Just let me know what you need!";

/// Replies to messages no other handler claims.
pub struct FallbackHandler {
    llm: Arc<dyn LlmClient>,
}

impl FallbackHandler {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl IntentHandler for FallbackHandler {
    fn name(&self) -> &'static str {
        "clarification"
    }

    async fn handle(&mut self, turn: &TurnContext<'_>) -> HandlerReply {
        if !self.llm.is_available() {
            return HandlerReply::plain(CAPABILITIES_REPLY);
        }

        let messages = unknown_messages(turn.query, turn.context);
        match self.llm.complete(&messages, CLARIFICATION_TEMPERATURE).await {
            Ok(answer) if !answer.trim().is_empty() => HandlerReply::plain(answer.trim()),
            Ok(_) => HandlerReply::plain(CAPABILITIES_REPLY),
            Err(error) => {
                warn!(
                    event_name = "clarification.model.failed",
                    provider = self.llm.provider(),
                    error = %error,
                    "using static capabilities reply"
                );
                HandlerReply::plain(CAPABILITIES_REPLY)
            }
        }
    }
}
