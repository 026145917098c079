use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{debug, warn};
use waypoint_core::ContextualInfo;

use crate::llm::LlmClient;
use crate::parsing::{parse_json_object, parse_route_response, RouteResponse};
use crate::prompts::{order_extraction_messages, routing_messages};

pub const ROUTING_TEMPERATURE: f32 = 0.1;

/// Asks the model for an intent and entities. `None` means routing is
/// unavailable for this turn: the model failed, is disabled, or answered
/// with nothing parseable.
pub struct IntentRouter {
    llm: Arc<dyn LlmClient>,
}

impl IntentRouter {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    pub async fn route(&self, query: &str, context: &ContextualInfo) -> Option<RouteResponse> {
        if !self.llm.is_available() {
            return None;
        }

        let messages = routing_messages(query, context);
        match self.llm.complete(&messages, ROUTING_TEMPERATURE).await {
            Ok(answer) => {
                let route = parse_route_response(&answer);
                if route.is_none() {
                    warn!(
                        event_name = "routing.response.unparseable",
                        provider = self.llm.provider(),
                        chars = answer.len(),
                        "routing answer had no usable intent"
                    );
                }
                route
            }
            Err(error) => {
                warn!(
                    event_name = "routing.model.failed",
                    provider = self.llm.provider(),
                    error = %error,
                    "routing model call failed"
                );
                None
            }
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FreeFormCandidates {
    pub email: Option<String>,
    pub order_number: Option<String>,
}

/// Last-chance extraction of an email and order number from free text.
/// Failures yield empty candidates.
#[async_trait]
pub trait FreeFormExtractor: Send + Sync {
    async fn extract(&self, text: &str) -> FreeFormCandidates;
}

pub struct LlmFreeFormExtractor {
    llm: Arc<dyn LlmClient>,
    temperature: f32,
}

impl LlmFreeFormExtractor {
    pub fn new(llm: Arc<dyn LlmClient>, temperature: f32) -> Self {
        Self { llm, temperature }
    }
}

#[async_trait]
impl FreeFormExtractor for LlmFreeFormExtractor {
    async fn extract(&self, text: &str) -> FreeFormCandidates {
        if !self.llm.is_available() {
            return FreeFormCandidates::default();
        }

        let messages = order_extraction_messages(text);
        let answer = match self.llm.complete(&messages, self.temperature).await {
            Ok(answer) => answer,
            Err(error) => {
                warn!(
                    event_name = "extraction.model.failed",
                    provider = self.llm.provider(),
                    error = %error,
                    "free-form extraction failed"
                );
                return FreeFormCandidates::default();
            }
        };

        let Some(object) = parse_json_object(&answer) else {
            debug!(event_name = "extraction.response.unparseable", "no JSON object in answer");
            return FreeFormCandidates::default();
        };
        FreeFormCandidates {
            email: text_field(&object, "email"),
            order_number: text_field(&object, "order_number"),
        }
    }
}

/// Extractor for setups without a model.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoFreeFormExtraction;

#[async_trait]
impl FreeFormExtractor for NoFreeFormExtraction {
    async fn extract(&self, _text: &str) -> FreeFormCandidates {
        FreeFormCandidates::default()
    }
}

fn text_field(object: &Map<String, Value>, key: &str) -> Option<String> {
    object
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty() && !value.eq_ignore_ascii_case("null"))
        .map(str::to_string)
}
