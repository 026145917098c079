//! Bounded per-session conversation memory.
//!
//! History keeps the most recent turns, evicting the oldest first. The
//! [`ContextSnapshot`] is updated from each new turn alone, so a snapshot value
//! stays readable after the turn that produced it has been evicted, until a
//! later relevant turn overwrites it.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::domain::intent::Intent;
use crate::domain::order::OrderSummary;
use crate::entities::{EntityField, ResolvedEntities};
use crate::reference::ReferenceMatcher;

pub const DEFAULT_MAX_TURNS: usize = 5;
pub const DEFAULT_DIGEST_TURNS: usize = 3;

/// Task-specific facts a handler derived while answering a turn.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_order: Option<OrderSummary>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub products_mentioned: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_code: Option<String>,
}

impl KeyInfo {
    pub fn completed_order(order: OrderSummary) -> Self {
        Self { completed_order: Some(order), ..Self::default() }
    }

    pub fn products_mentioned(skus: Vec<String>) -> Self {
        Self { products_mentioned: skus, ..Self::default() }
    }

    pub fn generated_code(code: impl Into<String>) -> Self {
        Self { generated_code: Some(code.into()), ..Self::default() }
    }

    pub fn is_empty(&self) -> bool {
        self.completed_order.is_none()
            && self.products_mentioned.is_empty()
            && self.generated_code.is_none()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnRecord {
    pub timestamp: DateTime<Utc>,
    pub intent: Intent,
    pub query: String,
    pub entities: ResolvedEntities,
    pub handler: String,
    pub key_info: KeyInfo,
}

impl TurnRecord {
    /// One digest line for this turn, or `None` when it left nothing worth repeating.
    fn digest_line(&self) -> Option<String> {
        let mut parts = Vec::new();
        match self.intent {
            Intent::OrderStatus => {
                if let Some(order) = &self.key_info.completed_order {
                    parts.push(format!(
                        "Looked up order {} with products [{}]",
                        order.order_number,
                        order.products.join(", ")
                    ));
                }
            }
            Intent::ProductRecommendation => parts.push(format!(
                "Provided product recommendations about [{}]",
                self.key_info.products_mentioned.join(", ")
            )),
            Intent::EarlyRisersPromotion => parts.push(format!(
                "Provided Early Risers promotion code {}",
                self.key_info.generated_code.as_deref().unwrap_or("(none issued)")
            )),
            Intent::WhoAreYou => {
                parts.push("Provided a brief introduction of the store".to_string())
            }
            Intent::Unknown => parts.push(
                "No relevant intent was detected, asked the customer to clarify".to_string(),
            ),
        }
        if !self.entities.is_empty() {
            parts.push(format!("Entities extracted from the query: {}", self.entities));
        }
        (!parts.is_empty()).then(|| parts.join("; "))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastOrderLookup {
    #[serde(flatten)]
    pub order: OrderSummary,
    pub last_checked: DateTime<Utc>,
}

/// Latest-known values derived from the conversation, keyed by category.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_identity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_task_result: Option<LastOrderLookup>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recent_reference_items: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_generated_code: Option<String>,
}

impl ContextSnapshot {
    /// Applies a single new turn. Absent facts leave earlier values in place.
    fn absorb(&mut self, record: &TurnRecord) {
        if let Some(email) = record.entities.text(EntityField::Email) {
            self.customer_identity = Some(email.to_string());
        }

        match record.intent {
            Intent::OrderStatus => {
                if let Some(order) = &record.key_info.completed_order {
                    if !order.products.is_empty() {
                        self.recent_reference_items = Some(order.products.clone());
                    }
                    self.last_task_result = Some(LastOrderLookup {
                        order: order.clone(),
                        last_checked: record.timestamp,
                    });
                }
            }
            Intent::ProductRecommendation => {
                if !record.key_info.products_mentioned.is_empty() {
                    self.recent_reference_items = Some(record.key_info.products_mentioned.clone());
                }
            }
            Intent::EarlyRisersPromotion => {
                if let Some(code) = &record.key_info.generated_code {
                    self.last_generated_code = Some(code.clone());
                }
            }
            Intent::WhoAreYou | Intent::Unknown => {}
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Context relevant to one incoming query.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextualInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_task_result: Option<LastOrderLookup>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recent_reference_items: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_identity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recent_digest: Option<String>,
}

impl ContextualInfo {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Plain-text rendering appended to model prompts. Empty when there is no context.
    pub fn to_prompt_block(&self) -> String {
        let mut lines = Vec::new();
        if let Some(lookup) = &self.last_task_result {
            lines.push(format!(
                "Recently looked up order: {} for {} (status: {}, products: {})",
                lookup.order.order_number,
                lookup.order.customer_name,
                lookup.order.status,
                lookup.order.products.join(", ")
            ));
        }
        if let Some(items) = &self.recent_reference_items {
            lines.push(format!("Recently mentioned products: {}", items.join(", ")));
        }
        if let Some(email) = &self.customer_identity {
            lines.push(format!("Customer email: {email}"));
        }
        if let Some(digest) = &self.recent_digest {
            lines.push(format!("Recent activity: {digest}"));
        }
        lines.join("\n")
    }
}

#[derive(Clone, Debug)]
pub struct ConversationMemory {
    history: VecDeque<TurnRecord>,
    snapshot: ContextSnapshot,
    max_turns: usize,
    digest_turns: usize,
    matcher: ReferenceMatcher,
}

impl Default for ConversationMemory {
    fn default() -> Self {
        Self::new(ReferenceMatcher::default())
    }
}

impl ConversationMemory {
    pub fn new(matcher: ReferenceMatcher) -> Self {
        Self::with_limits(matcher, DEFAULT_MAX_TURNS, DEFAULT_DIGEST_TURNS)
    }

    /// `max_turns` below one is raised to one.
    pub fn with_limits(matcher: ReferenceMatcher, max_turns: usize, digest_turns: usize) -> Self {
        let max_turns = max_turns.max(1);
        Self {
            history: VecDeque::with_capacity(max_turns + 1),
            snapshot: ContextSnapshot::default(),
            max_turns,
            digest_turns,
            matcher,
        }
    }

    pub fn record(
        &mut self,
        intent: Intent,
        query: impl Into<String>,
        entities: ResolvedEntities,
        handler: impl Into<String>,
        key_info: KeyInfo,
    ) {
        let record = TurnRecord {
            timestamp: Utc::now(),
            intent,
            query: query.into(),
            entities,
            handler: handler.into(),
            key_info,
        };

        self.history.push_back(record);
        while self.history.len() > self.max_turns {
            if let Some(evicted) = self.history.pop_front() {
                debug!(
                    event_name = "memory.turn.evicted",
                    intent = %evicted.intent,
                    recorded_at = %evicted.timestamp,
                    "oldest turn evicted"
                );
            }
        }

        if let Some(latest) = self.history.back() {
            self.snapshot.absorb(latest);
            info!(
                event_name = "memory.turn.recorded",
                intent = %latest.intent,
                handler = %latest.handler,
                history_len = self.history.len(),
                "turn recorded"
            );
        }
    }

    pub fn context_for(&self, query: &str) -> ContextualInfo {
        let last_task_result = if self.matcher.is_order_reference(query) {
            self.snapshot.last_task_result.clone()
        } else {
            None
        };
        let recent_reference_items = if self.matcher.is_product_reference(query) {
            self.snapshot.recent_reference_items.clone()
        } else {
            None
        };

        ContextualInfo {
            last_task_result,
            recent_reference_items,
            customer_identity: self.snapshot.customer_identity.clone(),
            recent_digest: self.digest(),
        }
    }

    /// Digest of the last `digest_turns` records, lines joined with `"; "`.
    pub fn digest(&self) -> Option<String> {
        let skip = self.history.len().saturating_sub(self.digest_turns);
        let lines = self
            .history
            .iter()
            .skip(skip)
            .filter_map(TurnRecord::digest_line)
            .collect::<Vec<_>>();
        (!lines.is_empty()).then(|| lines.join("; "))
    }

    pub fn full_context(&self) -> (&ContextSnapshot, &VecDeque<TurnRecord>) {
        (&self.snapshot, &self.history)
    }

    pub fn snapshot(&self) -> &ContextSnapshot {
        &self.snapshot
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn max_turns(&self) -> usize {
        self.max_turns
    }

    pub fn reset(&mut self) {
        self.history.clear();
        self.snapshot = ContextSnapshot::default();
        info!(event_name = "memory.reset", "conversation memory cleared");
    }

    /// Snapshot and history as JSON, for inspection.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "context": self.snapshot,
            "recent_interactions": self.history,
        })
    }
}
