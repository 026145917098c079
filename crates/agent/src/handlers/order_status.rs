use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;
use waypoint_core::{OrderBook, SlotDecision, SlotFillingController, TurnObservation};

use super::{HandlerReply, IntentHandler, TurnContext};
use crate::routing::FreeFormExtractor;

/// Collects an email and an order number across turns, then looks the order up.
pub struct OrderStatusHandler {
    controller: SlotFillingController<Arc<dyn OrderBook>>,
    extractor: Arc<dyn FreeFormExtractor>,
}

impl OrderStatusHandler {
    pub fn new(orders: Arc<dyn OrderBook>, extractor: Arc<dyn FreeFormExtractor>) -> Self {
        Self { controller: SlotFillingController::new(orders), extractor }
    }

    pub fn controller(&self) -> &SlotFillingController<Arc<dyn OrderBook>> {
        &self.controller
    }
}

#[async_trait]
impl IntentHandler for OrderStatusHandler {
    fn name(&self) -> &'static str {
        "order_status"
    }

    fn has_pending_state(&self) -> bool {
        !self.controller.slots().is_empty()
    }

    async fn handle(&mut self, turn: &TurnContext<'_>) -> HandlerReply {
        let observation = TurnObservation::from_entities(turn.query, turn.entities);
        let decision = match self.controller.plan(&observation) {
            SlotDecision::FreeFormFallback => {
                let candidates = self.extractor.extract(turn.query).await;
                let extracted = TurnObservation::from_candidates(
                    candidates.email.as_deref(),
                    candidates.order_number.as_deref(),
                );
                debug!(
                    event_name = "dialogue.free_form.extracted",
                    found_identity = extracted.identity.is_valid(),
                    found_reference = extracted.reference.is_valid(),
                    "free-form extraction finished"
                );
                self.controller.plan_after_fallback(&extracted.or(observation))
            }
            decision => decision,
        };

        let reply = self.controller.execute(decision);
        HandlerReply::with_key_info(reply.message(), reply.key_info())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use waypoint_core::{
        ContextSnapshot, ContextualInfo, EntityResolver, InMemoryOrderBook, Order, OrderBook,
        SlotKey,
    };

    use super::OrderStatusHandler;
    use crate::handlers::{HandlerReply, IntentHandler, TurnContext};
    use crate::routing::{FreeFormCandidates, FreeFormExtractor, NoFreeFormExtraction};

    struct FixedExtraction(FreeFormCandidates);

    #[async_trait]
    impl FreeFormExtractor for FixedExtraction {
        async fn extract(&self, _text: &str) -> FreeFormCandidates {
            self.0.clone()
        }
    }

    fn orders() -> Arc<dyn OrderBook> {
        Arc::new(InMemoryOrderBook::new(vec![Order {
            customer_name: "John Doe".to_string(),
            email: "john.doe@example.com".to_string(),
            order_number: "#W001".to_string(),
            products_ordered: vec!["SOBP001".to_string(), "SOWB004".to_string()],
            status: "delivered".to_string(),
            tracking_number: Some("TRK123456789".to_string()),
        }]))
    }

    async fn send(handler: &mut OrderStatusHandler, text: &str) -> HandlerReply {
        let entities = EntityResolver::default().resolve(text, None, &ContextSnapshot::default());
        let context = ContextualInfo::default();
        handler.handle(&TurnContext { query: text, entities: &entities, context: &context }).await
    }

    #[tokio::test]
    async fn collects_slots_across_turns_then_completes() {
        let mut handler = OrderStatusHandler::new(orders(), Arc::new(NoFreeFormExtraction));

        let first = send(&mut handler, "my email is john.doe@example.com").await;
        assert!(first.text.contains("Now I need your order number"));
        assert!(handler.has_pending_state());
        assert_eq!(
            handler.controller().slots().get(SlotKey::Identity),
            Some("john.doe@example.com")
        );

        let second = send(&mut handler, "it's W001").await;
        assert!(second.text.starts_with("Hello John Doe!"));
        assert!(second.text.contains("Track your package"));
        let summary = second.key_info.completed_order.expect("completed order");
        assert_eq!(summary.order_number, "#W001");
        assert!(!handler.has_pending_state());
    }

    #[tokio::test]
    async fn free_form_extraction_rescues_unstructured_input() {
        let extraction = FixedExtraction(FreeFormCandidates {
            email: Some("john.doe@example.com".to_string()),
            order_number: Some("#W001".to_string()),
        });
        let mut handler = OrderStatusHandler::new(orders(), Arc::new(extraction));

        let reply = send(&mut handler, "john doe at example dot com, order w zero zero one").await;
        assert!(reply.text.starts_with("Hello John Doe!"));
    }

    #[tokio::test]
    async fn empty_extraction_asks_for_both() {
        let mut handler = OrderStatusHandler::new(orders(), Arc::new(NoFreeFormExtraction));

        let reply = send(&mut handler, "where is my stuff").await;
        assert!(reply.text.contains("I need your email address and order number"));
        assert!(reply.key_info.is_empty());
        assert!(!handler.has_pending_state());
    }
}
