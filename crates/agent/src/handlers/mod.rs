//! One handler per intent. Each session owns its own registry, so handler
//! state (pending order-status slots in particular) never crosses sessions.

pub mod fallback;
pub mod introduction;
pub mod order_status;
pub mod products;
pub mod promotion;

use std::collections::HashMap;

use async_trait::async_trait;
use waypoint_core::{ContextualInfo, Intent, KeyInfo, ResolvedEntities};

pub use fallback::FallbackHandler;
pub use introduction::IntroductionHandler;
pub use order_status::OrderStatusHandler;
pub use products::ProductHandler;
pub use promotion::{
    Clock, FixedClock, InMemoryPromoCodeStore, PromoCodeStore, PromotionHandler, PromotionWindow,
    SystemClock,
};

/// Everything a handler may read about the current turn.
#[derive(Clone, Copy, Debug)]
pub struct TurnContext<'a> {
    pub query: &'a str,
    pub entities: &'a ResolvedEntities,
    pub context: &'a ContextualInfo,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HandlerReply {
    pub text: String,
    pub key_info: KeyInfo,
}

impl HandlerReply {
    pub fn plain(text: impl Into<String>) -> Self {
        Self { text: text.into(), key_info: KeyInfo::default() }
    }

    pub fn with_key_info(text: impl Into<String>, key_info: KeyInfo) -> Self {
        Self { text: text.into(), key_info }
    }
}

#[async_trait]
pub trait IntentHandler: Send {
    fn name(&self) -> &'static str;

    /// `true` while the handler is mid-dialogue and expects a follow-up.
    fn has_pending_state(&self) -> bool {
        false
    }

    async fn handle(&mut self, turn: &TurnContext<'_>) -> HandlerReply;
}

#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<Intent, Box<dyn IntentHandler>>,
}

impl HandlerRegistry {
    pub fn register<H>(&mut self, intent: Intent, handler: H)
    where
        H: IntentHandler + 'static,
    {
        self.handlers.insert(intent, Box::new(handler));
    }

    pub fn get_mut(&mut self, intent: Intent) -> Option<&mut (dyn IntentHandler + 'static)> {
        self.handlers.get_mut(&intent).map(|handler| handler.as_mut())
    }

    pub fn has_pending_state(&self) -> bool {
        self.handlers.values().any(|handler| handler.has_pending_state())
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use waypoint_core::{ContextualInfo, Intent, ResolvedEntities};

    use super::{HandlerRegistry, HandlerReply, IntentHandler, TurnContext};

    struct Echo {
        calls: usize,
    }

    #[async_trait]
    impl IntentHandler for Echo {
        fn name(&self) -> &'static str {
            "echo"
        }

        fn has_pending_state(&self) -> bool {
            self.calls > 0
        }

        async fn handle(&mut self, turn: &TurnContext<'_>) -> HandlerReply {
            self.calls += 1;
            HandlerReply::plain(turn.query)
        }
    }

    #[tokio::test]
    async fn registry_dispatches_by_intent_and_reports_pending_state() {
        let mut registry = HandlerRegistry::default();
        assert!(registry.is_empty());
        registry.register(Intent::WhoAreYou, Echo { calls: 0 });
        assert_eq!(registry.len(), 1);
        assert!(!registry.has_pending_state());

        let entities = ResolvedEntities::new();
        let context = ContextualInfo::default();
        let turn = TurnContext { query: "hello", entities: &entities, context: &context };

        let handler = registry.get_mut(Intent::WhoAreYou).expect("registered");
        assert_eq!(handler.name(), "echo");
        assert_eq!(handler.handle(&turn).await.text, "hello");
        assert!(registry.has_pending_state());
        assert!(registry.get_mut(Intent::OrderStatus).is_none());
    }
}
