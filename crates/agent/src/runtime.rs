use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;
use waypoint_core::{
    AppConfig, ApplicationError, ConfigError, ContextualInfo, ConversationMemory, CustomerEmail,
    EntityResolver, InMemoryOrderBook, Intent, OrderBook, OrderNumber, ProductCatalog,
    ReferenceMatcher,
};

use crate::handlers::{
    Clock, FallbackHandler, HandlerRegistry, HandlerReply, InMemoryPromoCodeStore,
    IntroductionHandler, OrderStatusHandler, ProductHandler, PromoCodeStore, PromotionHandler,
    PromotionWindow, SystemClock, TurnContext,
};
use crate::llm::{client_from_config, ChatMessage, LlmClient};
use crate::prompts::{consolidation_messages, supervisor_messages};
use crate::routing::{FreeFormExtractor, IntentRouter, LlmFreeFormExtractor};

const UNHANDLED_REPLY: &str = "I'm not able to help with that right now.";

const SUPERVISOR_TEMPERATURE: f32 = 0.0;

/// Per-session knobs derived from configuration.
#[derive(Clone, Debug)]
pub struct RuntimeSettings {
    pub matcher: ReferenceMatcher,
    pub max_turns: usize,
    pub digest_turns: usize,
    pub temperature: f32,
    pub promotion: PromotionWindow,
}

impl RuntimeSettings {
    pub fn from_config(config: &AppConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            matcher: config.dialogue.reference_matcher(),
            max_turns: config.memory.max_turns,
            digest_turns: config.memory.digest_turns,
            temperature: config.llm.temperature,
            promotion: PromotionWindow::from_config(&config.promotion)?,
        })
    }
}

/// Shared collaborators. Cheap to hold; every session gets its own memory
/// and handlers but reads the same order book, catalog, and model client.
pub struct AgentRuntime {
    llm: Arc<dyn LlmClient>,
    orders: Arc<dyn OrderBook>,
    catalog: Arc<ProductCatalog>,
    promo_codes: Arc<dyn PromoCodeStore>,
    clock: Arc<dyn Clock>,
    settings: RuntimeSettings,
}

impl AgentRuntime {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        orders: Arc<dyn OrderBook>,
        catalog: Arc<ProductCatalog>,
        settings: RuntimeSettings,
    ) -> Self {
        Self {
            llm,
            orders,
            catalog,
            promo_codes: Arc::new(InMemoryPromoCodeStore::new()),
            clock: Arc::new(SystemClock),
            settings,
        }
    }

    /// Loads the data files and builds the configured model client.
    pub fn from_config(config: &AppConfig) -> Result<Self, ApplicationError> {
        let orders = InMemoryOrderBook::from_json_file(&config.data.orders_path)?;
        let catalog = ProductCatalog::from_json_file(&config.data.catalog_path)?;
        let llm = client_from_config(&config.llm)
            .map_err(|error| ApplicationError::Integration(format!("{error:#}")))?;
        let settings = RuntimeSettings::from_config(config)?;

        info!(
            event_name = "runtime.initialized",
            provider = llm.provider(),
            orders = orders.len(),
            products = catalog.len(),
            "agent runtime ready"
        );
        Ok(Self::new(llm, Arc::new(orders), Arc::new(catalog), settings))
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_promo_codes(mut self, promo_codes: Arc<dyn PromoCodeStore>) -> Self {
        self.promo_codes = promo_codes;
        self
    }

    pub fn open_session(&self) -> ConversationSession {
        let id = Uuid::new_v4();
        let settings = &self.settings;
        let extractor: Arc<dyn FreeFormExtractor> =
            Arc::new(LlmFreeFormExtractor::new(Arc::clone(&self.llm), settings.temperature));

        let mut registry = HandlerRegistry::default();
        registry.register(
            Intent::OrderStatus,
            OrderStatusHandler::new(Arc::clone(&self.orders), extractor),
        );
        registry.register(
            Intent::ProductRecommendation,
            ProductHandler::new(
                Arc::clone(&self.catalog),
                Arc::clone(&self.llm),
                settings.temperature,
            ),
        );
        registry.register(
            Intent::EarlyRisersPromotion,
            PromotionHandler::new(
                id,
                settings.promotion,
                Arc::clone(&self.clock),
                Arc::clone(&self.promo_codes),
            ),
        );
        registry.register(Intent::WhoAreYou, IntroductionHandler::new(&settings.promotion));
        registry.register(Intent::Unknown, FallbackHandler::new(Arc::clone(&self.llm)));

        info!(event_name = "session.opened", session_id = %id, "conversation session opened");
        ConversationSession {
            id,
            memory: ConversationMemory::with_limits(
                settings.matcher.clone(),
                settings.max_turns,
                settings.digest_turns,
            ),
            registry,
            resolver: EntityResolver::new(settings.matcher.clone()),
            router: IntentRouter::new(Arc::clone(&self.llm)),
            llm: Arc::clone(&self.llm),
            temperature: settings.temperature,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TurnReply {
    pub text: String,
    pub intent: Intent,
    pub handler: String,
}

/// One customer conversation. Owns its memory and handler state; nothing
/// here is shared with other sessions.
pub struct ConversationSession {
    id: Uuid,
    memory: ConversationMemory,
    registry: HandlerRegistry,
    resolver: EntityResolver,
    router: IntentRouter,
    llm: Arc<dyn LlmClient>,
    temperature: f32,
}

impl ConversationSession {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn memory(&self) -> &ConversationMemory {
        &self.memory
    }

    /// `true` while an order lookup is waiting for the email or order number.
    pub fn has_pending_lookup(&self) -> bool {
        self.registry.has_pending_state()
    }

    /// Never fails: every collaborator failure degrades to a usable reply.
    pub async fn handle_message(&mut self, text: &str) -> TurnReply {
        let query = text.trim();
        let context = self.memory.context_for(query);

        let (intent, model_entities) = match self.router.route(query, &context).await {
            Some(route) => (route.intent, Some(route.entities)),
            None => (self.local_intent(query), None),
        };
        let routed_by = if model_entities.is_some() { "model" } else { "local" };

        let entities =
            self.resolver.resolve(query, model_entities.as_ref(), self.memory.snapshot());
        let turn = TurnContext { query, entities: &entities, context: &context };
        let (handler, reply) = match self.registry.get_mut(intent) {
            Some(handler) => (handler.name(), handler.handle(&turn).await),
            None => {
                warn!(
                    event_name = "session.handler.missing",
                    intent = %intent,
                    "no handler registered"
                );
                ("none", HandlerReply::plain(UNHANDLED_REPLY))
            }
        };

        let final_text = self.finalize(query, intent, reply.text, &context).await;

        info!(
            event_name = "session.turn.handled",
            session_id = %self.id,
            intent = %intent,
            routed_by,
            handler,
            entities = %entities,
            "turn handled"
        );
        self.memory.record(intent, query, entities, handler, reply.key_info);

        TurnReply { text: final_text, intent, handler: handler.to_string() }
    }

    /// Phrases the handler's draft in the store's voice, then has the model
    /// review it. A failed consolidation returns the draft untouched and skips
    /// review; a failed review keeps the consolidated text. Clarification
    /// replies are already model-written and only get the review.
    async fn finalize(
        &self,
        query: &str,
        intent: Intent,
        draft: String,
        context: &ContextualInfo,
    ) -> String {
        if !self.llm.is_available() {
            return draft;
        }

        let consolidated = if intent == Intent::Unknown {
            draft
        } else {
            let messages = consolidation_messages(query, intent, &draft, context);
            match self.rewrite("consolidation", &messages, self.temperature).await {
                Some(text) => text,
                None => return draft,
            }
        };

        let messages = supervisor_messages(query, &consolidated);
        self.rewrite("supervisor", &messages, SUPERVISOR_TEMPERATURE).await.unwrap_or(consolidated)
    }

    async fn rewrite(
        &self,
        stage: &'static str,
        messages: &[ChatMessage],
        temperature: f32,
    ) -> Option<String> {
        match self.llm.complete(messages, temperature).await {
            Ok(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
            Ok(_) => {
                warn!(
                    event_name = "session.reply.stage_empty",
                    session_id = %self.id,
                    stage,
                    "model returned an empty reply, keeping previous text"
                );
                None
            }
            Err(error) => {
                warn!(
                    event_name = "session.reply.stage_failed",
                    session_id = %self.id,
                    stage,
                    provider = self.llm.provider(),
                    error = %error,
                    "keeping previous reply text"
                );
                None
            }
        }
    }

    /// Routing without a model: order-shaped input, or an order lookup already
    /// in progress, stays with order status.
    fn local_intent(&self, query: &str) -> Intent {
        let order_shaped =
            CustomerEmail::find_in(query).is_some() || OrderNumber::find_in(query).is_some();
        if order_shaped || self.registry.has_pending_state() {
            Intent::OrderStatus
        } else {
            Intent::Unknown
        }
    }
}
