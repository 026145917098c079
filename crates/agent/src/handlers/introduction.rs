use async_trait::async_trait;

use super::{HandlerReply, IntentHandler, PromotionWindow, TurnContext};

pub struct IntroductionHandler {
    text: String,
}

impl IntroductionHandler {
    pub fn new(promotion: &PromotionWindow) -> Self {
        let text = format!(
            "I'm the virtual assistant for our outdoor gear store. I can help you with:\n\
             - **Order status & tracking**: share your email and order number (like #W001)\n\
             - **Product recommendations**: tell me what gear you're looking for or give me a SKU\n\
             - **Early Risers promotion**: ask for a {}% discount code from {}\n\n\
             What can I do for you today?",
            promotion.discount_percent,
            promotion.describe()
        );
        Self { text }
    }
}

#[async_trait]
impl IntentHandler for IntroductionHandler {
    fn name(&self) -> &'static str {
        "introduction"
    }

    async fn handle(&mut self, _turn: &TurnContext<'_>) -> HandlerReply {
        HandlerReply::plain(self.text.clone())
    }
}
