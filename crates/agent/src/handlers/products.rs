use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::{info, warn};
use waypoint_core::{EntityField, KeyInfo, Product, ProductCatalog};

use super::{HandlerReply, IntentHandler, TurnContext};
use crate::llm::LlmClient;
use crate::prompts::product_messages;

const LISTING_LIMIT: usize = 3;

const NO_MATCH_REPLY: &str = "I couldn't find any products matching your request. Could you \
                              describe what type of outdoor gear you're looking for? We carry \
                              backpacks, skis, and other adventure essentials.";

pub struct ProductHandler {
    catalog: Arc<ProductCatalog>,
    llm: Arc<dyn LlmClient>,
    temperature: f32,
}

/// The products chosen for a turn and the request the model should answer about them.
struct Selection<'a> {
    products: Vec<&'a Product>,
    request: String,
    origin: &'static str,
}

impl ProductHandler {
    pub fn new(catalog: Arc<ProductCatalog>, llm: Arc<dyn LlmClient>, temperature: f32) -> Self {
        Self { catalog, llm, temperature }
    }

    /// Explicit SKUs first, then products from an earlier turn the customer
    /// refers to, then a keyword search.
    fn select<'a>(catalog: &'a ProductCatalog, turn: &TurnContext<'_>) -> Selection<'a> {
        if let Some(skus) = turn.entities.list(EntityField::Sku).filter(|skus| !skus.is_empty()) {
            let products = catalog.by_skus(skus);
            if !products.is_empty() {
                return Selection {
                    products,
                    request: format!(
                        "The customer is asking about the product with SKU {}. Please provide \
                         detailed information about this specific product.",
                        skus.join(", ")
                    ),
                    origin: "sku",
                };
            }
        }

        if let Some(skus) = turn.entities.list(EntityField::ReferencedProducts) {
            let products = catalog.by_skus(skus);
            if !products.is_empty() {
                return Selection {
                    products,
                    request: format!(
                        "The customer is asking about these products from their recent order or \
                         previous inquiry: {}. Please provide detailed information about these \
                         products.",
                        turn.query
                    ),
                    origin: "conversation",
                };
            }
        }

        Selection {
            products: catalog.search(turn.query),
            request: turn.query.to_string(),
            origin: "search",
        }
    }

    async fn describe(&self, selection: &Selection<'_>) -> Option<String> {
        if !self.llm.is_available() {
            return None;
        }

        let products = selection
            .products
            .iter()
            .map(|product| {
                json!({
                    "name": product.product_name,
                    "sku": product.sku,
                    "description": product.description,
                    "inventory": product.inventory,
                    "tags": product.tags,
                })
            })
            .collect::<Vec<_>>();
        let products_json = match serde_json::to_string_pretty(&products) {
            Ok(products_json) => products_json,
            Err(error) => {
                warn!(
                    event_name = "products.serialize.failed",
                    error = %error,
                    "product listing not serializable"
                );
                return None;
            }
        };

        let messages = product_messages(&selection.request, &products_json);
        match self.llm.complete(&messages, self.temperature).await {
            Ok(answer) if !answer.trim().is_empty() => Some(answer.trim().to_string()),
            Ok(_) => None,
            Err(error) => {
                warn!(
                    event_name = "products.model.failed",
                    provider = self.llm.provider(),
                    error = %error,
                    "falling back to plain product listing"
                );
                None
            }
        }
    }
}

#[async_trait]
impl IntentHandler for ProductHandler {
    fn name(&self) -> &'static str {
        "product_recommendation"
    }

    async fn handle(&mut self, turn: &TurnContext<'_>) -> HandlerReply {
        let catalog = Arc::clone(&self.catalog);
        let selection = Self::select(&catalog, turn);
        if selection.products.is_empty() {
            return HandlerReply::plain(NO_MATCH_REPLY);
        }

        info!(
            event_name = "products.selected",
            origin = selection.origin,
            count = selection.products.len(),
            "products selected"
        );

        let (text, shown) = match self.describe(&selection).await {
            Some(text) => (text, selection.products.as_slice()),
            None => {
                let shown = &selection.products[..selection.products.len().min(LISTING_LIMIT)];
                (listing(shown), shown)
            }
        };
        let skus = shown.iter().map(|product| product.sku.clone()).collect();
        HandlerReply::with_key_info(text, KeyInfo::products_mentioned(skus))
    }
}

fn listing(products: &[&Product]) -> String {
    let mut text = String::from("Here are some products I found for you:\n\n");
    for (position, product) in products.iter().enumerate() {
        text.push_str(&format!(
            "{}. **{}** (SKU: {})\n   {}\n   In Stock: {} units\n\n",
            position + 1,
            product.product_name,
            product.sku,
            product.description,
            product.inventory
        ));
    }
    text.trim_end().to_string()
}
