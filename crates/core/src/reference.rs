/// Phrases suggesting the customer is talking about an order looked up earlier.
pub const DEFAULT_ORDER_REFERENCE_PHRASES: &[&str] = &[
    "that order",
    "my order",
    "the order",
    "this order",
    "those products",
    "these products",
    "the products",
    "my products",
    "what are those",
    "what are these",
    "tell me about",
    "more about",
];

/// Phrases suggesting the customer is talking about products mentioned earlier.
pub const DEFAULT_PRODUCT_REFERENCE_PHRASES: &[&str] = &[
    "those products",
    "these products",
    "the products",
    "what are those",
    "what are these",
    "tell me about them",
    "more details",
    "more info",
    "describe them",
];

/// Literal substring matcher deciding whether a query points back at earlier
/// context. Matching is done on the lower-cased query; no tokenization.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReferenceMatcher {
    order_phrases: Vec<String>,
    product_phrases: Vec<String>,
}

impl Default for ReferenceMatcher {
    fn default() -> Self {
        Self::new(
            DEFAULT_ORDER_REFERENCE_PHRASES.iter().map(|phrase| phrase.to_string()),
            DEFAULT_PRODUCT_REFERENCE_PHRASES.iter().map(|phrase| phrase.to_string()),
        )
    }
}

impl ReferenceMatcher {
    pub fn new(
        order_phrases: impl IntoIterator<Item = String>,
        product_phrases: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            order_phrases: normalize_phrases(order_phrases),
            product_phrases: normalize_phrases(product_phrases),
        }
    }

    pub fn is_order_reference(&self, text: &str) -> bool {
        contains_any(&text.to_lowercase(), &self.order_phrases)
    }

    pub fn is_product_reference(&self, text: &str) -> bool {
        contains_any(&text.to_lowercase(), &self.product_phrases)
    }
}

fn normalize_phrases(phrases: impl IntoIterator<Item = String>) -> Vec<String> {
    phrases
        .into_iter()
        .map(|phrase| phrase.trim().to_lowercase())
        .filter(|phrase| !phrase.is_empty())
        .collect()
}

fn contains_any(text: &str, phrases: &[String]) -> bool {
    phrases.iter().any(|phrase| text.contains(phrase.as_str()))
}
