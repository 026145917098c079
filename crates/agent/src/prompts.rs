use waypoint_core::{ContextualInfo, Intent};

use crate::llm::ChatMessage;

const ROUTING_INSTRUCTIONS: &str = "You route customer messages for an online outdoor gear store.
Classify the message into exactly one intent:
- ORDER_STATUS: questions about an existing order, its status, shipping, or tracking
- PRODUCT_RECOMMENDATION: questions about products, gear suggestions, or a specific SKU
- EARLY_RISERS_PROMOTION: requests for the Early Risers discount or promotion code
- WHO_ARE_YOU: questions about who or what the assistant is
- UNKNOWN: anything else

Extract any of these entities that appear in the message:
- Email: the customer's email address
- OrderNumber: an order number such as #W001
- SKU: product SKUs such as SOBP001
- ProductName: a product the customer names

Reply with JSON only, no prose:
{\"intent\": \"<INTENT>\", \"entities\": {\"Email\": \"...\", \"OrderNumber\": \"...\"}}
Leave out entities that are not present.";

const ORDER_EXTRACTION_INSTRUCTIONS: &str = "Extract the customer's email address and order number from the message.
Order numbers start with W, for example #W001.
Reply with JSON only: {\"email\": \"<email or null>\", \"order_number\": \"<order number or null>\"}";

const PRODUCT_INSTRUCTIONS: &str = "You are a helpful product specialist for an online outdoor gear store.
Recommend only from the products listed below. Mention each product's name and SKU,
explain briefly why it fits the request, and note stock levels when they are low.
Keep the answer short and friendly.";

const UNKNOWN_INSTRUCTIONS: &str = "You are the customer support assistant of an online outdoor gear store.
You can check order status and tracking, recommend products, and hand out the Early Risers
promotion code during its morning window. The customer's message does not match any of these.
Reply briefly and politely, say what you can help with, and invite them to rephrase.
Never invent order details, prices, or policies.";

const CONSOLIDATION_INSTRUCTIONS: &str = "You are the customer support assistant of an online outdoor gear store.
Turn the draft reply below into the final message for the customer, in a warm and concise voice.
Keep every fact from the draft exactly as written: names, order numbers, statuses, links,
SKUs, stock counts, and promotion codes. Do not add facts that are not in the draft.
Reply with the final message only.";

const SUPERVISOR_INSTRUCTIONS: &str = "You review replies from the customer support assistant of an online outdoor gear store
before they are sent. Return the reply unchanged when it is polite, on topic, and answers the
customer's message. Otherwise correct it: remove promises about refunds, discounts, or delivery
dates the reply does not already state, and remove anything unrelated to the store.
Never change order numbers, links, SKUs, or promotion codes.
Reply with the final message only, without commentary.";

pub fn routing_messages(query: &str, context: &ContextualInfo) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(ROUTING_INSTRUCTIONS),
        ChatMessage::user(with_context(format!("Customer message: {query}"), context)),
    ]
}

pub fn order_extraction_messages(query: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(ORDER_EXTRACTION_INSTRUCTIONS),
        ChatMessage::user(format!("Customer message: {query}")),
    ]
}

/// `products_json` is the serialized candidate list the model may draw from.
pub fn product_messages(request: &str, products_json: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(PRODUCT_INSTRUCTIONS),
        ChatMessage::user(format!(
            "Customer request: {request}\n\nAvailable products:\n{products_json}"
        )),
    ]
}

pub fn unknown_messages(query: &str, context: &ContextualInfo) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(UNKNOWN_INSTRUCTIONS),
        ChatMessage::user(with_context(format!("Customer message: {query}"), context)),
    ]
}

/// `draft` is the handler's reply; the model may only rephrase it.
pub fn consolidation_messages(
    query: &str,
    intent: Intent,
    draft: &str,
    context: &ContextualInfo,
) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(CONSOLIDATION_INSTRUCTIONS),
        ChatMessage::user(with_context(
            format!("Customer message: {query}\nTopic: {intent}\n\nDraft reply:\n{draft}"),
            context,
        )),
    ]
}

pub fn supervisor_messages(query: &str, reply: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(SUPERVISOR_INSTRUCTIONS),
        ChatMessage::user(format!("Customer message: {query}\n\nReply to review:\n{reply}")),
    ]
}

fn with_context(mut prompt: String, context: &ContextualInfo) -> String {
    let block = context.to_prompt_block();
    if !block.is_empty() {
        prompt.push_str("\n\nConversation context:\n");
        prompt.push_str(&block);
    }
    prompt
}
