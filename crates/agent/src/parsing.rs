//! Lenient readers for model output. Models wrap JSON in prose or code
//! fences, so each reader tries progressively looser strategies.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};
use waypoint_core::{Intent, ModelEntities};

#[derive(Clone, Debug, PartialEq)]
pub struct RouteResponse {
    pub intent: Intent,
    pub entities: ModelEntities,
}

fn fenced_block_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").expect("fenced block regex is valid")
    })
}

fn intent_object_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r#"\{[^{}]*"intent"[^{}]*\}"#).expect("intent object regex is valid")
    })
}

fn intent_field_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r#""intent":\s*"([^"]+)""#).expect("intent field regex is valid")
    })
}

fn embedded_object_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"(?s)\{.*\}").expect("embedded object regex is valid"))
}

/// Strategies, first success wins: the whole text as a JSON object, a fenced
/// code block, an embedded flat object mentioning `"intent"`, and finally a
/// bare `"intent": "..."` field with no entities.
pub fn parse_route_response(text: &str) -> Option<RouteResponse> {
    let text = text.trim();

    if text.starts_with('{') && text.ends_with('}') {
        if let Some(object) = parse_object(text) {
            return Some(route_from_object(object));
        }
    }

    if let Some(object) = fenced_block_regex()
        .captures(text)
        .and_then(|captures| captures.get(1))
        .and_then(|block| parse_object(block.as_str()))
    {
        return Some(route_from_object(object));
    }

    if let Some(object) =
        intent_object_regex().find(text).and_then(|found| parse_object(found.as_str()))
    {
        return Some(route_from_object(object));
    }

    intent_field_regex().captures(text).and_then(|captures| captures.get(1)).map(|label| {
        RouteResponse { intent: Intent::from_label(label.as_str()), entities: ModelEntities::new() }
    })
}

/// The whole text as a JSON object, else the outermost `{...}` span inside it.
pub fn parse_json_object(text: &str) -> Option<Map<String, Value>> {
    let text = text.trim();
    parse_object(text).or_else(|| {
        embedded_object_regex().find(text).and_then(|found| parse_object(found.as_str()))
    })
}

fn parse_object(text: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(object)) => Some(object),
        _ => None,
    }
}

fn route_from_object(mut object: Map<String, Value>) -> RouteResponse {
    let intent = object
        .get("intent")
        .and_then(Value::as_str)
        .map(Intent::from_label)
        .unwrap_or(Intent::Unknown);
    let entities = match object.remove("entities") {
        Some(Value::Object(entities)) => entities,
        _ => ModelEntities::new(),
    };
    RouteResponse { intent, entities }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use waypoint_core::Intent;

    use super::{parse_json_object, parse_route_response};

    #[test]
    fn reads_a_bare_json_object() {
        let text = r##"{"intent": "ORDER_STATUS", "entities": {"email": "a@b.com", "order": "#W001"}}"##;
        let route = parse_route_response(text).expect("route");
        assert_eq!(route.intent, Intent::OrderStatus);
        assert_eq!(route.entities.get("email"), Some(&json!("a@b.com")));
    }

    #[test]
    fn reads_a_fenced_block_inside_prose() {
        let text = "Sure! Here is the routing:\n```json\n\
                    {\"intent\": \"PRODUCT_RECOMMENDATION\", \"entities\": {\"SKU\": \"SOBP001\"}}\n\
                    ```\nLet me know.";
        let route = parse_route_response(text).expect("route");
        assert_eq!(route.intent, Intent::ProductRecommendation);
        assert_eq!(route.entities.get("SKU"), Some(&json!("SOBP001")));
    }

    #[test]
    fn reads_an_embedded_flat_object() {
        let text = r#"The answer is {"intent": "WHO_ARE_YOU"} as requested."#;
        let route = parse_route_response(text).expect("route");
        assert_eq!(route.intent, Intent::WhoAreYou);
        assert!(route.entities.is_empty());
    }

    #[test]
    fn falls_back_to_the_intent_field_alone() {
        let text = r#"{"intent": "EARLY_RISERS_PROMOTION", "entities": {"note": "unterminated"#;
        let route = parse_route_response(text).expect("route");
        assert_eq!(route.intent, Intent::EarlyRisersPromotion);
        assert!(route.entities.is_empty());
    }

    #[test]
    fn unknown_labels_and_missing_entities_degrade() {
        let route = parse_route_response(r#"{"intent": "REFUND"}"#).expect("route");
        assert_eq!(route.intent, Intent::Unknown);
        assert!(route.entities.is_empty());
    }

    #[test]
    fn prose_without_an_intent_is_not_a_route() {
        assert!(parse_route_response("I think the customer wants their order.").is_none());
        assert!(parse_route_response("").is_none());
    }

    #[test]
    fn json_objects_are_found_inside_prose() {
        let object = parse_json_object(
            "Extracted: {\"email\": \"jane@example.com\", \"order_number\": null} done",
        )
        .expect("object");
        assert_eq!(object.get("email"), Some(&json!("jane@example.com")));
        assert!(parse_json_object("nothing here").is_none());
        assert!(parse_json_object("[1, 2]").is_none());
    }
}
