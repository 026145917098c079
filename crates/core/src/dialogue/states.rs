use serde::{Deserialize, Serialize};

use crate::domain::order::{CustomerEmail, Order, OrderNumber, ORDER_NUMBER_EXAMPLES};
use crate::entities::{EntityField, ResolvedEntities};
use crate::memory::KeyInfo;
use crate::slots::{SlotKey, SlotStore};

const USPS_TRACKING_URL: &str = "https://tools.usps.com/go/TrackConfirmAction?tLabels=";

/// What a single turn said about one token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenObservation<T> {
    Absent,
    Valid(T),
    /// Input that was meant as this token but fails its format check.
    Malformed(String),
}

impl<T> TokenObservation<T> {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid(_))
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnObservation {
    pub identity: TokenObservation<CustomerEmail>,
    pub reference: TokenObservation<OrderNumber>,
}

impl TurnObservation {
    /// Classifies the resolved values for this turn. When a token was not
    /// resolved, a whitespace token in `text` that looks like an attempt at it
    /// (digits without `@` for an order number, an `@` for an email) is
    /// classified on its own. A well-formed order number the resolver missed
    /// still counts as valid.
    pub fn from_entities(text: &str, entities: &ResolvedEntities) -> Self {
        let identity = match entities.text(EntityField::Email) {
            Some(raw) => classify_identity(raw),
            None => attempted_identity(text)
                .map(TokenObservation::Malformed)
                .unwrap_or(TokenObservation::Absent),
        };
        let reference = match entities.text(EntityField::OrderNumber) {
            Some(raw) => classify_reference(raw),
            None => attempted_reference(text)
                .map(classify_reference)
                .unwrap_or(TokenObservation::Absent),
        };
        Self { identity, reference }
    }

    /// Classifies raw candidates, e.g. the answer of a free-form extraction.
    pub fn from_candidates(identity: Option<&str>, reference: Option<&str>) -> Self {
        Self {
            identity: identity
                .filter(|raw| !raw.trim().is_empty())
                .map(classify_identity)
                .unwrap_or(TokenObservation::Absent),
            reference: reference
                .filter(|raw| !raw.trim().is_empty())
                .map(classify_reference)
                .unwrap_or(TokenObservation::Absent),
        }
    }

    /// Keeps this observation's valid tokens and takes the rest from `other`.
    pub fn or(self, other: TurnObservation) -> TurnObservation {
        let identity = if self.identity.is_valid() { self.identity } else { other.identity };
        let reference = if self.reference.is_valid() { self.reference } else { other.reference };
        TurnObservation { identity, reference }
    }
}

fn classify_identity(raw: &str) -> TokenObservation<CustomerEmail> {
    CustomerEmail::parse(raw)
        .map(TokenObservation::Valid)
        .unwrap_or_else(|_| TokenObservation::Malformed(raw.trim().to_string()))
}

fn classify_reference(raw: &str) -> TokenObservation<OrderNumber> {
    OrderNumber::parse(raw)
        .map(TokenObservation::Valid)
        .unwrap_or_else(|_| TokenObservation::Malformed(raw.trim().to_string()))
}

fn candidate_tokens(text: &str) -> impl Iterator<Item = &str> {
    text.split_whitespace()
        .map(|token| {
            token.trim_matches(|c: char| !c.is_alphanumeric() && !matches!(c, '#' | '@' | '.'))
        })
        .map(|token| token.trim_end_matches('.'))
        .filter(|token| !token.is_empty())
}

fn attempted_reference(text: &str) -> Option<&str> {
    let mut attempts = candidate_tokens(text)
        .filter(|token| !token.contains('@') && token.chars().any(|c| c.is_ascii_digit()));
    let first = attempts.next()?;
    if OrderNumber::parse(first).is_ok() {
        return Some(first);
    }
    attempts.find(|token| OrderNumber::parse(token).is_ok()).or(Some(first))
}

fn attempted_identity(text: &str) -> Option<String> {
    candidate_tokens(text).find(|token| token.contains('@')).map(str::to_string)
}

/// Validated slot values carried over from earlier turns.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PendingSlots {
    pub identity: Option<CustomerEmail>,
    pub reference: Option<OrderNumber>,
}

impl PendingSlots {
    pub fn from_store(store: &SlotStore) -> Self {
        Self {
            identity: store.get(SlotKey::Identity).and_then(|raw| CustomerEmail::parse(raw).ok()),
            reference: store.get(SlotKey::Reference).and_then(|raw| OrderNumber::parse(raw).ok()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SlotDecision {
    AttemptCompletion { identity: CustomerEmail, reference: OrderNumber },
    StoreIdentity { identity: CustomerEmail, rejected_reference: Option<String> },
    StoreReference { reference: OrderNumber, rejected_identity: Option<String> },
    RejectReference { identity: CustomerEmail, rejected: String },
    RejectIdentity { reference: OrderNumber, rejected: String },
    AskForReference { identity: CustomerEmail },
    AskForIdentity { reference: OrderNumber },
    FreeFormFallback,
    AskForBoth,
}

impl SlotDecision {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AttemptCompletion { .. } => "attempt_completion",
            Self::StoreIdentity { .. } => "store_identity",
            Self::StoreReference { .. } => "store_reference",
            Self::RejectReference { .. } => "reject_reference",
            Self::RejectIdentity { .. } => "reject_identity",
            Self::AskForReference { .. } => "ask_for_reference",
            Self::AskForIdentity { .. } => "ask_for_identity",
            Self::FreeFormFallback => "free_form_fallback",
            Self::AskForBoth => "ask_for_both",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SlotReply {
    Completed { order: Order, identity: CustomerEmail, reference: OrderNumber },
    NotFound { identity: CustomerEmail, reference: OrderNumber },
    AwaitingReference { identity: CustomerEmail, repeated: bool },
    AwaitingIdentity { reference: OrderNumber, repeated: bool },
    InvalidReference { identity: CustomerEmail, rejected: String },
    InvalidIdentity { reference: OrderNumber, rejected: String },
    NeedBoth,
}

impl SlotReply {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    pub fn key_info(&self) -> KeyInfo {
        match self {
            Self::Completed { order, .. } => KeyInfo::completed_order(order.summary()),
            _ => KeyInfo::default(),
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::Completed { order, identity, reference } => {
                completed_message(order, identity, reference)
            }
            Self::NotFound { identity, reference } => format!(
                "I couldn't find order **{reference}** for `{identity}` in our system.\n\n\
                 Could you double-check your order number? Our order numbers typically look like \
                 {ORDER_NUMBER_EXAMPLES} You can also try a different email if you used more than \
                 one address."
            ),
            Self::AwaitingReference { identity, repeated: false } => format!(
                "Got it! I have your email: {identity}. Now I need your order number \
                 (like {ORDER_NUMBER_EXAMPLES}) to find your gear."
            ),
            Self::AwaitingReference { identity, repeated: true } => format!(
                "I have your email ({identity}) but I still need your order number. \
                 Order numbers look like {ORDER_NUMBER_EXAMPLES}"
            ),
            Self::AwaitingIdentity { reference, repeated: false } => format!(
                "Perfect! I have your order number: {reference}. Now I need the email address \
                 associated with this order."
            ),
            Self::AwaitingIdentity { reference, repeated: true } => format!(
                "I have your order number ({reference}) but I still need your email address. \
                 What email did you use for this order?"
            ),
            Self::InvalidReference { identity, rejected } => format!(
                "I have your email ({identity}) but `{rejected}` doesn't look like one of our \
                 order numbers. Our order numbers start with 'W' and look like \
                 {ORDER_NUMBER_EXAMPLES} Could you check your order confirmation email for the \
                 correct format?"
            ),
            Self::InvalidIdentity { reference, rejected } => format!(
                "I have your order number ({reference}) but `{rejected}` doesn't look like a valid \
                 email address. Could you provide the email you used when placing the order?"
            ),
            Self::NeedBoth => "To check your order status, I need your email address and order \
                               number. You can say something like: 'Check order #W001 for \
                               john.doe@example.com'"
                .to_string(),
        }
    }
}

fn completed_message(order: &Order, identity: &CustomerEmail, reference: &OrderNumber) -> String {
    let mut message = format!(
        "Hello {}! Here's your order status:\n\n\
         Order: {reference}\n\
         Email: {identity}\n\
         Products: {}\n\
         Status: {}\n",
        order.customer_name,
        order.products_ordered.join(", "),
        title_case(&order.status),
    );
    if let Some(tracking) = order.tracking_number.as_deref().filter(|value| !value.is_empty()) {
        message.push_str(&format!(
            "Tracking: {tracking}\nTrack your package: {USPS_TRACKING_URL}{tracking}\n"
        ));
    }
    message.push_str("\nThanks for shopping with us!");
    message
}

fn title_case(value: &str) -> String {
    value
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::{title_case, TokenObservation, TurnObservation};
    use crate::domain::order::{CustomerEmail, OrderNumber};
    use crate::entities::{EntityField, EntitySource, EntityValue, ResolvedEntities};

    fn pattern_entities(email: Option<&str>, order: Option<&str>) -> ResolvedEntities {
        let mut entities = ResolvedEntities::new();
        if let Some(email) = email {
            entities.insert(
                EntityField::Email,
                EntityValue::Text(email.to_string()),
                EntitySource::PatternMatch,
            );
        }
        if let Some(order) = order {
            entities.insert(
                EntityField::OrderNumber,
                EntityValue::Text(order.to_string()),
                EntitySource::PatternMatch,
            );
        }
        entities
    }

    #[test]
    fn digits_without_prefix_are_an_attempted_order_number() {
        let observation =
            TurnObservation::from_entities("677623", &pattern_entities(None, None));
        assert_eq!(observation.reference, TokenObservation::Malformed("677623".to_string()));
        assert_eq!(observation.identity, TokenObservation::Absent);
    }

    #[test]
    fn well_formed_order_number_missed_by_the_resolver_is_valid() {
        let observation =
            TurnObservation::from_entities("it's w001", &pattern_entities(None, None));
        assert_eq!(
            observation.reference,
            TokenObservation::Valid(OrderNumber::parse("#W001").expect("order"))
        );

        let text = "call 5551234 about #w003";
        let observation = TurnObservation::from_entities(text, &pattern_entities(None, None));
        assert!(observation.reference.is_valid());
    }

    #[test]
    fn email_tokens_do_not_count_as_order_attempts() {
        let text = "john2@example.com";
        let observation =
            TurnObservation::from_entities(text, &pattern_entities(Some(text), None));
        assert!(observation.identity.is_valid());
        assert_eq!(observation.reference, TokenObservation::Absent);
    }

    #[test]
    fn broken_address_is_an_attempted_email() {
        let observation = TurnObservation::from_entities(
            "it's charlie.davis@example, sorry",
            &pattern_entities(None, Some("#W005")),
        );
        assert_eq!(
            observation.identity,
            TokenObservation::Malformed("charlie.davis@example".to_string())
        );
        assert_eq!(
            observation.reference,
            TokenObservation::Valid(OrderNumber::parse("#W005").expect("order"))
        );
    }

    #[test]
    fn resolved_but_invalid_order_number_is_malformed() {
        let observation =
            TurnObservation::from_entities("#W12", &pattern_entities(None, Some("#W12")));
        assert_eq!(observation.reference, TokenObservation::Malformed("#W12".to_string()));
    }

    #[test]
    fn candidates_ignore_blanks() {
        let observation = TurnObservation::from_candidates(Some(" "), Some("W003"));
        assert!(observation.identity.is_absent());
        assert!(observation.reference.is_valid());
    }

    #[test]
    fn merge_keeps_valid_tokens_first() {
        let first = TurnObservation {
            identity: TokenObservation::Valid(
                CustomerEmail::parse("a@example.com").expect("email"),
            ),
            reference: TokenObservation::Malformed("123".to_string()),
        };
        let merged = first.or(TurnObservation::from_candidates(None, Some("#W002")));
        assert!(merged.identity.is_valid());
        assert!(merged.reference.is_valid());
    }

    #[test]
    fn status_is_title_cased() {
        assert_eq!(title_case("in transit"), "In Transit");
        assert_eq!(title_case("DELIVERED"), "Delivered");
    }
}
