//! Per-turn entity resolution.
//!
//! Every field is filled from the first source in [`EntitySource::RANKED`] that
//! yields a usable value. Nothing here fails: a source that has nothing to say
//! is skipped.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::order::{CustomerEmail, OrderNumber};
use crate::domain::product::find_skus;
use crate::memory::ContextSnapshot;
use crate::reference::ReferenceMatcher;

/// Structured extraction returned by the model, keyed by field name.
pub type ModelEntities = serde_json::Map<String, Value>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityField {
    Email,
    OrderNumber,
    #[serde(rename = "SKU")]
    Sku,
    ProductName,
    ReferencedOrder,
    ReferencedProducts,
}

impl EntityField {
    pub const ALL: [EntityField; 6] = [
        EntityField::Email,
        EntityField::OrderNumber,
        EntityField::Sku,
        EntityField::ProductName,
        EntityField::ReferencedOrder,
        EntityField::ReferencedProducts,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Self::Email => "Email",
            Self::OrderNumber => "OrderNumber",
            Self::Sku => "SKU",
            Self::ProductName => "ProductName",
            Self::ReferencedOrder => "ReferencedOrder",
            Self::ReferencedProducts => "ReferencedProducts",
        }
    }

    /// Case-insensitive, ignoring `_` and spaces, so `order_number` reads as `OrderNumber`.
    pub fn from_key(key: &str) -> Option<Self> {
        let normalized = key.trim().replace(['_', ' '], "");
        Self::ALL.into_iter().find(|field| field.key().eq_ignore_ascii_case(&normalized))
    }

    /// Only these fields may be filled from earlier turns.
    pub fn is_reference_eligible(&self) -> bool {
        matches!(self, Self::ReferencedOrder | Self::ReferencedProducts)
    }

    fn is_list(&self) -> bool {
        matches!(self, Self::Sku | Self::ReferencedProducts)
    }
}

impl fmt::Display for EntityField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityValue {
    Text(String),
    List(Vec<String>),
}

impl EntityValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            Self::List(_) => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            Self::List(values) => Some(values),
            Self::Text(_) => None,
        }
    }
}

impl fmt::Display for EntityValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(value) => f.write_str(value),
            Self::List(values) => write!(f, "[{}]", values.join(", ")),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntitySource {
    ModelExtraction,
    PatternMatch,
    ConversationContext,
}

impl EntitySource {
    /// Resolution precedence, highest first.
    pub const RANKED: [EntitySource; 3] = [
        EntitySource::ModelExtraction,
        EntitySource::PatternMatch,
        EntitySource::ConversationContext,
    ];
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedEntity {
    pub value: EntityValue,
    pub source: EntitySource,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResolvedEntities {
    fields: BTreeMap<EntityField, ResolvedEntity>,
}

impl ResolvedEntities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: EntityField, value: EntityValue, source: EntitySource) {
        self.fields.insert(field, ResolvedEntity { value, source });
    }

    pub fn get(&self, field: EntityField) -> Option<&ResolvedEntity> {
        self.fields.get(&field)
    }

    pub fn text(&self, field: EntityField) -> Option<&str> {
        self.get(field).and_then(|entity| entity.value.as_text())
    }

    pub fn list(&self, field: EntityField) -> Option<&[String]> {
        self.get(field).and_then(|entity| entity.value.as_list())
    }

    pub fn source(&self, field: EntityField) -> Option<EntitySource> {
        self.get(field).map(|entity| entity.source)
    }

    pub fn contains(&self, field: EntityField) -> bool {
        self.fields.contains_key(&field)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (EntityField, &ResolvedEntity)> {
        self.fields.iter().map(|(field, entity)| (*field, entity))
    }
}

impl fmt::Display for ResolvedEntities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered = self
            .fields
            .iter()
            .map(|(field, entity)| format!("{field}={}", entity.value))
            .collect::<Vec<_>>()
            .join(", ");
        f.write_str(&rendered)
    }
}

/// The three inputs a resolution pass works from.
#[derive(Clone, Copy, Debug)]
pub struct ResolutionInput<'a> {
    pub text: &'a str,
    pub model: Option<&'a ModelEntities>,
    pub snapshot: &'a ContextSnapshot,
}

#[derive(Clone, Debug, Default)]
pub struct EntityResolver {
    matcher: ReferenceMatcher,
}

impl EntityResolver {
    pub fn new(matcher: ReferenceMatcher) -> Self {
        Self { matcher }
    }

    pub fn resolve(
        &self,
        text: &str,
        model: Option<&ModelEntities>,
        snapshot: &ContextSnapshot,
    ) -> ResolvedEntities {
        let input = ResolutionInput { text, model, snapshot };
        let mut resolved = ResolvedEntities::new();

        for field in EntityField::ALL {
            let winner = EntitySource::RANKED.into_iter().find_map(|source| {
                self.candidate(source, field, &input).map(|value| (value, source))
            });
            if let Some((value, source)) = winner {
                resolved.insert(field, value, source);
            }
        }

        resolved
    }

    /// What a single source offers for `field`, if anything.
    pub fn candidate(
        &self,
        source: EntitySource,
        field: EntityField,
        input: &ResolutionInput<'_>,
    ) -> Option<EntityValue> {
        match source {
            EntitySource::ModelExtraction => {
                input.model.and_then(|model| model_value(model, field))
            }
            EntitySource::PatternMatch => pattern_value(input.text, field),
            EntitySource::ConversationContext => self.context_value(input, field),
        }
    }

    fn context_value(
        &self,
        input: &ResolutionInput<'_>,
        field: EntityField,
    ) -> Option<EntityValue> {
        if !field.is_reference_eligible() {
            return None;
        }
        match field {
            EntityField::ReferencedOrder if self.matcher.is_order_reference(input.text) => input
                .snapshot
                .last_task_result
                .as_ref()
                .map(|lookup| EntityValue::Text(lookup.order.order_number.clone())),
            EntityField::ReferencedProducts if self.matcher.is_product_reference(input.text) => {
                input
                    .snapshot
                    .recent_reference_items
                    .as_ref()
                    .filter(|items| !items.is_empty())
                    .map(|items| EntityValue::List(items.clone()))
            }
            _ => None,
        }
    }
}

fn model_value(model: &ModelEntities, field: EntityField) -> Option<EntityValue> {
    let raw = model
        .iter()
        .find(|(key, _)| EntityField::from_key(key) == Some(field))
        .map(|(_, value)| value)?;

    match raw {
        Value::String(text) if !text.trim().is_empty() => {
            let text = text.trim().to_string();
            Some(if field.is_list() {
                EntityValue::List(vec![text])
            } else {
                EntityValue::Text(text)
            })
        }
        Value::Array(items) if field.is_list() => {
            let values = items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(str::to_string)
                .collect::<Vec<_>>();
            (!values.is_empty()).then_some(EntityValue::List(values))
        }
        _ => None,
    }
}

fn pattern_value(text: &str, field: EntityField) -> Option<EntityValue> {
    match field {
        EntityField::Email => CustomerEmail::find_in(text).map(EntityValue::Text),
        EntityField::OrderNumber => OrderNumber::find_in(text).map(EntityValue::Text),
        EntityField::Sku => {
            let skus = find_skus(text);
            (!skus.is_empty()).then_some(EntityValue::List(skus))
        }
        EntityField::ProductName
        | EntityField::ReferencedOrder
        | EntityField::ReferencedProducts => None,
    }
}
