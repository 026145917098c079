//! Partial task state collected across turns.
//!
//! A [`SlotStore`] holds at most one value per [`SlotKey`] and keeps the
//! order in which keys were first filled. Single keys cannot be removed; the
//! store only grows, overwrites, or clears as a whole.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotKey {
    /// Customer email (identity token).
    Identity,
    /// Order number (reference token).
    Reference,
}

impl SlotKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Identity => "email",
            Self::Reference => "order_number",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Identity => "email address",
            Self::Reference => "order number",
        }
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotStore {
    entries: Vec<(SlotKey, String)>,
}

impl SlotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fill `key`, replacing any earlier value in place.
    pub fn set(&mut self, key: SlotKey, value: impl Into<String>) {
        let value = value.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == key) {
            Some((_, slot)) => *slot = value.clone(),
            None => self.entries.push((key, value.clone())),
        }
        info!(
            event_name = "dialogue.slots.set",
            slot = key.as_str(),
            value = %value,
            filled = self.entries.len(),
            "slot value stored"
        );
    }

    pub fn get(&self, key: SlotKey) -> Option<&str> {
        self.entries.iter().find(|(existing, _)| *existing == key).map(|(_, value)| value.as_str())
    }

    pub fn contains(&self, key: SlotKey) -> bool {
        self.get(key).is_some()
    }

    /// Drop every entry at once.
    pub fn clear(&mut self) {
        let dropped = self.entries.len();
        self.entries.clear();
        info!(event_name = "dialogue.slots.cleared", dropped, "slot store cleared");
    }

    pub fn iter(&self) -> impl Iterator<Item = (SlotKey, &str)> {
        self.entries.iter().map(|(key, value)| (*key, value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
