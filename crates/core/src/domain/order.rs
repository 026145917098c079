use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::{Arc, OnceLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::errors::{DataError, DomainError};

/// Example shown to customers whenever an order number is requested.
pub const ORDER_NUMBER_EXAMPLES: &str = "#W001, #W002, etc.";

static EMAIL_SHAPE: OnceLock<Regex> = OnceLock::new();
static EMAIL_SEARCH: OnceLock<Regex> = OnceLock::new();
static ORDER_NUMBER_SHAPE: OnceLock<Regex> = OnceLock::new();
static ORDER_NUMBER_PREFIXED: OnceLock<Regex> = OnceLock::new();
static ORDER_NUMBER_BARE: OnceLock<Regex> = OnceLock::new();

fn email_shape() -> &'static Regex {
    EMAIL_SHAPE.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$")
            .expect("Invalid email shape pattern")
    })
}

fn email_search() -> &'static Regex {
    EMAIL_SEARCH.get_or_init(|| {
        Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b")
            .expect("Invalid email search pattern")
    })
}

fn order_number_shape() -> &'static Regex {
    ORDER_NUMBER_SHAPE
        .get_or_init(|| Regex::new(r"^#?[Ww](\d{3,})$").expect("Invalid order number pattern"))
}

fn order_number_prefixed() -> &'static Regex {
    ORDER_NUMBER_PREFIXED
        .get_or_init(|| Regex::new(r"(?i)#W\d+").expect("Invalid prefixed order number pattern"))
}

fn order_number_bare() -> &'static Regex {
    ORDER_NUMBER_BARE
        .get_or_init(|| Regex::new(r"(?i)\bW\d+\b").expect("Invalid bare order number pattern"))
}

/// Identity token: the address a customer placed the order with.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CustomerEmail(String);

impl CustomerEmail {
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let trimmed = raw.trim();
        if email_shape().is_match(trimmed) {
            Ok(Self(trimmed.to_string()))
        } else {
            Err(DomainError::InvalidEmail(trimmed.to_string()))
        }
    }

    /// First email-shaped substring of free text.
    pub fn find_in(text: &str) -> Option<String> {
        email_search().find(text).map(|found| found.as_str().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn matches(&self, other: &str) -> bool {
        self.0.eq_ignore_ascii_case(other.trim())
    }
}

impl fmt::Display for CustomerEmail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reference token in canonical `#W<digits>` form.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderNumber(String);

impl OrderNumber {
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let trimmed = raw.trim();
        order_number_shape()
            .captures(trimmed)
            .and_then(|captures| captures.get(1))
            .map(|digits| Self(format!("#W{}", digits.as_str())))
            .ok_or_else(|| DomainError::InvalidOrderNumber(trimmed.to_string()))
    }

    /// Order-number candidate in free text, matched case-insensitively. `#W…`
    /// wins over a bare `W…`. A candidate with a valid shape comes back in
    /// canonical form; anything else is returned as written for
    /// [`OrderNumber::parse`] to reject.
    pub fn find_in(text: &str) -> Option<String> {
        let found = match order_number_prefixed().find(text) {
            Some(found) => found.as_str().to_string(),
            None => format!("#{}", order_number_bare().find(text)?.as_str()),
        };
        Some(Self::parse(&found).map(|number| number.0).unwrap_or(found))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Order {
    pub customer_name: String,
    pub email: String,
    pub order_number: String,
    #[serde(default)]
    pub products_ordered: Vec<String>,
    pub status: String,
    #[serde(default)]
    pub tracking_number: Option<String>,
}

impl Order {
    pub fn summary(&self) -> OrderSummary {
        OrderSummary {
            order_number: self.order_number.clone(),
            customer_name: self.customer_name.clone(),
            products: self.products_ordered.clone(),
            status: self.status.to_ascii_lowercase(),
        }
    }
}

/// The facts about a completed lookup that later turns may refer back to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSummary {
    pub order_number: String,
    pub customer_name: String,
    pub products: Vec<String>,
    pub status: String,
}

/// Completion collaborator for the order-status dialogue.
pub trait OrderBook: Send + Sync {
    fn find_order(&self, email: &CustomerEmail, order_number: &OrderNumber) -> Option<Order>;
}

impl<T> OrderBook for Arc<T>
where
    T: OrderBook + ?Sized,
{
    fn find_order(&self, email: &CustomerEmail, order_number: &OrderNumber) -> Option<Order> {
        (**self).find_order(email, order_number)
    }
}

#[derive(Clone, Debug, Default)]
pub struct InMemoryOrderBook {
    orders: Vec<Order>,
}

impl InMemoryOrderBook {
    pub fn new(orders: Vec<Order>) -> Self {
        Self { orders }
    }

    pub fn from_json_file(path: &Path) -> Result<Self, DataError> {
        let raw = fs::read_to_string(path)
            .map_err(|source| DataError::ReadFile { path: path.to_path_buf(), source })?;
        let orders = serde_json::from_str::<Vec<Order>>(&raw)
            .map_err(|source| DataError::ParseFile { path: path.to_path_buf(), source })?;
        Ok(Self::new(orders))
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }
}

impl OrderBook for InMemoryOrderBook {
    fn find_order(&self, email: &CustomerEmail, order_number: &OrderNumber) -> Option<Order> {
        self.orders
            .iter()
            .find(|order| {
                email.matches(&order.email) && order.order_number == order_number.as_str()
            })
            .cloned()
    }
}
