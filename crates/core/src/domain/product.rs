use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::errors::DataError;

const SEARCH_RESULT_LIMIT: usize = 5;

static SKU_PATTERN: OnceLock<Regex> = OnceLock::new();

fn sku_pattern() -> &'static Regex {
    SKU_PATTERN.get_or_init(|| Regex::new(r"\bSO[A-Z]{2}\d+\b").expect("Invalid SKU pattern"))
}

/// All SKU-shaped tokens in `text`, in order of appearance, without duplicates.
pub fn find_skus(text: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    sku_pattern()
        .find_iter(text)
        .map(|found| found.as_str().to_string())
        .filter(|sku| seen.insert(sku.clone()))
        .collect()
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Product {
    pub product_name: String,
    #[serde(rename = "SKU")]
    pub sku: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub inventory: u32,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Product {
    fn searchable_text(&self) -> String {
        format!("{} {} {}", self.product_name, self.description, self.tags.join(" "))
            .to_lowercase()
    }
}

#[derive(Clone, Debug, Default)]
pub struct ProductCatalog {
    products: Vec<Product>,
}

impl ProductCatalog {
    pub fn new(products: Vec<Product>) -> Self {
        Self { products }
    }

    pub fn from_json_file(path: &Path) -> Result<Self, DataError> {
        let raw = fs::read_to_string(path)
            .map_err(|source| DataError::ReadFile { path: path.to_path_buf(), source })?;
        let products = serde_json::from_str::<Vec<Product>>(&raw)
            .map_err(|source| DataError::ParseFile { path: path.to_path_buf(), source })?;
        Ok(Self::new(products))
    }

    /// Keyword search: each query word contained in a product's name,
    /// description, or tags scores one point. Highest scores first, ties keep
    /// catalog order, at most five results.
    pub fn search(&self, query: &str) -> Vec<&Product> {
        let query = query.to_lowercase();
        let words = query.split_whitespace().collect::<Vec<_>>();

        let mut scored = self
            .products
            .iter()
            .filter_map(|product| {
                let text = product.searchable_text();
                let score = words.iter().filter(|word| text.contains(**word)).count();
                (score > 0).then_some((score, product))
            })
            .collect::<Vec<_>>();

        scored.sort_by(|left, right| right.0.cmp(&left.0));
        scored.into_iter().take(SEARCH_RESULT_LIMIT).map(|(_, product)| product).collect()
    }

    pub fn by_skus(&self, skus: &[String]) -> Vec<&Product> {
        self.products.iter().filter(|product| skus.contains(&product.sku)).collect()
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }
}
