use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Intent {
    OrderStatus,
    ProductRecommendation,
    EarlyRisersPromotion,
    WhoAreYou,
    Unknown,
}

impl Intent {
    pub const ALL: [Intent; 5] = [
        Intent::OrderStatus,
        Intent::ProductRecommendation,
        Intent::EarlyRisersPromotion,
        Intent::WhoAreYou,
        Intent::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OrderStatus => "ORDER_STATUS",
            Self::ProductRecommendation => "PRODUCT_RECOMMENDATION",
            Self::EarlyRisersPromotion => "EARLY_RISERS_PROMOTION",
            Self::WhoAreYou => "WHO_ARE_YOU",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Lenient label parsing for model output. Unrecognised labels become `Unknown`.
    pub fn from_label(label: &str) -> Self {
        let normalized = label.trim().to_ascii_uppercase().replace([' ', '-'], "_");
        Self::ALL
            .into_iter()
            .find(|intent| intent.as_str() == normalized)
            .unwrap_or(Self::Unknown)
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
