//! Catalog records and the views handed back to front ends

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Identifier of a product row (also the stem of its image object)
pub type ProductId = String;

/// Identifier of an interactive session
pub type SessionId = String;

/// Extension appended to a product id to address its image object
pub const IMAGE_EXTENSION: &str = "jpg";

/// Immutable reference data, created by the bulk load
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub product_id: ProductId,
    pub display_name: String,
    pub category: String,
    pub gender: String,
}

impl Product {
    /// Object key of the product image (`{product_id}.jpg`)
    pub fn image_key(&self) -> String {
        image_key(&self.product_id)
    }
}

/// Object key for a product id
pub fn image_key(product_id: &str) -> String {
    format!("{product_id}.{IMAGE_EXTENSION}")
}

/// A product together with the key of its image, as listed per category
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductTile {
    #[serde(flatten)]
    pub product: Product,
    pub image_key: String,
}

impl From<Product> for ProductTile {
    fn from(product: Product) -> Self {
        let image_key = product.image_key();
        Self { product, image_key }
    }
}

/// One retrieval hit. Lower score means more similar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub key: String,
    pub score: f64,
}

/// A search result resolved to its product
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub result: SearchResult,
    pub product: Product,
}

/// A user review of a product
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub user_id: String,
    pub product_id: ProductId,
    /// 1 to 5 stars
    pub rating: i32,
    pub review_text: String,
    pub timestamp: Option<NaiveDateTime>,
}

/// Generated digest of a product's reviews
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewSummary {
    pub summary_text: Option<String>,
    /// At most five labels
    pub labels: Vec<String>,
}

impl ReviewSummary {
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Severity of a user-visible message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// Plain-text message shown to the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Warning,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Notice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}
