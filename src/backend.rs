//! Backend trait definitions
//!
//! Every external collaborator sits behind one of these traits: the relational
//! store, the retrieval functions of the vector extension, the text generation
//! function and the object storage holding product images.

use crate::error::Result;
use crate::types::{Product, Review};
use async_trait::async_trait;

/// What a retrieval call searches with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalInput<'a> {
    /// Free text, matched against product names
    Text(&'a str),
    /// Raw image bytes, matched against the image volume
    Image(&'a [u8]),
}

impl RetrievalInput<'_> {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Image(_) => "image",
        }
    }
}

/// Parameters of one retrieval call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievalRequest<'a> {
    /// Name of the retriever configured in the extension
    pub retriever: &'a str,
    pub input: RetrievalInput<'a>,
    /// Restrict candidates to products of this gender
    pub gender: Option<&'a str>,
    /// How many candidates the retriever is asked for
    pub candidates: u32,
    /// Maximum rows returned after filtering
    pub limit: u32,
}

/// A row as returned by the retrieval functions, before key decoding
#[derive(Debug, Clone, PartialEq)]
pub struct RawHit {
    pub key: String,
    pub distance: f64,
}

impl RawHit {
    pub fn new(key: impl Into<String>, distance: f64) -> Self {
        Self {
            key: key.into(),
            distance,
        }
    }
}

/// Read-only access to products and reviews
#[async_trait]
pub trait CatalogBackend: Send + Sync {
    /// Distinct categories, lexicographically ordered
    async fn categories(&self) -> Result<Vec<String>>;

    /// Distinct genders, lexicographically ordered
    async fn genders(&self) -> Result<Vec<String>>;

    /// Products of a category ordered by display name
    async fn products_by_category(&self, category: &str, limit: u32) -> Result<Vec<Product>>;

    /// Look up one product
    async fn product(&self, product_id: &str) -> Result<Option<Product>>;

    /// All reviews of a product
    async fn reviews(&self, product_id: &str) -> Result<Vec<Review>>;
}

/// Nearest-neighbour retrieval delegated to the database extension
#[async_trait]
pub trait RetrievalBackend: Send + Sync {
    async fn retrieve(&self, request: &RetrievalRequest<'_>) -> Result<Vec<RawHit>>;
}

/// Text generation delegated to the database extension
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Run the prompt; `None` when the model produced nothing
    async fn generate(&self, prompt: &str) -> Result<Option<String>>;
}

/// Remote storage of product images
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Fetch the image of a product. Fails with `NotFound` when no object exists.
    async fn fetch(&self, product_id: &str) -> Result<Vec<u8>>;
}
