//! In-memory backends for unit tests

use crate::backend::{
    CatalogBackend, ImageStore, RawHit, RetrievalBackend, RetrievalInput, RetrievalRequest,
    TextGenerator,
};
use crate::error::{Result, StorefrontError};
use crate::search::decode_composite_key;
use crate::types::{Product, Review};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub fn product(id: &str, name: &str, category: &str, gender: &str) -> Product {
    Product {
        product_id: id.to_string(),
        display_name: name.to_string(),
        category: category.to_string(),
        gender: gender.to_string(),
    }
}

pub fn review(product_id: &str, user: &str, rating: i32, text: &str) -> Review {
    Review {
        user_id: user.to_string(),
        product_id: product_id.to_string(),
        rating,
        review_text: text.to_string(),
        timestamp: None,
    }
}

#[derive(Default)]
pub struct InMemoryCatalog {
    products: Vec<Product>,
    reviews: Vec<Review>,
    calls: AtomicUsize,
}

impl InMemoryCatalog {
    pub fn new(products: Vec<Product>) -> Self {
        Self {
            products,
            ..Self::default()
        }
    }

    pub fn with_reviews(mut self, reviews: Vec<Review>) -> Self {
        self.reviews = reviews;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn distinct(&self, field: impl Fn(&Product) -> &str) -> Vec<String> {
        let mut values: Vec<String> = self.products.iter().map(|p| field(p).to_string()).collect();
        values.sort();
        values.dedup();
        values
    }
}

#[async_trait]
impl CatalogBackend for InMemoryCatalog {
    async fn categories(&self) -> Result<Vec<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.distinct(|p| p.category.as_str()))
    }

    async fn genders(&self) -> Result<Vec<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.distinct(|p| p.gender.as_str()))
    }

    async fn products_by_category(&self, category: &str, limit: u32) -> Result<Vec<Product>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut products: Vec<Product> = self
            .products
            .iter()
            .filter(|p| p.category == category)
            .cloned()
            .collect();
        products.sort_by(|a, b| a.display_name.cmp(&b.display_name));
        products.truncate(limit as usize);
        Ok(products)
    }

    async fn product(&self, product_id: &str) -> Result<Option<Product>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .products
            .iter()
            .find(|p| p.product_id == product_id)
            .cloned())
    }

    async fn reviews(&self, product_id: &str) -> Result<Vec<Review>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .reviews
            .iter()
            .filter(|r| r.product_id == product_id)
            .cloned()
            .collect())
    }
}

/// Retrieval double returning canned rows and recording what it was asked.
/// A gender filter joins the candidates against `products` the way the
/// retrieval statements do.
#[derive(Default)]
pub struct CannedRetriever {
    text_hits: Vec<RawHit>,
    image_hits: Vec<RawHit>,
    products: Vec<Product>,
    failure: Option<String>,
    requests: Mutex<Vec<(String, Option<String>, u32, u32)>>,
}

impl CannedRetriever {
    pub fn new(text_hits: Vec<RawHit>, image_hits: Vec<RawHit>) -> Self {
        Self {
            text_hits,
            image_hits,
            ..Self::default()
        }
    }

    pub fn with_products(mut self, products: Vec<Product>) -> Self {
        self.products = products;
        self
    }

    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::default()
        }
    }

    /// `(kind, gender, candidates, limit)` of every call
    pub fn requests(&self) -> Vec<(String, Option<String>, u32, u32)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl RetrievalBackend for CannedRetriever {
    async fn retrieve(&self, request: &RetrievalRequest<'_>) -> Result<Vec<RawHit>> {
        self.requests.lock().unwrap().push((
            request.input.kind().to_string(),
            request.gender.map(str::to_string),
            request.candidates,
            request.limit,
        ));
        if let Some(message) = &self.failure {
            return Err(StorefrontError::Query(message.clone()));
        }
        let (hits, suffix) = match request.input {
            RetrievalInput::Text(_) => (&self.text_hits, ""),
            RetrievalInput::Image(_) => (&self.image_hits, ".jpg"),
        };
        let mut hits: Vec<RawHit> = hits
            .iter()
            .take(request.candidates as usize)
            .cloned()
            .collect();

        if let Some(gender) = request.gender {
            hits.retain(|hit| {
                let key = decode_composite_key(&hit.key);
                self.products
                    .iter()
                    .any(|p| p.gender == gender && format!("{}{suffix}", p.product_id) == key)
            });
            hits.sort_by(|a, b| {
                a.distance
                    .total_cmp(&b.distance)
                    .then_with(|| a.key.cmp(&b.key))
            });
        }
        hits.truncate(request.limit as usize);
        Ok(hits)
    }
}

/// Generator double answering from a script, one entry per call
#[derive(Default)]
pub struct ScriptedGenerator {
    replies: Mutex<VecDeque<Result<Option<String>>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn new(replies: Vec<Result<Option<String>>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn replying(replies: &[&str]) -> Self {
        Self::new(replies.iter().map(|r| Ok(Some(r.to_string()))).collect())
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, prompt: &str) -> Result<Option<String>> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(StorefrontError::Generation("script exhausted".into())))
    }
}

/// Image double keyed by product id
#[derive(Default)]
pub struct MemoryImageStore {
    objects: HashMap<String, Vec<u8>>,
    broken: Vec<String>,
}

impl MemoryImageStore {
    pub fn with_images(ids: &[&str]) -> Self {
        Self {
            objects: ids
                .iter()
                .map(|id| (id.to_string(), format!("jpeg:{id}").into_bytes()))
                .collect(),
            broken: Vec::new(),
        }
    }

    /// Make fetches of `id` fail with a transient error
    pub fn with_broken(mut self, id: &str) -> Self {
        self.broken.push(id.to_string());
        self
    }
}

#[async_trait]
impl ImageStore for MemoryImageStore {
    async fn fetch(&self, product_id: &str) -> Result<Vec<u8>> {
        if self.broken.iter().any(|id| id == product_id) {
            return Err(StorefrontError::Transient("connection reset".into()));
        }
        self.objects
            .get(product_id)
            .cloned()
            .ok_or_else(|| StorefrontError::NotFound(format!("image {product_id}.jpg")))
    }
}
