//! Interaction handlers
//!
//! [`Storefront`] owns the shared services (catalog reader, search client,
//! summarizer, image store) and exposes one async handler per user action.
//! A handler runs its interaction to completion and turns every failure
//! except a lost database connection into [`Notice`]s on the returned view,
//! so one bad call never takes down the rest of the page.

use crate::backend::{CatalogBackend, ImageStore, RetrievalBackend, TextGenerator};
use crate::cache::{CacheManager, SUMMARY_NAMESPACE};
use crate::catalog::CatalogReader;
use crate::config::StorefrontConfig;
use crate::error::{Result, StorefrontError};
use crate::object_store::S3ImageStore;
use crate::search::{SearchQuery, SimilaritySearch};
use crate::session::{parse_gender_choice, SearchMode, Session, UploadedImage};
use crate::store::PgStore;
use crate::summarizer::ReviewSummarizer;
use crate::types::{image_key, Notice, NoticeLevel, Product, ProductTile, Review, ReviewSummary};
use serde::Serialize;
use std::sync::Arc;

/// Path of the review view; rows link to it with `review_item_id`
pub const REVIEW_PATH: &str = "/review";

pub fn review_link(product_id: &str) -> String {
    format!("{REVIEW_PATH}?review_item_id={product_id}")
}

/// What happened when a product image was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageStatus {
    Loaded,
    Missing,
    Failed,
}

/// Landing view: filters and the products of the selected category
#[derive(Debug, Clone, Default, Serialize)]
pub struct CatalogPage {
    pub categories: Vec<String>,
    pub genders: Vec<String>,
    pub selected_category: Option<String>,
    pub selected_gender: Option<String>,
    pub products: Vec<ProductTile>,
    pub notices: Vec<Notice>,
}

/// One rendered search result
#[derive(Debug, Clone, Serialize)]
pub struct ResultRow {
    pub product: Product,
    pub score: f64,
    pub image_key: String,
    pub image: ImageStatus,
    #[serde(skip)]
    pub image_bytes: Option<Vec<u8>>,
    pub review_link: String,
}

/// Search view
#[derive(Debug, Clone, Serialize)]
pub struct SearchPage {
    pub mode: SearchMode,
    pub gender: Option<String>,
    pub rows: Vec<ResultRow>,
    pub retrieved: usize,
    pub elapsed_ms: u64,
    pub notices: Vec<Notice>,
}

impl SearchPage {
    fn rejected(mode: SearchMode, notice: Notice) -> Self {
        Self {
            mode,
            gender: None,
            rows: Vec::new(),
            retrieved: 0,
            elapsed_ms: 0,
            notices: vec![notice],
        }
    }
}

/// Review view of a single product
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReviewPage {
    pub product_id: Option<String>,
    pub product: Option<Product>,
    pub image: Option<ImageStatus>,
    #[serde(skip)]
    pub image_bytes: Option<Vec<u8>>,
    pub summary: ReviewSummary,
    pub review_count: usize,
    pub reviews: Vec<Review>,
    pub notices: Vec<Notice>,
}

impl ReviewPage {
    fn with_notices(product_id: Option<String>, notices: Vec<Notice>) -> Self {
        Self {
            product_id,
            notices,
            ..Self::default()
        }
    }
}

/// A review typed into the review form
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct ReviewSubmission {
    pub rating: i32,
    pub text: String,
}

/// Shared services behind every session
#[derive(Clone)]
pub struct Storefront {
    catalog: Arc<CatalogReader>,
    search: SimilaritySearch,
    summarizer: ReviewSummarizer,
    images: Arc<dyn ImageStore>,
    cache: Arc<CacheManager>,
    store: Option<Arc<PgStore>>,
    config: StorefrontConfig,
}

impl std::fmt::Debug for Storefront {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storefront")
            .field("catalog", &self.catalog)
            .field("search", &self.search)
            .field("config", &self.config)
            .finish()
    }
}

/// Convert a non-fatal error into a notice; connection loss is returned
fn absorb<T>(result: Result<T>, notices: &mut Vec<Notice>, context: &str) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_fatal() => {
            tracing::error!("{}: {}", context, e);
            Err(e)
        }
        Err(e) => {
            tracing::warn!("{}: {}", context, e);
            notices.push(notice_for(&e, context));
            Ok(None)
        }
    }
}

fn notice_for(error: &StorefrontError, context: &str) -> Notice {
    match error {
        StorefrontError::NotFound(_) | StorefrontError::Validation(_) => {
            Notice::warning(error.to_string())
        }
        _ => Notice::error(format!("{context}: {error}")),
    }
}

impl Storefront {
    /// Connect to Postgres and object storage with a shared cache
    pub async fn connect(config: StorefrontConfig) -> Result<Self> {
        config.validate()?;
        let store = PgStore::connect(&config).await?;
        let storefront = Self::with_store(store, config)?;
        tracing::info!("Storefront ready");
        Ok(storefront)
    }

    /// Like [`Storefront::connect`] but the database is first contacted by
    /// the first handler that needs it
    pub fn connect_lazy(config: StorefrontConfig) -> Result<Self> {
        config.validate()?;
        let store = PgStore::connect_lazy(&config)?;
        Self::with_store(store, config)
    }

    fn with_store(store: PgStore, config: StorefrontConfig) -> Result<Self> {
        let store = Arc::new(store);
        let images = Arc::new(S3ImageStore::new(&config.object_store)?);

        let mut storefront = Self::from_parts(
            Arc::clone(&store) as Arc<dyn CatalogBackend>,
            Arc::clone(&store) as Arc<dyn RetrievalBackend>,
            Arc::clone(&store) as Arc<dyn TextGenerator>,
            images,
            config,
        );
        storefront.store = Some(store);
        Ok(storefront)
    }

    /// Assemble from explicit backends
    pub fn from_parts(
        catalog: Arc<dyn CatalogBackend>,
        retrieval: Arc<dyn RetrievalBackend>,
        generator: Arc<dyn TextGenerator>,
        images: Arc<dyn ImageStore>,
        config: StorefrontConfig,
    ) -> Self {
        let cache = Arc::new(CacheManager::new(config.cache.clone()));
        let catalog = Arc::new(CatalogReader::new(catalog, Arc::clone(&cache)));
        let search = SimilaritySearch::new(retrieval, Arc::clone(&catalog), config.search.clone());
        let summarizer = ReviewSummarizer::new(generator, Arc::clone(&cache));

        Self {
            catalog,
            search,
            summarizer,
            images,
            cache,
            store: None,
            config,
        }
    }

    pub fn config(&self) -> &StorefrontConfig {
        &self.config
    }

    pub fn catalog(&self) -> &CatalogReader {
        &self.catalog
    }

    /// Check the database connection, when there is one
    pub async fn ping(&self) -> Result<()> {
        match &self.store {
            Some(store) => store.ping().await,
            None => Ok(()),
        }
    }

    pub async fn close(&self) {
        if let Some(store) = &self.store {
            store.close().await;
        }
    }

    /// Categories, genders and the products of the selected category.
    /// Falls back to the first category when the session has none selected.
    pub async fn catalog_page(&self, session: &mut Session) -> Result<CatalogPage> {
        let mut notices = Vec::new();

        let categories = absorb(
            self.catalog.list_categories().await,
            &mut notices,
            "Failed to load categories",
        )?
        .unwrap_or_default();
        let genders = absorb(
            self.catalog.list_genders().await,
            &mut notices,
            "Failed to load genders",
        )?
        .unwrap_or_default();

        let selected = session
            .selected_category
            .clone()
            .filter(|c| categories.contains(c))
            .or_else(|| categories.first().cloned());
        session.selected_category = selected.clone();

        let products = match &selected {
            Some(category) => absorb(
                self.catalog
                    .list_products_by_category(category, self.config.catalog_page_size)
                    .await,
                &mut notices,
                "Failed to load products",
            )?
            .unwrap_or_default(),
            None => Vec::new(),
        };
        if products.is_empty() {
            notices.push(Notice::info("No image available"));
        }

        Ok(CatalogPage {
            categories,
            genders,
            selected_category: selected,
            selected_gender: session.selected_gender.clone(),
            products,
            notices,
        })
    }

    pub async fn select_category(&self, session: &mut Session, category: &str) -> Result<()> {
        let categories = self.catalog.list_categories().await?;
        if !categories.iter().any(|c| c == category) {
            return Err(StorefrontError::Validation(format!(
                "unknown category: {category}"
            )));
        }
        session.selected_category = Some(category.to_string());
        Ok(())
    }

    /// Select the gender filter; "None" or empty clears it
    pub async fn select_gender(&self, session: &mut Session, choice: Option<&str>) -> Result<()> {
        let gender = parse_gender_choice(choice);
        if let Some(g) = &gender {
            let genders = self.catalog.list_genders().await?;
            if !genders.contains(g) {
                return Err(StorefrontError::Validation(format!("unknown gender: {g}")));
            }
        }
        session.selected_gender = gender;
        Ok(())
    }

    pub fn set_query(&self, session: &mut Session, query: &str) {
        session.set_query(query);
    }

    pub fn upload_image(&self, session: &mut Session, name: &str, bytes: Vec<u8>) -> Result<()> {
        session.upload_image(UploadedImage::new(name, bytes)?);
        Ok(())
    }

    /// Run the session's text query
    pub async fn search_text(&self, session: &mut Session) -> Result<SearchPage> {
        let query = match session.begin_text_search() {
            Ok(query) => query.to_string(),
            Err(e) => {
                return Ok(SearchPage::rejected(
                    session.search_mode,
                    notice_for(&e, "Text search"),
                ))
            }
        };
        tracing::info!(query = %query, "Text search");
        let gender = session.selected_gender.clone();
        self.run_search(SearchQuery::Text(query), SearchMode::Text, gender)
            .await
    }

    /// Run a search with the session's uploaded image
    pub async fn search_image(&self, session: &mut Session) -> Result<SearchPage> {
        let bytes = match session.begin_image_search() {
            Ok(image) => {
                tracing::info!(image = %image.name, size = image.bytes.len(), "Image search");
                image.bytes.clone()
            }
            Err(e) => {
                return Ok(SearchPage::rejected(
                    session.search_mode,
                    notice_for(&e, "Image search"),
                ))
            }
        };
        let gender = session.selected_gender.clone();
        self.run_search(SearchQuery::Image(bytes), SearchMode::Image, gender)
            .await
    }

    async fn run_search(
        &self,
        query: SearchQuery,
        mode: SearchMode,
        gender: Option<String>,
    ) -> Result<SearchPage> {
        let mut notices = Vec::new();
        let outcome = absorb(
            self.search.search(&query, gender.as_deref()).await,
            &mut notices,
            "An error occurred",
        )?;

        let Some(outcome) = outcome else {
            return Ok(SearchPage {
                mode,
                gender,
                rows: Vec::new(),
                retrieved: 0,
                elapsed_ms: 0,
                notices,
            });
        };

        let mut rows = Vec::with_capacity(outcome.hits.len());
        for hit in outcome.hits {
            let (image, image_bytes) = self.load_image(&hit.product.product_id, &mut notices).await;
            rows.push(ResultRow {
                image_key: hit.product.image_key(),
                review_link: review_link(&hit.product.product_id),
                score: hit.result.score,
                product: hit.product,
                image,
                image_bytes,
            });
        }
        if rows.is_empty() {
            notices.push(Notice::info("No results found."));
        }

        Ok(SearchPage {
            mode,
            gender,
            rows,
            retrieved: outcome.retrieved,
            elapsed_ms: outcome.elapsed.as_millis() as u64,
            notices,
        })
    }

    /// Fetch one image for a view. Failures only affect that image.
    async fn load_image(
        &self,
        product_id: &str,
        notices: &mut Vec<Notice>,
    ) -> (ImageStatus, Option<Vec<u8>>) {
        match self.images.fetch(product_id).await {
            Ok(bytes) => (ImageStatus::Loaded, Some(bytes)),
            Err(StorefrontError::NotFound(_)) => {
                tracing::debug!(product_id, "Image object missing");
                notices.push(Notice::warning(format!(
                    "Image not found: {}",
                    image_key(product_id)
                )));
                (ImageStatus::Missing, None)
            }
            Err(e) => {
                tracing::warn!(product_id, "Image fetch failed: {}", e);
                notices.push(Notice::error(format!(
                    "Error loading image {}: {e}",
                    image_key(product_id)
                )));
                (ImageStatus::Failed, None)
            }
        }
    }

    /// Back to the initial search state
    pub fn reset(&self, session: &mut Session) {
        session.reset();
        tracing::debug!(session = %session.id, "Search state reset");
    }

    /// Product details, image, generated summary and recent reviews
    pub async fn review_page(&self, review_item_id: Option<&str>) -> Result<ReviewPage> {
        let Some(raw_id) = review_item_id.map(str::trim).filter(|id| !id.is_empty()) else {
            return Ok(ReviewPage::with_notices(
                None,
                vec![
                    Notice::warning("No product selected for review."),
                    Notice::info("Please go back to the search page and click 'Review' on an item."),
                ],
            ));
        };
        let product_id = raw_id.to_string();

        let mut notices = Vec::new();
        let product = absorb(
            self.catalog.get_product(&product_id).await,
            &mut notices,
            "Database error fetching product details",
        )?
        .flatten();
        let Some(product) = product else {
            notices.push(Notice::error(format!(
                "Could not load details for product ID: {product_id}"
            )));
            return Ok(ReviewPage::with_notices(Some(product_id), notices));
        };

        let (image, image_bytes) = self.load_image(&product_id, &mut notices).await;

        // an id that is not numeric only blocks the review lookup
        if let Err(e) = validate_product_id(&product_id) {
            tracing::debug!("{}", e);
            notices.push(Notice::error(format!(
                "Invalid Product ID format: {product_id}. Cannot look up reviews."
            )));
            return Ok(ReviewPage {
                product_id: Some(product_id),
                product: Some(product),
                image: Some(image),
                image_bytes,
                notices,
                ..ReviewPage::default()
            });
        }

        let mut reviews = absorb(
            self.catalog.reviews_for(&product_id).await,
            &mut notices,
            "Error processing reviews",
        )?
        .unwrap_or_default();

        let texts: Vec<String> = reviews.iter().map(|r| r.review_text.clone()).collect();
        let outcome = self.summarizer.summarize(&texts).await;
        notices.extend(outcome.notices);

        let review_count = reviews.len();
        if review_count == 0 {
            notices.push(Notice::info("No reviews found for this product in the dataset."));
        }
        reviews.truncate(self.config.reviews_shown);

        Ok(ReviewPage {
            product_id: Some(product_id),
            product: Some(product),
            image: Some(image),
            image_bytes,
            summary: outcome.summary,
            review_count,
            reviews,
            notices,
        })
    }

    /// Accept a review from the form. Reviews are acknowledged, not stored.
    pub async fn submit_review(
        &self,
        review_item_id: &str,
        submission: &ReviewSubmission,
    ) -> Result<Notice> {
        let product_id = review_item_id.trim();
        validate_product_id(product_id)?;
        if !(1..=5).contains(&submission.rating) {
            return Err(StorefrontError::Validation(format!(
                "rating must be between 1 and 5, got {}",
                submission.rating
            )));
        }
        if submission.text.trim().is_empty() {
            return Err(StorefrontError::Validation("review text is empty".into()));
        }

        let product = self
            .catalog
            .get_product(product_id)
            .await?
            .ok_or_else(|| StorefrontError::NotFound(format!("product {product_id}")))?;

        tracing::info!(product_id, rating = submission.rating, "Review submitted");
        Ok(Notice::info(format!(
            "Thank you for reviewing '{}'!",
            product.display_name
        )))
    }

    /// Raw image bytes of a product
    pub async fn image(&self, product_id: &str) -> Result<Vec<u8>> {
        validate_product_id(product_id)?;
        self.images.fetch(product_id).await
    }

    /// Drop every cached catalog read and summary
    pub async fn invalidate_caches(&self) -> usize {
        let catalog = self.catalog.invalidate().await;
        let summaries = self.cache.invalidate_prefix(SUMMARY_NAMESPACE).await;
        tracing::info!(catalog, summaries, "Caches invalidated");
        catalog + summaries
    }
}

/// Product ids are numeric
pub fn validate_product_id(product_id: &str) -> Result<()> {
    if product_id.is_empty() || !product_id.chars().all(|c| c.is_ascii_digit()) {
        return Err(StorefrontError::Validation(format!(
            "product id must be numeric: {product_id}"
        )));
    }
    Ok(())
}

/// True when any notice on a view is an error
pub fn has_errors(notices: &[Notice]) -> bool {
    notices.iter().any(|n| n.level == NoticeLevel::Error)
}
