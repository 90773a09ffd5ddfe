//! # Storefront - similarity search and review summaries over a product catalog
//!
//! Products and reviews live in Postgres. Nearest-neighbour retrieval over
//! product names and product images, and text generation for review
//! summaries, are functions of the `aidb` extension in the same database.
//! Product images are read anonymously from an S3 bucket.

pub mod backend;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod error;
pub mod object_store;
pub mod search;
pub mod session;
pub mod store;
pub mod storefront;
pub mod summarizer;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use backend::{
    CatalogBackend, ImageStore, RawHit, RetrievalBackend, RetrievalInput, RetrievalRequest,
    TextGenerator,
};
pub use cache::{CacheConfig, CacheConfigBuilder, CacheKey, CacheManager, CacheStats, L1Cache};
pub use catalog::CatalogReader;
pub use config::{
    DatabaseConfig, ObjectStoreConfig, SearchConfig, StorefrontArgs, StorefrontConfig,
};
pub use error::{Result, StorefrontError};
pub use object_store::S3ImageStore;
pub use search::{QueryKind, SearchOutcome, SearchQuery, SimilaritySearch};
pub use session::{parse_gender_choice, SearchMode, Session, UploadedImage};
pub use store::PgStore;
pub use storefront::{
    review_link, CatalogPage, ImageStatus, ResultRow, ReviewPage, ReviewSubmission, SearchPage,
    Storefront,
};
pub use summarizer::{ReviewSummarizer, SummaryOutcome};
pub use types::{
    Notice, NoticeLevel, Product, ProductId, ProductTile, Review, ReviewSummary, SearchHit,
    SearchResult, SessionId,
};
