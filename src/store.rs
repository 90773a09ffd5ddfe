//! Relational store and `aidb` extension calls over Postgres
//!
//! Every statement binds its inputs; retriever names, query text, image bytes
//! and the gender filter never end up inside the SQL text.

use crate::backend::{
    CatalogBackend, RawHit, RetrievalBackend, RetrievalInput, RetrievalRequest, TextGenerator,
};
use crate::config::{DatabaseConfig, StorefrontConfig};
use crate::error::{Result, StorefrontError};
use crate::types::{Product, Review};

use async_trait::async_trait;
use chrono::NaiveDateTime;
use futures::TryStreamExt;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use std::future::Future;
use std::time::Duration;

const CATEGORIES_SQL: &str = "SELECT DISTINCT mastercategory FROM products \
     WHERE mastercategory IS NOT NULL ORDER BY 1";

const GENDERS_SQL: &str = "SELECT DISTINCT gender FROM products \
     WHERE gender IS NOT NULL ORDER BY 1";

const PRODUCTS_BY_CATEGORY_SQL: &str = r#"
    SELECT product_id,
           COALESCE(productdisplayname, '') AS display_name,
           COALESCE(mastercategory, '') AS category,
           COALESCE(gender, '') AS gender
    FROM products
    WHERE mastercategory = $1
    ORDER BY display_name, product_id
    LIMIT $2
"#;

const PRODUCT_SQL: &str = r#"
    SELECT product_id,
           COALESCE(productdisplayname, '') AS display_name,
           COALESCE(mastercategory, '') AS category,
           COALESCE(gender, '') AS gender
    FROM products
    WHERE product_id = $1
    LIMIT 1
"#;

const REVIEWS_SQL: &str = r#"
    SELECT user_id, product_id, rating, "timestamp", review
    FROM product_review
    WHERE product_id = $1
    ORDER BY "timestamp" DESC NULLS LAST, user_id
"#;

const RETRIEVE_TEXT_SQL: &str = r#"
    SELECT result.key::text AS key, result.distance::float8 AS distance
    FROM aidb.retrieve_text($1, $2, $3) AS result
    ORDER BY distance ASC, key ASC
    LIMIT $4
"#;

const RETRIEVE_TEXT_BY_GENDER_SQL: &str = r#"
    WITH hits AS (
        SELECT result.key::text AS key, result.distance::float8 AS distance
        FROM aidb.retrieve_text($1, $2, $3) AS result
    )
    SELECT hits.key, hits.distance
    FROM hits
    JOIN products p ON p.product_id = hits.key
    WHERE p.gender = $5
    ORDER BY hits.distance ASC, hits.key ASC
    LIMIT $4
"#;

const RETRIEVE_IMAGE_SQL: &str = r#"
    SELECT result.key::text AS key, result.distance::float8 AS distance
    FROM aidb.retrieve_key($1, $2, $3) AS result
    ORDER BY distance ASC, key ASC
    LIMIT $4
"#;

const RETRIEVE_IMAGE_BY_GENDER_SQL: &str = r#"
    WITH hits AS (
        SELECT result.key::text AS key, result.distance::float8 AS distance
        FROM aidb.retrieve_key($1, $2, $3) AS result
    )
    SELECT hits.key, hits.distance
    FROM hits
    JOIN products p ON p.product_id || '.jpg' = hits.key
    WHERE p.gender = $5
    ORDER BY hits.distance ASC, hits.key ASC
    LIMIT $4
"#;

const DECODE_TEXT_SQL: &str = "SELECT decode_text FROM aidb.decode_text($1, $2)";

/// Pick the statement for a retrieval request
pub fn retrieval_sql(input: &RetrievalInput<'_>, gender_filtered: bool) -> &'static str {
    match (input, gender_filtered) {
        (RetrievalInput::Text(_), false) => RETRIEVE_TEXT_SQL,
        (RetrievalInput::Text(_), true) => RETRIEVE_TEXT_BY_GENDER_SQL,
        (RetrievalInput::Image(_), false) => RETRIEVE_IMAGE_SQL,
        (RetrievalInput::Image(_), true) => RETRIEVE_IMAGE_BY_GENDER_SQL,
    }
}

/// Postgres-backed store for products, reviews, retrieval and generation
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    generation_model: String,
    query_timeout: Duration,
}

impl std::fmt::Debug for PgStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgStore")
            .field("pool", &"<PgPool>")
            .field("generation_model", &self.generation_model)
            .field("query_timeout", &self.query_timeout)
            .finish()
    }
}

impl PgStore {
    /// Create a store over an existing pool
    pub fn new(pool: PgPool, generation_model: impl Into<String>, query_timeout: Duration) -> Self {
        Self {
            pool,
            generation_model: generation_model.into(),
            query_timeout,
        }
    }

    /// Open the pool described by the configuration
    pub async fn connect(config: &StorefrontConfig) -> Result<Self> {
        let pool = connect_pool(&config.database, config.query_timeout).await?;
        Ok(Self::new(
            pool,
            config.generation_model.clone(),
            config.query_timeout,
        ))
    }

    /// Build the store without opening a connection; the first query connects
    pub fn connect_lazy(config: &StorefrontConfig) -> Result<Self> {
        let pool = lazy_pool(&config.database, config.query_timeout)?;
        Ok(Self::new(
            pool,
            config.generation_model.clone(),
            config.query_timeout,
        ))
    }

    /// Get a reference to the Postgres pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Round trip to check the store is reachable
    pub async fn ping(&self) -> Result<()> {
        self.timed(sqlx::query("SELECT 1").execute(&self.pool))
            .await
            .map(|_| ())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn timed<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, sqlx::Error>>,
    {
        match tokio::time::timeout(self.query_timeout, fut).await {
            Ok(result) => result.map_err(StorefrontError::from),
            Err(_) => Err(StorefrontError::Timeout(self.query_timeout)),
        }
    }

    async fn distinct_values(&self, sql: &str) -> Result<Vec<String>> {
        let rows = self.timed(sqlx::query(sql).fetch_all(&self.pool)).await?;
        Ok(rows
            .iter()
            .filter_map(|row| row.try_get::<String, _>(0).ok())
            .collect())
    }
}

/// Build the connection pool. Connections found closed are replaced on the next
/// acquire, so a dropped session connection is re-created lazily.
pub async fn connect_pool(config: &DatabaseConfig, acquire_timeout: Duration) -> Result<PgPool> {
    config.validate()?;

    let pool = pool_options(config, acquire_timeout)
        .connect_with(config.connect_options())
        .await
        .map_err(|e| {
            StorefrontError::Connection(format!(
                "cannot reach {}:{}/{}: {e}",
                config.host, config.port, config.name
            ))
        })?;

    tracing::info!(
        host = %config.host,
        port = config.port,
        database = %config.name,
        "Connected to relational store"
    );
    Ok(pool)
}

fn pool_options(config: &DatabaseConfig, acquire_timeout: Duration) -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(acquire_timeout)
        .test_before_acquire(true)
}

/// Pool that connects on first use
pub fn lazy_pool(config: &DatabaseConfig, acquire_timeout: Duration) -> Result<PgPool> {
    config.validate()?;
    Ok(pool_options(config, acquire_timeout).connect_lazy_with(config.connect_options()))
}

#[async_trait]
impl CatalogBackend for PgStore {
    async fn categories(&self) -> Result<Vec<String>> {
        self.distinct_values(CATEGORIES_SQL).await
    }

    async fn genders(&self) -> Result<Vec<String>> {
        self.distinct_values(GENDERS_SQL).await
    }

    async fn products_by_category(&self, category: &str, limit: u32) -> Result<Vec<Product>> {
        let rows = self
            .timed(
                sqlx::query(PRODUCTS_BY_CATEGORY_SQL)
                    .bind(category)
                    .bind(i64::from(limit))
                    .fetch_all(&self.pool),
            )
            .await?;

        Ok(rows.iter().map(row_to_product).collect())
    }

    async fn product(&self, product_id: &str) -> Result<Option<Product>> {
        let row = self
            .timed(
                sqlx::query(PRODUCT_SQL)
                    .bind(product_id)
                    .fetch_optional(&self.pool),
            )
            .await?;

        Ok(row.as_ref().map(row_to_product))
    }

    async fn reviews(&self, product_id: &str) -> Result<Vec<Review>> {
        let fetch = sqlx::query(REVIEWS_SQL)
            .bind(product_id)
            .fetch(&self.pool)
            .map_ok(|row| row_to_review(&row))
            .try_collect::<Vec<_>>();

        self.timed(fetch).await
    }
}

#[async_trait]
impl RetrievalBackend for PgStore {
    async fn retrieve(&self, request: &RetrievalRequest<'_>) -> Result<Vec<RawHit>> {
        let sql = retrieval_sql(&request.input, request.gender.is_some());
        let candidates = i32::try_from(request.candidates).unwrap_or(i32::MAX);

        let query = sqlx::query(sql).bind(request.retriever);
        let query = match request.input {
            RetrievalInput::Text(text) => query.bind(text),
            RetrievalInput::Image(bytes) => query.bind(bytes),
        };
        let query = query.bind(candidates).bind(i64::from(request.limit));
        let query = match request.gender {
            Some(gender) => query.bind(gender),
            None => query,
        };

        tracing::debug!(
            retriever = request.retriever,
            kind = request.input.kind(),
            gender = ?request.gender,
            candidates = request.candidates,
            limit = request.limit,
            "Running retrieval"
        );

        let rows = self.timed(query.fetch_all(&self.pool)).await?;
        Ok(rows
            .iter()
            .map(|row| RawHit {
                key: row.try_get("key").unwrap_or_default(),
                distance: row.try_get("distance").unwrap_or(f64::MAX),
            })
            .collect())
    }
}

#[async_trait]
impl TextGenerator for PgStore {
    async fn generate(&self, prompt: &str) -> Result<Option<String>> {
        let row = self
            .timed(
                sqlx::query(DECODE_TEXT_SQL)
                    .bind(&self.generation_model)
                    .bind(prompt)
                    .fetch_optional(&self.pool),
            )
            .await
            .map_err(|e| match e {
                StorefrontError::Query(message) => StorefrontError::Generation(message),
                other => other,
            })?;

        Ok(row
            .and_then(|row| row.try_get::<Option<String>, _>(0).ok().flatten())
            .filter(|text| !text.trim().is_empty()))
    }
}

fn row_to_product(row: &PgRow) -> Product {
    Product {
        product_id: row.try_get("product_id").unwrap_or_default(),
        display_name: row.try_get("display_name").unwrap_or_default(),
        category: row.try_get("category").unwrap_or_default(),
        gender: row.try_get("gender").unwrap_or_default(),
    }
}

fn row_to_review(row: &PgRow) -> Review {
    Review {
        user_id: row
            .try_get::<Option<String>, _>("user_id")
            .ok()
            .flatten()
            .unwrap_or_default(),
        product_id: row
            .try_get::<Option<String>, _>("product_id")
            .ok()
            .flatten()
            .unwrap_or_default(),
        rating: row
            .try_get::<Option<i32>, _>("rating")
            .ok()
            .flatten()
            .unwrap_or_default(),
        review_text: row
            .try_get::<Option<String>, _>("review")
            .ok()
            .flatten()
            .unwrap_or_default(),
        timestamp: row
            .try_get::<Option<NaiveDateTime>, _>("timestamp")
            .ok()
            .flatten(),
    }
}
