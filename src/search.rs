//! Similarity search over the catalog
//!
//! Text queries go to the text retriever built over product names, image
//! queries to the retriever built over the image volume. With a gender filter
//! the retriever is over-sampled and the hits are joined against products of
//! that gender before truncation, trading recall for a smaller result set.
//!
//! Results are ordered by ascending distance; equal distances fall back to
//! ascending key so the order is deterministic.

use crate::backend::{RawHit, RetrievalBackend, RetrievalInput, RetrievalRequest};
use crate::catalog::CatalogReader;
use crate::config::SearchConfig;
use crate::error::Result;
use crate::types::{SearchHit, SearchResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Which retriever a query goes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryKind {
    Text,
    Image,
}

/// A similarity query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchQuery {
    Text(String),
    Image(Vec<u8>),
}

impl SearchQuery {
    pub fn kind(&self) -> QueryKind {
        match self {
            Self::Text(_) => QueryKind::Text,
            Self::Image(_) => QueryKind::Image,
        }
    }

    fn input(&self) -> RetrievalInput<'_> {
        match self {
            Self::Text(text) => RetrievalInput::Text(text),
            Self::Image(bytes) => RetrievalInput::Image(bytes),
        }
    }
}

/// Resolved hits of one query
#[derive(Debug, Clone, Default)]
pub struct SearchOutcome {
    pub hits: Vec<SearchHit>,
    /// Rows returned by the retriever before product resolution
    pub retrieved: usize,
    pub elapsed: Duration,
}

/// Extract the record key from a retrieval key field.
///
/// The retrieval functions may hand back a composite row such as
/// `(15970,0.1234)` or `("15970.jpg",0.42)`; the key is the leading field with
/// parentheses, quotes and surrounding whitespace removed. A bare key passes
/// through unchanged.
pub fn decode_composite_key(raw: &str) -> String {
    let leading = raw.split(',').next().unwrap_or_default();
    leading
        .trim()
        .trim_matches(|c| c == '(' || c == ')')
        .trim()
        .trim_matches('"')
        .trim()
        .to_string()
}

/// Map a decoded key to the product id it names. Image keys carry the object
/// extension (`15970.jpg`); text keys are bare product ids.
pub fn key_to_product_id(key: &str, kind: QueryKind) -> &str {
    match kind {
        QueryKind::Text => key,
        QueryKind::Image => key.split('.').next().unwrap_or(key),
    }
}

/// Decode raw rows, order them best first and keep at most `limit`.
/// Rows without a comparable distance rank last.
pub fn rank_hits(raw: Vec<RawHit>, limit: usize) -> Vec<SearchResult> {
    let mut results: Vec<SearchResult> = raw
        .into_iter()
        .map(|hit| SearchResult {
            key: decode_composite_key(&hit.key),
            score: hit.distance,
        })
        .filter(|r| !r.key.is_empty())
        .collect();

    // NaN distances sort after every real distance
    results.sort_by(|a, b| {
        a.score
            .is_nan()
            .cmp(&b.score.is_nan())
            .then_with(|| a.score.total_cmp(&b.score))
            .then_with(|| a.key.cmp(&b.key))
    });
    results.truncate(limit);
    results
}

/// Runs similarity queries and resolves hits to products
#[derive(Clone)]
pub struct SimilaritySearch {
    backend: Arc<dyn RetrievalBackend>,
    catalog: Arc<CatalogReader>,
    config: SearchConfig,
}

impl std::fmt::Debug for SimilaritySearch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimilaritySearch")
            .field("config", &self.config)
            .finish()
    }
}

impl SimilaritySearch {
    pub fn new(
        backend: Arc<dyn RetrievalBackend>,
        catalog: Arc<CatalogReader>,
        config: SearchConfig,
    ) -> Self {
        Self {
            backend,
            catalog,
            config,
        }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Default number of results for a query kind
    pub fn top_k(&self, kind: QueryKind) -> u32 {
        match kind {
            QueryKind::Text => self.config.text_top_k,
            QueryKind::Image => self.config.image_top_k,
        }
    }

    fn request<'a>(
        &'a self,
        query: &'a SearchQuery,
        gender: Option<&'a str>,
        top_k: u32,
    ) -> RetrievalRequest<'a> {
        let (retriever, oversample) = match query.kind() {
            QueryKind::Text => (&self.config.text_retriever, self.config.text_oversample),
            QueryKind::Image => (&self.config.image_retriever, self.config.image_oversample),
        };
        let candidates = match gender {
            Some(_) => oversample.max(top_k),
            None => top_k,
        };
        RetrievalRequest {
            retriever,
            input: query.input(),
            gender,
            candidates,
            limit: top_k,
        }
    }

    /// Search with the default top-k of the query kind
    pub async fn search(
        &self,
        query: &SearchQuery,
        gender_filter: Option<&str>,
    ) -> Result<SearchOutcome> {
        self.search_top_k(query, gender_filter, self.top_k(query.kind()))
            .await
    }

    /// Search returning at most `top_k` hits, best first. Keys that do not map
    /// to a product are dropped.
    pub async fn search_top_k(
        &self,
        query: &SearchQuery,
        gender_filter: Option<&str>,
        top_k: u32,
    ) -> Result<SearchOutcome> {
        let started = Instant::now();
        let kind = query.kind();
        let gender = gender_filter.map(str::trim).filter(|g| !g.is_empty());
        let request = self.request(query, gender, top_k.max(1));

        let raw = self.backend.retrieve(&request).await?;
        let retrieved = raw.len();
        let ranked = rank_hits(raw, request.limit as usize);

        let mut hits = Vec::with_capacity(ranked.len());
        for result in ranked {
            let product = self
                .catalog
                .get_product(key_to_product_id(&result.key, kind))
                .await?;
            match product {
                Some(product) => hits.push(SearchHit { result, product }),
                None => tracing::debug!(key = %result.key, "Dropping hit without a product"),
            }
        }

        let elapsed = started.elapsed();
        tracing::info!(
            kind = ?kind,
            gender = ?gender,
            retrieved,
            resolved = hits.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Similarity search finished"
        );

        Ok(SearchOutcome {
            hits,
            retrieved,
            elapsed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheManager;
    use crate::error::StorefrontError;
    use crate::testing::{product, CannedRetriever, InMemoryCatalog};

    fn catalog() -> Arc<CatalogReader> {
        let backend = Arc::new(InMemoryCatalog::new(vec![
            product("1163", "Nike Sahara Team India Fanwear Round Neck Jersey", "Apparel", "Men"),
            product("1164", "Nike Blue Men Jersey", "Apparel", "Men"),
            product("1525", "Puma Deck Navy Blue Backpack", "Accessories", "Unisex"),
            product("1526", "Puma Big Cat Backpack Black", "Accessories", "Unisex"),
            product("2133", "Puma Women Pink Tee", "Apparel", "Women"),
        ]));
        Arc::new(CatalogReader::new(backend, Arc::new(CacheManager::default())))
    }

    fn client(retriever: CannedRetriever) -> (SimilaritySearch, Arc<CannedRetriever>) {
        let retriever = Arc::new(retriever);
        let search = SimilaritySearch::new(
            Arc::clone(&retriever) as Arc<dyn RetrievalBackend>,
            catalog(),
            SearchConfig::default(),
        );
        (search, retriever)
    }

    #[test]
    fn decodes_composite_keys() {
        assert_eq!(decode_composite_key("(1163,0.2817)"), "1163");
        assert_eq!(decode_composite_key("(\"1163.jpg\",0.5)"), "1163.jpg");
        assert_eq!(decode_composite_key(" 1525 "), "1525");
        assert_eq!(decode_composite_key("1525.jpg"), "1525.jpg");
        assert_eq!(decode_composite_key("()"), "");
    }

    #[test]
    fn image_keys_drop_the_extension() {
        assert_eq!(key_to_product_id("1525.jpg", QueryKind::Image), "1525");
        assert_eq!(key_to_product_id("1525", QueryKind::Image), "1525");
        assert_eq!(key_to_product_id("1525", QueryKind::Text), "1525");
    }

    #[test]
    fn ranking_is_ascending_with_key_tiebreak() {
        let ranked = rank_hits(
            vec![
                RawHit::new("(1164,0.30)", 0.30),
                RawHit::new("(1163,0.10)", 0.10),
                RawHit::new("(1526,0.30)", 0.30),
                RawHit::new("(1525,0.30)", 0.30),
            ],
            3,
        );
        let keys: Vec<&str> = ranked.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["1163", "1164", "1525"]);
        assert!(ranked.windows(2).all(|w| w[0].score <= w[1].score));
    }

    #[test]
    fn nan_distances_rank_last() {
        let raw: Vec<RawHit> = (0..200)
            .map(|i| {
                let distance = if i % 7 == 0 { f64::NAN } else { (i % 13) as f64 / 10.0 };
                RawHit::new(format!("({},{distance})", 2000 + i), distance)
            })
            .collect();
        let nan_count = raw.iter().filter(|h| h.distance.is_nan()).count();

        let ranked = rank_hits(raw, 200);
        assert_eq!(ranked.len(), 200);
        let (finite, nan) = ranked.split_at(200 - nan_count);
        assert!(finite.iter().all(|r| !r.score.is_nan()));
        assert!(nan.iter().all(|r| r.score.is_nan()));
        assert!(finite.windows(2).all(|w| w[0].score <= w[1].score));

        let top = rank_hits(vec![RawHit::new("9", f64::NAN), RawHit::new("8", 0.9)], 1);
        assert_eq!(top[0].key, "8");
    }

    #[tokio::test]
    async fn text_search_resolves_products_best_first() {
        let (search, retriever) = client(CannedRetriever::new(
            vec![
                RawHit::new("1164", 0.41),
                RawHit::new("(1163,0.12)", 0.12),
                RawHit::new("9999", 0.05),
                RawHit::new("2133", 0.77),
            ],
            vec![],
        ));

        let outcome = search
            .search(&SearchQuery::Text("india jersey".into()), None)
            .await
            .unwrap();

        let ids: Vec<&str> = outcome.hits.iter().map(|h| h.product.product_id.as_str()).collect();
        assert_eq!(ids, vec!["1163", "1164", "2133"]);
        assert_eq!(outcome.retrieved, 4);
        assert!(outcome
            .hits
            .windows(2)
            .all(|w| w[0].result.score <= w[1].result.score));
        assert_eq!(retriever.requests(), vec![("text".to_string(), None, 11, 11)]);
    }

    #[tokio::test]
    async fn gender_filter_oversamples() {
        let (search, retriever) = client(CannedRetriever::new(vec![], vec![]));
        search
            .search(&SearchQuery::Text("jersey".into()), Some("Men"))
            .await
            .unwrap();
        search
            .search(&SearchQuery::Image(vec![0xff, 0xd8]), Some("Unisex"))
            .await
            .unwrap();
        search
            .search(&SearchQuery::Image(vec![0xff, 0xd8]), Some("  "))
            .await
            .unwrap();

        assert_eq!(
            retriever.requests(),
            vec![
                ("text".to_string(), Some("Men".to_string()), 100, 11),
                ("image".to_string(), Some("Unisex".to_string()), 40, 5),
                ("image".to_string(), None, 5, 5),
            ]
        );
    }

    fn mixed_catalog() -> Vec<crate::types::Product> {
        let genders = ["Men", "Women", "Unisex"];
        (0..60)
            .map(|i| {
                product(
                    &(3000 + i).to_string(),
                    &format!("Item {i}"),
                    "Apparel",
                    genders[i % 3],
                )
            })
            .collect()
    }

    fn gendered_client(retriever: CannedRetriever) -> SimilaritySearch {
        let products = mixed_catalog();
        let catalog = Arc::new(CatalogReader::new(
            Arc::new(InMemoryCatalog::new(products.clone())),
            Arc::new(CacheManager::default()),
        ));
        SimilaritySearch::new(
            Arc::new(retriever.with_products(products)),
            catalog,
            SearchConfig::default(),
        )
    }

    #[tokio::test]
    async fn gender_filter_keeps_only_that_gender() {
        // every product is a candidate; later ids are closer
        let text_hits = (0..60)
            .map(|i| RawHit::new(format!("({},{})", 3000 + i, 60 - i), (60 - i) as f64))
            .collect();
        let image_hits = (0..60)
            .map(|i| RawHit::new(format!("{}.jpg", 3000 + i), (60 - i) as f64 / 100.0))
            .collect();
        let search = gendered_client(CannedRetriever::new(text_hits, image_hits));

        let text = search
            .search(&SearchQuery::Text("shirt".into()), Some("Men"))
            .await
            .unwrap();
        assert_eq!(text.hits.len(), 11);
        assert!(text.hits.iter().all(|h| h.product.gender == "Men"));
        assert!(text
            .hits
            .windows(2)
            .all(|w| w[0].result.score <= w[1].result.score));
        assert_eq!(text.hits[0].product.product_id, "3057");

        let image = search
            .search(&SearchQuery::Image(vec![0xff, 0xd8]), Some("Women"))
            .await
            .unwrap();
        assert_eq!(image.hits.len(), 5);
        assert!(image.hits.iter().all(|h| h.product.gender == "Women"));
        assert!(image
            .hits
            .windows(2)
            .all(|w| w[0].result.score <= w[1].result.score));

        let unfiltered = search
            .search(&SearchQuery::Text("shirt".into()), None)
            .await
            .unwrap();
        assert_eq!(unfiltered.hits.len(), 11);
    }

    #[tokio::test]
    async fn image_results_are_bounded_by_top_k() {
        let image_hits = (0..12)
            .map(|i| RawHit::new(format!("({}.jpg,0.{i:02})", 1163 + (i % 2)), i as f64 / 100.0))
            .collect();
        let (search, _) = client(CannedRetriever::new(vec![], image_hits));

        let outcome = search
            .search(&SearchQuery::Image(vec![1, 2, 3]), None)
            .await
            .unwrap();
        assert!(outcome.hits.len() <= 5);
        assert!(outcome.hits.iter().all(|h| h.result.key.ends_with(".jpg")));
    }

    #[tokio::test]
    async fn query_failures_surface_as_errors() {
        let (search, _) = client(CannedRetriever::failing("function aidb.retrieve_text does not exist"));
        let err = search
            .search(&SearchQuery::Text("shoes".into()), None)
            .await
            .unwrap_err();
        assert!(matches!(err, StorefrontError::Query(_)));
    }
}
