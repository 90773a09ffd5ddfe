//! Catalog reader: cached read-only queries over products

use crate::backend::CatalogBackend;
use crate::cache::{CacheKey, CacheManager, CATALOG_NAMESPACE};
use crate::error::Result;
use crate::types::{Product, ProductTile, Review};
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::sync::Arc;

/// Reads categories, genders and products, memoized per exact arguments
#[derive(Clone)]
pub struct CatalogReader {
    backend: Arc<dyn CatalogBackend>,
    cache: Arc<CacheManager>,
}

impl std::fmt::Debug for CatalogReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogReader")
            .field("cache", &self.cache)
            .finish()
    }
}

impl CatalogReader {
    pub fn new(backend: Arc<dyn CatalogBackend>, cache: Arc<CacheManager>) -> Self {
        Self { backend, cache }
    }

    async fn cached<T, F, Fut>(&self, key: CacheKey, load: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(value) = self.cache.get::<T>(&key).await {
            return Ok(value);
        }
        let value = load().await?;
        if let Err(e) = self.cache.put(key, &value).await {
            tracing::warn!("Failed to cache catalog read: {}", e);
        }
        Ok(value)
    }

    /// Distinct categories, lexicographically ordered
    pub async fn list_categories(&self) -> Result<Vec<String>> {
        self.cached(CacheKey::categories(), || async {
            let mut categories = self.backend.categories().await?;
            sort_distinct(&mut categories);
            Ok(categories)
        })
        .await
    }

    /// Distinct genders, lexicographically ordered
    pub async fn list_genders(&self) -> Result<Vec<String>> {
        self.cached(CacheKey::genders(), || async {
            let mut genders = self.backend.genders().await?;
            sort_distinct(&mut genders);
            Ok(genders)
        })
        .await
    }

    /// Up to `limit` products of `category`, ordered by display name. An empty
    /// list means the category has no products.
    pub async fn list_products_by_category(
        &self,
        category: &str,
        limit: u32,
    ) -> Result<Vec<ProductTile>> {
        let products = self
            .cached(CacheKey::products(category, limit), || async {
                let mut products: Vec<Product> = self
                    .backend
                    .products_by_category(category, limit)
                    .await?
                    .into_iter()
                    .filter(|p| p.category == category)
                    .collect();
                products.sort_by(|a, b| {
                    a.display_name
                        .cmp(&b.display_name)
                        .then_with(|| a.product_id.cmp(&b.product_id))
                });
                products.truncate(limit as usize);
                Ok(products)
            })
            .await?;

        Ok(products.into_iter().map(ProductTile::from).collect())
    }

    /// Look up one product; absence is cached too
    pub async fn get_product(&self, product_id: &str) -> Result<Option<Product>> {
        self.cached(CacheKey::product(product_id), || {
            self.backend.product(product_id)
        })
        .await
    }

    /// Reviews of a product, read fresh on every call
    pub async fn reviews_for(&self, product_id: &str) -> Result<Vec<Review>> {
        self.backend.reviews(product_id).await
    }

    /// Drop every cached catalog read
    pub async fn invalidate(&self) -> usize {
        let removed = self.cache.invalidate_prefix(CATALOG_NAMESPACE).await;
        tracing::info!(removed, "Invalidated catalog cache");
        removed
    }
}

fn sort_distinct(values: &mut Vec<String>) {
    values.sort();
    values.dedup();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{product, InMemoryCatalog};

    fn reader(catalog: Arc<InMemoryCatalog>) -> CatalogReader {
        CatalogReader::new(catalog, Arc::new(CacheManager::default()))
    }

    fn sample_catalog() -> Arc<InMemoryCatalog> {
        Arc::new(InMemoryCatalog::new(vec![
            product("3", "Puma Men Blue Shirt", "Apparel", "Men"),
            product("1", "Adidas Women Track Pants", "Apparel", "Women"),
            product("7", "Nike Men Running Shoes", "Footwear", "Men"),
            product("2", "Baggit Women Handbag", "Accessories", "Women"),
            product("5", "Fabindia Girls Kurta", "Apparel", "Girls"),
        ]))
    }

    #[tokio::test]
    async fn categories_are_sorted_and_distinct() {
        let reader = reader(sample_catalog());
        assert_eq!(
            reader.list_categories().await.unwrap(),
            vec!["Accessories", "Apparel", "Footwear"]
        );
        assert_eq!(
            reader.list_genders().await.unwrap(),
            vec!["Girls", "Men", "Women"]
        );
    }

    #[tokio::test]
    async fn products_match_category_in_name_order_within_limit() {
        let reader = reader(sample_catalog());

        for category in ["Apparel", "Footwear", "Accessories"] {
            for limit in [1, 2, 30] {
                let tiles = reader.list_products_by_category(category, limit).await.unwrap();
                assert!(tiles.len() <= limit as usize);
                assert!(tiles.iter().all(|t| t.product.category == category));
                assert!(tiles
                    .windows(2)
                    .all(|w| w[0].product.display_name <= w[1].product.display_name));
            }
        }

        let tiles = reader.list_products_by_category("Apparel", 30).await.unwrap();
        let names: Vec<&str> = tiles.iter().map(|t| t.product.display_name.as_str()).collect();
        assert_eq!(
            names,
            vec!["Adidas Women Track Pants", "Fabindia Girls Kurta", "Puma Men Blue Shirt"]
        );
        assert_eq!(tiles[0].image_key, "1.jpg");
    }

    #[tokio::test]
    async fn unknown_category_is_empty() {
        let reader = reader(sample_catalog());
        assert!(reader
            .list_products_by_category("Home", 30)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn reads_are_cached_until_invalidated() {
        let catalog = sample_catalog();
        let reader = reader(Arc::clone(&catalog));

        reader.list_categories().await.unwrap();
        reader.list_categories().await.unwrap();
        assert_eq!(catalog.calls(), 1);

        assert!(reader.get_product("404").await.unwrap().is_none());
        assert!(reader.get_product("404").await.unwrap().is_none());
        assert_eq!(catalog.calls(), 2);

        assert!(reader.invalidate().await >= 2);
        reader.list_categories().await.unwrap();
        assert_eq!(catalog.calls(), 3);
    }
}
