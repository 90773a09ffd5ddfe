//! Runtime configuration
//!
//! Database settings come from `DB_USER`, `DB_HOST`, `DB_PORT`, `DB_NAME` and
//! `DB_PASSWORD`. Required values are checked before anything connects, so a
//! missing user or database name is reported as a configuration error instead
//! of surfacing later as a malformed connection.

use crate::cache::CacheConfig;
use crate::error::{Result, StorefrontError};
use clap::Args;
use sqlx::postgres::PgConnectOptions;
use std::time::Duration;

pub const DEFAULT_TEXT_RETRIEVER: &str = "recommend_products";
pub const DEFAULT_IMAGE_RETRIEVER: &str = "recom_images";
pub const DEFAULT_GENERATION_MODEL: &str = "product_review_model";
pub const DEFAULT_S3_ENDPOINT: &str = "http://s3.eu-central-1.amazonaws.com";
pub const DEFAULT_S3_BUCKET: &str = "public-ai-images";

/// Connection settings for the relational store
#[derive(Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub user: String,
    pub host: String,
    pub port: u16,
    pub name: String,
    pub password: Option<String>,
    pub max_connections: u32,
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("user", &self.user)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("name", &self.name)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            user: String::new(),
            host: "localhost".to_string(),
            port: 5432,
            name: String::new(),
            password: None,
            max_connections: 5,
        }
    }
}

impl DatabaseConfig {
    /// Read the `DB_*` variables from the process environment and validate them
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any variable source (the environment, a test map, ...)
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let port = match non_empty("DB_PORT") {
            Some(raw) => raw.trim().parse::<u16>().map_err(|_| {
                StorefrontError::Configuration(format!("DB_PORT is not a valid port: {raw}"))
            })?,
            None => defaults.port,
        };

        let config = Self {
            user: non_empty("DB_USER").unwrap_or_default(),
            host: non_empty("DB_HOST").unwrap_or(defaults.host),
            port,
            name: non_empty("DB_NAME").unwrap_or_default(),
            password: non_empty("DB_PASSWORD"),
            max_connections: defaults.max_connections,
        };
        config.validate()?;
        Ok(config)
    }

    /// Fail fast on settings that cannot produce a working connection
    pub fn validate(&self) -> Result<()> {
        let mut missing = Vec::new();
        if self.user.trim().is_empty() {
            missing.push("DB_USER");
        }
        if self.name.trim().is_empty() {
            missing.push("DB_NAME");
        }
        if !missing.is_empty() {
            return Err(StorefrontError::Configuration(format!(
                "missing required environment variable(s): {}",
                missing.join(", ")
            )));
        }
        if self.host.trim().is_empty() {
            return Err(StorefrontError::Configuration("DB_HOST is empty".into()));
        }
        if self.max_connections == 0 {
            return Err(StorefrontError::Configuration(
                "max_connections must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn connect_options(&self) -> PgConnectOptions {
        let options = PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .database(&self.name);
        match &self.password {
            Some(password) => options.password(password),
            None => options,
        }
    }
}

/// Where product images live
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectStoreConfig {
    pub endpoint: String,
    pub bucket: String,
    pub timeout: Duration,
}

impl Default for ObjectStoreConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_S3_ENDPOINT.to_string(),
            bucket: DEFAULT_S3_BUCKET.to_string(),
            timeout: Duration::from_secs(20),
        }
    }
}

/// Result sizes for similarity search
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchConfig {
    pub text_retriever: String,
    pub image_retriever: String,
    pub text_top_k: u32,
    pub image_top_k: u32,
    /// Candidates pulled before the gender join for text queries
    pub text_oversample: u32,
    /// Candidates pulled before the gender join for image queries
    pub image_oversample: u32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            text_retriever: DEFAULT_TEXT_RETRIEVER.to_string(),
            image_retriever: DEFAULT_IMAGE_RETRIEVER.to_string(),
            text_top_k: 11,
            image_top_k: 5,
            text_oversample: 100,
            image_oversample: 40,
        }
    }
}

/// Everything needed to assemble a [`crate::Storefront`]
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    pub database: DatabaseConfig,
    pub object_store: ObjectStoreConfig,
    pub search: SearchConfig,
    pub generation_model: String,
    /// Products listed per category
    pub catalog_page_size: u32,
    /// Reviews shown on the review page
    pub reviews_shown: usize,
    pub query_timeout: Duration,
    pub cache: CacheConfig,
}

impl Default for StorefrontConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            object_store: ObjectStoreConfig::default(),
            search: SearchConfig::default(),
            generation_model: DEFAULT_GENERATION_MODEL.to_string(),
            catalog_page_size: 30,
            reviews_shown: 5,
            query_timeout: Duration::from_secs(60),
            cache: CacheConfig::default(),
        }
    }
}

impl StorefrontConfig {
    pub fn validate(&self) -> Result<()> {
        self.database.validate()?;
        if self.search.text_top_k == 0 || self.search.image_top_k == 0 {
            return Err(StorefrontError::Configuration("top-k must be positive".into()));
        }
        if self.search.text_oversample < self.search.text_top_k
            || self.search.image_oversample < self.search.image_top_k
        {
            return Err(StorefrontError::Configuration(
                "oversample size must not be below top-k".into(),
            ));
        }
        if self.object_store.bucket.trim().is_empty() {
            return Err(StorefrontError::Configuration("bucket name is empty".into()));
        }
        Ok(())
    }
}

/// Command line / environment settings shared by the binaries
#[derive(Debug, Clone, Args)]
pub struct StorefrontArgs {
    /// Database user
    #[arg(long, env = "DB_USER", default_value = "")]
    pub db_user: String,

    /// Database host
    #[arg(long, env = "DB_HOST", default_value = "localhost")]
    pub db_host: String,

    /// Database port
    #[arg(long, env = "DB_PORT", default_value_t = 5432)]
    pub db_port: u16,

    /// Database name
    #[arg(long, env = "DB_NAME", default_value = "")]
    pub db_name: String,

    /// Database password
    #[arg(long, env = "DB_PASSWORD", hide_env_values = true)]
    pub db_password: Option<String>,

    /// Pool size
    #[arg(long, env = "DB_MAX_CONNECTIONS", default_value_t = 5)]
    pub db_max_connections: u32,

    /// Retriever used for text queries
    #[arg(long, env = "TEXT_RETRIEVER", default_value = DEFAULT_TEXT_RETRIEVER)]
    pub text_retriever: String,

    /// Retriever used for image queries
    #[arg(long, env = "IMAGE_RETRIEVER", default_value = DEFAULT_IMAGE_RETRIEVER)]
    pub image_retriever: String,

    /// Generation model used for review summaries
    #[arg(long, env = "GENERATION_MODEL", default_value = DEFAULT_GENERATION_MODEL)]
    pub generation_model: String,

    /// Object storage endpoint
    #[arg(long, env = "S3_ENDPOINT", default_value = DEFAULT_S3_ENDPOINT)]
    pub s3_endpoint: String,

    /// Bucket holding product images
    #[arg(long, env = "S3_BUCKET", default_value = DEFAULT_S3_BUCKET)]
    pub s3_bucket: String,

    /// Timeout for database and generation calls, in seconds
    #[arg(long, env = "QUERY_TIMEOUT_SECS", default_value_t = 60)]
    pub query_timeout_secs: u64,

    /// Timeout for image fetches, in seconds
    #[arg(long, env = "FETCH_TIMEOUT_SECS", default_value_t = 20)]
    pub fetch_timeout_secs: u64,
}

impl StorefrontArgs {
    pub fn into_config(self) -> Result<StorefrontConfig> {
        let config = StorefrontConfig {
            database: DatabaseConfig {
                user: self.db_user,
                host: self.db_host,
                port: self.db_port,
                name: self.db_name,
                password: self.db_password.filter(|p| !p.is_empty()),
                max_connections: self.db_max_connections,
            },
            object_store: ObjectStoreConfig {
                endpoint: self.s3_endpoint.trim_end_matches('/').to_string(),
                bucket: self.s3_bucket,
                timeout: Duration::from_secs(self.fetch_timeout_secs),
            },
            search: SearchConfig {
                text_retriever: self.text_retriever,
                image_retriever: self.image_retriever,
                ..SearchConfig::default()
            },
            generation_model: self.generation_model,
            query_timeout: Duration::from_secs(self.query_timeout_secs),
            ..StorefrontConfig::default()
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn reads_database_settings() {
        let config = DatabaseConfig::from_lookup(lookup(&[
            ("DB_USER", "shop"),
            ("DB_NAME", "catalog"),
            ("DB_PORT", "5444"),
        ]))
        .unwrap();

        assert_eq!(config.user, "shop");
        assert_eq!(config.name, "catalog");
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 5444);
        assert!(config.password.is_none());
    }

    #[test]
    fn missing_user_and_name_fail_fast() {
        let err = DatabaseConfig::from_lookup(lookup(&[("DB_HOST", "db")])).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("DB_USER"));
        assert!(message.contains("DB_NAME"));
    }

    #[test]
    fn rejects_bad_port() {
        let err = DatabaseConfig::from_lookup(lookup(&[
            ("DB_USER", "shop"),
            ("DB_NAME", "catalog"),
            ("DB_PORT", "fifty"),
        ]))
        .unwrap_err();
        assert!(matches!(err, StorefrontError::Configuration(_)));
    }

    #[test]
    fn password_is_redacted_in_debug_output() {
        let config = DatabaseConfig {
            user: "shop".into(),
            name: "catalog".into(),
            password: Some("hunter2".into()),
            ..DatabaseConfig::default()
        };
        assert!(!format!("{config:?}").contains("hunter2"));
    }

    #[test]
    fn default_search_sizes() {
        let search = SearchConfig::default();
        assert_eq!((search.text_top_k, search.text_oversample), (11, 100));
        assert_eq!((search.image_top_k, search.image_oversample), (5, 40));
    }
}
