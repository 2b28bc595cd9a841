use crate::http::build_client;
use crate::models::{CatalogProduct, ProductId};
use async_trait::async_trait;
use reqwest::Client;
use std::{path::PathBuf, sync::Arc};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("invalid response: {0}")]
    Deserialize(String),
    #[error("catalog file `{path}`: {message}")]
    File { path: String, message: String },
}

/// Read-only source of products. Called once per search request.
#[async_trait]
pub trait CatalogProvider: Send + Sync {
    async fn list_products(&self) -> Result<Vec<CatalogProduct>, CatalogError>;
}

/// Supabase when configured, then a JSON file, then the built-in demo catalog.
pub fn catalog_from_env() -> Arc<dyn CatalogProvider> {
    if let Some(client) = SupabaseCatalog::from_env() {
        info!(target = "photomatch.catalog", table = %client.table, "using supabase catalog");
        return Arc::new(client);
    }
    if let Ok(path) = std::env::var("CATALOG_PATH")
        && !path.trim().is_empty()
    {
        info!(target = "photomatch.catalog", path = %path, "using file catalog");
        return Arc::new(FileCatalog::new(path.trim()));
    }
    info!(target = "photomatch.catalog", "using demo catalog");
    Arc::new(StaticCatalog::demo())
}

/// Reads products through the PostgREST endpoint of a Supabase project.
#[derive(Debug, Clone)]
pub struct SupabaseCatalog {
    base_url: String,
    service_key: String,
    table: String,
    http: Client,
}

impl SupabaseCatalog {
    pub fn from_env() -> Option<Self> {
        let base_url = std::env::var("SUPABASE_URL").ok()?;
        let service_key = std::env::var("SUPABASE_SERVICE_ROLE_KEY")
            .or_else(|_| std::env::var("SUPABASE_SERVICE_KEY"))
            .or_else(|_| std::env::var("SUPABASE_KEY"))
            .ok()?;
        let table = std::env::var("CATALOG_TABLE").unwrap_or_else(|_| "products".into());
        Some(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            service_key,
            table,
            http: build_client(),
        })
    }

    fn products_url(&self) -> String {
        format!(
            "{}/rest/v1/{}?select=id,name,description,category,price,stock&order=id.asc",
            self.base_url,
            urlencoding::encode(&self.table)
        )
    }
}

#[async_trait]
impl CatalogProvider for SupabaseCatalog {
    async fn list_products(&self) -> Result<Vec<CatalogProduct>, CatalogError> {
        let response = self
            .http
            .get(self.products_url())
            .header("apikey", &self.service_key)
            .header("Authorization", format!("Bearer {}", self.service_key))
            .send()
            .await
            .map_err(|err| CatalogError::Request(err.to_string()))?;

        if !response.status().is_success() {
            return Err(CatalogError::Request(format!(
                "HTTP {}",
                response.status()
            )));
        }

        response
            .json::<Vec<CatalogProduct>>()
            .await
            .map_err(|err| CatalogError::Deserialize(err.to_string()))
    }
}

/// JSON array of products on disk, re-read for every request.
#[derive(Debug, Clone)]
pub struct FileCatalog {
    path: PathBuf,
}

impl FileCatalog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl CatalogProvider for FileCatalog {
    async fn list_products(&self) -> Result<Vec<CatalogProduct>, CatalogError> {
        let file_error = |message: String| CatalogError::File {
            path: self.path.display().to_string(),
            message,
        };
        let raw = tokio::fs::read(&self.path)
            .await
            .map_err(|err| file_error(err.to_string()))?;
        serde_json::from_slice(&raw).map_err(|err| file_error(err.to_string()))
    }
}

#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    products: Vec<CatalogProduct>,
}

impl StaticCatalog {
    pub fn new(products: Vec<CatalogProduct>) -> Self {
        Self { products }
    }

    pub fn demo() -> Self {
        let entries: [(i64, &str, &str, &str, f64, i64); 6] = [
            (
                1,
                "Rare Beauty Soft Pinch Liquid Blush",
                "Weightless liquid blush in a round glass bottle with a white cap",
                "Makeup",
                23.0,
                40,
            ),
            (
                2,
                "CeraVe Moisturizing Cream",
                "Moisturizer with ceramides and hyaluronic acid in a white jar",
                "Skincare",
                17.99,
                120,
            ),
            (
                3,
                "The Ordinary Niacinamide 10% + Zinc 1%",
                "Serum in a clear glass dropper bottle with niacinamide and zinc",
                "Skincare",
                6.5,
                75,
            ),
            (
                4,
                "MAC Matte Lipstick Ruby Woo",
                "Matte red lipstick in a black bullet tube",
                "Makeup",
                21.0,
                32,
            ),
            (
                5,
                "Fenty Beauty Pro Filt'r Foundation",
                "Soft matte longwear foundation in a frosted glass bottle with pump",
                "Makeup",
                40.0,
                18,
            ),
            (
                6,
                "La Roche-Posay Anthelios Sunscreen SPF 60",
                "Melt-in sunscreen milk in a white and blue tube",
                "Skincare",
                36.99,
                54,
            ),
        ];
        Self::new(
            entries
                .into_iter()
                .map(|(id, name, description, category, price, stock)| CatalogProduct {
                    id: ProductId::Numeric(id),
                    name: name.into(),
                    description: Some(description.into()),
                    category: Some(category.into()),
                    price,
                    stock,
                })
                .collect(),
        )
    }
}

#[async_trait]
impl CatalogProvider for StaticCatalog {
    async fn list_products(&self) -> Result<Vec<CatalogProduct>, CatalogError> {
        Ok(self.products.clone())
    }
}
