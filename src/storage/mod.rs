//! Temporary image staging on content-addressed storage.
//!
//! Every staged asset belongs to exactly one search request and is removed by
//! [`cleanup`] once the request is done with it.

pub mod cleanup;
mod data_url;
mod pinata;

pub use data_url::DataUrlStore;
pub use pinata::{PinataConfig, PinataStore};

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemporaryAsset {
    pub cid: String,
    pub url: String,
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("image is {size} bytes, limit is {limit}")]
    TooLarge { size: usize, limit: usize },
    #[error("request failed: {0}")]
    Request(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn upload(
        &self,
        bytes: Vec<u8>,
        name: &str,
        group_hint: Option<&str>,
    ) -> Result<TemporaryAsset, StorageError>;

    async fn delete(&self, cid: &str) -> Result<(), StorageError>;
}

/// Pinata when credentials are present, otherwise an in-process data URL store.
pub fn store_from_env() -> Arc<dyn ObjectStore> {
    match PinataConfig::from_env() {
        Some(config) => {
            info!(target = "photomatch.storage", gateway = %config.gateway, "using pinata storage");
            Arc::new(PinataStore::new(config))
        }
        None => {
            info!(
                target = "photomatch.storage",
                "PINATA_JWT not set; staging images as data urls"
            );
            Arc::new(DataUrlStore::default())
        }
    }
}

/// Uploads an image after enforcing the size limit. Oversized input never
/// reaches the store.
pub async fn stage_image(
    store: &dyn ObjectStore,
    bytes: Vec<u8>,
    filename: Option<&str>,
    group_hint: Option<&str>,
    limit: usize,
) -> Result<TemporaryAsset, StorageError> {
    if bytes.len() > limit {
        return Err(StorageError::TooLarge {
            size: bytes.len(),
            limit,
        });
    }
    let name = asset_name(filename);
    store.upload(bytes, &name, group_hint).await
}

fn asset_name(filename: Option<&str>) -> String {
    let extension = filename
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric()));
    match extension {
        Some(ext) => format!("search-{}.{ext}", Uuid::new_v4().simple()),
        None => format!("search-{}", Uuid::new_v4().simple()),
    }
}
