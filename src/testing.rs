//! In-memory stand-ins for the external services, shared by unit tests.

use crate::catalog::{CatalogError, CatalogProvider};
use crate::llm::{ImageDescriber, LlmError};
use crate::models::CatalogProduct;
use crate::storage::{ObjectStore, StorageError, TemporaryAsset};
use async_trait::async_trait;
use std::sync::{
    Mutex,
    atomic::{AtomicU32, Ordering},
};
use std::time::Duration;

#[derive(Debug, Default)]
pub struct FakeStore {
    uploads: AtomicU32,
    deletes: AtomicU32,
    failing_deletes: u32,
    fail_uploads: bool,
    deleted: Mutex<Vec<String>>,
    last_upload: Mutex<Option<(String, Option<String>)>>,
}

impl FakeStore {
    /// Fails the first `count` delete calls.
    pub fn failing_deletes(count: u32) -> Self {
        Self {
            failing_deletes: count,
            ..Self::default()
        }
    }

    pub fn failing_uploads() -> Self {
        Self {
            fail_uploads: true,
            ..Self::default()
        }
    }

    pub fn uploads(&self) -> u32 {
        self.uploads.load(Ordering::SeqCst)
    }

    pub fn deletes(&self) -> u32 {
        self.deletes.load(Ordering::SeqCst)
    }

    pub fn deleted_cids(&self) -> Vec<String> {
        self.deleted.lock().expect("lock").clone()
    }

    pub fn last_name(&self) -> Option<String> {
        self.last_upload
            .lock()
            .expect("lock")
            .as_ref()
            .map(|(name, _)| name.clone())
    }

    pub fn last_group(&self) -> Option<String> {
        self.last_upload
            .lock()
            .expect("lock")
            .as_ref()
            .and_then(|(_, group)| group.clone())
    }
}

#[async_trait]
impl ObjectStore for FakeStore {
    async fn upload(
        &self,
        bytes: Vec<u8>,
        name: &str,
        group_hint: Option<&str>,
    ) -> Result<TemporaryAsset, StorageError> {
        if self.fail_uploads {
            return Err(StorageError::Request("upload refused".into()));
        }
        self.uploads.fetch_add(1, Ordering::SeqCst);
        *self.last_upload.lock().expect("lock") =
            Some((name.to_string(), group_hint.map(str::to_string)));
        let cid = format!("fake-{}", bytes.len());
        Ok(TemporaryAsset {
            url: format!("https://gateway.test/ipfs/{cid}"),
            cid,
        })
    }

    async fn delete(&self, cid: &str) -> Result<(), StorageError> {
        let attempt = self.deletes.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.failing_deletes {
            return Err(StorageError::Request("unpin refused".into()));
        }
        self.deleted.lock().expect("lock").push(cid.to_string());
        Ok(())
    }
}

#[derive(Debug)]
enum Reply {
    Text(String),
    Fail,
    Hang,
}

#[derive(Debug)]
pub struct FakeDescriber {
    reply: Reply,
    calls: AtomicU32,
}

impl FakeDescriber {
    fn with(reply: Reply) -> Self {
        Self {
            reply,
            calls: AtomicU32::new(0),
        }
    }

    pub fn text(text: &str) -> Self {
        Self::with(Reply::Text(text.to_string()))
    }

    pub fn failing() -> Self {
        Self::with(Reply::Fail)
    }

    /// Never answers within any sane timeout.
    pub fn hanging() -> Self {
        Self::with(Reply::Hang)
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageDescriber for FakeDescriber {
    async fn describe(&self, _image_url: &str, _prompt: &str) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.reply {
            Reply::Text(text) => Ok(text.clone()),
            Reply::Fail => Err(LlmError::Http("HTTP 502 Bad Gateway".into())),
            Reply::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(LlmError::Http("unreachable".into()))
            }
        }
    }
}

#[derive(Debug)]
pub struct FailingCatalog;

#[async_trait]
impl CatalogProvider for FailingCatalog {
    async fn list_products(&self) -> Result<Vec<CatalogProduct>, CatalogError> {
        Err(CatalogError::Request("HTTP 503 Service Unavailable".into()))
    }
}
