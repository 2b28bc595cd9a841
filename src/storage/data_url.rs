use super::{ObjectStore, StorageError, TemporaryAsset};
use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
};

/// Local stand-in for pinning: the image travels inline as a `data:` URL and
/// the CID is a content hash, so deletion has nothing to remove.
#[derive(Debug, Clone, Default)]
pub struct DataUrlStore;

#[async_trait]
impl ObjectStore for DataUrlStore {
    async fn upload(
        &self,
        bytes: Vec<u8>,
        name: &str,
        _group_hint: Option<&str>,
    ) -> Result<TemporaryAsset, StorageError> {
        if bytes.is_empty() {
            return Err(StorageError::Request("empty image".into()));
        }
        let mut hasher = DefaultHasher::new();
        bytes.hash(&mut hasher);
        let cid = format!("local-{:016x}", hasher.finish());
        let url = format!("data:{};base64,{}", mime_for(name), BASE64.encode(&bytes));
        Ok(TemporaryAsset { cid, url })
    }

    async fn delete(&self, _cid: &str) -> Result<(), StorageError> {
        Ok(())
    }
}

fn mime_for(name: &str) -> &'static str {
    let lower = name.to_ascii_lowercase();
    match lower.rsplit_once('.').map(|(_, ext)| ext) {
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        Some("heic") => "image/heic",
        _ => "image/jpeg",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_bytes_give_same_cid() {
        let store = DataUrlStore;
        let a = store.upload(vec![1, 2, 3], "a.png", None).await.expect("a");
        let b = store.upload(vec![1, 2, 3], "b.png", None).await.expect("b");
        assert_eq!(a.cid, b.cid);
        assert!(a.url.starts_with("data:image/png;base64,"));
        store.delete(&a.cid).await.expect("delete is a no-op");
    }
}
