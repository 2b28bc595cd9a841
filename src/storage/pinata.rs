use super::{ObjectStore, StorageError, TemporaryAsset};
use crate::http::build_client;
use async_trait::async_trait;
use reqwest::{Client, multipart};
use serde::Deserialize;
use serde_json::json;
use urlencoding::encode;

const DEFAULT_API_URL: &str = "https://api.pinata.cloud";
const DEFAULT_GATEWAY: &str = "gateway.pinata.cloud";

#[derive(Debug, Clone)]
pub struct PinataConfig {
    pub jwt: String,
    pub api_url: String,
    pub gateway: String,
}

impl PinataConfig {
    pub fn from_env() -> Option<Self> {
        let jwt = std::env::var("PINATA_JWT")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())?;
        let api_url = std::env::var("PINATA_API_URL")
            .unwrap_or_else(|_| DEFAULT_API_URL.into())
            .trim_end_matches('/')
            .to_string();
        let gateway = std::env::var("PINATA_GATEWAY")
            .ok()
            .map(|v| normalize_gateway(&v))
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_GATEWAY.into());
        Some(Self {
            jwt,
            api_url,
            gateway,
        })
    }
}

#[derive(Debug, Clone)]
pub struct PinataStore {
    config: PinataConfig,
    http: Client,
}

impl PinataStore {
    pub fn new(config: PinataConfig) -> Self {
        Self {
            config,
            http: build_client(),
        }
    }

    fn gateway_url(&self, cid: &str) -> String {
        format!("https://{}/ipfs/{}", self.config.gateway, cid)
    }
}

#[async_trait]
impl ObjectStore for PinataStore {
    async fn upload(
        &self,
        bytes: Vec<u8>,
        name: &str,
        group_hint: Option<&str>,
    ) -> Result<TemporaryAsset, StorageError> {
        let mut options = json!({ "cidVersion": 1 });
        if let Some(group) = group_hint {
            options["groupId"] = json!(group);
        }
        let form = multipart::Form::new()
            .part(
                "file",
                multipart::Part::bytes(bytes).file_name(name.to_string()),
            )
            .text("pinataMetadata", json!({ "name": name }).to_string())
            .text("pinataOptions", options.to_string());

        let response = self
            .http
            .post(format!("{}/pinning/pinFileToIPFS", self.config.api_url))
            .bearer_auth(&self.config.jwt)
            .multipart(form)
            .send()
            .await
            .map_err(|err| StorageError::Request(err.to_string()))?;

        if !response.status().is_success() {
            return Err(StorageError::Request(format!(
                "HTTP {}",
                response.status()
            )));
        }

        let payload: PinResponse = response
            .json()
            .await
            .map_err(|err| StorageError::InvalidResponse(err.to_string()))?;
        if payload.ipfs_hash.trim().is_empty() {
            return Err(StorageError::InvalidResponse("empty IpfsHash".into()));
        }
        Ok(TemporaryAsset {
            url: self.gateway_url(&payload.ipfs_hash),
            cid: payload.ipfs_hash,
        })
    }

    async fn delete(&self, cid: &str) -> Result<(), StorageError> {
        let response = self
            .http
            .delete(format!(
                "{}/pinning/unpin/{}",
                self.config.api_url,
                encode(cid)
            ))
            .bearer_auth(&self.config.jwt)
            .send()
            .await
            .map_err(|err| StorageError::Request(err.to_string()))?;

        if !response.status().is_success() {
            return Err(StorageError::Request(format!(
                "HTTP {}",
                response.status()
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct PinResponse {
    #[serde(rename = "IpfsHash")]
    ipfs_hash: String,
}

fn normalize_gateway(raw: &str) -> String {
    raw.trim()
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_end_matches('/')
        .to_string()
}
