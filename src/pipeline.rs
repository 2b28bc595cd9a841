use crate::catalog::{self, CatalogError, CatalogProvider};
use crate::config::{CleanupMode, SearchConfig};
use crate::llm::{ImageDescriber, LlmClient, LlmConfig, LlmError, VISION_PROMPT};
use crate::matching::{
    self, ExtractedDescription, ScoredCandidate, extract_key_terms, fallback::fallback_terms,
    rank::order_catalog,
};
use crate::models::{CatalogProduct, ImageUpload, SearchResponse, StageReport};
use crate::storage::{
    self, ObjectStore, StorageError, TemporaryAsset,
    cleanup::{CleanupError, CleanupPolicy, CleanupQueue, delete_with_retry},
};
use serde_json::{Value, json};
use std::{future::Future, sync::Arc, time::Instant};
use thiserror::Error;
use tokio::time::{Duration, timeout};
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct Pipeline {
    pub config: Arc<SearchConfig>,
    store: Arc<dyn ObjectStore>,
    describer: Arc<dyn ImageDescriber>,
    catalog: Arc<dyn CatalogProvider>,
    cleanup_policy: CleanupPolicy,
    cleanup_queue: Option<CleanupQueue>,
}

impl Pipeline {
    pub fn new(
        config: SearchConfig,
        store: Arc<dyn ObjectStore>,
        describer: Arc<dyn ImageDescriber>,
        catalog: Arc<dyn CatalogProvider>,
        cleanup_policy: CleanupPolicy,
    ) -> Self {
        Self {
            config: Arc::new(config),
            store,
            describer,
            catalog,
            cleanup_policy,
            cleanup_queue: None,
        }
    }

    pub fn from_env() -> Self {
        let llm = LlmClient::new(LlmConfig::from_env());
        Self::new(
            SearchConfig::from_env(),
            storage::store_from_env(),
            Arc::new(llm),
            catalog::catalog_from_env(),
            CleanupPolicy::from_env(),
        )
    }

    pub fn with_cleanup_queue(mut self, queue: CleanupQueue) -> Self {
        self.cleanup_queue = Some(queue);
        self
    }

    pub fn store(&self) -> Arc<dyn ObjectStore> {
        self.store.clone()
    }

    pub fn cleanup_policy(&self) -> CleanupPolicy {
        self.cleanup_policy
    }

    /// Runs one search. Only a missing image or an unreadable catalog fail the
    /// request; every other failure degrades to keyword fallback.
    pub async fn run(&self, upload: ImageUpload) -> Result<SearchResponse, PipelineError> {
        if upload.bytes.is_empty() && !upload.truncated {
            return Err(SearchError::MissingImage.into());
        }
        let ImageUpload {
            bytes,
            filename,
            truncated,
            ..
        } = upload;
        let mut stages = Vec::new();

        let started = Instant::now();
        let staging = async {
            if truncated {
                return Err(StorageError::TooLarge {
                    size: bytes.len(),
                    limit: self.config.max_image_bytes,
                });
            }
            storage::stage_image(
                self.store.as_ref(),
                bytes,
                filename.as_deref(),
                self.config.group_hint.as_deref(),
                self.config.max_image_bytes,
            )
            .await
        };
        let (staged, listed) = tokio::join!(staging, self.catalog.list_products());
        let staged = staged.map(|asset| self.guard(asset));
        let elapsed_ms = started.elapsed().as_millis();
        crate::metrics::stage_elapsed("stage_inputs", elapsed_ms);
        stages.push(StageReport::new(
            "stage_inputs",
            elapsed_ms,
            json!({
                "staged": staged.as_ref().map(|guard| guard.asset.cid.as_str()).ok(),
                "catalog_size": listed.as_ref().map(Vec::len).ok(),
            }),
        ));
        let staged = staged.map_err(SearchError::from);

        let mut products = match listed {
            Ok(products) => products,
            Err(err) => {
                if let Ok(guard) = staged {
                    guard.release().await;
                }
                return Err(SearchError::from(err).into());
            }
        };
        order_catalog(&mut products);

        let analysis = match staged {
            Ok(guard) => {
                let analysis = self.analyze(&guard.asset, &products, &mut stages).await;
                guard.release().await;
                analysis
            }
            Err(err) => Err(err),
        };

        let mut response = match analysis {
            Ok(response) => response,
            Err(err) => {
                warn!(
                    target = "photomatch.pipeline",
                    stage = err.stage(),
                    error = %err,
                    "vision_fallback"
                );
                self.fallback(filename.as_deref(), &products, &err, &mut stages)
            }
        };

        info!(
            target = "photomatch.pipeline",
            matches = response.matched_products.len(),
            fallback = response.fallback,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "search_completed"
        );
        if self.config.expose_stages {
            response.stages = stages;
        }
        Ok(response)
    }

    async fn analyze(
        &self,
        asset: &TemporaryAsset,
        products: &[CatalogProduct],
        stages: &mut Vec<StageReport>,
    ) -> Result<SearchResponse, SearchError> {
        let limit = self.config.vision_timeout;
        let description = self
            .capture_stage("describe_image", stages, async {
                let text = match timeout(limit, self.describer.describe(&asset.url, VISION_PROMPT))
                    .await
                {
                    Ok(result) => result?,
                    Err(_) => return Err(SearchError::InferenceTimeout(limit)),
                };
                if text.trim().is_empty() {
                    return Err(SearchError::InferenceError("empty description".into()));
                }
                let output = json!({ "chars": text.len() });
                Ok(StageOutcome::new(text, output))
            })
            .await?;

        let (fields, key_terms) = self
            .capture_stage("parse_fields", stages, async {
                let fields = ExtractedDescription::parse(&description);
                let key_terms = extract_key_terms(&fields, self.config.max_key_terms);
                let missing = fields.missing_fields();
                if !fields.has_any_field() && key_terms.is_empty() {
                    return Err(SearchError::ParseDegradation { missing });
                }
                if !missing.is_empty() {
                    debug!(
                        target = "photomatch.parse",
                        missing = ?missing,
                        "parse_degraded"
                    );
                }
                let output = json!({
                    "brand": fields.brand.value(),
                    "product_type": fields.product_type.value(),
                    "product_name": fields.product_name.value(),
                    "color_shade": fields.color_shade.value(),
                    "ingredients": fields.ingredients,
                    "missing": missing,
                    "key_terms": key_terms,
                });
                Ok(StageOutcome::new((fields, key_terms), output))
            })
            .await?;

        let ranked = self
            .capture_stage("score_catalog", stages, async {
                let ranked = matching::match_catalog(products, &fields, &key_terms, &self.config);
                let output = ranked_summary(&ranked);
                Ok(StageOutcome::new(ranked, output))
            })
            .await?;

        Ok(SearchResponse {
            matched_products: ranked.into_iter().map(|c| c.product).collect(),
            image_description: description,
            key_terms,
            fallback: false,
            stages: Vec::new(),
        })
    }

    fn fallback(
        &self,
        filename: Option<&str>,
        products: &[CatalogProduct],
        cause: &SearchError,
        stages: &mut Vec<StageReport>,
    ) -> SearchResponse {
        let started = Instant::now();
        crate::metrics::fallback_used(cause.stage());
        let terms = fallback_terms(filename, &self.config.fallback);
        let ranked = matching::fallback_catalog(products, &terms, &self.config);
        let elapsed_ms = started.elapsed().as_millis();
        crate::metrics::stage_elapsed("fallback_search", elapsed_ms);
        let mut output = ranked_summary(&ranked);
        output["cause"] = json!(cause.stage());
        output["terms"] = json!(terms);
        stages.push(StageReport::new("fallback_search", elapsed_ms, output));

        SearchResponse {
            matched_products: ranked.into_iter().map(|c| c.product).collect(),
            image_description: format!(
                "Image analysis unavailable; showing keyword matches for: {}",
                terms.join(", ")
            ),
            key_terms: terms,
            fallback: true,
            stages: Vec::new(),
        }
    }

    fn guard(&self, asset: TemporaryAsset) -> StagedAsset {
        let queue = match self.config.cleanup_mode {
            CleanupMode::Deferred => self.cleanup_queue.clone(),
            CleanupMode::Inline => None,
        };
        StagedAsset {
            asset,
            store: self.store.clone(),
            policy: self.cleanup_policy,
            queue,
            armed: true,
        }
    }

    async fn capture_stage<T, Fut>(
        &self,
        name: &'static str,
        stages: &mut Vec<StageReport>,
        fut: Fut,
    ) -> Result<T, SearchError>
    where
        Fut: Future<Output = Result<StageOutcome<T>, SearchError>>,
    {
        let started = Instant::now();
        let outcome = fut.await?;
        let elapsed_ms = started.elapsed().as_millis();
        crate::metrics::stage_elapsed(name, elapsed_ms);
        stages.push(StageReport::new(name, elapsed_ms, outcome.output));
        Ok(outcome.value)
    }
}

/// Owns a staged asset until it is released. Dropping it while still armed,
/// e.g. when the client disconnects mid-inference, schedules the delete on the
/// runtime instead.
struct StagedAsset {
    asset: TemporaryAsset,
    store: Arc<dyn ObjectStore>,
    policy: CleanupPolicy,
    queue: Option<CleanupQueue>,
    armed: bool,
}

impl StagedAsset {
    /// Deletes the asset inline, or hands it to the deferred worker. Never
    /// fails the request.
    async fn release(mut self) {
        if let Some(queue) = &self.queue {
            match queue.enqueue(self.asset.cid.clone()) {
                Ok(()) => {
                    self.armed = false;
                    return;
                }
                Err(cid) => warn!(
                    target = "photomatch.cleanup",
                    cid = %cid,
                    "cleanup_queue_unavailable_running_inline"
                ),
            }
        }
        if let Err(err) = delete_with_retry(self.store.as_ref(), &self.asset.cid, self.policy).await {
            let err = SearchError::from(err);
            warn!(target = "photomatch.cleanup", error = %err, "cleanup_failed");
        }
        self.armed = false;
    }
}

impl Drop for StagedAsset {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let cid = self.asset.cid.clone();
        let cid = match &self.queue {
            Some(queue) => match queue.enqueue(cid) {
                Ok(()) => return,
                Err(cid) => cid,
            },
            None => cid,
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(target = "photomatch.cleanup", cid = %cid, "cleanup_skipped_no_runtime");
            return;
        };
        warn!(target = "photomatch.cleanup", cid = %cid, "search_abandoned_cleanup_spawned");
        let store = self.store.clone();
        let policy = self.policy;
        runtime.spawn(async move {
            if let Err(err) = delete_with_retry(store.as_ref(), &cid, policy).await {
                let err = SearchError::from(err);
                warn!(target = "photomatch.cleanup", error = %err, "cleanup_failed");
            }
        });
    }
}

fn ranked_summary(ranked: &[ScoredCandidate]) -> Value {
    json!({
        "matches": ranked.len(),
        "top": ranked
            .iter()
            .take(3)
            .map(|c| json!({
                "id": c.product.id,
                "name": c.product.name,
                "score": c.score,
                "reasons": c.reasons,
            }))
            .collect::<Vec<_>>(),
    })
}

/// Every way a search can go wrong. Only `MissingImage` and
/// `CatalogUnavailable` reach the caller; the rest trigger fallback or are
/// logged.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("no image provided")]
    MissingImage,
    #[error("image is {size} bytes, limit is {limit}")]
    InputTooLarge { size: usize, limit: usize },
    #[error("upload failed: {0}")]
    UploadFailure(String),
    #[error("inference timed out after {0:?}")]
    InferenceTimeout(Duration),
    #[error("inference failed: {0}")]
    InferenceError(String),
    #[error("description had no usable fields (missing: {missing:?})")]
    ParseDegradation { missing: Vec<&'static str> },
    #[error(transparent)]
    CleanupFailure(#[from] CleanupError),
    #[error("catalog unavailable: {0}")]
    CatalogUnavailable(String),
}

impl SearchError {
    pub fn stage(&self) -> &'static str {
        match self {
            SearchError::MissingImage => "upload",
            SearchError::InputTooLarge { .. } | SearchError::UploadFailure(_) => "stage_image",
            SearchError::InferenceTimeout(_) | SearchError::InferenceError(_) => "describe_image",
            SearchError::ParseDegradation { .. } => "parse_fields",
            SearchError::CleanupFailure(_) => "cleanup",
            SearchError::CatalogUnavailable(_) => "catalog",
        }
    }
}

impl From<StorageError> for SearchError {
    fn from(value: StorageError) -> Self {
        match value {
            StorageError::TooLarge { size, limit } => SearchError::InputTooLarge { size, limit },
            other => SearchError::UploadFailure(other.to_string()),
        }
    }
}

impl From<LlmError> for SearchError {
    fn from(value: LlmError) -> Self {
        match value {
            LlmError::Timeout(limit) => SearchError::InferenceTimeout(limit),
            other => SearchError::InferenceError(other.to_string()),
        }
    }
}

impl From<CatalogError> for SearchError {
    fn from(value: CatalogError) -> Self {
        SearchError::CatalogUnavailable(value.to_string())
    }
}

#[derive(Debug, Error)]
#[error("stage `{stage}` failed: {message}")]
pub struct PipelineError {
    stage: &'static str,
    message: String,
    kind: PipelineErrorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineErrorKind {
    InvalidInput,
    Unavailable,
    Internal,
}

impl PipelineError {
    pub fn invalid_input(stage: &'static str, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            kind: PipelineErrorKind::InvalidInput,
        }
    }

    pub fn unavailable(stage: &'static str, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            kind: PipelineErrorKind::Unavailable,
        }
    }

    pub fn internal(stage: &'static str, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            kind: PipelineErrorKind::Internal,
        }
    }

    pub fn stage(&self) -> &'static str {
        self.stage
    }

    pub fn kind(&self) -> PipelineErrorKind {
        self.kind
    }

    pub fn detail(&self) -> &str {
        &self.message
    }
}

impl From<SearchError> for PipelineError {
    fn from(value: SearchError) -> Self {
        let stage = value.stage();
        match value {
            SearchError::MissingImage => Self::invalid_input(stage, value.to_string()),
            SearchError::CatalogUnavailable(_) => Self::unavailable(stage, value.to_string()),
            other => Self::internal(stage, other.to_string()),
        }
    }
}

#[derive(Debug)]
pub struct StageOutcome<T> {
    pub value: T,
    pub output: Value,
}

impl<T> StageOutcome<T> {
    fn new(value: T, output: Value) -> Self {
        Self { value, output }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::StaticCatalog;
    use crate::models::ProductId;
    use crate::testing::{FailingCatalog, FakeDescriber, FakeStore};

    fn fast_policy() -> CleanupPolicy {
        CleanupPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
        }
    }

    fn pipeline_with(
        store: Arc<FakeStore>,
        describer: Arc<FakeDescriber>,
        catalog: Arc<dyn CatalogProvider>,
        config: SearchConfig,
    ) -> Pipeline {
        Pipeline::new(config, store, describer, catalog, fast_policy())
    }

    fn upload(filename: &str) -> ImageUpload {
        ImageUpload {
            bytes: vec![7u8; 256],
            filename: Some(filename.to_string()),
            content_type: Some("image/jpeg".into()),
            truncated: false,
        }
    }

    fn ids(response: &SearchResponse) -> Vec<ProductId> {
        response
            .matched_products
            .iter()
            .map(|p| p.id.clone())
            .collect()
    }

    #[tokio::test]
    async fn described_image_ranks_matching_product_first() {
        let store = Arc::new(FakeStore::default());
        let describer = Arc::new(FakeDescriber::text(
            "Brand Name: CeraVe\nProduct Type: moisturizer\nProduct Name: Moisturizing Cream\nColor/Shade: not visible\nKey Ingredients: ceramides, hyaluronic acid\nPackaging: white jar\nAdditional Details: round white tub",
        ));
        let pipeline = pipeline_with(
            store.clone(),
            describer.clone(),
            Arc::new(StaticCatalog::demo()),
            SearchConfig::default(),
        );
        let response = pipeline.run(upload("photo.jpg")).await.expect("search");
        assert!(!response.fallback);
        assert_eq!(response.matched_products[0].name, "CeraVe Moisturizing Cream");
        assert!(response.key_terms.contains(&"ceramides".to_string()));
        assert!(response.image_description.starts_with("Brand Name: CeraVe"));
        assert_eq!(describer.calls(), 1);
        assert_eq!(store.uploads(), 1);
        assert_eq!(store.deletes(), 1);
        assert!(response.stages.is_empty());
    }

    #[tokio::test]
    async fn inference_error_falls_back_to_filename_keywords() {
        let store = Arc::new(FakeStore::default());
        let describer = Arc::new(FakeDescriber::failing());
        let pipeline = pipeline_with(
            store.clone(),
            describer.clone(),
            Arc::new(StaticCatalog::demo()),
            SearchConfig::default(),
        );
        let response = pipeline
            .run(upload("matte-red-lipstick.jpg"))
            .await
            .expect("fallback search");
        assert!(response.fallback);
        assert_eq!(response.key_terms, vec!["matte", "red", "lipstick"]);
        // "MAC Matte Lipstick Ruby Woo": matte 5+3, red 3, lipstick 5+3 = 19.
        // Fenty foundation: matte 3 = 3. Ordering follows substring points only.
        assert_eq!(
            ids(&response),
            vec![ProductId::Numeric(4), ProductId::Numeric(5)]
        );
        assert_eq!(store.deletes(), 1);
    }

    #[tokio::test]
    async fn inference_timeout_falls_back_and_cleans_up() {
        let store = Arc::new(FakeStore::default());
        let describer = Arc::new(FakeDescriber::hanging());
        let config = SearchConfig {
            vision_timeout: Duration::from_millis(20),
            ..SearchConfig::default()
        };
        let pipeline = pipeline_with(
            store.clone(),
            describer,
            Arc::new(StaticCatalog::demo()),
            config,
        );
        let response = pipeline.run(upload("x.jpg")).await.expect("search");
        assert!(response.fallback);
        assert_eq!(store.deletes(), 1);
    }

    #[tokio::test]
    async fn oversized_image_never_reaches_inference() {
        let store = Arc::new(FakeStore::default());
        let describer = Arc::new(FakeDescriber::text("Brand Name: CeraVe"));
        let pipeline = pipeline_with(
            store.clone(),
            describer.clone(),
            Arc::new(StaticCatalog::demo()),
            SearchConfig::default(),
        );
        let request = ImageUpload {
            bytes: vec![0u8; 10 * 1024 * 1024 + 1],
            filename: Some("big.jpg".into()),
            content_type: None,
            truncated: false,
        };
        let response = pipeline.run(request).await.expect("fallback search");
        assert!(response.fallback);
        assert_eq!(store.uploads(), 0);
        assert_eq!(describer.calls(), 0);
        assert_eq!(store.deletes(), 0);
    }

    #[tokio::test]
    async fn upload_failure_falls_back_without_cleanup() {
        let store = Arc::new(FakeStore::failing_uploads());
        let describer = Arc::new(FakeDescriber::text("Brand Name: CeraVe"));
        let pipeline = pipeline_with(
            store.clone(),
            describer.clone(),
            Arc::new(StaticCatalog::demo()),
            SearchConfig::default(),
        );
        let response = pipeline.run(upload("x.jpg")).await.expect("search");
        assert!(response.fallback);
        assert_eq!(describer.calls(), 0);
        assert_eq!(store.deletes(), 0);
    }

    #[tokio::test]
    async fn cleanup_failure_does_not_fail_the_response() {
        let store = Arc::new(FakeStore::failing_deletes(u32::MAX));
        let describer = Arc::new(FakeDescriber::text("Brand Name: MAC\nProduct Type: lipstick"));
        let pipeline = pipeline_with(
            store.clone(),
            describer,
            Arc::new(StaticCatalog::demo()),
            SearchConfig::default(),
        );
        let response = pipeline.run(upload("x.jpg")).await.expect("search");
        assert!(!response.fallback);
        assert_eq!(response.matched_products[0].id, ProductId::Numeric(4));
        assert_eq!(store.deletes(), 3);
    }

    #[tokio::test]
    async fn cleanup_also_runs_when_inference_and_cleanup_both_fail() {
        let store = Arc::new(FakeStore::failing_deletes(u32::MAX));
        let describer = Arc::new(FakeDescriber::failing());
        let pipeline = pipeline_with(
            store.clone(),
            describer,
            Arc::new(StaticCatalog::demo()),
            SearchConfig::default(),
        );
        let response = pipeline.run(upload("x.jpg")).await.expect("search");
        assert!(response.fallback);
        assert_eq!(store.deletes(), 3);
    }

    #[tokio::test]
    async fn catalog_failure_is_fatal_but_still_cleans_up() {
        let store = Arc::new(FakeStore::default());
        let describer = Arc::new(FakeDescriber::text("Brand Name: CeraVe"));
        let pipeline = pipeline_with(
            store.clone(),
            describer.clone(),
            Arc::new(FailingCatalog),
            SearchConfig::default(),
        );
        let err = pipeline.run(upload("x.jpg")).await.expect_err("fatal");
        assert_eq!(err.kind(), PipelineErrorKind::Unavailable);
        assert_eq!(err.stage(), "catalog");
        assert_eq!(describer.calls(), 0);
        assert_eq!(store.deletes(), 1);
    }

    #[tokio::test]
    async fn empty_image_is_invalid_input() {
        let store = Arc::new(FakeStore::default());
        let pipeline = pipeline_with(
            store.clone(),
            Arc::new(FakeDescriber::failing()),
            Arc::new(StaticCatalog::demo()),
            SearchConfig::default(),
        );
        let request = ImageUpload {
            bytes: vec![],
            filename: None,
            content_type: None,
            truncated: false,
        };
        let err = pipeline.run(request).await.expect_err("missing image");
        assert_eq!(err.kind(), PipelineErrorKind::InvalidInput);
        assert_eq!(store.uploads(), 0);
    }

    #[tokio::test]
    async fn placeholder_only_description_falls_back() {
        let store = Arc::new(FakeStore::default());
        let describer = Arc::new(FakeDescriber::text(
            "Brand Name: not visible\nProduct Type: cannot identify\nColor/Shade: n/a",
        ));
        let pipeline = pipeline_with(
            store.clone(),
            describer,
            Arc::new(StaticCatalog::demo()),
            SearchConfig::default(),
        );
        let response = pipeline.run(upload("x.jpg")).await.expect("search");
        assert!(response.fallback);
        assert_eq!(store.deletes(), 1);
    }

    #[tokio::test]
    async fn identical_requests_give_identical_rankings() {
        let store = Arc::new(FakeStore::default());
        let describer = Arc::new(FakeDescriber::text(
            "Product Type: serum\nAdditional Details: clear glass bottle",
        ));
        let mut products = StaticCatalog::demo()
            .list_products()
            .await
            .expect("demo");
        products.reverse();
        let pipeline = pipeline_with(
            store,
            describer,
            Arc::new(StaticCatalog::new(products)),
            SearchConfig::default(),
        );
        let first = pipeline.run(upload("x.jpg")).await.expect("first");
        let second = pipeline.run(upload("x.jpg")).await.expect("second");
        assert_eq!(ids(&first), ids(&second));
        assert!(!first.matched_products.is_empty());
    }

    #[tokio::test]
    async fn exposes_stage_reports_when_enabled() {
        let describer = Arc::new(FakeDescriber::text("Brand Name: Fenty Beauty"));
        let config = SearchConfig {
            expose_stages: true,
            ..SearchConfig::default()
        };
        let pipeline = pipeline_with(
            Arc::new(FakeStore::default()),
            describer,
            Arc::new(StaticCatalog::demo()),
            config,
        );
        let response = pipeline.run(upload("x.jpg")).await.expect("search");
        let names: Vec<_> = response.stages.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["stage_inputs", "describe_image", "parse_fields", "score_catalog"]
        );
    }

    #[tokio::test]
    async fn deferred_cleanup_runs_on_the_worker() {
        let store = Arc::new(FakeStore::default());
        let (queue, worker) = CleanupQueue::spawn(store.clone(), fast_policy());
        let config = SearchConfig {
            cleanup_mode: CleanupMode::Deferred,
            ..SearchConfig::default()
        };
        let pipeline = pipeline_with(
            store.clone(),
            Arc::new(FakeDescriber::text("Brand Name: MAC")),
            Arc::new(StaticCatalog::demo()),
            config,
        )
        .with_cleanup_queue(queue);
        let response = pipeline.run(upload("x.jpg")).await.expect("search");
        assert!(!response.fallback);
        drop(pipeline);
        worker.await.expect("worker drains");
        assert_eq!(store.deletes(), 1);
    }

    #[tokio::test]
    async fn abandoned_search_still_deletes_staged_image() {
        let store = Arc::new(FakeStore::default());
        let pipeline = pipeline_with(
            store.clone(),
            Arc::new(FakeDescriber::hanging()),
            Arc::new(StaticCatalog::demo()),
            SearchConfig::default(),
        );
        let abandoned =
            tokio::time::timeout(Duration::from_millis(50), pipeline.run(upload("x.jpg"))).await;
        assert!(abandoned.is_err(), "search should still be waiting on inference");
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(store.uploads(), 1);
        assert_eq!(store.deletes(), 1);
    }

    #[tokio::test]
    async fn abandoned_deferred_search_hands_cid_to_worker() {
        let store = Arc::new(FakeStore::default());
        let (queue, worker) = CleanupQueue::spawn(store.clone(), fast_policy());
        let config = SearchConfig {
            cleanup_mode: CleanupMode::Deferred,
            ..SearchConfig::default()
        };
        let pipeline = pipeline_with(
            store.clone(),
            Arc::new(FakeDescriber::hanging()),
            Arc::new(StaticCatalog::demo()),
            config,
        )
        .with_cleanup_queue(queue);
        let abandoned =
            tokio::time::timeout(Duration::from_millis(50), pipeline.run(upload("x.jpg"))).await;
        assert!(abandoned.is_err());
        drop(pipeline);
        worker.await.expect("worker drains");
        assert_eq!(store.deletes(), 1);
    }

    #[tokio::test]
    async fn truncated_upload_falls_back_without_staging() {
        let store = Arc::new(FakeStore::default());
        let describer = Arc::new(FakeDescriber::text("Brand Name: MAC"));
        let pipeline = pipeline_with(
            store.clone(),
            describer.clone(),
            Arc::new(StaticCatalog::demo()),
            SearchConfig::default(),
        );
        let request = ImageUpload {
            bytes: vec![1u8; 64],
            filename: Some("matte-red-lipstick.jpg".into()),
            content_type: None,
            truncated: true,
        };
        let response = pipeline.run(request).await.expect("fallback search");
        assert!(response.fallback);
        assert_eq!(response.matched_products[0].id, ProductId::Numeric(4));
        assert_eq!(store.uploads(), 0);
        assert_eq!(describer.calls(), 0);
        assert_eq!(store.deletes(), 0);
    }
}
