pub mod fallback;
pub mod fields;
pub mod fuzzy;
pub mod rank;
pub mod scorer;

pub use fields::{ExtractedDescription, extract_key_terms};
pub use scorer::{ScoredCandidate, Scorer};

use crate::config::{MAX_RESULTS, SearchConfig};
use crate::models::CatalogProduct;

/// Scores the whole (already ordered) catalog against extracted fields and
/// returns the ranked top matches.
pub fn match_catalog(
    products: &[CatalogProduct],
    fields: &ExtractedDescription,
    key_terms: &[String],
    config: &SearchConfig,
) -> Vec<ScoredCandidate> {
    let scorer = Scorer::new(&config.weights, &config.fallback.visual_traits, &config.pinned);
    let scored = products
        .iter()
        .map(|product| scorer.score(product, fields, key_terms))
        .collect();
    rank::rank(scored, config.max_results.min(MAX_RESULTS))
}

/// Degraded counterpart of [`match_catalog`] using substring keyword hits.
pub fn fallback_catalog(
    products: &[CatalogProduct],
    terms: &[String],
    config: &SearchConfig,
) -> Vec<ScoredCandidate> {
    let scored = products
        .iter()
        .map(|product| fallback::score_fallback(product, terms, &config.fallback))
        .collect();
    rank::rank(scored, config.max_results.min(MAX_RESULTS))
}
