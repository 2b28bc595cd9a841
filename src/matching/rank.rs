use super::scorer::ScoredCandidate;
use crate::models::CatalogProduct;
use std::cmp::Ordering;

/// Sorts the catalog snapshot by product id so equal scores always resolve the
/// same way, whatever order the provider returned.
pub fn order_catalog(products: &mut [CatalogProduct]) {
    products.sort_by(|a, b| a.id.cmp(&b.id));
}

/// Keeps positive scores, highest first, at most `limit`. The sort is stable:
/// ties keep catalog order.
pub fn rank(mut candidates: Vec<ScoredCandidate>, limit: usize) -> Vec<ScoredCandidate> {
    candidates.retain(|candidate| candidate.score > 0.0);
    candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    candidates.truncate(limit);
    candidates
}
