//! Degraded search used when no usable description exists. Plain substring
//! containment only; no fuzzy confidence.

use super::scorer::{ScoredCandidate, Tally};
use crate::config::FallbackConfig;
use crate::models::CatalogProduct;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif", "heic", "heif", "bmp", "tiff"];

/// Filename tokens when the name holds more than two of them (repeats count),
/// otherwise the configured generic vocabulary. Returned terms are unique.
pub fn fallback_terms(filename: Option<&str>, config: &FallbackConfig) -> Vec<String> {
    let tokens = filename.map(filename_tokens).unwrap_or_default();
    if tokens.len() <= 2 {
        return config.generic_terms.clone();
    }
    let mut terms: Vec<String> = Vec::new();
    for token in tokens {
        if !terms.contains(&token) {
            terms.push(token);
        }
    }
    terms
}

fn filename_tokens(filename: &str) -> Vec<String> {
    let lower = filename.to_lowercase();
    let stem = match lower.rsplit_once('.') {
        Some((stem, ext)) if IMAGE_EXTENSIONS.contains(&ext) => stem,
        _ => lower.as_str(),
    };
    stem.split(|c: char| !c.is_alphanumeric())
        .filter(|token| token.chars().count() > 2)
        .map(str::to_string)
        .collect()
}

pub fn score_fallback(
    product: &CatalogProduct,
    terms: &[String],
    config: &FallbackConfig,
) -> ScoredCandidate {
    let name = product.name.to_lowercase();
    let description = product.description_text().to_lowercase();
    let category = product.category_text().to_lowercase();
    let mut tally = Tally::default();
    for term in terms {
        let term = term.trim().to_lowercase();
        if term.is_empty() {
            continue;
        }
        if name.contains(&term) {
            tally.add(config.name_points, || format!("keyword '{term}' in name"));
        }
        if description.contains(&term) {
            tally.add(config.description_points, || {
                format!("keyword '{term}' in description")
            });
        }
        if category.contains(&term) {
            tally.add(config.category_points, || format!("keyword '{term}' in category"));
        }
    }
    tally.finish(product)
}
