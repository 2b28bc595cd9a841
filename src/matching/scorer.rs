use super::fields::ExtractedDescription;
use super::fuzzy::fuzzy_match;
use crate::config::{MatchWeights, PinnedProduct};
use crate::models::CatalogProduct;
use std::collections::HashSet;

#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    pub product: CatalogProduct,
    pub score: f64,
    pub reasons: Vec<String>,
}

/// Running sum of contributions. Zero contributions leave no reason behind,
/// so `reasons.len()` always equals the number of terms that fired.
#[derive(Debug, Default)]
pub(crate) struct Tally {
    score: f64,
    reasons: Vec<String>,
}

impl Tally {
    pub(crate) fn add(&mut self, points: f64, reason: impl FnOnce() -> String) {
        if points.is_finite() && points > 0.0 {
            self.score += points;
            self.reasons.push(format!("{} (+{:.1})", reason(), points));
        }
    }

    pub(crate) fn finish(self, product: &CatalogProduct) -> ScoredCandidate {
        ScoredCandidate {
            product: product.clone(),
            score: self.score,
            reasons: self.reasons,
        }
    }
}

pub struct Scorer<'a> {
    weights: &'a MatchWeights,
    visual_traits: &'a [String],
    pinned: &'a [PinnedProduct],
}

impl<'a> Scorer<'a> {
    pub fn new(
        weights: &'a MatchWeights,
        visual_traits: &'a [String],
        pinned: &'a [PinnedProduct],
    ) -> Self {
        Self {
            weights,
            visual_traits,
            pinned,
        }
    }

    pub fn score(
        &self,
        product: &CatalogProduct,
        fields: &ExtractedDescription,
        key_terms: &[String],
    ) -> ScoredCandidate {
        let w = self.weights;
        let mut tally = Tally::default();
        let name = product.name.as_str();
        let description = product.description_text();
        let category = product.category_text();
        let haystack = product.haystack();

        match fields.brand.value() {
            Some(brand) => self.score_brand(&mut tally, brand, name, description),
            None => self.score_visual_traits(&mut tally, fields, description),
        }

        if let Some(kind) = fields.product_type.value() {
            tally.add(fuzzy_match(kind, name) * w.type_name, || {
                format!("product type '{kind}' in name")
            });
            if !category.trim().is_empty() && category.trim().eq_ignore_ascii_case(kind.trim()) {
                tally.add(w.type_category_exact, || {
                    format!("product type '{kind}' equals category")
                });
            } else {
                tally.add(fuzzy_match(kind, category) * w.type_category_fuzzy, || {
                    format!("product type '{kind}' resembles category")
                });
            }
            tally.add(fuzzy_match(kind, description) * w.type_description, || {
                format!("product type '{kind}' in description")
            });
        }

        if let Some(product_name) = fields.product_name.value() {
            tally.add(fuzzy_match(product_name, &haystack) * w.product_name, || {
                format!("product name '{product_name}'")
            });
        }

        if let Some(color) = fields.color_shade.value() {
            tally.add(fuzzy_match(color, &haystack) * w.color, || {
                format!("color/shade '{color}'")
            });
        }

        for term in key_terms.iter().filter(|term| term.chars().count() >= 3) {
            tally.add(fuzzy_match(term, &haystack) * w.key_term, || {
                format!("keyword '{term}'")
            });
        }

        if let Some(pin) = self
            .pinned
            .iter()
            .find(|pin| pin.name.trim().eq_ignore_ascii_case(name.trim()))
        {
            tally.add(pin.bonus, || format!("pinned product '{}'", pin.name));
        }

        tally.finish(product)
    }

    fn score_brand(&self, tally: &mut Tally, brand: &str, name: &str, description: &str) {
        let w = self.weights;
        let brand_lower = brand.trim().to_lowercase();
        let name_lower = name.trim().to_lowercase();
        if brand_lower.is_empty() {
            return;
        }
        if name_lower == brand_lower {
            tally.add(w.brand_exact, || format!("brand '{brand}' is the product name"));
        } else if name_lower.contains(&brand_lower) {
            tally.add(w.brand_contains, || format!("brand '{brand}' in name"));
        } else if brand_lower.chars().count() <= 5
            && strip_whitespace(&name_lower).contains(&strip_whitespace(&brand_lower))
        {
            tally.add(w.brand_compact, || {
                format!("brand '{brand}' in name ignoring spaces")
            });
        } else {
            tally.add(fuzzy_match(brand, name) * w.brand_fuzzy_name, || {
                format!("brand '{brand}' resembles name")
            });
            tally.add(
                fuzzy_match(brand, description) * w.brand_fuzzy_description,
                || format!("brand '{brand}' resembles description"),
            );
        }
    }

    // Without a brand, shared visual words between the model's free-form notes
    // and the product description are the only identity signal.
    fn score_visual_traits(&self, tally: &mut Tally, fields: &ExtractedDescription, description: &str) {
        let Some(details) = fields.additional_details.value() else {
            return;
        };
        let detail_words = word_set(details);
        let description_words = word_set(description);
        for trait_word in self.visual_traits {
            let trait_word = trait_word.to_lowercase();
            if detail_words.contains(&trait_word) && description_words.contains(&trait_word) {
                tally.add(self.weights.visual_trait, || {
                    format!("visual trait '{trait_word}'")
                });
            }
        }
    }
}

fn strip_whitespace(value: &str) -> String {
    value.chars().filter(|c| !c.is_whitespace()).collect()
}

fn word_set(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(|word| word.to_string())
        .collect()
}
