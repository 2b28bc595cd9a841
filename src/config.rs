use std::{env, str::FromStr, time::Duration};

pub const DEFAULT_MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;
/// Upper bound on matches per response. Configuration can lower it, never raise it.
pub const MAX_RESULTS: usize = 10;

const DEFAULT_FALLBACK_TERMS: &[&str] = &[
    "beauty",
    "skincare",
    "makeup",
    "cream",
    "serum",
    "lipstick",
    "foundation",
];

const DEFAULT_VISUAL_TRAITS: &[&str] = &[
    "black", "white", "red", "pink", "nude", "gold", "silver", "blue", "green", "purple", "brown",
    "clear", "round", "square", "tube", "bottle", "jar", "pump", "compact", "glass", "matte",
    "glossy", "metallic",
];

#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub max_image_bytes: usize,
    pub vision_timeout: Duration,
    pub max_results: usize,
    pub max_key_terms: usize,
    pub group_hint: Option<String>,
    pub expose_stages: bool,
    pub cleanup_mode: CleanupMode,
    pub weights: MatchWeights,
    pub fallback: FallbackConfig,
    pub pinned: Vec<PinnedProduct>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_image_bytes: DEFAULT_MAX_IMAGE_BYTES,
            vision_timeout: Duration::from_secs(30),
            max_results: MAX_RESULTS,
            max_key_terms: 10,
            group_hint: None,
            expose_stages: false,
            cleanup_mode: CleanupMode::Inline,
            weights: MatchWeights::default(),
            fallback: FallbackConfig::default(),
            pinned: Vec::new(),
        }
    }
}

impl SearchConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_image_bytes: env_parse("MAX_IMAGE_BYTES")
                .filter(|v: &usize| *v > 0)
                .unwrap_or(defaults.max_image_bytes),
            vision_timeout: env_parse("VISION_TIMEOUT_SECS")
                .filter(|v: &u64| *v > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.vision_timeout),
            max_results: clamp_max_results(env_parse("SEARCH_MAX_RESULTS"))
                .unwrap_or(defaults.max_results),
            max_key_terms: env_parse("SEARCH_MAX_KEY_TERMS").unwrap_or(defaults.max_key_terms),
            group_hint: env::var("PINATA_GROUP_ID")
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),
            expose_stages: parse_env_bool("SEARCH_EXPOSE_STAGES"),
            cleanup_mode: env::var("CLEANUP_MODE")
                .ok()
                .and_then(|v| CleanupMode::parse(&v))
                .unwrap_or(defaults.cleanup_mode),
            weights: MatchWeights::from_env(),
            fallback: FallbackConfig::from_env(),
            pinned: env::var("SEARCH_PINNED_PRODUCTS")
                .map(|raw| parse_pinned(&raw))
                .unwrap_or_default(),
        }
    }
}

fn clamp_max_results(value: Option<usize>) -> Option<usize> {
    value.filter(|v| *v > 0).map(|v| v.min(MAX_RESULTS))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupMode {
    /// Delete before the response is written.
    Inline,
    /// Hand the CID to the background cleanup worker.
    Deferred,
}

impl CleanupMode {
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_lowercase().as_str() {
            "inline" | "sync" => Some(CleanupMode::Inline),
            "deferred" | "background" | "async" => Some(CleanupMode::Deferred),
            _ => None,
        }
    }
}

/// Points awarded per scoring contribution. Fuzzy contributions multiply the
/// weight by a confidence in `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchWeights {
    pub brand_exact: f64,
    pub brand_contains: f64,
    pub brand_compact: f64,
    pub brand_fuzzy_name: f64,
    pub brand_fuzzy_description: f64,
    pub visual_trait: f64,
    pub type_name: f64,
    pub type_category_exact: f64,
    pub type_category_fuzzy: f64,
    pub type_description: f64,
    pub product_name: f64,
    pub color: f64,
    pub key_term: f64,
}

impl Default for MatchWeights {
    fn default() -> Self {
        Self {
            brand_exact: 50.0,
            brand_contains: 40.0,
            brand_compact: 40.0,
            brand_fuzzy_name: 30.0,
            brand_fuzzy_description: 15.0,
            visual_trait: 15.0,
            type_name: 25.0,
            type_category_exact: 30.0,
            type_category_fuzzy: 20.0,
            type_description: 10.0,
            product_name: 20.0,
            color: 15.0,
            key_term: 5.0,
        }
    }
}

impl MatchWeights {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            brand_exact: weight("WEIGHT_BRAND_EXACT", d.brand_exact),
            brand_contains: weight("WEIGHT_BRAND_CONTAINS", d.brand_contains),
            brand_compact: weight("WEIGHT_BRAND_COMPACT", d.brand_compact),
            brand_fuzzy_name: weight("WEIGHT_BRAND_FUZZY_NAME", d.brand_fuzzy_name),
            brand_fuzzy_description: weight(
                "WEIGHT_BRAND_FUZZY_DESCRIPTION",
                d.brand_fuzzy_description,
            ),
            visual_trait: weight("WEIGHT_VISUAL_TRAIT", d.visual_trait),
            type_name: weight("WEIGHT_TYPE_NAME", d.type_name),
            type_category_exact: weight("WEIGHT_TYPE_CATEGORY_EXACT", d.type_category_exact),
            type_category_fuzzy: weight("WEIGHT_TYPE_CATEGORY_FUZZY", d.type_category_fuzzy),
            type_description: weight("WEIGHT_TYPE_DESCRIPTION", d.type_description),
            product_name: weight("WEIGHT_PRODUCT_NAME", d.product_name),
            color: weight("WEIGHT_COLOR", d.color),
            key_term: weight("WEIGHT_KEY_TERM", d.key_term),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FallbackConfig {
    /// Used when the filename yields too few tokens.
    pub generic_terms: Vec<String>,
    /// Words compared between the visual details and product descriptions.
    pub visual_traits: Vec<String>,
    pub name_points: f64,
    pub description_points: f64,
    pub category_points: f64,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            generic_terms: DEFAULT_FALLBACK_TERMS.iter().map(|s| s.to_string()).collect(),
            visual_traits: DEFAULT_VISUAL_TRAITS.iter().map(|s| s.to_string()).collect(),
            name_points: 5.0,
            description_points: 3.0,
            category_points: 4.0,
        }
    }
}

impl FallbackConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            generic_terms: env_list("SEARCH_FALLBACK_TERMS").unwrap_or(d.generic_terms),
            visual_traits: env_list("SEARCH_VISUAL_TRAITS").unwrap_or(d.visual_traits),
            name_points: weight("WEIGHT_FALLBACK_NAME", d.name_points),
            description_points: weight("WEIGHT_FALLBACK_DESCRIPTION", d.description_points),
            category_points: weight("WEIGHT_FALLBACK_CATEGORY", d.category_points),
        }
    }
}

/// Catalog entry that is always boosted when its name matches exactly.
#[derive(Debug, Clone, PartialEq)]
pub struct PinnedProduct {
    pub name: String,
    pub bonus: f64,
}

const DEFAULT_PINNED_BONUS: f64 = 100.0;

/// Parses `Name A:120,Name B` into pinned entries; a missing bonus uses the default.
pub fn parse_pinned(raw: &str) -> Vec<PinnedProduct> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| {
            let (name, bonus) = match entry.rsplit_once(':') {
                Some((name, bonus)) => match bonus.trim().parse::<f64>() {
                    Ok(value) => (name, value),
                    Err(_) => (entry, DEFAULT_PINNED_BONUS),
                },
                None => (entry, DEFAULT_PINNED_BONUS),
            };
            let name = name.trim();
            if name.is_empty() || !bonus.is_finite() || bonus <= 0.0 {
                return None;
            }
            Some(PinnedProduct {
                name: name.to_string(),
                bonus,
            })
        })
        .collect()
}

pub fn parse_env_bool(key: &str) -> bool {
    match env::var(key) {
        Ok(value) => matches!(
            value.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        ),
        Err(_) => false,
    }
}

pub fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse::<T>().ok())
}

fn env_list(key: &str) -> Option<Vec<String>> {
    env::var(key)
        .ok()
        .map(|v| {
            v.split([',', '\n'])
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
        })
        .filter(|v| !v.is_empty())
}

// Negative or non-finite weights would break the non-negative score sum.
fn weight(key: &str, default: f64) -> f64 {
    env_parse::<f64>(key)
        .filter(|v| v.is_finite() && *v >= 0.0)
        .unwrap_or(default)
}
