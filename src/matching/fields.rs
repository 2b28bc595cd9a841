//! Labeled-field extraction from vision model output.
//!
//! The model is asked for seven `Label: value` lines but frequently wraps labels
//! in markdown, puts several on one line, or echoes template brackets. Each
//! label has its own pattern; values stop at the next label, a bracket or a
//! newline.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

/// Tokens marking a non-answer. Matched case-insensitively as substrings.
pub const PLACEHOLDER_TOKENS: &[&str] = &[
    "extract",
    "identify",
    "n/a",
    "not visible",
    "not clear",
    "cannot",
];

const MAX_INGREDIENTS: usize = 5;

const STOPWORDS: &[&str] = &[
    "the", "and", "with", "for", "not", "visible", "clear", "this", "that", "from", "are", "has",
    "have", "its", "into", "onto", "there", "their", "which", "appears", "appear", "seems", "some",
    "also", "very", "unknown", "none", "extract", "identify", "cannot", "image", "photo",
    "picture", "shown", "show", "shows", "label", "text", "product", "item",
];

// Words that only come from the labels themselves.
const LABEL_WORDS: &[&str] = &[
    "brand",
    "name",
    "type",
    "color",
    "colour",
    "shade",
    "key",
    "ingredients",
    "packaging",
    "additional",
    "details",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldLabel {
    Brand,
    ProductType,
    ProductName,
    ColorShade,
    Ingredients,
    Packaging,
    AdditionalDetails,
}

impl FieldLabel {
    pub const ALL: [FieldLabel; 7] = [
        FieldLabel::Brand,
        FieldLabel::ProductType,
        FieldLabel::ProductName,
        FieldLabel::ColorShade,
        FieldLabel::Ingredients,
        FieldLabel::Packaging,
        FieldLabel::AdditionalDetails,
    ];

    pub fn name(self) -> &'static str {
        match self {
            FieldLabel::Brand => "brand",
            FieldLabel::ProductType => "product_type",
            FieldLabel::ProductName => "product_name",
            FieldLabel::ColorShade => "color_shade",
            FieldLabel::Ingredients => "ingredients",
            FieldLabel::Packaging => "packaging",
            FieldLabel::AdditionalDetails => "additional_details",
        }
    }

    fn pattern(self) -> &'static str {
        match self {
            FieldLabel::Brand => r"brand(?:\s+name)?",
            FieldLabel::ProductType => r"product\s+type",
            FieldLabel::ProductName => r"product\s+name",
            FieldLabel::ColorShade => r"colou?r\s*/\s*shade|colou?r|shade",
            FieldLabel::Ingredients => r"(?:key\s+)?ingredients",
            FieldLabel::Packaging => r"packaging(?:\s+type)?",
            FieldLabel::AdditionalDetails => r"(?:additional|other)\s+details",
        }
    }

    /// Free-form visual notes are kept even when they contain placeholder words.
    fn filters_placeholders(self) -> bool {
        !matches!(self, FieldLabel::AdditionalDetails)
    }
}

static LABEL_PATTERNS: Lazy<Vec<(FieldLabel, Regex)>> = Lazy::new(|| {
    FieldLabel::ALL
        .iter()
        .map(|label| {
            let pattern = format!(
                r"(?i)\b(?:{})[ \t]*\**[ \t]*:[ \t]*\**[ \t]*([^\n\[\]]*)",
                label.pattern()
            );
            let regex = Regex::new(&pattern).expect("label pattern compiles");
            (*label, regex)
        })
        .collect()
});

static ANY_LABEL: Lazy<Regex> = Lazy::new(|| {
    let alternatives = FieldLabel::ALL
        .iter()
        .map(|label| label.pattern())
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"(?i)\**\b(?:{alternatives})[ \t]*\**[ \t]*:"))
        .expect("label union compiles")
});

static INGREDIENT_SEPARATOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i),|\+|\band\b").expect("separator compiles"));

static WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[a-z0-9]+").expect("word compiles"));

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FieldResult {
    Present(String),
    #[default]
    Absent,
}

impl FieldResult {
    pub fn value(&self) -> Option<&str> {
        match self {
            FieldResult::Present(value) => Some(value),
            FieldResult::Absent => None,
        }
    }

    pub fn is_present(&self) -> bool {
        matches!(self, FieldResult::Present(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExtractedDescription {
    pub raw: String,
    pub brand: FieldResult,
    pub product_type: FieldResult,
    pub product_name: FieldResult,
    pub color_shade: FieldResult,
    pub ingredients: Vec<String>,
    pub packaging: FieldResult,
    pub additional_details: FieldResult,
}

impl ExtractedDescription {
    pub fn parse(raw: &str) -> Self {
        let ingredients = match extract_field(raw, FieldLabel::Ingredients) {
            FieldResult::Present(value) => split_ingredients(&value),
            FieldResult::Absent => Vec::new(),
        };
        Self {
            raw: raw.to_string(),
            brand: extract_field(raw, FieldLabel::Brand),
            product_type: extract_field(raw, FieldLabel::ProductType),
            product_name: extract_field(raw, FieldLabel::ProductName),
            color_shade: extract_field(raw, FieldLabel::ColorShade),
            ingredients,
            packaging: extract_field(raw, FieldLabel::Packaging),
            additional_details: extract_field(raw, FieldLabel::AdditionalDetails),
        }
    }

    /// Labels that produced no usable value.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        for (label, field) in [
            (FieldLabel::Brand, &self.brand),
            (FieldLabel::ProductType, &self.product_type),
            (FieldLabel::ProductName, &self.product_name),
            (FieldLabel::ColorShade, &self.color_shade),
            (FieldLabel::Packaging, &self.packaging),
            (FieldLabel::AdditionalDetails, &self.additional_details),
        ] {
            if !field.is_present() {
                missing.push(label.name());
            }
        }
        if self.ingredients.is_empty() {
            missing.push(FieldLabel::Ingredients.name());
        }
        missing
    }

    pub fn has_any_field(&self) -> bool {
        self.missing_fields().len() < FieldLabel::ALL.len()
    }
}

pub fn is_placeholder(text: &str) -> bool {
    let lower = text.to_lowercase();
    PLACEHOLDER_TOKENS.iter().any(|token| lower.contains(token))
}

/// Value following `label`, or `Absent` when missing, empty or a non-answer.
pub fn extract_field(raw: &str, label: FieldLabel) -> FieldResult {
    let Some((_, regex)) = LABEL_PATTERNS.iter().find(|(l, _)| *l == label) else {
        return FieldResult::Absent;
    };
    let Some(captured) = regex.captures(raw).and_then(|caps| caps.get(1)) else {
        return FieldResult::Absent;
    };
    let mut value = captured.as_str();
    if let Some(next) = ANY_LABEL.find(value) {
        value = &value[..next.start()];
    }
    let value = clean_value(value);
    if value.is_empty() || (label.filters_placeholders() && is_placeholder(&value)) {
        return FieldResult::Absent;
    }
    FieldResult::Present(value)
}

fn clean_value(value: &str) -> String {
    value
        .trim()
        .trim_matches(|c: char| matches!(c, '*' | '"' | '`' | '_'))
        .trim()
        .trim_end_matches([',', ';', '|'])
        .trim()
        .to_string()
}

pub fn split_ingredients(value: &str) -> Vec<String> {
    INGREDIENT_SEPARATOR
        .split(value)
        .map(|item| item.trim().trim_end_matches('.').trim())
        .filter(|item| item.chars().count() > 2)
        .map(|item| item.to_string())
        .take(MAX_INGREDIENTS)
        .collect()
}

/// Generic keyword terms: ingredients first, then distinct content words of
/// the raw description, in order of first appearance.
pub fn extract_key_terms(extracted: &ExtractedDescription, max_terms: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut terms = Vec::new();
    let lowered = extracted.raw.to_lowercase();
    let candidates = extracted
        .ingredients
        .iter()
        .map(|item| item.to_lowercase())
        .chain(WORD.find_iter(&lowered).map(|m| m.as_str().to_string()));
    for term in candidates {
        if terms.len() >= max_terms {
            break;
        }
        if term.chars().count() < 3
            || STOPWORDS.contains(&term.as_str())
            || LABEL_WORDS.contains(&term.as_str())
            || term.chars().all(|c| c.is_ascii_digit())
            || is_placeholder(&term)
        {
            continue;
        }
        if seen.insert(term.clone()) {
            terms.push(term);
        }
    }
    terms
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "Brand Name: Glossier\nProduct Type: Lip balm\nProduct Name: Balm Dotcom\nColor/Shade: Cherry\nKey Ingredients: castor oil, beeswax and shea butter + vitamin E, lanolin, mint\nPackaging: squeeze tube\nAdditional Details: red tube with white cap, not visible barcode";

    #[test]
    fn parses_all_labeled_fields() {
        let parsed = ExtractedDescription::parse(SAMPLE);
        assert_eq!(parsed.brand, FieldResult::Present("Glossier".into()));
        assert_eq!(parsed.product_type.value(), Some("Lip balm"));
        assert_eq!(parsed.product_name.value(), Some("Balm Dotcom"));
        assert_eq!(parsed.color_shade.value(), Some("Cherry"));
        assert_eq!(parsed.packaging.value(), Some("squeeze tube"));
        assert_eq!(
            parsed.ingredients,
            vec!["castor oil", "beeswax", "shea butter", "vitamin E", "lanolin"]
        );
        assert!(parsed.missing_fields().is_empty());
    }

    #[test]
    fn additional_details_keep_placeholder_words() {
        let parsed = ExtractedDescription::parse(SAMPLE);
        assert_eq!(
            parsed.additional_details.value(),
            Some("red tube with white cap, not visible barcode")
        );
    }

    #[test]
    fn placeholders_are_absent() {
        let raw = "Brand Name: Not Visible\nProduct Type: N/A\nProduct Name: cannot determine\nColor/Shade: not visible";
        let parsed = ExtractedDescription::parse(raw);
        assert_eq!(parsed.brand, FieldResult::Absent);
        assert_eq!(parsed.product_type, FieldResult::Absent);
        assert_eq!(parsed.product_name, FieldResult::Absent);
        assert_eq!(parsed.color_shade, FieldResult::Absent);
        assert!(!parsed.has_any_field());
    }

    #[test]
    fn template_echo_is_absent() {
        let parsed = ExtractedDescription::parse("Brand Name: [brand printed on the product]");
        assert_eq!(parsed.brand, FieldResult::Absent);
    }

    #[test]
    fn single_line_output_stops_at_next_label() {
        let raw = "Brand Name: Nike Product Type: running shoe Color: black [end]";
        let parsed = ExtractedDescription::parse(raw);
        assert_eq!(parsed.brand.value(), Some("Nike"));
        assert_eq!(parsed.product_type.value(), Some("running shoe"));
        assert_eq!(parsed.color_shade.value(), Some("black"));
    }

    #[test]
    fn markdown_labels_are_recognized() {
        let raw = "- **Brand Name:** Fenty Beauty\n- **Product Type**: foundation\n";
        let parsed = ExtractedDescription::parse(raw);
        assert_eq!(parsed.brand.value(), Some("Fenty Beauty"));
        assert_eq!(parsed.product_type.value(), Some("foundation"));
    }

    #[test]
    fn empty_label_does_not_swallow_next_line() {
        let raw = "Brand Name:\nProduct Type: serum";
        let parsed = ExtractedDescription::parse(raw);
        assert_eq!(parsed.brand, FieldResult::Absent);
        assert_eq!(parsed.product_type.value(), Some("serum"));
    }

    #[test]
    fn ingredients_drop_short_items_and_cap_at_five() {
        assert_eq!(
            split_ingredients("aloe, zn, water + glycerin and niacinamide, retinol, squalane"),
            vec!["aloe", "water", "glycerin", "niacinamide", "retinol"]
        );
    }

    #[test]
    fn key_terms_skip_labels_and_stopwords() {
        let parsed = ExtractedDescription::parse("Brand Name: Nike");
        assert_eq!(extract_key_terms(&parsed, 10), vec!["nike"]);
    }

    #[test]
    fn key_terms_put_ingredients_first_and_respect_cap() {
        let parsed = ExtractedDescription::parse(SAMPLE);
        let terms = extract_key_terms(&parsed, 4);
        assert_eq!(terms, vec!["castor oil", "beeswax", "shea butter", "vitamin e"]);
    }
}
