mod tensorzero;

pub use tensorzero::{LlmClient, LlmConfig, LlmError};

use async_trait::async_trait;

/// Prompt sent with every image. The labels must stay in sync with
/// `matching::fields::FieldLabel`.
pub const VISION_PROMPT: &str = r#"You are a retail product identification assistant. Look at the product in the image and answer using exactly these labeled lines:
Brand Name: [brand printed on the product or packaging]
Product Type: [kind of product, e.g. lipstick, serum, moisturizer]
Product Name: [product or line name printed on the item]
Color/Shade: [color or shade name]
Key Ingredients: [comma separated ingredients visible on the label]
Packaging: [container type and material]
Additional Details: [shape, colors, finish and any other visual traits]
If a field cannot be determined write "not visible". Do not add any other text."#;

/// Turns an image URL into free text.
#[async_trait]
pub trait ImageDescriber: Send + Sync {
    async fn describe(&self, image_url: &str, prompt: &str) -> Result<String, LlmError>;
}
