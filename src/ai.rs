//! Adapters for the external vision and generation services.
//!
//! Three capabilities, each a single fallible network round-trip with no
//! internal retry: extract items from a menu photo, generate a description
//! plus calorie estimate for one item, and generate a dish image.

use crate::model::ExtractedItem;
use async_trait::async_trait;
use base64::Engine;
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

const OPENAI_API_BASE: &str = "https://api.openai.com/";
const CHAT_MODEL: &str = "gpt-4o";
const IMAGE_MODEL: &str = "dall-e-3";

#[derive(Debug, Error)]
pub enum AiError {
    /// Network failure, timeout, or a non-success status from the service.
    #[error("AI service error: {0}")]
    Service(String),
    /// The service answered, but not in the strict shape we asked for.
    #[error("malformed AI response: {0}")]
    MalformedResponse(String),
}

/// Description and calorie estimate for one menu item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextGeneration {
    pub description: String,
    pub estimated_calories: i64,
}

#[async_trait]
pub trait AiService: Send + Sync {
    async fn extract_items(&self, image: &[u8]) -> Result<Vec<ExtractedItem>, AiError>;

    async fn generate_text(&self, prompt: &str) -> Result<TextGeneration, AiError>;

    async fn generate_image(&self, prompt: &str) -> Result<Vec<u8>, AiError>;
}

#[derive(Clone)]
pub struct OpenAiClient {
    http: Client,
    base_url: Url,
    api_key: String,
}

impl fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl OpenAiClient {
    pub fn new(api_key: String, timeout: Duration) -> Self {
        let base_url = Url::parse(OPENAI_API_BASE).expect("valid default OpenAI URL");
        Self::with_base_url(api_key, timeout, base_url)
    }

    pub fn with_base_url(api_key: String, timeout: Duration, base_url: Url) -> Self {
        // The timeout is the per-call deadline; an expired call surfaces as a
        // plain service error and is never retried here.
        let http = Client::builder()
            .user_agent("menulens/0.1")
            .timeout(timeout)
            .build()
            .expect("reqwest client");
        Self {
            http,
            base_url,
            api_key,
        }
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value, AiError> {
        let endpoint = self
            .base_url
            .join(path)
            .map_err(|e| AiError::Service(format!("invalid AI base URL: {e}")))?;
        debug!(url = %endpoint, "sending AI request");
        let res = self
            .http
            .post(endpoint)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| AiError::Service(format!("failed to reach AI service: {e}")))?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(AiError::Service(format!("AI service error {status}: {body}")));
        }
        res.json()
            .await
            .map_err(|e| AiError::MalformedResponse(format!("invalid response body: {e}")))
    }

    async fn chat(&self, body: &Value) -> Result<String, AiError> {
        let payload = self.post("v1/chat/completions", body).await?;
        let envelope: ChatResponse = serde_json::from_value(payload)
            .map_err(|e| AiError::MalformedResponse(format!("unexpected chat envelope: {e}")))?;
        envelope
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| AiError::MalformedResponse("no choices in chat response".into()))
    }
}

#[async_trait]
impl AiService for OpenAiClient {
    async fn extract_items(&self, image: &[u8]) -> Result<Vec<ExtractedItem>, AiError> {
        let content = self.chat(&build_extraction_request(image)).await?;
        parse_extraction(&content)
    }

    async fn generate_text(&self, prompt: &str) -> Result<TextGeneration, AiError> {
        let content = self.chat(&build_text_request(prompt)).await?;
        parse_text_generation(&content)
    }

    async fn generate_image(&self, prompt: &str) -> Result<Vec<u8>, AiError> {
        let payload = self.post("v1/images/generations", &build_image_request(prompt)).await?;
        let envelope: ImageResponse = serde_json::from_value(payload)
            .map_err(|e| AiError::MalformedResponse(format!("unexpected image envelope: {e}")))?;
        let first = envelope
            .data
            .into_iter()
            .next()
            .ok_or_else(|| AiError::MalformedResponse("no image generated".into()))?;
        base64::engine::general_purpose::STANDARD
            .decode(first.b64_json)
            .map_err(|e| AiError::MalformedResponse(format!("invalid image base64: {e}")))
    }
}

/// Build the description prompt for one extracted item.
pub fn description_prompt(item_text: &str) -> String {
    format!(
        "For the menu item \"{item_text}\", provide a brief appetizing description \
         (1-2 sentences) and an estimated calorie count for a typical restaurant \
         portion. Respond in JSON format: \
         {{\"description\": \"...\", \"estimated_calories\": 500}}"
    )
}

/// Build the fixed food-photography prompt embedding the lowercased item text.
pub fn image_prompt(item_text: &str) -> String {
    format!(
        "A mouth-watering close-up shot of {}, food portrait style, presented on a \
         clean modern plate with elegant plating. Bathed in bright, soft studio \
         light that accentuates the delicious textures. Shallow depth of field \
         with a softly blurred background, creating a professional menu photo \
         look. Extremely detailed, sharp focus, photorealistic, 8K.",
        item_text.to_lowercase()
    )
}

pub fn build_extraction_request(image: &[u8]) -> Value {
    let encoded = base64::engine::general_purpose::STANDARD.encode(image);
    json!({
        "model": CHAT_MODEL,
        "messages": [
            {
                "role": "system",
                "content": "You are a helpful assistant that extracts menu items from restaurant menus. \
                            Return the response as a JSON object with an 'items' array, where each item \
                            has 'item_text' (required) and 'item_price' (optional) fields."
            },
            {
                "role": "user",
                "content": [
                    {
                        "type": "text",
                        "text": "Please extract all menu items from this restaurant menu image. \
                                 For each item, provide the item name and price if visible. Focus on \
                                 food and drink items, ignore section headers or descriptions. Return \
                                 as JSON with format: {\"items\": [{\"item_text\": \"dish name\", \"item_price\": \"$X.XX\"}]}"
                    },
                    {
                        "type": "image_url",
                        "image_url": { "url": format!("data:image/jpeg;base64,{encoded}") }
                    }
                ]
            }
        ],
        "response_format": { "type": "json_object" },
        "max_tokens": 1000
    })
}

pub fn build_text_request(prompt: &str) -> Value {
    json!({
        "model": CHAT_MODEL,
        "messages": [
            { "role": "user", "content": prompt }
        ],
        "response_format": { "type": "json_object" },
        "max_tokens": 150
    })
}

pub fn build_image_request(prompt: &str) -> Value {
    json!({
        "model": IMAGE_MODEL,
        "prompt": prompt,
        "n": 1,
        "size": "1024x1024",
        "quality": "standard",
        "style": "natural",
        "response_format": "b64_json"
    })
}

/// Parse the strict `{"items": [...]}` extraction payload.
pub fn parse_extraction(content: &str) -> Result<Vec<ExtractedItem>, AiError> {
    let parsed: ExtractionPayload = serde_json::from_str(content)
        .map_err(|e| AiError::MalformedResponse(format!("unparseable items payload: {e}")))?;
    Ok(parsed.items)
}

/// Parse the strict `{"description", "estimated_calories"}` payload.
pub fn parse_text_generation(content: &str) -> Result<TextGeneration, AiError> {
    let parsed: TextPayload = serde_json::from_str(content)
        .map_err(|e| AiError::MalformedResponse(format!("unparseable description payload: {e}")))?;
    if parsed.estimated_calories < 0 {
        return Err(AiError::MalformedResponse(format!(
            "negative calorie estimate: {}",
            parsed.estimated_calories
        )));
    }
    Ok(TextGeneration {
        description: parsed.description,
        estimated_calories: parsed.estimated_calories,
    })
}

#[derive(Deserialize)]
struct ExtractionPayload {
    items: Vec<ExtractedItem>,
}

#[derive(Deserialize)]
struct TextPayload {
    description: String,
    estimated_calories: i64,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

#[derive(Deserialize)]
struct ImageResponse {
    data: Vec<ImageDatum>,
}

#[derive(Deserialize)]
struct ImageDatum {
    b64_json: String,
}
