use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::LlmConfig;

/// Anything that can turn a post into a reply.
#[async_trait]
pub trait ReplyModel: Send + Sync {
    /// Whether the backend was configured at startup.
    fn is_available(&self) -> bool;

    /// `Ok(None)` means the backend produced nothing usable.
    async fn generate_reply(&self, platform: &str, post_text: &str) -> Result<Option<String>>;
}

/// Platform specific style guidance. The last entry is the generic fallback.
const PLATFORM_GUIDANCE: &[(&str, &str)] = &[
    (
        "Twitter",
        "Keep it short and conversational, a bit of wit is welcome. Hashtags are common.",
    ),
    (
        "LinkedIn",
        "Stay professional but warm. Add an insight, some encouragement, or a relevant question.",
    ),
    (
        "Instagram",
        "Be friendly and upbeat, emojis fit naturally here. Keep it fairly short.",
    ),
    (
        "Facebook",
        "Write like a friend or acquaintance chatting in the comments, relaxed and personal.",
    ),
    (
        "Reddit",
        "Sound like a community member: direct, specific to the post, no marketing tone and no hashtags.",
    ),
    (
        "Generic",
        "Be authentic, engaging, and relevant to the post.",
    ),
];

fn platform_guidance(platform: &str) -> &'static str {
    let platform = platform.trim();
    PLATFORM_GUIDANCE
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(platform))
        .or_else(|| PLATFORM_GUIDANCE.last())
        .map(|(_, guidance)| *guidance)
        .unwrap_or_default()
}

/// Build the instruction prompt sent to the model.
pub fn build_prompt(platform: &str, post_text: &str) -> String {
    let guidance = platform_guidance(platform);

    format!(
        r##"You are an experienced social media user writing replies to other people's posts.
The reply you write must be impossible to tell apart from one written by a real, thoughtful person.

Context:
- Platform: {platform}
- Original post: "{post_text}"

Instructions:
1. Analyze: work out the tone, style and intent of the post (sharing news, asking a question, giving an opinion) and its context.
2. Platform style: follow the usual way people talk on {platform}. {guidance}
3. Write a reply that:
   - sounds like a real person genuinely engaging with the post,
   - responds directly to what the post says,
   - matches the tone of the post unless a different tone is clearly more natural (for example polite disagreement),
   - is concise and easy to read.
   Avoid anything that gives away an AI author: overly formal wording, stock phrases such as "Great post!" or "That's interesting!", repetitive sentence structure, or a detached assistant voice.
   Emojis or hashtags are fine when they suit the platform and the post, but do not overdo them.
4. Output ONLY the reply text. No preamble, no explanation, no quotation marks around the reply.

Example (do not copy into the output):
- Post on Instagram: "Just finished a marathon! So tired but proud. #running"
- Good reply: "Wow, congratulations! That's huge, rest up!"
- Bad reply: "Acknowledged. Completing a marathon is a significant achievement demonstrating physical endurance."

Write the reply now."##
    )
}

/// Trim the model output and drop one pair of wrapping quotes.
/// Returns None when nothing is left.
pub fn clean_reply(raw: &str) -> Option<String> {
    let text = raw.trim();
    let stripped = ['"', '\'']
        .iter()
        .find(|q| text.len() >= 2 && text.starts_with(**q) && text.ends_with(**q))
        .map(|_| &text[1..text.len() - 1])
        .unwrap_or(text);

    if stripped.is_empty() {
        None
    } else {
        Some(stripped.to_string())
    }
}

// ── Gemini wire types ─────────────────────────────────────────────────────────

const HARM_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    safety_settings: Vec<SafetySetting>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
struct SafetySetting {
    category: &'static str,
    threshold: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

impl GenerateContentRequest {
    fn new(prompt: String) -> Self {
        Self {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part { text: Some(prompt) }],
            }],
            safety_settings: HARM_CATEGORIES
                .iter()
                .map(|&category| SafetySetting {
                    category,
                    threshold: "BLOCK_NONE",
                })
                .collect(),
            generation_config: GenerationConfig {
                temperature: 0.8,
                top_p: 0.9,
                top_k: 40,
            },
        }
    }
}

impl GenerateContentResponse {
    /// Concatenated text of the first candidate, if it has any.
    fn text(&self) -> Option<String> {
        let content = self.candidates.first()?.content.as_ref()?;
        let text: String = content
            .parts
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect();
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }

    fn block_reason(&self) -> Option<&str> {
        self.prompt_feedback.as_ref()?.block_reason.as_deref()
    }
}

// ── Client ────────────────────────────────────────────────────────────────────

struct Backend {
    client: reqwest::Client,
    endpoint: Url,
    api_key: String,
}

/// Gemini `generateContent` client.
/// Disabled for the whole process when the configuration check fails.
pub struct GeminiClient {
    backend: Option<Backend>,
}

impl GeminiClient {
    pub fn new(config: &LlmConfig) -> Self {
        let api_key = config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty());

        let Some(api_key) = api_key else {
            warn!("Gemini API key not set. Reply generation is disabled.");
            return Self { backend: None };
        };

        match Self::build_backend(config, api_key) {
            Ok(backend) => {
                info!(
                    "Gemini client configured: model={}, url={}",
                    config.model, backend.endpoint
                );
                Self {
                    backend: Some(backend),
                }
            }
            Err(e) => {
                error!("Failed to configure Gemini client: {:#}", e);
                Self { backend: None }
            }
        }
    }

    fn build_backend(config: &LlmConfig, api_key: &str) -> Result<Backend> {
        let model = config.model.trim();
        if model.is_empty() {
            anyhow::bail!("Gemini model name is empty");
        }

        let url = format!(
            "{}/models/{}:generateContent",
            config.base_url.trim_end_matches('/'),
            model
        );
        let endpoint =
            Url::parse(&url).with_context(|| format!("Invalid Gemini endpoint: {url}"))?;

        let client = reqwest::Client::builder()
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Backend {
            client,
            endpoint,
            api_key: api_key.to_string(),
        })
    }

    pub fn is_available(&self) -> bool {
        self.backend.is_some()
    }

    /// Single generation attempt. Transport and API errors are returned as `Err`,
    /// a blocked or empty completion as `Ok(None)`.
    pub async fn generate(&self, platform: &str, post_text: &str) -> Result<Option<String>> {
        let backend = self
            .backend
            .as_ref()
            .context("Gemini client not configured")?;

        let prompt = build_prompt(platform, post_text);
        debug!("Generated prompt:\n{}", prompt);

        let response = backend
            .client
            .post(backend.endpoint.clone())
            .header("x-goog-api-key", &backend.api_key)
            .header("Content-Type", "application/json")
            .json(&GenerateContentRequest::new(prompt))
            .send()
            .await
            .context("Failed to send request to Gemini")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Gemini API error ({}): {}", status, body);
        }

        let response: GenerateContentResponse = response
            .json()
            .await
            .context("Failed to parse Gemini response")?;

        Ok(Self::extract_reply(&response, platform))
    }

    fn extract_reply(response: &GenerateContentResponse, platform: &str) -> Option<String> {
        if let Some(reason) = response.block_reason() {
            warn!("Reply generation blocked. Reason: {}", reason);
            return None;
        }

        let Some(text) = response.text() else {
            let finish = response
                .candidates
                .first()
                .and_then(|c| c.finish_reason.as_deref())
                .unwrap_or("none");
            warn!(
                "Reply generation returned no content (finish reason: {})",
                finish
            );
            return None;
        };

        let reply = clean_reply(&text);
        match reply {
            Some(_) => info!("Generated reply for platform '{}'", platform),
            None => warn!("Reply generation returned only whitespace or quotes"),
        }
        reply
    }

    /// Generate a reply, returning None if unavailable or on error
    pub async fn try_generate(&self, platform: &str, post_text: &str) -> Option<String> {
        if !self.is_available() {
            warn!("Reply generation skipped: Gemini client is not configured");
            return None;
        }
        match self.generate(platform, post_text).await {
            Ok(reply) => reply,
            Err(e) => {
                error!("Error generating reply: {:#}", e);
                None
            }
        }
    }
}

#[async_trait]
impl ReplyModel for GeminiClient {
    fn is_available(&self) -> bool {
        GeminiClient::is_available(self)
    }

    async fn generate_reply(&self, platform: &str, post_text: &str) -> Result<Option<String>> {
        Ok(self.try_generate(platform, post_text).await)
    }
}
