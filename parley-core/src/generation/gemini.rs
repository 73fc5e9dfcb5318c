//! Google Gemini `generateContent` backend.
//!
//! Asks the model for a JSON array of exchanges and validates it with
//! [`parse_generated_exchanges`](super::parse_generated_exchanges).

use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{parse_generated_exchanges, DialogueGenerator, GenerationRequest};
use crate::dialogue::Exchange;
use crate::error::{ParleyError, Result};
use crate::leveling::Tier;

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    /// Default: `gemini-1.5-flash`.
    pub model: String,
    pub api_base: String,
    pub timeout: Duration,
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: "gemini-1.5-flash".into(),
            api_base: GEMINI_API_BASE.into(),
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
}

#[derive(Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<Content>,
}

fn level_hint(tier: Tier) -> &'static str {
    match tier {
        Tier::Easy => "Keep sentences short and use everyday beginner vocabulary.",
        Tier::Medium => {
            "Keep responses at intermediate English level, not too simple and not too complex."
        }
        Tier::Hard => "Use richer vocabulary and longer sentences suitable for advanced learners.",
    }
}

/// Prompt sent for `request`.
pub fn build_prompt(request: &GenerationRequest) -> String {
    let topic = request.topic.trim();
    let count = request.exchange_count;
    let hint = level_hint(request.tier);
    format!(
        r#"You are an English conversation teacher. Create a natural dialogue between two people about "{topic}".
The dialogue should be appropriate for English language learners.

Create a {count}-exchange conversation where:
- The first speaker (bot) starts the conversation
- Then it alternates with what the user should respond
- Each exchange builds naturally on the previous one
- {hint}
- Make the conversation engaging and educational

Format your response as a JSON array where each exchange has:
- "exchange_number": The number of this exchange (1, 2, 3, etc.)
- "bot_says": What the first speaker (bot) says
- "user_should_say": What the user should respond with

Example format:
[
    {{
        "exchange_number": 1,
        "bot_says": "Hi! I heard you celebrated Independence Day yesterday. How was it?",
        "user_should_say": "It was great! We had a barbecue with family and watched fireworks."
    }}
]

Please respond with ONLY the JSON array, no additional text or formatting."#
    )
}

pub struct GeminiGenerator {
    config: GeminiConfig,
    client: Option<Client>,
}

impl GeminiGenerator {
    pub fn new(config: GeminiConfig) -> Self {
        Self {
            config,
            client: None,
        }
    }

    fn client(&mut self) -> Result<&Client> {
        if self.client.is_none() {
            let client = Client::builder()
                .timeout(self.config.timeout)
                .build()
                .map_err(|e| ParleyError::Generation(format!("client build: {e}")))?;
            self.client = Some(client);
        }
        self.client
            .as_ref()
            .ok_or_else(|| ParleyError::Generation("client unavailable".into()))
    }
}

impl DialogueGenerator for GeminiGenerator {
    fn generate(&mut self, request: &GenerationRequest) -> Result<Vec<Exchange>> {
        if self.config.api_key.trim().is_empty() {
            return Err(ParleyError::Generation("missing Gemini API key".into()));
        }
        // The key rides in a header; reqwest error text carries the URL.
        let url = format!(
            "{}/models/{}:generateContent",
            self.config.api_base, self.config.model
        );
        let api_key = self.config.api_key.clone();
        let payload = GenerateRequest {
            contents: vec![Content {
                role: Some("user".into()),
                parts: vec![Part {
                    text: Some(build_prompt(request)),
                }],
            }],
        };

        let resp = self
            .client()?
            .post(&url)
            .header("x-goog-api-key", api_key)
            .json(&payload)
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    ParleyError::Generation("gemini request timed out".into())
                } else {
                    ParleyError::Generation(format!("gemini request failed: {}", e.without_url()))
                }
            })?;

        let status = resp.status();
        if status != StatusCode::OK {
            let body = resp.text().unwrap_or_default();
            warn!(%status, "gemini returned non-success status");
            return Err(ParleyError::Generation(format!(
                "gemini api error ({status}): {}",
                body.chars().take(200).collect::<String>()
            )));
        }

        let body: GenerateResponse = resp
            .json()
            .map_err(|e| ParleyError::Generation(format!("gemini response json: {e}")))?;
        let text: String = body
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();
        if text.trim().is_empty() {
            return Err(ParleyError::Generation("gemini returned no text".into()));
        }

        let exchanges = parse_generated_exchanges(&text)?;
        debug!(
            topic = %request.topic,
            requested = request.exchange_count,
            received = exchanges.len(),
            "gemini dialogue parsed"
        );
        Ok(exchanges)
    }

    fn name(&self) -> &'static str {
        "gemini"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_mentions_topic_and_count() {
        let prompt = build_prompt(&GenerationRequest::new("daily routine", Tier::Medium, 7));
        assert!(prompt.contains("about \"daily routine\""));
        assert!(prompt.contains("Create a 7-exchange conversation"));
        assert!(prompt.contains("\"user_should_say\""));
    }

    #[test]
    fn blank_key_fails_without_network() {
        let mut generator = GeminiGenerator::new(GeminiConfig::new(""));
        let err = generator
            .generate(&GenerationRequest::new("food", Tier::Easy, 5))
            .unwrap_err();
        assert!(matches!(err, ParleyError::Generation(_)));
    }

    #[test]
    fn transport_errors_do_not_carry_the_key() {
        let mut config = GeminiConfig::new("SECRETKEY123");
        config.api_base = "http://127.0.0.1:1".into();
        config.timeout = Duration::from_secs(2);
        let mut generator = GeminiGenerator::new(config);
        let err = generator
            .generate(&GenerationRequest::new("food", Tier::Easy, 5))
            .unwrap_err();
        let reason = err.to_string();
        assert!(reason.starts_with("dialogue generation error: gemini request"), "{reason}");
        assert!(!reason.contains("SECRETKEY123"), "{reason}");
        assert!(!reason.contains("127.0.0.1"), "{reason}");
    }
}
