//! Dialogue generation collaborator.
//!
//! A `DialogueGenerator` turns `(topic, tier, exchange_count)` into an
//! ordered list of exchanges. Backends may be slow or fail; the engine wraps
//! every call in a timeout and falls back to [`CannedGenerator`].

pub mod canned;

#[cfg(feature = "cloud")]
pub mod gemini;

#[cfg(feature = "cloud")]
pub use gemini::{GeminiConfig, GeminiGenerator};

pub use canned::{CannedGenerator, NEUTRAL_TOPIC};

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::dialogue::Exchange;
use crate::error::{ParleyError, Result};
use crate::leveling::Tier;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    pub topic: String,
    pub tier: Tier,
    pub exchange_count: usize,
}

impl GenerationRequest {
    pub fn new(topic: impl Into<String>, tier: Tier, exchange_count: usize) -> Self {
        Self {
            topic: topic.into(),
            tier,
            exchange_count,
        }
    }
}

/// Contract for dialogue script backends.
pub trait DialogueGenerator: Send + 'static {
    /// # Errors
    /// `Generation` when the backend fails or returns unusable output.
    fn generate(&mut self, request: &GenerationRequest) -> Result<Vec<Exchange>>;

    fn name(&self) -> &'static str;
}

/// Shared handle to any `DialogueGenerator`, mirroring `ModelHandle`.
#[derive(Clone)]
pub struct GeneratorHandle(pub Arc<Mutex<dyn DialogueGenerator>>);

impl GeneratorHandle {
    pub fn new<G: DialogueGenerator>(generator: G) -> Self {
        Self(Arc::new(Mutex::new(generator)))
    }
}

impl std::fmt::Debug for GeneratorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeneratorHandle").finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct RawExchange {
    exchange_number: Option<serde_json::Value>,
    bot_says: Option<String>,
    user_should_say: Option<String>,
}

/// Strip a surrounding markdown code fence (```` ```json ```` or bare
/// ```` ``` ````) from model output.
pub fn strip_code_fence(raw: &str) -> &str {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("```json") {
        text = rest;
    } else if let Some(rest) = text.strip_prefix("```") {
        text = rest;
    }
    if let Some(rest) = text.strip_suffix("```") {
        text = rest;
    }
    text.trim()
}

/// Parse the JSON array a generation backend returns.
///
/// Every item must carry `exchange_number`, `bot_says` and
/// `user_should_say`; blank strings are rejected as well.
///
/// # Errors
/// `Generation` describing the first problem found.
pub fn parse_generated_exchanges(raw: &str) -> Result<Vec<Exchange>> {
    let body = strip_code_fence(raw);
    let items: Vec<RawExchange> = serde_json::from_str(body)
        .map_err(|e| ParleyError::Generation(format!("response is not a JSON array of exchanges: {e}")))?;
    if items.is_empty() {
        return Err(ParleyError::Generation("response contained no exchanges".into()));
    }

    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| {
            let n = i + 1;
            if item.exchange_number.is_none() {
                return Err(ParleyError::Generation(format!(
                    "exchange {n} is missing exchange_number"
                )));
            }
            let prompt = item
                .bot_says
                .filter(|s| !s.trim().is_empty())
                .ok_or_else(|| ParleyError::Generation(format!("exchange {n} is missing bot_says")))?;
            let expected = item
                .user_should_say
                .filter(|s| !s.trim().is_empty())
                .ok_or_else(|| {
                    ParleyError::Generation(format!("exchange {n} is missing user_should_say"))
                })?;
            Ok(Exchange::new(prompt.trim(), expected.trim()))
        })
        .collect()
}
