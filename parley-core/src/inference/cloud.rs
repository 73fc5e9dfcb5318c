//! OpenAI audio transcription backend.
//!
//! Posts each utterance as an in-memory 16-bit WAV via multipart upload and
//! reads back the `text` field of the JSON response.

use std::time::Duration;

use reqwest::blocking::{multipart, Client};
use tracing::{debug, warn};

use crate::audio::{encode_wav_pcm16, AudioChunk};
use crate::error::{ParleyError, Result};
use crate::inference::{SpeechModel, Transcript};

const TRANSCRIPTIONS_URL: &str = "https://api.openai.com/v1/audio/transcriptions";

#[derive(Debug, Clone)]
pub struct OpenAiTranscriberConfig {
    pub api_key: String,
    /// Default: `gpt-4o-mini-transcribe`.
    pub model: String,
    pub endpoint: String,
    pub timeout: Duration,
    /// ISO-639-1 hint passed as `language`. Default: `en`.
    pub language: Option<String>,
}

impl OpenAiTranscriberConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: "gpt-4o-mini-transcribe".into(),
            endpoint: TRANSCRIPTIONS_URL.into(),
            timeout: Duration::from_secs(20),
            language: Some("en".into()),
        }
    }
}

pub struct OpenAiTranscriber {
    config: OpenAiTranscriberConfig,
    client: Option<Client>,
}

impl OpenAiTranscriber {
    pub fn new(config: OpenAiTranscriberConfig) -> Self {
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
                .map_err(|e| ParleyError::Transcription(format!("client build: {e}")))?;
            self.client = Some(client);
        }
        self.client
            .as_ref()
            .ok_or_else(|| ParleyError::Transcription("client unavailable".into()))
    }
}

impl SpeechModel for OpenAiTranscriber {
    fn warm_up(&mut self) -> Result<()> {
        if self.config.api_key.trim().is_empty() {
            return Err(ParleyError::Transcription("missing OpenAI API key".into()));
        }
        self.client()?;
        debug!(model = %self.config.model, "OpenAI transcriber ready");
        Ok(())
    }

    fn transcribe(&mut self, chunk: &AudioChunk) -> Result<Transcript> {
        if chunk.is_empty() {
            return Ok(Transcript::new("", None));
        }
        let wav_bytes = encode_wav_pcm16(chunk)?;
        let file_part = multipart::Part::bytes(wav_bytes)
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .map_err(|e| ParleyError::Transcription(format!("multipart part: {e}")))?;
        let mut form = multipart::Form::new()
            .text("model", self.config.model.clone())
            .text("response_format", "json")
            .part("file", file_part);
        if let Some(lang) = &self.config.language {
            form = form.text("language", lang.clone());
        }

        let endpoint = self.config.endpoint.clone();
        let api_key = self.config.api_key.clone();
        let response = self
            .client()?
            .post(&endpoint)
            .bearer_auth(api_key)
            .multipart(form)
            .send()
            .map_err(|e| ParleyError::Transcription(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            warn!(status = %response.status(), "transcription request returned non-success status");
            return Err(ParleyError::Transcription(format!(
                "HTTP {}",
                response.status()
            )));
        }

        let payload: serde_json::Value = response
            .json()
            .map_err(|e| ParleyError::Transcription(format!("json parse: {e}")))?;
        let text = payload
            .get("text")
            .and_then(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .ok_or_else(|| ParleyError::Transcription("response missing text".into()))?;

        debug!(chars = text.len(), "cloud transcript received");
        Ok(Transcript::new(text, None))
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}
