//! Speech model abstraction.
//!
//! The `SpeechModel` trait decouples the practice engine from any specific
//! recognizer (the deterministic stub, a cloud transcription API, ...).
//!
//! `transcribe` takes `&mut self` because real backends keep per-client
//! state such as HTTP connection pools or decoder caches. All calls are
//! serialised through `ModelHandle`'s `parking_lot::Mutex`.

pub mod stub;

#[cfg(feature = "cloud")]
pub mod cloud;

#[cfg(feature = "cloud")]
pub use cloud::{OpenAiTranscriber, OpenAiTranscriberConfig};

pub use stub::StubModel;

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use crate::audio::AudioChunk;
use crate::error::Result;

/// Text substituted for the learner's reply when recognition fails.
///
/// It is scored like any other reply and will normally land below the
/// acceptance threshold, so the learner simply gets the prompt again.
pub const UNINTELLIGIBLE: &str = "could not understand the audio";

/// Recognized text for one utterance.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Transcript {
    pub text: String,
    /// 0.0..=1.0 when the backend reports it.
    pub confidence: Option<f32>,
}

impl Transcript {
    pub fn new(text: impl Into<String>, confidence: Option<f32>) -> Self {
        Self {
            text: text.into(),
            confidence,
        }
    }

    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Contract for speech recognition backends.
pub trait SpeechModel: Send + 'static {
    /// One-time warm-up. Called once when the engine starts.
    ///
    /// # Errors
    /// Returns an error if the backend is misconfigured.
    fn warm_up(&mut self) -> Result<()>;

    /// Transcribe a mono clip at the engine's model rate.
    ///
    /// # Errors
    /// `Transcription` when the backend fails. A blank transcript is not an
    /// error; callers decide what to do with silence.
    fn transcribe(&mut self, chunk: &AudioChunk) -> Result<Transcript>;

    /// Short backend label for logs and metrics.
    fn name(&self) -> &'static str;
}

/// Thread-safe reference-counted handle to any `SpeechModel` implementor.
#[derive(Clone)]
pub struct ModelHandle(pub Arc<Mutex<dyn SpeechModel>>);

impl ModelHandle {
    pub fn new<M: SpeechModel>(model: M) -> Self {
        Self(Arc::new(Mutex::new(model)))
    }
}

impl std::fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelHandle").finish_non_exhaustive()
    }
}
