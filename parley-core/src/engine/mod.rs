//! `PracticeEngine`: runs the blocking collaborators off the async runtime.
//!
//! ## Flow
//!
//! ```text
//! transcribe_wav(bytes)
//!     decode_wav → to_model_rate → spawn_blocking(SpeechModel::transcribe)
//!                                        │ timeout / error / blank
//!                                        ▼
//!                       Transcription::Fallback { UNINTELLIGIBLE, reason }
//!
//! prepare_script(request)
//!     spawn_blocking(DialogueGenerator::generate) → Script::new
//!                                        │ timeout / error / invalid
//!                                        ▼
//!                       ScriptOutcome::Fallback { CannedGenerator script }
//! ```
//!
//! Neither operation returns an error for a collaborator failure. Failures
//! are logged and surface as explicit fallback variants so the caller always
//! has something to show the learner.

pub mod diagnostics;

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

pub use diagnostics::{DiagnosticsSnapshot, EngineDiagnostics};

use crate::audio::{decode_wav, to_model_rate};
use crate::dialogue::{ProgressionConfig, Script};
use crate::error::{ParleyError, Result};
use crate::generation::{CannedGenerator, GenerationRequest, GeneratorHandle};
use crate::inference::{ModelHandle, Transcript, UNINTELLIGIBLE};
use crate::leveling::LevelingPolicy;

/// Configuration for `PracticeEngine`.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Sample rate the speech model expects (Hz). Default: 16000.
    pub model_sample_rate: u32,
    /// Upper bound on one transcription call. Default: 20 s.
    pub transcription_timeout: Duration,
    /// Upper bound on one script generation call. Default: 30 s.
    pub generation_timeout: Duration,
    pub progression: ProgressionConfig,
    pub leveling: LevelingPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model_sample_rate: 16_000,
            transcription_timeout: Duration::from_secs(20),
            generation_timeout: Duration::from_secs(30),
            progression: ProgressionConfig::default(),
            leveling: LevelingPolicy::default(),
        }
    }
}

/// What the learner is taken to have said.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Transcription {
    Heard {
        text: String,
        confidence: Option<f32>,
    },
    /// Recognition failed; `text` is [`UNINTELLIGIBLE`].
    Fallback { text: String, reason: String },
}

impl Transcription {
    fn fallback(reason: impl Into<String>) -> Self {
        Transcription::Fallback {
            text: UNINTELLIGIBLE.to_string(),
            reason: reason.into(),
        }
    }

    pub fn text(&self) -> &str {
        match self {
            Transcription::Heard { text, .. } | Transcription::Fallback { text, .. } => text,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Transcription::Fallback { .. })
    }
}

/// The script to start, and whether the live generator produced it.
#[derive(Debug, Clone)]
pub enum ScriptOutcome {
    Generated(Script),
    Fallback { script: Script, reason: String },
}

impl ScriptOutcome {
    pub fn script(&self) -> &Script {
        match self {
            ScriptOutcome::Generated(script) | ScriptOutcome::Fallback { script, .. } => script,
        }
    }

    pub fn into_script(self) -> Script {
        match self {
            ScriptOutcome::Generated(script) | ScriptOutcome::Fallback { script, .. } => script,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, ScriptOutcome::Fallback { .. })
    }
}

/// Shared engine handle. `Send + Sync`; wrap in `Arc` for app state.
pub struct PracticeEngine {
    config: EngineConfig,
    model: ModelHandle,
    generator: GeneratorHandle,
    diagnostics: Arc<EngineDiagnostics>,
}

impl PracticeEngine {
    pub fn new(config: EngineConfig, model: ModelHandle, generator: GeneratorHandle) -> Self {
        Self {
            config,
            model,
            generator,
            diagnostics: Arc::new(EngineDiagnostics::default()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Warm up the speech model. Call once at startup.
    ///
    /// # Errors
    /// Propagates the backend's warm-up error (e.g. a missing API key).
    pub fn warm_up(&self) -> Result<()> {
        info!("warming up speech model");
        let mut model = self.model.0.lock();
        model.warm_up()?;
        info!(backend = model.name(), "speech model ready");
        Ok(())
    }

    /// Transcribe an uploaded WAV clip. Never fails: decode errors, backend
    /// errors, timeouts and blank results all become `Fallback`.
    pub async fn transcribe_wav(&self, wav: Vec<u8>) -> Transcription {
        EngineDiagnostics::bump(&self.diagnostics.transcriptions);
        match self.try_transcribe(wav).await {
            Ok(transcript) if !transcript.is_blank() => {
                debug!(chars = transcript.text.len(), "utterance transcribed");
                Transcription::Heard {
                    text: transcript.text.trim().to_string(),
                    confidence: transcript.confidence,
                }
            }
            Ok(_) => {
                EngineDiagnostics::bump(&self.diagnostics.transcription_fallbacks);
                warn!("no speech recognized, using fallback text");
                Transcription::fallback("no speech recognized")
            }
            Err(e) => {
                EngineDiagnostics::bump(&self.diagnostics.transcription_fallbacks);
                if matches!(e, ParleyError::Timeout(_)) {
                    EngineDiagnostics::bump(&self.diagnostics.timeouts);
                }
                warn!(error = %e, "transcription failed, using fallback text");
                Transcription::fallback(e.to_string())
            }
        }
    }

    async fn try_transcribe(&self, wav: Vec<u8>) -> Result<Transcript> {
        let model = self.model.clone();
        let target_rate = self.config.model_sample_rate;
        let work = tokio::task::spawn_blocking(move || {
            let clip = to_model_rate(decode_wav(&wav)?, target_rate)?;
            if clip.is_empty() {
                return Ok(Transcript::new("", None));
            }
            model.0.lock().transcribe(&clip)
        });

        match tokio::time::timeout(self.config.transcription_timeout, work).await {
            Ok(Ok(result)) => result,
            Ok(Err(join)) => Err(ParleyError::Transcription(format!("worker panicked: {join}"))),
            Err(_) => Err(ParleyError::Timeout("transcription")),
        }
    }

    /// Produce a script for `request`. Never fails: generator errors,
    /// timeouts and invalid output fall back to the canned library.
    pub async fn prepare_script(&self, request: &GenerationRequest) -> ScriptOutcome {
        EngineDiagnostics::bump(&self.diagnostics.generations);
        match self.try_generate(request).await {
            Ok(script) => {
                info!(
                    topic = %request.topic,
                    tier = %request.tier,
                    exchanges = script.len(),
                    "dialogue generated"
                );
                ScriptOutcome::Generated(script)
            }
            Err(e) => {
                EngineDiagnostics::bump(&self.diagnostics.generation_fallbacks);
                if matches!(e, ParleyError::Timeout(_)) {
                    EngineDiagnostics::bump(&self.diagnostics.timeouts);
                }
                warn!(topic = %request.topic, error = %e, "generation failed, using canned dialogue");
                ScriptOutcome::Fallback {
                    script: canned_script(request),
                    reason: e.to_string(),
                }
            }
        }
    }

    async fn try_generate(&self, request: &GenerationRequest) -> Result<Script> {
        let generator = self.generator.clone();
        let owned = request.clone();
        let work = tokio::task::spawn_blocking(move || generator.0.lock().generate(&owned));

        let mut exchanges = match tokio::time::timeout(self.config.generation_timeout, work).await {
            Ok(Ok(result)) => result?,
            Ok(Err(join)) => {
                return Err(ParleyError::Generation(format!("worker panicked: {join}")))
            }
            Err(_) => return Err(ParleyError::Timeout("dialogue generation")),
        };
        if request.exchange_count > 0 {
            exchanges.truncate(request.exchange_count);
        }
        Script::new(request.topic.trim(), request.tier, exchanges)
            .map_err(|e| ParleyError::Generation(e.to_string()))
    }

    pub fn diagnostics_snapshot(&self) -> DiagnosticsSnapshot {
        self.diagnostics.snapshot()
    }
}

fn canned_script(request: &GenerationRequest) -> Script {
    CannedGenerator::script(request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{encode_wav_pcm16, AudioChunk};
    use crate::dialogue::Exchange;
    use crate::generation::DialogueGenerator;
    use crate::inference::stub::StubReply;
    use crate::inference::{SpeechModel, StubModel};
    use crate::leveling::Tier;

    struct SlowModel;

    impl SpeechModel for SlowModel {
        fn warm_up(&mut self) -> Result<()> {
            Ok(())
        }
        fn transcribe(&mut self, _chunk: &AudioChunk) -> Result<Transcript> {
            std::thread::sleep(Duration::from_millis(300));
            Ok(Transcript::new("too late", None))
        }
        fn name(&self) -> &'static str {
            "slow"
        }
    }

    struct FixedGenerator(Result<Vec<Exchange>>);

    impl DialogueGenerator for FixedGenerator {
        fn generate(&mut self, _request: &GenerationRequest) -> Result<Vec<Exchange>> {
            match &self.0 {
                Ok(v) => Ok(v.clone()),
                Err(e) => Err(ParleyError::Generation(e.to_string())),
            }
        }
        fn name(&self) -> &'static str {
            "fixed"
        }
    }

    struct SlowGenerator;

    impl DialogueGenerator for SlowGenerator {
        fn generate(&mut self, _request: &GenerationRequest) -> Result<Vec<Exchange>> {
            std::thread::sleep(Duration::from_millis(300));
            Ok(vec![Exchange::new("late", "late")])
        }
        fn name(&self) -> &'static str {
            "slow"
        }
    }

    fn wav_48k() -> Vec<u8> {
        encode_wav_pcm16(&AudioChunk::new(vec![0.1; 4_800], 48_000)).unwrap()
    }

    fn engine(model: ModelHandle, generator: GeneratorHandle) -> PracticeEngine {
        engine_with_timeout(model, generator, Duration::from_secs(5))
    }

    fn engine_with_timeout(
        model: ModelHandle,
        generator: GeneratorHandle,
        timeout: Duration,
    ) -> PracticeEngine {
        let config = EngineConfig {
            transcription_timeout: timeout,
            generation_timeout: timeout,
            ..EngineConfig::default()
        };
        PracticeEngine::new(config, model, generator)
    }

    #[tokio::test]
    async fn heard_text_is_trimmed() {
        let e = engine(
            ModelHandle::new(StubModel::scripted(["  I like pizza  "])),
            GeneratorHandle::new(CannedGenerator),
        );
        let t = e.transcribe_wav(wav_48k()).await;
        assert_eq!(
            t,
            Transcription::Heard {
                text: "I like pizza".into(),
                confidence: Some(1.0)
            }
        );
    }

    #[tokio::test]
    async fn failures_become_sentinel_text() {
        let mut stub = StubModel::new();
        stub.push(StubReply::Fail("backend down".into()));
        let e = engine(ModelHandle::new(stub), GeneratorHandle::new(CannedGenerator));

        let failed = e.transcribe_wav(wav_48k()).await;
        assert!(failed.is_fallback());
        assert_eq!(failed.text(), UNINTELLIGIBLE);

        // Queue is empty now: blank transcript.
        assert!(e.transcribe_wav(wav_48k()).await.is_fallback());
        // Not a WAV at all.
        assert!(e.transcribe_wav(b"garbage".to_vec()).await.is_fallback());

        let snap = e.diagnostics_snapshot();
        assert_eq!(snap.transcriptions, 3);
        assert_eq!(snap.transcription_fallbacks, 3);
    }

    #[tokio::test]
    async fn slow_model_times_out() {
        let e = engine_with_timeout(
            ModelHandle::new(SlowModel),
            GeneratorHandle::new(CannedGenerator),
            Duration::from_millis(50),
        );
        match e.transcribe_wav(wav_48k()).await {
            Transcription::Fallback { reason, .. } => assert!(reason.contains("timed out"), "{reason}"),
            other => panic!("expected fallback, got {other:?}"),
        }
        assert_eq!(e.diagnostics_snapshot().timeouts, 1);
    }

    #[tokio::test]
    async fn generated_script_is_truncated_to_request() {
        let exchanges = (1..=9)
            .map(|i| Exchange::new(format!("q{i}"), format!("a{i}")))
            .collect();
        let e = engine(
            ModelHandle::new(StubModel::new()),
            GeneratorHandle::new(FixedGenerator(Ok(exchanges))),
        );
        let outcome = e
            .prepare_script(&GenerationRequest::new("food", Tier::Medium, 7))
            .await;
        assert!(!outcome.is_fallback());
        assert_eq!(outcome.script().len(), 7);
        assert_eq!(outcome.script().tier(), Tier::Medium);
    }

    #[tokio::test]
    async fn invalid_generation_falls_back_to_canned() {
        let e = engine(
            ModelHandle::new(StubModel::new()),
            GeneratorHandle::new(FixedGenerator(Ok(vec![Exchange::new("Hi", " ")]))),
        );
        let outcome = e
            .prepare_script(&GenerationRequest::new("favorite food", Tier::Easy, 5))
            .await;
        match &outcome {
            ScriptOutcome::Fallback { script, reason } => {
                assert_eq!(script.len(), 5);
                assert_eq!(script.exchanges()[0].prompt, "What's your favorite food?");
                assert!(reason.contains("empty expected response"), "{reason}");
            }
            other => panic!("expected fallback, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn generator_error_and_timeout_fall_back() {
        let failing = engine(
            ModelHandle::new(StubModel::new()),
            GeneratorHandle::new(FixedGenerator(Err(ParleyError::Generation("quota".into())))),
        );
        let req = GenerationRequest::new("daily routine", Tier::Easy, 5);
        assert!(failing.prepare_script(&req).await.is_fallback());

        let slow = engine_with_timeout(
            ModelHandle::new(StubModel::new()),
            GeneratorHandle::new(SlowGenerator),
            Duration::from_millis(50),
        );
        let outcome = slow.prepare_script(&req).await;
        assert!(outcome.is_fallback());
        assert_eq!(outcome.into_script().len(), 5);
        assert_eq!(slow.diagnostics_snapshot().generation_fallbacks, 1);
    }
}
