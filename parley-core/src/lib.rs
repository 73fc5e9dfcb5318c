//! # parley-core
//!
//! Conversation-practice engine: scores a learner's reply against the
//! expected line of a scripted dialogue and decides whether to move on.
//!
//! ## Architecture
//!
//! ```text
//! WAV upload → PracticeEngine::transcribe_wav ──► candidate text
//!                                                     │
//!                               score + align (scoring)
//!                                                     │
//!                       Session::submit (dialogue) → Advanced / Retry / Completed
//!                                                     │
//!                          LevelingState::record_completion (leveling)
//! ```
//!
//! Scripts come from a `DialogueGenerator` via `PracticeEngine::prepare_script`,
//! falling back to the built-in library when the generator is slow or fails.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod audio;
pub mod dialogue;
pub mod engine;
pub mod error;
pub mod generation;
pub mod inference;
pub mod leveling;
pub mod scoring;
pub mod topics;

pub use dialogue::{
    Completion, Exchange, Outcome, ProgressionConfig, Script, Session, SessionState, TurnResult,
};
pub use engine::{EngineConfig, PracticeEngine, ScriptOutcome, Transcription};
pub use error::{ParleyError, Result};
pub use generation::{CannedGenerator, DialogueGenerator, GenerationRequest, GeneratorHandle};
pub use inference::{ModelHandle, SpeechModel, StubModel, Transcript, UNINTELLIGIBLE};
pub use leveling::{LevelingPolicy, LevelingState, Tier};
pub use scoring::{align, score, AlignThresholds, Alignment, WordTag};
pub use topics::Topic;

#[cfg(feature = "cloud")]
pub use generation::{GeminiConfig, GeminiGenerator};

#[cfg(feature = "cloud")]
pub use inference::{OpenAiTranscriber, OpenAiTranscriberConfig};
