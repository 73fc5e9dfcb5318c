//! `StubModel`: deterministic recognizer for tests and offline runs.
//!
//! Replays a queue of scripted transcripts, one per utterance. With an empty
//! queue it returns a blank transcript, which the engine treats as
//! unintelligible audio.

use std::collections::VecDeque;

use tracing::debug;

use crate::audio::AudioChunk;
use crate::error::{ParleyError, Result};
use crate::inference::{SpeechModel, Transcript};

/// Scripted response for one `transcribe` call.
#[derive(Debug, Clone)]
pub enum StubReply {
    Text(String),
    Fail(String),
}

#[derive(Debug, Default)]
pub struct StubModel {
    replies: VecDeque<StubReply>,
    utterance_count: u32,
}

impl StubModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stub that hears each of `texts` in order.
    pub fn scripted<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: texts.into_iter().map(|t| StubReply::Text(t.into())).collect(),
            utterance_count: 0,
        }
    }

    pub fn push(&mut self, reply: StubReply) {
        self.replies.push_back(reply);
    }

    pub fn utterance_count(&self) -> u32 {
        self.utterance_count
    }
}

impl SpeechModel for StubModel {
    fn warm_up(&mut self) -> Result<()> {
        debug!("StubModel::warm_up no-op");
        Ok(())
    }

    fn transcribe(&mut self, chunk: &AudioChunk) -> Result<Transcript> {
        self.utterance_count += 1;
        debug!(
            utterance = self.utterance_count,
            samples = chunk.samples.len(),
            sample_rate = chunk.sample_rate,
            "StubModel::transcribe"
        );
        match self.replies.pop_front() {
            Some(StubReply::Text(text)) => Ok(Transcript::new(text, Some(1.0))),
            Some(StubReply::Fail(reason)) => Err(ParleyError::Transcription(reason)),
            None => Ok(Transcript::new("", None)),
        }
    }

    fn name(&self) -> &'static str {
        "stub"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replays_in_order_then_goes_blank() {
        let mut model = StubModel::scripted(["hello", "world"]);
        let clip = AudioChunk::new(vec![0.0; 1600], 16_000);
        assert_eq!(model.transcribe(&clip).unwrap().text, "hello");
        assert_eq!(model.transcribe(&clip).unwrap().text, "world");
        assert!(model.transcribe(&clip).unwrap().is_blank());
        assert_eq!(model.utterance_count(), 3);
    }

    #[test]
    fn scripted_failure_surfaces_as_error() {
        let mut model = StubModel::new();
        model.push(StubReply::Fail("backend down".into()));
        let clip = AudioChunk::new(vec![0.0; 10], 16_000);
        assert!(matches!(
            model.transcribe(&clip),
            Err(ParleyError::Transcription(_))
        ));
    }
}
