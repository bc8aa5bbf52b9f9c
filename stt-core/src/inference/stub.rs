//! `StubModel` — deterministic placeholder backend, and `ScriptedModel`, a
//! test double that returns pre-programmed responses in order.

use std::collections::VecDeque;

use tracing::debug;

use crate::error::Result;
use crate::inference::{postprocess, SpeechModel};

/// Echo-style stub model used when no real model is configured (e.g. smoke
/// runs without a GGML file on disk). Emits a fixed description of the
/// utterance it received; never errors.
#[derive(Default)]
pub struct StubModel {
    utterance_count: u32,
}

impl StubModel {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SpeechModel for StubModel {
    fn warm_up(&mut self) -> Result<()> {
        debug!("StubModel::warm_up — no-op");
        Ok(())
    }

    fn transcribe(&mut self, samples: &[f32]) -> Result<String> {
        if samples.len() < 160 {
            return Ok(String::new());
        }
        self.utterance_count += 1;
        Ok(format!(
            "[stub utterance {} — {} samples]",
            self.utterance_count,
            samples.len()
        ))
    }
}

/// Test double that returns each queued response in order, regardless of
/// the samples it is given. Grounded on the teacher's `ScriptedVad`/
/// `TestModel` pattern from `engine/pipeline.rs`'s test module.
pub struct ScriptedModel {
    responses: VecDeque<Result<String>>,
    pub calls: u32,
}

impl ScriptedModel {
    /// Queue raw, not-yet-postprocessed responses — mirrors what a real
    /// backend's segment concatenation would hand the shared `postprocess`
    /// step, letting tests assert that filter tokens are actually stripped.
    pub fn new(responses: Vec<&str>) -> Self {
        Self {
            responses: responses.into_iter().map(|s| Ok(s.to_string())).collect(),
            calls: 0,
        }
    }
}

impl SpeechModel for ScriptedModel {
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }

    fn transcribe(&mut self, _samples: &[f32]) -> Result<String> {
        self.calls += 1;
        let raw = self
            .responses
            .pop_front()
            .unwrap_or_else(|| Ok(String::new()))?;
        Ok(postprocess(raw))
    }
}
