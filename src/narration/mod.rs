//! Narration controller: owns the single speaking slot.
//!
//! At most one utterance is active. Playing the active scene again stops it;
//! playing another scene cancels the current utterance before starting the
//! new one. Engine events are matched by utterance id, so events from
//! canceled utterances are dropped.

pub mod speech;

use crate::config::{GenerationSettings, Language};
use crate::services::{
    NarrationEngine, NarrationEvent, NarrationEventKind, SpeechErrorCode, SpeechRequest,
    UtteranceId, Voice,
};
use crate::strings;
use std::sync::Arc;
use tracing::{debug, error, info};

pub use speech::DashScopeNarrator;

/// Picks the voice to use when the user has not chosen one.
///
/// Prefers the engine default among voices for `language`, then any voice
/// for `language`, then the first voice at all.
pub fn select_voice(voices: &[Voice], language: Language) -> Option<&Voice> {
    let code = language.code();
    let mut matching = voices.iter().filter(|v| v.lang.starts_with(code));
    let first_matching = matching.clone().next();
    matching
        .find(|v| v.is_default)
        .or(first_matching)
        .or_else(|| voices.first())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ActiveUtterance {
    scene_id: usize,
    utterance: UtteranceId,
}

pub struct NarrationController {
    engine: Arc<dyn NarrationEngine>,
    voices: Vec<Voice>,
    active: Option<ActiveUtterance>,
    next_utterance: u64,
}

impl NarrationController {
    pub fn new(engine: Arc<dyn NarrationEngine>) -> Self {
        let voices = engine.voices();
        debug!("Narration engine offers {} voices", voices.len());
        Self {
            engine,
            voices,
            active: None,
            next_utterance: 0,
        }
    }

    /// Scene currently being narrated.
    pub fn active_scene(&self) -> Option<usize> {
        self.active.map(|a| a.scene_id)
    }

    pub fn voices(&self) -> &[Voice] {
        &self.voices
    }

    /// Replaces the voice list. Any playback is stopped first.
    pub fn set_voices(&mut self, voices: Vec<Voice>) {
        self.stop();
        self.voices = voices;
    }

    /// Resolves the voice and language tag for a request.
    fn resolve_voice(&self, settings: &GenerationSettings) -> (Option<Voice>, String) {
        let chosen = settings
            .voice_uri
            .as_deref()
            .and_then(|uri| self.voices.iter().find(|v| v.uri == uri))
            .or_else(|| select_voice(&self.voices, settings.language));
        match chosen {
            Some(voice) => (Some(voice.clone()), voice.lang.clone()),
            None => (None, settings.language.locale_tag().to_string()),
        }
    }

    /// Toggles narration for a scene and returns the scene now speaking.
    pub fn toggle(
        &mut self,
        scene_id: usize,
        text: &str,
        settings: &GenerationSettings,
    ) -> Option<usize> {
        if self.active_scene() == Some(scene_id) {
            info!("Stopping narration for scene {}", scene_id);
            self.stop();
            return None;
        }

        // Always cancel first so two utterances never overlap.
        self.stop();

        self.next_utterance += 1;
        let utterance = UtteranceId(self.next_utterance);
        let (voice, lang) = self.resolve_voice(settings);
        info!(
            "Narrating scene {} with {} ({})",
            scene_id,
            voice.as_ref().map(|v| v.name.as_str()).unwrap_or("default voice"),
            lang
        );

        self.engine.speak(SpeechRequest {
            utterance,
            text: text.to_string(),
            voice,
            lang,
        });
        self.active = Some(ActiveUtterance {
            scene_id,
            utterance,
        });
        Some(scene_id)
    }

    /// Cancels playback on the user's behalf. Never reported as an error.
    pub fn stop(&mut self) {
        self.engine.cancel();
        self.active = None;
    }

    /// Applies an engine event. Returns a message to surface when playback
    /// failed for a reason other than an intentional interruption.
    pub fn handle_event(&mut self, event: NarrationEvent) -> Option<String> {
        let Some(active) = self.active else {
            debug!("Ignoring narration event for inactive utterance {:?}", event.utterance);
            return None;
        };
        if active.utterance != event.utterance {
            debug!("Ignoring stale narration event for {:?}", event.utterance);
            return None;
        }

        self.active = None;
        match event.kind {
            NarrationEventKind::End => {
                debug!("Narration for scene {} finished", active.scene_id);
                None
            }
            NarrationEventKind::Error(SpeechErrorCode::Interrupted) => {
                debug!("Narration for scene {} was interrupted", active.scene_id);
                None
            }
            NarrationEventKind::Error(SpeechErrorCode::Other(reason)) => {
                error!("Narration for scene {} failed: {}", active.scene_id, reason);
                Some(strings::narration_failed(&reason))
            }
        }
    }
}

impl Drop for NarrationController {
    fn drop(&mut self) {
        self.engine.cancel();
    }
}
