//! Narration engine backed by the DashScope speech synthesis endpoint.
//!
//! Each utterance is synthesized to `narration_<id>.mp3` in the output
//! directory on a background task. Completion and failure are reported on
//! the event channel given at construction.

use crate::api::QwenClient;
use crate::services::{
    NarrationEngine, NarrationEvent, NarrationEventKind, SpeechErrorCode, SpeechRequest,
    UtteranceId, Voice,
};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

const DEFAULT_VOICE: &str = "loongstella";

/// Voices offered by the CosyVoice model, English first.
const VOICES: &[(&str, &str, &str, bool)] = &[
    ("loongstella", "Stella", "en-US", true),
    ("loongbella", "Bella", "en-US", false),
    ("longxiaochun", "Long Xiaochun", "zh-CN", true),
    ("longwan", "Long Wan", "zh-CN", false),
];

pub struct DashScopeNarrator {
    client: Arc<QwenClient>,
    out_dir: PathBuf,
    events: mpsc::UnboundedSender<NarrationEvent>,
    current: Mutex<Option<(UtteranceId, JoinHandle<()>)>>,
}

impl DashScopeNarrator {
    pub fn new(
        client: Arc<QwenClient>,
        out_dir: impl Into<PathBuf>,
        events: mpsc::UnboundedSender<NarrationEvent>,
    ) -> Self {
        Self {
            client,
            out_dir: out_dir.into(),
            events,
            current: Mutex::new(None),
        }
    }

    fn emit(&self, utterance: UtteranceId, kind: NarrationEventKind) {
        // The receiver going away only means nobody is listening anymore.
        let _ = self.events.send(NarrationEvent { utterance, kind });
    }
}

impl NarrationEngine for DashScopeNarrator {
    fn voices(&self) -> Vec<Voice> {
        VOICES
            .iter()
            .map(|&(uri, name, lang, is_default)| Voice {
                uri: uri.to_string(),
                name: name.to_string(),
                lang: lang.to_string(),
                is_default,
            })
            .collect()
    }

    fn speak(&self, request: SpeechRequest) {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                warn!("Cannot start narration without an async runtime: {}", e);
                self.emit(
                    request.utterance,
                    NarrationEventKind::Error(SpeechErrorCode::Other("no-runtime".to_string())),
                );
                return;
            }
        };

        let utterance = request.utterance;
        let voice = request
            .voice
            .map(|v| v.uri)
            .unwrap_or_else(|| DEFAULT_VOICE.to_string());
        let output_path = self.out_dir.join(format!("narration_{}.mp3", utterance.0));
        let client = Arc::clone(&self.client);
        let events = self.events.clone();
        let text = request.text;

        info!("Synthesizing narration {} with voice {}", utterance.0, voice);
        let handle = runtime.spawn(async move {
            let kind = match client.generate_speech(&text, &voice, &output_path).await {
                Ok(()) => NarrationEventKind::End,
                Err(e) => NarrationEventKind::Error(SpeechErrorCode::Other(e.to_string())),
            };
            let _ = events.send(NarrationEvent { utterance, kind });
        });

        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        if let Some((previous, stale)) = current.replace((utterance, handle)) {
            if !stale.is_finished() {
                stale.abort();
                self.emit(previous, NarrationEventKind::Error(SpeechErrorCode::Interrupted));
            }
        }
    }

    fn cancel(&self) {
        let taken = self
            .current
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some((utterance, handle)) = taken {
            if !handle.is_finished() {
                handle.abort();
                self.emit(utterance, NarrationEventKind::Error(SpeechErrorCode::Interrupted));
            }
        }
    }
}
