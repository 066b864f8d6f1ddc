//! Contracts for the external collaborators the orchestrator drives.
//!
//! Implementations map their native failures into [`StoryboardError`] before
//! returning, so callers only ever branch on the closed variant set.

use crate::config::Language;
use crate::error::Result;
use crate::scene::{ImageRef, Storyboard};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Progress sink handed to the renderer. Values are fractions in `[0, 1]`.
pub type ProgressFn<'a> = &'a (dyn Fn(f32) + Send + Sync);

/// Produces a storyboard skeleton from a prompt.
#[async_trait]
pub trait ScriptService: Send + Sync {
    async fn acquire_script(
        &self,
        prompt: &str,
        language: Language,
        scene_count: usize,
    ) -> Result<Storyboard>;
}

/// Synthesizes one scene illustration.
#[async_trait]
pub trait ImageService: Send + Sync {
    async fn synthesize_image(&self, image_prompt: &str, overlay_text: &str) -> Result<ImageRef>;
}

/// Playable video produced by a render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoArtifact {
    pub path: PathBuf,
}

/// Turns a complete storyboard into a video.
#[async_trait]
pub trait RenderService: Send + Sync {
    async fn render_video(
        &self,
        storyboard: &Storyboard,
        on_progress: ProgressFn<'_>,
    ) -> Result<VideoArtifact>;
}

/// A narration voice offered by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voice {
    pub uri: String,
    pub name: String,
    /// BCP 47 style tag, e.g. `en-US`.
    pub lang: String,
    pub is_default: bool,
}

/// Identifies one `speak` call so late events can be matched or discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UtteranceId(pub u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechRequest {
    pub utterance: UtteranceId,
    pub text: String,
    pub voice: Option<Voice>,
    /// Language tag to use, either the voice's own or a locale fallback.
    pub lang: String,
}

/// Engine-reported error codes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeechErrorCode {
    /// Playback was canceled on purpose.
    Interrupted,
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NarrationEventKind {
    End,
    Error(SpeechErrorCode),
}

/// Completion or failure of an utterance, delivered asynchronously.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NarrationEvent {
    pub utterance: UtteranceId,
    pub kind: NarrationEventKind,
}

/// Speech engine. `speak` and `cancel` return immediately; outcomes arrive as
/// [`NarrationEvent`]s on the channel the engine was built with.
pub trait NarrationEngine: Send + Sync {
    fn voices(&self) -> Vec<Voice>;

    fn speak(&self, request: SpeechRequest);

    /// Stops whatever is being spoken. Canceled utterances report
    /// [`SpeechErrorCode::Interrupted`].
    fn cancel(&self);
}
