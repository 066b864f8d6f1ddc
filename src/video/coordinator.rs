//! Video render coordination: precondition check, progress relay and failure
//! classification around a [`RenderService`].

use crate::error::{Result, StoryboardError};
use crate::scene::Storyboard;
use crate::services::{ProgressFn, RenderService, VideoArtifact};
use crate::strings;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};

/// Rejects storyboards that still have pending or failed images.
pub fn ensure_renderable(storyboard: &Storyboard) -> Result<()> {
    if storyboard.all_images_ready() {
        Ok(())
    } else {
        Err(StoryboardError::Precondition(strings::ERROR_VIDEO.to_string()))
    }
}

/// Turns a renderer failure into the message shown to the user.
pub fn render_failure_message(err: &StoryboardError) -> String {
    let raw = match err {
        StoryboardError::Generic(message) => message.clone(),
        other => other.to_string(),
    };
    if raw.to_lowercase().contains("decode audio") {
        strings::ERROR_AUDIO_DECODE.to_string()
    } else if raw.trim().is_empty() {
        strings::ERROR_VIDEO.to_string()
    } else {
        raw
    }
}

/// Owns the rendered video reference. Observers follow it through
/// [`RenderCoordinator::subscribe`].
pub struct RenderCoordinator {
    service: Arc<dyn RenderService>,
    video: watch::Sender<Option<VideoArtifact>>,
}

impl RenderCoordinator {
    pub fn new(service: Arc<dyn RenderService>) -> Self {
        let (video, _) = watch::channel(None);
        Self { service, video }
    }

    pub fn video(&self) -> Option<VideoArtifact> {
        self.video.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<VideoArtifact>> {
        self.video.subscribe()
    }

    pub fn clear(&self) {
        self.video.send_replace(None);
    }

    /// Renders `storyboard`, replacing any previous video.
    ///
    /// Fails with `Precondition` before touching anything when an image is
    /// missing. Other failures come back as `Generic` carrying the
    /// user-facing message.
    pub async fn render(
        &self,
        storyboard: &Storyboard,
        on_progress: ProgressFn<'_>,
    ) -> Result<VideoArtifact> {
        ensure_renderable(storyboard)?;
        self.clear();

        let clamped = |fraction: f32| on_progress(fraction.clamp(0.0, 1.0));
        info!("Rendering video for {} scenes", storyboard.len());
        match self.service.render_video(storyboard, &clamped).await {
            Ok(artifact) => {
                info!("Video ready at {}", artifact.path.display());
                self.video.send_replace(Some(artifact.clone()));
                Ok(artifact)
            }
            Err(err) => {
                error!("Video generation failed: {}", err);
                Err(StoryboardError::Generic(render_failure_message(&err)))
            }
        }
    }
}
