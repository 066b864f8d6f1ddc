//! Scene image pipeline: one image request at a time, in scene order.
//!
//! Each outcome is published as a fresh storyboard snapshot before the next
//! request starts. Failures are classified three ways:
//!
//! - `NotConfigured` aborts the run; the service cannot work at all.
//! - `RateLimited` stops the remaining scenes but keeps finished ones.
//! - anything else marks the scene failed and moves on.

use crate::error::StoryboardError;
use crate::scene::{ImageState, Storyboard};
use crate::services::ImageService;
use crate::strings;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Receives pipeline progress. Called synchronously between requests.
pub trait PipelineObserver: Send + Sync {
    /// A request for scene `id` is about to be issued.
    fn scene_started(&self, id: usize, total: usize);

    /// A scene's outcome has been recorded in `snapshot`.
    fn scene_settled(&self, snapshot: Arc<Storyboard>);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// Every scene was attempted. Carries the first per-scene error message.
    Finished { error: Option<String> },
    /// Stopped early on throttling.
    RateLimited,
    /// Stopped early because the image service is unusable.
    NotConfigured(String),
}

impl PipelineOutcome {
    /// Message to surface for this outcome, if any.
    pub fn error_message(&self) -> Option<String> {
        match self {
            Self::Finished { error } => error.clone(),
            Self::RateLimited => Some(strings::ERROR_RATE_LIMIT.to_string()),
            Self::NotConfigured(message) => Some(message.clone()),
        }
    }
}

/// Drives image synthesis for every pending scene.
///
/// Returns the last published snapshot together with how the run ended.
pub async fn run_image_pipeline(
    service: &dyn ImageService,
    storyboard: Arc<Storyboard>,
    observer: &dyn PipelineObserver,
) -> (Arc<Storyboard>, PipelineOutcome) {
    let total = storyboard.len();
    let mut current = storyboard;
    let mut first_error: Option<String> = None;

    for id in 0..total {
        let (prompt, overlay) = match current.scene(id) {
            Some(scene) => (scene.image_prompt.clone(), scene.overlay_text.clone()),
            None => break,
        };

        observer.scene_started(id, total);
        info!("Generating image for scene {} ({}/{})", id, id + 1, total);

        let result = service.synthesize_image(&prompt, &overlay).await;
        let (state, failure) = match result {
            Ok(image) => {
                info!("Scene {} image ready: {}", id, image.as_str());
                (ImageState::Ready(image), None)
            }
            Err(err) => {
                error!("Failed to generate image for scene {}: {}", id, err);
                (ImageState::Failed, Some(err))
            }
        };

        current = Arc::new(current.with_image_state(id, state));
        observer.scene_settled(Arc::clone(&current));

        match failure {
            None => {}
            Some(StoryboardError::NotConfigured(message)) => {
                warn!("Image service is not configured; aborting run");
                return (current, PipelineOutcome::NotConfigured(message));
            }
            Some(StoryboardError::RateLimited) => {
                warn!(
                    "Image rate limit hit at scene {}; skipping {} remaining scenes",
                    id,
                    total - id - 1
                );
                return (current, PipelineOutcome::RateLimited);
            }
            Some(_) => {
                first_error.get_or_insert_with(|| strings::ERROR_IMAGE.to_string());
            }
        }
    }

    (current, PipelineOutcome::Finished { error: first_error })
}
