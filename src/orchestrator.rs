//! Generation orchestrator.
//!
//! Sequences script acquisition and the scene image pipeline, owns the
//! generation state and the storyboard snapshot, and resets narration and
//! the rendered video whenever a new run starts.
//!
//! ```text
//! Idle --submit--> Running(script) --ok--> Running(images i/n) --done--> SettledOk
//!                        |                        |                  \-> SettledWithError
//!                        \---- NotConfigured -----+--> configuration error (terminal)
//! ```

use crate::config::GenerationSettings;
use crate::error::{Result, StoryboardError};
use crate::narration::NarrationController;
use crate::pipeline::{acquire_script, run_image_pipeline, PipelineObserver, PipelineOutcome};
use crate::scene::Storyboard;
use crate::services::{
    ImageService, NarrationEngine, NarrationEvent, RenderService, ScriptService, VideoArtifact,
    Voice,
};
use crate::strings;
use crate::video::{ensure_renderable, RenderCoordinator};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// What the orchestrator is busy with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Script,
    /// `position` is 1-based.
    Images { position: usize, total: usize },
    Video { percent: u8 },
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Script => f.write_str(strings::LOADER_SCRIPT),
            Stage::Images { position, total } => {
                write!(f, "{} ({}/{})", strings::LOADER_IMAGES, position, total)
            }
            Stage::Video { percent } => write!(f, "{} ({}%)", strings::LOADER_VIDEO, percent),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum GenerationState {
    #[default]
    Idle,
    Running(Stage),
    SettledOk,
    SettledWithError(String),
}

impl GenerationState {
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running(_))
    }

    /// Loader text for the current stage; empty once settled.
    pub fn label(&self) -> Option<String> {
        match self {
            Self::Running(stage) => Some(stage.to_string()),
            _ => None,
        }
    }
}

/// How a submitted run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Blank prompt; nothing happened.
    Ignored,
    Completed,
    CompletedWithError(String),
    /// A service reported it is not configured. No further runs are accepted.
    ConfigurationError(String),
}

/// The collaborators an orchestrator drives.
pub struct Collaborators {
    pub script: Arc<dyn ScriptService>,
    pub images: Arc<dyn ImageService>,
    pub render: Arc<dyn RenderService>,
    pub narration: Arc<dyn NarrationEngine>,
}

/// Publishes pipeline progress into the orchestrator's watch channels.
struct RunObserver<'a> {
    state: &'a watch::Sender<GenerationState>,
    storyboard: &'a watch::Sender<Option<Arc<Storyboard>>>,
}

impl PipelineObserver for RunObserver<'_> {
    fn scene_started(&self, id: usize, total: usize) {
        self.state.send_replace(GenerationState::Running(Stage::Images {
            position: id + 1,
            total,
        }));
    }

    fn scene_settled(&self, snapshot: Arc<Storyboard>) {
        self.storyboard.send_replace(Some(snapshot));
    }
}

pub struct Orchestrator {
    script: Arc<dyn ScriptService>,
    images: Arc<dyn ImageService>,
    narration: NarrationController,
    render: RenderCoordinator,
    state: watch::Sender<GenerationState>,
    storyboard: watch::Sender<Option<Arc<Storyboard>>>,
    error: Option<String>,
    config_error: Option<String>,
    settings: GenerationSettings,
    run_id: u64,
}

impl Orchestrator {
    pub fn new(collaborators: Collaborators) -> Self {
        let (state, _) = watch::channel(GenerationState::Idle);
        let (storyboard, _) = watch::channel(None);
        Self {
            script: collaborators.script,
            images: collaborators.images,
            narration: NarrationController::new(collaborators.narration),
            render: RenderCoordinator::new(collaborators.render),
            state,
            storyboard,
            error: None,
            config_error: None,
            settings: GenerationSettings::default(),
            run_id: 0,
        }
    }

    pub fn state(&self) -> GenerationState {
        self.state.borrow().clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<GenerationState> {
        self.state.subscribe()
    }

    pub fn storyboard(&self) -> Option<Arc<Storyboard>> {
        self.storyboard.borrow().clone()
    }

    pub fn subscribe_storyboard(&self) -> watch::Receiver<Option<Arc<Storyboard>>> {
        self.storyboard.subscribe()
    }

    pub fn video(&self) -> Option<VideoArtifact> {
        self.render.video()
    }

    pub fn subscribe_video(&self) -> watch::Receiver<Option<VideoArtifact>> {
        self.render.subscribe()
    }

    /// The single error message currently shown.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Set once a service reported it is not configured.
    pub fn configuration_error(&self) -> Option<&str> {
        self.config_error.as_deref()
    }

    pub fn narrating_scene(&self) -> Option<usize> {
        self.narration.active_scene()
    }

    pub fn voices(&self) -> &[Voice] {
        self.narration.voices()
    }

    /// Settings captured by the most recent run.
    pub fn settings(&self) -> &GenerationSettings {
        &self.settings
    }

    pub fn run_id(&self) -> u64 {
        self.run_id
    }

    fn set_state(&self, state: GenerationState) {
        debug!("Generation state -> {:?}", state);
        self.state.send_replace(state);
    }

    fn settle(&self) {
        match &self.error {
            Some(message) => self.set_state(GenerationState::SettledWithError(message.clone())),
            None => self.set_state(GenerationState::SettledOk),
        }
    }

    fn enter_configuration_error(&mut self, message: String) -> RunOutcome {
        error!("Service not configured: {}", message);
        self.narration.stop();
        self.config_error = Some(message.clone());
        self.error = Some(message.clone());
        self.settle();
        RunOutcome::ConfigurationError(message)
    }

    /// Runs the whole generation pipeline for `prompt`.
    ///
    /// Prior storyboard, error, video and narration are cleared before the
    /// first service call. `settings` is captured for the duration of the run.
    pub async fn submit(&mut self, prompt: &str, settings: GenerationSettings) -> RunOutcome {
        if let Some(message) = &self.config_error {
            warn!("Ignoring submit: services are not configured");
            return RunOutcome::ConfigurationError(message.clone());
        }
        if prompt.trim().is_empty() {
            debug!("Ignoring submit with blank prompt");
            return RunOutcome::Ignored;
        }

        self.run_id += 1;
        let run = self.run_id;
        info!("Starting generation run {}", run);

        self.error = None;
        self.storyboard.send_replace(None);
        self.render.clear();
        self.narration.stop();
        self.settings = settings;
        self.set_state(GenerationState::Running(Stage::Script));

        let script = acquire_script(&*self.script, prompt, &self.settings).await;
        let storyboard = match script {
            Ok(storyboard) => Arc::new(storyboard),
            Err(StoryboardError::NotConfigured(message)) => {
                return self.enter_configuration_error(message);
            }
            Err(err) => {
                error!("Run {} failed to acquire a script: {}", run, err);
                let message = match err {
                    StoryboardError::Generic(message) if !message.trim().is_empty() => message,
                    _ => strings::ERROR_SCRIPT.to_string(),
                };
                self.error = Some(message.clone());
                self.settle();
                return RunOutcome::CompletedWithError(message);
            }
        };

        self.storyboard.send_replace(Some(Arc::clone(&storyboard)));

        let images = Arc::clone(&self.images);
        let observer = RunObserver {
            state: &self.state,
            storyboard: &self.storyboard,
        };
        let (final_board, outcome) = run_image_pipeline(&*images, storyboard, &observer).await;
        info!(
            "Run {} processed {}/{} scenes",
            run,
            final_board.settled_count(),
            final_board.len()
        );

        match outcome {
            PipelineOutcome::NotConfigured(message) => self.enter_configuration_error(message),
            outcome => match outcome.error_message() {
                Some(message) => {
                    self.error = Some(message.clone());
                    self.settle();
                    RunOutcome::CompletedWithError(message)
                }
                None => {
                    self.settle();
                    RunOutcome::Completed
                }
            },
        }
    }

    /// Renders the current storyboard to video.
    ///
    /// Rejected with `Precondition` unless every scene has an image.
    pub async fn render_video(&mut self) -> Result<VideoArtifact> {
        if let Some(message) = &self.config_error {
            return Err(StoryboardError::NotConfigured(message.clone()));
        }
        let storyboard = self.storyboard().ok_or_else(|| {
            StoryboardError::Precondition(strings::ERROR_VIDEO.to_string())
        })?;
        ensure_renderable(&storyboard)?;

        self.error = None;
        self.set_state(GenerationState::Running(Stage::Video { percent: 0 }));

        let state = &self.state;
        let on_progress = |fraction: f32| {
            let percent = (fraction.clamp(0.0, 1.0) * 100.0).round() as u8;
            state.send_replace(GenerationState::Running(Stage::Video { percent }));
        };
        let result = self.render.render(&storyboard, &on_progress).await;

        if let Err(err) = &result {
            self.error = Some(match err {
                StoryboardError::Generic(message) => message.clone(),
                other => other.to_string(),
            });
        }
        self.settle();
        result
    }

    /// Toggles narration of a scene's text. Returns the scene now speaking.
    pub fn toggle_narration(&mut self, scene_id: usize) -> Result<Option<usize>> {
        if let Some(message) = &self.config_error {
            return Err(StoryboardError::NotConfigured(message.clone()));
        }
        let storyboard = self
            .storyboard()
            .ok_or_else(|| StoryboardError::Precondition("no storyboard to narrate".to_string()))?;
        let scene = storyboard.scene(scene_id).ok_or_else(|| {
            StoryboardError::Precondition(format!("scene {} does not exist", scene_id))
        })?;
        Ok(self
            .narration
            .toggle(scene_id, &scene.narrative_text, &self.settings))
    }

    /// Applies an event reported by the narration engine. Returns the message
    /// surfaced when the utterance failed.
    pub fn handle_narration_event(&mut self, event: NarrationEvent) -> Option<String> {
        let message = self.narration.handle_event(event)?;
        self.error = Some(message.clone());
        if !self.state().is_running() {
            self.settle();
        }
        Some(message)
    }

    /// Replaces the narration voice list; playback stops.
    pub fn set_voices(&mut self, voices: Vec<Voice>) {
        self.narration.set_voices(voices);
    }

    /// Stops narration on teardown.
    pub fn shutdown(&mut self) {
        self.narration.stop();
    }
}
