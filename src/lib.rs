//! Prompt-to-storyboard generation.
//!
//! A run turns a short prompt into a titled storyboard: a script from a
//! language model, then one illustration per scene, published scene by scene.
//! Finished storyboards can be narrated scene by scene and rendered to video.

pub mod api;
pub mod config;
pub mod error;
pub mod narration;
pub mod orchestrator;
pub mod pipeline;
pub mod scene;
pub mod services;
pub mod strings;
pub mod video;

pub use config::{GenerationSettings, Language, SceneCount};
pub use error::{Result, StoryboardError};
pub use orchestrator::{Collaborators, GenerationState, Orchestrator, RunOutcome, Stage};
pub use scene::{ImageRef, ImageState, MusicTheme, Storyboard, StoryboardScene};
