use serde::{Deserialize, Serialize};
use std::fmt;

/// Background music mood chosen by the script service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MusicTheme {
    Epic,
    Calm,
    Mysterious,
    Upbeat,
    #[default]
    None,
}

impl MusicTheme {
    /// Lenient parse used for service replies; anything unknown means no music.
    pub fn parse_lenient(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "epic" => Self::Epic,
            "calm" => Self::Calm,
            "mysterious" => Self::Mysterious,
            "upbeat" => Self::Upbeat,
            _ => Self::None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Epic => "epic",
            Self::Calm => "calm",
            Self::Mysterious => "mysterious",
            Self::Upbeat => "upbeat",
            Self::None => "none",
        }
    }
}

impl fmt::Display for MusicTheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque reference to a synthesized image (local path or URL).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageRef(pub String);

impl ImageRef {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Image lifecycle of one scene.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "status", content = "image", rename_all = "lowercase")]
pub enum ImageState {
    #[default]
    Pending,
    Ready(ImageRef),
    Failed,
}

impl ImageState {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    pub fn image(&self) -> Option<&ImageRef> {
        match self {
            Self::Ready(image) => Some(image),
            _ => None,
        }
    }
}

/// One panel of the storyboard. `id` is its position and never changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryboardScene {
    pub id: usize,
    /// Free-form scene description returned alongside the script.
    #[serde(default)]
    pub description: String,
    pub narrative_text: String,
    pub image_prompt: String,
    pub overlay_text: String,
    #[serde(default)]
    pub image_state: ImageState,
}

/// A generated story. Scene count is fixed once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Storyboard {
    pub title: String,
    pub music_theme: MusicTheme,
    pub scenes: Vec<StoryboardScene>,
}

impl Storyboard {
    pub fn scene(&self, id: usize) -> Option<&StoryboardScene> {
        self.scenes.get(id)
    }

    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }

    /// True when every scene has an image. An empty storyboard is never complete.
    pub fn all_images_ready(&self) -> bool {
        !self.scenes.is_empty() && self.scenes.iter().all(|s| s.image_state.is_ready())
    }

    /// Number of scenes whose outcome (ready or failed) has been recorded.
    pub fn settled_count(&self) -> usize {
        self.scenes
            .iter()
            .filter(|s| !s.image_state.is_pending())
            .count()
    }

    /// Returns a new snapshot with one scene's image state replaced.
    ///
    /// Out-of-range ids leave the snapshot unchanged.
    pub fn with_image_state(&self, id: usize, state: ImageState) -> Self {
        let mut next = self.clone();
        if let Some(scene) = next.scenes.get_mut(id) {
            scene.image_state = state;
        }
        next
    }
}
