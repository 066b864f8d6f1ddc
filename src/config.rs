//! Run settings and collaborator configuration.
//!
//! Settings are plain values captured when a run is submitted, so changing
//! them later never affects a run that is already in flight.

use crate::error::{Result, StoryboardError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

pub const DASHSCOPE_BASE_URL: &str = "https://dashscope.aliyuncs.com";
pub const API_KEY_ENV: &str = "DASHSCOPE_API_KEY";

/// Story language.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Bn,
}

impl Language {
    /// Short code used to match voice language tags.
    pub fn code(&self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Bn => "bn",
        }
    }

    /// Locale tag used for narration when no voice is selected.
    pub fn locale_tag(&self) -> &'static str {
        match self {
            Self::En => "en-US",
            Self::Bn => "bn-BD",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::En => "English",
            Self::Bn => "Bengali",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Number of scenes requested for a story, always within `MIN..=MAX`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct SceneCount(u8);

impl SceneCount {
    pub const MIN: u8 = 2;
    pub const MAX: u8 = 6;

    pub fn new(count: u8) -> Result<Self> {
        if (Self::MIN..=Self::MAX).contains(&count) {
            Ok(Self(count))
        } else {
            Err(StoryboardError::Precondition(format!(
                "scene count must be between {} and {}, got {}",
                Self::MIN,
                Self::MAX,
                count
            )))
        }
    }

    pub fn get(&self) -> usize {
        usize::from(self.0)
    }
}

impl Default for SceneCount {
    fn default() -> Self {
        Self(4)
    }
}

impl TryFrom<u8> for SceneCount {
    type Error = StoryboardError;

    fn try_from(value: u8) -> Result<Self> {
        Self::new(value)
    }
}

impl From<SceneCount> for u8 {
    fn from(value: SceneCount) -> Self {
        value.0
    }
}

/// User-facing settings captured at submit time.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    pub language: Language,
    pub scene_count: SceneCount,
    /// Narration voice chosen by the user, if any.
    pub voice_uri: Option<String>,
}

/// Connection settings for the DashScope services.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// `None` means the services are not configured; every call then fails
    /// with `NotConfigured`.
    pub api_key: Option<String>,
    pub base_url: String,
    pub text_model: String,
    pub image_model: String,
    pub tts_model: String,
    pub request_timeout: Duration,
    pub task_poll_interval: Duration,
    pub task_max_polls: u32,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DASHSCOPE_BASE_URL.to_string(),
            text_model: "qwen-plus".to_string(),
            image_model: "wanx-v1".to_string(),
            tts_model: "cosyvoice-v1".to_string(),
            request_timeout: Duration::from_secs(300),
            task_poll_interval: Duration::from_secs(5),
            // Five minutes at the default poll interval.
            task_max_polls: 60,
        }
    }
}

impl ServiceConfig {
    /// Builds the config from an explicit key, falling back to the environment.
    /// Blank keys count as missing.
    pub fn from_env(api_key: Option<String>) -> Self {
        let api_key = api_key
            .or_else(|| std::env::var(API_KEY_ENV).ok())
            .filter(|key| !key.trim().is_empty());
        Self {
            api_key,
            ..Self::default()
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

/// Where the renderer and narration engine put their files.
#[derive(Debug, Clone)]
pub struct RenderConfig {
    pub work_dir: PathBuf,
    /// Final video location.
    pub output: PathBuf,
    /// Directory holding `<theme>.mp3` background tracks.
    pub music_dir: Option<PathBuf>,
    pub scene_duration_secs: f64,
    pub frame_rate: u32,
    pub font_file: Option<String>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("./output"),
            output: PathBuf::from("output.mp4"),
            music_dir: None,
            scene_duration_secs: 4.0,
            frame_rate: 30,
            font_file: None,
        }
    }
}
