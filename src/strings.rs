//! User-facing message catalogue.

pub const LOADER_SCRIPT: &str = "Generating story script & music theme...";
pub const LOADER_IMAGES: &str = "Generating storyboard images...";
pub const LOADER_VIDEO: &str = "Rendering video, this may take a moment...";

pub const ERROR_TTS: &str = "Text-to-speech failed.";
pub const ERROR_SCRIPT: &str = "Failed to generate story script. The prompt might be too complex or the AI service is busy. Please simplify your prompt or try again.";
pub const ERROR_IMAGE: &str = "An error occurred while generating an image for a scene.";
pub const ERROR_RATE_LIMIT: &str = "Image generation limit reached. The process has been stopped. Please wait a few moments before trying again.";
pub const ERROR_VIDEO: &str = "Video generation failed. Ensure all images were created successfully before trying again.";
pub const ERROR_AUDIO_DECODE: &str = "Video Generation Error: Could not decode background music. The audio file may be invalid.";

/// Narration failure text carrying the engine's reason code.
pub fn narration_failed(reason: &str) -> String {
    let reason = if reason.trim().is_empty() {
        "unknown issue"
    } else {
        reason
    };
    format!("{} (Reason: {})", ERROR_TTS, reason)
}
