//! Script acquisition: one request that materializes the storyboard skeleton.

use crate::config::GenerationSettings;
use crate::error::{Result, StoryboardError};
use crate::scene::{ImageState, MusicTheme, Storyboard, StoryboardScene};
use crate::services::ScriptService;
use serde::Deserialize;
use tracing::{info, warn};

/// Requests a script and normalizes it: scenes are re-indexed in response
/// order and every image starts out pending.
pub async fn acquire_script(
    service: &dyn ScriptService,
    prompt: &str,
    settings: &GenerationSettings,
) -> Result<Storyboard> {
    let prompt = prompt.trim();
    if prompt.is_empty() {
        return Err(StoryboardError::Precondition(
            "prompt must not be empty".to_string(),
        ));
    }

    let expected = settings.scene_count.get();
    info!(
        "Acquiring script ({} scenes, language {})",
        expected, settings.language
    );
    let storyboard = service
        .acquire_script(prompt, settings.language, expected)
        .await?;
    normalize(storyboard, expected)
}

fn normalize(mut storyboard: Storyboard, expected: usize) -> Result<Storyboard> {
    if storyboard.scenes.len() < expected {
        return Err(StoryboardError::Generic(format!(
            "script contained {} scenes, expected {}",
            storyboard.scenes.len(),
            expected
        )));
    }
    if storyboard.scenes.len() > expected {
        warn!(
            "Script returned {} scenes, keeping the first {}",
            storyboard.scenes.len(),
            expected
        );
        storyboard.scenes.truncate(expected);
    }

    for (id, scene) in storyboard.scenes.iter_mut().enumerate() {
        scene.id = id;
        scene.image_state = ImageState::Pending;
    }

    info!(
        "Script \"{}\" ready with {} scenes (music: {})",
        storyboard.title,
        storyboard.scenes.len(),
        storyboard.music_theme
    );
    Ok(storyboard)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawScript {
    title: Option<String>,
    #[serde(default)]
    music_theme: Option<String>,
    scenes: Option<Vec<RawScene>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawScene {
    #[serde(default, alias = "sceneDescription")]
    description: String,
    #[serde(alias = "narratorScript")]
    narrative_text: String,
    image_prompt: String,
    #[serde(default, alias = "imageText")]
    overlay_text: String,
}

/// Parses the raw text a language model returned for a script request.
///
/// Markdown code fences are tolerated. Indices in the payload are ignored;
/// scenes take their position as id.
pub fn parse_script_payload(raw: &str) -> Result<Storyboard> {
    let json_text = raw
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    let parsed: RawScript = serde_json::from_str(json_text)
        .map_err(|e| StoryboardError::Generic(format!("Failed to parse script JSON: {}", e)))?;

    let title = parsed
        .title
        .ok_or_else(|| StoryboardError::generic("script response is missing `title`"))?;
    let scenes = parsed
        .scenes
        .ok_or_else(|| StoryboardError::generic("script response is missing `scenes`"))?;

    Ok(Storyboard {
        title,
        music_theme: parsed
            .music_theme
            .as_deref()
            .map(MusicTheme::parse_lenient)
            .unwrap_or_default(),
        scenes: scenes
            .into_iter()
            .enumerate()
            .map(|(id, scene)| StoryboardScene {
                id,
                description: scene.description,
                narrative_text: scene.narrative_text,
                image_prompt: scene.image_prompt,
                overlay_text: scene.overlay_text,
                image_state: ImageState::Pending,
            })
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Language, SceneCount};
    use crate::scene::ImageRef;
    use async_trait::async_trait;

    struct FixedScript(Storyboard);

    #[async_trait]
    impl ScriptService for FixedScript {
        async fn acquire_script(&self, _: &str, _: Language, _: usize) -> Result<Storyboard> {
            Ok(self.0.clone())
        }
    }

    fn raw_board(ids: &[usize]) -> Storyboard {
        Storyboard {
            title: "Robot".into(),
            music_theme: MusicTheme::Epic,
            scenes: ids
                .iter()
                .map(|&id| StoryboardScene {
                    id,
                    description: String::new(),
                    narrative_text: format!("scene {id}"),
                    image_prompt: format!("prompt {id}"),
                    overlay_text: String::new(),
                    image_state: ImageState::Ready(ImageRef("stale.png".into())),
                })
                .collect(),
        }
    }

    fn settings(count: u8) -> GenerationSettings {
        GenerationSettings {
            scene_count: SceneCount::new(count).unwrap(),
            ..GenerationSettings::default()
        }
    }

    #[tokio::test]
    async fn scenes_are_reindexed_and_pending() {
        for count in 2..=6u8 {
            let ids: Vec<usize> = (0..usize::from(count)).map(|i| 40 - i).collect();
            let service = FixedScript(raw_board(&ids));
            let board = acquire_script(&service, "a robot", &settings(count))
                .await
                .unwrap();
            assert_eq!(board.len(), usize::from(count));
            for (i, scene) in board.scenes.iter().enumerate() {
                assert_eq!(scene.id, i);
                assert_eq!(scene.image_state, ImageState::Pending);
            }
            // Response order is preserved.
            assert_eq!(board.scenes[0].narrative_text, "scene 40");
        }
    }

    #[tokio::test]
    async fn blank_prompt_is_rejected_before_calling_service() {
        let service = FixedScript(raw_board(&[0, 1]));
        let err = acquire_script(&service, "   ", &settings(2)).await.unwrap_err();
        assert!(matches!(err, StoryboardError::Precondition(_)));
    }

    #[tokio::test]
    async fn short_script_is_a_generic_failure() {
        let service = FixedScript(raw_board(&[0, 1]));
        let err = acquire_script(&service, "robot", &settings(4)).await.unwrap_err();
        assert!(matches!(err, StoryboardError::Generic(_)));
    }

    #[tokio::test]
    async fn long_script_is_truncated() {
        let service = FixedScript(raw_board(&[0, 1, 2, 3, 4]));
        let board = acquire_script(&service, "robot", &settings(3)).await.unwrap();
        assert_eq!(board.len(), 3);
    }

    #[test]
    fn parses_fenced_payload_with_wire_field_names() {
        let raw = r#"```json
{
  "title": "The Glowing Forest",
  "musicTheme": "mysterious",
  "scenes": [
    {"id": 7, "sceneDescription": "d0", "narratorScript": "n0", "imagePrompt": "p0", "imageText": "t0"},
    {"id": 3, "narrativeText": "n1", "imagePrompt": "p1"}
  ]
}
```"#;
        let board = parse_script_payload(raw).unwrap();
        assert_eq!(board.title, "The Glowing Forest");
        assert_eq!(board.music_theme, MusicTheme::Mysterious);
        assert_eq!(board.scenes[0].id, 0);
        assert_eq!(board.scenes[0].overlay_text, "t0");
        assert_eq!(board.scenes[1].id, 1);
        assert_eq!(board.scenes[1].overlay_text, "");
    }

    #[test]
    fn missing_fields_and_bad_json_are_generic() {
        let no_title = r#"{"scenes": []}"#;
        let no_scenes = r#"{"title": "x"}"#;
        for raw in [no_title, no_scenes, "not json at all"] {
            assert!(matches!(
                parse_script_payload(raw),
                Err(StoryboardError::Generic(_))
            ));
        }
    }

    #[test]
    fn unknown_music_theme_means_none() {
        let board = parse_script_payload(r#"{"title":"x","musicTheme":"polka","scenes":[]}"#).unwrap();
        assert_eq!(board.music_theme, MusicTheme::None);
    }
}
