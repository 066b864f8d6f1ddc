use crate::config::RenderConfig;
use crate::error::{Result, StoryboardError};
use crate::scene::{MusicTheme, Storyboard};
use crate::services::{ProgressFn, RenderService, VideoArtifact};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{info, warn};

/// Renders storyboards with the `ffmpeg` binary.
///
/// One segment per scene (image plus caption), concatenated, then mixed with
/// the music track for the storyboard's theme when one is available.
pub struct VideoGenerator {
    config: RenderConfig,
}

/// Escapes text for an ffmpeg `drawtext` filter argument.
fn escape_drawtext(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('\'', "'\\''")
        .replace(':', "\\:")
        .replace(',', "\\,")
}

async fn run_ffmpeg(args: &[String], what: &str) -> Result<()> {
    let output = Command::new("ffmpeg")
        .args(args)
        .output()
        .await
        .map_err(|e| StoryboardError::Generic(format!("Failed to run FFmpeg: {}", e)))?;

    if !output.status.success() {
        let error = String::from_utf8_lossy(&output.stderr);
        return Err(StoryboardError::Generic(format!(
            "FFmpeg {} failed: {}",
            what, error
        )));
    }
    Ok(())
}

/// Whether ffmpeg's output blames the music input (input #1) rather than the
/// video side or the output file.
fn audio_decode_failed(stderr: &str, audio_path: &Path) -> bool {
    let lower = stderr.to_lowercase();
    if lower.contains("error while decoding stream #1:")
        || lower.contains("could not find codec parameters for stream 1")
    {
        return true;
    }
    let track = audio_path.to_string_lossy().to_lowercase();
    lower.lines().any(|line| {
        line.contains(track.as_str())
            && (line.contains("invalid data found when processing input")
                || line.contains("end of file")
                || line.contains("no such file or directory"))
    })
}

impl VideoGenerator {
    pub fn new(config: RenderConfig) -> Self {
        Self { config }
    }

    /// Background track for `theme`, if a music directory is configured and
    /// holds a file for it.
    pub fn music_track(&self, theme: MusicTheme) -> Option<PathBuf> {
        if theme == MusicTheme::None {
            return None;
        }
        let dir = self.config.music_dir.as_ref()?;
        let track = dir.join(format!("{}.mp3", theme.as_str()));
        if track.is_file() {
            Some(track)
        } else {
            warn!("No music track for theme {} at {}", theme, track.display());
            None
        }
    }

    fn segment_args(&self, image_path: &str, caption: &str, output_path: &Path) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "-y".into(),
            "-loop".into(),
            "1".into(),
            "-i".into(),
            image_path.into(),
        ];

        if !caption.trim().is_empty() {
            let font = self
                .config
                .font_file
                .as_ref()
                .map(|f| format!("fontfile={}:", f))
                .unwrap_or_default();
            args.push("-vf".into());
            args.push(format!(
                "drawtext=text='{}':{}fontsize=48:fontcolor=white:x=(w-text_w)/2:y=h-100:box=1:boxcolor=black@0.5:boxborderw=10",
                escape_drawtext(caption),
                font
            ));
        }

        args.extend([
            "-t".into(),
            self.config.scene_duration_secs.to_string(),
            "-pix_fmt".into(),
            "yuv420p".into(),
            "-r".into(),
            self.config.frame_rate.to_string(),
            output_path.to_string_lossy().into_owned(),
        ]);
        args
    }

    async fn create_video_segment(
        &self,
        image_path: &str,
        caption: &str,
        output_path: &Path,
    ) -> Result<()> {
        info!("Creating video segment for: {}", image_path);
        let args = self.segment_args(image_path, caption, output_path);
        run_ffmpeg(&args, "segment creation").await?;
        info!("Created segment: {}", output_path.display());
        Ok(())
    }

    async fn concat_videos(&self, concat_file: &Path, output_path: &Path) -> Result<()> {
        info!("Concatenating video segments...");
        let args: Vec<String> = vec![
            "-y".into(),
            "-f".into(),
            "concat".into(),
            "-safe".into(),
            "0".into(),
            "-i".into(),
            concat_file.to_string_lossy().into_owned(),
            "-c".into(),
            "copy".into(),
            output_path.to_string_lossy().into_owned(),
        ];
        run_ffmpeg(&args, "concat").await?;
        info!("Concatenated video: {}", output_path.display());
        Ok(())
    }

    async fn add_audio(&self, video_path: &Path, audio_path: &Path, output_path: &Path) -> Result<()> {
        info!("Adding background music {}...", audio_path.display());
        let args: Vec<String> = vec![
            "-y".into(),
            "-i".into(),
            video_path.to_string_lossy().into_owned(),
            "-stream_loop".into(),
            "-1".into(),
            "-i".into(),
            audio_path.to_string_lossy().into_owned(),
            "-c:v".into(),
            "copy".into(),
            "-c:a".into(),
            "aac".into(),
            "-map".into(),
            "0:v:0".into(),
            "-map".into(),
            "1:a:0".into(),
            "-shortest".into(),
            output_path.to_string_lossy().into_owned(),
        ];
        run_ffmpeg(&args, "audio merge").await.map_err(|e| {
            if audio_decode_failed(&e.to_string(), audio_path) {
                StoryboardError::Generic(format!(
                    "failed to decode audio track {}: {}",
                    audio_path.display(),
                    e
                ))
            } else {
                e
            }
        })?;
        info!("Added audio to video: {}", output_path.display());
        Ok(())
    }

    /// Renders every scene and reports progress after each finished step.
    pub async fn generate_video(
        &self,
        storyboard: &Storyboard,
        on_progress: ProgressFn<'_>,
    ) -> Result<VideoArtifact> {
        info!("Starting video generation for \"{}\"...", storyboard.title);
        let work_dir = &self.config.work_dir;
        tokio::fs::create_dir_all(work_dir).await?;

        let music = self.music_track(storyboard.music_theme);
        // Segments, concat, and the optional music pass.
        let total_steps = storyboard.len() + 1 + usize::from(music.is_some());
        let mut done = 0usize;
        let report = |done: usize| on_progress(done as f32 / total_steps as f32);

        let mut concat_content = String::new();
        let mut segment_paths = Vec::new();

        for scene in &storyboard.scenes {
            let image = scene.image_state.image().ok_or_else(|| {
                StoryboardError::Precondition(format!("scene {} has no image", scene.id))
            })?;
            let segment_path = work_dir.join(format!("segment_{}.mp4", scene.id));
            self.create_video_segment(image.as_str(), &scene.overlay_text, &segment_path)
                .await?;

            let abs_segment_path = segment_path.canonicalize().map_err(|e| {
                StoryboardError::Generic(format!("Failed to get absolute path: {}", e))
            })?;
            concat_content.push_str(&format!("file '{}'\n", abs_segment_path.display()));
            segment_paths.push(segment_path);

            done += 1;
            report(done);
        }

        let concat_file = work_dir.join("concat.txt");
        tokio::fs::write(&concat_file, concat_content).await?;

        let output = self.config.output.clone();
        let merged_video = work_dir.join("merged.mp4");
        let concat_target = if music.is_some() {
            &merged_video
        } else {
            &output
        };
        self.concat_videos(&concat_file, concat_target).await?;
        done += 1;
        report(done);

        if let Some(track) = &music {
            self.add_audio(&merged_video, track, &output).await?;
            done += 1;
            report(done);
        }

        info!("Video generation completed: {}", output.display());

        tokio::fs::remove_file(&concat_file).await.ok();
        tokio::fs::remove_file(&merged_video).await.ok();
        for segment in segment_paths {
            tokio::fs::remove_file(&segment).await.ok();
        }

        Ok(VideoArtifact { path: output })
    }
}

#[async_trait]
impl RenderService for VideoGenerator {
    async fn render_video(
        &self,
        storyboard: &Storyboard,
        on_progress: ProgressFn<'_>,
    ) -> Result<VideoArtifact> {
        self.generate_video(storyboard, on_progress).await
    }
}
