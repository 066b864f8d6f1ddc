use anyhow::{bail, Context};
use auto_storyboard::api::QwenClient;
use auto_storyboard::config::{GenerationSettings, Language, RenderConfig, SceneCount, ServiceConfig};
use auto_storyboard::narration::DashScopeNarrator;
use auto_storyboard::video::VideoGenerator;
use auto_storyboard::{Collaborators, Orchestrator, RunOutcome};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "auto-storyboard")]
#[command(about = "Turn a short prompt into an illustrated storyboard and video using AI", long_about = None)]
struct Args {
    /// Story prompt
    #[arg(short, long)]
    text: Option<String>,

    /// Read the story prompt from a file
    #[arg(short, long)]
    file: Option<String>,

    /// Story language
    #[arg(short, long, value_enum, default_value_t = Language::En)]
    language: Language,

    /// Number of scenes (2-6)
    #[arg(short, long, default_value_t = 4)]
    scenes: u8,

    /// Output video file path
    #[arg(short, long, default_value = "output.mp4")]
    output: String,

    /// Working directory for images, narration and the storyboard
    #[arg(short = 'w', long, default_value = "./output")]
    work_dir: String,

    /// DashScope API key
    #[arg(long)]
    api_key: Option<String>,

    /// Render a video once every scene has an image
    #[arg(long)]
    video: bool,

    /// Synthesize narration for every scene
    #[arg(long)]
    narrate: bool,

    /// Narration voice id
    #[arg(long)]
    voice: Option<String>,

    /// Directory with background music named after themes (epic.mp3, calm.mp3, ...)
    #[arg(long)]
    music_dir: Option<String>,

    /// Seconds each scene stays on screen
    #[arg(long, default_value_t = 4.0)]
    scene_duration: f64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(false)
        .with_level(true)
        .init();

    dotenvy::dotenv().ok();

    let args = Args::parse();

    let prompt = if let Some(text) = args.text.clone() {
        text
    } else if let Some(file_path) = &args.file {
        tokio::fs::read_to_string(file_path)
            .await
            .context(format!("Failed to read file: {}", file_path))?
    } else {
        eprintln!("Error: Either --text or --file must be provided");
        std::process::exit(1);
    };

    info!("Starting storyboard generation...");
    info!("Prompt length: {} characters", prompt.len());

    tokio::fs::create_dir_all(&args.work_dir)
        .await
        .context("Failed to create work directory")?;

    if let Err(e) = run(args, prompt).await {
        error!("Storyboard generation failed: {:#}", e);
        std::process::exit(1);
    }

    info!("Storyboard generation completed successfully!");
    Ok(())
}

async fn run(args: Args, prompt: String) -> anyhow::Result<()> {
    let work_dir = PathBuf::from(&args.work_dir);
    let settings = GenerationSettings {
        language: args.language,
        scene_count: SceneCount::new(args.scenes)?,
        voice_uri: args.voice.clone(),
    };

    let client = Arc::new(QwenClient::new(
        ServiceConfig::from_env(args.api_key.clone()),
        work_dir.join("images"),
    )?);
    let (narration_tx, mut narration_rx) = mpsc::unbounded_channel();
    let narrator = Arc::new(DashScopeNarrator::new(
        Arc::clone(&client),
        work_dir.join("narration"),
        narration_tx,
    ));
    let renderer = Arc::new(VideoGenerator::new(RenderConfig {
        work_dir: work_dir.clone(),
        output: PathBuf::from(&args.output),
        music_dir: args.music_dir.as_ref().map(PathBuf::from),
        scene_duration_secs: args.scene_duration,
        ..RenderConfig::default()
    }));

    let mut orchestrator = Orchestrator::new(Collaborators {
        script: client.clone(),
        images: client,
        render: renderer,
        narration: narrator,
    });

    let mut state_rx = orchestrator.subscribe_state();
    let progress = tokio::spawn(async move {
        while state_rx.changed().await.is_ok() {
            let label = state_rx.borrow_and_update().label();
            if let Some(label) = label {
                info!("{}", label);
            }
        }
    });

    match orchestrator.submit(&prompt, settings).await {
        RunOutcome::Ignored => bail!("The prompt is empty"),
        RunOutcome::ConfigurationError(message) => bail!("Configuration error: {}", message),
        RunOutcome::CompletedWithError(message) => warn!("{}", message),
        RunOutcome::Completed => info!("All scene images generated"),
    }

    let Some(storyboard) = orchestrator.storyboard() else {
        bail!("No storyboard was produced");
    };
    let storyboard_path = work_dir.join("storyboard.json");
    tokio::fs::write(&storyboard_path, serde_json::to_vec_pretty(&*storyboard)?)
        .await
        .context("Failed to write storyboard")?;
    info!(
        "Storyboard \"{}\" saved to {}",
        storyboard.title,
        storyboard_path.display()
    );

    if args.narrate {
        for scene in &storyboard.scenes {
            orchestrator.toggle_narration(scene.id)?;
            while orchestrator.narrating_scene() == Some(scene.id) {
                let Some(event) = narration_rx.recv().await else {
                    break;
                };
                if let Some(message) = orchestrator.handle_narration_event(event) {
                    warn!("Scene {}: {}", scene.id, message);
                }
            }
        }
    }

    if args.video {
        match orchestrator.render_video().await {
            Ok(video) => info!("Video written to {}", video.path.display()),
            Err(e) => {
                orchestrator.shutdown();
                progress.abort();
                bail!("{}", e);
            }
        }
    }

    orchestrator.shutdown();
    progress.abort();
    Ok(())
}
