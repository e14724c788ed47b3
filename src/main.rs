use std::path::PathBuf;
use std::time::Duration;

use eyre::{Result, bail, eyre};
use log::{debug, info};

mod cli;
mod shell;

use cli::{Cli, Command, OutputFormat};
use ytstudy::chat::ChatClient;
use ytstudy::config::Config;
use ytstudy::controller::{Controller, ViewState};
use ytstudy::notes::NoteStore;
use ytstudy::prompt::{build_context, build_prompt};
use ytstudy::search::SearchClient;
use ytstudy::storage::{CredentialKey, FileStorage, credential};
use ytstudy::youtube::TranscriptPipeline;
use ytstudy::{Video, extract_video_id};

/// Remote clients shared by the one-shot commands and the shell
pub struct Services {
    pub pipeline: TranscriptPipeline,
    pub search: SearchClient,
    pub chat: ChatClient,
}

impl Services {
    fn new(config: &Config) -> Self {
        let client = reqwest::Client::new();
        Self {
            pipeline: TranscriptPipeline::new(client.clone(), &config.endpoints, config.caption_lang()),
            search: SearchClient::new(client.clone(), &config.endpoints, config.max_results()),
            chat: ChatClient::new(client, &config.endpoints, config.chat_model()),
        }
    }
}

fn setup_logging() -> Result<()> {
    let log_dir = log_dir();
    std::fs::create_dir_all(&log_dir)?;
    let log_file = log_dir.join("ytstudy.log");

    let target = Box::new(std::fs::OpenOptions::new().create(true).append(true).open(&log_file)?);

    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized: {}", log_file.display());
    Ok(())
}

fn log_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ytstudy")
        .join("logs")
}

fn build_after_help(config: &Config) -> String {
    format!(
        "\nFILES:\n  config   {}\n  storage  {}\n  logs     {}",
        ytstudy::config::config_path().display(),
        config.storage_path().display(),
        log_dir().join("ytstudy.log").display()
    )
}

fn require_key(storage: &FileStorage, key: CredentialKey) -> Result<String> {
    credential(storage, key).ok_or_else(|| eyre!("no {key:?} API key stored\n\nRun: ytstudy setup --youtube-key <KEY> --gemini-key <KEY>"))
}

fn parse_video_id(input: &str) -> Result<String> {
    extract_video_id(input).ok_or_else(|| {
        eyre!("could not extract video ID from: {input}\n\nSupported formats:\n  https://www.youtube.com/watch?v=ID\n  https://youtu.be/ID\n  https://www.youtube.com/embed/ID\n  https://www.youtube.com/shorts/ID\n  <11-character video ID>")
    })
}

/// Metadata for a video, falling back to a bare id when the lookup is not possible
async fn describe_video(services: &Services, storage: &FileStorage, video_id: &str) -> Video {
    let bare = Video {
        id: video_id.to_string(),
        title: video_id.to_string(),
        description: String::new(),
        thumbnail_url: String::new(),
    };
    let Some(key) = credential(storage, CredentialKey::YouTube) else {
        return bare;
    };
    match services.search.video(&key, video_id).await {
        Ok(video) => video,
        Err(e) => {
            debug!("Video lookup failed for {video_id}: {e:#}");
            bare
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging()?;

    // Load config file (non-fatal if missing/invalid)
    let config = Config::load().unwrap_or_default();

    let cmd = <Cli as clap::CommandFactory>::command().after_help(build_after_help(&config));
    let matches = cmd.get_matches();
    let cli = <Cli as clap::FromArgMatches>::from_arg_matches(&matches)?;

    let storage = FileStorage::open(config.storage_path())?;
    let services = Services::new(&config);

    if cli.verbose {
        eprintln!("Storage: {}", storage.path().display());
    }

    match cli.command.unwrap_or(Command::Shell) {
        Command::Setup {
            youtube_key,
            gemini_key,
        } => {
            let mut controller = Controller::new(storage.clone());
            if !matches!(controller.state(), ViewState::Setup) {
                controller.open_setup();
            }
            controller.submit_credentials(&youtube_key, &gemini_key)?;
            println!("API keys saved to {}", storage.path().display());
        }

        Command::Search { query } => {
            let key = require_key(&storage, CredentialKey::YouTube)?;
            let query = query.join(" ");
            let videos = services.search.search(&key, &query).await?;
            if videos.is_empty() {
                println!("No videos found for {query:?}.");
            }
            for (i, video) in videos.iter().enumerate() {
                println!("{:>2}. {} [{}]", i + 1, video.title, video.id);
                if cli.verbose && !video.thumbnail_url.is_empty() {
                    eprintln!("    {}", video.thumbnail_url);
                }
            }
        }

        Command::Transcript { url, format, output } => {
            let video_id = parse_video_id(&url)?;
            let key = credential(&storage, CredentialKey::YouTube);
            let segments = services.pipeline.acquire_transcript(&video_id, key.as_deref()).await?;

            if cli.verbose {
                eprintln!("Video: {video_id}\nSegments: {}", segments.len());
            }
            if segments.is_empty() {
                eprintln!("No transcript is available for {video_id}.");
                return Ok(());
            }

            let rendered = match format {
                OutputFormat::Text => ytstudy::output::render_text(&segments),
                OutputFormat::Timed => ytstudy::output::render_timed(&segments),
                OutputFormat::Json => ytstudy::output::render_json(&video_id, &segments)?,
                OutputFormat::Srt => ytstudy::output::render_srt(&segments),
            };

            if let Some(ref path) = output {
                std::fs::write(path, &rendered)?;
                if cli.verbose {
                    eprintln!("Output written to: {}", path.display());
                }
            } else {
                println!("{rendered}");
            }
        }

        Command::Ask { url, question } => {
            let gemini = require_key(&storage, CredentialKey::Gemini)?;
            let video_id = parse_video_id(&url)?;
            let question = question.join(" ");
            if question.trim().is_empty() {
                bail!("enter a question");
            }

            let video = describe_video(&services, &storage, &video_id).await;
            let youtube = credential(&storage, CredentialKey::YouTube);
            let segments = services.pipeline.acquire_transcript(&video_id, youtube.as_deref()).await?;
            if cli.verbose {
                eprintln!("Video: {} ({})\nSegments: {}", video.title, video.id, segments.len());
            }

            let prompt = build_prompt(&build_context(&video, &segments), &question);
            println!("{}", services.chat.complete(&gemini, &prompt).await?);
        }

        Command::Summarize { url } => {
            let gemini = require_key(&storage, CredentialKey::Gemini)?;
            let video_id = parse_video_id(&url)?;
            let video = describe_video(&services, &storage, &video_id).await;
            let youtube = credential(&storage, CredentialKey::YouTube);
            let segments = services.pipeline.acquire_transcript(&video_id, youtube.as_deref()).await?;
            if segments.is_empty() {
                eprintln!("No transcript is available; summarizing from title and description only.");
            }

            let summary = services.chat.summarize(&gemini, &build_context(&video, &segments)).await?;
            println!("--- Summary ---\n{summary}");
        }

        Command::Notes { url, add, export } => {
            let video_id = parse_video_id(&url)?;
            let notes = NoteStore::new(storage.clone());
            let mut current = notes.load(&video_id);

            if let Some(line) = add {
                if !current.is_empty() && !current.ends_with('\n') {
                    current.push('\n');
                }
                current.push_str(&line);
                notes.save(&video_id, &current)?;
            }

            if let Some(path) = export {
                let video = describe_video(&services, &storage, &video_id).await;
                let youtube = credential(&storage, CredentialKey::YouTube);
                let segments = services.pipeline.acquire_transcript(&video_id, youtube.as_deref()).await?;
                std::fs::write(&path, ytstudy::output::render_notes_export(&video, &current, &segments))?;
                println!("Exported notes to {}", path.display());
            } else {
                println!("{current}");
            }
        }

        Command::Shell => {
            shell::run(storage, services, Duration::from_millis(config.autosave_ms())).await?;
        }
    }

    Ok(())
}
