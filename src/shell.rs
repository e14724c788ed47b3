use std::collections::HashMap;
use std::io::Write;
use std::path::Path;

use eyre::{Result, eyre};
use log::{debug, warn};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::task::{JoinError, JoinSet};

use ytstudy::controller::{ActionError, Controller, Role, TranscriptState, TranscriptTicket, ViewState};
use ytstudy::notes::{NoteAutosaver, NoteStore};
use ytstudy::output::{render_notes_export, render_timed};
use ytstudy::prompt::SUMMARY_QUESTION;
use ytstudy::storage::{CredentialKey, Storage};
use ytstudy::{Segment, Video, extract_video_id};

use crate::Services;

const HELP: &str = "\
Commands:
  keys <youtube-key> <gemini-key>   save API keys (setup screen)
  setup                             change API keys
  search <query>                    search videos (plain text also searches)
  play <n>                          open result n in the player
  chat <n>                          chat about result n
  open <url|id>                     switch the open player/chat to another video
  transcript                        fetch the transcript for the open video
  ask <question>                    ask about the open video (plain text also asks)
  summarize                         ask for a summary of the open video
  note <text>                       append a line to the open video's notes
  notes                             show the open video's notes
  export <file>                     write notes and transcript to a text file
  back                              return to the search results
  help | quit";

enum Flow {
    Continue,
    Quit,
}

type Acquired = (TranscriptTicket, Result<Vec<Segment>>);

struct Session<S: Storage> {
    controller: Controller<S>,
    services: Services,
    notes: NoteStore<S>,
    autosaver: NoteAutosaver,
    /// Latest notes per video in this session; the store may lag behind the autosaver
    drafts: HashMap<String, String>,
    inflight: JoinSet<Acquired>,
}

pub async fn run<S: Storage>(storage: S, services: Services, autosave: std::time::Duration) -> Result<()> {
    Session::new(storage, services, autosave)
        .drive(BufReader::new(tokio::io::stdin()))
        .await
}

/// Run `acquisition` on its own task so that a panic inside it still settles `ticket`
async fn settle<F>(ticket: TranscriptTicket, acquisition: F) -> Acquired
where
    F: Future<Output = Result<Vec<Segment>>> + Send + 'static,
{
    let result = match tokio::spawn(acquisition).await {
        Ok(result) => result,
        Err(e) => Err(eyre!("transcript task failed: {e}")),
    };
    (ticket, result)
}

impl<S: Storage> Session<S> {
    fn new(storage: S, services: Services, autosave: std::time::Duration) -> Self {
        let notes = NoteStore::new(storage.clone());
        Self {
            controller: Controller::new(storage),
            services,
            autosaver: NoteAutosaver::spawn(notes.clone(), autosave),
            notes,
            drafts: HashMap::new(),
            inflight: JoinSet::new(),
        }
    }

    /// Read commands from `input` until quit or end of input
    async fn drive<R: AsyncBufRead + Unpin>(mut self, input: R) -> Result<()> {
        let mut lines = input.lines();
        self.render();

        let mut outcome = Ok(());
        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let line = match line {
                        Ok(Some(line)) => line,
                        Ok(None) => break,
                        Err(e) => {
                            outcome = Err(e.into());
                            break;
                        }
                    };
                    match self.handle(line.trim()).await {
                        Ok(Flow::Quit) => break,
                        Ok(Flow::Continue) => {}
                        Err(e) => println!("error: {e:#}"),
                    }
                    self.render();
                }
                Some(joined) = self.inflight.join_next(), if !self.inflight.is_empty() => {
                    if self.on_transcript(joined) {
                        self.render();
                    }
                }
            }
        }

        // Pending note edits are flushed however the loop ended
        self.autosaver.close().await;
        outcome
    }

    async fn handle(&mut self, line: &str) -> Result<Flow> {
        if line.is_empty() {
            return Ok(Flow::Continue);
        }
        let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
        let rest = rest.trim();

        match command {
            "quit" | "exit" => return Ok(Flow::Quit),
            "help" => println!("{HELP}"),
            "keys" => {
                let mut parts = rest.split_whitespace();
                let youtube = parts.next().unwrap_or("");
                let gemini = parts.next().unwrap_or("");
                self.controller.submit_credentials(youtube, gemini)?;
                println!("API keys saved.");
            }
            "setup" => self.controller.open_setup(),
            "search" => self.search(rest).await?,
            "play" => {
                self.controller.play(parse_index(rest)?)?;
                self.load_draft();
            }
            "chat" => {
                let ticket = self.controller.open_chat(parse_index(rest)?)?;
                self.load_draft();
                self.spawn_acquisition(ticket);
            }
            "open" => self.open(rest).await?,
            "transcript" => {
                let ticket = self.controller.request_transcript()?;
                self.spawn_acquisition(ticket);
            }
            "ask" => self.ask(rest).await?,
            "summarize" => self.ask(SUMMARY_QUESTION).await?,
            "note" => self.append_note(rest)?,
            "notes" => println!("{}", self.current_notes()?.1),
            "export" => self.export(rest)?,
            "back" => self.controller.back()?,
            // Bare text is a query on the search screen and a question in the chat
            _ => match self.controller.state().name() {
                "search" => self.search(line).await?,
                "chat" => self.ask(line).await?,
                _ => println!("unknown command {command:?}; type `help`"),
            },
        }
        Ok(Flow::Continue)
    }

    async fn search(&mut self, query: &str) -> Result<()> {
        let query = self.controller.start_search(query)?;
        self.render();

        let outcome = match self.controller.credential(CredentialKey::YouTube) {
            Some(key) => self.services.search.search(&key, &query).await,
            None => Err(eyre!("no YouTube API key stored")),
        };

        match outcome {
            Ok(videos) => {
                if videos.is_empty() {
                    println!("No videos found for {query:?}.");
                }
                self.controller.finish_search(Some(videos));
                Ok(())
            }
            Err(e) => {
                self.controller.finish_search(None);
                Err(e.wrap_err("search failed"))
            }
        }
    }

    async fn open(&mut self, input: &str) -> Result<()> {
        let video_id = extract_video_id(input).ok_or_else(|| eyre!("not a YouTube URL or video id: {input:?}"))?;
        let key = self
            .controller
            .credential(CredentialKey::YouTube)
            .ok_or_else(|| eyre!("no YouTube API key stored"))?;
        if self.controller.state().video().is_none() {
            return Err(ActionError::WrongScreen(self.controller.state().name()).into());
        }

        let video = self.services.search.video(&key, &video_id).await?;
        if let Some(ticket) = self.controller.switch_video(video)? {
            self.spawn_acquisition(ticket);
        }
        self.load_draft();
        Ok(())
    }

    async fn ask(&mut self, question: &str) -> Result<()> {
        let turn = self.controller.ask(question)?;
        self.render();

        let key = self
            .controller
            .credential(CredentialKey::Gemini)
            .ok_or_else(|| eyre!("no Gemini API key stored"))?;
        let reply = self.services.chat.complete(&key, &turn.prompt).await?;
        if !self.controller.finish_ask(&turn, reply) {
            debug!("Dropped reply for {}: chat moved on", turn.ticket.video_id);
        }
        Ok(())
    }

    fn spawn_acquisition(&mut self, ticket: TranscriptTicket) {
        let pipeline = self.services.pipeline.clone();
        let key = self.controller.credential(CredentialKey::YouTube);
        let video_id = ticket.video_id.clone();
        self.inflight.spawn(settle(ticket, async move {
            pipeline.acquire_transcript(&video_id, key.as_deref()).await
        }));
    }

    /// Apply a finished acquisition; returns true if the screen changed
    fn on_transcript(&mut self, joined: std::result::Result<Acquired, JoinError>) -> bool {
        match joined {
            Ok((ticket, Ok(segments))) => {
                let empty = segments.is_empty();
                let applied = self.controller.apply_transcript(&ticket, segments);
                if applied && empty {
                    println!("No transcript is available for this video.");
                }
                applied
            }
            Ok((ticket, Err(e))) => {
                println!("error: transcript request failed: {e:#}");
                self.controller.apply_transcript(&ticket, Vec::new())
            }
            Err(e) => {
                warn!("Transcript task did not complete: {e}");
                false
            }
        }
    }

    fn load_draft(&mut self) {
        if let Some(video) = self.controller.state().video() {
            let notes = &self.notes;
            self.drafts
                .entry(video.id.clone())
                .or_insert_with(|| notes.load(&video.id));
        }
    }

    fn current_notes(&self) -> Result<(&Video, &str)> {
        let video = self
            .controller
            .state()
            .video()
            .ok_or_else(|| ActionError::WrongScreen(self.controller.state().name()))?;
        let notes = self.drafts.get(&video.id).map_or("", String::as_str);
        Ok((video, notes))
    }

    fn append_note(&mut self, text: &str) -> Result<()> {
        let (video, notes) = self.current_notes()?;
        let video_id = video.id.clone();
        let mut updated = notes.to_string();
        if !updated.is_empty() && !updated.ends_with('\n') {
            updated.push('\n');
        }
        updated.push_str(text);

        self.autosaver.edit(&video_id, &updated);
        self.drafts.insert(video_id, updated);
        Ok(())
    }

    fn export(&self, path: &str) -> Result<()> {
        if path.is_empty() {
            return Err(eyre!("usage: export <file>"));
        }
        let (video, notes) = self.current_notes()?;
        let segments = self.controller.state().transcript().map(TranscriptState::segments).unwrap_or_default();
        std::fs::write(Path::new(path), render_notes_export(video, notes, segments))?;
        println!("Exported notes to {path}");
        Ok(())
    }

    fn render(&self) {
        println!("\n{}", render_view(self.controller.state()));
        print!("{}> ", self.controller.state().name());
        let _ = std::io::stdout().flush();
    }
}

fn parse_index(input: &str) -> Result<usize> {
    let n: usize = input
        .trim()
        .parse()
        .map_err(|_| eyre!("expected a result number, got {input:?}"))?;
    if n == 0 {
        return Err(ActionError::NoSuchVideo(0).into());
    }
    Ok(n - 1)
}

fn transcript_summary(transcript: &TranscriptState) -> String {
    match transcript {
        TranscriptState::NotRequested => "Transcript: not fetched (type `transcript`)".to_string(),
        TranscriptState::Loading => "Transcript: loading...".to_string(),
        TranscriptState::Loaded(segments) if segments.is_empty() => "Transcript: unavailable".to_string(),
        TranscriptState::Loaded(segments) => format!("Transcript: {} segments", segments.len()),
    }
}

fn render_view(state: &ViewState) -> String {
    match state {
        ViewState::Setup => "== Setup ==\nEnter your API keys: keys <youtube-key> <gemini-key>".to_string(),
        ViewState::Search { videos, is_loading } => {
            let mut out = String::from("== Search ==");
            if *is_loading {
                out.push_str("\nSearching...");
            } else if videos.is_empty() {
                out.push_str("\nType a query to search videos.");
            }
            for (i, video) in videos.iter().enumerate() {
                out.push_str(&format!("\n{:>2}. {} [{}]", i + 1, video.title, video.id));
            }
            out
        }
        ViewState::Player { video, transcript } => {
            let mut out = format!(
                "== Player ==\n{}\nhttps://www.youtube.com/watch?v={}\n{}",
                video.title,
                video.id,
                transcript_summary(transcript)
            );
            if !transcript.segments().is_empty() {
                out.push('\n');
                out.push_str(&render_timed(transcript.segments()));
            }
            out
        }
        ViewState::Chat {
            video,
            transcript,
            messages,
        } => {
            let mut out = format!("== Chat: {} ==\n{}", video.title, transcript_summary(transcript));
            for message in messages {
                let who = match message.role {
                    Role::User => "you",
                    Role::Assistant => "assistant",
                };
                out.push_str(&format!("\n{who}: {}", message.text));
            }
            out
        }
    }
}
