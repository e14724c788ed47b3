//! Screen state and the transitions between screens.
//!
//! The controller never performs I/O other than writing credentials. Work that has to
//! hit the network is handed back to the caller as a ticket; the caller runs it and
//! reports the outcome, which is applied only if the ticket still matches the current
//! selection.

use log::{debug, info};
use thiserror::Error;

use crate::prompt::{build_context, build_prompt};
use crate::storage::{CredentialKey, Storage, StorageError, credential};
use crate::{Segment, Video};

#[derive(Debug, Error)]
pub enum ActionError {
    #[error("both a YouTube API key and a Gemini API key are required")]
    MissingCredentials,

    #[error("enter a search query")]
    EmptyQuery,

    #[error("enter a question")]
    EmptyQuestion,

    #[error("there is no video {0} in the results")]
    NoSuchVideo(usize),

    #[error("not available on the {0} screen")]
    WrongScreen(&'static str),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Transcript held for the selected video
#[derive(Debug, Clone, PartialEq, Default)]
pub enum TranscriptState {
    #[default]
    NotRequested,
    Loading,
    /// Acquisition finished; an empty list means no transcript exists
    Loaded(Vec<Segment>),
}

impl TranscriptState {
    pub fn segments(&self) -> &[Segment] {
        match self {
            TranscriptState::Loaded(segments) => segments,
            _ => &[],
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, TranscriptState::Loading)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub text: String,
}

impl ChatMessage {
    fn assistant(text: String) -> Self {
        Self {
            role: Role::Assistant,
            text,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ViewState {
    Setup,
    Search {
        videos: Vec<Video>,
        is_loading: bool,
    },
    Player {
        video: Video,
        transcript: TranscriptState,
    },
    Chat {
        video: Video,
        transcript: TranscriptState,
        messages: Vec<ChatMessage>,
    },
}

impl ViewState {
    pub fn name(&self) -> &'static str {
        match self {
            ViewState::Setup => "setup",
            ViewState::Search { .. } => "search",
            ViewState::Player { .. } => "player",
            ViewState::Chat { .. } => "chat",
        }
    }

    pub fn video(&self) -> Option<&Video> {
        match self {
            ViewState::Player { video, .. } | ViewState::Chat { video, .. } => Some(video),
            _ => None,
        }
    }

    pub fn transcript(&self) -> Option<&TranscriptState> {
        match self {
            ViewState::Player { transcript, .. } | ViewState::Chat { transcript, .. } => Some(transcript),
            _ => None,
        }
    }
}

/// Identifies the selection an async result was requested for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptTicket {
    pub video_id: String,
    selection: u64,
}

/// A question that has been recorded and is waiting for the model's reply
#[derive(Debug, Clone)]
pub struct ChatTurn {
    pub ticket: TranscriptTicket,
    pub prompt: String,
}

pub struct Controller<S> {
    storage: S,
    state: ViewState,
    /// Search results kept while a video is open, restored on `back`
    results: Vec<Video>,
    /// Bumped whenever the selected video changes
    selection: u64,
}

impl<S: Storage> Controller<S> {
    pub fn new(storage: S) -> Self {
        let has_keys = credential(&storage, CredentialKey::YouTube).is_some()
            && credential(&storage, CredentialKey::Gemini).is_some();
        let state = if has_keys {
            ViewState::Search {
                videos: Vec::new(),
                is_loading: false,
            }
        } else {
            ViewState::Setup
        };
        debug!("Controller starting on {} screen", state.name());
        Self {
            storage,
            state,
            results: Vec::new(),
            selection: 0,
        }
    }

    pub fn state(&self) -> &ViewState {
        &self.state
    }

    pub fn credential(&self, key: CredentialKey) -> Option<String> {
        credential(&self.storage, key)
    }

    /// Validate and persist both API keys, then move to search
    pub fn submit_credentials(&mut self, youtube: &str, gemini: &str) -> Result<(), ActionError> {
        if !matches!(self.state, ViewState::Setup) {
            return Err(ActionError::WrongScreen(self.state.name()));
        }
        let (youtube, gemini) = (youtube.trim(), gemini.trim());
        if youtube.is_empty() || gemini.is_empty() {
            return Err(ActionError::MissingCredentials);
        }

        self.storage.set(CredentialKey::YouTube.storage_key(), youtube)?;
        self.storage.set(CredentialKey::Gemini.storage_key(), gemini)?;
        info!("Credentials saved");

        self.state = ViewState::Search {
            videos: std::mem::take(&mut self.results),
            is_loading: false,
        };
        Ok(())
    }

    /// Return to the setup screen to replace the stored keys
    pub fn open_setup(&mut self) {
        self.stash_results();
        self.selection += 1;
        self.state = ViewState::Setup;
    }

    /// Mark a search as running and return the trimmed query to send
    pub fn start_search(&mut self, query: &str) -> Result<String, ActionError> {
        let screen = self.state.name();
        let ViewState::Search { is_loading, .. } = &mut self.state else {
            return Err(ActionError::WrongScreen(screen));
        };
        let query = query.trim();
        if query.is_empty() {
            return Err(ActionError::EmptyQuery);
        }
        *is_loading = true;
        Ok(query.to_string())
    }

    /// Record a finished search. `None` means the search failed and the old list stays.
    pub fn finish_search(&mut self, outcome: Option<Vec<Video>>) {
        if let ViewState::Search { videos, is_loading } = &mut self.state {
            *is_loading = false;
            if let Some(found) = outcome {
                info!("Search finished with {} videos", found.len());
                *videos = found;
            }
        }
    }

    /// Open the player for a search result. The transcript is fetched only on request.
    pub fn play(&mut self, index: usize) -> Result<(), ActionError> {
        let video = self.pick(index)?;
        self.stash_results();
        self.selection += 1;
        info!("Playing {}", video.id);
        self.state = ViewState::Player {
            video,
            transcript: TranscriptState::NotRequested,
        };
        Ok(())
    }

    /// Open the chat for a search result and hand back the transcript request to run
    pub fn open_chat(&mut self, index: usize) -> Result<TranscriptTicket, ActionError> {
        let video = self.pick(index)?;
        self.stash_results();
        Ok(self.enter_chat(video))
    }

    /// Replace the selected video while staying on the player or chat screen.
    ///
    /// The old transcript is dropped before this returns. On the chat screen the new
    /// transcript request is returned.
    pub fn switch_video(&mut self, video: Video) -> Result<Option<TranscriptTicket>, ActionError> {
        match self.state {
            ViewState::Player { .. } => {
                self.selection += 1;
                self.state = ViewState::Player {
                    video,
                    transcript: TranscriptState::NotRequested,
                };
                Ok(None)
            }
            ViewState::Chat { .. } => Ok(Some(self.enter_chat(video))),
            _ => Err(ActionError::WrongScreen(self.state.name())),
        }
    }

    /// Start (or restart) transcript acquisition for the open video
    pub fn request_transcript(&mut self) -> Result<TranscriptTicket, ActionError> {
        let screen = self.state.name();
        let ticket = self.ticket().ok_or(ActionError::WrongScreen(screen))?;
        if let ViewState::Player { transcript, .. } | ViewState::Chat { transcript, .. } = &mut self.state {
            *transcript = TranscriptState::Loading;
        }
        Ok(ticket)
    }

    /// Store an acquired transcript. Returns false if the selection has moved on.
    pub fn apply_transcript(&mut self, ticket: &TranscriptTicket, segments: Vec<Segment>) -> bool {
        if !self.is_current(ticket) {
            debug!("Dropping stale transcript for {}", ticket.video_id);
            return false;
        }
        match &mut self.state {
            ViewState::Player { transcript, .. } => {
                *transcript = TranscriptState::Loaded(segments);
            }
            ViewState::Chat {
                video,
                transcript,
                messages,
            } => {
                let intro = intro_message(video, Some(segments.as_slice()));
                *transcript = TranscriptState::Loaded(segments);
                match messages.first_mut() {
                    Some(first) if first.role == Role::Assistant => first.text = intro,
                    _ => messages.insert(0, ChatMessage::assistant(intro)),
                }
            }
            _ => return false,
        }
        true
    }

    /// Record a question and build the prompt for it
    pub fn ask(&mut self, question: &str) -> Result<ChatTurn, ActionError> {
        let screen = self.state.name();
        let ticket = self.ticket();
        let ViewState::Chat {
            video,
            transcript,
            messages,
        } = &mut self.state
        else {
            return Err(ActionError::WrongScreen(screen));
        };
        let question = question.trim();
        if question.is_empty() {
            return Err(ActionError::EmptyQuestion);
        }

        messages.push(ChatMessage {
            role: Role::User,
            text: question.to_string(),
        });
        let context = build_context(video, transcript.segments());
        let ticket = ticket.ok_or(ActionError::WrongScreen(screen))?;
        Ok(ChatTurn {
            ticket,
            prompt: build_prompt(&context, question),
        })
    }

    /// Append the model's reply. Returns false if the chat is no longer open on that video.
    pub fn finish_ask(&mut self, turn: &ChatTurn, reply: String) -> bool {
        if !self.is_current(&turn.ticket) {
            return false;
        }
        match &mut self.state {
            ViewState::Chat { messages, .. } => {
                messages.push(ChatMessage::assistant(reply));
                true
            }
            _ => false,
        }
    }

    /// Leave the player or chat and return to the search results
    pub fn back(&mut self) -> Result<(), ActionError> {
        if !matches!(self.state, ViewState::Player { .. } | ViewState::Chat { .. }) {
            return Err(ActionError::WrongScreen(self.state.name()));
        }
        self.selection += 1;
        self.state = ViewState::Search {
            videos: std::mem::take(&mut self.results),
            is_loading: false,
        };
        Ok(())
    }

    fn enter_chat(&mut self, video: Video) -> TranscriptTicket {
        self.selection += 1;
        info!("Opening chat for {}", video.id);
        let messages = vec![ChatMessage::assistant(intro_message(&video, None))];
        let ticket = TranscriptTicket {
            video_id: video.id.clone(),
            selection: self.selection,
        };
        self.state = ViewState::Chat {
            video,
            transcript: TranscriptState::Loading,
            messages,
        };
        ticket
    }

    fn pick(&self, index: usize) -> Result<Video, ActionError> {
        match &self.state {
            ViewState::Search { videos, .. } => videos.get(index).cloned().ok_or(ActionError::NoSuchVideo(index + 1)),
            other => Err(ActionError::WrongScreen(other.name())),
        }
    }

    fn stash_results(&mut self) {
        if let ViewState::Search { videos, .. } = &mut self.state {
            self.results = std::mem::take(videos);
        }
    }

    fn ticket(&self) -> Option<TranscriptTicket> {
        self.state.video().map(|video| TranscriptTicket {
            video_id: video.id.clone(),
            selection: self.selection,
        })
    }

    fn is_current(&self, ticket: &TranscriptTicket) -> bool {
        ticket.selection == self.selection && self.state.video().is_some_and(|v| v.id == ticket.video_id)
    }
}

fn intro_message(video: &Video, segments: Option<&[Segment]>) -> String {
    match segments {
        None => format!("Fetching the transcript for \"{}\"...", video.title),
        Some([]) => format!(
            "No transcript is available for \"{}\". I can still answer from its title and description.",
            video.title
        ),
        Some(segments) => format!(
            "I've read the transcript of \"{}\" ({} segments). Ask me anything about it.",
            video.title,
            segments.len()
        ),
    }
}
