//! Terminal front-end: reads lines from stdin, renders replies as they stream.
//!
//! Plain lines are submitted to the selected model. Lines starting with `/`
//! are commands; see [`Command`].

use std::path::Path;
use std::process::ExitCode;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Stdout};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::chat::{AttachmentRef, ConversationSnapshot, Message, MessageId, Role};
use crate::config::ChatConfig;
use crate::controller::{ConversationController, ExchangeOutcome};
use crate::error::ChatResult;
use crate::transport::TranscriptionClient;

const HELP: &str = "\
commands:
  /new                 archive this chat and start another
  /model <name>        switch model
  /models              list models
  /history             list archived chats
  /load <n>            reopen archived chat n
  /attach <path>       attach a file to the next message
  /transcribe <path>   transcribe an audio file and send the text
  /help                show this help
  /quit                exit
";

/// Run the interactive front-end (used by the `anmix` binary).
///
/// # Returns
/// `ExitCode::SUCCESS` on end of input or `/quit`, `1` on failure.
#[must_use]
pub fn run() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("Starting anmix v{}", env!("CARGO_PKG_VERSION"));

    let config = ChatConfig::from_env();
    tracing::info!("Model endpoint: {}", config.api.base_url);
    if config.api.api_key.is_none() {
        tracing::warn!("No API key configured; network models will likely be refused");
    }

    let controller = match ConversationController::from_config(&config) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("Failed to create controller: {e}");
            return ExitCode::from(1);
        }
    };
    let transcriber = match TranscriptionClient::new(&config.api, &config.transcription) {
        Ok(t) => t,
        Err(e) => {
            tracing::error!("Failed to create transcription client: {e}");
            return ExitCode::from(1);
        }
    };

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("Failed to create runtime: {e}");
            return ExitCode::from(1);
        }
    };

    let frontend = Frontend::new(controller, transcriber);
    if let Err(e) = rt.block_on(frontend.run()) {
        tracing::error!("Front-end error: {e}");
        return ExitCode::from(1);
    }

    ExitCode::SUCCESS
}

/// One parsed input line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// Submit text to the selected model.
    Say(String),
    /// Archive and reset the conversation.
    New,
    /// Switch model, or show the current one when `None`.
    Model(Option<String>),
    /// List the catalog.
    Models,
    /// List archived sessions.
    History,
    /// Reopen an archived session by list index.
    Load(usize),
    /// Queue an attachment for the next message.
    Attach(String),
    /// Transcribe an audio file and submit the text.
    Transcribe(String),
    /// Print usage.
    Help,
    /// Leave.
    Quit,
    /// Malformed command; carries a hint.
    Invalid(String),
}

impl Command {
    /// Parse one input line. Blank lines yield `None`.
    #[must_use]
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let Some(command) = line.strip_prefix('/') else {
            return Some(Self::Say(line.to_string()));
        };

        let (name, arg) = command
            .split_once(char::is_whitespace)
            .map_or((command, ""), |(name, arg)| (name, arg.trim()));
        let parsed = match (name, arg) {
            ("new", _) => Self::New,
            ("model", "") => Self::Model(None),
            ("model", model) => Self::Model(Some(model.to_string())),
            ("models", _) => Self::Models,
            ("history", _) => Self::History,
            ("load", index) => index
                .parse()
                .map_or_else(|_| Self::Invalid("usage: /load <n>".to_string()), Self::Load),
            ("attach", "") => Self::Invalid("usage: /attach <path>".to_string()),
            ("attach", path) => Self::Attach(path.to_string()),
            ("transcribe", "") => Self::Invalid("usage: /transcribe <path>".to_string()),
            ("transcribe", path) => Self::Transcribe(path.to_string()),
            ("help", _) => Self::Help,
            ("quit" | "exit", _) => Self::Quit,
            (other, _) => Self::Invalid(format!("unknown command /{other}, try /help")),
        };
        Some(parsed)
    }
}

/// Turns successive snapshots into terminal output.
///
/// Streamed text is written incrementally: only the part of the last
/// assistant message not yet shown is emitted.
#[derive(Debug, Default)]
struct Renderer {
    message: Option<MessageId>,
    shown: usize,
    closed: bool,
}

impl Renderer {
    fn update(&mut self, snap: &ConversationSnapshot) -> String {
        let mut out = String::new();
        let Some(last) = snap.messages.last() else {
            self.close(&mut out);
            *self = Self::default();
            return out;
        };
        if last.role != Role::Assistant {
            return out;
        }

        if self.message != Some(last.id) {
            self.close(&mut out);
            *self = Self {
                message: Some(last.id),
                ..Self::default()
            };
            out.push_str("assistant> ");
        }
        if self.closed {
            return out;
        }
        if let Some(tail) = last.content.get(self.shown..) {
            out.push_str(tail);
            self.shown = last.content.len();
        }
        if !snap.pending {
            push_attachments(&mut out, last);
            out.push('\n');
            self.closed = true;
        }
        out
    }

    /// Treat everything currently visible as already shown.
    fn sync(&mut self, snap: &ConversationSnapshot) {
        *self = Self {
            message: snap.messages.last().map(|m| m.id),
            shown: snap.messages.last().map_or(0, |m| m.content.len()),
            closed: true,
        };
    }

    fn close(&mut self, out: &mut String) {
        if self.message.is_some() && !self.closed {
            out.push('\n');
            self.closed = true;
        }
    }
}

fn push_attachments(out: &mut String, message: &Message) {
    for attachment in &message.attachments {
        out.push_str(&format!(
            "\n  [{}] {} ({})",
            attachment.kind.as_str(),
            attachment.name,
            attachment.size_label
        ));
        if let Some(description) = &attachment.description {
            out.push_str(&format!(" {description}"));
        }
    }
}

fn transcript(messages: &[Message]) -> String {
    let mut out = String::new();
    for message in messages {
        out.push_str(&format!("{}> {}", message.role, message.content));
        push_attachments(&mut out, message);
        out.push('\n');
    }
    out
}

/// Best-effort MIME type from a file extension.
fn mime_for(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("pdf") => "application/pdf",
        _ => "text/plain",
    }
}

struct Frontend {
    controller: ConversationController,
    transcriber: TranscriptionClient,
    observer: watch::Receiver<ConversationSnapshot>,
    renderer: Renderer,
    queued: Vec<AttachmentRef>,
    in_flight: Option<JoinHandle<ExchangeOutcome>>,
    out: Stdout,
}

impl Frontend {
    fn new(controller: ConversationController, transcriber: TranscriptionClient) -> Self {
        let observer = controller.subscribe();
        Self {
            controller,
            transcriber,
            observer,
            renderer: Renderer::default(),
            queued: Vec::new(),
            in_flight: None,
            out: tokio::io::stdout(),
        }
    }

    async fn run(mut self) -> ChatResult<()> {
        let snap = self.controller.snapshot().await;
        self.emit(&format!("anmix: chatting with {} (/help for commands)\n", snap.selected_model))
            .await?;

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let Some(line) = line? else { break };
                    let Some(command) = Command::parse(&line) else { continue };
                    if command == Command::Quit {
                        return Ok(());
                    }
                    self.handle(command).await?;
                }
                changed = self.observer.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    self.render().await?;
                }
            }
        }

        // End of input: let the last reply finish before leaving.
        if let Some(handle) = self.in_flight.take() {
            if let Err(e) = handle.await {
                tracing::warn!("Submission task ended abnormally: {e}");
            }
            self.render().await?;
        }
        Ok(())
    }

    async fn render(&mut self) -> ChatResult<()> {
        let snap = self.observer.borrow_and_update().clone();
        let text = self.renderer.update(&snap);
        self.emit(&text).await
    }

    async fn emit(&mut self, text: &str) -> ChatResult<()> {
        if text.is_empty() {
            return Ok(());
        }
        self.out.write_all(text.as_bytes()).await?;
        self.out.flush().await?;
        Ok(())
    }

    async fn handle(&mut self, command: Command) -> ChatResult<()> {
        match command {
            Command::Say(text) => self.submit(text).await,
            Command::New => {
                let note = match self.controller.clear().await {
                    Some(session) => format!("(archived \"{}\")\n", session.title),
                    None => "(new chat)\n".to_string(),
                };
                self.render().await?;
                self.emit(&note).await
            }
            Command::Model(None) => {
                let current = self.controller.snapshot().await.selected_model;
                self.emit(&format!("model: {current}\n")).await
            }
            Command::Model(Some(name)) => match self.controller.select_model(&name).await {
                Ok(()) => self.emit(&format!("(switched to {name})\n")).await,
                Err(e) => self.emit(&format!("{e}\n")).await,
            },
            Command::Models => self.list_models().await,
            Command::History => self.list_history().await,
            Command::Load(index) => self.load(index).await,
            Command::Attach(path) => self.attach(&path).await,
            Command::Transcribe(path) => self.transcribe(&path).await,
            Command::Help => self.emit(HELP).await,
            Command::Invalid(hint) => self.emit(&format!("{hint}\n")).await,
            Command::Quit => Ok(()),
        }
    }

    async fn submit(&mut self, text: String) -> ChatResult<()> {
        if self.controller.is_pending().await {
            return self.emit("(still answering, wait or /new)\n").await;
        }
        let attachments = std::mem::take(&mut self.queued);
        let controller = self.controller.clone();
        self.in_flight = Some(tokio::spawn(async move {
            let outcome = controller.submit(text, attachments).await;
            match &outcome {
                ExchangeOutcome::Rejected(reason) => tracing::warn!("Submission rejected: {reason}"),
                ExchangeOutcome::Failed { cause, .. } => tracing::debug!("Reply failed: {cause}"),
                _ => {}
            }
            outcome
        }));
        Ok(())
    }

    async fn list_models(&mut self) -> ChatResult<()> {
        let selected = self.controller.snapshot().await.selected_model;
        let catalog = self.controller.catalog();
        let mut out = String::new();
        for name in catalog.names() {
            let marker = if name == selected { '*' } else { ' ' };
            let kind = if catalog.resolve(name).is_network() { "" } else { " (simulated)" };
            out.push_str(&format!("{marker} {name}{kind}\n"));
        }
        self.emit(&out).await
    }

    async fn list_history(&mut self) -> ChatResult<()> {
        let history = self.controller.snapshot().await.history;
        if history.is_empty() {
            return self.emit("(no archived chats)\n").await;
        }
        let mut out = String::new();
        for (index, entry) in history.iter().enumerate() {
            out.push_str(&format!(
                "{index:>3}  {}  ({} messages)\n",
                entry.title, entry.message_count
            ));
        }
        self.emit(&out).await
    }

    async fn load(&mut self, index: usize) -> ChatResult<()> {
        if !self.controller.load_history_entry(index).await {
            return self.emit(&format!("no archived chat {index}\n")).await;
        }
        let snap = self.observer.borrow_and_update().clone();
        self.renderer.sync(&snap);
        self.emit(&transcript(&snap.messages)).await
    }

    async fn attach(&mut self, path: &str) -> ChatResult<()> {
        let path = Path::new(path);
        let metadata = match tokio::fs::metadata(path).await {
            Ok(metadata) => metadata,
            Err(e) => return self.emit(&format!("cannot attach {}: {e}\n", path.display())).await,
        };
        let name = path
            .file_name()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
        let source = url::Url::from_file_path(path).ok().map(String::from);
        let attachment = AttachmentRef::from_upload(mime_for(path), name, metadata.len(), source);
        let note = format!(
            "(attached {} [{}], {})\n",
            attachment.name,
            attachment.kind.as_str(),
            attachment.size_label
        );
        self.queued.push(attachment);
        self.emit(&note).await
    }

    async fn transcribe(&mut self, path: &str) -> ChatResult<()> {
        let audio = match tokio::fs::read(path).await {
            Ok(audio) => audio,
            Err(e) => return self.emit(&format!("cannot read {path}: {e}\n")).await,
        };
        match self.transcriber.transcribe(audio).await {
            Ok(Some(text)) => {
                self.emit(&format!("you (voice)> {text}\n")).await?;
                self.submit(text).await
            }
            Ok(None) => self.emit("(no speech recognized)\n").await,
            Err(e) => {
                tracing::error!("Transcription failed: {e}");
                self.emit("(transcription failed)\n").await
            }
        }
    }
}
