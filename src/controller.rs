//! Live prompt-to-image controller.
//!
//! One tokio task owns all controller state. Input edits, the debounce timer
//! and the in-flight service call are multiplexed with `select!`, so every
//! transition happens on that task and the single-flight rule needs no locks.
//! The embedding layer talks to the task through [`LiveControllerHandle`].

use crate::api::ImageGenerationProvider;
use crate::config::{AppConfig, DEFAULT_DEBOUNCE, DEFAULT_REQUEST_TIMEOUT};
use crate::debounce::{admissible_prompt, Debouncer};
use crate::error::GenerationError;
use crate::gallery::Gallery;
use crate::issuer::GenerationIssuer;
use crate::models::{GeneratedImage, GenerationOptions};
use crate::session::{GateStatus, SessionGate, SessionProvider};
use anyhow::{Context, Result};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ControllerPhase {
    Uninitialized,
    Unauthenticated,
    Ready,
    ReadyAwaitingResult,
}

// Read model published after every event
#[derive(Debug, Clone, Serialize)]
pub struct ControllerSnapshot {
    pub phase: ControllerPhase,
    pub draft: String,
    pub last_issued_prompt: Option<String>,
    pub busy: bool,
    pub last_error: Option<GenerationError>,
    pub images: Vec<GeneratedImage>,
    pub auto_generate: bool,
}

impl Default for ControllerSnapshot {
    fn default() -> Self {
        Self {
            phase: ControllerPhase::Uninitialized,
            draft: String::new(),
            last_issued_prompt: None,
            busy: false,
            last_error: None,
            images: Vec::new(),
            auto_generate: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub debounce: Duration,
    pub request_timeout: Duration,
    pub auto_generate: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            auto_generate: true,
        }
    }
}

impl From<&AppConfig> for ControllerConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            debounce: config.debounce,
            request_timeout: config.request_timeout,
            auto_generate: true,
        }
    }
}

type IssueReply = oneshot::Sender<Result<GeneratedImage, GenerationError>>;

enum Command {
    Start(oneshot::Sender<ControllerPhase>),
    InputChanged(String),
    ForceNow(oneshot::Sender<bool>),
    Issue { prompt: String, reply: IssueReply },
    RemoveImage { id: Uuid, reply: oneshot::Sender<bool> },
    ClearGallery,
    SetAutoGenerate(bool),
    UpdateOptions(GenerationOptions),
    Flush(oneshot::Sender<()>),
    Shutdown,
}

struct LiveController {
    commands: mpsc::UnboundedReceiver<Command>,
    snapshot: watch::Sender<ControllerSnapshot>,
    sessions: Arc<dyn SessionProvider>,
    gate: SessionGate,
    debouncer: Debouncer,
    issuer: GenerationIssuer,
    gallery: Gallery,
    options: GenerationOptions,
    auto_generate: bool,
    last_error: Option<GenerationError>,
    // Caller waiting on a direct `issue`
    pending_reply: Option<IssueReply>,
}

/// Spawns the controller task on the current tokio runtime.
///
/// The controller starts `Uninitialized`; call [`LiveControllerHandle::start`]
/// before feeding it input.
pub fn spawn(
    provider: Arc<dyn ImageGenerationProvider>,
    sessions: Arc<dyn SessionProvider>,
    config: ControllerConfig,
    options: GenerationOptions,
) -> LiveControllerHandle {
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (snapshot_tx, snapshot_rx) = watch::channel(ControllerSnapshot {
        auto_generate: config.auto_generate,
        ..ControllerSnapshot::default()
    });

    let controller = LiveController {
        commands: command_rx,
        snapshot: snapshot_tx,
        sessions,
        gate: SessionGate::new(),
        debouncer: Debouncer::new(config.debounce),
        issuer: GenerationIssuer::new(provider, config.request_timeout),
        gallery: Gallery::new(),
        options,
        auto_generate: config.auto_generate,
        last_error: None,
        pending_reply: None,
    };
    tokio::spawn(controller.run());

    LiveControllerHandle {
        commands: command_tx,
        snapshot: snapshot_rx,
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

impl LiveController {
    async fn run(mut self) {
        log::info!(
            "Live controller running (debounce {}ms)",
            self.debouncer.quiet_interval().as_millis()
        );
        loop {
            let deadline = self.debouncer.deadline();
            // Completions and timers win over queued commands, so a command sent
            // after an event observes that event's effects.
            tokio::select! {
                biased;
                outcome = self.issuer.next_outcome() => self.on_outcome(outcome),
                _ = sleep_until_deadline(deadline) => self.on_quiet_elapsed(),
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle_command(command).await,
                },
            }
            self.publish();
        }
        log::info!("Live controller stopped");
    }

    fn phase(&self) -> ControllerPhase {
        match self.gate.status() {
            GateStatus::Uninitialized => ControllerPhase::Uninitialized,
            GateStatus::Unauthenticated => ControllerPhase::Unauthenticated,
            GateStatus::Ready if self.issuer.is_in_flight() => ControllerPhase::ReadyAwaitingResult,
            GateStatus::Ready => ControllerPhase::Ready,
        }
    }

    fn publish(&self) {
        self.snapshot.send_replace(ControllerSnapshot {
            phase: self.phase(),
            draft: self.debouncer.draft().to_string(),
            last_issued_prompt: self.issuer.last_issued_prompt().map(str::to_string),
            busy: self.issuer.is_in_flight(),
            last_error: self.last_error.clone(),
            images: self.gallery.images().to_vec(),
            auto_generate: self.auto_generate,
        });
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Start(reply) => {
                let status = self.gate.evaluate(self.sessions.as_ref()).await;
                match status {
                    GateStatus::Ready => {
                        if self.last_error == Some(GenerationError::Unauthenticated) {
                            self.last_error = None;
                        }
                        // A draft kept across sign-out settles again
                        self.rearm_if_pending_draft();
                    }
                    _ => {
                        self.debouncer.cancel();
                        self.last_error = Some(GenerationError::Unauthenticated);
                    }
                }
                self.publish();
                let _ = reply.send(self.phase());
            }
            Command::InputChanged(text) => {
                if !self.gate.is_ready() {
                    log::debug!("Ignoring input while not signed in");
                    return;
                }
                self.debouncer.on_input_change(text, Instant::now());
            }
            Command::ForceNow(reply) => {
                let issued = self.force_now();
                self.publish();
                let _ = reply.send(issued);
            }
            Command::Issue { prompt, reply } => match self.try_issue(&prompt) {
                Ok(()) => self.pending_reply = Some(reply),
                Err(e) => {
                    let _ = reply.send(Err(e));
                }
            },
            Command::RemoveImage { id, reply } => {
                let removed = self.gallery.remove(id);
                self.publish();
                let _ = reply.send(removed);
            }
            Command::ClearGallery => {
                log::info!("Clearing gallery ({} images)", self.gallery.len());
                self.gallery.clear();
            }
            Command::SetAutoGenerate(enabled) => {
                log::info!("Live generation {}", if enabled { "enabled" } else { "disabled" });
                self.auto_generate = enabled;
                if enabled {
                    self.rearm_if_pending_draft();
                } else {
                    self.debouncer.cancel();
                }
            }
            Command::UpdateOptions(options) => {
                log::debug!("Generation options updated: {:?}", options);
                self.options = options;
            }
            Command::Flush(reply) => {
                self.publish();
                let _ = reply.send(());
            }
            // Handled by the run loop
            Command::Shutdown => {}
        }
    }

    /// Issues `prompt` if the gate is open. Clears the previous error on success.
    fn try_issue(&mut self, prompt: &str) -> Result<(), GenerationError> {
        if !self.gate.is_ready() {
            return Err(GenerationError::Unauthenticated);
        }
        self.issuer.issue(prompt, self.options.clone())?;
        self.last_error = None;
        Ok(())
    }

    fn admissible_draft(&self) -> Option<String> {
        admissible_prompt(
            self.debouncer.draft(),
            self.issuer.last_issued_prompt(),
            self.issuer.is_in_flight(),
        )
    }

    fn on_quiet_elapsed(&mut self) {
        let Some(draft) = self.debouncer.poll_settled(Instant::now()) else {
            return;
        };
        if !self.auto_generate || !self.gate.is_ready() {
            return;
        }
        match self.admissible_draft() {
            Some(prompt) => {
                if let Err(e) = self.try_issue(&prompt) {
                    log::warn!("Settled prompt '{}' not issued: {}", prompt, e);
                }
            }
            None => log::debug!("Settled draft '{}' not issued", draft.trim()),
        }
    }

    fn force_now(&mut self) -> bool {
        if !self.gate.is_ready() {
            log::warn!("Force generate ignored: not signed in");
            return false;
        }
        self.debouncer.force_now();
        match self.admissible_draft() {
            Some(prompt) => self.try_issue(&prompt).is_ok(),
            None => {
                log::debug!("Force generate ignored: nothing new to issue or a request is in flight");
                false
            }
        }
    }

    /// Starts another quiet interval if the draft moved on while a request was out.
    fn rearm_if_pending_draft(&mut self) {
        if !self.auto_generate || !self.gate.is_ready() || self.debouncer.deadline().is_some() {
            return;
        }
        if self.admissible_draft().is_some() {
            self.debouncer.rearm(Instant::now());
        }
    }

    fn on_outcome(&mut self, outcome: Result<GeneratedImage, GenerationError>) {
        let reply = match outcome {
            Ok(image) => {
                self.gallery.on_image_produced(image.clone());
                Ok(image)
            }
            Err(e) => {
                self.last_error = Some(e.clone());
                Err(e)
            }
        };
        self.rearm_if_pending_draft();
        if let Some(pending) = self.pending_reply.take() {
            self.publish();
            let _ = pending.send(reply);
        }
    }
}

/// Cloneable handle to a running controller.
#[derive(Clone)]
pub struct LiveControllerHandle {
    commands: mpsc::UnboundedSender<Command>,
    snapshot: watch::Receiver<ControllerSnapshot>,
}

impl LiveControllerHandle {
    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            log::warn!("Live controller has stopped; command dropped");
        }
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .map_err(|_| anyhow::anyhow!("Live controller has stopped"))?;
        rx.await.context("Live controller dropped the request")
    }

    /// Runs the session gate and reports the resulting phase.
    pub async fn start(&self) -> Result<ControllerPhase> {
        self.request(Command::Start).await
    }

    /// Re-runs the session gate when the host becomes active again.
    pub async fn resume(&self) -> Result<ControllerPhase> {
        self.start().await
    }

    pub fn on_input_change(&self, text: impl Into<String>) {
        self.send(Command::InputChanged(text.into()));
    }

    /// Issues the current draft now. Returns whether a request was started.
    pub async fn force_generate_now(&self) -> Result<bool> {
        self.request(Command::ForceNow).await
    }

    /// Issues `prompt` directly and waits for its outcome.
    ///
    /// Unlike the debounced path this does not require the prompt to differ
    /// from the last one, so it doubles as an explicit retry.
    pub async fn issue(&self, prompt: impl Into<String>) -> Result<GeneratedImage, GenerationError> {
        let prompt = prompt.into();
        match self.request(|reply| Command::Issue { prompt, reply }).await {
            Ok(outcome) => outcome,
            Err(e) => Err(GenerationError::ServiceUnavailable(e.to_string())),
        }
    }

    /// Returns whether an image was removed.
    pub async fn remove_image(&self, id: Uuid) -> Result<bool> {
        self.request(|reply| Command::RemoveImage { id, reply }).await
    }

    pub fn clear_gallery(&self) {
        self.send(Command::ClearGallery);
    }

    pub fn set_auto_generate(&self, enabled: bool) {
        self.send(Command::SetAutoGenerate(enabled));
    }

    /// New options apply from the next issued request on.
    pub fn update_options(&self, options: GenerationOptions) {
        self.send(Command::UpdateOptions(options));
    }

    /// Waits until every command sent before this one has been handled.
    pub async fn flush(&self) -> Result<()> {
        self.request(Command::Flush).await
    }

    pub fn shutdown(&self) {
        self.send(Command::Shutdown);
    }

    pub fn current_images(&self) -> Vec<GeneratedImage> {
        self.snapshot.borrow().images.clone()
    }

    pub fn current_error(&self) -> Option<GenerationError> {
        self.snapshot.borrow().last_error.clone()
    }

    pub fn is_busy(&self) -> bool {
        self.snapshot.borrow().busy
    }

    pub fn phase(&self) -> ControllerPhase {
        self.snapshot.borrow().phase
    }

    pub fn snapshot(&self) -> ControllerSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ControllerSnapshot> {
        self.snapshot.clone()
    }
}
