use std::path::PathBuf;
use std::sync::mpsc::{Receiver, TryRecvError};
use std::time::Duration;

use eframe::egui;

use crate::dispatch::{Dispatcher, WorkerReply};
use crate::llamacli::{CommandRunner, LlamaCli, ProcessCommandRunner};
use crate::settings::{DispatchSettings, InvokerSettings};
use crate::transcript::{Message, Transcript};

/// How often the UI drains finished replies when nothing else triggers a repaint.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct ChatApp<R: CommandRunner + 'static = ProcessCommandRunner> {
    pub input: String,
    pub transcript: Transcript,
    pub dispatcher: Dispatcher<R>,
    replies: Receiver<WorkerReply>,
    pub show_settings: bool,
    pub executable: String,
    pub model: String,
    pub threads: u32,
    pub max_in_flight: usize,
    pub settings_error: Option<String>,
}

impl ChatApp {
    pub fn new(cc: &eframe::CreationContext<'_>) -> Self {
        let mut app = Self::with_invoker(
            LlamaCli::new(InvokerSettings::default()),
            DispatchSettings::default(),
        );
        app.dispatcher.set_repaint_context(&cc.egui_ctx);
        app
    }
}

impl<R: CommandRunner + 'static> ChatApp<R> {
    pub fn with_invoker(invoker: LlamaCli<R>, settings: DispatchSettings) -> Self {
        let (dispatcher, replies) = Dispatcher::new(invoker, settings);
        Self::from_parts(dispatcher, replies)
    }

    fn from_parts(dispatcher: Dispatcher<R>, replies: Receiver<WorkerReply>) -> Self {
        let mut app = Self {
            input: String::new(),
            transcript: Transcript::default(),
            dispatcher,
            replies,
            show_settings: false,
            executable: String::new(),
            model: String::new(),
            threads: 0,
            max_in_flight: 0,
            settings_error: None,
        };
        app.load_settings_form();
        app
    }

    /// Sends the trimmed input if there is any. Whitespace-only input is left alone.
    pub fn submit(&mut self) -> Option<u64> {
        let prompt = self.input.trim();
        if prompt.is_empty() {
            return None;
        }

        // Show the message right away, the reply follows when a worker finishes
        let prompt = prompt.to_string();
        self.transcript.push(Message::user(prompt.clone()));
        self.input.clear();
        Some(self.dispatcher.submit(prompt))
    }

    /// Appends every reply waiting in the queue, oldest first, then lets queued prompts start.
    pub fn drain_replies(&mut self) -> usize {
        let mut appended = 0;
        loop {
            match self.replies.try_recv() {
                Ok(WorkerReply { id, reply: Ok(text) }) => {
                    tracing::debug!(id, "Reply received");
                    self.transcript.push(Message::assistant(text));
                }
                Ok(WorkerReply { id, reply: Err(e) }) => {
                    tracing::debug!(id, "Failure received");
                    self.transcript.push(Message::error(e.to_string()));
                }
                // Nothing left for this tick
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
            appended += 1;
        }
        // Freed slots go to the oldest queued prompts
        self.dispatcher.pump();
        appended
    }

    /// One turn of the drain loop; reschedules itself through the repaint timer.
    pub fn tick(&mut self, ctx: &egui::Context) {
        self.drain_replies();
        ctx.request_repaint_after(POLL_INTERVAL);
    }

    pub fn load_settings_form(&mut self) {
        let invoker = self.dispatcher.invoker_settings();
        self.executable = invoker.executable.display().to_string();
        self.model = invoker.model.display().to_string();
        self.threads = invoker.threads;
        self.max_in_flight = self.dispatcher.dispatch_settings().max_in_flight;
        self.settings_error = None;
    }

    pub fn apply_settings(&mut self) {
        let invoker = InvokerSettings {
            executable: PathBuf::from(self.executable.trim()),
            model: PathBuf::from(self.model.trim()),
            threads: self.threads,
        };
        let dispatch = DispatchSettings {
            max_in_flight: self.max_in_flight,
        };

        // Keep the old settings if either half is invalid
        match invoker.validate().and_then(|()| dispatch.validate()) {
            Ok(()) => {
                tracing::info!(command = %invoker.command_line("<prompt>"), "Applied llama-cli settings");
                self.dispatcher.reconfigure(invoker, dispatch);
                self.settings_error = None;
            }
            Err(e) => {
                self.settings_error = Some(e.to_string());
            }
        }
    }

    pub fn reset_to_defaults(&mut self) {
        self.dispatcher
            .reconfigure(InvokerSettings::default(), DispatchSettings::default());
        self.load_settings_form();
    }
}
