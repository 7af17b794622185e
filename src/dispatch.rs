use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, Sender};

use eframe::egui;
use poll_promise::Promise;

use crate::llamacli::{CommandRunner, InvokeError, LlamaCli, ProcessCommandRunner};
use crate::settings::{DispatchSettings, InvokerSettings};

#[derive(Debug)]
pub struct WorkerReply {
    pub id: u64,
    pub reply: Result<String, InvokeError>,
}

/// Starts one worker thread per prompt, at most `max_in_flight` at a time.
/// Prompts beyond that wait in a FIFO backlog until `pump` finds a free slot.
pub struct Dispatcher<R: CommandRunner + 'static = ProcessCommandRunner> {
    invoker: LlamaCli<R>,
    settings: DispatchSettings,
    tx: Sender<WorkerReply>,
    repaint: Option<egui::Context>,
    in_flight: Vec<Promise<()>>,
    backlog: VecDeque<(u64, String)>,
    next_id: u64,
}

impl<R: CommandRunner + 'static> Dispatcher<R> {
    pub fn new(invoker: LlamaCli<R>, settings: DispatchSettings) -> (Self, Receiver<WorkerReply>) {
        let (tx, rx) = mpsc::channel();
        let dispatcher = Self {
            invoker,
            settings,
            tx,
            repaint: None,
            in_flight: Vec::new(),
            backlog: VecDeque::new(),
            next_id: 0,
        };
        (dispatcher, rx)
    }

    /// Workers poke this context when a reply is ready so the UI doesn't wait for the next poll.
    pub fn set_repaint_context(&mut self, ctx: &egui::Context) {
        self.repaint = Some(ctx.clone());
    }

    pub fn invoker_settings(&self) -> &InvokerSettings {
        self.invoker.settings()
    }

    pub fn dispatch_settings(&self) -> DispatchSettings {
        self.settings
    }

    /// Only affects workers started afterwards.
    pub fn reconfigure(&mut self, invoker: InvokerSettings, settings: DispatchSettings) {
        self.invoker = self.invoker.with_settings(invoker);
        self.settings = settings;
        self.pump();
    }

    pub fn submit(&mut self, prompt: String) -> u64 {
        self.next_id += 1;
        let id = self.next_id;
        // Everything goes through the backlog so older queued prompts start first
        self.backlog.push_back((id, prompt));
        self.pump();
        if self.backlog.back().is_some_and(|(queued, _)| *queued == id) {
            tracing::info!(id, backlog = self.backlog.len(), "All workers busy, queuing prompt");
        }
        id
    }

    /// Forgets finished workers and starts queued prompts while slots are free.
    pub fn pump(&mut self) {
        self.reap();
        while self.in_flight.len() < self.settings.max_in_flight {
            let Some((id, prompt)) = self.backlog.pop_front() else {
                break;
            };
            self.spawn(id, prompt);
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn backlog_len(&self) -> usize {
        self.backlog.len()
    }

    fn reap(&mut self) {
        self.in_flight.retain(|worker| worker.ready().is_none());
    }

    fn spawn(&mut self, id: u64, prompt: String) {
        tracing::info!(id, "Dispatching prompt to llama-cli");
        let invoker = self.invoker.clone();
        let tx = self.tx.clone();
        let repaint = self.repaint.clone();

        let worker = Promise::spawn_thread(format!("llama_worker_{id}"), move || {
            let reply = invoker.invoke(&prompt);
            if let Err(e) = &reply {
                tracing::warn!(id, error = %e, "llama-cli invocation failed");
            }
            // The receiver is gone once the window has closed; nothing left to show.
            let _ = tx.send(WorkerReply { id, reply });
            if let Some(ctx) = repaint {
                ctx.request_repaint();
            }
        });
        self.in_flight.push(worker);
    }
}
