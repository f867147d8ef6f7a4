//! Protocol layer
//!
//! Turns inbound [`Command`]s into supervisor calls and hands back the
//! ordered [`Event`]s each one produced. Every failure becomes an `Error`
//! event; nothing propagates out of [`Host::handle`].

pub mod blocker;
mod outbox;
pub mod status;
pub mod supervisor;

#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, debug_span, error, info, warn};

use crate::config::HostConfig;
use crate::error::HostError;
use crate::esolangs::Registry;
use crate::types::{ButtonAction, Command, Event};

pub use outbox::Outbox;
pub use supervisor::Supervisor;

pub struct Host {
    supervisor: Supervisor,
}

impl Host {
    pub fn new(registry: Registry, step_limit: Option<u64>) -> Self {
        Self {
            supervisor: Supervisor::new(registry, step_limit),
        }
    }

    /// Host over the built-in esolangs, configured from `[host]`.
    pub fn from_config(config: &HostConfig) -> Self {
        Self::new(Registry::builtin(), config.step_limit)
    }

    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    /// Apply the configured start-up language, if any.
    pub fn boot(&mut self, config: &HostConfig) -> Vec<Event> {
        match &config.language {
            Some(lang) => {
                info!(lang = %lang, "Booting with configured language");
                self.handle(Command::SetLanguage {
                    lang: lang.clone(),
                    options: config.options.clone(),
                })
            }
            None => Vec::new(),
        }
    }

    /// Process one command to completion and return what it emitted.
    pub fn handle(&mut self, command: Command) -> Vec<Event> {
        let span = debug_span!("command", name = command_name(&command));
        let _enter = span.enter();

        match panic::catch_unwind(AssertUnwindSafe(|| self.dispatch(command))) {
            Ok(Ok(())) => {}
            Ok(Err(err)) => self.supervisor.report(err),
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(message = %message, "Command handler panicked");
                self.supervisor.recover(HostError::Internal(message));
            }
        }

        let events = self.supervisor.take_events();
        debug!(count = events.len(), "Command processed");
        events
    }

    /// Decode one JSON command and process it.
    pub fn handle_message(&mut self, raw: &str) -> Vec<Event> {
        match serde_json::from_str::<Command>(raw) {
            Ok(command) => self.handle(command),
            Err(err) => {
                let err = HostError::MalformedCommand(err.to_string());
                warn!(error = %err, "Rejected message");
                vec![Event::error(err.to_string())]
            }
        }
    }

    fn dispatch(&mut self, command: Command) -> crate::error::Result<()> {
        let supervisor = &mut self.supervisor;
        match command {
            Command::SetLanguage { lang, options } => supervisor.set_language(&lang, &options),
            Command::LoadCode { source } => supervisor.load_code(&source),
            Command::ButtonPress { action, args } => match action {
                ButtonAction::Reset => supervisor.reset(),
                ButtonAction::Minify => supervisor.minify(args.code.as_deref().unwrap_or_default()),
                ButtonAction::Interpret => supervisor.run_to_completion(args.code.as_deref()),
                ButtonAction::Step => supervisor.step(),
                ButtonAction::TextToCode => {
                    supervisor.text_to_code(args.text.as_deref().unwrap_or_default())
                }
            },
            Command::Unblock { value, pop_status } => supervisor.unblock(&value, pop_status),
        }
    }

    /* ===================== Async surfaces ===================== */

    /// Move the host onto its own task, fed through channels.
    pub fn spawn(self, capacity: usize) -> (HostHandle, JoinHandle<()>) {
        let (command_tx, command_rx) = mpsc::channel(capacity);
        let (event_tx, event_rx) = mpsc::channel(capacity);
        let shutdown = CancellationToken::new();

        let task = tokio::spawn(self.run(command_rx, event_tx, shutdown.clone()));

        let handle = HostHandle {
            commands: command_tx,
            events: event_rx,
            shutdown,
        };
        (handle, task)
    }

    /// Command loop. Stops on cancellation, when every sender is gone, or
    /// when nobody is listening for events any more.
    pub async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        events: mpsc::Sender<Event>,
        shutdown: CancellationToken,
    ) {
        info!("Host task started");
        loop {
            let command = tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Host task received shutdown signal");
                    break;
                }
                command = commands.recv() => match command {
                    Some(command) => command,
                    None => break,
                },
            };

            for event in self.handle(command) {
                if events.send(event).await.is_err() {
                    debug!("Event receiver dropped");
                    return;
                }
            }
        }
        info!("Host task stopped");
    }

    /// Speak the protocol as JSON lines: one command per input line, every
    /// resulting event written as its own line and flushed per command.
    pub async fn serve<R, W>(
        mut self,
        reader: R,
        mut writer: W,
        shutdown: CancellationToken,
    ) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = reader.lines();
        loop {
            let line = tokio::select! {
                _ = shutdown.cancelled() => break,
                line = lines.next_line() => line.context("Failed to read command")?,
            };
            let Some(line) = line else {
                break;
            };
            if line.trim().is_empty() {
                continue;
            }

            let events = self.handle_message(&line);
            write_events(&mut writer, &events).await?;
        }
        info!("Protocol stream closed");
        Ok(())
    }
}

/// Write events as JSON lines and flush.
pub async fn write_events<W>(writer: &mut W, events: &[Event]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    for event in events {
        let mut line = serde_json::to_vec(event).context("Failed to encode event")?;
        line.push(b'\n');
        writer.write_all(&line).await.context("Failed to write event")?;
    }
    writer.flush().await.context("Failed to flush events")?;
    Ok(())
}

/// Client side of a spawned host.
pub struct HostHandle {
    commands: mpsc::Sender<Command>,
    events: mpsc::Receiver<Event>,
    shutdown: CancellationToken,
}

impl HostHandle {
    pub async fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| anyhow::anyhow!("Host task is no longer running"))
    }

    pub async fn recv(&mut self) -> Option<Event> {
        self.events.recv().await
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

fn command_name(command: &Command) -> &'static str {
    match command {
        Command::SetLanguage { .. } => "setLanguage",
        Command::LoadCode { .. } => "loadCode",
        Command::ButtonPress { action, .. } => action.as_str(),
        Command::Unblock { .. } => "unblock",
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "interpreter panicked".to_string()
    }
}
