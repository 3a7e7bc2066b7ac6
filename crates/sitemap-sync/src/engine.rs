//! Single-owner task around the subscription registry.
//!
//! All registry mutation happens on one spawned task. Callers talk to it
//! through a cloneable [`SyncEngine`] handle; request results arrive on a
//! second channel and are processed in between commands, so reconciliation
//! never races with a response handler.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::http::ClientHandle;
use crate::listener::PageListener;
use crate::registry::{Completion, StopReason, SubscriptionRegistry};
use crate::server::ServerProperties;
use crate::subscription::SubscriptionState;

enum Command {
    UpdateActiveConnections {
        urls: Vec<String>,
        client: Option<ClientHandle>,
    },
    Start,
    Stop(StopReason),
    TriggerUpdate {
        url: String,
        force_reload: bool,
    },
    SetListener(Arc<dyn PageListener>),
    TrackedUrls(oneshot::Sender<Vec<String>>),
    State {
        url: String,
        reply: oneshot::Sender<Option<SubscriptionState>>,
    },
    Shutdown(oneshot::Sender<()>),
}

#[derive(Clone)]
pub struct SyncEngine {
    commands: mpsc::UnboundedSender<Command>,
}

impl SyncEngine {
    /// Spawns the engine task. The registry starts out stopped and empty.
    pub fn spawn(
        server: ServerProperties,
        listener: Arc<dyn PageListener>,
        config: SyncConfig,
    ) -> (Self, JoinHandle<()>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();
        let registry = SubscriptionRegistry::new(server, listener, completion_tx, config);
        let task = tokio::spawn(run(registry, command_rx, completion_rx));
        (
            Self {
                commands: command_tx,
            },
            task,
        )
    }

    fn send(&self, command: Command) -> SyncResult<()> {
        self.commands
            .send(command)
            .map_err(|_| SyncError::EngineClosed)
    }

    pub fn update_active_connections(
        &self,
        urls: Vec<String>,
        client: Option<ClientHandle>,
    ) -> SyncResult<()> {
        self.send(Command::UpdateActiveConnections { urls, client })
    }

    pub fn start(&self) -> SyncResult<()> {
        self.send(Command::Start)
    }

    pub fn stop(&self, reason: StopReason) -> SyncResult<()> {
        self.send(Command::Stop(reason))
    }

    pub fn trigger_update(&self, url: impl Into<String>, force_reload: bool) -> SyncResult<()> {
        self.send(Command::TriggerUpdate {
            url: url.into(),
            force_reload,
        })
    }

    pub fn set_listener(&self, listener: Arc<dyn PageListener>) -> SyncResult<()> {
        self.send(Command::SetListener(listener))
    }

    pub async fn tracked_urls(&self) -> SyncResult<Vec<String>> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::TrackedUrls(tx))?;
        rx.await.map_err(|_| SyncError::EngineClosed)
    }

    pub async fn subscription_state(&self, url: impl Into<String>) -> SyncResult<Option<SubscriptionState>> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::State {
            url: url.into(),
            reply,
        })?;
        rx.await.map_err(|_| SyncError::EngineClosed)
    }

    /// Cancels every subscription and ends the engine task.
    pub async fn shutdown(&self) -> SyncResult<()> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Shutdown(tx))?;
        rx.await.map_err(|_| SyncError::EngineClosed)
    }
}

async fn run(
    mut registry: SubscriptionRegistry,
    mut commands: mpsc::UnboundedReceiver<Command>,
    mut completions: mpsc::UnboundedReceiver<Completion>,
) {
    debug!("sync engine running");
    loop {
        tokio::select! {
            command = commands.recv() => {
                let Some(command) = command else {
                    debug!("all engine handles dropped");
                    break;
                };
                match command {
                    Command::UpdateActiveConnections { urls, client } => {
                        registry.update_active_connections(&urls, client);
                    }
                    Command::Start => registry.start(),
                    Command::Stop(reason) => registry.stop(reason),
                    Command::TriggerUpdate { url, force_reload } => {
                        registry.trigger_update(&url, force_reload);
                    }
                    Command::SetListener(listener) => registry.set_listener(listener),
                    Command::TrackedUrls(reply) => {
                        let _ = reply.send(registry.tracked_urls());
                    }
                    Command::State { url, reply } => {
                        let state = registry.subscription(&url).map(|s| s.state());
                        let _ = reply.send(state);
                    }
                    Command::Shutdown(reply) => {
                        registry.teardown();
                        let _ = reply.send(());
                        break;
                    }
                }
            }
            Some(completion) = completions.recv() => {
                registry.handle_completion(completion);
            }
        }
    }
    registry.teardown();
    info!("sync engine stopped");
}
