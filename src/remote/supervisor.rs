//! Worker supervisor: the host-side actor owning the active worker
//!
//! One supervisor task runs per remote component. It is the single owner of
//! the active `WorkerHandle`, the mutable indirection every send path goes
//! through, and serves three inputs: commands from the component facade
//! (connect/kill), observations from the stable observation channel, and
//! envelopes arriving from the worker's port.
//!
//! Observations always route to the worker that is current at forward time,
//! so a restart transparently redirects traffic without any mediator
//! re-registration. While a restart is in progress the bounded observation
//! channel buffers incoming events and holds publishers back once full;
//! nothing is silently dropped in the kill→respawn gap.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use super::RESTART_EVENT_NAME;
use super::config::RemoteModuleConfig;
use super::envelope::Envelope;
use super::registry::ModuleRegistry;
use super::worker::{WorkerHandle, WorkerInit, kill_worker, spawn_worker};
use crate::error::WorkerError;
use crate::mediator::Mediator;
use crate::signature::EventSignature;

const COMMAND_CAPACITY: usize = 8;

/// Commands from the component facade to its supervisor.
pub(crate) enum SupervisorCommand {
    /// Activate: start relaying worker publications to this mediator.
    /// Replies once the worker handshake has completed (or failed).
    Connect {
        mediator: Arc<Mediator>,
        reply: oneshot::Sender<Result<(), WorkerError>>,
    },

    /// Run the kill procedure and shut the supervisor down.
    Kill { reply: oneshot::Sender<()> },
}

/// Spawn the supervisor for one remote component. The worker is spawned
/// eagerly, before any `Connect` arrives, so startup cost is paid at
/// construction time.
pub(crate) fn start(
    init: WorkerInit,
    registry: Arc<ModuleRegistry>,
    config: &RemoteModuleConfig,
) -> (
    mpsc::Sender<SupervisorCommand>,
    mpsc::Sender<(EventSignature, Value)>,
) {
    let (cmd_tx, mut cmd_rx) = mpsc::channel(COMMAND_CAPACITY);
    let (obs_tx, obs_rx) = mpsc::channel(config.observation_buffer);
    let handshake_timeout = config.handshake_timeout();
    let kill_grace = config.kill_grace();

    tokio::spawn(async move {
        match spawn_worker(init.clone(), registry.clone(), handshake_timeout).await {
            Ok(worker) => {
                let supervisor = WorkerSupervisor {
                    init,
                    registry,
                    handshake_timeout,
                    kill_grace,
                    cmd_rx,
                    obs_rx,
                    worker,
                };
                supervisor.run().await;
            }
            Err(err) => {
                error!(module = %init.module, error = %err, "worker failed to start");
                // Hold the error for the component's first command so
                // `connect` can surface it to the caller.
                match cmd_rx.recv().await {
                    Some(SupervisorCommand::Connect { reply, .. }) => {
                        let _ = reply.send(Err(err));
                    }
                    Some(SupervisorCommand::Kill { reply }) => {
                        let _ = reply.send(());
                    }
                    None => {}
                }
            }
        }
    });

    (cmd_tx, obs_tx)
}

struct WorkerSupervisor {
    init: WorkerInit,
    registry: Arc<ModuleRegistry>,
    handshake_timeout: Duration,
    kill_grace: Duration,
    cmd_rx: mpsc::Receiver<SupervisorCommand>,
    obs_rx: mpsc::Receiver<(EventSignature, Value)>,
    /// The active worker. Replaced wholesale by `restart`.
    worker: WorkerHandle,
}

impl WorkerSupervisor {
    async fn run(mut self) {
        // Phase 1: worker is up, wait for activation.
        let mediator = loop {
            match self.cmd_rx.recv().await {
                Some(SupervisorCommand::Connect { mediator, reply }) => {
                    let _ = reply.send(Ok(()));
                    break mediator;
                }
                Some(SupervisorCommand::Kill { reply }) => {
                    kill_worker(&mut self.worker, self.kill_grace).await;
                    let _ = reply.send(());
                    return;
                }
                None => {
                    // Component dropped without ever connecting.
                    kill_worker(&mut self.worker, self.kill_grace).await;
                    return;
                }
            }
        };
        debug!(worker_id = %self.worker.worker_id, "supervisor activated");

        // Phase 2: relay until told to die.
        loop {
            tokio::select! {
                command = self.cmd_rx.recv() => match command {
                    Some(SupervisorCommand::Kill { reply }) => {
                        kill_worker(&mut self.worker, self.kill_grace).await;
                        let _ = reply.send(());
                        return;
                    }
                    Some(SupervisorCommand::Connect { reply, .. }) => {
                        warn!("component connected twice, ignoring");
                        let _ = reply.send(Ok(()));
                    }
                    None => {
                        kill_worker(&mut self.worker, self.kill_grace).await;
                        return;
                    }
                },

                observation = self.obs_rx.recv() => {
                    if let Some((event, payload)) = observation {
                        // Dereference the active worker at send time, never
                        // a handle captured earlier.
                        let envelope = Envelope::Observation { event: event.clone(), payload };
                        if self.worker.port_tx.send(envelope).await.is_err() {
                            warn!(event = %event.name, "worker port closed, observation dropped");
                        }
                    }
                },

                envelope = self.worker.port_rx.recv() => match envelope {
                    Some(Envelope::Publication { event, payload }) => {
                        if event.name == RESTART_EVENT_NAME {
                            // Reserved signal: swallow it and replace the
                            // worker instead of publishing.
                            info!(worker_id = %self.worker.worker_id, "worker requested restart");
                            if self.restart().await.is_err() {
                                return;
                            }
                        } else {
                            debug!(event = %event.name, "relaying worker publication");
                            mediator.publish(&event, payload).await;
                        }
                    }
                    Some(other) => {
                        debug!(kind = other.kind(), "ignoring unexpected envelope from worker");
                    }
                    None => {
                        // Worker died outside the kill procedure.
                        error!(worker_id = %self.worker.worker_id, "worker channel closed unexpectedly, restarting");
                        if self.restart().await.is_err() {
                            return;
                        }
                    }
                },
            }
        }
    }

    /// Kill the current worker to completion, then install a freshly
    /// handshaken replacement.
    async fn restart(&mut self) -> Result<(), WorkerError> {
        let old_id = self.worker.worker_id;
        kill_worker(&mut self.worker, self.kill_grace).await;

        match spawn_worker(self.init.clone(), self.registry.clone(), self.handshake_timeout).await {
            Ok(replacement) => {
                info!(%old_id, new_id = %replacement.worker_id, "worker restarted");
                self.worker = replacement;
                Ok(())
            }
            Err(err) => {
                error!(%old_id, error = %err, "worker respawn failed, supervisor shutting down");
                Err(err)
            }
        }
    }
}
