//! Mediator-facing facade for a remotely executed module
//!
//! `RemoteModuleComponent` is indistinguishable from a local component:
//! it carries a signature, connects to a mediator, and disconnects. All
//! worker machinery lives behind two channels into the supervisor task,
//! which owns the worker and survives restarts without the mediator ever
//! noticing.

use std::sync::Arc;

use async_trait::async_trait;
use eyre::Result;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::warn;

use super::config::RemoteModuleConfig;
use super::registry::ModuleRegistry;
use super::restart_signal;
use super::supervisor::{self, SupervisorCommand};
use super::worker::WorkerInit;
use crate::component::Component;
use crate::error::WorkerError;
use crate::mediator::Mediator;
use crate::signature::{ComponentSignature, EventSignature};

pub struct RemoteModuleComponent {
    signature: ComponentSignature,
    cmd_tx: mpsc::Sender<SupervisorCommand>,
    obs_tx: mpsc::Sender<(EventSignature, Value)>,
}

impl RemoteModuleComponent {
    /// Build the component and eagerly start its worker. Any spawn failure
    /// is deferred and surfaced by `connect`.
    pub fn new(
        signature: ComponentSignature,
        config: RemoteModuleConfig,
        registry: Arc<ModuleRegistry>,
    ) -> Self {
        // The worker is additionally allowed to publish the reserved
        // restart signal, which never appears in the public signature.
        let mut effective = signature.clone();
        effective.publications.push(restart_signal());

        let init = WorkerInit {
            signature: effective,
            module: config.module.clone(),
            plain_function: config.plain_function.clone(),
            reload_on_file_changes: config.reload_on_file_changes,
        };
        let (cmd_tx, obs_tx) = supervisor::start(init, registry, &config);

        Self {
            signature,
            cmd_tx,
            obs_tx,
        }
    }
}

#[async_trait]
impl Component for RemoteModuleComponent {
    fn signature(&self) -> &ComponentSignature {
        &self.signature
    }

    async fn connect(&self, mediator: Arc<Mediator>) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(SupervisorCommand::Connect {
                mediator: Arc::clone(&mediator),
                reply: reply_tx,
            })
            .await
            .map_err(|_| WorkerError::ChannelClosed)?;
        reply_rx.await.map_err(|_| WorkerError::ChannelClosed)??;

        // Observers stay registered across restarts; they feed the stable
        // observation channel, not any particular worker.
        for event in &self.signature.observations {
            let obs_tx = self.obs_tx.clone();
            let observed = event.clone();
            mediator
                .observe(event, move |payload| {
                    let obs_tx = obs_tx.clone();
                    let event = observed.clone();
                    async move {
                        if obs_tx.send((event.clone(), payload)).await.is_err() {
                            warn!(event = %event.name, "worker supervisor is gone, observation dropped");
                        }
                    }
                })
                .await;
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .cmd_tx
            .send(SupervisorCommand::Kill { reply: reply_tx })
            .await
            .is_ok()
        {
            // Wait for the kill procedure to finish so the worker is
            // guaranteed gone when this returns.
            let _ = reply_rx.await;
        }
        Ok(())
    }
}
