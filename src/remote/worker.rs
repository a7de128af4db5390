//! Worker lifecycle: spawn, handshake, kill
//!
//! The handshake walks Spawned → Online → PortSent → Ready under one
//! bounded deadline. The kill procedure is ask-then-force: a graceful `Kill`
//! raced against an unconditional abort that fires once the grace period
//! elapses; the procedure settles only after both paths have been awaited.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use super::config::{ModuleSpec, PlainFunctionConfig};
use super::envelope::Envelope;
use super::registry::ModuleRegistry;
use super::runtime::worker_main;
use crate::channel::{PortReceiver, PortSender, port_pair};
use crate::error::WorkerError;
use crate::signature::ComponentSignature;

/// Capacity of the default inbound channel; only handshake traffic flows
/// over it.
const INBOUND_CAPACITY: usize = 8;

/// Capacity of each side of the dedicated port.
const PORT_CAPACITY: usize = 64;

/// Initial configuration handed to a worker at spawn time.
#[derive(Debug, Clone)]
pub(crate) struct WorkerInit {
    /// Effective signature: the component's, with the restart signal
    /// appended to the publications.
    pub signature: ComponentSignature,
    pub module: ModuleSpec,
    pub plain_function: Option<PlainFunctionConfig>,
    pub reload_on_file_changes: bool,
}

/// A handle only exists once the handshake has completed, so there is no
/// pre-ready state to represent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WorkerState {
    Ready,
    Killing,
    Dead,
}

/// One live worker instance. Exactly one handle is active per orchestrator;
/// a restart tears the old one down completely before installing a
/// replacement.
#[derive(Debug)]
pub(crate) struct WorkerHandle {
    pub worker_id: Uuid,
    pub state: WorkerState,
    pub join: JoinHandle<()>,
    /// Default inbound channel; kept so the worker's receive side stays
    /// open for the duration of the handle.
    #[allow(dead_code)]
    pub inbound_tx: mpsc::Sender<Envelope>,
    /// Host end of the dedicated port.
    pub port_tx: PortSender<Envelope>,
    pub port_rx: PortReceiver<Envelope>,
}

/// Spawn a worker and drive the startup handshake to completion.
///
/// # Errors
///
/// `HandshakeTimeout` if the handshake does not finish within `deadline`;
/// `SpawnFailure` if the worker dies during the handshake (for example
/// because its module member could not be loaded).
pub(crate) async fn spawn_worker(
    init: WorkerInit,
    registry: Arc<ModuleRegistry>,
    deadline: Duration,
) -> Result<WorkerHandle, WorkerError> {
    let worker_id = Uuid::now_v7();
    debug!(%worker_id, module = %init.module, "spawning worker");

    // Catch unregistered modules on the host side, before paying for a
    // spawn that can only fail.
    if !registry.contains(&init.module) {
        return Err(WorkerError::ModuleNotRegistered {
            path: init.module.path.clone(),
            member: init.module.member.clone(),
        });
    }

    let (online_tx, online_rx) = oneshot::channel();
    let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CAPACITY);

    // Phase: Spawned.
    let join = tokio::spawn(worker_main(init, registry, online_tx, inbound_rx));

    let handshake = async {
        // Phase: Online. The worker runtime has started executing.
        online_rx
            .await
            .map_err(|_| WorkerError::SpawnFailure("worker exited before coming online".into()))?;
        debug!(%worker_id, "worker online");

        // Phase: PortSent. Hand the worker its end of the dedicated port.
        let (host_port, worker_port) = port_pair::<Envelope>(PORT_CAPACITY);
        inbound_tx
            .send(Envelope::PortHandoff(worker_port))
            .await
            .map_err(|_| WorkerError::SpawnFailure("worker closed inbound channel".into()))?;
        debug!(%worker_id, "port handed off");

        // Phase: Ready. Wait on our retained end for the ready marker.
        let (port_tx, mut port_rx) = host_port.split();
        loop {
            match port_rx.recv().await {
                Some(Envelope::Ready) => break,
                Some(other) => {
                    debug!(%worker_id, kind = other.kind(), "ignoring envelope before ready")
                }
                None => {
                    return Err(WorkerError::SpawnFailure(
                        "worker closed its port during the handshake".into(),
                    ));
                }
            }
        }
        debug!(%worker_id, "worker ready");
        Ok((port_tx, port_rx))
    };

    match tokio::time::timeout(deadline, handshake).await {
        Ok(Ok((port_tx, port_rx))) => Ok(WorkerHandle {
            worker_id,
            state: WorkerState::Ready,
            join,
            inbound_tx,
            port_tx,
            port_rx,
        }),
        Ok(Err(err)) => {
            join.abort();
            Err(err)
        }
        Err(_) => {
            warn!(%worker_id, ?deadline, "handshake deadline elapsed, aborting worker");
            join.abort();
            Err(WorkerError::HandshakeTimeout(deadline))
        }
    }
}

/// Run the kill procedure against a worker handle.
///
/// Graceful path: send `Kill`, drain the port until the worker closes its
/// end. Forced path: after `grace`, abort the worker task unconditionally,
/// even when the graceful path already finished, so resource release never
/// depends on worker cooperation. Returns once both paths have settled;
/// afterwards the worker is gone and the host's port ends are closed.
pub(crate) async fn kill_worker(worker: &mut WorkerHandle, grace: Duration) {
    debug!(worker_id = %worker.worker_id, "killing worker");
    worker.state = WorkerState::Killing;

    let WorkerHandle {
        port_tx,
        port_rx,
        join,
        ..
    } = worker;

    let graceful = async {
        if port_tx.send(Envelope::Kill).await.is_err() {
            debug!("worker port already closed");
            return;
        }
        // Late publications racing the kill are drained and discarded;
        // end-of-stream means the worker closed its end.
        while port_rx.recv().await.is_some() {}
        debug!("worker closed its port");
    };

    let forced = async {
        tokio::time::sleep(grace).await;
        join.abort();
    };

    tokio::join!(graceful, forced);

    worker.port_rx.close();
    worker.state = WorkerState::Dead;
    debug!(worker_id = %worker.worker_id, "worker dead");
}
