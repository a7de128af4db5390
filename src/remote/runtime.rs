//! Worker-side runtime
//!
//! The counterpart of the orchestrator, running inside the worker task. It
//! signals online, adopts the dedicated port handed over by the host, loads
//! the configured module member, and dispatches incoming observations to it.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{OnceCell, mpsc, oneshot};
use tokio::task::JoinSet;
use tracing::{debug, warn};

use super::config::{ModuleSpec, PlainFunctionConfig};
use super::envelope::Envelope;
use super::registry::{ModuleRegistry, PlainFunction, WorkerLogic};
use super::worker::WorkerInit;
use super::{overlay, reload, restart_signal};
use crate::channel::PortSender;
use crate::error::WorkerError;
use crate::signature::{ComponentSignature, EventSignature};

/// Clonable handle through which worker-side logic publishes events back to
/// the host.
#[derive(Clone, Debug)]
pub struct PublicationEmitter {
    tx: PortSender<Envelope>,
}

impl PublicationEmitter {
    pub(crate) fn new(tx: PortSender<Envelope>) -> Self {
        Self { tx }
    }

    /// Emit a publication envelope on the primary channel. Once the host has
    /// torn the channel down this becomes a no-op.
    pub async fn publish(&self, event: &EventSignature, payload: Value) {
        let envelope = Envelope::Publication {
            event: event.clone(),
            payload,
        };
        if self.tx.send(envelope).await.is_err() {
            warn!(event = %event.name, "host channel closed, publication dropped");
        }
    }

    /// Ask the host to fully replace this worker. The signal is intercepted
    /// by the orchestrator and never reaches mediator observers.
    pub async fn request_restart(&self) {
        self.publish(&restart_signal(), Value::Null).await;
    }
}

enum RuntimeMode {
    Logic(WorkerLogic),
    Function {
        config: PlainFunctionConfig,
        function: Arc<OnceCell<PlainFunction>>,
        spec: ModuleSpec,
        registry: Arc<ModuleRegistry>,
    },
}

/// Dispatches observations into the loaded module. Every dispatch runs as
/// its own task so interleaved observations cannot block one another; the
/// task set is aborted wholesale when the runtime is dropped.
pub(crate) struct WorkerRuntime {
    signature: ComponentSignature,
    mode: RuntimeMode,
    emitter: PublicationEmitter,
    tasks: JoinSet<()>,
}

impl WorkerRuntime {
    pub(crate) fn build(
        init: &WorkerInit,
        registry: Arc<ModuleRegistry>,
        emitter: PublicationEmitter,
    ) -> Result<Self, WorkerError> {
        let mode = match &init.plain_function {
            Some(config) => {
                let function = Arc::new(OnceCell::new());
                if config.preload {
                    let resolved = registry.resolve_function(&init.module)?;
                    let _ = function.set(resolved);
                }
                RuntimeMode::Function {
                    config: config.clone(),
                    function,
                    spec: init.module.clone(),
                    registry,
                }
            }
            None => {
                let factory = registry.resolve_logic(&init.module)?;
                RuntimeMode::Logic(factory())
            }
        };

        Ok(Self {
            signature: init.signature.clone(),
            mode,
            emitter,
            tasks: JoinSet::new(),
        })
    }

    /// Route one observation to the module.
    pub(crate) fn dispatch(&mut self, event: EventSignature, payload: Value) {
        if !self.signature.observes_event(&event) {
            debug!(event = %event.name, "observation outside declared signature, ignoring");
            return;
        }

        // Reap tasks that already finished.
        while self.tasks.try_join_next().is_some() {}

        match &self.mode {
            RuntimeMode::Logic(logic) => {
                let Some(handler) = logic.handler(&event.name) else {
                    debug!(event = %event.name, "no handler for observation");
                    return;
                };
                let emitter = self.emitter.clone();
                self.tasks.spawn(async move { handler(payload, emitter).await });
            }
            RuntimeMode::Function {
                config,
                function,
                spec,
                registry,
            } => {
                if event.name != config.events.request.name {
                    debug!(event = %event.name, "observation is not the request event");
                    return;
                }
                self.tasks.spawn(overlay::run_request(
                    config.clone(),
                    function.clone(),
                    spec.clone(),
                    registry.clone(),
                    payload,
                    self.emitter.clone(),
                ));
            }
        }
    }

    /// Run an auxiliary task with the same lifetime as the worker.
    pub(crate) fn track(&mut self, task: impl std::future::Future<Output = ()> + Send + 'static) {
        self.tasks.spawn(task);
    }
}

/// Entry point of every worker task.
///
/// Protocol: emit the online marker, wait for exactly one `PortHandoff` on
/// the default inbound channel, load the module, emit `Ready`, then serve
/// observations until `Kill` or channel closure. Dropping the runtime on the
/// way out aborts in-flight handler tasks, and dropping the port halves
/// closes this end so the host's graceful kill path can observe it.
pub(crate) async fn worker_main(
    init: WorkerInit,
    registry: Arc<ModuleRegistry>,
    online: oneshot::Sender<()>,
    mut inbound: mpsc::Receiver<Envelope>,
) {
    if online.send(()).is_err() {
        debug!("host dropped before online signal");
        return;
    }

    let port = loop {
        match inbound.recv().await {
            Some(Envelope::PortHandoff(port)) => break port,
            Some(other) => debug!(kind = other.kind(), "ignoring envelope before port handoff"),
            None => {
                debug!("host closed inbound channel before port handoff");
                return;
            }
        }
    };

    let (port_tx, mut port_rx) = port.split();
    let emitter = PublicationEmitter::new(port_tx.clone());

    let mut runtime = match WorkerRuntime::build(&init, registry, emitter.clone()) {
        Ok(runtime) => runtime,
        Err(err) => {
            // Exiting closes our port end; the host turns that into a
            // spawn failure during the handshake.
            warn!(module = %init.module, error = %err, "worker failed to load module");
            return;
        }
    };

    if init.reload_on_file_changes {
        let path = PathBuf::from(&init.module.path);
        runtime.track(reload::watch_for_changes(path, emitter.clone()));
    }

    if port_tx.send(Envelope::Ready).await.is_err() {
        debug!("host closed port before ready");
        return;
    }
    debug!(module = %init.module, "worker ready");

    while let Some(envelope) = port_rx.recv().await {
        match envelope {
            Envelope::Observation { event, payload } => runtime.dispatch(event, payload),
            Envelope::Kill => {
                debug!("worker received kill, shutting down");
                break;
            }
            other => debug!(kind = other.kind(), "ignoring unexpected envelope"),
        }
    }
}
