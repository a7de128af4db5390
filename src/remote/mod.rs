//! Remote module execution
//!
//! Runs a registered module in an isolated worker task while presenting it
//! to the mediator as an ordinary component. A supervisor per component
//! owns the worker lifecycle: spawn, handshake, restart, kill. Traffic
//! crosses a dedicated envelope channel, so restarting the worker never
//! disturbs mediator registrations.

mod component;
mod config;
mod envelope;
mod overlay;
mod registry;
mod reload;
mod runtime;
mod supervisor;
mod worker;

pub use component::RemoteModuleComponent;
pub use config::{ModuleSpec, PlainFunctionConfig, PlainFunctionEvents, RemoteModuleConfig};
pub use envelope::Envelope;
pub use overlay::COMPLETION_CALLBACK_SENTINEL;
pub use registry::{
    CompletionCallback, ModuleRegistry, ObservationHandler, PlainArg, PlainFunction, WorkerLogic,
};
pub use runtime::PublicationEmitter;

use crate::signature::EventSignature;

/// Name of the reserved event a worker publishes to ask its host for a full
/// replacement. Intercepted by the supervisor; never relayed to observers.
pub const RESTART_EVENT_NAME: &str = "__emissary_restart_worker__";

/// The reserved restart event.
pub fn restart_signal() -> EventSignature {
    EventSignature::new(RESTART_EVENT_NAME)
}
