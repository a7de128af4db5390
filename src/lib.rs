//! Emissary - Typed Event Mediation with Remote Execution
//!
//! Emissary wires components together through a mediator: components declare
//! the events they observe and publish, then exchange JSON payloads without
//! ever holding references to one another. Any component can additionally be
//! executed remotely in an isolated worker task, supervised with automatic
//! restart, a bounded startup handshake, and a graceful-then-forced kill.
//!
//! # Core Concepts
//!
//! - **Signatures over references**: components are known only by the events
//!   they declare, never by type or identity
//! - **Location transparency**: remote components present the same
//!   [`component::Component`] surface as local ones
//! - **Supervised workers**: a per-component supervisor owns the worker and
//!   replaces it on request, on crash, or on file changes
//! - **Plain-function overlay**: an ordinary async function can be exposed
//!   as a request/response component with no event plumbing of its own
//!
//! # Modules
//!
//! - [`mediator`] - Event mediator and component container
//! - [`component`] - The component trait and closure-based helpers
//! - [`remote`] - Worker execution, supervision, and the function overlay
//! - [`signature`] - Event and component signatures
//! - [`channel`] - Typed in-process message ports

pub mod channel;
pub mod component;
pub mod error;
pub mod mediator;
pub mod remote;
pub mod signature;

pub use component::{Component, FnComponent, Payload};
pub use error::WorkerError;
pub use mediator::{EventWaiter, Mediator, MediatorContainer};
pub use remote::{
    COMPLETION_CALLBACK_SENTINEL, ModuleRegistry, ModuleSpec, PlainArg, PlainFunctionConfig,
    PlainFunctionEvents, RemoteModuleComponent, RemoteModuleConfig, WorkerLogic,
};
pub use signature::{ComponentSignature, EventSignature};
