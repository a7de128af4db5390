//! Module registry: the opaque "load module M, get member X" operation
//!
//! There is no dynamic code loading here; the embedding application
//! registers every member a worker may load, keyed by `(path, member)`.
//! A member is either worker logic (a map of event handlers) or a plain
//! function destined for the function-wrapping overlay.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use futures::future::BoxFuture;
use serde_json::Value;
use tracing::debug;

use super::config::ModuleSpec;
use super::runtime::PublicationEmitter;
use crate::error::WorkerError;
use crate::signature::EventSignature;

/// Completion callback spliced into a plain function's parameters.
/// `Ok` completes the request with a result, `Err` with an error.
pub type CompletionCallback = Box<dyn FnOnce(Result<Value, Value>) + Send + 'static>;

/// One positional argument of a plain function call: either a payload value
/// or the spliced-in completion callback.
pub enum PlainArg {
    Value(Value),
    Callback(CompletionCallback),
}

impl PlainArg {
    /// The payload value, if this argument is one.
    pub fn into_value(self) -> Option<Value> {
        match self {
            PlainArg::Value(value) => Some(value),
            PlainArg::Callback(_) => None,
        }
    }

    /// The completion callback, if this argument is one.
    pub fn into_callback(self) -> Option<CompletionCallback> {
        match self {
            PlainArg::Value(_) => None,
            PlainArg::Callback(callback) => Some(callback),
        }
    }
}

impl std::fmt::Debug for PlainArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlainArg::Value(value) => f.debug_tuple("Value").field(value).finish(),
            PlainArg::Callback(_) => f.debug_tuple("Callback").finish(),
        }
    }
}

/// A registered plain function. Completion comes from the returned future,
/// or from the callback argument when one was spliced in.
pub type PlainFunction =
    Arc<dyn Fn(Vec<PlainArg>) -> BoxFuture<'static, Result<Value, Value>> + Send + Sync>;

/// Handler for one observed event inside a worker.
pub type ObservationHandler =
    Arc<dyn Fn(Value, PublicationEmitter) -> BoxFuture<'static, ()> + Send + Sync>;

/// Worker-side logic: event-name-keyed async handlers. Handlers receive the
/// observation payload and an emitter for their publications.
#[derive(Default)]
pub struct WorkerLogic {
    handlers: HashMap<String, ObservationHandler>,
}

impl WorkerLogic {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for an observed event.
    pub fn on<F, Fut>(mut self, event: &EventSignature, handler: F) -> Self
    where
        F: Fn(Value, PublicationEmitter) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let boxed: ObservationHandler =
            Arc::new(move |payload, emitter| Box::pin(handler(payload, emitter)));
        self.handlers.insert(event.name.clone(), boxed);
        self
    }

    pub(crate) fn handler(&self, event_name: &str) -> Option<ObservationHandler> {
        self.handlers.get(event_name).cloned()
    }
}

type LogicFactory = Arc<dyn Fn() -> WorkerLogic + Send + Sync>;

/// What `(path, member)` resolves to.
#[derive(Clone)]
pub(crate) enum ModuleMember {
    Logic(LogicFactory),
    Function(PlainFunction),
}

/// Maps module specs to registered members. Shared by the host (spawn-time
/// validation) and every worker (actual resolution).
#[derive(Default)]
pub struct ModuleRegistry {
    members: RwLock<HashMap<(String, String), ModuleMember>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register worker logic under `path::member`. The factory runs inside
    /// the worker on every (re)start, so each worker instance gets fresh
    /// logic state.
    pub fn register_logic<F>(&self, path: &str, member: &str, factory: F)
    where
        F: Fn() -> WorkerLogic + Send + Sync + 'static,
    {
        debug!(path, member, "ModuleRegistry::register_logic");
        self.members.write().expect("registry lock poisoned").insert(
            (path.to_string(), member.to_string()),
            ModuleMember::Logic(Arc::new(factory)),
        );
    }

    /// Register a plain function under `path::member`.
    pub fn register_function<F>(&self, path: &str, member: &str, function: F)
    where
        F: Fn(Vec<PlainArg>) -> BoxFuture<'static, Result<Value, Value>> + Send + Sync + 'static,
    {
        debug!(path, member, "ModuleRegistry::register_function");
        self.members.write().expect("registry lock poisoned").insert(
            (path.to_string(), member.to_string()),
            ModuleMember::Function(Arc::new(function)),
        );
    }

    /// Whether a member is registered for the spec.
    pub fn contains(&self, spec: &ModuleSpec) -> bool {
        self.members
            .read()
            .expect("registry lock poisoned")
            .contains_key(&(spec.path.clone(), spec.member.clone()))
    }

    pub(crate) fn resolve(&self, spec: &ModuleSpec) -> Result<ModuleMember, WorkerError> {
        self.members
            .read()
            .expect("registry lock poisoned")
            .get(&(spec.path.clone(), spec.member.clone()))
            .cloned()
            .ok_or_else(|| WorkerError::ModuleNotRegistered {
                path: spec.path.clone(),
                member: spec.member.clone(),
            })
    }

    pub(crate) fn resolve_logic(&self, spec: &ModuleSpec) -> Result<LogicFactory, WorkerError> {
        match self.resolve(spec)? {
            ModuleMember::Logic(factory) => Ok(factory),
            ModuleMember::Function(_) => Err(WorkerError::NotWorkerLogic {
                path: spec.path.clone(),
                member: spec.member.clone(),
            }),
        }
    }

    pub(crate) fn resolve_function(&self, spec: &ModuleSpec) -> Result<PlainFunction, WorkerError> {
        match self.resolve(spec)? {
            ModuleMember::Function(function) => Ok(function),
            ModuleMember::Logic(_) => Err(WorkerError::NotAPlainFunction {
                path: spec.path.clone(),
                member: spec.member.clone(),
            }),
        }
    }
}
