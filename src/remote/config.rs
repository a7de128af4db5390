//! Remote module configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::signature::EventSignature;

/// Which member of which module the worker should load. Module loading is
/// opaque to the framework: the pair is resolved against a
/// [`ModuleRegistry`](super::ModuleRegistry) inside the worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleSpec {
    pub path: String,
    pub member: String,
}

impl ModuleSpec {
    pub fn new(path: impl Into<String>, member: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            member: member.into(),
        }
    }
}

impl std::fmt::Display for ModuleSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}::{}", self.path, self.member)
    }
}

/// Configuration for a remote module component. Immutable after
/// construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteModuleConfig {
    /// The module member the worker loads.
    pub module: ModuleSpec,

    /// Opaque loader options, carried for config compatibility. The
    /// in-process registry resolves members by name alone and does not
    /// consult them.
    #[serde(default)]
    pub loader_options: Option<Value>,

    /// When true, the worker watches the module path and requests a full
    /// restart of itself when the files change.
    #[serde(default)]
    pub reload_on_file_changes: bool,

    /// When set, the loaded member is a plain function wrapped as a
    /// request/response event pair.
    #[serde(default)]
    pub plain_function: Option<PlainFunctionConfig>,

    /// Deadline for the whole startup handshake.
    #[serde(default = "default_handshake_timeout_secs")]
    pub handshake_timeout_secs: u64,

    /// Grace period before the forced half of the kill procedure fires.
    #[serde(default = "default_kill_grace_ms")]
    pub kill_grace_ms: u64,

    /// Observations buffered towards the worker. While a restart is in
    /// progress the buffer fills up and publishers are held back rather
    /// than events dropped.
    #[serde(default = "default_observation_buffer")]
    pub observation_buffer: usize,
}

fn default_handshake_timeout_secs() -> u64 {
    10
}

fn default_kill_grace_ms() -> u64 {
    500
}

fn default_observation_buffer() -> usize {
    256
}

impl RemoteModuleConfig {
    /// Config with defaults for the given module member.
    pub fn new(module: ModuleSpec) -> Self {
        Self {
            module,
            loader_options: None,
            reload_on_file_changes: false,
            plain_function: None,
            handshake_timeout_secs: default_handshake_timeout_secs(),
            kill_grace_ms: default_kill_grace_ms(),
            observation_buffer: default_observation_buffer(),
        }
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }

    pub fn kill_grace(&self) -> Duration {
        Duration::from_millis(self.kill_grace_ms)
    }
}

/// Wraps a plain (optionally callback-accepting) function as a
/// Request/Response/Exception event triad.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlainFunctionConfig {
    /// Resolve the function at worker startup instead of on the first
    /// request. Raises startup cost, removes first-call latency.
    #[serde(default)]
    pub preload: bool,

    pub events: PlainFunctionEvents,

    /// Optional per-call deadline. `None` preserves the unbounded behavior:
    /// a function that never completes leaves its request uncorrelated.
    #[serde(default)]
    pub call_timeout_ms: Option<u64>,
}

impl PlainFunctionConfig {
    pub fn new(events: PlainFunctionEvents) -> Self {
        Self {
            preload: false,
            events,
            call_timeout_ms: None,
        }
    }

    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout_ms.map(Duration::from_millis)
    }
}

/// The event triad of a wrapped plain function.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlainFunctionEvents {
    /// Invoking this event calls the function.
    pub request: EventSignature,
    /// Published when the function completes.
    pub response: EventSignature,
    /// Published instead of `response` when the function fails.
    pub exception: EventSignature,
}
