//! Event and component signatures
//!
//! Signatures are the capability contract of the framework: an event is
//! identified by its name alone, and a component declares up front which
//! events it observes and which it publishes. Payload shapes are a
//! documentation concern; nothing is validated at runtime.

use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// A named event identity used for pub/sub matching.
///
/// Two signatures denote the same event iff their names match.
#[derive(Debug, Clone, Serialize, Deserialize, Eq)]
pub struct EventSignature {
    pub name: String,
}

impl EventSignature {
    /// Create a signature for the given event name.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl PartialEq for EventSignature {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Hash for EventSignature {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

/// A component's declared contract: its name plus the events it observes
/// and publishes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComponentSignature {
    pub name: String,
    pub observations: Vec<EventSignature>,
    pub publications: Vec<EventSignature>,
}

impl ComponentSignature {
    /// Create an empty signature with the given component name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            observations: Vec::new(),
            publications: Vec::new(),
        }
    }

    /// Declare an observed event.
    pub fn observes(mut self, event: EventSignature) -> Self {
        self.observations.push(event);
        self
    }

    /// Declare a published event.
    pub fn publishes(mut self, event: EventSignature) -> Self {
        self.publications.push(event);
        self
    }

    /// Whether this component declares the given event as observed.
    pub fn observes_event(&self, event: &EventSignature) -> bool {
        self.observations.contains(event)
    }

    /// Whether this component declares the given event as published.
    pub fn publishes_event(&self, event: &EventSignature) -> bool {
        self.publications.contains(event)
    }
}
