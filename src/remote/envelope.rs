//! Message envelopes exchanged between host and worker
//!
//! A closed tagged union matched exhaustively at both endpoints. Envelopes
//! that are valid but arrive in a phase where they make no sense (say, a
//! second `Ready`) are ignored with a debug log rather than treated as
//! protocol errors.
//!
//! `PortHandoff` carries a live port end, so envelopes are in-process values
//! rather than a serialized wire format; payloads themselves are
//! `serde_json::Value` and cross the boundary by move.

use serde_json::Value;

use crate::channel::MessagePort;
use crate::signature::EventSignature;

/// A tagged message unit exchanged over a channel between host and worker.
#[derive(Debug)]
pub enum Envelope {
    /// Worker signals it finished loading and wiring.
    Ready,

    /// Host asks the worker to shut down cleanly.
    Kill,

    /// Host hands the worker its end of the dedicated communication channel.
    PortHandoff(MessagePort<Envelope>),

    /// Host → worker: deliver this event.
    Observation { event: EventSignature, payload: Value },

    /// Worker → host: this event occurred.
    Publication { event: EventSignature, payload: Value },
}

impl Envelope {
    /// Short discriminator name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Envelope::Ready => "ready",
            Envelope::Kill => "kill",
            Envelope::PortHandoff(_) => "port-handoff",
            Envelope::Observation { .. } => "observation",
            Envelope::Publication { .. } => "publication",
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_kind_names() {
        assert_eq!(Envelope::Ready.kind(), "ready");
        assert_eq!(Envelope::Kill.kind(), "kill");
        assert_eq!(
            Envelope::Observation {
                event: EventSignature::new("X"),
                payload: json!(1),
            }
            .kind(),
            "observation"
        );
    }

    #[test]
    fn test_observation_carries_event_and_payload() {
        let envelope = Envelope::Publication {
            event: EventSignature::new("Y"),
            payload: json!({"n": 2}),
        };
        match envelope {
            Envelope::Publication { event, payload } => {
                assert_eq!(event.name, "Y");
                assert_eq!(payload["n"], 2);
            }
            other => panic!("unexpected envelope: {}", other.kind()),
        }
    }
}
