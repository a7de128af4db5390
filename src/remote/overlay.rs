//! Function-wrapping overlay
//!
//! Translates a plain (optionally callback-accepting) function into the
//! Request/Response/Exception event triad. Every request carries a
//! caller-chosen `_eventId`; exactly one completion event is emitted per
//! request with the same id, so concurrent in-flight calls never
//! cross-correlate.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::{OnceCell, oneshot};
use tracing::{debug, warn};

use super::config::{ModuleSpec, PlainFunctionConfig};
use super::registry::{ModuleRegistry, PlainArg, PlainFunction};
use super::runtime::PublicationEmitter;

/// Reserved sentinel marking the parameter position where the runtime
/// splices in a generated completion callback before invoking the function.
pub const COMPLETION_CALLBACK_SENTINEL: &str = "__EMISSARY_COMPLETION_CALLBACK__";

#[derive(Debug, Deserialize)]
struct RequestPayload {
    #[serde(rename = "_eventId")]
    event_id: String,
    #[serde(default)]
    params: Vec<Value>,
}

/// Serve one request event: resolve the function (lazily unless preloaded),
/// invoke it with the spliced callback, and emit exactly one completion
/// event.
pub(crate) async fn run_request(
    config: PlainFunctionConfig,
    function: Arc<OnceCell<PlainFunction>>,
    spec: ModuleSpec,
    registry: Arc<ModuleRegistry>,
    payload: Value,
    emitter: PublicationEmitter,
) {
    // Malformed requests are contained here: logged and dropped, never a
    // worker crash and never a mediator-visible failure.
    let request: RequestPayload = match serde_json::from_value(payload) {
        Ok(request) => request,
        Err(err) => {
            warn!(event = %config.events.request.name, error = %err, "malformed request payload");
            return;
        }
    };
    let event_id = request.event_id;
    debug!(%event_id, "overlay request received");

    let function = match function
        .get_or_try_init(|| async { registry.resolve_function(&spec) })
        .await
    {
        Ok(function) => function.clone(),
        Err(err) => {
            let error = json!({ "message": err.to_string() });
            publish_exception(&config, &emitter, &event_id, error).await;
            return;
        }
    };

    let (callback_tx, callback_rx) = oneshot::channel::<Result<Value, Value>>();
    let mut callback_tx = Some(callback_tx);
    let mut args = Vec::with_capacity(request.params.len());
    for param in request.params {
        // Only the first sentinel gets the callback; the completion channel
        // is single-use.
        if param.as_str() == Some(COMPLETION_CALLBACK_SENTINEL)
            && let Some(tx) = callback_tx.take()
        {
            args.push(PlainArg::Callback(Box::new(move |outcome| {
                // Receiver gone means the call already completed another
                // way; the late callback is ignored.
                let _ = tx.send(outcome);
            })));
        } else {
            args.push(PlainArg::Value(param));
        }
    }
    let has_callback = callback_tx.is_none();

    let invocation = async {
        // The inner spawn contains panics: a panicking function is reported
        // as an exception event instead of taking the worker down.
        let returned = match tokio::spawn(function(args)).await {
            Ok(returned) => returned,
            Err(join_err) => {
                return Err(json!({ "message": format!("function panicked: {join_err}") }));
            }
        };

        match (returned, has_callback) {
            (Err(error), _) => Err(error),
            (Ok(result), false) => Ok(result),
            (Ok(_), true) => callback_rx.await.unwrap_or_else(|_| {
                Err(json!({ "message": "completion callback dropped without being called" }))
            }),
        }
    };

    let outcome = match config.call_timeout() {
        Some(deadline) => match tokio::time::timeout(deadline, invocation).await {
            Ok(outcome) => outcome,
            Err(_) => Err(json!({
                "message": format!("function call timed out after {deadline:?}")
            })),
        },
        None => invocation.await,
    };

    match outcome {
        Ok(result) => {
            debug!(%event_id, "overlay request completed");
            emitter
                .publish(
                    &config.events.response,
                    json!({ "_eventId": event_id, "result": result }),
                )
                .await;
        }
        Err(error) => {
            debug!(%event_id, "overlay request failed");
            publish_exception(&config, &emitter, &event_id, error).await;
        }
    }
}

async fn publish_exception(
    config: &PlainFunctionConfig,
    emitter: &PublicationEmitter,
    event_id: &str,
    error: Value,
) {
    emitter
        .publish(
            &config.events.exception,
            json!({ "_eventId": event_id, "error": error }),
        )
        .await;
}

#[cfg(test)]
mod tests {
    use futures::future::BoxFuture;

    use super::*;
    use crate::channel::{PortReceiver, port_pair};
    use crate::remote::envelope::Envelope;
    use crate::signature::EventSignature;

    fn triad() -> PlainFunctionConfig {
        PlainFunctionConfig::new(super::super::config::PlainFunctionEvents {
            request: EventSignature::new("RequestEvent"),
            response: EventSignature::new("ResponseEvent"),
            exception: EventSignature::new("ExceptionEvent"),
        })
    }

    fn registry_with(
        member: &str,
        function: impl Fn(Vec<PlainArg>) -> BoxFuture<'static, Result<Value, Value>>
        + Send
        + Sync
        + 'static,
    ) -> (Arc<ModuleRegistry>, ModuleSpec) {
        let registry = ModuleRegistry::new();
        registry.register_function("functions", member, function);
        (Arc::new(registry), ModuleSpec::new("functions", member))
    }

    fn harness() -> (PublicationEmitter, PortReceiver<Envelope>) {
        let (host, worker) = port_pair::<Envelope>(16);
        let (_host_tx, host_rx) = host.split();
        let (worker_tx, _worker_rx) = worker.split();
        (PublicationEmitter::new(worker_tx), host_rx)
    }

    async fn next_publication(rx: &mut PortReceiver<Envelope>) -> (String, Value) {
        match rx.recv().await.expect("expected a publication") {
            Envelope::Publication { event, payload } => (event.name, payload),
            other => panic!("unexpected envelope: {}", other.kind()),
        }
    }

    #[tokio::test]
    async fn test_callback_completion_becomes_response() {
        let (registry, spec) = registry_with("aws_like", |args| {
            Box::pin(async move {
                let mut args = args.into_iter();
                let first = args.next().unwrap().into_value().unwrap();
                let _second = args.next().unwrap().into_value().unwrap();
                let callback = args.next().unwrap().into_callback().unwrap();
                callback(Ok(json!({ "statusCode": 999, "body": first })));
                Ok(Value::Null)
            })
        });
        let (emitter, mut rx) = harness();

        run_request(
            triad(),
            Arc::new(OnceCell::new()),
            spec,
            registry,
            json!({
                "_eventId": "foobar",
                "params": [{"foo": 1}, {}, COMPLETION_CALLBACK_SENTINEL],
            }),
            emitter,
        )
        .await;

        let (event, payload) = next_publication(&mut rx).await;
        assert_eq!(event, "ResponseEvent");
        assert_eq!(payload["_eventId"], "foobar");
        assert_eq!(payload["result"], json!({ "statusCode": 999, "body": {"foo": 1} }));
    }

    #[tokio::test]
    async fn test_error_first_callback_becomes_exception() {
        let (registry, spec) = registry_with("failing_cb", |args| {
            Box::pin(async move {
                let callback = args
                    .into_iter()
                    .find_map(PlainArg::into_callback)
                    .expect("callback slot");
                callback(Err(json!("boom")));
                Ok(Value::Null)
            })
        });
        let (emitter, mut rx) = harness();

        run_request(
            triad(),
            Arc::new(OnceCell::new()),
            spec,
            registry,
            json!({ "_eventId": "e1", "params": [COMPLETION_CALLBACK_SENTINEL] }),
            emitter,
        )
        .await;

        let (event, payload) = next_publication(&mut rx).await;
        assert_eq!(event, "ExceptionEvent");
        assert_eq!(payload["_eventId"], "e1");
        assert_eq!(payload["error"], json!("boom"));
    }

    #[tokio::test]
    async fn test_returned_value_completes_without_callback() {
        let (registry, spec) = registry_with("sync_like", |args| {
            Box::pin(async move {
                let n = args
                    .into_iter()
                    .next()
                    .and_then(PlainArg::into_value)
                    .and_then(|v| v.as_i64())
                    .unwrap_or(0);
                Ok(json!(n + 1))
            })
        });
        let (emitter, mut rx) = harness();

        run_request(
            triad(),
            Arc::new(OnceCell::new()),
            spec,
            registry,
            json!({ "_eventId": "e2", "params": [41] }),
            emitter,
        )
        .await;

        let (event, payload) = next_publication(&mut rx).await;
        assert_eq!(event, "ResponseEvent");
        assert_eq!(payload["result"], json!(42));
    }

    #[tokio::test]
    async fn test_returned_error_becomes_exception() {
        let (registry, spec) = registry_with("rejecting", |_| {
            Box::pin(async { Err(json!({ "code": "EBAD" })) })
        });
        let (emitter, mut rx) = harness();

        run_request(
            triad(),
            Arc::new(OnceCell::new()),
            spec,
            registry,
            json!({ "_eventId": "e3", "params": [] }),
            emitter,
        )
        .await;

        let (event, payload) = next_publication(&mut rx).await;
        assert_eq!(event, "ExceptionEvent");
        assert_eq!(payload["error"]["code"], "EBAD");
    }

    #[tokio::test]
    async fn test_panicking_function_becomes_exception() {
        let (registry, spec) = registry_with("panics", |_| {
            Box::pin(async { panic!("deliberate test panic") })
        });
        let (emitter, mut rx) = harness();

        run_request(
            triad(),
            Arc::new(OnceCell::new()),
            spec,
            registry,
            json!({ "_eventId": "e4", "params": [] }),
            emitter,
        )
        .await;

        let (event, payload) = next_publication(&mut rx).await;
        assert_eq!(event, "ExceptionEvent");
        assert_eq!(payload["_eventId"], "e4");
    }

    #[tokio::test]
    async fn test_malformed_payload_is_dropped() {
        let (registry, spec) = registry_with("unused", |_| Box::pin(async { Ok(Value::Null) }));
        let (emitter, mut rx) = harness();

        run_request(
            triad(),
            Arc::new(OnceCell::new()),
            spec,
            registry,
            json!({ "params": [] }),
            emitter,
        )
        .await;

        // Dropping the emitter closes the channel, so recv() returning None
        // proves nothing was published.
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_unregistered_function_yields_exception() {
        let (emitter, mut rx) = harness();

        run_request(
            triad(),
            Arc::new(OnceCell::new()),
            ModuleSpec::new("functions", "missing"),
            Arc::new(ModuleRegistry::new()),
            json!({ "_eventId": "e5", "params": [] }),
            emitter,
        )
        .await;

        let (event, payload) = next_publication(&mut rx).await;
        assert_eq!(event, "ExceptionEvent");
        assert!(payload["error"]["message"].as_str().unwrap().contains("not registered"));
    }

    #[tokio::test]
    async fn test_call_timeout_yields_exception() {
        let (registry, spec) = registry_with("hangs", |_| {
            Box::pin(async {
                tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
                Ok(Value::Null)
            })
        });
        let mut config = triad();
        config.call_timeout_ms = Some(20);
        let (emitter, mut rx) = harness();

        run_request(
            config,
            Arc::new(OnceCell::new()),
            spec,
            registry,
            json!({ "_eventId": "e6", "params": [] }),
            emitter,
        )
        .await;

        let (event, payload) = next_publication(&mut rx).await;
        assert_eq!(event, "ExceptionEvent");
        assert!(payload["error"]["message"].as_str().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_concurrent_requests_keep_their_ids() {
        let (registry, spec) = registry_with("tiered_sleep", |args| {
            Box::pin(async move {
                let delay_ms = args
                    .into_iter()
                    .next()
                    .and_then(PlainArg::into_value)
                    .and_then(|v| v.as_u64())
                    .unwrap_or(0);
                tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
                Ok(json!(delay_ms))
            })
        });
        let (emitter, mut rx) = harness();

        let function = Arc::new(OnceCell::new());
        let mut requests = tokio::task::JoinSet::new();
        for i in 0..5u64 {
            // Later requests finish earlier.
            let delay = (5 - i) * 20;
            requests.spawn(run_request(
                triad(),
                function.clone(),
                spec.clone(),
                registry.clone(),
                json!({ "_eventId": format!("req-{i}"), "params": [delay] }),
                emitter.clone(),
            ));
        }
        drop(emitter);
        while requests.join_next().await.is_some() {}

        let mut seen = std::collections::HashMap::new();
        while let Some(envelope) = rx.recv().await {
            let Envelope::Publication { event, payload } = envelope else {
                panic!("unexpected envelope");
            };
            assert_eq!(event.name, "ResponseEvent");
            let id = payload["_eventId"].as_str().unwrap().to_string();
            seen.insert(id, payload["result"].as_u64().unwrap());
        }

        assert_eq!(seen.len(), 5);
        for i in 0..5u64 {
            assert_eq!(seen[&format!("req-{i}")], (5 - i) * 20);
        }
    }
}
