//! The component contract
//!
//! A component is a unit of logic with a declared signature. It is created
//! once at configuration time, activated once by being handed a mediator
//! connection, and optionally torn down through its `disconnect` hook.

use std::sync::Arc;

use async_trait::async_trait;
use eyre::Result;
use futures::future::BoxFuture;
use serde_json::Value;

use crate::mediator::Mediator;
use crate::signature::ComponentSignature;

/// A unit of logic activated against a mediator connection.
#[async_trait]
pub trait Component: Send + Sync {
    /// The declared observation/publication contract.
    fn signature(&self) -> &ComponentSignature;

    /// Activate the component: register observers and begin publishing.
    /// Called exactly once per component lifetime.
    async fn connect(&self, mediator: Arc<Mediator>) -> Result<()>;

    /// Tear the component down. Remote components map this to the worker
    /// kill procedure; the default is a no-op.
    async fn disconnect(&self) -> Result<()> {
        Ok(())
    }
}

type ConnectFn = dyn Fn(Arc<Mediator>) -> BoxFuture<'static, Result<()>> + Send + Sync;

/// A local component built from a closure.
///
/// The closure receives the mediator connection and does its own observing
/// and publishing. Useful for small in-process components and tests.
pub struct FnComponent {
    signature: ComponentSignature,
    connect_fn: Box<ConnectFn>,
}

impl FnComponent {
    pub fn new<F, Fut>(signature: ComponentSignature, connect_fn: F) -> Self
    where
        F: Fn(Arc<Mediator>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<()>> + Send + 'static,
    {
        Self {
            signature,
            connect_fn: Box::new(move |mediator| Box::pin(connect_fn(mediator))),
        }
    }
}

#[async_trait]
impl Component for FnComponent {
    fn signature(&self) -> &ComponentSignature {
        &self.signature
    }

    async fn connect(&self, mediator: Arc<Mediator>) -> Result<()> {
        (self.connect_fn)(mediator).await
    }
}

/// Payload type carried by every event. Observers receive their own copy,
/// never a shared reference.
pub type Payload = Value;
