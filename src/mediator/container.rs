//! Component container: lifecycle management over a set of components
//!
//! The container owns the mediator and the configured components. `connect`
//! activates every component (awaiting full readiness of each, including
//! remote handshakes) and `disconnect` tears them all down again.

use std::sync::Arc;

use eyre::{Result, WrapErr};
use tracing::{debug, info, warn};

use super::core::Mediator;
use crate::component::Component;

/// Owns a mediator and the components wired to it.
pub struct MediatorContainer {
    mediator: Arc<Mediator>,
    components: Vec<Arc<dyn Component>>,
    connected: bool,
}

impl Default for MediatorContainer {
    fn default() -> Self {
        Self::new()
    }
}

impl MediatorContainer {
    pub fn new() -> Self {
        Self {
            mediator: Arc::new(Mediator::new()),
            components: Vec::new(),
            connected: false,
        }
    }

    /// Add a component. Must be called before `connect`.
    pub fn add(&mut self, component: impl Component + 'static) -> &mut Self {
        self.add_arc(Arc::new(component))
    }

    /// Add an already-shared component.
    pub fn add_arc(&mut self, component: Arc<dyn Component>) -> &mut Self {
        debug!(component = %component.signature().name, "MediatorContainer::add");
        self.components.push(component);
        self
    }

    /// The mediator this container routes through.
    pub fn mediator(&self) -> Arc<Mediator> {
        self.mediator.clone()
    }

    /// Activate all components in insertion order, awaiting readiness of
    /// each. Fails fast on the first component that cannot come up.
    pub async fn connect(&mut self) -> Result<Arc<Mediator>> {
        if self.connected {
            eyre::bail!("container is already connected");
        }

        for component in &self.components {
            let name = component.signature().name.clone();
            debug!(component = %name, "MediatorContainer::connect: activating");
            component
                .connect(self.mediator.clone())
                .await
                .wrap_err_with(|| format!("failed to connect component '{name}'"))?;
        }

        self.connected = true;
        info!(components = self.components.len(), "container connected");
        Ok(self.mediator.clone())
    }

    /// Tear down all components, invoking each `disconnect` hook. Teardown
    /// failures are logged, not propagated, so one misbehaving component
    /// cannot block the rest.
    pub async fn disconnect(&mut self) {
        for component in &self.components {
            let name = &component.signature().name;
            debug!(component = %name, "MediatorContainer::disconnect");
            if let Err(err) = component.disconnect().await {
                warn!(component = %name, error = %err, "component disconnect failed");
            }
        }
        self.connected = false;
        info!("container disconnected");
    }
}
