//! Event mediation: the pub/sub router and the component container

mod container;
mod core;

pub use container::MediatorContainer;
pub use core::{EventWaiter, Mediator};
