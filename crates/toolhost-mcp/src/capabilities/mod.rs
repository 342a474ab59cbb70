//! Capabilities bundled with the `toolhost` binary.

pub mod echo;
pub mod weather;

use std::sync::Arc;

use toolhost::{CapabilityRegistry, HostResult};

pub use weather::WeatherSource;

/// Build the registry the server runs with. Called once at startup; the
/// result is frozen behind an `Arc` by the caller.
pub fn build_registry(weather: Option<Arc<dyn WeatherSource>>) -> HostResult<CapabilityRegistry> {
    let mut registry = CapabilityRegistry::new();
    echo::register(&mut registry)?;
    weather::register(&mut registry, weather)?;

    tracing::debug!("Registered capabilities: {registry:?}");
    Ok(registry)
}
