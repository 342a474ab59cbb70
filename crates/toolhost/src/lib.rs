//! toolhost — capability descriptors, registry, and invocation dispatch.
//!
//! Transport-agnostic core shared by the protocol server and the client:
//! register tools, resources, and prompts once at startup, freeze the
//! registry behind an `Arc`, and dispatch invocations through a
//! [`Dispatcher`] that validates arguments and contains handler faults.

pub mod descriptor;
pub mod dispatch;
pub mod handler;
pub mod registry;
pub mod types;
pub mod uri_template;
pub mod validate;

pub use descriptor::{CapabilityDescriptor, DescriptorBuilder, ParamSpec, ParamType};
pub use dispatch::Dispatcher;
pub use handler::{handler_fn, Arguments, CapabilityHandler, SharedHandler};
pub use registry::CapabilityRegistry;
pub use types::*;
pub use uri_template::UriTemplate;
pub use validate::validate_arguments;
