//! Echo: the smallest useful tool and resource.

use serde_json::json;

use toolhost::{handler_fn, CapabilityDescriptor, CapabilityRegistry, HostResult, ParamSpec, ParamType};

pub const TOOL_NAME: &str = "echo";
pub const RESOURCE_NAME: &str = "echo";
pub const RESOURCE_TEMPLATE: &str = "echo://{text}";

pub fn register(registry: &mut CapabilityRegistry) -> HostResult<()> {
    let tool = CapabilityDescriptor::tool(TOOL_NAME)
        .description("Return the given text unchanged")
        .param(ParamSpec::required("text", ParamType::String).describe("Text to echo back"))
        .build()?;
    registry.register(
        tool,
        handler_fn(|args| async move {
            let text = args.str("text")?;
            Ok(json!({ "text": text }))
        }),
    )?;

    let resource = CapabilityDescriptor::resource(RESOURCE_NAME, RESOURCE_TEMPLATE)
        .description("The text segment of the URI, as plain text")
        .mime_type("text/plain")
        .build()?;
    registry.register(
        resource,
        handler_fn(|args| async move { Ok(json!(args.str("text")?)) }),
    )?;

    Ok(())
}
