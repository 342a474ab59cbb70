//! Conversions between registry descriptors / dispatcher payloads and the
//! MCP wire shapes.

use serde_json::Value;
use toolhost::{CapabilityDescriptor, CapabilityKind, CapabilityRegistry, ParamSpec, ParamType};

use crate::types::*;

const TEXT_PLAIN: &str = "text/plain";
const APPLICATION_JSON: &str = "application/json";

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}

pub fn tool_definition(descriptor: &CapabilityDescriptor) -> ToolDefinition {
    ToolDefinition {
        name: descriptor.name.clone(),
        description: non_empty(&descriptor.description),
        input_schema: descriptor.input_schema(),
    }
}

/// Resources whose template has no variables are listed as concrete resources.
pub fn resource_definition(descriptor: &CapabilityDescriptor) -> Option<ResourceDefinition> {
    let template = descriptor.uri_template.as_ref().filter(|t| t.is_static())?;
    Some(ResourceDefinition {
        uri: template.as_str().to_string(),
        name: descriptor.name.clone(),
        description: non_empty(&descriptor.description),
        mime_type: descriptor.mime_type.clone(),
    })
}

pub fn resource_template_definition(
    descriptor: &CapabilityDescriptor,
) -> Option<ResourceTemplateDefinition> {
    let template = descriptor.uri_template.as_ref().filter(|t| !t.is_static())?;
    Some(ResourceTemplateDefinition {
        uri_template: template.as_str().to_string(),
        name: descriptor.name.clone(),
        description: non_empty(&descriptor.description),
        mime_type: descriptor.mime_type.clone(),
    })
}

pub fn prompt_definition(descriptor: &CapabilityDescriptor) -> PromptDefinition {
    let arguments: Vec<PromptArgument> = descriptor
        .params
        .iter()
        .map(|p| PromptArgument {
            name: p.name.clone(),
            description: p.description.clone(),
            required: p.required,
        })
        .collect();
    PromptDefinition {
        name: descriptor.name.clone(),
        description: non_empty(&descriptor.description),
        arguments: (!arguments.is_empty()).then_some(arguments),
    }
}

/// Full advertisement for the handshake, in registration order per kind.
pub fn catalog(registry: &CapabilityRegistry) -> Catalog {
    Catalog {
        tools: registry.list(CapabilityKind::Tool).map(tool_definition).collect(),
        resources: registry
            .list(CapabilityKind::Resource)
            .filter_map(resource_definition)
            .collect(),
        resource_templates: registry
            .list(CapabilityKind::Resource)
            .filter_map(resource_template_definition)
            .collect(),
        prompts: registry
            .list(CapabilityKind::Prompt)
            .map(prompt_definition)
            .collect(),
    }
}

/// Wrap a resource payload: strings are served as text, anything else as JSON.
pub fn read_result(uri: &str, mime_type: Option<String>, payload: Value) -> ReadResourceResult {
    let (text, default_mime) = match payload {
        Value::String(s) => (s, TEXT_PLAIN),
        other => (
            serde_json::to_string_pretty(&other).unwrap_or_else(|e| e.to_string()),
            APPLICATION_JSON,
        ),
    };
    ReadResourceResult {
        contents: vec![ResourceContent {
            uri: uri.to_string(),
            mime_type: Some(mime_type.unwrap_or_else(|| default_mime.to_string())),
            text: Some(text),
            blob: None,
        }],
    }
}

/// Wrap a prompt payload.
///
/// A string becomes a single user message; a ready-made `{messages}` object
/// or a bare message array is passed through; anything else is rendered as
/// JSON text.
pub fn prompt_result(description: Option<String>, payload: Value) -> PromptGetResult {
    let user_text = |text: String| PromptMessage {
        role: "user".to_string(),
        content: ToolContent::Text { text },
    };

    match payload {
        Value::String(text) => PromptGetResult {
            description,
            messages: vec![user_text(text)],
        },
        Value::Object(ref map) if map.contains_key("messages") => {
            match serde_json::from_value::<PromptGetResult>(payload.clone()) {
                Ok(mut result) => {
                    if result.description.is_none() {
                        result.description = description;
                    }
                    result
                }
                Err(_) => PromptGetResult {
                    description,
                    messages: vec![user_text(payload.to_string())],
                },
            }
        }
        Value::Array(_) => match serde_json::from_value::<Vec<PromptMessage>>(payload.clone()) {
            Ok(messages) => PromptGetResult {
                description,
                messages,
            },
            Err(_) => PromptGetResult {
                description,
                messages: vec![user_text(payload.to_string())],
            },
        },
        other => PromptGetResult {
            description,
            messages: vec![user_text(
                serde_json::to_string_pretty(&other).unwrap_or_else(|e| e.to_string()),
            )],
        },
    }
}

// Client side: rebuild registry-style descriptors from what the server listed.

pub fn descriptor_from_tool(def: &ToolDefinition) -> McpResult<CapabilityDescriptor> {
    let mut builder = CapabilityDescriptor::tool(&def.name);
    if let Some(desc) = &def.description {
        builder = builder.description(desc);
    }
    for param in CapabilityDescriptor::params_from_schema(&def.input_schema) {
        builder = builder.param(param);
    }
    Ok(builder.build()?)
}

pub fn descriptor_from_resource(def: &ResourceDefinition) -> McpResult<CapabilityDescriptor> {
    resource_descriptor(&def.name, &def.uri, &def.description, &def.mime_type)
}

pub fn descriptor_from_template(
    def: &ResourceTemplateDefinition,
) -> McpResult<CapabilityDescriptor> {
    resource_descriptor(&def.name, &def.uri_template, &def.description, &def.mime_type)
}

fn resource_descriptor(
    name: &str,
    template: &str,
    description: &Option<String>,
    mime_type: &Option<String>,
) -> McpResult<CapabilityDescriptor> {
    let mut builder = CapabilityDescriptor::resource(name, template);
    if let Some(desc) = description {
        builder = builder.description(desc);
    }
    if let Some(mime) = mime_type {
        builder = builder.mime_type(mime);
    }
    Ok(builder.build()?)
}

/// Prompt arguments travel as strings on the wire.
pub fn descriptor_from_prompt(def: &PromptDefinition) -> McpResult<CapabilityDescriptor> {
    let mut builder = CapabilityDescriptor::prompt(&def.name);
    if let Some(desc) = &def.description {
        builder = builder.description(desc);
    }
    for arg in def.arguments.iter().flatten() {
        let mut spec = if arg.required {
            ParamSpec::required(&arg.name, ParamType::String)
        } else {
            ParamSpec::optional(&arg.name, ParamType::String)
        };
        if let Some(desc) = &arg.description {
            spec = spec.describe(desc);
        }
        builder = builder.param(spec);
    }
    Ok(builder.build()?)
}

impl Catalog {
    /// Descriptors of one kind, in advertised order.
    pub fn descriptors(&self, kind: CapabilityKind) -> McpResult<Vec<CapabilityDescriptor>> {
        match kind {
            CapabilityKind::Tool => self.tools.iter().map(descriptor_from_tool).collect(),
            CapabilityKind::Resource => self
                .resources
                .iter()
                .map(descriptor_from_resource)
                .chain(self.resource_templates.iter().map(descriptor_from_template))
                .collect(),
            CapabilityKind::Prompt => self.prompts.iter().map(descriptor_from_prompt).collect(),
        }
    }
}
