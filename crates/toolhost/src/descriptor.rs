//! Capability descriptors: name, kind, parameter schema, and URI template.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::types::{CapabilityKind, HostError, HostResult};
use crate::uri_template::UriTemplate;

/// Declared type of a single parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
    Any,
}

impl ParamType {
    /// JSON Schema `type` keyword, if the type constrains one.
    pub fn schema_name(&self) -> Option<&'static str> {
        match self {
            ParamType::String => Some("string"),
            ParamType::Integer => Some("integer"),
            ParamType::Number => Some("number"),
            ParamType::Boolean => Some("boolean"),
            ParamType::Array => Some("array"),
            ParamType::Object => Some("object"),
            ParamType::Any => None,
        }
    }

    pub fn from_schema_name(name: &str) -> Self {
        match name {
            "string" => ParamType::String,
            "integer" => ParamType::Integer,
            "number" => ParamType::Number,
            "boolean" => ParamType::Boolean,
            "array" => ParamType::Array,
            "object" => ParamType::Object,
            _ => ParamType::Any,
        }
    }
}

/// One entry of a capability's ordered parameter schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ParamType,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ParamSpec {
    pub fn required(name: impl Into<String>, param_type: ParamType) -> Self {
        Self {
            name: name.into(),
            param_type,
            required: true,
            default: None,
            description: None,
        }
    }

    pub fn optional(name: impl Into<String>, param_type: ParamType) -> Self {
        Self {
            name: name.into(),
            param_type,
            required: false,
            default: None,
            description: None,
        }
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.required = false;
        self.default = Some(default);
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Immutable description of a registered capability.
#[derive(Debug, Clone, PartialEq)]
pub struct CapabilityDescriptor {
    pub name: String,
    pub kind: CapabilityKind,
    pub params: Vec<ParamSpec>,
    pub uri_template: Option<UriTemplate>,
    pub description: String,
    pub mime_type: Option<String>,
}

impl CapabilityDescriptor {
    pub fn tool(name: impl Into<String>) -> DescriptorBuilder {
        DescriptorBuilder::new(CapabilityKind::Tool, name)
    }

    pub fn prompt(name: impl Into<String>) -> DescriptorBuilder {
        DescriptorBuilder::new(CapabilityKind::Prompt, name)
    }

    /// Start a resource descriptor addressed by `uri_template`.
    pub fn resource(name: impl Into<String>, uri_template: &str) -> DescriptorBuilder {
        let mut builder = DescriptorBuilder::new(CapabilityKind::Resource, name);
        builder.uri_template = Some(uri_template.to_string());
        builder
    }

    pub fn param(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Render the parameter schema as a JSON Schema object.
    pub fn input_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();

        for param in &self.params {
            let mut prop = Map::new();
            if let Some(ty) = param.param_type.schema_name() {
                prop.insert("type".to_string(), json!(ty));
            }
            if let Some(desc) = &param.description {
                prop.insert("description".to_string(), json!(desc));
            }
            if let Some(default) = &param.default {
                prop.insert("default".to_string(), default.clone());
            }
            properties.insert(param.name.clone(), Value::Object(prop));
            if param.required {
                required.push(json!(param.name));
            }
        }

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// Parse the parameter list back out of a JSON Schema object.
    ///
    /// `properties` key order is kept when serde_json preserves it; otherwise
    /// required parameters come first, in the order of the `required` array.
    pub fn params_from_schema(schema: &Value) -> Vec<ParamSpec> {
        let required: Vec<&str> = schema
            .get("required")
            .and_then(Value::as_array)
            .map(|r| r.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
            return required
                .iter()
                .map(|name| ParamSpec::required(*name, ParamType::Any))
                .collect();
        };

        let mut params: Vec<ParamSpec> = properties
            .iter()
            .map(|(name, prop)| {
                let param_type = prop
                    .get("type")
                    .and_then(Value::as_str)
                    .map(ParamType::from_schema_name)
                    .unwrap_or(ParamType::Any);
                ParamSpec {
                    name: name.clone(),
                    param_type,
                    required: required.contains(&name.as_str()),
                    default: prop.get("default").cloned(),
                    description: prop
                        .get("description")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                }
            })
            .collect();

        params.sort_by_key(|p| {
            required
                .iter()
                .position(|r| *r == p.name)
                .unwrap_or(usize::MAX)
        });
        params
    }

    /// Compact JSON view used in handshake catalogs and CLI output.
    pub fn to_json(&self) -> Value {
        let mut value = json!({
            "name": self.name,
            "kind": self.kind,
            "description": self.description,
            "params": self.params,
        });
        if let Some(t) = &self.uri_template {
            value["uriTemplate"] = json!(t.as_str());
        }
        if let Some(m) = &self.mime_type {
            value["mimeType"] = json!(m);
        }
        value
    }
}

/// Builder for [`CapabilityDescriptor`].
#[derive(Debug, Clone)]
pub struct DescriptorBuilder {
    kind: CapabilityKind,
    name: String,
    params: Vec<ParamSpec>,
    uri_template: Option<String>,
    description: String,
    mime_type: Option<String>,
}

impl DescriptorBuilder {
    fn new(kind: CapabilityKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            params: Vec::new(),
            uri_template: None,
            description: String::new(),
            mime_type: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    pub fn param(mut self, param: ParamSpec) -> Self {
        self.params.push(param);
        self
    }

    pub fn required(self, name: &str, param_type: ParamType) -> Self {
        self.param(ParamSpec::required(name, param_type))
    }

    pub fn optional(self, name: &str, param_type: ParamType) -> Self {
        self.param(ParamSpec::optional(name, param_type))
    }

    pub fn with_default(self, name: &str, param_type: ParamType, default: Value) -> Self {
        self.param(ParamSpec::optional(name, param_type).with_default(default))
    }

    /// Validate and produce the descriptor.
    pub fn build(self) -> HostResult<CapabilityDescriptor> {
        if self.name.trim().is_empty() {
            return Err(HostError::InvalidDescriptor(
                "capability name must not be empty".to_string(),
            ));
        }

        for (i, param) in self.params.iter().enumerate() {
            if self.params[..i].iter().any(|p| p.name == param.name) {
                return Err(HostError::InvalidDescriptor(format!(
                    "{} '{}' declares parameter '{}' twice",
                    self.kind, self.name, param.name
                )));
            }
        }

        let uri_template = match (self.kind, self.uri_template) {
            (CapabilityKind::Resource, Some(t)) => Some(UriTemplate::parse(&t)?),
            (CapabilityKind::Resource, None) => {
                return Err(HostError::InvalidDescriptor(format!(
                    "resource '{}' needs a URI template",
                    self.name
                )))
            }
            (kind, Some(_)) => {
                return Err(HostError::InvalidDescriptor(format!(
                    "{kind} '{}' cannot carry a URI template",
                    self.name
                )))
            }
            (_, None) => None,
        };

        let mut params = self.params;
        if let Some(template) = &uri_template {
            // Template variables always arrive as strings extracted from the URI.
            for var in template.variables() {
                if !params.iter().any(|p| p.name == var) {
                    params.push(ParamSpec::required(var, ParamType::String));
                }
            }
        }

        Ok(CapabilityDescriptor {
            name: self.name,
            kind: self.kind,
            params,
            uri_template,
            description: self.description,
            mime_type: self.mime_type,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_schema_roundtrip() {
        let desc = CapabilityDescriptor::tool("get_forecast")
            .description("Forecast")
            .required("location", ParamType::String)
            .with_default("days", ParamType::Integer, json!(3))
            .build()
            .unwrap();

        let schema = desc.input_schema();
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["required"], json!(["location"]));
        assert_eq!(schema["properties"]["days"]["default"], 3);

        let params = CapabilityDescriptor::params_from_schema(&schema);
        assert_eq!(params.len(), 2);
        assert_eq!(params[0].name, "location");
        assert!(params[0].required);
        let days = params.iter().find(|p| p.name == "days").unwrap();
        assert_eq!(days.param_type, ParamType::Integer);
        assert_eq!(days.default, Some(json!(3)));
        assert!(!days.required);
    }

    #[test]
    fn test_resource_params_derived_from_template() {
        let desc = CapabilityDescriptor::resource("weather", "weather://{location}")
            .build()
            .unwrap();
        assert_eq!(desc.kind, CapabilityKind::Resource);
        let p = desc.param("location").unwrap();
        assert!(p.required);
        assert_eq!(p.param_type, ParamType::String);
    }

    #[test]
    fn test_resource_requires_template() {
        let builder = DescriptorBuilder::new(CapabilityKind::Resource, "r");
        assert!(matches!(builder.build(), Err(HostError::InvalidDescriptor(_))));
    }

    #[test]
    fn test_duplicate_param_rejected() {
        let result = CapabilityDescriptor::tool("t")
            .required("a", ParamType::String)
            .optional("a", ParamType::Integer)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_name_rejected() {
        assert!(CapabilityDescriptor::prompt("  ").build().is_err());
    }
}
