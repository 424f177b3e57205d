//! Typed inputs that templates consume as plain values.
//!
//! Templates only ever see [`Value`] maps; these types give callers a
//! checked way to build the `messages` and `tools` variables.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::value::{Map, Value};

/// A single chat message in HF-style templates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    /// `{role, content}`
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("role".to_string(), Value::from(self.role.as_str()));
        map.insert("content".to_string(), Value::from(self.content.as_str()));
        Value::Map(map)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaType {
    #[default]
    Object,
    String,
    Number,
    Integer,
    Boolean,
    Array,
}

impl SchemaType {
    pub fn as_str(self) -> &'static str {
        match self {
            SchemaType::Object => "object",
            SchemaType::String => "string",
            SchemaType::Number => "number",
            SchemaType::Integer => "integer",
            SchemaType::Boolean => "boolean",
            SchemaType::Array => "array",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertySchema {
    #[serde(rename = "type")]
    pub kind: SchemaType,
    #[serde(default)]
    pub description: String,
}

impl PropertySchema {
    pub fn new(kind: SchemaType, description: impl Into<String>) -> Self {
        Self {
            kind,
            description: description.into(),
        }
    }
}

/// JSON-schema-like description of a tool's arguments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterSchema {
    #[serde(rename = "type", default)]
    pub kind: SchemaType,
    #[serde(default)]
    pub required: Vec<String>,
    #[serde(default)]
    pub properties: IndexMap<String, PropertySchema>,
}

impl ParameterSchema {
    pub fn property(
        mut self,
        name: impl Into<String>,
        property: PropertySchema,
        required: bool,
    ) -> Self {
        let name = name.into();
        if required {
            self.required.push(name.clone());
        }
        self.properties.insert(name, property);
        self
    }
}

/// A callable tool advertised to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub parameters: ParameterSchema,
}

impl ToolDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: ParameterSchema::default(),
        }
    }

    pub fn with_parameters(mut self, parameters: ParameterSchema) -> Self {
        self.parameters = parameters;
        self
    }

    /// The nested map templates index into: `name`, `description`, then
    /// `parameters` with `type`, `required` and `properties`.
    pub fn to_value(&self) -> Value {
        let properties: Map = self
            .parameters
            .properties
            .iter()
            .map(|(name, property)| {
                let mut entry = Map::new();
                entry.insert("type".to_string(), Value::from(property.kind.as_str()));
                entry.insert(
                    "description".to_string(),
                    Value::from(property.description.as_str()),
                );
                (name.clone(), Value::Map(entry))
            })
            .collect();

        let mut parameters = Map::new();
        parameters.insert(
            "type".to_string(),
            Value::from(self.parameters.kind.as_str()),
        );
        parameters.insert(
            "required".to_string(),
            Value::List(
                self.parameters
                    .required
                    .iter()
                    .map(|name| Value::from(name.as_str()))
                    .collect(),
            ),
        );
        parameters.insert("properties".to_string(), Value::Map(properties));

        let mut tool = Map::new();
        tool.insert("name".to_string(), Value::from(self.name.as_str()));
        tool.insert(
            "description".to_string(),
            Value::from(self.description.as_str()),
        );
        tool.insert("parameters".to_string(), Value::Map(parameters));
        Value::Map(tool)
    }
}

pub fn tools_to_value(tools: &[ToolDescriptor]) -> Value {
    Value::List(tools.iter().map(ToolDescriptor::to_value).collect())
}

/// The tool list as a JSON array.
pub fn tools_to_json(tools: &[ToolDescriptor], pretty: bool) -> serde_json::Result<String> {
    if pretty {
        serde_json::to_string_pretty(tools)
    } else {
        serde_json::to_string(tools)
    }
}
