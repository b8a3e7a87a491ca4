//! Declarative tool definitions.
//!
//! A tool is an HTTP action a bot can invoke. Parameter metadata drives both
//! the classifier catalog and the request synthesizer, so declaration order
//! of path parameters is preserved (path position is semantically meaningful).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Scalar parameter value. Untyped model output is coerced into this union
/// and only stringified at the URL-encoding boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Number(f64),
    String(String),
}

impl ParamValue {
    /// Accept only scalar JSON; arrays, objects and null are rejected.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(ParamValue::String(s.clone())),
            Value::Number(n) => n.as_f64().map(ParamValue::Number),
            Value::Bool(b) => Some(ParamValue::Bool(*b)),
            _ => None,
        }
    }

    /// Text form used for URL encoding. Whole numbers render without a
    /// trailing `.0`.
    pub fn to_text(&self) -> String {
        match self {
            ParamValue::String(s) => s.clone(),
            ParamValue::Bool(b) => b.to_string(),
            ParamValue::Number(n) => {
                if n.fract() == 0.0 && n.is_finite() && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    n.to_string()
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    #[default]
    String,
    Number,
    Boolean,
}

impl ParamKind {
    pub fn json_type(&self) -> &'static str {
        match self {
            ParamKind::String => "string",
            ParamKind::Number => "number",
            ParamKind::Boolean => "boolean",
        }
    }
}

/// Where a resolved parameter lands in the synthesized request. `Body` is
/// declared but reserved; it does not affect URL construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ParamLocation {
    Path,
    #[default]
    Query,
    Body,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterSpec {
    pub name: String,
    #[serde(default, rename = "type")]
    pub kind: ParamKind,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<ParamValue>,
    #[serde(default, rename = "in")]
    pub location: ParamLocation,
    /// Wire name override for query parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map_to: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn as_method(&self) -> reqwest::Method {
        match self {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Delete => reqwest::Method::DELETE,
        }
    }
}

/// Declared tool kinds. Only `Http` is executable; the others are reported
/// as unsupported rather than crashing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ToolKind {
    #[default]
    Http,
    Database,
    LocalFunction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ApiKeyLocation {
    #[default]
    Header,
    Query,
}

/// Authentication attached to a synthesized request. Credentials are never
/// logged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum AuthDescriptor {
    #[default]
    None,
    Basic {
        username: String,
        password: String,
    },
    Bearer {
        token: String,
    },
    ApiKey {
        key: String,
        /// Header name or query key, depending on `location`.
        name: String,
        #[serde(default)]
        location: ApiKeyLocation,
    },
}

impl AuthDescriptor {
    /// Credentials must be present when the type is not `none`.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            AuthDescriptor::None => Ok(()),
            AuthDescriptor::Basic { username, password } => {
                if username.is_empty() || password.is_empty() {
                    Err("basic auth requires username and password".to_string())
                } else {
                    Ok(())
                }
            }
            AuthDescriptor::Bearer { token } => {
                if token.is_empty() {
                    Err("bearer auth requires a token".to_string())
                } else {
                    Ok(())
                }
            }
            AuthDescriptor::ApiKey { key, name, .. } => {
                if key.is_empty() || name.is_empty() {
                    Err("apiKey auth requires key and name".to_string())
                } else {
                    Ok(())
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    pub id: String,
    pub bot_id: String,
    pub name: String,
    pub description: String,
    /// Declaration order drives path segment order.
    pub parameters: Vec<ParameterSpec>,
    pub endpoint: String,
    #[serde(default)]
    pub method: HttpMethod,
    #[serde(default)]
    pub kind: ToolKind,
    #[serde(default)]
    pub secure: bool,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    /// Extra static headers sent with every invocation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub auth: AuthDescriptor,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

fn default_enabled() -> bool {
    true
}

impl ToolDefinition {
    /// Structural validation applied on create and update.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("tool name is required".to_string());
        }
        if self.bot_id.trim().is_empty() {
            return Err("botId is required".to_string());
        }
        if self.kind == ToolKind::Http && self.endpoint.trim().is_empty() {
            return Err("endpoint is required for http tools".to_string());
        }

        let mut seen = std::collections::BTreeSet::new();
        for spec in &self.parameters {
            if spec.name.trim().is_empty() {
                return Err("parameter names must be non-empty".to_string());
            }
            if !seen.insert(spec.name.as_str()) {
                return Err(format!("duplicate parameter name: {}", spec.name));
            }
        }

        self.auth.validate()
    }

    /// JSON-schema-like object exposed to the classifier prompt.
    pub fn parameter_schema(&self) -> Value {
        let mut properties = serde_json::Map::new();
        for spec in &self.parameters {
            properties.insert(
                spec.name.clone(),
                json!({
                    "type": spec.kind.json_type(),
                    "description": spec.description,
                }),
            );
        }
        let required: Vec<&str> = self
            .parameters
            .iter()
            .filter(|spec| spec.required)
            .map(|spec| spec.name.as_str())
            .collect();

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

/// Classifier output: which tool to run and with what arguments. Transient,
/// never persisted.
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub tool_id: String,
    pub tool_name: String,
    pub args: BTreeMap<String, ParamValue>,
    pub system_prompt: Option<String>,
}
