//! Request synthesis and tool execution.
//!
//! A tool invocation is turned into a concrete HTTP request from declarative
//! parameter metadata: path parameters become URL-encoded segments in
//! declaration order, query parameters become `key=value` pairs, and the
//! auth descriptor is applied as a pure function of its variant. URL
//! construction is deterministic for a given tool and argument map.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde_json::{json, Value};
use thiserror::Error;

use super::registry::ToolRegistry;
use super::types::{
    ApiKeyLocation, AuthDescriptor, ParamLocation, ParamValue, ToolDefinition, ToolKind,
};
use crate::core::errors::ApiError;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("tool not found: {0}")]
    NotFound(String),
    #[error("unsupported tool type: {0}")]
    UnsupportedType(String),
    #[error("missing required param: {0}")]
    MissingRequiredParameter(String),
    #[error("tool endpoint is missing")]
    MissingEndpoint,
    #[error("incomplete auth configuration: {0}")]
    IncompleteAuth(String),
    #[error("failed to build request: {0}")]
    RequestBuild(String),
    #[error("registry error: {0}")]
    Registry(String),
}

impl From<ToolError> for ApiError {
    fn from(err: ToolError) -> Self {
        match err {
            ToolError::NotFound(msg) => ApiError::NotFound(msg),
            ToolError::UnsupportedType(msg) => ApiError::Unsupported(msg),
            ToolError::MissingRequiredParameter(_)
            | ToolError::MissingEndpoint
            | ToolError::IncompleteAuth(_) => ApiError::BadRequest(err.to_string()),
            ToolError::RequestBuild(msg) => ApiError::Internal(msg),
            ToolError::Registry(msg) => ApiError::Internal(msg),
        }
    }
}

/// Execution result. Upstream failures are data, not errors: the payload
/// carries the upstream body or message so the caller can decide to fall
/// back to retrieval.
#[derive(Debug, Clone)]
pub enum ToolOutcome {
    Success(Value),
    Failed(Value),
}

pub struct ToolExecutor {
    registry: Arc<dyn ToolRegistry>,
    client: Client,
}

impl ToolExecutor {
    pub fn new(registry: Arc<dyn ToolRegistry>, call_timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(call_timeout)
            .build()
            .map_err(ApiError::internal)?;
        Ok(Self { registry, client })
    }

    pub async fn execute(
        &self,
        tool_id: &str,
        args: &BTreeMap<String, ParamValue>,
    ) -> Result<ToolOutcome, ToolError> {
        let tool = self
            .registry
            .get_enabled(tool_id)
            .await
            .map_err(|err| ToolError::Registry(err.to_string()))?
            .ok_or_else(|| ToolError::NotFound(tool_id.to_string()))?;

        if tool.kind != ToolKind::Http {
            return Err(ToolError::UnsupportedType(format!("{:?}", tool.kind)));
        }

        let request = build_request(&self.client, &tool, args)?;
        let url = request.url().to_string();

        tracing::info!(tool = %tool.name, tool_id = %tool.id, "Executing tool");

        match self.client.execute(request).await {
            Ok(response) => {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                let payload = serde_json::from_str::<Value>(&body)
                    .unwrap_or_else(|_| Value::String(body));

                if status.is_success() {
                    Ok(ToolOutcome::Success(payload))
                } else {
                    tracing::warn!(
                        tool_id = %tool.id,
                        status = %status,
                        "Tool endpoint returned an error"
                    );
                    Ok(ToolOutcome::Failed(json!({
                        "error": payload,
                        "status": status.as_u16(),
                    })))
                }
            }
            Err(err) => {
                // URL logged without query string: apiKey-in-query credentials
                // must not reach the logs.
                let loggable = url.split('?').next().unwrap_or_default();
                tracing::warn!(tool_id = %tool.id, url = %loggable, "Tool call failed: {err}");
                Ok(ToolOutcome::Failed(json!({
                    "error": err.to_string(),
                })))
            }
        }
    }
}

/// Assemble the target URL from the endpoint template, the declared
/// parameters and the argument map. Pure and deterministic.
pub fn build_url(
    tool: &ToolDefinition,
    args: &BTreeMap<String, ParamValue>,
) -> Result<String, ToolError> {
    if tool.endpoint.trim().is_empty() {
        return Err(ToolError::MissingEndpoint);
    }

    let mut path_segments = Vec::new();
    let mut query_pairs = Vec::new();

    for spec in &tool.parameters {
        let provided = args.get(&spec.name).cloned();
        let value = provided.clone().or_else(|| spec.default.clone());
        let Some(value) = value else {
            if spec.required {
                return Err(ToolError::MissingRequiredParameter(spec.name.clone()));
            }
            continue;
        };

        match spec.location {
            ParamLocation::Path => {
                path_segments.push(urlencoding::encode(&value.to_text()).into_owned());
            }
            ParamLocation::Query => {
                // An optional query parameter resolved only from its default
                // is left to the endpoint's own default behavior.
                if provided.is_none() && !spec.required {
                    continue;
                }
                let key = spec.map_to.as_deref().unwrap_or(&spec.name);
                query_pairs.push(format!(
                    "{}={}",
                    urlencoding::encode(key),
                    urlencoding::encode(&value.to_text())
                ));
            }
            // Reserved for future body placement.
            ParamLocation::Body => {}
        }
    }

    let mut url = tool.endpoint.clone();
    if !path_segments.is_empty() {
        url = url.trim_end_matches('/').to_string();
        url.push('/');
        url.push_str(&path_segments.join("/"));
    }
    if !query_pairs.is_empty() {
        url.push(if url.contains('?') { '&' } else { '?' });
        url.push_str(&query_pairs.join("&"));
    }

    // apiKey-in-query is appended after declared parameters.
    if let AuthDescriptor::ApiKey {
        key,
        name,
        location: ApiKeyLocation::Query,
    } = &tool.auth
    {
        if key.is_empty() || name.is_empty() {
            return Err(ToolError::IncompleteAuth("apiKey".to_string()));
        }
        url.push(if url.contains('?') { '&' } else { '?' });
        url.push_str(&format!(
            "{}={}",
            urlencoding::encode(name),
            urlencoding::encode(key)
        ));
    }

    Ok(url)
}

/// Build the full request: URL, method, static headers and auth. Performs
/// no I/O; the returned request is inspectable in tests.
pub fn build_request(
    client: &Client,
    tool: &ToolDefinition,
    args: &BTreeMap<String, ParamValue>,
) -> Result<reqwest::Request, ToolError> {
    let url = build_url(tool, args)?;
    let mut builder = client.request(tool.method.as_method(), &url);

    if let Some(headers) = &tool.headers {
        for (name, value) in headers {
            builder = builder.header(name, value);
        }
    }

    match &tool.auth {
        AuthDescriptor::None => {}
        AuthDescriptor::Basic { username, password } => {
            if username.is_empty() || password.is_empty() {
                return Err(ToolError::IncompleteAuth("basic".to_string()));
            }
            builder = builder.basic_auth(username, Some(password));
        }
        AuthDescriptor::Bearer { token } => {
            if token.is_empty() {
                return Err(ToolError::IncompleteAuth("bearer".to_string()));
            }
            builder = builder.bearer_auth(token);
        }
        AuthDescriptor::ApiKey {
            key,
            name,
            location,
        } => {
            if key.is_empty() || name.is_empty() {
                return Err(ToolError::IncompleteAuth("apiKey".to_string()));
            }
            // Query placement was already handled during URL assembly.
            if *location == ApiKeyLocation::Header {
                builder = builder.header(name, key);
            }
        }
    }

    builder
        .build()
        .map_err(|err| ToolError::RequestBuild(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::super::types::{HttpMethod, ParamKind, ParameterSpec};
    use super::*;

    fn tool_with(parameters: Vec<ParameterSpec>, auth: AuthDescriptor) -> ToolDefinition {
        ToolDefinition {
            id: "t1".to_string(),
            bot_id: "b1".to_string(),
            name: "lookup".to_string(),
            description: "Looks things up".to_string(),
            parameters,
            endpoint: "https://api.example.com/items/".to_string(),
            method: HttpMethod::Get,
            kind: ToolKind::Http,
            secure: false,
            enabled: true,
            system_prompt: None,
            headers: None,
            auth,
            created_at: None,
            updated_at: None,
        }
    }

    fn param(name: &str, location: ParamLocation, required: bool) -> ParameterSpec {
        ParameterSpec {
            name: name.to_string(),
            kind: ParamKind::String,
            description: String::new(),
            required,
            default: None,
            location,
            map_to: None,
        }
    }

    fn args(entries: &[(&str, &str)]) -> BTreeMap<String, ParamValue> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), ParamValue::String(v.to_string())))
            .collect()
    }

    #[test]
    fn path_param_appended_without_query() {
        let tool = tool_with(
            vec![param("id", ParamLocation::Path, true), {
                let mut p = param("verbose", ParamLocation::Query, false);
                p.default = Some(ParamValue::Bool(false));
                p
            }],
            AuthDescriptor::None,
        );

        // Optional query param resolved only from its default stays off the URL.
        let url = build_url(&tool, &args(&[("id", "42")])).expect("url");
        assert_eq!(url, "https://api.example.com/items/42");

        let url = build_url(&tool, &args(&[("id", "42"), ("verbose", "true")])).expect("url");
        assert_eq!(url, "https://api.example.com/items/42?verbose=true");
    }

    #[test]
    fn optional_param_without_default_is_skipped() {
        let tool = tool_with(
            vec![
                param("id", ParamLocation::Path, true),
                param("verbose", ParamLocation::Query, false),
            ],
            AuthDescriptor::None,
        );

        let url = build_url(&tool, &args(&[("id", "42")])).expect("url");
        assert_eq!(url, "https://api.example.com/items/42");
    }

    #[test]
    fn path_segments_follow_declaration_order() {
        let tool = tool_with(
            vec![
                param("owner", ParamLocation::Path, true),
                param("repo", ParamLocation::Path, true),
            ],
            AuthDescriptor::None,
        );

        let url = build_url(&tool, &args(&[("repo", "backend"), ("owner", "acme")])).expect("url");
        assert_eq!(url, "https://api.example.com/items/acme/backend");
    }

    #[test]
    fn values_are_url_encoded() {
        let tool = tool_with(
            vec![
                param("city", ParamLocation::Path, true),
                param("q", ParamLocation::Query, false),
            ],
            AuthDescriptor::None,
        );

        let url = build_url(&tool, &args(&[("city", "New York"), ("q", "a&b=c")])).expect("url");
        assert_eq!(
            url,
            "https://api.example.com/items/New%20York?q=a%26b%3Dc"
        );
    }

    #[test]
    fn map_to_renames_query_key() {
        let mut spec = param("units", ParamLocation::Query, false);
        spec.map_to = Some("u".to_string());
        let tool = tool_with(vec![spec], AuthDescriptor::None);

        let url = build_url(&tool, &args(&[("units", "metric")])).expect("url");
        assert_eq!(url, "https://api.example.com/items/?u=metric");
    }

    #[test]
    fn query_appends_with_ampersand_when_url_has_query() {
        let mut tool = tool_with(
            vec![param("page", ParamLocation::Query, false)],
            AuthDescriptor::None,
        );
        tool.endpoint = "https://api.example.com/search?sort=asc".to_string();

        let url = build_url(&tool, &args(&[("page", "2")])).expect("url");
        assert_eq!(url, "https://api.example.com/search?sort=asc&page=2");
    }

    #[test]
    fn missing_required_param_names_the_parameter() {
        let tool = tool_with(
            vec![param("id", ParamLocation::Path, true)],
            AuthDescriptor::None,
        );

        let err = build_url(&tool, &BTreeMap::new()).expect_err("must fail");
        match err {
            ToolError::MissingRequiredParameter(name) => assert_eq!(name, "id"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn api_key_in_query_sets_no_authorization_header() {
        let tool = tool_with(
            vec![],
            AuthDescriptor::ApiKey {
                key: "secret123".to_string(),
                name: "token".to_string(),
                location: ApiKeyLocation::Query,
            },
        );

        let client = Client::new();
        let request = build_request(&client, &tool, &BTreeMap::new()).expect("request");

        assert!(request.url().as_str().contains("token=secret123"));
        assert!(request.headers().get("Authorization").is_none());
    }

    #[test]
    fn api_key_in_header_sets_named_header() {
        let tool = tool_with(
            vec![],
            AuthDescriptor::ApiKey {
                key: "secret123".to_string(),
                name: "X-Api-Key".to_string(),
                location: ApiKeyLocation::Header,
            },
        );

        let client = Client::new();
        let request = build_request(&client, &tool, &BTreeMap::new()).expect("request");

        assert_eq!(request.headers()["X-Api-Key"], "secret123");
        assert!(!request.url().as_str().contains("secret123"));
    }

    #[test]
    fn basic_auth_sets_authorization_header() {
        let tool = tool_with(
            vec![],
            AuthDescriptor::Basic {
                username: "admin".to_string(),
                password: "hunter2".to_string(),
            },
        );

        let client = Client::new();
        let request = build_request(&client, &tool, &BTreeMap::new()).expect("request");

        let header = request.headers()["Authorization"].to_str().expect("ascii");
        assert!(header.starts_with("Basic "));
    }

    #[test]
    fn bearer_auth_sets_authorization_header() {
        let tool = tool_with(
            vec![],
            AuthDescriptor::Bearer {
                token: "tok-123".to_string(),
            },
        );

        let client = Client::new();
        let request = build_request(&client, &tool, &BTreeMap::new()).expect("request");

        assert_eq!(request.headers()["Authorization"], "Bearer tok-123");
    }

    #[test]
    fn incomplete_basic_auth_fails() {
        let tool = tool_with(
            vec![],
            AuthDescriptor::Basic {
                username: "admin".to_string(),
                password: String::new(),
            },
        );

        let client = Client::new();
        assert!(matches!(
            build_request(&client, &tool, &BTreeMap::new()),
            Err(ToolError::IncompleteAuth(_))
        ));
    }

    #[test]
    fn url_synthesis_is_deterministic() {
        let tool = tool_with(
            vec![
                param("id", ParamLocation::Path, true),
                param("verbose", ParamLocation::Query, false),
            ],
            AuthDescriptor::ApiKey {
                key: "secret123".to_string(),
                name: "token".to_string(),
                location: ApiKeyLocation::Query,
            },
        );
        let call_args = args(&[("id", "42"), ("verbose", "true")]);

        let first = build_url(&tool, &call_args).expect("url");
        for _ in 0..10 {
            assert_eq!(build_url(&tool, &call_args).expect("url"), first);
        }
    }

    #[test]
    fn empty_endpoint_fails() {
        let mut tool = tool_with(vec![], AuthDescriptor::None);
        tool.endpoint = String::new();
        assert!(matches!(
            build_url(&tool, &BTreeMap::new()),
            Err(ToolError::MissingEndpoint)
        ));
    }
}
