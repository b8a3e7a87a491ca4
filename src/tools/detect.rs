//! Model-driven tool intent classification.
//!
//! The model output is never trusted as authoritative: anything that fails
//! to parse, has the wrong shape, or names a tool outside the bot's catalog
//! resolves to "no tool needed" so the caller can fall through to retrieval.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{json, Value};

use super::registry::ToolRegistry;
use super::types::{ParamValue, ToolInvocation};
use crate::core::errors::ApiError;
use crate::llm::{GenerateRequest, LlmProvider};

pub struct ToolDetector {
    registry: Arc<dyn ToolRegistry>,
    llm: Arc<dyn LlmProvider>,
    default_model: String,
}

impl ToolDetector {
    pub fn new(
        registry: Arc<dyn ToolRegistry>,
        llm: Arc<dyn LlmProvider>,
        default_model: String,
    ) -> Self {
        Self {
            registry,
            llm,
            default_model,
        }
    }

    /// Decide whether `query` maps to one of the bot's tools.
    ///
    /// Returns `None` for an empty catalog (without a model call), for any
    /// model/backend failure, and for unusable model output. Only registry
    /// read errors propagate.
    pub async fn detect(
        &self,
        bot_id: &str,
        query: &str,
        model_override: Option<&str>,
    ) -> Result<Option<ToolInvocation>, ApiError> {
        let available = self.registry.list_by_bot(bot_id).await?;
        if available.is_empty() {
            return Ok(None);
        }

        let catalog: Vec<Value> = available
            .iter()
            .map(|tool| {
                json!({
                    "id": tool.id,
                    "name": tool.name,
                    "description": tool.description,
                    "parameters": tool.parameter_schema(),
                })
            })
            .collect();

        let prompt = build_prompt(&catalog, query);
        let model = model_override.unwrap_or(&self.default_model);
        let request = GenerateRequest::new(model, prompt).json();

        let response = match self.llm.generate(request).await {
            Ok(text) => text,
            Err(err) => {
                tracing::error!(bot_id, "Tool detection failed: {err}");
                return Ok(None);
            }
        };

        if response.trim().is_empty() {
            return Ok(None);
        }

        let Ok(parsed) = serde_json::from_str::<Value>(response.trim()) else {
            tracing::warn!(bot_id, "Tool detection returned non-JSON output");
            return Ok(None);
        };

        let Some((tool_name, params)) = extract_selection(&parsed) else {
            return Ok(None);
        };

        // Catalog-membership gate: a hallucinated tool name yields None.
        let Some(tool) = available.iter().find(|tool| tool.name == tool_name) else {
            tracing::warn!(bot_id, tool = tool_name, "Model selected an unknown tool");
            return Ok(None);
        };

        let args: BTreeMap<String, ParamValue> = params
            .iter()
            .filter_map(|(name, value)| {
                ParamValue::from_json(value).map(|v| (name.clone(), v))
            })
            .collect();

        Ok(Some(ToolInvocation {
            tool_id: tool.id.clone(),
            tool_name: tool.name.clone(),
            args,
            system_prompt: tool.system_prompt.clone(),
        }))
    }
}

/// Shape validation: the model must produce an object with a string `tool`
/// and an object `params`. `null` and anything else mean "no tool".
fn extract_selection(parsed: &Value) -> Option<(&str, &serde_json::Map<String, Value>)> {
    let object = parsed.as_object()?;
    let tool = object.get("tool")?.as_str()?;
    let params = object.get("params")?.as_object()?;
    Some((tool, params))
}

fn build_prompt(catalog: &[Value], query: &str) -> String {
    format!(
        "Analyze the following user query and determine if it requires using one of the available tools.\n\
         If yes, respond with a JSON object containing \"id\" (the tool ID), \"tool\" (the tool name) and \"params\" (the parameters for the tool).\n\
         If no tool is needed, respond with null.\n\n\
         Available tools:\n{}\n\n\
         User query: \"{}\"\n\n\
         Respond ONLY with valid JSON (either null or a tool object):",
        serde_json::to_string_pretty(catalog).unwrap_or_default(),
        query
    )
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use async_trait::async_trait;

    use super::super::types::{
        AuthDescriptor, HttpMethod, ParamKind, ParamLocation, ParameterSpec, ToolDefinition,
        ToolKind,
    };
    use super::*;
    use crate::llm::testing::MockLlm;

    struct FixedRegistry {
        tools: Vec<ToolDefinition>,
    }

    #[async_trait]
    impl ToolRegistry for FixedRegistry {
        async fn list_by_bot(&self, _bot_id: &str) -> Result<Vec<ToolDefinition>, ApiError> {
            Ok(self.tools.clone())
        }

        async fn get(&self, id: &str) -> Result<Option<ToolDefinition>, ApiError> {
            Ok(self.tools.iter().find(|t| t.id == id).cloned())
        }

        async fn get_enabled(&self, id: &str) -> Result<Option<ToolDefinition>, ApiError> {
            Ok(self
                .tools
                .iter()
                .find(|t| t.id == id && t.enabled)
                .cloned())
        }

        async fn create(&self, tool: ToolDefinition) -> Result<ToolDefinition, ApiError> {
            Ok(tool)
        }

        async fn update(
            &self,
            _id: &str,
            tool: ToolDefinition,
        ) -> Result<ToolDefinition, ApiError> {
            Ok(tool)
        }

        async fn delete(&self, _id: &str) -> Result<bool, ApiError> {
            Ok(false)
        }

        async fn delete_by_bot(&self, _bot_id: &str) -> Result<u64, ApiError> {
            Ok(0)
        }
    }

    fn weather_tool() -> ToolDefinition {
        ToolDefinition {
            id: "tool-weather".to_string(),
            bot_id: "bot-1".to_string(),
            name: "weather".to_string(),
            description: "Gets weather information for a location".to_string(),
            parameters: vec![ParameterSpec {
                name: "location".to_string(),
                kind: ParamKind::String,
                description: "The city and state/country".to_string(),
                required: true,
                default: None,
                location: ParamLocation::Query,
                map_to: None,
            }],
            endpoint: "https://api.example.com/weather".to_string(),
            method: HttpMethod::Get,
            kind: ToolKind::Http,
            secure: false,
            enabled: true,
            system_prompt: Some("You are a weather assistant.".to_string()),
            headers: None,
            auth: AuthDescriptor::None,
            created_at: None,
            updated_at: None,
        }
    }

    fn detector(tools: Vec<ToolDefinition>, llm: Arc<MockLlm>) -> ToolDetector {
        ToolDetector::new(
            Arc::new(FixedRegistry { tools }),
            llm,
            "llama3.2:latest".to_string(),
        )
    }

    #[tokio::test]
    async fn empty_catalog_short_circuits_without_model_call() {
        let llm = Arc::new(MockLlm::new());
        let detector = detector(vec![], llm.clone());

        let result = detector
            .detect("bot-1", "what is the weather", None)
            .await
            .expect("detect");

        assert!(result.is_none());
        assert_eq!(llm.generate_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn matching_tool_attaches_catalog_id_and_system_prompt() {
        let llm = Arc::new(MockLlm::new().respond_with(
            r#"{"id":"made-up","tool":"weather","params":{"location":"Paris"}}"#,
        ));
        let detector = detector(vec![weather_tool()], llm);

        let invocation = detector
            .detect("bot-1", "weather in Paris?", None)
            .await
            .expect("detect")
            .expect("tool selected");

        // The id comes from the catalog, not from the model's echo.
        assert_eq!(invocation.tool_id, "tool-weather");
        assert_eq!(invocation.tool_name, "weather");
        assert_eq!(
            invocation.args.get("location"),
            Some(&ParamValue::String("Paris".to_string()))
        );
        assert_eq!(
            invocation.system_prompt.as_deref(),
            Some("You are a weather assistant.")
        );
    }

    #[tokio::test]
    async fn hallucinated_tool_name_yields_none() {
        let llm = Arc::new(
            MockLlm::new().respond_with(r#"{"tool":"stocks","params":{"symbol":"ACME"}}"#),
        );
        let detector = detector(vec![weather_tool()], llm);

        let result = detector
            .detect("bot-1", "stock price of ACME", None)
            .await
            .expect("detect");
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn null_response_yields_none() {
        let llm = Arc::new(MockLlm::new().respond_with("null"));
        let detector = detector(vec![weather_tool()], llm);

        assert!(detector
            .detect("bot-1", "tell me a joke", None)
            .await
            .expect("detect")
            .is_none());
    }

    #[tokio::test]
    async fn wrong_shape_json_yields_none() {
        // Valid JSON, but not the {tool, params} shape.
        for response in [
            r#"{"tool":"weather"}"#,
            r#"{"tool":42,"params":{}}"#,
            r#"{"tool":"weather","params":"location=Paris"}"#,
            r#"["weather"]"#,
        ] {
            let llm = Arc::new(MockLlm::new().respond_with(response));
            let detector = detector(vec![weather_tool()], llm);
            assert!(
                detector
                    .detect("bot-1", "weather?", None)
                    .await
                    .expect("detect")
                    .is_none(),
                "response {response} should resolve to None"
            );
        }
    }

    #[tokio::test]
    async fn parse_failure_and_backend_error_yield_none() {
        let llm = Arc::new(MockLlm::new().respond_with("the weather tool please"));
        let prose_detector = detector(vec![weather_tool()], llm);
        assert!(prose_detector
            .detect("bot-1", "weather?", None)
            .await
            .expect("detect")
            .is_none());

        let llm = Arc::new(MockLlm::new().fail_generation("backend unreachable"));
        let failing_detector = detector(vec![weather_tool()], llm);
        assert!(failing_detector
            .detect("bot-1", "weather?", None)
            .await
            .expect("detect")
            .is_none());
    }

    #[tokio::test]
    async fn non_scalar_params_are_dropped() {
        let llm = Arc::new(MockLlm::new().respond_with(
            r#"{"tool":"weather","params":{"location":"Paris","extra":{"nested":true}}}"#,
        ));
        let detector = detector(vec![weather_tool()], llm);

        let invocation = detector
            .detect("bot-1", "weather in Paris", None)
            .await
            .expect("detect")
            .expect("tool selected");

        assert_eq!(invocation.args.len(), 1);
        assert!(invocation.args.contains_key("location"));
    }
}
