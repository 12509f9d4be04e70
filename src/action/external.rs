//! The External Action: a signed HTTP call to a third-party endpoint.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::action::config::{ActionConfig, ExternalActionConfig};
use crate::action::schema::InputSchema;
use crate::action::{Action, ActionBehavior, ActionInput, ActionOutput, ActionType, ShouldRespond};
use crate::error::ActionError;
use crate::signature::{self, SIGNATURE_HEADER};

/// Hard ceiling for one outbound call, connect to last body byte.
pub const DEFAULT_EXTERNAL_ACTION_TIMEOUT: Duration = Duration::from_secs(10);

/// What the third-party endpoint answers with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalActionResponse {
    pub result: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_message: Option<String>,
}

impl ExternalActionResponse {
    /// Parse a 2xx body. The body must be a JSON object carrying `result`.
    pub fn parse(body: &str) -> Result<Self, ActionError> {
        let value: Value = serde_json::from_str(body)
            .map_err(|e| ActionError::ResponseFormat(format!("body is not valid JSON: {}", e)))?;

        match &value {
            Value::Object(map) if map.contains_key("result") => {}
            Value::Object(_) => {
                return Err(ActionError::ResponseFormat(
                    "response is missing `result`".to_string(),
                ));
            }
            _ => {
                return Err(ActionError::ResponseFormat(
                    "response is not a JSON object".to_string(),
                ));
            }
        }

        serde_json::from_value(value).map_err(|e| ActionError::ResponseFormat(e.to_string()))
    }
}

/// Calls a configured URL with the invocation parameters.
///
/// Construction validates the config (object schema root, decodable secret)
/// and compiles the schema; the instance is then read-only and can serve
/// concurrent invocations.
#[derive(Debug, Clone)]
pub struct ExternalAction {
    action_type: ActionType,
    config: ExternalActionConfig,
    schema: InputSchema,
    secret: Option<Vec<u8>>,
    client: reqwest::Client,
    timeout: Duration,
}

impl ExternalAction {
    pub fn new(config: ExternalActionConfig, client: reqwest::Client) -> Result<Self, ActionError> {
        let schema = InputSchema::compile(&config.input_schema)?;
        let secret = config.decoded_secret()?;
        Ok(ExternalAction {
            action_type: ActionType::external(),
            config,
            schema,
            secret,
            client,
            timeout: DEFAULT_EXTERNAL_ACTION_TIMEOUT,
        })
    }

    pub fn from_action_config(
        config: &ActionConfig,
        client: reqwest::Client,
    ) -> Result<Self, ActionError> {
        if config.action_type() != ActionType::EXTERNAL {
            return Err(ActionError::UnsupportedActionType(
                config.action_type().to_string(),
            ));
        }
        Self::new(config.parse_settings()?, client)
    }

    /// Override the request ceiling.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn config(&self) -> &ExternalActionConfig {
        &self.config
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The exact bytes that are both transmitted and signed.
    pub fn request_body(params: &Value) -> Result<Vec<u8>, ActionError> {
        Ok(serde_json::to_vec(&json!({ "payload": params }))?)
    }

    async fn send_request(&self, params: &Value) -> Result<ExternalActionResponse, ActionError> {
        let body = Self::request_body(params)?;

        let mut request = self
            .client
            .post(&self.config.url)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json");

        if let Some(secret) = &self.secret {
            request = request.header(SIGNATURE_HEADER, signature::sign(secret, &body)?);
        }

        // Dropping this future (timeout or cancellation) aborts the connection.
        let exchange = async {
            let response = request.body(body).send().await.map_err(|e| {
                ActionError::transport(format!("request to {} failed: {}", self.config.url, e))
            })?;
            let status = response.status();
            let text = response.text().await.map_err(|e| ActionError::Transport {
                status: Some(status.as_u16()),
                body: None,
                message: format!("failed to read response body: {}", e),
            })?;
            Ok::<_, ActionError>((status, text))
        };

        let (status, text) = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| ActionError::Timeout(self.timeout))??;

        if !status.is_success() {
            return Err(ActionError::Transport {
                status: Some(status.as_u16()),
                message: format!("HTTP {} from {}: {}", status, self.config.url, text),
                body: Some(text),
            });
        }

        ExternalActionResponse::parse(&text)
    }
}

#[async_trait]
impl Action for ExternalAction {
    fn action_type(&self) -> &ActionType {
        &self.action_type
    }

    fn behavior(&self) -> ActionBehavior {
        let should_respond = if self.config.speak_on_receive {
            ShouldRespond::Always
        } else {
            ShouldRespond::Never
        };
        ActionBehavior::default()
            .should_respond(should_respond)
            .quiet(!self.config.speak_on_send)
            .interruptible(self.config.is_interruptible)
    }

    fn function_descriptor(&self) -> Option<Value> {
        Some(json!({
            "name": self.config.name,
            "description": self.config.description,
            "parameters": self.schema.raw(),
        }))
    }

    async fn run(&self, input: ActionInput) -> Result<ActionOutput, ActionError> {
        self.schema.validate(&input.params)?;

        log::debug!(
            "[{}] {} {}: calling {}",
            input.conversation_id,
            input.turn_id,
            input.invocation_id,
            self.config.url
        );
        let response = self.send_request(&input.params).await?;

        let mut output = ActionOutput::new(input.action_type().clone(), response.result);
        output.agent_message = response.agent_message;
        Ok(output)
    }
}
