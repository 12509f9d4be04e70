//! Action abstraction for the voice agent.
//!
//! This module contains the types shared by every action variant:
//! - [`Action`] is the object-safe execution contract the worker dispatches on
//! - [`TypedAction`] and [`Typed`] for actions with strongly typed parameters and responses
//! - [`ActionInput`] / [`ActionOutput`] for a single invocation and its result
//! - [`ActionBehavior`] for the speech/interruption flags fixed at construction

pub mod config;
#[cfg(feature = "external")]
pub mod external;
pub mod factory;
pub mod schema;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::ActionError;
use config::ActionConfig;

/// Untyped parameters, as produced by LLM function calling.
pub type ActionParams = Value;

/// Discriminator naming an action variant (e.g. `action_external`).
///
/// The set is open: custom actions pick their own identifiers and register
/// them with a [`factory::ActionRegistry`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionType(String);

impl ActionType {
    /// Built-in discriminator of the External Action.
    pub const EXTERNAL: &'static str = "action_external";

    pub fn new(action_type: impl Into<String>) -> Self {
        ActionType(action_type.into())
    }

    pub fn external() -> Self {
        ActionType::new(Self::EXTERNAL)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ActionType {
    fn from(value: &str) -> Self {
        ActionType::new(value)
    }
}

impl From<String> for ActionType {
    fn from(value: String) -> Self {
        ActionType(value)
    }
}

impl PartialEq<str> for ActionType {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for ActionType {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Identifies the conversational turn an invocation was decided in.
///
/// Barge-in is scoped to a turn: interrupting turn `n` only cancels the
/// interruptible invocations that were enqueued for turn `n`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TurnId(pub u64);

impl fmt::Display for TurnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "turn-{}", self.0)
    }
}

/// Whether completing an action can, on its own, prompt the agent to speak.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShouldRespond {
    Always,
    Sometimes,
    #[default]
    Never,
}

/// Behavioral flags fixed when an action is constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionBehavior {
    pub should_respond: ShouldRespond,
    /// Suppress the default spoken acknowledgment (and spoken failure explanations).
    pub quiet: bool,
    /// Whether human speech may cancel the action mid-flight.
    pub is_interruptible: bool,
}

impl Default for ActionBehavior {
    fn default() -> Self {
        Self {
            should_respond: ShouldRespond::Never,
            quiet: false,
            is_interruptible: true,
        }
    }
}

impl ActionBehavior {
    pub fn should_respond(mut self, should_respond: ShouldRespond) -> Self {
        self.should_respond = should_respond;
        self
    }

    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    pub fn interruptible(mut self, is_interruptible: bool) -> Self {
        self.is_interruptible = is_interruptible;
        self
    }

    /// Whether the Coordinator should speak an utterance before dispatching.
    pub fn acknowledges_dispatch(&self) -> bool {
        !self.quiet
    }
}

/// One invocation of an action: configuration, parameters and correlation ids.
///
/// Conversation and turn identifiers travel with the input so that actions and
/// the worker never depend on ambient state for logging or correlation.
#[derive(Debug, Clone)]
pub struct ActionInput<P = ActionParams> {
    pub action_config: Arc<ActionConfig>,
    pub params: P,
    pub conversation_id: String,
    pub turn_id: TurnId,
    pub invocation_id: Uuid,
}

impl<P> ActionInput<P> {
    pub fn new(
        action_config: Arc<ActionConfig>,
        conversation_id: impl Into<String>,
        turn_id: TurnId,
        params: P,
    ) -> Self {
        ActionInput {
            action_config,
            params,
            conversation_id: conversation_id.into(),
            turn_id,
            invocation_id: Uuid::new_v4(),
        }
    }

    pub fn action_type(&self) -> &ActionType {
        self.action_config.action_type()
    }

    /// Swap the parameters while keeping config and correlation ids.
    pub fn with_params<Q>(self, params: Q) -> ActionInput<Q> {
        ActionInput {
            action_config: self.action_config,
            params,
            conversation_id: self.conversation_id,
            turn_id: self.turn_id,
            invocation_id: self.invocation_id,
        }
    }
}

impl ActionInput<ActionParams> {
    /// Build an input from the raw argument string of an LLM function call.
    ///
    /// Arguments must be a JSON object; anything else is a validation error.
    pub fn from_function_call(
        action_config: Arc<ActionConfig>,
        conversation_id: impl Into<String>,
        turn_id: TurnId,
        arguments: &str,
    ) -> Result<Self, ActionError> {
        let params: Value = serde_json::from_str(arguments).map_err(|e| {
            ActionError::Validation(format!("function call arguments are not valid JSON: {}", e))
        })?;
        if !params.is_object() {
            return Err(ActionError::Validation(
                "function call arguments must be a JSON object".to_string(),
            ));
        }
        Ok(ActionInput::new(action_config, conversation_id, turn_id, params))
    }
}

/// The successful result of an invocation.
///
/// Failures are never embedded here; they are reported as [`ActionError`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionOutput<R = Value> {
    pub action_type: ActionType,
    pub response: R,
    /// A message the agent should speak verbatim instead of asking the LLM.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_message: Option<String>,
}

impl<R> ActionOutput<R> {
    pub fn new(action_type: ActionType, response: R) -> Self {
        ActionOutput {
            action_type,
            response,
            agent_message: None,
        }
    }

    pub fn with_agent_message(mut self, message: impl Into<String>) -> Self {
        self.agent_message = Some(message.into());
        self
    }
}

/// The execution contract every action variant implements.
///
/// Implementations must be stateless across invocations: the worker may reuse
/// one instance for many concurrent invocations of the same configuration.
#[async_trait]
pub trait Action: Send + Sync + 'static {
    fn action_type(&self) -> &ActionType;

    fn behavior(&self) -> ActionBehavior;

    /// Function-calling description (`name`, `description`, `parameters`) for the LLM.
    fn function_descriptor(&self) -> Option<Value> {
        None
    }

    /// Perform the action. Side effects happen at most as often as the
    /// action's own logic retries; the worker never retries.
    async fn run(&self, input: ActionInput) -> Result<ActionOutput, ActionError>;

    /// Called after every successful [`run`](Action::run). A failure here is
    /// logged and never replaces the action's result.
    async fn after_run(&self, _output: &ActionOutput) -> Result<(), ActionError> {
        Ok(())
    }
}

/// An action with strongly typed parameters and response.
///
/// Wrap it in [`Typed`] to obtain an [`Action`] the worker can dispatch.
#[async_trait]
pub trait TypedAction: Send + Sync + 'static {
    type Params: DeserializeOwned + Send;
    type Response: Serialize + Send;

    fn behavior(&self) -> ActionBehavior {
        ActionBehavior::default()
    }

    fn function_descriptor(&self) -> Option<Value> {
        None
    }

    async fn run(
        &self,
        input: ActionInput<Self::Params>,
    ) -> Result<ActionOutput<Self::Response>, ActionError>;

    async fn after_run(&self, _output: &ActionOutput) -> Result<(), ActionError> {
        Ok(())
    }
}

/// Adapter erasing a [`TypedAction`]'s parameter and response types.
pub struct Typed<A> {
    action_type: ActionType,
    inner: A,
}

impl<A: TypedAction> Typed<A> {
    pub fn new(action_type: impl Into<ActionType>, inner: A) -> Self {
        Typed {
            action_type: action_type.into(),
            inner,
        }
    }

    pub fn inner(&self) -> &A {
        &self.inner
    }
}

#[async_trait]
impl<A: TypedAction> Action for Typed<A> {
    fn action_type(&self) -> &ActionType {
        &self.action_type
    }

    fn behavior(&self) -> ActionBehavior {
        self.inner.behavior()
    }

    fn function_descriptor(&self) -> Option<Value> {
        self.inner.function_descriptor()
    }

    async fn run(&self, mut input: ActionInput) -> Result<ActionOutput, ActionError> {
        let params: A::Params = serde_json::from_value(input.params.take())
            .map_err(|e| ActionError::Validation(format!("invalid parameters: {}", e)))?;
        let output = self.inner.run(input.with_params(params)).await?;
        Ok(ActionOutput {
            action_type: output.action_type,
            response: serde_json::to_value(output.response)?,
            agent_message: output.agent_message,
        })
    }

    async fn after_run(&self, output: &ActionOutput) -> Result<(), ActionError> {
        self.inner.after_run(output).await
    }
}
