//! # voice-actions
//!
//! Lets a conversational voice agent run side-effecting actions mid-conversation
//! without blocking or corrupting the live audio/transcript stream.
//!
//! ## Features
//!
//! - **Concurrent dispatch**: every invocation runs on its own task; results are published in completion order
//! - **Barge-in aware**: interruptible actions are cancelled (and their network calls aborted) when the human speaks
//! - **Open action set**: new action types register a constructor, the worker never changes
//! - **External Action** (feature `external`, on by default): signed HTTP calls to third-party endpoints
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use serde_json::json;
//! use voice_actions::prelude::*;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Arc::new(
//!     ExternalActionConfig::new(
//!         "book_meeting",
//!         "Book a meeting on the user's calendar",
//!         "https://example.com/book",
//!         json!({"type": "object", "properties": {"time": {"type": "string"}}}),
//!     )
//!     .speak_on_receive(true)
//!     .into_action_config()?,
//! );
//!
//! let (worker, handle, mut results) = ActionsWorker::new(Arc::new(DefaultActionFactory::new()));
//! worker.spawn();
//!
//! let input = ActionInput::from_function_call(config, "conv-1", TurnId(1), r#"{"time": "10:30am"}"#)?;
//! handle.enqueue(input)?;
//!
//! if let Some(result) = results.dequeue().await {
//!     match result.spoken_reply() {
//!         SpokenReply::Verbatim(message) => println!("agent says: {message}"),
//!         SpokenReply::Generate => println!("ask the LLM what to say"),
//!         SpokenReply::Silent => {}
//!     }
//! }
//! handle.shutdown();
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Organization
//!
//! - [`action`]: the [`Action`] contract, configs, schemas, factories and the External Action
//! - [`worker`]: the actions worker and its Coordinator-facing queues
//! - [`interruptible`]: cancellable tasks and interruptible chunk streams
//! - `signature`: HMAC request signing and verification (feature `external`)
//! - [`prelude`]: commonly used types and traits (import with `use voice_actions::prelude::*`)

// ============================================================================
// Modules
// ============================================================================

pub mod action;
pub mod error;
pub mod interruptible;
#[cfg(feature = "external")]
pub mod signature;
pub mod worker;

// ============================================================================
// Public Re-exports - Granular Imports
// ============================================================================

// Actions
pub use action::config::{ActionConfig, ProcessingMode};
pub use action::factory::{ActionFactory, ActionRegistry, DefaultActionFactory, FallbackFactory};
pub use action::schema::InputSchema;
pub use action::{
    Action, ActionBehavior, ActionInput, ActionOutput, ActionParams, ActionType, ShouldRespond,
    TurnId, Typed, TypedAction,
};

// Errors
pub use error::{ActionError, WorkerError};

// Execution
pub use interruptible::{InterruptibleEvent, InterruptibleTask, interruptible_stream};
pub use worker::{
    ActionOutcome, ActionResultAgentInput, ActionResults, ActionsWorker, ActionsWorkerHandle,
    SpokenReply, WorkerStatus,
};

// ============================================================================
// External Action Feature
// ============================================================================

#[cfg(feature = "external")]
pub use action::config::ExternalActionConfig;

#[cfg(feature = "external")]
pub use action::external::{
    DEFAULT_EXTERNAL_ACTION_TIMEOUT, ExternalAction, ExternalActionResponse,
};

#[cfg(feature = "external")]
pub use signature::{SIGNATURE_HEADER, SignatureError};

// ============================================================================
// Prelude Module - Convenient Bulk Import
// ============================================================================

/// Everything needed to configure actions, run the worker and consume results.
///
/// # Example
/// ```rust
/// use voice_actions::prelude::*;
/// ```
pub mod prelude {
    pub use super::{
        // Actions
        Action,
        ActionBehavior,
        ActionConfig,
        // Errors
        ActionError,
        ActionFactory,
        ActionInput,
        ActionOutcome,
        ActionOutput,
        ActionRegistry,
        ActionResultAgentInput,
        ActionResults,
        ActionType,
        // Worker
        ActionsWorker,
        ActionsWorkerHandle,
        DefaultActionFactory,
        FallbackFactory,
        ShouldRespond,
        SpokenReply,
        TurnId,
        Typed,
        TypedAction,
        WorkerError,
        WorkerStatus,
    };

    #[cfg(feature = "external")]
    pub use super::{ExternalAction, ExternalActionConfig, ExternalActionResponse};
}

// ============================================================================
// Re-export commonly used external types for convenience
// ============================================================================

pub use serde_json::Value as JsonValue;
pub use tokio_util::sync::CancellationToken;

// ============================================================================
// Library Metadata
// ============================================================================

/// The version of this crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The name of this crate.
pub const NAME: &str = env!("CARGO_PKG_NAME");
