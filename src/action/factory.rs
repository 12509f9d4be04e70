use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::action::config::ActionConfig;
use crate::action::{Action, ActionType};
use crate::error::ActionError;

/// Builds a configured [`Action`] from its [`ActionConfig`].
pub trait ActionFactory: Send + Sync {
    fn create(&self, config: &ActionConfig) -> Result<Arc<dyn Action>, ActionError>;
}

/// A constructor registered for one action type.
pub type ActionConstructor =
    Arc<dyn Fn(&ActionConfig) -> Result<Arc<dyn Action>, ActionError> + Send + Sync>;

/// Maps action-type discriminators to constructors.
///
/// New variants register here; the worker never has to know about them.
///
/// # Example
///
/// ```rust
/// use voice_actions::prelude::*;
///
/// let mut registry = ActionRegistry::new();
/// registry.register("action_noop", |_config| {
///     Err(ActionError::Configuration("not today".into()))
/// });
/// assert!(registry.contains("action_noop"));
///
/// let config = ActionConfig::new("action_unknown", Default::default());
/// assert!(matches!(
///     registry.create(&config),
///     Err(ActionError::UnsupportedActionType(_))
/// ));
/// ```
#[derive(Clone, Default)]
pub struct ActionRegistry {
    constructors: HashMap<ActionType, ActionConstructor>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a constructor. Overwrites any previous one for the same type.
    pub fn register<F>(&mut self, action_type: impl Into<ActionType>, constructor: F)
    where
        F: Fn(&ActionConfig) -> Result<Arc<dyn Action>, ActionError> + Send + Sync + 'static,
    {
        let action_type = action_type.into();
        if self.constructors.contains_key(&action_type) {
            log::warn!(
                "Action type {} is already registered, overwriting its constructor.",
                action_type
            );
        }
        self.constructors.insert(action_type, Arc::new(constructor));
    }

    pub fn with<F>(mut self, action_type: impl Into<ActionType>, constructor: F) -> Self
    where
        F: Fn(&ActionConfig) -> Result<Arc<dyn Action>, ActionError> + Send + Sync + 'static,
    {
        self.register(action_type, constructor);
        self
    }

    pub fn contains(&self, action_type: &str) -> bool {
        self.constructors.contains_key(&ActionType::new(action_type))
    }

    pub fn len(&self) -> usize {
        self.constructors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constructors.is_empty()
    }

    pub fn types(&self) -> impl Iterator<Item = &ActionType> {
        self.constructors.keys()
    }
}

impl ActionFactory for ActionRegistry {
    fn create(&self, config: &ActionConfig) -> Result<Arc<dyn Action>, ActionError> {
        match self.constructors.get(config.action_type()) {
            Some(constructor) => constructor(config),
            None => Err(ActionError::UnsupportedActionType(
                config.action_type().to_string(),
            )),
        }
    }
}

impl fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionRegistry")
            .field("types", &self.constructors.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Resolves the built-in action types.
#[derive(Debug, Clone)]
pub struct DefaultActionFactory {
    registry: ActionRegistry,
}

impl DefaultActionFactory {
    pub fn new() -> Self {
        #[cfg(feature = "external")]
        {
            Self::with_http_client(reqwest::Client::new())
        }
        #[cfg(not(feature = "external"))]
        {
            DefaultActionFactory {
                registry: ActionRegistry::new(),
            }
        }
    }

    /// Share one HTTP client (and its connection pool) across External Actions.
    #[cfg(feature = "external")]
    pub fn with_http_client(client: reqwest::Client) -> Self {
        use crate::action::external::ExternalAction;

        let registry = ActionRegistry::new().with(ActionType::EXTERNAL, move |config| {
            let action = ExternalAction::from_action_config(config, client.clone())?;
            Ok(Arc::new(action) as Arc<dyn Action>)
        });
        DefaultActionFactory { registry }
    }

    pub fn registry(&self) -> &ActionRegistry {
        &self.registry
    }
}

impl Default for DefaultActionFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionFactory for DefaultActionFactory {
    fn create(&self, config: &ActionConfig) -> Result<Arc<dyn Action>, ActionError> {
        self.registry.create(config)
    }
}

/// Tries a custom factory first and falls back for types it does not know.
///
/// Only [`ActionError::UnsupportedActionType`] triggers the fallback; a custom
/// constructor that rejects a config it does own is not second-guessed.
#[derive(Debug, Clone)]
pub struct FallbackFactory<C, D = DefaultActionFactory> {
    primary: C,
    fallback: D,
}

impl<C: ActionFactory> FallbackFactory<C> {
    pub fn new(primary: C) -> Self {
        Self::with_fallback(primary, DefaultActionFactory::new())
    }
}

impl<C: ActionFactory, D: ActionFactory> FallbackFactory<C, D> {
    pub fn with_fallback(primary: C, fallback: D) -> Self {
        FallbackFactory { primary, fallback }
    }
}

impl<C: ActionFactory, D: ActionFactory> ActionFactory for FallbackFactory<C, D> {
    fn create(&self, config: &ActionConfig) -> Result<Arc<dyn Action>, ActionError> {
        match self.primary.create(config) {
            Err(ActionError::UnsupportedActionType(_)) => self.fallback.create(config),
            other => other,
        }
    }
}
