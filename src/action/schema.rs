use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::error::ActionError;

const MAX_REPORTED_ERRORS: usize = 5;

/// A parameter schema compiled once per action configuration.
///
/// Compilation checks that the root type is `object`; validation then reuses
/// the compiled validator for every invocation.
#[derive(Clone)]
pub struct InputSchema {
    raw: Value,
    validator: Arc<jsonschema::Validator>,
}

impl InputSchema {
    /// Compile `schema`. The root must declare type `object`, either as
    /// `"type": "object"` or as the one-element `"type": ["object"]`.
    pub fn compile(schema: &Value) -> Result<Self, ActionError> {
        match schema.get("type") {
            Some(Value::String(root)) if root == "object" => {}
            Some(Value::Array(roots)) if roots.len() == 1 && roots[0] == "object" => {}
            Some(other) => {
                return Err(ActionError::Configuration(format!(
                    "input_schema root type must be `object`, found `{}`",
                    other
                )));
            }
            None => {
                return Err(ActionError::Configuration(
                    "input_schema root type must be `object`".to_string(),
                ));
            }
        }

        let validator = jsonschema::validator_for(schema)
            .map_err(|e| ActionError::Configuration(format!("invalid input_schema: {}", e)))?;

        Ok(InputSchema {
            raw: schema.clone(),
            validator: Arc::new(validator),
        })
    }

    pub fn raw(&self) -> &Value {
        &self.raw
    }

    pub fn validate(&self, params: &Value) -> Result<(), ActionError> {
        if self.validator.is_valid(params) {
            return Ok(());
        }

        let messages: Vec<String> = self
            .validator
            .iter_errors(params)
            .take(MAX_REPORTED_ERRORS)
            .map(|e| format!("{} at `{}`", e, e.instance_path))
            .collect();
        Err(ActionError::Validation(messages.join("; ")))
    }
}

impl fmt::Debug for InputSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputSchema").field("raw", &self.raw).finish()
    }
}
