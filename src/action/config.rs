//! Serializable action configuration.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::action::ActionType;
use crate::error::ActionError;

/// Immutable description of one configured action instance.
///
/// Serialized as `{"type": <discriminator>, ...settings}`. The settings are
/// kept untyped so configs for unknown variants still load; they only fail
/// when a factory tries to resolve them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionConfig {
    #[serde(rename = "type")]
    action_type: ActionType,
    #[serde(flatten)]
    settings: Map<String, Value>,
}

impl ActionConfig {
    pub fn new(action_type: impl Into<ActionType>, settings: Map<String, Value>) -> Self {
        ActionConfig {
            action_type: action_type.into(),
            settings,
        }
    }

    pub fn action_type(&self) -> &ActionType {
        &self.action_type
    }

    pub fn settings(&self) -> &Map<String, Value> {
        &self.settings
    }

    /// Deserialize the variant-specific settings.
    pub fn parse_settings<T: DeserializeOwned>(&self) -> Result<T, ActionError> {
        serde_json::from_value(Value::Object(self.settings.clone())).map_err(|e| {
            ActionError::Configuration(format!(
                "invalid settings for action type `{}`: {}",
                self.action_type, e
            ))
        })
    }

    /// Stable textual identity of this config, used to reuse resolved actions.
    pub fn fingerprint(&self) -> Result<String, ActionError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// How the agent behaves while an External Action is in flight.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingMode {
    #[default]
    Muted,
}

/// Settings of the built-in External Action.
#[cfg(feature = "external")]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalActionConfig {
    pub name: String,
    pub description: String,
    pub url: String,
    /// JSON Schema for the parameters. The root type must be `object`.
    pub input_schema: Value,
    #[serde(default)]
    pub processing_mode: ProcessingMode,
    #[serde(default)]
    pub speak_on_send: bool,
    #[serde(default)]
    pub speak_on_receive: bool,
    /// Base64-encoded HMAC key. Requests are only signed when this is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature_secret: Option<String>,
    #[serde(default)]
    pub is_interruptible: bool,
}

#[cfg(feature = "external")]
impl ExternalActionConfig {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        url: impl Into<String>,
        input_schema: Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            url: url.into(),
            input_schema,
            processing_mode: ProcessingMode::default(),
            speak_on_send: false,
            speak_on_receive: false,
            signature_secret: None,
            is_interruptible: false,
        }
    }

    /// Set the signature secret from its base64 form.
    pub fn with_signature_secret(mut self, encoded: impl Into<String>) -> Self {
        self.signature_secret = Some(encoded.into());
        self
    }

    pub fn speak_on_send(mut self, enabled: bool) -> Self {
        self.speak_on_send = enabled;
        self
    }

    pub fn speak_on_receive(mut self, enabled: bool) -> Self {
        self.speak_on_receive = enabled;
        self
    }

    pub fn interruptible(mut self, enabled: bool) -> Self {
        self.is_interruptible = enabled;
        self
    }

    /// Decode the signature secret. `None` when signing is disabled.
    pub fn decoded_secret(&self) -> Result<Option<Vec<u8>>, ActionError> {
        match &self.signature_secret {
            Some(encoded) => Ok(Some(crate::signature::decode_secret(encoded)?)),
            None => Ok(None),
        }
    }

    pub fn into_action_config(self) -> Result<ActionConfig, ActionError> {
        match serde_json::to_value(self)? {
            Value::Object(settings) => Ok(ActionConfig::new(ActionType::external(), settings)),
            _ => Err(ActionError::Configuration(
                "external action settings must serialize to an object".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_action_config_round_trips_type_tag() {
        let raw = json!({"type": "action_send_email", "sender": "bot@example.com"});
        let config: ActionConfig = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(config.action_type(), "action_send_email");
        assert_eq!(config.settings().get("sender"), Some(&json!("bot@example.com")));
        assert_eq!(serde_json::to_value(&config).unwrap(), raw);
    }

    #[test]
    fn test_fingerprint_is_stable() {
        let a: ActionConfig = serde_json::from_value(json!({"type": "x", "b": 1, "a": 2})).unwrap();
        let b: ActionConfig = serde_json::from_value(json!({"a": 2, "type": "x", "b": 1})).unwrap();
        assert_eq!(a.fingerprint().unwrap(), b.fingerprint().unwrap());
    }

    #[cfg(feature = "external")]
    #[test]
    fn test_external_config_defaults_and_tag() {
        let config = ExternalActionConfig::new(
            "book",
            "Book a meeting",
            "http://svc/book",
            json!({"type": "object"}),
        )
        .into_action_config()
        .unwrap();

        assert_eq!(config.action_type(), ActionType::EXTERNAL);
        let parsed: ExternalActionConfig = config.parse_settings().unwrap();
        assert_eq!(parsed.processing_mode, ProcessingMode::Muted);
        assert!(!parsed.speak_on_send);
        assert!(parsed.signature_secret.is_none());
        assert!(config.settings().get("signature_secret").is_none());
    }

    #[cfg(feature = "external")]
    #[test]
    fn test_external_config_missing_fields_is_configuration_error() {
        let config: ActionConfig =
            serde_json::from_value(json!({"type": "action_external", "name": "x"})).unwrap();
        let err = config.parse_settings::<ExternalActionConfig>().unwrap_err();
        assert!(matches!(err, ActionError::Configuration(_)));
    }

    #[cfg(feature = "external")]
    #[test]
    fn test_decoded_secret() {
        let config = ExternalActionConfig::new("n", "d", "u", json!({"type": "object"}))
            .with_signature_secret("czNjcjN0");
        assert_eq!(config.decoded_secret().unwrap(), Some(b"s3cr3t".to_vec()));

        let bad = config.clone().with_signature_secret("not base64!!");
        assert!(matches!(
            bad.decoded_secret(),
            Err(ActionError::Configuration(_))
        ));

        let empty = config.with_signature_secret("");
        assert!(matches!(
            empty.decoded_secret(),
            Err(ActionError::Configuration(_))
        ));
    }
}
