//! Connector configuration schemas and validation.
//!
//! Each connector declares a [`ConfigurationSchema`]. Raw settings from a
//! config file or an API payload are validated against it into an immutable
//! [`ConnectorConfig`] that is handed to the runner for its lifetime.

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

use crate::error::{Result, RunnerError};

/// JSON-ish type of a setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SettingType {
    String,
    Boolean,
    Number,
}

impl SettingType {
    /// Returns the value as this type, or `None` if it does not fit.
    ///
    /// Boolean and number settings also accept their string spelling, which
    /// is what environment-expanded config values look like.
    fn coerce(&self, value: &Value) -> Option<Value> {
        match (self, value) {
            (Self::String, Value::String(_))
            | (Self::Boolean, Value::Bool(_))
            | (Self::Number, Value::Number(_)) => Some(value.clone()),
            (Self::Boolean, Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" => Some(Value::Bool(true)),
                "false" => Some(Value::Bool(false)),
                _ => None,
            },
            (Self::Number, Value::String(s)) => {
                let s = s.trim();
                if let Ok(n) = s.parse::<i64>() {
                    Some(Value::from(n))
                } else {
                    s.parse::<f64>()
                        .ok()
                        .and_then(serde_json::Number::from_f64)
                        .map(Value::Number)
                }
            }
            _ => None,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Boolean => "boolean",
            Self::Number => "number",
        }
    }
}

/// A single declared setting.
#[derive(Debug, Clone, PartialEq)]
pub struct SettingDescriptor {
    pub name: &'static str,
    pub setting_type: SettingType,
    pub title: &'static str,
    pub default: Option<Value>,
    pub required: bool,
    pub secret: bool,
}

impl SettingDescriptor {
    pub fn string(name: &'static str, title: &'static str) -> Self {
        Self::new(name, SettingType::String, title)
    }

    pub fn boolean(name: &'static str, title: &'static str) -> Self {
        Self::new(name, SettingType::Boolean, title)
    }

    pub fn number(name: &'static str, title: &'static str) -> Self {
        Self::new(name, SettingType::Number, title)
    }

    fn new(name: &'static str, setting_type: SettingType, title: &'static str) -> Self {
        Self {
            name,
            setting_type,
            title,
            default: None,
            required: false,
            secret: false,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn secret(mut self) -> Self {
        self.secret = true;
        self
    }

    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }
}

/// Ordered list of settings a connector accepts.
///
/// Declaration order is the display order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigurationSchema {
    settings: Vec<SettingDescriptor>,
}

impl ConfigurationSchema {
    pub fn new(settings: Vec<SettingDescriptor>) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &[SettingDescriptor] {
        &self.settings
    }

    pub fn get(&self, name: &str) -> Option<&SettingDescriptor> {
        self.settings.iter().find(|s| s.name == name)
    }

    /// Names of secret settings.
    pub fn secret_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.settings.iter().filter(|s| s.secret).map(|s| s.name)
    }

    /// Validates raw settings, filling defaults for missing optional fields.
    ///
    /// Error messages name the offending setting but never echo its value.
    pub fn validate(&self, raw: &Map<String, Value>) -> Result<ConnectorConfig> {
        let mut values = BTreeMap::new();

        for setting in &self.settings {
            let value = raw.get(setting.name).filter(|v| !v.is_null());

            let value = match value {
                Some(v) => Some(setting.setting_type.coerce(v).ok_or_else(|| {
                    RunnerError::config(format!(
                        "Setting '{}' must be a {}",
                        setting.name,
                        setting.setting_type.as_str()
                    ))
                })?),
                None => None,
            };

            match value {
                Some(Value::String(s)) if setting.required && s.trim().is_empty() => {
                    return Err(RunnerError::config(format!(
                        "Missing required setting '{}'",
                        setting.name
                    )));
                }
                Some(v) => {
                    values.insert(setting.name.to_string(), v);
                }
                None if setting.required => {
                    return Err(RunnerError::config(format!(
                        "Missing required setting '{}'",
                        setting.name
                    )));
                }
                None => {
                    if let Some(default) = &setting.default {
                        values.insert(setting.name.to_string(), default.clone());
                    }
                }
            }
        }

        for key in raw.keys().filter(|k| self.get(k).is_none()) {
            debug!("Ignoring unrecognized setting '{}'", key);
        }

        Ok(ConnectorConfig {
            values,
            secrets: self.secret_names().map(String::from).collect(),
        })
    }
}

/// Serializes to the JSON-schema-like shape used for form generation.
impl Serialize for ConfigurationSchema {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut properties = Map::new();
        for setting in &self.settings {
            let mut prop = Map::new();
            prop.insert("type".into(), setting.setting_type.as_str().into());
            prop.insert("title".into(), setting.title.into());
            if let Some(default) = &setting.default {
                prop.insert("default".into(), default.clone());
            }
            properties.insert(setting.name.to_string(), Value::Object(prop));
        }

        let names = |pred: fn(&SettingDescriptor) -> bool| -> Vec<&'static str> {
            self.settings.iter().filter(|s| pred(s)).map(|s| s.name).collect()
        };

        let mut map = serializer.serialize_map(Some(5))?;
        map.serialize_entry("type", "object")?;
        map.serialize_entry("properties", &properties)?;
        map.serialize_entry("order", &names(|_| true))?;
        map.serialize_entry("required", &names(|s| s.required))?;
        map.serialize_entry("secret", &names(|s| s.secret))?;
        map.end()
    }
}

/// Validated, immutable settings for one runner instance.
#[derive(Clone, Default, PartialEq)]
pub struct ConnectorConfig {
    values: BTreeMap<String, Value>,
    secrets: Vec<String>,
}

impl ConnectorConfig {
    /// Returns a string setting, treating empty strings as absent.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.values
            .get(name)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.values.get(name).and_then(Value::as_bool)
    }

    pub fn get_u64(&self, name: &str) -> Option<u64> {
        self.values.get(name).and_then(Value::as_u64)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn is_secret(&self, name: &str) -> bool {
        self.secrets.iter().any(|s| s == name)
    }
}

impl fmt::Debug for ConnectorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (key, value) in &self.values {
            if self.is_secret(key) {
                map.entry(key, &"********");
            } else {
                map.entry(key, value);
            }
        }
        map.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn schema() -> ConfigurationSchema {
        ConfigurationSchema::new(vec![
            SettingDescriptor::string("host", "Hostname").required(),
            SettingDescriptor::string("catalog", "Catalog").with_default("system"),
            SettingDescriptor::boolean("use_tls", "Use TLS").with_default(true),
            SettingDescriptor::number("port", "Port"),
            SettingDescriptor::string("password", "Password").secret(),
        ])
    }

    fn raw(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_validate_fills_defaults() {
        let config = schema()
            .validate(&raw(json!({"host": "trino.example.com"})))
            .unwrap();

        assert_eq!(config.get_str("host"), Some("trino.example.com"));
        assert_eq!(config.get_str("catalog"), Some("system"));
        assert_eq!(config.get_bool("use_tls"), Some(true));
        assert_eq!(config.get_u64("port"), None);
        assert!(!config.contains("password"));
    }

    #[test]
    fn test_validate_missing_required() {
        let err = schema().validate(&raw(json!({"catalog": "hive"}))).unwrap_err();
        assert_eq!(
            err,
            RunnerError::config("Missing required setting 'host'")
        );

        let err = schema().validate(&raw(json!({"host": "  "}))).unwrap_err();
        assert!(matches!(err, RunnerError::Configuration(_)));
    }

    #[test]
    fn test_validate_wrong_type_does_not_echo_value() {
        let err = schema()
            .validate(&raw(json!({"host": "h", "password": 12345})))
            .unwrap_err();
        assert_eq!(err, RunnerError::config("Setting 'password' must be a string"));
        assert!(!err.to_string().contains("12345"));
    }

    #[test]
    fn test_explicit_value_overrides_default() {
        let config = schema()
            .validate(&raw(json!({"host": "h", "use_tls": false, "port": 8443})))
            .unwrap();
        assert_eq!(config.get_bool("use_tls"), Some(false));
        assert_eq!(config.get_u64("port"), Some(8443));
    }

    #[test]
    fn test_string_spellings_are_coerced() {
        let config = schema()
            .validate(&raw(json!({"host": "h", "use_tls": " FALSE ", "port": "8443"})))
            .unwrap();
        assert_eq!(config.get_bool("use_tls"), Some(false));
        assert_eq!(config.get_u64("port"), Some(8443));

        let err = schema()
            .validate(&raw(json!({"host": "h", "use_tls": "yes"})))
            .unwrap_err();
        assert_eq!(err, RunnerError::config("Setting 'use_tls' must be a boolean"));

        let err = schema()
            .validate(&raw(json!({"host": "h", "port": "eighty"})))
            .unwrap_err();
        assert_eq!(err, RunnerError::config("Setting 'port' must be a number"));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = schema()
            .validate(&raw(json!({"host": "h", "password": "hunter2"})))
            .unwrap();

        let debug = format!("{:?}", config);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("********"));
        assert!(debug.contains("\"h\""));
        assert_eq!(config.get_str("password"), Some("hunter2"));
    }

    #[test]
    fn test_schema_wire_shape() {
        let value = serde_json::to_value(schema()).unwrap();

        assert_eq!(value["type"], json!("object"));
        assert_eq!(
            value["order"],
            json!(["host", "catalog", "use_tls", "port", "password"])
        );
        assert_eq!(value["required"], json!(["host"]));
        assert_eq!(value["secret"], json!(["password"]));
        assert_eq!(
            value["properties"]["catalog"],
            json!({"type": "string", "title": "Catalog", "default": "system"})
        );
    }
}
