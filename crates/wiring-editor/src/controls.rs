use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Control carrying the declarative wiring list.
pub const WIRING: &str = "wiring";
/// Control carrying the layout record, when the backend exposes it.
pub const WIRING_LAYOUT: &str = "wiring_layout";
/// Control carrying extra port declarations per module.
pub const MODULE_PORTS: &str = "module_ports";
/// Control carrying the active composition list.
pub const MODELS: &str = "models";

pub const DEFAULT_WIRING: &str = "[]";
pub const DEFAULT_LAYOUT: &str =
    r#"{"version":1,"nodes":{},"hidden_modules":[]}"#;
pub const DEFAULT_MODULE_PORTS: &str = "{}";
pub const DEFAULT_MODELS: &str = "[]";

/// Starting text of a well-known JSON control that declares no default.
pub fn builtin_default(name: &str) -> Option<&'static str> {
    match name {
        WIRING => Some(DEFAULT_WIRING),
        WIRING_LAYOUT => Some(DEFAULT_LAYOUT),
        MODULE_PORTS => Some(DEFAULT_MODULE_PORTS),
        MODELS => Some(DEFAULT_MODELS),
        _ => None,
    }
}

// ------------------------------------------------------------------
// UI spec
// ------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumberControl {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub default: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonControl {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// JSON-encoded default text.
    #[serde(default, deserialize_with = "text_or_json")]
    pub default: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ButtonControl {
    pub label: String,
}

/// One entry of a UI spec's `controls` list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Control {
    Number(NumberControl),
    Json(JsonControl),
    Button(ButtonControl),
}

impl Control {
    /// Buttons are actions, not values, so they carry no name.
    pub fn name(&self) -> Option<&str> {
        match self {
            Control::Number(control) => Some(&control.name),
            Control::Json(control) => Some(&control.name),
            Control::Button(_) => None,
        }
    }

    /// The value a control starts with before anything is restored.
    pub fn default_value(&self) -> Option<ControlValue> {
        match self {
            Control::Number(control) => {
                Some(ControlValue::Number(control.default))
            }
            Control::Json(control) => {
                let text = control.default.clone().unwrap_or_else(|| {
                    builtin_default(&control.name)
                        .unwrap_or_default()
                        .to_string()
                });
                Some(ControlValue::Text(text))
            }
            Control::Button(_) => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiCapabilities {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controls: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pause_resume: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reset: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub editor: Option<bool>,
}

/// Dashboard description served by the simulation backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UiSpec {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "known_controls")]
    pub controls: Vec<Control>,
    #[serde(default)]
    pub outputs: Vec<Value>,
    #[serde(default, deserialize_with = "module_names")]
    pub modules: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<UiCapabilities>,
}

impl UiSpec {
    pub fn json_control(&self, name: &str) -> Option<&JsonControl> {
        self.controls.iter().find_map(|control| match control {
            Control::Json(json) if json.name == name => Some(json),
            _ => None,
        })
    }

    pub fn has_json_control(&self, name: &str) -> bool {
        self.json_control(name).is_some()
    }

    /// Names of every value-carrying control.
    pub fn control_names(&self) -> impl Iterator<Item = &str> {
        self.controls.iter().filter_map(Control::name)
    }
}

/// Unknown control types are skipped instead of failing the whole spec.
fn known_controls<'de, D>(deserializer: D) -> Result<Vec<Control>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Vec<Value>>::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .filter_map(|value| match serde_json::from_value(value) {
            Ok(control) => Some(control),
            Err(e) => {
                tracing::debug!("skipping unsupported control: {e}");
                None
            }
        })
        .collect())
}

fn module_names<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Vec<Value>>::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .iter()
        .filter(|value| !value.is_null())
        .map(value_to_text)
        .collect())
}

/// JSON defaults arrive as text, but a backend may also inline the value.
fn text_or_json<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(match raw {
        None | Some(Value::Null) => None,
        Some(Value::String(text)) => Some(text),
        Some(other) => Some(other.to_string()),
    })
}

/// Renders a JSON scalar the way it reads in a text field.
pub(crate) fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

// ------------------------------------------------------------------
// Control values
// ------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ControlValue {
    Number(f64),
    Text(String),
}

impl ControlValue {
    pub fn to_text(&self) -> String {
        match self {
            ControlValue::Number(number) => number.to_string(),
            ControlValue::Text(text) => text.clone(),
        }
    }
}

impl From<&str> for ControlValue {
    fn from(text: &str) -> Self {
        ControlValue::Text(text.to_string())
    }
}

impl From<String> for ControlValue {
    fn from(text: String) -> Self {
        ControlValue::Text(text)
    }
}

impl From<f64> for ControlValue {
    fn from(number: f64) -> Self {
        ControlValue::Number(number)
    }
}

/// Current control values by name.
pub type Controls = BTreeMap<String, ControlValue>;

// ------------------------------------------------------------------
// Run status and push messages
// ------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunError {
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunStatus {
    pub running: bool,
    pub paused: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tick_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RunError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Snapshot,
    Tick,
    Event,
    Status,
    Heartbeat,
}

/// One message of the live push stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerMessage {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(default)]
    pub data: Value,
}

impl ServerMessage {
    /// The run status carried by this message, if any.
    pub fn run_status(&self) -> Option<RunStatus> {
        let status = match self.kind {
            MessageKind::Snapshot | MessageKind::Tick => {
                self.data.get("status")?
            }
            MessageKind::Status | MessageKind::Heartbeat => &self.data,
            MessageKind::Event => return None,
        };
        match serde_json::from_value(status.clone()) {
            Ok(status) => Some(status),
            Err(e) => {
                tracing::debug!("ignoring malformed run status: {e}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec() -> UiSpec {
        serde_json::from_value(json!({
            "version": "1",
            "title": "Predator prey",
            "controls": [
                {"type": "number", "name": "duration", "default": 10},
                {"type": "json", "name": "wiring", "default": "[]"},
                {"type": "json", "name": "module_ports", "default": {"a": {}}},
                {"type": "button", "label": "Run"},
                {"type": "slider", "name": "odd"}
            ],
            "outputs": [],
            "modules": ["prey", "predator", 3]
        }))
        .unwrap()
    }

    #[test]
    fn test_spec_skips_unknown_controls() {
        let spec = spec();
        assert_eq!(spec.controls.len(), 4);
        let names: Vec<_> = spec.control_names().collect();
        assert_eq!(names, vec!["duration", "wiring", "module_ports"]);
        assert_eq!(spec.modules, vec!["prey", "predator", "3"]);
    }

    #[test]
    fn test_json_control_defaults_are_text() {
        let spec = spec();
        assert!(spec.has_json_control(WIRING));
        assert!(!spec.has_json_control("duration"));
        assert_eq!(
            spec.json_control(MODULE_PORTS).unwrap().default.as_deref(),
            Some(r#"{"a":{}}"#)
        );
    }

    #[test]
    fn test_default_values() {
        let spec = spec();
        let defaults: Vec<_> = spec
            .controls
            .iter()
            .filter_map(Control::default_value)
            .collect();
        assert_eq!(defaults[0], ControlValue::Number(10.0));
        assert_eq!(defaults[1], ControlValue::from("[]"));
        assert_eq!(ControlValue::Number(10.0).to_text(), "10");
    }

    #[test]
    fn test_missing_json_defaults_fall_back() {
        let spec: UiSpec = serde_json::from_value(json!({
            "controls": [
                {"type": "json", "name": "wiring"},
                {"type": "json", "name": "wiring_layout", "default": null},
                {"type": "json", "name": "module_ports"},
                {"type": "json", "name": "models"},
                {"type": "json", "name": "notes"}
            ]
        }))
        .unwrap();
        let defaults: Vec<_> = spec
            .controls
            .iter()
            .filter_map(Control::default_value)
            .map(|value| value.to_text())
            .collect();
        assert_eq!(
            defaults,
            [
                DEFAULT_WIRING,
                DEFAULT_LAYOUT,
                DEFAULT_MODULE_PORTS,
                DEFAULT_MODELS,
                ""
            ]
        );
    }

    #[test]
    fn test_control_values_are_untagged() {
        let controls: Controls =
            serde_json::from_value(json!({"duration": 2.5, "wiring": "[]"}))
                .unwrap();
        assert_eq!(controls["duration"], ControlValue::Number(2.5));
        assert_eq!(controls["wiring"], ControlValue::from("[]"));
    }

    #[test]
    fn test_server_message_status() {
        let tick: ServerMessage = serde_json::from_value(json!({
            "type": "tick",
            "data": {
                "status": {"running": true, "paused": false, "tick_count": 4}
            }
        }))
        .unwrap();
        let status = tick.run_status().unwrap();
        assert!(status.running);
        assert_eq!(status.tick_count, Some(4));

        let heartbeat: ServerMessage = serde_json::from_value(json!({
            "type": "heartbeat",
            "data": {"running": false, "paused": true}
        }))
        .unwrap();
        assert!(heartbeat.run_status().unwrap().paused);

        let event: ServerMessage =
            serde_json::from_value(json!({"type": "event", "data": {"id": 1}}))
                .unwrap();
        assert_eq!(event.run_status(), None);
    }
}
