use serde::Deserialize;
use serde_json::Value;

/// Key used before the session context is known.
pub const GENERIC_KEY: &str = "simui:wiring:default";
pub const GENERIC_CONTROLS_KEY: &str = "simui-controls:generic";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunContext {
    pub id: Option<String>,
    pub model_id: Option<String>,
    pub space_id: Option<String>,
}

/// Draft target the editor was opened for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetContext {
    pub space_id: Option<String>,
    pub space_commit: Option<String>,
    pub model_id: Option<String>,
    pub model_commit: Option<String>,
}

/// Answer of the backend's session-state endpoint, read leniently: any
/// field that is missing, empty or not a string counts as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "Value")]
pub struct SessionState {
    pub run: RunContext,
    pub target: TargetContext,
}

impl From<Value> for SessionState {
    fn from(value: Value) -> Self {
        let run = value.get("run");
        let target = value.get("target");
        Self {
            run: RunContext {
                id: text(run, &["id"]),
                model_id: text(run, &["model_id", "modelId"]),
                space_id: text(run, &["project_id", "spaceId"]),
            },
            target: TargetContext {
                space_id: text(target, &["spaceId"]),
                space_commit: text(target, &["spaceCommit"]),
                model_id: text(target, &["modelId"]),
                model_commit: text(target, &["modelCommit"]),
            },
        }
    }
}

fn text(object: Option<&Value>, fields: &[&str]) -> Option<String> {
    let object = object?;
    fields.iter().find_map(|field| {
        object
            .get(field)
            .and_then(Value::as_str)
            .filter(|text| !text.is_empty())
            .map(str::to_string)
    })
}

/// Key under which the wiring draft and layout of this session live.
///
/// Run id, then draft space (+ commit), then draft model (+ commit), then
/// the UI spec title. Without any session context the generic key is used.
pub fn resolve_storage_key(
    session: Option<&SessionState>,
    title: Option<&str>,
) -> String {
    let Some(session) = session else {
        return GENERIC_KEY.to_string();
    };
    if let Some(run_id) = &session.run.id {
        return format!("simui:wiring:run:{run_id}");
    }
    let target = &session.target;
    if let Some(space_id) = &target.space_id {
        let commit = target.space_commit.as_deref().unwrap_or("head");
        return format!("simui:wiring:draft:space:{space_id}:{commit}");
    }
    if let Some(model_id) = &target.model_id {
        let commit = target.model_commit.as_deref().unwrap_or("head");
        return format!("simui:wiring:draft:model:{model_id}:{commit}");
    }
    let title = title.filter(|title| !title.is_empty()).unwrap_or("default");
    format!("simui:wiring:title:{title}")
}

pub fn layout_key(storage_key: &str) -> String {
    format!("{storage_key}:layout")
}

/// Session-storage key for last-used control values.
pub fn resolve_controls_key(session: Option<&SessionState>) -> String {
    let Some(session) = session else {
        return GENERIC_CONTROLS_KEY.to_string();
    };
    let model_id = session
        .target
        .model_id
        .as_ref()
        .or(session.run.model_id.as_ref());
    if let Some(model_id) = model_id {
        return format!("simui-controls:model:{model_id}");
    }
    let space_id = session
        .target
        .space_id
        .as_ref()
        .or(session.run.space_id.as_ref());
    if let Some(space_id) = space_id {
        return format!("simui-controls:space:{space_id}");
    }
    GENERIC_CONTROLS_KEY.to_string()
}
