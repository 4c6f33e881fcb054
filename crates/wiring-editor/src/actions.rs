use serde::Deserialize;
use std::collections::BTreeMap;
use wiring::Position;

use crate::controls::{Controls, RunStatus, ServerMessage, UiSpec};
use crate::effects::Effect;
use crate::error::validate_port_name;
use crate::storage_key::SessionState;
use crate::store::{NEW_PORT, PendingConnection, PromptMode, Store};

/// Actions that can be dispatched to modify the editor state
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    // Connections
    /// A connection drag ended; either handle may be the new-port
    /// placeholder
    BeginConnect {
        source: String,
        source_handle: String,
        target: String,
        target_handle: String,
    },
    /// Update the port names typed into the connection prompt
    SetPendingPorts {
        source_port: String,
        target_port: String,
    },
    ConfirmPendingConnection,
    CancelPendingConnection,
    /// Connect two existing or new ports
    Connect {
        source: String,
        source_port: String,
        target: String,
        target_port: String,
    },
    Disconnect { edge_id: String },
    RemoveEdges { edge_ids: Vec<String> },
    RemoveNodes { node_ids: Vec<String> },
    /// Nodes were dragged to new positions
    MoveNodes { positions: BTreeMap<String, Position> },

    // Raw wiring editor
    SetRawWiringText { text: String },
    SetRawEditorOpen { open: bool },
    ApplyRawWiringText,
    ClearWiringError,

    // Layout
    ToggleHidden { alias: String },
    AutoLayout,
    ResetLayout,

    // Composition
    ToggleModuleActive { alias: String },

    // Backend state
    SetSpec { spec: UiSpec },
    SetControls { values: Controls },
    SetStatus { status: RunStatus },
    ServerMessage { message: ServerMessage },
    SetSessionState { session: SessionState },
}

impl Action {
    /// Actions that change the wiring, positions or composition. These
    /// are dropped while a run is active.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Action::BeginConnect { .. }
                | Action::ConfirmPendingConnection
                | Action::Connect { .. }
                | Action::Disconnect { .. }
                | Action::RemoveEdges { .. }
                | Action::RemoveNodes { .. }
                | Action::MoveNodes { .. }
                | Action::ApplyRawWiringText
                | Action::ToggleModuleActive { .. }
        )
    }
}

/// Apply a single action to modify the store state
pub fn update(store: &mut Store, action: Action) -> Vec<Effect> {
    if store.is_locked() && action.is_structural() {
        tracing::debug!(?action, "ignoring edit while the simulation runs");
        return vec![];
    }

    match action {
        // Connections
        Action::BeginConnect {
            source,
            source_handle,
            target,
            target_handle,
        } => {
            if [&source, &source_handle, &target, &target_handle]
                .iter()
                .any(|part| part.is_empty())
            {
                return vec![];
            }
            let new_source = source_handle == NEW_PORT;
            let new_target = target_handle == NEW_PORT;
            if !new_source && !new_target {
                return store.connect(
                    &source,
                    &source_handle,
                    &target,
                    &target_handle,
                );
            }
            let mode = match (new_source, new_target) {
                (true, true) => PromptMode::Both,
                (true, false) => PromptMode::Source,
                _ => PromptMode::Target,
            };
            store.pending_connection = Some(PendingConnection {
                source,
                target,
                source_port: if new_source {
                    String::new()
                } else {
                    source_handle
                },
                target_port: if new_target {
                    String::new()
                } else {
                    target_handle
                },
                mode,
            });
            vec![]
        }
        Action::SetPendingPorts {
            source_port,
            target_port,
        } => {
            if let Some(pending) = &mut store.pending_connection {
                pending.source_port = source_port;
                pending.target_port = target_port;
            }
            vec![]
        }
        Action::ConfirmPendingConnection => {
            let Some(pending) = store.pending_connection.clone() else {
                return vec![];
            };
            let source_port = pending.source_port.trim();
            let target_port = pending.target_port.trim();
            if let Err(e) = validate_port_name(source_port)
                .and_then(|_| validate_port_name(target_port))
            {
                store.wiring_issue = Some(e.into());
                return vec![];
            }
            if source_port.is_empty() || target_port.is_empty() {
                return vec![];
            }
            store.pending_connection = None;
            store.connect(
                &pending.source,
                source_port,
                &pending.target,
                target_port,
            )
        }
        Action::CancelPendingConnection => {
            store.pending_connection = None;
            vec![]
        }
        Action::Connect {
            source,
            source_port,
            target,
            target_port,
        } => store.connect(&source, &source_port, &target, &target_port),
        Action::Disconnect { edge_id } => store.remove_edges(&[edge_id]),
        Action::RemoveEdges { edge_ids } => store.remove_edges(&edge_ids),
        Action::RemoveNodes { node_ids } => store.remove_nodes(&node_ids),
        Action::MoveNodes { positions } => {
            for (id, position) in positions {
                if let Some(node) = store.graph.node_mut(&id) {
                    node.position = position;
                }
            }
            let write = store.layout.store_positions(store.graph.positions());
            store.apply_layout_write(write)
        }

        // Raw wiring editor
        Action::SetRawWiringText { text } => {
            store.raw_text = text;
            store.raw_editor_open = true;
            vec![]
        }
        Action::SetRawEditorOpen { open } => {
            store.raw_editor_open = open;
            if !open {
                store.raw_text = store.wiring_text();
            }
            vec![]
        }
        Action::ApplyRawWiringText => {
            match wiring::parse_wiring_text(&store.raw_text) {
                Ok(entries) => {
                    let text = wiring::NormalizedWiring::from_entries(&entries)
                        .to_json_pretty();
                    store.raw_editor_open = false;
                    store.commit_wiring_text(text)
                }
                Err(e) => {
                    tracing::debug!("raw wiring rejected: {e}");
                    store.wiring_issue = Some(e.into());
                    store.raw_editor_open = true;
                    vec![]
                }
            }
        }
        Action::ClearWiringError => {
            store.wiring_issue = None;
            vec![]
        }

        // Layout
        Action::ToggleHidden { alias } => {
            let write = store.layout.toggle_hidden(&alias);
            store.apply_layout_write(write)
        }
        Action::AutoLayout => store.auto_layout(),
        Action::ResetLayout => {
            for node in &mut store.graph.nodes {
                node.position = Position::ORIGIN;
            }
            store.graph.needs_layout = !store.graph.nodes.is_empty();
            let write = store.layout.reset_layout();
            store.apply_layout_write(write)
        }

        // Composition
        Action::ToggleModuleActive { alias } => {
            store.toggle_module_active(&alias)
        }

        // Backend state
        Action::SetSpec { spec } => store.apply_spec(spec),
        Action::SetControls { values } => store.set_controls(values),
        Action::SetStatus { status } => {
            store.status = status;
            vec![]
        }
        Action::ServerMessage { message } => {
            if let Some(status) = message.run_status() {
                store.status = status;
            }
            vec![]
        }
        Action::SetSessionState { session } => store.set_session(session),
    }
}
