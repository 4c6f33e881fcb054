use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use wiring::{
    AutoLayout, DerivedGraph, GraphEdge, GraphNode, NormalizedWiring,
    PortDeclarations, PortDirection, PortRef, derive_graph,
    parse_wiring_text,
};

use crate::composition::{CompositionRegistry, CompositionToggle};
use crate::controls::{
    self, ControlValue, Controls, RunStatus, UiSpec, value_to_text,
};
use crate::draft::WiringDraft;
use crate::effects::Effect;
use crate::error::{WiringIssue, validate_port_name};
use crate::fingerprint::Fingerprint;
use crate::layout_store::{
    LayoutBacking, LayoutRecord, LayoutStore, LayoutWrite,
};
use crate::settings::EditorSettings;
use crate::storage::{PersistenceError, Storage};
use crate::storage_key::{
    GENERIC_CONTROLS_KEY, GENERIC_KEY, SessionState, layout_key,
    resolve_controls_key, resolve_storage_key,
};

/// Handle a connection drag can end on to ask for a new port name.
pub const NEW_PORT: &str = "__new__";

/// Which port names the connection prompt still needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptMode {
    Source,
    Target,
    Both,
}

/// A connection waiting for port names from the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingConnection {
    pub source: String,
    pub target: String,
    pub source_port: String,
    pub target_port: String,
    pub mode: PromptMode,
}

/// Inputs the graph is derived from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphKey {
    pub wiring: String,
    pub layout: String,
    pub ports: String,
}

/// Everything a host needs to render the editor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EditorView {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    pub needs_layout: bool,
    pub module_count: usize,
    pub connection_count: usize,
    pub hidden_count: usize,
    pub hidden_modules: Vec<String>,
    pub module_catalog: Vec<String>,
    pub locked: bool,
    pub error: Option<String>,
    pub raw_text: String,
    pub raw_editor_open: bool,
    pub pending_connection: Option<PendingConnection>,
    pub candidates: Option<Vec<String>>,
    pub active_modules: Vec<String>,
    pub storage_key: String,
}

pub struct Store {
    pub settings: EditorSettings,
    pub spec: Option<UiSpec>,
    pub controls: Controls,
    pub status: RunStatus,
    pub session: Option<SessionState>,
    pub storage_key: String,
    pub controls_key: String,
    pub graph: DerivedGraph,
    pub wiring_issue: Option<WiringIssue>,
    pub raw_text: String,
    pub raw_editor_open: bool,
    pub pending_connection: Option<PendingConnection>,
    pub composition: CompositionRegistry,
    pub layout: LayoutStore,
    /// Last wiring text written under the current storage key.
    local_draft: Option<String>,
    local_storage: Box<dyn Storage>,
    session_storage: Box<dyn Storage>,
    layout_engine: Box<dyn AutoLayout>,
    graph_gate: Fingerprint<GraphKey>,
    /// Control writes waiting for the host to send them.
    outgoing: Vec<Controls>,
}

impl Store {
    pub fn new(
        settings: EditorSettings,
        local_storage: Box<dyn Storage>,
        session_storage: Box<dyn Storage>,
    ) -> Self {
        let layout_settings = settings.layout.sanitized();
        let layout =
            LayoutStore::load_local(local_storage.as_ref(), GENERIC_KEY);
        let local_draft = WiringDraft::load(local_storage.as_ref(), GENERIC_KEY)
            .map(|draft| draft.wiring);
        Self {
            settings,
            spec: None,
            controls: Controls::new(),
            status: RunStatus::default(),
            session: None,
            storage_key: GENERIC_KEY.to_string(),
            controls_key: GENERIC_CONTROLS_KEY.to_string(),
            graph: DerivedGraph::default(),
            wiring_issue: None,
            raw_text: String::new(),
            raw_editor_open: false,
            pending_connection: None,
            composition: CompositionRegistry::new(),
            layout,
            local_draft,
            local_storage,
            session_storage,
            layout_engine: Box::new(layout_settings.layered),
            graph_gate: Fingerprint::new(),
            outgoing: Vec::new(),
        }
    }

    /// Replace the auto-layout collaborator.
    pub fn with_layout_engine(mut self, engine: Box<dyn AutoLayout>) -> Self {
        self.layout_engine = engine;
        self
    }

    /// Structural edits are refused while a run is active.
    pub fn is_locked(&self) -> bool {
        self.status.running
    }

    pub fn local_storage(&self) -> &dyn Storage {
        self.local_storage.as_ref()
    }

    pub fn local_storage_mut(&mut self) -> &mut dyn Storage {
        self.local_storage.as_mut()
    }

    pub fn session_storage(&self) -> &dyn Storage {
        self.session_storage.as_ref()
    }

    pub fn graph_builds(&self) -> u64 {
        self.graph_gate.builds()
    }

    // ------------------------------------------------------------------
    // Control text
    // ------------------------------------------------------------------

    fn has_control(&self, name: &str) -> bool {
        self.spec
            .as_ref()
            .is_some_and(|spec| spec.has_json_control(name))
    }

    /// Current text of a JSON control, its default when unset, or `None`
    /// when the UI spec does not declare it.
    pub fn control_text(&self, name: &str, fallback: &str) -> Option<String> {
        let control = self.spec.as_ref()?.json_control(name)?;
        Some(match self.controls.get(name) {
            Some(value) => value.to_text(),
            None => control
                .default
                .clone()
                .unwrap_or_else(|| fallback.to_string()),
        })
    }

    /// The wiring the graph is derived from: the server control when it
    /// exists, otherwise the local draft.
    pub fn wiring_text(&self) -> String {
        self.control_text(controls::WIRING, controls::DEFAULT_WIRING)
            .or_else(|| self.local_draft.clone())
            .unwrap_or_else(|| controls::DEFAULT_WIRING.to_string())
    }

    pub fn ports_text(&self) -> String {
        self.control_text(
            controls::MODULE_PORTS,
            controls::DEFAULT_MODULE_PORTS,
        )
        .unwrap_or_else(|| controls::DEFAULT_MODULE_PORTS.to_string())
    }

    pub fn models_text(&self) -> String {
        self.control_text(controls::MODELS, controls::DEFAULT_MODELS)
            .unwrap_or_else(|| controls::DEFAULT_MODELS.to_string())
    }

    pub fn port_declarations(&self) -> PortDeclarations {
        PortDeclarations::parse(&self.ports_text())
    }

    pub fn declared_modules(&self) -> Vec<String> {
        self.spec
            .as_ref()
            .map(|spec| spec.modules.clone())
            .unwrap_or_default()
    }

    pub fn graph_key(&self) -> GraphKey {
        GraphKey {
            wiring: self.wiring_text(),
            layout: self.layout.text(),
            ports: self.ports_text(),
        }
    }

    // ------------------------------------------------------------------
    // Derivation
    // ------------------------------------------------------------------

    /// Re-derive the graph when wiring, layout or port declarations
    /// changed since the last build.
    pub fn ensure_graph_fresh(&mut self) -> Vec<Effect> {
        let key = self.graph_key();
        if !self.graph_gate.advance(key.clone()) {
            return vec![];
        }

        let entries = match parse_wiring_text(&key.wiring) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::debug!("keeping last graph, wiring is invalid: {e}");
                self.wiring_issue = Some(e.into());
                self.raw_text = key.wiring;
                return vec![];
            }
        };
        self.wiring_issue = None;

        let record = self.layout.record().clone();
        let mut graph = derive_graph(
            &entries,
            &self.declared_modules(),
            &self.port_declarations(),
            &record.hidden(),
            &self.graph.nodes,
        );
        for node in &mut graph.nodes {
            if let Some(position) = record.nodes.get(&node.id) {
                node.position = *position;
            }
        }

        let mut effects = Vec::new();
        if graph.needs_layout && record.nodes.is_empty() {
            tracing::debug!(
                nodes = graph.nodes.len(),
                "placing graph without stored positions"
            );
            let (placed, write) = self.layout.auto_layout(
                self.layout_engine.as_ref(),
                self.settings.layout.direction,
                &graph.nodes,
                &graph.edges,
            );
            graph.nodes = placed;
            effects.extend(self.apply_layout_write(write));
            let settled = self.graph_key();
            self.graph_gate.settle(settled);
        }
        graph.needs_layout = !graph.nodes.is_empty()
            && graph.nodes.iter().all(|node| node.position.is_origin());

        self.graph = graph;
        if !self.raw_editor_open {
            self.raw_text = key.wiring;
        }
        effects
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Set control values locally and queue them for the backend.
    pub fn write_controls(&mut self, values: Controls) -> Vec<Effect> {
        if values.is_empty() {
            return vec![];
        }
        self.controls
            .extend(values.iter().map(|(k, v)| (k.clone(), v.clone())));
        if values.contains_key(controls::WIRING_LAYOUT) {
            self.reload_control_layout();
        }
        vec![Effect::PushControls { values }, Effect::RememberControls]
    }

    fn write_control(&mut self, name: &str, text: String) -> Vec<Effect> {
        let mut values = Controls::new();
        values.insert(name.to_string(), ControlValue::Text(text));
        self.write_controls(values)
    }

    pub fn apply_layout_write(&mut self, write: LayoutWrite) -> Vec<Effect> {
        match write {
            LayoutWrite::Control { text } => {
                self.write_control(controls::WIRING_LAYOUT, text)
            }
            LayoutWrite::Local { key, text } => {
                vec![Effect::WriteLocal { key, value: text }]
            }
        }
    }

    /// Make `text` the current wiring: the control when the backend has
    /// one, and the local draft.
    pub fn commit_wiring_text(&mut self, text: String) -> Vec<Effect> {
        let mut effects = Vec::new();
        self.raw_text = text.clone();
        self.wiring_issue = None;
        let has_control = self.has_control(controls::WIRING);
        if has_control {
            effects.extend(self.write_control(controls::WIRING, text.clone()));
        }
        if !has_control || self.settings.keep_local_draft {
            effects.push(Effect::WriteLocal {
                key: self.storage_key.clone(),
                value: WiringDraft::now(text.clone()).to_json(),
            });
        }
        self.local_draft = Some(text);
        effects
    }

    /// Re-encode the full edge set, hidden modules included, and commit it.
    pub fn persist_wiring(&mut self) -> Vec<Effect> {
        let text =
            NormalizedWiring::from_edges(&self.graph.edges).to_json_pretty();
        self.commit_wiring_text(text)
    }

    /// Add both ports to their modules, on the canvas and in the
    /// `module_ports` control when the backend exposes it.
    pub fn ensure_ports(
        &mut self,
        source: &PortRef,
        target: &PortRef,
    ) -> Vec<Effect> {
        let sides = [
            (source, PortDirection::Output),
            (target, PortDirection::Input),
        ];
        for (port, direction) in sides {
            if let Some(node) = self.graph.node_mut(&port.module) {
                let list = match direction {
                    PortDirection::Input => &mut node.inputs,
                    PortDirection::Output => &mut node.outputs,
                };
                if !list.contains(&port.port) {
                    list.push(port.port.clone());
                    list.sort();
                }
            }
        }

        if !self.has_control(controls::MODULE_PORTS) {
            return vec![];
        }
        let mut declarations = self.port_declarations();
        let mut changed = false;
        for (port, direction) in sides {
            changed |=
                declarations.ensure_port(&port.module, direction, &port.port);
        }
        if !changed {
            return vec![];
        }
        self.write_control(
            controls::MODULE_PORTS,
            declarations.to_json_pretty(),
        )
    }

    // ------------------------------------------------------------------
    // Edits
    // ------------------------------------------------------------------

    pub fn connect(
        &mut self,
        source: &str,
        source_port: &str,
        target: &str,
        target_port: &str,
    ) -> Vec<Effect> {
        if let Err(e) = validate_port_name(source_port)
            .and_then(|_| validate_port_name(target_port))
        {
            tracing::debug!("rejected connection: {e}");
            self.wiring_issue = Some(e.into());
            return vec![];
        }
        if [source, source_port, target, target_port]
            .iter()
            .any(|part| part.is_empty())
        {
            return vec![];
        }

        let from = PortRef::new(source, source_port);
        let to = PortRef::new(target, target_port);
        let mut effects = self.ensure_ports(&from, &to);

        let exists = self
            .graph
            .edges
            .iter()
            .any(|edge| edge.source_ref() == from && edge.target_ref() == to);
        if !exists {
            let n = self.graph.edges.len() + 1;
            let id = format!("e-{n}-{from}->{to}");
            self.graph.edges.push(GraphEdge::connecting(id, &from, &to));
        }
        effects.extend(self.persist_wiring());
        effects
    }

    pub fn remove_edges(&mut self, edge_ids: &[String]) -> Vec<Effect> {
        let before = self.graph.edges.len();
        self.graph.edges.retain(|edge| !edge_ids.contains(&edge.id));
        if self.graph.edges.len() == before {
            return vec![];
        }
        self.persist_wiring()
    }

    /// Drop nodes and every edge touching them.
    pub fn remove_nodes(&mut self, node_ids: &[String]) -> Vec<Effect> {
        self.graph.nodes.retain(|node| !node_ids.contains(&node.id));
        let before = self.graph.edges.len();
        self.graph
            .edges
            .retain(|edge| !node_ids.iter().any(|id| edge.touches(id)));
        if self.graph.edges.len() == before {
            return vec![];
        }
        self.persist_wiring()
    }

    /// Remove every edge touching `alias`; true when any was removed.
    fn detach(&mut self, alias: &str) -> bool {
        let before = self.graph.edges.len();
        self.graph.edges.retain(|edge| !edge.touches(alias));
        self.graph.edges.len() != before
    }

    /// Place the whole graph with the auto-layout collaborator.
    pub fn auto_layout(&mut self) -> Vec<Effect> {
        let (placed, write) = self.layout.auto_layout(
            self.layout_engine.as_ref(),
            self.settings.layout.direction,
            &self.graph.nodes,
            &self.graph.edges,
        );
        self.graph.nodes = placed;
        self.graph.needs_layout = false;
        self.apply_layout_write(write)
    }

    pub fn set_module_hidden(
        &mut self,
        alias: &str,
        hidden: bool,
    ) -> Vec<Effect> {
        let write = self.layout.set_hidden(alias, hidden);
        self.apply_layout_write(write)
    }

    pub fn toggle_module_active(&mut self, alias: &str) -> Vec<Effect> {
        if !self.has_control(controls::MODELS) {
            return vec![];
        }
        let Some(toggle) = self.composition.toggle(&self.models_text(), alias)
        else {
            tracing::debug!(alias, "module is not part of the catalogue");
            return vec![];
        };
        match toggle {
            CompositionToggle::Deactivated { models } => {
                let mut effects = self.write_control(controls::MODELS, models);
                effects.extend(self.set_module_hidden(alias, true));
                if self.detach(alias) {
                    effects.extend(self.persist_wiring());
                }
                effects
            }
            CompositionToggle::Activated { models } => {
                let mut effects = self.write_control(controls::MODELS, models);
                effects.extend(self.set_module_hidden(alias, false));
                effects
            }
        }
    }

    // ------------------------------------------------------------------
    // Backend state
    // ------------------------------------------------------------------

    /// Install a spec: capture the composition catalogue, seed the
    /// controls that have no value yet and reload the layout.
    ///
    /// A seed is the control default, the local draft for `wiring`, or
    /// the value remembered for this model or space, the latter winning.
    /// Values already held (pushed by the server or set by an edit) are
    /// kept when the same spec is loaded again.
    pub fn apply_spec(&mut self, spec: UiSpec) -> Vec<Effect> {
        if let Some(models) = spec.json_control(controls::MODELS) {
            self.composition.capture_defaults(
                models.default.as_deref().unwrap_or(controls::DEFAULT_MODELS),
            );
        }

        let mut seeded = Controls::new();
        for control in &spec.controls {
            if let (Some(name), Some(value)) =
                (control.name(), control.default_value())
            {
                seeded.insert(name.to_string(), value);
            }
        }
        if spec.has_json_control(controls::MODELS) {
            seeded.insert(
                controls::MODELS.to_string(),
                ControlValue::from(controls::DEFAULT_MODELS),
            );
        }
        if spec.has_json_control(controls::WIRING)
            && let Some(draft) = &self.local_draft
        {
            seeded.insert(
                controls::WIRING.to_string(),
                ControlValue::Text(draft.clone()),
            );
        }
        let names: BTreeSet<&str> = spec.control_names().collect();
        for (name, value) in self.remembered_controls() {
            if names.contains(name.as_str()) {
                seeded.insert(name, value);
            }
        }
        for (name, value) in seeded {
            self.controls.entry(name).or_insert(value);
        }

        self.spec = Some(spec);
        let mut effects = self.rekey();
        self.reload_layout();
        self.graph_gate.invalidate();
        effects.push(Effect::RememberControls);
        effects
    }

    /// Merge control values coming from the host or the backend.
    pub fn set_controls(&mut self, values: Controls) -> Vec<Effect> {
        let layout_changed = values.contains_key(controls::WIRING_LAYOUT);
        self.controls.extend(values);
        if layout_changed {
            self.reload_control_layout();
        }
        vec![Effect::RememberControls]
    }

    pub fn set_session(&mut self, session: SessionState) -> Vec<Effect> {
        self.controls_key = resolve_controls_key(Some(&session));
        self.session = Some(session);
        self.rekey()
    }

    /// Recompute the storage key. When it moves, whatever the new key
    /// lacks is carried over from memory instead of being reset.
    fn rekey(&mut self) -> Vec<Effect> {
        let title = self.spec.as_ref().map(|spec| spec.title.as_str());
        let key = resolve_storage_key(self.session.as_ref(), title);
        if key == self.storage_key {
            return vec![];
        }
        tracing::debug!(
            from = %self.storage_key,
            to = %key,
            "storage key changed"
        );

        let mut effects = Vec::new();
        match WiringDraft::load(self.local_storage.as_ref(), &key) {
            Some(draft) => self.local_draft = Some(draft.wiring),
            None => {
                if let Some(text) = &self.local_draft {
                    effects.push(Effect::WriteLocal {
                        key: key.clone(),
                        value: WiringDraft::now(text.clone()).to_json(),
                    });
                }
            }
        }

        if let LayoutBacking::Local { .. } = self.layout.backing() {
            let stored = self.local_storage.get(&layout_key(&key)).is_some();
            if stored {
                self.layout =
                    LayoutStore::load_local(self.local_storage.as_ref(), &key);
            } else {
                let record = self.layout.record().clone();
                let carried = record != LayoutRecord::default();
                self.layout = LayoutStore::local_with(&key, record);
                if carried {
                    let write = self.layout.write();
                    effects.extend(self.apply_layout_write(write));
                }
            }
        }

        self.storage_key = key;
        self.graph_gate.invalidate();
        effects
    }

    /// Pick the layout backing the UI spec calls for and load it.
    fn reload_layout(&mut self) {
        if self.has_control(controls::WIRING_LAYOUT) {
            self.reload_control_layout();
            return;
        }
        let current = layout_key(&self.storage_key);
        let loaded = matches!(
            self.layout.backing(),
            LayoutBacking::Local { key } if *key == current
        );
        if !loaded {
            self.layout = LayoutStore::load_local(
                self.local_storage.as_ref(),
                &self.storage_key,
            );
        }
    }

    fn reload_control_layout(&mut self) {
        if let Some(text) =
            self.control_text(controls::WIRING_LAYOUT, controls::DEFAULT_LAYOUT)
        {
            self.layout = LayoutStore::control_backed(&text);
        }
    }

    fn remembered_controls(&self) -> Vec<(String, ControlValue)> {
        let Some(text) = self.session_storage.get(&self.controls_key) else {
            return Vec::new();
        };
        let Ok(Value::Object(saved)) = serde_json::from_str::<Value>(&text)
        else {
            return Vec::new();
        };
        saved
            .into_iter()
            .filter_map(|(name, value)| {
                let value = match value {
                    Value::Number(number) => {
                        ControlValue::Number(number.as_f64()?)
                    }
                    Value::Null => return None,
                    other => ControlValue::Text(value_to_text(&other)),
                };
                Some((name, value))
            })
            .collect()
    }

    /// Save the current control values for this model or space.
    pub fn remember_controls(&mut self) -> Result<(), PersistenceError> {
        if !self.settings.remember_controls {
            return Ok(());
        }
        let text = serde_json::to_string(&self.controls)?;
        self.session_storage.set(&self.controls_key, &text)
    }

    pub fn queue_outgoing(&mut self, values: Controls) {
        self.outgoing.push(values);
    }

    /// Drain control writes the host still has to send.
    pub fn take_outgoing(&mut self) -> Vec<Controls> {
        std::mem::take(&mut self.outgoing)
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Every module the host can list: declared, port-declared and drawn.
    pub fn module_catalog(&self) -> Vec<String> {
        let mut catalog: BTreeSet<String> =
            self.declared_modules().into_iter().collect();
        catalog.extend(self.port_declarations().aliases().map(str::to_string));
        catalog.extend(self.graph.nodes.iter().map(|node| node.id.clone()));
        catalog.into_iter().collect()
    }

    pub fn active_modules(&self) -> Vec<String> {
        if !self.has_control(controls::MODELS) {
            return Vec::new();
        }
        CompositionRegistry::active_aliases(&self.models_text())
    }

    pub fn view(&self) -> EditorView {
        let edges: Vec<GraphEdge> =
            self.graph.visible_edges().cloned().collect();
        EditorView {
            module_count: self.graph.nodes.len(),
            connection_count: edges.len(),
            nodes: self.graph.nodes.clone(),
            edges,
            needs_layout: self.graph.needs_layout,
            hidden_count: self.layout.record().hidden_modules.len(),
            hidden_modules: self.layout.record().hidden_modules.clone(),
            module_catalog: self.module_catalog(),
            locked: self.is_locked(),
            error: self.wiring_issue.as_ref().map(WiringIssue::banner),
            raw_text: self.raw_text.clone(),
            raw_editor_open: self.raw_editor_open,
            pending_connection: self.pending_connection.clone(),
            candidates: self.composition.candidates(),
            active_modules: self.active_modules(),
            storage_key: self.storage_key.clone(),
        }
    }
}
