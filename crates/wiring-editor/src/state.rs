use crate::actions::{self, Action};
use crate::controls::{Controls, UiSpec};
use crate::effects::{self, Effect};
use crate::storage_key::SessionState;
use crate::store::{EditorView, Store};

/// Handle for one asynchronous initialization attempt. Only the most
/// recent ticket may finish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitTicket(u64);

impl InitTicket {
    pub fn generation(&self) -> u64 {
        self.0
    }
}

pub struct State {
    pub store: Store,
    action_queue: Vec<Action>,
    effect_queue: Vec<Effect>,
    init_generation: u64,
    closed: bool,
}

impl State {
    pub fn new(store: Store) -> Self {
        Self {
            store,
            action_queue: Vec::new(),
            effect_queue: Vec::new(),
            init_generation: 0,
            closed: false,
        }
    }

    pub fn dispatch(&mut self, action: Action) {
        if self.closed {
            tracing::debug!(?action, "session closed, dropping action");
            return;
        }
        self.action_queue.push(action);
    }

    pub fn flush_actions(&mut self) {
        let actions = std::mem::take(&mut self.action_queue);
        for action in actions {
            let mut effects = actions::update(&mut self.store, action);
            self.effect_queue.append(&mut effects);
        }
        let mut effects = self.store.ensure_graph_fresh();
        self.effect_queue.append(&mut effects);
    }

    pub fn flush_effects(&mut self) {
        let effects = std::mem::take(&mut self.effect_queue);
        for effect in effects {
            effects::run(&mut self.store, effect);
        }
    }

    pub fn flush(&mut self) {
        self.flush_actions();
        self.flush_effects();
    }

    /// Start a new initialization; any earlier ticket becomes stale.
    pub fn begin_init(&mut self) -> InitTicket {
        self.init_generation += 1;
        InitTicket(self.init_generation)
    }

    /// Install the results of an initialization. Returns false when the
    /// ticket is stale or the session was closed meanwhile.
    pub fn finish_init(
        &mut self,
        ticket: InitTicket,
        spec: UiSpec,
        session: Option<SessionState>,
    ) -> bool {
        if self.closed || ticket.0 != self.init_generation {
            tracing::debug!(
                ticket = ticket.0,
                current = self.init_generation,
                "ignoring stale initialization"
            );
            return false;
        }
        if let Some(session) = session {
            self.dispatch(Action::SetSessionState { session });
        }
        self.dispatch(Action::SetSpec { spec });
        self.flush();
        true
    }

    /// Stop accepting actions; pending initializations are abandoned.
    pub fn close(&mut self) {
        self.closed = true;
        self.action_queue.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn take_outgoing(&mut self) -> Vec<Controls> {
        self.store.take_outgoing()
    }

    pub fn view(&self) -> EditorView {
        self.store.view()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::EditorSettings;
    use crate::storage::MemoryStorage;

    fn state() -> State {
        State::new(Store::new(
            EditorSettings::default(),
            Box::new(MemoryStorage::new()),
            Box::new(MemoryStorage::new()),
        ))
    }

    fn spec(title: &str) -> UiSpec {
        serde_json::from_value(serde_json::json!({
            "version": "1",
            "title": title,
            "controls": [],
            "outputs": [],
            "modules": ["a", "b"],
        }))
        .unwrap()
    }

    #[test]
    fn test_stale_ticket_is_ignored() {
        let mut state = state();
        let first = state.begin_init();
        let second = state.begin_init();
        assert!(!state.finish_init(first, spec("old"), None));
        assert!(state.store.spec.is_none());
        assert!(state.finish_init(
            second,
            spec("new"),
            Some(SessionState::default())
        ));
        assert_eq!(state.store.spec.as_ref().unwrap().title, "new");
        assert_eq!(state.store.storage_key, "simui:wiring:title:new");
    }

    #[test]
    fn test_closed_state_drops_work() {
        let mut state = state();
        let ticket = state.begin_init();
        state.close();
        assert!(state.is_closed());
        assert!(!state.finish_init(ticket, spec("x"), None));

        state.dispatch(Action::AutoLayout);
        state.flush();
        assert!(state.store.spec.is_none());
        assert!(state.view().nodes.is_empty());
    }

    #[test]
    fn test_flush_derives_graph() {
        let mut state = state();
        let ticket = state.begin_init();
        assert!(state.finish_init(ticket, spec("demo"), None));
        let view = state.view();
        assert_eq!(view.module_count, 2);
        assert!(!view.needs_layout);
        assert_eq!(state.store.graph_builds(), 1);

        state.flush();
        assert_eq!(state.store.graph_builds(), 1);
    }
}
