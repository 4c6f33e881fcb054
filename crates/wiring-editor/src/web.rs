#![cfg(target_arch = "wasm32")]

use wasm_bindgen::prelude::*;

use crate::actions::Action;
use crate::controls::UiSpec;
use crate::settings::EditorSettings;
use crate::state::{InitTicket, State};
use crate::storage::{PersistenceError, Storage};
use crate::storage_key::SessionState;
use crate::store::Store;

#[wasm_bindgen(start)]
pub fn start() {
    console_error_panic_hook::set_once();
}

/// `window.localStorage` or `window.sessionStorage`. Either may be
/// missing (privacy settings, sandboxed frames); reads then find nothing
/// and writes fail.
pub struct BrowserStorage {
    inner: Option<web_sys::Storage>,
}

impl BrowserStorage {
    pub fn local() -> Self {
        let inner = web_sys::window()
            .and_then(|window| window.local_storage().ok().flatten());
        Self { inner }
    }

    pub fn session() -> Self {
        let inner = web_sys::window()
            .and_then(|window| window.session_storage().ok().flatten());
        Self { inner }
    }
}

fn js_reason(value: JsValue) -> String {
    value.as_string().unwrap_or_else(|| format!("{value:?}"))
}

impl Storage for BrowserStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.inner.as_ref()?.get_item(key).ok().flatten()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), PersistenceError> {
        let storage =
            self.inner.as_ref().ok_or(PersistenceError::Unavailable)?;
        storage
            .set_item(key, value)
            .map_err(|e| PersistenceError::Write {
                key: key.to_string(),
                reason: js_reason(e),
            })
    }

    fn remove(&mut self, key: &str) -> Result<(), PersistenceError> {
        let storage =
            self.inner.as_ref().ok_or(PersistenceError::Unavailable)?;
        storage
            .remove_item(key)
            .map_err(|e| PersistenceError::Write {
                key: key.to_string(),
                reason: js_reason(e),
            })
    }
}

fn js_error(e: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&e.to_string())
}

/// Editor session handle for the dashboard page. Every argument and
/// result is JSON text.
#[wasm_bindgen]
pub struct WiringSession {
    state: State,
    pending_init: Option<InitTicket>,
}

#[wasm_bindgen]
impl WiringSession {
    #[wasm_bindgen(constructor)]
    pub fn new(
        settings_json: Option<String>,
    ) -> Result<WiringSession, JsValue> {
        let settings: EditorSettings = match settings_json {
            Some(text) => serde_json::from_str(&text).map_err(js_error)?,
            None => EditorSettings::default(),
        };
        let store = Store::new(
            settings,
            Box::new(BrowserStorage::local()),
            Box::new(BrowserStorage::session()),
        );
        Ok(WiringSession {
            state: State::new(store),
            pending_init: None,
        })
    }

    /// Start loading the UI spec and session state; returns the ticket the
    /// matching `finishInit` call must pass back.
    #[wasm_bindgen(js_name = beginInit)]
    pub fn begin_init(&mut self) -> u32 {
        let ticket = self.state.begin_init();
        self.pending_init = Some(ticket);
        ticket.generation() as u32
    }

    /// Install a fetched spec and optional session state. Returns false
    /// when a newer initialization started or the session was closed.
    #[wasm_bindgen(js_name = finishInit)]
    pub fn finish_init(
        &mut self,
        ticket: u32,
        spec_json: &str,
        session_json: Option<String>,
    ) -> Result<bool, JsValue> {
        let Some(pending) = self.pending_init else {
            return Ok(false);
        };
        if pending.generation() as u32 != ticket {
            return Ok(false);
        }
        let spec: UiSpec = serde_json::from_str(spec_json).map_err(js_error)?;
        let session = match session_json {
            Some(text) => Some(
                serde_json::from_str::<SessionState>(&text)
                    .map_err(js_error)?,
            ),
            None => None,
        };
        Ok(self.state.finish_init(pending, spec, session))
    }

    /// Apply one action given as `{"type": ..., ...}` and flush.
    pub fn dispatch(&mut self, action_json: &str) -> Result<(), JsValue> {
        let action: Action =
            serde_json::from_str(action_json).map_err(js_error)?;
        self.state.dispatch(action);
        self.state.flush();
        Ok(())
    }

    pub fn view(&self) -> Result<String, JsValue> {
        serde_json::to_string(&self.state.view()).map_err(js_error)
    }

    /// Control writes to POST to the backend, oldest first.
    #[wasm_bindgen(js_name = takeOutgoing)]
    pub fn take_outgoing(&mut self) -> Result<String, JsValue> {
        serde_json::to_string(&self.state.take_outgoing()).map_err(js_error)
    }

    pub fn close(&mut self) {
        self.state.close();
        self.pending_init = None;
    }

    #[wasm_bindgen(js_name = isClosed)]
    pub fn is_closed(&self) -> bool {
        self.state.is_closed()
    }
}
