//! Editor state for the wiring canvas of a simulation dashboard.
//!
//! A [`State`] owns a [`Store`]. Hosts dispatch [`Action`]s, the reducer
//! updates the store and returns [`Effect`]s, and flushing applies them to
//! storage and the outgoing control queue. The graph is re-derived after
//! each flush when the wiring, layout or port declarations changed.

pub mod actions;
pub mod composition;
pub mod controls;
pub mod draft;
pub mod effects;
pub mod error;
pub mod fingerprint;
pub mod layout_store;
pub mod native;
pub mod settings;
pub mod state;
pub mod storage;
pub mod storage_key;
pub mod store;
pub mod web;

pub use actions::Action;
pub use controls::{
    Control, ControlValue, Controls, RunStatus, ServerMessage, UiSpec,
};
pub use effects::Effect;
pub use error::{ValidationError, WiringIssue};
pub use layout_store::{LayoutRecord, LayoutStore};
pub use settings::{EditorSettings, LayoutSettings};
pub use state::{InitTicket, State};
pub use storage::{MemoryStorage, PersistenceError, ReadOnlyStorage, Storage};
pub use storage_key::SessionState;
pub use store::{EditorView, Store};
