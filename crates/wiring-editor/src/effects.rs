use crate::controls::Controls;
use crate::store::Store;

/// Deferred effects that must run outside the reducer (storage and
/// backend writes)
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Queue control values for the backend
    PushControls { values: Controls },
    /// Write one entry to device-local storage
    WriteLocal { key: String, value: String },
    /// Save the current control values to session storage
    RememberControls,
}

/// Execute a single effect against the store. Storage failures are
/// logged and dropped; the in-memory value stays authoritative.
pub fn run(store: &mut Store, effect: Effect) {
    match effect {
        Effect::PushControls { values } => {
            store.queue_outgoing(values);
        }
        Effect::WriteLocal { key, value } => {
            if let Err(e) = store.local_storage_mut().set(&key, &value) {
                tracing::debug!(%key, "local storage write failed: {e}");
            }
        }
        Effect::RememberControls => {
            if let Err(e) = store.remember_controls() {
                tracing::debug!(
                    key = %store.controls_key,
                    "failed to remember controls: {e}"
                );
            }
        }
    }
}
