use serde_json::Value;

use crate::controls::value_to_text;

/// One external-module descriptor and the alias it is known by.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositionEntry {
    pub alias: String,
    pub descriptor: Value,
}

/// Read a `models` list. Non-objects are skipped; a repeated alias keeps
/// its first position and its last descriptor.
pub fn parse_composition(text: &str) -> Option<Vec<CompositionEntry>> {
    let Ok(Value::Array(items)) = serde_json::from_str::<Value>(text) else {
        return None;
    };
    let mut entries: Vec<CompositionEntry> = Vec::new();
    for (index, item) in items.into_iter().enumerate() {
        if !item.is_object() {
            continue;
        }
        let alias = descriptor_alias(&item, index);
        if alias.is_empty() {
            continue;
        }
        match entries.iter_mut().find(|entry| entry.alias == alias) {
            Some(existing) => existing.descriptor = item,
            None => entries.push(CompositionEntry {
                alias,
                descriptor: item,
            }),
        }
    }
    Some(entries)
}

fn descriptor_alias(descriptor: &Value, index: usize) -> String {
    ["alias", "repo_full_name", "repo"]
        .iter()
        .filter_map(|field| descriptor.get(field))
        .find(|value| !value.is_null())
        .map(value_to_text)
        .unwrap_or_else(|| format!("module-{}", index + 1))
}

fn encode(descriptors: Vec<Value>) -> String {
    serde_json::to_string_pretty(&Value::Array(descriptors))
        .unwrap_or_else(|_| String::from("[]"))
}

/// Outcome of toggling one module.
#[derive(Debug, Clone, PartialEq)]
pub enum CompositionToggle {
    /// The module was active; `models` is the new active list without it.
    Deactivated { models: String },
    /// The module was inactive; `models` has its descriptor appended.
    Activated { models: String },
}

/// Catalogue of modules that can be composed into the simulation.
///
/// The catalogue comes from the `models` control default and is captured
/// once; the active subset is the control's current value.
#[derive(Debug, Clone, Default)]
pub struct CompositionRegistry {
    catalogue: Option<Vec<CompositionEntry>>,
}

impl CompositionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture the catalogue unless one is already held. Unreadable
    /// defaults are ignored so a later spec can still provide one.
    pub fn capture_defaults(&mut self, default_text: &str) {
        if self.catalogue.is_some() {
            return;
        }
        self.catalogue = parse_composition(default_text);
    }

    pub fn is_captured(&self) -> bool {
        self.catalogue.is_some()
    }

    /// Every catalogue alias, sorted.
    pub fn candidates(&self) -> Option<Vec<String>> {
        let catalogue = self.catalogue.as_ref()?;
        let mut aliases: Vec<String> =
            catalogue.iter().map(|entry| entry.alias.clone()).collect();
        aliases.sort();
        Some(aliases)
    }

    pub fn descriptor(&self, alias: &str) -> Option<&Value> {
        self.catalogue
            .as_ref()?
            .iter()
            .find(|entry| entry.alias == alias)
            .map(|entry| &entry.descriptor)
    }

    /// Aliases of the active subset, in list order.
    pub fn active_aliases(active_text: &str) -> Vec<String> {
        parse_composition(active_text)
            .unwrap_or_default()
            .into_iter()
            .map(|entry| entry.alias)
            .collect()
    }

    /// Flip `alias` between active and inactive. `None` when there is no
    /// catalogue or an inactive alias has no catalogue entry.
    pub fn toggle(
        &self,
        active_text: &str,
        alias: &str,
    ) -> Option<CompositionToggle> {
        self.catalogue.as_ref()?;
        let active = parse_composition(active_text).unwrap_or_default();
        if active.iter().any(|entry| entry.alias == alias) {
            let models = active
                .into_iter()
                .filter(|entry| entry.alias != alias)
                .map(|entry| entry.descriptor)
                .collect();
            return Some(CompositionToggle::Deactivated {
                models: encode(models),
            });
        }
        let descriptor = self.descriptor(alias)?.clone();
        let mut models: Vec<Value> =
            active.into_iter().map(|entry| entry.descriptor).collect();
        models.push(descriptor);
        Some(CompositionToggle::Activated {
            models: encode(models),
        })
    }
}
