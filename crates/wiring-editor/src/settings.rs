use serde::{Deserialize, Serialize};
use wiring::{LayeredLayout, LayoutDirection};

/// Bounds a setting may take, so values read from disk stay usable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SettingRange {
    pub min: f64,
    pub max: f64,
}

impl SettingRange {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn clamp(&self, value: f64) -> f64 {
        if value.is_nan() {
            return self.min;
        }
        value.clamp(self.min, self.max)
    }
}

pub const NODE_SIZE_RANGE: SettingRange = SettingRange::new(40.0, 800.0);
pub const GAP_RANGE: SettingRange = SettingRange::new(0.0, 400.0);
pub const MARGIN_RANGE: SettingRange = SettingRange::new(1.0, 400.0);

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutSettings {
    pub direction: LayoutDirection,
    pub layered: LayeredLayout,
}

impl LayoutSettings {
    /// Copy with every dimension inside its range. The margin stays
    /// positive so placed nodes never sit at the origin.
    pub fn sanitized(&self) -> Self {
        let layered = &self.layered;
        Self {
            direction: self.direction,
            layered: LayeredLayout {
                node_width: NODE_SIZE_RANGE.clamp(layered.node_width),
                node_height: NODE_SIZE_RANGE.clamp(layered.node_height),
                node_gap: GAP_RANGE.clamp(layered.node_gap),
                rank_gap: GAP_RANGE.clamp(layered.rank_gap),
                margin: MARGIN_RANGE.clamp(layered.margin),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorSettings {
    pub layout: LayoutSettings,
    /// Remember control values per model/space in session storage.
    pub remember_controls: bool,
    /// Write a local wiring draft next to every wiring change.
    pub keep_local_draft: bool,
}

impl Default for EditorSettings {
    fn default() -> Self {
        Self {
            layout: LayoutSettings::default(),
            remember_controls: true,
            keep_local_draft: true,
        }
    }
}
