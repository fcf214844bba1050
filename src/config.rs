use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ViewerError};
use crate::latent::{ControlBinding, ControlMap};

pub const DEFAULT_MODEL_PATH: &str = "./model/model-checkpoint.pt";

/// Number of leading latent coordinates bound to sliders. The reference
/// model has 64 latent dimensions; the rest stay at their sample values.
pub const DEFAULT_CONTROLS: usize = 16;

/// Slider positions are integers; this maps a position to a latent value.
pub const DEFAULT_SLIDER_SCALE: f32 = 1.0;

/// Recoloring applied where the segmentation head is confident.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct OverlayStyle {
    /// Pixels with confidence strictly above this are recolored
    pub threshold: f32,
    /// Per-channel RGB gain multiplied by the confidence
    pub gain: [f32; 3],
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            threshold: 0.1,
            gain: [0.0, 255.0, 127.0],
        }
    }
}

/// Viewer settings
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// Number of controllable latent coordinates
    pub controls: usize,
    pub slider_scale: f32,
    pub slider_min: i32,
    pub slider_max: i32,
    /// On-screen canvas edge in points
    pub canvas_size: f32,
    pub overlay: OverlayStyle,
    /// Explicit control table; `z1..zN` over the first `controls`
    /// coordinates when absent
    pub bindings: Option<Vec<ControlBinding>>,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            controls: DEFAULT_CONTROLS,
            slider_scale: DEFAULT_SLIDER_SCALE,
            slider_min: -5,
            slider_max: 5,
            canvas_size: 512.0,
            overlay: OverlayStyle::default(),
            bindings: None,
        }
    }
}

impl ViewerConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| ViewerError::Config {
            message: format!("cannot read {}: {e}", path.display()),
        })?;
        serde_json::from_str(&text).map_err(|e| ViewerError::Config {
            message: format!("cannot parse {}: {e}", path.display()),
        })
    }

    /// Rejects settings the sliders cannot represent.
    pub fn validate(&self) -> Result<()> {
        let invalid = |message: String| Err(ViewerError::Config { message });
        if self.slider_min > self.slider_max {
            return invalid(format!(
                "slider range {}..={} is empty",
                self.slider_min, self.slider_max
            ));
        }
        if !self.slider_scale.is_finite() || self.slider_scale == 0.0 {
            return invalid(format!(
                "slider scale must be finite and non-zero, got {}",
                self.slider_scale
            ));
        }
        if !self.canvas_size.is_finite() || self.canvas_size <= 0.0 {
            return invalid(format!("canvas size must be positive, got {}", self.canvas_size));
        }
        if !self.overlay.threshold.is_finite() {
            return invalid("overlay threshold must be finite".into());
        }
        Ok(())
    }

    /// The configured table, or `z1..zN` over the first `controls`
    /// coordinates.
    pub fn control_map(&self) -> Result<ControlMap> {
        match &self.bindings {
            Some(bindings) => ControlMap::new(bindings.clone()),
            None => Ok(ControlMap::leading(self.controls)),
        }
    }

    pub fn slider_range(&self) -> std::ops::RangeInclusive<i32> {
        self.slider_min..=self.slider_max
    }
}
