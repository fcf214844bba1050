use std::ops::RangeInclusive;

use rand::Rng;

use crate::error::{Result, ViewerError};
use crate::inference::InferenceAdapter;
use crate::latent::ControlMap;

/// Turns slider movements into latent updates and re-renders.
pub struct Controller {
    adapter: InferenceAdapter,
    controls: ControlMap,
    scale: f32,
}

impl Controller {
    pub fn new(adapter: InferenceAdapter, controls: ControlMap, scale: f32) -> Result<Self> {
        controls.validate(adapter.latent())?;
        Ok(Self {
            adapter,
            controls,
            scale,
        })
    }

    /// Initial render of the untouched sample.
    pub fn start(&mut self) -> Result<()> {
        self.adapter.infer()?;
        Ok(())
    }

    /// One slider moved: update its coordinate and render once.
    pub fn on_control_changed(&mut self, control: usize, value: i32) -> Result<()> {
        let binding = self.controls.get(control).ok_or(ViewerError::Index {
            index: control,
            len: self.controls.len(),
        })?;
        let coordinate = value as f32 * self.scale;
        self.adapter.set_coordinate(binding.index, coordinate)?;
        tracing::debug!(control = %binding.label, index = binding.index, coordinate, "coordinate updated");
        self.adapter.infer()?;
        Ok(())
    }

    pub fn reset(&mut self) -> Result<()> {
        self.adapter.reset_latent();
        self.adapter.infer()?;
        Ok(())
    }

    /// Moves every slider to a random position in `range`, then renders once.
    pub fn randomize(&mut self, rng: &mut impl Rng, range: RangeInclusive<i32>) -> Result<()> {
        if range.is_empty() {
            return Err(ViewerError::Config {
                message: format!("slider range {range:?} is empty"),
            });
        }
        for binding in self.controls.iter() {
            let value = rng.gen_range(range.clone());
            self.adapter
                .set_coordinate(binding.index, value as f32 * self.scale)?;
        }
        self.adapter.infer()?;
        Ok(())
    }

    /// Slider position closest to the control's current coordinate.
    pub fn slider_position(&self, control: usize) -> Option<i32> {
        let binding = self.controls.get(control)?;
        let value = self.adapter.latent().coordinate(binding.index)?;
        Some((value / self.scale).round() as i32)
    }

    pub fn controls(&self) -> &ControlMap {
        &self.controls
    }

    pub fn adapter(&self) -> &InferenceAdapter {
        &self.adapter
    }

    pub fn adapter_mut(&mut self) -> &mut InferenceAdapter {
        &mut self.adapter
    }
}
