use serde::{Deserialize, Serialize};

use crate::error::{Result, ViewerError};

/// Latent code of one validation-set sample, encoded by the reference model.
/// The first decode shows this sample.
pub const SAMPLE_LATENT: [f32; 64] = [
    -8.8492e-01, 3.2924e-01, 1.6989e+00, -1.1646e+00, -6.7215e-01, -8.3765e-01, 1.0475e+00,
    -7.6167e-01, 1.5044e+00, -2.0770e+00, -8.9687e-01, -1.5045e+00, 1.8635e-01, 2.8085e-01,
    1.4227e-01, -1.1353e+00, -6.4419e-01, 1.3345e+00, 5.4033e-02, -4.6920e-01, -6.1643e-01,
    1.7381e+00, -3.0586e-01, -2.5329e-01, 3.1175e+00, -1.0362e+00, -1.3935e+00, 1.0158e+00,
    6.3395e-01, -6.8531e-02, -1.1117e+00, -3.7122e-01, -3.5248e-01, 1.7212e-01, 1.2474e+00,
    -6.1144e-01, -7.1520e-01, -1.0144e+00, -1.4054e+00, 5.7090e-01, -1.0911e+00, 3.9517e-01,
    1.2465e+00, -1.9319e-01, -5.3027e-01, -5.3061e-01, -6.7704e-01, 8.0270e-02, 4.9083e-02,
    1.0887e-01, 2.8546e-03, -7.6487e-01, 6.9228e-01, 1.3604e+00, -6.7222e-01, 5.9886e-03,
    7.5945e-01, 5.2745e-02, 1.9323e+00, 4.1338e-01, -1.1450e+00, 7.0341e-01, -4.3833e-01,
    3.2049e-01,
];

/// The latent vector fed to the decoder.
///
/// Its length is fixed at construction. Only the leading `controllable`
/// coordinates may be changed; the tail keeps the values it started with.
#[derive(Clone, Debug, PartialEq)]
pub struct LatentState {
    values: Vec<f32>,
    initial: Vec<f32>,
    controllable: usize,
}

impl LatentState {
    pub fn new(initial: &[f32], controllable: usize) -> Result<Self> {
        if initial.is_empty() {
            return Err(ViewerError::Config {
                message: "latent vector must not be empty".into(),
            });
        }
        if controllable > initial.len() {
            return Err(ViewerError::Config {
                message: format!(
                    "{controllable} controls requested but the latent vector has {} dimensions",
                    initial.len()
                ),
            });
        }
        Ok(Self {
            values: initial.to_vec(),
            initial: initial.to_vec(),
            controllable,
        })
    }

    /// State seeded from [`SAMPLE_LATENT`].
    pub fn from_sample(controllable: usize) -> Result<Self> {
        Self::new(&SAMPLE_LATENT, controllable)
    }

    /// Sets one controllable coordinate. No clamping: values far outside the
    /// training distribution are accepted.
    pub fn set_coordinate(&mut self, index: usize, value: f32) -> Result<()> {
        if index >= self.controllable {
            return Err(ViewerError::Index {
                index,
                len: self.controllable,
            });
        }
        self.values[index] = value;
        Ok(())
    }

    pub fn coordinate(&self, index: usize) -> Option<f32> {
        self.values.get(index).copied()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.values
    }

    pub fn controllable(&self) -> usize {
        self.controllable
    }

    pub fn reset(&mut self) {
        self.values.copy_from_slice(&self.initial);
    }
}

/// One slider and the latent coordinate it drives.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ControlBinding {
    pub label: String,
    pub index: usize,
}

/// Static table from control identity (its position) to latent index.
#[derive(Clone, Debug, PartialEq)]
pub struct ControlMap {
    bindings: Vec<ControlBinding>,
}

impl ControlMap {
    pub fn new(bindings: Vec<ControlBinding>) -> Result<Self> {
        for (pos, binding) in bindings.iter().enumerate() {
            if bindings[..pos].iter().any(|b| b.index == binding.index) {
                return Err(ViewerError::Config {
                    message: format!("latent index {} bound twice", binding.index),
                });
            }
        }
        Ok(Self { bindings })
    }

    /// Controls `z1..=zN` bound to coordinates `0..N`.
    pub fn leading(count: usize) -> Self {
        let bindings = (0..count)
            .map(|index| ControlBinding {
                label: format!("z{}", index + 1),
                index,
            })
            .collect();
        Self { bindings }
    }

    pub fn get(&self, control: usize) -> Option<&ControlBinding> {
        self.bindings.get(control)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ControlBinding> {
        self.bindings.iter()
    }

    /// Fails if any binding points past the controllable prefix.
    pub fn validate(&self, latent: &LatentState) -> Result<()> {
        match self.bindings.iter().find(|b| b.index >= latent.controllable()) {
            Some(b) => Err(ViewerError::Config {
                message: format!(
                    "control {} targets index {} but only {} coordinates are controllable",
                    b.label,
                    b.index,
                    latent.controllable()
                ),
            }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_state_exposes_leading_coordinates() {
        let state = LatentState::from_sample(16).unwrap();
        assert_eq!(state.as_slice().len(), 64);
        assert_eq!(state.controllable(), 16);
        assert_eq!(state.as_slice(), &SAMPLE_LATENT[..]);
    }

    #[test]
    fn too_many_controls_rejected() {
        let err = LatentState::new(&[0.0; 4], 5).unwrap_err();
        assert!(matches!(err, ViewerError::Config { .. }));
    }

    #[test]
    fn out_of_range_index_leaves_state_untouched() {
        let mut state = LatentState::from_sample(16).unwrap();
        let before = state.clone();
        let err = state.set_coordinate(16, 0.0).unwrap_err();
        assert!(matches!(err, ViewerError::Index { index: 16, len: 16 }));
        assert_eq!(state, before);
    }

    #[test]
    fn values_are_not_clamped() {
        let mut state = LatentState::from_sample(16).unwrap();
        state.set_coordinate(0, 1000.0).unwrap();
        state.set_coordinate(15, -1e6).unwrap();
        assert_eq!(state.coordinate(0), Some(1000.0));
        assert_eq!(state.coordinate(15), Some(-1e6));
        // uncontrolled tail unchanged
        assert_eq!(state.as_slice()[16..], SAMPLE_LATENT[16..]);
    }

    #[test]
    fn reset_restores_sample() {
        let mut state = LatentState::from_sample(16).unwrap();
        state.set_coordinate(3, 9.0).unwrap();
        state.reset();
        assert_eq!(state.as_slice(), &SAMPLE_LATENT[..]);
    }

    #[test]
    fn leading_map_labels_and_indices() {
        let map = ControlMap::leading(16);
        assert_eq!(map.len(), 16);
        assert_eq!(map.get(0).unwrap().label, "z1");
        assert_eq!(map.get(15).unwrap().index, 15);
        assert!(map.get(16).is_none());
    }

    #[test]
    fn duplicate_bindings_rejected() {
        let bindings = vec![
            ControlBinding { label: "a".into(), index: 2 },
            ControlBinding { label: "b".into(), index: 2 },
        ];
        assert!(ControlMap::new(bindings).is_err());
    }

    #[test]
    fn map_must_fit_controllable_prefix() {
        let state = LatentState::from_sample(8).unwrap();
        assert!(ControlMap::leading(8).validate(&state).is_ok());
        assert!(ControlMap::leading(9).validate(&state).is_err());
    }
}
