use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::RwLock;

/// Tunable synthesis parameters, set from the control surface at any time.
///
/// Cutoffs are in Hz; orders are the exponents of the frequency-domain
/// roll-off at the band edges. `spectrum_mixing` blends the previous frame's
/// spectrum into the current one (1.0 keeps the previous frame entirely).
/// `hanning_multiplier` divides the transform length, widening the
/// synthesized lobe of every tone as it grows. `attack`/`release` are the
/// asymmetric smoothing coefficients of the peak normalizer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SynthesisParams {
    pub hp_cutoff: f32,
    pub lp_cutoff: f32,
    pub hp_order: f32,
    pub lp_order: f32,
    pub q_scaling: f32,
    pub spectrum_mixing: f32,
    pub hanning_multiplier: f32,
    pub attack: f32,
    pub release: f32,
}

impl Default for SynthesisParams {
    fn default() -> Self {
        Self {
            hp_cutoff: 20.0,
            lp_cutoff: 20_000.0,
            hp_order: 0.0,
            lp_order: 0.0,
            q_scaling: 1.0,
            spectrum_mixing: 0.5,
            hanning_multiplier: 4.0,
            attack: 0.9,
            release: 0.1,
        }
    }
}

/// Thread-safe parameter store with a tear-free snapshot read.
///
/// Writers set fields independently; the processing pipeline calls
/// [`ParamStore::snapshot`] exactly once per frame so a single frame never
/// mixes two parameter values.
pub struct ParamStore {
    inner: RwLock<SynthesisParams>,
}

impl ParamStore {
    pub fn new(params: SynthesisParams) -> Self {
        Self {
            inner: RwLock::new(params),
        }
    }

    /// One internally consistent copy of all parameters.
    pub fn snapshot(&self) -> SynthesisParams {
        *self.read()
    }

    pub fn set_hp_cutoff(&self, hz: f32) {
        self.write().hp_cutoff = hz;
    }

    pub fn set_lp_cutoff(&self, hz: f32) {
        self.write().lp_cutoff = hz;
    }

    pub fn set_hp_order(&self, order: f32) {
        self.write().hp_order = order;
    }

    pub fn set_lp_order(&self, order: f32) {
        self.write().lp_order = order;
    }

    pub fn set_q_scaling(&self, scale: f32) {
        self.write().q_scaling = scale;
    }

    pub fn set_spectrum_mixing(&self, mixing: f32) {
        self.write().spectrum_mixing = mixing.clamp(0.0, 1.0);
    }

    pub fn set_hanning_multiplier(&self, multiplier: f32) {
        self.write().hanning_multiplier = multiplier.max(1.0);
    }

    pub fn set_attack(&self, attack: f32) {
        self.write().attack = attack.clamp(f32::EPSILON, 1.0);
    }

    pub fn set_release(&self, release: f32) {
        self.write().release = release.clamp(f32::EPSILON, 1.0);
    }

    /// Save the current parameters as JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.snapshot())?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load a parameter file written by [`ParamStore::save`].
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let params: SynthesisParams = serde_json::from_str(&json)?;
        Ok(Self::new(params))
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, SynthesisParams> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, SynthesisParams> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for ParamStore {
    fn default() -> Self {
        Self::new(SynthesisParams::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_field_setters() {
        let store = ParamStore::default();
        store.set_hp_cutoff(200.0);
        store.set_lp_cutoff(18_000.0);
        store.set_q_scaling(2.5);

        let snap = store.snapshot();
        assert_eq!(snap.hp_cutoff, 200.0);
        assert_eq!(snap.lp_cutoff, 18_000.0);
        assert_eq!(snap.q_scaling, 2.5);
        // untouched fields keep their defaults
        assert_eq!(snap.hanning_multiplier, 4.0);
    }

    #[test]
    fn mixing_is_clamped_to_unit_range() {
        let store = ParamStore::default();
        store.set_spectrum_mixing(3.0);
        assert_eq!(store.snapshot().spectrum_mixing, 1.0);
        store.set_spectrum_mixing(-1.0);
        assert_eq!(store.snapshot().spectrum_mixing, 0.0);
    }

    #[test]
    fn params_round_trip_through_json() {
        let mut params = SynthesisParams::default();
        params.hp_cutoff = 123.0;
        params.spectrum_mixing = 0.75;

        let json = serde_json::to_string(&params).unwrap();
        let restored: SynthesisParams = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, params);
    }
}
