//! `RecoilSequence`: preset expansion and per-tick emission.
//!
//! Expansion mirrors `recoilComp_cbGenerateDataLocked` from the original
//! firmware: every raw group is scaled by `coefficient / sensitivity`,
//! truncated per tick with `floor`, then the rounding error against the
//! exact scaled total is diffused into the earliest ticks of the group so
//! the emitted sum always matches the rounded exact total. Emission
//! mirrors `recoilComp_getNextData`: Y is inverted because pattern
//! coordinates are screen-down-positive while the compensation pushes the
//! cursor up.

use alloc::vec::Vec;
use num_traits::float::FloatCore;

use crate::error::{ProtocolError, Result};
use crate::recoil::presets::{self, Preset};

pub const COEFFICIENT_MIN: f32 = 0.1;
pub const COEFFICIENT_MAX: f32 = 10.0;
pub const COEFFICIENT_STEP: f32 = 0.1;
pub const SENSITIVITY_MIN: f32 = 0.1;
pub const SENSITIVITY_MAX: f32 = 100.0;
pub const SENSITIVITY_STEP: f32 = 0.1;

pub struct RecoilSequence {
    coefficient: f32,
    sensitivity: f32,
    preset: Option<&'static Preset>,
    x_ticks: Vec<i32>,
    y_ticks: Vec<i32>,
    t_ticks: Vec<u32>,
    index: usize,
    last_tick_ms: u32,
    enabled: bool,
}

impl RecoilSequence {
    pub fn new() -> Self {
        Self {
            coefficient: 1.0,
            sensitivity: 1.0,
            preset: None,
            x_ticks: Vec::new(),
            y_ticks: Vec::new(),
            t_ticks: Vec::new(),
            index: 0,
            last_tick_ms: 0,
            enabled: false,
        }
    }

    pub fn enable(&mut self) {
        self.enabled = true;
    }

    pub fn disable(&mut self) {
        self.enabled = false;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn coefficient(&self) -> f32 {
        self.coefficient
    }

    pub fn sensitivity(&self) -> f32 {
        self.sensitivity
    }

    pub fn set_coefficient(&mut self, v: f32) {
        self.coefficient = v.clamp(COEFFICIENT_MIN, COEFFICIENT_MAX);
        self.regenerate();
    }

    pub fn set_sensitivity(&mut self, v: f32) {
        self.sensitivity = v.clamp(SENSITIVITY_MIN, SENSITIVITY_MAX);
        self.regenerate();
    }

    pub fn adjust_coefficient(&mut self, delta: f32) {
        self.set_coefficient(self.coefficient + delta);
    }

    pub fn adjust_sensitivity(&mut self, delta: f32) {
        self.set_sensitivity(self.sensitivity + delta);
    }

    pub fn load_preset(&mut self, idx: u8) -> Result<()> {
        let preset = presets::by_index(idx).ok_or(ProtocolError::NotFound)?;
        self.preset = Some(preset);
        self.regenerate();
        Ok(())
    }

    fn regenerate(&mut self) {
        let Some(preset) = self.preset else {
            return;
        };
        let sampling = preset.firerounds_sampling().max(1);

        self.x_ticks.clear();
        self.y_ticks.clear();
        self.t_ticks.clear();

        for group in preset.raw {
            let x_scaled = group.x * self.coefficient / self.sensitivity;
            let y_scaled = group.y * self.coefficient / self.sensitivity;
            let t_scaled = group.t_ms * self.coefficient / self.sensitivity;

            self.x_ticks.extend(expand(x_scaled, sampling));
            self.y_ticks.extend(expand(y_scaled, sampling));
            self.t_ticks
                .extend(expand(t_scaled, sampling).into_iter().map(|v| v.max(0) as u32));
        }

        self.index = 0;
    }

    /// Advances the sequence if enough time has passed since the last
    /// emitted tick. Returns `None` when uninitialized, exhausted, or not
    /// yet due.
    pub fn next(&mut self, now_ms: u32) -> Option<(i32, i32)> {
        if self.preset.is_none() || self.index >= self.x_ticks.len() {
            return None;
        }
        let elapsed = now_ms.wrapping_sub(self.last_tick_ms);
        let due = self.t_ticks[self.index];
        if elapsed >= due {
            self.last_tick_ms = self.last_tick_ms.wrapping_add(due);
            let out = (self.x_ticks[self.index], -self.y_ticks[self.index]);
            self.index += 1;
            Some(out)
        } else {
            None
        }
    }

    pub fn preset_name(&self) -> Option<&'static str> {
        self.preset.map(|p| p.name)
    }

    pub fn reset(&mut self) {
        self.index = 0;
        self.last_tick_ms = 0;
    }

    #[cfg(test)]
    pub(crate) fn x_ticks(&self) -> &[i32] {
        &self.x_ticks
    }

    #[cfg(test)]
    pub(crate) fn y_ticks(&self) -> &[i32] {
        &self.y_ticks
    }
}

impl Default for RecoilSequence {
    fn default() -> Self {
        Self::new()
    }
}

/// Expands one exact scaled value into `sampling` per-tick integers whose
/// sum equals `round(exact)`, diffusing the rounding residual into the
/// earliest ticks.
fn expand(exact: f32, sampling: u32) -> Vec<i32> {
    let sampling = sampling as usize;
    let per_tick = (exact / sampling as f32).floor() as i32;
    let mut ticks = alloc::vec![per_tick; sampling];
    let stored_sum: i32 = per_tick * sampling as i32;
    let exact_rounded = exact.round() as i32;
    let mut residual = exact_rounded - stored_sum;

    let mut i = 0;
    while residual > 0 && i < ticks.len() {
        ticks[i] += 1;
        residual -= 1;
        i += 1;
    }
    let mut i = 0;
    while residual < 0 && i < ticks.len() {
        ticks[i] -= 1;
        residual += 1;
        i += 1;
    }
    ticks
}
