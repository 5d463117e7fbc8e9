//! Recoil-compensation sequencer: preset tables and tick expansion/emission.

pub mod presets;
pub mod sequence;

pub use presets::Preset;
pub use sequence::RecoilSequence;
