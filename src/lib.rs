//! Workspace placeholder crate.
//!
//! This crate exists to expose shared feature flags that map to the individual
//! workspace crates (`radio-runtime`, `radio-playback`). Host applications can
//! depend on `radio-stream` and enable the documented features without wiring
//! each crate individually.

pub use radio_playback as playback;
pub use radio_runtime as runtime;
