//! Process-level knobs shared by the SpiralTorch crates: deterministic seeding
//! and the tracing subscriber.

pub mod determinism;
pub mod tracing;

pub use determinism::DeterminismConfig;
