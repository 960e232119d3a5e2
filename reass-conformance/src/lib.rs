#![forbid(unsafe_code)]
//! Shared harness for the reassembly conformance tests.

pub mod wire_simulator;
pub mod invariants;

pub use wire_simulator::{pattern_byte, segment_at, SimulationConfig, WireSimulator};
pub use invariants::{check_queue, InvariantViolation};
