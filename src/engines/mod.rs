//! Native synthesis cores.
//!
//! # Available Cores
//!
//! - [`mock::MockCore`] - deterministic pure-Rust core, always built
//! - `onnx::OnnxCore` - ONNX duration/intonation/decode models (feature `onnx`)

pub mod mock;

#[cfg(feature = "onnx")]
pub mod onnx;
