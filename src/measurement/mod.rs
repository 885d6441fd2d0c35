//! Measurement state machines and supporting types.
//!
//! Each driver sequences instrument commands into named operations:
//! [`evm::EvmDriver`] covers the 5G-NR and LTE EVM/ACLR recipes,
//! [`spur::SpurSearchDriver`] the spurious-emission search, and
//! [`stn::StnDriver`] the sub-thermal-noise marker sweep. All
//! instrument-facing operations are wrapped by [`timing`] so every call
//! yields its result together with the elapsed wall-clock seconds, and the
//! [`tracker`] decides which reconfiguration steps may be skipped because
//! nothing changed. [`result`] holds the records handed to the reporting
//! layer.

pub mod evm;
pub mod result;
pub mod spur;
pub mod stn;
pub mod timing;
pub mod tracker;
