//! CUDA backend for the kernel library.
//!
//! Provides:
//! - Device handle registry (lazy singleton per GPU)
//! - NVRTC compilation and per-device module caching
//! - Descriptor-driven tensor kernels

pub mod context;
pub mod launch;
pub mod ops;
